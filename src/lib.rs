// src/lib.rs
pub mod cache;
pub mod constants;
pub mod error;
pub mod exporter;
pub mod ident;
pub mod models;
pub mod multikey;
pub mod resolver;
pub mod runtime;
pub mod server;
pub mod store;
pub mod verifier;

// Re-export main types
pub use cache::LookupCache;
pub use error::{MirageError, Result};
pub use exporter::Exporter;
pub use models::{DidHandle, PlcEntry, PlcOperation};
pub use resolver::{DidDocument, PlcData};
pub use runtime::Runtime;
pub use store::{Store, StoreConfig};
pub use verifier::HandleVerifier;

use chrono::Duration;
use std::sync::Arc;

/// Shared state for the mirror: the durable store, the fast lookup tier and
/// the out-of-band handle verifier. One instance is shared by the HTTP
/// handlers and the export loop.
pub struct Mirage {
    store: Store,
    cache: LookupCache,
    verifier: HandleVerifier,
}

impl Mirage {
    pub async fn new(store_config: &StoreConfig, redis_addr: &str) -> Result<Self> {
        let store = Store::connect(store_config).await?;
        let cache = LookupCache::connect(redis_addr).await?;
        let verifier = HandleVerifier::new()?;
        Ok(Self {
            store,
            cache,
            verifier,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn verifier(&self) -> &HandleVerifier {
        &self.verifier
    }

    // ========================================================================
    // Name index reads
    // ========================================================================

    /// did -> handle. Tries the lookup tier first and lazily fills it from
    /// the handle index on a miss. `None` means the DID is not tracked.
    pub async fn handle_for_did(&self, did: &str) -> Result<Option<String>> {
        if let Some(handle) = self.cache.get_did_handle(did).await? {
            return Ok(Some(handle));
        }

        let Some(row) = self.store.handle_for_did(did).await? else {
            return Ok(None);
        };

        self.cache.set_did_handle(did, &row.handle).await?;
        Ok(Some(row.handle))
    }

    /// handle -> did. Lookup tier only: the handle index is not unique over
    /// history (reused and disputed handles), so falling back to the store
    /// here would return wrong answers across handle reuse.
    pub async fn did_for_handle(&self, handle: &str) -> Result<Option<String>> {
        self.cache.get_handle_did(handle).await
    }

    /// Resolve a route input that may be either form to a DID.
    pub async fn did_from_did_or_handle(&self, input: &str) -> Result<Option<String>> {
        if ident::validate_did(input).is_ok() {
            return Ok(Some(input.to_string()));
        }
        self.did_for_handle(input).await
    }

    // ========================================================================
    // Operation log reads
    // ========================================================================

    pub async fn resolve_did(&self, did: &str) -> Result<DidDocument> {
        let entry = self
            .store
            .latest_entry(did)
            .await?
            .ok_or(MirageError::NotFound("did"))?;
        resolver::did_document(&entry)
    }

    pub async fn op_log(&self, did: &str) -> Result<Vec<PlcEntry>> {
        self.store.all_entries(did).await
    }

    pub async fn last_entry(&self, did: &str) -> Result<Option<PlcEntry>> {
        self.store.latest_entry(did).await
    }

    pub async fn plc_data(&self, did: &str) -> Result<Option<PlcData>> {
        let Some(entry) = self.store.latest_entry(did).await? else {
            return Ok(None);
        };
        Ok(resolver::plc_data(&entry))
    }

    pub async fn service_endpoint(&self, did: &str) -> Result<Option<String>> {
        let Some(entry) = self.store.latest_entry(did).await? else {
            return Ok(None);
        };
        Ok(resolver::service_endpoint(&entry))
    }

    pub async fn created_at(&self, did: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .first_entry(did)
            .await?
            .map(|entry| entry.created_at))
    }

    pub async fn handles_updated_since(&self, window: Duration) -> Result<Vec<DidHandle>> {
        self.store.handles_updated_since(window).await
    }

    // ========================================================================
    // Lookup tier backfill
    // ========================================================================

    /// Replay the handle index into both lookup key spaces. Duplicate
    /// handles are verified out-of-band before the later claimant is
    /// written; unverifiable duplicates keep the earlier claim.
    pub async fn fill_cache(&self, skip: usize) -> Result<usize> {
        let mut claimed: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();

        log::info!("fetching handle index rows...");
        let rows = self.store.all_handles().await?;
        let total = rows.len().saturating_sub(skip);
        let mut filled = 0usize;

        for (i, row) in rows.into_iter().skip(skip).enumerate() {
            if i % 10_000 == 0 {
                log::info!("filling {}/{}", i, total);
            }

            if let Some(previous) = claimed.get(&row.handle) {
                if previous != &row.did {
                    match self.verifier.resolve_handle(&row.handle).await {
                        Ok(resolved) if resolved == row.did => {
                            log::info!("verified duplicate handle {}", row.handle);
                        }
                        Ok(resolved) => {
                            log::error!(
                                "{}",
                                MirageError::HandleDidMismatch {
                                    handle: row.handle.clone(),
                                    claimed: row.did.clone(),
                                    resolved,
                                }
                            );
                            continue;
                        }
                        Err(e) => {
                            log::warn!("failed to resolve handle {}: {}", row.handle, e);
                            continue;
                        }
                    }
                }
            }

            self.cache.set_did_handle(&row.did, &row.handle).await?;
            self.cache.set_handle_did(&row.handle, &row.did).await?;
            claimed.insert(row.handle, row.did);
            filled += 1;
        }

        log::info!("finished filling lookup tier, {} rows", filled);
        Ok(filled)
    }
}

/// Convenience alias used by the server state and the exporter.
pub type SharedMirage = Arc<Mirage>;
