// Export loop: tail the upstream operation log and project it locally

use crate::constants::{
    user_agent, EXPORT_CATCHUP_THRESHOLD_SECS, EXPORT_CATCHUP_WAIT_MS, EXPORT_PAGE_LIMIT,
    EXPORT_WAIT_MS, HTTP_EXPORT_TIMEOUT_SECS,
};
use crate::error::{MirageError, Result};
use crate::models::PlcEntry;
use crate::Mirage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The single long-running ingestion task. Pulls NDJSON pages from the
/// upstream `/export` endpoint, persists each entry, and projects it into
/// the handle index and the lookup tier.
///
/// Every data error is logged and skipped; only the shutdown signal ends
/// the loop. The upstream stream is unbounded and one malformed record must
/// not stall the mirror.
pub struct Exporter {
    mirage: Arc<Mirage>,
    client: reqwest::Client,
    plc_root: String,
    after: String,
    shutdown_rx: watch::Receiver<bool>,
}

impl Exporter {
    pub async fn new(
        mirage: Arc<Mirage>,
        plc_root: String,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_EXPORT_TIMEOUT_SECS))
            .user_agent(user_agent())
            .build()?;

        // Resume from the durable cursor; an absent key means a fresh mirror
        let after = mirage.cache().cursor().await?.unwrap_or_default();

        Ok(Self {
            mirage,
            client,
            plc_root,
            after,
            shutdown_rx,
        })
    }

    pub async fn run(mut self) {
        log::info!("[Exporter] starting, cursor={:?}", self.after);

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let wait = page_wait(&self.after, Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }

            log::info!("[Exporter] exporting, cursor={:?}", self.after);

            let body = match self.fetch_page().await {
                Ok(body) => body,
                Err(e) => {
                    log::error!("[Exporter] failed to fetch export page: {}", e);
                    continue;
                }
            };

            self.process_page(&body).await;
        }

        log::info!("[Exporter] stopped");
    }

    fn export_url(&self) -> String {
        let mut url = format!("{}/export?limit={}", self.plc_root, EXPORT_PAGE_LIMIT);
        if !self.after.is_empty() {
            url.push_str(&format!("&after={}", self.after));
        }
        url
    }

    async fn fetch_page(&self) -> Result<String> {
        let response = self.client.get(self.export_url()).send().await?;

        if !response.status().is_success() {
            return Err(MirageError::Upstream(format!(
                "export returned {}",
                response.status()
            )));
        }

        Ok(response.text().await?)
    }

    /// Process one NDJSON page. The cursor advances to the `createdAt` of
    /// the final decodable line, and only after that line has been handled,
    /// so a crash mid-page replays the page on restart.
    async fn process_page(&mut self, body: &str) {
        let mut advance: Option<String> = None;

        for decoded in decode_lines(body) {
            match decoded {
                Ok(entry) => {
                    let created_at = entry.created_at.clone();
                    self.process_entry(entry).await;
                    advance = Some(created_at);
                }
                Err(e) => {
                    log::error!("[Exporter] skipping undecodable entry: {}", e);
                }
            }
        }

        if let Some(after) = advance {
            match self.mirage.cache().set_cursor(&after).await {
                Ok(()) => self.after = after,
                Err(e) => log::error!("[Exporter] failed to persist cursor: {}", e),
            }
        }
    }

    async fn process_entry(&self, entry: PlcEntry) {
        let mirage = &self.mirage;

        // The upstream re-includes the cursor boundary entry; a DID that is
        // already in the lookup tier is treated as a duplicate and skipped
        // wholesale. Tombstones are exempt: they must retire state that is
        // by definition already tracked.
        if !entry.is_tombstone() {
            match mirage.cache().get_did_handle(&entry.did).await {
                Ok(Some(_)) => return,
                Ok(None) => {}
                Err(e) => {
                    log::error!("[Exporter] failed to consult lookup tier: {}", e);
                    return;
                }
            }
        }

        let _guard = mirage.store().write_lock().await;

        if let Err(e) = mirage.store().insert_entry(&entry).await {
            log::error!("[Exporter] failed to insert entry {}: {}", entry.cid, e);
            return;
        }

        if entry.is_tombstone() {
            if let Err(e) = mirage.store().delete_handles_for(&entry.did).await {
                log::error!("[Exporter] failed to delete handles for {}: {}", entry.did, e);
                return;
            }
            if let Err(e) = mirage.cache().delete_did_handle(&entry.did).await {
                log::error!("[Exporter] failed to evict {} from lookup tier: {}", entry.did, e);
            }
            return;
        }

        let handle = match entry.asserted_handle() {
            Some(handle) => handle,
            None => {
                log::warn!(
                    "[Exporter] operation with no alsoKnownAs, skipping projection, did={}",
                    entry.did
                );
                return;
            }
        };

        let updated_at = match DateTime::parse_from_rfc3339(&entry.created_at) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                log::error!("[Exporter] failed to parse createdAt for {}: {}", entry.did, e);
                return;
            }
        };

        if let Err(e) = mirage
            .store()
            .upsert_handle(&entry.did, &handle, updated_at)
            .await
        {
            log::error!("[Exporter] failed to upsert handle for {}: {}", entry.did, e);
            return;
        }

        if let Err(e) = mirage.cache().set_did_handle(&entry.did, &handle).await {
            log::error!("[Exporter] failed to cache handle for {}: {}", entry.did, e);
            return;
        }

        self.reconcile_handle_claim(&handle, &entry.did).await;
    }

    /// First claim on a handle wins. A later DID claiming the same handle is
    /// only honored if out-of-band verification agrees with it; otherwise the
    /// mismatch is logged and the previous owner keeps the reverse entry.
    async fn reconcile_handle_claim(&self, handle: &str, did: &str) {
        let mirage = &self.mirage;

        let current = match mirage.cache().get_handle_did(handle).await {
            Ok(current) => current,
            Err(e) => {
                log::error!("[Exporter] failed to read handle claim for {}: {}", handle, e);
                return;
            }
        };

        match current {
            None => {
                if let Err(e) = mirage.cache().set_handle_did(handle, did).await {
                    log::error!("[Exporter] failed to record handle claim for {}: {}", handle, e);
                }
            }
            Some(current) if current == did => {}
            Some(current) => match mirage.verifier().resolve_handle(handle).await {
                Ok(resolved) if resolved == did => {
                    log::info!(
                        "[Exporter] reconciled contested handle {} from {} to {}",
                        handle,
                        current,
                        did
                    );
                    if let Err(e) = mirage.cache().set_handle_did(handle, did).await {
                        log::error!(
                            "[Exporter] failed to record handle claim for {}: {}",
                            handle,
                            e
                        );
                    }
                }
                Ok(resolved) => {
                    log::error!(
                        "{}",
                        MirageError::HandleDidMismatch {
                            handle: handle.to_string(),
                            claimed: did.to_string(),
                            resolved,
                        }
                    );
                }
                Err(e) => {
                    log::warn!("[Exporter] failed to verify contested handle {}: {}", handle, e);
                }
            },
        }
    }
}

/// Split an export page into entries, skipping blank lines. Undecodable
/// lines come back as errors so the caller can skip just that line.
fn decode_lines(body: &str) -> Vec<std::result::Result<PlcEntry, MirageError>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(PlcEntry::from_json)
        .collect()
}

/// How long to sleep before the next export request. Steady-state pacing is
/// polite; a cursor more than an hour behind switches to catch-up pacing.
fn page_wait(after: &str, now: DateTime<Utc>) -> Duration {
    if !after.is_empty() {
        if let Ok(t) = DateTime::parse_from_rfc3339(after) {
            let age = now - t.with_timezone(&Utc);
            if age > chrono::Duration::seconds(EXPORT_CATCHUP_THRESHOLD_SECS) {
                return Duration::from_millis(EXPORT_CATCHUP_WAIT_MS);
            }
        }
    }
    Duration::from_millis(EXPORT_WAIT_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_wait_steady_state() {
        let now = Utc::now();
        // No cursor yet: default pacing
        assert_eq!(page_wait("", now), Duration::from_millis(EXPORT_WAIT_MS));

        // Recent cursor: default pacing
        let recent = (now - chrono::Duration::minutes(5)).to_rfc3339();
        assert_eq!(page_wait(&recent, now), Duration::from_millis(EXPORT_WAIT_MS));
    }

    #[test]
    fn test_page_wait_catch_up() {
        let now = Utc::now();
        let stale = (now - chrono::Duration::hours(2)).to_rfc3339();
        assert_eq!(
            page_wait(&stale, now),
            Duration::from_millis(EXPORT_CATCHUP_WAIT_MS)
        );
    }

    #[test]
    fn test_page_wait_unparseable_cursor() {
        assert_eq!(
            page_wait("not-a-timestamp", Utc::now()),
            Duration::from_millis(EXPORT_WAIT_MS)
        );
    }

    #[test]
    fn test_decode_lines_skips_blanks() {
        let body = "\n\n";
        assert!(decode_lines(body).is_empty());

        let body = "";
        assert!(decode_lines(body).is_empty());
    }

    #[test]
    fn test_decode_lines_isolates_bad_lines() {
        let good = r#"{"did":"did:plc:abc","operation":{"type":"plc_tombstone","sig":"s","prev":"bafy1"},"cid":"bafy2","nullified":false,"createdAt":"2024-01-02T00:00:00.000000000Z"}"#;
        let body = format!("{}\n{{broken\n{}\n", good, good);

        let decoded = decode_lines(&body);
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].is_ok());
        assert!(decoded[1].is_err());
        assert!(decoded[2].is_ok());
    }
}
