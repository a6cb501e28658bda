// Fast lookup tier: bidirectional DID <-> handle cache plus the export cursor

use crate::constants::{AFTER_KEY, DID_HANDLE_PREFIX, HANDLE_DID_PREFIX, LOOKUP_PREFIX};
use crate::error::Result;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Redis-backed lookup tier. Entries never expire; the exporter rewrites
/// them on projection and deletes `did_handle/` entries on tombstones.
///
/// This tier holds derived data only. On any disagreement with the durable
/// store, the store wins and the tier is rebuilt from it (`fill-cache`).
#[derive(Clone)]
pub struct LookupCache {
    conn: ConnectionManager,
    prefix: String,
}

impl LookupCache {
    pub async fn connect(addr: &str) -> Result<Self> {
        let url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{}", addr)
        };
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            prefix: LOOKUP_PREFIX.to_string(),
        })
    }

    fn did_handle_key(&self, did: &str) -> String {
        format!("{}{}{}", self.prefix, DID_HANDLE_PREFIX, did)
    }

    fn handle_did_key(&self, handle: &str) -> String {
        format!("{}{}{}", self.prefix, HANDLE_DID_PREFIX, handle)
    }

    fn after_key(&self) -> String {
        format!("{}{}", self.prefix, AFTER_KEY)
    }

    // ========================================================================
    // did -> handle
    // ========================================================================

    pub async fn get_did_handle(&self, did: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.did_handle_key(did)).await?;
        Ok(value)
    }

    pub async fn set_did_handle(&self, did: &str, handle: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.did_handle_key(did), handle).await?;
        Ok(())
    }

    pub async fn delete_did_handle(&self, did: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.did_handle_key(did)).await?;
        Ok(())
    }

    // ========================================================================
    // handle -> did
    // ========================================================================

    pub async fn get_handle_did(&self, handle: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.handle_did_key(handle)).await?;
        Ok(value)
    }

    pub async fn set_handle_did(&self, handle: &str, did: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.handle_did_key(handle), did).await?;
        Ok(())
    }

    // ========================================================================
    // Export cursor
    // ========================================================================

    pub async fn cursor(&self) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.after_key()).await?;
        Ok(value)
    }

    pub async fn set_cursor(&self, after: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.after_key(), after).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_cache() -> Option<LookupCache> {
        let addr = std::env::var("MIRAGE_TEST_REDIS_URL").ok()?;
        LookupCache::connect(&addr).await.ok()
    }

    #[tokio::test]
    #[ignore = "needs MIRAGE_TEST_REDIS_URL pointing at a scratch Redis"]
    async fn test_round_trip_both_key_spaces() {
        let cache = test_cache().await.expect("test redis");

        cache.set_did_handle("did:plc:abc", "alice.test").await.unwrap();
        cache.set_handle_did("alice.test", "did:plc:abc").await.unwrap();

        assert_eq!(
            cache.get_did_handle("did:plc:abc").await.unwrap().as_deref(),
            Some("alice.test")
        );
        assert_eq!(
            cache.get_handle_did("alice.test").await.unwrap().as_deref(),
            Some("did:plc:abc")
        );

        // Tombstone path deletes only the forward entry
        cache.delete_did_handle("did:plc:abc").await.unwrap();
        assert!(cache.get_did_handle("did:plc:abc").await.unwrap().is_none());
        assert_eq!(
            cache.get_handle_did("alice.test").await.unwrap().as_deref(),
            Some("did:plc:abc")
        );
    }

    #[tokio::test]
    #[ignore = "needs MIRAGE_TEST_REDIS_URL pointing at a scratch Redis"]
    async fn test_cursor_round_trip() {
        let cache = test_cache().await.expect("test redis");
        cache.set_cursor("2024-01-01T00:00:00.000000000Z").await.unwrap();
        assert_eq!(
            cache.cursor().await.unwrap().as_deref(),
            Some("2024-01-01T00:00:00.000000000Z")
        );
    }
}
