// Durable store: the operation log and the handle index

use crate::error::Result;
use crate::models::{DidHandle, PlcEntry, PlcOperation};
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tokio::sync::{Mutex, MutexGuard};

/// Connection parameters for the durable store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: String,
    pub db: String,
    pub user: String,
    pub pass: String,
}

impl StoreConfig {
    fn dsn(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode=disable",
            self.user, self.pass, self.host, self.port, self.db
        )
    }
}

/// Postgres-backed store holding the operation log and the handle index.
///
/// Reads go straight to the pool; the exporter serializes all writes behind
/// `write_lock` so durable state has a single total order.
pub struct Store {
    pool: PgPool,
    write_lock: Mutex<()>,
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    did: String,
    operation: Json<PlcOperation>,
    cid: String,
    nullified: bool,
    created_at: String,
}

impl From<EntryRow> for PlcEntry {
    fn from(row: EntryRow) -> Self {
        PlcEntry {
            did: row.did,
            operation: row.operation.0,
            cid: row.cid,
            nullified: row.nullified,
            created_at: row.created_at,
        }
    }
}

impl Store {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&config.dsn())
            .await?;

        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.migrate().await?;
        Ok(store)
    }

    #[cfg(test)]
    fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Acquire the single write gate. The exporter holds this across one
    /// entry's insert plus projection.
    pub async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    async fn migrate(&self) -> Result<()> {
        log::info!("migrating...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plc_entries (
                id BIGSERIAL PRIMARY KEY,
                did TEXT NOT NULL,
                operation JSONB NOT NULL,
                cid TEXT NOT NULL,
                nullified BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_plc_entries_cid ON plc_entries (cid)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_plc_entries_did ON plc_entries (did)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_plc_entries_did_cid ON plc_entries (did, cid)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_plc_entries_did_created_at ON plc_entries (did, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS did_handles (
                id BIGSERIAL PRIMARY KEY,
                did TEXT NOT NULL,
                handle TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_did_handles_did ON did_handles (did)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_did_handles_handle ON did_handles (handle)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_did_handles_updated_at ON did_handles (updated_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_did_handles_did_updated_at ON did_handles (did, updated_at DESC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_did_handles_handle_updated_at ON did_handles (handle, updated_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Operation log
    // ========================================================================

    /// Append one entry. The unique index on `cid` makes replays observable
    /// as a conflict error; callers treat that as non-fatal.
    pub async fn insert_entry(&self, entry: &PlcEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO plc_entries (did, operation, cid, nullified, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.did)
        .bind(Json(&entry.operation))
        .bind(&entry.cid)
        .bind(entry.nullified)
        .bind(&entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_entry(&self, did: &str) -> Result<Option<PlcEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"
            SELECT did, operation, cid, nullified, created_at
            FROM plc_entries WHERE did = $1
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(did)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PlcEntry::from))
    }

    pub async fn first_entry(&self, did: &str) -> Result<Option<PlcEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"
            SELECT did, operation, cid, nullified, created_at
            FROM plc_entries WHERE did = $1
            ORDER BY created_at ASC LIMIT 1
            "#,
        )
        .bind(did)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PlcEntry::from))
    }

    pub async fn all_entries(&self, did: &str) -> Result<Vec<PlcEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT did, operation, cid, nullified, created_at
            FROM plc_entries WHERE did = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(did)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PlcEntry::from).collect())
    }

    // ========================================================================
    // Handle index
    // ========================================================================

    pub async fn upsert_handle(
        &self,
        did: &str,
        handle: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO did_handles (did, handle, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (did) DO UPDATE
            SET handle = EXCLUDED.handle, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(did)
        .bind(handle)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_handles_for(&self, did: &str) -> Result<()> {
        sqlx::query("DELETE FROM did_handles WHERE did = $1")
            .bind(did)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn handle_for_did(&self, did: &str) -> Result<Option<DidHandle>> {
        let row: Option<DidHandle> = sqlx::query_as(
            "SELECT did, handle, updated_at FROM did_handles WHERE did = $1",
        )
        .bind(did)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// All bindings touched in the trailing window, most recent first.
    pub async fn handles_updated_since(&self, window: Duration) -> Result<Vec<DidHandle>> {
        let since = Utc::now() - window;
        let rows: Vec<DidHandle> = sqlx::query_as(
            r#"
            SELECT did, handle, updated_at FROM did_handles
            WHERE updated_at >= $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every binding, in insertion order. Used by the cache backfill command.
    pub async fn all_handles(&self) -> Result<Vec<DidHandle>> {
        let rows: Vec<DidHandle> =
            sqlx::query_as("SELECT did, handle, updated_at FROM did_handles ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlcEntry;

    const ENTRY: &str = r#"{"did":"did:plc:abc","operation":{"type":"plc_operation","alsoKnownAs":["at://alice.test"],"verificationMethods":{},"services":{},"rotationKeys":[],"sig":"s"},"cid":"bafy1","nullified":false,"createdAt":"2024-01-01T00:00:00.000000000Z"}"#;

    async fn test_store() -> Option<Store> {
        let url = std::env::var("MIRAGE_TEST_DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new().connect(&url).await.ok()?;
        let store = Store::from_pool(pool);
        store.migrate().await.unwrap();
        Some(store)
    }

    #[tokio::test]
    #[ignore = "needs MIRAGE_TEST_DATABASE_URL pointing at a scratch Postgres"]
    async fn test_insert_is_idempotent_on_cid() {
        let store = test_store().await.expect("test database");
        let entry = PlcEntry::from_json(ENTRY).unwrap();

        store.insert_entry(&entry).await.unwrap();
        // Second insert of the same cid must surface as a conflict
        assert!(store.insert_entry(&entry).await.is_err());

        let all = store.all_entries("did:plc:abc").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    #[ignore = "needs MIRAGE_TEST_DATABASE_URL pointing at a scratch Postgres"]
    async fn test_upsert_handle_overwrites_on_did_conflict() {
        let store = test_store().await.expect("test database");
        let t0 = Utc::now();

        store.upsert_handle("did:plc:up", "old.test", t0).await.unwrap();
        store
            .upsert_handle("did:plc:up", "new.test", t0 + Duration::seconds(1))
            .await
            .unwrap();

        let row = store.handle_for_did("did:plc:up").await.unwrap().unwrap();
        assert_eq!(row.handle, "new.test");

        store.delete_handles_for("did:plc:up").await.unwrap();
        assert!(store.handle_for_did("did:plc:up").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "needs MIRAGE_TEST_DATABASE_URL pointing at a scratch Postgres"]
    async fn test_handles_updated_since_window() {
        let store = test_store().await.expect("test database");

        store
            .upsert_handle("did:plc:recent", "recent.test", Utc::now())
            .await
            .unwrap();
        store
            .upsert_handle(
                "did:plc:stale",
                "stale.test",
                Utc::now() - Duration::days(30),
            )
            .await
            .unwrap();

        let recent = store
            .handles_updated_since(Duration::hours(1))
            .await
            .unwrap();
        assert!(recent.iter().any(|row| row.did == "did:plc:recent"));
        assert!(!recent.iter().any(|row| row.did == "did:plc:stale"));

        store.delete_handles_for("did:plc:recent").await.unwrap();
        store.delete_handles_for("did:plc:stale").await.unwrap();
    }
}
