//! Database connection, pool and write-transaction management.

use exn::ResultExt;
use futures::future::BoxFuture;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Readers (UI queries) are the concurrent side; writes are serialized anyway.
const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Pool tuning for file-backed databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}
impl Default for PoolSettings {
    fn default() -> Self {
        Self { max_connections: MAX_CONNECTIONS, busy_timeout: BUSY_TIMEOUT }
    }
}

/// Database connection pool for the tracking table.
///
/// Reads go straight to the pool. Writes go through [`Database::execute`],
/// which holds the writer lock for the lifetime of the transaction, so at
/// most one write transaction (upsert, sweep or clear) is open at a time and
/// later writers queue behind it.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

/// An open write transaction together with the writer lock that guards it.
///
/// Dropping it without calling [`commit`](Self::commit) rolls back.
struct WriteTransaction {
    // Declared before the guard: the transaction must be released first.
    tx: Transaction<'static, Sqlite>,
    _writer: OwnedMutexGuard<()>,
}
impl WriteTransaction {
    fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.or_raise(|| ErrorKind::Transaction)
    }

    async fn rollback(self) {
        if let Err(err) = self.tx.rollback().await {
            tracing::warn!(error = %err, "Rollback failed; connection will be discarded");
        }
    }
}

impl Database {
    async fn new(options: SqliteConnectOptions, pool_options: SqlitePoolOptions) -> Result<Self> {
        let pool = pool_options
            // This is IMPORTANT to apply the query-based PRAGMAs to EVERY
            // connection (set by max connections) instead of only the
            // first connection returned by the pool.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Initialization)?;
        let db = Self { pool, writer: Arc::new(Mutex::new(())) };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the tracking database at the given path.
    ///
    /// Creates the database file (and its parent directory) if it doesn't
    /// exist and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, PoolSettings::default()).await
    }

    pub async fn connect_with(path: impl AsRef<Path>, settings: PoolSettings) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Initialization)?;
        }
        let options = Self::base_options().filename(path).create_if_missing(true).busy_timeout(settings.busy_timeout);
        let pool_options = SqlitePoolOptions::new().max_connections(settings.max_connections);
        Self::new(options, pool_options).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // In-memory database must be limited to one connection, and that
        // connection must never be reaped, otherwise the data goes with it.
        let pool_options = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::new(options, pool_options).await
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // WAL: readers never wait on the writer beyond its commit.
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            // PRAGMA synchronous = NORMAL. The table is a derived cache, so
            // losing the last few commits on power loss is acceptable.
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::None)
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA temp_store = MEMORY;
                PRAGMA wal_autocheckpoint = 1000;
                PRAGMA cache_size = -8192;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Run database migrations.
    ///
    /// Called automatically on connect; running it again is a no-op.
    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Initialization)
    }

    /// Get a reference to the underlying connection pool, for reads.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn begin_write(&self) -> Result<WriteTransaction> {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        let tx = self.pool.begin().await.or_raise(|| ErrorKind::Transaction)?;
        Ok(WriteTransaction { tx, _writer: writer })
    }

    /// Run `body` inside an exclusive write transaction.
    ///
    /// Commits when `body` succeeds. When it fails the whole transaction is
    /// rolled back and the error is returned unchanged, so partial writes are
    /// never visible.
    pub async fn execute<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>>,
    {
        let mut tx = self.begin_write().await?;
        let result = body(tx.connection()).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            },
            Err(err) => {
                tx.rollback().await;
                Err(err)
            },
        }
    }

    /// Health probe.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.or_raise(|| ErrorKind::Transaction)?;
        Ok(())
    }

    /// Close the database connection pool.
    ///
    /// Waits for in-flight work to return its connections, then closes them.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM active_tracking").fetch_one(db.pool()).await.unwrap()
    }

    fn insert<'a>(conn: &'a mut SqliteConnection, icao24: &'static str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query("INSERT INTO active_tracking (icao24, manufacturer, last_seen) VALUES (?, 'Cessna', 0)")
                .bind(icao24)
                .execute(conn)
                .await
                .or_raise(|| ErrorKind::Transaction)?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.is_closed());
        db.ping().await.unwrap();
        db.close().await;
        assert!(db.is_closed());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(count(&db).await, 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tracking.db");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(mode, "wal");
        let sync: i64 = sqlx::query_scalar("PRAGMA synchronous").fetch_one(db.pool()).await.unwrap();
        assert_eq!(sync, 1, "synchronous should be NORMAL");
        let temp_store: i64 = sqlx::query_scalar("PRAGMA temp_store").fetch_one(db.pool()).await.unwrap();
        assert_eq!(temp_store, 2, "temp_store should be MEMORY");
        db.close().await;
        // Reopening an existing database must not fail on the schema.
        let db = Database::connect(&path).await.unwrap();
        assert_eq!(count(&db).await, 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_execute_commits() {
        let db = Database::connect_in_memory().await.unwrap();
        db.execute(|conn| insert(conn, "a1b2c3")).await.unwrap();
        assert_eq!(count(&db).await, 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_execute_rolls_back_on_error() {
        let db = Database::connect_in_memory().await.unwrap();
        let err = db
            .execute(|conn| {
                Box::pin(async move {
                    insert(conn, "a1b2c3").await?;
                    // Duplicate primary key.
                    insert(conn, "a1b2c3").await
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transaction));
        assert_eq!(count(&db).await, 0);
        // The writer lock was released and the connection is usable again.
        db.execute(|conn| insert(conn, "d4e5f6")).await.unwrap();
        assert_eq!(count(&db).await, 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_reads_see_only_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("tracking.db")).await.unwrap();
        let (inserted, wait_inserted) = tokio::sync::oneshot::channel::<()>();
        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let writer = {
            let db = db.clone();
            tokio::spawn(async move {
                db.execute(move |conn| {
                    Box::pin(async move {
                        insert(conn, "a1b2c3").await?;
                        _ = inserted.send(());
                        _ = released.await;
                        Ok(())
                    })
                })
                .await
            })
        };

        wait_inserted.await.unwrap();
        // The write transaction is open and holds an uncommitted row.
        let during = tokio::time::timeout(Duration::from_secs(1), count(&db)).await.expect("read blocked by writer");
        assert_eq!(during, 0);

        release.send(()).unwrap();
        writer.await.unwrap().unwrap();
        assert_eq!(count(&db).await, 1);
        db.close().await;
    }
}
