//! `SQLite` handle for the activity store.
//!
//! The store is a single `SQLite` file holding one table, `host_activity`.
//! A handle is acquired for a unit of work and closed when it is done; there
//! is no process-wide connection.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! so no database is needed at build time. All queries are parameterized.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};

use crate::activity_store::{ActivityStore, BEGIN_WRITE};
use crate::error::DbError;

/// Default location of the store.
pub const DEFAULT_PATH: &str = "hahmon.db";

/// Default maximum number of pooled connections (a single writer).
const DEFAULT_MAX_CONNECTIONS: u32 = 1;

/// Default time to wait on a locked database, in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default time to wait for a pooled connection, in seconds.
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Table definition. `timeout` is checked positive at the storage layer too.
const CREATE_TABLE: &str = r"
CREATE TABLE host_activity (
    host      TEXT    NOT NULL,
    topic     TEXT,
    last_seen INTEGER NOT NULL,
    timeout   INTEGER NOT NULL CHECK (timeout > 0),
    status    TEXT    NOT NULL
)";

/// Uniqueness of `(host, topic)` with a missing topic as its own value,
/// distinct from the empty string.
const CREATE_KEY_INDEX: &str = r"
CREATE UNIQUE INDEX host_activity_key
    ON host_activity (host, topic IS NULL, IFNULL(topic, ''))";

/// Configuration for the `SQLite` store.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path of the database file.
    pub path: PathBuf,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// How long a statement waits on a lock held by another connection.
    pub busy_timeout: Duration,
    /// How long to wait for a free pooled connection.
    pub acquire_timeout: Duration,
}

impl SqliteConfig {
    /// Create a configuration for the store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the busy timeout.
    #[must_use]
    pub const fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PATH)
    }
}

/// Open handle on an activity store.
///
/// Wraps a [`sqlx::SqlitePool`]. Call [`ActivityDb::close`] when the unit of
/// work is done.
#[derive(Debug, Clone)]
pub struct ActivityDb {
    pool: SqlitePool,
    path: PathBuf,
}

impl ActivityDb {
    /// Create a new, empty store at the configured location.
    ///
    /// An existing file that holds no store yet (for example an empty file)
    /// is initialized in place. Nothing is modified when the location
    /// already holds a store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::AlreadyExists`] if the location already holds a
    /// store, [`DbError::Io`] if the location is a directory or cannot be
    /// inspected, and [`DbError::Open`] if `SQLite` cannot create the file.
    pub async fn initialize(config: &SqliteConfig) -> Result<(), DbError> {
        let create = match tokio::fs::metadata(&config.path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(DbError::Io {
                    path: config.path.clone(),
                    source: io::Error::new(io::ErrorKind::IsADirectory, "location is a directory"),
                });
            }
            Ok(_) => false,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(source) => {
                return Err(DbError::Io {
                    path: config.path.clone(),
                    source,
                });
            }
        };

        let db = Self::connect(config, create).await?;
        let result = db.install_schema().await;
        db.close().await;
        result?;

        tracing::info!(path = %config.path.display(), "Created activity store");
        Ok(())
    }

    /// Open an existing store.
    ///
    /// The schema is never altered here, so a store that already violates
    /// key uniqueness still opens and reports the affected keys as
    /// ambiguous.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Open`] if the file does not exist or cannot be
    /// opened.
    pub async fn open(config: &SqliteConfig) -> Result<Self, DbError> {
        let db = Self::connect(config, false).await?;
        tracing::debug!(path = %config.path.display(), "Opened activity store");
        Ok(db)
    }

    /// Open the store at `path` with default settings.
    ///
    /// Convenience wrapper around [`ActivityDb::open`] with
    /// [`SqliteConfig::new`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be opened.
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Self::open(&SqliteConfig::new(path.as_ref())).await
    }

    async fn connect(config: &SqliteConfig, create: bool) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|source| DbError::Open {
                path: config.path.clone(),
                source,
            })?;

        Ok(Self {
            pool,
            path: config.path.clone(),
        })
    }

    /// Create the table and key index unless the table already exists.
    async fn install_schema(&self) -> Result<(), DbError> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;
        if has_table(&mut tx).await? {
            return Err(DbError::AlreadyExists {
                path: self.path.clone(),
            });
        }
        sqlx::query(CREATE_TABLE).execute(&mut *tx).await?;
        sqlx::query(CREATE_KEY_INDEX).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Operations on the `host_activity` table, stamped with the system clock.
    pub fn store(&self) -> ActivityStore<'_> {
        ActivityStore::new(&self.pool)
    }

    /// Return a reference to the underlying [`SqlitePool`].
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Location of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!(path = %self.path.display(), "Activity store closed");
    }
}

/// Whether the `host_activity` table exists.
async fn has_table(conn: &mut SqliteConnection) -> Result<bool, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'host_activity'",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_single_writer() {
        let config = SqliteConfig::default();
        assert_eq!(config.path, PathBuf::from(DEFAULT_PATH));
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn config_builders_override_defaults() {
        let config = SqliteConfig::new("/tmp/x.db")
            .with_max_connections(4)
            .with_busy_timeout(Duration::from_millis(250));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn initialize_creates_table_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig::new(dir.path().join("hahmon.db"));
        ActivityDb::initialize(&config).await.unwrap();

        let db = ActivityDb::open(&config).await.unwrap();
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE tbl_name = 'host_activity' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        db.close().await;
        assert_eq!(names, vec!["host_activity", "host_activity_key"]);
    }

    #[tokio::test]
    async fn open_does_not_create_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let err = ActivityDb::open_path(&path).await.unwrap_err();
        assert!(matches!(err, DbError::Open { .. }));
        assert!(!path.exists());
    }
}
