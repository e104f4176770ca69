//! Operations on the `host_activity` table.
//!
//! Every record is keyed by `(host, topic)`, where a missing topic is a key
//! value of its own. Key comparisons use `SQLite`'s `IS` operator so a bound
//! `NULL` only ever matches a `NULL` topic.
//!
//! Each check-then-act operation runs as one `BEGIN IMMEDIATE` transaction:
//! the write lock is taken up front (waiting out the busy timeout if another
//! process holds it), the key is counted and, when exactly one record
//! matches (or none, for inserts), the write happens before the transaction
//! commits. A key that matches more
//! than one record is reported as [`DbError::Ambiguous`] and left untouched.

use std::sync::Arc;

use hahmon_types::{
    ActivityRecord, Clock, DeleteOutcome, InsertOutcome, Pattern, Status, SystemClock,
    UpdateOutcome, topic_label,
};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::error::DbError;

/// Takes the write lock when the transaction starts.
pub(crate) const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

const COUNT_KEY: &str = "SELECT COUNT(*) FROM host_activity WHERE host = ?1 AND topic IS ?2";

const SELECT_KEY: &str = r"
SELECT host, topic, last_seen, timeout, status
  FROM host_activity
 WHERE host = ?1 AND topic IS ?2";

const SELECT_MATCHING: &str = r"
SELECT host, topic, last_seen, timeout, status
  FROM host_activity
 WHERE (?1 IS NULL OR host LIKE ?1)
   AND (?2 IS NULL OR topic LIKE ?2)
   AND (?3 = 0 OR topic IS NULL)
 ORDER BY rowid";

/// Operations on the `host_activity` table.
pub struct ActivityStore<'a> {
    pool: &'a SqlitePool,
    clock: Arc<dyn Clock>,
}

impl<'a> ActivityStore<'a> {
    /// Create a store bound to a connection pool, stamped with the system clock.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for registration times and derived status.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Count the records whose key is exactly `(host, topic)`.
    ///
    /// Anything above 1 means uniqueness was already violated; callers must
    /// treat that as ambiguous rather than pick a record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn match_count(&self, host: &str, topic: Option<&str>) -> Result<i64, DbError> {
        let mut conn = self.pool.acquire().await?;
        count_key(&mut conn, host, topic).await
    }

    /// Start watching `(host, topic)`.
    ///
    /// The new record is stamped with the current time and starts out
    /// [`Status::Unknown`]. An existing record is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidKey`] for an empty host,
    /// [`DbError::InvalidTimeout`] for a zero timeout,
    /// [`DbError::Ambiguous`] if the key already matches several records,
    /// and [`DbError::Sqlite`] if a statement fails.
    pub async fn insert(
        &self,
        host: &str,
        topic: Option<&str>,
        timeout_seconds: u32,
    ) -> Result<InsertOutcome, DbError> {
        validate_host(host)?;
        validate_timeout(timeout_seconds)?;
        let now = self.clock.now();

        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;
        match count_key(&mut tx, host, topic).await? {
            0 => {}
            1 => {
                tracing::debug!(host, topic = topic_label(topic), "Record already watched");
                return Ok(InsertOutcome::Duplicate);
            }
            count => return Err(ambiguous(host, topic, count)),
        }

        let inserted = sqlx::query(
            r"INSERT INTO host_activity (host, topic, last_seen, timeout, status)
              VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(host)
        .bind(topic)
        .bind(now)
        .bind(i64::from(timeout_seconds))
        .bind(Status::Unknown.as_str())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            // Another writer registered the key between our count and insert.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::debug!(host, topic = topic_label(topic), "Concurrent insert rejected by key index");
                return Ok(InsertOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        tracing::debug!(
            host,
            topic = topic_label(topic),
            timeout_seconds,
            last_seen = now,
            "Watching record"
        );
        Ok(InsertOutcome::Created)
    }

    /// Stop watching `(host, topic)`.
    ///
    /// A `None` topic removes only the host-level record, never the host's
    /// topic records.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Ambiguous`] if the key matches several records and
    /// [`DbError::Sqlite`] if a statement fails.
    pub async fn delete(&self, host: &str, topic: Option<&str>) -> Result<DeleteOutcome, DbError> {
        let query = sqlx::query("DELETE FROM host_activity WHERE host = ?1 AND topic IS ?2")
            .bind(host)
            .bind(topic);
        let outcome = if self.write_one(host, topic, query).await? {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        };
        tracing::debug!(host, topic = topic_label(topic), ?outcome, "Delete record");
        Ok(outcome)
    }

    /// Change the timeout of `(host, topic)`. Nothing else is modified.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidTimeout`] for a zero timeout,
    /// [`DbError::Ambiguous`] if the key matches several records and
    /// [`DbError::Sqlite`] if a statement fails.
    pub async fn set_timeout(
        &self,
        host: &str,
        topic: Option<&str>,
        timeout_seconds: u32,
    ) -> Result<UpdateOutcome, DbError> {
        validate_timeout(timeout_seconds)?;
        let query = sqlx::query("UPDATE host_activity SET timeout = ?3 WHERE host = ?1 AND topic IS ?2")
            .bind(host)
            .bind(topic)
            .bind(i64::from(timeout_seconds));
        let outcome = update_outcome(self.write_one(host, topic, query).await?);
        tracing::debug!(host, topic = topic_label(topic), timeout_seconds, ?outcome, "Set timeout");
        Ok(outcome)
    }

    /// Record activity for `(host, topic)` at `at_time`.
    ///
    /// Sets `last_seen`; the timeout is never changed. Unlike the other
    /// writes this also sets the stored `status` column to `alive`: that
    /// column is only a "has reported" marker, and the status callers see
    /// is always derived from it at read time by [`ActivityRow::into_record`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Ambiguous`] if the key matches several records and
    /// [`DbError::Sqlite`] if a statement fails.
    pub async fn touch(
        &self,
        host: &str,
        topic: Option<&str>,
        at_time: i64,
    ) -> Result<UpdateOutcome, DbError> {
        let query = sqlx::query(
            "UPDATE host_activity SET last_seen = ?3, status = ?4 WHERE host = ?1 AND topic IS ?2",
        )
        .bind(host)
        .bind(topic)
        .bind(at_time)
        .bind(Status::Alive.as_str());
        let outcome = update_outcome(self.write_one(host, topic, query).await?);
        tracing::debug!(host, topic = topic_label(topic), at_time, ?outcome, "Touch record");
        Ok(outcome)
    }

    /// Fetch the record keyed by exactly `(host, topic)`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Ambiguous`] if the key matches several records,
    /// [`DbError::InvalidRecord`] if the stored row is malformed and
    /// [`DbError::Sqlite`] if the query fails.
    pub async fn get(
        &self,
        host: &str,
        topic: Option<&str>,
    ) -> Result<Option<ActivityRecord>, DbError> {
        let mut rows = sqlx::query_as::<_, ActivityRow>(SELECT_KEY)
            .bind(host)
            .bind(topic)
            .fetch_all(self.pool)
            .await?;

        if rows.len() > 1 {
            let count = i64::try_from(rows.len()).unwrap_or(i64::MAX);
            return Err(ambiguous(host, topic, count));
        }
        let now = self.clock.now();
        rows.pop().map(|row| row.into_record(now)).transpose()
    }

    /// List every record matching both patterns, in registration order.
    ///
    /// [`Pattern::All`] as the topic pattern includes host-level records;
    /// a [`Pattern::Like`] topic pattern never matches them.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRecord`] if a stored row is malformed and
    /// [`DbError::Sqlite`] if the query fails.
    pub async fn query(
        &self,
        host: &Pattern,
        topic: &Pattern,
    ) -> Result<Vec<ActivityRecord>, DbError> {
        let rows = sqlx::query_as::<_, ActivityRow>(SELECT_MATCHING)
            .bind(host.like_arg())
            .bind(topic.like_arg())
            .bind(topic.is_host_only())
            .fetch_all(self.pool)
            .await?;

        let now = self.clock.now();
        rows.into_iter().map(|row| row.into_record(now)).collect()
    }

    /// Run `query` against the single record keyed by `(host, topic)`.
    ///
    /// Returns `false` when no record has the key.
    async fn write_one<'q>(
        &self,
        host: &str,
        topic: Option<&str>,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Result<bool, DbError> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;
        match count_key(&mut tx, host, topic).await? {
            0 => return Ok(false),
            1 => {}
            count => return Err(ambiguous(host, topic, count)),
        }
        query.execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(true)
    }
}

/// A row from the `host_activity` table.
///
/// The stored `status` only records whether the row has ever been touched;
/// [`ActivityRow::into_record`] derives the status that is reported.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    /// Publisher host name.
    pub host: String,
    /// Sub-topic, `None` for the host-level record.
    pub topic: Option<String>,
    /// Unix timestamp of registration or latest activity.
    pub last_seen: i64,
    /// Timeout in seconds.
    pub timeout: i64,
    /// Stored status marker.
    pub status: String,
}

impl ActivityRow {
    /// Convert to a record whose status is derived at time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRecord`] if the timeout is out of range or
    /// the stored status is not recognised.
    pub fn into_record(self, now: i64) -> Result<ActivityRecord, DbError> {
        let timeout_seconds = match u32::try_from(self.timeout) {
            Ok(timeout) if timeout > 0 => timeout,
            _ => {
                return Err(DbError::InvalidRecord {
                    host: self.host,
                    reason: format!("timeout {} out of range", self.timeout),
                });
            }
        };
        let stored = match self.status.parse::<Status>() {
            Ok(status) => status,
            Err(e) => {
                return Err(DbError::InvalidRecord {
                    host: self.host,
                    reason: e.to_string(),
                });
            }
        };
        let reported = stored != Status::Unknown;

        Ok(ActivityRecord {
            status: Status::derive(reported, self.last_seen, timeout_seconds, now),
            host: self.host,
            topic: self.topic,
            last_seen: self.last_seen,
            timeout_seconds,
        })
    }
}

async fn count_key(
    conn: &mut SqliteConnection,
    host: &str,
    topic: Option<&str>,
) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(COUNT_KEY)
        .bind(host)
        .bind(topic)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

fn ambiguous(host: &str, topic: Option<&str>, count: i64) -> DbError {
    tracing::warn!(host, topic = topic_label(topic), count, "Key matches several records");
    DbError::Ambiguous {
        host: host.to_owned(),
        topic: topic.map(str::to_owned),
        count,
    }
}

fn validate_host(host: &str) -> Result<(), DbError> {
    if host.trim().is_empty() {
        return Err(DbError::InvalidKey("host must not be empty".to_owned()));
    }
    Ok(())
}

const fn validate_timeout(timeout_seconds: u32) -> Result<(), DbError> {
    if timeout_seconds == 0 {
        return Err(DbError::InvalidTimeout(timeout_seconds));
    }
    Ok(())
}

const fn update_outcome(updated: bool) -> UpdateOutcome {
    if updated {
        UpdateOutcome::Updated
    } else {
        UpdateOutcome::NotFound
    }
}
