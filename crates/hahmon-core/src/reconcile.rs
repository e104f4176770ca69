//! Mapping inbound activity events onto watched records.
//!
//! An event for `(host, topic)` refreshes exactly one record, chosen in
//! priority order:
//!
//! 1. the record keyed by `(host, topic)`;
//! 2. otherwise the host-level record keyed by `(host, None)`.
//!
//! If neither exists the event is dropped. A key that matches more than one
//! record is reported as ambiguous and nothing is written for it.
//!
//! `last_seen` is stamped with the store's clock when the event is
//! processed. The timestamp claimed in the payload is only logged.

use hahmon_db::{ActivityStore, DbError};
use hahmon_types::{ActivityEvent, ParseError, UpdateOutcome, topic_label};

/// Errors produced while reconciling an event.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The message could not be parsed into an event.
    #[error("malformed message: {0}")]
    Parse(#[from] ParseError),

    /// Several records share the key the event resolved to.
    #[error("{count} records match host {host:?} topic {}; event dropped", topic_label(.topic.as_deref()))]
    Ambiguous {
        /// Host part of the key.
        host: String,
        /// Topic part of the key.
        topic: Option<String>,
        /// Number of matching records.
        count: i64,
    },

    /// The store failed.
    #[error("activity store error: {0}")]
    Store(DbError),
}

impl From<DbError> for ReconcileError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Ambiguous { host, topic, count } => Self::Ambiguous { host, topic, count },
            other => Self::Store(other),
        }
    }
}

/// What an event did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The named record was refreshed.
    Updated {
        /// Host of the refreshed record.
        host: String,
        /// Topic of the refreshed record; `None` for the host-level record.
        topic: Option<String>,
    },
    /// No record watches this host.
    NotFound,
}

/// Applies activity events to an [`ActivityStore`].
pub struct Reconciler<'a> {
    store: ActivityStore<'a>,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler writing to `store`.
    pub const fn new(store: ActivityStore<'a>) -> Self {
        Self { store }
    }

    /// The store events are applied to.
    pub const fn store(&self) -> &ActivityStore<'a> {
        &self.store
    }

    /// Refresh the record watching `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Ambiguous`] if the key tried matches several
    /// records and [`ReconcileError::Store`] if the store fails.
    pub async fn apply(&self, event: &ActivityEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let now = self.store.now();
        tracing::debug!(
            host = %event.host,
            topic = topic_label(event.topic.as_deref()),
            claimed_at = event.claimed_at,
            now,
            "Reconciling event"
        );

        if let Some(topic) = event.topic.as_deref() {
            let outcome = self.store.touch(&event.host, Some(topic), now).await?;
            if outcome == UpdateOutcome::Updated {
                return Ok(ReconcileOutcome::Updated {
                    host: event.host.clone(),
                    topic: Some(topic.to_owned()),
                });
            }
        }

        match self.store.touch(&event.host, None, now).await? {
            UpdateOutcome::Updated => Ok(ReconcileOutcome::Updated {
                host: event.host.clone(),
                topic: None,
            }),
            UpdateOutcome::NotFound => Ok(ReconcileOutcome::NotFound),
        }
    }

    /// Parse a message from its topic and payload, then apply it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Parse`] for a malformed message, otherwise
    /// the errors of [`Reconciler::apply`].
    pub async fn handle_message(
        &self,
        topic: &str,
        payload: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let event = ActivityEvent::parse(topic, payload)?;
        self.apply(&event).await
    }

    /// Parse one `mosquitto_sub -v` line, then apply it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Parse`] for a malformed line, otherwise the
    /// errors of [`Reconciler::apply`].
    pub async fn handle_line(&self, line: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let event = ActivityEvent::parse_line(line)?;
        self.apply(&event).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use std::sync::Arc;

    use hahmon_db::{ActivityDb, SqliteConfig};
    use hahmon_types::{InsertOutcome, ManualClock, Status};

    use super::*;

    const T0: i64 = 1_553_831_160;

    async fn setup() -> (tempfile::TempDir, ActivityDb, Arc<ManualClock>) {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig::new(dir.path().join("test.db"));
        ActivityDb::initialize(&config).await.unwrap();
        let db = ActivityDb::open(&config).await.unwrap();
        (dir, db, Arc::new(ManualClock::new(T0)))
    }

    #[tokio::test]
    async fn sub_topic_event_falls_back_to_host_record() {
        let (_dir, db, clock) = setup().await;
        let store = db.store().with_clock(clock.clone());
        store.insert("oak", None, 300).await.unwrap();
        store.insert("oak", Some("/some/topic"), 500).await.unwrap();

        clock.advance(60);
        let reconciler = Reconciler::new(store);
        let outcome = reconciler
            .handle_message(
                "home_automation/oak/roamer/outside_temp_humidity",
                "1553831160, 47.54, 76.44",
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Updated {
                host: "oak".to_owned(),
                topic: None
            }
        );

        let store = reconciler.store();
        let host = store.get("oak", None).await.unwrap().unwrap();
        let topic = store.get("oak", Some("/some/topic")).await.unwrap().unwrap();
        assert_eq!(host.last_seen, T0 + 60);
        assert_eq!(host.status, Status::Alive);
        assert_eq!(topic.last_seen, T0);
        assert_eq!(topic.status, Status::Unknown);
        db.close().await;
    }

    #[tokio::test]
    async fn exact_topic_wins_over_host_record() {
        let (_dir, db, clock) = setup().await;
        let store = db.store().with_clock(clock.clone());
        store.insert("oak", None, 300).await.unwrap();
        store.insert("oak", Some("/some/topic"), 500).await.unwrap();

        clock.advance(10);
        let reconciler = Reconciler::new(store);
        let outcome = reconciler
            .handle_message("home_automation/oak/some/topic", "1553831170")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Updated {
                host: "oak".to_owned(),
                topic: Some("/some/topic".to_owned())
            }
        );

        let store = reconciler.store();
        let topic = store.get("oak", Some("/some/topic")).await.unwrap().unwrap();
        let host = store.get("oak", None).await.unwrap().unwrap();
        assert_eq!(topic.last_seen, T0 + 10);
        assert_eq!(topic.timeout_seconds, 500);
        assert_eq!(host.last_seen, T0);
        db.close().await;
    }

    #[tokio::test]
    async fn topic_only_registration_ignores_other_topics() {
        let (_dir, db, clock) = setup().await;
        let store = db.store().with_clock(clock);
        store.insert("sodus", Some("/master_bedroom/temp_humidity"), 300).await.unwrap();

        let reconciler = Reconciler::new(store);
        let outcome = reconciler
            .handle_message("home_automation/sodus/garage/door", "1553884981 open")
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotFound);
        db.close().await;
    }

    #[tokio::test]
    async fn unknown_host_is_a_silent_miss() {
        let (_dir, db, clock) = setup().await;
        let store = db.store().with_clock(clock.clone());
        store.insert("oak", None, 300).await.unwrap();

        clock.advance(30);
        let reconciler = Reconciler::new(store);
        let outcome = reconciler
            .handle_line("home_automation/brandywine/roamer/outside_temp_humidity 1553831160, 47.54")
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotFound);

        let records = reconciler
            .store()
            .query(&hahmon_types::Pattern::All, &hahmon_types::Pattern::All)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].last_seen, T0);
        db.close().await;
    }

    #[tokio::test]
    async fn host_level_event_touches_host_record() {
        let (_dir, db, clock) = setup().await;
        let store = db.store().with_clock(clock.clone());
        store.insert("oak", None, 300).await.unwrap();

        clock.advance(5);
        let reconciler = Reconciler::new(store);
        let outcome = reconciler.handle_message("ha/oak", "1").await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Updated {
                host: "oak".to_owned(),
                topic: None
            }
        );
        let record = reconciler.store().get("oak", None).await.unwrap().unwrap();
        assert_eq!(record.last_seen, T0 + 5);
        db.close().await;
    }

    #[tokio::test]
    async fn claimed_timestamp_is_not_trusted() {
        let (_dir, db, clock) = setup().await;
        let store = db.store().with_clock(clock.clone());
        store.insert("oak", None, 300).await.unwrap();

        clock.advance(100);
        let reconciler = Reconciler::new(store);
        reconciler.handle_message("ha/oak/x", "9999999999").await.unwrap();
        let record = reconciler.store().get("oak", None).await.unwrap().unwrap();
        assert_eq!(record.last_seen, T0 + 100);
        db.close().await;
    }

    #[tokio::test]
    async fn malformed_message_is_a_parse_error() {
        let (_dir, db, clock) = setup().await;
        let reconciler = Reconciler::new(db.store().with_clock(clock));
        let err = reconciler
            .handle_message("home_automation", "1553831160")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Parse(ParseError::MissingHost { .. })));

        let err = reconciler
            .handle_message("home_automation/oak/x", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Parse(ParseError::InvalidTimestamp { .. })));
        db.close().await;
    }

    #[tokio::test]
    async fn duplicate_host_records_are_ambiguous() {
        let (_dir, db, clock) = setup().await;
        let store = db.store().with_clock(clock.clone());
        assert_eq!(
            store.insert("oak", Some("/x"), 300).await.unwrap(),
            InsertOutcome::Created
        );
        sqlx_corrupt(&db).await;

        clock.advance(20);
        let reconciler = Reconciler::new(store);

        // The exact topic record is still unique and wins.
        let outcome = reconciler.handle_message("ha/oak/x", "1").await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Updated { topic: Some(_), .. }));

        // Falling back to the duplicated host-level key refuses to pick one.
        let err = reconciler.handle_message("ha/oak/y", "1").await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Ambiguous { ref host, topic: None, count: 2 } if host == "oak"
        ));
        db.close().await;
    }

    /// Drop the key index and add two host-level rows for `oak`.
    async fn sqlx_corrupt(db: &ActivityDb) {
        sqlx::query("DROP INDEX host_activity_key")
            .execute(db.pool())
            .await
            .unwrap();
        for _ in 0..2 {
            sqlx::query(
                "INSERT INTO host_activity (host, topic, last_seen, timeout, status) \
                 VALUES ('oak', NULL, 0, 300, 'unknown')",
            )
            .execute(db.pool())
            .await
            .unwrap();
        }
    }

    #[test]
    fn store_errors_are_split_from_ambiguity() {
        let ambiguous = ReconcileError::from(DbError::Ambiguous {
            host: "oak".to_owned(),
            topic: None,
            count: 3,
        });
        assert!(matches!(ambiguous, ReconcileError::Ambiguous { count: 3, .. }));

        let store = ReconcileError::from(DbError::InvalidKey("empty host".to_owned()));
        assert!(matches!(store, ReconcileError::Store(DbError::InvalidKey(_))));
    }
}
