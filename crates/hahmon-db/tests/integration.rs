//! Integration tests for the `hahmon-db` activity store.
//!
//! Every test works on a real `SQLite` file inside its own temporary
//! directory, so nothing here needs external services.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;

use hahmon_db::{ActivityDb, ActivityStore, DbError, SqliteConfig};
use hahmon_types::{DeleteOutcome, InsertOutcome, ManualClock, Pattern, Status, UpdateOutcome};
use tempfile::TempDir;

/// Fixed registration time used by the manual clock.
const T0: i64 = 1_553_831_160;

// =============================================================================
// Helpers
// =============================================================================

async fn setup() -> (TempDir, SqliteConfig, ActivityDb, Arc<ManualClock>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = SqliteConfig::new(dir.path().join("test.db"));
    ActivityDb::initialize(&config)
        .await
        .expect("Failed to create store");
    let db = ActivityDb::open(&config).await.expect("Failed to open store");
    (dir, config, db, Arc::new(ManualClock::new(T0)))
}

// =============================================================================
// Store creation
// =============================================================================

#[tokio::test]
async fn create_twice_reports_already_exists_and_keeps_records() {
    let (_dir, config, db, clock) = setup().await;
    let store = db.store().with_clock(clock);
    assert_eq!(
        store.insert("oak", None, 300).await.unwrap(),
        InsertOutcome::Created
    );
    db.close().await;

    let err = ActivityDb::initialize(&config).await.unwrap_err();
    assert!(matches!(err, DbError::AlreadyExists { .. }), "got {err:?}");

    let db = ActivityDb::open(&config).await.unwrap();
    let records = db.store().query(&Pattern::All, &Pattern::All).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].host, "oak");
    db.close().await;
}

#[tokio::test]
async fn create_on_directory_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteConfig::new(dir.path());
    let err = ActivityDb::initialize(&config).await.unwrap_err();
    assert!(matches!(err, DbError::Io { .. }), "got {err:?}");
    assert!(err.is_storage());
}

#[tokio::test]
async fn create_in_missing_directory_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteConfig::new(dir.path().join("no/such/dir/test.db"));
    let err = ActivityDb::initialize(&config).await.unwrap_err();
    assert!(err.is_storage(), "got {err:?}");
}

#[tokio::test]
async fn create_adopts_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.db");
    std::fs::write(&path, b"").unwrap();

    let config = SqliteConfig::new(&path);
    ActivityDb::initialize(&config).await.unwrap();
    let db = ActivityDb::open(&config).await.unwrap();
    assert_eq!(db.store().match_count("oak", None).await.unwrap(), 0);
    db.close().await;
}

// =============================================================================
// Uniqueness
// =============================================================================

#[tokio::test]
async fn second_insert_is_duplicate_and_changes_nothing() {
    let (_dir, _config, db, clock) = setup().await;
    let store = db.store().with_clock(clock.clone());

    assert_eq!(
        store.insert("oak", Some("/some/topic"), 500).await.unwrap(),
        InsertOutcome::Created
    );
    clock.advance(60);
    assert_eq!(
        store.insert("oak", Some("/some/topic"), 900).await.unwrap(),
        InsertOutcome::Duplicate
    );

    let record = store.get("oak", Some("/some/topic")).await.unwrap().unwrap();
    assert_eq!(record.last_seen, T0);
    assert_eq!(record.timeout_seconds, 500);
    assert_eq!(store.match_count("oak", Some("/some/topic")).await.unwrap(), 1);
    db.close().await;
}

#[tokio::test]
async fn concurrent_inserts_create_one_record() {
    let (_dir, _config, db, _clock) = setup().await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.store().insert("maple", None, 300).await
        }));
    }

    let mut created = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            InsertOutcome::Created => created += 1,
            InsertOutcome::Duplicate => duplicates += 1,
        }
    }
    assert_eq!(created, 1);
    assert_eq!(duplicates, 9);
    assert_eq!(db.store().match_count("maple", None).await.unwrap(), 1);
    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn separate_handles_wait_for_each_other() {
    let (_dir, config, monitor_db, _clock) = setup().await;
    monitor_db.store().insert("oak", None, 300).await.unwrap();
    let edit_db = ActivityDb::open(&config).await.unwrap();

    let touches = tokio::spawn({
        let db = monitor_db.clone();
        async move {
            let mut failures = Vec::new();
            for i in 0..200 {
                if let Err(e) = db.store().touch("oak", None, T0 + i).await {
                    failures.push(e.to_string());
                }
            }
            failures
        }
    });
    let inserts = tokio::spawn({
        let db = edit_db.clone();
        async move {
            let mut failures = Vec::new();
            for i in 0..200 {
                if let Err(e) = db.store().insert(&format!("host-{i}"), None, 300).await {
                    failures.push(e.to_string());
                }
            }
            failures
        }
    });

    assert_eq!(touches.await.unwrap(), Vec::<String>::new());
    assert_eq!(inserts.await.unwrap(), Vec::<String>::new());

    let records = edit_db
        .store()
        .query(&Pattern::All, &Pattern::All)
        .await
        .unwrap();
    assert_eq!(records.len(), 201);
    let oak = monitor_db.store().get("oak", None).await.unwrap().unwrap();
    assert_eq!(oak.last_seen, T0 + 199);

    edit_db.close().await;
    monitor_db.close().await;
}

#[tokio::test]
async fn key_index_rejects_raw_duplicates() {
    let (_dir, _config, db, _clock) = setup().await;
    db.store().insert("oak", None, 300).await.unwrap();

    let raw = sqlx::query(
        "INSERT INTO host_activity (host, topic, last_seen, timeout, status) VALUES ('oak', NULL, 0, 300, 'unknown')",
    )
    .execute(db.pool())
    .await;
    match raw {
        Err(sqlx::Error::Database(e)) => assert!(e.is_unique_violation()),
        other => panic!("expected unique violation, got {other:?}"),
    }
    db.close().await;
}

#[tokio::test]
async fn invalid_keys_and_timeouts_are_rejected() {
    let (_dir, _config, db, _clock) = setup().await;
    let store = db.store();
    assert!(matches!(
        store.insert("", None, 300).await,
        Err(DbError::InvalidKey(_))
    ));
    assert!(matches!(
        store.insert("oak", None, 0).await,
        Err(DbError::InvalidTimeout(0))
    ));
    store.insert("oak", None, 300).await.unwrap();
    assert!(matches!(
        store.set_timeout("oak", None, 0).await,
        Err(DbError::InvalidTimeout(0))
    ));
    db.close().await;
}

// =============================================================================
// Host-level (no topic) records
// =============================================================================

#[tokio::test]
async fn missing_topic_is_its_own_key() {
    let (_dir, _config, db, _clock) = setup().await;
    let store = db.store();

    assert_eq!(store.insert("oak", None, 300).await.unwrap(), InsertOutcome::Created);
    assert_eq!(store.insert("oak", Some("x"), 300).await.unwrap(), InsertOutcome::Created);
    assert_eq!(store.insert("oak", Some(""), 300).await.unwrap(), InsertOutcome::Created);

    assert_eq!(store.match_count("oak", None).await.unwrap(), 1);
    assert_eq!(store.match_count("oak", Some("x")).await.unwrap(), 1);
    assert_eq!(store.match_count("oak", Some("")).await.unwrap(), 1);

    assert_eq!(store.delete("oak", Some("x")).await.unwrap(), DeleteOutcome::Deleted);
    assert_eq!(store.match_count("oak", None).await.unwrap(), 1);
    assert_eq!(store.match_count("oak", Some("")).await.unwrap(), 1);

    assert_eq!(store.delete("oak", None).await.unwrap(), DeleteOutcome::Deleted);
    assert_eq!(store.delete("oak", None).await.unwrap(), DeleteOutcome::NotFound);
    assert_eq!(store.match_count("oak", Some("")).await.unwrap(), 1);
    db.close().await;
}

// =============================================================================
// Edit scenario
// =============================================================================

#[tokio::test]
async fn add_set_timeout_list_delete() {
    let (_dir, _config, db, clock) = setup().await;
    let store = db.store().with_clock(clock);

    assert_eq!(store.insert("oak", None, 300).await.unwrap(), InsertOutcome::Created);
    assert_eq!(
        store.insert("oak", Some("/some/topic"), 500).await.unwrap(),
        InsertOutcome::Created
    );
    assert_eq!(
        store.set_timeout("oak", None, 350).await.unwrap(),
        UpdateOutcome::Updated
    );

    let records = store
        .query(&Pattern::Like("oak".to_owned()), &Pattern::All)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].topic, None);
    assert_eq!(records[0].timeout_seconds, 350);
    assert_eq!(records[0].last_seen, T0);
    assert_eq!(records[0].status, Status::Unknown);
    assert_eq!(records[1].topic.as_deref(), Some("/some/topic"));
    assert_eq!(records[1].timeout_seconds, 500);

    assert_eq!(store.delete("oak", None).await.unwrap(), DeleteOutcome::Deleted);
    let records = store.query(&Pattern::All, &Pattern::All).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].topic.as_deref(), Some("/some/topic"));
    db.close().await;
}

#[tokio::test]
async fn operations_on_missing_keys_report_not_found() {
    let (_dir, _config, db, _clock) = setup().await;
    let store = db.store();
    store.insert("oak", Some("/some/topic"), 500).await.unwrap();

    assert_eq!(store.delete("oak", None).await.unwrap(), DeleteOutcome::NotFound);
    assert_eq!(
        store.set_timeout("oak", None, 10).await.unwrap(),
        UpdateOutcome::NotFound
    );
    assert_eq!(
        store.touch("elm", Some("/some/topic"), T0).await.unwrap(),
        UpdateOutcome::NotFound
    );
    assert!(store.get("oak", None).await.unwrap().is_none());
    db.close().await;
}

// =============================================================================
// Activity and status
// =============================================================================

#[tokio::test]
async fn touch_moves_last_seen_and_keeps_timeout() {
    let (_dir, _config, db, clock) = setup().await;
    let store = db.store().with_clock(clock.clone());
    store.insert("oak", Some("/t"), 500).await.unwrap();

    let t1 = T0 + 1_000;
    assert_eq!(
        store.touch("oak", Some("/t"), t1).await.unwrap(),
        UpdateOutcome::Updated
    );
    clock.set(t1);

    let record = store.get("oak", Some("/t")).await.unwrap().unwrap();
    assert_eq!(record.last_seen, t1);
    assert_eq!(record.timeout_seconds, 500);
    assert_eq!(record.status, Status::Alive);
    db.close().await;
}

#[tokio::test]
async fn status_goes_unknown_alive_late() {
    let (_dir, _config, db, clock) = setup().await;
    let store = db.store().with_clock(clock.clone());
    store.insert("oak", None, 60).await.unwrap();

    assert_eq!(status_of(&store).await, Status::Unknown);

    clock.advance(30);
    store.touch("oak", None, T0 + 30).await.unwrap();
    assert_eq!(status_of(&store).await, Status::Alive);

    clock.advance(61);
    assert_eq!(status_of(&store).await, Status::Late);
    db.close().await;
}

async fn status_of(store: &ActivityStore<'_>) -> Status {
    store.get("oak", None).await.unwrap().unwrap().status
}

#[tokio::test]
async fn never_reporting_record_becomes_late() {
    let (_dir, _config, db, clock) = setup().await;
    let store = db.store().with_clock(clock.clone());
    store.insert("oak", None, 60).await.unwrap();

    clock.advance(61);
    let record = store.get("oak", None).await.unwrap().unwrap();
    assert_eq!(record.status, Status::Late);
    db.close().await;
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn query_patterns() {
    let (_dir, _config, db, _clock) = setup().await;
    let store = db.store();
    store.insert("oak", None, 300).await.unwrap();
    store.insert("oak", Some("/some/topic"), 300).await.unwrap();
    store.insert("maple", Some("/another/topic"), 300).await.unwrap();
    store.insert("olive", None, 300).await.unwrap();

    let hosts = |records: Vec<hahmon_types::ActivityRecord>| {
        records
            .into_iter()
            .map(|r| format!("{} {}", r.host, r.topic_label()))
            .collect::<Vec<_>>()
    };

    let all = store.query(&Pattern::All, &Pattern::All).await.unwrap();
    assert_eq!(
        hosts(all),
        vec![
            "oak None",
            "oak /some/topic",
            "maple /another/topic",
            "olive None"
        ]
    );

    let o_hosts = store
        .query(&Pattern::Like("o%".to_owned()), &Pattern::All)
        .await
        .unwrap();
    assert_eq!(hosts(o_hosts), vec!["oak None", "oak /some/topic", "olive None"]);

    // A topic pattern other than the wildcard never matches host-level records.
    let any_topic = store
        .query(&Pattern::All, &Pattern::Like("%topic".to_owned()))
        .await
        .unwrap();
    assert_eq!(hosts(any_topic), vec!["oak /some/topic", "maple /another/topic"]);

    let host_level = store.query(&Pattern::All, &Pattern::HostOnly).await.unwrap();
    assert_eq!(hosts(host_level), vec!["oak None", "olive None"]);

    let none = store
        .query(&Pattern::Like("elm".to_owned()), &Pattern::All)
        .await
        .unwrap();
    assert!(none.is_empty());
    db.close().await;
}

#[tokio::test]
async fn patterns_are_bound_not_spliced() {
    let (_dir, _config, db, _clock) = setup().await;
    let store = db.store();
    let hostile = "oak' OR '1'='1";
    assert_eq!(store.insert(hostile, None, 300).await.unwrap(), InsertOutcome::Created);
    store.insert("maple", None, 300).await.unwrap();

    let records = store
        .query(&Pattern::Like(hostile.to_owned()), &Pattern::All)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].host, hostile);
    db.close().await;
}

// =============================================================================
// Ambiguity guard
// =============================================================================

#[tokio::test]
async fn duplicated_key_is_never_resolved_arbitrarily() {
    let (_dir, _config, db, _clock) = setup().await;

    // Simulate a store corrupted before the key index existed.
    sqlx::query("DROP INDEX host_activity_key")
        .execute(db.pool())
        .await
        .unwrap();
    for last_seen in [100_i64, 200] {
        sqlx::query(
            "INSERT INTO host_activity (host, topic, last_seen, timeout, status) VALUES ('oak', NULL, ?1, 300, 'unknown')",
        )
        .bind(last_seen)
        .execute(db.pool())
        .await
        .unwrap();
    }

    let store = db.store();
    assert_eq!(store.match_count("oak", None).await.unwrap(), 2);

    assert!(matches!(
        store.insert("oak", None, 300).await,
        Err(DbError::Ambiguous { count: 2, .. })
    ));
    assert!(matches!(
        store.touch("oak", None, 999).await,
        Err(DbError::Ambiguous { count: 2, .. })
    ));
    assert!(matches!(
        store.set_timeout("oak", None, 10).await,
        Err(DbError::Ambiguous { count: 2, .. })
    ));
    assert!(matches!(
        store.delete("oak", None).await,
        Err(DbError::Ambiguous { count: 2, .. })
    ));
    assert!(matches!(
        store.get("oak", None).await,
        Err(DbError::Ambiguous { count: 2, .. })
    ));

    // Both rows are untouched.
    let records = store.query(&Pattern::All, &Pattern::All).await.unwrap();
    let seen: Vec<(i64, u32)> = records
        .iter()
        .map(|r| (r.last_seen, r.timeout_seconds))
        .collect();
    assert_eq!(seen, vec![(100, 300), (200, 300)]);

    // Other keys of the same host still work.
    assert_eq!(
        store.insert("oak", Some("/t"), 300).await.unwrap(),
        InsertOutcome::Created
    );
    db.close().await;
}
