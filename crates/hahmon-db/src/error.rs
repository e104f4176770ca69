//! Error types for the activity store.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`sqlx`] and I/O errors with the location or key the operation was
//! working on.

use std::path::PathBuf;

use hahmon_types::topic_label;

/// Errors that can occur in the activity store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The location already holds an activity store.
    #[error("activity store already exists at {}", .path.display())]
    AlreadyExists {
        /// Location of the existing store.
        path: PathBuf,
    },

    /// The location cannot hold a store (a directory, permission denied, ...).
    #[error("cannot use {} as an activity store: {source}", .path.display())]
    Io {
        /// The rejected location.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// `SQLite` refused to open the store.
    #[error("failed to open activity store at {}: {source}", .path.display())]
    Open {
        /// Location of the store.
        path: PathBuf,
        /// The underlying `SQLite` error.
        source: sqlx::Error,
    },

    /// A `SQLite` statement failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// More than one record matches a key that must be unique.
    #[error(
        "{count} records match host {host:?} topic {}; refusing to pick one",
        topic_label(.topic.as_deref())
    )]
    Ambiguous {
        /// Host part of the key.
        host: String,
        /// Topic part of the key.
        topic: Option<String>,
        /// Number of matching records.
        count: i64,
    },

    /// The host part of a key is not usable.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A record timeout must be at least one second.
    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(u32),

    /// A stored row could not be turned into a record.
    #[error("invalid stored record for host {host:?}: {reason}")]
    InvalidRecord {
        /// Host of the offending row.
        host: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl DbError {
    /// Whether the error reports a key matching several records.
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }

    /// Whether the error comes from storage rather than from the caller.
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Open { .. } | Self::Sqlite(_) | Self::InvalidRecord { .. }
        )
    }
}
