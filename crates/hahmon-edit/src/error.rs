//! Command failures and how they map to exit codes.

use hahmon_db::DbError;
use hahmon_types::topic_label;

use crate::exit_code::ExitCode;

/// Why a command did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// `add` found the key already watched.
    #[error("{host} {} is already watched", topic_label(.topic.as_deref()))]
    Duplicate {
        /// Host part of the key.
        host: String,
        /// Topic part of the key.
        topic: Option<String>,
    },

    /// `delete` or `set-timeout` found no record with the key.
    #[error("{host} {} is not watched", topic_label(.topic.as_deref()))]
    NotFound {
        /// Host part of the key.
        host: String,
        /// Topic part of the key.
        topic: Option<String>,
    },

    /// The activity store refused or failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Writing to standard output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// Records could not be encoded as JSON.
    #[error("failed to encode records: {0}")]
    Json(#[from] serde_json::Error),
}

impl CommandError {
    /// Exit code reported for this failure.
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Duplicate { .. }
            | Self::NotFound { .. }
            | Self::Db(DbError::AlreadyExists { .. }) => ExitCode::Status,
            Self::Db(e) if e.is_ambiguous() => ExitCode::DataError,
            Self::Db(e) if e.is_storage() => ExitCode::IoError,
            // Bad host or timeout: the caller's mistake.
            Self::Db(_) => ExitCode::Usage,
            Self::Output(_) => ExitCode::IoError,
            Self::Json(_) => ExitCode::Software,
        }
    }
}
