//! Watched activity records and their liveness status.
//!
//! An [`ActivityRecord`] is keyed by `(host, topic)`. A `None` topic is its
//! own key value meaning "the host as a whole"; it is distinct from the empty
//! string and from every other topic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Token used wherever a missing topic has to be rendered as text.
pub const NO_TOPIC: &str = "None";

/// Liveness of a watched record.
///
/// Status is computed at read time from `last_seen`, the record timeout and
/// the current time. The value persisted alongside a record only tells
/// whether activity has ever been reported for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Registered but no activity has been reported yet.
    Unknown,
    /// Activity reported within the timeout window.
    Alive,
    /// No activity for longer than the timeout.
    Late,
}

impl Status {
    /// Derive the status of a record at time `now`.
    ///
    /// A record is [`Status::Late`] once more than `timeout_seconds` have
    /// elapsed since `last_seen`, whether or not it ever reported. Inside
    /// the window it is [`Status::Alive`] if activity has been reported and
    /// [`Status::Unknown`] otherwise.
    pub fn derive(reported: bool, last_seen: i64, timeout_seconds: u32, now: i64) -> Self {
        let elapsed = now.saturating_sub(last_seen);
        if elapsed > i64::from(timeout_seconds) {
            Self::Late
        } else if reported {
            Self::Alive
        } else {
            Self::Unknown
        }
    }

    /// The lowercase name stored in the database and printed by the CLI.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Alive => "alive",
            Self::Late => "late",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "alive" => Ok(Self::Alive),
            "late" => Ok(Self::Late),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// A watched `(host, topic)` record as returned by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Publisher host name. Never empty.
    pub host: String,
    /// Sub-topic the record is scoped to, `None` for the host as a whole.
    pub topic: Option<String>,
    /// Unix timestamp of registration or of the latest matching activity.
    pub last_seen: i64,
    /// Seconds without activity after which the record is late.
    pub timeout_seconds: u32,
    /// Status derived when the record was read.
    pub status: Status,
}

impl ActivityRecord {
    /// The topic as printed by the CLI (`None` for the host-level record).
    pub fn topic_label(&self) -> &str {
        topic_label(self.topic.as_deref())
    }
}

impl fmt::Display for ActivityRecord {
    /// Renders `host topic last_seen timeout status`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.host,
            self.topic_label(),
            self.last_seen,
            self.timeout_seconds,
            self.status
        )
    }
}

/// Render an optional topic, using [`NO_TOPIC`] for `None`.
pub fn topic_label(topic: Option<&str>) -> &str {
    topic.unwrap_or(NO_TOPIC)
}

/// Result of registering a `(host, topic)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was created.
    Created,
    /// The key was already watched; nothing changed.
    Duplicate,
}

/// Result of removing a `(host, topic)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record was removed.
    Deleted,
    /// No record had that key.
    NotFound,
}

/// Result of modifying a single record in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record was modified.
    Updated,
    /// No record had that key.
    NotFound,
}
