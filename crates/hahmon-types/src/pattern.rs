//! Host and topic patterns for listing watched records.
//!
//! Patterns use SQL `LIKE` syntax (`%` matches any run of characters, `_`
//! matches one character). [`Pattern::All`] is the wildcard-all sentinel and,
//! unlike a bare `LIKE '%'`, it also matches records that have no topic.

use serde::{Deserialize, Serialize};

/// The `LIKE` pattern that is read as [`Pattern::All`].
pub const MATCH_ALL: &str = "%";

/// A filter on the host or topic column of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pattern {
    /// Match every record, including host-level (no topic) records.
    #[default]
    All,
    /// Match only records without a topic. Meaningful for topics only.
    HostOnly,
    /// SQL `LIKE` pattern. Never matches a missing topic.
    Like(String),
}

impl Pattern {
    /// Build a pattern from optional user input.
    ///
    /// `None` and the bare wildcard `%` both mean [`Pattern::All`].
    pub fn from_input(input: Option<&str>) -> Self {
        match input {
            None | Some(MATCH_ALL) => Self::All,
            Some(other) => Self::Like(other.to_owned()),
        }
    }

    /// The `LIKE` argument to bind, or `None` when no `LIKE` test applies.
    pub fn like_arg(&self) -> Option<&str> {
        match self {
            Self::Like(pattern) => Some(pattern.as_str()),
            Self::All | Self::HostOnly => None,
        }
    }

    /// Whether the pattern restricts results to records without a topic.
    pub const fn is_host_only(&self) -> bool {
        matches!(self, Self::HostOnly)
    }
}
