//! Data layer for the home automation host monitor (embedded `SQLite`).
//!
//! One table, `host_activity`, holds a record per watched `(host, topic)`
//! key. The administrative tool registers and edits records; the monitor
//! stamps them as activity arrives.
//!
//! ```text
//! hahmon-edit ----+
//!                 +--> ActivityStore --> host_activity (SQLite file)
//! hahmon-monitor -+
//! ```
//!
//! # Modules
//!
//! - [`sqlite`] -- Store location, handle lifecycle, and schema
//! - [`activity_store`] -- Keyed record operations
//! - [`error`] -- Shared error types

pub mod activity_store;
pub mod error;
pub mod sqlite;

// Re-export primary types for convenience.
pub use activity_store::{ActivityRow, ActivityStore};
pub use error::DbError;
pub use sqlite::{ActivityDb, DEFAULT_PATH, SqliteConfig};
