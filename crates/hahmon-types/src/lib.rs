//! Shared type definitions for the home automation host monitor.
//!
//! The monitor watches `(host, topic)` pairs and records when each last
//! published. This crate holds the types every other crate agrees on.
//!
//! # Modules
//!
//! - [`record`] -- Watched records, derived status, and operation outcomes
//! - [`pattern`] -- Host/topic patterns for listing records
//! - [`event`] -- Inbound message parsing
//! - [`clock`] -- Wall-clock abstraction

pub mod clock;
pub mod event;
pub mod pattern;
pub mod record;

// Re-export all public types at crate root for convenience.
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{ActivityEvent, ParseError};
pub use pattern::{MATCH_ALL, Pattern};
pub use record::{
    ActivityRecord, DeleteOutcome, InsertOutcome, NO_TOPIC, Status, UnknownStatus,
    UpdateOutcome, topic_label,
};
