//! Configuration and event reconciliation for the home automation host
//! monitor.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `hahmon.yaml` and the
//!   environment into strongly-typed structs.
//! - [`reconcile`] -- [`Reconciler`], which maps inbound activity events
//!   onto watched records.
//!
//! [`Reconciler`]: reconcile::Reconciler

pub mod config;
pub mod reconcile;

pub use config::{ConfigError, HahmonConfig};
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
