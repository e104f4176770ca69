//! Activity monitor entry point for the home automation host monitor.
//!
//! Listens for activity reports and stamps the matching watched record in
//! the activity store as alive.
//!
//! # Architecture
//!
//! ```text
//! NATS (home_automation.>) --+
//!                            +--> Reconciler --> ActivityStore
//! stdin (mosquitto_sub -v) --+
//! ```
//!
//! The source is NATS when `monitor.nats_url` (or `NATS_URL`) is set,
//! otherwise standard input, so the monitor can sit at the end of
//! `mosquitto_sub -v -t 'home_automation/#' | hahmon-monitor`.

mod error;
mod monitor;
mod nats;
mod source;

use anyhow::Context;
use hahmon_core::{HahmonConfig, Reconciler};
use hahmon_db::ActivityDb;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::monitor::{Monitor, MonitorSettings};
use crate::nats::NatsSource;
use crate::source::LineSource;

/// Application entry point.
///
/// Loads configuration, initializes logging, opens the activity store and
/// runs the ingestion loop until the source ends or Ctrl-C is pressed. The
/// store handle is closed on every exit path after it was opened.
///
/// # Errors
///
/// Returns an error if configuration, the store or the source cannot be
/// set up.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = HahmonConfig::load().context("failed to load configuration")?;

    // Initialize structured logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        nats_url = config.monitor.nats_url.as_deref().unwrap_or("-"),
        subject = config.monitor.subject,
        inactivity_timeout_secs = config.monitor.inactivity_timeout_secs,
        "hahmon-monitor starting"
    );

    let db = ActivityDb::open(&config.database.sqlite_config())
        .await
        .context("failed to open activity store")?;
    info!(db = %db.path().display(), "activity store open");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let result = run(&config, &db, shutdown_rx).await;
    db.close().await;
    result
}

/// Build the source and run the monitor against `db`.
async fn run(
    config: &HahmonConfig,
    db: &ActivityDb,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let settings = MonitorSettings::from(&config.monitor);
    let mut monitor = Monitor::new(Reconciler::new(db.store()), settings);

    let stats = match config.monitor.nats_url.as_deref() {
        Some(url) => {
            let mut source = NatsSource::connect(url, &config.monitor.subject).await?;
            monitor.run(&mut source, shutdown).await?
        }
        None => {
            info!("no NATS URL configured, reading activity from standard input");
            monitor.run(&mut LineSource::stdin(), shutdown).await?
        }
    };

    info!(
        received = stats.received,
        updated = stats.updated,
        "hahmon-monitor stopped"
    );
    Ok(())
}
