//! The ingestion loop.
//!
//! Pulls messages from a [`MessageSource`] and hands each one to the
//! [`Reconciler`]. A bad message is counted and logged, never fatal. Quiet
//! or closed subscriptions are reopened when the source allows it.

use std::time::Duration;

use futures::StreamExt;
use hahmon_core::config::MonitorConfig;
use hahmon_core::{ReconcileError, ReconcileOutcome, Reconciler};
use hahmon_types::topic_label;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::MonitorError;
use crate::source::{Inbound, MessageSource};

/// Timing knobs for the ingestion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// How long without a message before the subscription is renewed.
    pub inactivity_timeout: Duration,
    /// How long to wait before resubscribing after a stream ends.
    pub reconnect_delay: Duration,
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            inactivity_timeout: config.inactivity_timeout(),
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

/// Counters for everything the loop has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Messages taken from the source.
    pub received: u64,
    /// Messages that refreshed a record.
    pub updated: u64,
    /// Messages for hosts nobody watches.
    pub missed: u64,
    /// Messages that could not be parsed.
    pub malformed: u64,
    /// Messages whose key matched several records.
    pub ambiguous: u64,
    /// Messages dropped because the store failed.
    pub store_errors: u64,
}

/// Drives a [`Reconciler`] from a message source.
pub struct Monitor<'a> {
    reconciler: Reconciler<'a>,
    settings: MonitorSettings,
    stats: MonitorStats,
}

impl<'a> Monitor<'a> {
    /// Create a monitor feeding `reconciler`.
    pub fn new(reconciler: Reconciler<'a>, settings: MonitorSettings) -> Self {
        Self {
            reconciler,
            settings,
            stats: MonitorStats::default(),
        }
    }

    /// Consume messages until the source is done or `shutdown` turns true.
    ///
    /// A message being reconciled when shutdown is requested is finished
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] if a source that cannot be reopened fails
    /// to open.
    pub async fn run<S: MessageSource>(
        &mut self,
        source: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<MonitorStats, MonitorError> {
        'subscription: loop {
            if *shutdown.borrow_and_update() {
                break 'subscription;
            }

            let opened = tokio::select! {
                biased;
                () = shutdown_requested(&mut shutdown) => break 'subscription,
                opened = source.subscribe() => opened,
            };
            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) if source.resubscribes() => {
                    warn!(error = %e, "subscription failed, retrying");
                    if self.pause(&mut shutdown).await {
                        break 'subscription;
                    }
                    continue 'subscription;
                }
                Err(e) => return Err(e),
            };

            loop {
                let next = tokio::select! {
                    biased;
                    () = shutdown_requested(&mut shutdown) => break 'subscription,
                    next = tokio::time::timeout(self.settings.inactivity_timeout, stream.next()) => next,
                };

                match next {
                    Ok(Some(message)) => self.handle(&message).await,
                    Ok(None) if source.resubscribes() => {
                        warn!(
                            delay_ms = self.settings.reconnect_delay.as_millis(),
                            "message stream ended, resubscribing"
                        );
                        if self.pause(&mut shutdown).await {
                            break 'subscription;
                        }
                        continue 'subscription;
                    }
                    Ok(None) => {
                        info!("message source closed");
                        break 'subscription;
                    }
                    Err(_elapsed) if source.resubscribes() => {
                        warn!(
                            timeout_secs = self.settings.inactivity_timeout.as_secs(),
                            "no activity received, resubscribing"
                        );
                        continue 'subscription;
                    }
                    Err(_elapsed) => {
                        debug!(
                            timeout_secs = self.settings.inactivity_timeout.as_secs(),
                            "no activity received, still waiting"
                        );
                    }
                }
            }
        }

        info!(
            received = self.stats.received,
            updated = self.stats.updated,
            missed = self.stats.missed,
            malformed = self.stats.malformed,
            ambiguous = self.stats.ambiguous,
            store_errors = self.stats.store_errors,
            "monitor stopped"
        );
        Ok(self.stats)
    }

    /// Wait out the reconnect delay. Returns `true` if shutdown was
    /// requested meanwhile.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            biased;
            () = shutdown_requested(shutdown) => true,
            () = tokio::time::sleep(self.settings.reconnect_delay) => false,
        }
    }

    /// Reconcile one message and count the outcome.
    async fn handle(&mut self, message: &Inbound) {
        self.stats.received = self.stats.received.saturating_add(1);

        let result = match message {
            Inbound::Message { topic, payload } => {
                self.reconciler.handle_message(topic, payload).await
            }
            Inbound::Line(line) => self.reconciler.handle_line(line).await,
        };

        match result {
            Ok(ReconcileOutcome::Updated { host, topic }) => {
                self.stats.updated = self.stats.updated.saturating_add(1);
                debug!(host, topic = topic_label(topic.as_deref()), "activity recorded");
            }
            Ok(ReconcileOutcome::NotFound) => {
                self.stats.missed = self.stats.missed.saturating_add(1);
                debug!(inbound = ?message, "no watched record, dropping");
            }
            Err(e @ ReconcileError::Parse(_)) => {
                self.stats.malformed = self.stats.malformed.saturating_add(1);
                warn!(inbound = ?message, error = %e, "dropping malformed message");
            }
            Err(e @ ReconcileError::Ambiguous { .. }) => {
                self.stats.ambiguous = self.stats.ambiguous.saturating_add(1);
                warn!(error = %e, "ambiguous watched records, dropping");
            }
            Err(ReconcileError::Store(e)) => {
                self.stats.store_errors = self.stats.store_errors.saturating_add(1);
                error!(inbound = ?message, error = %e, "failed to record activity");
            }
        }
    }
}

/// Resolve once `shutdown` holds `true`. Never resolves if the sender is
/// gone without having asked for shutdown.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
