//! NATS subscription for activity intake.
//!
//! Home automation publishers speak MQTT. The NATS server's MQTT bridge
//! republishes `home_automation/oak/roamer/temp` as the subject
//! `home_automation.oak.roamer.temp`; the monitor subscribes to
//! `home_automation.>` and maps subjects back to slash-delimited topics.

use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info};

use crate::error::MonitorError;
use crate::source::{Inbound, MessageSource};

/// NATS client wrapper for the monitor.
///
/// Manages a single NATS connection. Each call to
/// [`MessageSource::subscribe`] opens a fresh subscription; dropping the
/// previous stream unsubscribes it.
pub struct NatsSource {
    client: async_nats::Client,
    subject: String,
}

impl NatsSource {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str, subject: &str) -> Result<Self, MonitorError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| MonitorError::Nats(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self {
            client,
            subject: subject.to_owned(),
        })
    }
}

impl MessageSource for NatsSource {
    async fn subscribe(&mut self) -> Result<BoxStream<'static, Inbound>, MonitorError> {
        debug!(subject = self.subject, "subscribing to activity subjects");
        let subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| {
                MonitorError::Nats(format!("failed to subscribe to {}: {e}", self.subject))
            })?;
        info!(subject = self.subject, "subscribed to activity subjects");

        Ok(subscriber
            .map(|message| Inbound::Message {
                topic: subject_to_topic(&message.subject.to_string()),
                payload: String::from_utf8_lossy(&message.payload).into_owned(),
            })
            .boxed())
    }

    fn resubscribes(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for NatsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsSource")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Turn a NATS subject back into the MQTT topic it was bridged from.
pub fn subject_to_topic(subject: &str) -> String {
    subject.replace('.', "/")
}
