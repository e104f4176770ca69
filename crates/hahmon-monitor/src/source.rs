//! Where activity messages come from.
//!
//! A [`MessageSource`] hands out a stream of [`Inbound`] messages. Sources
//! that can be reopened (NATS) are resubscribed when the stream goes quiet
//! or ends; sources that cannot (standard input) are read until they end.

use std::future::Future;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::warn;

use crate::error::MonitorError;

/// One message as delivered by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A bus message with its topic and payload already separated.
    Message {
        /// Slash-delimited topic.
        topic: String,
        /// Message body.
        payload: String,
    },
    /// A `mosquitto_sub -v` line: topic, whitespace, payload.
    Line(String),
}

/// A supplier of activity messages.
pub trait MessageSource {
    /// Open a stream of messages.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] if the stream cannot be opened.
    fn subscribe(
        &mut self,
    ) -> impl Future<Output = Result<BoxStream<'static, Inbound>, MonitorError>> + Send;

    /// Whether [`MessageSource::subscribe`] may be called again after a
    /// stream ends or goes quiet.
    fn resubscribes(&self) -> bool;
}

/// Reads `mosquitto_sub -v` lines until the reader ends. Blank lines are
/// skipped. Bytes that are not UTF-8 are replaced with U+FFFD so the line
/// still reaches the reconciler.
#[derive(Debug)]
pub struct LineSource<R> {
    reader: Option<R>,
}

impl LineSource<BufReader<Stdin>> {
    /// Read lines from standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Read lines from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R> MessageSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn subscribe(&mut self) -> Result<BoxStream<'static, Inbound>, MonitorError> {
        let reader = self.reader.take().ok_or(MonitorError::SourceExhausted)?;
        Ok(stream::unfold(reader, next_line).boxed())
    }

    fn resubscribes(&self) -> bool {
        false
    }
}

async fn next_line<R>(mut reader: R) -> Option<(Inbound, R)>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return None,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if !line.trim().is_empty() {
                    return Some((Inbound::Line(line.to_owned()), reader));
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read input line, closing source");
                return None;
            }
        }
    }
}
