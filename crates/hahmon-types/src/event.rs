//! Inbound activity messages.
//!
//! Publishers emit messages on topics shaped `<namespace>/<host>/<rest...>`
//! with a payload whose first comma- or whitespace-delimited field is the
//! Unix timestamp claimed by the publisher. For example:
//!
//! ```text
//! topic:   home_automation/sodus/master_bedroom/temp_humidity
//! payload: 1553831160, 72.50, 30.98
//! ```
//!
//! parses to host `sodus`, topic `/master_bedroom/temp_humidity` and a
//! claimed timestamp of `1553831160`.

use serde::{Deserialize, Serialize};

/// Errors produced while parsing an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The topic has no second segment naming the host.
    #[error("topic {topic:?} does not name a host")]
    MissingHost {
        /// The offending topic.
        topic: String,
    },

    /// A monitor line carried a topic but no payload.
    #[error("message on {topic:?} has no payload")]
    MissingPayload {
        /// The topic of the message.
        topic: String,
    },

    /// The payload is empty.
    #[error("payload carries no timestamp")]
    MissingTimestamp,

    /// The first payload field is not an integer.
    #[error("invalid timestamp {field:?} in payload: {reason}")]
    InvalidTimestamp {
        /// The field that failed to parse.
        field: String,
        /// Why the field was rejected.
        reason: String,
    },
}

/// One parsed activity report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Host that published the message.
    pub host: String,
    /// Remainder of the topic after the host, with a leading `/`.
    /// `None` when the topic ends at the host segment.
    pub topic: Option<String>,
    /// Timestamp claimed by the publisher. Informational only.
    pub claimed_at: i64,
}

impl ActivityEvent {
    /// Parse a message from its topic and payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the topic does not name a host or the payload
    /// does not start with an integer timestamp.
    pub fn parse(topic: &str, payload: &str) -> Result<Self, ParseError> {
        let (host, rest) = split_topic(topic)?;
        let claimed_at = parse_timestamp(payload)?;
        Ok(Self {
            host: host.to_owned(),
            topic: rest,
            claimed_at,
        })
    }

    /// Parse one line as printed by `mosquitto_sub -v`: the topic, a space,
    /// then the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingPayload`] if the line has no payload,
    /// otherwise the errors of [`ActivityEvent::parse`].
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        match line.split_once(char::is_whitespace) {
            Some((topic, payload)) => Self::parse(topic, payload),
            None => Err(ParseError::MissingPayload {
                topic: line.to_owned(),
            }),
        }
    }
}

/// Split a topic into its host segment and the reassembled remainder.
fn split_topic(topic: &str) -> Result<(&str, Option<String>), ParseError> {
    let mut segments = topic.split('/');
    let _namespace = segments.next();
    let host = segments
        .next()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| ParseError::MissingHost {
            topic: topic.to_owned(),
        })?;

    let rest: Vec<&str> = segments.collect();
    if rest.iter().all(|segment| segment.is_empty()) {
        return Ok((host, None));
    }

    let mut joined = String::with_capacity(topic.len());
    for segment in rest {
        joined.push('/');
        joined.push_str(segment);
    }
    Ok((host, Some(joined)))
}

/// Read the leading timestamp field of a payload.
fn parse_timestamp(payload: &str) -> Result<i64, ParseError> {
    let field = payload
        .split(|c: char| c == ',' || c.is_whitespace())
        .find(|field| !field.is_empty())
        .ok_or(ParseError::MissingTimestamp)?;
    field
        .parse()
        .map_err(|e: std::num::ParseIntError| ParseError::InvalidTimestamp {
            field: field.to_owned(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_sensor_message() {
        let event = ActivityEvent::parse(
            "home_automation/sodus/master_bedroom/temp_humidity",
            "1553884981, 70.95, 29.16",
        )
        .unwrap();
        assert_eq!(event.host, "sodus");
        assert_eq!(event.topic.as_deref(), Some("/master_bedroom/temp_humidity"));
        assert_eq!(event.claimed_at, 1_553_884_981);
    }

    #[test]
    fn keeps_every_remaining_segment() {
        let event = ActivityEvent::parse("ha/oak/roamer/outside/temp", "1 2").unwrap();
        assert_eq!(event.topic.as_deref(), Some("/roamer/outside/temp"));
    }

    #[test]
    fn topic_ending_at_host_has_no_sub_topic() {
        let event = ActivityEvent::parse("ha/oak", "1536080280").unwrap();
        assert_eq!(event.host, "oak");
        assert_eq!(event.topic, None);

        let trailing = ActivityEvent::parse("ha/oak/", "1536080280").unwrap();
        assert_eq!(trailing.topic, None);
    }

    #[test]
    fn topic_without_host_is_rejected() {
        assert_eq!(
            ActivityEvent::parse("home_automation", "1"),
            Err(ParseError::MissingHost {
                topic: "home_automation".to_owned()
            })
        );
        assert!(matches!(
            ActivityEvent::parse("ha//x", "1"),
            Err(ParseError::MissingHost { .. })
        ));
    }

    #[test]
    fn payload_must_start_with_integer() {
        assert_eq!(
            ActivityEvent::parse("ha/oak/x", "   "),
            Err(ParseError::MissingTimestamp)
        );
        assert!(matches!(
            ActivityEvent::parse("ha/oak/x", "72.5, 1553884981"),
            Err(ParseError::InvalidTimestamp { field, .. }) if field == "72.5"
        ));
    }

    #[test]
    fn timestamp_may_be_followed_by_text() {
        let event = ActivityEvent::parse("ha/oak/x", "1553884981 on").unwrap();
        assert_eq!(event.claimed_at, 1_553_884_981);
    }

    #[test]
    fn parses_monitor_line() {
        let event = ActivityEvent::parse_line(
            "home_automation/brandywine/roamer/outside_temp_humidity 1553831160, 47.54, 76.44\n",
        )
        .unwrap();
        assert_eq!(event.host, "brandywine");
        assert_eq!(event.topic.as_deref(), Some("/roamer/outside_temp_humidity"));
        assert_eq!(event.claimed_at, 1_553_831_160);
    }

    #[test]
    fn monitor_line_without_payload_is_rejected() {
        assert!(matches!(
            ActivityEvent::parse_line("home_automation/oak/x"),
            Err(ParseError::MissingPayload { .. })
        ));
    }
}
