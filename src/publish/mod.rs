//! Publishing readings.
//!
//! This module builds the outbound JSON message for a reading and defines the
//! [`Publisher`] trait the MQTT client implements, so the run can be tested
//! without a broker.

pub mod mqtt;

use crate::config::BrokerConfig;
use crate::fixed_point::FixedPoint;
use crate::reading::{Reading, SensorSource};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Local wall-clock format of the `time` field.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Error type for publishing.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The request could not be queued on the client
    #[error("MQTT client error: {0}")]
    Client(String),
    /// Connecting to the broker or exchanging packets failed
    #[error("MQTT connection error: {0}")]
    Connection(String),
    #[error("MQTT publish timed out after {0:?}")]
    Timeout(Duration),
}

/// JSON body of the published message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub time: String,
    pub temperature: FixedPoint,
    pub humidity: FixedPoint,
    pub sensor: SensorSource,
}

/// A message ready to be handed to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Payload,
}

impl OutboundMessage {
    /// Build the message for `reading`, published under
    /// `broker.topic_prefix + topic_suffix`.
    pub fn new(broker: &BrokerConfig, topic_suffix: &str, reading: &Reading, time: &str) -> Self {
        Self {
            topic: broker.topic_for(topic_suffix),
            payload: Payload {
                time: time.to_string(),
                temperature: reading.temperature_c,
                humidity: reading.humidity_pct,
                sensor: reading.sensor_source,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, PublishError> {
        Ok(serde_json::to_string(&self.payload)?)
    }
}

/// Format a timestamp the way the `time` field expects it.
pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Publisher abstraction to enable deterministic unit tests without a broker.
pub trait Publisher: Send + Sync {
    /// Deliver `message` with at-least-once semantics.
    fn publish<'a>(
        &'a self,
        broker: &'a BrokerConfig,
        message: &'a OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>>;
}

/// Build the message for `reading` and hand it to `publisher`.
///
/// Returns the published message and its JSON body so the caller can log
/// them. A payload that cannot be serialized is never handed to `publisher`.
pub async fn publish_reading(
    publisher: &dyn Publisher,
    broker: &BrokerConfig,
    topic_suffix: &str,
    reading: &Reading,
    time: &str,
) -> Result<(OutboundMessage, String), PublishError> {
    let message = OutboundMessage::new(broker, topic_suffix, reading, time);
    let payload = message.to_json()?;
    publisher.publish(broker, &message).await?;
    Ok((message, payload))
}
