//! `inkbird2mqtt` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. A run (BLE read, decode, MQTT publish) lives in
//! [`crate::app`] where it can be tested deterministically with an injected
//! sensor and publisher.

pub mod app;
pub mod config;
pub mod duration;
pub mod fixed_point;
pub mod mac_address;
pub mod publish;
pub mod reading;
pub mod sensor;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{Options, Outcome, RunError, run_once};
pub use config::{AddressType, BrokerConfig, Config, ConfigError, DeviceConfig};
pub use fixed_point::FixedPoint;
pub use mac_address::MacAddress;
pub use publish::mqtt::MqttPublisher;
pub use publish::{OutboundMessage, Payload, PublishError, Publisher};
pub use reading::{ParseError, Reading, SensorSource, parse_reading};
pub use sensor::{Backend, BleSensorReader, RawPayload, ReadError, SensorReader};
