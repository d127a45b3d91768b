//! Core application runner (business logic) for `inkbird2mqtt`.
//!
//! This module is decoupled from CLI parsing and process exit codes so a run
//! can be tested deterministically with an injected sensor and publisher.

use crate::config::{AddressType, BrokerConfig, Config, ConfigError, DeviceConfig};
use crate::publish::{self, OutboundMessage, PublishError, Publisher};
use crate::reading::{ParseError, parse_reading};
use crate::sensor::{Backend, ReadError, SensorReader};
use chrono::NaiveDateTime;
use clap::Parser;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Command-line and environment configuration.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Bluetooth address of the thermometer, e.g. 49:22:05:17:0C:1F.
    /// Used verbatim as the topic suffix.
    #[arg(long, env = "INKBIRD_MAC")]
    pub mac: String,

    /// Bluetooth LE address type of the thermometer
    #[arg(long, env = "INKBIRD_ADDRESS_TYPE", default_value_t, value_enum)]
    pub address_type: AddressType,

    /// MQTT broker host
    #[arg(long, env = "MQTT_HOST")]
    pub mqtt_host: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    #[arg(long, env = "MQTT_USER")]
    pub mqtt_user: Option<String>,

    #[arg(long, env = "MQTT_PASS", hide_env_values = true)]
    pub mqtt_pass: Option<String>,

    #[arg(long, env = "MQTT_CLIENT_ID", default_value = "inkbird2mqtt")]
    pub mqtt_client_id: String,

    /// Prepended verbatim to the device address to form the topic
    #[arg(long, env = "MQTT_TOPIC_PREFIX", default_value = "inkbird/")]
    pub mqtt_topic_prefix: String,

    /// Bluetooth backend to use
    #[arg(long, env = "INKBIRD_BACKEND", default_value_t, value_enum)]
    pub backend: Backend,

    /// Timeout for the Bluetooth read and for the MQTT publish, each.
    /// Accepts duration with suffix: 10s, 1m, 500ms.
    #[arg(long, env = "INKBIRD_TIMEOUT", default_value = "10s", value_parser = crate::duration::parse_duration)]
    pub timeout: Duration,

    /// Verbose output, log raw payloads and transport details
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    /// Validate into the immutable configuration used by a run.
    pub fn config(&self) -> Result<Config, ConfigError> {
        Config::new(
            DeviceConfig::parse(&self.mac, self.address_type)?,
            BrokerConfig {
                host: self.mqtt_host.clone(),
                port: self.mqtt_port,
                username: self.mqtt_user.clone(),
                password: self.mqtt_pass.clone(),
                client_id: self.mqtt_client_id.clone(),
                topic_prefix: self.mqtt_topic_prefix.clone(),
            },
        )
    }
}

/// How a run ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The reading was accepted by the broker
    Published(OutboundMessage),
    /// The device returned no data; nothing was published
    Skipped,
}

/// Errors returned by a run. Each ends the run before anything is published,
/// except `Publish`, where the reading is dropped.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to read sensor: {0}")]
    Read(#[source] ReadError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("failed to publish reading: {0}")]
    Publish(#[from] PublishError),
}

/// Hex dump used for the raw payload log line.
fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read the device once, decode the payload and publish it.
///
/// Stages run strictly in sequence; a failed or empty read means the
/// publisher is never called. `now` is the local wall-clock time put into the
/// message.
pub async fn run_once(
    config: &Config,
    sensor: &dyn SensorReader,
    publisher: &dyn Publisher,
    now: NaiveDateTime,
) -> Result<Outcome, RunError> {
    let address = &config.device.address_text;

    let raw = match sensor.read(&config.device).await {
        Ok(raw) => raw,
        Err(ReadError::Empty) => {
            warn!(%address, "no data");
            return Ok(Outcome::Skipped);
        }
        Err(e) => {
            error!(%address, error = %e, "error reading BLE device");
            return Err(RunError::Read(e));
        }
    };
    debug!(%address, raw = %hex(&raw), "raw data");

    let reading = parse_reading(&raw).inspect_err(|e| {
        error!(%address, error = %e, "cannot decode reading");
    })?;

    let time = publish::format_time(&now);
    info!(
        %address,
        %time,
        temperature = %reading.temperature_c,
        humidity = %reading.humidity_pct,
        sensor = %reading.sensor_source,
        "reading: {}\u{00B0}C, {}%, {} sensor",
        reading.temperature_c,
        reading.humidity_pct,
        reading.sensor_source
    );

    info!(topic = %config.topic(), "publishing MQTT payload");

    match publish::publish_reading(publisher, &config.broker, address, &reading, &time).await {
        Ok((message, payload)) => {
            info!(topic = %message.topic, %payload, "published");
            Ok(Outcome::Published(message))
        }
        Err(e) => {
            error!(error = %e, "publish failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::FixedPoint;
    use crate::reading::SensorSource;
    use crate::sensor::RawPayload;
    use crate::test_utils::{
        EXTERNAL_NEGATIVE_PAYLOAD, INTERNAL_PAYLOAD, TEST_MAC, broker_config, device_config,
    };
    use chrono::NaiveDate;
    use serde_json::{Value, json};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FakeSensor {
        result: Result<RawPayload, ReadError>,
        calls: Mutex<usize>,
    }

    impl FakeSensor {
        fn new(result: Result<RawPayload, ReadError>) -> Self {
            Self {
                result,
                calls: Mutex::new(0),
            }
        }
    }

    impl SensorReader for FakeSensor {
        fn read<'a>(
            &'a self,
            _device: &'a DeviceConfig,
        ) -> Pin<Box<dyn Future<Output = Result<RawPayload, ReadError>> + Send + 'a>> {
            *self.calls.lock().unwrap() += 1;
            let result = self.result.clone();
            Box::pin(async move { result })
        }
    }

    #[derive(Debug, Default)]
    struct FakePublisher {
        fail: bool,
        published: Mutex<Vec<(String, String)>>,
    }

    impl FakePublisher {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }
    }

    impl Publisher for FakePublisher {
        fn publish<'a>(
            &'a self,
            _broker: &'a BrokerConfig,
            message: &'a OutboundMessage,
        ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
            self.published
                .lock()
                .unwrap()
                .push((message.topic.clone(), message.to_json().unwrap()));
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(PublishError::Connection("connection refused".to_string()))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn config() -> Config {
        Config::new(device_config(), broker_config()).unwrap()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
    }

    #[tokio::test]
    async fn run_publishes_reading_once() {
        let sensor = FakeSensor::new(Ok(INTERNAL_PAYLOAD.to_vec()));
        let publisher = FakePublisher::default();

        let outcome = run_once(&config(), &sensor, &publisher, now()).await.unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        let (topic, payload) = &published[0];
        assert_eq!(topic, &format!("inkbird/{TEST_MAC}"));
        let payload: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(
            payload,
            json!({
                "time": "2024-01-02 03:04:05",
                "temperature": 0.16,
                "humidity": 0.32,
                "sensor": "internal",
            })
        );

        let Outcome::Published(message) = outcome else {
            panic!("expected a published outcome");
        };
        assert_eq!(message.topic, *topic);
        assert_eq!(message.payload.sensor, SensorSource::Internal);
        assert_eq!(*sensor.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn run_publishes_negative_external_reading() {
        let sensor = FakeSensor::new(Ok(EXTERNAL_NEGATIVE_PAYLOAD.to_vec()));
        let publisher = FakePublisher::default();

        let outcome = run_once(&config(), &sensor, &publisher, now()).await.unwrap();

        let Outcome::Published(message) = outcome else {
            panic!("expected a published outcome");
        };
        assert_eq!(message.payload.temperature, FixedPoint(-256));
        assert_eq!(message.payload.humidity, FixedPoint(-256));
        assert_eq!(message.payload.sensor, SensorSource::External);
    }

    #[tokio::test]
    async fn run_skips_publish_on_read_failure() {
        let sensor = FakeSensor::new(Err(ReadError::Bluetooth("connection refused".into())));
        let publisher = FakePublisher::default();

        let err = run_once(&config(), &sensor, &publisher, now())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Read(ReadError::Bluetooth(_))));
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn run_skips_publish_on_empty_read() {
        let sensor = FakeSensor::new(Err(ReadError::Empty));
        let publisher = FakePublisher::default();

        let outcome = run_once(&config(), &sensor, &publisher, now()).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn run_skips_publish_on_malformed_payload() {
        let sensor = FakeSensor::new(Ok(vec![0x10, 0x00, 0x20]));
        let publisher = FakePublisher::default();

        let err = run_once(&config(), &sensor, &publisher, now())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::Parse(ParseError::MalformedPayload(3))
        ));
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn run_reports_publish_failure() {
        let sensor = FakeSensor::new(Ok(INTERNAL_PAYLOAD.to_vec()));
        let publisher = FakePublisher::failing();

        let err = run_once(&config(), &sensor, &publisher, now())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::Publish(PublishError::Connection(_))
        ));
        assert_eq!(publisher.published().len(), 1);
        assert_eq!(
            err.to_string(),
            "failed to publish reading: MQTT connection error: connection refused"
        );
    }

    #[test]
    fn options_from_args() {
        let options = Options::try_parse_from([
            "inkbird2mqtt",
            "--mac",
            "49:22:05:17:0c:1f",
            "--mqtt-host",
            "broker.local",
            "--mqtt-user",
            "user",
            "--mqtt-pass",
            "secret",
            "--timeout",
            "3s",
        ])
        .unwrap();

        assert_eq!(options.mac, "49:22:05:17:0c:1f");
        assert_eq!(options.address_type, AddressType::Public);
        assert_eq!(options.mqtt_port, 1883);
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.backend, Backend::default());

        let config = options.config().unwrap();
        assert_eq!(config.device.address, TEST_MAC);
        assert_eq!(config.broker.username.as_deref(), Some("user"));
        assert_eq!(config.topic(), "inkbird/49:22:05:17:0c:1f");
    }

    #[test]
    fn options_reject_invalid_mac() {
        let options = Options::try_parse_from([
            "inkbird2mqtt",
            "--mac",
            "not-a-mac",
            "--mqtt-host",
            "broker.local",
        ])
        .unwrap();
        assert!(matches!(
            options.config(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn run_publishes_to_address_as_configured() {
        let device = DeviceConfig::parse("49-22-05-17-0c-1f", AddressType::Public).unwrap();
        let config = Config::new(device, broker_config()).unwrap();
        let sensor = FakeSensor::new(Ok(INTERNAL_PAYLOAD.to_vec()));
        let publisher = FakePublisher::default();

        run_once(&config, &sensor, &publisher, now()).await.unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "inkbird/49-22-05-17-0c-1f");
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&INTERNAL_PAYLOAD), "10 00 20 00 00 50");
        assert_eq!(hex(&[]), "");
    }
}
