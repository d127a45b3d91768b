//! Thermometer reading decoded from the sensor's data characteristic.

use crate::fixed_point::{FixedPoint, decode};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Minimum payload length: temperature (2), humidity (2), sensor source (1).
///
/// Byte 5, when present, carries a battery level that is not interpreted.
pub const MIN_PAYLOAD_LEN: usize = 5;

/// Which probe produced the temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    Internal,
    External,
    Unknown,
}

impl From<u8> for SensorSource {
    fn from(code: u8) -> Self {
        match code {
            0 => SensorSource::Internal,
            1 => SensorSource::External,
            _ => SensorSource::Unknown,
        }
    }
}

impl fmt::Display for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorSource::Internal => write!(f, "internal"),
            SensorSource::External => write!(f, "external"),
            SensorSource::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single decoded reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Temperature in Celsius
    pub temperature_c: FixedPoint,
    /// Relative humidity in percent
    pub humidity_pct: FixedPoint,
    pub sensor_source: SensorSource,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed payload: expected at least 5 bytes, got {0}")]
    MalformedPayload(usize),
}

/// Interpret the raw characteristic value.
///
/// # Errors
/// Returns [`ParseError::MalformedPayload`] when fewer than
/// [`MIN_PAYLOAD_LEN`] bytes are given. Longer payloads never fail.
pub fn parse_reading(raw: &[u8]) -> Result<Reading, ParseError> {
    let &[t_lo, t_hi, h_lo, h_hi, source, ..] = raw else {
        return Err(ParseError::MalformedPayload(raw.len()));
    };

    Ok(Reading {
        temperature_c: decode(t_lo, t_hi),
        humidity_pct: decode(h_lo, h_hi),
        sensor_source: SensorSource::from(source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{EXTERNAL_NEGATIVE_PAYLOAD, INTERNAL_PAYLOAD};

    #[test]
    fn test_parse_internal_probe() {
        let reading = parse_reading(&INTERNAL_PAYLOAD).unwrap();
        assert_eq!(reading.temperature_c.to_f64(), 0.16);
        assert_eq!(reading.humidity_pct.to_f64(), 0.32);
        assert_eq!(reading.sensor_source, SensorSource::Internal);
    }

    #[test]
    fn test_parse_external_probe_negative() {
        let reading = parse_reading(&EXTERNAL_NEGATIVE_PAYLOAD).unwrap();
        assert_eq!(reading.temperature_c.to_f64(), -2.56);
        assert_eq!(reading.humidity_pct.to_f64(), -2.56);
        assert_eq!(reading.sensor_source, SensorSource::External);
    }

    #[test]
    fn test_parse_short_payloads_fail() {
        for len in 0..MIN_PAYLOAD_LEN {
            let raw = vec![0u8; len];
            assert_eq!(parse_reading(&raw), Err(ParseError::MalformedPayload(len)));
        }
    }

    #[test]
    fn test_parse_minimum_and_longer_payloads() {
        assert!(parse_reading(&[0x00; 5]).is_ok());
        assert!(parse_reading(&[0x00; 9]).is_ok());
    }

    #[test]
    fn test_parse_is_pure() {
        assert_eq!(
            parse_reading(&INTERNAL_PAYLOAD),
            parse_reading(&INTERNAL_PAYLOAD)
        );
    }

    #[test]
    fn test_battery_byte_ignored() {
        let mut other = INTERNAL_PAYLOAD;
        other[5] = 0x07;
        assert_eq!(parse_reading(&other), parse_reading(&INTERNAL_PAYLOAD));
    }

    #[test]
    fn test_sensor_source_mapping_is_total() {
        assert_eq!(SensorSource::from(0), SensorSource::Internal);
        assert_eq!(SensorSource::from(1), SensorSource::External);
        for code in 2..=u8::MAX {
            assert_eq!(SensorSource::from(code), SensorSource::Unknown);
        }
    }

    #[test]
    fn test_sensor_source_serialization() {
        assert_eq!(
            serde_json::to_string(&SensorSource::Internal).unwrap(),
            "\"internal\""
        );
        assert_eq!(
            serde_json::to_string(&SensorSource::Unknown).unwrap(),
            "\"unknown\""
        );
        assert_eq!(SensorSource::External.to_string(), "external");
    }

    #[test]
    fn test_parse_error_display() {
        assert_eq!(
            ParseError::MalformedPayload(3).to_string(),
            "malformed payload: expected at least 5 bytes, got 3"
        );
    }
}
