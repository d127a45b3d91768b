//! Signed fixed-point values as transmitted by the sensor.
//!
//! The thermometer encodes each measurement as a little-endian two's-complement
//! 16-bit integer holding hundredths of the physical unit.

use serde::{Serialize, Serializer};
use std::fmt;

/// Scale between the raw integer and the physical value.
const SCALE: f64 = 100.0;

/// A measurement stored in hundredths (e.g. `-256` is `-2.56`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FixedPoint(pub i16);

impl FixedPoint {
    /// Smallest representable value, `-327.68`.
    pub const MIN: FixedPoint = FixedPoint(i16::MIN);
    /// Largest representable value, `327.67`.
    pub const MAX: FixedPoint = FixedPoint(i16::MAX);

    /// Decode from the little-endian byte pair found in the payload.
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        FixedPoint(i16::from_le_bytes(bytes))
    }

    /// Bytes as they would appear in the payload.
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// The physical value, with exactly the precision the sensor reports.
    pub fn to_f64(self) -> f64 {
        f64::from(self.0) / SCALE
    }

    /// Convert a physical value back to hundredths.
    ///
    /// Returns `None` for NaN or for values outside `[-327.68, 327.67]`.
    pub fn from_f64(value: f64) -> Option<Self> {
        let scaled = (value * SCALE).round();
        if scaled.is_nan() || scaled < f64::from(i16::MIN) || scaled > f64::from(i16::MAX) {
            return None;
        }
        Some(FixedPoint(scaled as i16))
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.to_f64())
    }
}

impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

/// Decode one measurement from its low and high byte.
///
/// Total over all inputs: `0xFF00` is `-2.56`, `0x7FFF` is `327.67`.
///
/// # Example
/// ```
/// use inkbird2mqtt::fixed_point::decode;
///
/// assert_eq!(decode(0x10, 0x00).to_f64(), 0.16);
/// assert_eq!(decode(0x00, 0xFF).to_f64(), -2.56);
/// ```
pub fn decode(low: u8, high: u8) -> FixedPoint {
    FixedPoint::from_le_bytes([low, high])
}

/// Encode a physical value into the `(low, high)` byte pair `decode` accepts.
pub fn encode(value: f64) -> Option<(u8, u8)> {
    FixedPoint::from_f64(value).map(|fp| {
        let [low, high] = fp.to_le_bytes();
        (low, high)
    })
}
