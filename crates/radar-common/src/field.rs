//! Byte-encoded field parameters.

use serde::{Deserialize, Serialize};

/// Encoded value used for missing or bad data in every byte field.
pub const MISSING_BYTE: u8 = 0;

/// Encoding parameters for one input field.
///
/// Physical value = `byte * scale + bias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldParams {
    /// Short field name, e.g. "DBZ", "VEL", "SNR"
    pub name: String,
    /// Physical units, e.g. "dBZ", "m/s"
    #[serde(default)]
    pub units: String,
    pub scale: f64,
    pub bias: f64,
}

impl FieldParams {
    pub fn new(name: impl Into<String>, units: impl Into<String>, scale: f64, bias: f64) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            scale,
            bias,
        }
    }

    /// Decode a byte to its physical value.
    #[inline]
    pub fn decode(&self, byte: u8) -> f64 {
        byte as f64 * self.scale + self.bias
    }

    /// Encode a physical value, rounding to the nearest step and clamping
    /// to the valid byte range.
    #[inline]
    pub fn encode(&self, value: f64) -> u8 {
        if self.scale == 0.0 || !value.is_finite() {
            return MISSING_BYTE;
        }
        ((value - self.bias) / self.scale).round().clamp(0.0, 255.0) as u8
    }

    /// True if both fields share the same encoding.
    pub fn same_encoding(&self, other_scale: f64, other_bias: f64) -> bool {
        (self.scale - other_scale).abs() < 1.0e-9 && (self.bias - other_bias).abs() < 1.0e-9
    }

    /// Case-insensitive name match.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}
