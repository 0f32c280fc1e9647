//! Sensor vector and request line framing

use std::fmt::Write as _;

use super::{ProtocolError, SENSOR_COUNT};

/// Exactly [`SENSOR_COUNT`] finite readings, position `i` is sensor channel `i`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorVector {
    values: [f64; SENSOR_COUNT],
}

impl SensorVector {
    /// Build a vector from a fixed-size array
    pub fn new(values: [f64; SENSOR_COUNT]) -> Result<Self, ProtocolError> {
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(ProtocolError::InvalidVector(format!(
                "sensor {} is not a finite number ({})",
                pos, values[pos]
            )));
        }
        Ok(Self { values })
    }

    /// Build a vector from a slice, checking its length
    pub fn from_slice(values: &[f64]) -> Result<Self, ProtocolError> {
        let values: [f64; SENSOR_COUNT] = values.try_into().map_err(|_| {
            ProtocolError::InvalidVector(format!(
                "expected {} values, got {}",
                SENSOR_COUNT,
                values.len()
            ))
        })?;
        Self::new(values)
    }

    /// Render as the request line body: comma separated, no spaces, no newline
    pub fn to_request_line(&self) -> String {
        let mut line = String::with_capacity(SENSOR_COUNT * 8);
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            // f64 Display is the shortest string that parses back to the same value
            let _ = write!(line, "{}", value);
        }
        line
    }
}

impl TryFrom<&[f64]> for SensorVector {
    type Error = ProtocolError;

    fn try_from(values: &[f64]) -> Result<Self, Self::Error> {
        Self::from_slice(values)
    }
}

impl TryFrom<Vec<f64>> for SensorVector {
    type Error = ProtocolError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_slice(&values)
    }
}
