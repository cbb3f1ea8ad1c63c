//! Sensor telemetry message and bus envelope.
//!
//! The spin table's sensor head publishes rate and light readings as JSON on
//! a fixed topic:
//! ```json
//! {"delta-time": 0.1, "rate": {"x": 0.0, "y": 0.0, "z": 0.52}, "lux": {"a": 410, "b": 388}}
//! ```
//! Every field is required.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default topic id carrying [`SensorTlm`] payloads.
pub const SENSOR_TLM_TOPIC: u32 = 0x0F4D;

/// Errors decoding a bus message.
#[derive(Error, Debug)]
pub enum MessageError {
    /// Message arrived on a topic this consumer does not handle.
    #[error("Invalid topic id 0x{actual:04X}, expected 0x{expected:04X}")]
    InvalidTopic { actual: u32, expected: u32 },

    /// Payload is not a well-formed sensor message.
    #[error("Invalid sensor payload: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Three-axis angular rate in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Light intensity from the two photo sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Lux {
    pub a: u32,
    pub b: u32,
}

/// One sensor sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorTlm {
    /// Seconds since the previous sample
    #[serde(rename = "delta-time")]
    pub delta_time: f64,
    pub rate: Rate,
    pub lux: Lux,
}

impl SensorTlm {
    pub fn new(delta_time: f64, rate_z: f64, lux_a: u32, lux_b: u32) -> Self {
        Self {
            delta_time,
            rate: Rate {
                z: rate_z,
                ..Rate::default()
            },
            lux: Lux { a: lux_a, b: lux_b },
        }
    }

    pub fn from_json(payload: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_json(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Sum of both light readings.
    pub fn total_lux(&self) -> f64 {
        self.lux.a as f64 + self.lux.b as f64
    }
}

/// A message on the sensor bus: topic id plus raw payload text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic_id: u32,
    pub payload: String,
}

impl BusMessage {
    pub fn new(topic_id: u32, payload: impl Into<String>) -> Self {
        Self {
            topic_id,
            payload: payload.into(),
        }
    }

    /// Wrap a sensor sample for publishing on `topic_id`.
    pub fn sensor(topic_id: u32, tlm: &SensorTlm) -> Result<Self, MessageError> {
        Ok(Self::new(topic_id, tlm.to_json()?))
    }

    /// Decode a sensor sample, checking the topic first.
    pub fn decode_sensor(&self, expected_topic: u32) -> Result<SensorTlm, MessageError> {
        if self.topic_id != expected_topic {
            return Err(MessageError::InvalidTopic {
                actual: self.topic_id,
                expected: expected_topic,
            });
        }
        SensorTlm::from_json(&self.payload)
    }
}
