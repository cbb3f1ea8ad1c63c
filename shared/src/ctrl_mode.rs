//! Controller mode enumerations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Top-level control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMode {
    /// Fans untouched, sensor traffic drained
    #[default]
    Idle,
    /// Staircase PWM sweep for fan characterization
    Test,
    /// Survey, acquire and hold on a light source
    SunAcq,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::Idle => "IDLE",
            ControlMode::Test => "TEST",
            ControlMode::SunAcq => "SUN_ACQ",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a mode value outside IDLE/TEST/SUN_ACQ.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid control mode {0}")]
pub struct InvalidModeError(pub String);

impl TryFrom<u8> for ControlMode {
    type Error = InvalidModeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ControlMode::Idle),
            1 => Ok(ControlMode::Test),
            2 => Ok(ControlMode::SunAcq),
            other => Err(InvalidModeError(other.to_string())),
        }
    }
}

impl FromStr for ControlMode {
    type Err = InvalidModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "IDLE" => Ok(ControlMode::Idle),
            "TEST" => Ok(ControlMode::Test),
            "SUN_ACQ" | "SUNACQ" => Ok(ControlMode::SunAcq),
            _ => s
                .trim()
                .parse::<u8>()
                .map_err(|_| InvalidModeError(s.to_string()))
                .and_then(ControlMode::try_from),
        }
    }
}

/// Sun-acquisition sub-state, meaningful only in [`ControlMode::SunAcq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SunAcqState {
    #[default]
    Undefined,
    Survey,
    Acquire,
    Hold,
}

impl fmt::Display for SunAcqState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SunAcqState::Undefined => "UNDEFINED",
            SunAcqState::Survey => "SURVEY",
            SunAcqState::Acquire => "ACQUIRE",
            SunAcqState::Hold => "HOLD",
        };
        f.write_str(s)
    }
}
