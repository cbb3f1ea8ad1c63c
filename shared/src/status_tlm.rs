//! Status telemetry snapshot published by the control application.

use serde::{Deserialize, Serialize};

use crate::ctrl_mode::{ControlMode, SunAcqState};
use crate::ctrl_table::LoadStatus;

/// Per-fan output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FanStatus {
    /// Last limited command
    pub pwm_cmd: u16,
    pub override_active: bool,
}

/// Point-in-time application status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusTlm {
    pub valid_cmd_count: u32,
    pub invalid_cmd_count: u32,

    pub ctrl_mode: ControlMode,
    /// Whole seconds spent in the current mode
    pub time_in_mode: u32,
    pub sun_acq_state: SunAcqState,

    /// `false` when the PWM peripheral could not be mapped
    pub fan_io_mapped: bool,
    pub fan_a: FanStatus,
    pub fan_b: FanStatus,

    pub tbl_loaded: bool,
    pub tbl_last_load_status: LoadStatus,
    pub tbl_last_load_count: usize,

    pub sensor_msg_count: u32,
    pub sensor_msg_invalid_count: u32,

    /// Most recent HOLD feedback value (computed, not applied to the fans)
    pub hold_ctrl: f64,
}

impl StatusTlm {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
