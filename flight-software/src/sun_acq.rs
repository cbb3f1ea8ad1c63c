//! Sun acquisition: survey, acquire, hold.
//!
//! SURVEY spins the table one full turn on fan B while recording the peak
//! combined light. ACQUIRE keeps spinning until the light is back within 10%
//! of that peak. HOLD brakes both fans.

use shared::ctrl_mode::SunAcqState;
use shared::ctrl_table::CtrlTableData;
use shared::sensor_tlm::SensorTlm;
use thiserror::Error;
use tracing::{debug, info};

/// Rotation that completes a survey, in degrees.
pub const SURVEY_ROTATION_DEG: f64 = 360.0;

/// Fraction of the survey peak light accepted as "on target".
pub const ACQUIRE_TOLERANCE_FRACTION: f64 = 0.1;

/// Sub-state found in a value the state machine cannot run.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid SunAcq state {0}, resetting the controller")]
pub struct InvalidSunAcqState(pub SunAcqState);

/// Sun acquisition state and fan commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SunAcq {
    state: SunAcqState,
    /// Spin rate about Z in deg/s
    spin_rate: f64,
    /// Combined light from the most recent sample
    total_light: f64,
    angle_delta: f64,
    survey_rotation: f64,
    survey_max_light: f64,
    acquire_tolerance: f64,
    hold_ctrl: f64,
    fan_a_cmd: i32,
    fan_b_cmd: i32,
}

impl SunAcq {
    /// Start over in SURVEY with cleared accumulators.
    pub fn init(&mut self) {
        *self = Self {
            state: SunAcqState::Survey,
            ..Self::default()
        };
    }

    /// Run one cycle with a fresh sample.
    pub fn update(
        &mut self,
        sample: &SensorTlm,
        params: &CtrlTableData,
    ) -> Result<(), InvalidSunAcqState> {
        self.total_light = sample.total_lux();
        self.spin_rate = sample.rate.z.to_degrees();
        self.angle_delta = self.spin_rate * sample.delta_time;

        match self.state {
            SunAcqState::Survey => {
                self.fan_a_cmd = 0;
                self.fan_b_cmd = params.survey_fan_pwm as i32;
                self.survey_rotation += self.angle_delta.abs();
                debug!("Survey rotation {:.3} deg", self.survey_rotation);

                if self.survey_rotation < SURVEY_ROTATION_DEG {
                    if self.total_light > self.survey_max_light {
                        self.survey_max_light = self.total_light;
                    }
                } else {
                    self.state = SunAcqState::Acquire;
                    self.acquire_tolerance = self.survey_max_light * ACQUIRE_TOLERANCE_FRACTION;
                    info!(
                        "Survey complete: max light {}, acquire tolerance {}",
                        self.survey_max_light, self.acquire_tolerance
                    );
                }
            }
            SunAcqState::Acquire => {
                let light_delta = (self.survey_max_light - self.total_light).abs();
                if light_delta < self.acquire_tolerance {
                    self.state = SunAcqState::Hold;
                    info!("Acquired light source at {}", self.total_light);
                }
            }
            SunAcqState::Hold => {
                // TODO: map hold_ctrl onto differential fan commands; until then HOLD brakes
                self.hold_ctrl =
                    self.spin_rate * params.rate_gain + self.angle_delta * params.pos_gain;
                debug!("Hold control {:.6}", self.hold_ctrl);
                self.fan_a_cmd = 0;
                self.fan_b_cmd = 0;
            }
            SunAcqState::Undefined => return Err(InvalidSunAcqState(self.state)),
        }

        Ok(())
    }

    pub fn state(&self) -> SunAcqState {
        self.state
    }

    /// Current `(fan A, fan B)` commands.
    pub fn fan_cmds(&self) -> (i32, i32) {
        (self.fan_a_cmd, self.fan_b_cmd)
    }

    pub fn spin_rate(&self) -> f64 {
        self.spin_rate
    }

    pub fn survey_rotation(&self) -> f64 {
        self.survey_rotation
    }

    pub fn survey_max_light(&self) -> f64 {
        self.survey_max_light
    }

    pub fn acquire_tolerance(&self) -> f64 {
        self.acquire_tolerance
    }

    pub fn hold_ctrl(&self) -> f64 {
        self.hold_ctrl
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: SunAcqState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> CtrlTableData {
        CtrlTableData {
            survey_fan_pwm: 1200,
            pos_gain: 2.0,
            rate_gain: 0.5,
            test_steps: 4,
            test_time_in_step: 2,
        }
    }

    /// Sample turning `deg` degrees in 0.1 s with the given light split.
    fn sample(deg: f64, lux_a: u32, lux_b: u32) -> SensorTlm {
        SensorTlm::new(0.1, (deg / 0.1).to_radians(), lux_a, lux_b)
    }

    #[test]
    fn test_init_resets_accumulators() {
        let mut acq = SunAcq::default();
        assert_eq!(acq.state(), SunAcqState::Undefined);

        acq.init();
        acq.update(&sample(90.0, 300, 300), &params()).unwrap();
        assert!(acq.survey_rotation() > 0.0);

        acq.init();
        assert_eq!(acq.state(), SunAcqState::Survey);
        assert_eq!(acq.survey_rotation(), 0.0);
        assert_eq!(acq.survey_max_light(), 0.0);
    }

    #[test]
    fn test_survey_to_acquire_at_full_turn() {
        let mut acq = SunAcq::default();
        acq.init();
        let p = params();

        acq.update(&sample(120.0, 100, 100), &p).unwrap();
        assert_eq!(acq.fan_cmds(), (0, 1200));
        acq.update(&sample(120.0, 600, 400), &p).unwrap();
        acq.update(&sample(119.0, 200, 200), &p).unwrap();
        assert_eq!(acq.state(), SunAcqState::Survey);
        assert_relative_eq!(acq.survey_rotation(), 359.0, epsilon = 1e-9);

        // Light seen on the completing sample is not part of the survey
        acq.update(&sample(5.0, 5000, 5000), &p).unwrap();
        assert_eq!(acq.state(), SunAcqState::Acquire);
        assert_relative_eq!(acq.survey_max_light(), 1000.0);
        assert_relative_eq!(acq.acquire_tolerance(), 100.0);
    }

    #[test]
    fn test_survey_counts_reverse_spin() {
        let mut acq = SunAcq::default();
        acq.init();
        for _ in 0..4 {
            acq.update(&sample(-100.0, 10, 10), &params()).unwrap();
        }
        assert_eq!(acq.state(), SunAcqState::Acquire);
    }

    #[test]
    fn test_acquire_then_hold() {
        let mut acq = SunAcq::default();
        acq.init();
        let p = params();
        acq.update(&sample(200.0, 500, 500), &p).unwrap();
        acq.update(&sample(200.0, 0, 0), &p).unwrap();
        assert_eq!(acq.state(), SunAcqState::Acquire);

        // 850 is 150 away from the peak, outside the 100 tolerance
        acq.update(&sample(30.0, 425, 425), &p).unwrap();
        assert_eq!(acq.state(), SunAcqState::Acquire);
        assert_eq!(acq.fan_cmds(), (0, 1200));

        acq.update(&sample(30.0, 480, 470), &p).unwrap();
        assert_eq!(acq.state(), SunAcqState::Hold);

        acq.update(&sample(10.0, 480, 470), &p).unwrap();
        assert_eq!(acq.fan_cmds(), (0, 0));
        // 100 deg/s * 0.5 + 10 deg * 2.0
        assert_relative_eq!(acq.hold_ctrl(), 70.0, epsilon = 1e-9);
    }

    #[test]
    fn test_undefined_state_is_rejected() {
        let mut acq = SunAcq::default();
        acq.init();
        acq.force_state(SunAcqState::Undefined);
        assert_eq!(
            acq.update(&sample(1.0, 1, 1), &params()),
            Err(InvalidSunAcqState(SunAcqState::Undefined))
        );
    }
}
