//! Spin table controller.
//!
//! Owns the parameter table, the fan driver and the control mode state
//! machine. One call to [`SatCtrl::execute`] is one control cycle; the caller
//! supplies whatever sensor messages arrived since the previous cycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hardware::fan::{FanDriver, FanId};
use hardware::pwm::PwmInterface;
use shared::ctrl_mode::{ControlMode, SunAcqState};
use shared::ctrl_table::{CtrlTable, TableError};
use shared::sensor_tlm::{BusMessage, SensorTlm};
use shared::status_tlm::{FanStatus, StatusTlm};
use tracing::{debug, error, info};

use crate::sun_acq::SunAcq;
use crate::test_mode::TestMode;

/// Controller startup settings.
#[derive(Debug, Clone)]
pub struct SatCtrlConfig {
    /// Name recorded in table dumps
    pub app_name: String,
    /// Control cycle period
    pub exec_period: Duration,
    /// Topic id carrying sensor telemetry
    pub sensor_topic: u32,
    /// Table loaded at construction
    pub table_file: Option<PathBuf>,
}

impl SatCtrlConfig {
    /// Whole control cycles per second, never less than one.
    pub fn exec_per_sec(&self) -> u32 {
        let period_ms = self.exec_period.as_millis().max(1);
        (1000 / period_ms).max(1) as u32
    }
}

/// Spin table controller.
pub struct SatCtrl<P: PwmInterface> {
    config: SatCtrlConfig,
    exec_per_sec: u32,
    table: CtrlTable,
    fans: FanDriver<P>,

    mode: ControlMode,
    init_mode: bool,
    time_in_mode: u32,
    exec_count: u32,

    test: TestMode,
    sun_acq: SunAcq,

    sensor: Option<SensorTlm>,
    sensor_msg_count: u32,
    sensor_msg_invalid_count: u32,
}

impl<P: PwmInterface> SatCtrl<P> {
    /// Build the controller, loading the default table if one is configured.
    ///
    /// A missing or bad default table is reported and leaves the table
    /// unloaded with zeroed parameters.
    pub fn new(config: SatCtrlConfig, fans: FanDriver<P>) -> Self {
        let mut table = CtrlTable::new(config.app_name.clone());
        if let Some(path) = &config.table_file {
            if let Err(e) = table.load_file(path) {
                error!("Default table {} not loaded: {e}", path.display());
            }
        }

        Self {
            exec_per_sec: config.exec_per_sec(),
            config,
            table,
            fans,
            mode: ControlMode::Idle,
            init_mode: true,
            time_in_mode: 0,
            exec_count: 0,
            test: TestMode::default(),
            sun_acq: SunAcq::default(),
            sensor: None,
            sensor_msg_count: 0,
            sensor_msg_invalid_count: 0,
        }
    }

    // ==================== Control cycle ====================

    /// Run one control cycle.
    ///
    /// Returns `true` if the caller should wait out the control period before
    /// the next cycle. Sun acquisition paces itself on sensor traffic instead.
    pub fn execute(&mut self, inbox: &[BusMessage]) -> bool {
        let fresh = inbox
            .iter()
            .filter_map(|msg| self.ingest(msg))
            .last();

        match self.mode {
            ControlMode::Test => self.run_test_mode(),
            ControlMode::SunAcq => self.run_sun_acq(fresh.as_ref()),
            ControlMode::Idle => {}
        }

        self.exec_count = self.exec_count.wrapping_add(1);
        if self.exec_count % self.exec_per_sec == 0 {
            self.time_in_mode += 1;
        }

        self.mode != ControlMode::SunAcq
    }

    /// Validate one bus message, returning the sample if it is usable.
    pub fn ingest(&mut self, msg: &BusMessage) -> Option<SensorTlm> {
        match msg.decode_sensor(self.config.sensor_topic) {
            Ok(tlm) => {
                self.sensor_msg_count = self.sensor_msg_count.wrapping_add(1);
                debug!(
                    "Sensor: dt {:.6}, rate ({:.6}, {:.6}, {:.6}), lux ({}, {})",
                    tlm.delta_time, tlm.rate.x, tlm.rate.y, tlm.rate.z, tlm.lux.a, tlm.lux.b
                );
                self.sensor = Some(tlm);
                Some(tlm)
            }
            Err(e) => {
                self.sensor_msg_invalid_count = self.sensor_msg_invalid_count.wrapping_add(1);
                error!("Received invalid sensor message: {e}");
                None
            }
        }
    }

    fn run_test_mode(&mut self) {
        if self.init_mode {
            self.init_mode = false;
            let params = self.table.data();
            self.test
                .init(params.test_steps, params.test_time_in_step, self.exec_per_sec);
            info!(
                "Test mode initialized: Steps {}, CyclesPerStep {}, PwmPerStep {}, TimeInStep {}",
                params.test_steps,
                self.test.cycles_per_step(),
                self.test.pwm_per_step(),
                params.test_time_in_step
            );
        }

        let pwm = self.test.next_pwm();
        self.fans.set_pwm(FanId::A, pwm);
        self.fans.set_pwm(FanId::B, pwm);
    }

    fn run_sun_acq(&mut self, sample: Option<&SensorTlm>) {
        if self.init_mode {
            self.init_mode = false;
            self.sun_acq.init();
        }

        if let Some(sample) = sample {
            if let Err(e) = self.sun_acq.update(sample, self.table.data()) {
                self.init_mode = true;
                error!("{e}");
            }
        }

        let (fan_a, fan_b) = self.sun_acq.fan_cmds();
        self.fans.set_pwm(FanId::A, fan_a);
        self.fans.set_pwm(FanId::B, fan_b);
    }

    // ==================== Commands ====================

    /// Switch control mode; the new mode initializes on its next cycle.
    pub fn set_mode(&mut self, mode: ControlMode) {
        let prev = self.mode;
        self.mode = mode;
        self.init_mode = true;
        self.time_in_mode = 0;
        self.exec_count = 0;
        info!("Control mode changed from {prev} to {mode}");
    }

    pub fn set_ctrl_gains(&mut self, pos_gain: f64, rate_gain: f64) {
        self.table.set_gains(pos_gain, rate_gain);
    }

    /// Override both fans for `duration_cycles` fan commands.
    pub fn override_fans(&mut self, duration_cycles: u32, pwm_a: u16, pwm_b: u16) {
        self.fans.set_override(FanId::A, pwm_a, duration_cycles);
        self.fans.set_override(FanId::B, pwm_b, duration_cycles);
    }

    pub fn load_table(&mut self, path: &Path) -> Result<usize, TableError> {
        self.table.load_file(path)
    }

    pub fn dump_table(&self, path: &Path) -> Result<(), TableError> {
        self.table.dump_file(path)
    }

    /// Clear table, fan and sensor status counters.
    pub fn reset_status(&mut self) {
        self.table.reset_status();
        self.fans.reset_status();
        self.sensor_msg_count = 0;
        self.sensor_msg_invalid_count = 0;
    }

    /// Command both fans to zero.
    pub fn stop_fans(&mut self) {
        self.fans.stop();
    }

    // ==================== Status ====================

    /// Controller portion of the status telemetry.
    pub fn status(&self) -> StatusTlm {
        let fan = |id| FanStatus {
            pwm_cmd: self.fans.pwm_cmd(id),
            override_active: self.fans.override_active(id),
        };

        StatusTlm {
            ctrl_mode: self.mode,
            time_in_mode: self.time_in_mode,
            sun_acq_state: self.sun_acq_state(),
            fan_io_mapped: self.fans.is_mapped(),
            fan_a: fan(FanId::A),
            fan_b: fan(FanId::B),
            tbl_loaded: self.table.is_loaded(),
            tbl_last_load_status: self.table.last_load_status(),
            tbl_last_load_count: self.table.last_load_count(),
            sensor_msg_count: self.sensor_msg_count,
            sensor_msg_invalid_count: self.sensor_msg_invalid_count,
            hold_ctrl: self.sun_acq.hold_ctrl(),
            ..StatusTlm::default()
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Sun acquisition sub-state, `Undefined` outside SUN_ACQ.
    pub fn sun_acq_state(&self) -> SunAcqState {
        if self.mode == ControlMode::SunAcq {
            self.sun_acq.state()
        } else {
            SunAcqState::Undefined
        }
    }

    pub fn sun_acq(&self) -> &SunAcq {
        &self.sun_acq
    }

    pub fn time_in_mode(&self) -> u32 {
        self.time_in_mode
    }

    pub fn exec_period(&self) -> Duration {
        self.config.exec_period
    }

    pub fn sensor_topic(&self) -> u32 {
        self.config.sensor_topic
    }

    /// Most recent valid sensor sample.
    pub fn last_sensor(&self) -> Option<&SensorTlm> {
        self.sensor.as_ref()
    }

    pub fn table(&self) -> &CtrlTable {
        &self.table
    }

    pub fn fans(&self) -> &FanDriver<P> {
        &self.fans
    }

    #[cfg(test)]
    pub(crate) fn sun_acq_mut(&mut self) -> &mut SunAcq {
        &mut self.sun_acq
    }
}
