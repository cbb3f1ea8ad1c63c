//! Application commands and the command manager.
//!
//! Commands travel as JSON lines tagged by `cmd`, for example:
//! ```json
//! {"cmd": "set-mode", "mode": "SUN_ACQ"}
//! {"cmd": "set-ctrl-gains", "pos-gain": 1.0, "rate-gain": 0.5}
//! {"cmd": "override-fans", "duration-cycles": 50, "pwm-a": 0, "pwm-b": 1500}
//! ```

use std::path::PathBuf;

use hardware::pwm::PwmInterface;
use serde::{Deserialize, Serialize};
use shared::ctrl_mode::{ControlMode, InvalidModeError};
use shared::ctrl_table::TableError;
use shared::status_tlm::StatusTlm;
use thiserror::Error;
use tracing::{error, info};

use crate::sat_ctrl::SatCtrl;

/// Version reported by the no-op command.
pub const APP_VERSION: &str = "0.9";

/// Errors decoding or executing a command.
#[derive(Error, Debug)]
pub enum CmdError {
    /// Command line is not a recognized command.
    #[error("Invalid command: {0}")]
    Decode(#[from] serde_json::Error),

    /// Mode outside IDLE/TEST/SUN_ACQ.
    #[error(transparent)]
    InvalidMode(#[from] InvalidModeError),

    /// Table load or dump failed.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Mode argument, accepted by name or by number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModeArg {
    Code(u64),
    Name(String),
}

impl TryFrom<&ModeArg> for ControlMode {
    type Error = InvalidModeError;

    fn try_from(arg: &ModeArg) -> Result<Self, Self::Error> {
        match arg {
            ModeArg::Code(code) => u8::try_from(*code)
                .map_err(|_| InvalidModeError(code.to_string()))
                .and_then(ControlMode::try_from),
            ModeArg::Name(name) => name.parse(),
        }
    }
}

impl From<ControlMode> for ModeArg {
    fn from(mode: ControlMode) -> Self {
        ModeArg::Name(mode.as_str().to_string())
    }
}

/// Commands accepted by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum Command {
    NoOp,
    ResetApp,
    SetMode {
        mode: ModeArg,
    },
    SetCtrlGains {
        pos_gain: f64,
        rate_gain: f64,
    },
    OverrideFans {
        duration_cycles: u32,
        pwm_a: u16,
        pwm_b: u16,
    },
    LoadTbl {
        path: PathBuf,
    },
    DumpTbl {
        path: PathBuf,
    },
    SendStatus,
}

impl Command {
    pub fn from_json(line: &str) -> Result<Self, CmdError> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Dispatches commands to the controller and counts the outcomes.
#[derive(Debug, Default)]
pub struct CmdMgr {
    valid_count: u32,
    invalid_count: u32,
}

impl CmdMgr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid_count(&self) -> u32 {
        self.valid_count
    }

    pub fn invalid_count(&self) -> u32 {
        self.invalid_count
    }

    /// Decode and dispatch one command line.
    pub fn dispatch_line<P: PwmInterface>(
        &mut self,
        line: &str,
        ctrl: &mut SatCtrl<P>,
    ) -> Result<Option<StatusTlm>, CmdError> {
        match Command::from_json(line) {
            Ok(cmd) => self.dispatch(cmd, ctrl),
            Err(e) => {
                self.invalid_count = self.invalid_count.wrapping_add(1);
                error!("{e}");
                Err(e)
            }
        }
    }

    /// Run a command, returning a status snapshot if the command produces one.
    pub fn dispatch<P: PwmInterface>(
        &mut self,
        cmd: Command,
        ctrl: &mut SatCtrl<P>,
    ) -> Result<Option<StatusTlm>, CmdError> {
        if cmd == Command::ResetApp {
            self.valid_count = 0;
            self.invalid_count = 0;
            ctrl.reset_status();
            info!("Reset app command received");
            return Ok(None);
        }

        match Self::execute(&cmd, ctrl) {
            Ok(()) => {
                self.valid_count = self.valid_count.wrapping_add(1);
                Ok(match cmd {
                    Command::SendStatus => Some(self.status(ctrl)),
                    _ => None,
                })
            }
            Err(e) => {
                self.invalid_count = self.invalid_count.wrapping_add(1);
                error!("Command {cmd:?} failed: {e}");
                Err(e)
            }
        }
    }

    fn execute<P: PwmInterface>(cmd: &Command, ctrl: &mut SatCtrl<P>) -> Result<(), CmdError> {
        match cmd {
            Command::NoOp => {
                info!("No operation command received for TBL_SAT version {APP_VERSION}");
            }
            Command::ResetApp | Command::SendStatus => {}
            Command::SetMode { mode } => ctrl.set_mode(ControlMode::try_from(mode)?),
            Command::SetCtrlGains {
                pos_gain,
                rate_gain,
            } => ctrl.set_ctrl_gains(*pos_gain, *rate_gain),
            Command::OverrideFans {
                duration_cycles,
                pwm_a,
                pwm_b,
            } => ctrl.override_fans(*duration_cycles, *pwm_a, *pwm_b),
            Command::LoadTbl { path } => {
                ctrl.load_table(path)?;
            }
            Command::DumpTbl { path } => ctrl.dump_table(path)?,
        }
        Ok(())
    }

    /// Full status snapshot: controller state plus command counters.
    pub fn status<P: PwmInterface>(&self, ctrl: &SatCtrl<P>) -> StatusTlm {
        StatusTlm {
            valid_cmd_count: self.valid_count,
            invalid_cmd_count: self.invalid_count,
            ..ctrl.status()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat_ctrl::SatCtrlConfig;
    use hardware::fan::{FanChannelConfig, FanDriver};
    use hardware::mock::MockPwm;
    use std::time::Duration;

    fn ctrl() -> SatCtrl<MockPwm> {
        let config = SatCtrlConfig {
            app_name: "TBL_SAT".to_string(),
            exec_period: Duration::from_millis(100),
            sensor_topic: 1,
            table_file: None,
        };
        let fans = FanDriver::new(
            MockPwm::new(),
            FanChannelConfig::new(0),
            FanChannelConfig::new(1),
        );
        SatCtrl::new(config, fans)
    }

    #[test]
    fn test_decode_commands() {
        assert_eq!(
            Command::from_json(r#"{"cmd": "set-mode", "mode": "TEST"}"#).unwrap(),
            Command::SetMode {
                mode: ModeArg::Name("TEST".to_string())
            }
        );
        assert_eq!(
            Command::from_json(r#"{"cmd": "set-mode", "mode": 2}"#).unwrap(),
            Command::SetMode {
                mode: ModeArg::Code(2)
            }
        );
        assert_eq!(
            Command::from_json(
                r#"{"cmd": "override-fans", "duration-cycles": 5, "pwm-a": 10, "pwm-b": 20}"#
            )
            .unwrap(),
            Command::OverrideFans {
                duration_cycles: 5,
                pwm_a: 10,
                pwm_b: 20
            }
        );
        assert!(Command::from_json(r#"{"cmd": "self-destruct"}"#).is_err());
    }

    #[test]
    fn test_encoded_command_decodes() {
        let cmd = Command::SetMode {
            mode: ControlMode::SunAcq.into(),
        };
        let line = cmd.to_json().unwrap();
        assert!(line.contains("\"cmd\":\"set-mode\""));
        assert_eq!(Command::from_json(&line).unwrap(), cmd);
    }

    #[test]
    fn test_set_mode_by_name_and_number() {
        let mut mgr = CmdMgr::new();
        let mut ctrl = ctrl();

        mgr.dispatch_line(r#"{"cmd": "set-mode", "mode": "SUN_ACQ"}"#, &mut ctrl)
            .unwrap();
        assert_eq!(ctrl.mode(), ControlMode::SunAcq);

        mgr.dispatch_line(r#"{"cmd": "set-mode", "mode": 1}"#, &mut ctrl)
            .unwrap();
        assert_eq!(ctrl.mode(), ControlMode::Test);
        assert_eq!(mgr.valid_count(), 2);
    }

    #[test]
    fn test_out_of_range_mode_rejected() {
        let mut mgr = CmdMgr::new();
        let mut ctrl = ctrl();
        ctrl.set_mode(ControlMode::Test);

        for line in [
            r#"{"cmd": "set-mode", "mode": 3}"#,
            r#"{"cmd": "set-mode", "mode": 300}"#,
            r#"{"cmd": "set-mode", "mode": "SPIN"}"#,
        ] {
            assert!(matches!(
                mgr.dispatch_line(line, &mut ctrl),
                Err(CmdError::InvalidMode(_))
            ));
        }
        assert_eq!(ctrl.mode(), ControlMode::Test);
        assert_eq!(mgr.invalid_count(), 3);
        assert_eq!(mgr.valid_count(), 0);
    }

    #[test]
    fn test_failed_table_load_counts_invalid() {
        let mut mgr = CmdMgr::new();
        let mut ctrl = ctrl();
        let result = mgr.dispatch(
            Command::LoadTbl {
                path: PathBuf::from("/nonexistent/tbl.json"),
            },
            &mut ctrl,
        );
        assert!(matches!(result, Err(CmdError::Table(_))));
        assert_eq!(mgr.invalid_count(), 1);
    }

    #[test]
    fn test_undecodable_line_counts_invalid() {
        let mut mgr = CmdMgr::new();
        let mut ctrl = ctrl();
        assert!(matches!(
            mgr.dispatch_line("not json", &mut ctrl),
            Err(CmdError::Decode(_))
        ));
        assert_eq!(mgr.invalid_count(), 1);
    }

    #[test]
    fn test_send_status_and_reset() {
        let mut mgr = CmdMgr::new();
        let mut ctrl = ctrl();

        mgr.dispatch(Command::NoOp, &mut ctrl).unwrap();
        let _ = mgr.dispatch_line("garbage", &mut ctrl);

        let status = mgr
            .dispatch(Command::SendStatus, &mut ctrl)
            .unwrap()
            .unwrap();
        assert_eq!(status.valid_cmd_count, 2);
        assert_eq!(status.invalid_cmd_count, 1);
        assert_eq!(status.ctrl_mode, ControlMode::Idle);

        assert!(mgr.dispatch(Command::ResetApp, &mut ctrl).unwrap().is_none());
        assert_eq!(mgr.valid_count(), 0);
        assert_eq!(mgr.invalid_count(), 0);
    }

    #[test]
    fn test_gain_and_override_commands() {
        let mut mgr = CmdMgr::new();
        let mut ctrl = ctrl();

        mgr.dispatch(
            Command::SetCtrlGains {
                pos_gain: 1.25,
                rate_gain: 0.5,
            },
            &mut ctrl,
        )
        .unwrap();
        assert_eq!(ctrl.table().data().pos_gain, 1.25);

        mgr.dispatch(
            Command::OverrideFans {
                duration_cycles: 3,
                pwm_a: 100,
                pwm_b: 200,
            },
            &mut ctrl,
        )
        .unwrap();
        let status = ctrl.status();
        assert!(status.fan_a.override_active);
        assert!(status.fan_b.override_active);
    }
}
