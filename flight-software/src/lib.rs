//! TableSat flight software.
//!
//! Attitude control for a fan-driven spin table: a controller running the
//! IDLE / TEST / SUN_ACQ mode state machine, the sensor pipe feeding it, the
//! command set, and the threaded application that ties them together.

pub mod commands;
pub mod sat_ctrl;
pub mod sensor_pipe;
pub mod sun_acq;
pub mod tbl_sat_app;
pub mod test_mode;

pub use commands::{CmdError, CmdMgr, Command};
pub use sat_ctrl::{SatCtrl, SatCtrlConfig};
pub use tbl_sat_app::{AppConfig, TblSatApp};
