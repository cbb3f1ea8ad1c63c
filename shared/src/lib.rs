//! Types shared between the TableSat hardware layer and flight software.

pub mod ctrl_mode;
pub mod ctrl_table;
pub mod sensor_tlm;
pub mod status_tlm;

pub use ctrl_mode::{ControlMode, SunAcqState};
pub use ctrl_table::{CtrlTable, CtrlTableData, LoadStatus, TableError};
pub use sensor_tlm::{BusMessage, MessageError, SensorTlm, SENSOR_TLM_TOPIC};
pub use status_tlm::{FanStatus, StatusTlm};
