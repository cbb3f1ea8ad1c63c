//! Hardware drivers for the TableSat spin table.
//!
//! This crate provides the PWM capability interface and the fan output
//! driver built on it. The control code only ever sees [`pwm::PwmInterface`],
//! so the same driver runs against a real PWM chip or the in-memory backend.
//!
//! # Backends
//! - [`mock::MockPwm`] - in-memory, records every write
//! - [`sysfs::SysfsPwm`] - Linux `/sys/class/pwm` (Raspberry Pi PWM overlay)

pub mod fan;
pub mod mock;
pub mod pwm;
pub mod sysfs;

pub use fan::{FanChannelConfig, FanDriver, FanId, FAN_MAX_PWM, FAN_MIN_PWM, FAN_PWM_RANGE};
pub use pwm::{PwmChannelConfig, PwmError, PwmInterface, PwmModeFlags, PwmResult};
