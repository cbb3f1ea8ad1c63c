//! PWM capability interface.
//!
//! Abstracts the PWM peripheral behind the three operations the fan driver
//! needs (configure, enable, write) so the control code has no knowledge of
//! register layout or kernel interfaces. Backends:
//!
//! - [`MockPwm`](crate::mock::MockPwm) - in-memory, records every write
//! - [`SysfsPwm`](crate::sysfs::SysfsPwm) - Linux `/sys/class/pwm` driver

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// PWM peripheral clock in Hz (Raspberry Pi PLLD-derived PWM clock).
pub const PWM_CLOCK_HZ: u64 = 19_200_000;

/// Errors reported by PWM backends.
#[derive(Error, Debug)]
pub enum PwmError {
    /// Low-level I/O error while touching the peripheral.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peripheral could not be mapped.
    #[error("PWM mapping failed: {0}")]
    MapFailed(String),

    /// Operation attempted before a successful [`PwmInterface::map`].
    #[error("PWM peripheral not mapped")]
    NotMapped,

    /// Channel identifier outside what the peripheral exposes.
    #[error("Invalid PWM channel {0}")]
    InvalidChannel(u8),

    /// Channel configuration rejected by the backend.
    #[error("Invalid PWM configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for PWM operations.
pub type PwmResult<T> = Result<T, PwmError>;

bitflags! {
    /// Per-channel PWM mode flags.
    ///
    /// Bit positions follow the channel nibble of the BCM283x `CTL` register so
    /// a register-level backend can shift them into place directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PwmModeFlags: u8 {
        /// Serializer mode instead of PWM mode
        const SERIAL = 0b0000_0010;
        /// Repeat last data when the FIFO is empty
        const REPEAT_LAST = 0b0000_0100;
        /// Output high when no transmission is active
        const SILENCE_HIGH = 0b0000_1000;
        /// Inverted output polarity
        const INVERTED = 0b0001_0000;
        /// Take data from the FIFO instead of the data register
        const USE_FIFO = 0b0010_0000;
        /// Mark-space output instead of the PWM algorithm
        const MARK_SPACE = 0b1000_0000;
    }
}

/// Configuration for a single PWM channel.
///
/// `divisor` divides [`PWM_CLOCK_HZ`]; `range` is the number of divided clock
/// ticks in one period. Duty values written to the channel are in range units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmChannelConfig {
    pub divisor: u32,
    pub range: u32,
    pub mode: PwmModeFlags,
}

impl PwmChannelConfig {
    pub fn new(divisor: u32, range: u32, mode: PwmModeFlags) -> Self {
        Self {
            divisor,
            range,
            mode,
        }
    }

    /// Check the configuration can drive a real output.
    pub fn validate(&self) -> PwmResult<()> {
        if self.divisor == 0 {
            return Err(PwmError::InvalidConfig("divisor must be > 0".to_string()));
        }
        if self.range == 0 {
            return Err(PwmError::InvalidConfig("range must be > 0".to_string()));
        }
        Ok(())
    }

    /// Length of one PWM period in nanoseconds.
    pub fn period_ns(&self) -> u64 {
        (self.divisor as u64 * self.range as u64 * 1_000_000_000) / PWM_CLOCK_HZ
    }

    /// Convert a duty value in range units to nanoseconds of high time.
    ///
    /// Values beyond the range saturate at a full period.
    pub fn duty_ns(&self, value: u32) -> u64 {
        if self.range == 0 {
            return 0;
        }
        let value = value.min(self.range) as u64;
        self.period_ns() * value / self.range as u64
    }

    /// Output frequency in Hz.
    pub fn frequency_hz(&self) -> f64 {
        let period = self.period_ns();
        if period == 0 {
            0.0
        } else {
            1e9 / period as f64
        }
    }
}

impl Default for PwmChannelConfig {
    /// Fan channel setup used on the TableSat board.
    fn default() -> Self {
        Self {
            divisor: 1953,
            range: 5120,
            mode: PwmModeFlags::MARK_SPACE,
        }
    }
}

/// Interface for PWM control
///
/// Abstracts the PWM hardware for testability. A backend must be mapped
/// before any other call succeeds.
pub trait PwmInterface {
    /// Map the underlying peripheral.
    fn map(&mut self) -> PwmResult<()>;

    /// Apply divisor, range and mode flags to a channel.
    fn configure(&mut self, channel: u8, config: &PwmChannelConfig) -> PwmResult<()>;

    /// Start output on a channel.
    fn enable(&mut self, channel: u8) -> PwmResult<()>;

    /// Write a duty value (range units) to a channel.
    fn write(&mut self, channel: u8, value: u32) -> PwmResult<()>;
}

impl<P: PwmInterface + ?Sized> PwmInterface for Box<P> {
    fn map(&mut self) -> PwmResult<()> {
        (**self).map()
    }

    fn configure(&mut self, channel: u8, config: &PwmChannelConfig) -> PwmResult<()> {
        (**self).configure(channel, config)
    }

    fn enable(&mut self, channel: u8) -> PwmResult<()> {
        (**self).enable(channel)
    }

    fn write(&mut self, channel: u8, value: u32) -> PwmResult<()> {
        (**self).write(channel, value)
    }
}
