//! Two-channel fan PWM output driver.
//!
//! Owns the A/B fan channels of the spin table. Commanded values are limited
//! to `[FAN_MIN_PWM, FAN_MAX_PWM]` before they reach hardware; a timed
//! per-channel override bypasses the limit so out-of-range stimulus can be
//! applied deliberately. If the PWM peripheral cannot be mapped the driver
//! keeps tracking commands but never writes to hardware.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::{error, info, warn};

use crate::pwm::{PwmChannelConfig, PwmInterface, PwmResult};

pub const FAN_MIN_PWM: u16 = 0;
pub const FAN_MAX_PWM: u16 = 2047;
/// Span of commandable fan values, used to size test-mode steps.
pub const FAN_PWM_RANGE: u16 = FAN_MAX_PWM - FAN_MIN_PWM;

/// Fan channel identifier
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    ValueEnum,
    Serialize,
    Deserialize,
)]
pub enum FanId {
    A,
    B,
}

impl FanId {
    pub fn index(self) -> usize {
        match self {
            FanId::A => 0,
            FanId::B => 1,
        }
    }
}

/// Hardware binding for one fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanChannelConfig {
    /// PWM peripheral channel driving this fan
    pub pwm_channel: u8,
    pub pwm: PwmChannelConfig,
}

impl FanChannelConfig {
    pub fn new(pwm_channel: u8) -> Self {
        Self {
            pwm_channel,
            pwm: PwmChannelConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct FanChannel {
    config: FanChannelConfig,
    pwm_cmd: u16,
    override_value: u16,
    override_enabled: bool,
    override_cycles: u32,
}

impl FanChannel {
    fn new(config: FanChannelConfig) -> Self {
        Self {
            config,
            pwm_cmd: 0,
            override_value: 0,
            override_enabled: false,
            override_cycles: 0,
        }
    }
}

/// Limit a raw command to the fan range, reporting whether it was clipped.
pub fn limit_pwm(raw: i32) -> (u16, bool) {
    let clamped = raw.clamp(FAN_MIN_PWM as i32, FAN_MAX_PWM as i32);
    (clamped as u16, clamped != raw)
}

/// PWM output driver for the A/B fan pair.
pub struct FanDriver<P: PwmInterface> {
    pwm: P,
    mapped: bool,
    channels: [FanChannel; 2],
    limit_count: u32,
    override_count: u32,
}

impl<P: PwmInterface> FanDriver<P> {
    /// Map the PWM peripheral and set up both fan channels.
    ///
    /// Mapping or configuration failure is reported and leaves the driver
    /// unmapped; it is never fatal.
    pub fn new(pwm: P, fan_a: FanChannelConfig, fan_b: FanChannelConfig) -> Self {
        let mut driver = Self {
            pwm,
            mapped: false,
            channels: [FanChannel::new(fan_a), FanChannel::new(fan_b)],
            limit_count: 0,
            override_count: 0,
        };

        match driver.init_hardware() {
            Ok(()) => {
                driver.mapped = true;
                info!(
                    "Fan PWM mapped: A on channel {}, B on channel {}",
                    fan_a.pwm_channel, fan_b.pwm_channel
                );
            }
            Err(e) => {
                error!("Fan PWM unavailable, commands will not reach hardware: {e}");
            }
        }

        driver
    }

    fn init_hardware(&mut self) -> PwmResult<()> {
        self.pwm.map()?;
        for ch in &self.channels {
            self.pwm.configure(ch.config.pwm_channel, &ch.config.pwm)?;
            self.pwm.enable(ch.config.pwm_channel)?;
        }
        Ok(())
    }

    /// Command a fan, returning `true` if the value had to be limited.
    ///
    /// With an override active the limited command is still recorded but the
    /// override value is what gets written. Each such write consumes one
    /// override cycle.
    pub fn set_pwm(&mut self, fan: FanId, raw: i32) -> bool {
        let (value, limited) = limit_pwm(raw);
        if limited {
            self.limit_count = self.limit_count.wrapping_add(1);
        }

        let ch = &mut self.channels[fan.index()];
        ch.pwm_cmd = value;

        let output = if ch.override_enabled {
            ch.override_value
        } else {
            value
        };

        if self.mapped {
            if let Err(e) = self.pwm.write(ch.config.pwm_channel, output as u32) {
                warn!("Fan {fan} PWM write of {output} failed: {e}");
            }
        }

        if ch.override_enabled {
            ch.override_cycles = ch.override_cycles.saturating_sub(1);
            if ch.override_cycles == 0 {
                ch.override_enabled = false;
                info!("Fan {fan} override ended");
            }
        }

        limited
    }

    /// Force a fan to `value` for the next `duration_cycles` commands.
    ///
    /// A zero duration clears any active override.
    pub fn set_override(&mut self, fan: FanId, value: u16, duration_cycles: u32) {
        let ch = &mut self.channels[fan.index()];
        if duration_cycles == 0 {
            if ch.override_enabled {
                info!("Fan {fan} override cleared");
            }
            ch.override_enabled = false;
            ch.override_cycles = 0;
            return;
        }

        ch.override_value = value;
        ch.override_cycles = duration_cycles;
        ch.override_enabled = true;
        self.override_count = self.override_count.wrapping_add(1);
        info!("Fan {fan} override to {value} for {duration_cycles} cycles");
    }

    /// Command both fans to zero.
    pub fn stop(&mut self) {
        for fan in FanId::iter() {
            self.set_pwm(fan, 0);
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Last limited command for a fan.
    pub fn pwm_cmd(&self, fan: FanId) -> u16 {
        self.channels[fan.index()].pwm_cmd
    }

    pub fn override_active(&self, fan: FanId) -> bool {
        self.channels[fan.index()].override_enabled
    }

    pub fn override_cycles_remaining(&self, fan: FanId) -> u32 {
        self.channels[fan.index()].override_cycles
    }

    pub fn limit_count(&self) -> u32 {
        self.limit_count
    }

    pub fn override_count(&self) -> u32 {
        self.override_count
    }

    pub fn reset_status(&mut self) {
        self.limit_count = 0;
        self.override_count = 0;
    }

    pub fn pwm(&self) -> &P {
        &self.pwm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPwm;

    fn driver() -> FanDriver<MockPwm> {
        FanDriver::new(
            MockPwm::new(),
            FanChannelConfig::new(0),
            FanChannelConfig::new(1),
        )
    }

    #[test]
    fn test_init_configures_both_channels() {
        let fans = driver();
        assert!(fans.is_mapped());
        for ch in 0..2 {
            let state = fans.pwm().channel(ch).unwrap();
            assert!(state.enabled);
            assert_eq!(state.config, Some(PwmChannelConfig::default()));
        }
    }

    #[test]
    fn test_limiting() {
        let mut fans = driver();

        assert!(!fans.set_pwm(FanId::A, 1000));
        assert_eq!(fans.pwm_cmd(FanId::A), 1000);

        assert!(fans.set_pwm(FanId::A, 5000));
        assert_eq!(fans.pwm_cmd(FanId::A), FAN_MAX_PWM);

        assert!(fans.set_pwm(FanId::B, -20));
        assert_eq!(fans.pwm_cmd(FanId::B), FAN_MIN_PWM);

        assert!(!fans.set_pwm(FanId::B, FAN_MAX_PWM as i32));
        assert_eq!(fans.limit_count(), 2);
        assert_eq!(fans.pwm().writes_to(0), vec![1000, 2047]);
        assert_eq!(fans.pwm().writes_to(1), vec![0, 2047]);
    }

    #[test]
    fn test_override_runs_for_duration() {
        let mut fans = driver();
        fans.set_override(FanId::A, 3000, 3);
        assert!(fans.override_active(FanId::A));

        for _ in 0..3 {
            fans.set_pwm(FanId::A, 500);
        }
        assert!(!fans.override_active(FanId::A));
        fans.set_pwm(FanId::A, 500);

        // Override bypasses limiting, then the regular command resumes
        assert_eq!(fans.pwm().writes_to(0), vec![3000, 3000, 3000, 500]);
        assert_eq!(fans.pwm_cmd(FanId::A), 500);
        assert!(fans.pwm().writes_to(1).is_empty());
    }

    #[test]
    fn test_zero_duration_clears_override() {
        let mut fans = driver();
        fans.set_override(FanId::B, 100, 10);
        fans.set_pwm(FanId::B, 7);
        assert_eq!(fans.override_cycles_remaining(FanId::B), 9);

        fans.set_override(FanId::B, 100, 0);
        assert!(!fans.override_active(FanId::B));
        fans.set_pwm(FanId::B, 7);
        assert_eq!(fans.pwm().writes_to(1), vec![100, 7]);
    }

    #[test]
    fn test_unmapped_tracks_without_writing() {
        let mut fans = FanDriver::new(
            MockPwm::unmappable(),
            FanChannelConfig::new(0),
            FanChannelConfig::new(1),
        );
        assert!(!fans.is_mapped());

        assert!(fans.set_pwm(FanId::A, 4000));
        assert_eq!(fans.pwm_cmd(FanId::A), FAN_MAX_PWM);

        // Override still counts down with no hardware behind it
        fans.set_override(FanId::B, 10, 1);
        fans.set_pwm(FanId::B, 0);
        assert!(!fans.override_active(FanId::B));
        assert!(fans.pwm().writes().is_empty());
    }

    #[test]
    fn test_bad_channel_config_degrades() {
        let fans = FanDriver::new(
            MockPwm::new(),
            FanChannelConfig::new(0),
            FanChannelConfig::new(9),
        );
        assert!(!fans.is_mapped());
    }

    #[test]
    fn test_reset_status() {
        let mut fans = driver();
        fans.set_pwm(FanId::A, 9999);
        fans.set_override(FanId::A, 1, 1);
        fans.reset_status();
        assert_eq!(fans.limit_count(), 0);
        assert_eq!(fans.override_count(), 0);
    }
}
