//! In-memory PWM backend.
//!
//! Tracks channel configuration and every duty write without touching
//! hardware. Used by tests and on hosts with no PWM peripheral.

use std::collections::HashMap;

use crate::pwm::{PwmChannelConfig, PwmError, PwmInterface, PwmResult};

/// Number of channels exposed by the mock peripheral.
pub const MOCK_PWM_CHANNELS: u8 = 2;

/// Simulated PWM channel state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockChannel {
    pub config: Option<PwmChannelConfig>,
    pub enabled: bool,
    pub value: u32,
}

/// In-memory PWM peripheral.
#[derive(Debug, Default)]
pub struct MockPwm {
    fail_map: bool,
    mapped: bool,
    channels: HashMap<u8, MockChannel>,
    writes: Vec<(u8, u32)>,
}

impl MockPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose [`map`](PwmInterface::map) always fails.
    pub fn unmappable() -> Self {
        Self {
            fail_map: true,
            ..Self::default()
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn channel(&self, channel: u8) -> Option<&MockChannel> {
        self.channels.get(&channel)
    }

    /// Every `(channel, value)` written, oldest first.
    pub fn writes(&self) -> &[(u8, u32)] {
        &self.writes
    }

    /// Values written to one channel, oldest first.
    pub fn writes_to(&self, channel: u8) -> Vec<u32> {
        self.writes
            .iter()
            .filter(|(ch, _)| *ch == channel)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    fn check(&self, channel: u8) -> PwmResult<()> {
        if !self.mapped {
            return Err(PwmError::NotMapped);
        }
        if channel >= MOCK_PWM_CHANNELS {
            return Err(PwmError::InvalidChannel(channel));
        }
        Ok(())
    }
}

impl PwmInterface for MockPwm {
    fn map(&mut self) -> PwmResult<()> {
        if self.fail_map {
            return Err(PwmError::MapFailed("mock configured to fail".to_string()));
        }
        self.mapped = true;
        Ok(())
    }

    fn configure(&mut self, channel: u8, config: &PwmChannelConfig) -> PwmResult<()> {
        self.check(channel)?;
        config.validate()?;
        self.channels.entry(channel).or_default().config = Some(*config);
        Ok(())
    }

    fn enable(&mut self, channel: u8) -> PwmResult<()> {
        self.check(channel)?;
        self.channels.entry(channel).or_default().enabled = true;
        Ok(())
    }

    fn write(&mut self, channel: u8, value: u32) -> PwmResult<()> {
        self.check(channel)?;
        self.channels.entry(channel).or_default().value = value;
        self.writes.push((channel, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_map() {
        let mut pwm = MockPwm::new();
        assert!(matches!(pwm.write(0, 10), Err(PwmError::NotMapped)));

        pwm.map().unwrap();
        pwm.write(0, 10).unwrap();
        assert_eq!(pwm.writes(), &[(0, 10)]);
    }

    #[test]
    fn test_unmappable() {
        let mut pwm = MockPwm::unmappable();
        assert!(matches!(pwm.map(), Err(PwmError::MapFailed(_))));
        assert!(!pwm.is_mapped());
    }

    #[test]
    fn test_invalid_channel() {
        let mut pwm = MockPwm::new();
        pwm.map().unwrap();
        assert!(matches!(pwm.enable(7), Err(PwmError::InvalidChannel(7))));
    }

    #[test]
    fn test_configure_and_enable() {
        let mut pwm = MockPwm::new();
        pwm.map().unwrap();
        pwm.configure(1, &PwmChannelConfig::default()).unwrap();
        pwm.enable(1).unwrap();
        pwm.write(1, 300).unwrap();

        let ch = pwm.channel(1).unwrap();
        assert!(ch.enabled);
        assert_eq!(ch.value, 300);
        assert_eq!(ch.config, Some(PwmChannelConfig::default()));
        assert_eq!(pwm.writes_to(1), vec![300]);
        assert!(pwm.writes_to(0).is_empty());
    }
}
