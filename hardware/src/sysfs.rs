//! Linux sysfs PWM backend.
//!
//! Drives a kernel PWM chip through `/sys/class/pwm/pwmchipN`. Mapping checks
//! the chip exists and reads how many channels it exposes; configuring a
//! channel exports it and writes its period and polarity; duty writes are
//! converted from range units to nanoseconds.
//!
//! # Example
//!
//! ```no_run
//! use hardware::pwm::{PwmChannelConfig, PwmInterface};
//! use hardware::sysfs::SysfsPwm;
//!
//! let mut pwm = SysfsPwm::new("/sys/class/pwm/pwmchip0");
//! pwm.map()?;
//! pwm.configure(0, &PwmChannelConfig::default())?;
//! pwm.enable(0)?;
//! pwm.write(0, 2560)?;
//! # Ok::<(), hardware::pwm::PwmError>(())
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::pwm::{PwmChannelConfig, PwmError, PwmInterface, PwmModeFlags, PwmResult};

/// Default PWM chip on a Raspberry Pi with the `pwm-2chan` overlay.
pub const DEFAULT_PWM_CHIP: &str = "/sys/class/pwm/pwmchip0";

/// How long to wait for the kernel to create an exported channel directory.
const EXPORT_WAIT: Duration = Duration::from_millis(10);
const EXPORT_RETRIES: usize = 20;

/// Sysfs-backed PWM chip.
pub struct SysfsPwm {
    chip: PathBuf,
    npwm: Option<u8>,
    configs: HashMap<u8, PwmChannelConfig>,
}

impl SysfsPwm {
    pub fn new(chip: impl Into<PathBuf>) -> Self {
        Self {
            chip: chip.into(),
            npwm: None,
            configs: HashMap::new(),
        }
    }

    pub fn chip(&self) -> &Path {
        &self.chip
    }

    fn channel_dir(&self, channel: u8) -> PathBuf {
        self.chip.join(format!("pwm{channel}"))
    }

    fn check(&self, channel: u8) -> PwmResult<()> {
        match self.npwm {
            None => Err(PwmError::NotMapped),
            Some(n) if channel >= n => Err(PwmError::InvalidChannel(channel)),
            Some(_) => Ok(()),
        }
    }

    fn write_attr(&self, channel: u8, attr: &str, value: &str) -> PwmResult<()> {
        let path = self.channel_dir(channel).join(attr);
        debug!("{} <- {}", path.display(), value);
        fs::write(&path, value)?;
        Ok(())
    }

    fn export(&self, channel: u8) -> PwmResult<()> {
        let dir = self.channel_dir(channel);
        if dir.exists() {
            return Ok(());
        }

        fs::write(self.chip.join("export"), channel.to_string())?;

        for _ in 0..EXPORT_RETRIES {
            if dir.exists() {
                return Ok(());
            }
            thread::sleep(EXPORT_WAIT);
        }
        Err(PwmError::MapFailed(format!(
            "{} did not appear after export",
            dir.display()
        )))
    }
}

impl PwmInterface for SysfsPwm {
    fn map(&mut self) -> PwmResult<()> {
        if !self.chip.is_dir() {
            return Err(PwmError::MapFailed(format!(
                "PWM chip {} not found",
                self.chip.display()
            )));
        }

        let npwm = fs::read_to_string(self.chip.join("npwm"))?;
        let npwm: u8 = npwm.trim().parse().map_err(|_| {
            PwmError::MapFailed(format!("Invalid npwm value: {}", npwm.trim()))
        })?;

        info!("Mapped {} with {} channels", self.chip.display(), npwm);
        self.npwm = Some(npwm);
        Ok(())
    }

    fn configure(&mut self, channel: u8, config: &PwmChannelConfig) -> PwmResult<()> {
        self.check(channel)?;
        config.validate()?;
        if config
            .mode
            .intersects(PwmModeFlags::SERIAL | PwmModeFlags::USE_FIFO)
        {
            return Err(PwmError::InvalidConfig(format!(
                "sysfs PWM does not support mode {:?}",
                config.mode
            )));
        }

        self.export(channel)?;

        // Duty must never exceed the period, so clear it before changing period
        self.write_attr(channel, "duty_cycle", "0")?;
        self.write_attr(channel, "period", &config.period_ns().to_string())?;
        let polarity = if config.mode.contains(PwmModeFlags::INVERTED) {
            "inversed"
        } else {
            "normal"
        };
        self.write_attr(channel, "polarity", polarity)?;

        self.configs.insert(channel, *config);
        Ok(())
    }

    fn enable(&mut self, channel: u8) -> PwmResult<()> {
        self.check(channel)?;
        self.write_attr(channel, "enable", "1")
    }

    fn write(&mut self, channel: u8, value: u32) -> PwmResult<()> {
        self.check(channel)?;
        let config = self.configs.get(&channel).ok_or_else(|| {
            PwmError::InvalidConfig(format!("channel {channel} not configured"))
        })?;
        let duty = config.duty_ns(value);
        self.write_attr(channel, "duty_cycle", &duty.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_chip(npwm: u8) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("npwm"), format!("{npwm}\n")).unwrap();
        fs::write(dir.path().join("export"), "").unwrap();
        for ch in 0..npwm {
            fs::create_dir(dir.path().join(format!("pwm{ch}"))).unwrap();
        }
        dir
    }

    fn read_attr(dir: &TempDir, channel: u8, attr: &str) -> String {
        fs::read_to_string(dir.path().join(format!("pwm{channel}")).join(attr)).unwrap()
    }

    #[test]
    fn test_map_missing_chip() {
        let mut pwm = SysfsPwm::new("/nonexistent/pwmchip9");
        assert!(matches!(pwm.map(), Err(PwmError::MapFailed(_))));
    }

    #[test]
    fn test_operations_require_map() {
        let chip = fake_chip(2);
        let mut pwm = SysfsPwm::new(chip.path());
        assert!(matches!(pwm.enable(0), Err(PwmError::NotMapped)));
    }

    #[test]
    fn test_configure_enable_write() {
        let chip = fake_chip(2);
        let mut pwm = SysfsPwm::new(chip.path());
        pwm.map().unwrap();

        let config = PwmChannelConfig::new(192, 100, PwmModeFlags::MARK_SPACE);
        pwm.configure(1, &config).unwrap();
        pwm.enable(1).unwrap();
        pwm.write(1, 25).unwrap();

        assert_eq!(read_attr(&chip, 1, "period"), "1000000");
        assert_eq!(read_attr(&chip, 1, "polarity"), "normal");
        assert_eq!(read_attr(&chip, 1, "enable"), "1");
        assert_eq!(read_attr(&chip, 1, "duty_cycle"), "250000");
    }

    #[test]
    fn test_inverted_polarity() {
        let chip = fake_chip(1);
        let mut pwm = SysfsPwm::new(chip.path());
        pwm.map().unwrap();

        let config = PwmChannelConfig::new(
            192,
            100,
            PwmModeFlags::MARK_SPACE | PwmModeFlags::INVERTED,
        );
        pwm.configure(0, &config).unwrap();
        assert_eq!(read_attr(&chip, 0, "polarity"), "inversed");
    }

    #[test]
    fn test_rejects_fifo_mode_and_bad_channel() {
        let chip = fake_chip(1);
        let mut pwm = SysfsPwm::new(chip.path());
        pwm.map().unwrap();

        let fifo = PwmChannelConfig::new(192, 100, PwmModeFlags::USE_FIFO);
        assert!(matches!(
            pwm.configure(0, &fifo),
            Err(PwmError::InvalidConfig(_))
        ));
        assert!(matches!(
            pwm.write(3, 10),
            Err(PwmError::InvalidChannel(3))
        ));
    }

    #[test]
    fn test_write_before_configure() {
        let chip = fake_chip(1);
        let mut pwm = SysfsPwm::new(chip.path());
        pwm.map().unwrap();
        assert!(matches!(pwm.write(0, 10), Err(PwmError::InvalidConfig(_))));
    }
}
