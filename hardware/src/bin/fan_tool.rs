//! Bench CLI for the TableSat fans.
//!
//! Subcommands:
//! - `set`: Command one fan to a PWM value
//! - `sweep`: Staircase both fans from 0 to max and back to 0
//! - `off`: Command both fans to 0

use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use hardware::fan::{FanChannelConfig, FanDriver, FanId, FAN_MAX_PWM, FAN_PWM_RANGE};
use hardware::pwm::PwmChannelConfig;
use hardware::sysfs::{SysfsPwm, DEFAULT_PWM_CHIP};
use strum::IntoEnumIterator;
use tracing::{info, warn};

/// TableSat fan PWM tool
#[derive(Parser, Debug)]
#[command(name = "fan_tool")]
#[command(about = "Drive the TableSat fans through the sysfs PWM interface")]
#[command(version)]
struct Args {
    /// sysfs PWM chip directory
    #[arg(long, global = true, default_value = DEFAULT_PWM_CHIP)]
    chip: String,

    /// PWM channel driving fan A
    #[arg(long, global = true, default_value = "0")]
    channel_a: u8,

    /// PWM channel driving fan B
    #[arg(long, global = true, default_value = "1")]
    channel_b: u8,

    /// PWM clock divisor
    #[arg(long, global = true, default_value = "1953")]
    divisor: u32,

    /// PWM range (ticks per period)
    #[arg(long, global = true, default_value = "5120")]
    range: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Command one fan to a PWM value
    Set {
        /// Fan to command
        #[arg(value_enum)]
        fan: FanId,

        /// PWM value (limited to 0..=2047)
        pwm: i32,
    },

    /// Step both fans from 0 to max and back to 0
    Sweep {
        /// Number of steps, including 0 and max
        #[arg(short, long, default_value = "4")]
        steps: u16,

        /// Dwell per step in seconds
        #[arg(short, long, default_value = "2.0")]
        dwell: f64,
    },

    /// Command both fans to 0
    Off,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let pwm_config = PwmChannelConfig {
        divisor: args.divisor,
        range: args.range,
        ..PwmChannelConfig::default()
    };
    let fan_a = FanChannelConfig {
        pwm_channel: args.channel_a,
        pwm: pwm_config,
    };
    let fan_b = FanChannelConfig {
        pwm_channel: args.channel_b,
        pwm: pwm_config,
    };

    let mut fans = FanDriver::new(SysfsPwm::new(&args.chip), fan_a, fan_b);
    if !fans.is_mapped() {
        bail!("PWM chip {} could not be mapped", args.chip);
    }

    match args.command {
        Command::Set { fan, pwm } => cmd_set(&mut fans, fan, pwm),
        Command::Sweep { steps, dwell } => cmd_sweep(&mut fans, steps, dwell),
        Command::Off => {
            fans.stop();
            info!("Fans off");
            Ok(())
        }
    }
}

fn cmd_set(fans: &mut FanDriver<SysfsPwm>, fan: FanId, pwm: i32) -> Result<()> {
    if fans.set_pwm(fan, pwm) {
        warn!("Fan {fan} command {pwm} limited to {}", fans.pwm_cmd(fan));
    }
    info!("Fan {fan} set to {}", fans.pwm_cmd(fan));
    Ok(())
}

fn cmd_sweep(fans: &mut FanDriver<SysfsPwm>, steps: u16, dwell: f64) -> Result<()> {
    if steps < 2 {
        bail!("sweep needs at least 2 steps");
    }
    if !(dwell.is_finite() && dwell > 0.0) {
        bail!("dwell must be a positive number of seconds");
    }

    let increment = (FAN_PWM_RANGE as f64 / (steps - 1) as f64).ceil() as i32;
    let dwell = Duration::from_secs_f64(dwell);

    for step in 0..steps {
        let pwm = (step as i32 * increment).min(FAN_MAX_PWM as i32);
        for fan in FanId::iter() {
            fans.set_pwm(fan, pwm);
        }
        info!("Step {}/{}: PWM {}", step + 1, steps, pwm);
        thread::sleep(dwell);
    }

    fans.stop();
    info!("Sweep complete, fans off");
    Ok(())
}
