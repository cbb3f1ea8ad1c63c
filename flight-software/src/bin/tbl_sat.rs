//! TableSat attitude control application.
//!
//! Reads JSON command lines on stdin and writes JSON status lines to stdout.
//! Sensor telemetry arrives as JSON datagrams on an optional UDP socket.
//! Logs go to stderr, filtered by `RUST_LOG` (default `info`).

use std::io::{self, BufRead, Write};
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use flight_software::sensor_pipe::SensorPublisher;
use flight_software::{AppConfig, SatCtrlConfig, TblSatApp};
use hardware::fan::{FanChannelConfig, FanDriver};
use hardware::mock::MockPwm;
use hardware::pwm::PwmInterface;
use hardware::sysfs::{SysfsPwm, DEFAULT_PWM_CHIP};
use shared::sensor_tlm::SENSOR_TLM_TOPIC;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Largest sensor datagram accepted
const MAX_DATAGRAM: usize = 2048;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PwmBackend {
    /// In-memory PWM, nothing is driven
    Mock,
    /// Linux sysfs PWM chip
    Sysfs,
}

/// TableSat attitude control
#[derive(Parser, Debug)]
#[command(name = "tbl_sat")]
#[command(about = "Fan-driven spin table attitude control")]
#[command(version)]
struct Args {
    /// Control cycle period in milliseconds
    #[arg(long, default_value_t = 100)]
    period_ms: u64,

    /// Topic id carrying sensor telemetry
    #[arg(long, default_value_t = SENSOR_TLM_TOPIC)]
    sensor_topic: u32,

    /// Maximum queued sensor messages
    #[arg(long, default_value_t = 10)]
    sensor_pipe_depth: usize,

    /// Maximum queued command lines
    #[arg(long, default_value_t = 10)]
    cmd_pipe_depth: usize,

    /// Control table loaded at startup
    #[arg(long, default_value = "config/tbl_sat_ctrl.json")]
    table: PathBuf,

    /// Start without a control table
    #[arg(long)]
    no_table: bool,

    /// PWM backend driving the fans
    #[arg(long, value_enum, default_value = "mock")]
    pwm: PwmBackend,

    /// sysfs PWM chip directory
    #[arg(long, default_value = DEFAULT_PWM_CHIP)]
    pwm_chip: PathBuf,

    /// PWM channel driving fan A
    #[arg(long, default_value_t = 0)]
    fan_a_channel: u8,

    /// PWM channel driving fan B
    #[arg(long, default_value_t = 1)]
    fan_b_channel: u8,

    /// Interval between status snapshots in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    status_interval_ms: u64,

    /// UDP address to receive sensor datagrams on
    #[arg(long)]
    sensor_udp: Option<SocketAddr>,

    /// Application name recorded in table dumps
    #[arg(long, default_value = "TBL_SAT")]
    app_name: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = AppConfig {
        ctrl: SatCtrlConfig {
            app_name: args.app_name.clone(),
            exec_period: Duration::from_millis(args.period_ms),
            sensor_topic: args.sensor_topic,
            table_file: (!args.no_table).then(|| args.table.clone()),
        },
        sensor_pipe_depth: args.sensor_pipe_depth,
        cmd_pipe_depth: args.cmd_pipe_depth,
        status_interval: Duration::from_millis(args.status_interval_ms),
    };

    let pwm: Box<dyn PwmInterface + Send> = match args.pwm {
        PwmBackend::Mock => Box::new(MockPwm::new()),
        PwmBackend::Sysfs => Box::new(SysfsPwm::new(&args.pwm_chip)),
    };
    let fans = FanDriver::new(
        pwm,
        FanChannelConfig::new(args.fan_a_channel),
        FanChannelConfig::new(args.fan_b_channel),
    );

    let app = TblSatApp::start(config, fans)?;

    if let Some(addr) = args.sensor_udp {
        let socket =
            UdpSocket::bind(addr).with_context(|| format!("Failed to bind sensor socket {addr}"))?;
        info!("Receiving sensor datagrams on {addr}");
        let publisher = app.sensor_publisher();
        thread::spawn(move || receive_sensors(socket, publisher));
    }

    let status_rx = app.status_receiver();
    thread::spawn(move || {
        let stdout = io::stdout();
        for status in status_rx {
            match status.to_json() {
                Ok(json) => {
                    let mut out = stdout.lock();
                    if writeln!(out, "{json}").and_then(|_| out.flush()).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to encode status: {e}"),
            }
        }
    });

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read command from stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        app.send_command_line(line)?;
    }

    info!("stdin closed, shutting down");
    app.shutdown();
    Ok(())
}

fn receive_sensors(socket: UdpSocket, publisher: SensorPublisher) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, _src)) => match std::str::from_utf8(&buf[..len]) {
                Ok(payload) => {
                    publisher.publish_payload(payload.trim());
                }
                Err(e) => warn!("Dropped non UTF-8 sensor datagram: {e}"),
            },
            Err(e) => {
                warn!("Sensor socket error: {e}");
                return;
            }
        }
    }
}
