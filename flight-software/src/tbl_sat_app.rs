//! Threaded TableSat application.
//!
//! Runs two workers around one shared controller:
//! - the control worker executes one control cycle per period (or per sensor
//!   sample in sun acquisition)
//! - the command worker applies command lines and emits status snapshots on
//!   request and on a periodic tick
//!
//! The controller lock is held for a single cycle or a single command, so a
//! command always lands between control cycles.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use hardware::fan::FanDriver;
use hardware::pwm::PwmInterface;
use shared::ctrl_mode::ControlMode;
use shared::status_tlm::StatusTlm;
use tracing::{debug, info, warn};

use crate::commands::{CmdMgr, Command};
use crate::sat_ctrl::{SatCtrl, SatCtrlConfig};
use crate::sensor_pipe::{sensor_pipe, Pend, SensorPipe, SensorPublisher};

/// Application startup settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ctrl: SatCtrlConfig,
    /// Maximum queued sensor messages
    pub sensor_pipe_depth: usize,
    /// Maximum queued command lines
    pub cmd_pipe_depth: usize,
    /// Period of unsolicited status snapshots
    pub status_interval: Duration,
}

/// Shortest status period the command worker will tick at.
pub const MIN_STATUS_INTERVAL: Duration = Duration::from_millis(1);

impl AppConfig {
    /// Status period actually used, never below [`MIN_STATUS_INTERVAL`].
    pub fn status_period(&self) -> Duration {
        self.status_interval.max(MIN_STATUS_INTERVAL)
    }
}

/// Controller shared between the workers.
pub type SharedCtrl<P> = Arc<Mutex<SatCtrl<P>>>;

fn lock<P: PwmInterface>(ctrl: &SharedCtrl<P>) -> MutexGuard<'_, SatCtrl<P>> {
    ctrl.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Running application handle.
pub struct TblSatApp<P: PwmInterface + Send + 'static> {
    ctrl: SharedCtrl<P>,
    cmd_tx: Sender<String>,
    status_rx: Receiver<StatusTlm>,
    sensor: SensorPublisher,
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl<P: PwmInterface + Send + 'static> TblSatApp<P> {
    /// Build the controller and start both workers.
    pub fn start(config: AppConfig, fans: FanDriver<P>) -> Result<Self> {
        let ctrl: SharedCtrl<P> = Arc::new(Mutex::new(SatCtrl::new(config.ctrl.clone(), fans)));

        let (sensor, pipe) = sensor_pipe(config.sensor_pipe_depth, config.ctrl.sensor_topic);
        let (cmd_tx, cmd_rx) = bounded::<String>(config.cmd_pipe_depth.max(1));
        let (status_tx, status_rx) = bounded::<StatusTlm>(16);
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let mut workers = Vec::with_capacity(2);

        let control = ControlWorker {
            ctrl: ctrl.clone(),
            pipe,
            wake: wake_rx,
            shutdown: shutdown_rx.clone(),
        };
        workers.push(
            thread::Builder::new()
                .name("tbl-sat-ctrl".to_string())
                .spawn(move || control.run())
                .context("Failed to spawn control worker")?,
        );

        let command = CommandWorker {
            ctrl: ctrl.clone(),
            cmd_mgr: CmdMgr::new(),
            commands: cmd_rx,
            status: status_tx,
            wake: wake_tx,
            shutdown: shutdown_rx,
            status_interval: config.status_period(),
        };
        workers.push(
            thread::Builder::new()
                .name("tbl-sat-cmd".to_string())
                .spawn(move || command.run())
                .context("Failed to spawn command worker")?,
        );

        info!(
            "TBL_SAT started: period {:?}, sensor topic 0x{:04X}",
            config.ctrl.exec_period, config.ctrl.sensor_topic
        );

        Ok(Self {
            ctrl,
            cmd_tx,
            status_rx,
            sensor,
            shutdown: Some(shutdown_tx),
            workers,
        })
    }

    /// Queue a raw JSON command line.
    pub fn send_command_line(&self, line: impl Into<String>) -> Result<()> {
        self.cmd_tx
            .send(line.into())
            .context("Command pipe closed")
    }

    pub fn send_command(&self, cmd: &Command) -> Result<()> {
        self.send_command_line(cmd.to_json()?)
    }

    /// Handle for publishing sensor messages.
    pub fn sensor_publisher(&self) -> SensorPublisher {
        self.sensor.clone()
    }

    /// Status snapshots, both requested and periodic.
    pub fn status_receiver(&self) -> Receiver<StatusTlm> {
        self.status_rx.clone()
    }

    pub fn controller(&self) -> SharedCtrl<P> {
        self.ctrl.clone()
    }

    /// Stop both workers and wait for them to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.shutdown.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("TBL_SAT worker panicked");
            }
        }
        info!("TBL_SAT stopped");
    }
}

impl<P: PwmInterface + Send + 'static> Drop for TblSatApp<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ==================== Workers ====================

struct ControlWorker<P: PwmInterface> {
    ctrl: SharedCtrl<P>,
    pipe: SensorPipe,
    wake: Receiver<()>,
    shutdown: Receiver<()>,
}

impl<P: PwmInterface> ControlWorker<P> {
    fn run(self) {
        loop {
            let (mode, period) = {
                let ctrl = lock(&self.ctrl);
                (ctrl.mode(), ctrl.exec_period())
            };

            // Pend outside the lock so commands are never blocked by sensors
            let inbox = if mode == ControlMode::SunAcq {
                match self.pipe.pend(&self.wake, &self.shutdown) {
                    Pend::Message(msg) => vec![msg],
                    Pend::Woken => Vec::new(),
                    Pend::Closed => break,
                }
            } else {
                self.pipe.drain()
            };

            let wait = lock(&self.ctrl).execute(&inbox);

            if wait {
                select! {
                    recv(self.shutdown) -> _ => break,
                    default(period) => {}
                }
            }
        }

        lock(&self.ctrl).stop_fans();
        debug!("Control worker exiting");
    }
}

struct CommandWorker<P: PwmInterface> {
    ctrl: SharedCtrl<P>,
    cmd_mgr: CmdMgr,
    commands: Receiver<String>,
    status: Sender<StatusTlm>,
    wake: Sender<()>,
    shutdown: Receiver<()>,
    status_interval: Duration,
}

impl<P: PwmInterface> CommandWorker<P> {
    fn run(mut self) {
        let ticker = tick(self.status_interval);

        loop {
            select! {
                recv(self.commands) -> line => {
                    let Ok(line) = line else { break };
                    self.handle(&line);
                }
                recv(ticker) -> _ => {
                    let status = {
                        let ctrl = lock(&self.ctrl);
                        self.cmd_mgr.status(&*ctrl)
                    };
                    self.publish(status);
                }
                recv(self.shutdown) -> _ => break,
            }
        }

        debug!("Command worker exiting");
    }

    fn handle(&mut self, line: &str) {
        let result = {
            let mut ctrl = lock(&self.ctrl);
            self.cmd_mgr.dispatch_line(line, &mut *ctrl)
        };

        // A mode change must not wait for the next sensor sample
        if let Err(TrySendError::Disconnected(_)) = self.wake.try_send(()) {
            warn!("Control worker gone, command applied without wake");
        }

        if let Ok(Some(status)) = result {
            self.publish(status);
        }
    }

    fn publish(&self, status: StatusTlm) {
        if let Err(TrySendError::Full(_)) = self.status.try_send(status) {
            debug!("Status queue full, snapshot dropped");
        }
    }
}
