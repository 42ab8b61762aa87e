//! Orchestrator: spawns every loop into one `JoinSet`, supervises it, and
//! shuts down in order.
//!
//! Shutdown sequence:
//! 1. cancel the shared token
//! 2. pump off, indicators off, alarm silent
//! 3. join the task set, bounded by the shutdown timeout
//! 4. abort whatever is still running

use super::alert::AlertLoop;
use super::display::DisplayLoop;
use super::monitor::MonitorLoop;
use super::pump::PumpLoop;
use super::runner::{run_loop, LoopError, LoopTask};
use super::telemetry::TelemetryLoop;
use crate::background::Watchdog;
use crate::config::PondConfig;
use crate::hardware::{ActuatorHardware, DisplaySink, NotificationSender, SensorSampler};
use crate::telemetry::TelemetryUploader;
use crate::types::{LoopName, PumpState, SharedState};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// External devices and services the loops drive.
pub struct Collaborators {
    pub sensor: Box<dyn SensorSampler>,
    pub hardware: Arc<dyn ActuatorHardware>,
    pub display: Arc<dyn DisplaySink>,
    pub notifier: Arc<dyn NotificationSender>,
    /// `None` when telemetry is disabled
    pub telemetry: Option<TelemetryUploader>,
}

/// Watchdog as a periodic loop.
struct WatchdogLoop {
    watchdog: Watchdog,
    period: Duration,
}

#[async_trait]
impl LoopTask for WatchdogLoop {
    fn name(&self) -> LoopName {
        LoopName::Watchdog
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn iterate(&mut self, state: &SharedState) -> Result<(), LoopError> {
        let mut s = state.lock().await;
        self.watchdog.run_cycle(&mut s, Instant::now());
        Ok(())
    }
}

pub struct Orchestrator {
    config: Arc<PondConfig>,
    state: SharedState,
    cancel: CancellationToken,
    tasks: JoinSet<LoopName>,
    hardware: Option<Arc<dyn ActuatorHardware>>,
    running: Vec<LoopName>,
}

impl Orchestrator {
    pub fn new(config: Arc<PondConfig>, state: SharedState, cancel: CancellationToken) -> Self {
        Self {
            config,
            state,
            cancel,
            tasks: JoinSet::new(),
            hardware: None,
            running: Vec::new(),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Loops spawned so far, in spawn order.
    pub fn running(&self) -> &[LoopName] {
        &self.running
    }

    /// Spawn the monitoring loops and the watchdog.
    pub async fn spawn_loops(&mut self, collaborators: Collaborators) {
        let config = Arc::clone(&self.config);
        let Collaborators {
            sensor,
            hardware,
            display,
            notifier,
            telemetry,
        } = collaborators;
        self.hardware = Some(Arc::clone(&hardware));

        self.spawn_task(MonitorLoop::new(&config, sensor, Arc::clone(&hardware)));
        self.spawn_task(PumpLoop::new(&config.pump, hardware));
        self.spawn_task(AlertLoop::new(&config, notifier));
        self.spawn_task(DisplayLoop::new(&config.display, display));

        match telemetry {
            Some(uploader) => {
                let stats = uploader.stats().clone();
                self.state.lock().await.telemetry = stats;
                let uploader = uploader.with_cancellation(self.cancel.clone());
                self.spawn_task(TelemetryLoop::new(uploader, config.telemetry.check_interval()));
            }
            None => {
                self.state.lock().await.telemetry.enabled = false;
                info!("[Telemetry] Disabled, loop not started");
            }
        }

        let monitored: Vec<LoopName> = self
            .running
            .iter()
            .copied()
            .filter(|name| LoopName::MONITORED.contains(name))
            .collect();
        let watchdog = Watchdog::new(config.watchdog.stall_timeout()).monitoring(monitored);
        self.spawn_task(WatchdogLoop {
            watchdog,
            period: config.watchdog.check_interval(),
        });

        info!(loops = ?self.running, "All loops spawned");
    }

    /// Spawn one periodic loop under the shared token.
    pub fn spawn_task<T: LoopTask>(&mut self, task: T) {
        let name = task.name();
        self.running.push(name);
        self.tasks.spawn(run_loop(
            task,
            Arc::clone(&self.state),
            self.cancel.clone(),
            self.config.sampling.error_backoff(),
        ));
    }

    /// Spawn a non-periodic task (the HTTP server) that resolves to its name.
    pub fn spawn_service<F>(&mut self, name: LoopName, future: F)
    where
        F: Future<Output = LoopName> + Send + 'static,
    {
        self.running.push(name);
        self.tasks.spawn(future);
    }

    /// Watch the task set until cancellation or until every task has ended.
    ///
    /// A task ending on its own is logged; the others keep running.
    pub async fn supervise(&mut self) {
        info!("Supervisor: all tasks spawned, monitoring...");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Supervisor: shutdown signal received");
                    break;
                }
                result = self.tasks.join_next() => match result {
                    Some(Ok(name)) => {
                        warn!(task = %name, "Supervisor: task exited before shutdown");
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Supervisor: task panicked");
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                },
            }
        }
    }

    /// Ordered shutdown. Safe to call when no loops were spawned.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.all_off("shutdown");

        let timeout = self.config.watchdog.shutdown_timeout();
        let tasks = &mut self.tasks;
        let joined = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                match result {
                    Ok(name) => debug!(task = %name, "Task stopped"),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!(error = %e, "Task panicked during shutdown"),
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                remaining = self.tasks.len(),
                timeout_secs = timeout.as_secs(),
                "Tasks did not stop in time, aborting"
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        // A chirp or relay switch may have landed between steps 2 and 3
        self.all_off("final");
        self.state.lock().await.pump = PumpState::default();
        info!("Shutdown complete");
    }

    fn all_off(&self, stage: &str) {
        if let Some(hw) = &self.hardware {
            match hw.all_off() {
                Ok(()) => debug!(stage, "Outputs switched off"),
                Err(e) => warn!(stage, error = %e, "Failed to switch outputs off"),
            }
        }
    }

    /// Spawn, supervise until cancelled, then shut down.
    pub async fn run(mut self, collaborators: Collaborators) {
        self.spawn_loops(collaborators).await;
        self.supervise().await;
        self.shutdown().await;
    }
}
