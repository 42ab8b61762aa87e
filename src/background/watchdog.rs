//! Watchdog: heartbeat-based stall detection
//!
//! Every loop stamps its heartbeat after each iteration. A loop silent for
//! longer than the stall timeout is reported UNHEALTHY; loops that are alive
//! but running with reduced capability are reported DEGRADED.

use crate::types::{LoopName, SystemState};
use std::collections::BTreeMap;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Loop health status
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    /// Loop is operating normally
    Healthy,
    /// Loop is running but with reduced capability
    Degraded { reason: String },
    /// Loop has stopped reporting
    Unhealthy { reason: String },
}

impl HealthStatus {
    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded { .. } => 1,
            HealthStatus::Unhealthy { .. } => 2,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded { reason } => write!(f, "DEGRADED: {}", reason),
            HealthStatus::Unhealthy { reason } => write!(f, "UNHEALTHY: {}", reason),
        }
    }
}

pub struct Watchdog {
    stall_timeout: Duration,
    monitored: Vec<LoopName>,
    check_cycles: u64,
}

impl Watchdog {
    /// Watch every loop in [`LoopName::MONITORED`].
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            stall_timeout,
            monitored: LoopName::MONITORED.to_vec(),
            check_cycles: 0,
        }
    }

    /// Restrict supervision to the loops actually running.
    pub fn monitoring(mut self, loops: impl IntoIterator<Item = LoopName>) -> Self {
        self.monitored = loops.into_iter().collect();
        self
    }

    pub fn monitored(&self) -> &[LoopName] {
        &self.monitored
    }

    pub fn check_cycles(&self) -> u64 {
        self.check_cycles
    }

    /// Health of every monitored loop as of `now`.
    pub fn evaluate(&self, state: &SystemState, now: Instant) -> BTreeMap<LoopName, HealthStatus> {
        self.monitored
            .iter()
            .map(|&name| (name, self.evaluate_loop(state, name, now)))
            .collect()
    }

    fn evaluate_loop(&self, state: &SystemState, name: LoopName, now: Instant) -> HealthStatus {
        let silence = state.heartbeats.silence(name, now, state.started);
        if silence > self.stall_timeout {
            let reason = match state.heartbeats.last(name) {
                Some(_) => format!("no heartbeat for {}s", silence.as_secs()),
                None => format!("no heartbeat since startup ({}s)", silence.as_secs()),
            };
            return HealthStatus::Unhealthy { reason };
        }

        match name {
            LoopName::Monitor if state.consecutive_sensor_failures > 0 => HealthStatus::Degraded {
                reason: format!(
                    "{} consecutive sensor read failures",
                    state.consecutive_sensor_failures
                ),
            },
            LoopName::Display if !state.display_available => HealthStatus::Degraded {
                reason: "display marked unavailable".to_string(),
            },
            LoopName::Telemetry if state.telemetry.backlog > 0 => HealthStatus::Degraded {
                reason: format!("{} records queued for replay", state.telemetry.backlog),
            },
            _ => HealthStatus::Healthy,
        }
    }

    /// Evaluate, log changes, and store the result in `state`. Returns the
    /// worst status seen.
    pub fn run_cycle(&mut self, state: &mut SystemState, now: Instant) -> HealthStatus {
        let report = self.evaluate(state, now);
        let mut worst = HealthStatus::Healthy;

        for (name, status) in &report {
            let changed = state.health.get(name) != Some(status);
            match status {
                HealthStatus::Unhealthy { .. } => {
                    error!(component = %name, status = %status, "[Watchdog] Loop stalled");
                }
                HealthStatus::Degraded { .. } if changed => {
                    warn!(component = %name, status = %status, "[Watchdog] Loop degraded");
                }
                _ => debug!(component = %name, status = %status, "[Watchdog] Loop checked"),
            }

            if status.severity() > worst.severity() {
                worst = status.clone();
            }
        }

        state.health.extend(report);
        state.health.insert(LoopName::Watchdog, HealthStatus::Healthy);
        self.check_cycles += 1;
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(120);

    fn beat_all(state: &mut SystemState, at: Instant) {
        for name in LoopName::MONITORED {
            state.heartbeats.beat(name, at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_fresh_is_healthy() {
        let mut state = SystemState::default();
        let now = Instant::now();
        beat_all(&mut state, now);

        let mut wd = Watchdog::new(TIMEOUT);
        assert_eq!(wd.run_cycle(&mut state, now), HealthStatus::Healthy);
        assert!(state.health.values().all(HealthStatus::is_healthy));
        assert_eq!(wd.check_cycles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_loop_is_unhealthy() {
        let mut state = SystemState::default();
        let start = Instant::now();
        beat_all(&mut state, start);
        state.heartbeats.beat(LoopName::Monitor, start + Duration::from_secs(200));

        let wd = Watchdog::new(TIMEOUT);
        let report = wd.evaluate(&state, start + Duration::from_secs(200));
        assert!(report[&LoopName::Monitor].is_healthy());
        assert!(matches!(report[&LoopName::Pump], HealthStatus::Unhealthy { .. }));
        assert_eq!(
            report[&LoopName::Pump].to_string(),
            "UNHEALTHY: no heartbeat for 200s"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_reported_counts_from_startup() {
        let state = SystemState::default();
        let wd = Watchdog::new(TIMEOUT);
        let early = wd.evaluate(&state, state.started + Duration::from_secs(60));
        assert!(early.values().all(HealthStatus::is_healthy));

        let late = wd.evaluate(&state, state.started + Duration::from_secs(121));
        assert!(late
            .values()
            .all(|s| matches!(s, HealthStatus::Unhealthy { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_conditions() {
        let mut state = SystemState::default();
        let now = Instant::now();
        beat_all(&mut state, now);
        state.display_available = false;
        state.telemetry.backlog = 4;
        state.consecutive_sensor_failures = 2;

        let mut wd = Watchdog::new(TIMEOUT);
        let worst = wd.run_cycle(&mut state, now);
        assert!(matches!(worst, HealthStatus::Degraded { .. }));
        assert_eq!(
            state.health[&LoopName::Telemetry].to_string(),
            "DEGRADED: 4 records queued for replay"
        );
        assert_eq!(
            state.health[&LoopName::Display].to_string(),
            "DEGRADED: display marked unavailable"
        );
        assert!(matches!(
            state.health[&LoopName::Monitor],
            HealthStatus::Degraded { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unspawned_loops_are_not_reported() {
        let state = SystemState::default();
        let wd = Watchdog::new(TIMEOUT).monitoring([LoopName::Monitor, LoopName::Pump]);
        let report = wd.evaluate(&state, state.started + Duration::from_secs(600));
        assert_eq!(report.len(), 2);
        assert!(!report.contains_key(&LoopName::Telemetry));
    }
}
