//! Pump actuator state machine
//!
//! ```text
//! OFF --CRITICAL--> ACTIVATING (request latched) --tick--> RUNNING(mode) --elapsed > duration--> OFF
//! ```
//!
//! The classification side only latches a request via [`ActuatorController::observe`];
//! the pump loop drives every transition through [`ActuatorController::tick`].
//! A running cycle always completes its full duration, whatever the tier does
//! in the meantime.

use crate::config::PumpConfig;
use crate::types::{Averages, Parameter, PumpMode, PumpState, QualityStatus, Tier};
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

/// Hardware change the caller must apply after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpAction {
    /// Switch the pump on for a cycle of the given mode
    Start(PumpMode),
    /// The cycle of the given mode finished; switch the pump off
    Stop(PumpMode),
}

#[derive(Debug, Clone)]
pub struct ActuatorController {
    config: PumpConfig,
    state: PumpState,
}

impl ActuatorController {
    pub fn new(config: PumpConfig) -> Self {
        Self {
            config,
            state: PumpState::default(),
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Run time of one cycle in `mode`.
    pub fn duration(&self, mode: PumpMode) -> Duration {
        let secs = match mode {
            PumpMode::Off => 0,
            PumpMode::Short => self.config.short_secs,
            PumpMode::Normal => self.config.normal_secs,
            PumpMode::Long => self.config.long_secs,
        };
        Duration::from_secs(secs)
    }

    /// Pick a cycle by the most pressing cause.
    ///
    /// Priority: temperature out of range (LONG), then pH out of range
    /// (SHORT), then turbidity or nutrients (NORMAL). Anything else still
    /// gets a NORMAL cycle.
    pub fn select_mode(&self, averages: &Averages) -> PumpMode {
        self.select_with_cause(averages).0
    }

    fn select_with_cause(&self, averages: &Averages) -> (PumpMode, &'static str) {
        let c = &self.config;
        let get = |p: Parameter| averages.get(&p).copied();

        if get(Parameter::Temperature).is_some_and(|t| t < c.temperature_low || t > c.temperature_high) {
            return (PumpMode::Long, "temperature");
        }
        if get(Parameter::Ph).is_some_and(|ph| ph < c.ph_low || ph > c.ph_high) {
            return (PumpMode::Short, "ph");
        }
        if get(Parameter::Turbidity).is_some_and(|r| r > c.turbidity_ratio) {
            return (PumpMode::Normal, "turbidity");
        }
        if [Parameter::Nitrogen, Parameter::Phosphorus]
            .into_iter()
            .any(|p| get(p).is_some_and(|v| v > c.nutrient_high))
        {
            return (PumpMode::Normal, "nutrients");
        }
        (PumpMode::Normal, "general")
    }

    /// Feed a fresh classification.
    ///
    /// CRITICAL while idle latches one activation request; any other tier
    /// clears a request that has not started yet. Returns the newly latched
    /// mode, if any.
    pub fn observe(&mut self, status: &QualityStatus) -> Option<PumpMode> {
        if status.tier == Tier::Critical {
            if self.state.running || self.state.pending.is_some() {
                return None;
            }
            let (mode, cause) = self.select_with_cause(&status.averages);
            self.state.pending = Some(mode);
            info!(mode = %mode, cause, score = status.score, "[Pump] Activation requested");
            Some(mode)
        } else {
            if let Some(mode) = self.state.pending.take() {
                debug!(mode = %mode, tier = %status.tier, "[Pump] Pending request cleared");
            }
            None
        }
    }

    /// Advance the state machine to `now`.
    pub fn tick(&mut self, now: Instant) -> Option<PumpAction> {
        if self.state.running {
            let started = self.state.started_at.unwrap_or(now);
            let mode = self.state.mode;
            if now.saturating_duration_since(started) > self.duration(mode) {
                self.state.running = false;
                self.state.mode = PumpMode::Off;
                self.state.started_at = None;
                info!(mode = %mode, "[Pump] Cycle complete");
                return Some(PumpAction::Stop(mode));
            }
            return None;
        }

        let mode = self.state.pending.take()?;
        self.state.running = true;
        self.state.mode = mode;
        self.state.started_at = Some(now);
        info!(
            mode = %mode,
            duration_secs = self.duration(mode).as_secs(),
            "[Pump] Cycle started"
        );
        Some(PumpAction::Start(mode))
    }

    /// Abandon any cycle and request. Returns true if the pump was running.
    pub fn force_stop(&mut self) -> bool {
        let was_running = self.state.running;
        self.state = PumpState::default();
        was_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn status(tier: Tier, averages: &[(Parameter, f64)]) -> QualityStatus {
        QualityStatus {
            tier,
            score: match tier {
                Tier::Good => 0,
                Tier::Warning => 45,
                Tier::Critical => 90,
            },
            alerts: vec![],
            recommendations: BTreeSet::new(),
            trends: BTreeMap::new(),
            averages: averages.iter().copied().collect(),
            timestamp: Utc::now(),
        }
    }

    fn controller() -> ActuatorController {
        ActuatorController::new(PumpConfig::default())
    }

    #[test]
    fn test_mode_priority() {
        let c = controller();
        let avg = |pairs: &[(Parameter, f64)]| -> Averages { pairs.iter().copied().collect() };

        assert_eq!(
            c.select_mode(&avg(&[(Parameter::Temperature, 34.0), (Parameter::Ph, 5.0)])),
            PumpMode::Long
        );
        assert_eq!(
            c.select_mode(&avg(&[(Parameter::Temperature, 25.0), (Parameter::Ph, 5.0)])),
            PumpMode::Short
        );
        assert_eq!(
            c.select_mode(&avg(&[(Parameter::Ph, 7.0), (Parameter::Nitrogen, 250.0)])),
            PumpMode::Normal
        );
        assert_eq!(c.select_mode(&Averages::new()), PumpMode::Normal);
    }

    #[test]
    fn test_critical_latches_once() {
        let mut c = controller();
        assert_eq!(
            c.observe(&status(Tier::Critical, &[(Parameter::Ph, 5.0)])),
            Some(PumpMode::Short)
        );
        assert_eq!(c.observe(&status(Tier::Critical, &[(Parameter::Temperature, 40.0)])), None);
        assert_eq!(c.state().pending, Some(PumpMode::Short));
    }

    #[test]
    fn test_non_critical_clears_pending_request() {
        let mut c = controller();
        c.observe(&status(Tier::Critical, &[]));
        c.observe(&status(Tier::Good, &[]));
        assert_eq!(c.state().pending, None);
        assert_eq!(c.tick(Instant::now()), None);

        c.observe(&status(Tier::Critical, &[]));
        c.observe(&status(Tier::Warning, &[]));
        assert_eq!(c.state().pending, None);
    }

    #[test]
    fn test_cycle_runs_for_exactly_its_duration() {
        let mut c = controller();
        let start = Instant::now();
        c.observe(&status(Tier::Critical, &[(Parameter::Ph, 5.0)]));
        assert_eq!(c.tick(start), Some(PumpAction::Start(PumpMode::Short)));
        assert!(c.state().running);

        // GOOD mid-cycle does not stop the pump
        c.observe(&status(Tier::Good, &[]));
        assert_eq!(c.tick(start + Duration::from_secs(60)), None);
        // CRITICAL mid-cycle does not restart or extend it
        c.observe(&status(Tier::Critical, &[(Parameter::Temperature, 40.0)]));
        assert_eq!(c.state().pending, None);

        assert_eq!(c.tick(start + Duration::from_secs(120)), None);
        assert_eq!(
            c.tick(start + Duration::from_secs(121)),
            Some(PumpAction::Stop(PumpMode::Short))
        );
        let state = c.state();
        assert!(!state.running);
        assert_eq!(state.mode, PumpMode::Off);
    }

    #[test]
    fn test_force_stop_resets_state() {
        let mut c = controller();
        c.observe(&status(Tier::Critical, &[]));
        c.tick(Instant::now());
        assert!(c.force_stop());
        assert_eq!(c.state(), PumpState::default());
        assert!(!c.force_stop());
    }
}
