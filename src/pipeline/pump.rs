//! Pump loop: the only writer of pump state.
//!
//! Picks up each new classification once (by sequence number), ticks the
//! actuator state machine, mirrors the result into shared state, then drives
//! the relay outside the lock.

use super::runner::{LoopError, LoopTask};
use crate::config::PumpConfig;
use crate::control::{ActuatorController, PumpAction};
use crate::hardware::ActuatorHardware;
use crate::types::{LoopName, SharedState};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::warn;

pub struct PumpLoop {
    controller: ActuatorController,
    hardware: Arc<dyn ActuatorHardware>,
    period: Duration,
    seen_seq: u64,
}

impl PumpLoop {
    pub fn new(config: &PumpConfig, hardware: Arc<dyn ActuatorHardware>) -> Self {
        Self {
            controller: ActuatorController::new(config.clone()),
            hardware,
            period: config.tick_interval(),
            seen_seq: 0,
        }
    }
}

#[async_trait]
impl LoopTask for PumpLoop {
    fn name(&self) -> LoopName {
        LoopName::Pump
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn iterate(&mut self, state: &SharedState) -> Result<(), LoopError> {
        let fresh = state.lock().await.status_since(self.seen_seq);
        if let Some((seq, status)) = fresh {
            self.seen_seq = seq;
            self.controller.observe(&status);
        }

        let action = self.controller.tick(Instant::now());
        state.lock().await.pump = self.controller.state();

        let Some(action) = action else {
            return Ok(());
        };
        let on = matches!(action, PumpAction::Start(_));
        if let Err(e) = self.hardware.set_pump(on) {
            // The logical transition stands even if the relay did not switch
            warn!(error = %e, on, "[Pump] Relay switch failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HardwareConfig;
    use crate::hardware::simulated::LoggingHardware;
    use crate::types::{Parameter, PumpMode, QualityStatus, SystemState, Tier};
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn status(tier: Tier, ph: f64) -> QualityStatus {
        QualityStatus {
            tier,
            score: if tier == Tier::Critical { 80 } else { 0 },
            alerts: vec![],
            recommendations: BTreeSet::new(),
            trends: BTreeMap::new(),
            averages: [(Parameter::Ph, ph)].into_iter().collect(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_runs_full_duration_despite_good_status() {
        let hw = Arc::new(LoggingHardware::new(HardwareConfig::default()));
        let mut task = PumpLoop::new(&PumpConfig::default(), hw.clone());
        let state = SystemState::shared();

        state.lock().await.publish_status(status(Tier::Critical, 5.0));
        task.iterate(&state).await.unwrap();
        assert!(hw.pump_on());
        assert_eq!(state.lock().await.pump.mode, PumpMode::Short);

        state.lock().await.publish_status(status(Tier::Good, 7.0));
        for _ in 0..120 {
            tokio::time::advance(Duration::from_secs(1)).await;
            task.iterate(&state).await.unwrap();
        }
        assert!(hw.pump_on(), "still within the SHORT cycle");

        tokio::time::advance(Duration::from_secs(1)).await;
        task.iterate(&state).await.unwrap();
        assert!(!hw.pump_on());
        assert_eq!(hw.pump_switches(), 2);
        assert_eq!(state.lock().await.pump.mode, PumpMode::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_status_is_observed_once() {
        let hw = Arc::new(LoggingHardware::new(HardwareConfig::default()));
        let mut task = PumpLoop::new(&PumpConfig::default(), hw.clone());
        let state = SystemState::shared();

        state.lock().await.publish_status(status(Tier::Critical, 5.0));
        task.iterate(&state).await.unwrap();
        for _ in 0..125 {
            tokio::time::advance(Duration::from_secs(1)).await;
            task.iterate(&state).await.unwrap();
        }
        // The stale CRITICAL must not re-trigger a second cycle
        assert!(!hw.pump_on());
        assert_eq!(hw.pump_switches(), 2);
    }
}
