//! Tier indicators and alarm chirps
//!
//! Each classification lights the indicator for its tier and, for WARNING and
//! CRITICAL, sounds one chirp on the buzzer. A chirp is a short-lived task; a
//! new chirp aborts the previous one so patterns never overlap.

use crate::config::IndicatorConfig;
use crate::hardware::ActuatorHardware;
use crate::types::{AlarmLevel, Tier};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::warn;

pub struct AlarmScheduler {
    hardware: Arc<dyn ActuatorHardware>,
    config: IndicatorConfig,
    current: Option<JoinHandle<()>>,
}

impl AlarmScheduler {
    pub fn new(hardware: Arc<dyn ActuatorHardware>, config: IndicatorConfig) -> Self {
        Self {
            hardware,
            config,
            current: None,
        }
    }

    /// Chirp length for `tier`, or `None` when the tier is silent.
    pub fn chirp_length(&self, tier: Tier) -> Option<Duration> {
        match tier {
            Tier::Good => None,
            Tier::Warning => Some(Duration::from_millis(self.config.warning_chirp_ms)),
            Tier::Critical => Some(Duration::from_millis(self.config.critical_chirp_ms)),
        }
    }

    /// Show `tier` on the indicators and start its chirp.
    pub fn signal(&mut self, tier: Tier) {
        if let Err(e) = self.hardware.set_indicator(Some(tier)) {
            warn!(error = %e, tier = %tier, "[Alarm] Failed to set indicator");
        }

        self.cancel_chirp();
        let Some(length) = self.chirp_length(tier) else {
            return;
        };

        let hardware = Arc::clone(&self.hardware);
        let duty = self.config.alarm_duty_percent;
        self.current = Some(tokio::spawn(async move {
            if let Err(e) = hardware.set_alarm(AlarmLevel::Tone(duty)) {
                warn!(error = %e, "[Alarm] Failed to sound alarm");
                return;
            }
            tokio::time::sleep(length).await;
            if let Err(e) = hardware.set_alarm(AlarmLevel::Off) {
                warn!(error = %e, "[Alarm] Failed to silence alarm");
            }
        }));
    }

    /// Stop any chirp and leave the buzzer silent.
    pub fn silence(&mut self) {
        self.cancel_chirp();
        if let Err(e) = self.hardware.set_alarm(AlarmLevel::Off) {
            warn!(error = %e, "[Alarm] Failed to silence alarm");
        }
    }

    /// True while a chirp task is still running.
    pub fn is_chirping(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel_chirp(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.abort();
        }
    }
}

impl Drop for AlarmScheduler {
    fn drop(&mut self) {
        self.cancel_chirp();
    }
}
