//! Monitor loop: sample, aggregate, classify, publish.
//!
//! Runs at the classification cadence. A failed sensor read still produces a
//! classification from whatever the windows hold, so a dead bus degrades to
//! "no valid data" (WARNING) rather than leaving a stale GOOD in place.

use super::runner::{LoopError, LoopTask};
use crate::config::PondConfig;
use crate::control::AlarmScheduler;
use crate::hardware::{ActuatorHardware, SensorError, SensorSampler};
use crate::processing::{HistoryAggregator, QualityClassifier};
use crate::types::{LoopName, Parameter, QualityStatus, SharedState};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

pub struct MonitorLoop {
    sensor: Box<dyn SensorSampler>,
    history: HistoryAggregator,
    classifier: QualityClassifier,
    alarm: AlarmScheduler,
    period: Duration,
    reinit_after: u32,
    failures: u32,
}

impl MonitorLoop {
    pub fn new(
        config: &PondConfig,
        sensor: Box<dyn SensorSampler>,
        hardware: Arc<dyn ActuatorHardware>,
    ) -> Self {
        Self {
            sensor,
            history: HistoryAggregator::with_fusion_weight(
                config.sampling.history_size,
                config.sampling.temperature_primary_weight,
            ),
            classifier: QualityClassifier::new(config.classifier.clone()),
            alarm: AlarmScheduler::new(hardware, config.indicators.clone()),
            period: config.sampling.classify_interval(),
            reinit_after: config.sampling.reinit_after_failures.max(1),
            failures: 0,
        }
    }

    /// Read once and fold the sample into the windows. Counts consecutive
    /// failures and re-initializes the sampler every `reinit_after` of them.
    async fn sample(&mut self) -> Result<(), SensorError> {
        match self.sensor.read().await {
            Ok(sample) => {
                if self.failures > 0 {
                    info!(after = self.failures, "[Monitor] Sensor reads recovered");
                }
                self.failures = 0;
                self.history.ingest(&sample);
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                if self.failures % self.reinit_after == 0 {
                    warn!(
                        failures = self.failures,
                        sensor = self.sensor.name(),
                        "[Monitor] Re-initializing sensors"
                    );
                    if let Err(reinit) = self.sensor.reinitialize().await {
                        warn!(error = %reinit, "[Monitor] Sensor re-initialization failed");
                    }
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl LoopTask for MonitorLoop {
    fn name(&self) -> LoopName {
        LoopName::Monitor
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn iterate(&mut self, state: &SharedState) -> Result<(), LoopError> {
        let read = self.sample().await;
        let status = self.classifier.classify(&self.history);
        log_report(&status);
        self.alarm.signal(status.tier);

        {
            let mut s = state.lock().await;
            s.consecutive_sensor_failures = self.failures;
            s.publish_status(status);
        }

        read.map_err(LoopError::from)
    }
}

/// Fill the windows with `history_size` reads and classify once.
///
/// Used by `--once`; read failures are logged and skipped.
pub async fn classify_once(
    config: &PondConfig,
    sensor: &mut dyn SensorSampler,
) -> QualityStatus {
    let mut history = HistoryAggregator::with_fusion_weight(
        config.sampling.history_size,
        config.sampling.temperature_primary_weight,
    );
    for _ in 0..config.sampling.history_size {
        match sensor.read().await {
            Ok(sample) => history.ingest(&sample),
            Err(e) => warn!(error = %e, "Sensor read failed"),
        }
    }
    QualityClassifier::new(config.classifier.clone()).classify(&history)
}

/// Per-cycle monitoring report.
fn log_report(status: &QualityStatus) {
    info!(
        tier = %status.tier,
        score = status.score,
        alerts = status.alerts.len(),
        "[Monitor] Water quality classified"
    );
    for parameter in Parameter::ALL {
        match status.average(parameter) {
            Some(value) => debug!(
                parameter = %parameter,
                average = %parameter.format_value(value),
                trend = %status.trend(parameter),
                "[Monitor] Reading"
            ),
            None => debug!(parameter = %parameter, "[Monitor] No data"),
        }
    }
    for alert in &status.alerts {
        debug!(alert = %alert, "[Monitor] Alert");
    }
    for recommendation in &status.recommendations {
        debug!(recommendation = %recommendation, "[Monitor] Recommendation");
    }
}
