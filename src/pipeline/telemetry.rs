//! Telemetry loop: checks every few seconds, publishes once per send
//! interval, and mirrors uploader counters into shared state.
//!
//! The uploader holds the shutdown token, so a cycle in progress is allowed to
//! finish and queue what it could not send.

use super::runner::{LoopError, LoopTask};
use crate::telemetry::{TelemetryRecord, TelemetryUploader, UploadOutcome};
use crate::types::{LoopName, SharedState};
use async_trait::async_trait;
use tokio::time::{Duration, Instant};
use tracing::debug;

pub struct TelemetryLoop {
    uploader: TelemetryUploader,
    period: Duration,
}

impl TelemetryLoop {
    pub fn new(uploader: TelemetryUploader, check_interval: Duration) -> Self {
        Self {
            uploader,
            period: check_interval,
        }
    }
}

#[async_trait]
impl LoopTask for TelemetryLoop {
    fn name(&self) -> LoopName {
        LoopName::Telemetry
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn iterate(&mut self, state: &SharedState) -> Result<(), LoopError> {
        if !self.uploader.is_due(Instant::now()) {
            return Ok(());
        }
        let Some(status) = state.lock().await.latest_status.clone() else {
            debug!("[Telemetry] No classification yet, nothing to send");
            return Ok(());
        };

        let outcome = self.uploader.run_cycle(TelemetryRecord::from_status(&status)).await;
        debug!(?outcome, "[Telemetry] Cycle complete");

        state.lock().await.telemetry = self.uploader.stats().clone();
        match outcome {
            UploadOutcome::Dropped => Err(LoopError::Telemetry(
                "update could be neither delivered nor queued".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn finish_on_cancel(&self) -> bool {
        true
    }
}
