//! Generic periodic loop runner shared by every supervised loop.
//!
//! Each iteration races the cancellation token unless the task handles
//! shutdown itself (`finish_on_cancel`). Errors and panics inside an
//! iteration are caught and logged, followed by a short backoff; the heartbeat
//! is stamped after every iteration either way.

use crate::hardware::{HardwareError, SensorError};
use crate::types::{LoopName, SharedState};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Failure of one loop iteration. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    #[error("Telemetry: {0}")]
    Telemetry(String),
}

/// One periodic unit of work.
#[async_trait]
pub trait LoopTask: Send + 'static {
    fn name(&self) -> LoopName;

    /// Time between iteration starts.
    fn period(&self) -> Duration;

    async fn iterate(&mut self, state: &SharedState) -> Result<(), LoopError>;

    /// Let an in-flight iteration run to completion after cancellation.
    /// Tasks returning true must observe the token themselves.
    fn finish_on_cancel(&self) -> bool {
        false
    }
}

/// Drive `task` until `cancel` fires. Returns the loop's name.
pub async fn run_loop<T: LoopTask>(
    mut task: T,
    state: SharedState,
    cancel: CancellationToken,
    error_backoff: Duration,
) -> LoopName {
    let name = task.name();
    let tag = name.tag();
    let mut interval = tokio::time::interval(task.period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(period_ms = task.period().as_millis() as u64, "[{}] Task starting", tag);
    let mut iterations = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let outcome = if task.finish_on_cancel() {
            AssertUnwindSafe(task.iterate(&state)).catch_unwind().await
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = AssertUnwindSafe(task.iterate(&state)).catch_unwind() => outcome,
            }
        };
        iterations += 1;

        let failed = match outcome {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!(error = %e, "[{}] Iteration failed", tag);
                true
            }
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "[{}] Iteration panicked", tag);
                true
            }
        };

        state.lock().await.beat(name);

        if failed {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(error_backoff) => {}
            }
        }
    }

    info!(iterations, "[{}] Received shutdown signal", tag);
    name
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
