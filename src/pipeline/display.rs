//! Display loop: rotates status screens on the character display.
//!
//! Screens: tier and score, temperature and pH, conductivity and turbidity,
//! nutrients, first alert, pump state. After `max_failures` consecutive
//! write failures the display is marked unavailable and skipped.

use super::runner::{LoopError, LoopTask};
use crate::config::DisplayConfig;
use crate::hardware::DisplaySink;
use crate::types::{LoopName, Parameter, PumpState, QualityStatus, SharedState};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, warn};

pub struct DisplayLoop {
    sink: Arc<dyn DisplaySink>,
    period: Duration,
    width: usize,
    max_failures: u32,
    failures: u32,
    screen: usize,
}

impl DisplayLoop {
    pub fn new(config: &DisplayConfig, sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            sink,
            period: config.refresh_interval(),
            width: config.width.max(1),
            max_failures: config.max_failures.max(1),
            failures: 0,
            screen: 0,
        }
    }
}

#[async_trait]
impl LoopTask for DisplayLoop {
    fn name(&self) -> LoopName {
        LoopName::Display
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn iterate(&mut self, state: &SharedState) -> Result<(), LoopError> {
        let (available, status, pump) = {
            let s = state.lock().await;
            (s.display_available, s.latest_status.clone(), s.pump)
        };
        if !available {
            return Ok(());
        }

        let screens = render_screens(status.as_deref(), &pump, self.width);
        let lines = &screens[self.screen % screens.len()];
        self.screen = self.screen.wrapping_add(1);

        match self.sink.show(lines) {
            Ok(()) => {
                if self.failures > 0 {
                    info!(after = self.failures, "[Display] Display recovered");
                }
                self.failures = 0;
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                if self.failures >= self.max_failures {
                    warn!(
                        failures = self.failures,
                        "[Display] Too many failures, marking display unavailable"
                    );
                    state.lock().await.display_available = false;
                }
                Err(e.into())
            }
        }
    }
}

/// Every screen for the current state, each line cut to `width` characters.
pub fn render_screens(
    status: Option<&QualityStatus>,
    pump: &PumpState,
    width: usize,
) -> Vec<Vec<String>> {
    let Some(status) = status else {
        return vec![fit(vec!["Pond monitor".into(), "Waiting data".into()], width)];
    };

    let value = |p: Parameter, precision: usize| {
        status
            .average(p)
            .map_or_else(|| "--".to_string(), |v| format!("{v:.precision$}"))
    };
    let turbidity = match status.average(Parameter::Turbidity) {
        Some(r) if r > 0.5 => "Turbid".to_string(),
        Some(_) => "Clear".to_string(),
        None => "--".to_string(),
    };
    let first_alert = status
        .alerts
        .first()
        .map_or_else(|| "No alerts".to_string(), Clone::clone);
    let pump_line = if pump.running {
        "Running".to_string()
    } else if let Some(mode) = pump.pending {
        format!("Starting {mode}")
    } else {
        "Idle".to_string()
    };

    [
        vec![format!("Status: {}", status.tier), format!("Score: {}", status.score)],
        vec![
            format!("Temp: {}C", value(Parameter::Temperature, 1)),
            format!("pH: {}", value(Parameter::Ph, 2)),
        ],
        vec![
            format!("EC: {}", value(Parameter::Conductivity, 0)),
            format!("Water: {turbidity}"),
        ],
        vec![
            format!("N: {}", value(Parameter::Nitrogen, 0)),
            format!("P: {}", value(Parameter::Phosphorus, 0)),
        ],
        vec!["Alert:".to_string(), first_alert],
        vec![format!("Pump: {}", pump.mode), pump_line],
    ]
    .into_iter()
    .map(|screen| fit(screen, width))
    .collect()
}

fn fit(lines: Vec<String>, width: usize) -> Vec<String> {
    lines
        .into_iter()
        .map(|line| line.chars().take(width).collect())
        .collect()
}
