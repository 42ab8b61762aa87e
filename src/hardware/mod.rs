//! Hardware collaborator seams
//!
//! The monitor never talks to GPIO, Modbus or serial modems directly. Each
//! device family sits behind one of these traits:
//!
//! - [`SensorSampler`]: all probes, read once per classification tick
//! - [`ActuatorHardware`]: pump relay, tier indicators and alarm buzzer
//! - [`DisplaySink`]: the character display
//! - [`NotificationSender`]: SMS (or any other) alert channel
//!
//! [`simulated`] provides implementations that need no hardware.

pub mod simulated;

use crate::types::{AlarmLevel, RawSample, Tier};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),

    #[error("Sensor read failed: {0}")]
    Read(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    #[error("Actuator fault: {0}")]
    ActuatorFault(String),

    #[error("Display fault: {0}")]
    DisplayFault(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotificationError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification to {recipient} rejected: {reason}")]
    Rejected { recipient: String, reason: String },
}

// ============================================================================
// Traits
// ============================================================================

/// Source of raw probe readings.
///
/// Implementations handle bus framing and per-register retries internally.
/// A probe that cannot be read this tick reports `None` for its value; `Err`
/// is reserved for the whole sampler being unreachable.
#[async_trait]
pub trait SensorSampler: Send + 'static {
    /// Read every probe once.
    async fn read(&mut self) -> Result<RawSample, SensorError>;

    /// Tear down and re-open the underlying bus after repeated failures.
    async fn reinitialize(&mut self) -> Result<(), SensorError>;

    /// Human-readable name for logging (e.g. "RS485", "simulated").
    fn name(&self) -> &str;
}

/// Pump relay, indicator LEDs and alarm buzzer.
pub trait ActuatorHardware: Send + Sync {
    fn set_pump(&self, on: bool) -> Result<(), HardwareError>;

    /// Light the indicator for `tier`, or turn all indicators off with `None`.
    fn set_indicator(&self, tier: Option<Tier>) -> Result<(), HardwareError>;

    fn set_alarm(&self, level: AlarmLevel) -> Result<(), HardwareError>;

    /// Pump off, indicators off, alarm silent.
    fn all_off(&self) -> Result<(), HardwareError> {
        let pump = self.set_pump(false);
        let indicator = self.set_indicator(None);
        let alarm = self.set_alarm(AlarmLevel::Off);
        pump.and(indicator).and(alarm)
    }
}

/// Character display.
pub trait DisplaySink: Send + Sync {
    /// Replace the display contents with `lines`.
    fn show(&self, lines: &[String]) -> Result<(), HardwareError>;
}

/// Outbound alert channel.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send `message` to every recipient. One result per recipient, in order.
    async fn send_alert(
        &self,
        recipients: &[String],
        message: &str,
    ) -> Vec<(String, Result<(), NotificationError>)>;
}
