//! Shared data structures for pond monitoring
//!
//! - [`Parameter`], [`Reading`], [`RawSample`]: what the sensor sampler produces each tick
//! - [`Tier`], [`Trend`], [`QualityStatus`]: classifier output, immutable once published
//! - [`PumpMode`], [`PumpState`]: actuator controller state
//! - [`SystemState`]: the single shared aggregate every loop reads and writes

mod state;

pub use state::{
    Heartbeats, LoopName, PumpSnapshot, SharedState, StateSnapshot, SystemState, TelemetryStats,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio::time::Instant;

// ============================================================================
// Sensor Readings
// ============================================================================

/// A tracked water-quality parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Temperature,
    Ph,
    Conductivity,
    Nitrogen,
    Phosphorus,
    Turbidity,
}

impl Parameter {
    /// Every tracked parameter, in classification order.
    pub const ALL: [Parameter; 6] = [
        Parameter::Ph,
        Parameter::Temperature,
        Parameter::Conductivity,
        Parameter::Turbidity,
        Parameter::Nitrogen,
        Parameter::Phosphorus,
    ];

    /// Human-readable label used in alerts and on the display.
    pub fn label(self) -> &'static str {
        match self {
            Parameter::Temperature => "Temperature",
            Parameter::Ph => "pH",
            Parameter::Conductivity => "EC",
            Parameter::Nitrogen => "Nitrogen",
            Parameter::Phosphorus => "Phosphorus",
            Parameter::Turbidity => "Turbidity ratio",
        }
    }

    /// Unit suffix appended after a formatted value.
    pub fn unit(self) -> &'static str {
        match self {
            Parameter::Temperature => "°C",
            Parameter::Ph | Parameter::Turbidity => "",
            Parameter::Conductivity => " µS/cm",
            Parameter::Nitrogen | Parameter::Phosphorus => " mg/kg",
        }
    }

    /// Format a value with the precision this parameter is reported at.
    pub fn format_value(self, value: f64) -> String {
        match self {
            Parameter::Conductivity => format!("{value:.0}{}", self.unit()),
            Parameter::Turbidity => format!("{value:.2}"),
            _ => format!("{value:.1}{}", self.unit()),
        }
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One parameter's value for one tick. `None` means no reading this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub parameter: Parameter,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Everything the sensor sampler produced for a single tick.
///
/// Two temperature probes are carried separately so the history aggregator can
/// fuse them; turbidity is a digital "turbid / clear" input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: DateTime<Utc>,
    /// Temperature from the multi-parameter probe (°C)
    pub temperature: Option<f64>,
    /// Temperature from the auxiliary immersion probe (°C)
    pub temperature_aux: Option<f64>,
    pub ph: Option<f64>,
    /// Electrical conductivity (µS/cm)
    pub conductivity: Option<f64>,
    pub nitrogen: Option<f64>,
    pub phosphorus: Option<f64>,
    pub turbid: Option<bool>,
}

impl RawSample {
    /// An empty sample stamped with the current time.
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            ..Self::default()
        }
    }

    /// Flatten into per-parameter readings (temperature is the main probe only).
    pub fn readings(&self) -> Vec<Reading> {
        let turbidity = self.turbid.map(|t| if t { 1.0 } else { 0.0 });
        [
            (Parameter::Temperature, self.temperature),
            (Parameter::Ph, self.ph),
            (Parameter::Conductivity, self.conductivity),
            (Parameter::Nitrogen, self.nitrogen),
            (Parameter::Phosphorus, self.phosphorus),
            (Parameter::Turbidity, turbidity),
        ]
        .into_iter()
        .map(|(parameter, value)| Reading {
            parameter,
            value,
            timestamp: self.timestamp,
        })
        .collect()
    }

    /// True when no probe produced anything this tick.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.temperature_aux.is_none()
            && self.ph.is_none()
            && self.conductivity.is_none()
            && self.nitrogen.is_none()
            && self.phosphorus.is_none()
            && self.turbid.is_none()
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Severity tier of the aggregate pond condition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    #[default]
    Good,
    Warning,
    Critical,
}

impl Tier {
    /// Numeric code published as telemetry field 8.
    pub fn status_code(self) -> u8 {
        match self {
            Tier::Good => 0,
            Tier::Warning => 1,
            Tier::Critical => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Good => "GOOD",
            Tier::Warning => "WARNING",
            Tier::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GOOD" => Ok(Tier::Good),
            "WARNING" => Ok(Tier::Warning),
            "CRITICAL" => Ok(Tier::Critical),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// Direction of a parameter over its history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Increasing => write!(f, "INCREASING"),
            Trend::Decreasing => write!(f, "DECREASING"),
            Trend::Stable => write!(f, "STABLE"),
        }
    }
}

/// Per-parameter window averages. Absent parameters have no entry.
pub type Averages = BTreeMap<Parameter, f64>;

/// Result of one classification cycle.
///
/// Built fresh every cycle and shared behind an `Arc` once published; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityStatus {
    pub tier: Tier,
    pub score: u32,
    /// Alerts in the order the parameters were assessed
    pub alerts: Vec<String>,
    /// Deduplicated recommendations
    pub recommendations: BTreeSet<String>,
    pub trends: BTreeMap<Parameter, Trend>,
    /// Window averages the score was computed from
    pub averages: Averages,
    pub timestamp: DateTime<Utc>,
}

impl QualityStatus {
    pub fn average(&self, parameter: Parameter) -> Option<f64> {
        self.averages.get(&parameter).copied()
    }

    pub fn trend(&self, parameter: Parameter) -> Trend {
        self.trends.get(&parameter).copied().unwrap_or_default()
    }
}

// ============================================================================
// Pump
// ============================================================================

/// Pump cycle mode. Each non-OFF mode has a configured run duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PumpMode {
    #[default]
    Off,
    Short,
    Normal,
    Long,
}

impl std::fmt::Display for PumpMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PumpMode::Off => write!(f, "OFF"),
            PumpMode::Short => write!(f, "SHORT"),
            PumpMode::Normal => write!(f, "NORMAL"),
            PumpMode::Long => write!(f, "LONG"),
        }
    }
}

/// Actuator state, owned by the actuator controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PumpState {
    pub mode: PumpMode,
    pub running: bool,
    pub started_at: Option<Instant>,
    /// Latched activation request not yet acted upon
    pub pending: Option<PumpMode>,
}

/// Alarm output level. `Tone` carries a PWM duty cycle in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmLevel {
    Off,
    Tone(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_and_codes() {
        assert!(Tier::Good < Tier::Warning);
        assert!(Tier::Warning < Tier::Critical);
        assert_eq!(Tier::Good.status_code(), 0);
        assert_eq!(Tier::Warning.status_code(), 1);
        assert_eq!(Tier::Critical.status_code(), 2);
    }

    #[test]
    fn test_tier_parse_is_case_insensitive() {
        assert_eq!("critical".parse::<Tier>(), Ok(Tier::Critical));
        assert_eq!(" Good ".parse::<Tier>(), Ok(Tier::Good));
        assert!("unknown".parse::<Tier>().is_err());
    }

    #[test]
    fn test_raw_sample_readings_encode_turbidity() {
        let sample = RawSample {
            turbid: Some(true),
            ph: Some(7.1),
            ..RawSample::empty()
        };
        let readings = sample.readings();
        assert_eq!(readings.len(), 6);
        let turbidity = readings
            .iter()
            .find(|r| r.parameter == Parameter::Turbidity)
            .unwrap();
        assert_eq!(turbidity.value, Some(1.0));
        let ec = readings
            .iter()
            .find(|r| r.parameter == Parameter::Conductivity)
            .unwrap();
        assert_eq!(ec.value, None);
        assert!(!sample.is_empty());
        assert!(RawSample::empty().is_empty());
    }

    #[test]
    fn test_format_value_precision() {
        assert_eq!(Parameter::Conductivity.format_value(1234.6), "1235 µS/cm");
        assert_eq!(Parameter::Ph.format_value(5.04), "5.0");
        assert_eq!(Parameter::Nitrogen.format_value(250.0), "250.0 mg/kg");
    }
}
