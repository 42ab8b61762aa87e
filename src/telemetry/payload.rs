//! Telemetry records and the validated wire payload
//!
//! A [`TelemetryRecord`] is the snapshot taken from the latest classification;
//! it is also the row stored in the backup file. [`TelemetryPayload`] is what
//! actually goes on the wire after per-field validation.
//!
//! Field mapping:
//!
//! | Field | Content | Rule |
//! |---|---|---|
//! | field1 | temperature (°C) | omitted outside [-40, 80] |
//! | field2 | pH | clamped to [0, 14] |
//! | field3 | conductivity (µS/cm) | omitted outside [0, 5000] |
//! | field4 | nitrogen (mg/kg) | omitted outside [0, 1999] |
//! | field5 | phosphorus (mg/kg) | omitted outside [0, 1999] |
//! | field6 | turbidity | 1 if turbid ratio > 0.5, else 0 |
//! | field7 | quality score | clamped to [0, 150] |
//! | field8 | status code | 0 GOOD, 1 WARNING, 2 CRITICAL |

use crate::types::{Parameter, QualityStatus, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const TEMPERATURE_RANGE: (f64, f64) = (-40.0, 80.0);
const PH_RANGE: (f64, f64) = (0.0, 14.0);
const CONDUCTIVITY_RANGE: (f64, f64) = (0.0, 5000.0);
const NUTRIENT_RANGE: (f64, f64) = (0.0, 1999.0);
const TURBID_RATIO: f64 = 0.5;
const SCORE_MAX: u32 = 150;

/// Number of sensor fields (field1..field6).
const SENSOR_FIELDS: usize = 6;

/// One snapshot destined for the telemetry channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub ph: Option<f64>,
    pub conductivity: Option<f64>,
    pub nitrogen: Option<f64>,
    pub phosphorus: Option<f64>,
    /// Turbid ratio over the window
    pub turbidity: Option<f64>,
    pub quality_score: Option<u32>,
    pub quality_status: Option<Tier>,
}

impl TelemetryRecord {
    /// Snapshot the averages and verdict of a classification.
    pub fn from_status(status: &QualityStatus) -> Self {
        Self {
            timestamp: status.timestamp,
            temperature: status.average(Parameter::Temperature),
            ph: status.average(Parameter::Ph),
            conductivity: status.average(Parameter::Conductivity),
            nitrogen: status.average(Parameter::Nitrogen),
            phosphorus: status.average(Parameter::Phosphorus),
            turbidity: status.average(Parameter::Turbidity),
            quality_score: Some(status.score),
            quality_status: Some(status.tier),
        }
    }
}

/// Validated field set, ready to encode as query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPayload {
    /// field1..field8, `None` when omitted
    fields: [Option<String>; 8],
    /// Original capture time, sent when replaying a queued record
    pub created_at: Option<DateTime<Utc>>,
}

impl TelemetryPayload {
    /// Validate a record field by field.
    ///
    /// Returns `None` when no sensor field (1-6) survives; a payload carrying
    /// only score and status is not worth sending.
    pub fn from_record(record: &TelemetryRecord) -> Option<Self> {
        let in_range = |v: Option<f64>, (lo, hi): (f64, f64)| {
            v.filter(|x| x.is_finite() && (lo..=hi).contains(x))
        };

        let fields = [
            in_range(record.temperature, TEMPERATURE_RANGE).map(|v| format_decimal(v, 2)),
            record
                .ph
                .filter(|v| v.is_finite())
                .map(|v| format_decimal(v.clamp(PH_RANGE.0, PH_RANGE.1), 2)),
            in_range(record.conductivity, CONDUCTIVITY_RANGE).map(|v| format_decimal(v, 0)),
            in_range(record.nitrogen, NUTRIENT_RANGE).map(|v| format_decimal(v, 1)),
            in_range(record.phosphorus, NUTRIENT_RANGE).map(|v| format_decimal(v, 1)),
            record
                .turbidity
                .filter(|v| v.is_finite())
                .map(|ratio| if ratio > TURBID_RATIO { "1" } else { "0" }.to_string()),
            record.quality_score.map(|s| s.min(SCORE_MAX).to_string()),
            record.quality_status.map(|t| t.status_code().to_string()),
        ];

        if fields[..SENSOR_FIELDS].iter().all(Option::is_none) {
            return None;
        }

        Some(Self {
            fields,
            created_at: None,
        })
    }

    /// Value of `fieldN` (1-based), if present.
    pub fn field(&self, n: usize) -> Option<&str> {
        n.checked_sub(1)
            .and_then(|i| self.fields.get(i))
            .and_then(|f| f.as_deref())
    }

    /// Number of fields that survived validation.
    pub fn field_count(&self) -> usize {
        self.fields.iter().filter(|f| f.is_some()).count()
    }

    /// Query pairs (`fieldN`, value) for every present field, plus
    /// `created_at` when set.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .fields
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|v| (format!("field{}", i + 1), v.clone())))
            .collect();
        if let Some(at) = self.created_at {
            pairs.push(("created_at".to_string(), at.to_rfc3339()));
        }
        pairs
    }
}

/// Fixed precision with trailing zeros trimmed, so `7.20` is sent as `7.2`.
fn format_decimal(value: f64, precision: usize) -> String {
    let s = format!("{value:.precision$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TelemetryRecord {
        TelemetryRecord {
            timestamp: Utc::now(),
            temperature: Some(24.25),
            ph: Some(7.2),
            conductivity: Some(650.4),
            nitrogen: Some(45.0),
            phosphorus: Some(30.0),
            turbidity: Some(0.2),
            quality_score: Some(0),
            quality_status: Some(Tier::Good),
        }
    }

    #[test]
    fn test_complete_record_maps_all_fields() {
        let payload = TelemetryPayload::from_record(&record()).unwrap();
        assert_eq!(payload.field_count(), 8);
        assert_eq!(payload.field(1), Some("24.25"));
        assert_eq!(payload.field(2), Some("7.2"));
        assert_eq!(payload.field(3), Some("650"));
        assert_eq!(payload.field(4), Some("45"));
        assert_eq!(payload.field(6), Some("0"));
        assert_eq!(payload.field(7), Some("0"));
        assert_eq!(payload.field(8), Some("0"));
        assert_eq!(payload.field(9), None);
        assert_eq!(payload.field(0), None);
    }

    #[test]
    fn test_out_of_range_values_are_omitted_or_clamped() {
        let rec = TelemetryRecord {
            temperature: Some(85.0),
            ph: Some(15.2),
            conductivity: Some(-3.0),
            nitrogen: Some(2500.0),
            phosphorus: Some(f64::NAN),
            turbidity: Some(0.8),
            quality_score: Some(400),
            quality_status: Some(Tier::Critical),
            ..record()
        };
        let payload = TelemetryPayload::from_record(&rec).unwrap();
        assert_eq!(payload.field(1), None);
        assert_eq!(payload.field(2), Some("14"));
        assert_eq!(payload.field(3), None);
        assert_eq!(payload.field(4), None);
        assert_eq!(payload.field(5), None);
        assert_eq!(payload.field(6), Some("1"));
        assert_eq!(payload.field(7), Some("150"));
        assert_eq!(payload.field(8), Some("2"));
    }

    #[test]
    fn test_rejected_when_no_sensor_field_survives() {
        let rec = TelemetryRecord {
            temperature: None,
            ph: None,
            conductivity: Some(9000.0),
            nitrogen: None,
            phosphorus: None,
            turbidity: None,
            ..record()
        };
        assert!(TelemetryPayload::from_record(&rec).is_none());
    }

    #[test]
    fn test_query_pairs_include_created_at_for_replay() {
        let mut payload = TelemetryPayload::from_record(&record()).unwrap();
        assert!(!payload.query_pairs().iter().any(|(k, _)| k == "created_at"));
        payload.created_at = Some(Utc::now());
        let pairs = payload.query_pairs();
        assert_eq!(pairs[0].0, "field1");
        assert_eq!(pairs.last().unwrap().0, "created_at");
    }

    #[test]
    fn test_format_decimal_trims_zeros() {
        assert_eq!(format_decimal(7.20, 2), "7.2");
        assert_eq!(format_decimal(650.4, 0), "650");
        assert_eq!(format_decimal(14.0, 2), "14");
        assert_eq!(format_decimal(-0.5, 1), "-0.5");
    }
}
