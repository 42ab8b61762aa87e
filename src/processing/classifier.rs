//! Water Quality Classifier
//!
//! Deterministic, rule-based scoring of the window averages. Every parameter is
//! checked against its configured bands; the first band that matches adds its
//! penalty, an alert and (optionally) a recommendation. A parameter with no
//! data adds its "unavailable" penalty instead.
//!
//! # Tiers
//!
//! The tier is a pure function of the total score:
//! - `score >= critical_threshold` → CRITICAL
//! - `score >= warning_threshold` → WARNING
//! - otherwise → GOOD
//!
//! When no parameter has any data the result is WARNING with a fixed score, so
//! a dead sensor bus can never read as a healthy pond.

use crate::config::{Band, BandSeverity, ClassifierConfig};
use crate::processing::HistoryAggregator;
use crate::types::{Averages, Parameter, QualityStatus, Tier, Trend};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

/// Alert raised when every parameter is absent.
pub const NO_DATA_ALERT: &str = "No valid sensor data available";

#[derive(Debug, Clone)]
pub struct QualityClassifier {
    config: ClassifierConfig,
}

impl QualityClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify the current contents of the history windows.
    pub fn classify(&self, history: &HistoryAggregator) -> QualityStatus {
        self.classify_averages(history.averages(), history.trends())
    }

    /// Classify precomputed averages. Parameters missing from `averages` are
    /// treated as unavailable.
    pub fn classify_averages(
        &self,
        averages: Averages,
        trends: BTreeMap<Parameter, Trend>,
    ) -> QualityStatus {
        let mut alerts = Vec::new();
        let mut recommendations = BTreeSet::new();

        let score = if averages.is_empty() {
            alerts.push(NO_DATA_ALERT.to_string());
            self.config.no_data_score
        } else {
            let mut score: u32 = 0;
            for parameter in Parameter::ALL {
                let bands = self.config.bands_for(parameter);
                match averages.get(&parameter) {
                    None => {
                        score = score.saturating_add(bands.unavailable_penalty);
                        if let Some(alert) = &bands.unavailable_alert {
                            alerts.push(alert.clone());
                        }
                    }
                    Some(&value) => {
                        if let Some(band) = bands.bands.iter().find(|b| b.matches(value)) {
                            score = score.saturating_add(band.penalty);
                            alerts.push(format_alert(parameter, value, band));
                            if let Some(rec) = &band.recommendation {
                                recommendations.insert(rec.clone());
                            }
                        }
                    }
                }
            }
            score
        };

        let tier = if averages.is_empty() {
            // Never GOOD without data, whatever the configured no-data score
            self.tier_for(score).max(Tier::Warning)
        } else {
            self.tier_for(score)
        };

        QualityStatus {
            tier,
            score,
            alerts,
            recommendations,
            trends,
            averages,
            timestamp: Utc::now(),
        }
    }

    /// Map a score onto a tier.
    pub fn tier_for(&self, score: u32) -> Tier {
        if score >= self.config.critical_threshold {
            Tier::Critical
        } else if score >= self.config.warning_threshold {
            Tier::Warning
        } else {
            Tier::Good
        }
    }
}

fn format_alert(parameter: Parameter, value: f64, band: &Band) -> String {
    let prefix = match band.severity {
        BandSeverity::Critical => "CRITICAL: ",
        BandSeverity::Warning => "WARNING: ",
        BandSeverity::Monitor => "",
    };
    format!(
        "{prefix}{} {} is {}",
        parameter.label(),
        parameter.format_value(value),
        band.description
    )
}
