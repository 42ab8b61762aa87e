//! Rolling per-parameter history windows
//!
//! Each parameter keeps a bounded FIFO of its most recent readings. Averages
//! and trends are computed on demand from the window; absent readings are never
//! stored, so an empty window means "no data".

use crate::types::{Averages, Parameter, RawSample, Trend};
use std::collections::{BTreeMap, VecDeque};

/// Minimum samples before a trend other than STABLE is reported.
const MIN_TREND_SAMPLES: usize = 3;

/// Relative change between window halves that counts as a trend.
const TREND_RELATIVE_THRESHOLD: f64 = 0.1;

/// Absolute floor on the trend threshold, so values near zero don't flap.
const TREND_ABSOLUTE_FLOOR: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct HistoryAggregator {
    capacity: usize,
    primary_weight: f64,
    windows: BTreeMap<Parameter, VecDeque<f64>>,
}

impl HistoryAggregator {
    /// Create an aggregator holding `capacity` samples per parameter.
    pub fn new(capacity: usize) -> Self {
        Self::with_fusion_weight(capacity, crate::config::defaults::TEMPERATURE_PRIMARY_WEIGHT)
    }

    /// As [`Self::new`], with the primary-probe weight used by temperature fusion.
    pub fn with_fusion_weight(capacity: usize, primary_weight: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            primary_weight: primary_weight.clamp(0.0, 1.0),
            windows: Parameter::ALL
                .into_iter()
                .map(|p| (p, VecDeque::with_capacity(capacity)))
                .collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a reading, evicting the oldest once the window is full.
    /// Absent and non-finite values are ignored.
    pub fn update(&mut self, parameter: Parameter, value: Option<f64>) {
        let Some(value) = value.filter(|v| v.is_finite()) else {
            return;
        };
        let capacity = self.capacity;
        let window = self
            .windows
            .entry(parameter)
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        if window.len() == capacity {
            window.pop_front();
        }
        window.push_back(value);
    }

    /// Fuse the two temperature probes and append the result.
    pub fn update_temperature(&mut self, primary: Option<f64>, auxiliary: Option<f64>) {
        let fused = fuse_temperatures(primary, auxiliary, self.primary_weight);
        self.update(Parameter::Temperature, fused);
    }

    /// Feed every value from one sensor tick.
    pub fn ingest(&mut self, sample: &RawSample) {
        self.update_temperature(sample.temperature, sample.temperature_aux);
        self.update(Parameter::Ph, sample.ph);
        self.update(Parameter::Conductivity, sample.conductivity);
        self.update(Parameter::Nitrogen, sample.nitrogen);
        self.update(Parameter::Phosphorus, sample.phosphorus);
        self.update(
            Parameter::Turbidity,
            sample.turbid.map(|t| if t { 1.0 } else { 0.0 }),
        );
    }

    /// Arithmetic mean of the window, or `None` when it is empty.
    pub fn average(&self, parameter: Parameter) -> Option<f64> {
        self.windows.get(&parameter).and_then(|w| mean(w.iter()))
    }

    /// Averages for every parameter that has data.
    pub fn averages(&self) -> Averages {
        Parameter::ALL
            .into_iter()
            .filter_map(|p| self.average(p).map(|avg| (p, avg)))
            .collect()
    }

    /// Compare the mean of the newer half of the window with the older half.
    ///
    /// The older half is the first `n / 2` samples; the newer half is the rest.
    pub fn trend(&self, parameter: Parameter) -> Trend {
        let Some(window) = self.windows.get(&parameter) else {
            return Trend::Stable;
        };
        if window.len() < MIN_TREND_SAMPLES {
            return Trend::Stable;
        }

        let mid = window.len() / 2;
        let (Some(first), Some(second)) = (
            mean(window.iter().take(mid)),
            mean(window.iter().skip(mid)),
        ) else {
            return Trend::Stable;
        };

        let diff = second - first;
        let threshold = (TREND_RELATIVE_THRESHOLD * first.abs()).max(TREND_ABSOLUTE_FLOOR);
        if diff > threshold {
            Trend::Increasing
        } else if diff < -threshold {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }

    /// Trends for every parameter.
    pub fn trends(&self) -> BTreeMap<Parameter, Trend> {
        Parameter::ALL
            .into_iter()
            .map(|p| (p, self.trend(p)))
            .collect()
    }

    /// The window contents, oldest first.
    pub fn values(&self, parameter: Parameter) -> Vec<f64> {
        self.windows
            .get(&parameter)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    /// True when no parameter holds any sample.
    pub fn is_empty(&self) -> bool {
        self.windows.values().all(VecDeque::is_empty)
    }
}

/// Weighted blend of the two temperature probes, falling back to whichever
/// one reported.
pub fn fuse_temperatures(primary: Option<f64>, auxiliary: Option<f64>, primary_weight: f64) -> Option<f64> {
    let primary = primary.filter(|v| v.is_finite());
    let auxiliary = auxiliary.filter(|v| v.is_finite());
    match (primary, auxiliary) {
        (Some(p), Some(a)) => Some(primary_weight * p + (1.0 - primary_weight) * a),
        (Some(p), None) => Some(p),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(parameter: Parameter, values: &[f64]) -> HistoryAggregator {
        let mut history = HistoryAggregator::new(5);
        for v in values {
            history.update(parameter, Some(*v));
        }
        history
    }

    #[test]
    fn test_window_is_fifo_with_capacity() {
        let history = filled(Parameter::Ph, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(history.values(Parameter::Ph), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(history.average(Parameter::Ph), Some(5.0));
    }

    #[test]
    fn test_absent_values_are_not_stored() {
        let mut history = HistoryAggregator::new(5);
        history.update(Parameter::Conductivity, None);
        history.update(Parameter::Conductivity, Some(f64::NAN));
        assert_eq!(history.average(Parameter::Conductivity), None);
        assert!(history.is_empty());

        history.update(Parameter::Conductivity, Some(800.0));
        history.update(Parameter::Conductivity, None);
        assert_eq!(history.values(Parameter::Conductivity), vec![800.0]);
    }

    #[test]
    fn test_trend_stable_below_three_samples() {
        let history = filled(Parameter::Temperature, &[10.0, 40.0]);
        assert_eq!(history.trend(Parameter::Temperature), Trend::Stable);
        assert_eq!(HistoryAggregator::new(5).trend(Parameter::Ph), Trend::Stable);
    }

    #[test]
    fn test_trend_uses_floor_half_split() {
        // n = 5: first half [20, 20], second half [20, 25, 25] (mean 23.33)
        let history = filled(Parameter::Temperature, &[20.0, 20.0, 20.0, 25.0, 25.0]);
        assert_eq!(history.trend(Parameter::Temperature), Trend::Increasing);

        let history = filled(Parameter::Temperature, &[25.0, 25.0, 20.0, 20.0, 20.0]);
        assert_eq!(history.trend(Parameter::Temperature), Trend::Decreasing);
    }

    #[test]
    fn test_trend_threshold_is_relative_with_floor() {
        // 10% of 20 = 2.0; a 1.5 rise is noise
        let history = filled(Parameter::Temperature, &[20.0, 20.0, 21.5, 21.5]);
        assert_eq!(history.trend(Parameter::Temperature), Trend::Stable);

        // near zero the 0.2 floor applies: 0.0 -> 0.3 is a rise, 0.0 -> 0.1 is not
        let history = filled(Parameter::Turbidity, &[0.0, 0.0, 0.3, 0.3]);
        assert_eq!(history.trend(Parameter::Turbidity), Trend::Increasing);
        let history = filled(Parameter::Turbidity, &[0.0, 0.0, 0.1, 0.1]);
        assert_eq!(history.trend(Parameter::Turbidity), Trend::Stable);
    }

    #[test]
    fn test_temperature_fusion() {
        let fused = fuse_temperatures(Some(20.0), Some(25.0), 0.6).unwrap();
        assert!((fused - 22.0).abs() < 1e-9);
        assert_eq!(fuse_temperatures(None, Some(25.0), 0.6), Some(25.0));
        assert_eq!(fuse_temperatures(Some(20.0), Some(f64::NAN), 0.6), Some(20.0));
        assert_eq!(fuse_temperatures(None, None, 0.6), None);
    }

    #[test]
    fn test_ingest_encodes_turbidity_as_ratio() {
        let mut history = HistoryAggregator::new(4);
        for turbid in [true, false, true, true] {
            history.ingest(&RawSample {
                turbid: Some(turbid),
                ..RawSample::empty()
            });
        }
        assert_eq!(history.average(Parameter::Turbidity), Some(0.75));
        assert_eq!(history.average(Parameter::Temperature), None);
    }

    #[test]
    fn test_averages_only_contains_present_parameters() {
        let mut history = HistoryAggregator::new(5);
        history.update(Parameter::Ph, Some(7.0));
        history.update(Parameter::Nitrogen, Some(40.0));
        let averages = history.averages();
        assert_eq!(averages.len(), 2);
        assert_eq!(averages.get(&Parameter::Ph), Some(&7.0));
    }
}
