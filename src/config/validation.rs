//! Config validation: unknown-key detection with Levenshtein suggestions
//! and plausibility checks on sensor-facing thresholds.
//!
//! Two-pass parse: the raw TOML is first walked as a `toml::Value` and every
//! dotted key is compared against the keys the default config serializes to.
//! Unknown keys produce warnings with "did you mean?" suggestions; they never
//! fail the load.

use super::pond_config::{config_key, PondConfig};
use crate::types::Parameter;
use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Fields a classifier band table may carry, including optional ones the
/// defaults leave out.
const BAND_FIELDS: [&str; 6] = [
    "kind",
    "limit",
    "penalty",
    "severity",
    "description",
    "recommendation",
];

/// Every valid dotted key path for `PondConfig`.
///
/// Derived from the serialized defaults so new fields are picked up without
/// maintaining a list by hand. Optional fields that the defaults omit are
/// added explicitly.
pub fn known_config_keys() -> HashSet<String> {
    let mut keys: HashSet<String> = toml::Value::try_from(PondConfig::default())
        .map(|value| walk_toml_keys(&value, "").into_iter().collect())
        .unwrap_or_default();

    for parameter in Parameter::ALL {
        let section = format!("classifier.{}", config_key(parameter));
        keys.insert(format!("{section}.unavailable_alert"));
        keys.insert(format!("{section}.bands"));
        for field in BAND_FIELDS {
            keys.insert(format!("{section}.bands.{field}"));
        }
    }
    keys
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// Tables inside arrays contribute their keys under the array's path, without
/// an index: `{ a = [{ b = 1 }] }` yields `["a", "a.b"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        for key in walk_toml_keys(item, &path) {
                            if !keys.contains(&key) {
                                keys.push(key);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.clone())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Parse errors return no warnings; serde reports them on the real parse.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Plausibility Checks
// ============================================================================

/// Warn on values that parse and validate but are unlikely to be intended.
pub fn validate_value_ranges(config: &PondConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let pump = &config.pump;
    if pump.ph_low < 0.0 || pump.ph_high > 14.0 {
        warnings.push(ValidationWarning {
            field: "pump.ph_low".to_string(),
            message: format!(
                "pump pH window [{:.1}, {:.1}] extends outside the 0-14 scale",
                pump.ph_low, pump.ph_high
            ),
            suggestion: None,
        });
    }
    if !(0.0..=1.0).contains(&pump.turbidity_ratio) {
        warnings.push(ValidationWarning {
            field: "pump.turbidity_ratio".to_string(),
            message: format!(
                "pump.turbidity_ratio = {:.2} can never match a turbid ratio in [0, 1]",
                pump.turbidity_ratio
            ),
            suggestion: None,
        });
    }

    let telemetry = &config.telemetry;
    if telemetry.enabled && telemetry.send_interval_secs < telemetry.min_spacing_secs {
        warnings.push(ValidationWarning {
            field: "telemetry.send_interval_secs".to_string(),
            message: format!(
                "telemetry.send_interval_secs = {} is below min_spacing_secs = {}; sends will be throttled",
                telemetry.send_interval_secs, telemetry.min_spacing_secs
            ),
            suggestion: None,
        });
    }

    if config.alerts.critical_sustain_secs < config.sampling.classify_interval_secs {
        warnings.push(ValidationWarning {
            field: "alerts.critical_sustain_secs".to_string(),
            message: format!(
                "alerts.critical_sustain_secs = {} is shorter than one classification cycle ({}s)",
                config.alerts.critical_sustain_secs, config.sampling.classify_interval_secs
            ),
            suggestion: None,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("histroy_size", "history_size"), 2);
        assert_eq!(levenshtein("long_sec", "long_secs"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [pump]
            long_secs = 240
            [classifier.ph]
            bands = [{ kind = "below", limit = 5.5 }]
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"pump".to_string()));
        assert!(keys.contains(&"pump.long_secs".to_string()));
        assert!(keys.contains(&"classifier.ph.bands".to_string()));
        assert!(keys.contains(&"classifier.ph.bands.limit".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[sampling]
histroy_size = 8
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "sampling.histroy_size");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("sampling.history_size")
        );
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[site]
name = "North pond"

[pump]
short_secs = 100

[alerts]
recipients = ["+15550100"]

[classifier.temperature]
unavailable_alert = "Probe missing"
bands = [{ kind = "above", limit = 30.0, penalty = 15, severity = "warning", description = "warm", recommendation = "Aerate" }]
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {warnings:?}");
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let warnings = validate_unknown_keys("[mqtt]\nbroker = \"localhost\"\n");
        assert!(warnings.iter().any(|w| w.field == "mqtt"));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_known_keys_covers_all_sections() {
        let known = known_config_keys();
        for section in [
            "site", "sampling", "classifier", "pump", "alerts", "indicators", "display",
            "telemetry", "network", "watchdog", "hardware", "server",
        ] {
            assert!(known.contains(section), "missing section {section}");
        }
        assert!(known.contains("telemetry.backup_max_records"));
        assert!(known.contains("classifier.conductivity.bands.recommendation"));
        assert!(known.contains("classifier.turbidity.unavailable_penalty"));
    }

    #[test]
    fn test_defaults_produce_no_range_warnings() {
        let warnings = validate_value_ranges(&PondConfig::default());
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_turbidity_ratio_outside_unit_interval_warns() {
        let mut config = PondConfig::default();
        config.pump.turbidity_ratio = 7.0;
        let warnings = validate_value_ranges(&config);
        assert!(warnings.iter().any(|w| w.field == "pump.turbidity_ratio"));
    }
}
