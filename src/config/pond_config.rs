//! Pond Configuration - every threshold and cadence as an operator-tunable TOML value
//!
//! Each struct implements `Default` from [`super::defaults`], so a missing file
//! or a partial file behaves exactly like the built-in values.

use super::defaults;
use crate::types::Parameter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "POND_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "pond_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one pond deployment.
///
/// Load with `PondConfig::load()` which searches:
/// 1. `$POND_CONFIG` env var
/// 2. `./pond_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PondConfig {
    #[serde(default)]
    pub site: SiteConfig,

    /// Sensor sampling and history window
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Scoring bands and tier thresholds
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Pump cycle selection and durations
    #[serde(default)]
    pub pump: PumpConfig,

    /// Critical-episode notification
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Alarm chirp patterns
    #[serde(default)]
    pub indicators: IndicatorConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    /// Remote telemetry channel and local backup
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Connectivity probing and recovery
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Pin and port assignments
    #[serde(default)]
    pub hardware: HardwareConfig,

    /// Status API
    #[serde(default)]
    pub server: ServerConfig,
}

impl PondConfig {
    /// Load configuration using the standard search order:
    /// 1. `$POND_CONFIG` environment variable
    /// 2. `./pond_config.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// A file that fails to parse or validate is skipped with a warning.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), site = %config.site.name, "Loaded pond config from POND_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from POND_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "POND_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(site = %config.site.name, "Loaded pond config from ./pond_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./pond_config.toml, using defaults");
                }
            }
        }

        info!("No pond_config.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the config to a file, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
        }
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Pond config saved");
        Ok(())
    }

    /// Validate internal consistency.
    ///
    /// Rules:
    /// - Critical threshold must exceed the warning threshold
    /// - Every cadence, duration and capacity must be > 0
    /// - Band limits must be finite and pump thresholds ordered low < high
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.sampling.history_size == 0 {
            errors.push("sampling.history_size must be > 0".to_string());
        }
        if self.sampling.classify_interval_secs == 0 {
            errors.push("sampling.classify_interval_secs must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.sampling.temperature_primary_weight) {
            errors.push(format!(
                "sampling.temperature_primary_weight ({}) must be within [0, 1]",
                self.sampling.temperature_primary_weight
            ));
        }

        let c = &self.classifier;
        if c.warning_threshold == 0 {
            errors.push("classifier.warning_threshold must be > 0".to_string());
        }
        if c.critical_threshold <= c.warning_threshold {
            errors.push(format!(
                "classifier.critical_threshold ({}) must be > warning_threshold ({})",
                c.critical_threshold, c.warning_threshold
            ));
        }
        for parameter in Parameter::ALL {
            let bands = c.bands_for(parameter);
            for (i, band) in bands.bands.iter().enumerate() {
                if !band.limit.is_finite() {
                    errors.push(format!(
                        "classifier.{}.bands[{i}].limit must be finite",
                        config_key(parameter)
                    ));
                }
                if band.description.trim().is_empty() {
                    errors.push(format!(
                        "classifier.{}.bands[{i}].description must not be empty",
                        config_key(parameter)
                    ));
                }
            }
        }

        let p = &self.pump;
        if p.tick_interval_ms == 0 {
            errors.push("pump.tick_interval_ms must be > 0".to_string());
        }
        for (name, secs) in [
            ("short_secs", p.short_secs),
            ("normal_secs", p.normal_secs),
            ("long_secs", p.long_secs),
        ] {
            if secs == 0 {
                errors.push(format!("pump.{name} must be > 0"));
            }
        }
        Self::check_order(p.temperature_low, p.temperature_high, "pump.temperature", &mut errors);
        Self::check_order(p.ph_low, p.ph_high, "pump.ph", &mut errors);

        if self.alerts.check_interval_secs == 0 {
            errors.push("alerts.check_interval_secs must be > 0".to_string());
        }
        if self.indicators.alarm_duty_percent > 100 {
            errors.push(format!(
                "indicators.alarm_duty_percent ({}) must be <= 100",
                self.indicators.alarm_duty_percent
            ));
        }
        if self.display.refresh_interval_secs == 0 {
            errors.push("display.refresh_interval_secs must be > 0".to_string());
        }
        if self.display.width < 8 {
            errors.push(format!("display.width ({}) must be >= 8", self.display.width));
        }

        let t = &self.telemetry;
        if t.check_interval_secs == 0 {
            errors.push("telemetry.check_interval_secs must be > 0".to_string());
        }
        if t.request_timeout_secs == 0 {
            errors.push("telemetry.request_timeout_secs must be > 0".to_string());
        }
        if t.max_retries == 0 {
            errors.push("telemetry.max_retries must be > 0".to_string());
        }
        if !t.retry_base_secs.is_finite() || t.retry_base_secs < 0.0 {
            errors.push("telemetry.retry_base_secs must be a finite value >= 0".to_string());
        }
        if !t.retry_max_secs.is_finite() || t.retry_max_secs < t.retry_base_secs {
            errors.push(format!(
                "telemetry.retry_max_secs ({}) must be >= retry_base_secs ({})",
                t.retry_max_secs, t.retry_base_secs
            ));
        }
        if !t.retry_jitter_secs.is_finite() || t.retry_jitter_secs < 0.0 {
            errors.push("telemetry.retry_jitter_secs must be a finite value >= 0".to_string());
        }
        if t.backup_max_records == 0 {
            errors.push("telemetry.backup_max_records must be > 0".to_string());
        }
        if t.flush_batch == 0 {
            errors.push("telemetry.flush_batch must be > 0".to_string());
        }
        if t.endpoint.trim().is_empty() {
            errors.push("telemetry.endpoint must not be empty".to_string());
        }

        if self.network.recovery_every == 0 {
            errors.push("network.recovery_every must be > 0".to_string());
        }
        if self.network.probe_timeout_secs == 0 {
            errors.push("network.probe_timeout_secs must be > 0".to_string());
        }

        let w = &self.watchdog;
        if w.check_interval_secs == 0 {
            errors.push("watchdog.check_interval_secs must be > 0".to_string());
        }
        if w.stall_timeout_secs <= w.check_interval_secs {
            errors.push(format!(
                "watchdog.stall_timeout_secs ({}) must be > check_interval_secs ({})",
                w.stall_timeout_secs, w.check_interval_secs
            ));
        }

        if self.server.enabled && self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "server.addr '{}' is not a valid socket address",
                self.server.addr
            ));
        }

        for w in super::validation::validate_value_ranges(self) {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_order(low: f64, high: f64, name: &str, errors: &mut Vec<String>) {
        if !low.is_finite() || !high.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got low={low}, high={high})"
            ));
            return;
        }
        if low >= high {
            errors.push(format!("{name}: low ({low:.2}) must be < high ({high:.2})"));
        }
    }
}

/// Section name a parameter's bands live under in `[classifier]`.
pub fn config_key(parameter: Parameter) -> &'static str {
    match parameter {
        Parameter::Temperature => "temperature",
        Parameter::Ph => "ph",
        Parameter::Conductivity => "conductivity",
        Parameter::Nitrogen => "nitrogen",
        Parameter::Phosphorus => "phosphorus",
        Parameter::Turbidity => "turbidity",
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({0:?}): {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({0:?}): {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Site
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Name shown in logs and notifications
    pub name: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Pond".to_string(),
        }
    }
}

// ============================================================================
// Sampling
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Rolling window capacity per parameter
    pub history_size: usize,
    /// Sensor read and classification cadence
    pub classify_interval_secs: u64,
    /// Consecutive read failures before the sampler is re-initialized
    pub reinit_after_failures: u32,
    /// Pause after a failed loop iteration
    pub error_backoff_secs: u64,
    /// Weight of the primary probe when both temperature probes report
    pub temperature_primary_weight: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            history_size: defaults::HISTORY_SIZE,
            classify_interval_secs: defaults::CLASSIFY_INTERVAL_SECS,
            reinit_after_failures: defaults::SENSOR_REINIT_AFTER_FAILURES,
            error_backoff_secs: defaults::LOOP_ERROR_BACKOFF_SECS,
            temperature_primary_weight: defaults::TEMPERATURE_PRIMARY_WEIGHT,
        }
    }
}

impl SamplingConfig {
    pub fn classify_interval(&self) -> Duration {
        Duration::from_secs(self.classify_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Which side of the limit a band triggers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandKind {
    Below,
    Above,
}

/// How an alert for the band is prefixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandSeverity {
    #[default]
    Monitor,
    Warning,
    Critical,
}

/// One scoring band: a strict threshold contributing penalty, alert and an
/// optional recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub kind: BandKind,
    pub limit: f64,
    pub penalty: u32,
    #[serde(default)]
    pub severity: BandSeverity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Band {
    fn new(kind: BandKind, limit: f64, penalty: u32, severity: BandSeverity, description: &str) -> Self {
        Self {
            kind,
            limit,
            penalty,
            severity,
            description: description.to_string(),
            recommendation: None,
        }
    }

    fn below(limit: f64, penalty: u32, severity: BandSeverity, description: &str) -> Self {
        Self::new(BandKind::Below, limit, penalty, severity, description)
    }

    fn above(limit: f64, penalty: u32, severity: BandSeverity, description: &str) -> Self {
        Self::new(BandKind::Above, limit, penalty, severity, description)
    }

    fn recommend(mut self, recommendation: &str) -> Self {
        self.recommendation = Some(recommendation.to_string());
        self
    }

    /// True when `value` falls strictly beyond the limit.
    pub fn matches(&self, value: f64) -> bool {
        match self.kind {
            BandKind::Below => value < self.limit,
            BandKind::Above => value > self.limit,
        }
    }
}

/// Bands plus the penalty applied when the parameter has no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBands {
    #[serde(default)]
    pub unavailable_penalty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_alert: Option<String>,
    /// Evaluated in order; the first matching band applies
    #[serde(default)]
    pub bands: Vec<Band>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub warning_threshold: u32,
    pub critical_threshold: u32,
    /// Score when every parameter is absent
    pub no_data_score: u32,
    pub ph: ParameterBands,
    pub temperature: ParameterBands,
    pub conductivity: ParameterBands,
    pub turbidity: ParameterBands,
    pub nitrogen: ParameterBands,
    pub phosphorus: ParameterBands,
}

impl ClassifierConfig {
    pub fn bands_for(&self, parameter: Parameter) -> &ParameterBands {
        match parameter {
            Parameter::Temperature => &self.temperature,
            Parameter::Ph => &self.ph,
            Parameter::Conductivity => &self.conductivity,
            Parameter::Nitrogen => &self.nitrogen,
            Parameter::Phosphorus => &self.phosphorus,
            Parameter::Turbidity => &self.turbidity,
        }
    }
}

fn nutrient_bands(name: &str) -> ParameterBands {
    use BandSeverity::{Critical, Monitor, Warning};
    ParameterBands {
        unavailable_penalty: 5,
        unavailable_alert: Some(format!("{name} sensor unavailable")),
        bands: vec![
            Band::above(200.0, defaults::CRITICAL_THRESHOLD, Critical, "extremely high")
                .recommend("URGENT: Stop feeding and perform large water change"),
            Band::above(150.0, 20, Warning, "high")
                .recommend("Reduce feeding and increase water changes"),
            Band::above(100.0, 5, Monitor, "elevated (monitor)"),
        ],
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        use BandSeverity::{Critical, Monitor, Warning};
        let critical = defaults::CRITICAL_THRESHOLD;
        Self {
            warning_threshold: defaults::WARNING_THRESHOLD,
            critical_threshold: critical,
            no_data_score: defaults::NO_DATA_SCORE,
            ph: ParameterBands {
                unavailable_penalty: 30,
                unavailable_alert: Some("pH sensor not in water or faulty".to_string()),
                bands: vec![
                    Band::below(5.5, critical, Critical, "dangerously acidic")
                        .recommend("URGENT: Add agricultural lime (CaCO3) immediately"),
                    Band::below(6.0, 25, Warning, "acidic")
                        .recommend("Consider adding agricultural lime gradually"),
                    Band::below(6.5, 10, Monitor, "slightly low"),
                    Band::above(9.5, critical, Critical, "dangerously alkaline")
                        .recommend("URGENT: Perform large water change"),
                    Band::above(9.0, 25, Warning, "too alkaline")
                        .recommend("Perform partial water change"),
                    Band::above(8.5, 10, Monitor, "slightly high"),
                ],
            },
            temperature: ParameterBands {
                unavailable_penalty: 20,
                unavailable_alert: Some("Temperature sensor unavailable".to_string()),
                bands: vec![
                    Band::below(12.0, critical, Critical, "too cold")
                        .recommend("Add pond heater immediately"),
                    Band::below(18.0, 15, Warning, "cool"),
                    Band::above(35.0, critical, Critical, "too hot")
                        .recommend("Add shade and emergency aeration"),
                    Band::above(30.0, 15, Warning, "warm")
                        .recommend("Monitor closely and increase aeration"),
                ],
            },
            conductivity: ParameterBands {
                unavailable_penalty: 10,
                unavailable_alert: Some("EC sensor unavailable".to_string()),
                bands: vec![Band::above(2000.0, 30, Warning, "high")
                    .recommend("Consider diluting with fresh water")],
            },
            turbidity: ParameterBands {
                unavailable_penalty: 0,
                unavailable_alert: Some("Turbidity sensor unavailable".to_string()),
                bands: vec![Band::above(0.8, 20, Warning, "consistently turbid")
                    .recommend("Check filter and consider water change")],
            },
            nitrogen: nutrient_bands("Nitrogen"),
            phosphorus: nutrient_bands("Phosphorus"),
        }
    }
}

// ============================================================================
// Pump
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Actuator loop cadence
    pub tick_interval_ms: u64,
    pub short_secs: u64,
    pub normal_secs: u64,
    pub long_secs: u64,
    /// Temperature outside [low, high] selects LONG
    pub temperature_low: f64,
    pub temperature_high: f64,
    /// pH outside [low, high] selects SHORT
    pub ph_low: f64,
    pub ph_high: f64,
    /// Turbid ratio above this selects NORMAL
    pub turbidity_ratio: f64,
    /// Nitrogen or phosphorus above this selects NORMAL
    pub nutrient_high: f64,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: defaults::PUMP_TICK_MS,
            short_secs: defaults::PUMP_SHORT_SECS,
            normal_secs: defaults::PUMP_NORMAL_SECS,
            long_secs: defaults::PUMP_LONG_SECS,
            temperature_low: defaults::PUMP_TEMPERATURE_LOW,
            temperature_high: defaults::PUMP_TEMPERATURE_HIGH,
            ph_low: defaults::PUMP_PH_LOW,
            ph_high: defaults::PUMP_PH_HIGH,
            turbidity_ratio: defaults::PUMP_TURBIDITY_RATIO,
            nutrient_high: defaults::PUMP_NUTRIENT_HIGH,
        }
    }
}

impl PumpConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

// ============================================================================
// Alerts & Indicators
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// CRITICAL must persist this long before a notification goes out
    pub critical_sustain_secs: u64,
    pub check_interval_secs: u64,
    /// Notification recipients (international phone format)
    pub recipients: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            critical_sustain_secs: defaults::CRITICAL_SUSTAIN_SECS,
            check_interval_secs: defaults::ALERT_CHECK_INTERVAL_SECS,
            recipients: Vec::new(),
        }
    }
}

impl AlertConfig {
    pub fn critical_sustain(&self) -> Duration {
        Duration::from_secs(self.critical_sustain_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub alarm_duty_percent: u8,
    pub warning_chirp_ms: u64,
    pub critical_chirp_ms: u64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            alarm_duty_percent: defaults::ALARM_DUTY_PERCENT,
            warning_chirp_ms: defaults::WARNING_CHIRP_MS,
            critical_chirp_ms: defaults::CRITICAL_CHIRP_MS,
        }
    }
}

// ============================================================================
// Display
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub refresh_interval_secs: u64,
    /// Consecutive failures before the display is abandoned
    pub max_failures: u32,
    /// Character columns
    pub width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: defaults::DISPLAY_REFRESH_SECS,
            max_failures: defaults::DISPLAY_MAX_FAILURES,
            width: defaults::DISPLAY_WIDTH,
        }
    }
}

impl DisplayConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

// ============================================================================
// Telemetry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    /// Update URL of the telemetry channel
    pub endpoint: String,
    /// Channel write key. Can be overridden by `POND_TELEMETRY_API_KEY`.
    pub api_key: String,
    pub send_interval_secs: u64,
    pub check_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_secs: f64,
    pub retry_max_secs: f64,
    pub retry_jitter_secs: f64,
    /// Minimum spacing between two endpoint requests
    pub min_spacing_secs: u64,
    /// Queued records replayed per cycle
    pub flush_batch: usize,
    pub backup_path: PathBuf,
    pub backup_max_records: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: defaults::TELEMETRY_ENDPOINT.to_string(),
            api_key: String::new(),
            send_interval_secs: defaults::TELEMETRY_SEND_INTERVAL_SECS,
            check_interval_secs: defaults::TELEMETRY_CHECK_INTERVAL_SECS,
            request_timeout_secs: defaults::TELEMETRY_HTTP_TIMEOUT_SECS,
            max_retries: defaults::TELEMETRY_MAX_RETRIES,
            retry_base_secs: defaults::TELEMETRY_RETRY_BASE_SECS,
            retry_max_secs: defaults::TELEMETRY_RETRY_MAX_SECS,
            retry_jitter_secs: defaults::TELEMETRY_RETRY_JITTER_SECS,
            min_spacing_secs: defaults::TELEMETRY_MIN_SPACING_SECS,
            flush_batch: defaults::TELEMETRY_FLUSH_BATCH,
            backup_path: PathBuf::from(defaults::TELEMETRY_BACKUP_PATH),
            backup_max_records: defaults::TELEMETRY_BACKUP_MAX_RECORDS,
        }
    }
}

impl TelemetryConfig {
    /// API key from `POND_TELEMETRY_API_KEY`, falling back to the file value.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("POND_TELEMETRY_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| Some(self.api_key.clone()).filter(|k| !k.trim().is_empty()))
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_interval_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_secs(self.min_spacing_secs)
    }
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `host:port` dialled to test the uplink
    pub probe_addr: String,
    pub probe_timeout_secs: u64,
    /// Minimum time between two probes
    pub probe_interval_secs: u64,
    /// Recovery runs on every Nth consecutive probe failure
    pub recovery_every: u32,
    /// Interface cycled during recovery
    pub interface: String,
    /// Service restarted after the interface comes back up
    pub service: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_addr: defaults::NETWORK_PROBE_ADDR.to_string(),
            probe_timeout_secs: defaults::NETWORK_PROBE_TIMEOUT_SECS,
            probe_interval_secs: defaults::NETWORK_PROBE_INTERVAL_SECS,
            recovery_every: defaults::NETWORK_RECOVERY_EVERY,
            interface: defaults::NETWORK_INTERFACE.to_string(),
            service: defaults::NETWORK_SERVICE.to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

// ============================================================================
// Watchdog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub check_interval_secs: u64,
    /// Heartbeat silence after which a loop is reported stalled
    pub stall_timeout_secs: u64,
    /// Bounded wait for loops on shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: defaults::WATCHDOG_INTERVAL_SECS,
            stall_timeout_secs: defaults::WATCHDOG_STALL_TIMEOUT_SECS,
            shutdown_timeout_secs: defaults::SHUTDOWN_JOIN_TIMEOUT_SECS,
        }
    }
}

impl WatchdogConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

// ============================================================================
// Hardware
// ============================================================================

/// Pin (BCM numbering) and serial port assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub turbidity_pin: u8,
    pub buzzer_pin: u8,
    pub good_led_pin: u8,
    pub warning_led_pin: u8,
    pub critical_led_pin: u8,
    pub pump_pin: u8,
    pub rs485_port: String,
    pub rs485_slave_id: u8,
    pub modem_port: String,
    pub modem_baudrate: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            turbidity_pin: 17,
            buzzer_pin: 18,
            good_led_pin: 27,
            warning_led_pin: 22,
            critical_led_pin: 5,
            pump_pin: 16,
            rs485_port: "/dev/ttyUSB0".to_string(),
            rs485_slave_id: 1,
            modem_port: "/dev/serial0".to_string(),
            modem_baudrate: 9600,
        }
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    /// Bind address. Can be overridden by `POND_SERVER_ADDR`.
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
