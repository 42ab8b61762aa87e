//! System-wide default constants.
//!
//! Every `Default` impl in [`super::pond_config`] reads from here, so a config
//! file that omits a key behaves exactly like these values.

// ============================================================================
// Sampling & History
// ============================================================================

/// Samples kept per parameter in the rolling window.
pub const HISTORY_SIZE: usize = 5;

/// Sensor read + classification cadence (seconds).
pub const CLASSIFY_INTERVAL_SECS: u64 = 15;

/// Consecutive sensor read failures before the sampler is re-initialized.
pub const SENSOR_REINIT_AFTER_FAILURES: u32 = 5;

/// Pause after a failed loop iteration before the next one (seconds).
pub const LOOP_ERROR_BACKOFF_SECS: u64 = 5;

/// Weight of the multi-parameter probe when fusing the two temperature probes.
pub const TEMPERATURE_PRIMARY_WEIGHT: f64 = 0.6;

// ============================================================================
// Classifier
// ============================================================================

/// Score at or above which the tier is WARNING.
pub const WARNING_THRESHOLD: u32 = 40;

/// Score at or above which the tier is CRITICAL.
pub const CRITICAL_THRESHOLD: u32 = 80;

/// Score assigned when no parameter has any reading.
pub const NO_DATA_SCORE: u32 = 50;

// ============================================================================
// Pump
// ============================================================================

/// Actuator loop cadence (milliseconds).
pub const PUMP_TICK_MS: u64 = 1_000;

pub const PUMP_SHORT_SECS: u64 = 120;
pub const PUMP_NORMAL_SECS: u64 = 180;
pub const PUMP_LONG_SECS: u64 = 240;

/// Temperatures outside [low, high] select the LONG cycle (°C).
pub const PUMP_TEMPERATURE_LOW: f64 = 15.0;
pub const PUMP_TEMPERATURE_HIGH: f64 = 32.0;

/// pH outside [low, high] selects the SHORT cycle.
pub const PUMP_PH_LOW: f64 = 6.0;
pub const PUMP_PH_HIGH: f64 = 9.0;

/// Turbid ratio above which the NORMAL cycle is chosen for clarity.
pub const PUMP_TURBIDITY_RATIO: f64 = 0.7;

/// Nutrient level above which the NORMAL cycle is chosen (mg/kg).
pub const PUMP_NUTRIENT_HIGH: f64 = 150.0;

// ============================================================================
// Alerts & Indicators
// ============================================================================

/// How long CRITICAL must persist before a notification is sent (seconds).
pub const CRITICAL_SUSTAIN_SECS: u64 = 120;

/// Alert escalator cadence (seconds).
pub const ALERT_CHECK_INTERVAL_SECS: u64 = 15;

/// Alarm PWM duty cycle while sounding (percent).
pub const ALARM_DUTY_PERCENT: u8 = 50;

/// Alarm chirp length on WARNING (milliseconds).
pub const WARNING_CHIRP_MS: u64 = 200;

/// Alarm chirp length on CRITICAL (milliseconds).
pub const CRITICAL_CHIRP_MS: u64 = 1_000;

/// Alerts and recommendations quoted in a notification.
pub const NOTIFY_MAX_ALERTS: usize = 3;
pub const NOTIFY_MAX_RECOMMENDATIONS: usize = 2;

// ============================================================================
// Display
// ============================================================================

/// Display refresh cadence (seconds).
pub const DISPLAY_REFRESH_SECS: u64 = 5;

/// Consecutive write failures before the display is marked unavailable.
pub const DISPLAY_MAX_FAILURES: u32 = 5;

/// Character columns on the display.
pub const DISPLAY_WIDTH: usize = 16;

// ============================================================================
// Telemetry
// ============================================================================

pub const TELEMETRY_ENDPOINT: &str = "https://api.thingspeak.com/update";

/// Minimum time between two published snapshots (seconds).
pub const TELEMETRY_SEND_INTERVAL_SECS: u64 = 60;

/// How often the telemetry loop checks whether a send is due (seconds).
pub const TELEMETRY_CHECK_INTERVAL_SECS: u64 = 5;

/// Per-request HTTP timeout (seconds).
pub const TELEMETRY_HTTP_TIMEOUT_SECS: u64 = 10;

pub const TELEMETRY_MAX_RETRIES: u32 = 3;

/// First retry delay; doubles per attempt up to the cap (seconds).
pub const TELEMETRY_RETRY_BASE_SECS: f64 = 5.0;
pub const TELEMETRY_RETRY_MAX_SECS: f64 = 60.0;

/// Uniform jitter added to every retry delay, exclusive upper bound (seconds).
pub const TELEMETRY_RETRY_JITTER_SECS: f64 = 2.0;

/// Minimum spacing between consecutive endpoint requests (seconds).
///
/// ThingSpeak free channels reject updates closer than 15 s apart.
pub const TELEMETRY_MIN_SPACING_SECS: u64 = 16;

/// Queued records replayed per telemetry cycle.
pub const TELEMETRY_FLUSH_BATCH: usize = 5;

pub const TELEMETRY_BACKUP_PATH: &str = "data/telemetry_backup.csv";

/// Backup records kept before the oldest is dropped.
pub const TELEMETRY_BACKUP_MAX_RECORDS: usize = 10_000;

// ============================================================================
// Network
// ============================================================================

/// Address dialled to decide whether the uplink is up.
pub const NETWORK_PROBE_ADDR: &str = "8.8.8.8:53";

pub const NETWORK_PROBE_TIMEOUT_SECS: u64 = 5;

/// Minimum time between two connectivity probes (seconds).
pub const NETWORK_PROBE_INTERVAL_SECS: u64 = 30;

/// Network recovery is attempted on every Nth consecutive probe failure.
pub const NETWORK_RECOVERY_EVERY: u32 = 3;

pub const NETWORK_INTERFACE: &str = "wlan0";

pub const NETWORK_SERVICE: &str = "NetworkManager";

// ============================================================================
// Watchdog & Shutdown
// ============================================================================

pub const WATCHDOG_INTERVAL_SECS: u64 = 30;

/// Heartbeat silence after which a loop is reported stalled (seconds).
pub const WATCHDOG_STALL_TIMEOUT_SECS: u64 = 120;

/// How long shutdown waits for loops to exit before aborting them (seconds).
pub const SHUTDOWN_JOIN_TIMEOUT_SECS: u64 = 3;

// ============================================================================
// Server
// ============================================================================

pub const SERVER_ADDR: &str = "0.0.0.0:8080";
