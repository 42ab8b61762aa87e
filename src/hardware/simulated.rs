//! Hardware-free collaborators
//!
//! [`SimulatedSensors`] generates plausible pond readings for a chosen
//! scenario. The logging implementations record what would have been driven
//! onto real pins and print it through `tracing`.

use super::{
    ActuatorHardware, DisplaySink, HardwareError, NotificationError, NotificationSender,
    SensorError, SensorSampler,
};
use crate::config::HardwareConfig;
use crate::types::{AlarmLevel, RawSample, Tier};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use tracing::{debug, info, warn};

// ============================================================================
// Simulated Sensors
// ============================================================================

/// Pond condition the simulated sensors reproduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Healthy pond, every probe in range
    #[default]
    Nominal,
    /// pH around 5.0
    Acidic,
    /// Nitrogen around 250 mg/kg
    Nutrient,
    /// Water above 35 °C
    Hot,
    /// Sensor bus unreachable on every read
    Offline,
    /// Every third read fails and the pH probe drops out intermittently
    Flaky,
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Scenario::Nominal => "nominal",
            Scenario::Acidic => "acidic",
            Scenario::Nutrient => "nutrient",
            Scenario::Hot => "hot",
            Scenario::Offline => "offline",
            Scenario::Flaky => "flaky",
        };
        f.write_str(name)
    }
}

/// Target means for one scenario.
struct Profile {
    temperature: f64,
    ph: f64,
    conductivity: f64,
    nitrogen: f64,
    phosphorus: f64,
    turbid_probability: f64,
}

impl Scenario {
    fn profile(self) -> Profile {
        let nominal = Profile {
            temperature: 24.0,
            ph: 7.2,
            conductivity: 650.0,
            nitrogen: 45.0,
            phosphorus: 30.0,
            turbid_probability: 0.05,
        };
        match self {
            Scenario::Nominal | Scenario::Offline | Scenario::Flaky => nominal,
            Scenario::Acidic => Profile { ph: 5.0, ..nominal },
            Scenario::Nutrient => Profile {
                nitrogen: 250.0,
                ..nominal
            },
            Scenario::Hot => Profile {
                temperature: 36.5,
                ..nominal
            },
        }
    }
}

pub struct SimulatedSensors {
    scenario: Scenario,
    rng: StdRng,
    reads: u64,
    reinitializations: u32,
}

impl SimulatedSensors {
    pub fn new(scenario: Scenario) -> Self {
        Self::with_rng(scenario, StdRng::from_entropy())
    }

    /// Deterministic readings for tests.
    pub fn seeded(scenario: Scenario, seed: u64) -> Self {
        Self::with_rng(scenario, StdRng::seed_from_u64(seed))
    }

    fn with_rng(scenario: Scenario, rng: StdRng) -> Self {
        Self {
            scenario,
            rng,
            reads: 0,
            reinitializations: 0,
        }
    }

    pub fn reinitializations(&self) -> u32 {
        self.reinitializations
    }

    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        Normal::new(mean, std_dev)
            .map(|dist| dist.sample(&mut self.rng))
            .unwrap_or(mean)
    }
}

#[async_trait]
impl SensorSampler for SimulatedSensors {
    async fn read(&mut self) -> Result<RawSample, SensorError> {
        self.reads += 1;
        match self.scenario {
            Scenario::Offline => {
                return Err(SensorError::Unavailable(
                    "no response from simulated RS485 bus".to_string(),
                ))
            }
            Scenario::Flaky if self.reads % 3 == 0 => {
                return Err(SensorError::Read(format!(
                    "simulated CRC error on read {}",
                    self.reads
                )))
            }
            _ => {}
        }

        let profile = self.scenario.profile();
        let temperature = self.gauss(profile.temperature, 0.3);
        let temperature_aux = self.gauss(profile.temperature, 0.3);
        let ph = self.gauss(profile.ph, 0.05);
        let conductivity = self.gauss(profile.conductivity, 20.0).max(0.0);
        let nitrogen = self.gauss(profile.nitrogen, 3.0).max(0.0);
        let phosphorus = self.gauss(profile.phosphorus, 2.0).max(0.0);
        let turbid = self.rng.gen_bool(profile.turbid_probability);
        let ph_present = !(self.scenario == Scenario::Flaky && self.rng.gen_bool(0.3));

        Ok(RawSample {
            timestamp: Utc::now(),
            temperature: Some(temperature),
            temperature_aux: Some(temperature_aux),
            ph: ph_present.then_some(ph),
            conductivity: Some(conductivity),
            nitrogen: Some(nitrogen),
            phosphorus: Some(phosphorus),
            turbid: Some(turbid),
        })
    }

    async fn reinitialize(&mut self) -> Result<(), SensorError> {
        self.reinitializations += 1;
        info!(
            scenario = %self.scenario,
            attempt = self.reinitializations,
            "Re-initializing simulated sensors"
        );
        if self.scenario == Scenario::Offline {
            return Err(SensorError::Unavailable(
                "simulated bus still offline".to_string(),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

// ============================================================================
// Logging Actuators
// ============================================================================

/// Records the pin levels that would be driven and logs every change.
pub struct LoggingHardware {
    pins: HardwareConfig,
    pump_on: AtomicBool,
    indicator: AtomicU8,
    alarm_duty: AtomicU8,
    pump_switches: AtomicU64,
}

impl LoggingHardware {
    pub fn new(pins: HardwareConfig) -> Self {
        Self {
            pins,
            pump_on: AtomicBool::new(false),
            indicator: AtomicU8::new(0),
            alarm_duty: AtomicU8::new(0),
            pump_switches: AtomicU64::new(0),
        }
    }

    pub fn pump_on(&self) -> bool {
        self.pump_on.load(Ordering::SeqCst)
    }

    /// Number of times the pump relay changed state.
    pub fn pump_switches(&self) -> u64 {
        self.pump_switches.load(Ordering::SeqCst)
    }

    pub fn indicator(&self) -> Option<Tier> {
        match self.indicator.load(Ordering::SeqCst) {
            1 => Some(Tier::Good),
            2 => Some(Tier::Warning),
            3 => Some(Tier::Critical),
            _ => None,
        }
    }

    pub fn alarm(&self) -> AlarmLevel {
        match self.alarm_duty.load(Ordering::SeqCst) {
            0 => AlarmLevel::Off,
            duty => AlarmLevel::Tone(duty),
        }
    }
}

impl ActuatorHardware for LoggingHardware {
    fn set_pump(&self, on: bool) -> Result<(), HardwareError> {
        let previous = self.pump_on.swap(on, Ordering::SeqCst);
        if previous != on {
            self.pump_switches.fetch_add(1, Ordering::SeqCst);
            info!(pin = self.pins.pump_pin, on, "[Hardware] Pump relay switched");
        }
        Ok(())
    }

    fn set_indicator(&self, tier: Option<Tier>) -> Result<(), HardwareError> {
        let code = tier.map_or(0, |t| t.status_code() + 1);
        if self.indicator.swap(code, Ordering::SeqCst) != code {
            let pin = match tier {
                Some(Tier::Good) => Some(self.pins.good_led_pin),
                Some(Tier::Warning) => Some(self.pins.warning_led_pin),
                Some(Tier::Critical) => Some(self.pins.critical_led_pin),
                None => None,
            };
            debug!(pin = ?pin, tier = ?tier, "[Hardware] Indicator changed");
        }
        Ok(())
    }

    fn set_alarm(&self, level: AlarmLevel) -> Result<(), HardwareError> {
        let duty = match level {
            AlarmLevel::Off => 0,
            AlarmLevel::Tone(duty) => duty.max(1),
        };
        if self.alarm_duty.swap(duty, Ordering::SeqCst) != duty {
            debug!(pin = self.pins.buzzer_pin, duty, "[Hardware] Alarm level changed");
        }
        Ok(())
    }
}

// ============================================================================
// Logging Display
// ============================================================================

/// Writes each frame to the debug log.
#[derive(Default)]
pub struct LoggingDisplay {
    frames: AtomicU64,
}

impl LoggingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

impl DisplaySink for LoggingDisplay {
    fn show(&self, lines: &[String]) -> Result<(), HardwareError> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        debug!(lines = ?lines, "[Display] Frame");
        Ok(())
    }
}

// ============================================================================
// Logging Notifier
// ============================================================================

/// Logs alerts instead of dialling a modem.
pub struct LoggingNotifier {
    modem_port: String,
}

impl LoggingNotifier {
    pub fn new(pins: &HardwareConfig) -> Self {
        Self {
            modem_port: pins.modem_port.clone(),
        }
    }
}

#[async_trait]
impl NotificationSender for LoggingNotifier {
    async fn send_alert(
        &self,
        recipients: &[String],
        message: &str,
    ) -> Vec<(String, Result<(), NotificationError>)> {
        recipients
            .iter()
            .map(|recipient| {
                warn!(
                    port = %self.modem_port,
                    recipient = %recipient,
                    message = %message,
                    "[Alert] Notification (logged, no modem attached)"
                );
                (recipient.clone(), Ok(()))
            })
            .collect()
    }
}
