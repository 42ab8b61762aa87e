//! Shared system state
//!
//! One aggregate behind a single `tokio::sync::Mutex`. Loops lock it briefly to
//! read or publish, and never hold the guard across I/O.

use super::{PumpMode, PumpState, QualityStatus, Tier};
use crate::background::HealthStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Handle every loop holds.
pub type SharedState = Arc<Mutex<SystemState>>;

/// Supervised loop identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopName {
    Monitor,
    Pump,
    Alert,
    Display,
    Telemetry,
    Watchdog,
    HttpServer,
}

impl LoopName {
    /// Loops whose heartbeat the watchdog checks.
    pub const MONITORED: [LoopName; 5] = [
        LoopName::Monitor,
        LoopName::Pump,
        LoopName::Alert,
        LoopName::Display,
        LoopName::Telemetry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LoopName::Monitor => "monitor",
            LoopName::Pump => "pump",
            LoopName::Alert => "alert",
            LoopName::Display => "display",
            LoopName::Telemetry => "telemetry",
            LoopName::Watchdog => "watchdog",
            LoopName::HttpServer => "http_server",
        }
    }

    /// Log tag, e.g. `Monitor` for `[Monitor] ...` messages.
    pub fn tag(self) -> &'static str {
        match self {
            LoopName::Monitor => "Monitor",
            LoopName::Pump => "Pump",
            LoopName::Alert => "Alert",
            LoopName::Display => "Display",
            LoopName::Telemetry => "Telemetry",
            LoopName::Watchdog => "Watchdog",
            LoopName::HttpServer => "HttpServer",
        }
    }
}

impl std::fmt::Display for LoopName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last heartbeat per loop.
#[derive(Debug, Clone, Default)]
pub struct Heartbeats {
    beats: BTreeMap<LoopName, Instant>,
}

impl Heartbeats {
    pub fn beat(&mut self, name: LoopName, at: Instant) {
        self.beats.insert(name, at);
    }

    pub fn last(&self, name: LoopName) -> Option<Instant> {
        self.beats.get(&name).copied()
    }

    /// Time since the loop last reported, or since `fallback` if it never has.
    pub fn silence(&self, name: LoopName, now: Instant, fallback: Instant) -> Duration {
        now.saturating_duration_since(self.last(name).unwrap_or(fallback))
    }
}

/// Counters maintained by the telemetry loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryStats {
    pub enabled: bool,
    pub delivered: u64,
    pub queued: u64,
    pub flushed: u64,
    pub rejected: u64,
    pub backlog: usize,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// The aggregate every loop shares.
#[derive(Debug)]
pub struct SystemState {
    pub started_at: DateTime<Utc>,
    pub started: Instant,
    /// Most recent classification, replaced wholesale each cycle
    pub latest_status: Option<Arc<QualityStatus>>,
    /// Incremented on every publish so consumers can tell a fresh status apart
    pub status_seq: u64,
    /// Sequence number of the most recent non-CRITICAL publish
    pub calm_seq: u64,
    pub pump: PumpState,
    pub heartbeats: Heartbeats,
    pub health: BTreeMap<LoopName, HealthStatus>,
    pub display_available: bool,
    pub telemetry: TelemetryStats,
    pub consecutive_sensor_failures: u32,
    pub notifications_sent: u64,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            latest_status: None,
            status_seq: 0,
            calm_seq: 0,
            pump: PumpState::default(),
            heartbeats: Heartbeats::default(),
            health: BTreeMap::new(),
            display_available: true,
            telemetry: TelemetryStats::default(),
            consecutive_sensor_failures: 0,
            notifications_sent: 0,
        }
    }
}

impl SystemState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Publish a new classification and return its sequence number.
    pub fn publish_status(&mut self, status: QualityStatus) -> u64 {
        self.status_seq += 1;
        if status.tier != Tier::Critical {
            self.calm_seq = self.status_seq;
        }
        self.latest_status = Some(Arc::new(status));
        self.status_seq
    }

    /// True if a non-CRITICAL status was published after `seen`.
    pub fn calm_since(&self, seen: u64) -> bool {
        self.calm_seq > seen
    }

    /// The latest status if it is newer than `seen`.
    pub fn status_since(&self, seen: u64) -> Option<(u64, Arc<QualityStatus>)> {
        if self.status_seq > seen {
            self.latest_status
                .as_ref()
                .map(|status| (self.status_seq, Arc::clone(status)))
        } else {
            None
        }
    }

    pub fn beat(&mut self, name: LoopName) {
        self.heartbeats.beat(name, Instant::now());
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let now = Instant::now();
        StateSnapshot {
            started_at: self.started_at,
            uptime_secs: now.saturating_duration_since(self.started).as_secs(),
            status: self.latest_status.as_deref().cloned(),
            pump: PumpSnapshot {
                mode: self.pump.mode,
                running: self.pump.running,
                elapsed_secs: self
                    .pump
                    .started_at
                    .filter(|_| self.pump.running)
                    .map(|start| now.saturating_duration_since(start).as_secs()),
                pending: self.pump.pending,
            },
            display_available: self.display_available,
            telemetry: self.telemetry.clone(),
            consecutive_sensor_failures: self.consecutive_sensor_failures,
            notifications_sent: self.notifications_sent,
            health: self
                .health
                .iter()
                .map(|(name, status)| (*name, status.to_string()))
                .collect(),
        }
    }
}

/// Pump state as reported over the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PumpSnapshot {
    pub mode: PumpMode,
    pub running: bool,
    pub elapsed_secs: Option<u64>,
    pub pending: Option<PumpMode>,
}

/// Serializable copy of [`SystemState`].
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub status: Option<QualityStatus>,
    pub pump: PumpSnapshot,
    pub display_available: bool,
    pub telemetry: TelemetryStats,
    pub consecutive_sensor_failures: u32,
    pub notifications_sent: u64,
    pub health: BTreeMap<LoopName, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tier;
    use std::collections::BTreeSet;

    fn status(tier: Tier, score: u32) -> QualityStatus {
        QualityStatus {
            tier,
            score,
            alerts: vec![],
            recommendations: BTreeSet::new(),
            trends: BTreeMap::new(),
            averages: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_publish_status_advances_sequence() {
        let mut state = SystemState::default();
        assert!(state.status_since(0).is_none());

        let seq = state.publish_status(status(Tier::Good, 0));
        assert_eq!(seq, 1);
        let (seen, latest) = state.status_since(0).unwrap();
        assert_eq!(seen, 1);
        assert_eq!(latest.tier, Tier::Good);
        assert!(state.status_since(seen).is_none());

        state.publish_status(status(Tier::Critical, 95));
        let (_, latest) = state.status_since(seen).unwrap();
        assert_eq!(latest.score, 95);
    }

    #[test]
    fn test_calm_publish_is_remembered_behind_critical() {
        let mut state = SystemState::default();
        let seen = state.publish_status(status(Tier::Critical, 90));
        assert!(!state.calm_since(0));

        state.publish_status(status(Tier::Good, 0));
        let latest = state.publish_status(status(Tier::Critical, 90));
        assert!(state.calm_since(seen));
        assert!(!state.calm_since(latest));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_silence() {
        let origin = Instant::now();
        let mut beats = Heartbeats::default();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(
            beats.silence(LoopName::Pump, Instant::now(), origin),
            Duration::from_secs(10)
        );

        beats.beat(LoopName::Pump, Instant::now());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(
            beats.silence(LoopName::Pump, Instant::now(), origin),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut state = SystemState::default();
        state.publish_status(status(Tier::Warning, 45));
        state.health.insert(LoopName::Monitor, HealthStatus::Healthy);

        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["status"]["tier"], "WARNING");
        assert_eq!(json["pump"]["mode"], "OFF");
        assert_eq!(json["health"]["monitor"], "HEALTHY");
    }
}
