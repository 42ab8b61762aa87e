//! Critical-episode alert escalation
//!
//! A notification goes out only after CRITICAL has held continuously for the
//! sustain duration, and at most once per unbroken episode. Any non-CRITICAL
//! observation ends the episode with no carryover.

use crate::types::{QualityStatus, Tier};
use chrono::{DateTime, Local};
use tokio::time::{Duration, Instant};

/// An ongoing run of CRITICAL observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriticalEpisode {
    pub started: Instant,
    pub alert_sent: bool,
}

/// What the caller should do after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationDecision {
    /// Not CRITICAL and no episode in progress
    Idle,
    /// CRITICAL, but not yet for long enough
    Timing { elapsed: Duration },
    /// Sustained long enough: send the notification now
    Fire,
    /// Notification for this episode already sent
    AlreadyAlerted,
    /// Tier left CRITICAL; the episode was discarded
    Reset,
}

#[derive(Debug, Clone)]
pub struct AlertEscalator {
    sustain: Duration,
    episode: Option<CriticalEpisode>,
}

impl AlertEscalator {
    pub fn new(sustain: Duration) -> Self {
        Self {
            sustain,
            episode: None,
        }
    }

    pub fn episode(&self) -> Option<CriticalEpisode> {
        self.episode
    }

    /// End any episode in progress, as if a non-CRITICAL tier had been
    /// observed. Returns true if there was one.
    pub fn reset(&mut self) -> bool {
        self.episode.take().is_some()
    }

    /// Record one observation of `tier` at `now`.
    pub fn observe(&mut self, tier: Tier, now: Instant) -> EscalationDecision {
        if tier != Tier::Critical {
            return if self.episode.take().is_some() {
                EscalationDecision::Reset
            } else {
                EscalationDecision::Idle
            };
        }

        let sustain = self.sustain;
        let episode = self.episode.get_or_insert(CriticalEpisode {
            started: now,
            alert_sent: false,
        });
        if episode.alert_sent {
            return EscalationDecision::AlreadyAlerted;
        }

        let elapsed = now.saturating_duration_since(episode.started);
        if elapsed >= sustain {
            episode.alert_sent = true;
            EscalationDecision::Fire
        } else {
            EscalationDecision::Timing { elapsed }
        }
    }
}

/// Build the notification text for a sustained CRITICAL status.
///
/// Header, local time, the first three alerts and the first two
/// recommendations.
pub fn compose_alert_message(
    site: &str,
    status: &QualityStatus,
    at: DateTime<Local>,
    max_alerts: usize,
    max_recommendations: usize,
) -> String {
    let mut lines = vec![
        format!("POND ALERT ({})", status.tier),
        format!("{site} {}", at.format("%Y-%m-%d %H:%M")),
        format!("Score: {}", status.score),
    ];
    lines.extend(status.alerts.iter().take(max_alerts).cloned());
    let recommendations: Vec<&str> = status
        .recommendations
        .iter()
        .take(max_recommendations)
        .map(String::as_str)
        .collect();
    if !recommendations.is_empty() {
        lines.push(format!("Actions: {}", recommendations.join("; ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::{BTreeMap, BTreeSet};

    const SUSTAIN: Duration = Duration::from_secs(120);
    const TICK: Duration = Duration::from_secs(15);

    /// Observe `tier` `count` times, one tick apart. Returns how many fired.
    fn run(esc: &mut AlertEscalator, now: &mut Instant, tier: Tier, count: usize) -> usize {
        let mut fired = 0;
        for _ in 0..count {
            if esc.observe(tier, *now) == EscalationDecision::Fire {
                fired += 1;
            }
            *now += TICK;
        }
        fired
    }

    #[test]
    fn test_fires_once_per_sustained_run() {
        let mut esc = AlertEscalator::new(SUSTAIN);
        let mut now = Instant::now();
        // 20 ticks x 15s = 300s of CRITICAL
        assert_eq!(run(&mut esc, &mut now, Tier::Critical, 20), 1);
    }

    #[test]
    fn test_fires_exactly_at_sustain() {
        let mut esc = AlertEscalator::new(SUSTAIN);
        let start = Instant::now();
        assert_eq!(esc.observe(Tier::Critical, start), EscalationDecision::Timing { elapsed: Duration::ZERO });
        assert!(matches!(
            esc.observe(Tier::Critical, start + Duration::from_secs(119)),
            EscalationDecision::Timing { .. }
        ));
        assert_eq!(esc.observe(Tier::Critical, start + SUSTAIN), EscalationDecision::Fire);
        assert_eq!(
            esc.observe(Tier::Critical, start + SUSTAIN * 2),
            EscalationDecision::AlreadyAlerted
        );
    }

    #[test]
    fn test_interrupted_runs_fire_twice() {
        let mut esc = AlertEscalator::new(SUSTAIN);
        let mut now = Instant::now();
        let mut fired = run(&mut esc, &mut now, Tier::Critical, 10);
        assert_eq!(esc.observe(Tier::Good, now), EscalationDecision::Reset);
        now += TICK;
        fired += run(&mut esc, &mut now, Tier::Critical, 10);
        assert_eq!(fired, 2);
    }

    #[test]
    fn test_reset_starts_a_fresh_episode() {
        let mut esc = AlertEscalator::new(SUSTAIN);
        let mut now = Instant::now();
        assert_eq!(run(&mut esc, &mut now, Tier::Critical, 10), 1);
        assert!(esc.reset());
        assert!(!esc.reset());
        assert_eq!(run(&mut esc, &mut now, Tier::Critical, 10), 1);
    }

    #[test]
    fn test_short_runs_never_fire() {
        let mut esc = AlertEscalator::new(SUSTAIN);
        let mut now = Instant::now();
        for _ in 0..5 {
            assert_eq!(run(&mut esc, &mut now, Tier::Critical, 4), 0);
            assert_eq!(run(&mut esc, &mut now, Tier::Warning, 1), 0);
        }
        assert_eq!(esc.observe(Tier::Good, now), EscalationDecision::Idle);
    }

    #[test]
    fn test_message_quotes_first_alerts_and_recommendations() {
        let status = QualityStatus {
            tier: Tier::Critical,
            score: 120,
            alerts: vec!["a1".into(), "a2".into(), "a3".into(), "a4".into()],
            recommendations: ["r1", "r2", "r3"].into_iter().map(String::from).collect::<BTreeSet<_>>(),
            trends: BTreeMap::new(),
            averages: BTreeMap::new(),
            timestamp: Utc::now(),
        };
        let at = Local.from_utc_datetime(&Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap().naive_utc());
        let message = compose_alert_message("North pond", &status, at, 3, 2);

        assert!(message.starts_with("POND ALERT (CRITICAL)\nNorth pond "));
        assert!(message.contains("a3"));
        assert!(!message.contains("a4"));
        assert!(message.contains("Actions: r1; r2"));
        assert!(!message.contains("r3"));
    }
}
