//! Alert loop: feeds the latest tier to the escalator and sends the
//! notification when a CRITICAL episode has been sustained.

use super::runner::{LoopError, LoopTask};
use crate::config::PondConfig;
use crate::control::{compose_alert_message, AlertEscalator, EscalationDecision};
use crate::hardware::NotificationSender;
use crate::types::{LoopName, QualityStatus, SharedState, Tier};
use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct AlertLoop {
    escalator: AlertEscalator,
    notifier: Arc<dyn NotificationSender>,
    recipients: Vec<String>,
    site: String,
    max_alerts: usize,
    max_recommendations: usize,
    period: Duration,
    /// Last status sequence number this loop has looked at
    seen_seq: u64,
}

impl AlertLoop {
    pub fn new(config: &PondConfig, notifier: Arc<dyn NotificationSender>) -> Self {
        Self {
            escalator: AlertEscalator::new(config.alerts.critical_sustain()),
            notifier,
            recipients: config.alerts.recipients.clone(),
            site: config.site.name.clone(),
            max_alerts: crate::config::defaults::NOTIFY_MAX_ALERTS,
            max_recommendations: crate::config::defaults::NOTIFY_MAX_RECOMMENDATIONS,
            period: config.alerts.check_interval(),
            seen_seq: 0,
        }
    }

    /// Send the notification; returns how many recipients accepted it.
    async fn notify(&self, status: &QualityStatus) -> u64 {
        if self.recipients.is_empty() {
            warn!("[Alert] Sustained CRITICAL but no recipients configured");
            return 0;
        }

        let message = compose_alert_message(
            &self.site,
            status,
            Local::now(),
            self.max_alerts,
            self.max_recommendations,
        );
        let mut delivered = 0;
        for (recipient, result) in self.notifier.send_alert(&self.recipients, &message).await {
            match result {
                Ok(()) => {
                    info!(recipient = %recipient, "[Alert] Notification sent");
                    delivered += 1;
                }
                Err(e) => warn!(recipient = %recipient, error = %e, "[Alert] Notification failed"),
            }
        }
        delivered
    }
}

#[async_trait]
impl LoopTask for AlertLoop {
    fn name(&self) -> LoopName {
        LoopName::Alert
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn iterate(&mut self, state: &SharedState) -> Result<(), LoopError> {
        let (status, calm) = {
            let s = state.lock().await;
            let Some(status) = s.latest_status.clone() else {
                return Ok(());
            };
            let calm = s.calm_since(self.seen_seq);
            self.seen_seq = s.status_seq;
            (status, calm)
        };

        // A non-CRITICAL publish between two ticks still ends the episode
        if calm && status.tier == Tier::Critical && self.escalator.reset() {
            info!("[Alert] CRITICAL episode ended between checks");
        }

        match self.escalator.observe(status.tier, Instant::now()) {
            EscalationDecision::Fire => {
                warn!(score = status.score, "[Alert] CRITICAL sustained, escalating");
                let delivered = self.notify(&status).await;
                state.lock().await.notifications_sent += delivered;
            }
            EscalationDecision::Timing { elapsed } => {
                debug!(elapsed_secs = elapsed.as_secs(), "[Alert] CRITICAL episode timing");
            }
            EscalationDecision::Reset => info!(tier = %status.tier, "[Alert] CRITICAL episode ended"),
            EscalationDecision::AlreadyAlerted | EscalationDecision::Idle => {}
        }
        Ok(())
    }
}
