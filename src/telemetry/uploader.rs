//! Telemetry Uploader: periodic publication with retry, backoff and replay
//!
//! Every cycle first replays queued records (oldest first, paced by the
//! minimum request spacing, stopping on the first failure), then delivers the
//! fresh record. A fresh record that exhausts its retries is appended to the
//! backup queue exactly once, so every record is either delivered or queued.
//!
//! Shutdown interrupts waits and in-flight requests but never the bookkeeping:
//! the fresh record is queued and the unsent part of the backlog is kept.

use super::backup::BackupQueue;
use super::client::{Connectivity, TelemetryEndpoint};
use super::payload::{TelemetryPayload, TelemetryRecord};
use crate::config::{NetworkConfig, TelemetryConfig};
use crate::types::TelemetryStats;
use chrono::Utc;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exponential backoff with uniform jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        let secs = |v: f64| Duration::from_secs_f64(v.max(0.0));
        Self {
            max_retries: config.max_retries.max(1),
            base: secs(config.retry_base_secs),
            max: secs(config.retry_max_secs),
            jitter: secs(config.retry_jitter_secs),
        }
    }

    /// A policy that retries immediately. Used by tests and `--once` runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// `min(base * 2^attempt, max)`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Backoff plus a uniform jitter in `[0, jitter)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..self.jitter.as_secs_f64()))
        };
        self.backoff(attempt) + jitter
    }
}

/// Result of one upload cycle for the fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Delivered { entry_id: u64 },
    /// Retries exhausted, record saved for replay
    Queued,
    /// No sensor field survived validation; nothing to send or keep
    Rejected,
    /// Retries exhausted and the backup write failed too
    Dropped,
}

/// Result of one backlog replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub discarded: usize,
    pub remaining: usize,
}

pub struct TelemetryUploader {
    endpoint: Arc<dyn TelemetryEndpoint>,
    connectivity: Arc<dyn Connectivity>,
    backup: BackupQueue,
    policy: RetryPolicy,
    send_interval: Duration,
    min_spacing: Duration,
    flush_batch: usize,
    probe_interval: Duration,
    recovery_every: u32,
    last_sent: Option<Instant>,
    last_request: Option<Instant>,
    last_probe: Option<Instant>,
    probe_failures: u32,
    stats: TelemetryStats,
    cancel: CancellationToken,
}

impl TelemetryUploader {
    pub fn new(
        endpoint: Arc<dyn TelemetryEndpoint>,
        connectivity: Arc<dyn Connectivity>,
        backup: BackupQueue,
        telemetry: &TelemetryConfig,
        network: &NetworkConfig,
    ) -> Self {
        let backlog = backup.pending_count().unwrap_or(0);
        Self {
            endpoint,
            connectivity,
            backup,
            policy: RetryPolicy::from_config(telemetry),
            send_interval: telemetry.send_interval(),
            min_spacing: telemetry.min_spacing(),
            flush_batch: telemetry.flush_batch.max(1),
            probe_interval: network.probe_interval(),
            recovery_every: network.recovery_every.max(1),
            last_sent: None,
            last_request: None,
            last_probe: None,
            probe_failures: 0,
            stats: TelemetryStats {
                enabled: true,
                backlog,
                ..TelemetryStats::default()
            },
            cancel: CancellationToken::new(),
        }
    }

    /// Stop waiting and queue pending work once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn backup(&self) -> &BackupQueue {
        &self.backup
    }

    pub fn stats(&self) -> &TelemetryStats {
        &self.stats
    }

    /// True when the send interval has elapsed since the last cycle.
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_sent
            .map_or(true, |last| now.saturating_duration_since(last) >= self.send_interval)
    }

    /// One full cycle: replay the backlog, then deliver `record`.
    pub async fn run_cycle(&mut self, record: TelemetryRecord) -> UploadOutcome {
        self.last_sent = Some(Instant::now());

        let report = self.flush_backlog().await;
        if report.sent > 0 || report.discarded > 0 {
            info!(
                sent = report.sent,
                discarded = report.discarded,
                remaining = report.remaining,
                "[Telemetry] Backlog replayed"
            );
        }

        let outcome = self.deliver(&record).await;
        self.refresh_backlog();
        outcome
    }

    /// Replay up to one batch of queued records, oldest first.
    pub async fn flush_backlog(&mut self) -> FlushReport {
        let records = match self.backup.load() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "[Telemetry] Failed to read backup queue");
                return FlushReport::default();
            }
        };
        if records.is_empty() {
            return FlushReport::default();
        }

        let cancel = self.cancel.clone();
        let mut report = FlushReport::default();
        let mut processed = 0;
        for record in records.iter().take(self.flush_batch) {
            let Some(mut payload) = TelemetryPayload::from_record(record) else {
                warn!(timestamp = %record.timestamp, "[Telemetry] Discarding queued record with no valid fields");
                report.discarded += 1;
                processed += 1;
                continue;
            };
            payload.created_at = Some(record.timestamp);

            let publish = async {
                self.pace().await;
                self.endpoint.publish(&payload).await
            };
            let Some(result) = unless_cancelled(&cancel, publish).await else {
                info!(
                    remaining = records.len() - processed,
                    "[Telemetry] Shutdown during replay, keeping remaining records queued"
                );
                break;
            };
            match result {
                Ok(entry_id) => {
                    debug!(entry_id, timestamp = %record.timestamp, "[Telemetry] Queued record delivered");
                    report.sent += 1;
                    processed += 1;
                    self.stats.flushed += 1;
                    self.note_success();
                }
                Err(e) => {
                    warn!(error = %e, "[Telemetry] Replay failed, keeping remaining records queued");
                    self.stats.last_error = Some(e.to_string());
                    break;
                }
            }
        }

        if processed > 0 {
            if let Err(e) = self.backup.replace(&records[processed..]) {
                error!(error = %e, "[Telemetry] Failed to rewrite backup queue");
            }
        }
        report.remaining = records.len() - processed;
        report
    }

    /// Send one fresh record with retries; queue it on exhaustion.
    pub async fn deliver(&mut self, record: &TelemetryRecord) -> UploadOutcome {
        let Some(payload) = TelemetryPayload::from_record(record) else {
            warn!(timestamp = %record.timestamp, "[Telemetry] No valid sensor fields, skipping update");
            self.stats.rejected += 1;
            return UploadOutcome::Rejected;
        };

        let cancel = self.cancel.clone();
        let attempts = self.policy.max_retries;
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.policy.delay(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "[Telemetry] Backing off");
                if unless_cancelled(&cancel, tokio::time::sleep(delay)).await.is_none() {
                    info!(attempt, "[Telemetry] Shutdown during backoff");
                    break;
                }

                match unless_cancelled(&cancel, self.ensure_connectivity()).await {
                    Some(true) => {}
                    Some(false) => {
                        warn!(attempt, "[Telemetry] Network down, abandoning retries");
                        break;
                    }
                    None => break,
                }
            }

            let publish = async {
                self.pace().await;
                self.endpoint.publish(&payload).await
            };
            let Some(result) = unless_cancelled(&cancel, publish).await else {
                info!(attempt, "[Telemetry] Shutdown during request");
                break;
            };
            match result {
                Ok(entry_id) => {
                    info!(
                        entry_id,
                        fields = payload.field_count(),
                        status = ?record.quality_status,
                        "[Telemetry] Update delivered"
                    );
                    self.stats.delivered += 1;
                    self.note_success();
                    return UploadOutcome::Delivered { entry_id };
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, attempts, error = %e, "[Telemetry] Update failed");
                    self.stats.last_error = Some(e.to_string());
                }
            }
        }

        match self.backup.append(record) {
            Ok(()) => {
                self.stats.queued += 1;
                info!(timestamp = %record.timestamp, "[Telemetry] Update queued for replay");
                UploadOutcome::Queued
            }
            Err(e) => {
                error!(error = %e, "[Telemetry] Failed to queue update, record lost");
                UploadOutcome::Dropped
            }
        }
    }

    /// Probe the link before a retry. Probes are throttled to the probe
    /// interval; a throttled check counts as up. Every Nth consecutive
    /// failure runs recovery.
    async fn ensure_connectivity(&mut self) -> bool {
        let now = Instant::now();
        if self
            .last_probe
            .is_some_and(|last| now.saturating_duration_since(last) < self.probe_interval)
        {
            return true;
        }
        self.last_probe = Some(now);

        if self.connectivity.probe().await {
            self.probe_failures = 0;
            return true;
        }

        self.probe_failures += 1;
        warn!(failures = self.probe_failures, "[Network] Connectivity probe failed");
        if self.probe_failures % self.recovery_every == 0 {
            return self.connectivity.recover().await;
        }
        false
    }

    /// Wait until the minimum spacing since the previous request has passed.
    async fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let ready = last + self.min_spacing;
            if ready > Instant::now() {
                tokio::time::sleep_until(ready).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    fn note_success(&mut self) {
        self.probe_failures = 0;
        self.stats.last_success = Some(Utc::now());
        self.stats.last_error = None;
    }

    fn refresh_backlog(&mut self) {
        match self.backup.pending_count() {
            Ok(n) => self.stats.backlog = n,
            Err(e) => warn!(error = %e, "[Telemetry] Failed to count backlog"),
        }
    }
}

/// `fut`'s output, or `None` if shutdown was requested first.
async fn unless_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::client::TelemetryError;
    use crate::types::Tier;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Endpoint that fails the first `failures` calls.
    struct ScriptedEndpoint {
        failures: AtomicUsize,
        calls: AtomicUsize,
        payloads: Mutex<Vec<TelemetryPayload>>,
    }

    impl ScriptedEndpoint {
        fn failing(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                payloads: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TelemetryEndpoint for ScriptedEndpoint {
        async fn publish(&self, payload: &TelemetryPayload) -> Result<u64, TelemetryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(TelemetryError::EndpointRejected("0".into()));
            }
            self.payloads.lock().unwrap().push(payload.clone());
            Ok(n)
        }
    }

    struct FakeNet {
        up: bool,
        recover_result: bool,
        probes: AtomicU32,
        recoveries: AtomicU32,
    }

    impl FakeNet {
        fn new(up: bool, recover_result: bool) -> Arc<Self> {
            Arc::new(Self {
                up,
                recover_result,
                probes: AtomicU32::new(0),
                recoveries: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Connectivity for FakeNet {
        async fn probe(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.up
        }

        async fn recover(&self) -> bool {
            self.recoveries.fetch_add(1, Ordering::SeqCst);
            self.recover_result
        }
    }

    fn record(minute: u32) -> TelemetryRecord {
        use chrono::TimeZone;
        TelemetryRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 10, minute, 0).unwrap(),
            temperature: Some(25.0),
            ph: Some(7.0),
            conductivity: Some(500.0),
            nitrogen: None,
            phosphorus: None,
            turbidity: Some(0.0),
            quality_score: Some(0),
            quality_status: Some(Tier::Good),
        }
    }

    fn uploader(
        dir: &tempfile::TempDir,
        endpoint: Arc<dyn TelemetryEndpoint>,
        net: Arc<dyn Connectivity>,
    ) -> TelemetryUploader {
        let telemetry = TelemetryConfig {
            min_spacing_secs: 0,
            ..TelemetryConfig::default()
        };
        let network = NetworkConfig {
            probe_interval_secs: 0,
            ..NetworkConfig::default()
        };
        let backup = BackupQueue::open(dir.path().join("backup.csv"), 100).unwrap();
        TelemetryUploader::new(endpoint, net, backup, &telemetry, &network)
            .with_policy(RetryPolicy::immediate(3))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::from_config(&TelemetryConfig::default());
        assert_eq!(policy.backoff(0), Duration::from_secs(5));
        assert_eq!(policy.backoff(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(3), Duration::from_secs(40));
        assert_eq!(policy.backoff(4), Duration::from_secs(60));
        assert_eq!(policy.backoff(30), Duration::from_secs(60));

        for _ in 0..50 {
            let d = policy.delay(1);
            assert!(d >= Duration::from_secs(10) && d < Duration::from_secs(12));
        }
    }

    #[tokio::test]
    async fn test_one_failure_then_success_delivers_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ScriptedEndpoint::failing(1);
        let mut up = uploader(&dir, endpoint.clone(), FakeNet::new(true, true));

        let outcome = up.run_cycle(record(0)).await;
        assert!(matches!(outcome, UploadOutcome::Delivered { .. }));
        assert_eq!(endpoint.payloads.lock().unwrap().len(), 1);
        assert!(!up.backup().exists());
        assert_eq!(up.stats().delivered, 1);
        assert_eq!(up.stats().queued, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_queue_exactly_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ScriptedEndpoint::failing(usize::MAX);
        let mut up = uploader(&dir, endpoint.clone(), FakeNet::new(true, true));

        assert_eq!(up.run_cycle(record(0)).await, UploadOutcome::Queued);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 3);
        assert_eq!(up.backup().pending_count().unwrap(), 1);
        assert_eq!(up.stats().backlog, 1);
    }

    #[tokio::test]
    async fn test_backlog_flushes_before_fresh_record_and_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ScriptedEndpoint::failing(0);
        let mut up = uploader(&dir, endpoint.clone(), FakeNet::new(true, true));
        up.backup().append(&record(1)).unwrap();
        up.backup().append(&record(2)).unwrap();

        let outcome = up.run_cycle(record(3)).await;
        assert!(matches!(outcome, UploadOutcome::Delivered { .. }));
        assert!(!up.backup().exists());

        let payloads = endpoint.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0].created_at, Some(record(1).timestamp));
        assert_eq!(payloads[1].created_at, Some(record(2).timestamp));
        assert_eq!(payloads[2].created_at, None);
        assert_eq!(up.stats().flushed, 2);
    }

    #[tokio::test]
    async fn test_flush_stops_on_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ScriptedEndpoint::failing(0);
        let mut up = uploader(&dir, endpoint.clone(), FakeNet::new(true, true));
        for minute in 1..=3 {
            up.backup().append(&record(minute)).unwrap();
        }

        let report = up.flush_backlog().await;
        assert_eq!(report.sent, 3);
        assert!(!up.backup().exists());

        for minute in 4..=6 {
            up.backup().append(&record(minute)).unwrap();
        }
        endpoint.failures.store(1, Ordering::SeqCst);
        let report = up.flush_backlog().await;
        assert_eq!(report.sent, 0);
        assert_eq!(report.remaining, 3);
        assert_eq!(up.backup().load().unwrap()[0], record(4));
    }

    #[tokio::test]
    async fn test_flush_respects_batch_limit() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ScriptedEndpoint::failing(0);
        let mut up = uploader(&dir, endpoint.clone(), FakeNet::new(true, true));
        for minute in 1..=7 {
            up.backup().append(&record(minute)).unwrap();
        }
        let report = up.flush_backlog().await;
        assert_eq!(report.sent, 5);
        assert_eq!(report.remaining, 2);
        assert_eq!(up.backup().load().unwrap()[0], record(6));
    }

    #[tokio::test]
    async fn test_network_down_abandons_retries_and_recovers_every_third_failure() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ScriptedEndpoint::failing(usize::MAX);
        let net = FakeNet::new(false, false);
        let mut up = uploader(&dir, endpoint.clone(), net.clone());

        for minute in 0..3 {
            assert_eq!(up.deliver(&record(minute)).await, UploadOutcome::Queued);
        }
        // One attempt per record, then the failed probe ends the retries
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 3);
        assert_eq!(net.probes.load(Ordering::SeqCst), 3);
        assert_eq!(net.recoveries.load(Ordering::SeqCst), 1);
        assert_eq!(up.backup().pending_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rejected_payload_is_not_queued() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ScriptedEndpoint::failing(0);
        let mut up = uploader(&dir, endpoint.clone(), FakeNet::new(true, true));
        let empty = TelemetryRecord {
            temperature: None,
            ph: None,
            conductivity: None,
            turbidity: None,
            ..record(0)
        };
        assert_eq!(up.deliver(&empty).await, UploadOutcome::Rejected);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
        assert!(!up.backup().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff_queues_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ScriptedEndpoint::failing(usize::MAX);
        let cancel = CancellationToken::new();
        let mut up = uploader(&dir, endpoint.clone(), FakeNet::new(true, true))
            .with_policy(RetryPolicy {
                max_retries: 3,
                base: Duration::from_secs(10),
                max: Duration::from_secs(60),
                jitter: Duration::ZERO,
            })
            .with_cancellation(cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        assert_eq!(up.run_cycle(record(0)).await, UploadOutcome::Queued);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        assert_eq!(up.backup().pending_count().unwrap(), 1);
        assert_eq!(up.stats().backlog, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_replay_keeps_only_unsent_records() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ScriptedEndpoint::failing(0);
        let cancel = CancellationToken::new();
        let telemetry = TelemetryConfig::default();
        let backup = BackupQueue::open(dir.path().join("backup.csv"), 100).unwrap();
        let mut up = TelemetryUploader::new(
            endpoint.clone(),
            FakeNet::new(true, true),
            backup,
            &telemetry,
            &NetworkConfig::default(),
        )
        .with_policy(RetryPolicy::immediate(3))
        .with_cancellation(cancel.clone());
        for minute in 1..=3 {
            up.backup().append(&record(minute)).unwrap();
        }

        // The second replay waits out the 16s spacing; shutdown lands first
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        assert_eq!(up.run_cycle(record(4)).await, UploadOutcome::Queued);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        let queued: Vec<_> = up.backup().load().unwrap().iter().map(|r| r.timestamp).collect();
        assert_eq!(
            queued,
            vec![record(2).timestamp, record(3).timestamp, record(4).timestamp]
        );
        assert_eq!(up.stats().flushed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_due_gates_on_send_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut up = uploader(&dir, ScriptedEndpoint::failing(0), FakeNet::new(true, true));
        assert!(up.is_due(Instant::now()));
        up.run_cycle(record(0)).await;
        assert!(!up.is_due(Instant::now()));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(up.is_due(Instant::now()));
    }
}
