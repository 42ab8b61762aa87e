//! Telemetry endpoint and network connectivity collaborators
//!
//! [`ThingSpeakClient`] publishes a payload as a single GET request with the
//! write key and `fieldN` query parameters. The channel answers with the new
//! entry id, or `0` when it refused the update (rate limit, bad key).
//!
//! [`SystemConnectivity`] probes reachability with a plain TCP connect and
//! restarts the wireless interface when asked to recover.

use super::payload::TelemetryPayload;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Telemetry errors
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Network unavailable")]
    NetworkUnavailable,
    #[error("Endpoint rejected update: {0}")]
    EndpointRejected(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
}

/// Remote channel that accepts telemetry updates.
#[async_trait]
pub trait TelemetryEndpoint: Send + Sync {
    /// Publish one payload; returns the entry id assigned by the channel.
    async fn publish(&self, payload: &TelemetryPayload) -> Result<u64, TelemetryError>;

    fn name(&self) -> &str {
        "telemetry"
    }
}

/// Reachability probe and recovery for the uplink.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn probe(&self) -> bool;

    /// Attempt to bring the link back. Returns true if the link is up
    /// afterwards.
    async fn recover(&self) -> bool;
}

/// HTTP client for a ThingSpeak-style update endpoint
#[derive(Clone)]
pub struct ThingSpeakClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ThingSpeakClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetryEndpoint for ThingSpeakClient {
    async fn publish(&self, payload: &TelemetryPayload) -> Result<u64, TelemetryError> {
        let mut query = vec![("api_key".to_string(), self.api_key.clone())];
        query.extend(payload.query_pairs());

        let resp = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(classify_http_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(classify_http_error)?;
        if status != reqwest::StatusCode::OK {
            return Err(TelemetryError::EndpointRejected(format!(
                "status {status}"
            )));
        }

        parse_entry_id(&body).ok_or_else(|| {
            TelemetryError::EndpointRejected(format!("response body '{}'", body.trim()))
        })
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}

fn classify_http_error(e: reqwest::Error) -> TelemetryError {
    if e.is_timeout() {
        TelemetryError::Timeout
    } else if e.is_connect() {
        TelemetryError::NetworkUnavailable
    } else {
        TelemetryError::Http(e)
    }
}

/// Entry id from a response body. Only a positive integer counts as accepted.
pub fn parse_entry_id(body: &str) -> Option<u64> {
    body.trim().parse::<u64>().ok().filter(|&id| id > 0)
}

/// TCP reachability probe plus interface restart
pub struct SystemConnectivity {
    probe_addr: String,
    timeout: Duration,
    interface: String,
    service: String,
}

impl SystemConnectivity {
    pub fn new(probe_addr: &str, timeout: Duration, interface: &str, service: &str) -> Self {
        Self {
            probe_addr: probe_addr.to_string(),
            timeout,
            interface: interface.to_string(),
            service: service.to_string(),
        }
    }

    pub fn from_config(config: &crate::config::NetworkConfig) -> Self {
        Self::new(
            &config.probe_addr,
            config.probe_timeout(),
            &config.interface,
            &config.service,
        )
    }

    async fn run(&self, program: &str, args: &[&str]) -> bool {
        match Command::new(program).args(args).status().await {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!(program, ?args, %status, "[Network] Recovery command failed");
                false
            }
            Err(e) => {
                warn!(program, ?args, error = %e, "[Network] Recovery command could not start");
                false
            }
        }
    }
}

#[async_trait]
impl Connectivity for SystemConnectivity {
    async fn probe(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.probe_addr)).await {
            Ok(Ok(_)) => {
                debug!(addr = %self.probe_addr, "[Network] Probe succeeded");
                true
            }
            Ok(Err(e)) => {
                debug!(addr = %self.probe_addr, error = %e, "[Network] Probe failed");
                false
            }
            Err(_) => {
                debug!(addr = %self.probe_addr, "[Network] Probe timed out");
                false
            }
        }
    }

    async fn recover(&self) -> bool {
        info!(interface = %self.interface, "[Network] Restarting network interface");
        self.run("ip", &["link", "set", &self.interface, "down"]).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.run("ip", &["link", "set", &self.interface, "up"]).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        if self.probe().await {
            info!("[Network] Link restored after interface restart");
            return true;
        }

        info!(service = %self.service, "[Network] Restarting network service");
        self.run("systemctl", &["restart", &self.service]).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let up = self.probe().await;
        if up {
            info!("[Network] Link restored after service restart");
        } else {
            warn!("[Network] Recovery did not restore connectivity");
        }
        up
    }
}
