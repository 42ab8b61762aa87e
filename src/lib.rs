//! Pondwatch: pond water-quality monitoring
//!
//! ## Architecture
//!
//! - **Processing**: rolling history windows and the penalty-based quality classifier
//! - **Control**: pump cycle state machine, indicator alarm patterns, critical escalation
//! - **Telemetry**: channel uploads with retry, connectivity recovery and a CSV backlog
//! - **Pipeline**: the periodic loops and the orchestrator that supervises them
//! - **Background**: heartbeat watchdog
//! - **API**: read-only JSON status endpoints

pub mod api;
pub mod background;
pub mod config;
pub mod control;
pub mod hardware;
pub mod pipeline;
pub mod processing;
pub mod telemetry;
pub mod types;

pub use config::PondConfig;
pub use types::{PumpMode, QualityStatus, SharedState, SystemState, Tier};
