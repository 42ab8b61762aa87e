//! Concurrent loops over one shared state
//!
//! ```text
//! Monitor   (15s)  sensors -> history -> classifier -> SystemState + indicators
//! Pump      (1s)   SystemState.latest_status -> ActuatorController -> relay
//! Alert     (15s)  SystemState.latest_status -> AlertEscalator -> notifier
//! Display   (5s)   SystemState -> rotating screens
//! Telemetry (5s)   SystemState.latest_status -> uploader (60s gate) -> endpoint / backup
//! Watchdog  (30s)  heartbeats -> per-loop health
//! ```
//!
//! Loops never call each other; `SystemState` is the only channel between them.

mod alert;
mod display;
mod monitor;
mod orchestrator;
mod pump;
mod runner;
mod telemetry;

pub use alert::AlertLoop;
pub use display::{render_screens, DisplayLoop};
pub use monitor::{classify_once, MonitorLoop};
pub use orchestrator::{Collaborators, Orchestrator};
pub use pump::PumpLoop;
pub use runner::{run_loop, LoopError, LoopTask};
pub use telemetry::TelemetryLoop;
