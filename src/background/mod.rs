//! Background services: loop supervision and health reporting
//!
//! The watchdog runs as one more supervised loop. It compares every loop's
//! last heartbeat against the stall timeout and records a per-loop health
//! status in the shared state. Detection only: a stalled loop is logged and
//! reported over the API, never restarted.

pub mod watchdog;

pub use watchdog::{HealthStatus, Watchdog};
