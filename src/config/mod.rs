//! Pond Configuration Module
//!
//! Every threshold, cadence and endpoint setting lives in one TOML file.
//!
//! ## Loading Order
//!
//! 1. `POND_CONFIG` environment variable (path to TOML file)
//! 2. `pond_config.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! The loaded config is passed by `Arc` to the loops that need it; nothing
//! reads it through a global.

pub mod defaults;
mod pond_config;
pub mod validation;

pub use pond_config::*;
