//! Control decisions driven by the classification: pump cycles, alert
//! escalation and audible/visual indication.

mod actuator;
mod alarm;
mod escalator;

pub use actuator::{ActuatorController, PumpAction};
pub use alarm::AlarmScheduler;
pub use escalator::{compose_alert_message, AlertEscalator, CriticalEpisode, EscalationDecision};
