//! Orchestrator Integration Tests
//!
//! Runs every loop against the simulated sensors and the logging actuators on
//! a paused clock, then checks what the pond would have seen: pump cycles,
//! notifications, display frames, watchdog health and a clean shutdown.

use pondwatch::background::HealthStatus;
use pondwatch::config::PondConfig;
use pondwatch::hardware::simulated::{
    LoggingDisplay, LoggingHardware, LoggingNotifier, Scenario, SimulatedSensors,
};
use pondwatch::pipeline::{Collaborators, Orchestrator};
use pondwatch::types::{AlarmLevel, LoopName, PumpMode, SystemState, Tier};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Rig {
    orchestrator: Orchestrator,
    hardware: Arc<LoggingHardware>,
    display: Arc<LoggingDisplay>,
}

async fn start(scenario: Scenario) -> Rig {
    let mut config = PondConfig::default();
    config.alerts.recipients = vec!["+15550100".to_string()];
    let config = Arc::new(config);

    let hardware = Arc::new(LoggingHardware::new(config.hardware.clone()));
    let display = Arc::new(LoggingDisplay::new());
    let mut orchestrator =
        Orchestrator::new(Arc::clone(&config), SystemState::shared(), CancellationToken::new());

    orchestrator
        .spawn_loops(Collaborators {
            sensor: Box::new(SimulatedSensors::seeded(scenario, 42)),
            hardware: hardware.clone(),
            display: display.clone(),
            notifier: Arc::new(LoggingNotifier::new(&config.hardware)),
            telemetry: None,
        })
        .await;

    Rig {
        orchestrator,
        hardware,
        display,
    }
}

#[tokio::test(start_paused = true)]
async fn acidic_pond_runs_pump_and_escalates() {
    let rig = start(Scenario::Acidic).await;
    assert_eq!(
        rig.orchestrator.running(),
        &[
            LoopName::Monitor,
            LoopName::Pump,
            LoopName::Alert,
            LoopName::Display,
            LoopName::Watchdog,
        ]
    );

    tokio::time::sleep(Duration::from_secs(200)).await;

    {
        let state = rig.orchestrator.state().lock().await;
        let status = state.latest_status.as_ref().expect("status published");
        assert_eq!(status.tier, Tier::Critical);
        assert!(state.status_seq >= 10);
        assert!(state.notifications_sent >= 1);
        assert!(!state.telemetry.enabled);
        assert_eq!(state.consecutive_sensor_failures, 0);
        assert_eq!(state.health.get(&LoopName::Monitor), Some(&HealthStatus::Healthy));
    }

    // One full SHORT cycle (on, off) and a second one started
    assert!(rig.hardware.pump_switches() >= 2, "{}", rig.hardware.pump_switches());
    assert_eq!(rig.hardware.indicator(), Some(Tier::Critical));
    assert!(rig.display.frames() >= 10);

    let state = Arc::clone(rig.orchestrator.state());
    rig.orchestrator.shutdown().await;

    assert!(!rig.hardware.pump_on());
    assert_eq!(rig.hardware.alarm(), AlarmLevel::Off);
    assert_eq!(rig.hardware.indicator(), None);
    let pump = state.lock().await.pump;
    assert!(!pump.running);
    assert_eq!(pump.mode, PumpMode::Off);
}

#[tokio::test(start_paused = true)]
async fn offline_sensors_degrade_monitor_health() {
    let rig = start(Scenario::Offline).await;

    tokio::time::sleep(Duration::from_secs(65)).await;

    {
        let state = rig.orchestrator.state().lock().await;
        let status = state.latest_status.as_ref().expect("status published");
        assert_eq!(status.tier, Tier::Warning);
        assert!(state.consecutive_sensor_failures >= 3);
        assert!(matches!(
            state.health.get(&LoopName::Monitor),
            Some(HealthStatus::Degraded { .. })
        ));
        assert!(!state.pump.running);
    }

    rig.orchestrator.shutdown().await;
    assert_eq!(rig.hardware.pump_switches(), 0);
}
