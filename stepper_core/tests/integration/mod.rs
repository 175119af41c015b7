//! Shared helpers for the integration tests.

mod delta;
mod homing;
mod limits;
mod motion;
mod optimizer;
mod speed_override;

use std::sync::{Arc, Mutex};
use stepper_common::consts::MAX_AXES;
use stepper_common::machine::config::MachineConfig;
use stepper_common::machine::event::StepperEvent;
use stepper_common::types::{AxisArray, SDist};
use stepper_core::config::load_config_from_strings;
use stepper_core::stepper::TickOutcome;
use stepper_core::{SimBoard, Stepper};

// ── Helpers ─────────────────────────────────────────────────────────

pub const SHARED_TOML: &str = "[shared]\nservice_name = \"integration\"\n";

/// Three 100 mm axes at one step per mm1000.
pub const MACHINE_TOML: &str = r#"
[machine]
max_step_rate = 20000
acc = 350
dec = 380
jerk_speed = 1000
direction_settle = 25

[[machine.axes]]
size = 100000

[[machine.axes]]
size = 100000

[[machine.axes]]
size = 100000
"#;

/// Upper bound of ticks for a single drain.
const DRAIN_LIMIT: usize = 5_000_000;

pub fn machine(toml: &str) -> MachineConfig {
    load_config_from_strings(SHARED_TOML, toml)
        .expect("valid machine config")
        .machine
}

pub fn stepper(config: &MachineConfig) -> Stepper<SimBoard> {
    Stepper::new(SimBoard::new(), config)
}

/// Tick until idle and return every outcome.
pub fn drain(s: &mut Stepper<SimBoard>) -> Vec<TickOutcome> {
    let mut outcomes = Vec::new();
    s.optimize_movement_queue(true);
    while s.is_busy() {
        outcomes.push(s.tick());
        assert!(outcomes.len() < DRAIN_LIMIT, "engine did not go idle");
    }
    outcomes
}

/// Record every event the engine emits.
pub fn capture_events(s: &mut Stepper<SimBoard>) -> Arc<Mutex<Vec<StepperEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    s.set_event_handler(Box::new(move |event| {
        sink.lock().unwrap().push(*event);
    }));
    events
}

pub fn xyz(x: SDist, y: SDist, z: SDist) -> AxisArray<SDist> {
    let mut p = [0; MAX_AXES];
    p[0] = x;
    p[1] = y;
    p[2] = z;
    p
}
