//! Integration test: reference moves against simulated switches.
//!
//! Validates the homing lifecycle:
//! 1. Seek the switch, leave it, back off by `move_away_from_reference`
//! 2. Position set to the axis limit, axes without switch to `init_position`
//! 3. Missing switch → `ReferenceNotFound`, fatal

use super::{capture_events, machine};
use stepper_common::machine::error::MotionError;
use stepper_common::machine::event::StepperEvent;
use stepper_core::reference::{ReferencePhase, ReferenceRequest};
use stepper_core::sim::SimBoard;
use stepper_core::stepper::reference_id;
use stepper_core::{MotionControl, Stepper};

const HOMING_TOML: &str = r#"
[machine]
move_away_from_reference = 500
reference_debounce_ticks = 4
ref_move_step_rate = 5000

[[machine.axes]]
size = 20000
reference_type = "min"
reference_sequence = 0
reference_hit_min = 0

[[machine.axes]]
size = 20000
reference_type = "max"
reference_sequence = 1
reference_hit_max = 1

[[machine.axes]]
size = 20000
init_position = 1500
"#;

fn homing_stepper() -> Stepper<SimBoard> {
    let config = machine(HOMING_TOML);
    let board = SimBoard::with_travel_switches(&config, 300);
    Stepper::new(board, &config)
}

#[test]
fn go_to_reference_homes_in_sequence() {
    let mut s = homing_stepper();
    let outcomes = s.go_to_reference().unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].axis, 0);
    assert_eq!(outcomes[0].phase, ReferencePhase::Done);
    assert_eq!(outcomes[0].position, 0);
    assert_eq!(outcomes[0].backed_off, 500);
    assert_eq!(outcomes[1].axis, 1);
    assert_eq!(outcomes[1].phase, ReferencePhase::Done);
    assert_eq!(outcomes[1].position, 20_000);
    assert_eq!(outcomes[1].backed_off, 500);

    assert_eq!(s.position()[..3], [0, 20_000, 1500]);
    assert_eq!(s.current_position()[..3], [0, 20_000, 1500]);
    assert!(!s.is_any_reference());
    assert!(s.fatal_error().is_none());

    let physical = s.board().physical_position();
    assert!(physical[0] > -300 + 400, "axis 0 parked at {}", physical[0]);
    assert!(physical[1] < 20_300 - 400, "axis 1 parked at {}", physical[1]);
}

#[test]
fn homed_machine_moves_within_travel() {
    let mut s = homing_stepper();
    s.go_to_reference().unwrap();
    s.move_abs_axis(0, 20_000, 5000).unwrap();
    s.move_abs_axis(1, 0, 5000).unwrap();
    s.wait_busy().unwrap();
    assert!(s.fatal_error().is_none());
    assert_eq!(s.current_position()[..2], [20_000, 0]);
}

#[test]
fn active_switch_is_left_first() {
    let mut s = homing_stepper();
    s.board_mut().set_physical_position(0, -400);
    assert!(s.is_reference(reference_id(0, true)));
    let events = capture_events(&mut s);

    let outcome = s.move_reference(ReferenceRequest::new(0, true)).unwrap();
    assert_eq!(outcome.phase, ReferencePhase::Done);
    assert_eq!(s.position()[0], 0);
    assert!(events.lock().unwrap().contains(&StepperEvent::Info("IsReference is on")));
}

#[test]
fn bouncing_switch_is_debounced() {
    let mut s = homing_stepper();
    s.board_mut().set_switch_bounce(0, true, 6);
    let outcome = s.move_reference(ReferenceRequest::new(0, true)).unwrap();
    assert_eq!(outcome.phase, ReferencePhase::Done);
    assert_eq!(outcome.backed_off, 500);
    assert!(!s.is_reference(reference_id(0, true)));
}

#[test]
fn explicit_back_off_distance() {
    let mut s = homing_stepper();
    let request = ReferenceRequest { dist_to_ref: Some(0), ..ReferenceRequest::new(1, false) };
    let outcome = s.move_reference(request).unwrap();
    assert_eq!(outcome.backed_off, 0);
    assert_eq!(outcome.position, 20_000);
}

#[test]
fn missing_switch_is_fatal() {
    let mut s = homing_stepper();
    s.board_mut().remove_switch(0, true);
    let before = s.position()[0];
    let events = capture_events(&mut s);

    let err = s.go_to_reference().unwrap_err();
    assert_eq!(err, MotionError::ReferenceNotFound { axis: 0 });
    assert_eq!(s.fatal_error(), Some(err));
    assert!(!s.is_busy());
    assert_ne!(s.position()[0], before);
    assert_eq!(s.move_rel_axis(0, 10, 1000), Err(MotionError::FatalLocked));
    assert!(events.lock().unwrap().contains(&StepperEvent::Fatal(err)));
}

#[test]
fn motion_layer_resyncs_after_homing() {
    let config = machine(HOMING_TOML);
    let board = SimBoard::with_travel_switches(&config, 300);
    let mut mc = MotionControl::new(Stepper::new(board, &config), &config);
    mc.go_to_reference().unwrap();
    assert_eq!(mc.positions()[..3], [0, 20_000, 1500]);
}
