//! Integration test: range limits, switch checks and emergency stop.
//!
//! 1. Range limit → fatal, position untouched, queued motion dropped
//! 2. Switch hit during a normal move → fatal, motion aborted
//! 3. Emergency stop → blocked until resurrect

use super::{MACHINE_TOML, capture_events, machine, stepper, xyz};
use stepper_common::machine::error::{MotionError, StepperFault};
use stepper_common::machine::event::StepperEvent;
use stepper_core::SimBoard;
use stepper_core::Stepper;
use stepper_core::motion::MotionControl;
use stepper_core::stepper::TickState;

#[test]
fn range_limit_is_fatal_and_leaves_position() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.move_abs_axis(0, 1000, 5000).unwrap();
    s.wait_busy().unwrap();

    let err = s.move_abs(&xyz(200_000, 0, 0), 5000).unwrap_err();
    assert_eq!(err, MotionError::RangeLimit { axis: 0, target: 200_000, min: 0, max: 100_000 });
    assert_eq!(s.position(), xyz(1000, 0, 0));
    assert_eq!(s.queued_movements(), 0);
    assert_eq!(s.fatal_error(), Some(err));
    assert!(s.faults().contains(StepperFault::RANGE_LIMIT));

    assert_eq!(s.move_rel_axis(1, 10, 5000), Err(MotionError::FatalLocked));
    s.resurrect();
    s.move_rel_axis(1, 10, 5000).unwrap();
    s.wait_busy().unwrap();
    assert_eq!(s.current_position(), xyz(1000, 10, 0));
}

#[test]
fn fatal_error_drops_queued_motion() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.move_rel_axis(0, 5000, 2000).unwrap();
    s.move_rel_axis(0, 5000, 2000).unwrap();
    for _ in 0..50 {
        s.tick();
    }

    let err = s.move_rel_axis(1, 1_000_000, 2000).unwrap_err();
    assert!(matches!(err, MotionError::RangeLimit { axis: 1, .. }));
    assert!(!s.is_busy());
    assert_eq!(s.queued_movements(), 0);

    let stopped = s.current_position();
    for _ in 0..2000 {
        let out = s.tick();
        assert!(!out.has_steps());
        assert_eq!(out.state, TickState::Error);
    }
    assert_eq!(s.current_position(), stopped);
    assert!(stopped[0] < 5000, "ran on to {}", stopped[0]);
    assert_eq!(s.position(), stopped);
}

#[test]
fn failed_split_move_keeps_the_planned_position() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.move_abs_axis(0, 90_000, 20_000).unwrap();
    s.wait_busy().unwrap();

    // longer than one queue entry, ends past the travel
    let err = s.move_rel_axis(0, 70_000, 20_000).unwrap_err();
    assert!(matches!(err, MotionError::RangeLimit { axis: 0, target: 160_000, .. }));
    assert_eq!(s.position()[0], 90_000);
    assert_eq!(s.queued_movements(), 0);
}

#[test]
fn below_zero_is_out_of_range() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    let err = s.move_rel_axis(2, -1, 5000).unwrap_err();
    assert!(matches!(err, MotionError::RangeLimit { axis: 2, target: -1, .. }));
}

#[test]
fn disabled_limit_check_allows_any_target() {
    let mut config = machine(MACHINE_TOML);
    config.limit_check = false;
    let mut s = stepper(&config);
    s.move_rel_axis(0, -2000, 5000).unwrap();
    s.wait_busy().unwrap();
    assert_eq!(s.current_position()[0], -2000);
    assert!(s.fatal_error().is_none());
}

#[test]
fn invalid_axis_is_not_fatal() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    assert_eq!(s.move_rel_axis(9, 10, 5000), Err(MotionError::InvalidAxis(9)));
    assert_eq!(s.last_error(), Some(MotionError::InvalidAxis(9)));
    assert!(s.fatal_error().is_none());
    s.move_rel_axis(0, 10, 5000).unwrap();
}

#[test]
fn motion_layer_reports_range_limit() {
    let config = machine(MACHINE_TOML);
    let mut mc = MotionControl::new(Stepper::new(SimBoard::new(), &config), &config);
    mc.move_abs_ex(60_000, &[(stepper_common::types::Axis::Y, 5000)]).unwrap();
    mc.wait_busy().unwrap();
    let err = mc.move_rel_ex(60_000, &[(stepper_common::types::Axis::Y, 100_000)]).unwrap_err();
    assert!(matches!(err, MotionError::RangeLimit { axis: 1, .. }));
    assert_eq!(mc.position(1), 5000);
}

// ── Switches ──

#[test]
fn switch_hit_during_move_stops_the_machine() {
    let mut config = machine(MACHINE_TOML);
    config.limit_check = false;
    config.axes[0].reference_hit_min = Some(0);
    let mut board = SimBoard::new();
    board.place_switch(0, true, -300, 0);
    let mut s = Stepper::new(board, &config);
    let events = capture_events(&mut s);

    s.move_rel_axis(0, -1000, 3000).unwrap();
    s.run_until_idle(100_000);

    assert!(!s.is_busy());
    assert_eq!(s.fatal_error(), Some(MotionError::ReferenceHit));
    assert!(s.is_emergency_stop());
    let stopped = s.current_position()[0];
    assert!((-310..=-300).contains(&stopped), "stopped at {stopped}");
    assert_eq!(s.position()[0], stopped);
    assert!(events.lock().unwrap().contains(&StepperEvent::Fatal(MotionError::ReferenceHit)));
}

#[test]
fn switch_check_can_be_disabled() {
    let mut config = machine(MACHINE_TOML);
    config.limit_check = false;
    config.check_reference = false;
    config.axes[0].reference_hit_min = Some(0);
    let mut board = SimBoard::new();
    board.place_switch(0, true, -300, 0);
    let mut s = Stepper::new(board, &config);

    s.move_rel_axis(0, -1000, 3000).unwrap();
    s.wait_busy().unwrap();
    assert_eq!(s.current_position()[0], -1000);
    assert!(s.is_reference(0));
}

// ── Emergency Stop ──

#[test]
fn emergency_stop_blocks_until_resurrect() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.move_rel_axis(0, 20_000, 5000).unwrap();
    s.move_rel_axis(1, 20_000, 5000).unwrap();
    for _ in 0..1000 {
        s.tick();
    }

    s.emergency_stop();
    assert!(!s.is_busy());
    assert!(s.is_emergency_stop());
    assert_eq!(s.queued_movements(), 0);
    let stopped = s.current_position();
    assert!(stopped[0] > 0 && stopped[0] < 20_000);
    assert_eq!(s.position(), stopped);
    assert_eq!(s.wait(1), Err(MotionError::FatalLocked));

    s.resurrect();
    assert!(!s.is_emergency_stop());
    assert!(s.faults().is_empty());
    s.move_abs_axis(0, 0, 5000).unwrap();
    s.wait_busy().unwrap();
    assert_eq!(s.current_position()[0], 0);
}
