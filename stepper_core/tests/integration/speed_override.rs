//! Integration test: speed override scaling and hold.

use super::{MACHINE_TOML, drain, machine, stepper};
use stepper_common::machine::config::MachineConfig;
use stepper_common::machine::error::MotionError;
use stepper_core::stepper::TickState;

/// Shortest step interval of a 5000-step move at 2000 steps/s.
fn cruise_interval(percent: u16) -> u32 {
    cruise_interval_on(&machine(MACHINE_TOML), percent)
}

fn cruise_interval_on(config: &MachineConfig, percent: u16) -> u32 {
    let mut s = stepper(config);
    s.set_speed_override_percent(percent);
    s.move_rel_axis(0, 5000, 2000).unwrap();
    drain(&mut s)
        .iter()
        .filter(|out| out.has_steps())
        .map(|out| out.interval)
        .min()
        .unwrap()
}

#[test]
fn half_override_doubles_the_cruise_timer() {
    let full = cruise_interval(100);
    let half = cruise_interval(50);
    assert_eq!(full, 1000);
    assert_eq!(half, 2 * full);
}

#[test]
fn high_override_is_capped_at_the_top_level() {
    // 200 % clamps to level 255: 1000 * 128 / 255, well inside the
    // 20000 steps/s the axis allows
    assert_eq!(cruise_interval(200), 502);
}

#[test]
fn raised_override_never_exceeds_the_axis_rate() {
    let mut config = machine(MACHINE_TOML);
    config.axes[0].max_step_rate = 2000;
    // 2000 steps/s is one step per 1000 timer ticks
    assert_eq!(cruise_interval_on(&config, 200), 1000);
    assert_eq!(cruise_interval_on(&config, 50), 2000);
}

#[test]
fn zero_override_holds_and_keeps_the_queue() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.move_rel_axis(0, 2000, 5000).unwrap();
    s.move_rel_axis(1, 2000, 5000).unwrap();
    for _ in 0..200 {
        s.tick();
    }
    s.set_speed_override(0);

    let held = s.current_position();
    let queued = s.queued_movements();
    for _ in 0..500 {
        let out = s.tick();
        assert_eq!(out.state, TickState::Holding);
        assert!(!out.has_steps());
    }
    assert_eq!(s.current_position(), held);
    assert_eq!(s.queued_movements(), queued);
    assert_eq!(s.wait_busy(), Err(MotionError::Halted));

    s.set_speed_override_percent(100);
    s.wait_busy().unwrap();
    assert_eq!(s.current_position()[..2], [2000, 2000]);
}

#[test]
fn halted_queue_keeps_the_planned_position() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.set_speed_override(0);

    let mut accepted = 0;
    let err = loop {
        match s.move_rel_axis(0, 1000, 5000) {
            Ok(()) => accepted += 1000,
            Err(err) => break err,
        }
        assert!(accepted <= 40_000, "queue never filled");
    };
    assert_eq!(err, MotionError::Halted);
    assert!(s.fatal_error().is_none());
    assert_eq!(s.position()[0], accepted);
    assert_eq!(s.current_position()[0], 0);

    s.set_speed_override_percent(100);
    s.wait_busy().unwrap();
    assert_eq!(s.current_position(), s.position());
}
