//! Integration test: Delta kinematics through the motion layer.
//!
//! Logical moves are split into short segments, each segment target is
//! solved to servo pulses and queued on the engine. Returning to the start
//! point must land on exactly the same machine position.

use super::machine;
use stepper_common::consts::MAX_AXES;
use stepper_common::machine::config::OptimizePolicy;
use stepper_common::machine::error::MotionError;
use stepper_common::types::{AxisArray, Mm1000, SDist};
use stepper_core::{MotionControl, SimBoard, Stepper};

/// Three servo axes, pulse width [µs × 2] at one step per unit.
const DELTA_TOML: &str = r#"
[machine]
kinematics = "delta"
max_step_rate = 20000
acc = 350
dec = 380

[machine.delta]
split_move_dist = 10000

[[machine.axes]]
size = 6000

[[machine.axes]]
size = 6000

[[machine.axes]]
size = 6000
"#;

const START: [Mm1000; 3] = [200_000, 0, 105_000];
const FEED: i32 = 6_000_000;

fn logical(p: [Mm1000; 3]) -> AxisArray<Mm1000> {
    let mut a = [0; MAX_AXES];
    a[..3].copy_from_slice(&p);
    a
}

/// Motion control with the arm parked at `START`.
fn delta_at_start() -> MotionControl<SimBoard> {
    let config = machine(DELTA_TOML);
    let mut mc = MotionControl::new(Stepper::new(SimBoard::new(), &config), &config);
    let pulses = mc.transform().to_machine(&logical(START)).unwrap();
    for axis in 0..3 {
        mc.stepper_mut().set_position(axis, pulses[axis]).unwrap();
    }
    mc.set_position_from_machine();
    mc
}

/// A servo whose pulse rises past both the start and the first of five
/// segments on the way from `from` to `to`, with the pulse it may not pass.
fn rising_servo(mc: &MotionControl<SimBoard>, from: [Mm1000; 3], to: [Mm1000; 3]) -> Option<(usize, SDist)> {
    let first: [Mm1000; 3] = std::array::from_fn(|i| from[i] + (to[i] - from[i]) / 5);
    let pulses = |p| mc.transform().to_machine(&logical(p)).unwrap();
    let (start, first, end) = (pulses(from), pulses(first), pulses(to));
    (0..3)
        .map(|i| (i, start[i].max(first[i])))
        .find(|&(i, ceiling)| end[i] > ceiling)
}

fn assert_near(actual: &AxisArray<Mm1000>, expected: [Mm1000; 3], tolerance: Mm1000) {
    for axis in 0..3 {
        assert!(
            (actual[axis] - expected[axis]).abs() <= tolerance,
            "axis {axis}: {} expected {} ± {tolerance}",
            actual[axis],
            expected[axis]
        );
    }
}

#[test]
fn resync_recovers_the_logical_position() {
    let mc = delta_at_start();
    assert_near(&mc.positions(), START, 500);
}

#[test]
fn long_move_is_split_into_segments() {
    let mut mc = delta_at_start();
    mc.stepper_mut().set_optimize_policy(OptimizePolicy::Deferred);
    mc.move_abs(&logical([150_000, 50_000, 80_000]), FEED).unwrap();
    // 50 mm at 10 mm per segment
    assert_eq!(mc.stepper().queued_movements(), 5);
    assert_eq!(mc.positions()[..3], [150_000, 50_000, 80_000]);
}

#[test]
fn closed_path_returns_to_the_same_pulses() {
    let mut mc = delta_at_start();
    let start_pulses = mc.stepper().position();

    mc.move_abs(&logical([150_000, 50_000, 80_000]), FEED).unwrap();
    mc.wait_busy().unwrap();
    let reached = mc.logical_position(&mc.stepper().current_position());
    assert_near(&reached, [150_000, 50_000, 80_000], 1500);

    mc.move_abs(&logical([180_000, -60_000, 120_000]), FEED).unwrap();
    mc.move_abs(&logical(START), FEED).unwrap();
    mc.wait_busy().unwrap();

    assert_eq!(mc.stepper().current_position(), start_pulses);
    // the board counted every pulse, so the net travel is zero
    assert_eq!(mc.stepper().board().physical_position()[..3], [0, 0, 0]);
}

#[test]
fn unreachable_target_queues_nothing() {
    let mut mc = delta_at_start();
    let before = mc.positions();
    let err = mc.move_abs(&logical([1_000_000, 0, 105_000]), FEED).unwrap_err();
    assert_eq!(err, MotionError::Unreachable);
    assert_eq!(mc.stepper().queued_movements(), 0);
    assert_eq!(mc.positions(), before);
    assert!(mc.stepper().fatal_error().is_none());
}

#[test]
fn out_of_range_segment_queues_nothing() {
    let far = [150_000, 50_000, 80_000];
    let mut mc = delta_at_start();
    let (from, to) = if rising_servo(&mc, START, far).is_some() { (START, far) } else { (far, START) };
    if from != START {
        mc.move_abs(&logical(from), FEED).unwrap();
        mc.wait_busy().unwrap();
    }
    let (axis, ceiling) = rising_servo(&mc, from, to).expect("a servo rising along the path");
    mc.stepper_mut().set_limit_max(axis, ceiling);

    let pulses = mc.stepper().position();
    let err = mc.move_abs(&logical(to), FEED).unwrap_err();
    assert!(matches!(err, MotionError::RangeLimit { axis: a, .. } if a == axis), "{err:?}");
    assert_eq!(mc.stepper().queued_movements(), 0);
    assert!(!mc.stepper().is_busy());
    assert_eq!(mc.stepper().position(), pulses);
    assert_eq!(mc.stepper().current_position(), pulses);
    assert_eq!(mc.positions(), mc.logical_position(&pulses));
}
