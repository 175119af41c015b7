//! Integration test: look-ahead junction speeds.

use super::{MACHINE_TOML, drain, machine, stepper, xyz};
use stepper_common::machine::config::OptimizePolicy;
use stepper_common::types::Timer;
use stepper_core::movement::MovementState;
use stepper_core::ramp::speed_to_timer;

/// Entry junction timers of the queued travel movements.
fn junctions(s: &stepper_core::Stepper<stepper_core::SimBoard>) -> Vec<Timer> {
    s.movement_queue()
        .iter()
        .filter(|mv| mv.state == MovementState::ReadyMove)
        .map(|mv| mv.profile.timer_junction_to_prev)
        .collect()
}

#[test]
fn collinear_moves_keep_their_speed() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    for _ in 0..3 {
        s.move_rel_axis(0, 2000, 5000).unwrap();
    }
    let junctions = junctions(&s);
    assert_eq!(junctions.len(), 3);
    // jerk speed alone would allow no more than 1000 steps/s
    assert!(junctions[1] < speed_to_timer(1000), "junction {}", junctions[1]);
    assert!(junctions[2] < speed_to_timer(1000), "junction {}", junctions[2]);
}

#[test]
fn reversal_forces_a_stop() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.set_position(0, 50_000).unwrap();
    s.move_rel_axis(0, 2000, 5000).unwrap();
    s.move_rel_axis(0, -2000, 5000).unwrap();
    let junctions = junctions(&s);
    assert_eq!(junctions.len(), 2);
    assert!(junctions[1] >= speed_to_timer(config.acc), "junction {}", junctions[1]);
}

#[test]
fn corner_is_limited_by_jerk() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.move_rel_axis(0, 4000, 8000).unwrap();
    s.move_rel_axis(1, 4000, 8000).unwrap();
    s.move_rel_axis(0, 4000, 8000).unwrap();
    let junctions = junctions(&s);
    let cruise = speed_to_timer(8000);
    assert!(junctions[1] > cruise);
    assert!(junctions[1] < speed_to_timer(config.acc));
}

#[test]
fn deferred_and_immediate_end_in_the_same_place() {
    let path = [(3000, 1000), (2500, 1000), (-800, 2000), (-800, -2000), (4000, 0), (-1000, -500)];
    let run = |policy: OptimizePolicy| {
        let mut config = machine(MACHINE_TOML);
        config.optimize = policy;
        let mut s = stepper(&config);
        s.set_position(0, 50_000).unwrap();
        s.set_position(1, 50_000).unwrap();
        for &(dx, dy) in &path {
            s.move_rel(&xyz(dx, dy, 0), 6000).unwrap();
        }
        let ticks = drain(&mut s).len();
        (s.current_position(), s.board().physical_position(), s.board().pulses(), ticks)
    };

    let immediate = run(OptimizePolicy::Immediate);
    let deferred = run(OptimizePolicy::Deferred);
    assert_eq!(immediate.0, deferred.0);
    assert_eq!(immediate.1, deferred.1);
    assert_eq!(immediate.2, deferred.2);
    assert!(immediate.3 > 0 && deferred.3 > 0);
}

#[test]
fn optimized_queue_runs_faster_than_stop_and_go() {
    let config = machine(MACHINE_TOML);

    let mut joined = stepper(&config);
    for _ in 0..4 {
        joined.move_rel_axis(0, 3000, 6000).unwrap();
    }
    joined.wait_busy().unwrap();

    let mut single = stepper(&config);
    for _ in 0..4 {
        single.move_rel_axis(0, 3000, 6000).unwrap();
        single.wait_busy().unwrap();
    }

    assert_eq!(joined.current_position(), single.current_position());
    assert!(joined.clock() < single.clock(), "{} >= {}", joined.clock(), single.clock());
}
