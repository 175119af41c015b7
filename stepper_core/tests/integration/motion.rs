//! Integration test: queueing, step emission and ramp shape.

use super::{MACHINE_TOML, capture_events, drain, machine, stepper, xyz};
use proptest::prelude::*;
use std::collections::VecDeque;
use stepper_common::board::StepperBoard;
use stepper_common::consts::{LEVEL_MAX, LEVEL_OFF, MAX_STEPS_PER_MOVE};
use stepper_common::machine::event::StepperEvent;
use stepper_core::queue::RingBuffer;
use stepper_core::stepper::TickState;

// ── Queue ──

proptest! {
    #[test]
    fn ring_buffer_counts_like_a_deque(ops in prop::collection::vec(prop::option::of(0u32..1000), 0..200)) {
        let mut ring: RingBuffer<u32, 8> = RingBuffer::new();
        let mut model = VecDeque::new();
        for op in ops {
            match op {
                Some(value) => {
                    let pushed = ring.push(value).is_ok();
                    prop_assert_eq!(pushed, model.len() < 8);
                    if pushed {
                        model.push_back(value);
                    }
                }
                None => prop_assert_eq!(ring.dequeue(), model.pop_front()),
            }
            prop_assert_eq!(ring.count(), model.len());
            prop_assert_eq!(ring.is_full(), model.len() == 8);
            prop_assert_eq!(ring.head().copied(), model.front().copied());
            prop_assert_eq!(ring.tail().copied(), model.back().copied());
        }
    }
}

// ── Relative Moves ──

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn relative_moves_round_trip(moves in prop::collection::vec((-3000i32..3000, -3000i32..3000), 1..6)) {
        let config = machine(MACHINE_TOML);
        let mut s = stepper(&config);
        s.set_position(0, 50_000).unwrap();
        s.set_position(1, 50_000).unwrap();

        let mut expected = [50_000, 50_000];
        let mut travel = [0u64; 2];
        for &(dx, dy) in &moves {
            s.move_rel(&xyz(dx, dy, 0), 8000).unwrap();
            expected[0] += dx;
            expected[1] += dy;
            travel[0] += dx.unsigned_abs() as u64;
            travel[1] += dy.unsigned_abs() as u64;
        }
        prop_assert_eq!(&s.position()[..2], &expected[..]);

        drain(&mut s);
        prop_assert_eq!(&s.current_position()[..2], &expected[..]);
        let physical = s.board().physical_position();
        prop_assert_eq!(physical[0], expected[0] - 50_000);
        prop_assert_eq!(physical[1], expected[1] - 50_000);
        prop_assert_eq!(&s.board().pulses()[..2], &travel[..]);
        prop_assert_eq!(s.board().steps_while_disabled(), 0);

        let back = xyz(50_000 - expected[0], 50_000 - expected[1], 0);
        s.move_rel(&back, 8000).unwrap();
        s.wait_busy().unwrap();
        prop_assert_eq!(&s.current_position()[..2], &[50_000, 50_000][..]);
    }
}

#[test]
fn long_move_is_split_into_parts() {
    let mut config = machine(MACHINE_TOML);
    config.axes[0].size = 300_000;
    let mut s = stepper(&config);
    let steps = MAX_STEPS_PER_MOVE as i32 * 2 + 100;
    s.move_rel_axis(0, steps, 20_000).unwrap();
    assert_eq!(s.queued_movements(), 3);
    s.wait_busy().unwrap();
    assert_eq!(s.current_position()[0], steps);
    assert_eq!(s.board().pulses()[0], steps as u64);
}

#[test]
fn empty_move_is_skipped() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    let events = capture_events(&mut s);
    s.move_rel(&xyz(0, 0, 0), 1000).unwrap();
    assert_eq!(s.queued_movements(), 0);
    assert!(events.lock().unwrap().contains(&StepperEvent::Info("EmptyMove skipped")));
}

// ── Direction Settle ──

#[test]
fn direction_change_never_steps_in_the_same_tick() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.set_position(0, 50_000).unwrap();
    s.set_position(1, 50_000).unwrap();
    for &(dx, dy) in &[(500, 300), (-800, 200), (300, -900), (-200, -200), (700, 700)] {
        s.move_rel(&xyz(dx, dy, 0), 6000).unwrap();
    }

    let outcomes = drain(&mut s);
    let mut changes = 0;
    for out in &outcomes {
        if !out.direction_changed.is_empty() {
            changes += 1;
            assert!(!out.has_steps(), "stepped while reversing: {out:?}");
            assert_eq!(out.interval, config.direction_settle);
        }
    }
    assert!(changes >= 4);
    assert_eq!(changes, s.board().direction_changes());
}

// ── Ramp ──

/// Intervals of the ticks that emitted steps.
fn step_intervals(s: &mut stepper_core::Stepper<stepper_core::SimBoard>) -> Vec<u32> {
    drain(s)
        .iter()
        .filter(|out| out.has_steps())
        .map(|out| out.interval)
        .collect()
}

#[test]
fn ramp_accelerates_cruises_and_decelerates() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.move_rel_axis(0, 5000, 2000).unwrap();
    let intervals = step_intervals(&mut s);

    assert_eq!(intervals.len(), 5000);
    let fastest = *intervals.iter().min().unwrap();
    assert_eq!(fastest, 1000);
    assert!(intervals[0] > fastest);
    assert!(intervals[intervals.len() - 1] > fastest);

    let first = intervals.iter().position(|&t| t == fastest).unwrap();
    let last = intervals.iter().rposition(|&t| t == fastest).unwrap();
    assert!(intervals[..=first].windows(2).all(|w| w[0] >= w[1]), "acceleration not monotonic");
    assert!(intervals[first..=last].iter().all(|&t| t == fastest), "cruise not constant");
    assert!(intervals[last..].windows(2).all(|w| w[0] <= w[1]), "deceleration not monotonic");
}

#[test]
fn state_reports_moving_phases() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.move_rel_axis(0, 3000, 2000).unwrap();
    let states: Vec<TickState> = drain(&mut s).iter().map(|out| out.state).collect();
    assert!(states.contains(&TickState::Accelerating));
    assert!(states.contains(&TickState::Cruising));
    assert!(states.contains(&TickState::Decelerating));
    assert_eq!(s.tick().state, TickState::Idle);
}

// ── Waits and I/O ──

#[test]
fn io_entries_run_in_queue_order() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    let events = capture_events(&mut s);
    s.io_control(3, 100).unwrap();
    s.move_rel_axis(0, 1000, 5000).unwrap();
    s.io_control(3, 0).unwrap();
    s.wait_busy().unwrap();

    assert_eq!(s.board().io_log(), &[(3, 100), (3, 0)]);
    let io: Vec<StepperEvent> = events
        .lock()
        .unwrap()
        .iter()
        .copied()
        .filter(|e| matches!(e, StepperEvent::Io { .. }))
        .collect();
    assert_eq!(io, vec![StepperEvent::Io { tool: 3, level: 100 }, StepperEvent::Io { tool: 3, level: 0 }]);
}

#[test]
fn timed_wait_advances_the_clock() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.wait(50).unwrap();
    let before = s.millis();
    s.wait_busy().unwrap();
    let waited = s.millis() - before;
    // 50 wait ticks of 10 ms plus the final idle poll
    assert!((500..=540).contains(&waited), "waited {waited} ms");
    assert_eq!(s.current_position(), xyz(0, 0, 0));
}

// ── Pause / Stop ──

#[test]
fn pause_holds_until_continue() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    for _ in 0..3 {
        s.move_rel_axis(0, 2000, 5000).unwrap();
    }
    s.pause_move().unwrap();
    assert!(s.is_pause_move());

    s.run_until_idle(10_000);
    assert!(s.is_busy());
    let held = s.current_position();
    s.run_until_idle(1_000);
    assert_eq!(s.current_position(), held);

    s.continue_move();
    s.wait_busy().unwrap();
    assert_eq!(s.current_position()[0], 6000);
}

#[test]
fn stop_move_decelerates_and_drops_the_queue() {
    let config = machine(MACHINE_TOML);
    let mut s = stepper(&config);
    s.move_rel_axis(0, 50_000, 5000).unwrap();
    s.move_rel_axis(1, 1000, 5000).unwrap();
    for _ in 0..3000 {
        s.tick();
    }
    let before = s.current_position()[0];
    s.stop_move(0).unwrap();

    assert!(!s.is_busy());
    let stopped = s.current_position();
    assert!(stopped[0] > before && stopped[0] < 50_000, "stopped at {stopped:?}");
    assert_eq!(stopped[1], 0);
    assert_eq!(s.position(), stopped);

    s.move_rel_axis(0, -100, 5000).unwrap();
    s.wait_busy().unwrap();
    assert_eq!(s.current_position()[0], stopped[0] - 100);
}

// ── Backlash ──

#[test]
fn backlash_moves_are_not_counted() {
    let mut config = machine(MACHINE_TOML);
    config.axes[0].backlash = 20;
    let mut s = stepper(&config);
    let events = capture_events(&mut s);

    s.move_rel_axis(0, 1000, 5000).unwrap();
    s.move_rel_axis(0, -500, 5000).unwrap();
    s.wait_busy().unwrap();

    assert_eq!(s.current_position()[0], 500);
    assert_eq!(s.board().pulses()[0], 20 + 1000 + 20 + 500);
    assert_eq!(s.board().physical_position()[0], 500);
    let backlash = events.lock().unwrap().iter().filter(|e| **e == StepperEvent::Info("Backlash")).count();
    assert_eq!(backlash, 2);
}

// ── Enable ──

#[test]
fn idle_axes_are_disabled_after_timeout() {
    let mut config = machine(MACHINE_TOML);
    config.idle_disable_ms = 500;
    let mut s = stepper(&config);
    let events = capture_events(&mut s);

    s.move_rel_axis(0, 1000, 5000).unwrap();
    s.wait_busy().unwrap();
    assert_eq!(s.board().enable(0), LEVEL_MAX);

    for _ in 0..40 {
        s.tick();
    }
    assert_eq!(s.board().enable(0), LEVEL_OFF);
    assert_eq!(s.board().enable(1), LEVEL_MAX);
    assert!(events.lock().unwrap().contains(&StepperEvent::Disable { axis: 0 }));

    s.move_rel_axis(0, -1000, 5000).unwrap();
    s.wait_busy().unwrap();
    assert_eq!(s.board().steps_while_disabled(), 0);
}
