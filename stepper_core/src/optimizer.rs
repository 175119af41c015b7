//! Look-ahead over the movement queue.
//!
//! Two passes per call:
//!
//! 1. **tail → head**: starting from a stop at the tail, compute how fast
//!    each movement may be entered so that every later one can still
//!    decelerate in time. Stops early once a junction no longer changes.
//! 2. **head → tail**: from the first changed entry, propagate the
//!    reachable exit speed forward and rebuild the ramps.
//!
//! I/O entries are transparent; waits act as a full stop.

use crate::movement::Movement;
use crate::queue::RingBuffer;
use stepper_common::consts::TIMER_MAX;
use stepper_common::types::MDist;

/// Previous queued entry before `idx` that takes part in optimizing.
///
/// `idx` may be the free slot after the tail.
pub fn prev_movement<const N: usize>(queue: &RingBuffer<Movement, N>, idx: usize) -> Option<usize> {
    let mut indices = queue.indices().rev();
    if idx != queue.next_tail_index() || queue.is_full() {
        indices.by_ref().find(|&i| i == idx)?;
    }
    indices.find(|&i| !queue.get(i).is_skip_for_optimizing())
}

/// Next queued entry after `idx` that takes part in optimizing.
pub fn next_movement<const N: usize>(queue: &RingBuffer<Movement, N>, idx: usize) -> Option<usize> {
    let mut indices = queue.indices();
    indices.by_ref().find(|&i| i == idx)?;
    indices.find(|&i| !queue.get(i).is_skip_for_optimizing())
}

/// Re-plan junction speeds and ramps of all queued movements.
///
/// `executing_n` is the step index reached by the head movement.
pub fn optimize_queue<const N: usize>(queue: &mut RingBuffer<Movement, N>, executing_n: MDist) {
    let count = queue.count();
    if count < 2 {
        return;
    }
    let head = queue.head_index();
    let at = |pos: usize| (head + pos) % N;

    let mut no_change = 0;
    let mut start_possible = TIMER_MAX;
    for pos in (0..count).rev() {
        let idx = at(pos);
        let prev = prev_movement(queue, idx).map(|i| *queue.get(i));
        let has_next = next_movement(queue, idx).is_some();
        if queue.get_mut(idx).adjust_junction_speed_t2h(prev.as_ref(), has_next, &mut start_possible) {
            no_change = pos;
            break;
        }
    }

    for pos in no_change..count {
        let idx = at(pos);
        let prev = prev_movement(queue, idx).map(|i| *queue.get(i));
        let next_idx =
            next_movement(queue, idx).filter(|&i| queue.get(i).state.is_active_move());
        let mut next = next_idx.map(|i| *queue.get(i));
        let n = if idx == head { executing_n } else { 0 };
        queue.get_mut(idx).adjust_junction_speed_h2t(prev.as_ref(), next.as_mut(), n);
        if let (Some(i), Some(mv)) = (next_idx, next) {
            *queue.get_mut(i) = mv;
        }
    }
}
