//! Queueing operations: moves, waits, I/O, pause, stop and abort.

use super::Stepper;
use crate::movement::{ExecState, Movement};
use crate::optimizer::{next_movement, prev_movement};
use crate::ramp::{round_mul_div, speed_to_timer, timer_to_speed};
use stepper_common::board::StepperBoard;
use stepper_common::consts::{LEVEL_MAX, MAX_AXES, MAX_STEPS_PER_MOVE, TIMER_MAX, WAIT_TIMER};
use stepper_common::machine::error::{MotionError, StepperFault};
use stepper_common::machine::event::StepperEvent;
use stepper_common::types::{AxisArray, AxisMask, MDist, SDist, StepRate, Timer, UDist};
use tracing::{debug, warn};

/// Steps of a wait that only ends on a condition.
const WAIT_FOREVER: MDist = 0xffff;

impl<B: StepperBoard> Stepper<B> {
    // ─── Moves ──────────────────────────────────────────────────────

    /// Move all axes to the absolute machine position `target`.
    ///
    /// `rate` is the step rate of the longest axis; 0 uses the default.
    pub fn move_abs(&mut self, target: &AxisArray<SDist>, rate: StepRate) -> Result<(), MotionError> {
        let mut dist = [0; MAX_AXES];
        let mut direction_up = AxisMask::empty();
        for i in 0..MAX_AXES {
            let up = target[i] >= self.calculated[i];
            direction_up.set_axis(i, up);
            dist[i] = target[i].abs_diff(self.calculated[i]);
        }
        self.queue_and_split(&dist, direction_up, rate)
    }

    pub fn move_abs_axis(&mut self, axis: usize, target: SDist, rate: StepRate) -> Result<(), MotionError> {
        self.check_axis(axis)?;
        let mut position = self.calculated;
        position[axis] = target;
        self.move_abs(&position, rate)
    }

    /// Move all axes by `delta` steps.
    pub fn move_rel(&mut self, delta: &AxisArray<SDist>, rate: StepRate) -> Result<(), MotionError> {
        let mut dist = [0; MAX_AXES];
        let mut direction_up = AxisMask::empty();
        for i in 0..MAX_AXES {
            direction_up.set_axis(i, delta[i] >= 0);
            dist[i] = delta[i].unsigned_abs();
        }
        self.queue_and_split(&dist, direction_up, rate)
    }

    pub fn move_rel_axis(&mut self, axis: usize, delta: SDist, rate: StepRate) -> Result<(), MotionError> {
        self.check_axis(axis)?;
        let mut dist = [0; MAX_AXES];
        dist[axis] = delta.unsigned_abs();
        let mut direction_up = AxisMask::empty();
        direction_up.set_axis(axis, delta > 0);
        self.queue_and_split(&dist, direction_up, rate)
    }

    /// Range check and queue the move, split into parts of at most
    /// [`MAX_STEPS_PER_MOVE`] steps.
    fn queue_and_split(
        &mut self,
        dist: &AxisArray<UDist>,
        direction_up: AxisMask,
        rate: StepRate,
    ) -> Result<(), MotionError> {
        self.ensure_motion_allowed()?;
        self.last_error = None;

        let mut target = [0; MAX_AXES];
        for i in 0..MAX_AXES {
            target[i] = if direction_up.has_axis(i) {
                self.calculated[i] as i64 + dist[i] as i64
            } else {
                self.calculated[i] as i64 - dist[i] as i64
            };
        }
        self.check_range(&target)?;

        let mut step_mult: u32 = 1;
        let mut timer_max = if rate == 0 { self.timer_max_default } else { speed_to_timer(rate) };
        while timer_max == TIMER_MAX {
            step_mult += 1;
            timer_max = speed_to_timer(rate.saturating_mul(step_mult));
        }
        timer_max = timer_max.max(self.timer_max_default);

        let steps = dist.iter().copied().max().unwrap_or(0);
        self.total_steps += steps as u64;

        let total = steps as u64 * step_mult as u64;
        let move_count = total.div_ceil(MAX_STEPS_PER_MOVE as u64).max(1);
        if move_count > 1 {
            debug!("Split move of {} steps into {} parts", total, move_count);
        }

        let mut done = [0u64; MAX_AXES];
        let mut part = [0; MAX_AXES];
        for j in 1..move_count {
            for i in 0..MAX_AXES {
                let pos = round_mul_div(dist[i] as u64, j, move_count);
                part[i] = (pos - done[i]) as MDist;
                done[i] = pos;
            }
            self.queue_part(&part, direction_up, timer_max, step_mult)?;
        }
        for i in 0..MAX_AXES {
            part[i] = (dist[i] as u64 - done[i]) as MDist;
        }
        self.queue_part(&part, direction_up, timer_max, step_mult)
    }

    /// Fail with a fatal [`MotionError::RangeLimit`] if `target` leaves
    /// the travel of any axis. Nothing is checked while the limit check is off.
    pub fn check_range(&mut self, target: &[i64; MAX_AXES]) -> Result<(), MotionError> {
        if !self.limit_check {
            return Ok(());
        }
        for (i, &t) in target.iter().enumerate() {
            if t > self.limit_max[i] as i64 || t < self.limit_min[i] as i64 {
                return Err(self.raise(MotionError::RangeLimit {
                    axis: i,
                    target: t.clamp(SDist::MIN as i64, SDist::MAX as i64) as SDist,
                    min: self.limit_min[i],
                    max: self.limit_max[i],
                }));
            }
        }
        Ok(())
    }

    /// Queue one part and count it into the calculated position once it
    /// sits in the queue.
    fn queue_part(
        &mut self,
        part: &AxisArray<MDist>,
        direction_up: AxisMask,
        timer_max: Timer,
        step_mult: u32,
    ) -> Result<(), MotionError> {
        self.queue_move(part, direction_up, timer_max, step_mult)?;
        for i in 0..MAX_AXES {
            let d = part[i] as SDist;
            self.calculated[i] = self.calculated[i].saturating_add(if direction_up.has_axis(i) { d } else { -d });
        }
        if self.wait_finish_move {
            self.wait_busy()?;
        }
        Ok(())
    }

    fn queue_move(
        &mut self,
        dist: &AxisArray<MDist>,
        direction_up: AxisMask,
        timer_max: Timer,
        step_mult: u32,
    ) -> Result<(), MotionError> {
        let mut moving = AxisMask::empty();
        for (i, &d) in dist.iter().enumerate() {
            moving.set_axis(i, d != 0);
        }
        let direction = direction_up & moving;
        let steps = dist.iter().copied().max().unwrap_or(0);
        if steps == 0 {
            self.notify_info("EmptyMove skipped");
            return Ok(());
        }
        let steps = steps * step_mult;

        if self.is_backlash_enabled() && (self.last_direction & moving) != direction {
            let reversed = (self.last_direction & moving) ^ direction;
            let mut backlash = [0; MAX_AXES];
            for i in 0..MAX_AXES {
                if reversed.has_axis(i) {
                    backlash[i] = self.backlash[i];
                }
            }
            let backlash_steps = backlash.iter().copied().max().unwrap_or(0);
            if backlash_steps > 0 {
                self.notify_info("Backlash");
                self.wait_until_can_queue()?;
                let mut mv = self.new_move(backlash_steps, backlash, direction_up, self.timer_backlash);
                mv.backlash = true;
                self.enqueue_and_start(mv, false)?;
                self.last_direction = (self.last_direction & !moving) | direction;
            }
        }

        self.wait_until_can_queue()?;
        let mv = self.new_move(steps, *dist, direction_up, timer_max);
        self.enqueue_and_start(mv, false)?;
        self.last_direction = (self.last_direction & !moving) | direction;
        Ok(())
    }

    fn new_move(&self, steps: MDist, dist: AxisArray<MDist>, direction_up: AxisMask, timer_max: Timer) -> Movement {
        let prev = prev_movement(&self.movements, self.movements.next_tail_index())
            .map(|i| self.movements.get(i));
        Movement::new_move(&self.limits, prev, steps, dist, direction_up, timer_max)
    }

    fn enqueue_and_start(&mut self, mv: Movement, wait_finish: bool) -> Result<(), MotionError> {
        if self.movements.push(mv).is_err() {
            return Err(self.raise(MotionError::QueueCorrupt));
        }
        self.optimize_movement_queue(false);

        if !self.timer_running {
            self.idle_since_ms = self.millis();
            for i in 0..self.axis_count {
                self.enable_deadline_ms[i] = 0;
                self.set_enable_safe(i, LEVEL_MAX);
            }
            self.timer_running = true;
            self.emit(StepperEvent::Start);
            self.fill_step_buffer();
            if self.movements.is_empty() && self.step_buffer.is_empty() {
                self.go_idle();
            }
        }

        if wait_finish && self.wait_finish_move {
            self.wait_busy()?;
        }
        Ok(())
    }

    // ─── Waits and I/O ──────────────────────────────────────────────

    /// Dwell for `sec100` hundredths of a second.
    pub fn wait(&mut self, sec100: u16) -> Result<(), MotionError> {
        self.queue_wait(sec100 as MDist, 0, false)
    }

    /// Dwell that also ends as soon as neither pause nor the
    /// wait-conditional flag is set.
    pub fn wait_conditional(&mut self, sec100: u16) -> Result<(), MotionError> {
        self.queue_wait(sec100 as MDist, 0, true)
    }

    /// Dwell until the simulated clock reaches `at_ms`.
    pub fn wait_clock(&mut self, at_ms: u64) -> Result<(), MotionError> {
        self.queue_wait(WAIT_FOREVER, at_ms, false)
    }

    fn queue_wait(&mut self, steps: MDist, end_ms: u64, conditional: bool) -> Result<(), MotionError> {
        self.ensure_motion_allowed()?;
        self.wait_until_can_queue()?;
        let mv = Movement::new_wait(steps, WAIT_TIMER, end_ms, conditional);
        self.enqueue_and_start(mv, true)
    }

    /// Queue an auxiliary output, executed when it reaches the head.
    pub fn io_control(&mut self, tool: u8, level: u16) -> Result<(), MotionError> {
        self.ensure_motion_allowed()?;
        self.wait_until_can_queue()?;
        self.enqueue_and_start(Movement::new_io(tool, level), true)
    }

    // ─── Pause / Stop / Abort ───────────────────────────────────────

    /// Hold after the first queued movement that can stop within the jerk
    /// speeds; [`Stepper::continue_move`] resumes.
    pub fn pause_move(&mut self) -> Result<(), MotionError> {
        if self.pause {
            return Ok(());
        }
        self.pause = true;
        self.wait_until_can_queue()?;

        let mut insert_after = None;
        for idx in self.movements.indices() {
            let mv = self.movements.get(idx);
            let can_stop = !mv.state.is_active_move() || {
                let speed_stop = timer_to_speed(mv.profile.ramp.timer_stop) as u64;
                let s = mv.steps as u64;
                (0..MAX_AXES).all(|x| {
                    let d = mv.distance[x] as u64;
                    let v = if d != s { round_mul_div(speed_stop, d, s) } else { speed_stop };
                    (self.limits.jerk[x] as u64) > v
                })
            };
            if can_stop {
                insert_after = Some(idx);
                break;
            }
        }

        let pause_wait = Movement::new_wait(WAIT_FOREVER, WAIT_TIMER, 0, true);
        match insert_after {
            Some(idx) if idx != self.movements.tail_index() => {
                let at = self.movements.next_index(idx);
                match self.movements.insert_at(at) {
                    Some(slot) => *slot = pause_wait,
                    None => return Err(self.raise(MotionError::QueueCorrupt)),
                }
                if let Some(next) = next_movement(&self.movements, at) {
                    let following = next_movement(&self.movements, next)
                        .map(|i| *self.movements.get(i))
                        .filter(|m| m.state.is_active_move())
                        .map(|m| m.profile.timer_junction_to_prev);
                    let mv = self.movements.get_mut(next);
                    if mv.state.is_active_move() {
                        mv.profile.timer_junction_to_prev = TIMER_MAX;
                        mv.apply_ramp(following, 0);
                    }
                }
                debug!("Pause inserted after queue slot {}", idx);
                Ok(())
            }
            _ => {
                debug!("Pause queued at end");
                self.enqueue_and_start(pause_wait, false)
            }
        }
    }

    pub fn continue_move(&mut self) {
        self.pause = false;
    }

    /// Decelerate the executing movement to standstill and drop the rest
    /// of the queue. `v0_dec` overrides the deceleration (0 = movement's).
    pub fn stop_move(&mut self, v0_dec: StepRate) -> Result<(), MotionError> {
        let Some(head) = self.movements.head().copied() else {
            return Ok(());
        };
        if head.state.is_active_wait() {
            self.exec.n = head.steps;
            return Ok(());
        }
        if head.state.is_ready() {
            self.abort_move();
            return Ok(());
        }
        if head.state.is_down_move() {
            return Ok(());
        }

        let dec_timer = if v0_dec != 0 { speed_to_timer(v0_dec) } else { head.profile.timers.dec };
        let stop = Movement::new_stop(&head, self.exec.timer, dec_timer);
        self.movements.remove_tail(self.movements.head_index());
        if let Some(h) = self.movements.head_mut() {
            h.steps = self.exec.n;
        }
        debug!("Stop: {} steps to standstill", stop.steps);
        if self.movements.push(stop).is_err() {
            return Err(self.raise(MotionError::QueueCorrupt));
        }

        let result = self.wait_busy();
        self.calculated = self.current;
        result
    }

    /// Drop all queued and buffered motion immediately, without ramp.
    pub fn abort_move(&mut self) {
        if !self.movements.is_empty() {
            warn!("Abort: dropping {} queued movements", self.movements.count());
        }
        self.step_buffer.clear();
        self.movements.clear();
        self.exec = ExecState::default();
        self.calculated = self.current;
        self.go_idle();
    }

    /// Abort and block all motion until [`Stepper::resurrect`].
    pub fn emergency_stop(&mut self) {
        self.abort_move();
        if self.fatal.is_none() {
            self.raise(MotionError::EmergencyStop);
        } else {
            self.faults |= StepperFault::EMERGENCY_STOP;
        }
    }

    pub fn is_emergency_stop(&self) -> bool {
        self.faults.contains(StepperFault::EMERGENCY_STOP)
    }
}
