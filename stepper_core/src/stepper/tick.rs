//! Timer path: one `tick()` per timer interrupt.
//!
//! A tick emits at most one step-buffer record. If a stepping axis has to
//! reverse, the tick only drives the direction lines and returns the
//! settle interval; the steps follow on the next tick.

use super::Stepper;
use crate::movement::{MovementState, StepEntry, WaitSpec};
use crate::optimizer;
use crate::ramp::round_mul_div;
use stepper_common::board::StepperBoard;
use stepper_common::consts::{
    IDLE_TIMER, LEVEL_MAX, LEVEL_OFF, MAX_AXES, SPEED_OVERRIDE_100, SYNC_STEP_BUFFER_COUNT,
    TIMER_MAX, TIMER_MIN, WAIT_TIMER,
};
use stepper_common::machine::config::OptimizePolicy;
use stepper_common::machine::error::MotionError;
use stepper_common::machine::event::{StepperEvent, WaitKind};
use stepper_common::types::{AxisArray, AxisMask, MDist, Timer};
use tracing::{debug, trace};

// ─── Tick Outcome ───────────────────────────────────────────────────

/// Phase reported by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickState {
    /// Nothing queued; the timer polls at the idle rate.
    #[default]
    Idle,
    Accelerating,
    Cruising,
    Decelerating,
    /// Executing a timed or conditional wait.
    Waiting,
    /// Speed override is 0: queue kept, nothing emitted.
    Holding,
    /// Moving while a reference move is in progress.
    ReferenceMove,
    /// Fatal error latched.
    Error,
}

impl TickState {
    fn of(state: MovementState) -> Self {
        match state {
            MovementState::UpAcc | MovementState::DownAcc => Self::Accelerating,
            MovementState::UpDec | MovementState::DownDec => Self::Decelerating,
            MovementState::Wait | MovementState::ReadyWait => Self::Waiting,
            MovementState::Done | MovementState::ReadyIo => Self::Idle,
            MovementState::Run | MovementState::ReadyMove => Self::Cruising,
        }
    }

    pub fn is_moving(self) -> bool {
        matches!(self, Self::Accelerating | Self::Cruising | Self::Decelerating | Self::ReferenceMove)
    }
}

/// Result of one timer interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    /// Steps emitted per axis.
    pub steps: AxisArray<u8>,
    /// Logical direction lines after this tick (set bit = counting up).
    pub direction_up: AxisMask,
    /// Axes whose direction line changed in this tick.
    pub direction_changed: AxisMask,
    /// Timer ticks until the next interrupt.
    pub interval: Timer,
    pub state: TickState,
}

impl TickOutcome {
    pub fn has_steps(&self) -> bool {
        self.steps.iter().any(|&s| s > 0)
    }
}

fn is_end_wait(wait: &WaitSpec, now_ms: u64, pause: bool, conditional: bool) -> bool {
    (wait.conditional && !pause && !conditional) || (wait.end_ms != 0 && now_ms >= wait.end_ms)
}

impl<B: StepperBoard> Stepper<B> {
    // ─── Timer Path ─────────────────────────────────────────────────

    /// Run one timer interrupt and advance the simulated clock by the
    /// returned interval.
    pub fn tick(&mut self) -> TickOutcome {
        self.tick_count += 1;
        let outcome = self.step_interrupt();
        self.clock += outcome.interval as u64;
        trace!(
            "tick {}: steps {:?} dir {:?} interval {} {:?}",
            self.tick_count,
            outcome.steps,
            outcome.direction_up,
            outcome.interval,
            outcome.state
        );
        outcome
    }

    fn step_interrupt(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome { direction_up: self.applied_direction, ..Default::default() };

        if self.fatal.is_some() {
            if self.is_busy() {
                self.abort_move();
            } else {
                self.continue_idle();
            }
            outcome.interval = IDLE_TIMER;
            outcome.state = TickState::Error;
            return outcome;
        }

        if self.speed_override == LEVEL_OFF && self.is_busy() {
            outcome.interval = WAIT_TIMER;
            outcome.state = TickState::Holding;
            return outcome;
        }

        if self.step_buffer.is_empty() {
            self.fill_step_buffer();
        }

        let Some(entry) = self.step_buffer.head().copied() else {
            if self.timer_running && self.movements.is_empty() {
                self.go_idle();
            } else {
                self.continue_idle();
            }
            outcome.interval = IDLE_TIMER;
            outcome.state = TickState::Idle;
            return outcome;
        };

        outcome.state = if self.reference_active && entry.stepping().bits() != 0 {
            TickState::ReferenceMove
        } else {
            TickState::of(entry.state)
        };

        let stepping = entry.stepping();
        let changed = (self.applied_direction ^ entry.direction_up) & stepping;
        if !changed.is_empty() {
            self.applied_direction = (self.applied_direction & !stepping) | (entry.direction_up & stepping);
            self.board.set_direction(self.applied_direction ^ self.invert_direction);
            outcome.direction_up = self.applied_direction;
            outcome.direction_changed = changed;
            outcome.interval = self.direction_settle;
            return outcome;
        }

        self.step_out(&entry);
        outcome.steps = entry.steps;
        outcome.interval = entry.timer;

        if self.check_reference && !self.reference_active && stepping.bits() != 0 && self.is_any_reference() {
            self.raise(MotionError::ReferenceHit);
            self.emergency_stop();
            outcome.state = TickState::Error;
            return outcome;
        }

        self.fill_step_buffer();
        outcome
    }

    fn step_out(&mut self, entry: &StepEntry) {
        self.step_buffer.dequeue();
        if !entry.no_count {
            for i in 0..MAX_AXES {
                let n = entry.steps[i] as i32;
                if entry.direction_up.has_axis(i) {
                    self.current[i] += n;
                } else {
                    self.current[i] -= n;
                }
            }
        }
        self.board.step(&entry.steps);
    }

    /// Precompute step records until the buffer is full or the queue drained.
    pub(crate) fn fill_step_buffer(&mut self) {
        while !self.movements.is_empty() {
            if !self.calc_next_steps(true) {
                break;
            }
            if self.movements.head().is_some_and(|m| m.is_finished()) {
                self.movements.dequeue();
            }
        }
        self.check_enable_timeout();
    }

    /// Returns false when the buffer is full and nothing was calculated.
    fn calc_next_steps(&mut self, continues: bool) -> bool {
        loop {
            let Some(state) = self.movements.head().map(|m| m.state) else {
                return false;
            };
            let sync = matches!(state, MovementState::ReadyWait | MovementState::ReadyIo);
            if self.step_buffer.is_full() || (sync && self.step_buffer.count() > SYNC_STEP_BUFFER_COUNT) {
                return false;
            }

            if state.is_ready() {
                self.start_head();
            }

            let now = self.millis();
            let (pause, conditional) = (self.pause, self.wait_conditional);
            let Some(mv) = self.movements.head_mut() else {
                return false;
            };

            if mv.steps <= self.exec.n {
                mv.state = MovementState::Done;
                let distance = mv.distance;
                self.arm_enable_timeout(&distance);
                return true;
            }

            let end_wait = mv.state == MovementState::Wait && is_end_wait(&mv.wait, now, pause, conditional);
            let axis_limit = mv.profile.timer_axis_limit;
            let mut entry = mv.next_step(&mut self.exec, end_wait);
            let floor = axis_limit as u64 * entry.steps.iter().copied().max().unwrap_or(0).max(1) as u64;
            entry.timer = self.apply_override(entry.timer, floor);
            if self.step_buffer.push(entry).is_err() {
                self.raise(MotionError::QueueCorrupt);
                return false;
            }

            if !continues {
                return true;
            }
        }
    }

    /// Begin executing the head entry: enable its axes, dispatch I/O.
    fn start_head(&mut self) {
        let now = self.millis();
        let (pause, conditional) = (self.pause, self.wait_conditional);
        let Some(mv) = self.movements.head_mut() else {
            return;
        };
        self.exec.init(mv);
        if mv.state == MovementState::ReadyWait {
            mv.state = MovementState::Wait;
            if is_end_wait(&mv.wait, now, pause, conditional) {
                self.exec.n = mv.steps;
            }
        }
        let io = (mv.state == MovementState::ReadyIo).then_some(mv.io);
        let distance = mv.distance;

        for (i, &d) in distance.iter().enumerate() {
            if d != 0 {
                self.enable_deadline_ms[i] = 0;
                self.set_enable_safe(i, LEVEL_MAX);
            }
        }
        if let Some(io) = io {
            debug!("I/O tool {} level {}", io.tool, io.level);
            self.board.io_control(io.tool, io.level);
            self.emit(StepperEvent::Io { tool: io.tool, level: io.level });
        }
    }

    /// Scale `timer` by the override level. A raised override never runs
    /// faster than `floor`, the interval the slowest moving axis allows.
    pub(crate) fn apply_override(&self, timer: Timer, floor: u64) -> Timer {
        match self.speed_override {
            SPEED_OVERRIDE_100 => timer,
            LEVEL_OFF => TIMER_MAX,
            level => {
                let scaled = round_mul_div(timer as u64, SPEED_OVERRIDE_100 as u64, level as u64);
                scaled.max(floor.min(timer as u64)).clamp(TIMER_MIN as u64, TIMER_MAX as u64) as Timer
            }
        }
    }

    // ─── Idle and Enable ────────────────────────────────────────────

    pub(crate) fn go_idle(&mut self) {
        self.timer_running = false;
        self.idle_since_ms = self.millis();
        debug!("Stepper idle at {:?}", self.current);
        self.emit(StepperEvent::Idle { elapsed: 0 });
    }

    fn continue_idle(&mut self) {
        let elapsed = self.millis().saturating_sub(self.idle_since_ms);
        self.emit(StepperEvent::Idle { elapsed: elapsed.min(Timer::MAX as u64) as Timer });
        self.check_enable_timeout();
    }

    fn arm_enable_timeout(&mut self, distance: &AxisArray<MDist>) {
        if self.idle_disable_ms == 0 {
            return;
        }
        let deadline = self.millis() + self.idle_disable_ms as u64;
        for (i, &d) in distance.iter().enumerate() {
            if d != 0 {
                self.enable_deadline_ms[i] = deadline;
            }
        }
    }

    fn check_enable_timeout(&mut self) {
        let now = self.millis();
        for axis in 0..MAX_AXES {
            let deadline = self.enable_deadline_ms[axis];
            if deadline != 0 && now >= deadline {
                self.enable_deadline_ms[axis] = 0;
                if self.set_enable_safe(axis, LEVEL_OFF) {
                    debug!("Axis {} disabled after idle timeout", axis);
                    self.emit(StepperEvent::Disable { axis });
                }
            }
        }
    }

    // ─── Blocking Waits ─────────────────────────────────────────────

    /// Called while a blocking operation waits; advances the engine by one tick.
    pub(crate) fn on_wait(&mut self, kind: WaitKind) {
        self.emit(StepperEvent::Wait(kind));
        self.tick();
    }

    pub(crate) fn wait_until_can_queue(&mut self) -> Result<(), MotionError> {
        while self.movements.is_full() {
            if self.speed_override == LEVEL_OFF {
                return Err(MotionError::Halted);
            }
            self.on_wait(WaitKind::MovementQueueFull);
        }
        // a fatal error latched while waiting empties the queue
        self.ensure_motion_allowed()
    }

    /// Block until every queued movement has been executed.
    ///
    /// Returns [`MotionError::Halted`] while the speed override is 0; the
    /// queue is kept.
    pub fn wait_busy(&mut self) -> Result<(), MotionError> {
        self.optimize_movement_queue(true);
        while self.is_busy() {
            if self.speed_override == LEVEL_OFF {
                return Err(MotionError::Halted);
            }
            self.on_wait(WaitKind::WaitBusyCall);
        }
        Ok(())
    }

    /// Run ticks until idle or `max_ticks` elapsed; returns the ticks run.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> u64 {
        self.optimize_movement_queue(true);
        let mut n = 0;
        while self.is_busy() && n < max_ticks {
            self.tick();
            n += 1;
        }
        n
    }

    // ─── Optimizer ──────────────────────────────────────────────────

    /// Re-plan the queue; deferred policy skips unless forced or full.
    pub fn optimize_movement_queue(&mut self, force: bool) {
        if self.optimize == OptimizePolicy::Deferred && !force && !self.movements.is_full() {
            return;
        }
        optimizer::optimize_queue(&mut self.movements, self.exec.n);
    }
}
