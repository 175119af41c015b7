//! The stepper engine: one context object per machine.
//!
//! ## Architecture
//!
//! ```text
//! move_abs / move_rel ──► movement queue ──► step buffer ──► tick() ──► StepperBoard
//!        (main)            (optimized)      (precomputed)    (timer)
//! ```
//!
//! | Stage | Owner | Notes |
//! |-------|-------|-------|
//! | Movement queue | main context | Look-ahead optimizer rewrites queued junctions |
//! | Step buffer | tick | One record per tick: step counts, directions, interval |
//! | `tick()` | timer | Emits one record, refills the buffer, returns the next interval |
//!
//! Blocking calls (`wait_busy`, a full queue, reference moves) drive
//! `tick()` themselves and advance the simulated clock, so the engine
//! runs deterministically without a hardware timer.
//!
//! ## Errors
//!
//! Operations return `Result<_, MotionError>` and also record the error in
//! the last-error slot. Critical errors latch the fatal slot: further
//! motion is refused until [`Stepper::resurrect`].

mod moves;
mod tick;

use crate::movement::{AxisLimits, ExecState, Movement, StepEntry};
use crate::queue::RingBuffer;
use crate::ramp::speed_to_timer;
use stepper_common::board::StepperBoard;
use stepper_common::consts::{
    LEVEL_MAX, MAX_AXES, MOVEMENT_BUFFER_SIZE, SPEED_OVERRIDE_100, STEP_BUFFER_SIZE,
    TIMER_FREQUENCY, TIMER_MAX,
};
use heapless::Vec as HVec;
use stepper_common::machine::config::{MachineConfig, OptimizePolicy, ReferenceType};
use stepper_common::machine::error::{MotionError, StepperFault};
use stepper_common::machine::event::StepperEvent;
use stepper_common::types::{AxisArray, AxisMask, MDist, SDist, StepRate, Timer};
use tracing::{debug, error, info, warn};

pub use tick::{TickOutcome, TickState};

/// Number of reference inputs (min and max per axis).
pub const REFERENCE_COUNT: usize = MAX_AXES * 2;

/// Reference input id of the min or max switch of `axis`.
#[inline]
pub const fn reference_id(axis: usize, to_min: bool) -> u8 {
    (axis * 2 + if to_min { 0 } else { 1 }) as u8
}

pub type EventHandler = Box<dyn FnMut(&StepperEvent) + Send>;

// ─── Stepper ────────────────────────────────────────────────────────

pub struct Stepper<B: StepperBoard> {
    pub(crate) board: B,
    pub(crate) axis_count: usize,
    pub(crate) limits: AxisLimits,

    pub(crate) movements: RingBuffer<Movement, MOVEMENT_BUFFER_SIZE>,
    pub(crate) step_buffer: RingBuffer<StepEntry, STEP_BUFFER_SIZE>,
    pub(crate) exec: ExecState,

    /// Position reached by emitted steps.
    pub(crate) current: AxisArray<SDist>,
    /// Position after all queued movements.
    pub(crate) calculated: AxisArray<SDist>,
    pub(crate) limit_min: AxisArray<SDist>,
    pub(crate) limit_max: AxisArray<SDist>,

    /// Direction of the last queued move per axis (backlash detection).
    pub(crate) last_direction: AxisMask,
    /// Direction lines as last driven (before inversion).
    pub(crate) applied_direction: AxisMask,
    pub(crate) invert_direction: AxisMask,
    pub(crate) backlash: AxisArray<MDist>,
    /// [`TIMER_MAX`] disables backlash compensation.
    pub(crate) timer_backlash: Timer,
    pub(crate) timer_max_default: Timer,
    pub(crate) ref_move_rate: AxisArray<StepRate>,
    pub(crate) move_away_steps: AxisArray<SDist>,
    pub(crate) reference_hit: [Option<u8>; REFERENCE_COUNT],
    pub(crate) reference_type: AxisArray<ReferenceType>,
    pub(crate) reference_sequence: HVec<usize, MAX_AXES>,
    pub(crate) init_position: AxisArray<SDist>,

    pub(crate) speed_override: u8,
    pub(crate) optimize: OptimizePolicy,
    pub(crate) limit_check: bool,
    pub(crate) check_reference: bool,
    pub(crate) wait_finish_move: bool,
    pub(crate) pause: bool,
    pub(crate) wait_conditional: bool,
    pub(crate) reference_active: bool,
    pub(crate) direction_settle: Timer,
    pub(crate) reference_debounce_ticks: u16,
    pub(crate) idle_disable_ms: u32,

    pub(crate) timer_running: bool,
    pub(crate) idle_since_ms: u64,
    pub(crate) enable_deadline_ms: AxisArray<u64>,

    /// Simulated time in timer ticks.
    pub(crate) clock: u64,
    pub(crate) tick_count: u64,
    pub(crate) total_steps: u64,

    pub(crate) last_error: Option<MotionError>,
    pub(crate) fatal: Option<MotionError>,
    pub(crate) faults: StepperFault,

    pub(crate) event_handler: Option<EventHandler>,
}

impl<B: StepperBoard> Stepper<B> {
    pub fn new(board: B, config: &MachineConfig) -> Self {
        let axis_count = config.axis_count().min(MAX_AXES);
        let mut limits = AxisLimits::uniform(
            config.max_step_rate,
            config.acc,
            config.dec,
            config.jerk_speed,
        );
        let mut limit_max = [0; MAX_AXES];
        let mut backlash = [0; MAX_AXES];
        let mut ref_move_rate = [config.ref_move_step_rate; MAX_AXES];
        let mut move_away_steps = [0; MAX_AXES];
        let mut reference_hit = [None; REFERENCE_COUNT];
        let mut invert_direction = AxisMask::empty();
        let mut reference_type = [ReferenceType::None; MAX_AXES];
        let mut init_position = [0; MAX_AXES];

        let or_default = |value: StepRate, default: StepRate| if value == 0 { default } else { value };
        for i in 0..axis_count {
            let axis = config.axis(i);
            limits.timer_max[i] = speed_to_timer(or_default(axis.max_step_rate, config.max_step_rate));
            limits.timer_acc[i] = speed_to_timer(or_default(axis.acc, config.acc));
            limits.timer_dec[i] = speed_to_timer(or_default(axis.dec, config.dec));
            limits.jerk[i] = or_default(axis.jerk, config.jerk_speed);
            ref_move_rate[i] = or_default(axis.ref_move_step_rate, config.ref_move_step_rate);
            limit_max[i] = axis.limit_max();
            backlash[i] = axis.backlash as MDist;
            move_away_steps[i] = axis.to_steps(config.move_away_from_reference).abs();
            reference_hit[reference_id(i, true) as usize] = axis.reference_hit_min;
            reference_hit[reference_id(i, false) as usize] = axis.reference_hit_max;
            invert_direction.set_axis(i, axis.invert_direction);
            reference_type[i] = axis.reference_type;
            init_position[i] = axis.to_steps(axis.init_position);
        }

        info!(
            "Stepper on board '{}': {} axes, optimize {:?}",
            board.name(),
            axis_count,
            config.optimize
        );

        Self {
            board,
            axis_count,
            limits,
            movements: RingBuffer::new(),
            step_buffer: RingBuffer::new(),
            exec: ExecState::default(),
            current: [0; MAX_AXES],
            calculated: [0; MAX_AXES],
            limit_min: [0; MAX_AXES],
            limit_max,
            last_direction: AxisMask::empty(),
            applied_direction: AxisMask::empty(),
            invert_direction,
            backlash,
            timer_backlash: speed_to_timer(config.backlash_step_rate.unwrap_or(config.max_step_rate)),
            timer_max_default: speed_to_timer(config.max_step_rate),
            ref_move_rate,
            move_away_steps,
            reference_hit,
            reference_type,
            reference_sequence: config.reference_sequence(),
            init_position,
            speed_override: config.speed_override,
            optimize: config.optimize,
            limit_check: config.limit_check,
            check_reference: config.check_reference,
            wait_finish_move: false,
            pause: false,
            wait_conditional: false,
            reference_active: false,
            direction_settle: config.direction_settle.max(1),
            reference_debounce_ticks: config.reference_debounce_ticks,
            idle_disable_ms: config.idle_disable_ms,
            timer_running: false,
            idle_since_ms: 0,
            enable_deadline_ms: [0; MAX_AXES],
            clock: 0,
            tick_count: 0,
            total_steps: 0,
            last_error: None,
            fatal: None,
            faults: StepperFault::empty(),
            event_handler: None,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn axis_count(&self) -> usize {
        self.axis_count
    }

    /// Machine position of emitted steps.
    pub fn current_position(&self) -> AxisArray<SDist> {
        self.current
    }

    pub fn current_position_axis(&self, axis: usize) -> SDist {
        self.current.get(axis).copied().unwrap_or_default()
    }

    /// Machine position after all queued movements.
    pub fn position(&self) -> AxisArray<SDist> {
        self.calculated
    }

    pub fn position_axis(&self, axis: usize) -> SDist {
        self.calculated.get(axis).copied().unwrap_or_default()
    }

    pub fn limit_min(&self, axis: usize) -> SDist {
        self.limit_min.get(axis).copied().unwrap_or_default()
    }

    pub fn limit_max(&self, axis: usize) -> SDist {
        self.limit_max.get(axis).copied().unwrap_or_default()
    }

    pub fn set_limit_max(&mut self, axis: usize, max: SDist) {
        if let Some(limit) = self.limit_max.get_mut(axis) {
            *limit = max;
        }
    }

    pub fn limits(&self) -> &AxisLimits {
        &self.limits
    }

    /// Default (fastest) step rate of a move without explicit rate.
    pub fn default_max_speed(&self) -> StepRate {
        crate::ramp::timer_to_speed(self.timer_max_default)
    }

    pub fn max_speed(&self, axis: usize) -> StepRate {
        let axis_max = self.limits.timer_max.get(axis).copied().unwrap_or(TIMER_MAX);
        crate::ramp::timer_to_speed(axis_max.max(self.timer_max_default))
    }

    pub fn is_busy(&self) -> bool {
        self.timer_running || !self.movements.is_empty() || !self.step_buffer.is_empty()
    }

    pub fn queued_movements(&self) -> usize {
        self.movements.count()
    }

    pub fn buffered_steps(&self) -> usize {
        self.step_buffer.count()
    }

    pub fn movement_queue(&self) -> &RingBuffer<Movement, MOVEMENT_BUFFER_SIZE> {
        &self.movements
    }

    /// Timer ticks elapsed on the simulated clock.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn millis(&self) -> u64 {
        self.clock * 1000 / TIMER_FREQUENCY as u64
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Main-axis steps of all queued moves since construction.
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn direction_up(&self) -> AxisMask {
        self.applied_direction
    }

    pub fn last_direction(&self) -> AxisMask {
        self.last_direction
    }

    // ─── Options ────────────────────────────────────────────────────

    pub fn set_limit_check(&mut self, on: bool) {
        self.limit_check = on;
    }

    pub fn limit_check(&self) -> bool {
        self.limit_check
    }

    pub fn set_check_reference(&mut self, on: bool) {
        self.check_reference = on;
    }

    pub fn check_reference(&self) -> bool {
        self.check_reference
    }

    /// Every queued move blocks until the queue is drained.
    pub fn set_wait_finish_move(&mut self, on: bool) {
        self.wait_finish_move = on;
    }

    pub fn set_optimize_policy(&mut self, policy: OptimizePolicy) {
        self.optimize = policy;
    }

    pub fn optimize_policy(&self) -> OptimizePolicy {
        self.optimize
    }

    pub fn set_backlash(&mut self, axis: usize, steps: MDist) {
        if let Some(b) = self.backlash.get_mut(axis) {
            *b = steps;
        }
    }

    /// Step rate of backlash moves; 0 disables compensation.
    pub fn set_backlash_speed(&mut self, rate: StepRate) {
        self.timer_backlash = if rate == 0 { TIMER_MAX } else { speed_to_timer(rate) };
    }

    pub fn is_backlash_enabled(&self) -> bool {
        self.timer_backlash != TIMER_MAX
    }

    pub fn set_wait_conditional(&mut self, on: bool) {
        self.wait_conditional = on;
    }

    pub fn is_pause_move(&self) -> bool {
        self.pause
    }

    // ─── Speed Override ─────────────────────────────────────────────

    /// Raw override level; [`SPEED_OVERRIDE_100`] is 100 %, 0 holds motion.
    pub fn set_speed_override(&mut self, level: u8) {
        if level != self.speed_override {
            debug!("Speed override {} -> {}", self.speed_override, level);
        }
        self.speed_override = level;
    }

    /// Override in percent; values above the level range are clamped.
    pub fn set_speed_override_percent(&mut self, percent: u16) {
        let level = (percent as u32 * SPEED_OVERRIDE_100 as u32 + 50) / 100;
        self.set_speed_override(level.min(u8::MAX as u32) as u8);
    }

    pub fn speed_override(&self) -> u8 {
        self.speed_override
    }

    pub fn speed_override_percent(&self) -> u16 {
        ((self.speed_override as u32 * 100 + SPEED_OVERRIDE_100 as u32 / 2) / SPEED_OVERRIDE_100 as u32) as u16
    }

    // ─── Errors and Events ──────────────────────────────────────────

    pub fn set_event_handler(&mut self, handler: EventHandler) {
        self.event_handler = Some(handler);
    }

    pub fn clear_event_handler(&mut self) {
        self.event_handler = None;
    }

    pub(crate) fn emit(&mut self, event: StepperEvent) {
        if let Some(handler) = self.event_handler.as_mut() {
            handler(&event);
        }
    }

    pub fn last_error(&self) -> Option<MotionError> {
        self.last_error
    }

    pub fn fatal_error(&self) -> Option<MotionError> {
        self.fatal
    }

    pub fn faults(&self) -> StepperFault {
        self.faults
    }

    pub fn is_error(&self) -> bool {
        self.last_error.is_some() || self.fatal.is_some()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Record `err`; critical errors latch the fatal slot and drop all
    /// queued motion.
    pub(crate) fn raise(&mut self, err: MotionError) -> MotionError {
        self.last_error = Some(err);
        self.faults |= err.fault();
        if err.is_fatal() {
            error!("Fatal: {}", err);
            self.fatal = Some(err);
            self.emit(StepperEvent::Fatal(err));
            self.abort_move();
        } else {
            warn!("{}", err);
            self.emit(StepperEvent::Error(err));
        }
        err
    }

    pub(crate) fn notify_info(&mut self, message: &'static str) {
        info!("{}", message);
        self.emit(StepperEvent::Info(message));
    }

    pub(crate) fn notify_warning(&mut self, message: &'static str) {
        warn!("{}", message);
        self.emit(StepperEvent::Warning(message));
    }

    pub(crate) fn ensure_motion_allowed(&self) -> Result<(), MotionError> {
        match self.fatal {
            Some(_) => Err(MotionError::FatalLocked),
            None => Ok(()),
        }
    }

    pub(crate) fn check_axis(&mut self, axis: usize) -> Result<(), MotionError> {
        if axis >= MAX_AXES {
            return Err(self.raise(MotionError::InvalidAxis(axis)));
        }
        Ok(())
    }

    /// Clear the fatal state after an emergency stop or critical error.
    pub fn resurrect(&mut self) {
        self.abort_move();
        if self.fatal.is_some() || !self.faults.is_empty() {
            info!("Resurrect: clearing {:?}", self.faults);
        }
        self.fatal = None;
        self.last_error = None;
        self.faults = StepperFault::empty();
    }

    // ─── Reference Inputs ───────────────────────────────────────────

    /// Configured hit value of a reference input; `None` = not wired.
    pub fn reference_hit_value(&self, reference_id: u8) -> Option<u8> {
        self.reference_hit.get(reference_id as usize).copied().flatten()
    }

    pub fn set_reference_hit_value(&mut self, reference_id: u8, value: Option<u8>) {
        if let Some(slot) = self.reference_hit.get_mut(reference_id as usize) {
            *slot = value;
        }
    }

    /// True if the switch `reference_id` reads its hit value.
    pub fn is_reference(&self, reference_id: u8) -> bool {
        match self.reference_hit_value(reference_id) {
            Some(hit) => self.board.reference_value(reference_id) == hit,
            None => false,
        }
    }

    pub fn is_any_reference(&self) -> bool {
        (0..REFERENCE_COUNT as u8).any(|id| self.is_reference(id))
    }

    // ─── Position ───────────────────────────────────────────────────

    /// Re-zero `axis` after the queue drained.
    pub fn set_position(&mut self, axis: usize, position: SDist) -> Result<(), MotionError> {
        self.check_axis(axis)?;
        self.wait_busy()?;
        debug!("Set position axis {} = {}", axis, position);
        self.current[axis] = position;
        self.calculated[axis] = position;
        Ok(())
    }

    // ─── Enable ─────────────────────────────────────────────────────

    pub(crate) fn set_enable_safe(&mut self, axis: usize, level: u8) -> bool {
        if self.board.enable(axis) != level {
            self.board.set_enable(axis, level);
            return true;
        }
        false
    }

    pub fn set_enable(&mut self, axis: usize, level: u8) -> Result<(), MotionError> {
        self.check_axis(axis)?;
        self.enable_deadline_ms[axis] = 0;
        self.set_enable_safe(axis, level);
        Ok(())
    }

    pub fn enable_all(&mut self) {
        for i in 0..self.axis_count.min(MAX_AXES) {
            self.enable_deadline_ms[i] = 0;
            self.set_enable_safe(i, LEVEL_MAX);
        }
    }
}
