//! Reference (homing) moves.
//!
//! ## Lifecycle
//!
//! | Phase | Motion | Leaves when |
//! |-------|--------|-------------|
//! | `MoveAway` | Away from the switch by `dist_if_ref_on` | Switch released (only if it was on) |
//! | `Seeking` | Toward the switch, up to `max_dist` | Switch reads its hit value |
//! | `SwitchHit` | Still seeking | Hit value stable for the debounce count |
//! | `LeaveSwitch` | Away from the switch | Switch released and stable |
//! | `BackOff` | Away by `move_away_from_reference` | Move finished |
//! | `Done` | - | Position set to the axis limit |
//!
//! Any phase that runs out of travel ends in `Failed`: the queue is
//! aborted, the position is left untouched and `ReferenceNotFound` is
//! latched as a fatal error.
//!
//! While referencing, limit checks, switch checks and backlash
//! compensation are suspended and restored afterwards.

use crate::stepper::{Stepper, reference_id};
use stepper_common::board::StepperBoard;
use stepper_common::consts::{LEVEL_OFF, TIMER_MAX};
use stepper_common::machine::config::ReferenceType;
use stepper_common::machine::error::MotionError;
use stepper_common::machine::event::WaitKind;
use stepper_common::types::{SDist, StepRate};
use tracing::{debug, info, warn};

// ─── Reference Phases ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferencePhase {
    #[default]
    Idle,
    MoveAway,
    Seeking,
    SwitchHit,
    LeaveSwitch,
    BackOff,
    Done,
    Failed,
}

/// Parameters of one reference move. Distances are in steps, 0 = derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceRequest {
    pub axis: usize,
    pub to_min: bool,
    /// 0 = the axis reference step rate.
    pub rate: StepRate,
    /// Maximum travel toward the switch; 0 = 110 % of the axis size.
    pub max_dist: SDist,
    /// Back-off after the switch released; `None` = configured distance.
    pub dist_to_ref: Option<SDist>,
    /// Travel away from an already active switch; 0 = `max_dist / 8`.
    pub dist_if_ref_on: SDist,
}

impl ReferenceRequest {
    pub fn new(axis: usize, to_min: bool) -> Self {
        Self { axis, to_min, rate: 0, max_dist: 0, dist_to_ref: None, dist_if_ref_on: 0 }
    }

    pub fn reference_id(&self) -> u8 {
        reference_id(self.axis, self.to_min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceOutcome {
    pub axis: usize,
    pub phase: ReferencePhase,
    /// Machine position after the move.
    pub position: SDist,
    /// Steps travelled in the back-off phase.
    pub backed_off: SDist,
}

// ─── Supervisor ─────────────────────────────────────────────────────

/// Phase and switch debounce of one reference move.
#[derive(Debug, Clone)]
pub struct ReferenceSupervisor {
    phase: ReferencePhase,
    reference_id: u8,
    debounce_ticks: u16,
    stable: u16,
}

impl ReferenceSupervisor {
    pub fn new(reference_id: u8, debounce_ticks: u16) -> Self {
        Self { phase: ReferencePhase::Idle, reference_id, debounce_ticks: debounce_ticks.max(1), stable: 0 }
    }

    #[inline]
    pub fn phase(&self) -> ReferencePhase {
        self.phase
    }

    pub fn enter(&mut self, phase: ReferencePhase) {
        debug!("Reference {}: {:?} -> {:?}", self.reference_id, self.phase, phase);
        self.phase = phase;
        self.stable = 0;
    }

    /// Feed one switch reading; true once `wanted` was read for the
    /// debounce count in a row.
    pub fn poll(&mut self, switch_on: bool, wanted: bool) -> bool {
        if switch_on != wanted {
            self.stable = 0;
            return false;
        }
        if wanted && self.phase == ReferencePhase::Seeking {
            self.phase = ReferencePhase::SwitchHit;
        }
        self.stable += 1;
        self.stable >= self.debounce_ticks
    }
}

// ─── Engine Operations ──────────────────────────────────────────────

impl<B: StepperBoard> Stepper<B> {
    /// Drive `axis` to its switch and set the position to the axis limit.
    pub fn move_reference(&mut self, request: ReferenceRequest) -> Result<ReferenceOutcome, MotionError> {
        self.check_axis(request.axis)?;
        self.ensure_motion_allowed()?;
        self.wait_busy()?;

        let saved = (self.limit_check, self.wait_finish_move, self.check_reference, self.timer_backlash);
        self.limit_check = false;
        self.wait_finish_move = false;
        self.check_reference = false;
        self.timer_backlash = TIMER_MAX;
        self.reference_active = true;

        let result = self.run_reference(&request);

        self.reference_active = false;
        (self.limit_check, self.wait_finish_move, self.check_reference, self.timer_backlash) = saved;
        result
    }

    fn run_reference(&mut self, req: &ReferenceRequest) -> Result<ReferenceOutcome, MotionError> {
        let axis = req.axis;
        let id = req.reference_id();
        let rate = if req.rate == 0 { self.ref_move_rate[axis] } else { req.rate };

        let mut max_dist = req.max_dist.abs();
        if max_dist == 0 {
            let size = self.limit_max[axis] as i64 - self.limit_min[axis] as i64;
            max_dist = (size * 11 / 10).min(SDist::MAX as i64) as SDist;
        }
        let mut dist_if_on = req.dist_if_ref_on.abs();
        if dist_if_on == 0 {
            dist_if_on = max_dist / 8;
        }
        let mut dist_to_ref = req.dist_to_ref.unwrap_or(self.move_away_steps[axis]).abs();

        // toward min is the negative direction
        if req.to_min {
            max_dist = -max_dist;
        } else {
            dist_if_on = -dist_if_on;
            dist_to_ref = -dist_to_ref;
        }

        let mut sup = ReferenceSupervisor::new(id, self.reference_debounce_ticks);
        info!("Reference axis {} toward {}", axis, if req.to_min { "min" } else { "max" });

        if self.is_reference(id) {
            sup.enter(ReferencePhase::MoveAway);
            self.notify_info("IsReference is on");
            self.move_rel_axis(axis, dist_if_on, rate)?;
            if !self.move_until(&mut sup, false)? {
                return self.reference_failed(axis, &mut sup);
            }
        }
        if self.is_reference(id) {
            return self.reference_failed(axis, &mut sup);
        }

        sup.enter(ReferencePhase::Seeking);
        self.move_rel_axis(axis, max_dist, rate)?;
        if !self.move_until(&mut sup, true)? {
            return self.reference_failed(axis, &mut sup);
        }

        sup.enter(ReferencePhase::LeaveSwitch);
        self.move_rel_axis(axis, dist_if_on, rate)?;
        if !self.move_until(&mut sup, false)? {
            return self.reference_failed(axis, &mut sup);
        }

        sup.enter(ReferencePhase::BackOff);
        let before = self.current[axis];
        if dist_to_ref != 0 {
            self.move_rel_axis(axis, dist_to_ref, rate)?;
            self.wait_busy()?;
        }
        let backed_off = (self.current[axis] - before).abs();

        let position = if req.to_min { self.limit_min[axis] } else { self.limit_max[axis] };
        self.set_position(axis, position)?;
        sup.enter(ReferencePhase::Done);
        info!("Reference axis {} done, position {}", axis, position);

        Ok(ReferenceOutcome { axis, phase: sup.phase(), position, backed_off })
    }

    fn reference_failed(
        &mut self,
        axis: usize,
        sup: &mut ReferenceSupervisor,
    ) -> Result<ReferenceOutcome, MotionError> {
        sup.enter(ReferencePhase::Failed);
        self.abort_move();
        warn!("MoveReference failed: axis {}", axis);
        Err(self.raise(MotionError::ReferenceNotFound { axis }))
    }

    /// Run the queue until the switch reads `wanted` (debounced), then
    /// abort the remaining motion. False if the queue drained first.
    fn move_until(&mut self, sup: &mut ReferenceSupervisor, wanted: bool) -> Result<bool, MotionError> {
        let id = sup.reference_id;
        while self.is_busy() {
            if sup.poll(self.is_reference(id), wanted) {
                self.abort_move();
                return Ok(true);
            }
            if self.speed_override == LEVEL_OFF {
                return Err(MotionError::Halted);
            }
            self.on_wait(WaitKind::WaitReference);
        }
        Ok(false)
    }

    /// Move away from `reference_id` if its switch is on. True if it is off.
    pub fn move_away_from_reference(
        &mut self,
        axis: usize,
        to_min: bool,
        rate: StepRate,
    ) -> Result<bool, MotionError> {
        self.check_axis(axis)?;
        let id = reference_id(axis, to_min);
        if self.is_reference(id) {
            self.notify_info("IsReference is on");
            let saved = self.check_reference;
            self.check_reference = false;
            let size = self.limit_max[axis] as i64 - self.limit_min[axis] as i64;
            let dist = (size * 11 / 10 / 8).min(SDist::MAX as i64) as SDist;
            let result = self.move_rel_axis(axis, if to_min { dist } else { -dist }, rate);
            let mut sup = ReferenceSupervisor::new(id, self.reference_debounce_ticks);
            let released = match result {
                Ok(()) => self.move_until(&mut sup, false),
                Err(e) => Err(e),
            };
            self.check_reference = saved;
            if !released? {
                return Ok(false);
            }
        }
        Ok(!self.is_reference(id))
    }

    /// Reference all axes in the configured order. Axes without a switch
    /// are set to their init position.
    pub fn go_to_reference(&mut self) -> Result<Vec<ReferenceOutcome>, MotionError> {
        let mut outcomes = Vec::new();
        let sequence = self.reference_sequence.clone();
        for &axis in sequence.iter() {
            let to_min = match self.reference_type[axis] {
                ReferenceType::Min => true,
                ReferenceType::Max => false,
                ReferenceType::None => continue,
            };
            outcomes.push(self.move_reference(ReferenceRequest::new(axis, to_min))?);
        }
        for axis in 0..self.axis_count() {
            if self.reference_type[axis] == ReferenceType::None {
                let position = self.init_position[axis];
                self.set_position(axis, position)?;
            }
        }
        Ok(outcomes)
    }
}
