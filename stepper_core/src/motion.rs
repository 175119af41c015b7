//! Motion control: logical moves in mm1000 on top of the stepper engine.
//!
//! ## Move Pipeline
//!
//! | Step | Work |
//! |------|------|
//! | 1 | Split into sub-moves if the transform asks for it |
//! | 2 | Transform every target to machine mm1000 (all or nothing) |
//! | 3 | Scale to steps with the axis `steps_per_mm1000` |
//! | 4 | Correct the feed rate for the Euclidean distance |
//! | 5 | Convert the feed rate to the step rate of the dominant axis |
//! | 6 | Queue on the engine; on failure resync from the machine position |
//!
//! Feed rates are mm1000/min, step rates steps/s.

use crate::kinematics::{Transform, create_transform};
use crate::ramp::{isqrt_round, round_mul_div};
use crate::stepper::Stepper;
use std::f64::consts::PI;
use stepper_common::board::StepperBoard;
use stepper_common::consts::{MAX_AXES, STEPRATE_MAX};
use stepper_common::machine::config::MachineConfig;
use stepper_common::machine::error::MotionError;
use stepper_common::types::{Axis, AxisArray, FeedRate, Mm1000, SDist, StepRate};
use tracing::debug;

/// Arc segments per full circle: `SEGMENTS_K * radius + SEGMENTS_D` (radius in mm1000).
const SEGMENTS_K: f64 = 25.0 / 1000.0;
const SEGMENTS_D: f64 = 18.0;

/// Largest segment angle advanced by the small-angle rotation before an
/// exact recomputation.
const ARC_CORRECTION: f64 = 10.0 * PI / 180.0;

/// `round(value * mul / div)` for signed values.
fn round_mul_div_signed(value: i64, mul: i64, div: i64) -> i64 {
    let magnitude = round_mul_div(value.unsigned_abs(), mul.unsigned_abs(), div.unsigned_abs()) as i64;
    if (value < 0) != (mul < 0) { -magnitude } else { magnitude }
}

pub struct MotionControl<B: StepperBoard> {
    stepper: Stepper<B>,
    transform: Box<dyn Transform>,
    steps_per_mm1000: AxisArray<f32>,
    /// Logical position after all queued moves.
    current: AxisArray<Mm1000>,
}

impl<B: StepperBoard> MotionControl<B> {
    pub fn new(stepper: Stepper<B>, config: &MachineConfig) -> Self {
        let transform = create_transform(config);
        Self::with_transform(stepper, config, transform)
    }

    pub fn with_transform(stepper: Stepper<B>, config: &MachineConfig, transform: Box<dyn Transform>) -> Self {
        let steps_per_mm1000 = std::array::from_fn(|i| config.axis(i).steps_per_mm1000);
        debug!("Motion control with {} transform", transform.name());
        let mut mc = Self { stepper, transform, steps_per_mm1000, current: [0; MAX_AXES] };
        mc.set_position_from_machine();
        mc
    }

    pub fn stepper(&self) -> &Stepper<B> {
        &self.stepper
    }

    pub fn stepper_mut(&mut self) -> &mut Stepper<B> {
        &mut self.stepper
    }

    pub fn into_stepper(self) -> Stepper<B> {
        self.stepper
    }

    pub fn transform(&self) -> &dyn Transform {
        self.transform.as_ref()
    }

    /// Replace the transform and resync the logical position.
    pub fn set_transform(&mut self, transform: Box<dyn Transform>) {
        self.transform = transform;
        self.set_position_from_machine();
    }

    // ─── Positions ──────────────────────────────────────────────────

    pub fn positions(&self) -> AxisArray<Mm1000> {
        self.current
    }

    pub fn position(&self, axis: usize) -> Mm1000 {
        self.current.get(axis).copied().unwrap_or_default()
    }

    /// Logical position of a machine position [steps].
    pub fn logical_position(&self, machine: &AxisArray<SDist>) -> AxisArray<Mm1000> {
        let mm1000 = std::array::from_fn(|i| self.to_mm1000(i, machine[i]));
        self.transform.from_machine(&mm1000)
    }

    /// Recompute the logical position from the engine's queued position.
    pub fn set_position_from_machine(&mut self) {
        self.current = self.logical_position(&self.stepper.position());
    }

    // ─── Unit Conversion ────────────────────────────────────────────

    pub fn to_machine(&self, axis: usize, mm1000: Mm1000) -> SDist {
        let steps_per = self.steps_per_mm1000.get(axis).copied().unwrap_or(1.0) as f64;
        (mm1000 as f64 * steps_per).round() as SDist
    }

    pub fn to_mm1000(&self, axis: usize, steps: SDist) -> Mm1000 {
        let steps_per = self.steps_per_mm1000.get(axis).copied().unwrap_or(1.0) as f64;
        (steps as f64 / steps_per).round() as Mm1000
    }

    /// Step rate of `axis` for a feed rate; at least 1, at most [`STEPRATE_MAX`].
    pub fn feed_rate_to_step_rate(&self, axis: usize, feed_rate: FeedRate) -> StepRate {
        let steps = self.to_machine(axis, feed_rate.saturating_abs() / 60);
        steps.clamp(1, STEPRATE_MAX as SDist) as StepRate
    }

    pub fn step_rate_to_feed_rate(&self, axis: usize, step_rate: StepRate) -> FeedRate {
        let per_min = (step_rate as i64 * 60).min(SDist::MAX as i64) as SDist;
        self.to_mm1000(axis, per_min).max(1)
    }

    /// `feed_rate` limited to the fastest feed `axis` can do.
    pub fn max_feed_rate(&self, axis: usize, feed_rate: FeedRate) -> FeedRate {
        feed_rate.min(self.step_rate_to_feed_rate(axis, self.stepper.max_speed(axis)))
    }

    /// Feed rate of the dominant axis so that the tool path runs at
    /// `feed_rate`. A negative feed rate is taken as is.
    pub fn feed_rate(&self, to: &AxisArray<Mm1000>, feed_rate: FeedRate) -> FeedRate {
        if feed_rate < 0 {
            return feed_rate;
        }
        let mut max_dist = 0u64;
        let mut sum = 0u64;
        let mut axes = 0;
        for (i, &target) in to.iter().enumerate() {
            let dist = target.abs_diff(self.current[i]) as u64;
            if dist != 0 {
                axes += 1;
                max_dist = max_dist.max(dist);
                sum += dist * dist;
            }
        }
        if axes < 2 {
            return feed_rate;
        }
        let euclid = isqrt_round(sum);
        if euclid == 0 || euclid == max_dist {
            return feed_rate;
        }
        round_mul_div(feed_rate as u64, max_dist, euclid).min(FeedRate::MAX as u64) as FeedRate
    }

    fn step_rate(&self, to: &AxisArray<Mm1000>, to_machine: &AxisArray<SDist>, feed_rate: FeedRate) -> StepRate {
        let machine = self.stepper.position();
        let mut dominant = 0;
        let mut max_steps = 0u64;
        let mut max_logical = 0u64;
        for i in 0..MAX_AXES {
            let steps = to_machine[i].abs_diff(machine[i]) as u64;
            if steps > max_steps {
                max_steps = steps;
                dominant = i;
            }
            max_logical = max_logical.max(to[i].abs_diff(self.current[i]) as u64);
        }

        if self.transform.scales_step_rate() && max_logical != 0 {
            // machine units are not mm1000: scale by the distance ratio
            let scaled = (feed_rate as f64 * max_steps as f64 / max_logical as f64) as FeedRate;
            return self.feed_rate_to_step_rate(0, scaled);
        }
        self.feed_rate_to_step_rate(dominant, feed_rate)
    }

    // ─── Moves ──────────────────────────────────────────────────────

    /// Move to the logical position `to`.
    ///
    /// All sub-move targets are transformed and range checked before
    /// anything is queued: an unreachable or out-of-range target leaves
    /// queue and position untouched.
    pub fn move_abs(&mut self, to: &AxisArray<Mm1000>, feed_rate: FeedRate) -> Result<(), MotionError> {
        let segments = self.split(to);
        let mut machine = Vec::with_capacity(segments.len());
        for target in &segments {
            match self.transform.to_machine(target) {
                Ok(m) => machine.push(m),
                Err(err) => return Err(self.stepper.raise(err)),
            }
        }

        let steps: Vec<AxisArray<SDist>> = machine
            .iter()
            .map(|m| std::array::from_fn(|i| self.to_machine(i, m[i])))
            .collect();
        self.stepper.ensure_motion_allowed()?;
        for target in &steps {
            if let Err(err) = self.stepper.check_range(&target.map(|s| s as i64)) {
                // the fatal error dropped whatever was still queued
                self.set_position_from_machine();
                return Err(err);
            }
        }

        for (target, steps) in segments.iter().zip(&steps) {
            let feed = self.feed_rate(target, feed_rate);
            let rate = self.step_rate(target, steps, feed);
            if let Err(err) = self.stepper.move_abs(steps, rate) {
                self.set_position_from_machine();
                return Err(err);
            }
            self.current = *target;
        }
        Ok(())
    }

    /// Targets of the sub-moves, the last one being `to`.
    fn split(&self, to: &AxisArray<Mm1000>) -> Vec<AxisArray<Mm1000>> {
        let total: AxisArray<i64> = std::array::from_fn(|i| to[i] as i64 - self.current[i] as i64);
        let max_dist = total.iter().map(|d| d.unsigned_abs()).max().unwrap_or(0) as i64;

        let move_count = match self.transform.split_move_dist() {
            Some(split) if split > 0 && max_dist > split as i64 => (max_dist as u64).div_ceil(split as u64) as i64,
            _ => 1,
        };
        if move_count > 1 {
            debug!("Split move into {} segments", move_count);
        }

        (1..=move_count)
            .rev()
            .map(|j| {
                std::array::from_fn(|i| {
                    let remaining = round_mul_div_signed(total[i], j - 1, move_count);
                    (to[i] as i64 - remaining) as Mm1000
                })
            })
            .collect()
    }

    pub fn move_rel(&mut self, delta: &AxisArray<Mm1000>, feed_rate: FeedRate) -> Result<(), MotionError> {
        let to = std::array::from_fn(|i| self.current[i].saturating_add(delta[i]));
        self.move_abs(&to, feed_rate)
    }

    /// Move the listed axes to absolute positions; others stay.
    pub fn move_abs_ex(&mut self, feed_rate: FeedRate, targets: &[(Axis, Mm1000)]) -> Result<(), MotionError> {
        let mut to = self.current;
        for &(axis, value) in targets {
            to[axis.index()] = value;
        }
        self.move_abs(&to, feed_rate)
    }

    /// Move the listed axes by relative distances; others stay.
    pub fn move_rel_ex(&mut self, feed_rate: FeedRate, deltas: &[(Axis, Mm1000)]) -> Result<(), MotionError> {
        let mut to = self.current;
        for &(axis, delta) in deltas {
            to[axis.index()] = to[axis.index()].saturating_add(delta);
        }
        self.move_abs(&to, feed_rate)
    }

    /// Arc in the plane `axis_0`/`axis_1` around the center at
    /// `offset` from the current position; other axes move linearly.
    /// Start equal to end is a full circle.
    #[allow(clippy::too_many_arguments)]
    pub fn arc(
        &mut self,
        to: &AxisArray<Mm1000>,
        offset0: Mm1000,
        offset1: Mm1000,
        axis_0: Axis,
        axis_1: Axis,
        clockwise: bool,
        feed_rate: FeedRate,
    ) -> Result<(), MotionError> {
        let (a0, a1) = (axis_0.index(), axis_1.index());
        let mut current = self.current;
        let center0 = current[a0] as f64 + offset0 as f64;
        let center1 = current[a1] as f64 + offset1 as f64;

        let mut linear: AxisArray<i64> = [0; MAX_AXES];
        let mut linear_travel_max = 0u64;
        for x in 0..MAX_AXES {
            if x != a0 && x != a1 {
                linear[x] = to[x] as i64 - current[x] as i64;
                linear_travel_max = linear_travel_max.max(linear[x].unsigned_abs());
            }
        }

        let radius = (offset0 as f64).hypot(offset1 as f64);
        let mut r0 = -(offset0 as f64);
        let mut r1 = -(offset1 as f64);
        let rt0 = to[a0] as f64 - center0;
        let rt1 = to[a1] as f64 - center1;

        let mut angular_travel = (r0 * rt1 - r1 * rt0).atan2(r0 * rt0 + r1 * rt1);
        if angular_travel == 0.0 {
            angular_travel = if clockwise { -2.0 * PI } else { 2.0 * PI };
        } else {
            if angular_travel < 0.0 {
                angular_travel += 2.0 * PI;
            }
            if clockwise {
                angular_travel -= 2.0 * PI;
            }
        }

        if (angular_travel * radius).hypot(linear_travel_max as f64) < 1.0 {
            return Ok(());
        }

        let segments = ((SEGMENTS_K * radius + SEGMENTS_D) * angular_travel / (2.0 * PI)).floor().abs() as i64;
        debug!(
            "Arc r={:.0} travel={:.3} rad, {} segments",
            radius, angular_travel, segments
        );

        if segments > 1 {
            let theta = angular_travel / segments as f64;
            let correction_every = (ARC_CORRECTION / theta).abs().min(u8::MAX as f64) as u8;
            let cos_t = 1.0 - 0.5 * theta * theta;
            let sin_t = theta;
            let mut count = 0u8;

            for i in 1..segments {
                if count < correction_every {
                    let ri = r0 * sin_t + r1 * cos_t;
                    r0 = r0 * cos_t - r1 * sin_t;
                    r1 = ri;
                    count += 1;
                } else {
                    let (sin_ti, cos_ti) = (i as f64 * theta).sin_cos();
                    r0 = -(offset0 as f64) * cos_ti + offset1 as f64 * sin_ti;
                    r1 = -(offset0 as f64) * sin_ti - offset1 as f64 * cos_ti;
                    count = 0;
                }

                current[a0] = (center0 + r0).round() as Mm1000;
                current[a1] = (center1 + r1).round() as Mm1000;
                for x in 0..MAX_AXES {
                    if linear[x] != 0 {
                        current[x] = (to[x] as i64 - round_mul_div_signed(linear[x], segments - i, segments)) as Mm1000;
                    }
                }
                self.move_abs(&current, feed_rate)?;
            }
        }

        self.move_abs(to, feed_rate)
    }

    // ─── Engine Shortcuts ───────────────────────────────────────────

    /// Home all axes in the configured order and resync the logical position.
    pub fn go_to_reference(&mut self) -> Result<(), MotionError> {
        let result = self.stepper.go_to_reference();
        self.set_position_from_machine();
        result.map(|_| ())
    }

    pub fn wait_busy(&mut self) -> Result<(), MotionError> {
        self.stepper.wait_busy()
    }
}
