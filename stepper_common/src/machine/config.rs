//! Machine and axis configuration records.
//!
//! Loaded once at startup from the `[machine]` table of a TOML file and
//! read-only afterwards. Step based limits derive from the mm1000 values
//! through `steps_per_mm1000`.
//!
//! ```toml
//! [machine]
//! kinematics = "cartesian"
//! max_step_rate = 28000
//! optimize = "deferred"
//!
//! [[machine.axes]]
//! size = 200000
//! steps_per_mm1000 = 3.2
//! reference_type = "min"
//! reference_sequence = 0
//! reference_hit_min = 1
//! ```

use crate::consts::{
    DEFAULT_ACC, DEFAULT_DEC, DEFAULT_DIRECTION_SETTLE, DEFAULT_JERK_SPEED,
    DEFAULT_MAX_STEPRATE, DEFAULT_REFMOVE_STEPRATE, MAX_AXES, MOVE_AWAY_FROM_REF_MM1000,
    SPEED_OVERRIDE_100, STEPRATE_MAX, TIMEOUT_SET_IDLE_MS,
};
use crate::types::{Mm1000, SDist, StepRate, Timer};
use heapless::Vec as HVec;
use serde::{Deserialize, Serialize};

// ─── Enumerations ───────────────────────────────────────────────────

/// Where an axis finds its reference switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    /// No switch; position set to `init_position` when homing.
    #[default]
    None,
    Min,
    Max,
}

/// When the look-ahead optimizer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizePolicy {
    /// After every enqueue.
    #[default]
    Immediate,
    /// When the queue is full, and always before draining.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KinematicsKind {
    #[default]
    Cartesian,
    Delta,
}

// ─── Axis ───────────────────────────────────────────────────────────

/// Static configuration of one axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Travel [mm1000].
    #[serde(default = "default_size")]
    pub size: Mm1000,
    #[serde(default = "default_steps_per_mm1000")]
    pub steps_per_mm1000: f32,
    #[serde(default)]
    pub reference_type: ReferenceType,
    /// Slot in the homing order; `None` = not homed by `go_to_reference`.
    #[serde(default)]
    pub reference_sequence: Option<u8>,
    /// Board level meaning "min switch hit"; `None` = switch unused.
    #[serde(default)]
    pub reference_hit_min: Option<u8>,
    #[serde(default)]
    pub reference_hit_max: Option<u8>,
    /// Position applied when homing an axis without switch [mm1000].
    #[serde(default)]
    pub init_position: Mm1000,
    /// Axis limits; 0 = machine default.
    #[serde(default)]
    pub max_step_rate: StepRate,
    #[serde(default)]
    pub acc: StepRate,
    #[serde(default)]
    pub dec: StepRate,
    #[serde(default)]
    pub jerk: StepRate,
    #[serde(default)]
    pub ref_move_step_rate: StepRate,
    /// Probe travel [mm1000].
    #[serde(default)]
    pub probe_size: Mm1000,
    /// Backlash compensation [steps]; 0 = off.
    #[serde(default)]
    pub backlash: u16,
    #[serde(default)]
    pub invert_direction: bool,
}

fn default_size() -> Mm1000 {
    100_000
}
fn default_steps_per_mm1000() -> f32 {
    1.0
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            steps_per_mm1000: default_steps_per_mm1000(),
            reference_type: ReferenceType::None,
            reference_sequence: None,
            reference_hit_min: None,
            reference_hit_max: None,
            init_position: 0,
            max_step_rate: 0,
            acc: 0,
            dec: 0,
            jerk: 0,
            ref_move_step_rate: 0,
            probe_size: 0,
            backlash: 0,
            invert_direction: false,
        }
    }
}

impl AxisConfig {
    /// Convert mm1000 to steps of this axis (rounded).
    #[inline]
    pub fn to_steps(&self, mm1000: Mm1000) -> SDist {
        (mm1000 as f64 * self.steps_per_mm1000 as f64).round() as SDist
    }

    /// Convert steps of this axis to mm1000 (rounded).
    #[inline]
    pub fn to_mm1000(&self, steps: SDist) -> Mm1000 {
        (steps as f64 / self.steps_per_mm1000 as f64).round() as Mm1000
    }

    /// Upper travel limit [steps].
    pub fn limit_max(&self) -> SDist {
        self.to_steps(self.size)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.size <= 0 {
            return Err(format!("size must be > 0, got {}", self.size));
        }
        if !(self.steps_per_mm1000 > 0.0 && self.steps_per_mm1000.is_finite()) {
            return Err(format!(
                "steps_per_mm1000 must be > 0, got {}",
                self.steps_per_mm1000
            ));
        }
        if self.max_step_rate > STEPRATE_MAX {
            return Err(format!(
                "max_step_rate {} exceeds {STEPRATE_MAX}",
                self.max_step_rate
            ));
        }
        match self.reference_type {
            ReferenceType::Min if self.reference_hit_min.is_none() => {
                Err("reference_type = min requires reference_hit_min".to_string())
            }
            ReferenceType::Max if self.reference_hit_max.is_none() => {
                Err("reference_type = max requires reference_hit_max".to_string())
            }
            _ => Ok(()),
        }
    }
}

// ─── Delta Geometry ─────────────────────────────────────────────────

/// Arm geometry of the Delta ("iRobot") machine [mm1000].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeltaConfig {
    /// Lower arm segment.
    #[serde(default = "default_segment1")]
    pub segment1: Mm1000,
    /// Upper arm segment.
    #[serde(default = "default_segment2")]
    pub segment2: Mm1000,
    /// Height of the shoulder joint above the base plane.
    #[serde(default = "default_height")]
    pub height: Mm1000,
    /// Horizontal offset of the shoulder joint from the yaw axis.
    #[serde(default = "default_eps")]
    pub eps: Mm1000,
    /// Maximum Cartesian length of one sub-move.
    #[serde(default = "default_split")]
    pub split_move_dist: Mm1000,
}

fn default_segment1() -> Mm1000 {
    140_000
}
fn default_segment2() -> Mm1000 {
    152_000
}
fn default_height() -> Mm1000 {
    105_000
}
fn default_eps() -> Mm1000 {
    30_000
}
fn default_split() -> Mm1000 {
    10_000
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            segment1: default_segment1(),
            segment2: default_segment2(),
            height: default_height(),
            eps: default_eps(),
            split_move_dist: default_split(),
        }
    }
}

// ─── Machine ────────────────────────────────────────────────────────

/// Machine wide motion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub kinematics: KinematicsKind,
    #[serde(default = "default_max_step_rate")]
    pub max_step_rate: StepRate,
    #[serde(default = "default_acc")]
    pub acc: StepRate,
    #[serde(default = "default_dec")]
    pub dec: StepRate,
    #[serde(default = "default_jerk_speed")]
    pub jerk_speed: StepRate,
    #[serde(default = "default_ref_move_step_rate")]
    pub ref_move_step_rate: StepRate,
    /// Back-off after the switch released [mm1000].
    #[serde(default = "default_move_away")]
    pub move_away_from_reference: Mm1000,
    #[serde(default = "default_true")]
    pub limit_check: bool,
    /// Fatal error if a switch triggers during a normal move.
    #[serde(default = "default_true")]
    pub check_reference: bool,
    /// Speed override level (128 = 100 %).
    #[serde(default = "default_override")]
    pub speed_override: u8,
    #[serde(default)]
    pub optimize: OptimizePolicy,
    /// Direction setup time before a step after reversal [timer ticks].
    #[serde(default = "default_direction_settle")]
    pub direction_settle: Timer,
    /// Consecutive equal switch readings required to accept a level.
    #[serde(default = "default_debounce")]
    pub reference_debounce_ticks: u16,
    /// Idle time before axes are disabled [ms]; 0 = never.
    #[serde(default = "default_idle_timeout")]
    pub idle_disable_ms: u32,
    /// Step rate of backlash moves; `None` = axis maximum.
    #[serde(default)]
    pub backlash_step_rate: Option<StepRate>,
    /// Feed rate used when none is given [mm1000/min].
    #[serde(default = "default_feed_rate")]
    pub default_feed_rate: i32,
    #[serde(default)]
    pub delta: DeltaConfig,
    #[serde(default)]
    pub axes: Vec<AxisConfig>,
}

fn default_max_step_rate() -> StepRate {
    DEFAULT_MAX_STEPRATE
}
fn default_acc() -> StepRate {
    DEFAULT_ACC
}
fn default_dec() -> StepRate {
    DEFAULT_DEC
}
fn default_jerk_speed() -> StepRate {
    DEFAULT_JERK_SPEED
}
fn default_ref_move_step_rate() -> StepRate {
    DEFAULT_REFMOVE_STEPRATE
}
fn default_move_away() -> Mm1000 {
    MOVE_AWAY_FROM_REF_MM1000
}
fn default_true() -> bool {
    true
}
fn default_override() -> u8 {
    SPEED_OVERRIDE_100
}
fn default_direction_settle() -> Timer {
    DEFAULT_DIRECTION_SETTLE
}
fn default_debounce() -> u16 {
    4
}
fn default_idle_timeout() -> u32 {
    TIMEOUT_SET_IDLE_MS
}
fn default_feed_rate() -> i32 {
    500_000
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            kinematics: KinematicsKind::Cartesian,
            max_step_rate: default_max_step_rate(),
            acc: default_acc(),
            dec: default_dec(),
            jerk_speed: default_jerk_speed(),
            ref_move_step_rate: default_ref_move_step_rate(),
            move_away_from_reference: default_move_away(),
            limit_check: true,
            check_reference: true,
            speed_override: default_override(),
            optimize: OptimizePolicy::Immediate,
            direction_settle: default_direction_settle(),
            reference_debounce_ticks: default_debounce(),
            idle_disable_ms: default_idle_timeout(),
            backlash_step_rate: None,
            default_feed_rate: default_feed_rate(),
            delta: DeltaConfig::default(),
            axes: vec![AxisConfig::default(); 3],
        }
    }
}

impl MachineConfig {
    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// Configuration of `axis`, or the default record beyond `axes`.
    pub fn axis(&self, axis: usize) -> AxisConfig {
        self.axes.get(axis).cloned().unwrap_or_default()
    }

    /// Axes with a homing slot, ordered by slot.
    pub fn reference_sequence(&self) -> HVec<usize, MAX_AXES> {
        let mut order: HVec<(u8, usize), MAX_AXES> = HVec::new();
        for (axis, cfg) in self.axes.iter().enumerate().take(MAX_AXES) {
            if let Some(slot) = cfg.reference_sequence {
                // capacity == MAX_AXES, take() bounds the count
                let _ = order.push((slot, axis));
            }
        }
        order.sort_unstable();
        order.iter().map(|&(_, axis)| axis).collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.axes.is_empty() || self.axes.len() > MAX_AXES {
            return Err(format!(
                "axis count must be 1..={MAX_AXES}, got {}",
                self.axes.len()
            ));
        }
        if self.max_step_rate == 0 || self.max_step_rate > STEPRATE_MAX {
            return Err(format!(
                "max_step_rate must be 1..={STEPRATE_MAX}, got {}",
                self.max_step_rate
            ));
        }
        if self.acc == 0 || self.dec == 0 {
            return Err("acc and dec must be > 0".to_string());
        }
        if self.ref_move_step_rate == 0 {
            return Err("ref_move_step_rate must be > 0".to_string());
        }
        if self.move_away_from_reference < 0 {
            return Err("move_away_from_reference must be >= 0".to_string());
        }
        if self.speed_override == 0 {
            return Err("speed_override must be > 0 at startup".to_string());
        }
        for (i, axis) in self.axes.iter().enumerate() {
            axis.validate().map_err(|e| format!("axis {i}: {e}"))?;
        }
        if self.kinematics == KinematicsKind::Delta {
            if self.axes.len() < 3 {
                return Err("delta kinematics requires 3 axes".to_string());
            }
            if self.delta.split_move_dist <= 0 {
                return Err("delta.split_move_dist must be > 0".to_string());
            }
        }
        let mut slots: HVec<u8, MAX_AXES> = HVec::new();
        for axis in &self.axes {
            if let Some(slot) = axis.reference_sequence {
                if slots.contains(&slot) {
                    return Err(format!("duplicate reference_sequence slot {slot}"));
                }
                let _ = slots.push(slot);
            }
        }
        Ok(())
    }
}
