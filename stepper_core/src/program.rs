//! Motion programs for the simulation runner.
//!
//! A program is a TOML list of tagged steps executed in order on a
//! [`MotionControl`]. Coordinates are logical mm1000, feed rates
//! mm1000/min; a missing `feed` uses the machine default.
//!
//! ```toml
//! name = "square"
//!
//! [[steps]]
//! op = "home"
//!
//! [[steps]]
//! op = "move_abs"
//! x = 20000
//! y = 20000
//! feed = 300000
//!
//! [[steps]]
//! op = "arc"
//! x = 20000
//! y = 20000
//! i = 5000
//! clockwise = true
//! ```

use crate::motion::MotionControl;
use serde::{Deserialize, Serialize};
use std::path::Path;
use stepper_common::board::StepperBoard;
use stepper_common::config::{ConfigError, ConfigLoader};
use stepper_common::consts::MAX_AXES;
use stepper_common::machine::error::MotionError;
use stepper_common::types::{Axis, AxisArray, FeedRate, Mm1000, SDist};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Ticks allowed for the final drain before the run is declared stuck.
const DRAIN_TICK_LIMIT: u64 = 50_000_000;

// ─── Program Steps ──────────────────────────────────────────────────

/// Per-axis values; missing axes are left as they are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Mm1000>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Mm1000>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<Mm1000>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Mm1000>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<Mm1000>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<Mm1000>,
}

impl AxisValues {
    pub fn xy(x: Mm1000, y: Mm1000) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    fn get(&self, axis: Axis) -> Option<Mm1000> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::A => self.a,
            Axis::B => self.b,
            Axis::C => self.c,
        }
    }

    /// `(axis, value)` pairs of the given axes.
    pub fn pairs(&self) -> heapless::Vec<(Axis, Mm1000), MAX_AXES> {
        Axis::ALL
            .iter()
            .filter_map(|&axis| self.get(axis).map(|v| (axis, v)))
            .collect()
    }

    /// `base` with the given axes replaced.
    pub fn apply(&self, base: &AxisArray<Mm1000>) -> AxisArray<Mm1000> {
        let mut out = *base;
        for (axis, value) in self.pairs() {
            out[axis.index()] = value;
        }
        out
    }
}

/// Plane of an arc; `i`/`j` are the center offsets along its two axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArcPlane {
    #[default]
    Xy,
    Zx,
    Yz,
}

impl ArcPlane {
    pub const fn axes(self) -> (Axis, Axis) {
        match self {
            Self::Xy => (Axis::X, Axis::Y),
            Self::Zx => (Axis::Z, Axis::X),
            Self::Yz => (Axis::Y, Axis::Z),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProgramStep {
    MoveAbs {
        #[serde(flatten)]
        to: AxisValues,
        #[serde(default)]
        feed: Option<FeedRate>,
    },
    MoveRel {
        #[serde(flatten)]
        by: AxisValues,
        #[serde(default)]
        feed: Option<FeedRate>,
    },
    Arc {
        #[serde(flatten)]
        to: AxisValues,
        #[serde(default)]
        i: Mm1000,
        #[serde(default)]
        j: Mm1000,
        #[serde(default)]
        plane: ArcPlane,
        #[serde(default)]
        clockwise: bool,
        #[serde(default)]
        feed: Option<FeedRate>,
    },
    /// Reference all axes in the configured order.
    Home,
    /// Dwell [1/100 s].
    Wait { sec100: u16 },
    SetOverride { percent: u16 },
    Io { tool: u8, level: u16 },
}

impl ProgramStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MoveAbs { .. } => "move_abs",
            Self::MoveRel { .. } => "move_rel",
            Self::Arc { .. } => "arc",
            Self::Home => "home",
            Self::Wait { .. } => "wait",
            Self::SetOverride { .. } => "set_override",
            Self::Io { .. } => "io",
        }
    }
}

// ─── Program ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<ProgramStep>,
}

fn default_name() -> String {
    "program".to_string()
}

impl Program {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let program = <Self as ConfigLoader>::load(path)?;
        program.validate()?;
        Ok(program)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let program = Self::from_toml_str(content)?;
        program.validate()?;
        Ok(program)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, step) in self.steps.iter().enumerate() {
            let invalid = match step {
                ProgramStep::MoveAbs { feed, .. } | ProgramStep::MoveRel { feed, .. } => {
                    feed.is_some_and(|f| f == 0)
                }
                ProgramStep::Arc { i, j, feed, .. } => (*i == 0 && *j == 0) || feed.is_some_and(|f| f == 0),
                _ => false,
            };
            if invalid {
                return Err(ConfigError::ValidationError(format!(
                    "step {index} ({}): zero feed or zero arc radius",
                    step.name()
                )));
            }
        }
        Ok(())
    }

    /// Home, then a square of `size` with a full circle inscribed in it.
    pub fn demo_square(size: Mm1000) -> Self {
        let half = size / 2;
        let steps = vec![
            ProgramStep::Home,
            ProgramStep::MoveAbs { to: AxisValues::xy(0, 0), feed: None },
            ProgramStep::MoveAbs { to: AxisValues::xy(size, 0), feed: None },
            ProgramStep::MoveAbs { to: AxisValues::xy(size, size), feed: None },
            ProgramStep::MoveAbs { to: AxisValues::xy(0, size), feed: None },
            ProgramStep::MoveAbs { to: AxisValues::xy(0, 0), feed: None },
            ProgramStep::MoveAbs { to: AxisValues::xy(0, half), feed: None },
            ProgramStep::Arc {
                to: AxisValues::xy(0, half),
                i: half,
                j: 0,
                plane: ArcPlane::Xy,
                clockwise: true,
                feed: None,
            },
            ProgramStep::Wait { sec100: 10 },
            ProgramStep::MoveAbs { to: AxisValues::xy(0, 0), feed: None },
        ];
        Self { name: "demo_square".to_string(), steps }
    }
}

// ─── Runner ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("step {index} ({op}) failed: {source}")]
    Step {
        index: usize,
        op: &'static str,
        #[source]
        source: MotionError,
    },

    #[error("motion did not finish within {0} ticks")]
    Stuck(u64),
}

/// Result of a program run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub program: String,
    pub steps: usize,
    /// Logical position [mm1000], one per configured axis.
    pub position: Vec<Mm1000>,
    /// Machine position [steps], one per configured axis.
    pub machine_position: Vec<SDist>,
    pub total_steps: u64,
    pub ticks: u64,
    pub simulated_ms: u64,
}

/// Execute `program` and drain the queue.
pub fn run_program<B: StepperBoard>(
    mc: &mut MotionControl<B>,
    program: &Program,
    default_feed: FeedRate,
) -> Result<RunSummary, ProgramError> {
    info!("Running program '{}' ({} steps)", program.name, program.steps.len());

    for (index, step) in program.steps.iter().enumerate() {
        debug!("step {}: {:?}", index, step);
        execute(mc, step, default_feed).map_err(|source| ProgramError::Step {
            index,
            op: step.name(),
            source,
        })?;
    }

    let stepper = mc.stepper_mut();
    stepper.optimize_movement_queue(true);
    stepper.run_until_idle(DRAIN_TICK_LIMIT);
    if stepper.is_busy() {
        warn!("Program '{}' still moving after drain", program.name);
        return Err(ProgramError::Stuck(DRAIN_TICK_LIMIT));
    }

    let axes = stepper.axis_count();
    let summary = RunSummary {
        program: program.name.clone(),
        steps: program.steps.len(),
        position: mc.positions()[..axes].to_vec(),
        machine_position: mc.stepper().position()[..axes].to_vec(),
        total_steps: mc.stepper().total_steps(),
        ticks: mc.stepper().tick_count(),
        simulated_ms: mc.stepper().millis(),
    };
    info!(
        "Program '{}' done: {} steps in {} ms simulated",
        summary.program, summary.total_steps, summary.simulated_ms
    );
    Ok(summary)
}

fn execute<B: StepperBoard>(
    mc: &mut MotionControl<B>,
    step: &ProgramStep,
    default_feed: FeedRate,
) -> Result<(), MotionError> {
    match *step {
        ProgramStep::MoveAbs { to, feed } => {
            mc.move_abs_ex(feed.unwrap_or(default_feed), &to.pairs())
        }
        ProgramStep::MoveRel { by, feed } => {
            mc.move_rel_ex(feed.unwrap_or(default_feed), &by.pairs())
        }
        ProgramStep::Arc { to, i, j, plane, clockwise, feed } => {
            let (axis_0, axis_1) = plane.axes();
            let target = to.apply(&mc.positions());
            mc.arc(&target, i, j, axis_0, axis_1, clockwise, feed.unwrap_or(default_feed))
        }
        ProgramStep::Home => mc.go_to_reference(),
        ProgramStep::Wait { sec100 } => mc.stepper_mut().wait(sec100),
        ProgramStep::SetOverride { percent } => {
            mc.stepper_mut().set_speed_override_percent(percent);
            Ok(())
        }
        ProgramStep::Io { tool, level } => mc.stepper_mut().io_control(tool, level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBoard;
    use crate::stepper::Stepper;
    use stepper_common::machine::config::{MachineConfig, ReferenceType};

    fn machine() -> MachineConfig {
        let mut config = MachineConfig::default();
        for axis in config.axes.iter_mut() {
            axis.size = 50_000;
            axis.reference_type = ReferenceType::Min;
            axis.reference_hit_min = Some(0);
        }
        config.axes[0].reference_sequence = Some(1);
        config.axes[1].reference_sequence = Some(0);
        config.axes[2].reference_sequence = Some(2);
        config
    }

    fn motion(config: &MachineConfig) -> MotionControl<SimBoard> {
        let board = SimBoard::with_travel_switches(config, 500);
        MotionControl::new(Stepper::new(board, config), config)
    }

    // ── Parsing ──

    #[test]
    fn parse_tagged_steps() {
        let program = Program::from_toml(
            r#"
name = "parse"

[[steps]]
op = "home"

[[steps]]
op = "move_rel"
z = -500
feed = 1000

[[steps]]
op = "arc"
x = 100
plane = "zx"
i = 50
clockwise = true

[[steps]]
op = "set_override"
percent = 50

[[steps]]
op = "wait"
sec100 = 25
"#,
        )
        .unwrap();
        assert_eq!(program.name, "parse");
        assert_eq!(program.steps.len(), 5);
        assert_eq!(program.steps[0], ProgramStep::Home);
        assert_eq!(
            program.steps[1],
            ProgramStep::MoveRel {
                by: AxisValues { z: Some(-500), ..AxisValues::default() },
                feed: Some(1000)
            }
        );
        match &program.steps[2] {
            ProgramStep::Arc { plane, clockwise, i, j, .. } => {
                assert_eq!(*plane, ArcPlane::Zx);
                assert!(*clockwise);
                assert_eq!((*i, *j), (50, 0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reject_zero_radius_arc() {
        let err = Program::from_toml("[[steps]]\nop = \"arc\"\nx = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn reject_unknown_op() {
        let err = Program::from_toml("[[steps]]\nop = \"jump\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn axis_values_apply_only_given_axes() {
        let values = AxisValues { y: Some(7), ..AxisValues::default() };
        let out = values.apply(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(out, [1, 7, 3, 4, 5, 6]);
        assert_eq!(values.pairs().as_slice(), &[(Axis::Y, 7)]);
    }

    // ── Running ──

    #[test]
    fn demo_square_returns_home() {
        let config = machine();
        let mut mc = motion(&config);
        let summary = run_program(&mut mc, &Program::demo_square(20_000), config.default_feed_rate).unwrap();
        assert_eq!(summary.program, "demo_square");
        assert_eq!(summary.position, vec![0, 0, 0]);
        assert_eq!(summary.machine_position, vec![0, 0, 0]);
        assert!(summary.total_steps > 80_000);
        assert!(summary.simulated_ms > 100);
        assert!(summary.ticks > 0);
    }

    #[test]
    fn failing_step_is_reported_with_index() {
        let config = machine();
        let mut mc = motion(&config);
        let program = Program {
            name: "out_of_range".to_string(),
            steps: vec![
                ProgramStep::MoveAbs { to: AxisValues::xy(1000, 0), feed: None },
                ProgramStep::MoveAbs { to: AxisValues::xy(90_000, 0), feed: None },
            ],
        };
        let err = run_program(&mut mc, &program, config.default_feed_rate).unwrap_err();
        match err {
            ProgramError::Step { index, op, source } => {
                assert_eq!(index, 1);
                assert_eq!(op, "move_abs");
                assert!(matches!(source, MotionError::RangeLimit { axis: 0, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn io_steps_reach_the_board() {
        let config = machine();
        let mut mc = motion(&config);
        let program = Program {
            name: "io".to_string(),
            steps: vec![
                ProgramStep::Io { tool: 1, level: 255 },
                ProgramStep::MoveRel { by: AxisValues::xy(1000, 0), feed: None },
                ProgramStep::Io { tool: 1, level: 0 },
            ],
        };
        run_program(&mut mc, &program, config.default_feed_rate).unwrap();
        assert_eq!(mc.stepper().board().io_log(), &[(1, 255), (1, 0)]);
        assert_eq!(mc.position(0), 1000);
    }
}
