//! Kinematics transforms between logical and machine coordinates.
//!
//! Both sides are in mm1000. The motion layer scales machine mm1000 to
//! steps with each axis' `steps_per_mm1000` after the transform.
//!
//! | Transform | Machine | Split | Step rate |
//! |-----------|---------|-------|-----------|
//! | [`CartesianTransform`] | Optional 2D/3D rotation around an offset | no | Feed rate of the dominant axis |
//! | [`DeltaTransform`] | Servo pulse per joint angle | `split_move_dist` | Scaled by machine/logical distance |

mod cartesian;
mod delta;

pub use cartesian::CartesianTransform;
pub use delta::{DeltaTransform, JointAngles};

use stepper_common::machine::config::{KinematicsKind, MachineConfig};
use stepper_common::machine::error::MotionError;
use stepper_common::types::{AxisArray, Mm1000};

/// Axes covered by rotations and the Delta solve.
pub const NUM_AXIS_XYZ: usize = 3;

pub trait Transform: Send {
    /// Transform identifier, e.g. "cartesian".
    fn name(&self) -> &'static str;

    /// Logical position to machine position.
    ///
    /// Fails with [`MotionError::Unreachable`] if the target cannot be
    /// reached; the caller must not move in that case.
    fn to_machine(&self, logical: &AxisArray<Mm1000>) -> Result<AxisArray<Mm1000>, MotionError>;

    /// Machine position to logical position.
    fn from_machine(&self, machine: &AxisArray<Mm1000>) -> AxisArray<Mm1000>;

    /// Longest logical sub-move; `None` moves in one segment.
    fn split_move_dist(&self) -> Option<Mm1000> {
        None
    }

    /// Step rate follows the machine distance instead of the logical one.
    fn scales_step_rate(&self) -> bool {
        false
    }
}

/// Transform selected by the machine configuration.
pub fn create_transform(config: &MachineConfig) -> Box<dyn Transform> {
    match config.kinematics {
        KinematicsKind::Cartesian => Box::new(CartesianTransform::new()),
        KinematicsKind::Delta => Box::new(DeltaTransform::new(config.delta)),
    }
}

/// Round and saturate a float coordinate to mm1000.
#[inline]
pub(crate) fn to_mm1000(value: f64) -> Mm1000 {
    value.round().clamp(Mm1000::MIN as f64, Mm1000::MAX as f64) as Mm1000
}
