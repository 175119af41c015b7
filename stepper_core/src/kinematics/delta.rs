//! Delta arm ("iRobot") transform.
//!
//! Three servo joints: shoulder (angle 0), elbow (angle 1) and yaw
//! (angle 2). The shoulder sits `height` above the base and `eps` off the
//! yaw axis; `segment1` (B) is the lower and `segment2` (A) the upper arm.
//!
//! ```text
//!   to_angle:   s = |xy|,  c² = (s-E)² + (z-H)²
//!               shoulder = acos((B²+c²-A²) / 2Bc) + atan((z-H)/(s-E))
//!               elbow    = acos((A²+B²-c²) / 2AB)
//!               yaw      = atan(y/x), quadrant corrected
//! ```
//!
//! The upper arm keeps its angle to the base plane when the shoulder
//! moves, so the elbow servo angle includes the shoulder angle. Machine
//! coordinates of the three joints are servo pulse widths (µs × 2).

use super::{NUM_AXIS_XYZ, Transform, to_mm1000};
use std::f64::consts::{FRAC_PI_2, PI};
use stepper_common::lookup::LinearLookup;
use stepper_common::machine::config::DeltaConfig;
use stepper_common::machine::error::MotionError;
use stepper_common::types::{AxisArray, Mm1000};
use tracing::debug;

// ─── Servo Calibration ──────────────────────────────────────────────

/// Pulse width span for a half turn [µs × 2].
pub const MS_FOR_PI: f64 = 2800.0;

/// Servo center pulse [µs × 2].
pub const SERVO_CENTER: f64 = 2600.0;

const DEFAULT_ANGLE: f64 = SERVO_CENTER / MS_FOR_PI * PI;

/// Center pulse puts the shoulder at 55° above the base plane.
const SHOULDER_OFFSET: f64 = DEFAULT_ANGLE - 55.0 * PI / 180.0;

/// Center pulse puts the elbow at 80° between the arm segments.
const ELBOW_OFFSET: f64 = DEFAULT_ANGLE - (80.0 - 55.0 + 20.0) * PI / 180.0 - FRAC_PI_2;

const YAW_OFFSET: f64 = DEFAULT_ANGLE;

/// Servo angle [rad] to pulse width.
const ANGLE_TO_PULSE: [(f64, f64); 3] = [(0.0, 0.0), (PI, MS_FOR_PI), (2.0 * PI, 2.0 * MS_FOR_PI)];

/// Pulse width to servo angle [rad].
const PULSE_TO_ANGLE: [(f64, f64); 3] = [(0.0, 0.0), (MS_FOR_PI, PI), (2.0 * MS_FOR_PI, 2.0 * PI)];

// ─── Joint Angles ───────────────────────────────────────────────────

/// Joint angles [rad].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointAngles {
    pub shoulder: f64,
    pub elbow: f64,
    pub yaw: f64,
}

impl JointAngles {
    pub fn as_array(&self) -> [f64; NUM_AXIS_XYZ] {
        [self.shoulder, self.elbow, self.yaw]
    }

    pub fn from_array(a: [f64; NUM_AXIS_XYZ]) -> Self {
        Self { shoulder: a[0], elbow: a[1], yaw: a[2] }
    }

    fn is_finite(&self) -> bool {
        self.shoulder.is_finite() && self.elbow.is_finite() && self.yaw.is_finite()
    }
}

// ─── Transform ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct DeltaTransform {
    geometry: DeltaConfig,
}

impl DeltaTransform {
    pub fn new(geometry: DeltaConfig) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &DeltaConfig {
        &self.geometry
    }

    /// Solve the joint angles for a Cartesian position.
    pub fn to_angle(&self, pos: &[Mm1000; NUM_AXIS_XYZ]) -> Result<JointAngles, MotionError> {
        let (a, b) = (self.geometry.segment2 as f64, self.geometry.segment1 as f64);
        let (h, e) = (self.geometry.height as f64, self.geometry.eps as f64);
        let (x, y, z) = (pos[0] as f64, pos[1] as f64, pos[2] as f64);

        let s = (x * x + y * y).sqrt();
        let c2 = (s - e) * (s - e) + (z - h) * (z - h);
        let c = c2.sqrt();

        let alpha1 = if s - e == 0.0 { 0.0 } else { ((z - h) / (s - e)).atan() };
        let alpha = ((b * b + c2 - a * a) / (2.0 * b * c)).acos();
        let gamma = ((a * a + b * b - c2) / (2.0 * a * b)).acos();

        let mut yaw = if x == 0.0 {
            if y > 0.0 { FRAC_PI_2 } else { -FRAC_PI_2 }
        } else {
            (y / x).atan()
        };
        if x < 0.0 {
            yaw += PI;
            if yaw >= PI {
                yaw -= 2.0 * PI;
            }
        }

        let angles = JointAngles { shoulder: alpha + alpha1, elbow: gamma, yaw };
        if !angles.is_finite() {
            debug!("Delta: no solution for {:?}", pos);
            return Err(MotionError::Unreachable);
        }
        Ok(angles)
    }

    /// Cartesian position of the joint angles.
    pub fn from_angle(&self, angles: &JointAngles) -> [Mm1000; NUM_AXIS_XYZ] {
        let (a, b) = (self.geometry.segment2 as f64, self.geometry.segment1 as f64);
        let (h, e) = (self.geometry.height as f64, self.geometry.eps as f64);

        let c2 = a * a + b * b - 2.0 * a * b * angles.elbow.cos();
        let c = c2.sqrt();
        let alpha = ((c2 + b * b - a * a) / (2.0 * b * c)).acos();
        let alpha1 = angles.shoulder - alpha;
        let s = alpha1.cos() * c + e;

        [
            to_mm1000(angles.yaw.cos() * s),
            to_mm1000(angles.yaw.sin() * s),
            to_mm1000(h + alpha1.sin() * c),
        ]
    }

    /// Geometric angles to servo angles.
    pub fn adjust_to_servo(angles: &JointAngles) -> JointAngles {
        JointAngles {
            shoulder: angles.shoulder + SHOULDER_OFFSET,
            elbow: angles.elbow + angles.shoulder + ELBOW_OFFSET,
            yaw: angles.yaw + YAW_OFFSET,
        }
    }

    /// Servo angles to geometric angles.
    pub fn adjust_from_servo(servo: &JointAngles) -> JointAngles {
        let shoulder = servo.shoulder - SHOULDER_OFFSET;
        JointAngles {
            shoulder,
            elbow: servo.elbow - ELBOW_OFFSET - shoulder,
            yaw: servo.yaw - YAW_OFFSET,
        }
    }

    pub fn angle_to_pulse(angle: f64) -> Mm1000 {
        to_mm1000(LinearLookup::new(&ANGLE_TO_PULSE).lookup(angle))
    }

    pub fn pulse_to_angle(pulse: Mm1000) -> f64 {
        LinearLookup::new(&PULSE_TO_ANGLE).lookup(pulse as f64)
    }
}

impl Transform for DeltaTransform {
    fn name(&self) -> &'static str {
        "delta"
    }

    fn to_machine(&self, logical: &AxisArray<Mm1000>) -> Result<AxisArray<Mm1000>, MotionError> {
        let angles = self.to_angle(&[logical[0], logical[1], logical[2]])?;
        let servo = Self::adjust_to_servo(&angles).as_array();
        let mut machine = *logical;
        for (m, angle) in machine.iter_mut().zip(servo) {
            *m = Self::angle_to_pulse(angle);
        }
        Ok(machine)
    }

    fn from_machine(&self, machine: &AxisArray<Mm1000>) -> AxisArray<Mm1000> {
        let servo = JointAngles::from_array(std::array::from_fn(|i| Self::pulse_to_angle(machine[i])));
        let xyz = self.from_angle(&Self::adjust_from_servo(&servo));
        let mut logical = *machine;
        logical[..NUM_AXIS_XYZ].copy_from_slice(&xyz);
        logical
    }

    fn split_move_dist(&self) -> Option<Mm1000> {
        Some(self.geometry.split_move_dist)
    }

    fn scales_step_rate(&self) -> bool {
        true
    }
}
