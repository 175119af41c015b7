//! Cartesian transform with optional coordinate rotation.
//!
//! `to_machine` applies the 3D axis-angle rotation first, then the 2D
//! plane rotations in the order X (YZ plane), Y (ZX plane), Z (XY plane).
//! `from_machine` applies the inverse rotations in reverse order.

use super::{NUM_AXIS_XYZ, Transform, to_mm1000};
use stepper_common::machine::error::MotionError;
use stepper_common::types::{Axis, AxisArray, Mm1000};

// ─── Plane Rotation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct PlaneRotation {
    angle: f64,
    sin: f64,
    cos: f64,
}

impl PlaneRotation {
    fn new(rad: f64) -> Self {
        Self { angle: rad, sin: rad.sin(), cos: rad.cos() }
    }

    #[inline]
    fn rotate(&self, ax1: &mut f64, ax2: &mut f64) {
        let (fx, fy) = (*ax1, *ax2);
        *ax1 = fx * self.cos - fy * self.sin;
        *ax2 = fy * self.cos + fx * self.sin;
    }

    #[inline]
    fn rotate_invert(&self, ax1: &mut f64, ax2: &mut f64) {
        let (fx, fy) = (*ax1, *ax2);
        *ax1 = fx * self.cos + fy * self.sin;
        *ax2 = fy * self.cos - fx * self.sin;
    }
}

// ─── Axis-Angle Rotation ────────────────────────────────────────────

type Matrix3 = [[f64; NUM_AXIS_XYZ]; NUM_AXIS_XYZ];

fn rotation_matrix(rad: f64, vect: &[Mm1000; NUM_AXIS_XYZ]) -> Option<Matrix3> {
    let (mut n1, mut n2, mut n3) = (vect[0] as f64, -(vect[1] as f64), vect[2] as f64);
    let len = (n1 * n1 + n2 * n2 + n3 * n3).sqrt();
    if len == 0.0 {
        return None;
    }
    n1 /= len;
    n2 /= len;
    n3 /= len;

    let (sina, cosa) = rad.sin_cos();
    let t = 1.0 - cosa;
    Some([
        [n1 * n1 * t + cosa, n1 * n2 * t - n3 * sina, n1 * n3 * t + n2 * sina],
        [n1 * n2 * t + n3 * sina, n2 * n2 * t + cosa, n2 * n3 * t - n1 * sina],
        [n1 * n3 * t - n2 * sina, n2 * n3 * t + n1 * sina, n3 * n3 * t + cosa],
    ])
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisAngleRotation {
    angle: f64,
    vect: [Mm1000; NUM_AXIS_XYZ],
    offset: [Mm1000; NUM_AXIS_XYZ],
    forward: Matrix3,
    inverse: Matrix3,
}

impl AxisAngleRotation {
    fn apply(matrix: &Matrix3, offset: &[Mm1000; NUM_AXIS_XYZ], pos: &mut AxisArray<Mm1000>) {
        let p: [f64; NUM_AXIS_XYZ] = std::array::from_fn(|i| (pos[i] - offset[i]) as f64);
        for (i, row) in matrix.iter().enumerate() {
            let v = p[0] * row[0] + p[1] * row[1] + p[2] * row[2];
            pos[i] = to_mm1000(v) + offset[i];
        }
    }
}

// ─── Transform ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CartesianTransform {
    rotate_3d: Option<AxisAngleRotation>,
    rotate_2d: [Option<PlaneRotation>; NUM_AXIS_XYZ],
    offset_2d: [Mm1000; NUM_AXIS_XYZ],
}

impl CartesianTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotate by `rad` around the axis `vect` through `offset`.
    /// An angle of 0 or a zero vector clears the rotation.
    pub fn set_rotate(&mut self, rad: f64, vect: [Mm1000; NUM_AXIS_XYZ], offset: [Mm1000; NUM_AXIS_XYZ]) {
        if rad == 0.0 {
            self.rotate_3d = None;
            return;
        }
        self.rotate_3d = match (rotation_matrix(rad, &vect), rotation_matrix(-rad, &vect)) {
            (Some(forward), Some(inverse)) => {
                Some(AxisAngleRotation { angle: rad, vect, offset, forward, inverse })
            }
            _ => None,
        };
    }

    pub fn clear_rotate(&mut self) {
        self.rotate_3d = None;
    }

    pub fn is_rotate(&self) -> bool {
        self.rotate_3d.is_some()
    }

    pub fn angle(&self) -> f64 {
        self.rotate_3d.map_or(0.0, |r| r.angle)
    }

    pub fn vector(&self) -> Option<[Mm1000; NUM_AXIS_XYZ]> {
        self.rotate_3d.map(|r| r.vect)
    }

    pub fn offset(&self) -> Option<[Mm1000; NUM_AXIS_XYZ]> {
        self.rotate_3d.map(|r| r.offset)
    }

    /// Plane rotations around X, Y and Z plus their common offset.
    pub fn set_rotate_2d_all(&mut self, alpha: f64, beta: f64, gamma: f64, offset: [Mm1000; NUM_AXIS_XYZ]) {
        self.set_rotate_2d(Axis::X, alpha);
        self.set_rotate_2d(Axis::Y, beta);
        self.set_rotate_2d(Axis::Z, gamma);
        self.set_offset_2d(offset);
    }

    /// Rotate the plane normal to `axis`; 0 disables it. Only X, Y, Z.
    pub fn set_rotate_2d(&mut self, axis: Axis, rad: f64) {
        let Some(slot) = self.rotate_2d.get_mut(axis.index()) else {
            return;
        };
        *slot = if rad == 0.0 {
            None
        } else if axis == Axis::Y {
            // ZX plane turns the other way round
            Some(PlaneRotation::new(-rad))
        } else {
            Some(PlaneRotation::new(rad))
        };
    }

    pub fn set_offset_2d(&mut self, offset: [Mm1000; NUM_AXIS_XYZ]) {
        self.offset_2d = offset;
    }

    pub fn offset_2d(&self, axis: Axis) -> Mm1000 {
        self.offset_2d.get(axis.index()).copied().unwrap_or_default()
    }

    pub fn angle_2d(&self, axis: Axis) -> f64 {
        match self.rotate_2d.get(axis.index()).copied().flatten() {
            Some(r) if axis == Axis::Y => -r.angle,
            Some(r) => r.angle,
            None => 0.0,
        }
    }

    pub fn is_enabled_2d(&self, axis: Axis) -> bool {
        self.rotate_2d.get(axis.index()).is_some_and(|r| r.is_some())
    }

    pub fn clear_rotate_2d(&mut self) {
        self.rotate_2d = [None; NUM_AXIS_XYZ];
    }

    fn any_2d(&self) -> bool {
        self.rotate_2d.iter().any(|r| r.is_some())
    }

    fn split_2d(&self, pos: &AxisArray<Mm1000>) -> (f64, f64, f64) {
        (
            (pos[0] - self.offset_2d[0]) as f64,
            (pos[1] - self.offset_2d[1]) as f64,
            (pos[2] - self.offset_2d[2]) as f64,
        )
    }

    fn join_2d(&self, pos: &mut AxisArray<Mm1000>, x: f64, y: f64, z: f64) {
        pos[0] = to_mm1000(x) + self.offset_2d[0];
        pos[1] = to_mm1000(y) + self.offset_2d[1];
        pos[2] = to_mm1000(z) + self.offset_2d[2];
    }
}

impl Transform for CartesianTransform {
    fn name(&self) -> &'static str {
        "cartesian"
    }

    fn to_machine(&self, logical: &AxisArray<Mm1000>) -> Result<AxisArray<Mm1000>, MotionError> {
        let mut pos = *logical;
        if let Some(r) = &self.rotate_3d {
            AxisAngleRotation::apply(&r.forward, &r.offset, &mut pos);
        }
        if self.any_2d() {
            let (mut x, mut y, mut z) = self.split_2d(&pos);
            let [rx, ry, rz] = self.rotate_2d;
            if let Some(r) = rx {
                r.rotate(&mut y, &mut z);
            }
            if let Some(r) = ry {
                r.rotate(&mut z, &mut x);
            }
            if let Some(r) = rz {
                r.rotate(&mut x, &mut y);
            }
            self.join_2d(&mut pos, x, y, z);
        }
        Ok(pos)
    }

    fn from_machine(&self, machine: &AxisArray<Mm1000>) -> AxisArray<Mm1000> {
        let mut pos = *machine;
        if self.any_2d() {
            let (mut x, mut y, mut z) = self.split_2d(&pos);
            let [rx, ry, rz] = self.rotate_2d;
            if let Some(r) = rz {
                r.rotate_invert(&mut x, &mut y);
            }
            if let Some(r) = ry {
                r.rotate_invert(&mut z, &mut x);
            }
            if let Some(r) = rx {
                r.rotate_invert(&mut y, &mut z);
            }
            self.join_2d(&mut pos, x, y, z);
        }
        if let Some(r) = &self.rotate_3d {
            AxisAngleRotation::apply(&r.inverse, &r.offset, &mut pos);
        }
        pos
    }
}
