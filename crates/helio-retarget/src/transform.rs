use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Threshold below which lengths and blend weights are treated as zero.
pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;

/// Bone transform. Composes like a matrix: `parent * local` yields the global transform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * (self.scale * point) + self.position
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * (self.scale * vector)
    }

    /// Maps a point expressed in this transform's parent space back into its local space.
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        (self.rotation.inverse() * (point - self.position)) * self.scale.recip()
    }

    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        let inv_scale = safe_recip(self.scale);
        let inv_position = inv_scale * (inv_rotation * -self.position);

        Self {
            position: inv_position,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Returns this (global) transform expressed in the space of `parent`.
    pub fn relative_to(&self, parent: &Transform) -> Transform {
        let inv_rotation = parent.rotation.inverse();
        let inv_scale = safe_recip(parent.scale);
        Self {
            position: inv_scale * (inv_rotation * (self.position - parent.position)),
            rotation: (inv_rotation * self.rotation).normalize(),
            scale: self.scale * inv_scale,
        }
    }

    /// Unit axis of this transform's rotation.
    pub fn axis(&self, axis: Vec3) -> Vec3 {
        self.rotation * axis
    }

    /// Blend position and scale linearly and rotation along the shortest normalized path.
    pub fn blend(&self, other: &Transform, alpha: f32) -> Transform {
        Self {
            position: self.position.lerp(other.position, alpha),
            rotation: nlerp(self.rotation, other.rotation, alpha),
            scale: self.scale.lerp(other.scale, alpha),
        }
    }

    pub fn without_scale(mut self) -> Self {
        self.scale = Vec3::ONE;
        self
    }

    pub fn equals(&self, other: &Transform, tolerance: f32) -> bool {
        self.position.abs_diff_eq(other.position, tolerance)
            && self.scale.abs_diff_eq(other.scale, tolerance)
            && quat_equals(self.rotation, other.rotation, tolerance)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Mat4> for Transform {
    fn from(mat: Mat4) -> Self {
        let (scale, rotation, position) = mat.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, child: Transform) -> Transform {
        Transform {
            position: self.transform_point(child.position),
            rotation: (self.rotation * child.rotation).normalize(),
            scale: self.scale * child.scale,
        }
    }
}

impl Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, child: &Transform) -> Transform {
        *self * *child
    }
}

/// Normalized linear quaternion blend, taking the shortest arc.
pub fn nlerp(from: Quat, to: Quat, alpha: f32) -> Quat {
    let to = if from.dot(to) < 0.0 { -to } else { to };
    let blended = from * (1.0 - alpha) + to * alpha;
    if blended.length_squared() <= f32::EPSILON {
        return from;
    }
    blended.normalize()
}

/// Rotation taking unit vector `from` onto unit vector `to`.
pub fn rotation_between_normals(from: Vec3, to: Vec3) -> Quat {
    Quat::from_rotation_arc(from, to)
}

/// Signed angle (radians) from `from` to `to` measured around `axis`.
pub fn signed_angle_around(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    let sin = from.cross(to).dot(axis);
    let cos = from.dot(to);
    sin.atan2(cos)
}

pub fn is_nearly_equal(a: f32, b: f32) -> bool {
    (a - b).abs() <= KINDA_SMALL_NUMBER
}

pub fn quat_equals(a: Quat, b: Quat, tolerance: f32) -> bool {
    // q and -q encode the same rotation
    a.abs_diff_eq(b, tolerance) || a.abs_diff_eq(-b, tolerance)
}

fn safe_recip(v: Vec3) -> Vec3 {
    let f = |x: f32| if x.abs() <= f32::EPSILON { 0.0 } else { 1.0 / x };
    Vec3::new(f(v.x), f(v.y), f(v.z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_compose_then_relative() {
        let parent = Transform::from_position_rotation(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(FRAC_PI_2),
        );
        let local = Transform::from_position_rotation(
            Vec3::new(0.0, 0.0, 5.0),
            Quat::from_rotation_x(0.3),
        );

        let global = parent * local;
        assert!(global.position.abs_diff_eq(Vec3::new(6.0, 2.0, 3.0), 1e-5));
        assert!(global.relative_to(&parent).equals(&local, 1e-5));
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Transform::new(
            Vec3::new(-4.0, 0.5, 9.0),
            Quat::from_rotation_z(1.1),
            Vec3::splat(2.0),
        );
        let p = Vec3::new(3.0, -1.0, 2.0);
        let back = t.inverse().transform_point(t.transform_point(p));
        assert!(back.abs_diff_eq(p, 1e-4));
        assert!(t.inverse_transform_point(t.transform_point(p)).abs_diff_eq(p, 1e-4));
    }

    #[test]
    fn test_nlerp_endpoints_and_shortest_path() {
        let a = Quat::from_rotation_y(0.2);
        let b = -Quat::from_rotation_y(1.0);
        assert!(quat_equals(nlerp(a, b, 0.0), a, 1e-6));
        assert!(quat_equals(nlerp(a, b, 1.0), b, 1e-6));
        let mid = nlerp(a, b, 0.5);
        assert!(quat_equals(mid, Quat::from_rotation_y(0.6), 1e-5));
    }

    #[test]
    fn test_signed_angle() {
        let angle = signed_angle_around(Vec3::X, Vec3::NEG_Z, Vec3::Y);
        assert!((angle - FRAC_PI_2).abs() < 1e-5);
        let angle = signed_angle_around(Vec3::X, Vec3::Z, Vec3::Y);
        assert!((angle + FRAC_PI_2).abs() < 1e-5);
    }
}
