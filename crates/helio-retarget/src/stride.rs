//! Stride warping
//!
//! Builds a body frame (position plus yaw) for the current frame and reshapes warp-affected IK
//! goals inside it: stretched along the facing direction, pushed sideways and splayed around the
//! body. All yaw is measured about the world up axis (Y).

use crate::settings::GlobalSettings;
use crate::transform::{signed_angle_around, Transform};
use glam::{Quat, Vec3};

const UP: Vec3 = Vec3::Y;

/// Body position at rest and now, plus the yaw taking the rest facing to the current one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyFrame {
    pub initial_position: Vec3,
    pub current_position: Vec3,
    pub current_rotation: Quat,
}

impl BodyFrame {
    /// Frame from the rest and current positions of the warp-affected goals.
    pub fn from_goals(initial: &[Vec3], current: &[Vec3]) -> Option<Self> {
        if initial.is_empty() || initial.len() != current.len() {
            return None;
        }
        let flatten = |p: &Vec3| Vec3::new(p.x, 0.0, p.z);
        let initial: Vec<Vec3> = initial.iter().map(flatten).collect();
        let current: Vec<Vec3> = current.iter().map(flatten).collect();

        let (rotation, initial_position, current_position) =
            rotation_from_deformed_points(&initial, &current);
        Some(Self {
            initial_position,
            current_position,
            current_rotation: rotation,
        })
    }

    /// Frame from an FK chain's rest and current transforms.
    pub fn from_chain(initial: &[Transform], current: &[Transform], forward: Vec3) -> Option<Self> {
        if initial.is_empty() || initial.len() != current.len() {
            return None;
        }
        let inv_count = 1.0 / initial.len() as f32;
        let initial_position = initial.iter().map(|t| t.position).sum::<Vec3>() * inv_count;
        let current_position = current.iter().map(|t| t.position).sum::<Vec3>() * inv_count;

        let (forward_orig, forward_current) = if initial.len() == 1 {
            let delta = current[0].rotation * initial[0].rotation.inverse();
            (forward, delta * forward)
        } else {
            (
                initial[initial.len() - 1].position - initial[0].position,
                current[current.len() - 1].position - current[0].position,
            )
        };

        Some(Self {
            initial_position,
            current_position,
            current_rotation: yaw_between(forward_orig, forward_current),
        })
    }

    /// Frame from the root bone's rest and current transforms.
    pub fn from_root(initial: &Transform, current: &Transform, forward: Vec3) -> Self {
        let delta = current.rotation * initial.rotation.inverse();
        Self {
            initial_position: initial.position,
            current_position: current.position,
            current_rotation: yaw_between(forward, delta * forward),
        }
    }

    /// Warp one goal. `initial_end_position` is the goal bone's retarget pose position.
    pub fn warp_goal(&self, settings: &GlobalSettings, initial_end_position: Vec3, goal: Vec3) -> Vec3 {
        let forward = settings.forward_direction.to_vec();
        let initial_body = Transform::from_position(self.initial_position);
        let current_body =
            Transform::from_position_rotation(self.current_position, self.current_rotation);

        let fwd = current_body.transform_vector(forward);
        let side = fwd.cross(UP);
        let side_orig = forward.cross(UP);

        // forwards: scale the goal's distance from the plane through its rest spot
        let rest_in_current =
            current_body.transform_point(initial_body.inverse_transform_point(initial_end_position));
        let on_plane = goal - fwd * (goal - rest_in_current).dot(fwd);
        let mut warped = on_plane + (goal - on_plane) * settings.warp_forwards;

        // sideways: push away from the side the goal started on
        let side_multiplier = initial_end_position.normalize_or_zero().dot(side_orig);
        warped += side * settings.sideways_offset * side_multiplier;

        let splay_origin = Vec3::new(self.current_position.x, warped.y, self.current_position.z);
        splay_origin + (warped - splay_origin) * settings.warp_splay
    }
}

/// Best fit yaw (about Y) taking `initial` onto `current`, with the two centroids.
///
/// Points are expected to lie in the horizontal plane.
pub fn rotation_from_deformed_points(initial: &[Vec3], current: &[Vec3]) -> (Quat, Vec3, Vec3) {
    let inv_count = 1.0 / initial.len().max(1) as f32;
    let initial_centroid = initial.iter().copied().sum::<Vec3>() * inv_count;
    let current_centroid = current.iter().copied().sum::<Vec3>() * inv_count;

    let mut cos_sum = 0.0;
    let mut sin_sum = 0.0;
    for (a, b) in initial.iter().zip(current) {
        let a = *a - initial_centroid;
        let b = *b - current_centroid;
        cos_sum += a.x * b.x + a.z * b.z;
        sin_sum += b.x * a.z - b.z * a.x;
    }

    let rotation = if cos_sum.abs() + sin_sum.abs() <= f32::EPSILON {
        Quat::IDENTITY
    } else {
        Quat::from_rotation_y(sin_sum.atan2(cos_sum))
    };
    (rotation, initial_centroid, current_centroid)
}

fn yaw_between(from: Vec3, to: Vec3) -> Quat {
    let from = Vec3::new(from.x, 0.0, from.z).normalize_or_zero();
    let to = Vec3::new(to.x, 0.0, to.z).normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_y(signed_angle_around(from, to, UP))
}
