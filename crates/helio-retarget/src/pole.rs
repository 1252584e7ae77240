//! Pole vector matching
//!
//! Twists the base of a target chain around its root-to-tip axis so its bend plane lines up with
//! the source chain's.

use crate::settings::FkChainSettings;
use crate::skeleton::RetargetSkeleton;
use crate::transform::{nlerp, signed_angle_around, Transform, KINDA_SMALL_NUMBER};
use glam::{Quat, Vec3};

#[derive(Debug, Clone)]
pub struct PoleVectorMatcher {
    /// Local axis of the source chain's base bone used as its pole.
    pub source_pole_axis: Vec3,
    pub target_pole_axis: Vec3,
    /// Signed angle from the target pole to the source pole in the retarget poses.
    pub target_to_source_angular_offset_at_ref_pose: f32,
    /// Descendants of the chain base, excluding the end bone and its own descendants.
    all_children_within_chain: Vec<usize>,
}

impl Default for PoleVectorMatcher {
    fn default() -> Self {
        Self {
            source_pole_axis: Vec3::Y,
            target_pole_axis: Vec3::Y,
            target_to_source_angular_offset_at_ref_pose: 0.0,
            all_children_within_chain: Vec::new(),
        }
    }
}

impl PoleVectorMatcher {
    pub fn initialize(
        &mut self,
        source_indices: &[usize],
        target_indices: &[usize],
        source_global_pose: &[Transform],
        target_global_pose: &[Transform],
        target_skeleton: &RetargetSkeleton,
    ) -> bool {
        let (Some(&target_base), Some(&target_end)) = (target_indices.first(), target_indices.last())
        else {
            return false;
        };
        if source_indices.is_empty() {
            return false;
        }

        self.source_pole_axis = best_pole_axis_for_chain(source_indices, source_global_pose);
        self.target_pole_axis = best_pole_axis_for_chain(target_indices, target_global_pose);

        let source_pole = pole_vector(self.source_pole_axis, source_indices, source_global_pose);
        let target_pole = pole_vector(self.target_pole_axis, target_indices, target_global_pose);
        let axis = chain_axis_normalized(target_indices, target_global_pose);
        self.target_to_source_angular_offset_at_ref_pose =
            signed_angle_around(target_pole, source_pole, axis);

        let mut excluded = target_skeleton.get_children_indices_recursive(target_end);
        excluded.push(target_end);
        self.all_children_within_chain = target_skeleton
            .get_children_indices_recursive(target_base)
            .into_iter()
            .filter(|child| !excluded.contains(child))
            .collect();

        true
    }

    pub fn match_pole_vector(
        &self,
        settings: &FkChainSettings,
        source_indices: &[usize],
        target_indices: &[usize],
        source_global_pose: &[Transform],
        target_global_pose: &mut [Transform],
        target_skeleton: &RetargetSkeleton,
    ) {
        let matching = settings.pole_vector_matching > KINDA_SMALL_NUMBER;
        let offsetting = settings.pole_vector_offset.abs() > KINDA_SMALL_NUMBER;
        if !(matching || offsetting) {
            return;
        }
        let Some(&base) = target_indices.first() else {
            return;
        };

        let axis = chain_axis_normalized(target_indices, target_global_pose);
        if axis == Vec3::ZERO {
            return;
        }

        let local_spaces: Vec<Transform> = self
            .all_children_within_chain
            .iter()
            .map(|&child| match target_skeleton.get_parent_index(child) {
                Some(parent) => target_global_pose[child].relative_to(&target_global_pose[parent]),
                None => target_global_pose[child],
            })
            .collect();

        let mut matching_rotation = Quat::IDENTITY;
        if matching {
            let source_pole = pole_vector(self.source_pole_axis, source_indices, source_global_pose);
            let target_pole = pole_vector(self.target_pole_axis, target_indices, target_global_pose);
            let mut angle = signed_angle_around(target_pole, source_pole, axis);
            if settings.pole_vector_maintain_offset {
                angle -= self.target_to_source_angular_offset_at_ref_pose;
            }
            matching_rotation = nlerp(
                Quat::IDENTITY,
                Quat::from_axis_angle(axis, angle),
                settings.pole_vector_matching,
            );
        }

        let offset_rotation = if offsetting {
            Quat::from_axis_angle(axis, settings.pole_vector_offset.to_radians())
        } else {
            Quat::IDENTITY
        };

        let base_transform = &mut target_global_pose[base];
        base_transform.rotation =
            (matching_rotation * offset_rotation * base_transform.rotation).normalize();

        for (&child, local) in self.all_children_within_chain.iter().zip(&local_spaces) {
            target_global_pose[child] = match target_skeleton.get_parent_index(child) {
                Some(parent) => target_global_pose[parent] * *local,
                None => *local,
            };
        }
    }
}

fn chain_axis_normalized(indices: &[usize], pose: &[Transform]) -> Vec3 {
    let origin = pose[indices[0]].position;
    let tip = pose[indices[indices.len() - 1]].position;
    (tip - origin).normalize_or_zero()
}

/// Cardinal axis of the chain base most perpendicular to the chain direction.
fn best_pole_axis_for_chain(indices: &[usize], pose: &[Transform]) -> Vec3 {
    if indices.len() == 1 {
        return Vec3::Y;
    }

    let normal = chain_axis_normalized(indices, pose);
    let base = pose[indices[0]];
    let mut best = Vec3::Y;
    let mut best_dot = f32::MAX;
    for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
        let dot = base.axis(axis).dot(normal).abs();
        if dot < best_dot {
            best_dot = dot;
            best = axis;
        }
    }
    best
}

fn pole_vector(local_axis: Vec3, indices: &[usize], pose: &[Transform]) -> Vec3 {
    let normal = chain_axis_normalized(indices, pose);
    let axis = pose[indices[0]].axis(local_axis);
    (axis - normal * axis.dot(normal)).normalize_or_zero()
}
