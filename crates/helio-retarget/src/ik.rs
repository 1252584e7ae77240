//! IK chain transfer
//!
//! The source limb is encoded as a reach vector: its start-to-end direction scaled by how
//! extended it is relative to its rest length. The target decoder turns that back into an IK goal
//! using the target limb's own rest length, then applies offsets, warping inputs and planting.

use crate::retarget_log::RetargetLog;
use crate::root::RootRetargeter;
use crate::settings::{IkChainSettings, SpeedPlantingSettings};
use crate::spring::{vector_spring_interp, SpringState};
use crate::transform::{is_nearly_equal, Transform, KINDA_SMALL_NUMBER};
use glam::{Quat, Vec3};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct IkSource {
    pub start_bone_index: usize,
    pub end_bone_index: usize,
    pub initial_end_position: Vec3,
    pub initial_end_rotation: Quat,
    pub inv_initial_length: f32,
    pub previous_end_position: Vec3,
    pub current_end_position: Vec3,
    /// Limb direction scaled by current length over rest length.
    pub current_end_direction_normalized: Vec3,
    pub current_end_rotation: Quat,
    pub current_height_from_ground_normalized: f32,
}

#[derive(Debug, Clone, Default)]
pub struct IkTarget {
    pub bone_index_a: usize,
    pub bone_index_c: usize,
    pub previous_end_position: Vec3,
    pub initial_end_position: Vec3,
    pub initial_end_rotation: Quat,
    pub initial_length: f32,
}

#[derive(Debug, Clone, Default)]
pub struct IkResults {
    pub end_effector_position: Vec3,
    pub end_effector_rotation: Quat,
    /// Always `Vec3::ONE`; nothing reads it.
    pub pole_vector_position: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct ChainRetargeterIk {
    pub source: IkSource,
    pub target: IkTarget,
    pub results: IkResults,
    planting_spring: SpringState,
    reset_this_tick: bool,
}

impl ChainRetargeterIk {
    pub fn initialize_source(
        &mut self,
        bone_indices: &[usize],
        initial_global_pose: &[Transform],
        log: &mut RetargetLog,
    ) -> bool {
        let (Some(&start), Some(&end)) = (bone_indices.first(), bone_indices.last()) else {
            return false;
        };
        if bone_indices.len() < 2 {
            log.warn("IK Retargeter trying to retarget source bone chain with IK but it has less than 2 joints.");
            return false;
        }

        self.source.start_bone_index = start;
        self.source.end_bone_index = end;

        let end_transform = initial_global_pose[end];
        self.source.previous_end_position = end_transform.position;
        self.source.initial_end_position = end_transform.position;
        self.source.initial_end_rotation = end_transform.rotation;

        let length = initial_global_pose[start]
            .position
            .distance(end_transform.position);
        if length <= KINDA_SMALL_NUMBER {
            log.warn("IK Retargeter trying to retarget source bone chain with IK, but it is zero length!");
            return false;
        }
        self.source.inv_initial_length = 1.0 / length;

        true
    }

    pub fn initialize_target(
        &mut self,
        bone_indices: &[usize],
        initial_global_pose: &[Transform],
        log: &mut RetargetLog,
    ) -> bool {
        if bone_indices.len() < 3 {
            log.warn("IK Retargeter trying to retarget target bone chain with IK but it has less than 3 joints.");
            return false;
        }

        let a = bone_indices[0];
        let c = bone_indices[bone_indices.len() - 1];
        let end = initial_global_pose[c];

        self.target = IkTarget {
            bone_index_a: a,
            bone_index_c: c,
            previous_end_position: end.position,
            initial_end_position: end.position,
            initial_end_rotation: end.rotation,
            initial_length: initial_global_pose[a].position.distance(end.position),
        };
        self.reset_this_tick = true;

        if self.target.initial_length <= KINDA_SMALL_NUMBER {
            log.warn("IK Retargeter trying to retarget target bone chain with IK, but it is zero length!");
            return false;
        }

        true
    }

    pub fn encode_pose(&mut self, source_global_pose: &[Transform]) {
        let start = source_global_pose[self.source.start_bone_index].position;
        let end_transform = source_global_pose[self.source.end_bone_index];
        let end = end_transform.position;

        let (direction, length) = direction_and_length(end - start);
        let normalized_length = length * self.source.inv_initial_length;

        let source = &mut self.source;
        source.previous_end_position = source.current_end_position;
        source.current_end_position = end;
        source.current_end_direction_normalized = direction * normalized_length;
        source.current_end_rotation = end_transform.rotation;
        source.current_height_from_ground_normalized =
            (end.y - source.initial_end_position.y) * source.inv_initial_length;
    }

    pub fn decode_pose(
        &mut self,
        settings: &IkChainSettings,
        planting: &SpeedPlantingSettings,
        root: &RootRetargeter,
        curves: &HashMap<String, f32>,
        delta_time: f32,
        pose: &[Transform],
    ) {
        let delta_rotation = self.source.current_end_rotation * self.source.initial_end_rotation.inverse();
        let goal_rotation =
            (delta_rotation * self.target.initial_end_rotation * settings.static_rotation_offset)
                .normalize();

        let affect_weights = root.settings.affect_ik_weights();
        let inv_root_modification = root.target.root_translation_delta * (Vec3::ONE - affect_weights);
        let start = pose[self.target.bone_index_a].position - inv_root_modification;
        let mut goal = start + self.source.current_end_direction_normalized * self.target.initial_length;

        if settings.blend_to_source > KINDA_SMALL_NUMBER {
            let root_modification = root.target.root_translation_delta * affect_weights;
            let weight = settings.blend_to_source * settings.blend_to_source_weights;
            let source_location = self.source.current_end_position + root_modification;
            goal += (source_location - goal) * weight;
        }

        goal += settings.static_offset;
        goal += goal_rotation * settings.static_local_offset;
        goal.y *= settings.scale_vertical;

        if !is_nearly_equal(settings.extension, 1.0) {
            goal = start + (goal - start) * settings.extension;
        }

        let speed = (!self.reset_this_tick && planting.enable_speed_planting)
            .then(|| curves.get(&planting.speed_curve_name).copied())
            .flatten();
        if let Some(speed) = speed {
            if speed < 0.0 || speed > planting.speed_threshold {
                goal = vector_spring_interp(
                    self.target.previous_end_position,
                    goal,
                    &mut self.planting_spring,
                    planting.unplant_stiffness,
                    planting.unplant_critical_damping,
                    delta_time,
                );
            } else {
                self.planting_spring.reset();
                goal = self.target.previous_end_position;
            }
        }

        self.results = IkResults {
            end_effector_position: goal,
            end_effector_rotation: goal_rotation,
            pole_vector_position: Vec3::ONE,
        };
        self.target.previous_end_position = goal;
        self.reset_this_tick = false;
    }

    /// Drop spring velocity and skip planting on the next decode.
    pub fn reset_planting(&mut self) {
        self.planting_spring.reset();
        self.reset_this_tick = true;
    }
}

fn direction_and_length(v: Vec3) -> (Vec3, f32) {
    let length = v.length();
    if length <= f32::EPSILON {
        (Vec3::ZERO, 0.0)
    } else {
        (v / length, length)
    }
}
