//! Root retargeting
//!
//! The source root's position is normalized by its rest height and re-expanded by the target's
//! rest height, so characters of different sizes cover proportional distances.

use crate::retarget_log::RetargetLog;
use crate::settings::RootSettings;
use crate::skeleton::{RetargetSkeleton, TargetSkeleton};
use crate::transform::{nlerp, Transform, KINDA_SMALL_NUMBER};
use glam::{Quat, Vec3};

#[derive(Debug, Clone, Default)]
pub struct RootSource {
    pub bone_name: String,
    pub bone_index: Option<usize>,
    pub initial_rotation: Quat,
    pub initial_height_inverse: f32,
    pub current_position: Vec3,
    pub current_position_normalized: Vec3,
    pub current_rotation: Quat,
}

#[derive(Debug, Clone, Default)]
pub struct RootTarget {
    pub bone_name: String,
    pub bone_index: Option<usize>,
    pub initial_position: Vec3,
    pub initial_rotation: Quat,
    pub initial_height: f32,
    /// Output translation minus the plain height-scaled translation.
    pub root_translation_delta: Vec3,
    /// Retargeted rotation relative to the rest rotation.
    pub root_rotation_delta: Quat,
}

#[derive(Debug, Clone)]
pub struct RootRetargeter {
    pub source: RootSource,
    pub target: RootTarget,
    pub settings: RootSettings,
    global_scale: Vec3,
}

impl Default for RootRetargeter {
    fn default() -> Self {
        Self::new()
    }
}

impl RootRetargeter {
    pub fn new() -> Self {
        Self {
            source: RootSource::default(),
            target: RootTarget::default(),
            settings: RootSettings::default(),
            global_scale: Vec3::ONE,
        }
    }

    pub fn reset(&mut self) {
        self.source = RootSource::default();
        self.target = RootTarget::default();
        self.global_scale = Vec3::ONE;
    }

    /// Target rest height divided by source rest height, set once at initialization.
    pub fn global_scale_vector(&self) -> Vec3 {
        self.global_scale
    }

    pub fn initialize_source(
        &mut self,
        root_bone: &str,
        skeleton: &RetargetSkeleton,
        log: &mut RetargetLog,
    ) -> bool {
        self.source.bone_name = root_bone.to_string();
        self.source.bone_index = skeleton.find_bone_index_by_name(root_bone);
        let Some(index) = self.source.bone_index else {
            log.warn(format!(
                "IK Retargeter could not find source root bone, {} in mesh {}",
                root_bone, skeleton.name
            ));
            return false;
        };

        let initial = skeleton.retarget_global_pose[index];
        self.source.initial_rotation = initial.rotation;

        let mut height = initial.position.y;
        if height < KINDA_SMALL_NUMBER {
            log.error(
                "The source retarget root bone is very near the ground plane. \
                 Create a retarget pose with the retarget root at the correct height.",
            );
            height = 1.0;
        }
        self.source.initial_height_inverse = 1.0 / height;

        true
    }

    pub fn initialize_target(
        &mut self,
        root_bone: &str,
        skeleton: &TargetSkeleton,
        log: &mut RetargetLog,
    ) -> bool {
        self.target.bone_name = root_bone.to_string();
        self.target.bone_index = skeleton.skeleton.find_bone_index_by_name(root_bone);
        let Some(index) = self.target.bone_index else {
            log.warn(format!(
                "IK Retargeter could not find target root bone, {} in mesh {}",
                root_bone, skeleton.skeleton.name
            ));
            return false;
        };

        let initial = skeleton.skeleton.retarget_global_pose[index];
        self.target.initial_height = initial.position.y;
        self.target.initial_rotation = initial.rotation;
        self.target.initial_position = initial.position;

        let scale = self.source.initial_height_inverse * self.target.initial_height;
        self.global_scale = Vec3::splat(scale);

        true
    }

    pub fn encode_pose(&mut self, source_global_pose: &[Transform]) {
        let Some(index) = self.source.bone_index else {
            return;
        };
        let transform = source_global_pose[index];
        self.source.current_position = transform.position;
        self.source.current_position_normalized =
            transform.position * self.source.initial_height_inverse;
        self.source.current_rotation = transform.rotation;
    }

    pub fn decode_pose(&mut self, target_global_pose: &mut [Transform]) {
        let Some(index) = self.target.bone_index else {
            return;
        };
        let settings = &self.settings;
        let target = &mut self.target;

        let retargeted_position = self.source.current_position_normalized * target.initial_height;
        let blend = settings.blend_to_source * settings.blend_to_source_weights;
        let mut position =
            retargeted_position + (self.source.current_position - retargeted_position) * blend;

        let mut scaled = position;
        scaled.y *= settings.scale_vertical;
        let offset = (scaled - target.initial_position)
            * Vec3::new(settings.scale_horizontal, 1.0, settings.scale_horizontal);
        position = target.initial_position + offset;

        position += settings.translation_offset;
        position = target
            .initial_position
            .lerp(position, settings.translation_alpha);
        target.root_translation_delta = position - retargeted_position;

        let rotation_delta = self.source.current_rotation * self.source.initial_rotation.inverse();
        let retargeted_rotation = rotation_delta * target.initial_rotation;
        let rotation = nlerp(
            target.initial_rotation,
            retargeted_rotation * settings.rotation_offset,
            settings.rotation_alpha,
        );
        target.root_rotation_delta = retargeted_rotation * target.initial_rotation.inverse();

        let root = &mut target_global_pose[index];
        root.position = position;
        root.rotation = rotation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonAsset;

    fn skeletons(source_height: f32, target_height: f32) -> (RetargetSkeleton, TargetSkeleton) {
        let mut source_asset = SkeletonAsset::new("source");
        source_asset
            .add_bone("pelvis", None, Transform::from_position(Vec3::Y * source_height))
            .unwrap();
        let mut target_asset = SkeletonAsset::new("target");
        target_asset
            .add_bone("hips", None, Transform::from_position(Vec3::Y * target_height))
            .unwrap();

        let mut source = RetargetSkeleton::new();
        source.initialize(&source_asset, None, None);
        let mut target = TargetSkeleton::new();
        target.initialize(&target_asset, None, None);
        (source, target)
    }

    fn retargeter(source_height: f32, target_height: f32) -> (RootRetargeter, TargetSkeleton) {
        let (source, target) = skeletons(source_height, target_height);
        let mut log = RetargetLog::new("test");
        let mut root = RootRetargeter::new();
        assert!(root.initialize_source("pelvis", &source, &mut log));
        assert!(root.initialize_target("hips", &target, &mut log));
        (root, target)
    }

    #[test]
    fn test_global_scale_factor() {
        let (mut root, mut target) = retargeter(100.0, 150.0);
        assert_eq!(root.global_scale_vector(), Vec3::splat(1.5));

        root.encode_pose(&[Transform::from_position(Vec3::new(30.0, 80.0, -5.0))]);
        root.decode_pose(&mut target.output_global_pose);
        assert_eq!(root.global_scale_vector(), Vec3::splat(1.5));
    }

    #[test]
    fn test_vertical_displacement_scales() {
        let (mut root, mut target) = retargeter(100.0, 150.0);
        root.encode_pose(&[Transform::from_position(Vec3::Y * 110.0)]);
        root.decode_pose(&mut target.output_global_pose);

        let displacement = target.output_global_pose[0].position - root.target.initial_position;
        assert!(displacement.abs_diff_eq(Vec3::Y * 15.0, 1e-4));
        assert!(root.target.root_translation_delta.abs_diff_eq(Vec3::ZERO, 1e-4));
    }

    #[test]
    fn test_ground_level_root_falls_back_to_unit_height() {
        let (source, _) = skeletons(0.0, 150.0);
        let mut log = RetargetLog::new("test");
        let mut root = RootRetargeter::new();
        assert!(root.initialize_source("pelvis", &source, &mut log));
        assert_eq!(root.source.initial_height_inverse, 1.0);
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn test_blend_to_source_and_alpha() {
        let (mut root, mut target) = retargeter(100.0, 200.0);
        root.settings.blend_to_source = 1.0;
        root.encode_pose(&[Transform::from_position(Vec3::new(10.0, 100.0, 0.0))]);
        root.decode_pose(&mut target.output_global_pose);
        assert!(target.output_global_pose[0]
            .position
            .abs_diff_eq(Vec3::new(10.0, 100.0, 0.0), 1e-4));

        root.settings.blend_to_source = 0.0;
        root.settings.translation_alpha = 0.0;
        root.decode_pose(&mut target.output_global_pose);
        assert!(target.output_global_pose[0]
            .position
            .abs_diff_eq(root.target.initial_position, 1e-4));
    }

    #[test]
    fn test_rotation_delta_transfers() {
        let (mut root, mut target) = retargeter(100.0, 100.0);
        let turn = Quat::from_rotation_y(0.7);
        root.encode_pose(&[Transform::from_position_rotation(Vec3::Y * 100.0, turn)]);
        root.decode_pose(&mut target.output_global_pose);
        assert!(crate::transform::quat_equals(
            target.output_global_pose[0].rotation,
            turn,
            1e-5
        ));
        assert!(crate::transform::quat_equals(
            root.target.root_rotation_delta,
            turn,
            1e-5
        ));
    }

    #[test]
    fn test_missing_root_bone() {
        let (source, _) = skeletons(100.0, 100.0);
        let mut log = RetargetLog::new("test");
        let mut root = RootRetargeter::new();
        assert!(!root.initialize_source("nope", &source, &mut log));
        assert_eq!(log.warning_count(), 1);
    }
}
