//! FK chain transfer
//!
//! A source chain is encoded as global and chain-local transforms each frame. The target decoder
//! copies rotation deltas (current relative to rest) onto its own rest pose, bone by bone, using
//! one of the [`FkRotationMode`] correspondences.

use crate::retarget_log::RetargetLog;
use crate::root::RootRetargeter;
use crate::settings::{FkChainSettings, FkRotationMode, FkTranslationMode};
use crate::skeleton::{RetargetSkeleton, TargetSkeleton};
use crate::transform::{is_nearly_equal, nlerp, Transform, KINDA_SMALL_NUMBER};

/// State shared by the source encoder and target decoder of one chain.
#[derive(Debug, Clone, Default)]
pub struct ChainFk {
    pub initial_global_transforms: Vec<Transform>,
    pub initial_local_transforms: Vec<Transform>,
    pub current_global_transforms: Vec<Transform>,
    pub current_local_transforms: Vec<Transform>,
    /// Normalized arc length of each bone along the rest pose.
    pub params: Vec<f32>,
    pub chain_parent_bone_index: Option<usize>,
    pub chain_parent_initial_global_transform: Transform,
}

impl ChainFk {
    pub fn initialize(
        &mut self,
        skeleton: &RetargetSkeleton,
        bone_indices: &[usize],
        initial_global_pose: &[Transform],
        log: &mut RetargetLog,
    ) -> bool {
        let Some(&first) = bone_indices.first() else {
            return false;
        };

        self.initial_global_transforms = bone_indices
            .iter()
            .map(|&index| initial_global_pose[index])
            .collect();
        self.current_global_transforms = self.initial_global_transforms.clone();
        self.initial_local_transforms =
            local_space_of_chain(skeleton, initial_global_pose, bone_indices);
        self.current_local_transforms = self.initial_local_transforms.clone();

        self.chain_parent_bone_index = skeleton.get_parent_index(first);
        self.chain_parent_initial_global_transform = self
            .chain_parent_bone_index
            .map_or(Transform::IDENTITY, |parent| initial_global_pose[parent]);

        self.calculate_bone_parameters(log)
    }

    fn calculate_bone_parameters(&mut self, log: &mut RetargetLog) -> bool {
        self.params.clear();

        if self.initial_global_transforms.len() == 1 {
            self.params.push(1.0);
            return true;
        }

        let mut distances = Vec::with_capacity(self.initial_global_transforms.len());
        let mut total = 0.0;
        distances.push(0.0);
        for pair in self.initial_global_transforms.windows(2) {
            total += pair[1].position.distance(pair[0].position);
            distances.push(total);
        }

        if total <= KINDA_SMALL_NUMBER {
            log.warn("TinyBoneChain: IK Retargeter bone chain length is too small to reliably retarget.");
            return false;
        }

        self.params = distances.into_iter().map(|d| d / total).collect();
        true
    }

    /// Sample `transforms` at a normalized arc length, blending the two bracketing bones.
    pub fn get_transform_at_param(&self, transforms: &[Transform], param: f32) -> Transform {
        transform_at_param(transforms, &self.params, param)
    }

    /// Place the chain in its retarget pose, hanging off its parent's current transform.
    pub fn put_current_transforms_in_ref_pose(
        &mut self,
        bone_indices: &[usize],
        skeleton: &RetargetSkeleton,
        current_global_pose: &[Transform],
    ) {
        for (chain_index, &bone) in bone_indices.iter().enumerate() {
            self.current_global_transforms[chain_index] = if chain_index == 0 {
                skeleton.get_global_retarget_pose_of_single_bone(bone, current_global_pose)
            } else {
                self.current_global_transforms[chain_index - 1] * skeleton.retarget_local_pose[bone]
            };
        }
    }
}

pub(crate) fn transform_at_param(transforms: &[Transform], params: &[f32], param: f32) -> Transform {
    debug_assert_eq!(transforms.len(), params.len());

    if params.len() == 1 || param < KINDA_SMALL_NUMBER {
        return transforms[0];
    }
    let last = transforms[transforms.len() - 1];
    if param > 1.0 - KINDA_SMALL_NUMBER {
        return last;
    }

    for index in 1..params.len() {
        let current = params[index];
        if current < param {
            continue;
        }
        let previous = params[index - 1];
        let span = current - previous;
        if span <= KINDA_SMALL_NUMBER {
            return transforms[index];
        }
        let alpha = (param - previous) / span;
        return transforms[index - 1].blend(&transforms[index], alpha);
    }

    last
}

/// Transforms of each chain bone relative to its actual parent (global for a skeleton root).
pub fn local_space_of_chain(
    skeleton: &RetargetSkeleton,
    global_pose: &[Transform],
    bone_indices: &[usize],
) -> Vec<Transform> {
    bone_indices
        .iter()
        .map(|&bone| match skeleton.get_parent_index(bone) {
            Some(parent) => global_pose[bone].relative_to(&global_pose[parent]),
            None => global_pose[bone],
        })
        .collect()
}

/// Source side of an FK chain.
#[derive(Debug, Clone, Default)]
pub struct ChainEncoderFk {
    pub chain: ChainFk,
    pub chain_parent_current_global_transform: Transform,
}

impl ChainEncoderFk {
    pub fn encode_pose(
        &mut self,
        skeleton: &RetargetSkeleton,
        bone_indices: &[usize],
        source_global_pose: &[Transform],
    ) {
        for (chain_index, &bone) in bone_indices.iter().enumerate() {
            self.chain.current_global_transforms[chain_index] = source_global_pose[bone];
        }
        self.chain.current_local_transforms =
            local_space_of_chain(skeleton, source_global_pose, bone_indices);
        self.chain_parent_current_global_transform = self
            .chain
            .chain_parent_bone_index
            .map_or(Transform::IDENTITY, |parent| source_global_pose[parent]);
    }

    /// Re-hang the encoded chain off a different parent transform, keeping its local pose.
    pub fn transform_current_chain_transforms(&mut self, new_parent: &Transform) {
        let chain = &mut self.chain;
        for index in 0..chain.current_global_transforms.len() {
            let parent = if index == 0 {
                *new_parent
            } else {
                chain.current_global_transforms[index - 1]
            };
            chain.current_global_transforms[index] = parent * chain.current_local_transforms[index];
        }
    }
}

/// Target side of an FK chain.
#[derive(Debug, Clone, Default)]
pub struct ChainDecoderFk {
    pub chain: ChainFk,
    /// Non-retargeted ancestors between this chain and the nearest driven bone, root first.
    pub intermediate_parent_indices: Vec<usize>,
}

impl ChainDecoderFk {
    pub fn initialize_intermediate_parent_indices(
        &mut self,
        retarget_root: Option<usize>,
        chain_root: usize,
        target_skeleton: &TargetSkeleton,
    ) {
        self.intermediate_parent_indices.clear();
        let mut parent = target_skeleton.skeleton.get_parent_index(chain_root);
        while let Some(index) = parent {
            if Some(index) == retarget_root || target_skeleton.is_retargeted(index) {
                break;
            }
            self.intermediate_parent_indices.push(index);
            parent = target_skeleton.skeleton.get_parent_index(index);
        }
        self.intermediate_parent_indices.reverse();
    }

    fn update_intermediate_parents(&self, target_skeleton: &TargetSkeleton, pose: &mut [Transform]) {
        for &index in &self.intermediate_parent_indices {
            pose[index] = target_skeleton
                .skeleton
                .get_global_retarget_pose_of_single_bone(index, pose);
        }
    }

    pub fn decode_pose(
        &mut self,
        root: &RootRetargeter,
        settings: &FkChainSettings,
        target_bone_indices: &[usize],
        source_chain: &mut ChainEncoderFk,
        target_skeleton: &TargetSkeleton,
        pose: &mut [Transform],
    ) {
        debug_assert_eq!(target_bone_indices.len(), self.chain.current_global_transforms.len());

        self.update_intermediate_parents(target_skeleton, pose);

        // align the source chain's parent frame with the target's current parent frame
        let source_parent_initial_delta = source_chain
            .chain
            .chain_parent_initial_global_transform
            .relative_to(&self.chain.chain_parent_initial_global_transform);
        let target_parent_current = self
            .chain
            .chain_parent_bone_index
            .map_or(Transform::IDENTITY, |parent| pose[parent]);
        source_chain.transform_current_chain_transforms(
            &(target_parent_current * source_parent_initial_delta),
        );

        let skeleton = &target_skeleton.skeleton;

        if !settings.enable_fk {
            self.chain
                .put_current_transforms_in_ref_pose(target_bone_indices, skeleton, pose);
            for (chain_index, &bone) in target_bone_indices.iter().enumerate() {
                pose[bone] = self.chain.current_global_transforms[chain_index];
            }
            return;
        }

        let source = &source_chain.chain;
        let num_source = source.current_global_transforms.len();
        let num_target = target_bone_indices.len();
        let target_start = num_target.saturating_sub(num_source);
        let source_start = num_source.saturating_sub(num_target);

        for (chain_index, &bone) in target_bone_indices.iter().enumerate() {
            let target_initial = self.chain.initial_global_transforms[chain_index];

            let (source_current, source_initial) = match settings.rotation_mode {
                FkRotationMode::Interpolated => {
                    let param = self.chain.params[chain_index];
                    (
                        source.get_transform_at_param(&source.current_global_transforms, param),
                        source.get_transform_at_param(&source.initial_global_transforms, param),
                    )
                }
                FkRotationMode::OneToOne => {
                    let index = chain_index.min(num_source - 1);
                    (
                        source.current_global_transforms[index],
                        source.initial_global_transforms[index],
                    )
                }
                FkRotationMode::OneToOneReversed => {
                    if chain_index < target_start {
                        (
                            source.initial_global_transforms[0],
                            source.initial_global_transforms[0],
                        )
                    } else {
                        let index = source_start + (chain_index - target_start);
                        (
                            source.current_global_transforms[index],
                            source.initial_global_transforms[index],
                        )
                    }
                }
                FkRotationMode::None => (
                    source_chain.chain_parent_current_global_transform
                        * source.initial_local_transforms[0],
                    source.initial_global_transforms[0],
                ),
            };

            let rotation_delta = source_current.rotation * source_initial.rotation.inverse();
            let rotation = (rotation_delta * target_initial.rotation).normalize();

            let parent_global = skeleton
                .get_parent_index(bone)
                .map_or(Transform::IDENTITY, |parent| pose[parent]);
            let position = match settings.translation_mode {
                FkTranslationMode::None => {
                    parent_global.transform_point(skeleton.retarget_local_pose[bone].position)
                }
                FkTranslationMode::GloballyScaled => {
                    source_current.position * root.global_scale_vector()
                }
                FkTranslationMode::Absolute => source_current.position,
            };

            let scale = source_current.scale + (target_initial.scale - source_initial.scale);

            let output = Transform::new(position, rotation, scale);
            self.chain.current_global_transforms[chain_index] = output;
            pose[bone] = output;
        }

        let blend_rotation = !is_nearly_equal(settings.rotation_alpha, 1.0);
        let blend_translation = !is_nearly_equal(settings.translation_alpha, 1.0);
        if !(blend_rotation || blend_translation) {
            return;
        }

        // blend against the retarget pose in local space so parents don't skew children
        let new_locals = local_space_of_chain(skeleton, pose, target_bone_indices);
        for (chain_index, &bone) in target_bone_indices.iter().enumerate() {
            let reference = self.chain.initial_local_transforms[chain_index];
            let mut local = new_locals[chain_index];
            local.position = reference
                .position
                .lerp(local.position, settings.translation_alpha);
            local.rotation = nlerp(reference.rotation, local.rotation, settings.rotation_alpha);

            pose[bone] = match skeleton.get_parent_index(bone) {
                Some(parent) => pose[parent] * local,
                None => local,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonAsset;
    use glam::{Quat, Vec3};
    use std::f32::consts::FRAC_PI_2;

    fn arm(name: &str, lengths: &[f32]) -> SkeletonAsset {
        let mut asset = SkeletonAsset::new(name);
        let mut parent = asset
            .add_bone("root", None, Transform::from_position(Vec3::Y * 100.0))
            .unwrap();
        for (i, length) in lengths.iter().enumerate() {
            let offset = if i == 0 { 0.0 } else { lengths[i - 1] };
            parent = asset
                .add_bone(
                    format!("bone_{}", i),
                    Some(parent),
                    Transform::from_position(Vec3::X * offset),
                )
                .unwrap();
        }
        asset
    }

    struct Fixture {
        source: RetargetSkeleton,
        target: TargetSkeleton,
        source_indices: Vec<usize>,
        target_indices: Vec<usize>,
        encoder: ChainEncoderFk,
        decoder: ChainDecoderFk,
        root: RootRetargeter,
    }

    fn fixture(source_lengths: &[f32], target_lengths: &[f32]) -> Fixture {
        let mut source = RetargetSkeleton::new();
        source.initialize(&arm("source", source_lengths), None, None);
        let mut target = TargetSkeleton::new();
        target.initialize(&arm("target", target_lengths), None, None);

        let source_indices: Vec<usize> = (1..=source_lengths.len()).collect();
        let target_indices: Vec<usize> = (1..=target_lengths.len()).collect();

        let mut log = RetargetLog::new("test");
        let mut encoder = ChainEncoderFk::default();
        assert!(encoder.chain.initialize(
            &source,
            &source_indices,
            &source.retarget_global_pose,
            &mut log
        ));
        let mut decoder = ChainDecoderFk::default();
        assert!(decoder.chain.initialize(
            &target.skeleton,
            &target_indices,
            &target.skeleton.retarget_global_pose,
            &mut log
        ));

        Fixture {
            source,
            target,
            source_indices,
            target_indices,
            encoder,
            decoder,
            root: RootRetargeter::new(),
        }
    }

    fn raised_source_pose(fixture: &Fixture) -> Vec<Transform> {
        // rotate the first chain bone 90 degrees about Z, children follow
        let mut local: Vec<Transform> = fixture.source.retarget_local_pose.clone();
        local[1].rotation = Quat::from_rotation_z(FRAC_PI_2);
        let mut global = vec![Transform::IDENTITY; local.len()];
        fixture
            .source
            .update_global_transforms_below_bone(None, &local, &mut global);
        global
    }

    fn run(fixture: &mut Fixture, settings: &FkChainSettings, source_pose: &[Transform]) -> Vec<Transform> {
        fixture
            .encoder
            .encode_pose(&fixture.source, &fixture.source_indices, source_pose);
        let mut pose = fixture.target.skeleton.retarget_global_pose.clone();
        fixture.decoder.decode_pose(
            &fixture.root,
            settings,
            &fixture.target_indices,
            &mut fixture.encoder,
            &fixture.target,
            &mut pose,
        );
        pose
    }

    #[test]
    fn test_params_are_normalized_arc_length() {
        let fixture = fixture(&[10.0, 30.0, 5.0], &[1.0, 1.0, 2.0, 4.0]);
        let params = &fixture.encoder.chain.params;
        assert_eq!(params.first(), Some(&0.0));
        assert_eq!(params.last(), Some(&1.0));
        assert!(params.windows(2).all(|w| w[0] <= w[1]));
        assert!((params[1] - 0.25).abs() < 1e-6);

        let params = &fixture.decoder.chain.params;
        assert_eq!(params.len(), 4);
        assert!((params[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_length_chain_rejected() {
        let mut source = RetargetSkeleton::new();
        source.initialize(&arm("flat", &[0.0, 0.0, 0.0]), None, None);
        let mut log = RetargetLog::new("test");
        let mut chain = ChainFk::default();
        assert!(!chain.initialize(&source, &[1, 2, 3], &source.retarget_global_pose, &mut log));
        assert_eq!(log.warning_count(), 1);
    }

    #[test]
    fn test_transform_at_param_blends_bracketing_bones() {
        let transforms = [
            Transform::from_position(Vec3::ZERO),
            Transform::from_position(Vec3::X * 10.0),
            Transform::from_position(Vec3::X * 20.0),
        ];
        let params = [0.0, 0.5, 1.0];
        let sample = transform_at_param(&transforms, &params, 0.75);
        assert!(sample.position.abs_diff_eq(Vec3::X * 15.0, 1e-5));
        assert_eq!(transform_at_param(&transforms, &params, 0.0), transforms[0]);
        assert_eq!(transform_at_param(&transforms, &params, 1.0), transforms[2]);
    }

    #[test]
    fn test_disabled_fk_reproduces_retarget_pose() {
        let mut fixture = fixture(&[10.0, 10.0, 10.0], &[12.0, 8.0, 9.0]);
        let source_pose = raised_source_pose(&fixture);
        let settings = FkChainSettings {
            enable_fk: false,
            ..Default::default()
        };
        let pose = run(&mut fixture, &settings, &source_pose);

        for &bone in &fixture.target_indices {
            assert!(pose[bone].equals(&fixture.target.skeleton.retarget_global_pose[bone], 1e-5));
        }
    }

    #[test]
    fn test_one_to_one_transfers_rotation_deltas() {
        let mut fixture = fixture(&[10.0, 10.0, 10.0], &[20.0, 15.0, 5.0]);
        let source_pose = raised_source_pose(&fixture);
        let settings = FkChainSettings::default().with_rotation_mode(FkRotationMode::OneToOne);
        let pose = run(&mut fixture, &settings, &source_pose);

        let raise = Quat::from_rotation_z(FRAC_PI_2);
        for &bone in &fixture.target_indices {
            let rest = fixture.target.skeleton.retarget_global_pose[bone].rotation;
            assert!(crate::transform::quat_equals(pose[bone].rotation, raise * rest, 1e-5));
        }
        // translation follows the parent and the rest offset only
        assert!(pose[2].position.abs_diff_eq(Vec3::new(0.0, 120.0, 0.0), 1e-3));
        assert!(pose[3].position.abs_diff_eq(Vec3::new(0.0, 135.0, 0.0), 1e-3));
    }

    #[test]
    fn test_one_to_one_reversed_aligns_tips() {
        let mut fixture = fixture(&[10.0, 10.0], &[5.0, 5.0, 5.0]);
        let mut source_pose = fixture.source.retarget_global_pose.clone();
        // bend only the source tip
        source_pose[2].rotation = Quat::from_rotation_y(0.5);
        let settings =
            FkChainSettings::default().with_rotation_mode(FkRotationMode::OneToOneReversed);
        let pose = run(&mut fixture, &settings, &source_pose);

        assert!(crate::transform::quat_equals(pose[1].rotation, Quat::IDENTITY, 1e-5));
        assert!(crate::transform::quat_equals(pose[2].rotation, Quat::IDENTITY, 1e-5));
        assert!(crate::transform::quat_equals(
            pose[3].rotation,
            Quat::from_rotation_y(0.5),
            1e-5
        ));
    }

    #[test]
    fn test_rotation_mode_none_keeps_chain_rigid() {
        let mut fixture = fixture(&[10.0, 10.0, 10.0], &[10.0, 10.0, 10.0]);
        let source_pose = raised_source_pose(&fixture);
        let settings = FkChainSettings::default().with_rotation_mode(FkRotationMode::None);
        let pose = run(&mut fixture, &settings, &source_pose);

        for &bone in &fixture.target_indices {
            assert!(pose[bone].equals(&fixture.target.skeleton.retarget_global_pose[bone], 1e-4));
        }
    }

    #[test]
    fn test_alpha_blend_is_monotonic() {
        let mut fixture = fixture(&[10.0, 10.0, 10.0], &[10.0, 10.0, 10.0]);
        let source_pose = raised_source_pose(&fixture);
        let rest = fixture.target.skeleton.retarget_global_pose.clone();

        let at = |fixture: &mut Fixture, alpha: f32| {
            let settings = FkChainSettings::default()
                .with_rotation_mode(FkRotationMode::OneToOne)
                .with_alphas(alpha, alpha);
            run(fixture, &settings, &source_pose)
        };

        let zero = at(&mut fixture, 0.0);
        for &bone in &fixture.target_indices.clone() {
            assert!(zero[bone].equals(&rest[bone], 1e-5));
        }

        let full = at(&mut fixture, 1.0);
        let mut previous_angle = 0.0;
        for step in 1..=4 {
            let pose = at(&mut fixture, step as f32 / 4.0);
            let angle = pose[1].rotation.angle_between(rest[1].rotation);
            assert!(angle >= previous_angle - 1e-5);
            previous_angle = angle;
        }
        assert!((previous_angle - full[1].rotation.angle_between(rest[1].rotation)).abs() < 1e-4);
    }

    #[test]
    fn test_intermediate_parents_skip_retargeted_bones() {
        let fixture = fixture(&[10.0, 10.0], &[10.0, 10.0, 10.0, 10.0]);
        let mut target = fixture.target.clone();
        target.set_bone_is_retargeted(1, true);

        let mut decoder = ChainDecoderFk::default();
        decoder.initialize_intermediate_parent_indices(Some(0), 4, &target);
        assert_eq!(decoder.intermediate_parent_indices, vec![2, 3]);

        decoder.initialize_intermediate_parent_indices(Some(0), 1, &target);
        assert!(decoder.intermediate_parent_indices.is_empty());
    }
}
