//! Chain pairs: a source chain bound to a target chain, with the per-chain transfer state.

use crate::chain::{BoneChain, ResolvedBoneChain};
use crate::fk::{ChainDecoderFk, ChainEncoderFk};
use crate::ik::ChainRetargeterIk;
use crate::pole::PoleVectorMatcher;
use crate::retarget_log::RetargetLog;
use crate::settings::{FkChainSettings, IkChainSettings, SpeedPlantingSettings};
use crate::skeleton::{RetargetSkeleton, TargetSkeleton};
use std::cmp::Ordering;

/// Resolved bone indices of both chains of a pair.
#[derive(Debug, Clone, Default)]
pub struct ChainPairBones {
    pub source_chain_name: String,
    pub target_chain_name: String,
    pub source_bone_indices: Vec<usize>,
    pub target_bone_indices: Vec<usize>,
}

impl ChainPairBones {
    /// Resolve both chains, warning about every problem. `None` if either fails.
    pub fn resolve(
        source_chain: &BoneChain,
        target_chain: &BoneChain,
        source_skeleton: &RetargetSkeleton,
        target_skeleton: &RetargetSkeleton,
        log: &mut RetargetLog,
    ) -> Option<Self> {
        let source = ResolvedBoneChain::resolve(source_chain, source_skeleton);
        if !source.is_valid() {
            source.report(source_chain, &source_skeleton.name, log);
            log.warn(format!(
                "IK Retargeter source bone chain, {}, is not compatible with skeleton, {}",
                source_chain.name, source_skeleton.name
            ));
            return None;
        }

        let target = ResolvedBoneChain::resolve(target_chain, target_skeleton);
        if !target.is_valid() {
            target.report(target_chain, &target_skeleton.name, log);
            log.warn(format!(
                "IK Retargeter target bone chain, {}, is not compatible with skeleton, {}",
                target_chain.name, target_skeleton.name
            ));
            return None;
        }

        Some(Self {
            source_chain_name: source_chain.name.clone(),
            target_chain_name: target_chain.name.clone(),
            source_bone_indices: source.bone_indices,
            target_bone_indices: target.bone_indices,
        })
    }

    /// Chains are evaluated parent first: by target start bone, then by name.
    pub fn evaluation_order(&self, other: &Self) -> Ordering {
        self.target_bone_indices
            .first()
            .cmp(&other.target_bone_indices.first())
            .then_with(|| self.target_chain_name.cmp(&other.target_chain_name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetargetChainPairFk {
    pub bones: ChainPairBones,
    pub settings: FkChainSettings,
    pub encoder: ChainEncoderFk,
    pub decoder: ChainDecoderFk,
    pub pole_vector_matcher: PoleVectorMatcher,
}

impl RetargetChainPairFk {
    /// Build the FK transfer state from the current retarget poses.
    pub fn new(
        bones: ChainPairBones,
        source_skeleton: &RetargetSkeleton,
        target_skeleton: &TargetSkeleton,
        log: &mut RetargetLog,
    ) -> Option<Self> {
        let mut pair = Self {
            bones,
            ..Default::default()
        };
        pair.initialize(source_skeleton, target_skeleton, log)
            .then_some(pair)
    }

    /// (Re)build encoder, decoder and pole matcher against the skeletons' retarget poses.
    pub fn initialize(
        &mut self,
        source_skeleton: &RetargetSkeleton,
        target_skeleton: &TargetSkeleton,
        log: &mut RetargetLog,
    ) -> bool {
        let target = &target_skeleton.skeleton;
        let bones = &self.bones;

        if !self.encoder.chain.initialize(
            source_skeleton,
            &bones.source_bone_indices,
            &source_skeleton.retarget_global_pose,
            log,
        ) {
            log.warn(format!(
                "IK Retargeter failed to initialize FK encoder, {}, on skeleton, {}",
                bones.source_chain_name, source_skeleton.name
            ));
            return false;
        }

        if !self.decoder.chain.initialize(
            target,
            &bones.target_bone_indices,
            &target.retarget_global_pose,
            log,
        ) {
            log.warn(format!(
                "IK Retargeter failed to initialize FK decoder, {}, on skeleton, {}",
                bones.target_chain_name, target.name
            ));
            return false;
        }

        if !self.pole_vector_matcher.initialize(
            &bones.source_bone_indices,
            &bones.target_bone_indices,
            &source_skeleton.retarget_global_pose,
            &target.retarget_global_pose,
            target,
        ) {
            log.warn(format!(
                "IK Retargeter failed to initialize pole matching for chain, {}, on skeleton, {}",
                bones.target_chain_name, target.name
            ));
            return false;
        }

        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetargetChainPairIk {
    pub bones: ChainPairBones,
    pub ik_goal_name: String,
    pub settings: IkChainSettings,
    pub speed_planting: SpeedPlantingSettings,
    pub retargeter: ChainRetargeterIk,
}

impl RetargetChainPairIk {
    /// `None` when the target chain has no IK goal or either limb is unusable.
    pub fn new(
        bones: ChainPairBones,
        target_chain: &BoneChain,
        source_skeleton: &RetargetSkeleton,
        target_skeleton: &TargetSkeleton,
        log: &mut RetargetLog,
    ) -> Option<Self> {
        let goal = target_chain.ik_goal.as_deref().filter(|g| !g.is_empty())?;
        let mut pair = Self {
            bones,
            ik_goal_name: goal.to_string(),
            ..Default::default()
        };
        pair.initialize(source_skeleton, target_skeleton, log)
            .then_some(pair)
    }

    pub fn initialize(
        &mut self,
        source_skeleton: &RetargetSkeleton,
        target_skeleton: &TargetSkeleton,
        log: &mut RetargetLog,
    ) -> bool {
        let target = &target_skeleton.skeleton;
        let bones = &self.bones;

        if !self.retargeter.initialize_source(
            &bones.source_bone_indices,
            &source_skeleton.retarget_global_pose,
            log,
        ) {
            log.warn(format!(
                "IK Retargeter failed to initialize IK encoder, {}, on skeleton, {}",
                bones.source_chain_name, source_skeleton.name
            ));
            return false;
        }

        if !self.retargeter.initialize_target(
            &bones.target_bone_indices,
            &target.retarget_global_pose,
            log,
        ) {
            log.warn(format!(
                "IK Retargeter failed to initialize IK decoder, {}, on skeleton, {}",
                bones.target_chain_name, target.name
            ));
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonAsset;
    use crate::transform::Transform;
    use glam::Vec3;

    fn skeletons() -> (RetargetSkeleton, TargetSkeleton) {
        let asset = SkeletonAsset::new("arm")
            .with_bone("root", None, Transform::IDENTITY)
            .and_then(|a| a.with_bone("shoulder", Some("root"), Transform::from_position(Vec3::Y * 140.0)))
            .and_then(|a| a.with_bone("elbow", Some("shoulder"), Transform::from_position(Vec3::X * 30.0)))
            .and_then(|a| a.with_bone("wrist", Some("elbow"), Transform::from_position(Vec3::X * 25.0)))
            .unwrap();
        let mut source = RetargetSkeleton::new();
        source.initialize(&asset, None, None);
        let mut target = TargetSkeleton::new();
        target.initialize(&asset, None, None);
        (source, target)
    }

    #[test]
    fn test_pairs_from_valid_chains() {
        let (source, target) = skeletons();
        let chain = BoneChain::new("Arm", "shoulder", "wrist").with_ik_goal("hand_goal");
        let mut log = RetargetLog::new("test");

        let bones = ChainPairBones::resolve(&chain, &chain, &source, &target.skeleton, &mut log).unwrap();
        assert_eq!(bones.target_bone_indices, vec![1, 2, 3]);

        let fk = RetargetChainPairFk::new(bones.clone(), &source, &target, &mut log).unwrap();
        assert_eq!(fk.decoder.chain.params.len(), 3);

        let ik = RetargetChainPairIk::new(bones, &chain, &source, &target, &mut log).unwrap();
        assert_eq!(ik.ik_goal_name, "hand_goal");
        assert_eq!(log.warning_count(), 0);
    }

    #[test]
    fn test_chain_without_goal_has_no_ik_pair() {
        let (source, target) = skeletons();
        let chain = BoneChain::new("Arm", "shoulder", "wrist");
        let mut log = RetargetLog::new("test");
        let bones = ChainPairBones::resolve(&chain, &chain, &source, &target.skeleton, &mut log).unwrap();
        assert!(RetargetChainPairIk::new(bones, &chain, &source, &target, &mut log).is_none());
    }

    #[test]
    fn test_invalid_chain_warns() {
        let (source, target) = skeletons();
        let good = BoneChain::new("Arm", "shoulder", "wrist");
        let reversed = BoneChain::new("Arm", "wrist", "shoulder");
        let mut log = RetargetLog::new("test");

        assert!(ChainPairBones::resolve(&good, &reversed, &source, &target.skeleton, &mut log).is_none());
        // one for the hierarchy problem, one for the incompatible chain
        assert_eq!(log.warning_count(), 2);
    }

    #[test]
    fn test_evaluation_order() {
        let a = ChainPairBones {
            target_chain_name: "b".into(),
            target_bone_indices: vec![2, 3],
            ..Default::default()
        };
        let b = ChainPairBones {
            target_chain_name: "a".into(),
            target_bone_indices: vec![2, 4],
            ..Default::default()
        };
        let c = ChainPairBones {
            target_chain_name: "z".into(),
            target_bone_indices: vec![1],
            ..Default::default()
        };
        let mut pairs = [a, b, c];
        pairs.sort_by(|x, y| x.evaluation_order(y));
        let names: Vec<_> = pairs.iter().map(|p| p.target_chain_name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "b"]);
    }
}
