//! Retarget processor
//!
//! Owns the runtime state for one source skeleton, one target skeleton and one retargeter asset,
//! and turns source poses into target poses frame by frame:
//!
//! 1. apply the settings profile
//! 2. reset the output to the target retarget pose
//! 3. root, then forward kinematics for every bone below it
//! 4. FK chains, then forward kinematics for bones no chain drives
//! 5. IK goals, stride warping and the IK solve
//! 6. pole vector matching
//! 7. post-process ops
//!
//! Initialization is the heavy step (allocates, resolves chains, builds the op stack). It is
//! skipped when called again with the same assets and asset version.

use crate::asset::RetargeterAsset;
use crate::chain::ResolvedBoneChain;
use crate::ops::{OpInitContext, OpRunContext, OpStack};
use crate::pair::{ChainPairBones, RetargetChainPairFk, RetargetChainPairIk};
use crate::profile::RetargetProfile;
use crate::retarget_log::RetargetLog;
use crate::rig::IkRigDefinition;
use crate::root::RootRetargeter;
use crate::settings::{GlobalSettings, WarpingDirectionSource};
use crate::skeleton::{RetargetSkeleton, SkeletonAsset, TargetSkeleton};
use crate::solver::{IkGoal, IkRigSolver, LimbSolver};
use crate::stride::BodyFrame;
use crate::transform::Transform;
use std::collections::HashMap;
use std::sync::Arc;

/// Which skeleton of the pair an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetargetSide {
    Source,
    Target,
}

/// Name and version of the retarget pose a skeleton was last generated with.
#[derive(Debug, Clone, Default, PartialEq)]
struct AppliedPose {
    name: String,
    version: u32,
}

pub struct RetargetProcessor {
    source_skeleton: RetargetSkeleton,
    target_skeleton: TargetSkeleton,
    root_retargeter: RootRetargeter,
    global_settings: GlobalSettings,
    chain_pairs_fk: Vec<RetargetChainPairFk>,
    chain_pairs_ik: Vec<RetargetChainPairIk>,
    ik_solver: Box<dyn IkRigSolver>,
    op_stack: OpStack,
    output_curves: HashMap<String, f32>,
    log: RetargetLog,

    source_asset: Option<Arc<SkeletonAsset>>,
    target_asset: Option<Arc<SkeletonAsset>>,
    retargeter_asset: Option<Arc<RetargeterAsset>>,
    asset_version_initialized_with: Option<u32>,
    source_pose: AppliedPose,
    target_pose: AppliedPose,

    is_initialized: bool,
    roots_initialized: bool,
    at_least_one_valid_chain_pair: bool,
    ik_rig_initialized: bool,
}

impl RetargetProcessor {
    pub fn new() -> Self {
        Self {
            source_skeleton: RetargetSkeleton::new(),
            target_skeleton: TargetSkeleton::new(),
            root_retargeter: RootRetargeter::new(),
            global_settings: GlobalSettings::default(),
            chain_pairs_fk: Vec::new(),
            chain_pairs_ik: Vec::new(),
            ik_solver: Box::new(LimbSolver::new()),
            op_stack: OpStack::new(),
            output_curves: HashMap::new(),
            log: RetargetLog::new("retarget_processor"),
            source_asset: None,
            target_asset: None,
            retargeter_asset: None,
            asset_version_initialized_with: None,
            source_pose: AppliedPose::default(),
            target_pose: AppliedPose::default(),
            is_initialized: false,
            roots_initialized: false,
            at_least_one_valid_chain_pair: false,
            ik_rig_initialized: false,
        }
    }

    /// Replace the bundled [`LimbSolver`]. Takes effect on the next initialization.
    pub fn with_ik_solver(mut self, solver: impl IkRigSolver + 'static) -> Self {
        self.ik_solver = Box::new(solver);
        self.invalidate();
        self
    }

    pub fn initialize(
        &mut self,
        source: Option<Arc<SkeletonAsset>>,
        target: Option<Arc<SkeletonAsset>>,
        asset: Option<Arc<RetargeterAsset>>,
    ) {
        if self.was_initialized_with(&source, &target, &asset) {
            return;
        }

        self.log.reset_counts();
        self.is_initialized = false;
        self.roots_initialized = false;
        self.at_least_one_valid_chain_pair = false;
        self.ik_rig_initialized = false;
        self.asset_version_initialized_with = None;
        self.source_asset = source.clone();
        self.target_asset = target.clone();
        self.retargeter_asset = asset.clone();

        // output the bind pose until a full initialization succeeds
        if let Some(target) = target.as_deref() {
            self.target_skeleton.initialize(target, None, None);
        }

        let Some(asset) = asset else {
            self.log
                .error("IK Retargeter unable to initialize. Missing retargeter asset.");
            return;
        };
        self.log.set_asset_name(asset.name.clone());

        let Some(source) = source else {
            self.log
                .error("IK Retargeter unable to initialize. Missing source skeleton.");
            return;
        };
        let Some(target) = target else {
            self.log
                .error("IK Retargeter unable to initialize. Missing target skeleton.");
            return;
        };
        let Some(source_rig) = asset.source_rig.as_ref() else {
            self.log
                .error("IK Retargeter unable to initialize. Missing source IK rig.");
            return;
        };
        let Some(target_rig) = asset.target_rig.as_ref() else {
            self.log
                .error("IK Retargeter unable to initialize. Missing target IK rig.");
            return;
        };

        let profile = asset.merged_profile(None);

        let source_pose = asset.source_retarget_pose(&profile.source_retarget_pose_name);
        self.source_skeleton.initialize(
            &source,
            source_pose,
            source_rig.retarget_root.as_deref(),
        );
        self.source_pose = AppliedPose {
            name: profile.source_retarget_pose_name.clone(),
            version: source_pose.map_or(0, |p| p.version),
        };
        assign_chains_to_bones(&mut self.source_skeleton, source_rig);

        let target_pose = asset.target_retarget_pose(&profile.target_retarget_pose_name);
        self.target_skeleton.initialize(
            &target,
            target_pose,
            target_rig.retarget_root.as_deref(),
        );
        self.target_pose = AppliedPose {
            name: profile.target_retarget_pose_name.clone(),
            version: target_pose.map_or(0, |p| p.version),
        };
        assign_chains_to_bones(&mut self.target_skeleton.skeleton, target_rig);

        self.roots_initialized = self.initialize_roots(source_rig, target_rig);

        self.at_least_one_valid_chain_pair =
            self.initialize_bone_chain_pairs(&asset, source_rig, target_rig, &profile);
        if !self.at_least_one_valid_chain_pair {
            self.log.warn(format!(
                "IK Retargeter unable to map any bone chains between source, {} and target, {}",
                source.name, target.name
            ));
        }

        self.ik_rig_initialized = self.initialize_ik_rig(target_rig);
        if !self.ik_rig_initialized {
            self.log.warn(format!(
                "IK Retargeter was unable to initialize the IK rig, {} for the skeleton {}. See previous warnings.",
                target_rig.name, target.name
            ));
        }

        self.op_stack = OpStack::from_definitions(&asset.ops);
        self.op_stack.initialize_all(
            &OpInitContext {
                source_skeleton: &self.source_skeleton,
                target_skeleton: &self.target_skeleton,
            },
            &mut self.log,
        );

        if self.roots_initialized && self.at_least_one_valid_chain_pair {
            self.log.info(format!(
                "Success! The IK Retargeter is ready to transfer animation from the source, {} to the target, {}",
                source.name, target.name
            ));
        }

        self.root_retargeter.settings = profile.root_settings.clone();
        self.global_settings = profile.global_settings.clone();

        self.is_initialized = self.roots_initialized || self.at_least_one_valid_chain_pair;
        self.asset_version_initialized_with = Some(asset.version);
    }

    fn was_initialized_with(
        &self,
        source: &Option<Arc<SkeletonAsset>>,
        target: &Option<Arc<SkeletonAsset>>,
        asset: &Option<Arc<RetargeterAsset>>,
    ) -> bool {
        fn same<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
        }

        let same_version = match (asset, self.asset_version_initialized_with) {
            (Some(asset), Some(version)) => asset.version == version,
            _ => false,
        };
        same_version
            && same(&self.retargeter_asset, asset)
            && same(&self.source_asset, source)
            && same(&self.target_asset, target)
    }

    /// Force the next [`initialize`](Self::initialize) to rebuild everything.
    pub fn invalidate(&mut self) {
        self.is_initialized = false;
        self.asset_version_initialized_with = None;
    }

    fn initialize_roots(&mut self, source_rig: &IkRigDefinition, target_rig: &IkRigDefinition) -> bool {
        self.root_retargeter.reset();

        let source_root = source_rig.retarget_root.as_deref().unwrap_or_default();
        let source_ready =
            self.root_retargeter
                .initialize_source(source_root, &self.source_skeleton, &mut self.log);
        if !source_ready {
            self.log.warn(format!(
                "IK Retargeter unable to initialize source root, {} on skeleton, {}",
                source_root, self.source_skeleton.name
            ));
        }

        let target_root = target_rig.retarget_root.as_deref().unwrap_or_default();
        let target_ready =
            self.root_retargeter
                .initialize_target(target_root, &self.target_skeleton, &mut self.log);
        if !target_ready {
            self.log.warn(format!(
                "IK Retargeter unable to initialize target root, {} on skeleton, {}",
                target_root, self.target_skeleton.skeleton.name
            ));
        }

        source_ready && target_ready
    }

    fn initialize_bone_chain_pairs(
        &mut self,
        asset: &RetargeterAsset,
        source_rig: &IkRigDefinition,
        target_rig: &IkRigDefinition,
        profile: &RetargetProfile,
    ) -> bool {
        self.chain_pairs_fk.clear();
        self.chain_pairs_ik.clear();

        for mapping in &asset.chain_mappings {
            let Some(target_chain) = target_rig.chain(&mapping.target_chain) else {
                self.log.warn(format!(
                    "IK Retargeter missing target bone chain, {}. Please update the mapping.",
                    mapping.target_chain
                ));
                continue;
            };

            // deliberately unmapped
            let Some(source_chain_name) = mapping.source_chain.as_deref() else {
                continue;
            };
            let Some(source_chain) = source_rig.chain(source_chain_name) else {
                self.log.warn(format!(
                    "IK Retargeter missing source bone chain, {}",
                    source_chain_name
                ));
                continue;
            };

            let Some(bones) = ChainPairBones::resolve(
                source_chain,
                target_chain,
                &self.source_skeleton,
                &self.target_skeleton.skeleton,
                &mut self.log,
            ) else {
                continue;
            };

            // every chain runs FK; IK starts from the FK result
            if let Some(pair) = RetargetChainPairFk::new(
                bones.clone(),
                &self.source_skeleton,
                &self.target_skeleton,
                &mut self.log,
            ) {
                self.chain_pairs_fk.push(pair);
            }

            if let Some(pair) = RetargetChainPairIk::new(
                bones,
                target_chain,
                &self.source_skeleton,
                &self.target_skeleton,
                &mut self.log,
            ) {
                self.chain_pairs_ik.push(pair);
            }

            if let Some(goal) = target_chain
                .ik_goal
                .as_deref()
                .and_then(|goal| target_rig.goal(goal))
            {
                if goal.bone != target_chain.end_bone {
                    self.log.warn(format!(
                        "Retarget chain, {}, has an IK goal that is not on the end bone of the chain.",
                        target_chain.name
                    ));
                }
            }
        }

        for pair in &mut self.chain_pairs_fk {
            if let Some(settings) = profile.chain_settings.get(&pair.bones.target_chain_name) {
                pair.settings = settings.fk.clone();
            }
        }
        for pair in &mut self.chain_pairs_ik {
            if let Some(settings) = profile.chain_settings.get(&pair.bones.target_chain_name) {
                pair.settings = settings.ik.clone();
                pair.speed_planting = settings.speed_planting.clone();
            }
        }

        self.chain_pairs_fk
            .sort_by(|a, b| a.bones.evaluation_order(&b.bones));
        self.chain_pairs_ik
            .sort_by(|a, b| a.bones.evaluation_order(&b.bones));

        for pair in &self.chain_pairs_fk {
            for &bone in &pair.bones.target_bone_indices {
                self.target_skeleton.set_bone_is_retargeted(bone, true);
            }
        }

        let root_index = self.root_retargeter.target.bone_index;
        for pair in &mut self.chain_pairs_fk {
            if let Some(&chain_root) = pair.bones.target_bone_indices.first() {
                pair.decoder.initialize_intermediate_parent_indices(
                    root_index,
                    chain_root,
                    &self.target_skeleton,
                );
            }
        }

        if self.roots_initialized {
            if let Some(root) = root_index {
                self.target_skeleton.set_bone_is_retargeted(root, true);
            }
        }

        !(self.chain_pairs_fk.is_empty() && self.chain_pairs_ik.is_empty())
    }

    fn initialize_ik_rig(&mut self, target_rig: &IkRigDefinition) -> bool {
        if !self
            .ik_solver
            .initialize(target_rig, &self.target_skeleton.skeleton, &mut self.log)
        {
            return false;
        }

        for pair in &self.chain_pairs_ik {
            if !pair.settings.enable_ik {
                // the solver leaves this limb where FK put it
                self.ik_solver
                    .set_goal(IkGoal::additive_identity(pair.ik_goal_name.clone()));
                continue;
            }
            if !self.ik_solver.has_goal(&pair.ik_goal_name) {
                self.log.error(format!(
                    "IK Retargeter has target bone chain, {}, that references an IK goal, {}, that is not present in the IK rig solver.",
                    pair.bones.target_chain_name, pair.ik_goal_name
                ));
                return false;
            }
        }

        for goal in self.ik_solver.goal_names() {
            let driven = target_rig
                .chains
                .iter()
                .any(|chain| chain.ik_goal.as_deref() == Some(goal.as_str()));
            if driven {
                continue;
            }
            self.ik_solver.set_goal(IkGoal::additive_identity(goal.clone()));
            self.log.warn(format!(
                "The target IK rig has a goal, {}, that is not present in any of the target chains. It has been set to additive mode while retargeting.",
                goal
            ));
        }

        true
    }

    /// Retarget one frame.
    ///
    /// `source_pose` holds global transforms indexed like the source skeleton, scale already
    /// removed. `curves` carries per-frame named values (speed curves and anything the op stack
    /// reads). Until the processor is initialized this returns the last output unchanged, or the
    /// target bind pose if nothing has been computed yet.
    pub fn run_retargeter(
        &mut self,
        source_pose: &[Transform],
        curves: &HashMap<String, f32>,
        delta_time: f32,
        profile: &RetargetProfile,
    ) -> &[Transform] {
        if !self.is_initialized {
            return &self.target_skeleton.output_global_pose;
        }
        if source_pose.len() != self.source_skeleton.num_bones() {
            self.log.warn(format!(
                "IK Retargeter received a source pose with {} bones, skeleton, {}, has {}",
                source_pose.len(),
                self.source_skeleton.name,
                self.source_skeleton.num_bones()
            ));
            return &self.target_skeleton.output_global_pose;
        }

        self.apply_settings_from_profile(profile);
        // toggling IK on a chain requires re-initialization
        if !self.is_initialized {
            return &self.target_skeleton.output_global_pose;
        }

        let mut pose = self.target_skeleton.skeleton.retarget_global_pose.clone();

        if self.global_settings.enable_root && self.roots_initialized {
            self.root_retargeter.encode_pose(source_pose);
            self.root_retargeter.decode_pose(&mut pose);
            let skeleton = &self.target_skeleton.skeleton;
            skeleton.update_global_transforms_below_bone(
                self.root_retargeter.target.bone_index,
                &skeleton.retarget_local_pose,
                &mut pose,
            );
        }

        if self.global_settings.enable_fk && self.at_least_one_valid_chain_pair {
            self.run_fk_retarget(source_pose, &mut pose);
            self.target_skeleton
                .update_global_transforms_all_non_retargeted_bones(&mut pose);
        }

        if self.at_least_one_valid_chain_pair && self.ik_rig_initialized {
            self.run_ik_retarget(source_pose, &mut pose, curves, delta_time);
        }

        if self.global_settings.enable_fk && self.at_least_one_valid_chain_pair {
            self.run_pole_vector_matching(source_pose, &mut pose);
        }

        self.output_curves.clear();
        if self.global_settings.enable_post {
            self.run_retarget_ops(source_pose, &mut pose, curves);
        }

        self.target_skeleton.output_global_pose = pose;
        &self.target_skeleton.output_global_pose
    }

    fn run_fk_retarget(&mut self, source_pose: &[Transform], pose: &mut [Transform]) {
        for pair in &mut self.chain_pairs_fk {
            pair.encoder.encode_pose(
                &self.source_skeleton,
                &pair.bones.source_bone_indices,
                source_pose,
            );
            pair.decoder.decode_pose(
                &self.root_retargeter,
                &pair.settings,
                &pair.bones.target_bone_indices,
                &mut pair.encoder,
                &self.target_skeleton,
                pose,
            );
        }
    }

    fn run_ik_retarget(
        &mut self,
        source_pose: &[Transform],
        pose: &mut [Transform],
        curves: &HashMap<String, f32>,
        delta_time: f32,
    ) {
        if self.chain_pairs_ik.is_empty() {
            return;
        }

        for pair in &mut self.chain_pairs_ik {
            pair.retargeter.encode_pose(source_pose);
            pair.retargeter.decode_pose(
                &pair.settings,
                &pair.speed_planting,
                &self.root_retargeter,
                curves,
                delta_time,
                pose,
            );
        }

        self.run_stride_warping(pose);

        for pair in &self.chain_pairs_ik {
            if !pair.settings.enable_ik {
                continue;
            }
            let results = &pair.retargeter.results;
            self.ik_solver.set_goal(IkGoal::new(
                pair.ik_goal_name.clone(),
                results.end_effector_position,
                results.end_effector_rotation,
            ));
        }

        if self.global_settings.enable_ik {
            self.ik_solver.solve(pose);
        }
    }

    fn run_stride_warping(&mut self, pose: &[Transform]) {
        let settings = &self.global_settings;
        if !(settings.warping && self.roots_initialized) {
            return;
        }

        let forward = settings.forward_direction.to_vec();
        let frame = match settings.direction_source {
            WarpingDirectionSource::Goals => {
                let (initial, current): (Vec<_>, Vec<_>) = self
                    .chain_pairs_ik
                    .iter()
                    .filter(|pair| pair.settings.affected_by_ik_warping)
                    .map(|pair| {
                        (
                            pair.retargeter.target.initial_end_position,
                            pair.retargeter.results.end_effector_position,
                        )
                    })
                    .unzip();
                BodyFrame::from_goals(&initial, &current)
            }
            WarpingDirectionSource::Chain => {
                let chain = self.chain_pairs_fk.iter().find(|pair| {
                    Some(&pair.bones.target_chain_name) == settings.direction_chain.as_ref()
                });
                chain.and_then(|pair| {
                    BodyFrame::from_chain(
                        &pair.decoder.chain.initial_global_transforms,
                        &pair.decoder.chain.current_global_transforms,
                        forward,
                    )
                })
            }
            WarpingDirectionSource::RootBone => {
                let initial = self.target_skeleton.skeleton.retarget_global_pose.first();
                match (initial, pose.first()) {
                    (Some(initial), Some(current)) => {
                        Some(BodyFrame::from_root(initial, current, forward))
                    }
                    _ => None,
                }
            }
        };
        let Some(frame) = frame else {
            return;
        };

        for pair in &mut self.chain_pairs_ik {
            if !pair.settings.affected_by_ik_warping {
                continue;
            }
            let retargeter = &mut pair.retargeter;
            retargeter.results.end_effector_position = frame.warp_goal(
                settings,
                retargeter.target.initial_end_position,
                retargeter.results.end_effector_position,
            );
        }
    }

    fn run_pole_vector_matching(&self, source_pose: &[Transform], pose: &mut [Transform]) {
        for pair in &self.chain_pairs_fk {
            pair.pole_vector_matcher.match_pole_vector(
                &pair.settings,
                &pair.bones.source_bone_indices,
                &pair.bones.target_bone_indices,
                source_pose,
                pose,
                &self.target_skeleton.skeleton,
            );
        }
    }

    fn run_retarget_ops(
        &mut self,
        source_pose: &[Transform],
        pose: &mut [Transform],
        curves: &HashMap<String, f32>,
    ) {
        let mut ctx = OpRunContext {
            source_skeleton: &self.source_skeleton,
            target_skeleton: &self.target_skeleton.skeleton,
            is_bone_retargeted: &self.target_skeleton.is_bone_retargeted,
            global_scale: self.root_retargeter.global_scale_vector(),
            source_pose,
            target_pose: pose,
            input_curves: curves,
            output_curves: &mut self.output_curves,
        };
        self.op_stack.run_all(&mut ctx);
    }

    /// Drop planting state on every IK chain. Call after any time discontinuity.
    pub fn reset_planting(&mut self) {
        for pair in &mut self.chain_pairs_ik {
            pair.retargeter.reset_planting();
        }
    }

    fn apply_settings_from_profile(&mut self, profile: &RetargetProfile) {
        if profile.apply_source_retarget_pose {
            self.update_retarget_pose_at_runtime(RetargetSide::Source, &profile.source_retarget_pose_name);
        }
        if profile.apply_target_retarget_pose {
            self.update_retarget_pose_at_runtime(RetargetSide::Target, &profile.target_retarget_pose_name);
        }

        if profile.apply_chain_settings {
            for (chain, settings) in &profile.chain_settings {
                if let Some(pair) = self
                    .chain_pairs_fk
                    .iter_mut()
                    .find(|pair| &pair.bones.target_chain_name == chain)
                {
                    pair.settings = settings.fk.clone();
                }

                if let Some(pair) = self
                    .chain_pairs_ik
                    .iter_mut()
                    .find(|pair| &pair.bones.target_chain_name == chain)
                {
                    if pair.settings.enable_ik != settings.ik.enable_ik {
                        self.is_initialized = false;
                        self.asset_version_initialized_with = None;
                    }
                    pair.settings = settings.ik.clone();
                    pair.speed_planting = settings.speed_planting.clone();
                }
            }
        }

        if profile.apply_root_settings {
            self.root_retargeter.settings = profile.root_settings.clone();
        }
        if profile.apply_global_settings {
            self.global_settings = profile.global_settings.clone();
        }
    }

    fn update_retarget_pose_at_runtime(&mut self, side: RetargetSide, pose_name: &str) {
        let Some(asset) = self.retargeter_asset.clone() else {
            return;
        };
        let new_pose = match side {
            RetargetSide::Source => asset.source_retarget_pose(pose_name),
            RetargetSide::Target => asset.target_retarget_pose(pose_name),
        };
        let Some(new_pose) = new_pose else {
            return;
        };

        let applied = AppliedPose {
            name: pose_name.to_string(),
            version: new_pose.version,
        };
        let current = match side {
            RetargetSide::Source => &mut self.source_pose,
            RetargetSide::Target => &mut self.target_pose,
        };
        if *current == applied {
            return;
        }

        let (root_bone, rig) = match side {
            RetargetSide::Source => (&self.root_retargeter.source.bone_name, &asset.source_rig),
            RetargetSide::Target => (&self.root_retargeter.target.bone_name, &asset.target_rig),
        };
        // a retarget pose can't be regenerated without a root to offset
        if root_bone.is_empty() || rig.is_none() {
            return;
        }
        let root_bone = root_bone.clone();
        *current = applied;

        match side {
            RetargetSide::Source => self
                .source_skeleton
                .generate_retarget_pose(Some(new_pose), Some(&root_bone)),
            RetargetSide::Target => self
                .target_skeleton
                .skeleton
                .generate_retarget_pose(Some(new_pose), Some(&root_bone)),
        }

        for pair in &mut self.chain_pairs_fk {
            pair.initialize(&self.source_skeleton, &self.target_skeleton, &mut self.log);
        }
        for pair in &mut self.chain_pairs_ik {
            pair.initialize(&self.source_skeleton, &self.target_skeleton, &mut self.log);
        }

        let source_root = self.root_retargeter.source.bone_name.clone();
        let target_root = self.root_retargeter.target.bone_name.clone();
        self.root_retargeter
            .initialize_source(&source_root, &self.source_skeleton, &mut self.log);
        self.root_retargeter
            .initialize_target(&target_root, &self.target_skeleton, &mut self.log);
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn source_skeleton(&self) -> &RetargetSkeleton {
        &self.source_skeleton
    }

    pub fn target_skeleton(&self) -> &TargetSkeleton {
        &self.target_skeleton
    }

    pub fn skeleton(&self, side: RetargetSide) -> &RetargetSkeleton {
        match side {
            RetargetSide::Source => &self.source_skeleton,
            RetargetSide::Target => &self.target_skeleton.skeleton,
        }
    }

    pub fn root_retargeter(&self) -> &RootRetargeter {
        &self.root_retargeter
    }

    pub fn global_settings(&self) -> &GlobalSettings {
        &self.global_settings
    }

    pub fn chain_pairs_fk(&self) -> &[RetargetChainPairFk] {
        &self.chain_pairs_fk
    }

    pub fn chain_pairs_ik(&self) -> &[RetargetChainPairIk] {
        &self.chain_pairs_ik
    }

    pub fn ik_solver(&self) -> &dyn IkRigSolver {
        &*self.ik_solver
    }

    pub fn op_stack_mut(&mut self) -> &mut OpStack {
        &mut self.op_stack
    }

    /// Curves written by the op stack during the last run.
    pub fn output_curves(&self) -> &HashMap<String, f32> {
        &self.output_curves
    }

    pub fn log(&self) -> &RetargetLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut RetargetLog {
        &mut self.log
    }

    /// Whether any chain or the root drives `bone_name` on the given side.
    pub fn is_bone_retargeted(&self, bone_name: &str, side: RetargetSide) -> bool {
        match side {
            RetargetSide::Source => self
                .source_skeleton
                .find_bone_index_by_name(bone_name)
                .map_or(false, |bone| {
                    self.source_skeleton.chain_that_contains_bone[bone].is_some()
                        || Some(bone) == self.root_retargeter.source.bone_index
                }),
            RetargetSide::Target => self
                .target_skeleton
                .skeleton
                .find_bone_index_by_name(bone_name)
                .map_or(false, |bone| self.target_skeleton.is_retargeted(bone)),
        }
    }

    /// Name of the rig chain containing `bone_name`, if any.
    pub fn chain_name_for_bone(&self, bone_name: &str, side: RetargetSide) -> Option<&str> {
        let skeleton = self.skeleton(side);
        let bone = skeleton.find_bone_index_by_name(bone_name)?;
        skeleton.chain_that_contains_bone[bone].as_deref()
    }
}

impl Default for RetargetProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Record, per bone, the rig chain it belongs to.
fn assign_chains_to_bones(skeleton: &mut RetargetSkeleton, rig: &IkRigDefinition) {
    for chain in &rig.chains {
        let resolved = ResolvedBoneChain::resolve(chain, skeleton);
        for bone in resolved.bone_indices {
            skeleton.chain_that_contains_bone[bone] = Some(chain.name.clone());
        }
    }
}
