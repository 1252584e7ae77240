//! Post-process retarget ops
//!
//! Ops run after the root, FK and IK phases and work directly on the target global pose.

mod curve_remap;
mod pin_bone;
mod root_motion;
mod stack;

pub use curve_remap::{CurveRemapEntry, CurveRemapOp};
pub use pin_bone::{PinBoneOp, PinBonePair, PinSource, PinType};
pub use root_motion::{RootHeightSource, RootMotionGeneratorOp, RootMotionSource};
pub use stack::{OpStack, OpStackBuilder};

use crate::retarget_log::RetargetLog;
use crate::skeleton::{RetargetSkeleton, TargetSkeleton};
use crate::transform::Transform;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Skeletons an op caches bone indices and rest transforms from.
pub struct OpInitContext<'a> {
    pub source_skeleton: &'a RetargetSkeleton,
    pub target_skeleton: &'a TargetSkeleton,
}

/// Everything an op may read or write during one evaluation.
pub struct OpRunContext<'a> {
    pub source_skeleton: &'a RetargetSkeleton,
    pub target_skeleton: &'a RetargetSkeleton,
    pub is_bone_retargeted: &'a [bool],
    /// Root retargeter scale, target height over source height.
    pub global_scale: Vec3,
    pub source_pose: &'a [Transform],
    pub target_pose: &'a mut [Transform],
    pub input_curves: &'a HashMap<String, f32>,
    pub output_curves: &'a mut HashMap<String, f32>,
}

/// A post-process step in the op stack.
///
/// **Lifecycle:**
/// 1. `initialize()` - once per processor initialization; returning false marks the op inert
/// 2. `run()` - every frame after the main pipeline, if enabled and initialized
pub trait RetargetOp: Send + AsAny {
    /// Unique name for this op within its stack
    fn name(&self) -> &str;

    fn initialize(&mut self, ctx: &OpInitContext, log: &mut RetargetLog) -> bool;

    fn run(&mut self, ctx: &mut OpRunContext);

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);
}

/// Helper trait for downcasting op trait objects
pub trait AsAny {
    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

impl<T: RetargetOp + 'static> AsAny for T {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Serialized form of an op, as stored in a retargeter asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OpDefinition {
    PinBone(PinBoneOp),
    RootMotionGenerator(RootMotionGeneratorOp),
    CurveRemap(CurveRemapOp),
}

impl OpDefinition {
    pub fn build(&self) -> Box<dyn RetargetOp> {
        match self {
            OpDefinition::PinBone(op) => Box::new(op.clone()),
            OpDefinition::RootMotionGenerator(op) => Box::new(op.clone()),
            OpDefinition::CurveRemap(op) => Box::new(op.clone()),
        }
    }
}

impl From<PinBoneOp> for OpDefinition {
    fn from(op: PinBoneOp) -> Self {
        OpDefinition::PinBone(op)
    }
}

impl From<RootMotionGeneratorOp> for OpDefinition {
    fn from(op: RootMotionGeneratorOp) -> Self {
        OpDefinition::RootMotionGenerator(op)
    }
}

impl From<CurveRemapOp> for OpDefinition {
    fn from(op: CurveRemapOp) -> Self {
        OpDefinition::CurveRemap(op)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::skeleton::SkeletonAsset;

    /// root -> pelvis -> spine -> head, plus root -> prop
    pub fn biped(name: &str, pelvis_height: f32) -> SkeletonAsset {
        SkeletonAsset::new(name)
            .with_bone("root", None, Transform::IDENTITY)
            .and_then(|a| {
                a.with_bone("pelvis", Some("root"), Transform::from_position(Vec3::Y * pelvis_height))
            })
            .and_then(|a| a.with_bone("spine", Some("pelvis"), Transform::from_position(Vec3::Y * 20.0)))
            .and_then(|a| a.with_bone("head", Some("spine"), Transform::from_position(Vec3::Y * 30.0)))
            .and_then(|a| a.with_bone("prop", Some("root"), Transform::from_position(Vec3::X * 40.0)))
            .unwrap()
    }

    pub fn skeletons(source_height: f32, target_height: f32) -> (RetargetSkeleton, TargetSkeleton) {
        let mut source = RetargetSkeleton::new();
        source.initialize(&biped("source", source_height), None, None);
        let mut target = TargetSkeleton::new();
        target.initialize(&biped("target", target_height), None, None);
        (source, target)
    }

    pub fn run_op(
        op: &mut dyn RetargetOp,
        source: &RetargetSkeleton,
        target: &mut TargetSkeleton,
        source_pose: &[Transform],
        curves: &HashMap<String, f32>,
    ) -> HashMap<String, f32> {
        let mut output_curves = HashMap::new();
        let mut ctx = OpRunContext {
            source_skeleton: source,
            target_skeleton: &target.skeleton,
            is_bone_retargeted: &target.is_bone_retargeted,
            global_scale: Vec3::ONE,
            source_pose,
            target_pose: &mut target.output_global_pose,
            input_curves: curves,
            output_curves: &mut output_curves,
        };
        op.run(&mut ctx);
        output_curves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_json_is_tagged() {
        let def = OpDefinition::from(CurveRemapOp::new("curves").with_remap("speed_l", "left_speed"));
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("\"type\":\"CurveRemap\""));

        let back: OpDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
        assert_eq!(back.build().name(), "curves");
    }
}
