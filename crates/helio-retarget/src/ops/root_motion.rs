//! Root motion generator op
//!
//! Drives the target root bone either from the source root (scaled like the pelvis) or from the
//! retargeted target pelvis projected onto the ground plane (Y = 0).

use super::{OpInitContext, OpRunContext, RetargetOp};
use crate::retarget_log::RetargetLog;
use crate::transform::Transform;
use glam::Quat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RootMotionSource {
    #[default]
    CopyFromSourceRoot,
    GenerateFromTargetPelvis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RootHeightSource {
    #[default]
    CopyHeightFromSource,
    SnapToGround,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootMotionGeneratorOp {
    pub name: String,
    pub enabled: bool,
    pub source_root_bone: String,
    pub target_root_bone: String,
    pub target_pelvis_bone: String,
    pub root_motion_source: RootMotionSource,
    pub root_height_source: RootHeightSource,
    /// Move bones that sit under the root but outside every chain along with the root.
    pub propagate_to_non_retargeted_children: bool,
    /// Keep the rest-pose offset from the pelvis when generating from it.
    pub maintain_offset_from_pelvis: bool,
    pub rotate_with_pelvis: bool,
    pub global_offset: Transform,
    #[serde(skip)]
    cache: Option<RootMotionCache>,
}

#[derive(Debug, Clone, PartialEq)]
struct RootMotionCache {
    source_root: usize,
    target_root: usize,
    target_pelvis: usize,
    source_root_in_ref_pose: Transform,
    target_root_in_ref_pose: Transform,
    target_root_relative_to_pelvis: Transform,
    non_retargeted_children: Vec<usize>,
}

impl Default for RootMotionGeneratorOp {
    fn default() -> Self {
        Self {
            name: "root_motion".to_string(),
            enabled: true,
            source_root_bone: String::new(),
            target_root_bone: String::new(),
            target_pelvis_bone: String::new(),
            root_motion_source: RootMotionSource::CopyFromSourceRoot,
            root_height_source: RootHeightSource::CopyHeightFromSource,
            propagate_to_non_retargeted_children: true,
            maintain_offset_from_pelvis: true,
            rotate_with_pelvis: false,
            global_offset: Transform::IDENTITY,
            cache: None,
        }
    }
}

impl RootMotionGeneratorOp {
    pub fn new(
        name: impl Into<String>,
        source_root: impl Into<String>,
        target_root: impl Into<String>,
        target_pelvis: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_root_bone: source_root.into(),
            target_root_bone: target_root.into(),
            target_pelvis_bone: target_pelvis.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: RootMotionSource) -> Self {
        self.root_motion_source = source;
        self
    }

    pub fn with_height_source(mut self, height: RootHeightSource) -> Self {
        self.root_height_source = height;
        self
    }

    fn from_target_pelvis(
        &self,
        cache: &RootMotionCache,
        source_pose: &[Transform],
        target_pose: &[Transform],
    ) -> Transform {
        let pelvis = target_pose[cache.target_pelvis];
        let mut root = if self.maintain_offset_from_pelvis {
            pelvis * cache.target_root_relative_to_pelvis
        } else {
            pelvis
        };

        if !self.rotate_with_pelvis {
            root.rotation = cache.target_root_in_ref_pose.rotation;
        }

        root.position.y = match self.root_height_source {
            RootHeightSource::SnapToGround => 0.0,
            RootHeightSource::CopyHeightFromSource => source_pose[cache.source_root].position.y,
        };
        root
    }

    fn from_source_root(
        &self,
        cache: &RootMotionCache,
        source_pose: &[Transform],
        ctx_scale: glam::Vec3,
    ) -> Transform {
        let source_root = source_pose[cache.source_root];
        let rest = cache.source_root_in_ref_pose;

        let rotation_delta = source_root.rotation * rest.rotation.inverse();
        let rotation: Quat = (rotation_delta * cache.target_root_in_ref_pose.rotation).normalize();

        let translation_delta = (source_root.position - rest.position) * ctx_scale;
        let mut position = cache.target_root_in_ref_pose.position + translation_delta;
        if self.root_height_source == RootHeightSource::SnapToGround {
            position.y = 0.0;
        }

        Transform::from_position_rotation(position, rotation)
    }
}

impl RetargetOp for RootMotionGeneratorOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &OpInitContext, log: &mut RetargetLog) -> bool {
        self.cache = None;
        let source = ctx.source_skeleton;
        let target = &ctx.target_skeleton.skeleton;

        let source_root = source.find_bone_index_by_name(&self.source_root_bone);
        let target_root = target.find_bone_index_by_name(&self.target_root_bone);
        let target_pelvis = target.find_bone_index_by_name(&self.target_pelvis_bone);

        for (found, kind, bone) in [
            (source_root, "source root", &self.source_root_bone),
            (target_root, "target root", &self.target_root_bone),
            (target_pelvis, "target pelvis", &self.target_pelvis_bone),
        ] {
            if found.is_none() {
                log.warn(format!(
                    "Root motion op, {}, missing {} bone, {}",
                    self.name, kind, bone
                ));
            }
        }

        let (Some(source_root), Some(target_root), Some(target_pelvis)) =
            (source_root, target_root, target_pelvis)
        else {
            return false;
        };

        let is_retargeted = &ctx.target_skeleton.is_bone_retargeted;
        let non_retargeted_children = (1..target.num_bones())
            .filter(|&bone| {
                let mut current = Some(bone);
                while let Some(index) = current {
                    if is_retargeted[index] {
                        return false;
                    }
                    current = target.get_parent_index(index);
                }
                true
            })
            .collect();

        let target_root_in_ref_pose = target.retarget_global_pose[target_root];
        self.cache = Some(RootMotionCache {
            source_root,
            target_root,
            target_pelvis,
            source_root_in_ref_pose: source.retarget_global_pose[source_root],
            target_root_in_ref_pose,
            target_root_relative_to_pelvis: target_root_in_ref_pose
                .relative_to(&target.retarget_global_pose[target_pelvis]),
            non_retargeted_children,
        });
        true
    }

    fn run(&mut self, ctx: &mut OpRunContext) {
        let Some(cache) = &self.cache else {
            return;
        };

        let new_root = match self.root_motion_source {
            RootMotionSource::GenerateFromTargetPelvis => {
                self.from_target_pelvis(cache, ctx.source_pose, ctx.target_pose)
            }
            RootMotionSource::CopyFromSourceRoot => {
                self.from_source_root(cache, ctx.source_pose, ctx.global_scale)
            }
        };

        if self.propagate_to_non_retargeted_children {
            let delta = new_root * ctx.target_pose[cache.target_root].inverse();
            for &bone in &cache.non_retargeted_children {
                ctx.target_pose[bone] = delta * ctx.target_pose[bone];
            }
        }

        ctx.target_pose[cache.target_root] = self.global_offset * new_root;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::test_support::skeletons;
    use crate::ops::OpRunContext;
    use crate::skeleton::{RetargetSkeleton, TargetSkeleton};
    use glam::Vec3;
    use std::collections::HashMap;

    fn setup(op: &mut RootMotionGeneratorOp) -> (RetargetSkeleton, TargetSkeleton) {
        let (source, mut target) = skeletons(100.0, 150.0);
        // pelvis and its descendants are driven by chains
        for bone in 1..4 {
            target.set_bone_is_retargeted(bone, true);
        }
        let mut log = RetargetLog::new("test");
        assert!(op.initialize(
            &OpInitContext {
                source_skeleton: &source,
                target_skeleton: &target,
            },
            &mut log,
        ));
        (source, target)
    }

    fn run(
        op: &mut RootMotionGeneratorOp,
        source: &RetargetSkeleton,
        target: &mut TargetSkeleton,
        source_pose: &[Transform],
    ) {
        let curves = HashMap::new();
        let mut output_curves = HashMap::new();
        let mut ctx = OpRunContext {
            source_skeleton: source,
            target_skeleton: &target.skeleton,
            is_bone_retargeted: &target.is_bone_retargeted,
            global_scale: Vec3::splat(1.5),
            source_pose,
            target_pose: &mut target.output_global_pose,
            input_curves: &curves,
            output_curves: &mut output_curves,
        };
        op.run(&mut ctx);
    }

    #[test]
    fn test_non_retargeted_children_found() {
        let mut op = RootMotionGeneratorOp::new("rm", "root", "root", "pelvis");
        setup(&mut op);
        assert_eq!(op.cache.as_ref().unwrap().non_retargeted_children, vec![4]);
    }

    #[test]
    fn test_copy_from_source_root_scales_motion() {
        let mut op = RootMotionGeneratorOp::new("rm", "root", "root", "pelvis");
        let (source, mut target) = setup(&mut op);

        let mut source_pose = source.retarget_global_pose.clone();
        source_pose[0].position = Vec3::new(0.0, 0.0, 20.0);
        run(&mut op, &source, &mut target, &source_pose);

        assert!(target.output_global_pose[0]
            .position
            .abs_diff_eq(Vec3::new(0.0, 0.0, 30.0), 1e-4));
        // the prop rides along with the root
        assert!(target.output_global_pose[4]
            .position
            .abs_diff_eq(Vec3::new(40.0, 0.0, 30.0), 1e-4));
    }

    #[test]
    fn test_generate_from_pelvis_snaps_to_ground() {
        let mut op = RootMotionGeneratorOp::new("rm", "root", "root", "pelvis")
            .with_source(RootMotionSource::GenerateFromTargetPelvis)
            .with_height_source(RootHeightSource::SnapToGround);
        let (source, mut target) = setup(&mut op);

        target.output_global_pose[1] = Transform::from_position_rotation(
            Vec3::new(12.0, 140.0, 33.0),
            Quat::from_rotation_y(1.0),
        );
        run(&mut op, &source, &mut target, &source.retarget_global_pose);

        let root = target.output_global_pose[0];
        assert!(root.position.abs_diff_eq(Vec3::new(12.0, 0.0, 33.0), 1e-4));
        assert!(crate::transform::quat_equals(root.rotation, Quat::IDENTITY, 1e-5));
    }

    #[test]
    fn test_missing_bone_fails_initialize() {
        let (source, target) = skeletons(100.0, 150.0);
        let mut op = RootMotionGeneratorOp::new("rm", "root", "root", "hips");
        let mut log = RetargetLog::new("test");
        assert!(!op.initialize(
            &OpInitContext {
                source_skeleton: &source,
                target_skeleton: &target,
            },
            &mut log,
        ));
        assert_eq!(log.warning_count(), 1);
    }
}
