//! Pin bone op: snaps target bones onto other bones after retargeting (props, IK helpers).

use super::{OpInitContext, OpRunContext, RetargetOp};
use crate::retarget_log::RetargetLog;
use crate::transform::Transform;
use serde::{Deserialize, Serialize};

/// Which pose the "pin to" bones are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinSource {
    Source,
    #[default]
    Target,
}

/// Which components of the pinned bone are overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinType {
    #[default]
    FullTransform,
    TranslateOnly,
    RotateOnly,
    ScaleOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinBonePair {
    /// Target bone that gets moved.
    pub bone_to_pin: String,
    /// Bone it follows, on the side chosen by `pin_to`.
    pub bone_to_pin_to: String,
    #[serde(skip)]
    bone_to_pin_index: Option<usize>,
    #[serde(skip)]
    bone_to_pin_to_index: Option<usize>,
    /// The pinned bone relative to the pin-to bone, in the retarget poses.
    #[serde(skip)]
    offset_in_ref_pose: Transform,
}

impl PinBonePair {
    pub fn new(bone_to_pin: impl Into<String>, bone_to_pin_to: impl Into<String>) -> Self {
        Self {
            bone_to_pin: bone_to_pin.into(),
            bone_to_pin_to: bone_to_pin_to.into(),
            bone_to_pin_index: None,
            bone_to_pin_to_index: None,
            offset_in_ref_pose: Transform::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinBoneOp {
    pub name: String,
    pub enabled: bool,
    pub bones_to_pin: Vec<PinBonePair>,
    pub pin_to: PinSource,
    pub pin_type: PinType,
    /// Keep the rest-pose offset between the two bones instead of snapping them together.
    pub maintain_offset: bool,
    /// Applied in the pinned bone's own space.
    pub local_offset: Transform,
    /// Applied in global space, after everything else.
    pub global_offset: Transform,
}

impl Default for PinBoneOp {
    fn default() -> Self {
        Self {
            name: "pin_bone".to_string(),
            enabled: true,
            bones_to_pin: Vec::new(),
            pin_to: PinSource::Target,
            pin_type: PinType::FullTransform,
            maintain_offset: true,
            local_offset: Transform::IDENTITY,
            global_offset: Transform::IDENTITY,
        }
    }
}

impl PinBoneOp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_pin(mut self, bone_to_pin: impl Into<String>, bone_to_pin_to: impl Into<String>) -> Self {
        self.bones_to_pin
            .push(PinBonePair::new(bone_to_pin, bone_to_pin_to));
        self
    }

    pub fn with_pin_to(mut self, pin_to: PinSource) -> Self {
        self.pin_to = pin_to;
        self
    }

    pub fn with_pin_type(mut self, pin_type: PinType) -> Self {
        self.pin_type = pin_type;
        self
    }

    pub fn with_maintain_offset(mut self, maintain: bool) -> Self {
        self.maintain_offset = maintain;
        self
    }
}

impl RetargetOp for PinBoneOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &OpInitContext, log: &mut RetargetLog) -> bool {
        let target = &ctx.target_skeleton.skeleton;
        let pin_to_skeleton = match self.pin_to {
            PinSource::Source => ctx.source_skeleton,
            PinSource::Target => target,
        };

        for pair in &mut self.bones_to_pin {
            pair.bone_to_pin_index = target.find_bone_index_by_name(&pair.bone_to_pin);
            pair.bone_to_pin_to_index = pin_to_skeleton.find_bone_index_by_name(&pair.bone_to_pin_to);
            pair.offset_in_ref_pose = Transform::IDENTITY;

            if pair.bone_to_pin_index.is_none() {
                log.warn(format!(
                    "Pin bone op, {}, refers to missing bone to pin, {}",
                    self.name, pair.bone_to_pin
                ));
            }
            if pair.bone_to_pin_to_index.is_none() {
                log.warn(format!(
                    "Pin bone op, {}, refers to missing bone to pin to, {}",
                    self.name, pair.bone_to_pin_to
                ));
            }

            if let (Some(pin), Some(pin_to)) = (pair.bone_to_pin_index, pair.bone_to_pin_to_index) {
                let pin_transform = target.retarget_global_pose[pin];
                let pin_to_transform = pin_to_skeleton.retarget_global_pose[pin_to];
                pair.offset_in_ref_pose = pin_transform.relative_to(&pin_to_transform);
            }
        }

        // individual pairs are skipped when their bones are missing
        true
    }

    fn run(&mut self, ctx: &mut OpRunContext) {
        for pair in &self.bones_to_pin {
            let (Some(pin), Some(pin_to)) = (pair.bone_to_pin_index, pair.bone_to_pin_to_index) else {
                continue;
            };

            let pin_to_transform = match self.pin_to {
                PinSource::Source => ctx.source_pose[pin_to],
                PinSource::Target => ctx.target_pose[pin_to],
            };
            let offset = if self.maintain_offset {
                pair.offset_in_ref_pose
            } else {
                Transform::IDENTITY
            };
            let result = self.global_offset * (pin_to_transform * offset) * self.local_offset;

            let pinned = &mut ctx.target_pose[pin];
            match self.pin_type {
                PinType::FullTransform => *pinned = result,
                PinType::TranslateOnly => pinned.position = result.position,
                PinType::RotateOnly => pinned.rotation = result.rotation,
                PinType::ScaleOnly => pinned.scale = result.scale,
            }
        }
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
    use crate::ops::test_support::{run_op, skeletons};
    use glam::{Quat, Vec3};
    use std::collections::HashMap;

    fn initialized(mut op: PinBoneOp) -> (PinBoneOp, RetargetLog) {
        let (source, target) = skeletons(100.0, 150.0);
        let mut log = RetargetLog::new("test");
        assert!(op.initialize(
            &OpInitContext {
                source_skeleton: &source,
                target_skeleton: &target,
            },
            &mut log,
        ));
        (op, log)
    }

    #[test]
    fn test_rest_pose_is_unchanged_with_offset() {
        let (source, mut target) = skeletons(100.0, 150.0);
        let (mut op, _) = initialized(PinBoneOp::new("pin").with_pin("prop", "head"));
        let rest = target.output_global_pose.clone();

        run_op(&mut op, &source, &mut target, &source.retarget_global_pose, &HashMap::new());
        assert!(target.output_global_pose[4].equals(&rest[4], 1e-4));
    }

    #[test]
    fn test_prop_follows_moved_head() {
        let (source, mut target) = skeletons(100.0, 150.0);
        let (mut op, _) = initialized(PinBoneOp::new("pin").with_pin("prop", "head"));

        target.output_global_pose[3] = Transform::from_position_rotation(
            Vec3::new(5.0, 210.0, 0.0),
            Quat::from_rotation_y(0.5),
        );
        let offset = target.skeleton.retarget_global_pose[4]
            .relative_to(&target.skeleton.retarget_global_pose[3]);
        let expected = target.output_global_pose[3] * offset;

        run_op(&mut op, &source, &mut target, &source.retarget_global_pose, &HashMap::new());
        assert!(target.output_global_pose[4].equals(&expected, 1e-3));
    }

    #[test]
    fn test_translate_only_snaps_to_source() {
        let (source, mut target) = skeletons(100.0, 150.0);
        let (mut op, _) = initialized(
            PinBoneOp::new("pin")
                .with_pin("prop", "head")
                .with_pin_to(PinSource::Source)
                .with_pin_type(PinType::TranslateOnly)
                .with_maintain_offset(false),
        );
        let rotation_before = target.output_global_pose[4].rotation;

        run_op(&mut op, &source, &mut target, &source.retarget_global_pose, &HashMap::new());
        let pinned = target.output_global_pose[4];
        assert!(pinned
            .position
            .abs_diff_eq(source.retarget_global_pose[3].position, 1e-4));
        assert_eq!(pinned.rotation, rotation_before);
    }

    #[test]
    fn test_missing_bones_warn_and_skip() {
        let (source, mut target) = skeletons(100.0, 150.0);
        let (mut op, log) = initialized(PinBoneOp::new("pin").with_pin("sword", "hand"));
        assert_eq!(log.warning_count(), 2);

        let rest = target.output_global_pose.clone();
        run_op(&mut op, &source, &mut target, &source.retarget_global_pose, &HashMap::new());
        assert_eq!(target.output_global_pose, rest);
    }
}
