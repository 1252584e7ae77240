//! Retarget poses: sparse, named offsets applied on top of a skeleton's bind pose.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_POSE_NAME: &str = "Default Pose";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetPose {
    /// Offset added to the retarget root bone's global position.
    pub root_translation_offset: Vec3,
    /// Local rotation offsets keyed by bone name.
    pub bone_rotation_offsets: HashMap<String, Quat>,
    /// Bumped on every edit so cached poses can be regenerated.
    pub version: u32,
}

impl RetargetPose {
    pub fn new() -> Self {
        Self {
            root_translation_offset: Vec3::ZERO,
            bone_rotation_offsets: HashMap::new(),
            version: 0,
        }
    }

    pub fn with_root_translation(mut self, offset: Vec3) -> Self {
        self.root_translation_offset = offset;
        self
    }

    pub fn with_bone_rotation(mut self, bone: impl Into<String>, delta: Quat) -> Self {
        self.bone_rotation_offsets.insert(bone.into(), delta);
        self
    }

    pub fn set_bone_rotation_offset(&mut self, bone: impl Into<String>, delta: Quat) {
        self.bone_rotation_offsets.insert(bone.into(), delta);
        self.version = self.version.wrapping_add(1);
    }

    pub fn add_root_translation_delta(&mut self, delta: Vec3) {
        self.root_translation_offset += delta;
        self.version = self.version.wrapping_add(1);
    }

    pub fn reset(&mut self) {
        self.root_translation_offset = Vec3::ZERO;
        self.bone_rotation_offsets.clear();
        self.version = self.version.wrapping_add(1);
    }

    pub fn rotation_offset(&self, bone: &str) -> Quat {
        self.bone_rotation_offsets
            .get(bone)
            .copied()
            .unwrap_or(Quat::IDENTITY)
    }
}

impl Default for RetargetPose {
    fn default() -> Self {
        Self::new()
    }
}
