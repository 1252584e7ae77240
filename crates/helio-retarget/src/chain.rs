//! Bone chains and their resolution against a skeleton.

use crate::retarget_log::RetargetLog;
use crate::skeleton::RetargetSkeleton;
use serde::{Deserialize, Serialize};

/// A named run of bones from `start_bone` down to `end_bone`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneChain {
    pub name: String,
    pub start_bone: String,
    pub end_bone: String,
    /// IK goal driven by this chain's end, if any.
    #[serde(default)]
    pub ik_goal: Option<String>,
}

impl BoneChain {
    pub fn new(
        name: impl Into<String>,
        start_bone: impl Into<String>,
        end_bone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            start_bone: start_bone.into(),
            end_bone: end_bone.into(),
            ik_goal: None,
        }
    }

    pub fn with_ik_goal(mut self, goal: impl Into<String>) -> Self {
        self.ik_goal = Some(goal.into());
        self
    }
}

/// Bone indices of a chain on a specific skeleton, ordered start to end.
#[derive(Debug, Clone, Default)]
pub struct ResolvedBoneChain {
    pub bone_indices: Vec<usize>,
    pub found_start: bool,
    pub found_end: bool,
    pub end_is_start_or_child: bool,
}

impl ResolvedBoneChain {
    pub fn resolve(chain: &BoneChain, skeleton: &RetargetSkeleton) -> Self {
        let start = skeleton.find_bone_index_by_name(&chain.start_bone);
        let end = skeleton.find_bone_index_by_name(&chain.end_bone);

        let mut resolved = Self {
            found_start: start.is_some(),
            found_end: end.is_some(),
            ..Default::default()
        };

        let (Some(start), Some(end)) = (start, end) else {
            return resolved;
        };
        if end < start {
            return resolved;
        }

        // walk up from the end until we step above the start bone
        let mut current = Some(end);
        while let Some(index) = current {
            if index < start {
                break;
            }
            resolved.bone_indices.push(index);
            if index == start {
                break;
            }
            current = skeleton.get_parent_index(index);
        }

        if resolved.bone_indices.last() == Some(&start) {
            resolved.end_is_start_or_child = true;
            resolved.bone_indices.reverse();
        } else {
            resolved.bone_indices.clear();
        }

        resolved
    }

    pub fn is_valid(&self) -> bool {
        self.found_start && self.found_end && self.end_is_start_or_child
    }

    /// Log one warning per problem found while resolving.
    pub fn report(&self, chain: &BoneChain, skeleton_name: &str, log: &mut RetargetLog) {
        if !self.found_start {
            log.warn(format!(
                "IK Retargeter bone chain, {}, could not find start bone, {} in skeleton, {}",
                chain.name, chain.start_bone, skeleton_name
            ));
        }
        if !self.found_end {
            log.warn(format!(
                "IK Retargeter bone chain, {}, could not find end bone, {} in skeleton, {}",
                chain.name, chain.end_bone, skeleton_name
            ));
        }
        if self.found_start && self.found_end && !self.end_is_start_or_child {
            log.warn(format!(
                "IK Retargeter bone chain, {}, end bone, {} was not a child of the start bone, {}",
                chain.name, chain.end_bone, chain.start_bone
            ));
        }
    }
}
