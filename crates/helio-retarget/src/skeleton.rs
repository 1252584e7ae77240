//! Skeleton model
//!
//! [`SkeletonAsset`] is the bone hierarchy a mesh provides. [`RetargetSkeleton`] is the
//! processing copy built from it: parallel arrays keyed by bone index holding names, parents and
//! the local/global "retarget pose" every chain is measured against.
//!
//! Bones are stored in depth-first order and every parent index is strictly smaller than its
//! child's index. Several algorithms below (global pose updates, branch scanning) rely on that.

use crate::error::{RetargetError, Result};
use crate::pose::RetargetPose;
use crate::transform::Transform;
use std::cell::OnceCell;
use std::collections::HashMap;

/// One bone of a mesh hierarchy.
#[derive(Debug, Clone)]
pub struct BoneDefinition {
    pub name: String,
    pub parent: Option<usize>,
    pub local_transform: Transform,
}

/// Bone hierarchy and bind pose as supplied by a mesh.
#[derive(Debug, Clone, Default)]
pub struct SkeletonAsset {
    pub name: String,
    bones: Vec<BoneDefinition>,
    bone_names: HashMap<String, usize>,
}

impl SkeletonAsset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bones: Vec::new(),
            bone_names: HashMap::new(),
        }
    }

    /// Append a bone. The parent must already exist.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<usize>,
        local_transform: Transform,
    ) -> Result<usize> {
        let name = name.into();
        let index = self.bones.len();
        if let Some(parent) = parent {
            if parent >= index {
                return Err(RetargetError::InvalidHierarchy(format!(
                    "bone '{}' at index {} has parent index {}",
                    name, index, parent
                )));
            }
        }
        if self.bone_names.contains_key(&name) {
            return Err(RetargetError::DuplicateBone(name));
        }

        self.bone_names.insert(name.clone(), index);
        self.bones.push(BoneDefinition {
            name,
            parent,
            local_transform,
        });
        Ok(index)
    }

    /// Builder form of [`add_bone`](Self::add_bone) taking the parent by name.
    pub fn with_bone(
        mut self,
        name: impl Into<String>,
        parent: Option<&str>,
        local_transform: Transform,
    ) -> Result<Self> {
        let parent = match parent {
            Some(p) => Some(
                self.find_bone(p)
                    .ok_or_else(|| RetargetError::BoneNotFound(p.to_string()))?,
            ),
            None => None,
        };
        self.add_bone(name, parent, local_transform)?;
        Ok(self)
    }

    pub fn bones(&self) -> &[BoneDefinition] {
        &self.bones
    }

    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bone_names.get(name).copied()
    }

    pub fn ref_local_pose(&self) -> Vec<Transform> {
        self.bones.iter().map(|b| b.local_transform).collect()
    }

    pub fn compute_global_pose(&self) -> Vec<Transform> {
        let mut global: Vec<Transform> = Vec::with_capacity(self.bones.len());

        for bone in &self.bones {
            let transform = match bone.parent {
                Some(parent) => global[parent] * bone.local_transform,
                None => bone.local_transform,
            };
            global.push(transform);
        }

        global
    }
}

/// Recompute `global_pose` from `local_pose` for every bone after `start` (all bones if `None`).
pub fn update_global_transforms_below_bone(
    parents: &[Option<usize>],
    start: Option<usize>,
    local_pose: &[Transform],
    global_pose: &mut [Transform],
) {
    let first = start.map_or(0, |s| s + 1);
    for index in first..parents.len() {
        global_pose[index] = match parents[index] {
            Some(parent) => global_pose[parent] * local_pose[index],
            None => local_pose[index],
        };
    }
}

/// Skeleton state used while retargeting.
#[derive(Debug, Clone, Default)]
pub struct RetargetSkeleton {
    pub name: String,
    pub bone_names: Vec<String>,
    pub parent_indices: Vec<Option<usize>>,
    pub retarget_local_pose: Vec<Transform>,
    pub retarget_global_pose: Vec<Transform>,
    /// Name of the (target) chain each bone belongs to, if any.
    pub chain_that_contains_bone: Vec<Option<String>>,
    ref_local_pose: Vec<Transform>,
    retarget_root: Option<usize>,
    cached_end_of_branch: Vec<OnceCell<Option<usize>>>,
}

impl RetargetSkeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a mesh hierarchy and generate the retarget pose.
    pub fn initialize(
        &mut self,
        asset: &SkeletonAsset,
        retarget_pose: Option<&RetargetPose>,
        retarget_root: Option<&str>,
    ) {
        self.reset();

        self.name = asset.name.clone();
        for bone in asset.bones() {
            self.bone_names.push(bone.name.clone());
            self.parent_indices.push(bone.parent);
        }
        self.ref_local_pose = asset.ref_local_pose();
        self.chain_that_contains_bone = vec![None; asset.num_bones()];
        self.cached_end_of_branch = vec![OnceCell::new(); asset.num_bones()];

        self.generate_retarget_pose(retarget_pose, retarget_root);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn num_bones(&self) -> usize {
        self.bone_names.len()
    }

    /// Compute the retarget pose from the bind pose plus an optional set of offsets.
    ///
    /// Scale is baked into the bind pose translations once and then dropped, so the retarget
    /// pose always carries unit scale.
    pub fn generate_retarget_pose(
        &mut self,
        retarget_pose: Option<&RetargetPose>,
        retarget_root: Option<&str>,
    ) {
        let num_bones = self.num_bones();
        self.retarget_root = retarget_root.and_then(|name| self.find_bone_index_by_name(name));

        let mut global = vec![Transform::IDENTITY; num_bones];
        update_global_transforms_below_bone(
            &self.parent_indices,
            None,
            &self.ref_local_pose,
            &mut global,
        );
        for transform in global.iter_mut() {
            transform.scale = glam::Vec3::ONE;
        }
        self.retarget_global_pose = global;
        self.retarget_local_pose = vec![Transform::IDENTITY; num_bones];
        for index in 0..num_bones {
            self.update_local_transform_of_single_bone(index);
        }

        let Some(pose) = retarget_pose else {
            return;
        };

        if let Some(root) = self.retarget_root {
            self.retarget_global_pose[root].position += pose.root_translation_offset;
            self.update_local_transform_of_single_bone(root);
        }

        for (bone_name, delta) in &pose.bone_rotation_offsets {
            let Some(index) = self.find_bone_index_by_name(bone_name) else {
                // pose authored against a different skeleton
                continue;
            };
            let reference = self.retarget_local_pose[index].rotation;
            self.retarget_local_pose[index].rotation = (reference * *delta).normalize();
        }

        update_global_transforms_below_bone(
            &self.parent_indices,
            None,
            &self.retarget_local_pose,
            &mut self.retarget_global_pose,
        );
    }

    pub fn set_retarget_root(&mut self, name: Option<&str>) {
        self.retarget_root = name.and_then(|n| self.find_bone_index_by_name(n));
    }

    pub fn retarget_root(&self) -> Option<usize> {
        self.retarget_root
    }

    pub fn find_bone_index_by_name(&self, name: &str) -> Option<usize> {
        self.bone_names.iter().position(|n| n == name)
    }

    pub fn get_parent_index(&self, bone: usize) -> Option<usize> {
        self.parent_indices.get(bone).copied().flatten()
    }

    pub fn update_global_transforms_below_bone(
        &self,
        start: Option<usize>,
        local_pose: &[Transform],
        global_pose: &mut [Transform],
    ) {
        update_global_transforms_below_bone(&self.parent_indices, start, local_pose, global_pose);
    }

    /// Re-derive one bone's local retarget transform from its global retarget transform.
    pub fn update_local_transform_of_single_bone(&mut self, bone: usize) {
        let global = self.retarget_global_pose[bone];
        self.retarget_local_pose[bone] = match self.get_parent_index(bone) {
            Some(parent) => global.relative_to(&self.retarget_global_pose[parent]),
            None => global,
        };
    }

    /// Global transform of `bone` from its local retarget transform and the parent's entry in
    /// `global_pose`.
    pub fn get_global_retarget_pose_of_single_bone(
        &self,
        bone: usize,
        global_pose: &[Transform],
    ) -> Transform {
        match self.get_parent_index(bone) {
            Some(parent) => global_pose[parent] * self.retarget_local_pose[bone],
            None => self.retarget_local_pose[bone],
        }
    }

    /// Last bone index in the branch below `bone`, or `None` for a leaf.
    ///
    /// Computed once per bone and memoized.
    pub fn get_cached_end_of_branch_index(&self, bone: usize) -> Option<usize> {
        let num_bones = self.num_bones();
        let cell = self.cached_end_of_branch.get(bone)?;

        *cell.get_or_init(|| {
            if bone == 0 || bone + 1 == num_bones {
                return Some(num_bones - 1);
            }

            let start_parent = self.get_parent_index(bone);
            let mut end = None;
            let mut index = bone + 1;
            // descendants have parents deeper than the start bone's parent
            while index < num_bones && is_greater(self.get_parent_index(index), start_parent) {
                end = Some(index);
                index += 1;
            }
            end
        })
    }

    pub fn get_children_indices(&self, bone: usize) -> Vec<usize> {
        let Some(end) = self.get_cached_end_of_branch_index(bone) else {
            return Vec::new();
        };
        (bone + 1..=end)
            .filter(|&child| self.get_parent_index(child) == Some(bone))
            .collect()
    }

    pub fn get_children_indices_recursive(&self, bone: usize) -> Vec<usize> {
        match self.get_cached_end_of_branch_index(bone) {
            Some(end) if end > bone => (bone + 1..=end).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_parent_of_child(&self, potential_parent: usize, child: usize) -> bool {
        let mut current = self.get_parent_index(child);
        while let Some(parent) = current {
            if parent == potential_parent {
                return true;
            }
            current = self.get_parent_index(parent);
        }
        false
    }
}

fn is_greater(a: Option<usize>, b: Option<usize>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Target side skeleton: adds the output pose and a record of which bones a chain drives.
#[derive(Debug, Clone, Default)]
pub struct TargetSkeleton {
    pub skeleton: RetargetSkeleton,
    pub output_global_pose: Vec<Transform>,
    pub is_bone_retargeted: Vec<bool>,
}

impl TargetSkeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(
        &mut self,
        asset: &SkeletonAsset,
        retarget_pose: Option<&RetargetPose>,
        retarget_root: Option<&str>,
    ) {
        self.reset();
        self.skeleton
            .initialize(asset, retarget_pose, retarget_root);
        self.output_global_pose = self.skeleton.retarget_global_pose.clone();
        self.is_bone_retargeted = vec![false; self.skeleton.num_bones()];
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_bone_is_retargeted(&mut self, bone: usize, retargeted: bool) {
        if let Some(flag) = self.is_bone_retargeted.get_mut(bone) {
            *flag = retargeted;
        }
    }

    pub fn is_retargeted(&self, bone: usize) -> bool {
        self.is_bone_retargeted.get(bone).copied().unwrap_or(false)
    }

    /// Place every bone no chain or root drives at its retarget-pose offset from its parent.
    pub fn update_global_transforms_all_non_retargeted_bones(&self, global_pose: &mut [Transform]) {
        let skeleton = &self.skeleton;
        for index in 0..skeleton.num_bones() {
            if self.is_bone_retargeted[index] {
                continue;
            }
            let Some(parent) = skeleton.get_parent_index(index) else {
                continue;
            };
            global_pose[index] = global_pose[parent] * skeleton.retarget_local_pose[index];
        }
    }
}
