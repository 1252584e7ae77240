//! IK solver seam
//!
//! The retargeter only produces goals; solving them is delegated to an [`IkRigSolver`].
//! [`LimbSolver`] is the bundled implementation: an analytic two-bone solve per goal.

use crate::retarget_log::RetargetLog;
use crate::rig::IkRigDefinition;
use crate::skeleton::RetargetSkeleton;
use crate::transform::{nlerp, Transform, KINDA_SMALL_NUMBER};
use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoalSpace {
    /// Position and rotation are absolute, in the skeleton's global space.
    #[default]
    Component,
    /// Position is an offset from, and rotation is applied on top of, the input pose.
    Additive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkGoal {
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub position_alpha: f32,
    pub rotation_alpha: f32,
    pub space: GoalSpace,
}

impl IkGoal {
    pub fn new(name: impl Into<String>, position: Vec3, rotation: Quat) -> Self {
        Self {
            name: name.into(),
            position,
            rotation,
            position_alpha: 1.0,
            rotation_alpha: 1.0,
            space: GoalSpace::Component,
        }
    }

    /// A goal that leaves its bone where the input pose put it.
    pub fn additive_identity(name: impl Into<String>) -> Self {
        Self {
            space: GoalSpace::Additive,
            ..Self::new(name, Vec3::ZERO, Quat::IDENTITY)
        }
    }
}

/// An IK rig that can be driven by retargeted goals.
///
/// **Lifecycle:**
/// 1. `initialize()` - once per processor initialization, against the target skeleton
/// 2. `set_goal()` - every frame, for each goal a chain drives
/// 3. `solve()` - every frame, on the target global pose
pub trait IkRigSolver: Send {
    fn name(&self) -> &str;

    /// Resolve goals against `skeleton`. Returning false leaves the IK phase switched off.
    fn initialize(
        &mut self,
        rig: &IkRigDefinition,
        skeleton: &RetargetSkeleton,
        log: &mut RetargetLog,
    ) -> bool;

    fn goal_names(&self) -> Vec<String>;

    fn has_goal(&self, name: &str) -> bool {
        self.goal_names().iter().any(|g| g == name)
    }

    fn set_goal(&mut self, goal: IkGoal);

    /// Solve in place on a global pose.
    fn solve(&mut self, global_pose: &mut [Transform]);
}

/// Root, mid and tip bones of a limb, plus the goal currently set on it.
#[derive(Debug, Clone)]
pub struct TwoBoneIk {
    pub goal_name: String,
    pub root_bone: usize,
    pub mid_bone: usize,
    pub tip_bone: usize,
    pub goal: Option<IkGoal>,
}

#[derive(Debug, Clone, Default)]
pub struct LimbSolver {
    limbs: Vec<TwoBoneIk>,
    parents: Vec<Option<usize>>,
}

impl LimbSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limbs(&self) -> &[TwoBoneIk] {
        &self.limbs
    }

    fn is_descendant(&self, bone: usize, ancestor: usize) -> bool {
        let mut current = self.parents[bone];
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parents[parent];
        }
        false
    }

    fn solve_limb(&self, limb: &TwoBoneIk, goal: &IkGoal, pose: &mut [Transform]) {
        let locals: Vec<Transform> = (0..pose.len())
            .map(|bone| match self.parents[bone] {
                Some(parent) => pose[bone].relative_to(&pose[parent]),
                None => pose[bone],
            })
            .collect();

        let tip = pose[limb.tip_bone];
        let (target, target_rotation) = match goal.space {
            GoalSpace::Component => (goal.position, goal.rotation),
            GoalSpace::Additive => (tip.position + goal.position, goal.rotation * tip.rotation),
        };
        let target = tip.position.lerp(target, goal.position_alpha);

        solve_two_bone(pose, limb.root_bone, limb.mid_bone, limb.tip_bone, target);
        pose[limb.tip_bone].rotation =
            nlerp(tip.rotation, target_rotation, goal.rotation_alpha);

        for bone in limb.root_bone + 1..pose.len() {
            if bone == limb.mid_bone || bone == limb.tip_bone {
                continue;
            }
            if !self.is_descendant(bone, limb.root_bone) {
                continue;
            }
            if let Some(parent) = self.parents[bone] {
                pose[bone] = pose[parent] * locals[bone];
            }
        }
    }
}

impl IkRigSolver for LimbSolver {
    fn name(&self) -> &str {
        "limb_solver"
    }

    fn initialize(
        &mut self,
        rig: &IkRigDefinition,
        skeleton: &RetargetSkeleton,
        log: &mut RetargetLog,
    ) -> bool {
        self.limbs.clear();
        self.parents = skeleton.parent_indices.clone();

        for goal in &rig.goals {
            let tip = skeleton.find_bone_index_by_name(&goal.bone);
            let mid = tip.and_then(|t| skeleton.get_parent_index(t));
            let root = mid.and_then(|m| skeleton.get_parent_index(m));
            let (Some(tip_bone), Some(mid_bone), Some(root_bone)) = (tip, mid, root) else {
                log.warn(format!(
                    "IK goal, {}, needs bone, {}, with two ancestors in skeleton, {}",
                    goal.name, goal.bone, skeleton.name
                ));
                continue;
            };
            self.limbs.push(TwoBoneIk {
                goal_name: goal.name.clone(),
                root_bone,
                mid_bone,
                tip_bone,
                goal: None,
            });
        }

        skeleton.num_bones() > 0
    }

    fn goal_names(&self) -> Vec<String> {
        self.limbs.iter().map(|l| l.goal_name.clone()).collect()
    }

    fn set_goal(&mut self, goal: IkGoal) {
        if let Some(limb) = self.limbs.iter_mut().find(|l| l.goal_name == goal.name) {
            limb.goal = Some(goal);
        }
    }

    fn solve(&mut self, global_pose: &mut [Transform]) {
        for limb in &self.limbs {
            if let Some(goal) = &limb.goal {
                self.solve_limb(limb, goal, global_pose);
            }
        }
    }
}

/// Place `mid` and `tip` so `tip` reaches `target` (clamped to the limb's reach), keeping the
/// current bend plane.
pub fn solve_two_bone(pose: &mut [Transform], root: usize, mid: usize, tip: usize, target: Vec3) {
    let a = pose[root].position;
    let b = pose[mid].position;
    let c = pose[tip].position;

    let upper = a.distance(b);
    let lower = b.distance(c);
    if upper <= KINDA_SMALL_NUMBER || lower <= KINDA_SMALL_NUMBER {
        return;
    }

    let to_target = target - a;
    let Some(direction) = to_target.try_normalize() else {
        return;
    };
    let min_reach = (upper - lower).abs() + KINDA_SMALL_NUMBER;
    let max_reach = upper + lower - KINDA_SMALL_NUMBER;
    let distance = to_target.length().clamp(min_reach, max_reach);

    let bend = (b - a) - direction * (b - a).dot(direction);
    let bend = bend
        .try_normalize()
        .unwrap_or_else(|| direction.any_orthonormal_vector());

    let cos_root = ((upper * upper + distance * distance - lower * lower) / (2.0 * upper * distance))
        .clamp(-1.0, 1.0);
    let sin_root = (1.0 - cos_root * cos_root).sqrt();
    let new_b = a + direction * (upper * cos_root) + bend * (upper * sin_root);
    let new_c = a + direction * distance;

    let root_delta = Quat::from_rotation_arc((b - a) / upper, (new_b - a) / upper);
    pose[root].rotation = (root_delta * pose[root].rotation).normalize();

    let c_after_root = a + root_delta * (c - a);
    let mid_delta = Quat::from_rotation_arc(
        (c_after_root - new_b).normalize(),
        (new_c - new_b).normalize(),
    );
    pose[mid].position = new_b;
    pose[mid].rotation = (mid_delta * root_delta * pose[mid].rotation).normalize();
    pose[tip].position = new_c;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonAsset;

    /// pelvis -> thigh -> shin -> foot -> toe, knee slightly forward
    fn leg() -> RetargetSkeleton {
        let asset = SkeletonAsset::new("leg")
            .with_bone("pelvis", None, Transform::from_position(Vec3::Y * 100.0))
            .and_then(|a| a.with_bone("thigh", Some("pelvis"), Transform::IDENTITY))
            .and_then(|a| {
                a.with_bone(
                    "shin",
                    Some("thigh"),
                    Transform::from_position(Vec3::new(0.0, -50.0, 5.0)),
                )
            })
            .and_then(|a| {
                a.with_bone(
                    "foot",
                    Some("shin"),
                    Transform::from_position(Vec3::new(0.0, -50.0, -5.0)),
                )
            })
            .and_then(|a| a.with_bone("toe", Some("foot"), Transform::from_position(Vec3::Z * 10.0)))
            .unwrap();
        let mut skeleton = RetargetSkeleton::new();
        skeleton.initialize(&asset, None, None);
        skeleton
    }

    fn solver(skeleton: &RetargetSkeleton) -> LimbSolver {
        let rig = IkRigDefinition::new("leg").with_goal("foot_goal", "foot");
        let mut log = RetargetLog::new("test");
        let mut solver = LimbSolver::new();
        assert!(solver.initialize(&rig, skeleton, &mut log));
        assert_eq!(solver.goal_names(), vec!["foot_goal".to_string()]);
        solver
    }

    #[test]
    fn test_reaches_target_and_keeps_lengths() {
        let skeleton = leg();
        let mut solver = solver(&skeleton);
        let mut pose = skeleton.retarget_global_pose.clone();
        let rest = pose.clone();

        let target = Vec3::new(10.0, 20.0, 30.0);
        solver.set_goal(IkGoal::new("foot_goal", target, Quat::IDENTITY));
        solver.solve(&mut pose);

        assert!(pose[3].position.abs_diff_eq(target, 1e-3));
        assert!((pose[1].position.distance(pose[2].position) - rest[1].position.distance(rest[2].position)).abs() < 1e-3);
        assert!((pose[2].position.distance(pose[3].position) - rest[2].position.distance(rest[3].position)).abs() < 1e-3);
        // the toe rides along with the foot
        assert!(pose[4].position.abs_diff_eq(pose[3].transform_point(Vec3::Z * 10.0), 1e-3));
    }

    #[test]
    fn test_unreachable_target_extends_limb() {
        let skeleton = leg();
        let mut solver = solver(&skeleton);
        let mut pose = skeleton.retarget_global_pose.clone();

        solver.set_goal(IkGoal::new("foot_goal", Vec3::new(0.0, -500.0, 0.0), Quat::IDENTITY));
        solver.solve(&mut pose);

        let reach = pose[1].position.distance(pose[3].position);
        let max = 2.0 * 50.0_f32.hypot(5.0);
        assert!((reach - max).abs() < 1e-2);
        assert!(pose[3].position.y < pose[2].position.y);
    }

    #[test]
    fn test_additive_identity_goal_is_noop() {
        let skeleton = leg();
        let mut solver = solver(&skeleton);
        let mut pose = skeleton.retarget_global_pose.clone();
        let rest = pose.clone();

        solver.set_goal(IkGoal::additive_identity("foot_goal"));
        solver.solve(&mut pose);

        for (a, b) in pose.iter().zip(&rest) {
            assert!(a.equals(b, 1e-3));
        }
    }

    #[test]
    fn test_goal_without_ancestors_is_skipped() {
        let skeleton = leg();
        let rig = IkRigDefinition::new("leg").with_goal("bad", "thigh");
        let mut log = RetargetLog::new("test");
        let mut solver = LimbSolver::new();
        assert!(solver.initialize(&rig, &skeleton, &mut log));
        assert!(!solver.has_goal("bad"));
        assert_eq!(log.warning_count(), 1);
    }
}
