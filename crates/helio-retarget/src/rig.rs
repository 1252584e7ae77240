//! IK rig definitions: the named chains and goals declared on one skeleton.

use crate::chain::BoneChain;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IkGoalDefinition {
    pub name: String,
    pub bone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkRigDefinition {
    pub name: String,
    /// Bone whose motion is retargeted as root motion (usually the pelvis).
    pub retarget_root: Option<String>,
    pub chains: Vec<BoneChain>,
    pub goals: Vec<IkGoalDefinition>,
}

impl IkRigDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_retarget_root(mut self, bone: impl Into<String>) -> Self {
        self.retarget_root = Some(bone.into());
        self
    }

    pub fn with_chain(mut self, chain: BoneChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn with_goal(mut self, name: impl Into<String>, bone: impl Into<String>) -> Self {
        self.goals.push(IkGoalDefinition {
            name: name.into(),
            bone: bone.into(),
        });
        self
    }

    pub fn chain(&self, name: &str) -> Option<&BoneChain> {
        self.chains.iter().find(|c| c.name == name)
    }

    pub fn goal(&self, name: &str) -> Option<&IkGoalDefinition> {
        self.goals.iter().find(|g| g.name == name)
    }
}
