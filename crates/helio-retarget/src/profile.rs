//! Layered settings profiles
//!
//! Every section carries an `apply_*` flag. Merging copies a section only when the incoming
//! profile applies it, so later layers override earlier ones one section at a time.

use crate::settings::{GlobalSettings, RootSettings, TargetChainSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetProfile {
    pub apply_target_retarget_pose: bool,
    pub target_retarget_pose_name: String,

    pub apply_source_retarget_pose: bool,
    pub source_retarget_pose_name: String,

    /// Settings keyed by target chain name.
    pub apply_chain_settings: bool,
    pub chain_settings: HashMap<String, TargetChainSettings>,

    pub apply_root_settings: bool,
    pub root_settings: RootSettings,

    pub apply_global_settings: bool,
    pub global_settings: GlobalSettings,
}

impl RetargetProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_retarget_pose(mut self, name: impl Into<String>) -> Self {
        self.apply_target_retarget_pose = true;
        self.target_retarget_pose_name = name.into();
        self
    }

    pub fn with_source_retarget_pose(mut self, name: impl Into<String>) -> Self {
        self.apply_source_retarget_pose = true;
        self.source_retarget_pose_name = name.into();
        self
    }

    pub fn with_chain_settings(mut self, chain: impl Into<String>, settings: TargetChainSettings) -> Self {
        self.apply_chain_settings = true;
        self.chain_settings.insert(chain.into(), settings);
        self
    }

    pub fn with_root_settings(mut self, settings: RootSettings) -> Self {
        self.apply_root_settings = true;
        self.root_settings = settings;
        self
    }

    pub fn with_global_settings(mut self, settings: GlobalSettings) -> Self {
        self.apply_global_settings = true;
        self.global_settings = settings;
        self
    }

    /// Layer `other` on top of this profile.
    pub fn merge_with(&mut self, other: &RetargetProfile) {
        if other.apply_target_retarget_pose {
            self.apply_target_retarget_pose = true;
            self.target_retarget_pose_name = other.target_retarget_pose_name.clone();
        }

        if other.apply_source_retarget_pose {
            self.apply_source_retarget_pose = true;
            self.source_retarget_pose_name = other.source_retarget_pose_name.clone();
        }

        if other.apply_chain_settings {
            self.apply_chain_settings = true;
            for (chain, settings) in &other.chain_settings {
                self.chain_settings.insert(chain.clone(), settings.clone());
            }
        }

        if other.apply_root_settings {
            self.apply_root_settings = true;
            self.root_settings = other.root_settings.clone();
        }

        if other.apply_global_settings {
            self.apply_global_settings = true;
            self.global_settings = other.global_settings.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{FkChainSettings, FkRotationMode};

    #[test]
    fn test_merge_only_applied_sections() {
        let mut base = RetargetProfile::new()
            .with_target_retarget_pose("A Pose")
            .with_global_settings(GlobalSettings {
                warping: true,
                ..Default::default()
            });

        let overlay = RetargetProfile {
            global_settings: GlobalSettings {
                enable_ik: false,
                ..Default::default()
            },
            ..RetargetProfile::new().with_target_retarget_pose("T Pose")
        };
        base.merge_with(&overlay);

        assert_eq!(base.target_retarget_pose_name, "T Pose");
        // global settings were not applied by the overlay
        assert!(base.global_settings.warping);
        assert!(base.global_settings.enable_ik);
    }

    #[test]
    fn test_chain_settings_merge_per_key() {
        let arm = TargetChainSettings::default()
            .with_fk(FkChainSettings::default().with_rotation_mode(FkRotationMode::OneToOne));
        let mut base = RetargetProfile::new()
            .with_chain_settings("arm", arm.clone())
            .with_chain_settings("leg", TargetChainSettings::default());

        let leg = TargetChainSettings::default()
            .with_fk(FkChainSettings::default().with_rotation_mode(FkRotationMode::None));
        base.merge_with(&RetargetProfile::new().with_chain_settings("leg", leg.clone()));

        assert_eq!(base.chain_settings["arm"], arm);
        assert_eq!(base.chain_settings["leg"], leg);
    }
}
