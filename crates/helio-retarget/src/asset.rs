//! Retargeter asset
//!
//! Everything authored about one source/target pairing: the two IK rigs, the chain mapping with
//! its per-chain settings, root and global settings, the op stack, named retarget poses for both
//! sides and named settings profiles. Stored as JSON.

use crate::error::Result;
use crate::ops::OpDefinition;
use crate::pose::{RetargetPose, DEFAULT_POSE_NAME};
use crate::profile::RetargetProfile;
use crate::rig::IkRigDefinition;
use crate::settings::{GlobalSettings, RootSettings, TargetChainSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A target chain and the source chain that drives it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainMapping {
    pub target_chain: String,
    /// Unmapped target chains keep their retarget pose.
    pub source_chain: Option<String>,
    pub settings: TargetChainSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargeterAsset {
    pub name: String,
    /// Bumped on every edit; processors re-initialize when it changes.
    pub version: u32,
    pub source_rig: Option<IkRigDefinition>,
    pub target_rig: Option<IkRigDefinition>,
    pub chain_mappings: Vec<ChainMapping>,
    pub root_settings: RootSettings,
    pub global_settings: GlobalSettings,
    pub ops: Vec<OpDefinition>,
    pub source_retarget_poses: HashMap<String, RetargetPose>,
    pub current_source_retarget_pose: String,
    pub target_retarget_poses: HashMap<String, RetargetPose>,
    pub current_target_retarget_pose: String,
    pub profiles: HashMap<String, RetargetProfile>,
    pub current_profile: Option<String>,
}

impl Default for RetargeterAsset {
    fn default() -> Self {
        let default_poses = HashMap::from([(DEFAULT_POSE_NAME.to_string(), RetargetPose::new())]);
        Self {
            name: String::new(),
            version: 0,
            source_rig: None,
            target_rig: None,
            chain_mappings: Vec::new(),
            root_settings: RootSettings::default(),
            global_settings: GlobalSettings::default(),
            ops: Vec::new(),
            source_retarget_poses: default_poses.clone(),
            current_source_retarget_pose: DEFAULT_POSE_NAME.to_string(),
            target_retarget_poses: default_poses,
            current_target_retarget_pose: DEFAULT_POSE_NAME.to_string(),
            profiles: HashMap::new(),
            current_profile: None,
        }
    }
}

impl RetargeterAsset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_source_rig(mut self, rig: IkRigDefinition) -> Self {
        self.source_rig = Some(rig);
        self
    }

    pub fn with_target_rig(mut self, rig: IkRigDefinition) -> Self {
        self.target_rig = Some(rig);
        self
    }

    /// Map `source_chain` onto `target_chain`, replacing any existing mapping for the target.
    pub fn with_chain_mapping(
        mut self,
        target_chain: impl Into<String>,
        source_chain: impl Into<String>,
        settings: TargetChainSettings,
    ) -> Self {
        let target_chain = target_chain.into();
        self.chain_mappings.retain(|m| m.target_chain != target_chain);
        self.chain_mappings.push(ChainMapping {
            target_chain,
            source_chain: Some(source_chain.into()),
            settings,
        });
        self
    }

    pub fn with_root_settings(mut self, settings: RootSettings) -> Self {
        self.root_settings = settings;
        self
    }

    pub fn with_global_settings(mut self, settings: GlobalSettings) -> Self {
        self.global_settings = settings;
        self
    }

    pub fn with_op(mut self, op: impl Into<OpDefinition>) -> Self {
        self.ops.push(op.into());
        self
    }

    /// Add a named source retarget pose and make it current.
    pub fn with_source_retarget_pose(mut self, name: impl Into<String>, pose: RetargetPose) -> Self {
        let name = name.into();
        self.source_retarget_poses.insert(name.clone(), pose);
        self.current_source_retarget_pose = name;
        self
    }

    /// Add a named target retarget pose and make it current.
    pub fn with_target_retarget_pose(mut self, name: impl Into<String>, pose: RetargetPose) -> Self {
        let name = name.into();
        self.target_retarget_poses.insert(name.clone(), pose);
        self.current_target_retarget_pose = name;
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>, profile: RetargetProfile) -> Self {
        self.profiles.insert(name.into(), profile);
        self
    }

    pub fn set_current_profile(&mut self, name: Option<&str>) {
        self.current_profile = name.map(str::to_string);
        self.version += 1;
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn source_retarget_pose(&self, name: &str) -> Option<&RetargetPose> {
        self.source_retarget_poses.get(name)
    }

    pub fn target_retarget_pose(&self, name: &str) -> Option<&RetargetPose> {
        self.target_retarget_poses.get(name)
    }

    pub fn chain_mapping(&self, target_chain: &str) -> Option<&ChainMapping> {
        self.chain_mappings
            .iter()
            .find(|m| m.target_chain == target_chain)
    }

    pub fn chain_settings_mut(&mut self, target_chain: &str) -> Option<&mut TargetChainSettings> {
        self.chain_mappings
            .iter_mut()
            .find(|m| m.target_chain == target_chain)
            .map(|m| &mut m.settings)
    }

    /// Give every target chain a mapping and fill unmapped ones with the source chain of the
    /// same name (ignoring case). Existing mappings and settings are kept.
    pub fn map_chains_by_name(&mut self) {
        let (Some(source_rig), Some(target_rig)) = (&self.source_rig, &self.target_rig) else {
            return;
        };

        for target_chain in &target_rig.chains {
            let matching_source = source_rig
                .chains
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(&target_chain.name))
                .map(|s| s.name.clone());

            match self
                .chain_mappings
                .iter_mut()
                .find(|m| m.target_chain == target_chain.name)
            {
                Some(mapping) => {
                    if mapping.source_chain.is_none() {
                        mapping.source_chain = matching_source;
                    }
                }
                None => self.chain_mappings.push(ChainMapping {
                    target_chain: target_chain.name.clone(),
                    source_chain: matching_source,
                    settings: TargetChainSettings::default(),
                }),
            }
        }
        self.version += 1;
    }

    /// The asset's own settings as a profile with every section applied.
    pub fn asset_profile(&self) -> RetargetProfile {
        RetargetProfile {
            apply_target_retarget_pose: true,
            target_retarget_pose_name: self.current_target_retarget_pose.clone(),
            apply_source_retarget_pose: true,
            source_retarget_pose_name: self.current_source_retarget_pose.clone(),
            apply_chain_settings: true,
            chain_settings: self
                .chain_mappings
                .iter()
                .map(|m| (m.target_chain.clone(), m.settings.clone()))
                .collect(),
            apply_root_settings: true,
            root_settings: self.root_settings.clone(),
            apply_global_settings: true,
            global_settings: self.global_settings.clone(),
        }
    }

    /// Asset settings, then the current named profile, then `custom`.
    pub fn merged_profile(&self, custom: Option<&RetargetProfile>) -> RetargetProfile {
        let mut profile = self.asset_profile();
        if let Some(current) = self
            .current_profile
            .as_deref()
            .and_then(|name| self.profiles.get(name))
        {
            profile.merge_with(current);
        }
        if let Some(custom) = custom {
            profile.merge_with(custom);
        }
        profile
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::BoneChain;
    use crate::error::RetargetError;
    use crate::ops::CurveRemapOp;
    use crate::settings::{FkChainSettings, FkRotationMode};

    fn rigs() -> (IkRigDefinition, IkRigDefinition) {
        let source = IkRigDefinition::new("source")
            .with_chain(BoneChain::new("Spine", "spine_01", "spine_03"))
            .with_chain(BoneChain::new("LeftArm", "upperarm_l", "hand_l"));
        let target = IkRigDefinition::new("target")
            .with_chain(BoneChain::new("spine", "Spine1", "Spine3"))
            .with_chain(BoneChain::new("LeftArm", "LeftArm", "LeftHand"))
            .with_chain(BoneChain::new("Tail", "tail_01", "tail_05"));
        (source, target)
    }

    #[test]
    fn test_map_chains_by_name() {
        let (source, target) = rigs();
        let mut asset = RetargeterAsset::new("biped")
            .with_source_rig(source)
            .with_target_rig(target);
        asset.map_chains_by_name();

        assert_eq!(asset.chain_mappings.len(), 3);
        assert_eq!(asset.chain_mapping("spine").unwrap().source_chain.as_deref(), Some("Spine"));
        assert_eq!(asset.chain_mapping("LeftArm").unwrap().source_chain.as_deref(), Some("LeftArm"));
        assert_eq!(asset.chain_mapping("Tail").unwrap().source_chain, None);
        assert_eq!(asset.version, 1);
    }

    #[test]
    fn test_map_chains_keeps_existing_settings() {
        let (source, target) = rigs();
        let settings = TargetChainSettings::default()
            .with_fk(FkChainSettings::default().with_rotation_mode(FkRotationMode::OneToOne));
        let mut asset = RetargeterAsset::new("biped")
            .with_source_rig(source)
            .with_target_rig(target)
            .with_chain_mapping("LeftArm", "Spine", settings.clone());
        asset.map_chains_by_name();

        let mapping = asset.chain_mapping("LeftArm").unwrap();
        assert_eq!(mapping.source_chain.as_deref(), Some("Spine"));
        assert_eq!(mapping.settings, settings);

        asset.chain_settings_mut("Tail").unwrap().fk.enable_fk = false;
        assert!(!asset.chain_mapping("Tail").unwrap().settings.fk.enable_fk);
        assert!(asset.chain_settings_mut("Missing").is_none());
    }

    #[test]
    fn test_merged_profile_order() {
        let named = RetargetProfile::new().with_target_retarget_pose("A Pose");
        let mut asset = RetargeterAsset::new("biped")
            .with_target_retarget_pose("T Pose", RetargetPose::new())
            .with_profile("runtime", named);

        assert_eq!(asset.merged_profile(None).target_retarget_pose_name, "T Pose");

        asset.set_current_profile(Some("runtime"));
        assert_eq!(asset.merged_profile(None).target_retarget_pose_name, "A Pose");

        let custom = RetargetProfile::new().with_target_retarget_pose("Custom");
        let merged = asset.merged_profile(Some(&custom));
        assert_eq!(merged.target_retarget_pose_name, "Custom");
        assert_eq!(merged.source_retarget_pose_name, DEFAULT_POSE_NAME);
    }

    #[test]
    fn test_json_round_trip() {
        let (source, target) = rigs();
        let asset = RetargeterAsset::new("biped")
            .with_source_rig(source)
            .with_target_rig(target)
            .with_chain_mapping("LeftArm", "LeftArm", TargetChainSettings::default())
            .with_op(CurveRemapOp::new("curves").with_remap("a", "b"));

        let json = asset.to_json_string().unwrap();
        let loaded = RetargeterAsset::from_json_str(&json).unwrap();
        assert_eq!(loaded, asset);
    }

    #[test]
    fn test_sparse_json_uses_defaults() {
        let asset = RetargeterAsset::from_json_str(r#"{ "name": "sparse" }"#).unwrap();
        assert_eq!(asset.current_target_retarget_pose, DEFAULT_POSE_NAME);
        assert!(asset.target_retarget_pose(DEFAULT_POSE_NAME).is_some());
        assert!(asset.global_settings.enable_fk);

        assert!(matches!(
            RetargeterAsset::from_json_str("{ not json"),
            Err(RetargetError::Serialization(_))
        ));
        assert!(matches!(
            RetargeterAsset::from_json_file("/nonexistent/retargeter.json"),
            Err(RetargetError::Io(_))
        ));
    }
}
