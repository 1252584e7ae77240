//! Retargeting settings
//!
//! Per-chain, root and global settings. Every struct deserializes with defaults for missing
//! fields, so hand-written JSON only needs the values it changes.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// How a target FK chain picks the source bone it copies rotation from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FkRotationMode {
    /// Sample the source chain at the same normalized arc length.
    #[default]
    Interpolated,
    /// Match bones by index from the chain start; extra target bones reuse the last source bone.
    OneToOne,
    /// Match bones by index counted from the chain tip.
    OneToOneReversed,
    /// The chain follows its parent rigidly.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FkTranslationMode {
    /// Keep the retarget pose offset from the parent.
    #[default]
    None,
    /// Source global translation scaled by the root scale factor.
    GloballyScaled,
    /// Source global translation, unchanged.
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FkChainSettings {
    pub enable_fk: bool,
    pub rotation_mode: FkRotationMode,
    pub rotation_alpha: f32,
    pub translation_mode: FkTranslationMode,
    pub translation_alpha: f32,
    /// 0 keeps the target bend plane, 1 matches the source bend plane.
    pub pole_vector_matching: f32,
    pub pole_vector_maintain_offset: bool,
    /// Manual twist around the chain axis, in degrees.
    pub pole_vector_offset: f32,
}

impl Default for FkChainSettings {
    fn default() -> Self {
        Self {
            enable_fk: true,
            rotation_mode: FkRotationMode::Interpolated,
            rotation_alpha: 1.0,
            translation_mode: FkTranslationMode::None,
            translation_alpha: 1.0,
            pole_vector_matching: 0.0,
            pole_vector_maintain_offset: false,
            pole_vector_offset: 0.0,
        }
    }
}

impl FkChainSettings {
    pub fn with_rotation_mode(mut self, mode: FkRotationMode) -> Self {
        self.rotation_mode = mode;
        self
    }

    pub fn with_translation_mode(mut self, mode: FkTranslationMode) -> Self {
        self.translation_mode = mode;
        self
    }

    pub fn with_alphas(mut self, rotation: f32, translation: f32) -> Self {
        self.rotation_alpha = rotation.clamp(0.0, 1.0);
        self.translation_alpha = translation.clamp(0.0, 1.0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkChainSettings {
    pub enable_ik: bool,
    pub blend_to_source: f32,
    pub blend_to_source_weights: Vec3,
    /// Added to the goal position in global space.
    pub static_offset: Vec3,
    /// Added to the goal position in the goal's own rotated frame.
    pub static_local_offset: Vec3,
    pub static_rotation_offset: Quat,
    pub scale_vertical: f32,
    /// Scales the goal's distance from the limb base.
    pub extension: f32,
    pub affected_by_ik_warping: bool,
}

impl Default for IkChainSettings {
    fn default() -> Self {
        Self {
            enable_ik: true,
            blend_to_source: 0.0,
            blend_to_source_weights: Vec3::ONE,
            static_offset: Vec3::ZERO,
            static_local_offset: Vec3::ZERO,
            static_rotation_offset: Quat::IDENTITY,
            scale_vertical: 1.0,
            extension: 1.0,
            affected_by_ik_warping: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedPlantingSettings {
    pub enable_speed_planting: bool,
    /// Curve supplying this limb's speed each frame.
    pub speed_curve_name: String,
    pub speed_threshold: f32,
    pub unplant_stiffness: f32,
    pub unplant_critical_damping: f32,
}

impl Default for SpeedPlantingSettings {
    fn default() -> Self {
        Self {
            enable_speed_planting: false,
            speed_curve_name: String::new(),
            speed_threshold: 15.0,
            unplant_stiffness: 250.0,
            unplant_critical_damping: 1.0,
        }
    }
}

impl SpeedPlantingSettings {
    pub fn from_curve(curve: impl Into<String>) -> Self {
        Self {
            enable_speed_planting: true,
            speed_curve_name: curve.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetChainSettings {
    pub fk: FkChainSettings,
    pub ik: IkChainSettings,
    pub speed_planting: SpeedPlantingSettings,
}

impl TargetChainSettings {
    pub fn with_fk(mut self, fk: FkChainSettings) -> Self {
        self.fk = fk;
        self
    }

    pub fn with_ik(mut self, ik: IkChainSettings) -> Self {
        self.ik = ik;
        self
    }

    pub fn with_speed_planting(mut self, planting: SpeedPlantingSettings) -> Self {
        self.speed_planting = planting;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootSettings {
    pub blend_to_source: f32,
    pub blend_to_source_weights: Vec3,
    pub scale_horizontal: f32,
    pub scale_vertical: f32,
    pub translation_offset: Vec3,
    pub rotation_offset: Quat,
    pub translation_alpha: f32,
    pub rotation_alpha: f32,
    /// Whether horizontal root motion carries the IK goals along with it.
    pub affect_ik_horizontal: bool,
    pub affect_ik_vertical: bool,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            blend_to_source: 0.0,
            blend_to_source_weights: Vec3::ONE,
            scale_horizontal: 1.0,
            scale_vertical: 1.0,
            translation_offset: Vec3::ZERO,
            rotation_offset: Quat::IDENTITY,
            translation_alpha: 1.0,
            rotation_alpha: 1.0,
            affect_ik_horizontal: true,
            affect_ik_vertical: false,
        }
    }
}

impl RootSettings {
    /// Per-axis weights (Y up) of how much root displacement reaches the IK goals.
    pub fn affect_ik_weights(&self) -> Vec3 {
        let horizontal = if self.affect_ik_horizontal { 1.0 } else { 0.0 };
        let vertical = if self.affect_ik_vertical { 1.0 } else { 0.0 };
        Vec3::new(horizontal, vertical, horizontal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WarpingDirectionSource {
    /// Average of the warp-affected IK goals.
    #[default]
    Goals,
    /// A named FK chain.
    Chain,
    /// The target's root bone.
    RootBone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BasicAxis {
    X,
    Y,
    #[default]
    Z,
    NegX,
    NegY,
    NegZ,
}

impl BasicAxis {
    pub fn to_vec(self) -> Vec3 {
        match self {
            BasicAxis::X => Vec3::X,
            BasicAxis::Y => Vec3::Y,
            BasicAxis::Z => Vec3::Z,
            BasicAxis::NegX => Vec3::NEG_X,
            BasicAxis::NegY => Vec3::NEG_Y,
            BasicAxis::NegZ => Vec3::NEG_Z,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub enable_root: bool,
    pub enable_fk: bool,
    pub enable_ik: bool,
    pub enable_post: bool,
    pub warping: bool,
    pub direction_source: WarpingDirectionSource,
    /// Character facing in the retarget pose.
    pub forward_direction: BasicAxis,
    /// FK chain used when `direction_source` is [`WarpingDirectionSource::Chain`].
    pub direction_chain: Option<String>,
    pub warp_forwards: f32,
    pub sideways_offset: f32,
    pub warp_splay: f32,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            enable_root: true,
            enable_fk: true,
            enable_ik: true,
            enable_post: true,
            warping: false,
            direction_source: WarpingDirectionSource::Goals,
            forward_direction: BasicAxis::Z,
            direction_chain: None,
            warp_forwards: 1.0,
            sideways_offset: 0.0,
            warp_splay: 1.0,
        }
    }
}
