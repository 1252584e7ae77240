//! Helio animation retargeting
//!
//! Transfers animation between skeletons with different proportions and bone layouts. A
//! [`RetargeterAsset`] maps named bone chains of a source rig onto a target rig. A
//! [`RetargetProcessor`] built from that asset then converts every source frame into a target
//! pose through a fixed pipeline: root motion, FK chain rotations, IK limb goals, pole vector
//! matching and finally a stack of post-process ops.
//!
//! ```no_run
//! use helio_retarget::prelude::*;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # fn load() -> (SkeletonAsset, SkeletonAsset) { unimplemented!() }
//! let (source, target) = load();
//! let asset = RetargeterAsset::from_json_file("mannequin_to_giant.json").unwrap();
//!
//! let mut processor = RetargetProcessor::new();
//! processor.initialize(Some(Arc::new(source)), Some(Arc::new(target)), Some(Arc::new(asset)));
//!
//! let source_pose = processor.source_skeleton().retarget_global_pose.clone();
//! let target_pose = processor.run_retargeter(&source_pose, &HashMap::new(), 1.0 / 60.0, &RetargetProfile::new());
//! ```

pub mod asset;
pub mod chain;
pub mod error;
pub mod fk;
pub mod ik;
pub mod ops;
pub mod pair;
pub mod pole;
pub mod pose;
pub mod processor;
pub mod profile;
pub mod retarget_log;
pub mod rig;
pub mod root;
pub mod settings;
pub mod skeleton;
pub mod solver;
pub mod spring;
pub mod stride;
pub mod transform;

pub use asset::{ChainMapping, RetargeterAsset};
pub use chain::{BoneChain, ResolvedBoneChain};
pub use error::{RetargetError, Result};
pub use ops::{OpDefinition, OpStack, RetargetOp};
pub use pose::{RetargetPose, DEFAULT_POSE_NAME};
pub use processor::{RetargetProcessor, RetargetSide};
pub use profile::RetargetProfile;
pub use retarget_log::RetargetLog;
pub use rig::IkRigDefinition;
pub use skeleton::{RetargetSkeleton, SkeletonAsset, TargetSkeleton};
pub use solver::{IkGoal, IkRigSolver, LimbSolver};
pub use transform::Transform;

pub mod prelude {
    pub use crate::asset::{ChainMapping, RetargeterAsset};
    pub use crate::chain::BoneChain;
    pub use crate::error::{RetargetError, Result};
    pub use crate::ops::{
        CurveRemapOp, OpDefinition, OpStack, PinBoneOp, PinType, RetargetOp, RootMotionGeneratorOp,
    };
    pub use crate::pose::{RetargetPose, DEFAULT_POSE_NAME};
    pub use crate::processor::{RetargetProcessor, RetargetSide};
    pub use crate::profile::RetargetProfile;
    pub use crate::rig::IkRigDefinition;
    pub use crate::settings::{
        BasicAxis, FkChainSettings, FkRotationMode, FkTranslationMode, GlobalSettings,
        IkChainSettings, RootSettings, SpeedPlantingSettings, TargetChainSettings,
        WarpingDirectionSource,
    };
    pub use crate::skeleton::SkeletonAsset;
    pub use crate::transform::Transform;
}
