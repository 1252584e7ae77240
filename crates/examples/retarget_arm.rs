//! Arm retargeting example
//!
//! Raises the arm of a small source character over one second and retargets it onto a taller
//! target with longer arms, once with interpolated FK and once with one-to-one FK, printing where
//! the target hand ends up.
//!
//! Run with `RUST_LOG=info` to see the retargeter's own log output.

use glam::{Quat, Vec3};
use helio_retarget::prelude::*;
use helio_retarget::RetargetSkeleton;
use std::collections::HashMap;
use std::sync::Arc;

const FRAMES: usize = 30;

fn main() -> helio_retarget::Result<()> {
    env_logger::init();
    log::info!("Starting arm retarget example");

    let source = Arc::new(build_character("mannequin", 1.0, 1.0)?);
    let target = Arc::new(build_character("giant", 1.6, 1.3)?);

    for mode in [FkRotationMode::Interpolated, FkRotationMode::OneToOne] {
        let asset = Arc::new(build_asset(mode));
        let mut processor = RetargetProcessor::new();
        processor.initialize(Some(source.clone()), Some(target.clone()), Some(asset));
        if !processor.is_initialized() {
            log::error!("Retargeter failed to initialize, see warnings above");
            continue;
        }

        println!("--- {:?} ---", mode);
        let hand = processor
            .target_skeleton()
            .skeleton
            .find_bone_index_by_name("hand_r")
            .unwrap_or_default();

        for frame in 0..=FRAMES {
            let t = frame as f32 / FRAMES as f32;
            let pose = source_frame(&source, t);
            let output = processor.run_retargeter(&pose, &HashMap::new(), 1.0 / 30.0, &RetargetProfile::new());
            if frame % 10 == 0 {
                let hand = output[hand].position;
                println!("t={:.2} hand=({:7.2}, {:7.2}, {:7.2})", t, hand.x, hand.y, hand.z);
            }
        }
    }

    Ok(())
}

fn build_character(name: &str, scale: f32, arm_scale: f32) -> helio_retarget::Result<SkeletonAsset> {
    let bone = |v: Vec3| Transform::from_position(v * scale);
    let arm = |v: Vec3| Transform::from_position(v * scale * arm_scale);

    SkeletonAsset::new(name)
        .with_bone("root", None, Transform::IDENTITY)?
        .with_bone("pelvis", Some("root"), bone(Vec3::Y * 95.0))?
        .with_bone("spine_01", Some("pelvis"), bone(Vec3::Y * 15.0))?
        .with_bone("spine_02", Some("spine_01"), bone(Vec3::Y * 15.0))?
        .with_bone("spine_03", Some("spine_02"), bone(Vec3::Y * 15.0))?
        .with_bone("clavicle_r", Some("spine_03"), bone(Vec3::X * 5.0))?
        .with_bone("upperarm_r", Some("clavicle_r"), arm(Vec3::X * 12.0))?
        .with_bone("lowerarm_r", Some("upperarm_r"), arm(Vec3::X * 28.0))?
        .with_bone("hand_r", Some("lowerarm_r"), arm(Vec3::X * 26.0))
}

fn build_rig(name: &str) -> IkRigDefinition {
    IkRigDefinition::new(name)
        .with_retarget_root("pelvis")
        .with_chain(BoneChain::new("Spine", "spine_01", "spine_03"))
        .with_chain(BoneChain::new("RightClavicle", "clavicle_r", "clavicle_r"))
        .with_chain(BoneChain::new("RightArm", "upperarm_r", "hand_r").with_ik_goal("hand_r_goal"))
        .with_goal("hand_r_goal", "hand_r")
}

fn build_asset(mode: FkRotationMode) -> RetargeterAsset {
    let arm_settings = TargetChainSettings::default()
        .with_fk(FkChainSettings::default().with_rotation_mode(mode))
        .with_ik(IkChainSettings {
            // leave the hand where FK puts it
            enable_ik: false,
            ..Default::default()
        });

    RetargeterAsset::new("mannequin_to_giant")
        .with_source_rig(build_rig("mannequin_rig"))
        .with_target_rig(build_rig("giant_rig"))
        .with_chain_mapping("Spine", "Spine", TargetChainSettings::default())
        .with_chain_mapping("RightClavicle", "RightClavicle", TargetChainSettings::default())
        .with_chain_mapping("RightArm", "RightArm", arm_settings)
}

/// Source pose at `t` in [0, 1]: the arm swings from horizontal to straight up while the
/// elbow bends and straightens again.
fn source_frame(asset: &SkeletonAsset, t: f32) -> Vec<Transform> {
    let mut skeleton = RetargetSkeleton::new();
    skeleton.initialize(asset, None, None);

    let mut local = skeleton.retarget_local_pose.clone();
    let raise = Quat::from_rotation_z(t * std::f32::consts::FRAC_PI_2);
    let bend = Quat::from_rotation_y((t * std::f32::consts::PI).sin() * 0.8);
    if let Some(upperarm) = skeleton.find_bone_index_by_name("upperarm_r") {
        local[upperarm].rotation = raise;
    }
    if let Some(lowerarm) = skeleton.find_bone_index_by_name("lowerarm_r") {
        local[lowerarm].rotation = bend;
    }

    let mut global = skeleton.retarget_global_pose.clone();
    skeleton.update_global_transforms_below_bone(None, &local, &mut global);
    global
}
