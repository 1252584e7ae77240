//! Walk cycle retargeting example
//!
//! Loads a retargeter asset from JSON, then retargets a procedural walk from a short source
//! character onto a tall target. The feet plant while their speed curve is low, stride warping
//! lengthens the steps, and a root motion op places the target root under the pelvis.
//!
//! Run with `RUST_LOG=helio_retarget=info` to see initialization messages.

use glam::{Quat, Vec3};
use helio_retarget::prelude::*;
use helio_retarget::RetargetSkeleton;
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::sync::Arc;

const ASSET_JSON: &str = r#"{
    "name": "short_to_tall",
    "source_rig": {
        "name": "short_rig",
        "retarget_root": "pelvis",
        "chains": [
            { "name": "Spine", "start_bone": "spine", "end_bone": "spine" },
            { "name": "LeftLeg", "start_bone": "thigh_l", "end_bone": "foot_l", "ik_goal": "foot_l_goal" },
            { "name": "RightLeg", "start_bone": "thigh_r", "end_bone": "foot_r", "ik_goal": "foot_r_goal" }
        ],
        "goals": [
            { "name": "foot_l_goal", "bone": "foot_l" },
            { "name": "foot_r_goal", "bone": "foot_r" }
        ]
    },
    "target_rig": {
        "name": "tall_rig",
        "retarget_root": "pelvis",
        "chains": [
            { "name": "Spine", "start_bone": "spine", "end_bone": "spine" },
            { "name": "LeftLeg", "start_bone": "thigh_l", "end_bone": "foot_l", "ik_goal": "foot_l_goal" },
            { "name": "RightLeg", "start_bone": "thigh_r", "end_bone": "foot_r", "ik_goal": "foot_r_goal" }
        ],
        "goals": [
            { "name": "foot_l_goal", "bone": "foot_l" },
            { "name": "foot_r_goal", "bone": "foot_r" }
        ]
    },
    "chain_mappings": [
        { "target_chain": "Spine", "source_chain": "Spine" },
        {
            "target_chain": "LeftLeg",
            "source_chain": "LeftLeg",
            "settings": {
                "speed_planting": { "enable_speed_planting": true, "speed_curve_name": "foot_l_speed" }
            }
        },
        {
            "target_chain": "RightLeg",
            "source_chain": "RightLeg",
            "settings": {
                "speed_planting": { "enable_speed_planting": true, "speed_curve_name": "foot_r_speed" }
            }
        }
    ],
    "global_settings": {
        "warping": true,
        "direction_source": "Goals",
        "forward_direction": "Z",
        "warp_forwards": 1.25
    },
    "ops": [
        {
            "type": "RootMotionGenerator",
            "name": "root_motion",
            "source_root_bone": "root",
            "target_root_bone": "root",
            "target_pelvis_bone": "pelvis",
            "root_motion_source": "GenerateFromTargetPelvis",
            "root_height_source": "SnapToGround"
        },
        {
            "type": "CurveRemap",
            "name": "speed_curves",
            "remaps": [
                { "source_curve": "foot_l_speed", "target_curve": "foot_l_speed", "scale": 1.5 },
                { "source_curve": "foot_r_speed", "target_curve": "foot_r_speed", "scale": 1.5 }
            ]
        }
    ]
}"#;

const FRAMES: usize = 60;
const FRAME_TIME: f32 = 1.0 / 30.0;
const WALK_SPEED: f32 = 80.0;
const STRIDE: f32 = 20.0;

fn main() -> helio_retarget::Result<()> {
    env_logger::init();
    log::info!("Starting walk retarget example");

    let asset = Arc::new(RetargeterAsset::from_json_str(ASSET_JSON)?);
    let source = Arc::new(build_character("short", 1.0)?);
    let target = Arc::new(build_character("tall", 1.4)?);

    let mut processor = RetargetProcessor::new();
    processor.initialize(Some(source.clone()), Some(target), Some(asset));
    if !processor.is_initialized() {
        log::error!("Retargeter failed to initialize, see warnings above");
        return Ok(());
    }

    let skeleton = processor.target_skeleton().skeleton.clone();
    let foot_l = skeleton.find_bone_index_by_name("foot_l").unwrap_or_default();
    let foot_r = skeleton.find_bone_index_by_name("foot_r").unwrap_or_default();

    for frame in 0..FRAMES {
        let time = frame as f32 * FRAME_TIME;
        let (pose, curves) = walk_frame(&source, time);
        let output = processor.run_retargeter(&pose, &curves, FRAME_TIME, &RetargetProfile::new());

        if frame % 6 == 0 {
            let (l, r, root) = (output[foot_l].position, output[foot_r].position, output[0].position);
            println!(
                "t={:.2} root.z={:7.2} foot_l.z={:7.2} foot_r.z={:7.2}",
                time, root.z, l.z, r.z
            );
        }
    }

    if let Some(speed) = processor.output_curves().get("foot_l_speed") {
        println!("last remapped left foot speed: {:.2}", speed);
    }
    println!(
        "warnings: {}, errors: {}",
        processor.log().warning_count(),
        processor.log().error_count()
    );

    Ok(())
}

fn build_character(name: &str, scale: f32) -> helio_retarget::Result<SkeletonAsset> {
    let bone = |v: Vec3| Transform::from_position(v * scale);

    SkeletonAsset::new(name)
        .with_bone("root", None, Transform::IDENTITY)?
        .with_bone("pelvis", Some("root"), bone(Vec3::Y * 90.0))?
        .with_bone("spine", Some("pelvis"), bone(Vec3::Y * 20.0))?
        .with_bone("thigh_l", Some("pelvis"), bone(Vec3::X * 10.0))?
        .with_bone("shin_l", Some("thigh_l"), bone(Vec3::new(0.0, -43.0, 4.0)))?
        .with_bone("foot_l", Some("shin_l"), bone(Vec3::new(0.0, -42.0, -4.0)))?
        .with_bone("thigh_r", Some("pelvis"), bone(Vec3::X * -10.0))?
        .with_bone("shin_r", Some("thigh_r"), bone(Vec3::new(0.0, -43.0, 4.0)))?
        .with_bone("foot_r", Some("shin_r"), bone(Vec3::new(0.0, -42.0, -4.0)))
}

/// Source pose and foot speed curves of a simple walk at `time`.
fn walk_frame(asset: &SkeletonAsset, time: f32) -> (Vec<Transform>, HashMap<String, f32>) {
    let mut skeleton = RetargetSkeleton::new();
    skeleton.initialize(asset, None, None);
    let mut local = skeleton.retarget_local_pose.clone();

    let phase = time * WALK_SPEED / (2.0 * STRIDE) * TAU;
    let mut curves = HashMap::new();
    for (side, offset) in [("l", 0.0), ("r", 0.5 * TAU)] {
        let swing = (phase + offset).sin();
        if let Some(thigh) = skeleton.find_bone_index_by_name(&format!("thigh_{side}")) {
            local[thigh].rotation = Quat::from_rotation_x(-0.35 * swing);
        }
        // a foot moves while its leg swings forward
        let speed = (phase + offset).cos().max(0.0) * WALK_SPEED * 2.0;
        curves.insert(format!("foot_{side}_speed"), speed);
    }

    if let Some(pelvis) = skeleton.find_bone_index_by_name("pelvis") {
        local[pelvis].position.z += time * WALK_SPEED;
        local[pelvis].position.y += (phase * 2.0).cos() * 1.5;
    }

    let mut global = skeleton.retarget_global_pose.clone();
    skeleton.update_global_transforms_below_bone(None, &local, &mut global);
    (global, curves)
}
