//! Skeleton Composer Tests
//!
//! Tests for:
//! - hierarchical composition (child = parent * local) and idempotence
//! - controller blend boundaries (epsilon no-op, full overwrite)
//! - visibility scale-zeroing
//! - intervening-bone recompose after a controller moves an ancestor
//! - two-pass priority composition flags
//! - scale overrides

use glam::{Mat4, Quat, Vec3};

use marrow::controller::{
    AffectedBones, AffectedTransforms, BoneController, ControllerList, PoseView,
};
use marrow::skeleton::model::chain;
use marrow::{
    build_priority_list, compose_skeleton, BoneAtom, BoneScaleController, ComposeParams,
    SkeletonModel, TransformOverrideController,
};

const EPSILON: f32 = 1e-5;

fn approx_mat(a: &Mat4, b: &Mat4) -> bool {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .all(|(x, y)| (x - y).abs() < EPSILON)
}

fn approx_vec(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPSILON
}

/// Single-pass compose with no controllers.
fn compose_plain(model: &SkeletonModel, local: &mut [BoneAtom], space: &mut [Mat4]) {
    let visibility = vec![true; model.len()];
    let control_index = vec![None; model.len()];
    let required: Vec<usize> = (0..model.len()).collect();
    let params = ComposeParams {
        lod: 0,
        rendered_recently: true,
        disable_controllers: false,
        visibility: &visibility,
        priority_list: &[],
        control_index: &control_index,
    };
    compose_skeleton(model, &params, &[], &required, local, space);
}

fn compose_with_controllers(
    model: &SkeletonModel,
    controllers: &[ControllerList],
    bound_bone: usize,
    local: &mut [BoneAtom],
    space: &mut [Mat4],
) {
    let visibility = vec![true; model.len()];
    let mut control_index = vec![None; model.len()];
    control_index[bound_bone] = Some(0);
    let required: Vec<usize> = (0..model.len()).collect();
    let params = ComposeParams {
        lod: 0,
        rendered_recently: true,
        disable_controllers: false,
        visibility: &visibility,
        priority_list: &[],
        control_index: &control_index,
    };
    compose_skeleton(model, &params, controllers, &required, local, space);
}

// ============================================================================
// Hierarchical composition
// ============================================================================

/// Two-bone chain, root at origin, child translated (1,0,0): the child's
/// component-space transform is translate(1,0,0).
#[test]
fn two_bone_chain_composes_child_translation() {
    let model = SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap();
    let mut local = vec![BoneAtom::IDENTITY; 2];
    local[1].translation = Vec3::X;
    let mut space = vec![Mat4::IDENTITY; 2];

    compose_plain(&model, &mut local, &mut space);
    assert!(approx_mat(&space[1], &Mat4::from_translation(Vec3::X)));
}

#[test]
fn every_child_equals_parent_times_local() {
    let model = SkeletonModel::new(chain(5, Vec3::X)).unwrap();
    let mut local: Vec<BoneAtom> = (0..5)
        .map(|i| {
            BoneAtom::new(
                Vec3::new(i as f32, 0.5, -0.25),
                Quat::from_rotation_y(0.1 * i as f32),
                1.0,
            )
        })
        .collect();
    let mut space = vec![Mat4::IDENTITY; 5];
    compose_plain(&model, &mut local, &mut space);

    for bone in 1..5 {
        let expected = space[bone - 1] * local[bone].to_matrix();
        assert!(approx_mat(&space[bone], &expected), "bone {bone}");
    }
}

#[test]
fn composition_is_idempotent() {
    let model = SkeletonModel::new(chain(4, Vec3::X)).unwrap();
    let mut local: Vec<BoneAtom> = (0..4)
        .map(|i| BoneAtom::new(Vec3::splat(i as f32), Quat::from_rotation_z(0.2), 1.0))
        .collect();
    let mut space = vec![Mat4::IDENTITY; 4];

    compose_plain(&model, &mut local, &mut space);
    let first = space.clone();
    compose_plain(&model, &mut local, &mut space);

    for (a, b) in first.iter().zip(space.iter()) {
        assert_eq!(a, b, "unchanged inputs must produce identical output");
    }
}

#[test]
fn hidden_bone_scales_to_zero() {
    let model = SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap();
    let mut local = vec![BoneAtom::IDENTITY; 2];
    local[1].translation = Vec3::X;
    let mut space = vec![Mat4::IDENTITY; 2];

    let visibility = vec![true, false];
    let control_index = vec![None, None];
    let params = ComposeParams {
        lod: 0,
        rendered_recently: true,
        disable_controllers: false,
        visibility: &visibility,
        priority_list: &[],
        control_index: &control_index,
    };
    compose_skeleton(&model, &params, &[], &[0, 1], &mut local, &mut space);

    assert_eq!(local[1].scale, 0.0);
    assert!(approx_vec(space[1].x_axis.truncate(), Vec3::ZERO));
}

// ============================================================================
// Controller blend boundaries
// ============================================================================

/// Alpha 1.0 is a direct overwrite: the bone's space basis equals the
/// controller's target exactly.
#[test]
fn controller_at_full_alpha_overwrites_exactly() {
    let model = SkeletonModel::new(chain(5, Vec3::X)).unwrap();
    let target =
        Mat4::from_rotation_translation(Quat::from_rotation_z(0.5), Vec3::new(2.0, 3.0, 4.0));
    let lists = [ControllerList {
        bone_name: "bone4".to_string(),
        controllers: vec![Box::new(TransformOverrideController::new(target, 1.0)) as _],
    }];

    let mut local = vec![BoneAtom::IDENTITY; 5];
    let mut space = vec![Mat4::IDENTITY; 5];
    compose_with_controllers(&model, &lists, 4, &mut local, &mut space);

    assert!(approx_mat(&space[4], &target));
}

#[test]
fn controller_at_epsilon_alpha_is_a_no_op() {
    let model = SkeletonModel::new(chain(3, Vec3::X)).unwrap();
    let target = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
    let lists = [ControllerList {
        bone_name: "bone2".to_string(),
        controllers: vec![Box::new(TransformOverrideController::new(target, 0.0)) as _],
    }];

    let mut local = vec![BoneAtom::IDENTITY; 3];
    local[1].translation = Vec3::X;
    local[2].translation = Vec3::X;
    let mut plain_local = local.clone();

    let mut space = vec![Mat4::IDENTITY; 3];
    compose_with_controllers(&model, &lists, 2, &mut local, &mut space);

    let mut plain_space = vec![Mat4::IDENTITY; 3];
    compose_plain(&model, &mut plain_local, &mut plain_space);

    assert!(approx_mat(&space[2], &plain_space[2]));
}

#[test]
fn controller_at_half_alpha_blends_translation() {
    let model = SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap();
    let target = Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0));
    let lists = [ControllerList {
        bone_name: "bone1".to_string(),
        controllers: vec![Box::new(TransformOverrideController::new(target, 0.5)) as _],
    }];

    let mut local = vec![BoneAtom::IDENTITY; 2];
    let mut space = vec![Mat4::IDENTITY; 2];
    compose_with_controllers(&model, &lists, 1, &mut local, &mut space);

    assert!(approx_vec(
        space[1].w_axis.truncate(),
        Vec3::new(1.0, 0.0, 0.0)
    ));
}

#[test]
fn disabled_controllers_leave_pose_untouched() {
    let model = SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap();
    let target = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
    let lists = [ControllerList {
        bone_name: "bone1".to_string(),
        controllers: vec![Box::new(TransformOverrideController::new(target, 1.0)) as _],
    }];

    let visibility = vec![true; 2];
    let control_index = vec![None, Some(0)];
    let params = ComposeParams {
        lod: 0,
        rendered_recently: true,
        disable_controllers: true,
        visibility: &visibility,
        priority_list: &[],
        control_index: &control_index,
    };
    let mut local = vec![BoneAtom::IDENTITY; 2];
    let mut space = vec![Mat4::IDENTITY; 2];
    compose_skeleton(&model, &params, &lists, &[0, 1], &mut local, &mut space);

    assert!(approx_mat(&space[1], &Mat4::IDENTITY));
}

#[test]
fn controller_skipped_at_or_above_its_lod_threshold() {
    let model = SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap();
    let target = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
    let mut controller = TransformOverrideController::new(target, 1.0);
    controller.ignore_at_or_above_lod = 1;
    let lists = [ControllerList {
        bone_name: "bone1".to_string(),
        controllers: vec![Box::new(controller) as _],
    }];

    let visibility = vec![true; 2];
    let control_index = vec![None, Some(0)];
    let params = ComposeParams {
        lod: 1,
        rendered_recently: true,
        disable_controllers: false,
        visibility: &visibility,
        priority_list: &[],
        control_index: &control_index,
    };
    let mut local = vec![BoneAtom::IDENTITY; 2];
    let mut space = vec![Mat4::IDENTITY; 2];
    compose_skeleton(&model, &params, &lists, &[0, 1], &mut local, &mut space);

    assert!(approx_mat(&space[1], &Mat4::IDENTITY));
}

// ============================================================================
// Multi-bone controllers and the recompose span
// ============================================================================

/// Moves an ancestor chain; bound to the last bone of the chain.
struct ChainShiftController {
    first: usize,
    offset: Vec3,
}

impl BoneController for ChainShiftController {
    fn strength(&self) -> f32 {
        1.0
    }

    fn affected_bones(&self, bone: usize, _model: &SkeletonModel) -> AffectedBones {
        // The bound bone plus one ancestor, leaving the bones in between to
        // the recompose pass.
        let mut bones = AffectedBones::new();
        bones.push(self.first);
        bones.push(bone);
        bones
    }

    fn bone_transforms(&self, bone: usize, pose: &PoseView<'_>, out: &mut AffectedTransforms) {
        let shift = Mat4::from_translation(self.offset);
        out.push(shift * pose.space[self.first]);
        out.push(shift * pose.space[bone]);
    }
}

#[test]
fn intervening_bones_are_recomposed_after_ancestor_moves() {
    // Chain 0-1-2-3, each offset by X. Controller on bone 3 also moves
    // bone 1; bone 2 is not affected but its parent moved under it.
    let model = SkeletonModel::new(chain(4, Vec3::X)).unwrap();
    let lists = [ControllerList {
        bone_name: "bone3".to_string(),
        controllers: vec![Box::new(ChainShiftController {
            first: 1,
            offset: Vec3::Y,
        }) as _],
    }];

    let mut local: Vec<BoneAtom> = model_ref_pose(&model);
    let mut space = vec![Mat4::IDENTITY; 4];
    compose_with_controllers(&model, &lists, 3, &mut local, &mut space);

    // Bone 1 moved up by Y, and bone 2 must follow its new parent frame.
    assert!(approx_vec(
        space[1].w_axis.truncate(),
        Vec3::new(1.0, 1.0, 0.0)
    ));
    assert!(approx_vec(
        space[2].w_axis.truncate(),
        Vec3::new(2.0, 1.0, 0.0)
    ));
    assert!(approx_vec(
        space[3].w_axis.truncate(),
        Vec3::new(3.0, 1.0, 0.0)
    ));
}

fn model_ref_pose(model: &SkeletonModel) -> Vec<BoneAtom> {
    (0..model.len()).map(|i| model.bone(i).ref_pose).collect()
}

// ============================================================================
// Scale
// ============================================================================

#[test]
fn bone_scale_controller_scales_its_bone() {
    let model = SkeletonModel::new(chain(2, Vec3::X)).unwrap();
    let lists = [ControllerList {
        bone_name: "bone1".to_string(),
        controllers: vec![Box::new(BoneScaleController::new(2.0, 1.0)) as _],
    }];

    let mut local = model_ref_pose(&model);
    let mut space = vec![Mat4::IDENTITY; 2];
    compose_with_controllers(&model, &lists, 1, &mut local, &mut space);

    assert!((local[1].scale - 2.0).abs() < EPSILON);
    // Scale applies to the bone's axes, not its position.
    assert!(approx_vec(space[1].w_axis.truncate(), Vec3::X));
    assert!(approx_vec(space[1].x_axis.truncate(), Vec3::X * 2.0));
}

#[test]
fn bone_scale_at_half_strength_is_lerped() {
    let model = SkeletonModel::new(chain(2, Vec3::X)).unwrap();
    let lists = [ControllerList {
        bone_name: "bone1".to_string(),
        controllers: vec![Box::new(BoneScaleController::new(3.0, 0.5)) as _],
    }];

    let mut local = model_ref_pose(&model);
    let mut space = vec![Mat4::IDENTITY; 2];
    compose_with_controllers(&model, &lists, 1, &mut local, &mut space);

    // lerp(1.0, 3.0, 0.5) = 2.0
    assert!((local[1].scale - 2.0).abs() < EPSILON);
}

// ============================================================================
// Priority list
// ============================================================================

#[test]
fn priority_list_flags_bone_ancestors_and_subtree() {
    // root(0) -> 1 -> 2 -> 3, root(0) -> 4 -> 5
    let parents = [None, Some(0), Some(1), Some(2), Some(0), Some(4)];
    let bones = parents
        .iter()
        .enumerate()
        .map(|(i, &parent)| {
            marrow::Bone::new(&format!("bone{i}"), parent, BoneAtom::IDENTITY)
        })
        .collect();
    let model = SkeletonModel::new(bones).unwrap();

    let flags = build_priority_list(&model, &["bone2".to_string()]);
    assert_eq!(flags, vec![true, true, true, true, false, false]);
}

#[test]
fn priority_list_is_empty_without_branches() {
    let model = SkeletonModel::new(chain(3, Vec3::X)).unwrap();
    assert!(build_priority_list(&model, &[]).is_empty());
}

#[test]
fn priority_list_skips_unknown_names() {
    let model = SkeletonModel::new(chain(3, Vec3::X)).unwrap();
    let flags = build_priority_list(&model, &["missing".to_string()]);
    assert_eq!(flags, vec![false, false, false]);
}

#[test]
fn two_pass_composition_matches_single_pass_result() {
    // Forked hierarchy so the second pass actually composes a branch.
    let parents = [None, Some(0), Some(1), Some(2), Some(0), Some(4)];
    let bones: Vec<marrow::Bone> = parents
        .iter()
        .enumerate()
        .map(|(i, &parent)| {
            marrow::Bone::new(&format!("bone{i}"), parent, BoneAtom::IDENTITY)
        })
        .collect();
    let model = SkeletonModel::new(bones).unwrap();
    let mut local: Vec<BoneAtom> = (0..6)
        .map(|i| BoneAtom::new(Vec3::new(1.0, i as f32 * 0.1, 0.0), Quat::IDENTITY, 1.0))
        .collect();
    let mut reference_local = local.clone();

    let mut single = vec![Mat4::IDENTITY; 6];
    compose_plain(&model, &mut reference_local, &mut single);

    let priority = build_priority_list(&model, &["bone2".to_string()]);
    assert!(priority.iter().any(|&flag| !flag));
    let visibility = vec![true; 6];
    let control_index = vec![None; 6];
    let params = ComposeParams {
        lod: 0,
        rendered_recently: true,
        disable_controllers: false,
        visibility: &visibility,
        priority_list: &priority,
        control_index: &control_index,
    };
    let mut two_pass = vec![Mat4::IDENTITY; 6];
    compose_skeleton(
        &model,
        &params,
        &[],
        &[0, 1, 2, 3, 4, 5],
        &mut local,
        &mut two_pass,
    );

    for bone in 0..6 {
        assert!(approx_mat(&single[bone], &two_pass[bone]), "bone {bone}");
    }
}
