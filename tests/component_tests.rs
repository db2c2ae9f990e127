//! Skeletal Component Tests
//!
//! Tests for:
//! - missing-model and physics-asleep early-outs
//! - reference-pose fallback when no graph is bound
//! - LOD-change reporting and required-bone rebuilds
//! - zero delta time as a pose-only refresh
//! - force_ref_pose and force_discard_root_motion
//! - physics feedback blending
//! - the bone_matrix attachment query

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use marrow::graph::{AnimClip, AnimGraph, BoneTrack, SequenceNode};
use marrow::skeleton::model::chain;
use marrow::{
    EvalContext, MotionOwner, RootMotionDelta, RootMotionMode, SkeletalComponent, SkeletonModel,
};

const EPSILON: f32 = 1e-5;

fn approx_vec(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPSILON
}

fn translation_clip(name: &str, bone: usize, target: Vec3) -> Arc<AnimClip> {
    let track = BoneTrack {
        bone,
        times: vec![0.0, 1.0],
        translations: vec![Vec3::ZERO, target],
        rotations: vec![Quat::IDENTITY, Quat::IDENTITY],
    };
    Arc::new(AnimClip::new(name, vec![track]).unwrap())
}

#[derive(Default)]
struct TestOwner {
    translation: Vec3,
}

impl MotionOwner for TestOwner {
    fn to_world(&self) -> Mat4 {
        Mat4::IDENTITY
    }

    fn apply_motion(&mut self, translation: Vec3, _rotation: Option<Quat>) {
        self.translation += translation;
    }

    fn on_root_motion_extracted(&mut self, _world_delta: &RootMotionDelta) {}
}

// ============================================================================
// Early-outs
// ============================================================================

#[test]
fn update_without_model_is_skipped() {
    let mut component = SkeletalComponent::new();
    let result = component.update_pose(&EvalContext::new(0.1), None);
    assert!(result.skipped);
}

#[test]
fn update_skips_after_physics_sleeps_long_enough() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::X)).unwrap());
    let mut component = SkeletalComponent::new();
    component.set_model(model);
    component.skip_update_when_physics_asleep = true;

    let ctx = EvalContext {
        physics_asleep: true,
        ..EvalContext::new(0.1)
    };
    for _ in 0..5 {
        assert!(!component.update_pose(&ctx, None).skipped);
    }
    assert!(component.update_pose(&ctx, None).skipped);

    // Waking resets the counter.
    assert!(!component.update_pose(&EvalContext::new(0.1), None).skipped);
}

// ============================================================================
// Reference-pose fallback
// ============================================================================

#[test]
fn no_graph_composes_reference_pose() {
    let model = Arc::new(SkeletonModel::new(chain(3, Vec3::X)).unwrap());
    let mut component = SkeletalComponent::new();
    component.set_model(model);

    component.update_pose(&EvalContext::new(0.1), None);
    assert!(approx_vec(
        component.space_bases()[2].w_axis.truncate(),
        Vec3::new(2.0, 0.0, 0.0)
    ));
}

#[test]
fn force_ref_pose_overrides_the_graph() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::X)).unwrap());
    let mut graph = AnimGraph::new();
    let seq = graph.add_sequence(SequenceNode::new(translation_clip("a", 1, Vec3::Y * 5.0)));
    graph.set_root_child(Some(seq));

    let mut component = SkeletalComponent::new();
    component.set_model(model);
    component.set_graph(Some(graph));
    component.force_ref_pose = true;

    component.update_pose(&EvalContext::new(1.0), None);
    assert!(approx_vec(
        component.space_bases()[1].w_axis.truncate(),
        Vec3::X
    ));
}

// ============================================================================
// LOD handling
// ============================================================================

#[test]
fn lod_change_is_reported_and_required_bones_rebuilt() {
    let mut model = SkeletonModel::new(chain(3, Vec3::X)).unwrap();
    model.add_lod(vec![0]).unwrap();
    let mut component = SkeletalComponent::new();
    component.set_model(Arc::new(model));

    let result = component.update_pose(&EvalContext::new(0.1), None);
    assert!(!result.lod_changed);
    assert_eq!(component.required_bones(), &[0, 1, 2]);

    let ctx = EvalContext {
        lod: 1,
        ..EvalContext::new(0.1)
    };
    let result = component.update_pose(&ctx, None);
    assert!(result.lod_changed);
    assert_eq!(component.required_bones(), &[0]);

    let result = component.update_pose(&ctx, None);
    assert!(!result.lod_changed);
}

// ============================================================================
// Zero delta time
// ============================================================================

#[test]
fn zero_dt_refresh_never_applies_root_motion() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap());
    let mut graph = AnimGraph::new();
    let mut node = SequenceNode::new(translation_clip("run", 0, Vec3::X));
    node.extract_root_motion = true;
    let seq = graph.add_sequence(node);
    graph.set_root_child(Some(seq));

    let mut component = SkeletalComponent::new();
    component.set_model(model);
    component.set_graph(Some(graph));
    component.root_motion.set_mode(RootMotionMode::Translate);

    let mut owner = TestOwner::default();
    component.update_pose(&EvalContext::new(0.0), Some(&mut owner));
    component.update_pose(&EvalContext::new(0.0), Some(&mut owner));

    assert_eq!(owner.translation, Vec3::ZERO);
    assert_eq!(component.root_motion.delta.translation, Vec3::ZERO);
}

#[test]
fn root_motion_flows_from_graph_to_owner() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap());
    let mut graph = AnimGraph::new();
    let mut node = SequenceNode::new(translation_clip("run", 0, Vec3::X));
    node.extract_root_motion = true;
    let seq = graph.add_sequence(node);
    graph.set_root_child(Some(seq));

    let mut component = SkeletalComponent::new();
    component.set_model(model);
    component.set_graph(Some(graph));
    component.root_motion.set_mode(RootMotionMode::Translate);

    let mut owner = TestOwner::default();
    component.update_pose(&EvalContext::new(0.25), Some(&mut owner));
    component.update_pose(&EvalContext::new(0.25), Some(&mut owner));

    // Both ticks' deltas land once the mode is stable.
    assert!(approx_vec(owner.translation, Vec3::new(0.5, 0.0, 0.0)));
}

// ============================================================================
// Root bone bookkeeping
// ============================================================================

#[test]
fn force_discard_root_motion_zeroes_the_root_atom() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap());
    let mut graph = AnimGraph::new();
    let seq = graph.add_sequence(SequenceNode::new(translation_clip("run", 0, Vec3::X)));
    graph.set_root_child(Some(seq));

    let mut component = SkeletalComponent::new();
    component.set_model(model);
    component.set_graph(Some(graph));
    component.force_discard_root_motion = true;

    component.update_pose(&EvalContext::new(0.5), None);
    assert_eq!(component.local_pose()[0].translation, Vec3::ZERO);
    assert!(approx_vec(
        component.space_bases()[0].w_axis.truncate(),
        Vec3::ZERO
    ));
}

#[test]
fn root_bone_translation_tracks_offset_from_ref_pose() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap());
    let mut graph = AnimGraph::new();
    let seq = graph.add_sequence(SequenceNode::new(translation_clip("run", 0, Vec3::X)));
    graph.set_root_child(Some(seq));

    let mut component = SkeletalComponent::new();
    component.set_model(model);
    component.set_graph(Some(graph));

    component.update_pose(&EvalContext::new(0.5), None);
    assert!(approx_vec(
        component.root_bone_translation,
        Vec3::new(0.5, 0.0, 0.0)
    ));
}

// ============================================================================
// Physics feedback
// ============================================================================

#[test]
fn physics_override_at_full_weight_drives_the_bone() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap());
    let mut component = SkeletalComponent::new();
    component.set_model(model);

    // Allocate buffers, then install the override.
    component.update_pose(&EvalContext::new(0.1), None);
    component.set_physics_override(1, Some(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0))));
    component.physics_weight = 1.0;

    component.update_pose(&EvalContext::new(0.1), None);
    assert!(approx_vec(
        component.space_bases()[1].w_axis.truncate(),
        Vec3::new(5.0, 0.0, 0.0)
    ));
}

#[test]
fn physics_override_at_zero_weight_is_ignored() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::ZERO)).unwrap());
    let mut component = SkeletalComponent::new();
    component.set_model(model);

    component.update_pose(&EvalContext::new(0.1), None);
    component.set_physics_override(1, Some(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0))));
    component.physics_weight = 0.0;

    component.update_pose(&EvalContext::new(0.1), None);
    assert!(approx_vec(
        component.space_bases()[1].w_axis.truncate(),
        Vec3::ZERO
    ));
}

// ============================================================================
// Attachment query
// ============================================================================

#[test]
fn bone_matrix_composes_owner_transform() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::X)).unwrap());
    let mut component = SkeletalComponent::new();
    component.set_model(model);
    component.update_pose(&EvalContext::new(0.1), None);

    let owner_to_world = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0));
    let world = component.bone_matrix(1, &owner_to_world);
    assert!(approx_vec(
        world.w_axis.truncate(),
        Vec3::new(1.0, 10.0, 0.0)
    ));
}

// ============================================================================
// Bone visibility
// ============================================================================

#[test]
fn hidden_bone_has_zero_scale_after_update() {
    let model = Arc::new(SkeletonModel::new(chain(2, Vec3::X)).unwrap());
    let mut component = SkeletalComponent::new();
    component.set_model(model);
    component.update_pose(&EvalContext::new(0.1), None);

    component.set_bone_visibility(1, false);
    component.update_pose(&EvalContext::new(0.1), None);
    assert!(approx_vec(
        component.space_bases()[1].x_axis.truncate(),
        Vec3::ZERO
    ));
}
