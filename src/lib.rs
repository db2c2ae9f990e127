//! Per-frame skeletal pose composition.
//!
//! The pipeline a [`SkeletalComponent`] runs each tick:
//! required-bone resolution, animation graph evaluation, root motion
//! extraction/application, physics feedback blending, and hierarchical
//! composition with bone controllers injected along the walk. The renderer,
//! physics engine and attachment system consume the result through the
//! component's read-only accessors.
//!
//! No logger is installed; embedders configure `log` themselves.

pub mod component;
pub mod compose;
pub mod context;
pub mod controller;
pub mod errors;
pub mod graph;
pub mod math;
pub mod root_motion;
pub mod skeleton;

pub use component::{PoseUpdate, SkeletalComponent};
pub use compose::{build_priority_list, compose_skeleton, ComposeParams};
pub use context::EvalContext;
pub use controller::{
    AffectedBones, BoneController, BoneScaleController, ControllerList, PoseView,
    StrengthBlender, TransformOverrideController,
};
pub use errors::{MarrowError, Result};
pub use graph::clip::{AnimClip, BoneTrack};
pub use graph::node::{AnimNode, BlendNode, NodeState, SequenceNode};
pub use graph::{AnimGraph, NodeKey};
pub use math::{BoneAtom, WEIGHT_EPSILON};
pub use root_motion::{
    MotionOwner, RootMotionDelta, RootMotionMode, RootMotionState, RootRotationMode,
};
pub use skeleton::{recalc_required_bones, Bone, SkeletonLod, SkeletonModel};
