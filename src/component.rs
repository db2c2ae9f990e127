//! Skeletal Component
//!
//! Owns every per-instance buffer (required bones, local pose, component
//! space bases, visibility) and drives the pipeline once per logical tick:
//! resolve required bones, evaluate the graph, run root motion, blend in
//! physics feedback, compose the skeleton. The resulting space bases are the
//! published pose; callers snapshot them at hand-off.

use std::sync::Arc;

use glam::Mat4;

use crate::compose::{build_priority_list, compose_skeleton, ComposeParams};
use crate::context::EvalContext;
use crate::controller::ControllerList;
use crate::graph::AnimGraph;
use crate::math::{safe_inverse, BoneAtom, WEIGHT_EPSILON};
use crate::root_motion::{MotionOwner, RootMotionState};
use crate::skeleton::{recalc_required_bones, SkeletonModel};

/// Consecutive asleep ticks after which the whole update is skipped, when
/// the skip is enabled.
const PHYSICS_ASLEEP_SKIP_AFTER: u32 = 5;

/// What one `update_pose` call did, for downstream cache invalidation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseUpdate {
    /// LOD changed since the previous update; derived caches are stale.
    pub lod_changed: bool,
    /// The update returned early (no model, or physics asleep) and the pose
    /// buffers were not touched.
    pub skipped: bool,
}

/// One skinned skeleton instance.
pub struct SkeletalComponent {
    model: Option<Arc<SkeletonModel>>,
    graph: Option<AnimGraph>,

    required: Vec<usize>,
    required_up_to_date: bool,
    lod: usize,

    local: Vec<BoneAtom>,
    space: Vec<Mat4>,
    visibility: Vec<bool>,

    /// Per-bone index into the graph's controller lists.
    control_index: Vec<Option<usize>>,
    /// Per-bone high-priority flags; empty when no branch is prioritized.
    priority_list: Vec<bool>,
    bindings_up_to_date: bool,

    /// Bones driven by attached physics bodies, by name. Feeds the resolver.
    physics_bones: Vec<String>,
    /// Component-space transforms supplied by the physics step.
    physics_overrides: Vec<Option<Mat4>>,
    /// Blend ratio for physics overrides, 0 animation .. 1 physics.
    pub physics_weight: f32,

    pub root_motion: RootMotionState,
    /// Track the root bone's offset from the reference pose, for bounds.
    pub root_bone_translation: glam::Vec3,

    pub force_ref_pose: bool,
    /// Zero the root atom's translation/rotation after extraction, so
    /// extracted motion never also moves the pose.
    pub force_discard_root_motion: bool,
    pub skip_update_when_physics_asleep: bool,
    frames_physics_asleep: u32,
}

impl Default for SkeletalComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl SkeletalComponent {
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: None,
            graph: None,
            required: Vec::new(),
            required_up_to_date: false,
            lod: 0,
            local: Vec::new(),
            space: Vec::new(),
            visibility: Vec::new(),
            control_index: Vec::new(),
            priority_list: Vec::new(),
            bindings_up_to_date: false,
            physics_bones: Vec::new(),
            physics_overrides: Vec::new(),
            physics_weight: 0.0,
            root_motion: RootMotionState::new(),
            root_bone_translation: glam::Vec3::ZERO,
            force_ref_pose: false,
            force_discard_root_motion: false,
            skip_update_when_physics_asleep: false,
            frames_physics_asleep: 0,
        }
    }

    pub fn set_model(&mut self, model: Arc<SkeletonModel>) {
        self.model = Some(model);
        self.required_up_to_date = false;
        self.bindings_up_to_date = false;
    }

    #[must_use]
    pub fn model(&self) -> Option<&Arc<SkeletonModel>> {
        self.model.as_ref()
    }

    pub fn set_graph(&mut self, graph: Option<AnimGraph>) {
        self.graph = graph;
        self.bindings_up_to_date = false;
    }

    #[must_use]
    pub fn graph(&self) -> Option<&AnimGraph> {
        self.graph.as_ref()
    }

    #[must_use]
    pub fn graph_mut(&mut self) -> Option<&mut AnimGraph> {
        self.graph.as_mut()
    }

    /// Names the bones with attached physics bodies; they stay required even
    /// when the mesh LOD drops them.
    pub fn set_physics_bones(&mut self, names: Vec<String>) {
        self.physics_bones = names;
        self.required_up_to_date = false;
    }

    /// Forces a required-bone rebuild on the next update (mirror table or
    /// per-poly collision data changed).
    pub fn mark_required_stale(&mut self) {
        self.required_up_to_date = false;
    }

    pub fn set_bone_visibility(&mut self, bone: usize, visible: bool) {
        if let Some(slot) = self.visibility.get_mut(bone) {
            *slot = visible;
        }
    }

    /// Installs (or clears) the physics step's component-space transform for
    /// one bone.
    pub fn set_physics_override(&mut self, bone: usize, transform: Option<Mat4>) {
        if let Some(slot) = self.physics_overrides.get_mut(bone) {
            *slot = transform;
        }
    }

    #[must_use]
    pub fn required_bones(&self) -> &[usize] {
        &self.required
    }

    #[must_use]
    pub fn local_pose(&self) -> &[BoneAtom] {
        &self.local
    }

    /// The published component-space pose. Valid for required-bone indices
    /// after a non-skipped update.
    #[must_use]
    pub fn space_bases(&self) -> &[Mat4] {
        &self.space
    }

    /// Attachment query: bone-to-world transform. Read-only, no side
    /// effects.
    #[must_use]
    pub fn bone_matrix(&self, bone: usize, owner_to_world: &Mat4) -> Mat4 {
        *owner_to_world * self.space[bone]
    }

    /// Runs the full pipeline for one tick. `ctx.delta_time` of zero is a
    /// pose-only refresh: the graph does not advance and root motion is not
    /// touched.
    pub fn update_pose(
        &mut self,
        ctx: &EvalContext,
        mut owner: Option<&mut (dyn MotionOwner + '_)>,
    ) -> PoseUpdate {
        let Some(model) = self.model.clone() else {
            return PoseUpdate {
                lod_changed: false,
                skipped: true,
            };
        };

        // Freshly allocated space bases mean controllers would read garbage
        // from "last frame"; force them off for this call.
        let mut disable_controllers = ctx.disable_controllers;
        if self.space.len() != model.len() {
            self.space = vec![Mat4::IDENTITY; model.len()];
            disable_controllers = true;
        }
        if self.local.len() != model.len() {
            self.local = vec![BoneAtom::IDENTITY; model.len()];
        }
        if self.visibility.len() != model.len() {
            self.visibility = vec![true; model.len()];
        }
        if self.physics_overrides.len() != model.len() {
            self.physics_overrides = vec![None; model.len()];
        }

        let lod_changed = ctx.lod != self.lod;
        if lod_changed || !self.required_up_to_date {
            self.required = recalc_required_bones(&model, ctx.lod, &self.physics_bones);
            self.lod = ctx.lod;
            self.required_up_to_date = true;
        }
        if !self.bindings_up_to_date {
            self.rebuild_bindings(&model);
        }

        if ctx.physics_asleep {
            self.frames_physics_asleep += 1;
        } else {
            self.frames_physics_asleep = 0;
        }
        if self.skip_update_when_physics_asleep
            && self.frames_physics_asleep > PHYSICS_ASLEEP_SKIP_AFTER
        {
            return PoseUpdate {
                lod_changed,
                skipped: true,
            };
        }

        // Evaluate the graph, or fall back to the reference pose. Atoms for
        // required bones are never left undefined.
        let extracted = match self.graph.as_mut() {
            Some(graph) if !self.force_ref_pose => {
                graph.tick(ctx);
                let extracted = graph.sample_pose(&model, &self.required, &mut self.local);
                debug_assert!(self
                    .required
                    .iter()
                    .all(|&bone| self.local[bone].is_normalized()));
                extracted
            }
            _ => {
                model.fill_ref_pose(&self.required, &mut self.local);
                None
            }
        };

        // Root motion runs at most once per advancing tick; a zero-dt
        // refresh would re-apply deltas that were already consumed.
        if ctx.delta_time > 0.0 {
            self.root_motion
                .update(ctx.delta_time, extracted.as_ref(), owner.as_deref_mut());
        }

        if self.force_discard_root_motion {
            self.local[0].translation = glam::Vec3::ZERO;
            self.local[0].rotation = glam::Quat::IDENTITY;
        }
        self.root_bone_translation =
            self.local[0].translation - model.bone(0).ref_pose.translation;

        self.blend_physics(&model);

        let params = ComposeParams {
            lod: ctx.lod,
            rendered_recently: ctx.rendered_recently,
            disable_controllers,
            visibility: &self.visibility,
            priority_list: &self.priority_list,
            control_index: &self.control_index,
        };
        let controllers: &[ControllerList] = self
            .graph
            .as_ref()
            .map_or(&[], AnimGraph::controller_lists);
        compose_skeleton(
            &model,
            &params,
            controllers,
            &self.required,
            &mut self.local,
            &mut self.space,
        );

        PoseUpdate {
            lod_changed,
            skipped: false,
        }
    }

    /// Blends the physics step's component-space overrides into the local
    /// pose, through the same atom blend controllers use. Parent transforms
    /// are the previous frame's space bases, which is what the physics
    /// bodies were simulated against.
    fn blend_physics(&mut self, model: &SkeletonModel) {
        if self.physics_weight <= WEIGHT_EPSILON {
            return;
        }
        for &bone in &self.required {
            let Some(override_tm) = self.physics_overrides[bone] else {
                continue;
            };
            let parent_tm = match model.parent(bone) {
                None => Mat4::IDENTITY,
                Some(parent) => self.space[parent],
            };
            let atom = BoneAtom::from_matrix(&(safe_inverse(&parent_tm) * override_tm));
            self.local[bone] = BoneAtom::blend(&self.local[bone], &atom, self.physics_weight);
        }
    }

    /// Rebuilds the per-bone controller bindings and the compose priority
    /// flags from the current graph and model.
    fn rebuild_bindings(&mut self, model: &SkeletonModel) {
        self.control_index = vec![None; model.len()];
        self.priority_list = Vec::new();

        if let Some(graph) = &self.graph {
            for (list_index, list) in graph.controller_lists().iter().enumerate() {
                let Some(bone) = model.match_bone(&list.bone_name) else {
                    log::warn!(
                        "controller list references unknown bone '{}', skipping",
                        list.bone_name
                    );
                    continue;
                };
                if self.control_index[bone].is_some() {
                    log::warn!("bone '{}' already has a controller list bound", list.bone_name);
                    continue;
                }
                self.control_index[bone] = Some(list_index);
            }

            self.priority_list = build_priority_list(model, graph.prioritized_branches());
        }

        self.bindings_up_to_date = true;
    }
}
