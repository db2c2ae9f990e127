//! Skeleton Composer
//!
//! Turns the local pose into component-space matrices, walking the required
//! bones in ascending order so every parent is composed before its children,
//! and injecting bone controllers at the bone their list is bound to.
//!
//! When the graph names prioritized branches, composition runs in two passes:
//! the flagged branches first, then the rest. This lets a controller in one
//! branch read a bone another branch has already finished.

use glam::{Mat4, Vec3};

use crate::controller::{AffectedScales, AffectedTransforms, ControllerList, PoseView};
use crate::math::{matrix_contains_nan, remove_scaling, safe_inverse, BoneAtom, WEIGHT_EPSILON};
use crate::skeleton::SkeletonModel;

/// Per-compose inputs gathered by the component.
pub struct ComposeParams<'a> {
    pub lod: usize,
    pub rendered_recently: bool,
    /// Force-skips every controller this call (freshly allocated buffers,
    /// render-recency gate, explicit disable).
    pub disable_controllers: bool,
    /// Per-bone visibility; a hidden bone has its local scale forced to zero.
    pub visibility: &'a [bool],
    /// Per-bone high-priority flags; empty means single-pass composition.
    pub priority_list: &'a [bool],
    /// Per-bone index into the controller list array, `None` when no list is
    /// bound to that bone.
    pub control_index: &'a [Option<usize>],
}

/// Composes `local` into `space` for the required bones. Slots outside the
/// required list keep their previous contents.
pub fn compose_skeleton(
    model: &SkeletonModel,
    params: &ComposeParams<'_>,
    controllers: &[ControllerList],
    required: &[usize],
    local: &mut [BoneAtom],
    space: &mut [Mat4],
) {
    debug_assert_eq!(local.len(), model.len());
    debug_assert_eq!(space.len(), model.len());
    debug_assert_eq!(params.visibility.len(), model.len());

    let two_pass = !params.priority_list.is_empty();
    let passes: &[Option<bool>] = if two_pass {
        &[Some(true), Some(false)]
    } else {
        &[None]
    };

    for &pass in passes {
        for &bone in required {
            if let Some(high_priority) = pass {
                if params.priority_list[bone] != high_priority {
                    continue;
                }
            }

            if !params.visibility[bone] {
                local[bone].scale = 0.0;
            }

            compose_bone(model, bone, local, space);

            if params.disable_controllers {
                continue;
            }
            let Some(list_index) = params.control_index.get(bone).copied().flatten() else {
                continue;
            };
            apply_controller_list(model, params, &controllers[list_index], bone, local, space);
        }
    }
}

/// One bone's hierarchical step: the root's atom is its component-space
/// transform, everything else is parent times local.
#[inline]
fn compose_bone(model: &SkeletonModel, bone: usize, local: &[BoneAtom], space: &mut [Mat4]) {
    match model.parent(bone) {
        None => space[bone] = local[bone].to_matrix(),
        Some(parent) => {
            debug_assert!(parent < bone);
            space[bone] = space[parent] * local[bone].to_matrix();
        }
    }
}

fn apply_controller_list(
    model: &SkeletonModel,
    params: &ComposeParams<'_>,
    list: &ControllerList,
    bone: usize,
    local: &mut [BoneAtom],
    space: &mut [Mat4],
) {
    for controller in &list.controllers {
        if controller.ignore_when_not_rendered() && !params.rendered_recently {
            continue;
        }
        if params.lod >= controller.ignore_at_or_above_lod() {
            continue;
        }
        let alpha = controller.strength().min(1.0);
        if alpha <= WEIGHT_EPSILON {
            continue;
        }

        let affected = controller.affected_bones(bone, model);
        if affected.is_empty() {
            continue;
        }
        debug_assert!(affected.windows(2).all(|w| w[0] < w[1]));

        let mut new_transforms = AffectedTransforms::new();
        let mut new_scales = AffectedScales::new();
        {
            let view = PoseView {
                model,
                local,
                space,
            };
            controller.bone_transforms(bone, &view, &mut new_transforms);
            controller.bone_scales(bone, &view, &mut new_scales);
        }
        if new_transforms.is_empty() && new_scales.is_empty() {
            continue;
        }

        if !new_transforms.is_empty() {
            debug_assert_eq!(new_transforms.len(), affected.len());
            debug_assert!(!new_transforms.iter().any(matrix_contains_nan));
            apply_transform_overrides(model, &affected, &new_transforms, alpha, local, space);
        }

        if !new_scales.is_empty() {
            debug_assert_eq!(new_scales.len(), affected.len());
            apply_scale_overrides(model, &affected, &new_scales, alpha, local, space);
        }

        // Per-controller scale on the bound bone itself.
        let bone_scale = if params.visibility[bone] {
            1.0 + (controller.bone_scale(bone) - 1.0) * alpha
        } else {
            0.0
        };
        if bone_scale != 1.0 {
            local[bone].scale *= bone_scale;
            space[bone] *= Mat4::from_scale(Vec3::splat(bone_scale));
        }

        // Any required bone strictly between the first affected bone and the
        // bound bone that the controller did not touch now has a stale
        // transform (its parent may have moved); recompose it in place.
        recompose_span(model, &affected, bone, local, space);
    }
}

/// Blends controller transforms back into the local pose bone by bone, then
/// refreshes the component-space matrices. Affected bones arrive in ascending
/// order, so a parent's updated transform is already in `space` when its
/// child is processed.
fn apply_transform_overrides(
    model: &SkeletonModel,
    affected: &[usize],
    new_transforms: &[Mat4],
    alpha: f32,
    local: &mut [BoneAtom],
    space: &mut [Mat4],
) {
    for (idx, &target) in affected.iter().enumerate() {
        // When the parent is itself affected, derive the relative atom from
        // the controller's parent transform, not the already-blended one.
        let parent_tm = match model.parent(target) {
            None => Mat4::IDENTITY,
            Some(parent) => match affected.iter().position(|&b| b == parent) {
                Some(pos) => new_transforms[pos],
                None => space[parent],
            },
        };

        let rel = safe_inverse(&parent_tm) * new_transforms[idx];
        let control_atom = BoneAtom::from_matrix(&rel);

        if alpha >= 1.0 - WEIGHT_EPSILON {
            // Direct overwrite. The atom conversion drops scale, so drop it
            // from the matrix too and keep inheriting the parent's scale.
            let rel_no_scale = remove_scaling(&rel);
            space[target] = match model.parent(target) {
                None => rel_no_scale,
                Some(parent) => space[parent] * rel_no_scale,
            };
            local[target] = control_atom;
        } else {
            local[target] = BoneAtom::blend(&local[target], &control_atom, alpha);
            debug_assert!(local[target].is_normalized());
            compose_bone(model, target, local, space);
        }
    }
}

/// Applies absolute scale overrides as parent-relative scales, so scaling
/// composes correctly when a parent in the same affected set is also scaled.
fn apply_scale_overrides(
    model: &SkeletonModel,
    affected: &[usize],
    new_scales: &[f32],
    alpha: f32,
    local: &mut [BoneAtom],
    space: &mut [Mat4],
) {
    for (idx, &target) in affected.iter().enumerate() {
        let parent_scale = model
            .parent(target)
            .and_then(|parent| affected.iter().position(|&b| b == parent))
            .map_or(1.0, |pos| new_scales[pos]);

        let rel_scale = if alpha >= 1.0 - WEIGHT_EPSILON {
            if parent_scale == 0.0 {
                1.0
            } else {
                new_scales[idx] / parent_scale
            }
        } else {
            let target_rel = if parent_scale == 0.0 {
                1.0
            } else {
                new_scales[idx] / parent_scale
            };
            local[target].scale + (target_rel - local[target].scale) * alpha
        };

        local[target].scale *= rel_scale;
        space[target] *= Mat4::from_scale(Vec3::splat(rel_scale));
    }
}

/// Recomposes the untouched bones between the first affected bone and the
/// bound bone, whose parents may have been moved by the controller.
fn recompose_span(
    model: &SkeletonModel,
    affected: &[usize],
    bone: usize,
    local: &[BoneAtom],
    space: &mut [Mat4],
) {
    let first = affected[0];
    for stale in first + 1..bone {
        if !affected.contains(&stale) {
            compose_bone(model, stale, local, space);
        }
    }
}

/// Flags the high-priority bones for two-pass composition: each named bone,
/// its full ancestor chain, and its whole subtree. Unknown names are logged
/// and skipped. Returns an empty list when nothing is prioritized.
#[must_use]
pub fn build_priority_list(model: &SkeletonModel, branch_names: &[String]) -> Vec<bool> {
    if branch_names.is_empty() {
        return Vec::new();
    }

    let mut flags = vec![false; model.len()];
    for name in branch_names {
        let Some(bone) = model.match_bone(name) else {
            log::warn!("prioritized branch references unknown bone '{name}', skipping");
            continue;
        };

        flags[bone] = true;

        let mut ancestor = model.parent(bone);
        while let Some(index) = ancestor {
            flags[index] = true;
            ancestor = model.parent(index);
        }

        // Descendants form a contiguous run after the bone thanks to the
        // parent-before-child storage order.
        let mut in_subtree = vec![false; model.len()];
        in_subtree[bone] = true;
        for index in bone + 1..model.len() {
            if let Some(parent) = model.parent(index) {
                if in_subtree[parent] {
                    in_subtree[index] = true;
                    flags[index] = true;
                }
            }
        }
    }
    flags
}
