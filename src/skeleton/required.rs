//! Required-Bone Resolver
//!
//! Computes, per LOD, the minimal strictly-increasing bone index set that an
//! evaluation must touch: the LOD's own bones, plus bones pulled in by
//! mirroring, physics bodies and per-triangle collision, plus every ancestor
//! of anything in the set. Rebuilt only when topology-affecting state
//! changes, never per frame.

use crate::skeleton::SkeletonModel;

/// Merges sorted `insert` into sorted `base`, inserting any element missing
/// from `base` while preserving order. Both inputs must be strictly
/// increasing.
pub fn merge_sorted(base: &mut Vec<usize>, insert: &[usize]) {
    let mut base_pos = 0;
    let mut insert_pos = 0;

    while insert_pos < insert.len() {
        let value = insert[insert_pos];

        // Past the end of base: the remainder just appends.
        if base_pos == base.len() {
            base.push(value);
            base_pos += 1;
            insert_pos += 1;
            continue;
        }

        debug_assert!(base_pos == 0 || base[base_pos - 1] < base[base_pos]);

        let existing = base[base_pos];
        if existing < value {
            base_pos += 1;
        } else if existing == value {
            base_pos += 1;
            insert_pos += 1;
        } else {
            base.insert(base_pos, value);
            base_pos += 1;
            insert_pos += 1;
        }
    }
}

/// Ensures every bone in `bones` has its full ancestor chain present,
/// inserting missing parents at their sorted position. Keeps the list
/// strictly increasing.
pub fn ensure_parents_present(bones: &mut Vec<usize>, model: &SkeletonModel) {
    let mut i = 0;
    while i < bones.len() {
        let bone = bones[i];

        if bone >= model.len() {
            // A miss upstream should have been dropped already.
            log::warn!("required-bone list contains out-of-range index {bone}");
            i += 1;
            continue;
        }

        let Some(parent) = model.parent(bone) else {
            i += 1;
            continue;
        };

        match bones.binary_search(&parent) {
            Ok(_) => i += 1,
            // Insert the parent and continue from it, so its own ancestors
            // get pulled in too.
            Err(pos) => {
                bones.insert(pos, parent);
                i = pos;
            }
        }
    }
}

/// Resolves a set of bone names into a sorted, deduplicated index list.
/// Names that do not exist on this mesh are logged and dropped.
fn resolve_sorted(model: &SkeletonModel, names: &[String], what: &str) -> Vec<usize> {
    let mut indices = Vec::with_capacity(names.len());
    for name in names {
        match model.match_bone(name) {
            Some(index) => indices.push(index),
            None => log::warn!("{what} references unknown bone '{name}', skipping"),
        }
    }
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Recalculates the required-bone list for `lod_index`.
///
/// Starts from the LOD's base list, merges in mirror sources, physics bones
/// and per-triangle collision bones, then completes ancestor chains. The
/// result is strictly increasing and ancestor-complete.
#[must_use]
pub fn recalc_required_bones(
    model: &SkeletonModel,
    lod_index: usize,
    physics_bones: &[String],
) -> Vec<usize> {
    let mut required = model.lod(lod_index).required_bones.clone();

    // Mirroring nodes sample the mirror-image bone's animation, so every
    // required bone pulls in its mirror source.
    if model.mirror_table().len() == model.len() {
        let mut mirrored: Vec<usize> = required
            .iter()
            .map(|&bone| model.mirror_table()[bone])
            .collect();
        mirrored.sort_unstable();
        mirrored.dedup();
        merge_sorted(&mut required, &mirrored);
    }

    // Physics bodies need valid transforms even when their bones fall out of
    // the mesh LOD (line checks, ragdoll kick-in).
    if !physics_bones.is_empty() {
        let bones = resolve_sorted(model, physics_bones, "physics asset");
        merge_sorted(&mut required, &bones);
    }

    if !model.per_poly_collision_bones().is_empty() {
        let bones = resolve_sorted(
            model,
            model.per_poly_collision_bones(),
            "per-poly collision",
        );
        merge_sorted(&mut required, &bones);
    }

    ensure_parents_present(&mut required, model);

    log::debug!(
        "required bones rebuilt for LOD {lod_index}: {} of {} bones",
        required.len(),
        model.len()
    );
    required
}
