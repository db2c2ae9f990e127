//! Skeleton Model
//!
//! The immutable, shared side of a skeletal mesh: the bone hierarchy, the
//! per-bone reference pose, per-LOD base bone lists, and the optional
//! auxiliary tables (mirroring, per-triangle collision) that feed the
//! required-bone resolver.
//!
//! # Invariant
//!
//! Bones are stored so that every bone's parent index is strictly less than
//! the bone's own index. The composer relies on this for its single-pass
//! parent-before-child traversal, so it is validated at construction and
//! never again.

use glam::Quat;
use rustc_hash::FxHashMap;

use crate::errors::{MarrowError, Result};
use crate::math::BoneAtom;

/// One bone of the hierarchy.
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    /// `None` only for the root (bone 0).
    pub parent: Option<usize>,
    /// Local transform relative to the parent in the reference pose.
    pub ref_pose: BoneAtom,
}

impl Bone {
    #[must_use]
    pub fn new(name: &str, parent: Option<usize>, ref_pose: BoneAtom) -> Self {
        Self {
            name: name.to_string(),
            parent,
            ref_pose,
        }
    }
}

/// Per-LOD base bone list: the bones the LOD's mesh data needs, strictly
/// increasing and ancestor-complete.
#[derive(Debug, Clone)]
pub struct SkeletonLod {
    pub required_bones: Vec<usize>,
}

/// Static bone hierarchy plus reference pose, shared between components.
#[derive(Debug, Clone)]
pub struct SkeletonModel {
    bones: Vec<Bone>,
    name_lookup: FxHashMap<String, usize>,
    lods: Vec<SkeletonLod>,
    /// Per-bone mirror source index; empty when the mesh has no mirror table.
    mirror_table: Vec<usize>,
    /// Names of bones carrying per-triangle collision data.
    per_poly_collision_bones: Vec<String>,
}

impl SkeletonModel {
    /// Builds a model from a bone array. LOD 0 defaults to the full
    /// skeleton; reduced LODs can be appended with [`Self::add_lod`].
    pub fn new(bones: Vec<Bone>) -> Result<Self> {
        if bones.is_empty() {
            return Err(MarrowError::EmptySkeleton);
        }
        if let Some(parent) = bones[0].parent {
            return Err(MarrowError::RootHasParent(parent));
        }
        for (index, bone) in bones.iter().enumerate().skip(1) {
            match bone.parent {
                None => return Err(MarrowError::MissingParent(index)),
                Some(parent) if parent >= index => {
                    return Err(MarrowError::ParentOrder {
                        bone: index,
                        parent,
                    });
                }
                Some(_) => {}
            }
        }

        let mut name_lookup = FxHashMap::default();
        for (index, bone) in bones.iter().enumerate() {
            if name_lookup.insert(bone.name.clone(), index).is_some() {
                log::warn!(
                    "skeleton has duplicate bone name '{}'; lookups resolve to bone {index}",
                    bone.name
                );
            }
        }

        let all_bones = (0..bones.len()).collect();
        Ok(Self {
            bones,
            name_lookup,
            lods: vec![SkeletonLod {
                required_bones: all_bones,
            }],
            mirror_table: Vec::new(),
            per_poly_collision_bones: Vec::new(),
        })
    }

    /// Appends a reduced LOD. The list must be strictly increasing; callers
    /// are expected to hand in ancestor-complete data (mesh build output).
    pub fn add_lod(&mut self, required_bones: Vec<usize>) -> Result<()> {
        for (pos, window) in required_bones.windows(2).enumerate() {
            if window[0] >= window[1] {
                return Err(MarrowError::LodListOrder(pos + 1));
            }
        }
        if let Some(&last) = required_bones.last() {
            if last >= self.bones.len() {
                return Err(MarrowError::BoneIndexOutOfRange {
                    index: last,
                    bone_count: self.bones.len(),
                });
            }
        }
        self.lods.push(SkeletonLod { required_bones });
        Ok(())
    }

    /// Installs a mirror table. Must have one source index per bone.
    pub fn set_mirror_table(&mut self, table: Vec<usize>) -> Result<()> {
        if table.len() != self.bones.len() {
            return Err(MarrowError::TableLength {
                context: "mirror table",
                expected: self.bones.len(),
                actual: table.len(),
            });
        }
        if let Some(&bad) = table.iter().find(|&&source| source >= self.bones.len()) {
            return Err(MarrowError::BoneIndexOutOfRange {
                index: bad,
                bone_count: self.bones.len(),
            });
        }
        self.mirror_table = table;
        Ok(())
    }

    pub fn set_per_poly_collision_bones(&mut self, names: Vec<String>) {
        self.per_poly_collision_bones = names;
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn bone(&self, index: usize) -> &Bone {
        &self.bones[index]
    }

    #[inline]
    #[must_use]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.bones[index].parent
    }

    /// Resolves a bone name to its index. Misses are the caller's problem;
    /// the contributing-set resolvers log and drop them.
    #[must_use]
    pub fn match_bone(&self, name: &str) -> Option<usize> {
        self.name_lookup.get(name).copied()
    }

    #[inline]
    #[must_use]
    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    /// LOD accessor, clamped so a stale index from the renderer can never
    /// reach out of bounds.
    #[must_use]
    pub fn lod(&self, index: usize) -> &SkeletonLod {
        &self.lods[index.min(self.lods.len() - 1)]
    }

    #[inline]
    #[must_use]
    pub fn mirror_table(&self) -> &[usize] {
        &self.mirror_table
    }

    #[inline]
    #[must_use]
    pub fn per_poly_collision_bones(&self) -> &[String] {
        &self.per_poly_collision_bones
    }

    /// Writes the reference pose into the listed slots of `atoms`. Slots for
    /// bones outside `bone_indices` are left untouched.
    pub fn fill_ref_pose(&self, bone_indices: &[usize], atoms: &mut [BoneAtom]) {
        debug_assert_eq!(atoms.len(), self.bones.len());
        for &bone in bone_indices {
            atoms[bone] = self.bones[bone].ref_pose;
        }
    }
}

/// Convenience for building test and tool skeletons: a straight chain of
/// `count` bones, each offset by `offset` from its parent.
#[must_use]
pub fn chain(count: usize, offset: glam::Vec3) -> Vec<Bone> {
    (0..count)
        .map(|i| {
            Bone::new(
                &format!("bone{i}"),
                if i == 0 { None } else { Some(i - 1) },
                BoneAtom::new(if i == 0 { glam::Vec3::ZERO } else { offset }, Quat::IDENTITY, 1.0),
            )
        })
        .collect()
}
