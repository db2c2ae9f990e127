//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! Errors are reserved for construction-time validation (malformed bone
//! hierarchies, mismatched table lengths, bad track data). Per-frame
//! evaluation never returns errors: missing assets degrade to the reference
//! pose, and lookup misses are logged and skipped.

use thiserror::Error;

/// The main error type for marrow.
#[derive(Error, Debug)]
pub enum MarrowError {
    /// A skeleton was constructed with no bones.
    #[error("skeleton has no bones")]
    EmptySkeleton,

    /// Bone 0 must be the root and carry no parent.
    #[error("bone 0 must be the root but has parent {0}")]
    RootHasParent(usize),

    /// Every non-root bone needs a parent.
    #[error("non-root bone {0} has no parent")]
    MissingParent(usize),

    /// Parents must be stored strictly before their children.
    #[error("bone {bone} has parent {parent}, which does not precede it")]
    ParentOrder {
        /// The offending bone index
        bone: usize,
        /// Its declared parent index
        parent: usize,
    },

    /// A per-bone table does not match the skeleton's bone count.
    #[error("{context}: expected {expected} entries, got {actual}")]
    TableLength {
        /// Description of the table being validated
        context: &'static str,
        /// Expected entry count (the bone count)
        expected: usize,
        /// Actual entry count
        actual: usize,
    },

    /// A bone index points outside the skeleton.
    #[error("bone index {index} out of range ({bone_count} bones)")]
    BoneIndexOutOfRange {
        /// The invalid index
        index: usize,
        /// Number of bones in the skeleton
        bone_count: usize,
    },

    /// A LOD bone list must be strictly increasing.
    #[error("LOD bone list is not strictly increasing at position {0}")]
    LodListOrder(usize),

    /// A keyframe track failed validation.
    #[error("animation track for bone {bone}: {reason}")]
    InvalidTrack {
        /// Target bone of the track
        bone: usize,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Alias for `Result<T, MarrowError>`.
pub type Result<T> = std::result::Result<T, MarrowError>;
