pub mod model;
pub mod required;

pub use model::{Bone, SkeletonLod, SkeletonModel};
pub use required::{ensure_parents_present, merge_sorted, recalc_required_bones};
