//! Bone Atoms and matrix helpers
//!
//! A [`BoneAtom`] is a bone's local transform relative to its parent:
//! translation, unit rotation and a uniform scale. Animation sources produce
//! atoms, the composer turns them into component-space matrices. Non-uniform
//! scale only ever enters the pipeline through controller matrices.

use glam::{Mat3, Mat4, Quat, Vec3};

/// Blend weights at or below this threshold are treated as zero, weights at
/// or above `1.0 - WEIGHT_EPSILON` as full weight.
pub const WEIGHT_EPSILON: f32 = 0.00001;

/// Determinants with an absolute value below this are considered degenerate
/// and the matrix is not inverted.
const DEGENERATE_DETERMINANT: f32 = 1e-8;

/// A bone's local transform relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneAtom {
    pub translation: Vec3,
    /// Must stay normalized after every blend; a drifting rotation is a
    /// defect, not a recoverable state.
    pub rotation: Quat,
    pub scale: f32,
}

impl BoneAtom {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: 1.0,
    };

    #[must_use]
    pub fn new(translation: Vec3, rotation: Quat, scale: f32) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Builds an atom from a matrix, discarding any scale (matches what the
    /// composer needs when converting controller output back to local space:
    /// scale is tracked separately so it can inherit from parents).
    #[must_use]
    pub fn from_matrix(m: &Mat4) -> Self {
        let rot = remove_scaling(m);
        Self {
            translation: m.w_axis.truncate(),
            rotation: Quat::from_mat3(&Mat3::from_mat4(rot)).normalize(),
            scale: 1.0,
        }
    }

    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.rotation,
            self.translation,
        )
    }

    /// Blends between two atoms. Alpha at or below [`WEIGHT_EPSILON`]
    /// returns `a` untouched, alpha at or above `1 - WEIGHT_EPSILON` returns
    /// `b` untouched, so trivial blends cannot introduce precision drift.
    #[must_use]
    pub fn blend(a: &Self, b: &Self, alpha: f32) -> Self {
        if alpha <= WEIGHT_EPSILON {
            return *a;
        }
        if alpha >= 1.0 - WEIGHT_EPSILON {
            return *b;
        }

        // Shortest-path nlerp, renormalized. Cheaper than slerp and exact at
        // the endpoints, which is all per-bone blending needs.
        let dot = a.rotation.dot(b.rotation);
        let br = if dot < 0.0 { -b.rotation } else { b.rotation };
        let rotation = (a.rotation * (1.0 - alpha) + br * alpha).normalize();

        Self {
            translation: a.translation.lerp(b.translation, alpha),
            rotation,
            scale: a.scale + (b.scale - a.scale) * alpha,
        }
    }

    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.rotation.is_normalized()
    }
}

impl Default for BoneAtom {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Inverts a matrix, falling back to identity when the determinant is
/// (near-)zero so a degenerate controller transform cannot propagate NaNs.
#[must_use]
pub fn safe_inverse(m: &Mat4) -> Mat4 {
    if m.determinant().abs() < DEGENERATE_DETERMINANT {
        Mat4::IDENTITY
    } else {
        m.inverse()
    }
}

/// Returns `m` with the scale stripped from its rotation axes. Axes with
/// near-zero length are left alone rather than divided by zero.
#[must_use]
pub fn remove_scaling(m: &Mat4) -> Mat4 {
    let mut out = *m;
    for axis in [&mut out.x_axis, &mut out.y_axis, &mut out.z_axis] {
        let v = axis.truncate();
        let len_sq = v.length_squared();
        if len_sq > DEGENERATE_DETERMINANT {
            *axis = (v / len_sq.sqrt()).extend(axis.w);
        }
    }
    out
}

/// True if any element of the matrix is NaN or infinite.
#[must_use]
pub fn matrix_contains_nan(m: &Mat4) -> bool {
    m.to_cols_array().iter().any(|v| !v.is_finite())
}
