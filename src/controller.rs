//! Bone Controller Pipeline
//!
//! Procedural modifiers injected by the composer while it walks the required
//! bones. Each controller is bound (via its list) to one bone, reports the
//! set of bones it affects, and produces replacement component-space
//! transforms that the composer blends against the animated pose by the
//! controller's strength.
//!
//! Controllers are a closed set of operations behind a trait object, owned in
//! ordered lists per bone by the graph and only referenced by the composer.

use glam::Mat4;
use smallvec::SmallVec;

use crate::math::BoneAtom;
use crate::skeleton::SkeletonModel;

/// Bone indices a controller affects. Small chains (IK style) fit inline.
pub type AffectedBones = SmallVec<[usize; 8]>;

/// Replacement component-space transforms, parallel to [`AffectedBones`].
pub type AffectedTransforms = SmallVec<[Mat4; 8]>;

/// Replacement absolute scales, parallel to [`AffectedBones`].
pub type AffectedScales = SmallVec<[f32; 8]>;

/// Read-only view of the in-progress pose a controller computes against.
/// `space` holds finished component-space transforms for bones composed so
/// far this pass and last frame's values for the rest.
pub struct PoseView<'a> {
    pub model: &'a SkeletonModel,
    pub local: &'a [BoneAtom],
    pub space: &'a [Mat4],
}

/// One procedural bone modifier.
pub trait BoneController {
    /// Blend strength in `[0, 1]`. At or below the weight epsilon the
    /// composer skips the controller entirely.
    fn strength(&self) -> f32;

    /// LOD index at or above which this controller is skipped.
    fn ignore_at_or_above_lod(&self) -> usize {
        usize::MAX
    }

    /// Skip this controller when the owner has not rendered recently.
    fn ignore_when_not_rendered(&self) -> bool {
        false
    }

    /// Advances time-dependent state (strength fades). Called once per graph
    /// tick, not per compose.
    fn tick(&mut self, _dt: f32) {}

    /// Bones this controller drives, relative to `bone` (the bone its list
    /// is bound to). Must be strictly increasing and include `bone`.
    fn affected_bones(&self, bone: usize, model: &SkeletonModel) -> AffectedBones;

    /// New component-space transforms for the affected bones, in the same
    /// order as [`Self::affected_bones`]. Leaving `out` empty skips the
    /// transform blend entirely.
    fn bone_transforms(&self, bone: usize, pose: &PoseView<'_>, out: &mut AffectedTransforms);

    /// Absolute scale overrides for the affected bones, same order. The
    /// composer blends the parent-relative scale, so scaling composes under
    /// scaled parents. Default produces none.
    fn bone_scales(&self, _bone: usize, _pose: &PoseView<'_>, _out: &mut AffectedScales) {}

    /// Scale override for the controller's own bone, lerped toward by
    /// strength in the composer. Default leaves scale untouched.
    fn bone_scale(&self, _bone: usize) -> f32 {
        1.0
    }
}

/// Ordered controllers bound to one named bone.
pub struct ControllerList {
    pub bone_name: String,
    pub controllers: Vec<Box<dyn BoneController>>,
}

/// Strength with timed fades, shared by the concrete controllers.
#[derive(Debug, Clone, Copy)]
pub struct StrengthBlender {
    pub strength: f32,
    target: f32,
    time_to_go: f32,
}

impl StrengthBlender {
    #[must_use]
    pub fn new(strength: f32) -> Self {
        let strength = strength.clamp(0.0, 1.0);
        Self {
            strength,
            target: strength,
            time_to_go: 0.0,
        }
    }

    /// Fades toward `target` over `blend_time` seconds; zero time snaps.
    pub fn set_target(&mut self, target: f32, blend_time: f32) {
        self.target = target.clamp(0.0, 1.0);
        if blend_time > 0.0 {
            self.time_to_go = blend_time;
        } else {
            self.strength = self.target;
            self.time_to_go = 0.0;
        }
    }

    pub fn tick(&mut self, dt: f32) {
        if self.time_to_go <= 0.0 {
            return;
        }
        if self.time_to_go <= dt {
            self.strength = self.target;
            self.time_to_go = 0.0;
        } else {
            self.strength += (self.target - self.strength) * dt / self.time_to_go;
            self.time_to_go -= dt;
        }
    }
}

/// Replaces its bone's component-space transform with a fixed target,
/// blended by strength.
pub struct TransformOverrideController {
    pub blender: StrengthBlender,
    pub target: Mat4,
    pub ignore_at_or_above_lod: usize,
    pub ignore_when_not_rendered: bool,
}

impl TransformOverrideController {
    #[must_use]
    pub fn new(target: Mat4, strength: f32) -> Self {
        Self {
            blender: StrengthBlender::new(strength),
            target,
            ignore_at_or_above_lod: usize::MAX,
            ignore_when_not_rendered: false,
        }
    }
}

impl BoneController for TransformOverrideController {
    fn strength(&self) -> f32 {
        self.blender.strength
    }

    fn ignore_at_or_above_lod(&self) -> usize {
        self.ignore_at_or_above_lod
    }

    fn ignore_when_not_rendered(&self) -> bool {
        self.ignore_when_not_rendered
    }

    fn tick(&mut self, dt: f32) {
        self.blender.tick(dt);
    }

    fn affected_bones(&self, bone: usize, _model: &SkeletonModel) -> AffectedBones {
        let mut bones = AffectedBones::new();
        bones.push(bone);
        bones
    }

    fn bone_transforms(&self, _bone: usize, _pose: &PoseView<'_>, out: &mut AffectedTransforms) {
        out.push(self.target);
    }
}

/// Scales its bone without touching the transform. The composer treats the
/// returned transform (the bone's current one) as a no-op blend.
pub struct BoneScaleController {
    pub blender: StrengthBlender,
    pub scale: f32,
    pub ignore_at_or_above_lod: usize,
}

impl BoneScaleController {
    #[must_use]
    pub fn new(scale: f32, strength: f32) -> Self {
        Self {
            blender: StrengthBlender::new(strength),
            scale,
            ignore_at_or_above_lod: usize::MAX,
        }
    }
}

impl BoneController for BoneScaleController {
    fn strength(&self) -> f32 {
        self.blender.strength
    }

    fn ignore_at_or_above_lod(&self) -> usize {
        self.ignore_at_or_above_lod
    }

    fn tick(&mut self, dt: f32) {
        self.blender.tick(dt);
    }

    fn affected_bones(&self, bone: usize, _model: &SkeletonModel) -> AffectedBones {
        let mut bones = AffectedBones::new();
        bones.push(bone);
        bones
    }

    fn bone_transforms(&self, bone: usize, pose: &PoseView<'_>, out: &mut AffectedTransforms) {
        out.push(pose.space[bone]);
    }

    fn bone_scale(&self, _bone: usize) -> f32 {
        self.scale
    }
}
