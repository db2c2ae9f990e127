//! Root Motion Extractor/Applicator
//!
//! Root motion is movement authored into the root bone's animation that
//! should drive the owning object's world placement instead of staying in
//! the pose. The graph extracts a per-tick root delta; this module owns the
//! mode state machine that decides when and how that delta reaches the
//! owner.
//!
//! Mode switches requested mid-tick are staged through a pending slot: a
//! switch to [`RootMotionMode::Ignore`] on the same tick extraction produced
//! motion is delayed by exactly one evaluation, so the motion already
//! extracted is still processed. Application of translation additionally
//! requires the mode to have been stable for one tick (previous == current),
//! which sequences this writer deterministically against a physics step that
//! already ran for the current tick.

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::math::remove_scaling;

/// Squared translation magnitudes below this are not worth a move.
const TRIVIAL_TRANSLATION_SQ: f32 = 1e-8;

/// How extracted root translation reaches the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootMotionMode {
    /// Extracted motion is dropped; the accumulator is kept zeroed.
    #[default]
    Ignore,
    /// Accumulated translation moves the owner directly, consumed each tick.
    Translate,
    /// Like `Translate`, but the owner is detached from its base object for
    /// the move and reattached after, preserving the relative offset.
    Relative,
}

/// How extracted root rotation reaches the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootRotationMode {
    #[default]
    Ignore,
    RotateOwner,
}

/// One tick's extracted root-bone delta, mesh space until the applicator
/// converts it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootMotionDelta {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl RootMotionDelta {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };
}

impl Default for RootMotionDelta {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// The owning game object, seen through the only operations root motion
/// needs. Every method degrades to a no-op by default; an absent capability
/// (no base object, no notifications) behaves like `Ignore`.
pub trait MotionOwner {
    /// Mesh-to-world transform used to convert extracted deltas.
    fn to_world(&self) -> Mat4;

    /// Applies a world-space translation and optional world-space rotation
    /// delta to the owner's placement.
    fn apply_motion(&mut self, translation: Vec3, rotation: Option<Quat>);

    /// True when the owner is hard-attached to a base object.
    fn has_base(&self) -> bool {
        false
    }

    /// Temporarily releases the base attachment for a relative-mode move.
    fn detach_from_base(&mut self) {}

    /// Restores the base attachment, preserving the relative offset.
    fn reattach_to_base(&mut self) {}

    fn on_root_motion_mode_changed(&mut self, _mode: RootMotionMode) {}

    fn on_root_motion_extracted(&mut self, _world_delta: &RootMotionDelta) {}
}

/// Per-component root motion state: modes, the pending-mode switch machine
/// and the accumulated world-space delta.
#[derive(Debug)]
pub struct RootMotionState {
    mode: RootMotionMode,
    pub rotation_mode: RootRotationMode,
    pending_mode: RootMotionMode,
    old_pending_mode: RootMotionMode,
    /// Mode as of the previous evaluation; translation applies only once the
    /// current mode has survived a full tick.
    previous_mode: RootMotionMode,
    one_frame_delay: bool,
    /// Per-axis scale applied to extracted world-space translation.
    pub accel_scale: Vec3,
    /// Accumulated world-space delta. Translation sums across evaluations
    /// until consumed; rotation accumulates multiplicatively.
    pub delta: RootMotionDelta,
    /// World-space root velocity from the last extracting evaluation.
    pub velocity: Vec3,
    pub notify_mode_change: bool,
    pub notify_extraction: bool,
}

impl Default for RootMotionState {
    fn default() -> Self {
        Self::new()
    }
}

impl RootMotionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: RootMotionMode::Ignore,
            rotation_mode: RootRotationMode::Ignore,
            pending_mode: RootMotionMode::Ignore,
            old_pending_mode: RootMotionMode::Ignore,
            previous_mode: RootMotionMode::Ignore,
            one_frame_delay: false,
            accel_scale: Vec3::ONE,
            delta: RootMotionDelta::IDENTITY,
            velocity: Vec3::ZERO,
            notify_mode_change: false,
            notify_extraction: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> RootMotionMode {
        self.mode
    }

    /// Requests a mode switch. Takes effect on the next evaluation, possibly
    /// delayed one further tick when switching to `Ignore` while motion is
    /// being extracted.
    pub fn set_mode(&mut self, mode: RootMotionMode) {
        self.pending_mode = mode;
    }

    /// Runs the per-evaluation state machine and applies accumulated motion
    /// to the owner. Must only be called with `dt > 0`; a zero-delta pose
    /// refresh never touches the accumulator (the caller gates this).
    pub fn update(
        &mut self,
        dt: f32,
        extracted: Option<&RootMotionDelta>,
        mut owner: Option<&mut (dyn MotionOwner + '_)>,
    ) {
        debug_assert!(dt > 0.0);
        let has_motion = extracted.is_some();

        if self.pending_mode != self.old_pending_mode {
            if self.mode == self.pending_mode {
                self.old_pending_mode = self.pending_mode;
            } else if self.pending_mode != RootMotionMode::Ignore
                || !has_motion
                || self.one_frame_delay
            {
                // Switching to Ignore while motion was extracted this tick
                // waits one evaluation so that motion is fully processed.
                log::debug!(
                    "root motion mode {:?} -> {:?}",
                    self.mode,
                    self.pending_mode
                );
                self.mode = self.pending_mode;
                self.old_pending_mode = self.pending_mode;
                self.one_frame_delay = false;
            } else {
                self.one_frame_delay = true;
            }
        }

        let to_world = owner.as_deref().map_or(Mat4::IDENTITY, |o| o.to_world());

        // Translation accumulation.
        match extracted {
            Some(ext) if self.mode != RootMotionMode::Ignore => {
                let world_translation = to_world.transform_vector3(ext.translation) * self.accel_scale;
                self.delta.translation += world_translation;
                self.velocity = world_translation / dt;

                if self.notify_extraction {
                    if let Some(o) = owner.as_deref_mut() {
                        let world_delta = RootMotionDelta {
                            translation: world_translation,
                            rotation: ext.rotation,
                        };
                        o.on_root_motion_extracted(&world_delta);
                    }
                }
            }
            _ => {
                self.delta.translation = Vec3::ZERO;
                self.velocity = Vec3::ZERO;
            }
        }

        // Rotation accumulation, conjugated into world space.
        match extracted {
            Some(ext) if self.rotation_mode != RootRotationMode::Ignore => {
                let rot_only = remove_scaling(&to_world);
                let mesh_to_world = Quat::from_mat3(&Mat3::from_mat4(rot_only)).normalize();
                let world_rotation =
                    (mesh_to_world * ext.rotation * mesh_to_world.inverse()).normalize();
                self.delta.rotation = (world_rotation * self.delta.rotation).normalize();
            }
            _ => self.delta.rotation = Quat::IDENTITY,
        }

        if has_motion {
            self.apply_instant(owner.as_deref_mut());
            self.apply_relative(owner.as_deref_mut());
        }

        if self.mode != self.previous_mode {
            if self.notify_mode_change {
                if let Some(o) = owner.as_deref_mut() {
                    o.on_root_motion_mode_changed(self.mode);
                }
            }
            self.previous_mode = self.mode;
        }
    }

    /// Direct translation/rotation application. Translation requires a
    /// stable `Translate` mode; rotation has no stability gate. A mode that
    /// just switched to `Ignore` still enters here so pending rotation is
    /// flushed.
    fn apply_instant(&mut self, owner: Option<&mut (dyn MotionOwner + '_)>) {
        let translate_active = self.mode == RootMotionMode::Translate;
        let just_left_translate = self.mode == RootMotionMode::Ignore
            && self.previous_mode == RootMotionMode::Translate;
        let can_rotate = self.rotation_mode == RootRotationMode::RotateOwner;
        if !(translate_active || just_left_translate || can_rotate) {
            return;
        }

        let can_translate = translate_active && self.previous_mode == RootMotionMode::Translate;
        let translation = if can_translate {
            self.delta.translation
        } else {
            Vec3::ZERO
        };
        let rotation = (can_rotate && self.delta.rotation != Quat::IDENTITY)
            .then_some(self.delta.rotation);

        let Some(owner) = owner else {
            return;
        };
        if rotation.is_none() && translation.length_squared() <= TRIVIAL_TRANSLATION_SQ {
            return;
        }

        owner.apply_motion(translation, rotation);

        // Reset only what was consumed; a just-switched mode keeps its
        // pending translation for next tick.
        if can_translate {
            self.delta.translation = Vec3::ZERO;
        }
        if rotation.is_some() {
            self.delta.rotation = Quat::IDENTITY;
        }
    }

    /// Relative-mode application: detach from the base, move, reattach.
    fn apply_relative(&mut self, owner: Option<&mut (dyn MotionOwner + '_)>) {
        let relative_active = self.mode == RootMotionMode::Relative;
        let just_left_relative = self.mode == RootMotionMode::Ignore
            && self.previous_mode == RootMotionMode::Relative;
        if !(relative_active || just_left_relative) {
            return;
        }

        let can_translate = relative_active && self.previous_mode == RootMotionMode::Relative;
        if !can_translate || self.delta.translation.length_squared() <= TRIVIAL_TRANSLATION_SQ {
            return;
        }
        let Some(owner) = owner else {
            return;
        };
        if !owner.has_base() {
            return;
        }

        owner.detach_from_base();
        owner.apply_motion(self.delta.translation, None);
        owner.reattach_to_base();
        self.delta.translation = Vec3::ZERO;
    }
}
