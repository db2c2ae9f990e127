//! Animation clips
//!
//! A clip is a set of per-bone keyframe tracks sampled by sequence nodes.
//! Loading clips from asset formats is out of scope; callers construct them
//! from whatever pipeline produced the keys.

use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;

use crate::errors::{MarrowError, Result};
use crate::math::BoneAtom;

/// Keyframes for one bone: shared times, parallel value arrays.
#[derive(Debug, Clone)]
pub struct BoneTrack {
    pub bone: usize,
    pub times: Vec<f32>,
    pub translations: Vec<Vec3>,
    pub rotations: Vec<Quat>,
}

impl BoneTrack {
    fn validate(&self) -> Result<()> {
        if self.times.is_empty() {
            return Err(MarrowError::InvalidTrack {
                bone: self.bone,
                reason: "track has no keys",
            });
        }
        if self.translations.len() != self.times.len() || self.rotations.len() != self.times.len()
        {
            return Err(MarrowError::InvalidTrack {
                bone: self.bone,
                reason: "value arrays do not match key times",
            });
        }
        if self.times.windows(2).any(|w| w[0] > w[1]) {
            return Err(MarrowError::InvalidTrack {
                bone: self.bone,
                reason: "key times are not sorted",
            });
        }
        Ok(())
    }

    /// Samples the track at `time`, clamping outside the key range.
    #[must_use]
    pub fn sample(&self, time: f32) -> BoneAtom {
        let len = self.times.len();
        if len == 1 {
            return BoneAtom::new(self.translations[0], self.rotations[0], 1.0);
        }

        // First key strictly after `time`.
        let next = self.times.partition_point(|&t| t <= time);
        if next == 0 {
            return BoneAtom::new(self.translations[0], self.rotations[0], 1.0);
        }
        if next >= len {
            return BoneAtom::new(self.translations[len - 1], self.rotations[len - 1], 1.0);
        }

        let index = next - 1;
        let t0 = self.times[index];
        let t1 = self.times[next];
        let span = t1 - t0;
        let t = if span > 1e-6 {
            ((time - t0) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        BoneAtom::new(
            self.translations[index].lerp(self.translations[next], t),
            self.rotations[index].slerp(self.rotations[next], t),
            1.0,
        )
    }
}

/// A named set of bone tracks. Duration is the last key time across tracks.
#[derive(Debug, Clone)]
pub struct AnimClip {
    pub name: String,
    pub duration: f32,
    tracks: Vec<BoneTrack>,
    by_bone: FxHashMap<usize, usize>,
}

impl AnimClip {
    pub fn new(name: &str, tracks: Vec<BoneTrack>) -> Result<Self> {
        let mut by_bone = FxHashMap::default();
        let mut duration = 0.0_f32;
        for (index, track) in tracks.iter().enumerate() {
            track.validate()?;
            duration = duration.max(*track.times.last().unwrap_or(&0.0));
            if by_bone.insert(track.bone, index).is_some() {
                return Err(MarrowError::InvalidTrack {
                    bone: track.bone,
                    reason: "duplicate track for bone",
                });
            }
        }
        Ok(Self {
            name: name.to_string(),
            duration,
            tracks,
            by_bone,
        })
    }

    /// Samples the track bound to `bone`, or `None` when the clip does not
    /// animate that bone (callers fall back to the reference pose).
    #[must_use]
    pub fn sample_bone(&self, bone: usize, time: f32) -> Option<BoneAtom> {
        self.by_bone
            .get(&bone)
            .map(|&index| self.tracks[index].sample(time))
    }

    #[must_use]
    pub fn has_root_track(&self) -> bool {
        self.by_bone.contains_key(&0)
    }
}
