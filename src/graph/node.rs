//! Animation graph nodes
//!
//! A closed set of node kinds stored in an arena and referenced by key, so
//! the graph never holds owning pointers between nodes. Every node carries a
//! [`NodeState`] with the per-evaluation bookkeeping the evaluator relies
//! on: tick tag, relevance flags and the blend-weight accumulator.

use std::sync::Arc;

use crate::graph::clip::AnimClip;
use crate::graph::NodeKey;
use crate::math::WEIGHT_EPSILON;
use crate::root_motion::RootMotionDelta;

/// Shared per-node evaluation bookkeeping.
#[derive(Debug, Clone)]
pub struct NodeState {
    /// Accumulated blend weight for this evaluation, clamped to 1.0.
    /// Independent weight paths (blend-per-bone style constructs) can push
    /// the raw accumulator above 1.0.
    pub total_weight: f32,
    pub(crate) weight_accumulator: f32,
    /// True once `total_weight` exceeded the weight epsilon.
    pub relevant: bool,
    /// True only for the tick on which `relevant` flipped to true.
    pub just_became_relevant: bool,
    /// Tag of the last evaluation pass that visited this node.
    pub tick_tag: u64,
    /// When true, the node is not ticked while its weight is negligible.
    pub skip_tick_when_zero_weight: bool,
    /// When true, the node keeps ticking through a global pause.
    pub tick_during_pause: bool,
}

impl NodeState {
    #[must_use]
    pub fn new(skip_tick_when_zero_weight: bool) -> Self {
        Self {
            total_weight: 0.0,
            weight_accumulator: 0.0,
            relevant: false,
            just_became_relevant: false,
            tick_tag: 0,
            skip_tick_when_zero_weight,
            tick_during_pause: false,
        }
    }
}

/// Plays back one clip.
#[derive(Debug, Clone)]
pub struct SequenceNode {
    pub state: NodeState,
    pub(crate) clip: Arc<AnimClip>,
    /// Playback position in seconds, within `[0, clip.duration]`.
    pub position: f32,
    pub(crate) prev_position: f32,
    pub(crate) wrapped: bool,
    pub rate: f32,
    pub playing: bool,
    pub looping: bool,
    /// When set, the root bone's per-tick delta is extracted for the root
    /// motion pipeline instead of staying in the pose.
    pub extract_root_motion: bool,
    /// Restart playback from zero whenever the node becomes relevant again.
    pub start_on_become_relevant: bool,
}

impl SequenceNode {
    #[must_use]
    pub fn new(clip: Arc<AnimClip>) -> Self {
        Self {
            state: NodeState::new(true),
            clip,
            position: 0.0,
            prev_position: 0.0,
            wrapped: false,
            rate: 1.0,
            playing: true,
            looping: true,
            extract_root_motion: false,
            start_on_become_relevant: false,
        }
    }

    #[must_use]
    pub fn clip(&self) -> &Arc<AnimClip> {
        &self.clip
    }

    /// Advances playback, remembering the previous position so root motion
    /// can be extracted as a delta across this tick.
    pub(crate) fn advance(&mut self, dt: f32) {
        self.prev_position = self.position;
        self.wrapped = false;

        let duration = self.clip.duration;
        if !self.playing || duration <= 0.0 {
            return;
        }

        let mut position = self.position + self.rate * dt;
        if self.looping {
            if position >= duration {
                position %= duration;
                self.wrapped = true;
            } else if position < 0.0 {
                position = duration + (position % duration);
                self.wrapped = true;
            }
        } else {
            position = position.clamp(0.0, duration);
        }
        self.position = position;
    }

    /// Root-bone delta across the last tick, loop-aware. `None` when the
    /// clip has no root track.
    pub(crate) fn root_delta(&self) -> Option<RootMotionDelta> {
        let prev = self.clip.sample_bone(0, self.prev_position)?;
        let cur = self.clip.sample_bone(0, self.position)?;

        if !self.wrapped {
            return Some(RootMotionDelta {
                translation: cur.translation - prev.translation,
                rotation: (cur.rotation * prev.rotation.inverse()).normalize(),
            });
        }

        let first = self.clip.sample_bone(0, 0.0)?;
        let last = self.clip.sample_bone(0, self.clip.duration)?;
        if self.rate >= 0.0 {
            // prev → end of clip, then start → current.
            Some(RootMotionDelta {
                translation: (last.translation - prev.translation)
                    + (cur.translation - first.translation),
                rotation: ((cur.rotation * first.rotation.inverse())
                    * (last.rotation * prev.rotation.inverse()))
                .normalize(),
            })
        } else {
            // prev → start of clip, then end → current.
            Some(RootMotionDelta {
                translation: (first.translation - prev.translation)
                    + (cur.translation - last.translation),
                rotation: ((cur.rotation * last.rotation.inverse())
                    * (first.rotation * prev.rotation.inverse()))
                .normalize(),
            })
        }
    }
}

/// Crossfades between two children over a configurable blend time.
#[derive(Debug, Clone)]
pub struct BlendNode {
    pub state: NodeState,
    pub(crate) child1: Option<NodeKey>,
    pub(crate) child2: Option<NodeKey>,
    /// Current weight of child 2 in `[0, 1]`.
    pub(crate) blend: f32,
    target: f32,
    time_to_go: f32,
}

impl BlendNode {
    #[must_use]
    pub fn new(child1: Option<NodeKey>, child2: Option<NodeKey>) -> Self {
        Self {
            state: NodeState::new(false),
            child1,
            child2,
            blend: 0.0,
            target: 0.0,
            time_to_go: 0.0,
        }
    }

    /// Starts a crossfade toward `target` over `blend_time` seconds. A zero
    /// blend time snaps immediately.
    pub fn set_blend_target(&mut self, target: f32, blend_time: f32) {
        self.target = target.clamp(0.0, 1.0);
        if blend_time > 0.0 {
            self.time_to_go = blend_time;
        } else {
            self.blend = self.target;
            self.time_to_go = 0.0;
        }
    }

    #[must_use]
    pub fn blend_weight(&self) -> f32 {
        self.blend
    }

    pub(crate) fn advance(&mut self, dt: f32) {
        if self.time_to_go <= 0.0 {
            return;
        }
        if self.time_to_go <= dt {
            self.blend = self.target;
            self.time_to_go = 0.0;
        } else {
            self.blend += (self.target - self.blend) * dt / self.time_to_go;
            self.time_to_go -= dt;
        }
    }
}

/// The graph root: holds the single animation child. Sync groups and
/// prioritized branches hang off the graph itself.
#[derive(Debug, Clone)]
pub struct RootNode {
    pub state: NodeState,
    pub(crate) child: Option<NodeKey>,
}

impl RootNode {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            state: NodeState::new(false),
            child: None,
        }
    }
}

/// Closed set of graph node kinds.
#[derive(Debug, Clone)]
pub enum AnimNode {
    Root(RootNode),
    Sequence(SequenceNode),
    Blend(BlendNode),
}

impl AnimNode {
    #[must_use]
    pub fn state(&self) -> &NodeState {
        match self {
            AnimNode::Root(n) => &n.state,
            AnimNode::Sequence(n) => &n.state,
            AnimNode::Blend(n) => &n.state,
        }
    }

    #[must_use]
    pub fn state_mut(&mut self) -> &mut NodeState {
        match self {
            AnimNode::Root(n) => &mut n.state,
            AnimNode::Sequence(n) => &mut n.state,
            AnimNode::Blend(n) => &mut n.state,
        }
    }

    pub(crate) fn on_become_relevant(&mut self) {
        if let AnimNode::Sequence(seq) = self {
            if seq.start_on_become_relevant {
                seq.position = 0.0;
                seq.prev_position = 0.0;
            }
        }
    }

    pub(crate) fn on_cease_relevant(&mut self) {
        debug_assert!(self.state().total_weight <= WEIGHT_EPSILON);
    }
}
