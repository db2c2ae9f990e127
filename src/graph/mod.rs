//! Animation Graph Evaluator
//!
//! Owns an arena of animation nodes and evaluates them in two phases per
//! tick: a weight/relevance pass over a precomputed root-first tick order,
//! then a pull-style sampling pass that fills the local pose buffer for the
//! required bones. A trailing pass keeps sequence sync groups locked
//! together.

pub mod clip;
pub mod node;

use slotmap::{new_key_type, SlotMap};

use crate::context::EvalContext;
use crate::controller::{BoneController, ControllerList};
use crate::math::{BoneAtom, WEIGHT_EPSILON};
use crate::root_motion::RootMotionDelta;
use crate::skeleton::SkeletonModel;

pub use clip::{AnimClip, BoneTrack};
pub use node::{AnimNode, BlendNode, NodeState, RootNode, SequenceNode};

new_key_type! {
    /// Handle to a node in the graph's arena.
    pub struct NodeKey;
}

/// Keeps a set of sequence nodes' playback positions locked together. The
/// highest-weighted relevant member acts as master each tick.
#[derive(Debug, Clone)]
pub struct SyncGroup {
    pub name: String,
    pub members: Vec<NodeKey>,
}

/// The animation graph asset instance bound to one component.
pub struct AnimGraph {
    nodes: SlotMap<NodeKey, AnimNode>,
    root: NodeKey,
    tick_order: Vec<NodeKey>,
    tick_order_dirty: bool,
    tick_tag: u64,
    sync_groups: Vec<SyncGroup>,
    prioritized_branches: Vec<String>,
    /// Bone controllers owned by the graph, referenced by the composer.
    pub(crate) controller_lists: Vec<ControllerList>,
}

impl AnimGraph {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(AnimNode::Root(RootNode::new()));
        Self {
            nodes,
            root,
            tick_order: Vec::new(),
            tick_order_dirty: true,
            tick_tag: 0,
            sync_groups: Vec::new(),
            prioritized_branches: Vec::new(),
            controller_lists: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn root_key(&self) -> NodeKey {
        self.root
    }

    pub fn add_sequence(&mut self, node: SequenceNode) -> NodeKey {
        self.tick_order_dirty = true;
        self.nodes.insert(AnimNode::Sequence(node))
    }

    pub fn add_blend(&mut self, node: BlendNode) -> NodeKey {
        self.tick_order_dirty = true;
        self.nodes.insert(AnimNode::Blend(node))
    }

    /// Binds the root's single animation child.
    pub fn set_root_child(&mut self, child: Option<NodeKey>) {
        if let Some(AnimNode::Root(root)) = self.nodes.get_mut(self.root) {
            root.child = child;
        }
        self.tick_order_dirty = true;
    }

    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<&AnimNode> {
        self.nodes.get(key)
    }

    #[must_use]
    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut AnimNode> {
        self.nodes.get_mut(key)
    }

    #[must_use]
    pub fn sequence(&self, key: NodeKey) -> Option<&SequenceNode> {
        match self.nodes.get(key) {
            Some(AnimNode::Sequence(seq)) => Some(seq),
            _ => None,
        }
    }

    #[must_use]
    pub fn sequence_mut(&mut self, key: NodeKey) -> Option<&mut SequenceNode> {
        match self.nodes.get_mut(key) {
            Some(AnimNode::Sequence(seq)) => Some(seq),
            _ => None,
        }
    }

    #[must_use]
    pub fn blend_mut(&mut self, key: NodeKey) -> Option<&mut BlendNode> {
        match self.nodes.get_mut(key) {
            Some(AnimNode::Blend(blend)) => Some(blend),
            _ => None,
        }
    }

    pub fn add_sync_group(&mut self, name: &str, members: Vec<NodeKey>) {
        self.sync_groups.push(SyncGroup {
            name: name.to_string(),
            members,
        });
    }

    /// Names a bone whose branch must be composed in an earlier pass, for
    /// controllers that read bones updated by another branch.
    pub fn add_prioritized_branch(&mut self, bone_name: &str) {
        self.prioritized_branches.push(bone_name.to_string());
    }

    #[must_use]
    pub fn prioritized_branches(&self) -> &[String] {
        &self.prioritized_branches
    }

    pub fn add_controller_list(
        &mut self,
        bone_name: &str,
        controllers: Vec<Box<dyn BoneController>>,
    ) {
        self.controller_lists.push(ControllerList {
            bone_name: bone_name.to_string(),
            controllers,
        });
    }

    #[must_use]
    pub fn controller_lists(&self) -> &[ControllerList] {
        &self.controller_lists
    }

    #[must_use]
    pub fn controller_lists_mut(&mut self) -> &mut [ControllerList] {
        &mut self.controller_lists
    }

    /// Recomputes the root-first topological tick order. Parents must tick
    /// before children so weight normalization propagates downward.
    fn rebuild_tick_order(&mut self) {
        self.tick_order.clear();
        self.tick_order.push(self.root);
        let mut cursor = 0;
        while cursor < self.tick_order.len() {
            let key = self.tick_order[cursor];
            cursor += 1;
            match &self.nodes[key] {
                AnimNode::Root(root) => {
                    if let Some(child) = root.child {
                        self.tick_order.push(child);
                    }
                }
                AnimNode::Blend(blend) => {
                    if let Some(child) = blend.child1 {
                        self.tick_order.push(child);
                    }
                    if let Some(child) = blend.child2 {
                        self.tick_order.push(child);
                    }
                }
                AnimNode::Sequence(_) => {}
            }
        }
        self.tick_order_dirty = false;
    }

    /// Advances the graph one evaluation: weight accounting, relevance
    /// transitions, per-node ticks, sync groups and controller ticks.
    pub fn tick(&mut self, ctx: &EvalContext) {
        if self.tick_order_dirty {
            self.rebuild_tick_order();
        }

        self.tick_tag += 1;
        let tag = self.tick_tag;

        // The root is always fully blended in.
        self.nodes[self.root].state_mut().weight_accumulator = 1.0;

        for i in 0..self.tick_order.len() {
            let key = self.tick_order[i];
            let (weight, should_tick) = {
                let node = &mut self.nodes[key];
                let state = node.state_mut();

                // Independent weight paths can push the accumulator past 1.
                state.total_weight = state.weight_accumulator.min(1.0);
                state.weight_accumulator = 0.0;
                state.just_became_relevant = false;

                let weight = state.total_weight;
                let became_relevant = !state.relevant && weight > WEIGHT_EPSILON;
                let ceased_relevant = state.relevant && weight <= WEIGHT_EPSILON;
                if became_relevant {
                    state.relevant = true;
                    state.just_became_relevant = true;
                } else if ceased_relevant {
                    // Not ticked below, but the tag must still advance for
                    // anything the cease hook keys off it.
                    state.tick_tag = tag;
                    state.relevant = false;
                }

                let should_tick = (state.relevant || !state.skip_tick_when_zero_weight)
                    && (!ctx.pause_anims || state.tick_during_pause);
                if should_tick {
                    state.tick_tag = tag;
                }

                if became_relevant {
                    node.on_become_relevant();
                } else if ceased_relevant {
                    node.on_cease_relevant();
                }
                (weight, should_tick)
            };

            if should_tick {
                self.tick_node(key, ctx.delta_time, weight);
            }
        }

        if !ctx.pause_anims {
            self.update_sync_groups();
            for list in &mut self.controller_lists {
                for controller in &mut list.controllers {
                    controller.tick(ctx.delta_time);
                }
            }
        }
    }

    /// Node-specific tick: advance playback/blend state, then push this
    /// node's weight down to its children.
    fn tick_node(&mut self, key: NodeKey, dt: f32, weight: f32) {
        let mut fanout: [Option<(NodeKey, f32)>; 2] = [None, None];
        match &mut self.nodes[key] {
            AnimNode::Root(root) => {
                fanout[0] = root.child.map(|child| (child, weight));
            }
            AnimNode::Blend(blend) => {
                blend.advance(dt);
                let mix = blend.blend;
                fanout[0] = blend.child1.map(|child| (child, weight * (1.0 - mix)));
                fanout[1] = blend.child2.map(|child| (child, weight * mix));
            }
            AnimNode::Sequence(seq) => seq.advance(dt),
        }
        for (child, child_weight) in fanout.into_iter().flatten() {
            self.nodes[child].state_mut().weight_accumulator += child_weight;
        }
    }

    /// Locks each sync group's members to the master's normalized position.
    /// The master is the highest-weighted relevant member.
    fn update_sync_groups(&mut self) {
        for group_index in 0..self.sync_groups.len() {
            let mut master: Option<(NodeKey, f32)> = None;
            for &key in &self.sync_groups[group_index].members {
                if let Some(AnimNode::Sequence(seq)) = self.nodes.get(key) {
                    if seq.state.relevant
                        && master.is_none_or(|(_, best)| seq.state.total_weight > best)
                    {
                        master = Some((key, seq.state.total_weight));
                    }
                }
            }
            let Some((master_key, master_weight)) = master else {
                continue;
            };
            if master_weight <= WEIGHT_EPSILON {
                continue;
            }

            let normalized = match &self.nodes[master_key] {
                AnimNode::Sequence(seq) if seq.clip.duration > 0.0 => {
                    seq.position / seq.clip.duration
                }
                _ => continue,
            };

            let members = self.sync_groups[group_index].members.clone();
            for key in members {
                if key == master_key {
                    continue;
                }
                if let Some(AnimNode::Sequence(seq)) = self.nodes.get_mut(key) {
                    let position = normalized * seq.clip.duration;
                    // Followers are snapped, not played; suppress the fake
                    // root delta a snap would otherwise produce.
                    seq.position = position;
                    seq.prev_position = position;
                    seq.wrapped = false;
                }
            }
        }
    }

    /// Fills `atoms` for the required bones by pulling the blended pose from
    /// the root. Returns the extracted root-motion delta when any relevant
    /// sequence extracts one.
    pub fn sample_pose(
        &self,
        model: &SkeletonModel,
        required: &[usize],
        atoms: &mut [BoneAtom],
    ) -> Option<RootMotionDelta> {
        Self::sample_node(&self.nodes, self.root, model, required, atoms)
    }

    fn sample_node(
        nodes: &SlotMap<NodeKey, AnimNode>,
        key: NodeKey,
        model: &SkeletonModel,
        required: &[usize],
        atoms: &mut [BoneAtom],
    ) -> Option<RootMotionDelta> {
        match &nodes[key] {
            AnimNode::Root(root) => match root.child {
                Some(child) => Self::sample_node(nodes, child, model, required, atoms),
                None => {
                    model.fill_ref_pose(required, atoms);
                    None
                }
            },
            AnimNode::Sequence(seq) => {
                for &bone in required {
                    atoms[bone] = seq
                        .clip
                        .sample_bone(bone, seq.position)
                        .unwrap_or(model.bone(bone).ref_pose);
                }
                if seq.extract_root_motion {
                    seq.root_delta()
                } else {
                    None
                }
            }
            AnimNode::Blend(blend) => {
                Self::sample_blend(nodes, blend, model, required, atoms)
            }
        }
    }

    fn sample_blend(
        nodes: &SlotMap<NodeKey, AnimNode>,
        blend: &BlendNode,
        model: &SkeletonModel,
        required: &[usize],
        atoms: &mut [BoneAtom],
    ) -> Option<RootMotionDelta> {
        let mix = blend.blend;

        // Fully at one end: sample only that child.
        if mix <= WEIGHT_EPSILON || blend.child2.is_none() {
            return match blend.child1 {
                Some(child) => Self::sample_node(nodes, child, model, required, atoms),
                None => {
                    model.fill_ref_pose(required, atoms);
                    None
                }
            };
        }
        if mix >= 1.0 - WEIGHT_EPSILON || blend.child1.is_none() {
            return match blend.child2 {
                Some(child) => Self::sample_node(nodes, child, model, required, atoms),
                None => {
                    model.fill_ref_pose(required, atoms);
                    None
                }
            };
        }

        let (Some(child1), Some(child2)) = (blend.child1, blend.child2) else {
            model.fill_ref_pose(required, atoms);
            return None;
        };

        let delta1 = Self::sample_node(nodes, child1, model, required, atoms);
        let mut scratch = vec![BoneAtom::IDENTITY; atoms.len()];
        let delta2 = Self::sample_node(nodes, child2, model, required, &mut scratch);

        for &bone in required {
            atoms[bone] = BoneAtom::blend(&atoms[bone], &scratch[bone], mix);
            debug_assert!(atoms[bone].is_normalized());
        }

        match (delta1, delta2) {
            (Some(a), Some(b)) => Some(RootMotionDelta {
                translation: a.translation.lerp(b.translation, mix),
                rotation: a.rotation.slerp(b.rotation, mix).normalize(),
            }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

impl Default for AnimGraph {
    fn default() -> Self {
        Self::new()
    }
}
