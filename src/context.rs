//! Per-evaluation context
//!
//! Everything the pipeline used to reach for ambient globals (world time,
//! render recency, debug toggles) is passed in explicitly per evaluation.

/// Inputs for one evaluation of the pipeline.
///
/// A zero `delta_time` is valid: it refreshes the pose without advancing
/// playback or applying root motion.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    /// Seconds since the last evaluation. Must be non-negative.
    pub delta_time: f32,
    /// LOD index to evaluate at. Clamped to the model's LOD count.
    pub lod: usize,
    /// Whether the owner was rendered recently. Gates controllers that opt
    /// out when off-screen.
    pub rendered_recently: bool,
    /// Global animation pause. Nodes may opt out via
    /// [`NodeState::tick_during_pause`](crate::graph::NodeState).
    pub pause_anims: bool,
    /// Force-disables all bone controllers for this evaluation (debug
    /// toggle or distance gate decided by the caller).
    pub disable_controllers: bool,
    /// Whether the owner's physics bodies are asleep this tick. Feeds the
    /// skip-update optimization on the component.
    pub physics_asleep: bool,
}

impl EvalContext {
    #[must_use]
    pub fn new(delta_time: f32) -> Self {
        Self {
            delta_time,
            ..Self::default()
        }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            delta_time: 0.0,
            lod: 0,
            rendered_recently: true,
            pause_anims: false,
            disable_controllers: false,
            physics_asleep: false,
        }
    }
}
