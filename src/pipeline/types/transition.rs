use crate::cell::scene_store::SceneRefs;
use crate::pipeline::types::pixel::PixelIndex;
use serde::{Deserialize, Serialize};

/// Immutable record of one control step. Scene data is referenced by the
/// paths the scene store produced, never held inline, so the buffer stays
/// small and survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub scene: SceneRefs,
    pub pixel: PixelIndex,
    pub reward: f32,
    pub next_scene: SceneRefs,
    /// Workspace was empty after this step.
    pub terminal: bool,
}
