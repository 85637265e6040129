use crate::error::CollaboratorError;
use crate::pipeline::types::ActionFamily;
use async_trait::async_trait;
use serde::Serialize;

/// One decision marker for the operator's 3-D view.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionMarker {
    pub position: [f32; 3],
    pub family: ActionFamily,
    pub angle: f32,
    pub valid: bool,
}

#[async_trait]
pub trait Visualizer: Send + Sync {
    async fn publish_marker(&mut self, marker: &DecisionMarker) -> Result<(), CollaboratorError>;
}

/// Visualizer for tests and headless runs.
#[derive(Default)]
pub struct NullVisualizer;

#[async_trait]
impl Visualizer for NullVisualizer {
    async fn publish_marker(&mut self, _marker: &DecisionMarker) -> Result<(), CollaboratorError> {
        Ok(())
    }
}
