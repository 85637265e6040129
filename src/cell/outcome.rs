use crate::cell::perception::PointGrid;
use crate::cell::scene_store::SceneRefs;
use crate::error::CollaboratorError;
use async_trait::async_trait;

/// Post-action ground truth from the cell's sensors.
#[async_trait]
pub trait OutcomeChecker: Send + Sync {
    /// Did the vacuum seal hold after a suction attempt?
    async fn check_suction_success(&mut self) -> Result<bool, CollaboratorError>;

    /// Did a grasp remove something? Compares the scene before and after
    /// around the executed position.
    async fn check_grasp_success(
        &mut self,
        before: &SceneRefs,
        after: &SceneRefs,
        position: [f32; 3],
    ) -> Result<bool, CollaboratorError>;

    /// Is the workspace cleared out?
    async fn is_workspace_empty(&mut self, points: &PointGrid) -> Result<bool, CollaboratorError>;
}
