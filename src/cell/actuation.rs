use crate::error::CollaboratorError;
use async_trait::async_trait;

/// Arm and vacuum control. Every call is a synchronous remote request;
/// none of them may be assumed idempotent.
#[async_trait]
pub trait ActuationService: Send + Sync {
    /// Move the selected tool to `position` at `angle` and attempt the
    /// pick primitive.
    async fn execute(
        &mut self,
        tool_id: u8,
        position: [f32; 3],
        angle: f32,
    ) -> Result<(), CollaboratorError>;

    async fn go_home(&mut self) -> Result<(), CollaboratorError>;

    /// Carry a held object to the drop-off bin.
    async fn go_place(&mut self) -> Result<(), CollaboratorError>;

    /// Shut the vacuum after a failed suction attempt.
    async fn release_vacuum(&mut self) -> Result<(), CollaboratorError>;
}
