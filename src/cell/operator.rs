use crate::error::CollaboratorError;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetDecision {
    /// Workspace refilled, start the next episode.
    Start,
    /// Wrap up the run.
    Exit,
}

/// Between episodes the loop blocks here until the operator (or an
/// automatic trigger) says the workspace is ready again.
#[async_trait]
pub trait EpisodeGate: Send + Sync {
    async fn await_reset(&mut self) -> Result<ResetDecision, CollaboratorError>;
}

/// Console gate: `s` starts the next episode, `e` exits.
pub struct ConsoleGate;

#[async_trait]
impl EpisodeGate for ConsoleGate {
    async fn await_reset(&mut self) -> Result<ResetDecision, CollaboratorError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            println!("Reset the workspace, then press 's' to start or 'e' to exit:");
            let line = lines
                .next_line()
                .await
                .map_err(|e| CollaboratorError::Operator(e.to_string()))?;
            match line.as_deref().map(str::trim) {
                Some("s") | Some("S") => return Ok(ResetDecision::Start),
                Some("e") | Some("E") => return Ok(ResetDecision::Exit),
                Some(other) => warn!("Unrecognized command {:?}", other),
                // stdin closed, treat as exit
                None => return Ok(ResetDecision::Exit),
            }
        }
    }
}

/// Scripted gate for tests and simulated runs; exits once the script is
/// exhausted.
pub struct ScriptedGate {
    decisions: VecDeque<ResetDecision>,
}

impl ScriptedGate {
    pub fn new(decisions: impl IntoIterator<Item = ResetDecision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
        }
    }

    /// Gate that runs `episodes` episodes then exits.
    pub fn episodes(episodes: usize) -> Self {
        Self::new(std::iter::repeat(ResetDecision::Start).take(episodes))
    }
}

#[async_trait]
impl EpisodeGate for ScriptedGate {
    async fn await_reset(&mut self) -> Result<ResetDecision, CollaboratorError> {
        Ok(self.decisions.pop_front().unwrap_or(ResetDecision::Exit))
    }
}
