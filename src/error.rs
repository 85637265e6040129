use std::path::PathBuf;
use thiserror::Error;

// Main application error type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),
    #[error("Journal error: {0}")]
    Journal(#[source] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Run task failed: {0}")]
    Runtime(String),
}

/// Failure of an external service the cell depends on. Every variant is
/// fatal to the step in flight: the orchestrator never substitutes a
/// default outcome for a failed call.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Perception service failed: {0}")]
    Perception(String),
    #[error("Actuation service failed: {0}")]
    Actuation(String),
    #[error("Outcome checker failed: {0}")]
    Outcome(String),
    #[error("Predictor failed: {0}")]
    Predictor(String),
    #[error("Visualizer failed: {0}")]
    Visualizer(String),
    #[error("Scene store failed at {path}: {source}")]
    SceneStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Scene data malformed at {path}: {reason}")]
    SceneDecode { path: PathBuf, reason: String },
    #[error("Operator gate failed: {0}")]
    Operator(String),
}

// Replay buffer error type
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Requested {requested} transitions but buffer holds {occupancy}")]
    Underflow { requested: usize, occupancy: usize },
    #[error("Failed to persist replay buffer: {0}")]
    Persist(#[source] std::io::Error),
    #[error("Failed to restore replay buffer: {0}")]
    Restore(#[source] std::io::Error),
    #[error("Malformed replay buffer file: {0}")]
    Decode(#[from] serde_json::Error),
}
