pub mod cell;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;

pub use config::{Configuration, RunMode};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{AppError, CollaboratorError, ReplayError};
pub use pipeline::orchestration::{CellServices, RunPaths, TrainingOrchestrator};
