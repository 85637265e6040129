pub mod learning;
pub mod orchestration;
pub mod types;

pub use learning::{PriorityReplayBuffer, RewardShaper, TdTargetComputer};
pub use orchestration::{CellServices, TrainingOrchestrator};
pub use types::{ActionFamily, AffordanceMaps, PixelIndex, Transition, ValueGrid};
