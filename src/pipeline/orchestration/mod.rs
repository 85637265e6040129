pub mod action_selector;
pub mod epsilon;
pub mod journal;
pub mod orchestrator;
pub mod run_state;

pub use action_selector::{ActionSelector, GraspAngleTable, Selection};
pub use epsilon::EpsilonSchedule;
pub use journal::{
    InMemoryJournalWriter, JsonLinesJournalWriter, PhaseDurations, RunJournalWriter,
    StepJournalEntry,
};
pub use orchestrator::{CellServices, RunPaths, RunSummary, TrainingOrchestrator};
pub use run_state::{EpisodeRecord, RunPhase, RunState, StepRecord};
