use crate::pipeline::types::PixelIndex;
use indexmap::IndexMap;
use uuid::Uuid;

/// Where the control loop currently is. One full traversal of
/// Perceiving..Storing is one global step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    AwaitingReset,
    Perceiving,
    Deciding,
    Acting,
    Evaluating,
    Storing,
    Stopped,
}

/// Post-hoc record of one executed (or rejected) step. Control decisions
/// never read these.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub iteration: u64,
    pub episode_id: Uuid,
    pub pixel: PixelIndex,
    pub position: [f32; 3],
    pub valid: bool,
    pub success: bool,
    pub explored: bool,
    pub reward: f32,
}

#[derive(Debug, Clone)]
pub struct EpisodeRecord {
    pub id: Uuid,
    pub steps: u64,
    pub discounted_return: f32,
}

/// All mutable run/episode state, owned by the orchestrator so the core
/// stays testable without any service layer.
pub struct RunState {
    pub phase: RunPhase,
    /// Global step counter across every episode.
    pub iteration: u64,
    /// Step counter within the current episode.
    pub episode_step: u64,
    /// Discounted return accumulated within the current episode.
    pub episode_return: f32,
    pub current_episode: Option<Uuid>,
    episodes: IndexMap<Uuid, EpisodeRecord>,
    steps: Vec<StepRecord>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::AwaitingReset,
            iteration: 0,
            episode_step: 0,
            episode_return: 0.0,
            current_episode: None,
            episodes: IndexMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn begin_episode(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.current_episode = Some(id);
        self.episode_step = 0;
        self.episode_return = 0.0;
        self.episodes.insert(
            id,
            EpisodeRecord {
                id,
                steps: 0,
                discounted_return: 0.0,
            },
        );
        id
    }

    /// Flush the running episode's bookkeeping into its record; safe to
    /// call when no episode is open.
    pub fn finish_episode(&mut self) -> Option<&EpisodeRecord> {
        let id = self.current_episode.take()?;
        let record = self.episodes.get_mut(&id)?;
        record.steps = self.episode_step;
        record.discounted_return = self.episode_return;
        Some(record)
    }

    pub fn record_step(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn episodes(&self) -> impl Iterator<Item = &EpisodeRecord> {
        self.episodes.values()
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.len()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
