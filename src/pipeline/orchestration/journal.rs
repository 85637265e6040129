use crate::error::AppError;
use crate::pipeline::orchestration::run_state::EpisodeRecord;
use crate::pipeline::types::{ActionFamily, PixelIndex};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use uuid::Uuid;

/// Structured journal entry for one control step.
#[derive(Debug, Clone, Serialize)]
pub struct StepJournalEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub iteration: u64,
    pub episode_id: Uuid,
    pub family: ActionFamily,
    pub pixel: PixelIndex,
    pub position: [f32; 3],
    pub angle: f32,
    pub valid: bool,
    pub success: bool,
    pub explored: bool,
    pub epsilon: f32,
    pub reward: f32,
    pub losses: Vec<f32>,
    pub phase_durations: PhaseDurations,
}

/// Timing information for the phases of one step.
#[derive(Debug, Clone, Serialize, Default)]
pub struct PhaseDurations {
    pub perceive_us: u64,
    pub decide_us: u64,
    pub act_us: u64,
    pub evaluate_us: u64,
    pub store_us: u64,
    pub learn_us: Option<u64>,
    pub total_us: u64,
}

#[derive(Debug, Clone, Serialize)]
struct EpisodeJournalEntry {
    episode_id: Uuid,
    steps: u64,
    discounted_return: f32,
    timestamp: DateTime<Utc>,
}

/// Journal sink for run reporting.
pub trait RunJournalWriter: Send {
    fn write_step(&mut self, entry: StepJournalEntry) -> Result<(), AppError>;
    fn write_episode(&mut self, record: &EpisodeRecord) -> Result<(), AppError>;
    fn flush(&mut self) -> Result<(), AppError>;
}

/// In-memory journal writer (for testing and development).
pub struct InMemoryJournalWriter {
    steps: Vec<StepJournalEntry>,
    episodes: Vec<EpisodeRecord>,
}

impl InMemoryJournalWriter {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            episodes: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[StepJournalEntry] {
        &self.steps
    }

    pub fn episodes(&self) -> &[EpisodeRecord] {
        &self.episodes
    }
}

impl Default for InMemoryJournalWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RunJournalWriter for InMemoryJournalWriter {
    fn write_step(&mut self, entry: StepJournalEntry) -> Result<(), AppError> {
        self.steps.push(entry);
        Ok(())
    }

    fn write_episode(&mut self, record: &EpisodeRecord) -> Result<(), AppError> {
        self.episodes.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

/// JSON-lines journal writer, one object per step or episode.
pub struct JsonLinesJournalWriter {
    writer: BufWriter<File>,
}

impl JsonLinesJournalWriter {
    pub fn create(path: &Path) -> Result<Self, AppError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(AppError::Journal)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write_line(&mut self, value: &impl Serialize) -> Result<(), AppError> {
        let line = serde_json::to_string(value)
            .map_err(|e| AppError::Journal(std::io::Error::other(e)))?;
        writeln!(self.writer, "{}", line).map_err(AppError::Journal)
    }
}

impl RunJournalWriter for JsonLinesJournalWriter {
    fn write_step(&mut self, entry: StepJournalEntry) -> Result<(), AppError> {
        self.write_line(&entry)
    }

    fn write_episode(&mut self, record: &EpisodeRecord) -> Result<(), AppError> {
        self.write_line(&EpisodeJournalEntry {
            episode_id: record.id,
            steps: record.steps,
            discounted_return: record.discounted_return,
            timestamp: Utc::now(),
        })
    }

    fn flush(&mut self) -> Result<(), AppError> {
        self.writer.flush().map_err(AppError::Journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(iteration: u64) -> StepJournalEntry {
        StepJournalEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            iteration,
            episode_id: Uuid::new_v4(),
            family: ActionFamily::SuctionA,
            pixel: PixelIndex::new(0, 1, 2),
            position: [0.1, 0.2, 0.0],
            angle: 0.0,
            valid: true,
            success: false,
            explored: false,
            epsilon: 0.5,
            reward: -1.0,
            losses: vec![],
            phase_durations: PhaseDurations::default(),
        }
    }

    #[test]
    fn in_memory_writer_collects_entries() {
        let mut writer = InMemoryJournalWriter::new();
        writer.write_step(entry(0)).unwrap();
        writer.write_step(entry(1)).unwrap();
        assert_eq!(writer.steps().len(), 2);
        assert_eq!(writer.steps()[1].iteration, 1);
    }

    #[test]
    fn json_lines_writer_appends_one_line_per_entry() {
        let path = std::env::temp_dir().join("graspbot_journal_test.jsonl");
        std::fs::remove_file(&path).ok();
        {
            let mut writer = JsonLinesJournalWriter::create(&path).unwrap();
            writer.write_step(entry(0)).unwrap();
            writer
                .write_episode(&EpisodeRecord {
                    id: Uuid::new_v4(),
                    steps: 1,
                    discounted_return: -1.0,
                })
                .unwrap();
            writer.flush().unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().next().unwrap().contains("\"iteration\":0"));
        std::fs::remove_file(&path).ok();
    }
}
