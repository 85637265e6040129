use crate::error::AppError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Explore with the ε-greedy policy and checkpoint periodically.
    Train,
    /// Always act greedily; learning still runs but checkpoints are
    /// only written at shutdown.
    Evaluate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub mode: RunMode,
    pub buffer_capacity: usize,
    pub mini_batch_size: usize,
    pub learning_freq: u64,
    pub updating_freq: u64,
    pub save_every: u64,
    pub reward_unit: f32,
    pub discount_factor: f32,
    /// Executed positions below this height touched the container floor.
    pub depth_threshold: f32,
    pub epsilon_initial: f32,
    pub epsilon_decay: f32,
    pub epsilon_floor: f32,
    pub grasp_orientations: usize,
    pub run_root: PathBuf,
    /// Continue training from this checkpoint (required for evaluation).
    pub model_path: Option<PathBuf>,
    /// Restore the replay buffer persisted by an earlier run.
    pub buffer_path: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            mode: RunMode::Train,
            buffer_capacity: 500,
            mini_batch_size: 4,
            learning_freq: 10,
            updating_freq: 40,
            save_every: 10,
            reward_unit: 1.0,
            discount_factor: 0.5,
            depth_threshold: -0.017,
            epsilon_initial: 0.5,
            epsilon_decay: 0.998,
            epsilon_floor: 0.1,
            grasp_orientations: 4,
            run_root: PathBuf::from("runs"),
            model_path: None,
            buffer_path: None,
        }
    }
}

impl Configuration {
    /// Layered load: defaults, then an optional TOML file, then
    /// `GRASPBOT_*` environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("GRASPBOT"));
        let raw = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;
        let configuration: Configuration = raw
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.buffer_capacity == 0 {
            return Err(AppError::Config("buffer_capacity must be positive".into()));
        }
        if self.mini_batch_size == 0 || self.mini_batch_size > self.buffer_capacity {
            return Err(AppError::Config(format!(
                "mini_batch_size {} must be in 1..={}",
                self.mini_batch_size, self.buffer_capacity
            )));
        }
        if self.learning_freq == 0 || self.updating_freq == 0 || self.save_every == 0 {
            return Err(AppError::Config("frequencies must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.epsilon_initial)
            || !(0.0..=1.0).contains(&self.epsilon_floor)
            || !(0.0..1.0).contains(&self.epsilon_decay)
        {
            return Err(AppError::Config("epsilon schedule out of range".into()));
        }
        if !(0.0..1.0).contains(&self.discount_factor) {
            return Err(AppError::Config("discount_factor must be in [0, 1)".into()));
        }
        if self.reward_unit <= 0.0 {
            return Err(AppError::Config("reward_unit must be positive".into()));
        }
        if self.grasp_orientations == 0 {
            return Err(AppError::Config(
                "grasp_orientations must be positive".into(),
            ));
        }
        if self.mode == RunMode::Evaluate && self.model_path.is_none() {
            return Err(AppError::Config(
                "evaluation requires a model checkpoint".into(),
            ));
        }
        Ok(())
    }
}
