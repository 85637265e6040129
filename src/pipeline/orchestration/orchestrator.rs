use crate::cell::{
    position_is_valid, ActuationService, DecisionMarker, EpisodeGate, IndicatorLight,
    OutcomeChecker, PerceptionService, PredictorPair, ResetDecision, SceneStage, SceneStore,
    StatusSignal, Visualizer,
};
use crate::config::{Configuration, RunMode};
use crate::error::AppError;
use crate::pipeline::learning::{PriorityReplayBuffer, RewardShaper, TdTargetComputer};
use crate::pipeline::orchestration::action_selector::{ActionSelector, GraspAngleTable};
use crate::pipeline::orchestration::epsilon::EpsilonSchedule;
use crate::pipeline::orchestration::journal::{PhaseDurations, RunJournalWriter, StepJournalEntry};
use crate::pipeline::orchestration::run_state::{RunPhase, RunState, StepRecord};
use crate::pipeline::types::{PixelIndex, Transition, ValueGrid};
use chrono::Utc;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Every external collaborator the control loop talks to, behind one
/// seam so tests can swap in scripted doubles.
pub struct CellServices {
    pub perception: Box<dyn PerceptionService>,
    pub actuation: Box<dyn ActuationService>,
    pub outcomes: Box<dyn OutcomeChecker>,
    pub indicator: Box<dyn IndicatorLight>,
    pub visualizer: Box<dyn Visualizer>,
    pub scenes: Box<dyn SceneStore>,
    pub gate: Box<dyn EpisodeGate>,
}

/// Filesystem layout of one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub scene_dir: PathBuf,
    pub model_dir: PathBuf,
    pub buffer_file: PathBuf,
    pub journal_file: PathBuf,
}

impl RunPaths {
    pub fn under(root: &Path) -> Result<Self, AppError> {
        let paths = Self {
            scene_dir: root.join("scenes"),
            model_dir: root.join("models"),
            buffer_file: root.join("replay_buffer.json"),
            journal_file: root.join("journal.jsonl"),
        };
        for dir in [&paths.scene_dir, &paths.model_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                AppError::Config(format!("cannot create run directory {}: {e}", dir.display()))
            })?;
        }
        Ok(paths)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub iterations: u64,
    pub episodes: usize,
    pub buffer_occupancy: usize,
}

/// The control loop. Owns every piece of mutable run state; one step runs
/// to completion before the next starts, and each collaborator call is
/// awaited before the loop moves on.
pub struct TrainingOrchestrator {
    configuration: Configuration,
    services: CellServices,
    predictors: PredictorPair,
    buffer: PriorityReplayBuffer,
    shaper: RewardShaper,
    td: TdTargetComputer,
    selector: ActionSelector,
    state: RunState,
    journal: Box<dyn RunJournalWriter>,
    paths: RunPaths,
}

impl TrainingOrchestrator {
    pub fn new(
        configuration: Configuration,
        services: CellServices,
        predictors: PredictorPair,
        journal: Box<dyn RunJournalWriter>,
        paths: RunPaths,
    ) -> Self {
        let buffer = PriorityReplayBuffer::new(configuration.buffer_capacity);
        let shaper = RewardShaper::from_configuration(&configuration);
        let td = TdTargetComputer::new(configuration.discount_factor);
        let selector = ActionSelector::new(
            EpsilonSchedule::new(
                configuration.epsilon_initial,
                configuration.epsilon_decay,
                configuration.epsilon_floor.min(configuration.epsilon_initial),
            ),
            GraspAngleTable::new(configuration.grasp_orientations),
        );
        Self {
            configuration,
            services,
            predictors,
            buffer,
            shaper,
            td,
            selector,
            state: RunState::new(),
            journal,
            paths,
        }
    }

    /// Seed the replay buffer from an earlier run's persisted state.
    pub fn restore_buffer(&mut self, path: &Path) -> Result<usize, AppError> {
        Ok(self.buffer.restore(path)?)
    }

    pub fn buffer(&self) -> &PriorityReplayBuffer {
        &self.buffer
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run episodes until the operator exits, the token cancels, or a
    /// collaborator fails. Always performs the graceful-shutdown
    /// persistence sequence before returning.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunSummary, AppError> {
        'run: loop {
            self.state.phase = RunPhase::AwaitingReset;
            if self.state.iteration > 0 {
                self.services.indicator.signal(StatusSignal::Resetting);
            }
            let decision = if cancel.is_cancelled() {
                ResetDecision::Exit
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => ResetDecision::Exit,
                    decision = self.services.gate.await_reset() => decision?,
                }
            };
            if decision == ResetDecision::Exit {
                info!("Exit requested, wrapping up the run");
                break;
            }

            let episode = self.state.begin_episode();
            info!("Episode {} started", episode);
            loop {
                if cancel.is_cancelled() {
                    info!("Stop signal received mid-episode");
                    break 'run;
                }
                match self.step().await {
                    Ok(workspace_empty) => {
                        if workspace_empty {
                            self.flush_episode()?;
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Step failed, shutting down: {}", e);
                        if let Err(persist_err) = self.shutdown().await {
                            error!("Shutdown persistence failed: {}", persist_err);
                        }
                        return Err(e);
                    }
                }
            }
        }
        self.shutdown().await?;
        Ok(RunSummary {
            iterations: self.state.iteration,
            episodes: self.state.episode_count(),
            buffer_occupancy: self.buffer.len(),
        })
    }

    /// One full Perceiving..Storing traversal plus any cadenced
    /// maintenance. Returns whether the workspace came up empty.
    ///
    /// Ordering matters here: every fallible collaborator call for the
    /// step happens before the transition is stored and the counters are
    /// bumped, so a failure leaves the buffer and the global step counter
    /// untouched.
    async fn step(&mut self) -> Result<bool, AppError> {
        let step_start = Instant::now();
        let mut durations = PhaseDurations::default();
        let iteration = self.state.iteration;
        let episode_id = self.state.current_episode.expect("step outside an episode");
        info!("Iteration {}", iteration);

        self.state.phase = RunPhase::Perceiving;
        let phase_start = Instant::now();
        let observation = self.services.perception.capture().await?;
        let scene = self
            .services
            .scenes
            .persist(&observation, iteration, SceneStage::Before)
            .await?;
        durations.perceive_us = phase_start.elapsed().as_micros() as u64;

        self.state.phase = RunPhase::Deciding;
        let phase_start = Instant::now();
        let mut maps = self
            .predictors
            .behavior
            .forward(&observation.color, &observation.depth, true)
            .await?;
        let explore = self.configuration.mode == RunMode::Train;
        let selection = self.selector.select(&mut maps, iteration, explore);
        let epsilon = if explore {
            self.selector.epsilon_at(iteration)
        } else {
            0.0
        };
        let position = observation
            .points
            .get(selection.pixel.row, selection.pixel.col);
        let valid = position_is_valid(position);
        info!(
            "Take action [{}] at ({}, {}) -> ({:.4}, {:.4}, {:.4}), explored: {}",
            selection.family,
            selection.pixel.row,
            selection.pixel.col,
            position[0],
            position[1],
            position[2],
            selection.explored
        );
        self.services
            .visualizer
            .publish_marker(&DecisionMarker {
                position,
                family: selection.family,
                angle: selection.angle,
                valid,
            })
            .await?;
        durations.decide_us = phase_start.elapsed().as_micros() as u64;

        self.state.phase = RunPhase::Acting;
        let phase_start = Instant::now();
        if valid {
            self.services
                .actuation
                .execute(selection.family.tool_id(), position, selection.angle)
                .await?;
            self.services.actuation.go_home().await?;
        } else {
            warn!("Selected pixel has no executable position");
            self.services.indicator.signal(StatusSignal::InvalidAction);
        }
        durations.act_us = phase_start.elapsed().as_micros() as u64;

        self.state.phase = RunPhase::Evaluating;
        let phase_start = Instant::now();
        let next_observation = self.services.perception.capture().await?;
        let next_scene = self
            .services
            .scenes
            .persist(&next_observation, iteration, SceneStage::After)
            .await?;
        let success = if !valid {
            false
        } else if selection.family.is_suction() {
            self.services.outcomes.check_suction_success().await?
        } else {
            self.services
                .outcomes
                .check_grasp_success(&scene, &next_scene, position)
                .await?
        };
        if success {
            self.services.actuation.go_place().await?;
            self.services.indicator.signal(StatusSignal::Success);
        } else if valid {
            self.services.actuation.release_vacuum().await?;
            self.services.indicator.signal(StatusSignal::Failure);
        }
        let workspace_empty = self
            .services
            .outcomes
            .is_workspace_empty(&next_observation.points)
            .await?;
        durations.evaluate_us = phase_start.elapsed().as_micros() as u64;

        let reward = self.shaper.shape(valid, success, position[2]);

        self.state.phase = RunPhase::Storing;
        let phase_start = Instant::now();
        let next_maps = self
            .predictors
            .target
            .forward(&next_observation.color, &next_observation.depth, true)
            .await?;
        let td_target = self.td.target(reward, &next_maps, workspace_empty);
        let old_value = self
            .predictors
            .behavior
            .forward_head(&observation.color, &observation.depth, selection.pixel.head)
            .await?
            .get(selection.pixel.row, selection.pixel.col);
        let td_error = (td_target - old_value) as f64;

        // Point of no return for this step: all fallible calls are done.
        self.buffer.insert(
            td_error * td_error,
            Transition {
                scene,
                pixel: selection.pixel,
                reward,
                next_scene,
                terminal: workspace_empty,
            },
        );
        self.state.episode_return +=
            reward * self.configuration.discount_factor.powi(self.state.episode_step as i32);
        info!(
            "Reward: {:.2}  Return: {:.4}",
            reward, self.state.episode_return
        );
        self.state.record_step(StepRecord {
            iteration,
            episode_id,
            pixel: selection.pixel,
            position,
            valid,
            success,
            explored: selection.explored,
            reward,
        });
        self.state.iteration += 1;
        self.state.episode_step += 1;
        durations.store_us = phase_start.elapsed().as_micros() as u64;

        let losses = self.run_maintenance(&mut durations).await?;

        durations.total_us = step_start.elapsed().as_micros() as u64;
        self.journal.write_step(StepJournalEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            iteration,
            episode_id,
            family: selection.family,
            pixel: selection.pixel,
            position,
            angle: selection.angle,
            valid,
            success,
            explored: selection.explored,
            epsilon,
            reward,
            losses,
            phase_durations: durations,
        })?;

        Ok(workspace_empty)
    }

    /// Learning, target synchronization, and checkpointing on their
    /// configured cadences. The step counter has already advanced.
    async fn run_maintenance(
        &mut self,
        durations: &mut PhaseDurations,
    ) -> Result<Vec<f32>, AppError> {
        let iteration = self.state.iteration;
        let mut losses = Vec::new();

        if iteration % self.configuration.learning_freq == 0 {
            if self.buffer.has_at_least(self.configuration.mini_batch_size) {
                self.services.indicator.signal(StatusSignal::Learning);
                let learn_start = Instant::now();
                losses = self.learn().await?;
                durations.learn_us = Some(learn_start.elapsed().as_micros() as u64);
            } else {
                debug!(
                    "Skipping learning pass: occupancy {} below mini-batch {}",
                    self.buffer.len(),
                    self.configuration.mini_batch_size
                );
            }
        }

        if iteration % self.configuration.updating_freq == 0 {
            info!("Replacing target predictor with behavior predictor");
            self.predictors.sync_target_from_behavior()?;
        }

        if self.configuration.mode == RunMode::Train
            && iteration % self.configuration.save_every == 0
        {
            let path = self.paths.model_dir.join(format!("{iteration:06}.json"));
            self.predictors.behavior.save_parameters(&path).await?;
            info!("Checkpoint saved to {}", path.display());
        }

        Ok(losses)
    }

    /// One prioritized learning pass: sample, regress the behavior
    /// predictor toward TD targets computed against the slow target
    /// predictor from the stored next-state data, then refresh the
    /// sampled leaves' priorities with the updated estimates. The stored
    /// head indexes the head-specific forward on both passes.
    async fn learn(&mut self) -> Result<Vec<f32>, AppError> {
        let batch = self.buffer.sample(self.configuration.mini_batch_size)?;
        let sampled_leaves: Vec<usize> = batch.iter().map(|s| s.leaf).collect();
        debug!("Sampled leaves: {:?}", sampled_leaves);

        struct RefreshItem {
            leaf: usize,
            pixel: PixelIndex,
            color: RgbImage,
            depth: ValueGrid,
            td_target: f32,
        }

        let mut losses = Vec::with_capacity(batch.len());
        let mut refresh = Vec::with_capacity(batch.len());
        for sampled in &batch {
            let transition = &sampled.transition;
            let (color, depth) = self.services.scenes.load(&transition.scene).await?;
            let (next_color, next_depth) = self.services.scenes.load(&transition.next_scene).await?;
            let next_maps = self
                .predictors
                .target
                .forward(&next_color, &next_depth, true)
                .await?;
            let td_target = self
                .td
                .target(transition.reward, &next_maps, transition.terminal);
            let loss = self
                .predictors
                .behavior
                .backprop(
                    &color,
                    &depth,
                    &transition.pixel,
                    td_target,
                    sampled.weight as f32,
                )
                .await?;
            losses.push(loss);
            refresh.push(RefreshItem {
                leaf: sampled.leaf,
                pixel: transition.pixel,
                color,
                depth,
                td_target,
            });
        }

        for item in refresh {
            let old_value = self
                .predictors
                .behavior
                .forward_head(&item.color, &item.depth, item.pixel.head)
                .await?
                .get(item.pixel.row, item.pixel.col);
            let td_error = (item.td_target - old_value) as f64;
            self.buffer.update_priority(item.leaf, td_error * td_error);
        }

        info!("Learning pass complete, losses: {:?}", losses);
        Ok(losses)
    }

    fn flush_episode(&mut self) -> Result<(), AppError> {
        if let Some(record) = self.state.finish_episode() {
            let record = record.clone();
            info!(
                "Episode {} finished after {} steps, return {:.4}",
                record.id, record.steps, record.discounted_return
            );
            self.journal.write_episode(&record)?;
        }
        Ok(())
    }

    /// The graceful-shutdown contract: flush episode bookkeeping, persist
    /// the replay buffer and a final checkpoint, then flush the journal.
    async fn shutdown(&mut self) -> Result<(), AppError> {
        self.state.phase = RunPhase::Stopped;
        self.flush_episode()?;
        self.buffer.persist(&self.paths.buffer_file)?;
        let checkpoint = self
            .paths
            .model_dir
            .join(format!("interrupt_{:06}.json", self.state.iteration));
        self.predictors.behavior.save_parameters(&checkpoint).await?;
        self.journal.flush()?;
        info!(
            "Graceful shutdown complete at iteration {}",
            self.state.iteration
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::perception::SceneObservation;
    use crate::cell::sim::{create_sim_cell, SimObject};
    use crate::cell::{
        FsSceneStore, GridValuePredictor, NullIndicator, NullVisualizer, ScriptedGate,
        ValuePredictor,
    };
    use crate::error::CollaboratorError;
    use crate::pipeline::orchestration::journal::InMemoryJournalWriter;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    const GRID: usize = 8;

    /// Journal double whose entries stay inspectable after `run`
    /// consumes the orchestrator.
    #[derive(Clone, Default)]
    struct SharedJournal(Arc<Mutex<InMemoryJournalWriter>>);

    impl RunJournalWriter for SharedJournal {
        fn write_step(&mut self, entry: StepJournalEntry) -> Result<(), AppError> {
            self.0.lock().unwrap().write_step(entry)
        }

        fn write_episode(
            &mut self,
            record: &crate::pipeline::orchestration::run_state::EpisodeRecord,
        ) -> Result<(), AppError> {
            self.0.lock().unwrap().write_episode(record)
        }

        fn flush(&mut self) -> Result<(), AppError> {
            Ok(())
        }
    }

    /// Perception that fails after a fixed number of captures.
    struct FlakyPerception {
        inner: Box<dyn PerceptionService>,
        remaining: usize,
    }

    #[async_trait]
    impl PerceptionService for FlakyPerception {
        async fn capture(&mut self) -> Result<SceneObservation, CollaboratorError> {
            if self.remaining == 0 {
                return Err(CollaboratorError::Perception("camera offline".into()));
            }
            self.remaining -= 1;
            self.inner.capture().await
        }
    }

    fn greedy_configuration(root: &Path) -> Configuration {
        Configuration {
            buffer_capacity: 16,
            mini_batch_size: 1,
            learning_freq: 1,
            updating_freq: 2,
            save_every: 1,
            epsilon_initial: 0.0,
            epsilon_floor: 0.0,
            run_root: root.to_path_buf(),
            ..Configuration::default()
        }
    }

    /// Behavior predictor pre-trained to point at the object cell so the
    /// greedy policy is deterministic.
    async fn pointed_predictors(row: usize, col: usize) -> PredictorPair {
        let mut behavior = GridValuePredictor::new(4, GRID, GRID, 1.0);
        let color = RgbImage::new(GRID as u32, GRID as u32);
        let depth = ValueGrid::zeros(GRID, GRID);
        behavior
            .backprop(&color, &depth, &PixelIndex::new(0, row, col), 10.0, 1.0)
            .await
            .expect("seed weights");
        let target = behavior.clone();
        PredictorPair::new(Box::new(behavior), Box::new(target))
    }

    fn orchestrator_for(
        root: &Path,
        episodes: usize,
        predictors: PredictorPair,
        perception: Box<dyn PerceptionService>,
        actuation: Box<dyn ActuationService>,
        outcomes: Box<dyn OutcomeChecker>,
        journal: SharedJournal,
    ) -> TrainingOrchestrator {
        let paths = RunPaths::under(root).expect("run paths");
        let services = CellServices {
            perception,
            actuation,
            outcomes,
            indicator: Box::new(NullIndicator),
            visualizer: Box::new(NullVisualizer),
            scenes: Box::new(FsSceneStore::new(&paths.scene_dir).expect("scene store")),
            gate: Box::new(ScriptedGate::episodes(episodes)),
        };
        TrainingOrchestrator::new(
            greedy_configuration(root),
            services,
            predictors,
            Box::new(journal),
            paths,
        )
    }

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("graspbot_orchestrator_{tag}"));
        std::fs::remove_dir_all(&root).ok();
        root
    }

    #[tokio::test]
    async fn one_episode_picks_stores_learns_and_checkpoints() {
        let root = temp_root("episode");
        let (perception, actuation, outcomes) = create_sim_cell(
            GRID,
            GRID,
            vec![SimObject {
                row: 3,
                col: 4,
                height: 0.03,
            }],
        );
        let journal = SharedJournal::default();
        let orchestrator = orchestrator_for(
            &root,
            1,
            pointed_predictors(3, 4).await,
            Box::new(perception),
            Box::new(actuation),
            Box::new(outcomes),
            journal.clone(),
        );

        let summary = orchestrator
            .run(CancellationToken::new())
            .await
            .expect("run succeeds");
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.episodes, 1);
        assert_eq!(summary.buffer_occupancy, 1);

        let journal = journal.0.lock().unwrap();
        assert_eq!(journal.steps().len(), 1);
        let step = &journal.steps()[0];
        assert!(step.valid);
        assert!(step.success);
        assert!(!step.explored);
        assert_eq!(step.reward, 1.0);
        assert_eq!(step.losses.len(), 1, "learning pass ran at occupancy 1");
        assert_eq!(journal.episodes().len(), 1);
        assert_eq!(journal.episodes()[0].steps, 1);
        assert_eq!(journal.episodes()[0].discounted_return, 1.0);

        // Periodic checkpoint plus the shutdown checkpoint and buffer.
        assert!(root.join("models/000001.json").exists());
        assert!(root.join("models/interrupt_000001.json").exists());
        assert!(root.join("replay_buffer.json").exists());
        let mut restored = PriorityReplayBuffer::new(16);
        assert_eq!(restored.restore(&root.join("replay_buffer.json")).unwrap(), 1);
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn repeated_episodes_accumulate_iterations() {
        let root = temp_root("episodes");
        let (perception, actuation, outcomes) = create_sim_cell(
            GRID,
            GRID,
            vec![SimObject {
                row: 3,
                col: 4,
                height: 0.03,
            }],
        );
        let journal = SharedJournal::default();
        let orchestrator = orchestrator_for(
            &root,
            2,
            pointed_predictors(3, 4).await,
            Box::new(perception),
            Box::new(actuation),
            Box::new(outcomes),
            journal.clone(),
        );

        let summary = orchestrator
            .run(CancellationToken::new())
            .await
            .expect("run succeeds");
        // The second episode starts over an already-empty workspace, so
        // its single step sees it empty and ends immediately.
        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.episodes, 2);
        assert_eq!(journal.0.lock().unwrap().episodes().len(), 2);
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn collaborator_failure_mid_step_stores_nothing() {
        let root = temp_root("flaky");
        let (perception, actuation, outcomes) = create_sim_cell(
            GRID,
            GRID,
            vec![SimObject {
                row: 3,
                col: 4,
                height: 0.03,
            }],
        );
        // The first capture succeeds; the post-action capture fails, so
        // the step dies after the action but before storage.
        let flaky = FlakyPerception {
            inner: Box::new(perception),
            remaining: 1,
        };
        let journal = SharedJournal::default();
        let orchestrator = orchestrator_for(
            &root,
            1,
            pointed_predictors(3, 4).await,
            Box::new(flaky),
            Box::new(actuation),
            Box::new(outcomes),
            journal.clone(),
        );

        let err = orchestrator
            .run(CancellationToken::new())
            .await
            .expect_err("run surfaces the failure");
        assert!(matches!(
            err,
            AppError::Collaborator(CollaboratorError::Perception(_))
        ));

        // Shutdown persisted state reflects the world before the failing
        // call: no partial transition, no step journaled.
        let mut restored = PriorityReplayBuffer::new(16);
        assert_eq!(restored.restore(&root.join("replay_buffer.json")).unwrap(), 0);
        let journal = journal.0.lock().unwrap();
        assert!(journal.steps().is_empty());
        assert_eq!(journal.episodes().len(), 1);
        assert_eq!(journal.episodes()[0].steps, 0);
        assert!(root.join("models/interrupt_000000.json").exists());
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn cancellation_before_the_first_episode_persists_and_exits() {
        let root = temp_root("cancel");
        let (perception, actuation, outcomes) = create_sim_cell(GRID, GRID, vec![]);
        let journal = SharedJournal::default();
        let orchestrator = orchestrator_for(
            &root,
            5,
            pointed_predictors(3, 4).await,
            Box::new(perception),
            Box::new(actuation),
            Box::new(outcomes),
            journal.clone(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = orchestrator.run(cancel).await.expect("clean exit");
        assert_eq!(summary.iterations, 0);
        assert_eq!(summary.episodes, 0);
        assert!(root.join("replay_buffer.json").exists());
        std::fs::remove_dir_all(&root).ok();
    }
}
