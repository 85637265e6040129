use crate::cell::PredictorPair;
use crate::config::Configuration;
use crate::error::AppError;
use crate::pipeline::orchestration::journal::RunJournalWriter;
use crate::pipeline::orchestration::{CellServices, RunPaths, RunSummary, TrainingOrchestrator};
use tokio_util::sync::CancellationToken;

/// Owns the running control loop and its stop signal.
#[derive(Debug)]
pub struct Coordinator {
    run_task: tokio::task::JoinHandle<Result<RunSummary, AppError>>,
    cancel_token: CancellationToken,
}

impl Coordinator {
    fn new(orchestrator: TrainingOrchestrator) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        Self {
            run_task: tokio::spawn(async move { orchestrator.run(token).await }),
            cancel_token,
        }
    }

    /// Request a graceful stop; the loop persists its state and winds
    /// down on its own.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Wait for the loop to finish and surface its result.
    pub async fn join(self) -> Result<RunSummary, AppError> {
        self.run_task
            .await
            .map_err(|e| AppError::Runtime(e.to_string()))?
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    services: Option<CellServices>,
    predictors: Option<PredictorPair>,
    journal: Option<Box<dyn RunJournalWriter>>,
    paths: Option<RunPaths>,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            services: None,
            predictors: None,
            journal: None,
            paths: None,
        }
    }

    pub fn services(mut self, services: CellServices) -> Self {
        self.services = Some(services);
        self
    }

    pub fn predictors(mut self, predictors: PredictorPair) -> Self {
        self.predictors = Some(predictors);
        self
    }

    pub fn journal(mut self, journal: Box<dyn RunJournalWriter>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn paths(mut self, paths: RunPaths) -> Self {
        self.paths = Some(paths);
        self
    }

    pub fn build(self) -> Result<Coordinator, AppError> {
        let services = self
            .services
            .ok_or(AppError::Config("Cell services not set".to_string()))?;
        let predictors = self
            .predictors
            .ok_or(AppError::Config("Predictors not set".to_string()))?;
        let journal = self
            .journal
            .ok_or(AppError::Config("Journal not set".to_string()))?;
        let paths = match self.paths {
            Some(paths) => paths,
            None => RunPaths::under(&self.configuration.run_root)?,
        };
        let buffer_path = self.configuration.buffer_path.clone();
        let mut orchestrator =
            TrainingOrchestrator::new(self.configuration, services, predictors, journal, paths);
        if let Some(path) = buffer_path {
            orchestrator.restore_buffer(&path)?;
        }
        Ok(Coordinator::new(orchestrator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::sim::create_sim_cell;
    use crate::cell::{
        FsSceneStore, GridValuePredictor, NullIndicator, NullVisualizer, ScriptedGate,
    };
    use crate::pipeline::orchestration::journal::InMemoryJournalWriter;

    #[tokio::test]
    async fn stopped_coordinator_winds_down_cleanly() {
        let root = std::env::temp_dir().join("graspbot_coordinator_test");
        std::fs::remove_dir_all(&root).ok();
        let configuration = Configuration {
            run_root: root.clone(),
            ..Configuration::default()
        };
        let paths = RunPaths::under(&root).expect("run paths");
        let (perception, actuation, outcomes) = create_sim_cell(8, 8, vec![]);
        let services = CellServices {
            perception: Box::new(perception),
            actuation: Box::new(actuation),
            outcomes: Box::new(outcomes),
            indicator: Box::new(NullIndicator),
            visualizer: Box::new(NullVisualizer),
            scenes: Box::new(FsSceneStore::new(&paths.scene_dir).expect("scene store")),
            gate: Box::new(ScriptedGate::episodes(0)),
        };
        let predictors = PredictorPair::new(
            Box::new(GridValuePredictor::new(4, 8, 8, 0.1)),
            Box::new(GridValuePredictor::new(4, 8, 8, 0.1)),
        );
        let coordinator = CoordinatorBuilder::new(configuration)
            .services(services)
            .predictors(predictors)
            .journal(Box::new(InMemoryJournalWriter::new()))
            .paths(paths)
            .build()
            .expect("Failed to build coordinator");
        coordinator.stop();
        let summary = coordinator.join().await.expect("clean exit");
        assert_eq!(summary.iterations, 0);
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn build_without_services_is_rejected() {
        let err = CoordinatorBuilder::new(Configuration::default())
            .build()
            .expect_err("missing services");
        assert!(matches!(err, AppError::Config(_)));
    }
}
