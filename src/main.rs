use graspbot::cell::sim::{create_sim_cell, SimObject};
use graspbot::cell::{
    ConsoleGate, FsSceneStore, GridValuePredictor, LogIndicator, NullVisualizer, PredictorPair,
    ValuePredictor,
};
use graspbot::pipeline::orchestration::journal::JsonLinesJournalWriter;
use graspbot::{AppError, CellServices, Configuration, CoordinatorBuilder, RunPaths};
use std::path::PathBuf;
use tracing::{info, Level};

/// Height-map resolution of the demo workspace.
const WORKSPACE_CELLS: usize = 20;

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

fn demo_objects() -> Vec<SimObject> {
    vec![
        SimObject {
            row: 5,
            col: 7,
            height: 0.035,
        },
        SimObject {
            row: 12,
            col: 4,
            height: 0.022,
        },
        SimObject {
            row: 9,
            col: 14,
            height: 0.041,
        },
    ]
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_logging();
    let config_file = std::env::args().nth(1).map(PathBuf::from);
    let configuration = Configuration::load(config_file.as_deref())?;
    let paths = RunPaths::under(&configuration.run_root)?;
    info!("Run directory: {}", configuration.run_root.display());

    // Simulated cell until the real perception/actuation services are
    // wired in over their transports.
    let (perception, actuation, outcomes) =
        create_sim_cell(WORKSPACE_CELLS, WORKSPACE_CELLS, demo_objects());

    let mut behavior = GridValuePredictor::new(
        configuration.grasp_orientations,
        WORKSPACE_CELLS,
        WORKSPACE_CELLS,
        0.1,
    );
    if let Some(model) = &configuration.model_path {
        info!("Loading model checkpoint from {}", model.display());
        behavior.load_parameters(model).await?;
    }
    let target = GridValuePredictor::new(
        configuration.grasp_orientations,
        WORKSPACE_CELLS,
        WORKSPACE_CELLS,
        0.1,
    );
    let mut predictors = PredictorPair::new(Box::new(behavior), Box::new(target));
    predictors.sync_target_from_behavior()?;

    let services = CellServices {
        perception: Box::new(perception),
        actuation: Box::new(actuation),
        outcomes: Box::new(outcomes),
        indicator: Box::new(LogIndicator),
        visualizer: Box::new(NullVisualizer),
        scenes: Box::new(FsSceneStore::new(&paths.scene_dir)?),
        gate: Box::new(ConsoleGate),
    };
    let journal = JsonLinesJournalWriter::create(&paths.journal_file)?;

    let coordinator = CoordinatorBuilder::new(configuration)
        .services(services)
        .predictors(predictors)
        .journal(Box::new(journal))
        .paths(paths)
        .build()?;

    let token = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, requesting graceful stop");
            token.cancel();
        }
    });

    let summary = coordinator.join().await?;
    info!(
        "Run complete: {} iterations over {} episodes, buffer occupancy {}",
        summary.iterations, summary.episodes, summary.buffer_occupancy
    );
    Ok(())
}
