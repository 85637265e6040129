pub mod actuation;
pub mod indicator;
pub mod operator;
pub mod outcome;
pub mod perception;
pub mod predictor;
pub mod scene_store;
pub mod sim;
pub mod visualizer;

pub use actuation::ActuationService;
pub use indicator::{IndicatorLight, LogIndicator, NullIndicator, StatusSignal};
pub use operator::{ConsoleGate, EpisodeGate, ResetDecision, ScriptedGate};
pub use outcome::OutcomeChecker;
pub use perception::{position_is_valid, PerceptionService, PointGrid, SceneObservation};
pub use predictor::{GridValuePredictor, PredictorPair, ValuePredictor};
pub use scene_store::{FsSceneStore, SceneRefs, SceneStage, SceneStore};
pub use visualizer::{DecisionMarker, NullVisualizer, Visualizer};
