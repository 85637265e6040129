use crate::error::CollaboratorError;
use crate::pipeline::types::{AffordanceMaps, PixelIndex, ValueGrid, SUCTION_HEADS};
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The value predictor as the core sees it: dense per-head value maps in,
/// one regression step at a pixel out. The convolutional internals live
/// behind this trait.
#[async_trait]
pub trait ValuePredictor: Send + Sync {
    /// Value maps for every head. `volatile` marks inference-only calls
    /// that need no gradient bookkeeping.
    async fn forward(
        &self,
        color: &RgbImage,
        depth: &ValueGrid,
        volatile: bool,
    ) -> Result<AffordanceMaps, CollaboratorError>;

    /// Value map for a single head; the head encodes both the action
    /// family and, for grasps, the orientation.
    async fn forward_head(
        &self,
        color: &RgbImage,
        depth: &ValueGrid,
        head: usize,
    ) -> Result<ValueGrid, CollaboratorError>;

    /// Regress the value at `pixel` toward `target`, scaled by the
    /// importance weight; returns the loss.
    async fn backprop(
        &mut self,
        color: &RgbImage,
        depth: &ValueGrid,
        pixel: &PixelIndex,
        target: f32,
        importance_weight: f32,
    ) -> Result<f32, CollaboratorError>;

    async fn save_parameters(&self, path: &Path) -> Result<(), CollaboratorError>;

    async fn load_parameters(&mut self, path: &Path) -> Result<(), CollaboratorError>;

    /// Opaque parameter snapshot for target-network synchronization.
    fn export_state(&self) -> Result<Vec<u8>, CollaboratorError>;

    fn import_state(&mut self, state: &[u8]) -> Result<(), CollaboratorError>;
}

/// The frequently-updated behavior predictor and its slowly-updated
/// target copy, as two independently owned instances. Keeping the target
/// separate stops the bootstrap target from chasing a moving estimate.
pub struct PredictorPair {
    pub behavior: Box<dyn ValuePredictor>,
    pub target: Box<dyn ValuePredictor>,
}

impl PredictorPair {
    pub fn new(behavior: Box<dyn ValuePredictor>, target: Box<dyn ValuePredictor>) -> Self {
        Self { behavior, target }
    }

    /// Replace the target's parameters wholesale with the behavior's.
    pub fn sync_target_from_behavior(&mut self) -> Result<(), CollaboratorError> {
        let state = self.behavior.export_state()?;
        self.target.import_state(&state)
    }
}

// Grid-table stand-in for the convolutional predictor: one value cell per
// (head, pixel), nudged toward each regression target. Placeholder until a
// real dense backbone is wired in, but it exercises the full training loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct GridWeights {
    heads: usize,
    rows: usize,
    cols: usize,
    values: Vec<f32>,
}

impl GridWeights {
    fn index(&self, pixel: &PixelIndex) -> usize {
        (pixel.head * self.rows + pixel.row) * self.cols + pixel.col
    }
}

#[derive(Debug, Clone)]
pub struct GridValuePredictor {
    weights: GridWeights,
    learning_rate: f32,
}

impl GridValuePredictor {
    pub fn new(grasp_orientations: usize, rows: usize, cols: usize, learning_rate: f32) -> Self {
        let heads = SUCTION_HEADS + grasp_orientations;
        Self {
            weights: GridWeights {
                heads,
                rows,
                cols,
                values: vec![0.0; heads * rows * cols],
            },
            learning_rate,
        }
    }

    fn head_grid(&self, head: usize) -> ValueGrid {
        let GridWeights { rows, cols, .. } = self.weights;
        let start = head * rows * cols;
        ValueGrid::from_vec(
            rows,
            cols,
            self.weights.values[start..start + rows * cols].to_vec(),
        )
    }
}

#[async_trait]
impl ValuePredictor for GridValuePredictor {
    async fn forward(
        &self,
        _color: &RgbImage,
        _depth: &ValueGrid,
        _volatile: bool,
    ) -> Result<AffordanceMaps, CollaboratorError> {
        let maps = (0..self.weights.heads).map(|h| self.head_grid(h)).collect();
        Ok(AffordanceMaps::new(maps))
    }

    async fn forward_head(
        &self,
        _color: &RgbImage,
        _depth: &ValueGrid,
        head: usize,
    ) -> Result<ValueGrid, CollaboratorError> {
        if head >= self.weights.heads {
            return Err(CollaboratorError::Predictor(format!(
                "head {head} out of range 0..{}",
                self.weights.heads
            )));
        }
        Ok(self.head_grid(head))
    }

    async fn backprop(
        &mut self,
        _color: &RgbImage,
        _depth: &ValueGrid,
        pixel: &PixelIndex,
        target: f32,
        importance_weight: f32,
    ) -> Result<f32, CollaboratorError> {
        if pixel.head >= self.weights.heads {
            return Err(CollaboratorError::Predictor(format!(
                "head {} out of range 0..{}",
                pixel.head, self.weights.heads
            )));
        }
        let index = self.weights.index(pixel);
        let old = self.weights.values[index];
        let error = target - old;
        self.weights.values[index] = old + self.learning_rate * importance_weight * error;
        Ok(importance_weight * error * error)
    }

    async fn save_parameters(&self, path: &Path) -> Result<(), CollaboratorError> {
        let bytes = serde_json::to_vec_pretty(&self.weights)
            .map_err(|e| CollaboratorError::Predictor(e.to_string()))?;
        std::fs::write(path, bytes).map_err(|e| CollaboratorError::Predictor(e.to_string()))
    }

    async fn load_parameters(&mut self, path: &Path) -> Result<(), CollaboratorError> {
        let bytes =
            std::fs::read(path).map_err(|e| CollaboratorError::Predictor(e.to_string()))?;
        self.import_state(&bytes)
    }

    fn export_state(&self) -> Result<Vec<u8>, CollaboratorError> {
        serde_json::to_vec(&self.weights).map_err(|e| CollaboratorError::Predictor(e.to_string()))
    }

    fn import_state(&mut self, state: &[u8]) -> Result<(), CollaboratorError> {
        let weights: GridWeights = serde_json::from_slice(state)
            .map_err(|e| CollaboratorError::Predictor(e.to_string()))?;
        if weights.values.len() != weights.heads * weights.rows * weights.cols {
            return Err(CollaboratorError::Predictor(
                "weight table does not match its declared shape".into(),
            ));
        }
        self.weights = weights;
        Ok(())
    }
}
