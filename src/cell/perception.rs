use crate::error::CollaboratorError;
use crate::pipeline::types::ValueGrid;
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Per-pixel 3-D point in the robot frame, aligned with the height-map
/// grid. Cells with no valid scan data hold NaN coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointGrid {
    rows: usize,
    cols: usize,
    points: Vec<[f32; 3]>,
}

impl PointGrid {
    pub fn new(rows: usize, cols: usize, points: Vec<[f32; 3]>) -> Self {
        assert_eq!(points.len(), rows * cols, "point grid shape mismatch");
        Self { rows, cols, points }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> [f32; 3] {
        self.points[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, point: [f32; 3]) {
        self.points[row * self.cols + col] = point;
    }
}

/// Whether a selected pixel maps to an executable 3-D position.
pub fn position_is_valid(point: [f32; 3]) -> bool {
    point.iter().all(|c| c.is_finite())
}

/// One captured scene: color height map, depth height map, and the 3-D
/// point behind every pixel.
#[derive(Debug, Clone)]
pub struct SceneObservation {
    pub color: RgbImage,
    pub depth: ValueGrid,
    pub points: PointGrid,
}

/// Height-map construction from raw scans happens behind this call.
#[async_trait]
pub trait PerceptionService: Send + Sync {
    async fn capture(&mut self) -> Result<SceneObservation, CollaboratorError>;
}
