use crate::pipeline::types::pixel::PixelIndex;
use serde::{Deserialize, Serialize};

/// Dense row-major 2-D grid of predicted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueGrid {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl ValueGrid {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), rows * cols, "grid data does not match shape");
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Rescale to zero mean and unit variance so maps from different
    /// heads are comparable. Degenerate maps (flat or non-finite) are
    /// centered only.
    pub fn standardize(&mut self) {
        let finite: Vec<f32> = self.data.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return;
        }
        let mean = finite.iter().sum::<f32>() / finite.len() as f32;
        let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / finite.len() as f32;
        let std = var.sqrt();
        for value in &mut self.data {
            if value.is_finite() {
                *value = if std > f32::EPSILON {
                    (*value - mean) / std
                } else {
                    *value - mean
                };
            }
        }
    }

    /// Maximum finite value, or `None` for an all-non-finite grid.
    pub fn max_value(&self) -> Option<f32> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |best, v| match best {
                Some(b) if b >= v => Some(b),
                _ => Some(v),
            })
    }
}

/// One value map per action head: two suction heads followed by the
/// grasp-orientation heads, all over the same grid shape.
#[derive(Debug, Clone)]
pub struct AffordanceMaps {
    maps: Vec<ValueGrid>,
}

impl AffordanceMaps {
    pub fn new(maps: Vec<ValueGrid>) -> Self {
        assert!(!maps.is_empty(), "at least one action head is required");
        let (rows, cols) = (maps[0].rows(), maps[0].cols());
        assert!(
            maps.iter().all(|m| m.rows() == rows && m.cols() == cols),
            "all heads must share one grid shape"
        );
        Self { maps }
    }

    pub fn head_count(&self) -> usize {
        self.maps.len()
    }

    pub fn rows(&self) -> usize {
        self.maps[0].rows()
    }

    pub fn cols(&self) -> usize {
        self.maps[0].cols()
    }

    pub fn head(&self, index: usize) -> &ValueGrid {
        &self.maps[index]
    }

    pub fn standardize_all(&mut self) {
        for map in &mut self.maps {
            map.standardize();
        }
    }

    /// Joint argmax over every head and cell. Ties resolve to the lowest
    /// head, then row-major order, because the scan keeps the first
    /// strictly-greater value.
    pub fn argmax(&self) -> (PixelIndex, f32) {
        let mut best = (PixelIndex::new(0, 0, 0), f32::NEG_INFINITY);
        for (head, map) in self.maps.iter().enumerate() {
            for row in 0..map.rows() {
                for col in 0..map.cols() {
                    let value = map.get(row, col);
                    if value.is_finite() && value > best.1 {
                        best = (PixelIndex::new(head, row, col), value);
                    }
                }
            }
        }
        best
    }

    /// Maximum predicted value across every head and cell.
    pub fn max_value(&self) -> f32 {
        self.maps
            .iter()
            .filter_map(|m| m.max_value())
            .fold(f32::NEG_INFINITY, f32::max)
    }
}
