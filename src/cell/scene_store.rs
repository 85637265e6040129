use crate::cell::perception::{PointGrid, SceneObservation};
use crate::error::CollaboratorError;
use crate::pipeline::types::ValueGrid;
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Durable references to one persisted scene; these are what transitions
/// carry instead of pixel data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRefs {
    pub color: PathBuf,
    pub depth: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneStage {
    /// Observation the decision was made on.
    Before,
    /// Observation after the action ran.
    After,
}

impl SceneStage {
    fn prefix(&self) -> &'static str {
        match self {
            SceneStage::Before => "",
            SceneStage::After => "next_",
        }
    }
}

#[async_trait]
pub trait SceneStore: Send + Sync {
    /// Persist an observation for later replay; returns the refs a
    /// transition should carry.
    async fn persist(
        &mut self,
        observation: &SceneObservation,
        iteration: u64,
        stage: SceneStage,
    ) -> Result<SceneRefs, CollaboratorError>;

    /// Re-load a persisted scene for a learning pass.
    async fn load(&mut self, refs: &SceneRefs) -> Result<(RgbImage, ValueGrid), CollaboratorError>;
}

/// Filesystem store: color maps as PNG, depth grids as JSON, one flat
/// directory per run.
pub struct FsSceneStore {
    root: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct DepthFile {
    depth: ValueGrid,
    points: PointGrid,
}

impl FsSceneStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CollaboratorError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CollaboratorError::SceneStore {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    fn io_error(path: &Path, source: std::io::Error) -> CollaboratorError {
        CollaboratorError::SceneStore {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl SceneStore for FsSceneStore {
    async fn persist(
        &mut self,
        observation: &SceneObservation,
        iteration: u64,
        stage: SceneStage,
    ) -> Result<SceneRefs, CollaboratorError> {
        let prefix = stage.prefix();
        let color_path = self.root.join(format!("{prefix}color_{iteration:06}.png"));
        let depth_path = self.root.join(format!("{prefix}depth_{iteration:06}.json"));

        observation
            .color
            .save(&color_path)
            .map_err(|e| CollaboratorError::SceneDecode {
                path: color_path.clone(),
                reason: e.to_string(),
            })?;
        let depth_file = DepthFile {
            depth: observation.depth.clone(),
            points: observation.points.clone(),
        };
        let bytes =
            serde_json::to_vec(&depth_file).map_err(|e| CollaboratorError::SceneDecode {
                path: depth_path.clone(),
                reason: e.to_string(),
            })?;
        fs::write(&depth_path, bytes).map_err(|e| Self::io_error(&depth_path, e))?;

        Ok(SceneRefs {
            color: color_path,
            depth: depth_path,
        })
    }

    async fn load(&mut self, refs: &SceneRefs) -> Result<(RgbImage, ValueGrid), CollaboratorError> {
        let color = image::open(&refs.color)
            .map_err(|e| CollaboratorError::SceneDecode {
                path: refs.color.clone(),
                reason: e.to_string(),
            })?
            .to_rgb8();
        let bytes = fs::read(&refs.depth).map_err(|e| Self::io_error(&refs.depth, e))?;
        let depth_file: DepthFile =
            serde_json::from_slice(&bytes).map_err(|e| CollaboratorError::SceneDecode {
                path: refs.depth.clone(),
                reason: e.to_string(),
            })?;
        Ok((color, depth_file.depth))
    }
}
