use crate::cell::actuation::ActuationService;
use crate::cell::outcome::OutcomeChecker;
use crate::cell::perception::{PerceptionService, PointGrid, SceneObservation};
use crate::cell::scene_store::SceneRefs;
use crate::error::CollaboratorError;
use crate::pipeline::types::ValueGrid;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::sync::{Arc, Mutex};
use tracing::debug;

const FLOOR_Z: f32 = -0.02;
const CELL_SIZE: f32 = 0.01;

/// One pickable object on the simulated workspace grid.
#[derive(Debug, Clone)]
pub struct SimObject {
    pub row: usize,
    pub col: usize,
    /// Top surface height above the container floor, meters.
    pub height: f32,
}

/// Shared state behind the simulated perception/actuation/outcome
/// adapters. Locks are short and never held across an await.
pub struct SimWorld {
    rows: usize,
    cols: usize,
    objects: Vec<SimObject>,
    holding: bool,
}

impl SimWorld {
    fn observe(&self) -> SceneObservation {
        let mut depth = ValueGrid::zeros(self.rows, self.cols);
        for r in 0..self.rows {
            for c in 0..self.cols {
                depth.set(r, c, FLOOR_Z);
            }
        }
        let mut color = RgbImage::from_pixel(self.cols as u32, self.rows as u32, Rgb([60, 60, 60]));
        for object in &self.objects {
            depth.set(object.row, object.col, object.height);
            color.put_pixel(object.col as u32, object.row as u32, Rgb([200, 80, 40]));
        }
        let mut points = PointGrid::new(
            self.rows,
            self.cols,
            vec![[f32::NAN; 3]; self.rows * self.cols],
        );
        // The outermost ring stays NaN, as scan coverage does at the
        // container walls.
        for r in 1..self.rows.saturating_sub(1) {
            for c in 1..self.cols.saturating_sub(1) {
                points.set(r, c, [c as f32 * CELL_SIZE, r as f32 * CELL_SIZE, depth.get(r, c)]);
            }
        }
        SceneObservation {
            color,
            depth,
            points,
        }
    }

    fn try_pick(&mut self, position: [f32; 3]) {
        let near = self.objects.iter().position(|o| {
            let dx = o.col as f32 * CELL_SIZE - position[0];
            let dy = o.row as f32 * CELL_SIZE - position[1];
            (dx * dx + dy * dy).sqrt() <= CELL_SIZE * 0.75
        });
        match near {
            Some(index) => {
                self.objects.swap_remove(index);
                self.holding = true;
            }
            None => self.holding = false,
        }
    }
}

pub struct SimPerception(Arc<Mutex<SimWorld>>);
pub struct SimActuation(Arc<Mutex<SimWorld>>);
pub struct SimOutcome(Arc<Mutex<SimWorld>>);

/// Build one shared simulated world and the per-service adapters over it.
pub fn create_sim_cell(
    rows: usize,
    cols: usize,
    objects: Vec<SimObject>,
) -> (SimPerception, SimActuation, SimOutcome) {
    let world = Arc::new(Mutex::new(SimWorld {
        rows,
        cols,
        objects,
        holding: false,
    }));
    (
        SimPerception(world.clone()),
        SimActuation(world.clone()),
        SimOutcome(world),
    )
}

#[async_trait]
impl PerceptionService for SimPerception {
    async fn capture(&mut self) -> Result<SceneObservation, CollaboratorError> {
        Ok(self.0.lock().unwrap().observe())
    }
}

#[async_trait]
impl ActuationService for SimActuation {
    async fn execute(
        &mut self,
        tool_id: u8,
        position: [f32; 3],
        angle: f32,
    ) -> Result<(), CollaboratorError> {
        debug!(
            "Sim execute tool {} at ({:.3}, {:.3}, {:.3}) angle {:.2}",
            tool_id, position[0], position[1], position[2], angle
        );
        self.0.lock().unwrap().try_pick(position);
        Ok(())
    }

    async fn go_home(&mut self) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn go_place(&mut self) -> Result<(), CollaboratorError> {
        self.0.lock().unwrap().holding = false;
        Ok(())
    }

    async fn release_vacuum(&mut self) -> Result<(), CollaboratorError> {
        self.0.lock().unwrap().holding = false;
        Ok(())
    }
}

#[async_trait]
impl OutcomeChecker for SimOutcome {
    async fn check_suction_success(&mut self) -> Result<bool, CollaboratorError> {
        Ok(self.0.lock().unwrap().holding)
    }

    async fn check_grasp_success(
        &mut self,
        _before: &SceneRefs,
        _after: &SceneRefs,
        _position: [f32; 3],
    ) -> Result<bool, CollaboratorError> {
        Ok(self.0.lock().unwrap().holding)
    }

    async fn is_workspace_empty(&mut self, _points: &PointGrid) -> Result<bool, CollaboratorError> {
        Ok(self.0.lock().unwrap().objects.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::perception::position_is_valid;

    #[tokio::test]
    async fn picking_the_object_cell_empties_the_workspace() {
        let (mut perception, mut actuation, mut outcome) = create_sim_cell(
            8,
            8,
            vec![SimObject {
                row: 3,
                col: 4,
                height: 0.03,
            }],
        );
        let observation = perception.capture().await.unwrap();
        assert!(!outcome
            .is_workspace_empty(&observation.points)
            .await
            .unwrap());

        let position = observation.points.get(3, 4);
        assert!(position_is_valid(position));
        actuation.execute(3, position, 0.0).await.unwrap();
        assert!(outcome.check_suction_success().await.unwrap());
        actuation.go_place().await.unwrap();

        let next = perception.capture().await.unwrap();
        assert!(outcome.is_workspace_empty(&next.points).await.unwrap());
    }

    #[tokio::test]
    async fn missing_leaves_the_workspace_untouched() {
        let (mut perception, mut actuation, mut outcome) = create_sim_cell(
            8,
            8,
            vec![SimObject {
                row: 2,
                col: 2,
                height: 0.03,
            }],
        );
        let observation = perception.capture().await.unwrap();
        let miss = observation.points.get(6, 6);
        actuation.execute(3, miss, 0.0).await.unwrap();
        assert!(!outcome.check_suction_success().await.unwrap());
        assert!(!outcome
            .is_workspace_empty(&observation.points)
            .await
            .unwrap());
        // Floor cells sit below the contact threshold, object tops above.
        assert!(miss[2] < -0.017);
        assert!(observation.points.get(2, 2)[2] > -0.017);
    }

    #[test]
    fn border_cells_are_invalid_targets() {
        let world = SimWorld {
            rows: 4,
            cols: 4,
            objects: vec![],
            holding: false,
        };
        let observation = world.observe();
        assert!(!position_is_valid(observation.points.get(0, 0)));
        assert!(position_is_valid(observation.points.get(1, 1)));
    }
}
