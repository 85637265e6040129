use crate::pipeline::orchestration::epsilon::EpsilonSchedule;
use crate::pipeline::types::{ActionFamily, AffordanceMaps, PixelIndex};
use rand::Rng;
use std::f32::consts::{FRAC_PI_2, PI};

/// Fixed table of K equally spaced grasp orientations covering 180°,
/// starting at -90°. Suction carries no rotation.
#[derive(Debug, Clone)]
pub struct GraspAngleTable {
    angles: Vec<f32>,
}

impl GraspAngleTable {
    pub fn new(orientations: usize) -> Self {
        assert!(orientations > 0, "at least one grasp orientation");
        let angles = (0..orientations)
            .map(|i| -FRAC_PI_2 + i as f32 * PI / orientations as f32)
            .collect();
        Self { angles }
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn angle(&self, rotation_index: usize) -> f32 {
        self.angles[rotation_index]
    }
}

/// One selected action over the affordance maps.
#[derive(Debug, Clone)]
pub struct Selection {
    pub pixel: PixelIndex,
    pub family: ActionFamily,
    /// Gripper rotation, radians; 0 for suction.
    pub angle: f32,
    pub explored: bool,
    /// Standardized map value at the selected pixel.
    pub value: f32,
}

/// ε-greedy selection over the stacked per-head value maps. Maps are
/// standardized in place before comparison so no head dominates on scale
/// alone.
pub struct ActionSelector {
    schedule: EpsilonSchedule,
    angles: GraspAngleTable,
}

impl ActionSelector {
    pub fn new(schedule: EpsilonSchedule, angles: GraspAngleTable) -> Self {
        Self { schedule, angles }
    }

    pub fn epsilon_at(&self, step: u64) -> f32 {
        self.schedule.value(step)
    }

    /// Select an action. With `explore` unset (evaluation) this is the
    /// plain joint argmax; otherwise a coin weighted by the ε schedule
    /// picks a uniform random head/cell instead.
    pub fn select(&self, maps: &mut AffordanceMaps, step: u64, explore: bool) -> Selection {
        maps.standardize_all();
        if explore {
            let epsilon = self.schedule.value(step);
            let mut rng = rand::rng();
            if rng.random::<f32>() < epsilon {
                let pixel = PixelIndex::new(
                    rng.random_range(0..maps.head_count()),
                    rng.random_range(0..maps.rows()),
                    rng.random_range(0..maps.cols()),
                );
                let value = maps.head(pixel.head).get(pixel.row, pixel.col);
                return self.resolve(pixel, value, true);
            }
        }
        let (pixel, value) = maps.argmax();
        self.resolve(pixel, value, false)
    }

    fn resolve(&self, pixel: PixelIndex, value: f32, explored: bool) -> Selection {
        let family = pixel.family();
        let angle = match pixel.rotation_index() {
            Some(rotation) => self.angles.angle(rotation),
            None => 0.0,
        };
        Selection {
            pixel,
            family,
            angle,
            explored,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ValueGrid;

    fn selector(initial: f32) -> ActionSelector {
        ActionSelector::new(
            EpsilonSchedule::new(initial, 0.998, initial.min(0.1)),
            GraspAngleTable::new(4),
        )
    }

    fn maps_with_peak() -> AffordanceMaps {
        // Peak on the second grasp head at (1, 2).
        let flat = || ValueGrid::from_vec(2, 4, vec![0.1; 8]);
        let mut peak = ValueGrid::from_vec(2, 4, vec![0.1; 8]);
        peak.set(1, 2, 9.0);
        AffordanceMaps::new(vec![flat(), flat(), flat(), peak])
    }

    #[test]
    fn greedy_selection_finds_the_peak_and_its_angle() {
        let selection = selector(0.0).select(&mut maps_with_peak(), 0, false);
        assert_eq!(selection.pixel, PixelIndex::new(3, 1, 2));
        assert_eq!(selection.family, ActionFamily::Grasp);
        assert!(!selection.explored);
        // Head 3 is grasp orientation 1: -90° + 45°.
        assert!((selection.angle - (-FRAC_PI_2 + PI / 4.0)).abs() < 1e-6);
    }

    #[test]
    fn suction_selection_has_zero_angle() {
        let mut peak = ValueGrid::from_vec(2, 2, vec![0.0; 4]);
        peak.set(0, 1, 5.0);
        let mut maps = AffordanceMaps::new(vec![peak, ValueGrid::zeros(2, 2)]);
        let selection = selector(0.0).select(&mut maps, 0, false);
        assert_eq!(selection.family, ActionFamily::SuctionA);
        assert_eq!(selection.angle, 0.0);
    }

    #[test]
    fn zero_epsilon_never_explores() {
        let selector = ActionSelector::new(
            EpsilonSchedule::new(0.0, 0.5, 0.0),
            GraspAngleTable::new(4),
        );
        for _ in 0..50 {
            let selection = selector.select(&mut maps_with_peak(), 0, true);
            assert!(!selection.explored);
            assert_eq!(selection.pixel, PixelIndex::new(3, 1, 2));
        }
    }

    #[test]
    fn saturated_epsilon_always_explores_in_bounds() {
        let selector = ActionSelector::new(
            EpsilonSchedule::new(1.0, 0.998, 1.0),
            GraspAngleTable::new(4),
        );
        for _ in 0..50 {
            let mut maps = maps_with_peak();
            let selection = selector.select(&mut maps, 0, true);
            assert!(selection.explored);
            assert!(selection.pixel.head < maps.head_count());
            assert!(selection.pixel.row < maps.rows());
            assert!(selection.pixel.col < maps.cols());
        }
    }

    #[test]
    fn angle_table_spans_180_degrees() {
        let table = GraspAngleTable::new(4);
        let expected = [-FRAC_PI_2, -FRAC_PI_2 + PI / 4.0, 0.0, PI / 4.0];
        for (i, angle) in expected.iter().enumerate() {
            assert!((table.angle(i) - angle).abs() < 1e-6);
        }
    }
}
