use crate::error::ReplayError;
use crate::pipeline::learning::sum_tree::SumTree;
use crate::pipeline::types::Transition;
use rand::Rng;
use std::fs;
use std::path::Path;
use tracing::info;

/// Floor applied to every stored priority so no transition becomes
/// unsampleable.
pub const PRIORITY_FLOOR: f64 = 1e-2;

const BETA_INITIAL: f64 = 0.4;
const BETA_INCREMENT_PER_SAMPLE: f64 = 1e-3;

/// One drawn transition with its tree position and bias-correction
/// weight.
#[derive(Debug, Clone)]
pub struct SampledTransition {
    pub transition: Transition,
    pub leaf: usize,
    pub weight: f64,
}

/// Fixed-capacity transition store with priority-proportional sampling.
///
/// Slots form a circular array over the sum tree's leaves: once full the
/// oldest slot is overwritten, while sampling stays proportional to each
/// slot's current priority. Importance weights `(N·P(i))^(-β)` are
/// normalized by the batch maximum; β anneals toward 1 a little on every
/// sample call.
pub struct PriorityReplayBuffer {
    tree: SumTree,
    slots: Vec<Option<Transition>>,
    write: usize,
    len: usize,
    max_priority: f64,
    beta: f64,
}

impl PriorityReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            tree: SumTree::new(capacity),
            slots: (0..capacity).map(|_| None).collect(),
            write: 0,
            len: 0,
            max_priority: PRIORITY_FLOOR,
            beta: BETA_INITIAL,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_at_least(&self, count: usize) -> bool {
        self.len >= count
    }

    pub fn total_priority(&self) -> f64 {
        self.tree.total()
    }

    /// Transitions currently stored, oldest slot order not guaranteed.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Write into the next circular slot, evicting the oldest entry once
    /// at capacity, and propagate the (floored) priority into the tree.
    pub fn insert(&mut self, priority: f64, transition: Transition) {
        assert!(priority.is_finite(), "priority must be finite");
        let priority = priority.max(PRIORITY_FLOOR);
        self.max_priority = self.max_priority.max(priority);
        let slot = self.write;
        self.slots[slot] = Some(transition);
        self.tree.update(slot, priority);
        self.write = (self.write + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
    }

    /// Overwrite a previously sampled leaf's priority after its TD error
    /// was refreshed.
    pub fn update_priority(&mut self, leaf: usize, priority: f64) {
        assert!(priority.is_finite(), "priority must be finite");
        assert!(
            self.slots[leaf].is_some(),
            "priority update on an empty slot"
        );
        let priority = priority.max(PRIORITY_FLOOR);
        self.max_priority = self.max_priority.max(priority);
        self.tree.update(leaf, priority);
    }

    /// Stratified proportional draw: the total priority range is split
    /// into `batch_size` equal segments and one uniform value is drawn
    /// from each, keeping the batch spread across the priority mass.
    pub fn sample(&mut self, batch_size: usize) -> Result<Vec<SampledTransition>, ReplayError> {
        if batch_size == 0 || self.len < batch_size {
            return Err(ReplayError::Underflow {
                requested: batch_size,
                occupancy: self.len,
            });
        }
        self.beta = (self.beta + BETA_INCREMENT_PER_SAMPLE).min(1.0);

        let total = self.tree.total();
        let segment = total / batch_size as f64;
        let mut rng = rand::rng();
        let mut batch = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let low = segment * i as f64;
            // The exclusive upper bound keeps every drawn value inside
            // [0, total) even when the multiply rounds up.
            let high = (segment * (i + 1) as f64).min(total);
            let value = rng.random_range(low..high);
            let (leaf, priority) = self.tree.find(value);
            let transition = self.slots[leaf]
                .clone()
                .expect("proportional draw landed on an empty slot");
            let probability = priority / total;
            let weight = (self.len as f64 * probability).powf(-self.beta);
            batch.push(SampledTransition {
                transition,
                leaf,
                weight,
            });
        }
        let max_weight = batch.iter().map(|s| s.weight).fold(f64::MIN, f64::max);
        for sampled in &mut batch {
            sampled.weight /= max_weight;
        }
        Ok(batch)
    }

    /// Serialize the stored transitions (the tree is reconstructable) in
    /// insertion order, oldest first.
    pub fn persist(&self, path: &Path) -> Result<(), ReplayError> {
        let mut ordered = Vec::with_capacity(self.len);
        let start = if self.len == self.capacity() {
            self.write
        } else {
            0
        };
        for offset in 0..self.len {
            let slot = (start + offset) % self.capacity();
            if let Some(transition) = &self.slots[slot] {
                ordered.push(transition.clone());
            }
        }
        let bytes = serde_json::to_vec_pretty(&ordered)?;
        fs::write(path, bytes).map_err(ReplayError::Persist)?;
        info!("Persisted {} transitions to {}", ordered.len(), path.display());
        Ok(())
    }

    /// Rebuild from persisted transitions. Historical TD errors are not
    /// preserved, so every entry re-enters with the maximal seen priority
    /// and earns a real one on its next sampled update.
    pub fn restore(&mut self, path: &Path) -> Result<usize, ReplayError> {
        let bytes = fs::read(path).map_err(ReplayError::Restore)?;
        let transitions: Vec<Transition> = serde_json::from_slice(&bytes)?;
        let count = transitions.len();
        for transition in transitions {
            self.insert(self.max_priority, transition);
        }
        info!("Restored {} transitions from {}", count, path.display());
        Ok(count)
    }
}
