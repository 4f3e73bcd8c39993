//! Environment collaborator interface and episode bookkeeping

use chrono::{DateTime, Utc};
use ndarray::{s, Array3, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{Location, StateFeatures};

/// Read-only view of one task's grid, as consumed by the belief engine.
///
/// Dynamics and episode lifecycle stay with the environment; the agent only
/// needs the per-cell feature vectors and the goal to price cells.
pub trait TaskDomain {
    /// Grid width
    fn width(&self) -> usize;

    /// Grid height
    fn height(&self) -> usize;

    /// Goal cell
    fn goal(&self) -> Location;

    /// Feature grid indexed `[x, y, feature]`
    fn cell_states(&self) -> &Array3<f64>;

    /// Feature vector of one cell
    fn cell_state(&self, location: Location) -> ArrayView1<'_, f64> {
        self.cell_states().slice(s![location.x, location.y, ..])
    }

    /// Feature vector of one cell, converted to the inference vector type
    fn cell_features(&self, location: Location) -> StateFeatures {
        StateFeatures::from_iterator(
            self.feature_dim(),
            self.cell_state(location).iter().copied(),
        )
    }

    /// Length of each cell's feature vector
    fn feature_dim(&self) -> usize {
        self.cell_states().shape()[2]
    }
}

/// Episode information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Episode ID
    pub id: String,
    /// Task the episode ran in
    pub task: usize,
    /// Total reward
    pub total_reward: f64,
    /// Number of actions taken
    pub steps: usize,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time
    pub end_time: Option<DateTime<Utc>>,
}

impl EpisodeRecord {
    /// Open a record for a new episode of `task`
    #[must_use]
    pub fn start(task: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task,
            total_reward: 0.0,
            steps: 0,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Count one action
    pub fn record_step(&mut self) {
        self.steps += 1;
    }

    /// Accumulate a reward
    pub fn record_reward(&mut self, reward: f64) {
        self.total_reward += reward;
    }

    /// Close the record
    pub fn finish(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    /// Whether the episode has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Strip {
        cells: Array3<f64>,
    }

    impl TaskDomain for Strip {
        fn width(&self) -> usize {
            self.cells.shape()[0]
        }

        fn height(&self) -> usize {
            self.cells.shape()[1]
        }

        fn goal(&self) -> Location {
            Location::new(self.width() - 1, 0)
        }

        fn cell_states(&self) -> &Array3<f64> {
            &self.cells
        }
    }

    #[test]
    fn test_cell_features_follow_grid() {
        let cells = Array3::from_shape_fn((3, 1, 2), |(x, _, k)| (x * 10 + k) as f64);
        let strip = Strip { cells };
        assert_eq!(strip.feature_dim(), 2);
        let features = strip.cell_features(Location::new(2, 0));
        assert_eq!(features.as_slice(), &[20.0, 21.0]);
    }

    #[test]
    fn test_episode_record_lifecycle() {
        let mut record = EpisodeRecord::start(3);
        record.record_step();
        record.record_reward(-1.5);
        assert!(!record.is_finished());
        record.finish();
        let end = record.end_time;
        record.finish();
        assert_eq!(record.end_time, end);
        assert_eq!(record.steps, 1);
        assert_eq!(record.task, 3);
        assert!((record.total_reward + 1.5).abs() < f64::EPSILON);
    }
}
