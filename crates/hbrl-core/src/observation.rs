//! Per-task observation logs and their regression statistics

use nalgebra::{DMatrix, DVector};

use crate::{RLError, Result, StateFeatures};

/// Sufficient statistics of a linear-Gaussian observation set:
/// `XᵀX`, `Xᵀy` and the number of rows folded in
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionStats {
    xtx: DMatrix<f64>,
    xty: DVector<f64>,
    count: usize,
}

impl RegressionStats {
    /// Statistics of an empty observation set
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            xtx: DMatrix::zeros(dim, dim),
            xty: DVector::zeros(dim),
            count: 0,
        }
    }

    /// Compute statistics from a design matrix (one row per observation) and
    /// its reward vector
    pub fn from_observations(states: &DMatrix<f64>, rewards: &DVector<f64>) -> Result<Self> {
        if states.nrows() != rewards.len() {
            return Err(RLError::DimensionMismatch {
                expected: states.nrows(),
                actual: rewards.len(),
            });
        }
        let xt = states.transpose();
        Ok(Self {
            xtx: &xt * states,
            xty: &xt * rewards,
            count: states.nrows(),
        })
    }

    /// Fold one observation in
    pub fn push(&mut self, state: &StateFeatures, reward: f64) {
        self.xtx.ger(1.0, state, state, 1.0);
        self.xty.axpy(reward, state, 1.0);
        self.count += 1;
    }

    /// Feature dimension
    #[must_use]
    pub fn dim(&self) -> usize {
        self.xty.len()
    }

    /// Number of observations folded in
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether no observation has been folded in
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `XᵀX`
    #[must_use]
    pub fn xtx(&self) -> &DMatrix<f64> {
        &self.xtx
    }

    /// `Xᵀy`
    #[must_use]
    pub fn xty(&self) -> &DVector<f64> {
        &self.xty
    }
}

/// Ordered, append-only log of `(state features, reward)` pairs for one task
#[derive(Debug, Clone)]
pub struct ObservationLog {
    states: Vec<StateFeatures>,
    rewards: Vec<f64>,
    stats: RegressionStats,
}

impl ObservationLog {
    /// Create an empty log for feature vectors of length `dim`
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            states: Vec::new(),
            rewards: Vec::new(),
            stats: RegressionStats::new(dim),
        }
    }

    /// Append an observation
    pub fn push(&mut self, state: StateFeatures, reward: f64) -> Result<()> {
        if state.len() != self.dim() {
            return Err(RLError::DimensionMismatch {
                expected: self.dim(),
                actual: state.len(),
            });
        }
        self.stats.push(&state, reward);
        self.states.push(state);
        self.rewards.push(reward);
        Ok(())
    }

    /// Forget every observation
    pub fn clear(&mut self) {
        let dim = self.dim();
        self.states.clear();
        self.rewards.clear();
        self.stats = RegressionStats::new(dim);
    }

    /// Feature dimension
    #[must_use]
    pub fn dim(&self) -> usize {
        self.stats.dim()
    }

    /// Number of observations
    #[must_use]
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Check if the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Observed state features, in arrival order
    #[must_use]
    pub fn states(&self) -> &[StateFeatures] {
        &self.states
    }

    /// Observed rewards, in arrival order
    #[must_use]
    pub fn rewards(&self) -> &[f64] {
        &self.rewards
    }

    /// Running regression statistics over the whole log
    #[must_use]
    pub fn stats(&self) -> &RegressionStats {
        &self.stats
    }

    /// Design matrix with one row per observation
    #[must_use]
    pub fn design_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.len(), self.dim(), |i, j| self.states[i][j])
    }

    /// Rewards as a column vector
    #[must_use]
    pub fn reward_vector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.rewards)
    }

    /// Iterate over `(state, reward)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&StateFeatures, f64)> + '_ {
        self.states.iter().zip(self.rewards.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_push_rejects_wrong_dimension() {
        let mut log = ObservationLog::new(3);
        let err = log.push(DVector::zeros(2), 1.0).unwrap_err();
        assert!(matches!(
            err,
            RLError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn test_clear_resets_stats() {
        let mut log = ObservationLog::new(2);
        log.push(DVector::from_vec(vec![1.0, 0.0]), -1.0).unwrap();
        log.clear();
        assert!(log.is_empty());
        assert!(log.stats().is_empty());
        assert_eq!(log.stats().xtx(), &DMatrix::<f64>::zeros(2, 2));
        assert_eq!(log.dim(), 2);
    }

    #[test]
    fn test_stats_shape_mismatch() {
        let states = DMatrix::<f64>::zeros(3, 2);
        let rewards = DVector::<f64>::zeros(2);
        assert!(RegressionStats::from_observations(&states, &rewards).is_err());
    }

    proptest! {
        #[test]
        fn prop_running_stats_match_batch(
            rows in prop::collection::vec((prop::collection::vec(-2.0f64..2.0, 4), -5.0f64..5.0), 0..20)
        ) {
            let mut log = ObservationLog::new(4);
            for (state, reward) in &rows {
                log.push(DVector::from_vec(state.clone()), *reward).unwrap();
            }
            let batch = RegressionStats::from_observations(&log.design_matrix(), &log.reward_vector()).unwrap();
            prop_assert_eq!(batch.count(), log.stats().count());
            for (a, b) in batch.xtx().iter().zip(log.stats().xtx().iter()) {
                prop_assert!((a - b).abs() < 1e-9);
            }
            for (a, b) in batch.xty().iter().zip(log.stats().xty().iter()) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_design_matrix_rows() {
        let mut log = ObservationLog::new(2);
        log.push(DVector::from_vec(vec![1.0, 2.0]), 0.5).unwrap();
        log.push(DVector::from_vec(vec![3.0, 4.0]), -0.5).unwrap();
        let x = log.design_matrix();
        assert_eq!(x.shape(), (2, 2));
        assert_relative_eq!(x[(1, 0)], 3.0);
        assert_relative_eq!(log.reward_vector()[1], -0.5);
        assert_relative_eq!(log.stats().xty()[0], 1.0 * 0.5 - 3.0 * 0.5);
    }
}
