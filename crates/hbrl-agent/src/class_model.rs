//! Multivariate Gaussian task classes
//!
//! A class is one cluster of tasks sharing a Gaussian distribution over
//! reward-weight vectors. Classes are immutable: every update (posterior,
//! re-indexing) produces a new value.

use hbrl_core::{RLError, RegressionStats, Result};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::sampling::gaussian_from_cholesky;

const QUAD_TOLERANCE: f64 = 1e-9;

/// Gaussian distribution over reward weights for one task class
#[derive(Debug, Clone)]
pub struct ClassModel {
    class_id: usize,
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    /// Cached inverse of `covariance`
    precision: DMatrix<f64>,
    /// Lower Cholesky factor of `covariance`
    lower: DMatrix<f64>,
    log_det: f64,
}

impl ClassModel {
    /// Create a class, failing when `covariance` is not positive-definite
    pub fn new(class_id: usize, mean: DVector<f64>, covariance: DMatrix<f64>) -> Result<Self> {
        let dim = mean.len();
        if covariance.shape() != (dim, dim) {
            return Err(RLError::ShapeMismatch {
                expected: (dim, dim),
                actual: covariance.shape(),
            });
        }
        let cholesky = covariance.clone().cholesky().ok_or_else(|| {
            RLError::NotPositiveDefinite(format!("covariance of class {class_id}"))
        })?;
        let lower = cholesky.l();
        let log_det = 2.0 * lower.diagonal().iter().map(|v| v.ln()).sum::<f64>();
        let precision = cholesky.inverse();

        Ok(Self {
            class_id,
            mean,
            covariance,
            precision,
            lower,
            log_det,
        })
    }

    /// Same distribution under a different id
    #[must_use]
    pub fn with_id(mut self, class_id: usize) -> Self {
        self.class_id = class_id;
        self
    }

    /// Class id; equals the class's position in its catalog
    #[must_use]
    pub fn class_id(&self) -> usize {
        self.class_id
    }

    /// Weight dimension
    #[must_use]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Mean weight vector
    #[must_use]
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// Weight covariance
    #[must_use]
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Inverse covariance
    #[must_use]
    pub fn precision(&self) -> &DMatrix<f64> {
        &self.precision
    }

    /// `(multiplier, exponent)` of the density, validated
    fn density_terms(&self, weights: &DVector<f64>) -> Result<(f64, f64)> {
        if weights.len() != self.dim() {
            return Err(RLError::DimensionMismatch {
                expected: self.dim(),
                actual: weights.len(),
            });
        }
        let diff = weights - &self.mean;
        let quad = diff.dot(&(&self.precision * &diff));
        let multiplier = (-0.5 * self.log_det).exp();
        let exponent = -0.5 * quad.max(0.0);
        // a clearly negative quadratic form means the cached precision is not PD
        if multiplier.is_nan() || multiplier < 0.0 || quad.is_nan() || quad < -QUAD_TOLERANCE {
            return Err(RLError::InvalidCovariance {
                multiplier,
                exponent: -0.5 * quad,
            });
        }
        Ok((multiplier, exponent))
    }

    /// Gaussian density of `weights` with the `(2π)^{-d/2}` constant dropped
    pub fn likelihood(&self, weights: &DVector<f64>) -> Result<f64> {
        let (multiplier, exponent) = self.density_terms(weights)?;
        Ok(multiplier * exponent.exp())
    }

    /// Log of [`ClassModel::likelihood`], computed without underflow
    pub fn log_likelihood(&self, weights: &DVector<f64>) -> Result<f64> {
        let (_, exponent) = self.density_terms(weights)?;
        Ok(-0.5 * self.log_det + exponent)
    }

    /// Draw a weight vector from this class
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        gaussian_from_cholesky(&self.mean, &self.lower, rng)
    }

    /// Conjugate posterior given a design matrix (one row per observation)
    /// and its rewards: `Λ' = Λ + XᵀX`, `μ' = Λ'⁻¹(Λμ + Xᵀy)`
    pub fn posterior(&self, states: &DMatrix<f64>, rewards: &DVector<f64>) -> Result<Self> {
        if states.nrows() > 0 && states.ncols() != self.dim() {
            return Err(RLError::DimensionMismatch {
                expected: self.dim(),
                actual: states.ncols(),
            });
        }
        if states.nrows() == 0 && rewards.is_empty() {
            return Ok(self.clone());
        }
        let stats = RegressionStats::from_observations(states, rewards)?;
        self.posterior_given(&stats)
    }

    /// Conjugate posterior from precomputed regression statistics
    pub fn posterior_given(&self, stats: &RegressionStats) -> Result<Self> {
        if stats.dim() != self.dim() {
            return Err(RLError::DimensionMismatch {
                expected: self.dim(),
                actual: stats.dim(),
            });
        }
        if stats.is_empty() {
            return Ok(self.clone());
        }

        let precision = &self.precision + stats.xtx();
        let cholesky = precision.cholesky().ok_or_else(|| {
            RLError::NotPositiveDefinite(format!("posterior precision of class {}", self.class_id))
        })?;
        let rhs = &self.precision * &self.mean + stats.xty();
        let mean = cholesky.solve(&rhs);
        let covariance = cholesky.inverse();
        let covariance = (&covariance + covariance.transpose()) * 0.5;

        Self::new(self.class_id, mean, covariance)
    }

    /// Draw weights from the posterior given observations
    pub fn sample_posterior<R: Rng + ?Sized>(
        &self,
        states: &DMatrix<f64>,
        rewards: &DVector<f64>,
        rng: &mut R,
    ) -> Result<DVector<f64>> {
        Ok(self.posterior(states, rewards)?.sample(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hbrl_core::ObservationLog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn class(mean: &[f64], diag: &[f64]) -> ClassModel {
        ClassModel::new(
            0,
            DVector::from_column_slice(mean),
            DMatrix::from_diagonal(&DVector::from_column_slice(diag)),
        )
        .unwrap()
    }

    #[test]
    fn test_likelihood_peaks_at_mean() {
        let c = class(&[1.0, -2.0, 0.5], &[0.5, 2.0, 1.0]);
        let peak = c.likelihood(c.mean()).unwrap();
        let bound = (-0.5 * (0.5f64 * 2.0 * 1.0).ln()).exp();
        assert_relative_eq!(peak, bound, epsilon = 1e-12);

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let w = c.sample(&mut rng);
            let l = c.likelihood(&w).unwrap();
            assert!(l >= 0.0);
            assert!(l <= peak);
        }
    }

    #[test]
    fn test_log_likelihood_matches_likelihood() {
        let c = class(&[0.0, 0.0], &[1.0, 4.0]);
        let w = DVector::from_vec(vec![0.3, -1.2]);
        assert_relative_eq!(
            c.log_likelihood(&w).unwrap(),
            c.likelihood(&w).unwrap().ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rejects_non_positive_definite() {
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let err = ClassModel::new(0, DVector::zeros(2), cov).unwrap_err();
        assert!(matches!(err, RLError::NotPositiveDefinite(_)));
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let err = ClassModel::new(0, DVector::zeros(2), DMatrix::identity(3, 3)).unwrap_err();
        assert!(matches!(err, RLError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_nan_weights_are_invalid() {
        let c = class(&[0.0], &[1.0]);
        let err = c.likelihood(&DVector::from_vec(vec![f64::NAN])).unwrap_err();
        assert!(matches!(err, RLError::InvalidCovariance { .. }));
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_empty_posterior_is_prior() {
        let c = class(&[1.0, 2.0], &[0.3, 0.7]);
        let post = c
            .posterior(&DMatrix::zeros(0, 2), &DVector::zeros(0))
            .unwrap();
        assert_relative_eq!(post.mean(), c.mean(), epsilon = 1e-12);
        assert_relative_eq!(post.covariance(), c.covariance(), epsilon = 1e-12);
    }

    #[test]
    fn test_scalar_posterior() {
        // prior N(0, 1), one observation x = 1, y = 2
        let c = class(&[0.0], &[1.0]);
        let x = DMatrix::from_row_slice(1, 1, &[1.0]);
        let y = DVector::from_vec(vec![2.0]);
        let post = c.posterior(&x, &y).unwrap();
        assert_relative_eq!(post.mean()[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(post.covariance()[(0, 0)], 0.5, epsilon = 1e-12);
        assert_eq!(post.class_id(), c.class_id());
    }

    #[test]
    fn test_posterior_from_stats_matches_matrix_form() {
        let c = class(&[0.5, -0.5, 1.0], &[2.0, 1.0, 0.5]);
        let mut log = ObservationLog::new(3);
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..25 {
            let mut s = DVector::zeros(3);
            s[i % 3] = 1.0;
            s[(i + 1) % 3] = rng.gen_range(0.0..1.0);
            log.push(s, rng.gen_range(-2.0..0.0)).unwrap();
        }
        let a = c.posterior(&log.design_matrix(), &log.reward_vector()).unwrap();
        let b = c.posterior_given(log.stats()).unwrap();
        assert_relative_eq!(a.mean(), b.mean(), epsilon = 1e-9);
        assert_relative_eq!(a.covariance(), b.covariance(), epsilon = 1e-9);
    }

    #[test]
    fn test_sample_mean_converges() {
        let c = class(&[3.0, -1.0], &[0.25, 0.25]);
        let mut rng = StdRng::seed_from_u64(5);
        let n = 4000;
        let mut acc = DVector::zeros(2);
        for _ in 0..n {
            acc += c.sample(&mut rng);
        }
        acc /= n as f64;
        assert_relative_eq!(acc, c.mean().clone(), epsilon = 0.05);
    }
}
