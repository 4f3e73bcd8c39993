//! Normal-Inverse-Wishart prior over class parameters
//!
//! The NIW is conjugate to a Gaussian with unknown mean and covariance, so
//! it serves both as the base measure new classes are drawn from and as the
//! posterior over one class's `(mean, covariance)` given the weight vectors
//! of the tasks assigned to it.

use std::f64::consts::PI;
use std::sync::OnceLock;

use hbrl_core::{RLError, Result};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use statrs::function::gamma::ln_gamma;

use crate::class_model::ClassModel;
use crate::sampling::{bartlett_factor, gaussian_from_cholesky};

/// `ln Γ_d(a) = d(d-1)/4 · ln π + Σ_{i<d} ln Γ(a - i/2)`
#[must_use]
pub fn ln_multivariate_gamma(a: f64, d: usize) -> f64 {
    let d_f = d as f64;
    (0..d).fold(0.25 * d_f * (d_f - 1.0) * PI.ln(), |acc, i| {
        acc + ln_gamma(a - 0.5 * i as f64)
    })
}

fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    (matrix + matrix.transpose()) * 0.5
}

/// Normal-Inverse-Wishart distribution `NIW(μ, λ, ν, Ψ)`
#[derive(Debug, Clone)]
pub struct NormalInverseWishart {
    mu: DVector<f64>,
    lambda: f64,
    nu: f64,
    psi: DMatrix<f64>,
    inv_psi: DMatrix<f64>,
    /// Lower Cholesky factor of `Ψ⁻¹`
    cholesky: DMatrix<f64>,
    ln_det_psi: f64,
    norm: OnceLock<f64>,
    log_norm: OnceLock<f64>,
}

impl NormalInverseWishart {
    /// Create a distribution. Requires `λ > 0`, `ν > d + 1` and a
    /// positive-definite `d x d` scale matrix.
    pub fn new(mu: DVector<f64>, lambda: f64, nu: f64, psi: DMatrix<f64>) -> Result<Self> {
        let d = mu.len();
        if psi.shape() != (d, d) {
            return Err(RLError::ShapeMismatch {
                expected: (d, d),
                actual: psi.shape(),
            });
        }
        if !(lambda > 0.0) {
            return Err(RLError::InvalidParameter(format!(
                "NIW lambda must be positive, got {lambda}"
            )));
        }
        if !(nu > d as f64 + 1.0) {
            return Err(RLError::InvalidParameter(format!(
                "NIW degrees of freedom must exceed {}, got {nu}",
                d + 1
            )));
        }

        let psi_cholesky = psi
            .clone()
            .cholesky()
            .ok_or_else(|| RLError::NotPositiveDefinite("NIW scale matrix".into()))?;
        let ln_det_psi = 2.0 * psi_cholesky.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        let inv_psi = symmetrize(&psi_cholesky.inverse());
        let cholesky = inv_psi
            .clone()
            .cholesky()
            .ok_or_else(|| RLError::NotPositiveDefinite("inverse NIW scale matrix".into()))?
            .l();

        Ok(Self {
            mu,
            lambda,
            nu,
            psi,
            inv_psi,
            cholesky,
            ln_det_psi,
            norm: OnceLock::new(),
            log_norm: OnceLock::new(),
        })
    }

    /// Dimension of the mean vectors
    #[must_use]
    pub fn dim(&self) -> usize {
        self.mu.len()
    }

    /// Location `μ`
    #[must_use]
    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    /// Pseudo-count `λ`
    #[must_use]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Degrees of freedom `ν`
    #[must_use]
    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// Scale matrix `Ψ`
    #[must_use]
    pub fn psi(&self) -> &DMatrix<f64> {
        &self.psi
    }

    /// `Ψ⁻¹`
    #[must_use]
    pub fn inv_psi(&self) -> &DMatrix<f64> {
        &self.inv_psi
    }

    /// Normalising constant of the inverse-Wishart part.
    ///
    /// Underflows for moderate dimensions; prefer [`Self::get_log_norm`].
    pub fn get_norm(&self) -> f64 {
        *self.norm.get_or_init(|| self.get_log_norm().exp())
    }

    /// `(ν/2) ln|Ψ| − (νd/2) ln 2 − ln Γ_d(ν/2)`
    pub fn get_log_norm(&self) -> f64 {
        *self.log_norm.get_or_init(|| {
            let d = self.dim() as f64;
            0.5 * self.nu * self.ln_det_psi
                - 0.5 * self.nu * d * std::f64::consts::LN_2
                - ln_multivariate_gamma(0.5 * self.nu, self.dim())
        })
    }

    /// Joint density of a `(mean, covariance)` pair. Likely to underflow;
    /// prefer [`Self::log_likelihood`].
    pub fn likelihood(&self, mean: &DVector<f64>, cov: &DMatrix<f64>) -> Result<f64> {
        Ok(self.log_likelihood(mean, cov)?.exp())
    }

    /// Log joint density of a `(mean, covariance)` pair, `(2π)^{-d/2}` dropped
    pub fn log_likelihood(&self, mean: &DVector<f64>, cov: &DMatrix<f64>) -> Result<f64> {
        let d = self.dim();
        if mean.len() != d {
            return Err(RLError::DimensionMismatch {
                expected: d,
                actual: mean.len(),
            });
        }
        if cov.shape() != (d, d) {
            return Err(RLError::ShapeMismatch {
                expected: (d, d),
                actual: cov.shape(),
            });
        }

        let cov_cholesky = cov
            .clone()
            .cholesky()
            .ok_or_else(|| RLError::NotPositiveDefinite("NIW covariance argument".into()))?;
        let ln_det_cov = 2.0 * cov_cholesky.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        let inv_cov = cov_cholesky.inverse();
        let d_f = d as f64;

        // mean ~ N(μ, Σ/λ)
        let diff = mean - &self.mu;
        let normal = -0.5 * (ln_det_cov - d_f * self.lambda.ln())
            - 0.5 * self.lambda * diff.dot(&(&inv_cov * &diff));

        // Σ ~ IW(Ψ, ν)
        let inv_wishart = -0.5 * (self.nu + d_f + 1.0) * ln_det_cov
            - 0.5 * (&self.psi * &inv_cov).trace()
            + self.get_log_norm();

        Ok(normal + inv_wishart)
    }

    /// Wishart draw with scale `Ψ⁻¹` via the Bartlett decomposition
    fn wishart_sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<DMatrix<f64>> {
        let a = bartlett_factor(self.dim(), self.nu, rng)?;
        let la = &self.cholesky * a;
        Ok(&la * la.transpose())
    }

    /// Draw `(mean, covariance)`
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(DVector<f64>, DMatrix<f64>)> {
        let wishart = self.wishart_sample(rng)?;
        let sigma = symmetrize(
            &wishart
                .cholesky()
                .ok_or_else(|| RLError::Computation("singular Wishart draw".into()))?
                .inverse(),
        );
        let mean_cov = &sigma / self.lambda;
        let lower = mean_cov
            .cholesky()
            .ok_or_else(|| RLError::NotPositiveDefinite("sampled NIW covariance".into()))?
            .l();
        let mean = gaussian_from_cholesky(&self.mu, &lower, rng);
        Ok((mean, sigma))
    }

    /// Draw a whole class with the given id
    pub fn sample_class<R: Rng + ?Sized>(&self, class_id: usize, rng: &mut R) -> Result<ClassModel> {
        let (mean, covariance) = self.sample(rng)?;
        ClassModel::new(class_id, mean, covariance)
    }

    /// Conjugate posterior given observed mean vectors.
    ///
    /// An empty observation set returns the prior unchanged.
    pub fn posterior(&self, data: &[DVector<f64>]) -> Result<Self> {
        let n = data.len();
        if n == 0 {
            return Ok(self.clone());
        }
        let d = self.dim();
        if let Some(bad) = data.iter().find(|x| x.len() != d) {
            return Err(RLError::DimensionMismatch {
                expected: d,
                actual: bad.len(),
            });
        }

        let n_f = n as f64;
        let mean_data = data.iter().fold(DVector::zeros(d), |acc, x| acc + x) / n_f;
        let sum_squares = data.iter().fold(DMatrix::zeros(d, d), |acc, x| {
            let dev = x - &mean_data;
            acc + &dev * dev.transpose()
        });
        if sum_squares.shape() != (d, d) {
            return Err(RLError::ShapeMismatch {
                expected: (d, d),
                actual: sum_squares.shape(),
            });
        }

        let shift = &mean_data - &self.mu;
        let mu_n = (&self.mu * self.lambda + &mean_data * n_f) / (self.lambda + n_f);
        let lambda_n = self.lambda + n_f;
        let nu_n = self.nu + n_f;
        let psi_n = &self.psi
            + sum_squares
            + (&shift * shift.transpose()) * (self.lambda * n_f / (self.lambda + n_f));

        Self::new(mu_n, lambda_n, nu_n, symmetrize(&psi_n))
    }

    /// Draw `(mean, covariance)` from the posterior given observed means
    pub fn sample_posterior<R: Rng + ?Sized>(
        &self,
        data: &[DVector<f64>],
        rng: &mut R,
    ) -> Result<(DVector<f64>, DMatrix<f64>)> {
        self.posterior(data)?.sample(rng)
    }
}
