//! Random draws shared by the samplers

use hbrl_core::{RLError, Result};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal, WeightedIndex};

/// Floor applied before taking the logarithm of a probability or density
pub const LOG_FLOOR: f64 = 1e-300;

/// `ln(max(x, LOG_FLOOR))`; NaN is treated as zero mass
#[must_use]
pub fn floored_ln(x: f64) -> f64 {
    if x.is_nan() {
        return LOG_FLOOR.ln();
    }
    x.max(LOG_FLOOR).ln()
}

/// Same floor as [`floored_ln`], applied to a value already in log space
#[must_use]
pub fn floored_log(log_value: f64) -> f64 {
    if log_value.is_nan() {
        return LOG_FLOOR.ln();
    }
    log_value.max(LOG_FLOOR.ln())
}

/// Exponentiate log-weights after shifting by their maximum, so the largest
/// finite entry becomes 1. All-`-inf` input maps to all zeros.
#[must_use]
pub fn relative_weights(log_weights: &[f64]) -> Vec<f64> {
    let max = log_weights
        .iter()
        .copied()
        .filter(|l| l.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![0.0; log_weights.len()];
    }
    log_weights
        .iter()
        .map(|&l| if l.is_nan() { 0.0 } else { (l - max).exp() })
        .collect()
}

/// Draw an index with probability proportional to `weights`.
///
/// `partition` may carry a precomputed sum of the weights. When the sum is not
/// positive every index is equally likely. Infinite weights share all the mass
/// among themselves. Returns `None` only for an empty slice.
pub fn proportional_selection<R: Rng + ?Sized>(
    weights: &[f64],
    partition: Option<f64>,
    rng: &mut R,
) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }

    let infinite: Vec<usize> = weights
        .iter()
        .enumerate()
        .filter(|(_, w)| w.is_infinite() && w.is_sign_positive())
        .map(|(i, _)| i)
        .collect();
    if !infinite.is_empty() {
        return Some(infinite[rng.gen_range(0..infinite.len())]);
    }

    let partition = partition.unwrap_or_else(|| weights.iter().sum());
    if partition.is_nan() || partition <= 0.0 {
        tracing::trace!(candidates = weights.len(), "zero partition, selecting uniformly");
        return Some(rng.gen_range(0..weights.len()));
    }

    let clean = weights.iter().map(|w| if w.is_nan() { 0.0 } else { w.max(0.0) });
    match WeightedIndex::new(clean) {
        Ok(dist) => Some(dist.sample(rng)),
        Err(_) => Some(rng.gen_range(0..weights.len())),
    }
}

/// Vector of independent standard normal draws
pub fn standard_normal<R: Rng + ?Sized>(dim: usize, rng: &mut R) -> DVector<f64> {
    DVector::from_fn(dim, |_, _| StandardNormal.sample(rng))
}

/// Draw from `N(mean, L Lᵀ)` given the lower Cholesky factor `L`
pub fn gaussian_from_cholesky<R: Rng + ?Sized>(
    mean: &DVector<f64>,
    lower: &DMatrix<f64>,
    rng: &mut R,
) -> DVector<f64> {
    mean + lower * standard_normal(mean.len(), rng)
}

/// Draw from a chi-squared distribution with `k` degrees of freedom
pub fn chi_squared<R: Rng + ?Sized>(k: f64, rng: &mut R) -> Result<f64> {
    let dist = ChiSquared::new(k).map_err(|e| {
        RLError::InvalidParameter(format!("chi-squared degrees of freedom {k}: {e}"))
    })?;
    Ok(dist.sample(rng))
}

/// Lower-triangular Bartlett factor for a Wishart draw with `nu` degrees of
/// freedom: `sqrt(χ²(nu - i))` on the diagonal, standard normals below it
pub fn bartlett_factor<R: Rng + ?Sized>(dim: usize, nu: f64, rng: &mut R) -> Result<DMatrix<f64>> {
    let mut a = DMatrix::zeros(dim, dim);
    for i in 0..dim {
        for j in 0..=i {
            a[(i, j)] = if i == j {
                chi_squared(nu - i as f64, rng)?.sqrt()
            } else {
                StandardNormal.sample(rng)
            };
        }
    }
    Ok(a)
}
