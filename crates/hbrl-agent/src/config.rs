//! Agent configuration

use std::path::Path;

use hbrl_core::{feature_dim, RLError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::niw::NormalInverseWishart;

/// Chain length, burn-in and thinning for both samplers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McmcConfig {
    /// Iterations discarded before recording
    pub burn_in: usize,
    /// Total iterations per update
    pub samples: usize,
    /// Record every `thin`-th iteration after burn-in
    pub thin: usize,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            burn_in: 100,
            samples: 500,
            thin: 1,
        }
    }
}

impl McmcConfig {
    /// Whether iteration `i` is recorded
    #[must_use]
    pub fn records(&self, iteration: usize) -> bool {
        iteration >= self.burn_in && (iteration - self.burn_in) % self.thin == 0
    }

    /// Number of iterations recorded per update
    #[must_use]
    pub fn recorded(&self) -> usize {
        (0..self.samples).filter(|&i| self.records(i)).count()
    }

    fn validate(&self) -> Result<()> {
        if self.thin == 0 {
            return Err(RLError::InvalidParameter("thin must be at least 1".into()));
        }
        if self.samples <= self.burn_in {
            return Err(RLError::InvalidParameter(format!(
                "mcmc samples ({}) must exceed burn-in ({})",
                self.samples, self.burn_in
            )));
        }
        Ok(())
    }
}

/// Base Normal-Inverse-Wishart prior over class parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorConfig {
    /// Every entry of the prior mean weight vector
    pub mean: f64,
    /// Pseudo-count `λ`
    pub lambda: f64,
    /// `ν - D`; must exceed 1
    pub extra_degrees_of_freedom: f64,
    /// `Ψ = psi_scale · I`
    pub psi_scale: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            mean: 0.0,
            lambda: 0.1,
            extra_degrees_of_freedom: 2.0,
            psi_scale: 1.0,
        }
    }
}

impl PriorConfig {
    /// Build the base distribution for weight vectors of length `dim`
    pub fn distribution(&self, dim: usize) -> Result<NormalInverseWishart> {
        NormalInverseWishart::new(
            DVector::from_element(dim, self.mean),
            self.lambda,
            dim as f64 + self.extra_degrees_of_freedom,
            DMatrix::identity(dim, dim) * self.psi_scale,
        )
    }

    fn validate(&self) -> Result<()> {
        if !(self.lambda > 0.0) {
            return Err(RLError::InvalidParameter(format!(
                "prior lambda must be positive, got {}",
                self.lambda
            )));
        }
        if !(self.extra_degrees_of_freedom > 1.0) {
            return Err(RLError::InvalidParameter(format!(
                "prior needs more than D + 1 degrees of freedom, got D + {}",
                self.extra_degrees_of_freedom
            )));
        }
        if !(self.psi_scale > 0.0) {
            return Err(RLError::InvalidParameter(format!(
                "prior psi scale must be positive, got {}",
                self.psi_scale
            )));
        }
        Ok(())
    }
}

/// Multi-task agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTaskConfig {
    /// Palette size of the grid domains
    pub num_colors: usize,
    /// Standard deviation of reward noise
    pub reward_stdev: f64,
    /// Auxiliary classes `m` offered per MCMC iteration
    pub num_auxiliary_classes: usize,
    /// Dirichlet-process concentration
    pub alpha: f64,
    /// Actions between policy recomputations
    pub steps_per_policy: usize,
    /// Chain settings
    #[serde(default)]
    pub mcmc: McmcConfig,
    /// Base prior settings
    #[serde(default)]
    pub prior: PriorConfig,
    /// Seed for the agent's random source; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MultiTaskConfig {
    fn default() -> Self {
        Self {
            num_colors: 2,
            reward_stdev: 0.3,
            num_auxiliary_classes: 2,
            alpha: 0.5,
            steps_per_policy: 10,
            mcmc: McmcConfig::default(),
            prior: PriorConfig::default(),
            seed: None,
        }
    }
}

impl MultiTaskConfig {
    /// Length of reward-weight vectors
    #[must_use]
    pub fn weights_size(&self) -> usize {
        feature_dim(self.num_colors)
    }

    /// Check every parameter
    pub fn validate(&self) -> Result<()> {
        if self.num_colors == 0 {
            return Err(RLError::InvalidParameter("num_colors must be positive".into()));
        }
        if !(self.reward_stdev > 0.0) {
            return Err(RLError::InvalidParameter(format!(
                "reward_stdev must be positive, got {}",
                self.reward_stdev
            )));
        }
        if self.num_auxiliary_classes == 0 {
            return Err(RLError::InvalidParameter(
                "at least one auxiliary class is required".into(),
            ));
        }
        if !(self.alpha > 0.0) {
            return Err(RLError::InvalidParameter(format!(
                "alpha must be positive, got {}",
                self.alpha
            )));
        }
        if self.steps_per_policy == 0 {
            return Err(RLError::InvalidParameter("steps_per_policy must be positive".into()));
        }
        self.mcmc.validate()?;
        self.prior.validate()
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Base distribution over class parameters
    pub fn base_distribution(&self) -> Result<NormalInverseWishart> {
        self.prior.distribution(self.weights_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = MultiTaskConfig::default();
        config.validate().unwrap();
        assert_eq!(config.weights_size(), 10);
        let base = config.base_distribution().unwrap();
        assert_eq!(base.nu(), 12.0);
    }

    #[test]
    fn test_records_after_burn_in() {
        let mcmc = McmcConfig {
            burn_in: 3,
            samples: 10,
            thin: 3,
        };
        let recorded: Vec<_> = (0..mcmc.samples).filter(|&i| mcmc.records(i)).collect();
        assert_eq!(recorded, vec![3, 6, 9]);
        assert_eq!(mcmc.recorded(), 3);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = MultiTaskConfig::default();
        config.mcmc.thin = 0;
        assert!(config.validate().is_err());

        let mut config = MultiTaskConfig::default();
        config.mcmc.samples = config.mcmc.burn_in;
        assert!(config.validate().is_err());

        let mut config = MultiTaskConfig::default();
        config.prior.extra_degrees_of_freedom = 1.0;
        assert!(config.validate().is_err());

        let mut config = MultiTaskConfig::default();
        config.num_auxiliary_classes = 0;
        assert!(config.validate().is_err());

        let mut config = MultiTaskConfig::default();
        config.alpha = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let json = r#"{
            "num_colors": 3,
            "reward_stdev": 0.5,
            "num_auxiliary_classes": 4,
            "alpha": 1.0,
            "steps_per_policy": 5,
            "seed": 42
        }"#;
        let config = MultiTaskConfig::from_json_str(json).unwrap();
        assert_eq!(config.num_colors, 3);
        assert_eq!(config.mcmc, McmcConfig::default());
        assert_eq!(config.seed, Some(42));

        let bad = r#"{ "num_colors": 0, "reward_stdev": 0.5, "num_auxiliary_classes": 4,
                       "alpha": 1.0, "steps_per_policy": 5 }"#;
        assert!(matches!(
            MultiTaskConfig::from_json_str(bad).unwrap_err(),
            RLError::InvalidParameter(_)
        ));
    }
}
