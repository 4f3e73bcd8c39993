//! Within-task reward inference
//!
//! [`LinearGaussianRewardModel`] collects `(state, reward)` observations for
//! the active task and, on every [`update_beliefs`](LinearGaussianRewardModel::update_beliefs),
//! runs a short MCMC chain that alternates between choosing a class for the
//! task (catalog classes weighted by occupancy, fresh auxiliaries weighted by
//! `alpha / m`) and drawing a weight vector from that class's posterior. The
//! highest-scoring recorded sample is kept.

use hbrl_core::{ObservationLog, RLError, RegressionStats, Result, StateFeatures};
use nalgebra::DVector;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{CandidateClass, ClassKind};
use crate::class_model::ClassModel;
use crate::config::{McmcConfig, MultiTaskConfig};
use crate::niw::NormalInverseWishart;
use crate::sampling::{floored_ln, floored_log, proportional_selection, relative_weights};

/// Outcome of one within-task update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSummary {
    /// Recorded samples per candidate index (catalog classes, then auxiliaries)
    pub histogram: Vec<usize>,
    /// Candidate the chain started from
    pub initial: usize,
    /// Candidate of the accepted sample
    pub selected: usize,
    /// Whether the accepted class differs from the starting one
    pub switched: bool,
    /// Score of the accepted sample
    pub log_likelihood: f64,
}

/// Bayesian linear-Gaussian reward model for the active task
#[derive(Debug, Clone)]
pub struct LinearGaussianRewardModel {
    classes: Vec<ClassModel>,
    counts: Vec<f64>,
    auxiliary_distribution: NormalInverseWishart,
    auxiliaries: Vec<ClassModel>,
    observations: ObservationLog,
    alpha: f64,
    num_auxiliary: usize,
    mcmc: McmcConfig,
    map_class: CandidateClass,
    weights: DVector<f64>,
}

impl LinearGaussianRewardModel {
    /// Build a model over a class catalog.
    ///
    /// `counts[i]` is the prior weight of `classes[i]`. The starting class is
    /// drawn from the catalog plus `m` auxiliaries and the starting weights
    /// from that class.
    pub fn new<R: Rng + ?Sized>(
        config: &MultiTaskConfig,
        classes: Vec<ClassModel>,
        counts: Vec<f64>,
        auxiliary_distribution: NormalInverseWishart,
        rng: &mut R,
    ) -> Result<Self> {
        if classes.len() != counts.len() {
            return Err(RLError::DimensionMismatch {
                expected: classes.len(),
                actual: counts.len(),
            });
        }
        let dim = config.weights_size();
        if let Some(c) = classes.iter().find(|c| c.dim() != dim) {
            return Err(RLError::DimensionMismatch {
                expected: dim,
                actual: c.dim(),
            });
        }
        if auxiliary_distribution.dim() != dim {
            return Err(RLError::DimensionMismatch {
                expected: dim,
                actual: auxiliary_distribution.dim(),
            });
        }

        let auxiliaries = sample_auxiliaries(
            &auxiliary_distribution,
            classes.len(),
            config.num_auxiliary_classes,
            rng,
        )?;
        let candidates = merge_candidates(&classes, &auxiliaries);
        let priors = prior_weights(&candidates, &counts, config.alpha, config.num_auxiliary_classes);
        let start = proportional_selection(&priors, None, rng)
            .ok_or_else(|| RLError::Computation("no candidate classes".into()))?;
        let map_class = candidates[start].clone();
        let weights = map_class.model.sample(rng);

        Ok(Self {
            classes,
            counts,
            auxiliary_distribution,
            auxiliaries,
            observations: ObservationLog::new(dim),
            alpha: config.alpha,
            num_auxiliary: config.num_auxiliary_classes,
            mcmc: config.mcmc.clone(),
            map_class,
            weights,
        })
    }

    /// Record one observation
    pub fn add_observation(&mut self, state: StateFeatures, reward: f64) -> Result<()> {
        self.observations.push(state, reward)
    }

    /// Run the within-task chain and accept its best recorded sample
    pub fn update_beliefs<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<UpdateSummary> {
        let stats = self.observations.stats().clone();
        let candidates = merge_candidates(&self.classes, &self.auxiliaries);
        let initial = proportional_selection(&self.priors(&candidates), None, rng)
            .ok_or_else(|| RLError::Computation("no candidate classes".into()))?;
        let mut weights = candidates[initial].model.posterior_given(&stats)?.sample(rng);

        let mut histogram = vec![0usize; candidates.len()];
        let mut best: Option<(f64, usize, CandidateClass, DVector<f64>)> = None;

        for iteration in 0..self.mcmc.samples {
            self.auxiliaries = sample_auxiliaries(
                &self.auxiliary_distribution,
                self.classes.len(),
                self.num_auxiliary,
                rng,
            )?;
            let candidates = merge_candidates(&self.classes, &self.auxiliaries);
            let (chosen, posterior) = self.sample_assignment(&candidates, &stats, &weights, rng)?;
            weights = posterior.sample(rng);

            if self.mcmc.records(iteration) {
                let prior = self.priors(&candidates)[chosen];
                let score = floored_ln(prior) + floored_log(posterior.log_likelihood(&weights)?);
                histogram[chosen] += 1;
                if best.as_ref().map_or(true, |(s, ..)| score > *s) {
                    best = Some((score, chosen, candidates[chosen].clone(), weights.clone()));
                }
            }
        }

        let Some((score, selected, class, map_weights)) = best else {
            warn!(
                samples = self.mcmc.samples,
                burn_in = self.mcmc.burn_in,
                "no samples recorded, keeping weights"
            );
            return Ok(UpdateSummary {
                histogram,
                initial,
                selected: initial,
                switched: false,
                log_likelihood: f64::NEG_INFINITY,
            });
        };

        let switched = selected != initial;
        debug!(
            observations = self.observations.len(),
            histogram = ?histogram,
            initial,
            selected,
            switched,
            log_likelihood = score,
            "assignment distribution"
        );

        self.map_class = class;
        self.weights = map_weights;
        Ok(UpdateSummary {
            histogram,
            initial,
            selected,
            switched,
            log_likelihood: score,
        })
    }

    /// Draw a candidate index in proportion to prior weight times the
    /// candidate posterior's density at `weights`; returns the index and that
    /// posterior
    fn sample_assignment<R: Rng + ?Sized>(
        &self,
        candidates: &[CandidateClass],
        stats: &RegressionStats,
        weights: &DVector<f64>,
        rng: &mut R,
    ) -> Result<(usize, ClassModel)> {
        let priors = self.priors(candidates);
        let mut posteriors = Vec::with_capacity(candidates.len());
        let mut log_weights = Vec::with_capacity(candidates.len());
        for (candidate, &prior) in candidates.iter().zip(&priors) {
            let posterior = candidate.model.posterior_given(stats)?;
            log_weights.push(if prior > 0.0 {
                prior.ln() + posterior.log_likelihood(weights)?
            } else {
                f64::NEG_INFINITY
            });
            posteriors.push(posterior);
        }
        let rel = relative_weights(&log_weights);
        let chosen = proportional_selection(&rel, None, rng)
            .ok_or_else(|| RLError::Computation("no candidate classes".into()))?;
        Ok((chosen, posteriors.swap_remove(chosen)))
    }

    fn priors(&self, candidates: &[CandidateClass]) -> Vec<f64> {
        prior_weights(candidates, &self.counts, self.alpha, self.num_auxiliary)
    }

    /// Accepted weight vector
    #[must_use]
    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }

    /// Class the accepted weights were drawn from
    #[must_use]
    pub fn map_class(&self) -> &CandidateClass {
        &self.map_class
    }

    /// Whether the accepted class is a fresh auxiliary rather than a catalog class
    #[must_use]
    pub fn map_is_new_class(&self) -> bool {
        self.map_class.kind == ClassKind::Auxiliary
    }

    /// Catalog classes
    #[must_use]
    pub fn classes(&self) -> &[ClassModel] {
        &self.classes
    }

    /// Prior weight of each catalog class
    #[must_use]
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Observations recorded so far
    #[must_use]
    pub fn observations(&self) -> &ObservationLog {
        &self.observations
    }

    /// Distribution auxiliaries are drawn from
    #[must_use]
    pub fn auxiliary_distribution(&self) -> &NormalInverseWishart {
        &self.auxiliary_distribution
    }
}

/// Catalog classes followed by auxiliaries, tagged by kind
fn merge_candidates(classes: &[ClassModel], auxiliaries: &[ClassModel]) -> Vec<CandidateClass> {
    classes
        .iter()
        .cloned()
        .map(CandidateClass::permanent)
        .chain(auxiliaries.iter().cloned().map(CandidateClass::auxiliary))
        .collect()
}

fn prior_weights(
    candidates: &[CandidateClass],
    counts: &[f64],
    alpha: f64,
    num_auxiliary: usize,
) -> Vec<f64> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| c.prior_weight(counts.get(i).copied().unwrap_or(0.0), alpha, num_auxiliary))
        .collect()
}

/// `m` fresh classes with ids continuing after the catalog
fn sample_auxiliaries<R: Rng + ?Sized>(
    distribution: &NormalInverseWishart,
    first_id: usize,
    count: usize,
    rng: &mut R,
) -> Result<Vec<ClassModel>> {
    (0..count)
        .map(|k| distribution.sample_class(first_id + k, rng))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McmcConfig;
    use nalgebra::DMatrix;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(alpha: f64) -> MultiTaskConfig {
        MultiTaskConfig {
            num_colors: 1,
            alpha,
            mcmc: McmcConfig {
                burn_in: 10,
                samples: 60,
                thin: 2,
            },
            ..MultiTaskConfig::default()
        }
    }

    fn tight_class(mean: &[f64]) -> ClassModel {
        ClassModel::new(
            0,
            DVector::from_column_slice(mean),
            DMatrix::identity(mean.len(), mean.len()) * 1e-6,
        )
        .unwrap()
    }

    #[test]
    fn test_single_tight_class_converges_to_mean() {
        let config = config(1e-9);
        let mean = [-1.0, 0.5, -2.0, 0.0, 1.5];
        let base = config.base_distribution().unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let mut model =
            LinearGaussianRewardModel::new(&config, vec![tight_class(&mean)], vec![1.0], base, &mut rng)
                .unwrap();

        for i in 0..20 {
            let mut s = DVector::zeros(5);
            s[i % 5] = 1.0;
            let r = mean[i % 5] + 0.1 * rng.gen_range(-1.0..1.0);
            model.add_observation(s, r).unwrap();
        }
        let summary = model.update_beliefs(&mut rng).unwrap();

        assert_eq!(summary.histogram.iter().sum::<usize>(), config.mcmc.recorded());
        assert_eq!(summary.selected, 0);
        assert!(!model.map_is_new_class());
        let target = DVector::from_column_slice(&mean);
        assert!((model.weights() - target).norm() < 0.05);
    }

    #[test]
    fn test_histogram_covers_candidates() {
        let config = config(0.5);
        let base = config.base_distribution().unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let mut model = LinearGaussianRewardModel::new(&config, Vec::new(), Vec::new(), base, &mut rng)
            .unwrap();
        assert!(model.map_is_new_class());
        let summary = model.update_beliefs(&mut rng).unwrap();
        assert_eq!(summary.histogram.len(), config.num_auxiliary_classes);
        assert!(summary.log_likelihood.is_finite());
        assert_eq!(model.weights().len(), 5);
    }

    #[test]
    fn test_rejects_mismatched_counts() {
        let config = config(0.5);
        let base = config.base_distribution().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let err = LinearGaussianRewardModel::new(
            &config,
            vec![tight_class(&[0.0; 5])],
            vec![1.0, 2.0],
            base,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, RLError::DimensionMismatch { expected: 1, actual: 2 }));
    }

    #[test]
    fn test_rejects_wrong_observation_dim() {
        let config = config(0.5);
        let base = config.base_distribution().unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let mut model = LinearGaussianRewardModel::new(&config, Vec::new(), Vec::new(), base, &mut rng)
            .unwrap();
        assert!(model.add_observation(DVector::zeros(3), 1.0).is_err());
    }
}
