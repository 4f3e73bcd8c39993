//! Cross-task belief engine
//!
//! Re-clusters every task seen so far with a collapsed Gibbs chain over class
//! assignments, task weights and class parameters. Each iteration consumes
//! one [`BeliefState`] and produces the next; the best recorded state is
//! accepted.

use hbrl_core::{ObservationLog, RLError, Result};
use nalgebra::DVector;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::{compact, BeliefState, CandidateClass};
use crate::class_model::ClassModel;
use crate::config::{McmcConfig, MultiTaskConfig};
use crate::niw::NormalInverseWishart;
use crate::sampling::{floored_log, proportional_selection, relative_weights};

/// Log-likelihood of one chain iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainScore {
    /// Assignment, weight and class-parameter terms
    pub log_likelihood: f64,
    /// Assignment and weight terms only
    pub partial_log_likelihood: f64,
}

/// Owner of the accepted global belief state
#[derive(Debug, Clone)]
pub struct CrossTaskBeliefEngine {
    base: NormalInverseWishart,
    alpha: f64,
    num_auxiliary: usize,
    mcmc: McmcConfig,
    belief: BeliefState,
    map_score: Option<ChainScore>,
}

impl CrossTaskBeliefEngine {
    /// Create an engine with an empty belief state
    pub fn new(config: &MultiTaskConfig) -> Result<Self> {
        Ok(Self {
            base: config.base_distribution()?,
            alpha: config.alpha,
            num_auxiliary: config.num_auxiliary_classes,
            mcmc: config.mcmc.clone(),
            belief: BeliefState::default(),
            map_score: None,
        })
    }

    /// Accepted belief state
    #[must_use]
    pub fn belief(&self) -> &BeliefState {
        &self.belief
    }

    /// Score of the accepted state, if an update has run
    #[must_use]
    pub fn map_score(&self) -> Option<ChainScore> {
        self.map_score
    }

    /// Base prior over class parameters
    #[must_use]
    pub fn base(&self) -> &NormalInverseWishart {
        &self.base
    }

    /// Base prior updated with the accepted weights; new classes are drawn
    /// from it
    pub fn auxiliary_distribution(&self) -> Result<NormalInverseWishart> {
        self.base.posterior(self.belief.weights())
    }

    /// Re-cluster the tasks whose histories are given (task `j` is
    /// `histories[j]`) and accept the best recorded state
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        histories: &[ObservationLog],
        rng: &mut R,
    ) -> Result<&BeliefState> {
        if histories.is_empty() {
            return Err(RLError::InvalidParameter(
                "belief update needs at least one task".into(),
            ));
        }
        if let Some(h) = histories.iter().find(|h| h.dim() != self.base.dim()) {
            return Err(RLError::DimensionMismatch {
                expected: self.base.dim(),
                actual: h.dim(),
            });
        }

        let mut state = self.initial_state(histories, rng)?;
        let mut best: Option<(BeliefState, ChainScore)> = None;
        for iteration in 0..self.mcmc.samples {
            let (next, score) = self.step(&state, histories, rng)?;
            if self.mcmc.records(iteration)
                && best
                    .as_ref()
                    .map_or(true, |(_, b)| score.log_likelihood > b.log_likelihood)
            {
                best = Some((next.clone(), score));
            }
            state = next;
        }

        match best {
            Some((belief, score)) => {
                let class_means: Vec<Vec<f64>> = belief
                    .classes()
                    .iter()
                    .map(|c| c.mean().iter().map(|v| (v * 100.0).round() / 100.0).collect())
                    .collect();
                info!(
                    counts = ?belief.counts(),
                    assignments = ?belief.assignments(),
                    log_likelihood = score.log_likelihood,
                    partial_log_likelihood = score.partial_log_likelihood,
                    class_means = ?class_means,
                    "accepted MAP belief"
                );
                self.belief = belief;
                self.map_score = Some(score);
            }
            None => {
                warn!(
                    samples = self.mcmc.samples,
                    burn_in = self.mcmc.burn_in,
                    "no belief snapshots recorded, keeping last chain state"
                );
                self.belief = state;
                self.map_score = None;
            }
        }
        Ok(&self.belief)
    }

    /// One class covering every task, drawn around the previous weights
    fn initial_state<R: Rng + ?Sized>(
        &self,
        histories: &[ObservationLog],
        rng: &mut R,
    ) -> Result<BeliefState> {
        let class = self
            .base
            .posterior(self.belief.weights())?
            .sample_class(0, rng)?;
        let weights = histories
            .iter()
            .map(|h| -> Result<DVector<f64>> { Ok(class.posterior_given(h.stats())?.sample(rng)) })
            .collect::<Result<Vec<_>>>()?;
        BeliefState::new(
            vec![class],
            vec![0; histories.len()],
            vec![histories.len()],
            weights,
        )
    }

    /// Gibbs sweep over assignments, then weights, then class parameters
    fn step<R: Rng + ?Sized>(
        &self,
        state: &BeliefState,
        histories: &[ObservationLog],
        rng: &mut R,
    ) -> Result<(BeliefState, ChainScore)> {
        if state.num_tasks() != histories.len() {
            return Err(RLError::AssignmentMismatch {
                assignments: state.num_tasks(),
                tasks: histories.len(),
            });
        }

        let auxiliary = self.base.posterior(state.weights())?;
        let mut candidates: Vec<CandidateClass> = state
            .classes()
            .iter()
            .cloned()
            .map(CandidateClass::permanent)
            .collect();
        for _ in 0..self.num_auxiliary {
            let id = candidates.len();
            candidates.push(CandidateClass::auxiliary(auxiliary.sample_class(id, rng)?));
        }

        let mut assignments = state.assignments().to_vec();
        let mut counts = state.counts().to_vec();
        counts.resize(candidates.len(), 0);
        let mut log_likelihood = 0.0;

        for (task, history) in histories.iter().enumerate() {
            counts[assignments[task]] -= 1;
            let log_weights = candidates
                .iter()
                .zip(&counts)
                .map(|(candidate, &count)| -> Result<f64> {
                    let prior = candidate.prior_weight(count as f64, self.alpha, self.num_auxiliary);
                    if prior > 0.0 {
                        let posterior = candidate.model.posterior_given(history.stats())?;
                        Ok(prior.ln() + posterior.log_likelihood(&state.weights()[task])?)
                    } else {
                        Ok(f64::NEG_INFINITY)
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            let probs = relative_weights(&log_weights);
            let partition: f64 = probs.iter().sum();
            let chosen = proportional_selection(&probs, Some(partition), rng)
                .ok_or_else(|| RLError::Computation("no candidate classes".into()))?;

            log_likelihood += if partition <= 0.0 || probs[chosen] <= 0.0 {
                (1.0 / probs.len() as f64).ln()
            } else {
                (probs[chosen] / partition).ln()
            };
            assignments[task] = chosen;
            counts[chosen] += 1;
        }

        let compacted = compact(candidates, &assignments)?;

        let mut weights = Vec::with_capacity(histories.len());
        for (history, &a) in histories.iter().zip(&compacted.assignments) {
            let prior = &compacted.classes[a];
            let w = prior.posterior_given(history.stats())?.sample(rng);
            log_likelihood += floored_log(prior.log_likelihood(&w)?);
            weights.push(w);
        }
        let partial_log_likelihood = log_likelihood;

        let mut clusters: Vec<Vec<DVector<f64>>> = vec![Vec::new(); compacted.classes.len()];
        for (w, &a) in weights.iter().zip(&compacted.assignments) {
            clusters[a].push(w.clone());
        }
        let mut classes = Vec::with_capacity(clusters.len());
        for (id, cluster) in clusters.iter().enumerate() {
            let (mean, covariance) = self.base.posterior(cluster)?.sample(rng)?;
            log_likelihood += self.base.log_likelihood(&mean, &covariance)?;
            classes.push(ClassModel::new(id, mean, covariance)?);
        }

        let next = BeliefState::new(classes, compacted.assignments, compacted.counts, weights)?;
        Ok((
            next,
            ChainScore {
                log_likelihood,
                partial_log_likelihood,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McmcConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> MultiTaskConfig {
        MultiTaskConfig {
            num_colors: 1,
            mcmc: McmcConfig {
                burn_in: 5,
                samples: 30,
                thin: 2,
            },
            ..MultiTaskConfig::default()
        }
    }

    fn history(target: &[f64], n: usize, rng: &mut StdRng) -> ObservationLog {
        let mut log = ObservationLog::new(target.len());
        for i in 0..n {
            let mut s = DVector::zeros(target.len());
            s[i % target.len()] = 1.0;
            let r = target[i % target.len()] + 0.1 * rng.gen_range(-1.0..1.0);
            log.push(s, r).unwrap();
        }
        log
    }

    fn histories(rng: &mut StdRng) -> Vec<ObservationLog> {
        vec![
            history(&[-1.0, -1.0, 0.0, 0.0, -2.0], 30, rng),
            history(&[-1.0, -1.0, 0.0, 0.0, -2.0], 30, rng),
            history(&[0.0, -3.0, -1.0, 0.0, 0.0], 30, rng),
            ObservationLog::new(5),
        ]
    }

    #[test]
    fn test_update_keeps_invariants() {
        let mut rng = StdRng::seed_from_u64(21);
        let tasks = histories(&mut rng);
        let mut engine = CrossTaskBeliefEngine::new(&config()).unwrap();
        let belief = engine.update(&tasks, &mut rng).unwrap();

        assert_eq!(belief.num_tasks(), tasks.len());
        assert_eq!(belief.weights().len(), tasks.len());
        assert_eq!(belief.counts().iter().sum::<usize>(), tasks.len());
        for (i, class) in belief.classes().iter().enumerate() {
            assert_eq!(class.class_id(), i);
        }
        for &a in belief.assignments() {
            assert!(a < belief.classes().len());
        }
        belief.validate().unwrap();

        let score = engine.map_score().unwrap();
        assert!(score.log_likelihood.is_finite());
        assert!(score.partial_log_likelihood.is_finite());
    }

    #[test]
    fn test_successive_updates_grow_task_set() {
        let mut rng = StdRng::seed_from_u64(22);
        let tasks = histories(&mut rng);
        let mut engine = CrossTaskBeliefEngine::new(&config()).unwrap();
        engine.update(&tasks[..1], &mut rng).unwrap();
        assert_eq!(engine.belief().num_tasks(), 1);
        engine.update(&tasks[..3], &mut rng).unwrap();
        assert_eq!(engine.belief().num_tasks(), 3);
        let aux = engine.auxiliary_distribution().unwrap();
        assert_eq!(aux.dim(), 5);
    }

    #[test]
    fn test_same_seed_same_belief() {
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let tasks = histories(&mut rng);
            let mut engine = CrossTaskBeliefEngine::new(&config()).unwrap();
            engine.update(&tasks, &mut rng).unwrap();
            (
                engine.belief().assignments().to_vec(),
                engine.belief().weights()[0].clone(),
            )
        };
        assert_eq!(run(5), run(5));
    }

    #[test]
    fn test_rejects_bad_histories() {
        let mut rng = StdRng::seed_from_u64(23);
        let mut engine = CrossTaskBeliefEngine::new(&config()).unwrap();
        assert!(matches!(
            engine.update(&[], &mut rng).unwrap_err(),
            RLError::InvalidParameter(_)
        ));
        assert!(matches!(
            engine.update(&[ObservationLog::new(3)], &mut rng).unwrap_err(),
            RLError::DimensionMismatch { expected: 5, actual: 3 }
        ));
    }
}
