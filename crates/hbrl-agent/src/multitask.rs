//! Multi-task Bayesian agent
//!
//! Glues the belief engine and the within-task reward model to the agent
//! lifecycle. Beliefs over past tasks are only refreshed when the active task
//! changes; within a task the reward model is re-run every
//! `steps_per_policy` actions and the policy is re-solved from its weights.

use hbrl_core::{
    Agent, AgentMetrics, EpisodeRecord, GridAction, GridPolicy, Location, ObservationLog,
    PolicySolver, RLError, Result, StateFeatures, TaskDomain,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::belief::CrossTaskBeliefEngine;
use crate::config::MultiTaskConfig;
use crate::reward_model::LinearGaussianRewardModel;

/// Hierarchical Bayesian agent over a fixed set of task domains
pub struct MultiTaskBayesianAgent<D, S> {
    config: MultiTaskConfig,
    domains: Vec<D>,
    solver: S,
    engine: CrossTaskBeliefEngine,
    model: LinearGaussianRewardModel,
    current: Option<usize>,
    histories: Vec<ObservationLog>,
    locations: Vec<Option<Location>>,
    policy: Option<GridPolicy>,
    prev_reward: Option<f64>,
    steps_since_update: usize,
    rng: StdRng,
    episode: Option<EpisodeRecord>,
    metrics: AgentMetrics,
}

impl<D, S> MultiTaskBayesianAgent<D, S>
where
    D: TaskDomain,
    S: PolicySolver,
{
    /// Create an agent for `domains`, one per task index
    pub fn new(config: MultiTaskConfig, domains: Vec<D>, solver: S) -> Result<Self> {
        config.validate()?;
        if domains.is_empty() {
            return Err(RLError::InvalidParameter("at least one task domain is required".into()));
        }
        let dim = config.weights_size();
        if let Some(d) = domains.iter().find(|d| d.feature_dim() != dim) {
            return Err(RLError::DimensionMismatch {
                expected: dim,
                actual: d.feature_dim(),
            });
        }

        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let engine = CrossTaskBeliefEngine::new(&config)?;
        let model = LinearGaussianRewardModel::new(
            &config,
            Vec::new(),
            Vec::new(),
            engine.base().clone(),
            &mut rng,
        )?;
        let tasks = domains.len();

        Ok(Self {
            config,
            domains,
            solver,
            engine,
            model,
            current: None,
            histories: vec![ObservationLog::new(dim); tasks],
            locations: vec![None; tasks],
            policy: None,
            prev_reward: None,
            steps_since_update: 0,
            rng,
            episode: None,
            metrics: AgentMetrics::default(),
        })
    }

    /// Active task, if any
    #[must_use]
    pub fn current_task(&self) -> Option<usize> {
        self.current
    }

    /// Cross-task belief engine
    #[must_use]
    pub fn engine(&self) -> &CrossTaskBeliefEngine {
        &self.engine
    }

    /// Reward model of the active task
    #[must_use]
    pub fn model(&self) -> &LinearGaussianRewardModel {
        &self.model
    }

    /// Observations recorded for `task`
    #[must_use]
    pub fn history(&self, task: usize) -> Option<&ObservationLog> {
        self.histories.get(task)
    }

    /// Current acting policy
    #[must_use]
    pub fn policy(&self) -> Option<&GridPolicy> {
        self.policy.as_ref()
    }

    /// Record of the running or last finished episode
    #[must_use]
    pub fn episode(&self) -> Option<&EpisodeRecord> {
        self.episode.as_ref()
    }

    /// Agent configuration
    #[must_use]
    pub fn config(&self) -> &MultiTaskConfig {
        &self.config
    }

    fn check_known(&self, task: usize) -> Result<()> {
        if task >= self.domains.len() {
            return Err(RLError::UnknownTask {
                task,
                tasks: self.domains.len(),
            });
        }
        Ok(())
    }

    fn check_active(&self, task: usize) -> Result<()> {
        self.check_known(task)?;
        match self.current {
            Some(active) if active == task => Ok(()),
            Some(active) => Err(RLError::TaskMismatch {
                active,
                requested: task,
            }),
            None => Err(RLError::InvalidParameter(format!(
                "no episode in progress, got a call for task {task}"
            ))),
        }
    }

    /// Re-cluster all tasks up to `previous`, then rebuild the reward model
    /// for `task` from the accepted belief
    fn switch_task(&mut self, previous: usize, task: usize) -> Result<()> {
        self.engine
            .update(&self.histories[..=previous], &mut self.rng)?;
        self.metrics.belief_updates += 1;

        self.rebuild_model(Some(task))?;
        self.current = Some(task);
        self.update_policy()?;
        self.steps_since_update = 0;
        Ok(())
    }

    /// Replace the reward model with one built from the accepted belief,
    /// holding exactly the history of `task` (nothing when `None`)
    fn rebuild_model(&mut self, task: Option<usize>) -> Result<()> {
        let belief = self.engine.belief();
        let classes = belief.classes().to_vec();
        let counts = belief.count_weights();
        let auxiliary = self.engine.auxiliary_distribution()?;
        let mut model =
            LinearGaussianRewardModel::new(&self.config, classes, counts, auxiliary, &mut self.rng)?;
        if let Some(task) = task {
            for (state, reward) in self.histories[task].iter() {
                model.add_observation(state.clone(), reward)?;
            }
        }
        self.model = model;
        Ok(())
    }

    /// Refresh the reward model and re-solve the policy from its weights,
    /// pricing each cell at `min(0, w · features)`
    fn update_policy(&mut self) -> Result<()> {
        let Some(task) = self.current else {
            return Ok(());
        };
        let summary = self.model.update_beliefs(&mut self.rng)?;
        let weights = self.model.weights();
        let domain = &self.domains[task];
        let cell_values = Array2::from_shape_fn((domain.width(), domain.height()), |(x, y)| {
            weights
                .dot(&domain.cell_features(Location::new(x, y)))
                .min(0.0)
        });
        self.policy = Some(
            self.solver
                .solve(domain.width(), domain.height(), domain.goal(), &cell_values)?,
        );
        self.metrics.policy_updates += 1;
        debug!(
            task,
            selected = summary.selected,
            switched = summary.switched,
            "policy updated"
        );
        Ok(())
    }
}

impl<D, S> Agent for MultiTaskBayesianAgent<D, S>
where
    D: TaskDomain,
    S: PolicySolver,
{
    fn episode_starting(
        &mut self,
        task: usize,
        location: Location,
        _state: StateFeatures,
    ) -> Result<()> {
        self.check_known(task)?;
        self.locations[task] = Some(location);
        match self.current {
            Some(previous) if previous != task => self.switch_task(previous, task)?,
            Some(_) => {}
            None => {
                if !self.model.observations().is_empty() || !self.histories[task].is_empty() {
                    self.rebuild_model(Some(task))?;
                }
                self.current = Some(task);
                self.steps_since_update = 0;
            }
        }
        self.prev_reward = None;
        self.episode = Some(EpisodeRecord::start(task));
        Ok(())
    }

    fn episode_over(&mut self, task: usize) -> Result<()> {
        self.check_active(task)?;
        if let Some(episode) = self.episode.as_mut().filter(|e| !e.is_finished()) {
            episode.finish();
            self.metrics.record_episode(episode.total_reward);
        }
        Ok(())
    }

    fn get_action(&mut self, task: usize) -> Result<GridAction> {
        self.check_active(task)?;
        if self.steps_since_update >= self.config.steps_per_policy {
            self.update_policy()?;
            self.steps_since_update = 0;
        }
        self.steps_since_update += 1;
        self.metrics.total_steps += 1;
        if let Some(episode) = self.episode.as_mut() {
            episode.record_step();
        }

        match (&self.policy, self.locations[task]) {
            (Some(policy), Some(location)) => policy.action_at(location),
            _ => Ok(GridAction::sample(&mut self.rng)),
        }
    }

    fn set_state(&mut self, task: usize, location: Location, state: StateFeatures) -> Result<()> {
        self.check_active(task)?;
        self.locations[task] = Some(location);
        if let Some(reward) = self.prev_reward.take() {
            self.model.add_observation(state.clone(), reward)?;
            self.histories[task].push(state, reward)?;
        }
        Ok(())
    }

    fn observe_reward(&mut self, task: usize, reward: f64) -> Result<()> {
        self.check_active(task)?;
        self.prev_reward = Some(reward);
        if let Some(episode) = self.episode.as_mut() {
            episode.record_reward(reward);
        }
        Ok(())
    }

    fn clear_memory(&mut self, task: usize) -> Result<()> {
        self.check_known(task)?;
        self.histories[task].clear();
        self.locations[task] = None;
        if self.current == Some(task) {
            self.current = task.checked_sub(1);
            self.policy = None;
            self.prev_reward = None;
            self.rebuild_model(self.current)?;
        }
        Ok(())
    }

    fn metrics(&self) -> AgentMetrics {
        self.metrics.clone()
    }
}
