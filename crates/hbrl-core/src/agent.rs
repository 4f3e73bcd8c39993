//! Agent lifecycle interface

use serde::{Deserialize, Serialize};

use crate::{GridAction, Location, Result, StateFeatures};

/// Episodic agent driven by a multi-task environment.
///
/// Hooks are invoked in episode order, one task active at a time:
/// `episode_starting`, then repeated `get_action` / `observe_reward` /
/// `set_state`, then `episode_over`.
pub trait Agent {
    /// A new episode of `task` begins at `location`
    fn episode_starting(&mut self, task: usize, location: Location, state: StateFeatures)
        -> Result<()>;

    /// The current episode of `task` has ended
    fn episode_over(&mut self, task: usize) -> Result<()>;

    /// Select the next action in `task`
    fn get_action(&mut self, task: usize) -> Result<GridAction>;

    /// The agent moved to `location`, whose features are `state`
    fn set_state(&mut self, task: usize, location: Location, state: StateFeatures) -> Result<()>;

    /// Reward received for the last action
    fn observe_reward(&mut self, task: usize, reward: f64) -> Result<()>;

    /// Forget everything observed in `task`
    fn clear_memory(&mut self, task: usize) -> Result<()>;

    /// Get agent metrics
    fn metrics(&self) -> AgentMetrics {
        AgentMetrics::default()
    }
}

/// Agent metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Total actions taken
    pub total_steps: usize,
    /// Total episodes finished
    pub total_episodes: usize,
    /// Cross-task belief updates run
    pub belief_updates: usize,
    /// Policy recomputations
    pub policy_updates: usize,
    /// Average reward per finished episode
    pub avg_episode_reward: f64,
}

impl AgentMetrics {
    /// Fold a finished episode's total reward into the running average
    pub fn record_episode(&mut self, total_reward: f64) {
        self.total_episodes += 1;
        let n = self.total_episodes as f64;
        self.avg_episode_reward += (total_reward - self.avg_episode_reward) / n;
    }
}
