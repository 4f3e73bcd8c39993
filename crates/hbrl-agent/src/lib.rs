//! Hierarchical Bayesian multi-task inference
//!
//! This crate provides the inference core of a multi-task Bayesian RL agent:
//! - Gaussian task classes with conjugate linear-regression posteriors
//! - A Normal-Inverse-Wishart prior over class parameters
//! - A within-task MCMC reward model
//! - A cross-task collapsed Gibbs sampler over a Dirichlet-process mixture
//! - The agent that ties both to the episode lifecycle

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod belief;
pub mod catalog;
pub mod class_model;
pub mod config;
pub mod multitask;
pub mod niw;
pub mod reward_model;
pub mod sampling;

// Re-export inference components
pub use belief::{ChainScore, CrossTaskBeliefEngine};
pub use catalog::{compact, BeliefState, CandidateClass, ClassKind, Compacted};
pub use class_model::ClassModel;
pub use niw::{ln_multivariate_gamma, NormalInverseWishart};
pub use reward_model::{LinearGaussianRewardModel, UpdateSummary};

// Re-export the agent and its configuration
pub use config::{McmcConfig, MultiTaskConfig, PriorConfig};
pub use multitask::MultiTaskBayesianAgent;

// Re-export sampling utilities
pub use sampling::{floored_ln, proportional_selection, LOG_FLOOR};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        BeliefState, ClassModel, CrossTaskBeliefEngine, LinearGaussianRewardModel, McmcConfig,
        MultiTaskBayesianAgent, MultiTaskConfig, NormalInverseWishart, PriorConfig,
    };
    pub use hbrl_core::prelude::*;
}
