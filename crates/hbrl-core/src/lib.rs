//! Core types and collaborator traits for hierarchical Bayesian multi-task RL
//!
//! This crate provides the vocabulary shared by the inference core and the
//! environments it is plugged into: grid actions and locations, per-task
//! observation logs, and the narrow traits through which the agent talks to
//! its environment and policy solver.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod agent;
pub mod environment;
pub mod error;
pub mod observation;
pub mod policy;
pub mod state;

// Re-export core traits and types
pub use action::GridAction;
pub use agent::{Agent, AgentMetrics};
pub use environment::{EpisodeRecord, TaskDomain};
pub use error::{RLError, Result};
pub use observation::{ObservationLog, RegressionStats};
pub use policy::{GridPolicy, PolicySolver};
pub use state::{feature_dim, Location, StateFeatures, NUM_RELATIVE_CELLS};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Agent, GridAction, GridPolicy, Location, ObservationLog, PolicySolver, RLError, Result,
        StateFeatures, TaskDomain,
    };
}
