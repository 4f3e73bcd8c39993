//! Reference collaborators for hbrl
//!
//! This crate provides the environment side of the agent interface:
//! - A colored gridworld implementing `TaskDomain`
//! - A value-iteration solver implementing `PolicySolver`

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod gridworld;
pub mod value_iteration;

// Re-export environments
pub use gridworld::{ColorGrid, ColorGridConfig};
pub use value_iteration::ValueIteration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{ColorGrid, ColorGridConfig, ValueIteration};
    pub use hbrl_core::prelude::*;
}
