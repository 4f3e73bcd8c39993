//! Error types for the multi-task inference core

use thiserror::Error;

/// Core error type for belief inference and agent plumbing
#[derive(Error, Debug)]
pub enum RLError {
    /// A configuration or distribution parameter is out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A matrix that must be positive-definite is not
    #[error("Matrix is not positive-definite: {0}")]
    NotPositiveDefinite(String),

    /// Gaussian likelihood terms came out negative or NaN, which means the
    /// covariance backing them is corrupted
    #[error("Invalid covariance: multiplier {multiplier}, exponent {exponent}")]
    InvalidCovariance {
        /// Determinant term `|Σ|^-1/2`
        multiplier: f64,
        /// Quadratic form exponent
        exponent: f64,
    },

    /// Assignment vector does not cover every active task
    #[error("Assignment mismatch: {assignments} assignments for {tasks} tasks")]
    AssignmentMismatch {
        /// Number of assignment entries
        assignments: usize,
        /// Number of active tasks
        tasks: usize,
    },

    /// An assignment points outside the class catalog
    #[error("Invalid class index {index} for a catalog of {classes} classes")]
    InvalidClass {
        /// Offending class index
        index: usize,
        /// Catalog size
        classes: usize,
    },

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Required length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Matrix shape mismatch
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Required `(rows, cols)`
        expected: (usize, usize),
        /// Shape received
        actual: (usize, usize),
    },

    /// An agent hook was called for a task other than the active one
    #[error("Task mismatch: task {active} is active, got a call for task {requested}")]
    TaskMismatch {
        /// Task whose episode is in progress
        active: usize,
        /// Task named by the call
        requested: usize,
    },

    /// Task index outside the known domains
    #[error("Unknown task {task}: only {tasks} task domains are registered")]
    UnknownTask {
        /// Requested task index
        task: usize,
        /// Number of registered domains
        tasks: usize,
    },

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RLError {
    /// Whether the error signals a bug (corrupted state) rather than bad input
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidCovariance { .. }
                | Self::AssignmentMismatch { .. }
                | Self::InvalidClass { .. }
                | Self::ShapeMismatch { .. }
        )
    }
}

/// Result type alias for inference operations
pub type Result<T> = std::result::Result<T, RLError>;
