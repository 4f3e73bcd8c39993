//! Grid locations and per-cell state features

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Number of cells a state feature vector describes: the cell itself and its
/// four neighbours
pub const NUM_RELATIVE_CELLS: usize = 5;

/// Feature vector describing one grid cell, `num_colors * NUM_RELATIVE_CELLS`
/// entries long
pub type StateFeatures = DVector<f64>;

/// Length of a state feature vector for a given palette size
#[must_use]
pub fn feature_dim(num_colors: usize) -> usize {
    num_colors * NUM_RELATIVE_CELLS
}

/// Grid coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Column
    pub x: usize,
    /// Row
    pub y: usize,
}

impl Location {
    /// Create a new location
    #[must_use]
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl From<(usize, usize)> for Location {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}
