//! Value-iteration policy solver

use hbrl_core::{GridAction, GridPolicy, Location, PolicySolver, RLError, Result};
use ndarray::Array2;
use tracing::trace;

/// Value iteration over a deterministic four-action grid.
///
/// Entering a cell earns that cell's value; the goal is absorbing. Moves into
/// a wall keep the agent in place and still pay the current cell's value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueIteration {
    /// Discount factor
    pub discount: f64,
    /// Stop when no state value changes by more than this
    pub tolerance: f64,
    /// Sweep limit
    pub max_iterations: usize,
}

impl Default for ValueIteration {
    fn default() -> Self {
        Self {
            discount: 0.95,
            tolerance: 1e-6,
            max_iterations: 1000,
        }
    }
}

impl ValueIteration {
    /// Converged state values for the grid
    pub fn values(
        &self,
        width: usize,
        height: usize,
        goal: Location,
        cell_values: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        if cell_values.dim() != (width, height) {
            return Err(RLError::ShapeMismatch {
                expected: (width, height),
                actual: cell_values.dim(),
            });
        }
        if goal.x >= width || goal.y >= height {
            return Err(RLError::InvalidParameter(format!(
                "goal ({}, {}) outside a {width}x{height} grid",
                goal.x, goal.y
            )));
        }
        if !(0.0..1.0).contains(&self.discount) {
            return Err(RLError::InvalidParameter(format!(
                "discount must be in [0, 1), got {}",
                self.discount
            )));
        }

        let mut values = Array2::zeros((width, height));
        for sweep in 0..self.max_iterations {
            let mut delta: f64 = 0.0;
            for x in 0..width {
                for y in 0..height {
                    let here = Location::new(x, y);
                    if here == goal {
                        continue;
                    }
                    let best = GridAction::ALL
                        .iter()
                        .map(|&a| self.backup(here, a, width, height, cell_values, &values))
                        .fold(f64::NEG_INFINITY, f64::max);
                    delta = delta.max((best - values[[x, y]]).abs());
                    values[[x, y]] = best;
                }
            }
            if delta < self.tolerance {
                trace!(sweep, "value iteration converged");
                break;
            }
        }
        Ok(values)
    }

    fn backup(
        &self,
        from: Location,
        action: GridAction,
        width: usize,
        height: usize,
        cell_values: &Array2<f64>,
        values: &Array2<f64>,
    ) -> f64 {
        let to = action.apply(from, width, height).unwrap_or(from);
        cell_values[[to.x, to.y]] + self.discount * values[[to.x, to.y]]
    }
}

impl PolicySolver for ValueIteration {
    fn solve(
        &self,
        width: usize,
        height: usize,
        goal: Location,
        cell_values: &Array2<f64>,
    ) -> Result<GridPolicy> {
        let values = self.values(width, height, goal, cell_values)?;
        let actions = Array2::from_shape_fn((width, height), |(x, y)| {
            let here = Location::new(x, y);
            let mut best = (GridAction::Up, f64::NEG_INFINITY);
            for &a in &GridAction::ALL {
                let q = self.backup(here, a, width, height, cell_values, &values);
                if q > best.1 {
                    best = (a, q);
                }
            }
            best.0
        });
        Ok(GridPolicy::new(actions))
    }
}
