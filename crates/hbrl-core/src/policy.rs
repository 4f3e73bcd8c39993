//! Policy collaborator interface

use ndarray::Array2;

use crate::{GridAction, Location, RLError, Result};

/// Deterministic grid policy: one action per cell
#[derive(Debug, Clone, PartialEq)]
pub struct GridPolicy {
    actions: Array2<GridAction>,
}

impl GridPolicy {
    /// Wrap a `[x, y]` action grid
    #[must_use]
    pub fn new(actions: Array2<GridAction>) -> Self {
        Self { actions }
    }

    /// Action to take at `location`
    pub fn action_at(&self, location: Location) -> Result<GridAction> {
        self.actions
            .get((location.x, location.y))
            .copied()
            .ok_or_else(|| {
                RLError::InvalidParameter(format!(
                    "location ({}, {}) outside a {:?} policy grid",
                    location.x,
                    location.y,
                    self.actions.dim()
                ))
            })
    }

    /// Grid `(width, height)`
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        self.actions.dim()
    }

    /// Underlying action grid
    #[must_use]
    pub fn actions(&self) -> &Array2<GridAction> {
        &self.actions
    }
}

/// Turns a grid of expected per-cell values into an acting policy.
///
/// Implementations are treated as pure functions of their inputs.
pub trait PolicySolver {
    /// Solve for a policy over a `width x height` grid with the given goal
    fn solve(
        &self,
        width: usize,
        height: usize,
        goal: Location,
        cell_values: &Array2<f64>,
    ) -> Result<GridPolicy>;
}

impl<F> PolicySolver for F
where
    F: Fn(usize, usize, Location, &Array2<f64>) -> Result<GridPolicy>,
{
    fn solve(
        &self,
        width: usize,
        height: usize,
        goal: Location,
        cell_values: &Array2<f64>,
    ) -> Result<GridPolicy> {
        self(width, height, goal, cell_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_lookup() {
        let mut grid = Array2::from_elem((2, 2), GridAction::Up);
        grid[(1, 0)] = GridAction::Left;
        let policy = GridPolicy::new(grid);
        assert_eq!(policy.action_at(Location::new(1, 0)).unwrap(), GridAction::Left);
        assert!(policy.action_at(Location::new(2, 0)).is_err());
    }

    #[test]
    fn test_closure_solver() {
        let solver = |w: usize, h: usize, _goal: Location, _values: &Array2<f64>| {
            Ok::<_, RLError>(GridPolicy::new(Array2::from_elem((w, h), GridAction::Right)))
        };
        let values = Array2::zeros((3, 2));
        let policy = solver.solve(3, 2, Location::new(2, 1), &values).unwrap();
        assert_eq!(policy.dim(), (3, 2));
    }
}
