//! Colored gridworld task domain
//!
//! Every cell carries one of `num_colors` colors. A cell's feature vector is
//! the one-hot color of the cell itself followed by the one-hot colors of its
//! up, down, left and right neighbours; neighbours outside the grid
//! contribute an all-zero block.

use hbrl_core::{feature_dim, GridAction, Location, RLError, Result, TaskDomain};
use nalgebra::DVector;
use ndarray::{Array2, Array3};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Gridworld construction settings
#[derive(Debug, Clone, PartialEq)]
pub struct ColorGridConfig {
    /// Grid width
    pub width: usize,
    /// Grid height
    pub height: usize,
    /// Palette size
    pub num_colors: usize,
    /// Goal cell; the top-right corner when absent
    pub goal: Option<Location>,
}

impl Default for ColorGridConfig {
    fn default() -> Self {
        Self {
            width: 5,
            height: 5,
            num_colors: 2,
            goal: None,
        }
    }
}

/// Gridworld with colored cells and a fixed goal
#[derive(Debug, Clone)]
pub struct ColorGrid {
    colors: Array2<usize>,
    cells: Array3<f64>,
    num_colors: usize,
    goal: Location,
}

impl ColorGrid {
    /// Grid with uniformly random colors
    pub fn random<R: Rng + ?Sized>(config: &ColorGridConfig, rng: &mut R) -> Result<Self> {
        if config.num_colors == 0 {
            return Err(RLError::InvalidParameter("num_colors must be positive".into()));
        }
        let colors = Array2::from_shape_fn((config.width, config.height), |_| {
            rng.gen_range(0..config.num_colors)
        });
        let goal = config.goal.unwrap_or_else(|| {
            Location::new(config.width.saturating_sub(1), config.height.saturating_sub(1))
        });
        Self::from_colors(colors, config.num_colors, goal)
    }

    /// Grid from an explicit `[x, y]` color map
    pub fn from_colors(colors: Array2<usize>, num_colors: usize, goal: Location) -> Result<Self> {
        let (width, height) = colors.dim();
        if width == 0 || height == 0 {
            return Err(RLError::InvalidParameter("grid must not be empty".into()));
        }
        if goal.x >= width || goal.y >= height {
            return Err(RLError::InvalidParameter(format!(
                "goal ({}, {}) outside a {width}x{height} grid",
                goal.x, goal.y
            )));
        }
        if let Some(&c) = colors.iter().find(|&&c| c >= num_colors) {
            return Err(RLError::InvalidParameter(format!(
                "color {c} outside a palette of {num_colors}"
            )));
        }

        let mut cells = Array3::zeros((width, height, feature_dim(num_colors)));
        for x in 0..width {
            for y in 0..height {
                let here = Location::new(x, y);
                let neighbours = std::iter::once(Some(here))
                    .chain(GridAction::ALL.iter().map(|a| a.apply(here, width, height)));
                for (block, cell) in neighbours.enumerate() {
                    if let Some(cell) = cell {
                        cells[[x, y, block * num_colors + colors[[cell.x, cell.y]]]] = 1.0;
                    }
                }
            }
        }

        Ok(Self {
            colors,
            cells,
            num_colors,
            goal,
        })
    }

    /// Palette size
    #[must_use]
    pub fn num_colors(&self) -> usize {
        self.num_colors
    }

    /// Color of a cell
    #[must_use]
    pub fn color_at(&self, location: Location) -> Option<usize> {
        self.colors.get((location.x, location.y)).copied()
    }

    /// Whether `location` is the goal
    #[must_use]
    pub fn is_goal(&self, location: Location) -> bool {
        location == self.goal
    }

    /// Cell reached by `action`; moves into a wall leave the agent in place
    #[must_use]
    pub fn step(&self, from: Location, action: GridAction) -> Location {
        action
            .apply(from, self.width(), self.height())
            .unwrap_or(from)
    }

    /// Expected reward of a cell under linear weights
    #[must_use]
    pub fn expected_reward(&self, weights: &DVector<f64>, location: Location) -> f64 {
        weights.dot(&self.cell_features(location))
    }

    /// Noisy linear reward: `w · features + N(0, stdev²)`
    pub fn sample_reward<R: Rng + ?Sized>(
        &self,
        weights: &DVector<f64>,
        location: Location,
        stdev: f64,
        rng: &mut R,
    ) -> Result<f64> {
        if !stdev.is_finite() || stdev <= 0.0 {
            return Err(RLError::InvalidParameter(format!(
                "reward stdev must be positive and finite, got {stdev}"
            )));
        }
        let noise = Normal::new(0.0, stdev)
            .map_err(|e| RLError::InvalidParameter(format!("reward stdev {stdev}: {e}")))?;
        Ok(self.expected_reward(weights, location) + noise.sample(rng))
    }
}

impl TaskDomain for ColorGrid {
    fn width(&self) -> usize {
        self.colors.dim().0
    }

    fn height(&self) -> usize {
        self.colors.dim().1
    }

    fn goal(&self) -> Location {
        self.goal
    }

    fn cell_states(&self) -> &Array3<f64> {
        &self.cells
    }
}
