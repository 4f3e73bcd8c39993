//! Grid actions

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Location;

/// One of the four moves available in a grid task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridAction {
    /// Move towards y + 1
    Up,
    /// Move towards y - 1
    Down,
    /// Move towards x - 1
    Left,
    /// Move towards x + 1
    Right,
}

impl GridAction {
    /// Every action, in a fixed order
    pub const ALL: [GridAction; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// Draw an action uniformly at random
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Signed `(dx, dy)` offset of the move
    #[must_use]
    pub fn delta(self) -> (i64, i64) {
        match self {
            Self::Up => (0, 1),
            Self::Down => (0, -1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    /// Location reached from `from`, or `None` when the move leaves the grid
    #[must_use]
    pub fn apply(self, from: Location, width: usize, height: usize) -> Option<Location> {
        let (dx, dy) = self.delta();
        let x = from.x as i64 + dx;
        let y = from.y as i64 + dy;
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            return None;
        }
        Some(Location::new(x as usize, y as usize))
    }
}
