//! Grid World environment - transition and reward rules

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use qgrid_core::{Action, Cell, GridError, Result};

/// Reward returned by each kind of transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rewards {
    /// Reward for entering the goal cell
    pub goal: f64,
    /// Reward for entering a hazard cell
    pub hazard: f64,
    /// Cost charged for every other move, including blocked ones
    pub step: f64,
}

impl Default for Rewards {
    fn default() -> Self {
        Self {
            goal: 10.0,
            hazard: -100.0,
            step: -0.1,
        }
    }
}

/// Outcome of a single transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub next: Cell,
    pub reward: f64,
    pub done: bool,
}

/// Square grid with a start cell, one goal and a set of hazards.
///
/// Immutable once built; every invariant is checked in [`GridEnvironment::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridEnvironment {
    size: usize,
    start: Cell,
    goal: Cell,
    hazards: BTreeSet<Cell>,
    rewards: Rewards,
}

impl GridEnvironment {
    /// Build an environment, rejecting configurations that break the grid invariants
    pub fn new(
        size: usize,
        start: Cell,
        goal: Cell,
        hazards: impl IntoIterator<Item = Cell>,
        rewards: Rewards,
    ) -> Result<Self> {
        if size < 2 {
            return Err(GridError::InvalidGrid(format!(
                "grid side must be at least 2, got {size}"
            )));
        }

        let hazards: BTreeSet<Cell> = hazards.into_iter().collect();

        for cell in [start, goal].iter().chain(hazards.iter()) {
            if cell.x >= size || cell.y >= size {
                return Err(GridError::OutOfBounds { cell: *cell, size });
            }
        }

        if start == goal {
            return Err(GridError::Overlap {
                cell: start,
                first: "start",
                second: "goal",
            });
        }
        if hazards.contains(&goal) {
            return Err(GridError::Overlap {
                cell: goal,
                first: "goal",
                second: "hazard",
            });
        }
        if hazards.contains(&start) {
            return Err(GridError::Overlap {
                cell: start,
                first: "start",
                second: "hazard",
            });
        }

        Ok(Self {
            size,
            start,
            goal,
            hazards,
            rewards,
        })
    }

    /// The 5x5 demonstration grid: start top-left, goal bottom-right, four hazards
    pub fn reference() -> Self {
        Self {
            size: 5,
            start: Cell::new(0, 0),
            goal: Cell::new(4, 4),
            hazards: [(1, 1), (2, 1), (3, 3), (1, 3)]
                .into_iter()
                .map(Cell::from)
                .collect(),
            rewards: Rewards::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn start(&self) -> Cell {
        self.start
    }

    pub fn goal(&self) -> Cell {
        self.goal
    }

    pub fn hazards(&self) -> impl Iterator<Item = Cell> + '_ {
        self.hazards.iter().copied()
    }

    pub fn rewards(&self) -> Rewards {
        self.rewards
    }

    pub fn is_hazard(&self, cell: Cell) -> bool {
        self.hazards.contains(&cell)
    }

    /// Goal and hazards end an episode
    pub fn is_terminal(&self, cell: Cell) -> bool {
        cell == self.goal || self.is_hazard(cell)
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x < self.size && cell.y < self.size
    }

    /// Every cell of the grid in row-major order
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.size).flat_map(move |y| (0..self.size).map(move |x| Cell::new(x, y)))
    }

    /// Apply `action` from `position`.
    ///
    /// Each axis is clamped to the grid independently, so a move into a wall
    /// leaves that coordinate unchanged and only costs the step reward. The
    /// returned cell is the candidate even when the move is terminal.
    pub fn transition(&self, position: Cell, action: Action) -> Transition {
        let (dx, dy) = action.delta();
        let next = Cell::new(
            Self::clamp_axis(position.x, dx, self.size),
            Self::clamp_axis(position.y, dy, self.size),
        );

        let (reward, done) = if next == self.goal {
            (self.rewards.goal, true)
        } else if self.is_hazard(next) {
            (self.rewards.hazard, true)
        } else {
            (self.rewards.step, false)
        };

        Transition { next, reward, done }
    }

    fn clamp_axis(coord: usize, delta: isize, size: usize) -> usize {
        coord.saturating_add_signed(delta).min(size - 1)
    }
}

impl Default for GridEnvironment {
    fn default() -> Self {
        Self::reference()
    }
}
