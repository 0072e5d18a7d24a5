//! Sparse tabular action-value store

use std::collections::HashMap;

use ndarray::Array2;

use qgrid_core::{Action, Cell, ACTION_COUNT};

/// Action-values for one cell, indexed by [`Action::index`]
pub type QValues = [f64; ACTION_COUNT];

/// Largest value in a Q-vector
pub fn max_value(values: &QValues) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Heatmap shade in `[0, 1]` for a cell's best value, mapping -10..10 linearly
pub fn heatmap_intensity(best_value: f64) -> f64 {
    ((best_value + 10.0) / 20.0).clamp(0.0, 1.0)
}

/// Q-table keyed by cell.
///
/// Cells that were never written read as the zero vector; an entry only
/// exists after its first write.
#[derive(Debug, Clone, Default)]
pub struct QTable {
    entries: HashMap<Cell, QValues>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored values for `cell`, or zeros when the cell was never written
    pub fn read(&self, cell: Cell) -> QValues {
        self.entries
            .get(&cell)
            .copied()
            .unwrap_or([0.0; ACTION_COUNT])
    }

    /// Set one component, materializing the cell from zeros if needed
    pub fn write(&mut self, cell: Cell, action_index: usize, value: f64) {
        let values = self.entries.entry(cell).or_insert([0.0; ACTION_COUNT]);
        values[action_index] = value;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `cell` has been written since the last clear
    pub fn contains(&self, cell: Cell) -> bool {
        self.entries.contains_key(&cell)
    }

    pub fn best_value(&self, cell: Cell) -> f64 {
        max_value(&self.read(cell))
    }

    /// First action holding the maximum value, `None` for unwritten cells
    pub fn best_action(&self, cell: Cell) -> Option<Action> {
        let values = self.entries.get(&cell)?;
        let best = max_value(values);
        values
            .iter()
            .position(|v| *v == best)
            .and_then(Action::from_index)
    }

    /// Best value of every cell as a `[y, x]` matrix, for heatmap rendering
    pub fn value_grid(&self, size: usize) -> Array2<f64> {
        Array2::from_shape_fn((size, size), |(y, x)| self.best_value(Cell::new(x, y)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Cell, &QValues)> {
        self.entries.iter().map(|(cell, values)| (*cell, values))
    }
}
