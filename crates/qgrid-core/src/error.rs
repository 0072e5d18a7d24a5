//! Error types for qgrid

use thiserror::Error;

use crate::types::Cell;

/// Main error type for qgrid
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Cell {cell} is outside a {size}x{size} grid")]
    OutOfBounds { cell: Cell, size: usize },

    #[error("Cell {cell} cannot be both {first} and {second}")]
    Overlap {
        cell: Cell,
        first: &'static str,
        second: &'static str,
    },

    #[error("Invalid parameter {name}: {value} (expected {expected})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("Trainer error: {0}")]
    Trainer(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for qgrid operations
pub type Result<T> = std::result::Result<T, GridError>;
