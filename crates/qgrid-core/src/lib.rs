//! qgrid Core - Core types and shared error handling
//!
//! This crate provides the value types shared by the learning engine and the
//! command line front end: grid cells, movement actions and the error type.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod types;

pub use error::{GridError, Result};
pub use types::{Action, Cell, ACTION_COUNT};
