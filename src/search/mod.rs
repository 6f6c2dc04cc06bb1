//! The concurrent, memory-bounded search engine.
//!
//! Leaves first: [`arena`] hands out stable block ids, [`index`] maps state hashes to handle
//! chains, [`store`] keeps Full and Semi records and deduplicates through the index, [`queue`]
//! orders pending states, and [`solver`] runs the worker pool over all of them.

pub mod arena;
pub mod config;
pub mod error;
pub mod expand;
pub mod handle;
pub mod index;
pub mod path;
pub mod queue;
pub mod solver;
pub mod stats;
pub mod store;

pub use config::{SearchBudget, SolverConfig};
pub use error::SearchError;
pub use handle::StateHandle;
pub use path::PathStep;
pub use solver::{SearchOutcome, Solver};
pub use stats::SearchStats;
