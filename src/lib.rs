//! Parallel best-first solver for sliding-block puzzles (rush-hour / klotski style).
//!
//! - [`board`]: puzzle files, piece geometry and the move primitives.
//! - [`search`]: the memory-bounded concurrent search engine.
//! - [`report`]: JSON rendering of a board and its solution.

pub mod board;
pub mod core;
pub mod report;
pub mod search;
