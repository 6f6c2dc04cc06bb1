//! Low-level, allocation-free primitives shared by the board and the search engine.
//!
//! - [`direction`]: the four sliding directions and their grid offsets.
//! - [`placement`]: a fixed-capacity piece-location vector (`MAX_PIECES`).

pub mod direction;
pub mod placement;
