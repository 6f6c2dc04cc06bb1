//! JSON rendering of a board and its solution.

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::search::path::PathStep;

/// `{"name", "grid", "end", "solution"}` where `grid` holds the raw cell codes of the initial
/// placement and each solution step is `[piece + 1, direction code]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveReport {
    pub name: String,
    pub grid: Vec<Vec<u8>>,
    pub end: u16,
    pub solution: Vec<[u32; 2]>,
}

impl SolveReport {
    pub fn new(board: &Board, steps: &[PathStep]) -> Self {
        let mut cells = board.new_grid();
        board.fill_grid(&board.initial(), &mut cells);
        Self {
            name: board.name().to_string(),
            grid: cells.chunks(board.width()).map(<[u8]>::to_vec).collect(),
            end: board.goal(),
            solution: steps
                .iter()
                .map(|s| [s.piece as u32 + 1, s.dir.code() as u32])
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
