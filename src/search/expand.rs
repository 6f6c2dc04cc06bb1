//! Successor generation and the best-first heuristic.

use crate::board::{Board, FREE, GATE};
use crate::core::direction::Direction;
use crate::core::placement::Placement;

/// A placement one move away from the expanded state.
#[derive(Debug, Clone, Copy)]
pub struct Successor {
    pub placement: Placement,
    /// Slot of the moved piece in the *parent's* placement.
    pub piece: usize,
    pub dir: Direction,
}

/// Per-worker scratch buffers for expanding states of one board.
pub struct Expander<'b> {
    board: &'b Board,
    grid: Vec<u8>,
    child_grid: Vec<u8>,
    /// Bit `d` set: the piece has a free cell on its `d` side.
    marks: Vec<u8>,
}

impl<'b> Expander<'b> {
    pub fn new(board: &'b Board) -> Self {
        Self {
            board,
            grid: board.new_grid(),
            child_grid: board.new_grid(),
            marks: vec![0; board.piece_count()],
        }
    }

    /// Replace `out` with every legal single move from `placement`.
    pub fn successors(&mut self, placement: &Placement, out: &mut Vec<Successor>) {
        let board = self.board;
        out.clear();
        board.fill_grid(placement, &mut self.grid);
        self.marks.fill(0);

        // Only pieces next to a free cell can possibly move.
        for cell in board.free_cells(&self.grid) {
            for dir in Direction::ALL {
                let Some(from) = board.neighbor(cell, dir.opposite()) else {
                    continue;
                };
                let v = self.grid[from];
                if v != FREE && v & GATE == 0 {
                    self.marks[(v - 1) as usize] |= 1 << dir.code();
                }
            }
        }

        for (piece, &mask) in self.marks.iter().enumerate() {
            if mask == 0 {
                continue;
            }
            let piece_type = board.layout().type_index(piece);
            for dir in Direction::ALL {
                if mask & (1 << dir.code()) == 0
                    || !board.can_move(&self.grid, piece_type, placement.get(piece), dir)
                {
                    continue;
                }
                let mut next = *placement;
                board.apply_move(&mut next, piece, dir);
                debug_assert!(board.is_canonical(&next));
                out.push(Successor {
                    placement: next,
                    piece,
                    dir,
                });
            }
        }
    }

    /// Estimated remaining cost of `placement`: Manhattan distance of the main piece to the
    /// goal, plus a term in `[0, 1]` that is smallest when free cells are clustered.
    pub fn heuristic(&mut self, placement: &Placement) -> f32 {
        let board = self.board;
        let (x, y) = board.coords(placement.get(0) as usize);
        let (gx, gy) = board.coords(board.goal() as usize);
        let dist = x.abs_diff(gx) + y.abs_diff(gy);

        board.fill_grid(placement, &mut self.child_grid);
        let nsp = board.free_count();
        let clustering = if nsp == 0 {
            0.0
        } else {
            let grid = &self.child_grid;
            // Each free cell scores 2^(free neighbours): between nsp and 16 * nsp in total.
            let score: usize = board
                .free_cells(grid)
                .map(|cell| {
                    let open = Direction::ALL
                        .into_iter()
                        .filter(|&d| board.neighbor(cell, d).is_some_and(|n| grid[n] == FREE))
                        .count();
                    1usize << open
                })
                .sum();
            (score.saturating_sub(nsp)) as f32 / (15 * nsp) as f32
        };
        dist as f32 + (1.0 - clustering)
    }
}
