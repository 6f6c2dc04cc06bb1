//! Sliding-block board: geometry, piece catalogue and the move primitives the search consumes.
//!
//! The search engine only ever talks to a board through [`Board::fill_grid`],
//! [`Board::free_cells`], [`Board::can_move`] and [`Board::apply_move`].

pub mod layout;
mod parse;

use std::fs;
use std::path::Path;

use crate::core::direction::Direction;
use crate::core::placement::{Loc, Placement};
use crate::search::error::SearchError;

use layout::{PieceLayout, PieceType};

/// Grid cell values. Pieces are stored as `piece + 1`.
pub const FREE: u8 = 0x00;
/// Free cell that only the main piece may enter.
pub const GATE: u8 = 0x80;
pub const WALL: u8 = 0xFF;

#[derive(Debug, Clone)]
pub struct Board {
    name: String,
    width: usize,
    height: usize,
    goal: Loc,
    /// Walls, gates and free cells; no pieces.
    base: Vec<u8>,
    layout: PieceLayout,
    /// Source character of each initial slot, for rendering.
    symbols: Vec<u8>,
    initial: Placement,
    free_count: usize,
}

impl Board {
    pub fn parse(text: &str) -> Result<Self, SearchError> {
        parse::parse_board(text)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SearchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn goal(&self) -> Loc {
        self.goal
    }

    #[inline]
    pub fn piece_count(&self) -> usize {
        self.layout.piece_count()
    }

    #[inline]
    pub fn layout(&self) -> &PieceLayout {
        &self.layout
    }

    #[inline]
    pub fn types(&self) -> &[PieceType] {
        self.layout.types()
    }

    #[inline]
    pub fn initial(&self) -> Placement {
        self.initial
    }

    /// Number of free cells (including gates), which is constant for a board.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// `(column, row)` of a cell.
    #[inline]
    pub fn coords(&self, cell: usize) -> (usize, usize) {
        (cell % self.width, cell / self.width)
    }

    /// A grid buffer holding only walls and gates, ready for [`Board::fill_grid`].
    pub fn new_grid(&self) -> Vec<u8> {
        self.base.clone()
    }

    pub fn neighbor(&self, cell: usize, dir: Direction) -> Option<usize> {
        let (col, row) = self.coords(cell);
        match dir {
            Direction::North if row > 0 => Some(cell - self.width),
            Direction::South if row + 1 < self.height => Some(cell + self.width),
            Direction::West if col > 0 => Some(cell - 1),
            Direction::East if col + 1 < self.width => Some(cell + 1),
            _ => None,
        }
    }

    /// Materialize `placement` into `grid` (which must be `cell_count()` long).
    pub fn fill_grid(&self, placement: &Placement, grid: &mut [u8]) {
        grid.copy_from_slice(&self.base);
        for (piece, &loc) in placement.locs().iter().enumerate() {
            for &off in self.layout.type_of(piece).footprint() {
                grid[(loc as isize + off) as usize] = piece as u8 + 1;
            }
        }
    }

    /// Cells of `grid` that hold no piece and no wall.
    pub fn free_cells<'g>(&self, grid: &'g [u8]) -> impl Iterator<Item = usize> + 'g {
        grid.iter()
            .enumerate()
            .filter(|(_, &v)| v & 0x7F == 0)
            .map(|(cell, _)| cell)
    }

    /// Whether a piece of `piece_type` anchored at `loc` can slide one step in `dir` on `grid`.
    pub fn can_move(&self, grid: &[u8], piece_type: usize, loc: Loc, dir: Direction) -> bool {
        self.layout.types()[piece_type]
            .edges(dir)
            .iter()
            .all(|&delta| {
                let cell = loc as isize + delta;
                if cell < 0 {
                    return false;
                }
                match grid.get(cell as usize) {
                    Some(&FREE) => true,
                    Some(&GATE) => piece_type == 0,
                    _ => false,
                }
            })
    }

    /// Slide the piece in slot `piece` one step in `dir` and restore the ordering of its type
    /// group by shifting neighbours. Returns the slot the piece ends up in.
    pub fn apply_move(&self, placement: &mut Placement, piece: usize, dir: Direction) -> usize {
        let run = self.layout.type_of(piece).pieces();
        let locs = placement.locs_mut();
        let moved = (locs[piece] as isize + dir.offset(self.width)) as Loc;

        let mut j = piece;
        while j + 1 < run.end && moved > locs[j + 1] {
            locs[j] = locs[j + 1];
            j += 1;
        }
        while j > run.start && moved < locs[j - 1] {
            locs[j] = locs[j - 1];
            j -= 1;
        }
        locs[j] = moved;
        j
    }

    #[inline]
    pub fn is_goal(&self, placement: &Placement) -> bool {
        placement.get(0) == self.goal
    }

    /// Whether every type group of `placement` is in ascending location order.
    pub fn is_canonical(&self, placement: &Placement) -> bool {
        self.layout
            .types()
            .iter()
            .all(|ty| placement.locs()[ty.pieces()].windows(2).all(|w| w[0] < w[1]))
    }

    /// Text rendering of a placement in the board file's own alphabet.
    pub fn render(&self, placement: &Placement) -> String {
        let mut grid = self.new_grid();
        self.fill_grid(placement, &mut grid);
        let mut out = String::with_capacity(self.cell_count() + self.height);
        for (cell, &v) in grid.iter().enumerate() {
            out.push(match v {
                WALL => '#',
                GATE => '-',
                FREE => ' ',
                p => self.symbols[(p - 1) as usize] as char,
            });
            if (cell + 1) % self.width == 0 {
                out.push('\n');
            }
        }
        out
    }
}
