use std::ops::Range;

use crate::core::direction::Direction;

/// Footprint and movement edges shared by every piece of one shape.
///
/// All offsets are linear cell offsets relative to the piece's anchor (its lowest cell index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceType {
    footprint: Vec<isize>,
    edges: [Vec<isize>; 4],
    pieces: Range<usize>,
}

impl PieceType {
    pub fn new(footprint: Vec<isize>, edges: [Vec<isize>; 4], pieces: Range<usize>) -> Self {
        Self {
            footprint,
            edges,
            pieces,
        }
    }

    #[inline]
    pub fn footprint(&self) -> &[isize] {
        &self.footprint
    }

    /// Cells that must be free for the piece to slide one step in `dir`.
    #[inline]
    pub fn edges(&self, dir: Direction) -> &[isize] {
        &self.edges[dir.code() as usize]
    }

    /// Placement slots occupied by pieces of this type.
    #[inline]
    pub fn pieces(&self) -> Range<usize> {
        self.pieces.clone()
    }
}

/// The piece-type catalogue: types in placement order plus a slot -> type lookup.
///
/// Type 0 is always the main piece and owns exactly slot 0. Every other type owns a contiguous
/// run of slots, which is what lets a placement stay canonical by ordering each run.
#[derive(Debug, Clone)]
pub struct PieceLayout {
    types: Vec<PieceType>,
    type_of: Vec<u8>,
}

impl PieceLayout {
    pub fn from_types(types: Vec<PieceType>) -> Self {
        let mut type_of = Vec::new();
        for (t, ty) in types.iter().enumerate() {
            debug_assert_eq!(ty.pieces.start, type_of.len());
            type_of.extend(ty.pieces().map(|_| t as u8));
        }
        debug_assert!(types.first().map_or(true, |main| main.pieces == (0..1)));
        Self { types, type_of }
    }

    #[inline]
    pub fn piece_count(&self) -> usize {
        self.type_of.len()
    }

    #[inline]
    pub fn types(&self) -> &[PieceType] {
        &self.types
    }

    #[inline]
    pub fn type_index(&self, piece: usize) -> usize {
        self.type_of[piece] as usize
    }

    #[inline]
    pub fn type_of(&self, piece: usize) -> &PieceType {
        &self.types[self.type_index(piece)]
    }
}
