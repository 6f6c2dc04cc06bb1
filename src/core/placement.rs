/// Maximum number of pieces on a board.
///
/// Grid cells store `piece + 1` below the gate bit, so this must stay under 127.
pub const MAX_PIECES: usize = 32;

/// A linear cell index (`row * width + col`).
pub type Loc = u16;

/// The piece-location vector of one configuration.
///
/// Slot `i` holds the anchor cell of the piece in slot `i`. Slots are grouped by piece type and
/// kept in ascending location order inside each group, so two placements are equal exactly when
/// they describe the same configuration. The ordering is restored by the move that breaks it,
/// never by a full re-sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    locs: [Loc; MAX_PIECES],
    count: u8,
}

impl Placement {
    pub fn from_slice(locs: &[Loc]) -> Self {
        assert!(locs.len() <= MAX_PIECES, "too many pieces: {}", locs.len());
        let mut out = [0; MAX_PIECES];
        out[..locs.len()].copy_from_slice(locs);
        Self {
            locs: out,
            count: locs.len() as u8,
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count as usize
    }

    #[inline]
    pub fn locs(&self) -> &[Loc] {
        &self.locs[..self.count()]
    }

    #[inline]
    pub fn locs_mut(&mut self) -> &mut [Loc] {
        let n = self.count();
        &mut self.locs[..n]
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Loc {
        self.locs()[idx]
    }

    #[inline]
    pub fn set(&mut self, idx: usize, loc: Loc) {
        self.locs_mut()[idx] = loc;
    }

    /// Slot holding a piece anchored at `loc`.
    pub fn find(&self, loc: Loc) -> Option<usize> {
        self.locs().iter().position(|&l| l == loc)
    }

    /// Little-endian bytes of the used slots, written into `buf`.
    pub fn write_bytes<'a>(&self, buf: &'a mut [u8; MAX_PIECES * 2]) -> &'a [u8] {
        for (i, loc) in self.locs().iter().enumerate() {
            buf[2 * i..2 * i + 2].copy_from_slice(&loc.to_le_bytes());
        }
        &buf[..2 * self.count()]
    }
}
