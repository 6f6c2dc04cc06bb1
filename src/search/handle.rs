//! State handles and their flat integer encoding.
//!
//! Inside the engine a handle is a tagged [`StateHandle`]. Where a handle has to live in a
//! single machine word (index slots, queue entries, the shared solution cell) it is packed by
//! [`HandleCodec`]: multiples of `full_ratio` name Full records, every other positive value
//! names a Semi record, and 0 means "none".

use std::fmt;
use std::num::NonZeroU32;

use crate::search::arena::BlockId;
use crate::search::error::SearchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateHandle {
    /// A record holding the whole placement.
    Full(BlockId),
    /// A record holding only the move from its parent.
    Semi(BlockId),
}

impl StateHandle {
    #[inline]
    pub fn is_full(self) -> bool {
        matches!(self, StateHandle::Full(_))
    }
}

impl fmt::Display for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateHandle::Full(b) => write!(f, "F{}", b),
            StateHandle::Semi(b) => write!(f, "S{}", b),
        }
    }
}

/// Bijection between [`StateHandle`]s and the positive integers below `states + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleCodec {
    ratio: u32,
}

impl HandleCodec {
    pub fn new(full_ratio: u32) -> Self {
        debug_assert!(full_ratio >= 2);
        Self { ratio: full_ratio }
    }

    #[inline]
    pub fn full_ratio(self) -> u32 {
        self.ratio
    }

    pub fn encode(self, handle: StateHandle) -> u32 {
        let r = self.ratio as u64;
        let raw = match handle {
            StateHandle::Full(b) => b.get() as u64 * r,
            // The s-th value in 1.. that is not a multiple of r.
            StateHandle::Semi(b) => (b.get() as u64 - 1) * r / (r - 1) + 1,
        };
        raw as u32
    }

    pub fn decode(self, raw: u32) -> Option<StateHandle> {
        if raw == 0 {
            return None;
        }
        let (tag, index): (fn(BlockId) -> StateHandle, u32) = if raw % self.ratio == 0 {
            (StateHandle::Full, raw / self.ratio)
        } else {
            (StateHandle::Semi, raw - raw / self.ratio)
        };
        NonZeroU32::new(index).map(tag)
    }

    /// Like [`HandleCodec::decode`] but treats 0 as an error.
    pub fn decode_required(
        self,
        raw: u32,
        structure: &'static str,
    ) -> Result<StateHandle, SearchError> {
        self.decode(raw).ok_or(SearchError::InvalidHandle {
            structure,
            handle: raw as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(n: u32) -> BlockId {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn residue_selects_the_record_kind() {
        let codec = HandleCodec::new(8);
        assert_eq!(codec.encode(StateHandle::Full(b(1))), 8);
        assert_eq!(codec.encode(StateHandle::Full(b(3))), 24);
        assert_eq!(codec.encode(StateHandle::Semi(b(1))), 1);
        assert_eq!(codec.encode(StateHandle::Semi(b(7))), 7);
        assert_eq!(codec.encode(StateHandle::Semi(b(8))), 9);
        assert_eq!(codec.decode(0), None);
        assert_eq!(codec.decode(16), Some(StateHandle::Full(b(2))));
        assert_eq!(codec.decode(15), Some(StateHandle::Semi(b(14))));
    }

    #[test]
    fn codec_is_a_bijection_on_small_ranges() {
        for ratio in [2u32, 3, 8, 16] {
            let codec = HandleCodec::new(ratio);
            for raw in 1..=1000u32 {
                let h = codec.decode(raw).unwrap();
                assert_eq!(codec.encode(h), raw, "ratio {ratio}, raw {raw}");
                assert_eq!(h.is_full(), raw % ratio == 0);
            }
        }
    }

    #[test]
    fn largest_handles_fit_in_u32() {
        let codec = HandleCodec::new(2);
        let states = u32::MAX / 2;
        let semi = StateHandle::Semi(b(states - states / 2));
        assert!(codec.encode(semi) <= states);
        assert_eq!(codec.decode(codec.encode(semi)), Some(semi));
    }
}
