//! Two-tier state storage with hash-based deduplication.
//!
//! Roughly one state in `full_ratio` (chosen by hash residue, plus the root) is stored as a
//! [`FullRecord`] with its whole placement. Every other state keeps only the move that produced
//! it; its placement is recovered by replaying moves forward from the nearest Full ancestor.
//!
//! States with the same hash are chained through `chain_next`, starting at the head stored in
//! the [`Index`] entry for that hash. The chain is only ever extended while the entry holds its
//! bucket's write lock, which is what makes "exactly one handle per placement" hold under
//! concurrent inserts.

use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::board::Board;
use crate::core::direction::Direction;
use crate::core::placement::{Placement, MAX_PIECES};
use crate::search::arena::Arena;
use crate::search::config::SearchBudget;
use crate::search::error::SearchError;
use crate::search::handle::{HandleCodec, StateHandle};
use crate::search::index::{Index, Lookup, EMPTY_KEY, FANOUT};
use crate::search::queue::QueueEntry;

/// 32-bit hash of a placement. Never 0 and never [`EMPTY_KEY`].
pub fn state_hash(placement: &Placement) -> u32 {
    let mut buf = [0u8; MAX_PIECES * 2];
    let wide = xxh3_64(placement.write_bytes(&mut buf));
    match (wide >> 32) as u32 ^ wide as u32 {
        0 | EMPTY_KEY => 1,
        h => h,
    }
}

/// The move that produced a state, plus its place in the dedup chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLink {
    pub dir: Direction,
    /// Slot of the moved piece in the parent's placement.
    pub piece: u8,
    pub node: u16,
    /// `None` only for the root.
    pub parent: Option<StateHandle>,
    pub chain_next: Option<StateHandle>,
}

#[derive(Debug, Clone, Copy)]
pub struct FullRecord {
    pub link: StateLink,
    pub depth: u32,
    pub placement: Placement,
}

/// A state offered to [`StateStore::insert`].
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub placement: Placement,
    pub depth: u32,
    pub parent: Option<StateHandle>,
    pub piece: u8,
    pub dir: Direction,
}

impl Candidate {
    pub fn root(placement: Placement) -> Self {
        Self {
            placement,
            depth: 0,
            parent: None,
            piece: 0,
            dir: Direction::North,
        }
    }

    /// `placement` must be the parent's placement with slot `piece` moved one step in `dir`.
    pub fn child(
        parent: StateHandle,
        parent_depth: u32,
        piece: usize,
        dir: Direction,
        placement: Placement,
    ) -> Self {
        Self {
            placement,
            depth: parent_depth + 1,
            parent: Some(parent),
            piece: piece as u8,
            dir,
        }
    }
}

/// A state with its placement materialized.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedState {
    pub placement: Placement,
    pub depth: u32,
    pub link: StateLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(StateHandle),
    /// An identical placement is already stored under this handle.
    Duplicate(StateHandle),
    /// The index bucket changed under us; nothing was stored.
    Retry,
}

/// Approximate bytes one state costs across the store, index and queue.
pub fn bytes_per_state(full_ratio: u32) -> f64 {
    let ratio = full_ratio.max(2) as f64;
    let full = size_of::<RwLock<Option<FullRecord>>>() as f64;
    let semi = size_of::<RwLock<Option<StateLink>>>() as f64;
    let records = full / ratio + semi * (ratio - 1.0) / ratio;
    let index = 2.0 * index_bytes_per_node() as f64 / FANOUT as f64;
    let queue = size_of::<QueueEntry<u32>>() as f64 / 2.0;
    records + index + queue
}

pub fn index_bytes_per_node() -> usize {
    Index::bytes_per_node()
}

pub struct StateStore<'b> {
    board: &'b Board,
    codec: HandleCodec,
    full: Arena<FullRecord>,
    semi: Arena<StateLink>,
    index: Index,
    nodes: u16,
    node: u16,
    shorter_paths: AtomicU64,
}

impl<'b> StateStore<'b> {
    pub fn new(board: &'b Board, budget: &SearchBudget) -> Result<Self, SearchError> {
        budget.validate()?;
        debug!(
            full = budget.full_capacity(),
            semi = budget.semi_capacity(),
            index_nodes = budget.index_nodes(),
            "sizing state store"
        );
        Ok(Self {
            board,
            codec: HandleCodec::new(budget.full_ratio),
            full: Arena::new("full states", budget.full_capacity())?,
            semi: Arena::new("semi states", budget.semi_capacity())?,
            index: Index::new(budget.index_nodes())?,
            nodes: budget.nodes,
            node: budget.node,
            shorter_paths: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn codec(&self) -> HandleCodec {
        self.codec
    }

    #[inline]
    pub fn board(&self) -> &'b Board {
        self.board
    }

    /// Store `cand` unless an identical placement is already present.
    pub fn insert(&self, cand: &Candidate) -> Result<InsertOutcome, SearchError> {
        let hash = state_hash(&cand.placement);
        let owner = hash % self.nodes as u32;
        if owner != self.node as u32 {
            return Err(SearchError::ForeignNode {
                hash,
                owner,
                node: self.node,
                nodes: self.nodes,
            });
        }

        let entry = match self.index.lookup_or_reserve(hash)? {
            Lookup::Retry => return Ok(InsertOutcome::Retry),
            Lookup::Found(entry) | Lookup::Reserved(entry) => entry,
        };

        let mut tail = None;
        let mut cursor = self.codec.decode(entry.head());
        while let Some(handle) = cursor {
            let stored = self.resolve(handle)?;
            if stored.placement == cand.placement {
                if cand.depth < stored.depth {
                    self.shorter_paths.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        %handle,
                        stored = stored.depth,
                        found = cand.depth,
                        "shorter path to a stored state"
                    );
                }
                return Ok(InsertOutcome::Duplicate(handle));
            }
            tail = Some(handle);
            cursor = stored.link.chain_next;
        }

        let Some(mut entry) = entry.upgrade() else {
            return Ok(InsertOutcome::Retry);
        };

        let link = StateLink {
            dir: cand.dir,
            piece: cand.piece,
            node: self.node,
            parent: cand.parent,
            chain_next: None,
        };
        let handle = if cand.parent.is_none() || hash % self.codec.full_ratio() == 0 {
            StateHandle::Full(self.full.allocate(FullRecord {
                link,
                depth: cand.depth,
                placement: cand.placement,
            })?)
        } else {
            StateHandle::Semi(self.semi.allocate(link)?)
        };

        match tail {
            None => entry.set_head(self.codec.encode(handle)),
            Some(prev) => self.link_mut(prev, |l| l.chain_next = Some(handle))?,
        }
        drop(entry);
        Ok(InsertOutcome::Inserted(handle))
    }

    /// The stored move record of `handle`, without replaying anything.
    pub fn link(&self, handle: StateHandle) -> Result<StateLink, SearchError> {
        match handle {
            StateHandle::Full(b) => Ok(self.full.resolve(b)?.link),
            StateHandle::Semi(b) => Ok(*self.semi.resolve(b)?),
        }
    }

    fn link_mut(
        &self,
        handle: StateHandle,
        f: impl FnOnce(&mut StateLink),
    ) -> Result<(), SearchError> {
        match handle {
            StateHandle::Full(b) => f(&mut self.full.resolve_mut(b)?.link),
            StateHandle::Semi(b) => f(&mut *self.semi.resolve_mut(b)?),
        }
        Ok(())
    }

    /// Materialize `handle` by replaying moves from its nearest Full ancestor.
    pub fn resolve(&self, handle: StateHandle) -> Result<ResolvedState, SearchError> {
        let mut moves: Vec<StateLink> = Vec::new();
        let mut cursor = handle;
        let base = loop {
            match cursor {
                StateHandle::Full(b) => break *self.full.resolve(b)?,
                StateHandle::Semi(b) => {
                    let link = *self.semi.resolve(b)?;
                    moves.push(link);
                    cursor = link.parent.ok_or(SearchError::InvalidHandle {
                        structure: "semi states",
                        handle: self.codec.encode(cursor) as u64,
                    })?;
                }
            }
        };

        let mut placement = base.placement;
        for link in moves.iter().rev() {
            self.board.apply_move(&mut placement, link.piece as usize, link.dir);
        }
        Ok(ResolvedState {
            placement,
            depth: base.depth + moves.len() as u32,
            link: moves.first().copied().unwrap_or(base.link),
        })
    }

    /// Full and Semi records currently stored.
    pub fn state_count(&self) -> u64 {
        self.full.used() as u64 + self.semi.used() as u64
    }

    pub fn capacity(&self) -> u64 {
        self.full.capacity() as u64 + self.semi.capacity() as u64
    }

    pub fn full_len(&self) -> u32 {
        self.full.used()
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn shorter_paths(&self) -> u64 {
        self.shorter_paths.load(Ordering::Relaxed)
    }
}
