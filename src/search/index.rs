//! Concurrent deduplication index: state hash -> head of a chain of candidate handles.
//!
//! The index is `HASHTBLSIZE` independent buckets. Each bucket is a tree of cache-line sized
//! nodes holding up to [`FANOUT`] sorted keys; a key smaller than `keys[i]` (and larger than
//! `keys[i - 1]`) lives under `children[i]`. Nodes only gain children once full, and a full node
//! that sees a key larger than all of its own keeps the new key and pushes its old maximum one
//! level down, so no rebalancing is ever needed.
//!
//! Handle slots sit in a separate table parallel to the node arena so the walk only touches the
//! dense key arrays. A slot's handle moves together with its key whenever keys shift or get
//! evicted.
//!
//! ## Locking
//!
//! Walks start under the bucket's read lock. The first mutation upgrades it: the bucket version
//! is remembered, the read lock dropped and the write lock taken; if the version moved in
//! between, the walk is abandoned and the caller gets [`Lookup::Retry`]. A reserved entry keeps
//! the write lock until the caller drops it, so the caller's record is published atomically with
//! the key.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::search::arena::{Arena, BlockId};
use crate::search::config::CACHE_LINE;
use crate::search::error::SearchError;

/// Keys per index node: one cache line of `(key, child)` pairs.
pub const FANOUT: usize = CACHE_LINE / (2 * size_of::<u32>());
/// Number of buckets.
pub const HASHTBLSIZE: usize = 1023;
/// Marker of an unused key slot. Never a real hash.
pub const EMPTY_KEY: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct IndexNode {
    keys: [u32; FANOUT],
    children: [Option<BlockId>; FANOUT],
}

impl IndexNode {
    const EMPTY: IndexNode = IndexNode {
        keys: [EMPTY_KEY; FANOUT],
        children: [None; FANOUT],
    };

    #[inline]
    fn is_full(&self) -> bool {
        self.keys[FANOUT - 1] != EMPTY_KEY
    }
}

#[derive(Debug)]
struct Bucket {
    version: u64,
    root: BlockId,
}

enum BucketGuard<'a> {
    Shared(RwLockReadGuard<'a, Bucket>),
    Exclusive(RwLockWriteGuard<'a, Bucket>),
}

impl<'a> BucketGuard<'a> {
    fn root(&self) -> BlockId {
        match self {
            BucketGuard::Shared(g) => g.root,
            BucketGuard::Exclusive(g) => g.root,
        }
    }

    /// Trade a read lock for the write lock, or `None` if the bucket changed meanwhile.
    fn upgrade(self, lock: &'a RwLock<Bucket>) -> Option<Self> {
        match self {
            BucketGuard::Exclusive(g) => Some(BucketGuard::Exclusive(g)),
            BucketGuard::Shared(g) => {
                let seen = g.version;
                drop(g);
                let mut w = lock.write();
                if w.version != seen {
                    return None;
                }
                w.version += 1;
                Some(BucketGuard::Exclusive(w))
            }
        }
    }
}

/// Position of one key (and its handle slot) inside the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySlot {
    node: BlockId,
    pos: u8,
}

/// A located (or freshly reserved) index entry; holds the bucket lock until dropped.
pub struct IndexEntry<'a> {
    index: &'a Index,
    bucket: usize,
    slot: EntrySlot,
    guard: BucketGuard<'a>,
}

impl<'a> IndexEntry<'a> {
    /// Raw head of the candidate chain; 0 for a freshly reserved entry.
    #[inline]
    pub fn head(&self) -> u32 {
        self.index.handle(self.slot).load(Ordering::Relaxed)
    }

    /// Publish the head of the chain. Only valid while the bucket is write-locked.
    pub fn set_head(&mut self, raw: u32) {
        debug_assert!(self.is_exclusive());
        self.index.handle(self.slot).store(raw, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_exclusive(&self) -> bool {
        matches!(self.guard, BucketGuard::Exclusive(_))
    }

    pub fn bucket(&self) -> usize {
        self.bucket
    }

    /// Take the bucket's write lock for this entry. `None` means the bucket was modified after
    /// this entry was looked up; the caller must start over.
    pub fn upgrade(self) -> Option<IndexEntry<'a>> {
        let IndexEntry {
            index,
            bucket,
            slot,
            guard,
        } = self;
        let guard = guard.upgrade(&index.buckets[bucket])?;
        Some(IndexEntry {
            index,
            bucket,
            slot,
            guard,
        })
    }
}

/// Outcome of [`Index::lookup_or_reserve`].
pub enum Lookup<'a> {
    /// The bucket changed during a lock upgrade; nothing was modified.
    Retry,
    /// The key already exists. The entry may be read-locked.
    Found(IndexEntry<'a>),
    /// The key was added with a zero head. The entry is write-locked.
    Reserved(IndexEntry<'a>),
}

pub struct Index {
    buckets: Box<[RwLock<Bucket>]>,
    nodes: Arena<IndexNode>,
    handles: Box<[AtomicU32]>,
    entries: AtomicU64,
}

impl Index {
    /// An index with room for `node_capacity` nodes, `HASHTBLSIZE` of which become bucket roots.
    pub fn new(node_capacity: u32) -> Result<Self, SearchError> {
        if (node_capacity as usize) <= HASHTBLSIZE {
            return Err(SearchError::InvalidBudget {
                reason: format!(
                    "index needs more than {HASHTBLSIZE} nodes, got {node_capacity}"
                ),
            });
        }
        let nodes = Arena::new("index nodes", node_capacity)?;
        let slots = node_capacity as usize * FANOUT;
        let mut handles = Vec::new();
        handles
            .try_reserve_exact(slots)
            .map_err(|_| SearchError::AllocationFailed {
                structure: "index handles",
                requested: slots as u64,
            })?;
        handles.extend((0..slots).map(|_| AtomicU32::new(0)));

        let mut buckets = Vec::with_capacity(HASHTBLSIZE);
        for _ in 0..HASHTBLSIZE {
            let root = nodes.allocate(IndexNode::EMPTY)?;
            buckets.push(RwLock::new(Bucket { version: 0, root }));
        }
        Ok(Self {
            buckets: buckets.into_boxed_slice(),
            nodes,
            handles: handles.into_boxed_slice(),
            entries: AtomicU64::new(0),
        })
    }

    /// Bytes one index node costs, handle slots included.
    pub fn bytes_per_node() -> usize {
        size_of::<RwLock<IndexNode>>() + size_of::<u32>() + FANOUT * size_of::<AtomicU32>()
    }

    /// Keys stored so far.
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    /// Keys the node arena could hold if every node were full.
    pub fn entry_capacity(&self) -> u64 {
        self.nodes.capacity() as u64 * FANOUT as u64
    }

    pub fn nodes_used(&self) -> u32 {
        self.nodes.used()
    }

    #[inline]
    fn handle(&self, slot: EntrySlot) -> &AtomicU32 {
        &self.handles[(slot.node.get() as usize - 1) * FANOUT + slot.pos as usize]
    }

    #[inline]
    fn row(&self, node: BlockId) -> &[AtomicU32] {
        let start = (node.get() as usize - 1) * FANOUT;
        &self.handles[start..start + FANOUT]
    }

    /// Find `key`, or reserve it (write-locked, zero head) if it is new.
    ///
    /// `key` must not be 0 or [`EMPTY_KEY`].
    pub fn lookup_or_reserve(&self, key: u32) -> Result<Lookup<'_>, SearchError> {
        debug_assert!(key != 0 && key != EMPTY_KEY);
        let bucket = key as usize % HASHTBLSIZE;
        let lock = &self.buckets[bucket];
        let mut guard = BucketGuard::Shared(lock.read());
        let mut node_id = guard.root();

        // Once a full node has taken the new key, `key`/`carried` name the evicted entry that
        // is still looking for a home further down.
        let mut key = key;
        let mut carried = 0u32;
        let mut reserved: Option<EntrySlot> = None;

        macro_rules! upgrade {
            () => {
                guard = match guard.upgrade(lock) {
                    Some(g) => g,
                    None => return Ok(Lookup::Retry),
                }
            };
        }

        loop {
            let mut node = *self.nodes.resolve(node_id)?;
            let pos = node.keys.iter().position(|&k| key <= k).unwrap_or(FANOUT);

            if pos < FANOUT && node.keys[pos] == key {
                debug_assert!(reserved.is_none(), "evicted keys are unique");
                let slot = EntrySlot {
                    node: node_id,
                    pos: pos as u8,
                };
                return Ok(Lookup::Found(self.entry(guard, bucket, slot)));
            }

            if pos == FANOUT {
                // Larger than everything in a full node: swap places with the maximum.
                upgrade!();
                let last = FANOUT - 1;
                std::mem::swap(&mut key, &mut node.keys[last]);
                carried = self.row(node_id)[last].swap(carried, Ordering::Relaxed);
                *self.nodes.resolve_mut(node_id)? = node;
                reserved.get_or_insert(EntrySlot {
                    node: node_id,
                    pos: last as u8,
                });
            } else if !node.is_full() {
                upgrade!();
                node.keys.copy_within(pos..FANOUT - 1, pos + 1);
                node.keys[pos] = key;
                *self.nodes.resolve_mut(node_id)? = node;
                let row = self.row(node_id);
                for i in (pos + 1..FANOUT).rev() {
                    row[i].store(row[i - 1].load(Ordering::Relaxed), Ordering::Relaxed);
                }
                row[pos].store(carried, Ordering::Relaxed);
                self.entries.fetch_add(1, Ordering::Relaxed);
                let slot = reserved.unwrap_or(EntrySlot {
                    node: node_id,
                    pos: pos as u8,
                });
                return Ok(Lookup::Reserved(self.entry(guard, bucket, slot)));
            }

            let down = pos.min(FANOUT - 1);
            node_id = match node.children[down] {
                Some(child) => child,
                None => {
                    upgrade!();
                    let child = self.nodes.allocate(IndexNode::EMPTY)?;
                    for h in self.row(child) {
                        h.store(0, Ordering::Relaxed);
                    }
                    self.nodes.resolve_mut(node_id)?.children[down] = Some(child);
                    child
                }
            };
        }
    }

    fn entry<'a>(
        &'a self,
        guard: BucketGuard<'a>,
        bucket: usize,
        slot: EntrySlot,
    ) -> IndexEntry<'a> {
        IndexEntry {
            index: self,
            bucket,
            slot,
            guard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use proptest::prelude::*;

    fn insert(index: &Index, key: u32, head: u32) -> bool {
        loop {
            match index.lookup_or_reserve(key).unwrap() {
                Lookup::Retry => continue,
                Lookup::Found(_) => return false,
                Lookup::Reserved(mut e) => {
                    assert_eq!(e.head(), 0);
                    e.set_head(head);
                    return true;
                }
            }
        }
    }

    fn head_of(index: &Index, key: u32) -> Option<u32> {
        match index.lookup_or_reserve(key).unwrap() {
            Lookup::Found(e) => Some(e.head()),
            _ => None,
        }
    }

    #[test]
    fn nodes_fill_one_cache_line() {
        assert_eq!(FANOUT, 8);
        assert_eq!(size_of::<IndexNode>(), CACHE_LINE);
    }

    #[test]
    fn reserve_then_find() {
        let index = Index::new(2048).unwrap();
        assert!(insert(&index, 5, 42));
        match index.lookup_or_reserve(5).unwrap() {
            Lookup::Found(e) => {
                assert_eq!(e.head(), 42);
                assert!(!e.is_exclusive());
                assert_eq!(e.bucket(), 5);
            }
            _ => panic!("expected the reserved key to be found"),
        }
        assert_eq!(index.entries(), 1);
    }

    #[test]
    fn found_entries_upgrade_when_the_bucket_is_quiet() {
        let index = Index::new(2048).unwrap();
        insert(&index, 77, 1);
        let Lookup::Found(e) = index.lookup_or_reserve(77).unwrap() else {
            panic!("expected Found");
        };
        let mut e = e.upgrade().expect("no concurrent writer");
        assert!(e.is_exclusive());
        e.set_head(2);
        drop(e);
        assert_eq!(head_of(&index, 77), Some(2));
    }

    #[test]
    fn ascending_keys_in_one_bucket_evict_with_their_handles() {
        let index = Index::new(4096).unwrap();
        let keys: Vec<u32> = (1..300).map(|k| k * HASHTBLSIZE as u32 + 3).collect();
        for (i, &k) in keys.iter().enumerate() {
            assert!(insert(&index, k, i as u32 + 1));
        }
        for (i, &k) in keys.iter().enumerate() {
            assert_eq!(head_of(&index, k), Some(i as u32 + 1), "key {k}");
        }
        assert!(index.nodes_used() > HASHTBLSIZE as u32);
        assert_eq!(index.entries(), keys.len() as u64);
    }

    #[test]
    fn too_small_a_node_budget_is_rejected() {
        assert!(matches!(
            Index::new(HASHTBLSIZE as u32),
            Err(SearchError::InvalidBudget { .. })
        ));
    }

    #[test]
    fn racing_reservations_bind_each_key_once() {
        let index = Index::new(8192).unwrap();
        let winners: u64 = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8u32)
                .map(|t| {
                    let index = &index;
                    s.spawn(move || {
                        (1..2000u32)
                            .map(|k| k.wrapping_mul(2_654_435_761) % 50_000 + 1)
                            .filter(|&k| insert(index, k, t + 1))
                            .count() as u64
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, index.entries());
        for k in 1..2000u32 {
            let key = k.wrapping_mul(2_654_435_761) % 50_000 + 1;
            let head = head_of(&index, key).unwrap();
            assert!((1..=8).contains(&head));
        }
    }

    #[test]
    fn an_upgrade_that_loses_the_race_writes_nothing() {
        // `held` pins the bucket with a read lock while `racer` tries to reserve a new key in the
        // same bucket. Both then want the write lock; whoever gets it second must see the
        // version move and back off. The sleep only makes the race likely, so keep trying.
        let (first, second) = (5, 5 + HASHTBLSIZE as u32);
        let mut retried = false;
        for attempt in 1..=50u64 {
            let index = Index::new(2048).unwrap();
            insert(&index, first, 1);
            let Lookup::Found(held) = index.lookup_or_reserve(first).unwrap() else {
                panic!("expected Found");
            };

            let (held_won, racer_retried) = std::thread::scope(|s| {
                let racer = s.spawn(|| match index.lookup_or_reserve(second).unwrap() {
                    Lookup::Retry => true,
                    Lookup::Reserved(mut e) => {
                        e.set_head(2);
                        false
                    }
                    Lookup::Found(_) => panic!("second key was never inserted"),
                });
                std::thread::sleep(Duration::from_millis(attempt));
                let held_won = held.upgrade().map(|mut e| e.set_head(3)).is_some();
                (held_won, racer.join().unwrap())
            });

            assert!(held_won || !racer_retried, "both sides backed off");
            if racer_retried {
                assert_eq!(index.entries(), 1);
                assert_eq!(head_of(&index, first), Some(3));
                retried = true;
                break;
            }
            if !held_won {
                assert_eq!(index.entries(), 2);
                assert_eq!(head_of(&index, first), Some(1));
                assert_eq!(head_of(&index, second), Some(2));
                retried = true;
                break;
            }
        }
        assert!(retried, "no upgrade ever lost the race");
    }

    proptest! {
        #[test]
        fn prop_every_inserted_key_keeps_its_head(
            keys in proptest::collection::hash_set(1u32..200_000, 1..600)
        ) {
            let index = Index::new(HASHTBLSIZE as u32 + 512).unwrap();
            for &k in &keys {
                prop_assert!(insert(&index, k, k));
            }
            for &k in &keys {
                prop_assert_eq!(head_of(&index, k), Some(k));
                prop_assert!(!insert(&index, k, 0));
            }
            prop_assert_eq!(index.entries(), keys.len() as u64);
        }
    }
}
