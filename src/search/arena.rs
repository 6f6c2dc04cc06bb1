//! Fixed-capacity slab allocator with stable integer handles.
//!
//! Blocks are named by a [`BlockId`] in `1..=capacity` (0 is never handed out). Allocation
//! pops the free chain first and otherwise advances the high-water mark; the chain is threaded
//! through the vacant slots themselves. The arena never resizes once built.
//!
//! Bookkeeping (free chain, high-water mark) sits behind one mutex per arena. Each slot carries
//! its own reader-writer lock so records can be read concurrently once published; no reference
//! into the backing storage escapes except through a lock guard.

use std::num::NonZeroU32;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

use crate::search::error::SearchError;

/// Stable handle of one arena block.
pub type BlockId = NonZeroU32;

#[derive(Debug)]
enum Slot<T> {
    Vacant { next_free: u32 },
    Occupied(T),
}

#[derive(Debug, Default)]
struct Bookkeeping {
    /// Number of blocks ever handed out from virgin memory.
    brk: u32,
    /// Head of the free chain (0 = empty).
    free: u32,
    used: u32,
}

#[derive(Debug)]
pub struct Arena<T> {
    name: &'static str,
    slots: Box<[RwLock<Slot<T>>]>,
    books: Mutex<Bookkeeping>,
}

impl<T> Arena<T> {
    pub fn new(name: &'static str, capacity: u32) -> Result<Self, SearchError> {
        let mut slots: Vec<RwLock<Slot<T>>> = Vec::new();
        slots
            .try_reserve_exact(capacity as usize)
            .map_err(|_| SearchError::AllocationFailed {
                structure: name,
                requested: capacity as u64,
            })?;
        slots.extend((0..capacity).map(|_| RwLock::new(Slot::Vacant { next_free: 0 })));
        Ok(Self {
            name,
            slots: slots.into_boxed_slice(),
            books: Mutex::new(Bookkeeping::default()),
        })
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Blocks currently allocated.
    pub fn used(&self) -> u32 {
        self.books.lock().used
    }

    /// Highest block ever handed out from virgin memory.
    pub fn high_water(&self) -> u32 {
        self.books.lock().brk
    }

    /// Store `value` in a fresh block.
    pub fn allocate(&self, value: T) -> Result<BlockId, SearchError> {
        let id = {
            let mut books = self.books.lock();
            let id = if let Some(head) = NonZeroU32::new(books.free) {
                books.free = match &*self.slot(head).read() {
                    Slot::Vacant { next_free } => *next_free,
                    Slot::Occupied(_) => {
                        return Err(SearchError::InvalidHandle {
                            structure: self.name,
                            handle: head.get() as u64,
                        })
                    }
                };
                head
            } else if books.brk < self.capacity() {
                let fresh = NonZeroU32::MIN.saturating_add(books.brk);
                books.brk = fresh.get();
                fresh
            } else {
                return Err(SearchError::Exhausted {
                    structure: self.name,
                    capacity: self.capacity() as u64,
                });
            };
            books.used += 1;
            id
        };
        // The id is not visible to anyone else until we return it.
        *self.slot(id).write() = Slot::Occupied(value);
        Ok(id)
    }

    /// Return a block to the free chain.
    pub fn release(&self, id: BlockId) -> Result<T, SearchError> {
        self.check(id)?;
        let mut books = self.books.lock();
        let mut slot = self.slot(id).write();
        let previous = std::mem::replace(
            &mut *slot,
            Slot::Vacant {
                next_free: books.free,
            },
        );
        match previous {
            Slot::Occupied(value) => {
                books.free = id.get();
                books.used -= 1;
                Ok(value)
            }
            vacant => {
                *slot = vacant;
                Err(self.invalid(id))
            }
        }
    }

    /// Shared view of a live block.
    pub fn resolve(&self, id: BlockId) -> Result<MappedRwLockReadGuard<'_, T>, SearchError> {
        self.check(id)?;
        RwLockReadGuard::try_map(self.slot(id).read(), |slot| match slot {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        })
        .map_err(|_| self.invalid(id))
    }

    /// Exclusive view of a live block.
    pub fn resolve_mut(&self, id: BlockId) -> Result<MappedRwLockWriteGuard<'_, T>, SearchError> {
        self.check(id)?;
        RwLockWriteGuard::try_map(self.slot(id).write(), |slot| match slot {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        })
        .map_err(|_| self.invalid(id))
    }

    #[inline]
    fn slot(&self, id: BlockId) -> &RwLock<Slot<T>> {
        &self.slots[id.get() as usize - 1]
    }

    #[inline]
    fn check(&self, id: BlockId) -> Result<(), SearchError> {
        if id.get() > self.capacity() {
            return Err(self.invalid(id));
        }
        Ok(())
    }

    fn invalid(&self, id: BlockId) -> SearchError {
        SearchError::InvalidHandle {
            structure: self.name,
            handle: id.get() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn id(n: u32) -> BlockId {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn allocation_is_sequential_then_exhausts() {
        let arena: Arena<u64> = Arena::new("test", 3).unwrap();
        assert_eq!(arena.allocate(10).unwrap(), id(1));
        assert_eq!(arena.allocate(20).unwrap(), id(2));
        assert_eq!(arena.allocate(30).unwrap(), id(3));
        assert!(matches!(
            arena.allocate(40),
            Err(SearchError::Exhausted { capacity: 3, .. })
        ));
        assert_eq!(*arena.resolve(id(2)).unwrap(), 20);
        assert_eq!(arena.used(), 3);
    }

    #[test]
    fn released_blocks_are_reused_lifo() {
        let arena: Arena<u64> = Arena::new("test", 4).unwrap();
        for v in 0..4 {
            arena.allocate(v).unwrap();
        }
        assert_eq!(arena.release(id(2)).unwrap(), 1);
        assert_eq!(arena.release(id(4)).unwrap(), 3);
        assert!(arena.resolve(id(2)).is_err());
        assert!(arena.release(id(2)).is_err());
        assert_eq!(arena.allocate(7).unwrap(), id(4));
        assert_eq!(arena.allocate(8).unwrap(), id(2));
        assert_eq!(arena.high_water(), 4);
        assert_eq!(arena.used(), 4);
    }

    #[test]
    fn resolve_rejects_out_of_range_and_unallocated() {
        let arena: Arena<u8> = Arena::new("test", 2).unwrap();
        arena.allocate(1).unwrap();
        assert!(arena.resolve(id(2)).is_err());
        assert!(arena.resolve(id(3)).is_err());
        *arena.resolve_mut(id(1)).unwrap() = 9;
        assert_eq!(*arena.resolve(id(1)).unwrap(), 9);
    }

    #[test]
    fn concurrent_allocations_hand_out_distinct_ids() {
        let arena: Arena<usize> = Arena::new("test", 4000).unwrap();
        let mut all: Vec<u32> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let arena = &arena;
                    s.spawn(move || {
                        (0..1000)
                            .map(|i| arena.allocate(t * 1000 + i).unwrap().get())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
        assert!(arena.allocate(0).is_err());
    }

    proptest! {
        #[test]
        fn prop_live_ids_are_unique(ops in proptest::collection::vec(any::<bool>(), 1..200)) {
            let arena: Arena<u32> = Arena::new("prop", 64).unwrap();
            let mut live: Vec<BlockId> = Vec::new();
            for (step, alloc) in ops.into_iter().enumerate() {
                if alloc || live.is_empty() {
                    match arena.allocate(step as u32) {
                        Ok(b) => {
                            prop_assert!(!live.contains(&b));
                            live.push(b);
                        }
                        Err(_) => prop_assert_eq!(live.len(), 64),
                    }
                } else {
                    let b = live.swap_remove(step % live.len());
                    arena.release(b).unwrap();
                }
            }
            prop_assert_eq!(arena.used() as usize, live.len());
        }
    }
}
