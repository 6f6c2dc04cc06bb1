//! Thread-safe d-ary min-heap of pending states (the open list).
//!
//! Entries live in a flat array split into groups of `fanout` entries, where `fanout` is the
//! number of entries per cache line. Group 0 holds the top-level entries; the children of the
//! entry at position `e` form group `e + 1`, so the parent of position `k` is `k / fanout - 1`.
//! Slots past the end are filled with an infinite-priority sentinel so a partially filled group
//! can be scanned without bounds checks.

use std::mem::size_of;

use parking_lot::Mutex;

use crate::search::config::CACHE_LINE;
use crate::search::error::SearchError;

const SENTINEL: f32 = f32::INFINITY;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueEntry<T> {
    pub priority: f32,
    pub item: T,
}

impl<T: Default> QueueEntry<T> {
    fn sentinel() -> Self {
        Self {
            priority: SENTINEL,
            item: T::default(),
        }
    }
}

#[derive(Debug)]
struct Heap<T> {
    entries: Vec<QueueEntry<T>>,
    len: usize,
}

#[derive(Debug)]
pub struct PriorityQueue<T> {
    heap: Mutex<Heap<T>>,
    fanout: usize,
    capacity: usize,
}

/// Position of the smallest priority in `group`, scanning two lanes at a time.
fn group_min<T>(group: &[QueueEntry<T>]) -> usize {
    let (mut a, mut b) = (0usize, 1usize.min(group.len() - 1));
    let mut i = 2;
    while i + 1 < group.len() {
        if group[i].priority < group[a].priority {
            a = i;
        }
        if group[i + 1].priority < group[b].priority {
            b = i + 1;
        }
        i += 2;
    }
    if i < group.len() && group[i].priority < group[a].priority {
        a = i;
    }
    if group[b].priority < group[a].priority {
        b
    } else {
        a
    }
}

impl<T: Copy + Default> PriorityQueue<T> {
    /// Entries per group.
    pub const fn fanout() -> usize {
        let f = CACHE_LINE / size_of::<QueueEntry<T>>();
        if f < 2 {
            2
        } else {
            f
        }
    }

    /// A queue that refuses pushes beyond `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let fanout = Self::fanout();
        Self {
            heap: Mutex::new(Heap {
                entries: Vec::new(),
                len: 0,
            }),
            fanout,
            capacity: capacity.div_ceil(fanout) * fanout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, item: T, priority: f32) -> Result<(), SearchError> {
        debug_assert!(priority < SENTINEL);
        let f = self.fanout;
        let mut heap = self.heap.lock();
        let Heap { entries, len } = &mut *heap;

        if *len == entries.len() {
            if *len >= self.capacity {
                return Err(SearchError::Exhausted {
                    structure: "priority queue",
                    capacity: self.capacity as u64,
                });
            }
            entries.resize(*len + f, QueueEntry::sentinel());
        }

        let mut pos = *len;
        entries[pos] = QueueEntry { priority, item };
        *len += 1;
        while pos >= f {
            let parent = pos / f - 1;
            if entries[parent].priority <= entries[pos].priority {
                break;
            }
            entries.swap(parent, pos);
            pos = parent;
        }
        Ok(())
    }

    /// Remove the entry with the smallest priority; `None` when the queue is empty.
    pub fn pop_entry(&self) -> Option<QueueEntry<T>> {
        let f = self.fanout;
        let mut heap = self.heap.lock();
        let Heap { entries, len } = &mut *heap;
        if *len == 0 {
            return None;
        }

        let top = group_min(&entries[..f]);
        let result = entries[top];
        *len -= 1;
        let tail = std::mem::replace(&mut entries[*len], QueueEntry::sentinel());
        if top == *len {
            return Some(result);
        }

        let mut pos = top;
        entries[pos] = tail;
        loop {
            let start = (pos + 1) * f;
            if start >= *len {
                break;
            }
            let child = start + group_min(&entries[start..start + f]);
            if entries[child].priority >= entries[pos].priority {
                break;
            }
            entries.swap(child, pos);
            pos = child;
        }
        Some(result)
    }

    #[inline]
    pub fn pop(&self) -> Option<T> {
        self.pop_entry().map(|e| e.item)
    }
}
