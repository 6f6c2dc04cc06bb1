use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
/// Counters describing one finished (or aborted) solve.
pub struct SearchStats {
    /// Successors generated.
    pub examined: u64,
    /// States stored, root included.
    pub unique: u64,
    pub duplicates: u64,
    /// Inserts restarted after a concurrent writer changed the index bucket.
    pub retries: u64,
    /// Duplicates reached by a path shorter than the stored one.
    pub shorter_paths: u64,
    pub max_depth: u32,
    pub queue_len: usize,
    pub index_entries: u64,
    pub elapsed: Duration,
}

impl SearchStats {
    /// Unique states per examined successor, in percent.
    pub fn unique_percent(&self) -> f64 {
        percent(self.unique, self.examined)
    }
}

pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

/// Counters owned by one worker. Only the owner writes; the coordinator reads them for
/// progress reports, so relaxed ordering is enough.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    pub examined: AtomicU64,
    pub duplicates: AtomicU64,
    pub retries: AtomicU64,
    pub depth: AtomicU32,
    pub max_depth: AtomicU32,
    heuristic: AtomicU32,
}

impl WorkerCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_depth(&self, depth: u32) {
        self.depth.store(depth, Ordering::Relaxed);
        self.max_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn set_heuristic(&self, h: f32) {
        self.heuristic.store(h.to_bits(), Ordering::Relaxed);
    }

    pub fn heuristic(&self) -> f32 {
        f32::from_bits(self.heuristic.load(Ordering::Relaxed))
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
