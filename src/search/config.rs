//! Search budgets and solver knobs.
//!
//! Every fixed-capacity structure is sized once from a [`SearchBudget`] before the search
//! starts; nothing grows mid-run, so exhausting any of them is fatal.

use std::time::Duration;

use crate::search::error::SearchError;
use crate::search::index::{FANOUT, HASHTBLSIZE};
use crate::search::store;

/// Cache-line size the index nodes and queue groups are laid out for.
pub const CACHE_LINE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Capacity plan for one solve.
///
/// - `states`: total number of stored states (Full + Semi), a multiple of `full_ratio`
/// - `full_ratio`: roughly one state in `full_ratio` keeps its whole placement
/// - `nodes` / `node`: reserved for multi-node partitioning; only `nodes == 1` is supported
pub struct SearchBudget {
    pub states: u32,
    pub full_ratio: u32,
    pub nodes: u16,
    pub node: u16,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            states: 1 << 20,
            full_ratio: 8,
            nodes: 1,
            node: 0,
        }
    }
}

impl SearchBudget {
    /// A budget for `states` states, rounded up to a multiple of the default full ratio.
    pub fn with_states(states: u64) -> Self {
        Self::default().resized(states)
    }

    /// Same ratios, new state count (rounded up to a multiple of `full_ratio`).
    pub fn resized(mut self, states: u64) -> Self {
        let ratio = self.full_ratio.max(1) as u64;
        let ceiling = (u32::MAX as u64 / 2) / ratio * ratio;
        let rounded = states.max(ratio).div_ceil(ratio) * ratio;
        self.states = rounded.min(ceiling) as u32;
        self
    }

    pub fn with_full_ratio(mut self, full_ratio: u32) -> Self {
        self.full_ratio = full_ratio;
        self.resized(self.states as u64)
    }

    /// Largest budget with this `full_ratio` whose structures fit in roughly `bytes` of memory.
    pub fn from_memory(bytes: u64, full_ratio: u32) -> Self {
        let base = Self {
            full_ratio,
            ..Self::default()
        };
        let per_state = store::bytes_per_state(base.full_ratio).max(1.0);
        let fixed = (HASHTBLSIZE * store::index_bytes_per_node()) as f64;
        let usable = (bytes as f64 - fixed).max(0.0);
        base.resized((usable / per_state) as u64)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        let fail = |reason: String| Err(SearchError::InvalidBudget { reason });
        if self.full_ratio < 2 {
            return fail(format!("full_ratio must be >= 2, got {}", self.full_ratio));
        }
        if self.states == 0 || self.states % self.full_ratio != 0 {
            return fail(format!(
                "states ({}) must be a positive multiple of full_ratio ({})",
                self.states, self.full_ratio
            ));
        }
        if self.states > u32::MAX / 2 {
            return fail(format!("states ({}) exceeds the handle space", self.states));
        }
        if self.nodes == 0 || self.node >= self.nodes {
            return fail(format!("node {} of {} is not a valid node", self.node, self.nodes));
        }
        Ok(())
    }

    #[inline]
    pub fn full_capacity(&self) -> u32 {
        self.states / self.full_ratio
    }

    #[inline]
    pub fn semi_capacity(&self) -> u32 {
        self.states - self.full_capacity()
    }

    /// Index nodes: one permanent root per bucket plus two entries per state.
    pub fn index_nodes(&self) -> u32 {
        HASHTBLSIZE as u32 + (2 * self.states as u64).div_ceil(FANOUT as u64) as u32
    }

    /// Queue capacity: half the states, in whole groups of `fanout`.
    pub fn queue_capacity(&self, fanout: usize) -> usize {
        fanout * (self.states as usize / 2 / fanout).max(1)
    }
}

#[derive(Debug, Clone)]
/// Knobs for [`crate::search::solver::Solver::solve`].
pub struct SolverConfig {
    pub threads: usize,
    /// How often the coordinating thread logs progress.
    pub progress_interval: Duration,
    /// How long a worker with nothing to pop waits before re-checking its peers.
    pub stall_sleep: Duration,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            progress_interval: Duration::from_millis(100),
            stall_sleep: Duration::from_millis(1),
        }
    }
}

impl SolverConfig {
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            ..Self::default()
        }
    }
}
