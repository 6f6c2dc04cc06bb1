use std::path::PathBuf;

use thiserror::Error;

/// Structured errors returned by the board loader and the search engine.
///
/// Everything here is fatal for the run that raised it. Recoverable conditions (optimistic-lock
/// aborts, shorter-path anomalies) never become errors; they are counted in
/// [`crate::search::stats::SearchStats`].
#[derive(Error, Debug)]
pub enum SearchError {
    /// A fixed-capacity structure ran out of room. There is no growth path mid-run.
    #[error("{structure} exhausted (capacity={capacity})")]
    Exhausted {
        structure: &'static str,
        capacity: u64,
    },

    /// The backing allocation for a structure could not be reserved up front.
    #[error("allocation failed for {structure} ({requested} slots)")]
    AllocationFailed {
        structure: &'static str,
        requested: u64,
    },

    /// A handle was zero, out of range, or named a vacant slot.
    #[error("invalid handle {handle} for {structure}")]
    InvalidHandle {
        structure: &'static str,
        handle: u64,
    },

    /// A state hashed to another node; multi-node routing is not implemented.
    #[error("state with hash {hash:#010x} belongs to node {owner} of {nodes}, not node {node}")]
    ForeignNode {
        hash: u32,
        owner: u32,
        node: u16,
        nodes: u16,
    },

    /// The search budget is internally inconsistent.
    #[error("invalid search budget: {reason}")]
    InvalidBudget { reason: String },

    /// A board description could not be parsed.
    #[error("invalid board (line {line}): {reason}")]
    InvalidBoard { line: usize, reason: String },

    /// Two consecutive states on a solution path are not one legal move apart.
    #[error("invalid path at step {step}: {reason}")]
    InvalidPath { step: usize, reason: String },

    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SearchError {
    pub(crate) fn board(line: usize, reason: impl Into<String>) -> Self {
        SearchError::InvalidBoard {
            line,
            reason: reason.into(),
        }
    }
}
