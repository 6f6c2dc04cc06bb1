//! Parallel best-first search over the sliding-puzzle state graph.
//!
//! Workers share one [`StateStore`] and one [`PriorityQueue`]. Each worker repeatedly pops the
//! most promising state, expands it, inserts the successors (deduplicating through the store)
//! and pushes the new ones with priority `depth + heuristic`.
//!
//! Termination: `active` counts workers that are not stalled. A worker whose pop comes back
//! empty leaves the count, sleeps, and then either exits (count reached zero, so nobody can
//! push any more work) or rejoins and tries again. A found solution or a fatal error stops
//! everyone at their next loop check.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::board::Board;
use crate::search::config::{SearchBudget, SolverConfig};
use crate::search::error::SearchError;
use crate::search::expand::{Expander, Successor};
use crate::search::handle::StateHandle;
use crate::search::path::{self, PathStep};
use crate::search::queue::PriorityQueue;
use crate::search::stats::{percent, SearchStats, WorkerCounters};
use crate::search::store::{Candidate, InsertOutcome, StateStore};

#[derive(Debug, Clone, Copy)]
pub struct SearchOutcome {
    /// A state whose main piece sits on the goal, if one was reached.
    pub solution: Option<StateHandle>,
    pub stats: SearchStats,
}

/// State shared by the workers of one solve.
struct SearchShared {
    active: AtomicUsize,
    /// Raw handle of the first goal state found; 0 until then.
    solution: AtomicU32,
    abort: AtomicBool,
    fatal: Mutex<Option<SearchError>>,
}

impl SearchShared {
    fn new(workers: usize) -> Self {
        Self {
            active: AtomicUsize::new(workers),
            solution: AtomicU32::new(0),
            abort: AtomicBool::new(false),
            fatal: Mutex::new(None),
        }
    }

    #[inline]
    fn is_finished(&self) -> bool {
        self.solution.load(Ordering::Acquire) != 0 || self.abort.load(Ordering::Acquire)
    }

    /// First writer wins; later solutions are dropped.
    fn claim_solution(&self, raw: u32) -> bool {
        self.solution
            .compare_exchange(0, raw, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn fail(&self, err: SearchError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(err);
        }
        self.abort.store(true, Ordering::Release);
    }
}

/// How a worker's loop ended.
enum WorkerExit {
    /// Still counted in `active`.
    Running,
    /// Already removed itself from `active` while stalled.
    Stalled,
}

pub struct Solver<'b> {
    board: &'b Board,
    store: StateStore<'b>,
    queue: PriorityQueue<u32>,
    root: StateHandle,
    /// Set when the initial placement already satisfies the goal.
    solved_at_root: bool,
}

impl<'b> Solver<'b> {
    /// Size every structure from `budget`, store the initial placement and queue it.
    pub fn new(board: &'b Board, budget: SearchBudget) -> Result<Self, SearchError> {
        budget.validate()?;
        let store = StateStore::new(board, &budget)?;
        let queue = PriorityQueue::new(budget.queue_capacity(PriorityQueue::<u32>::fanout()));
        let root = loop {
            match store.insert(&Candidate::root(board.initial()))? {
                InsertOutcome::Inserted(h) | InsertOutcome::Duplicate(h) => break h,
                InsertOutcome::Retry => continue,
            }
        };
        queue.push(store.codec().encode(root), 0.0)?;
        info!(
            board = board.name(),
            pieces = board.piece_count(),
            types = board.types().len(),
            spaces = board.free_count(),
            states = budget.states,
            full_ratio = budget.full_ratio,
            index_entries = store.index().entry_capacity(),
            queue = queue.capacity(),
            "solver initialized"
        );
        Ok(Self {
            board,
            store,
            queue,
            root,
            solved_at_root: board.is_goal(&board.initial()),
        })
    }

    pub fn root(&self) -> StateHandle {
        self.root
    }

    pub fn board(&self) -> &'b Board {
        self.board
    }

    pub fn store(&self) -> &StateStore<'b> {
        &self.store
    }

    /// Run the workers until a goal state is found, the reachable space is exhausted, or a
    /// fatal error stops the search.
    pub fn solve(&self, config: &SolverConfig) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        if self.solved_at_root {
            info!("initial placement already solves the board");
            return Ok(SearchOutcome {
                solution: Some(self.root),
                stats: self.stats(&[], started.elapsed()),
            });
        }

        let threads = config.threads.max(1);
        let shared = SearchShared::new(threads);
        let counters: Vec<WorkerCounters> =
            (0..threads).map(|_| WorkerCounters::default()).collect();
        info!(threads, "search started");

        thread::scope(|s| {
            let handles: Vec<_> = counters
                .iter()
                .map(|c| {
                    let shared = &shared;
                    s.spawn(move || self.worker(shared, c, config))
                })
                .collect();

            let tick = config.progress_interval.min(Duration::from_millis(5));
            let mut last = Instant::now();
            while handles.iter().any(|h| !h.is_finished()) {
                thread::sleep(tick);
                if last.elapsed() >= config.progress_interval {
                    self.log_progress(&counters);
                    last = Instant::now();
                }
            }
            for h in handles {
                if let Err(panic) = h.join() {
                    std::panic::resume_unwind(panic);
                }
            }
        });

        if let Some(err) = shared.fatal.into_inner() {
            return Err(err);
        }
        let solution = self.store.codec().decode(shared.solution.into_inner());
        let stats = self.stats(&counters, started.elapsed());
        info!(
            solved = solution.is_some(),
            examined = stats.examined,
            unique = stats.unique,
            duplicates = stats.duplicates,
            retries = stats.retries,
            shorter_paths = stats.shorter_paths,
            max_depth = stats.max_depth,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "search finished"
        );
        Ok(SearchOutcome { solution, stats })
    }

    /// Moves from the initial placement to `handle`, as `(piece, direction)` pairs.
    pub fn reconstruct_path(&self, handle: StateHandle) -> Result<Vec<PathStep>, SearchError> {
        path::reconstruct(&self.store, handle)
    }

    /// Release every structure of this solve.
    pub fn teardown(self) {
        debug!(
            states = self.store.state_count(),
            index_nodes = self.store.index().nodes_used(),
            queued = self.queue.len(),
            "tearing down solver"
        );
    }

    fn worker(&self, shared: &SearchShared, counters: &WorkerCounters, config: &SolverConfig) {
        let exit = match self.run_worker(shared, counters, config) {
            Ok(exit) => exit,
            Err(err) => {
                shared.fail(err);
                WorkerExit::Running
            }
        };
        if let WorkerExit::Running = exit {
            shared.active.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn run_worker(
        &self,
        shared: &SearchShared,
        counters: &WorkerCounters,
        config: &SolverConfig,
    ) -> Result<WorkerExit, SearchError> {
        let mut expander = Expander::new(self.board);
        let mut successors = Vec::new();
        loop {
            if shared.is_finished() {
                return Ok(WorkerExit::Running);
            }
            let raw = match self.queue.pop() {
                Some(raw) => raw,
                None => match self.stall(shared, config) {
                    Some(raw) => raw,
                    None => return Ok(WorkerExit::Stalled),
                },
            };
            self.expand(raw, &mut expander, &mut successors, shared, counters)?;
        }
    }

    /// Wait for peers to produce work. `None` means the search is over for this worker.
    fn stall(&self, shared: &SearchShared, config: &SolverConfig) -> Option<u32> {
        loop {
            shared.active.fetch_sub(1, Ordering::AcqRel);
            thread::sleep(config.stall_sleep);
            if shared.active.load(Ordering::Acquire) == 0 || shared.is_finished() {
                return None;
            }
            shared.active.fetch_add(1, Ordering::AcqRel);
            if let Some(raw) = self.queue.pop() {
                return Some(raw);
            }
        }
    }

    fn expand(
        &self,
        raw: u32,
        expander: &mut Expander<'_>,
        successors: &mut Vec<Successor>,
        shared: &SearchShared,
        counters: &WorkerCounters,
    ) -> Result<(), SearchError> {
        let codec = self.store.codec();
        let handle = codec.decode_required(raw, "priority queue")?;
        let state = self.store.resolve(handle)?;
        counters.set_depth(state.depth);

        expander.successors(&state.placement, successors);
        for succ in successors.iter() {
            WorkerCounters::bump(&counters.examined);
            let cand = Candidate::child(handle, state.depth, succ.piece, succ.dir, succ.placement);
            let child = loop {
                match self.store.insert(&cand)? {
                    InsertOutcome::Inserted(h) => break Some(h),
                    InsertOutcome::Duplicate(_) => break None,
                    InsertOutcome::Retry => WorkerCounters::bump(&counters.retries),
                }
            };
            let Some(child) = child else {
                WorkerCounters::bump(&counters.duplicates);
                continue;
            };

            let raw_child = codec.encode(child);
            if self.board.is_goal(&succ.placement) && shared.claim_solution(raw_child) {
                debug!(%child, depth = cand.depth, "goal reached");
            }
            let h = expander.heuristic(&succ.placement);
            counters.set_heuristic(h);
            self.queue.push(raw_child, cand.depth as f32 + h)?;
        }
        Ok(())
    }

    fn log_progress(&self, counters: &[WorkerCounters]) {
        let examined: u64 = counters.iter().map(|c| WorkerCounters::get(&c.examined)).sum();
        let unique = self.store.state_count();
        let lead = &counters[0];
        info!(
            depth = lead.depth.load(Ordering::Relaxed),
            heuristic = lead.heuristic(),
            examined_m = examined as f64 / 1e6,
            unique_m = unique as f64 / 1e6,
            states_pct = percent(unique, examined),
            fill_pct = percent(unique, self.store.capacity()),
            index_pct = percent(self.store.index().entries(), examined),
            queue_pct = percent(self.queue.len() as u64, examined),
            "progress"
        );
    }

    fn stats(&self, counters: &[WorkerCounters], elapsed: Duration) -> SearchStats {
        let sum = |f: fn(&WorkerCounters) -> u64| counters.iter().map(f).sum::<u64>();
        SearchStats {
            examined: sum(|c| WorkerCounters::get(&c.examined)),
            unique: self.store.state_count(),
            duplicates: sum(|c| WorkerCounters::get(&c.duplicates)),
            retries: sum(|c| WorkerCounters::get(&c.retries)),
            shorter_paths: self.store.shorter_paths(),
            max_depth: counters
                .iter()
                .map(|c| c.max_depth.load(Ordering::Relaxed))
                .max()
                .unwrap_or(0),
            queue_len: self.queue.len(),
            index_entries: self.store.index().entries(),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRIDOR: &str = "\
corridor
5 3 8
#####
#*  #
#####
";

    #[test]
    fn shared_solution_keeps_the_first_writer() {
        let shared = SearchShared::new(2);
        assert!(!shared.is_finished());
        assert!(shared.claim_solution(16));
        assert!(!shared.claim_solution(24));
        assert_eq!(shared.solution.load(Ordering::Relaxed), 16);
        assert!(shared.is_finished());
    }

    #[test]
    fn first_fatal_error_is_kept() {
        let shared = SearchShared::new(1);
        shared.fail(SearchError::InvalidBudget { reason: "first".into() });
        shared.fail(SearchError::InvalidBudget { reason: "second".into() });
        assert!(shared.is_finished());
        match shared.fatal.into_inner() {
            Some(SearchError::InvalidBudget { reason }) => assert_eq!(reason, "first"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn a_solved_root_needs_no_search() {
        let board = Board::parse("done\n5 3 6\n#####\n#*  #\n#####\n").unwrap();
        let solver = Solver::new(&board, SearchBudget::with_states(1024)).unwrap();
        let outcome = solver.solve(&SolverConfig::with_threads(2)).unwrap();
        assert_eq!(outcome.solution, Some(solver.root()));
        assert!(solver.reconstruct_path(solver.root()).unwrap().is_empty());
        assert_eq!(outcome.stats.examined, 0);
    }

    #[test]
    fn corridor_stats_add_up() {
        let board = Board::parse(CORRIDOR).unwrap();
        let solver = Solver::new(&board, SearchBudget::with_states(1024)).unwrap();
        let outcome = solver.solve(&SolverConfig::with_threads(1)).unwrap();
        let stats = outcome.stats;
        assert!(outcome.solution.is_some());
        assert_eq!(stats.unique, 3);
        assert_eq!(stats.examined, stats.unique - 1 + stats.duplicates);
        assert_eq!(stats.max_depth, 1);
        solver.teardown();
    }
}
