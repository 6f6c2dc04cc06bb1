//! Solution paths: recovering moves from stored states, and replaying them.
//!
//! Placements keep each type group sorted by location, so a slot index does not identify a
//! piece across moves. Piece identity is tracked by history instead: `perm[slot]` is the
//! identity (slot in the initial placement) of the piece currently in `slot`.

use crate::board::Board;
use crate::core::direction::Direction;
use crate::core::placement::Placement;
use crate::search::error::SearchError;
use crate::search::handle::StateHandle;
use crate::search::store::StateStore;

/// One move of a solution: piece identity and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub piece: usize,
    pub dir: Direction,
}

/// The moves leading from the root to `handle`, in order.
pub fn reconstruct(
    store: &StateStore<'_>,
    handle: StateHandle,
) -> Result<Vec<PathStep>, SearchError> {
    let mut chain = vec![handle];
    while let Some(parent) = store.link(chain[chain.len() - 1])?.parent {
        chain.push(parent);
    }
    chain.reverse();

    let board = store.board();
    let mut perm: Vec<usize> = (0..board.piece_count()).collect();
    let mut prev = store.resolve(chain[0])?.placement;
    let mut steps = Vec::with_capacity(chain.len() - 1);
    for (step, &h) in chain.iter().enumerate().skip(1) {
        let next = store.resolve(h)?.placement;
        let mv = diff_move(board, &prev, &next, &mut perm)
            .map_err(|reason| SearchError::InvalidPath { step, reason })?;
        steps.push(mv);
        prev = next;
    }
    Ok(steps)
}

/// The single move turning `from` into `to`, updating `perm` to the slots of `to`.
fn diff_move(
    board: &Board,
    from: &Placement,
    to: &Placement,
    perm: &mut Vec<usize>,
) -> Result<PathStep, String> {
    let n = from.count();
    if to.count() != n {
        return Err(format!("piece count changed from {} to {}", n, to.count()));
    }
    let mut next_perm = vec![usize::MAX; n];
    let mut moved = None;
    for i in 0..n {
        let j = match to.find(from.get(i)) {
            Some(j) => j,
            None => {
                if moved.is_some() {
                    return Err("more than one piece moved".into());
                }
                let j = (0..n)
                    .find(|&j| from.find(to.get(j)).is_none())
                    .ok_or("moved piece has no destination")?;
                let (src, dst) = (from.get(i), to.get(j));
                let dir = Direction::between(src as usize, dst as usize, board.width())
                    .ok_or_else(|| format!("{src} -> {dst} is not a single step"))?;
                moved = Some(PathStep { piece: perm[i], dir });
                j
            }
        };
        next_perm[j] = perm[i];
    }
    *perm = next_perm;
    moved.ok_or_else(|| "no piece moved".into())
}

/// Play `steps` from the initial placement, checking each move is legal. Returns the final
/// placement.
pub fn replay(board: &Board, steps: &[PathStep]) -> Result<Placement, SearchError> {
    let mut placement = board.initial();
    let mut perm: Vec<usize> = (0..board.piece_count()).collect();
    let mut grid = board.new_grid();
    for (step, mv) in steps.iter().enumerate() {
        let invalid = |reason: String| SearchError::InvalidPath { step, reason };
        let slot = perm
            .iter()
            .position(|&id| id == mv.piece)
            .ok_or_else(|| invalid(format!("unknown piece {}", mv.piece)))?;
        board.fill_grid(&placement, &mut grid);
        let piece_type = board.layout().type_index(slot);
        if !board.can_move(&grid, piece_type, placement.get(slot), mv.dir) {
            return Err(invalid(format!("piece {} cannot move {:?}", mv.piece, mv.dir)));
        }
        let landed = board.apply_move(&mut placement, slot, mv.dir);
        let id = perm.remove(slot);
        perm.insert(landed, id);
    }
    Ok(placement)
}
