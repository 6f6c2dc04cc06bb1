use rustc_hash::FxHashMap;

use slide_search::board::Board;
use slide_search::core::direction::Direction;
use slide_search::core::placement::Placement;
use slide_search::search::expand::Expander;
use slide_search::search::store::{state_hash, Candidate, InsertOutcome, StateStore};
use slide_search::search::{SearchBudget, StateHandle};

const KLOTSKI: &str = "\
klotski
6 7 26
######
#a**b#
#a**b#
#cdde#
#cfge#
#h  i#
######
";

/// A breadth-first spanning tree of the first `limit` distinct placements.
struct TreeNode {
    parent: Option<usize>,
    piece: usize,
    dir: Direction,
    placement: Placement,
    depth: u32,
}

fn spanning_tree(board: &Board, limit: usize) -> Vec<TreeNode> {
    let mut ex = Expander::new(board);
    let mut seen: FxHashMap<Placement, usize> = FxHashMap::default();
    let mut nodes = vec![TreeNode {
        parent: None,
        piece: 0,
        dir: Direction::North,
        placement: board.initial(),
        depth: 0,
    }];
    seen.insert(board.initial(), 0);
    let mut succ = Vec::new();
    let mut next = 0;
    while next < nodes.len() && nodes.len() < limit {
        let (placement, depth) = (nodes[next].placement, nodes[next].depth);
        ex.successors(&placement, &mut succ);
        for s in &succ {
            if nodes.len() >= limit || seen.contains_key(&s.placement) {
                continue;
            }
            seen.insert(s.placement, nodes.len());
            nodes.push(TreeNode {
                parent: Some(next),
                piece: s.piece,
                dir: s.dir,
                placement: s.placement,
                depth: depth + 1,
            });
        }
        next += 1;
    }
    nodes
}

fn insert_all(store: &StateStore<'_>, tree: &[TreeNode]) -> Vec<StateHandle> {
    let mut handles: Vec<StateHandle> = Vec::with_capacity(tree.len());
    for node in tree {
        let cand = match node.parent {
            None => Candidate::root(node.placement),
            Some(p) => Candidate::child(
                handles[p],
                tree[p].depth,
                node.piece,
                node.dir,
                node.placement,
            ),
        };
        let handle = loop {
            match store.insert(&cand).unwrap() {
                InsertOutcome::Inserted(h) | InsertOutcome::Duplicate(h) => break h,
                InsertOutcome::Retry => continue,
            }
        };
        handles.push(handle);
    }
    handles
}

#[test]
fn inserting_the_root_twice_yields_one_handle() {
    let board = Board::parse(KLOTSKI).unwrap();
    let store = StateStore::new(&board, &SearchBudget::with_states(1024)).unwrap();
    let first = store.insert(&Candidate::root(board.initial())).unwrap();
    let second = store.insert(&Candidate::root(board.initial())).unwrap();
    let InsertOutcome::Inserted(h) = first else {
        panic!("first insert must store the root, got {first:?}");
    };
    assert_eq!(second, InsertOutcome::Duplicate(h));
    assert_eq!(store.state_count(), 1);
}

#[test]
fn racing_inserts_bind_each_placement_to_one_handle() {
    let board = Board::parse(KLOTSKI).unwrap();
    let tree = spanning_tree(&board, 3000);
    let store = StateStore::new(&board, &SearchBudget::with_states(1 << 15)).unwrap();

    let views: Vec<Vec<StateHandle>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (store, tree) = (&store, &tree);
                s.spawn(move || insert_all(store, tree))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for view in &views[1..] {
        assert_eq!(view, &views[0]);
    }
    assert_eq!(store.state_count(), tree.len() as u64);
    let mut hashes: Vec<u32> = tree.iter().map(|n| state_hash(&n.placement)).collect();
    hashes.sort_unstable();
    hashes.dedup();
    assert_eq!(store.index().entries(), hashes.len() as u64);

    // A second pass from one thread only finds duplicates.
    for (node, &h) in tree.iter().zip(&views[0]) {
        let again = Candidate::root(node.placement);
        assert_eq!(store.insert(&again).unwrap(), InsertOutcome::Duplicate(h));
    }
}

#[test]
fn depth_is_one_more_than_the_parent() {
    let board = Board::parse(KLOTSKI).unwrap();
    let tree = spanning_tree(&board, 2000);
    let store = StateStore::new(&board, &SearchBudget::with_states(1 << 14)).unwrap();
    let handles = insert_all(&store, &tree);

    for (node, &h) in tree.iter().zip(&handles) {
        let state = store.resolve(h).unwrap();
        assert_eq!(state.placement, node.placement);
        assert_eq!(state.depth, node.depth);
        match state.link.parent {
            None => assert_eq!(state.depth, 0),
            Some(parent) => assert_eq!(store.resolve(parent).unwrap().depth + 1, state.depth),
        }
    }
}

#[test]
fn semi_records_step_back_to_their_parent() {
    let board = Board::parse(KLOTSKI).unwrap();
    let tree = spanning_tree(&board, 2000);
    let store = StateStore::new(&board, &SearchBudget::with_states(1 << 14)).unwrap();
    let handles = insert_all(&store, &tree);

    let mut semis = 0;
    for &h in handles.iter().filter(|h| !h.is_full()) {
        semis += 1;
        let state = store.resolve(h).unwrap();
        let parent = store.resolve(state.link.parent.unwrap()).unwrap().placement;

        let from = parent.get(state.link.piece as usize);
        let to = (from as isize + state.link.dir.offset(board.width())) as u16;
        let slot = state.placement.find(to).unwrap();
        let mut back = state.placement;
        board.apply_move(&mut back, slot, state.link.dir.opposite());
        assert_eq!(back, parent);
    }
    assert!(semis > 0);
    assert!(store.full_len() < handles.len() as u32);
}

/// Two distinct placements with the same hash, each reachable from its own parent by sliding
/// the main piece one cell east. The shared hash is not a Full residue, so both are stored as
/// Semi records when inserted as children.
fn colliding_children(board: &Board, full_ratio: u32) -> [(Placement, Placement); 2] {
    let child = |n: u32| {
        let mut p = board.initial();
        p.set(0, 1 + (n % 1000) as u16);
        p.set(1, (n / 1000 % 1000) as u16);
        p.set(2, (n / 1_000_000) as u16);
        p
    };
    let parent = |p: &Placement| {
        let mut up = *p;
        up.set(0, p.get(0) - 1);
        up
    };

    let mut seen: FxHashMap<u32, u32> = FxHashMap::default();
    for n in 0..20_000_000u32 {
        let h = state_hash(&child(n));
        if h % full_ratio == 0 {
            continue;
        }
        if let Some(&m) = seen.get(&h) {
            let (a, b) = (child(m), child(n));
            return [(parent(&a), a), (parent(&b), b)];
        }
        seen.insert(h, n);
    }
    panic!("no hash collision found");
}

#[test]
fn colliding_placements_share_a_chain_but_not_a_handle() {
    let board = Board::parse(KLOTSKI).unwrap();
    let budget = SearchBudget::with_states(1024);
    let [(pa, a), (pb, b)] = colliding_children(&board, budget.full_ratio);
    assert_ne!(a, b);
    assert_eq!(state_hash(&a), state_hash(&b));

    fn insert(store: &StateStore<'_>, cand: Candidate) -> StateHandle {
        match store.insert(&cand).unwrap() {
            InsertOutcome::Inserted(h) => h,
            other => panic!("expected a new state, got {other:?}"),
        }
    }

    // Full head, Semi second.
    let store = StateStore::new(&board, &budget).unwrap();
    let head = insert(&store, Candidate::root(a));
    let parent = insert(&store, Candidate::root(pb));
    let second = insert(&store, Candidate::child(parent, 0, 0, Direction::East, b));
    assert!(head.is_full());
    assert!(!second.is_full());
    assert_eq!(store.link(head).unwrap().chain_next, Some(second));
    assert_eq!(store.link(second).unwrap().chain_next, None);
    assert_eq!(store.resolve(second).unwrap().placement, b);

    // Semi head, Full second.
    let store = StateStore::new(&board, &budget).unwrap();
    let parent = insert(&store, Candidate::root(pa));
    let head = insert(&store, Candidate::child(parent, 0, 0, Direction::East, a));
    let second = insert(&store, Candidate::root(b));
    assert!(!head.is_full());
    assert!(second.is_full());
    assert_eq!(store.link(head).unwrap().chain_next, Some(second));
    assert_eq!(store.resolve(head).unwrap().placement, a);
    assert_eq!(store.resolve(second).unwrap().placement, b);

    // Each placement still finds its own handle, whichever end of the chain it sits at.
    assert_eq!(store.insert(&Candidate::root(a)).unwrap(), InsertOutcome::Duplicate(head));
    assert_eq!(store.insert(&Candidate::root(b)).unwrap(), InsertOutcome::Duplicate(second));
    assert_eq!(store.state_count(), 3);
    assert_eq!(store.index().entries(), 2);
}
