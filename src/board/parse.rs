//! Loader for the `.k` board text format.
//!
//! ```text
//! <name>
//! <width> <height> <goal>
//! <height rows of width characters>
//! ```
//!
//! `#` is a wall, ` ` a free cell, `-` a free cell only the main piece may enter, `*` the main
//! piece and any other character a piece of its own. The goal is the linear cell index the main
//! piece's anchor must reach.

use rustc_hash::FxHashSet;

use crate::board::layout::{PieceLayout, PieceType};
use crate::board::{Board, FREE, GATE, WALL};
use crate::core::direction::Direction;
use crate::core::placement::{Loc, Placement, MAX_PIECES};
use crate::search::error::SearchError;

const MAIN_PIECE: u8 = b'*';

struct FoundPiece {
    anchor: usize,
    footprint: Vec<isize>,
    edges: [Vec<isize>; 4],
}

pub(crate) fn parse_board(text: &str) -> Result<Board, SearchError> {
    let mut lines = text.lines();

    let name = lines
        .next()
        .ok_or_else(|| SearchError::board(1, "missing name line"))?
        .trim_end()
        .to_string();

    let dims = lines
        .next()
        .ok_or_else(|| SearchError::board(2, "missing `width height goal` line"))?;
    let nums = dims
        .split_whitespace()
        .map(|tok| tok.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SearchError::board(2, format!("bad dimension line {dims:?}: {e}")))?;
    let [width, height, goal] = nums[..] else {
        return Err(SearchError::board(
            2,
            format!("expected `width height goal`, got {dims:?}"),
        ));
    };
    if width < 3 || height < 3 {
        return Err(SearchError::board(
            2,
            format!("board must be at least 3x3 including walls, got {width}x{height}"),
        ));
    }
    let cells = width * height;
    if cells > Loc::MAX as usize {
        return Err(SearchError::board(2, format!("board too large: {cells} cells")));
    }
    if goal >= cells {
        return Err(SearchError::board(
            2,
            format!("goal {goal} outside a {width}x{height} grid"),
        ));
    }

    let mut chars = vec![b' '; cells];
    for row in 0..height {
        let line_no = row + 3;
        let line = lines
            .next()
            .ok_or_else(|| SearchError::board(line_no, "missing grid row"))?
            .trim_end();
        if !line.is_ascii() {
            return Err(SearchError::board(line_no, "grid rows must be ASCII"));
        }
        if line.len() > width {
            return Err(SearchError::board(
                line_no,
                format!("row has {} cells, board width is {width}", line.len()),
            ));
        }
        chars[row * width..row * width + line.len()].copy_from_slice(line.as_bytes());
    }

    for row in 0..height {
        for col in 0..width {
            let on_border = row == 0 || col == 0 || row + 1 == height || col + 1 == width;
            if on_border && chars[row * width + col] != b'#' {
                return Err(SearchError::board(
                    row + 3,
                    format!("board must be enclosed by walls (column {col})"),
                ));
            }
        }
    }

    let base: Vec<u8> = chars
        .iter()
        .map(|&c| match c {
            b'#' => WALL,
            b'-' => GATE,
            _ => FREE,
        })
        .collect();
    let free_count = chars.iter().filter(|&&c| c == b' ' || c == b'-').count();

    // Anchors are discovered in ascending cell order.
    let mut seen: FxHashSet<u8> = FxHashSet::default();
    let mut main: Option<(u8, FoundPiece)> = None;
    let mut others: Vec<(u8, FoundPiece)> = Vec::new();
    for anchor in 0..cells {
        let symbol = chars[anchor];
        if matches!(symbol, b'#' | b' ' | b'-') || !seen.insert(symbol) {
            continue;
        }
        let piece = extract_piece(&chars, width, anchor);
        if symbol == MAIN_PIECE {
            main = Some((symbol, piece));
        } else {
            others.push((symbol, piece));
        }
    }
    let (main_symbol, main) =
        main.ok_or_else(|| SearchError::board(3, "missing main piece `*`"))?;
    if others.len() + 1 > MAX_PIECES {
        return Err(SearchError::board(
            3,
            format!("{} pieces exceed the limit of {MAX_PIECES}", others.len() + 1),
        ));
    }
    for &off in &main.footprint {
        let cell = goal as isize + off;
        if cell < 0 || cell as usize >= cells || base[cell as usize] == WALL {
            return Err(SearchError::board(
                2,
                format!("main piece does not fit at goal {goal}"),
            ));
        }
    }

    // Group the remaining pieces by shape, groups ordered by first appearance.
    let mut groups: Vec<Vec<(u8, FoundPiece)>> = Vec::new();
    for piece in others {
        match groups
            .iter_mut()
            .find(|g| g[0].1.footprint == piece.1.footprint)
        {
            Some(group) => group.push(piece),
            None => groups.push(vec![piece]),
        }
    }

    let mut types = Vec::with_capacity(groups.len() + 1);
    let mut locs: Vec<Loc> = vec![main.anchor as Loc];
    let mut symbols = vec![main_symbol];
    types.push(PieceType::new(main.footprint, main.edges, 0..1));
    for group in groups {
        let start = locs.len();
        let end = start + group.len();
        let mut shape = None;
        for (symbol, piece) in group {
            locs.push(piece.anchor as Loc);
            symbols.push(symbol);
            shape.get_or_insert((piece.footprint, piece.edges));
        }
        if let Some((footprint, edges)) = shape {
            types.push(PieceType::new(footprint, edges, start..end));
        }
    }

    Ok(Board {
        name,
        width,
        height,
        goal: goal as Loc,
        base,
        layout: PieceLayout::from_types(types),
        symbols,
        initial: Placement::from_slice(&locs),
        free_count,
    })
}

fn extract_piece(chars: &[u8], width: usize, anchor: usize) -> FoundPiece {
    let symbol = chars[anchor];
    let mut footprint = Vec::new();
    let mut edges: [Vec<isize>; 4] = Default::default();
    for cell in (anchor..chars.len()).filter(|&c| chars[c] == symbol) {
        footprint.push((cell - anchor) as isize);
        for dir in Direction::ALL {
            // Piece cells are never on the border, so the neighbour is in range.
            let next = (cell as isize + dir.offset(width)) as usize;
            if chars[next] != symbol {
                edges[dir.code() as usize].push(next as isize - anchor as isize);
            }
        }
    }
    FoundPiece {
        anchor,
        footprint,
        edges,
    }
}
