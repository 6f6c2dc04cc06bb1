use serde::{Deserialize, Serialize};

/// One of the four orthogonal sliding directions.
///
/// The numeric codes (`N=0, E=1, S=2, W=3`) are what the JSON report and the move records use;
/// `code ^ 2` is the opposite direction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        Self::ALL[(self.code() ^ 2) as usize]
    }

    /// Linear cell offset of one step in this direction on a grid `width` cells wide.
    #[inline]
    pub fn offset(self, width: usize) -> isize {
        match self {
            Direction::North => -(width as isize),
            Direction::East => 1,
            Direction::South => width as isize,
            Direction::West => -1,
        }
    }

    /// The direction that turns `from` into `to` in a single step, if any.
    pub fn between(from: usize, to: usize, width: usize) -> Option<Self> {
        let delta = to as isize - from as isize;
        Self::ALL.into_iter().find(|d| d.offset(width) == delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_flips_the_second_bit() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            assert_eq!(d.opposite().code(), d.code() ^ 2);
        }
    }

    #[test]
    fn between_recovers_single_steps() {
        assert_eq!(Direction::between(8, 9, 5), Some(Direction::East));
        assert_eq!(Direction::between(8, 3, 5), Some(Direction::North));
        assert_eq!(Direction::between(8, 13, 5), Some(Direction::South));
        assert_eq!(Direction::between(8, 7, 5), Some(Direction::West));
        assert_eq!(Direction::between(8, 10, 5), None);
    }
}
