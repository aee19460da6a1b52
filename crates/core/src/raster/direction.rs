//! D8 flow directions
//!
//! Encoding used in every flow direction grid:
//! ```text
//!   7  0  1
//!   6  8  2
//!   5  4  3
//! ```
//! `8` (`None`) means the direction has not been resolved.

use std::fmt;

/// Compass direction a cell drains toward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FlowDirection {
    N = 0,
    NE = 1,
    E = 2,
    SE = 3,
    S = 4,
    SW = 5,
    W = 6,
    NW = 7,
    #[default]
    None = 8,
}

impl FlowDirection {
    /// The eight real directions in code order
    pub const ALL: [FlowDirection; 8] = [
        FlowDirection::N,
        FlowDirection::NE,
        FlowDirection::E,
        FlowDirection::SE,
        FlowDirection::S,
        FlowDirection::SW,
        FlowDirection::W,
        FlowDirection::NW,
    ];

    /// Numeric code written to direction grids
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a numeric code; anything above 8 is rejected
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0..=7 => Some(Self::ALL[code as usize]),
            8 => Some(FlowDirection::None),
            _ => None,
        }
    }

    /// Offset (row, col) of the neighbour this direction points at
    pub fn offset(self) -> (isize, isize) {
        match self {
            FlowDirection::N => (-1, 0),
            FlowDirection::NE => (-1, 1),
            FlowDirection::E => (0, 1),
            FlowDirection::SE => (1, 1),
            FlowDirection::S => (1, 0),
            FlowDirection::SW => (1, -1),
            FlowDirection::W => (0, -1),
            FlowDirection::NW => (-1, -1),
            FlowDirection::None => (0, 0),
        }
    }

    /// Direction pointing back at this one's source
    pub fn opposite(self) -> Self {
        match self {
            FlowDirection::None => FlowDirection::None,
            dir => Self::ALL[(dir.code() as usize + 4) % 8],
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            FlowDirection::NE | FlowDirection::SE | FlowDirection::SW | FlowDirection::NW
        )
    }

    /// Distance to the neighbour in cell units (1 or sqrt 2)
    pub fn distance(self) -> f64 {
        match self {
            FlowDirection::None => 0.0,
            dir if dir.is_diagonal() => std::f64::consts::SQRT_2,
            _ => 1.0,
        }
    }

    /// Cell reached after `radius` steps from (row, col), if it lies inside
    /// a `rows` x `cols` grid.
    pub fn step(self, row: usize, col: usize, radius: usize, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (dr, dc) = self.offset();
        let r = radius as isize;
        let nr = row as isize + dr * r;
        let nc = col as isize + dc * r;
        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
            return None;
        }
        Some((nr as usize, nc as usize))
    }

    /// Fixed outward direction of a border cell, `None` for interior cells.
    pub fn border(row: usize, col: usize, rows: usize, cols: usize) -> Self {
        let top = row == 0;
        let bottom = row + 1 == rows;
        let left = col == 0;
        let right = col + 1 == cols;
        match (top, bottom, left, right) {
            (true, _, true, _) => FlowDirection::NW,
            (true, _, _, true) => FlowDirection::NE,
            (_, true, true, _) => FlowDirection::SW,
            (_, true, _, true) => FlowDirection::SE,
            (true, _, _, _) => FlowDirection::N,
            (_, true, _, _) => FlowDirection::S,
            (_, _, true, _) => FlowDirection::W,
            (_, _, _, true) => FlowDirection::E,
            _ => FlowDirection::None,
        }
    }
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_compass_order() {
        for (idx, dir) in FlowDirection::ALL.iter().enumerate() {
            assert_eq!(dir.code() as usize, idx);
            assert_eq!(FlowDirection::from_code(idx as u8), Some(*dir));
        }
        assert_eq!(FlowDirection::None.code(), 8);
        assert_eq!(FlowDirection::from_code(9), None);
    }

    #[test]
    fn test_opposite() {
        assert_eq!(FlowDirection::N.opposite(), FlowDirection::S);
        assert_eq!(FlowDirection::NE.opposite(), FlowDirection::SW);
        assert_eq!(FlowDirection::W.opposite(), FlowDirection::E);
        assert_eq!(FlowDirection::None.opposite(), FlowDirection::None);
    }

    #[test]
    fn test_step_bounds() {
        assert_eq!(FlowDirection::SE.step(1, 1, 2, 5, 5), Some((3, 3)));
        assert_eq!(FlowDirection::N.step(1, 1, 2, 5, 5), None);
        assert_eq!(FlowDirection::E.step(0, 3, 1, 5, 5), Some((0, 4)));
        assert_eq!(FlowDirection::E.step(0, 4, 1, 5, 5), None);
    }

    #[test]
    fn test_border_directions() {
        assert_eq!(FlowDirection::border(0, 0, 4, 5), FlowDirection::NW);
        assert_eq!(FlowDirection::border(0, 4, 4, 5), FlowDirection::NE);
        assert_eq!(FlowDirection::border(3, 0, 4, 5), FlowDirection::SW);
        assert_eq!(FlowDirection::border(3, 4, 4, 5), FlowDirection::SE);
        assert_eq!(FlowDirection::border(0, 2, 4, 5), FlowDirection::N);
        assert_eq!(FlowDirection::border(3, 2, 4, 5), FlowDirection::S);
        assert_eq!(FlowDirection::border(1, 0, 4, 5), FlowDirection::W);
        assert_eq!(FlowDirection::border(2, 4, 4, 5), FlowDirection::E);
        assert_eq!(FlowDirection::border(1, 1, 4, 5), FlowDirection::None);
    }

    #[test]
    fn test_border_points_off_grid() {
        let (rows, cols) = (4, 5);
        for row in 0..rows {
            for col in 0..cols {
                let dir = FlowDirection::border(row, col, rows, cols);
                if dir != FlowDirection::None {
                    assert_eq!(dir.step(row, col, 1, rows, cols), None, "({row},{col})");
                }
            }
        }
    }
}
