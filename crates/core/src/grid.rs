//! Grids - rectangular arrays of symbols - and their pure utilities.

use crate::color_map::{clamp_symbol, ColorMap, Symbol, MAX_SYMBOL};
use serde::{Deserialize, Serialize};

/// Errors raised when building a grid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// No rows, or a zero-width first row
    #[error("grid must be at least 1x1")]
    Empty,

    /// Rows of unequal length
    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged {
        /// Offending row index
        row: usize,
        /// Width of the first row
        expected: usize,
        /// Width of the offending row
        found: usize,
    },
}

/// A rectangular, non-empty 2D array of symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<i64>>", into = "Vec<Vec<Symbol>>")]
pub struct Grid {
    rows: Vec<Vec<Symbol>>,
}

impl Grid {
    /// Build a grid, clamping every cell into the symbol range.
    pub fn new(rows: Vec<Vec<Symbol>>) -> Result<Self, GridError> {
        let rows: Vec<Vec<Symbol>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|s| s.min(MAX_SYMBOL)).collect())
            .collect();
        Self::check_shape(&rows)?;
        Ok(Self { rows })
    }

    /// Normalize raw integer rows: clamp into `0..=9` and check the shape.
    pub fn normalize(raw: Vec<Vec<i64>>) -> Result<Self, GridError> {
        let rows: Vec<Vec<Symbol>> = raw
            .into_iter()
            .map(|row| row.into_iter().map(clamp_symbol).collect())
            .collect();
        Self::check_shape(&rows)?;
        Ok(Self { rows })
    }

    fn check_shape(rows: &[Vec<Symbol>]) -> Result<(), GridError> {
        let expected = rows.first().map(Vec::len).unwrap_or(0);
        if expected == 0 {
            return Err(GridError::Empty);
        }
        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != expected {
                return Err(GridError::Ragged {
                    row,
                    expected,
                    found: cells.len(),
                });
            }
        }
        Ok(())
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.rows[0].len()
    }

    /// `(height, width)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    /// Cell at `(row, col)`, if in bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<Symbol> {
        self.rows.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Row slices.
    pub fn rows(&self) -> &[Vec<Symbol>] {
        &self.rows
    }

    /// Every cell as `(row, col, symbol)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, Symbol)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(r, row)| row.iter().enumerate().map(move |(c, s)| (r, c, *s)))
    }

    /// Elementwise equality rate against `target`; 0 when shapes differ.
    pub fn accuracy(&self, target: &Grid) -> f64 {
        if self.shape() != target.shape() {
            return 0.0;
        }
        let total = self.height() * self.width();
        let correct = self
            .cells()
            .filter(|(r, c, s)| target.rows[*r][*c] == *s)
            .count();
        correct as f64 / total as f64
    }

    /// Whether the grids differ anywhere, including in shape.
    pub fn differs_from(&self, other: &Grid) -> bool {
        self.rows != other.rows
    }

    /// Apply a color map cell by cell.
    pub fn recolor(&self, map: &ColorMap) -> Grid {
        self.map_cells(|s| map.apply(s))
    }

    fn map_cells(&self, f: impl Fn(Symbol) -> Symbol) -> Grid {
        Grid {
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(|s| f(*s)).collect())
                .collect(),
        }
    }

    /// Rotate clockwise by `quarter_turns` × 90°.
    pub fn rotate_cw(&self, quarter_turns: u8) -> Grid {
        let mut grid = self.clone();
        for _ in 0..(quarter_turns % 4) {
            grid = grid.rotate_once();
        }
        grid
    }

    fn rotate_once(&self) -> Grid {
        let (h, w) = self.shape();
        let rows = (0..w)
            .map(|r| (0..h).map(|c| self.rows[h - 1 - c][r]).collect())
            .collect();
        Grid { rows }
    }

    /// Mirror left-right.
    pub fn flip_horizontal(&self) -> Grid {
        Grid {
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().rev().copied().collect())
                .collect(),
        }
    }

    /// Mirror top-bottom.
    pub fn flip_vertical(&self) -> Grid {
        Grid {
            rows: self.rows.iter().rev().cloned().collect(),
        }
    }

    /// Cyclic shift: the cell at `(r, c)` moves to `(r + dr, c + dc)` modulo the shape.
    pub fn roll(&self, dr: usize, dc: usize) -> Grid {
        let (h, w) = self.shape();
        let mut rows = self.rows.clone();
        for (r, row) in self.rows.iter().enumerate() {
            for (c, s) in row.iter().enumerate() {
                rows[(r + dr) % h][(c + dc) % w] = *s;
            }
        }
        Grid { rows }
    }
}

impl TryFrom<Vec<Vec<i64>>> for Grid {
    type Error = GridError;

    fn try_from(raw: Vec<Vec<i64>>) -> Result<Self, Self::Error> {
        Grid::normalize(raw)
    }
}

impl From<Grid> for Vec<Vec<Symbol>> {
    fn from(grid: Grid) -> Self {
        grid.rows
    }
}
