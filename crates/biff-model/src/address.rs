use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BIFF8_MAX_COLS, BIFF8_MAX_ROWS};

/// A reference to a single cell within a worksheet.
///
/// Rows and columns are **0-indexed**:
/// - `row = 0` is row `1`
/// - `col = 0` is column `A`
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRef {
    /// 0-indexed row.
    pub row: u32,
    /// 0-indexed column.
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Convert to A1 notation (e.g. `A1`, `IV65536`).
    pub fn to_a1(self) -> String {
        format!("{}{}", col_to_name(self.col), u64::from(self.row) + 1)
    }

    /// Parse an A1-style reference (e.g. `A1`, `$B$2`) within BIFF8 sheet bounds.
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }

        let bytes = s.as_bytes();
        let mut idx = usize::from(bytes.first() == Some(&b'$'));

        let col_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
            idx += 1;
        }
        if idx == col_start {
            return Err(A1ParseError::MissingColumn);
        }
        let col_str = &s[col_start..idx];
        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let row_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == row_start {
            return Err(A1ParseError::MissingRow);
        }
        if idx != bytes.len() {
            return Err(A1ParseError::TrailingCharacters);
        }

        let col = name_to_col(col_str)?;
        if col >= BIFF8_MAX_COLS {
            return Err(A1ParseError::InvalidColumn);
        }
        let row_1_based: u32 = s[row_start..idx]
            .parse()
            .map_err(|_| A1ParseError::InvalidRow)?;
        if row_1_based == 0 || row_1_based > BIFF8_MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }

        Ok(Self {
            row: row_1_based - 1,
            col,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// An inclusive rectangular region, normalized so `start` is the top-left corner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    /// Construct a new range, normalizing coordinates if needed.
    pub const fn new(a: CellRef, b: CellRef) -> Self {
        let (start_row, end_row) = if a.row <= b.row {
            (a.row, b.row)
        } else {
            (b.row, a.row)
        };
        let (start_col, end_col) = if a.col <= b.col {
            (a.col, b.col)
        } else {
            (b.col, a.col)
        };
        Self {
            start: CellRef::new(start_row, start_col),
            end: CellRef::new(end_row, end_col),
        }
    }

    #[inline]
    pub const fn contains(&self, cell: CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.col >= self.start.col
            && cell.col <= self.end.col
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    #[inline]
    pub const fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    #[inline]
    pub const fn is_single_cell(&self) -> bool {
        self.start.row == self.end.row && self.start.col == self.end.col
    }

    /// Parse `A1:B2` or a single-cell reference like `C3`.
    pub fn from_a1(a1: &str) -> Result<Self, RangeParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(RangeParseError::Empty);
        }
        match s.split_once(':') {
            None => {
                let cell = CellRef::from_a1(s)?;
                Ok(Range::new(cell, cell))
            }
            Some((a, b)) => Ok(Range::new(CellRef::from_a1(a)?, CellRef::from_a1(b)?)),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Errors that can occur when parsing an A1 cell reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum A1ParseError {
    #[error("empty A1 reference")]
    Empty,
    #[error("missing column in A1 reference")]
    MissingColumn,
    #[error("missing row in A1 reference")]
    MissingRow,
    #[error("invalid column in A1 reference")]
    InvalidColumn,
    #[error("invalid row in A1 reference")]
    InvalidRow,
    #[error("trailing characters in A1 reference")]
    TrailingCharacters,
}

/// Errors that can occur when parsing an A1 range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum RangeParseError {
    #[error("empty A1 range")]
    Empty,
    #[error("invalid cell reference in range: {0}")]
    Cell(#[from] A1ParseError),
}

/// Render a 0-based column index as letters (`0` -> `A`, `26` -> `AA`).
pub fn col_to_name(col: u32) -> String {
    let mut n = u64::from(col) + 1;
    let mut out = Vec::<char>::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        out.push(char::from(b'A' + rem));
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

fn name_to_col(s: &str) -> Result<u32, A1ParseError> {
    let mut col: u32 = 0;
    for b in s.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::InvalidColumn);
        }
        let v = u32::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(v))
            .ok_or(A1ParseError::InvalidColumn)?;
    }
    col.checked_sub(1).ok_or(A1ParseError::InvalidColumn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_column_names() {
        assert_eq!(col_to_name(0), "A");
        assert_eq!(col_to_name(25), "Z");
        assert_eq!(col_to_name(26), "AA");
        assert_eq!(col_to_name(255), "IV");
    }

    #[test]
    fn parses_and_renders_a1() {
        let cell = CellRef::from_a1("$C$7").unwrap();
        assert_eq!(cell, CellRef::new(6, 2));
        assert_eq!(cell.to_a1(), "C7");
        assert_eq!(CellRef::new(65_535, 255).to_a1(), "IV65536");
    }

    #[test]
    fn rejects_references_outside_biff8_bounds() {
        assert_eq!(CellRef::from_a1("IW1"), Err(A1ParseError::InvalidColumn));
        assert_eq!(CellRef::from_a1("A65537"), Err(A1ParseError::InvalidRow));
        assert_eq!(CellRef::from_a1("A0"), Err(A1ParseError::InvalidRow));
        assert_eq!(CellRef::from_a1("A1x"), Err(A1ParseError::TrailingCharacters));
    }

    #[test]
    fn ranges_normalize_and_display() {
        let range = Range::new(CellRef::new(4, 3), CellRef::new(1, 0));
        assert_eq!(range.to_string(), "A2:D5");
        assert_eq!(range.width(), 4);
        assert_eq!(range.height(), 4);
        assert!(range.contains(CellRef::new(2, 2)));
        assert!(!range.contains(CellRef::new(5, 0)));
        assert_eq!(Range::from_a1("B3").unwrap().to_string(), "B3");
    }
}
