use core::fmt;
use std::str::FromStr;

use crate::coord::{A1Bound, A1ParseError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A resolved, bounded rectangle of cells. `x`/`y` are the 1-based column
/// and row of the top-left cell; `w`/`h` may be zero when an open-ended
/// range falls entirely outside the used part of a sheet.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl CellRect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn contains(&self, col: u32, row: u32) -> bool {
        col >= self.x && row >= self.y && col - self.x < self.w && row - self.y < self.h
    }
}

/// Last used column and row of a sheet (0 for an empty sheet).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SheetExtent {
    pub max_col: u32,
    pub max_row: u32,
}

/// A parsed A1 range expression such as `Sheet1!A1:B5`, `'My Sheet'!C:C`,
/// `2:2` or `B5:`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct A1Range {
    pub sheet: Option<String>,
    pub start: A1Bound,
    pub end: A1Bound,
}

impl A1Range {
    pub fn parse(text: &str) -> Result<Self, A1ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(A1ParseError::Empty);
        }
        let (sheet, body) = split_sheet(text)?;
        let (start, end) = match body.split_once(':') {
            Some((lhs, "")) => (A1Bound::parse(lhs)?, A1Bound::UNBOUNDED),
            Some((lhs, rhs)) => (A1Bound::parse(lhs)?, A1Bound::parse(rhs)?),
            None => {
                let cell = A1Bound::parse(body)?;
                // A lone `A` or `5` is not a range on its own.
                if cell.col.is_none() || cell.row.is_none() {
                    return Err(A1ParseError::InvalidCell(body.to_string()));
                }
                (cell, cell)
            }
        };
        let (start, end) = normalize(start, end);
        Ok(Self { sheet, start, end })
    }

    /// True when every bound names whole columns (`A:A`, `B:D`). Such a
    /// result is handed to user code as a flat list.
    pub fn is_column_range(&self) -> bool {
        self.start.row.is_none() && self.end.row.is_none()
    }

    /// True when the caller must receive a matrix regardless of the
    /// resolved size: the end is open in both directions, or the range
    /// spans more than one row and more than one column.
    pub fn is_two_dimensional(&self) -> bool {
        self.end.is_unbounded()
            || !(self.start.row == self.end.row || self.start.col == self.end.col)
    }

    /// Clamp open ends to the used extent of the sheet.
    pub fn resolve(&self, extent: SheetExtent) -> CellRect {
        let x = self.start.col.unwrap_or(1);
        let y = self.start.row.unwrap_or(1);
        let end_col = self.end.col.unwrap_or(extent.max_col);
        let end_row = self.end.row.unwrap_or(extent.max_row);
        CellRect {
            x,
            y,
            w: (end_col + 1).saturating_sub(x),
            h: (end_row + 1).saturating_sub(y),
        }
    }
}

fn split_sheet(text: &str) -> Result<(Option<String>, &str), A1ParseError> {
    if let Some(rest) = text.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, ch)) = chars.next() {
            if ch != '\'' {
                name.push(ch);
                continue;
            }
            if let Some(&(_, '\'')) = chars.peek() {
                name.push('\'');
                chars.next();
                continue;
            }
            let tail = &rest[i + 1..];
            return match tail.strip_prefix('!') {
                Some(body) => Ok((Some(name), body)),
                None => Err(A1ParseError::MissingSheetSeparator),
            };
        }
        return Err(A1ParseError::UnterminatedSheetName);
    }
    match text.rsplit_once('!') {
        Some((sheet, body)) if !sheet.is_empty() => Ok((Some(sheet.to_string()), body)),
        Some(_) => Err(A1ParseError::InvalidCell(text.to_string())),
        None => Ok((None, text)),
    }
}

fn normalize(mut start: A1Bound, mut end: A1Bound) -> (A1Bound, A1Bound) {
    if let (Some(a), Some(b)) = (start.col, end.col) {
        if a > b {
            start.col = Some(b);
            end.col = Some(a);
        }
    }
    if let (Some(a), Some(b)) = (start.row, end.row) {
        if a > b {
            start.row = Some(b);
            end.row = Some(a);
        }
    }
    (start, end)
}

impl FromStr for A1Range {
    type Err = A1ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                write!(f, "{sheet}!")?;
            } else {
                write!(f, "'{}'!", sheet.replace('\'', "''"))?;
            }
        }
        if self.start == self.end {
            return write!(f, "{}", self.start);
        }
        write!(f, "{}:{}", self.start, self.end)
    }
}
