//! A1-style cell coordinates.
//!
//! Rows and columns are 1-based everywhere in this crate, matching what a
//! user types into a query (`A1` is column 1, row 1). Limits follow the usual
//! spreadsheet grid: 1,048,576 rows × 16,384 columns.

use core::fmt;

pub const MAX_ROW: u32 = 1_048_576;
pub const MAX_COL: u32 = 16_384;

/// Errors produced while parsing A1 cell and range text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum A1ParseError {
    Empty,
    InvalidCell(String),
    RowOutOfRange(u64),
    ColOutOfRange(u64),
    UnterminatedSheetName,
    MissingSheetSeparator,
}

impl fmt::Display for A1ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            A1ParseError::Empty => write!(f, "empty range expression"),
            A1ParseError::InvalidCell(s) => write!(f, "invalid cell reference '{s}'"),
            A1ParseError::RowOutOfRange(r) => write!(f, "row {r} outside 1..={MAX_ROW}"),
            A1ParseError::ColOutOfRange(c) => write!(f, "column {c} outside 1..={MAX_COL}"),
            A1ParseError::UnterminatedSheetName => write!(f, "unterminated quoted sheet name"),
            A1ParseError::MissingSheetSeparator => {
                write!(f, "quoted sheet name must be followed by '!'")
            }
        }
    }
}

impl std::error::Error for A1ParseError {}

/// Render a 1-based column index as letters (`1 → A`, `27 → AA`).
pub fn column_to_letters(col: u32) -> String {
    let mut col = col.saturating_sub(1);
    let mut buf = Vec::new();
    loop {
        buf.push(b'A' + (col % 26) as u8);
        col /= 26;
        if col == 0 {
            break;
        }
        col -= 1;
    }
    buf.iter().rev().map(|&b| b as char).collect()
}

/// Parse column letters into a 1-based index. Lowercase is accepted.
pub fn letters_to_column(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in s.bytes() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let val = (ch.to_ascii_uppercase() - b'A') as u32 + 1;
        col = col.checked_mul(26)?.checked_add(val)?;
    }
    Some(col)
}

/// One end of an A1 range. Either axis may be missing: `A` is a whole
/// column, `5` a whole row, and a bound with neither is open-ended.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct A1Bound {
    pub col: Option<u32>,
    pub row: Option<u32>,
}

impl A1Bound {
    pub const UNBOUNDED: Self = Self {
        col: None,
        row: None,
    };

    pub fn cell(col: u32, row: u32) -> Self {
        Self {
            col: Some(col),
            row: Some(row),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.col.is_none() && self.row.is_none()
    }

    /// Parse `A1`, `$B$7`, `C` or `12`.
    pub fn parse(text: &str) -> Result<Self, A1ParseError> {
        let cleaned: String = text.trim().chars().filter(|c| *c != '$').collect();
        if cleaned.is_empty() {
            return Err(A1ParseError::InvalidCell(text.to_string()));
        }
        let split = cleaned
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(cleaned.len());
        let (letters, digits) = cleaned.split_at(split);

        let col = if letters.is_empty() {
            None
        } else {
            let c = letters_to_column(letters)
                .ok_or_else(|| A1ParseError::InvalidCell(text.to_string()))?;
            if c > MAX_COL {
                return Err(A1ParseError::ColOutOfRange(c as u64));
            }
            Some(c)
        };

        let row = if digits.is_empty() {
            None
        } else {
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(A1ParseError::InvalidCell(text.to_string()));
            }
            let r: u64 = digits
                .parse()
                .map_err(|_| A1ParseError::InvalidCell(text.to_string()))?;
            if r == 0 || r > MAX_ROW as u64 {
                return Err(A1ParseError::RowOutOfRange(r));
            }
            Some(r as u32)
        };

        Ok(Self { col, row })
    }
}

impl fmt::Display for A1Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = self.col {
            f.write_str(&column_to_letters(col))?;
        }
        if let Some(row) = self.row {
            write!(f, "{row}")?;
        }
        Ok(())
    }
}
