//! Spreadsheet error values as they travel inside a cell.
//!
//! - **`ErrorKind`** : the canonical set of error codes a cell can hold
//! - **`CellError`** : a code plus an optional human explanation
//!
//! `Display` renders the code exactly as a spreadsheet shows it (`#DIV/0!`),
//! followed by `: message` when a message is attached. `CellError::parse`
//! accepts that same text back, which is how an Error cell's raw payload is
//! decoded on the runner side.

use std::{error::Error, fmt};

/// All recognised cell error codes.
///
/// **Note:** names are CamelCase (idiomatic Rust) while `Display`
/// renders them exactly as the grid shows them (`#DIV/0!`, …).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Null,
    Ref,
    Name,
    Value,
    Div,
    Na,
    Num,
    Error,
    Spill,
    Calc,
    Circ,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        Self::Null,
        Self::Ref,
        Self::Name,
        Self::Value,
        Self::Div,
        Self::Na,
        Self::Num,
        Self::Error,
        Self::Spill,
        Self::Calc,
        Self::Circ,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Self::Null => "#NULL!",
            Self::Ref => "#REF!",
            Self::Name => "#NAME?",
            Self::Value => "#VALUE!",
            Self::Div => "#DIV/0!",
            Self::Na => "#N/A",
            Self::Num => "#NUM!",
            Self::Error => "#ERROR!",
            Self::Spill => "#SPILL!",
            Self::Calc => "#CALC!",
            Self::Circ => "#CIRC!",
        }
    }

    /// Case-insensitive lookup of a code such as `#div/0!`.
    pub fn parse(s: &str) -> Option<Self> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(needle))
    }
}

/// An error value held by a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

/// Raised when an Error cell's text does not start with a known code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownErrorCode(pub String);

impl fmt::Display for UnknownErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown cell error code '{}'", self.0)
    }
}

impl Error for UnknownErrorCode {}

impl From<ErrorKind> for CellError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl CellError {
    /// Basic constructor (no message).
    pub fn new(kind: ErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Parse the display form back: `#REF!` or `#REF!: sheet was deleted`.
    pub fn parse(s: &str) -> Result<Self, UnknownErrorCode> {
        let (code, message) = match s.split_once(": ") {
            Some((code, msg)) => (code, Some(msg)),
            None => (s, None),
        };
        let kind = ErrorKind::parse(code).ok_or_else(|| UnknownErrorCode(code.to_string()))?;
        Ok(Self {
            kind,
            message: message.map(str::to_string),
        })
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl Error for CellError {}

impl PartialEq<str> for ErrorKind {
    fn eq(&self, other: &str) -> bool {
        self.code() == other
    }
}

impl PartialEq<&str> for CellError {
    fn eq(&self, other: &&str) -> bool {
        self.kind.code() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_grid_text() {
        assert_eq!(ErrorKind::Div.to_string(), "#DIV/0!");
        let err = CellError::new(ErrorKind::Ref).with_message("sheet was deleted");
        assert_eq!(err.to_string(), "#REF!: sheet was deleted");
    }

    #[test]
    fn parse_accepts_display_form() {
        let err = CellError::parse("#REF!: sheet was deleted").unwrap();
        assert_eq!(err.kind, ErrorKind::Ref);
        assert_eq!(err.message.as_deref(), Some("sheet was deleted"));

        let bare = CellError::parse("#n/a").unwrap();
        assert_eq!(bare, CellError::new(ErrorKind::Na));
        assert!(bare == "#N/A");
    }

    #[test]
    fn unknown_codes_are_rejected() {
        let err = CellError::parse("#BOGUS!").unwrap_err();
        assert_eq!(err, UnknownErrorCode("#BOGUS!".into()));
    }

    #[test]
    fn every_code_parses_back() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::parse(kind.code()), Some(kind));
        }
    }
}
