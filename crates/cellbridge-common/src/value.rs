use chrono::{Duration as ChronoDur, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt::{self, Display};

use crate::CellError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ───────────────────── Raw payload text formats ─────────────────────
Every typed cell travels as (tag, raw text). The engine renders the
payload with these formats and the runner parses it back:
  Number    shortest round-trip decimal of an f64
  Logical   true / false
  Duration  seconds as a decimal, millisecond precision
  Date      2024-03-01
  Time      13:45:00 (fraction only when non-zero)
  DateTime  2024-03-01T13:45:00
------------------------------------------------------------------- */

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
/// Accepted on decode only; some engines render datetimes with a space.
pub const DATETIME_FORMAT_SPACED: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Numeric type tags used by the engine when it describes a cell.
///
/// Code 7 belongs to code cells and never appears in a query result.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CellTag {
    Blank = 0,
    Text = 1,
    Number = 2,
    Logical = 3,
    Duration = 4,
    Error = 5,
    Html = 6,
    Image = 8,
    Date = 9,
    Time = 10,
    DateTime = 11,
}

impl CellTag {
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Blank,
            1 => Self::Text,
            2 => Self::Number,
            3 => Self::Logical,
            4 => Self::Duration,
            5 => Self::Error,
            6 => Self::Html,
            8 => Self::Image,
            9 => Self::Date,
            10 => Self::Time,
            11 => Self::DateTime,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Display for CellTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The engine-native representation of one cell: a type tag plus the raw
/// payload text. Blank carries nothing.
///
/// With the `serde` feature this is the wire form of a cell:
/// `{"type":"Number","value":"42"}` or `{"type":"Blank"}`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "value"))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypedCellValue {
    Blank,
    Text(String),
    Number(String),
    Logical(String),
    Duration(String),
    Error(String),
    Html(String),
    Image(String),
    Date(String),
    Time(String),
    DateTime(String),
}

impl TypedCellValue {
    /// Rebuild from the numeric-tag form (`t`, `v`) some engines emit.
    pub fn from_raw(tag: CellTag, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        match tag {
            CellTag::Blank => Self::Blank,
            CellTag::Text => Self::Text(payload),
            CellTag::Number => Self::Number(payload),
            CellTag::Logical => Self::Logical(payload),
            CellTag::Duration => Self::Duration(payload),
            CellTag::Error => Self::Error(payload),
            CellTag::Html => Self::Html(payload),
            CellTag::Image => Self::Image(payload),
            CellTag::Date => Self::Date(payload),
            CellTag::Time => Self::Time(payload),
            CellTag::DateTime => Self::DateTime(payload),
        }
    }

    pub fn tag(&self) -> CellTag {
        match self {
            Self::Blank => CellTag::Blank,
            Self::Text(_) => CellTag::Text,
            Self::Number(_) => CellTag::Number,
            Self::Logical(_) => CellTag::Logical,
            Self::Duration(_) => CellTag::Duration,
            Self::Error(_) => CellTag::Error,
            Self::Html(_) => CellTag::Html,
            Self::Image(_) => CellTag::Image,
            Self::Date(_) => CellTag::Date,
            Self::Time(_) => CellTag::Time,
            Self::DateTime(_) => CellTag::DateTime,
        }
    }

    /// Raw payload text; `None` for blanks.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Blank => None,
            Self::Text(s)
            | Self::Number(s)
            | Self::Logical(s)
            | Self::Duration(s)
            | Self::Error(s)
            | Self::Html(s)
            | Self::Image(s)
            | Self::Date(s)
            | Self::Time(s)
            | Self::DateTime(s) => Some(s),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn number(n: f64) -> Self {
        Self::Number(n.to_string())
    }

    pub fn logical(b: bool) -> Self {
        Self::Logical(b.to_string())
    }

    pub fn duration(d: ChronoDur) -> Self {
        Self::Duration((d.num_milliseconds() as f64 / 1000.0).to_string())
    }

    pub fn error(e: &CellError) -> Self {
        Self::Error(e.to_string())
    }

    pub fn html(s: impl Into<String>) -> Self {
        Self::Html(s.into())
    }

    pub fn image(s: impl Into<String>) -> Self {
        Self::Image(s.into())
    }

    pub fn date(d: NaiveDate) -> Self {
        Self::Date(d.format(DATE_FORMAT).to_string())
    }

    pub fn time(t: NaiveTime) -> Self {
        Self::Time(t.format(TIME_FORMAT).to_string())
    }

    pub fn datetime(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt.format(DATETIME_FORMAT).to_string())
    }
}

/// A decoded cell as user code sees it.
///
/// Blank cells never become a `HostValue`; they decode to `None`.
/// Dates and datetimes both land on [`HostValue::Timestamp`] (a date is
/// midnight of that day).
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Text(String),
    Number(f64),
    Logical(bool),
    Duration(ChronoDur),
    Error(CellError),
    Html(String),
    Image(String),
    Timestamp(NaiveDateTime),
    Time(NaiveTime),
}

/// One cell handed to user code: absent for blanks.
pub type Scalar = Option<HostValue>;

impl HostValue {
    pub fn from_date(d: NaiveDate) -> Self {
        HostValue::Timestamp(d.and_time(NaiveTime::default()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Text(_) => "text",
            HostValue::Number(_) => "number",
            HostValue::Logical(_) => "logical",
            HostValue::Duration(_) => "duration",
            HostValue::Error(_) => "error",
            HostValue::Html(_) => "html",
            HostValue::Image(_) => "image",
            HostValue::Timestamp(_) => "timestamp",
            HostValue::Time(_) => "time",
        }
    }
}

impl Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Text(s) | HostValue::Html(s) | HostValue::Image(s) => write!(f, "{s}"),
            HostValue::Number(n) => write!(f, "{n}"),
            HostValue::Logical(b) => write!(f, "{b}"),
            HostValue::Duration(d) => write!(f, "{d}"),
            HostValue::Error(e) => write!(f, "{e}"),
            HostValue::Timestamp(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            HostValue::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
        }
    }
}

/// Engine-side encoding of a host value. Timestamps always travel as
/// DateTime, so a value written as a Date reads back as the same timestamp.
impl From<&HostValue> for TypedCellValue {
    fn from(value: &HostValue) -> Self {
        match value {
            HostValue::Text(s) => TypedCellValue::text(s.clone()),
            HostValue::Number(n) => TypedCellValue::number(*n),
            HostValue::Logical(b) => TypedCellValue::logical(*b),
            HostValue::Duration(d) => TypedCellValue::duration(*d),
            HostValue::Error(e) => TypedCellValue::error(e),
            HostValue::Html(s) => TypedCellValue::html(s.clone()),
            HostValue::Image(s) => TypedCellValue::image(s.clone()),
            HostValue::Timestamp(dt) => TypedCellValue::datetime(*dt),
            HostValue::Time(t) => TypedCellValue::time(*t),
        }
    }
}
