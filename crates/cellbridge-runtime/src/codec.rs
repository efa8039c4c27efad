//! Payload → host value decoding and shape inference.

use cellbridge_common::{
    CellError, DATE_FORMAT, DATETIME_FORMAT, DATETIME_FORMAT_SPACED, HostValue, Scalar,
    TIME_FORMAT, TypedCellValue,
};
use chrono::{Duration as ChronoDur, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::DecodeError;
use crate::protocol::{CellGrid, CellsPayload, PayloadBody, WIRE_VERSION};

/// Upper bound on the dense grid a payload may expand to.
pub const MAX_GRID_BYTES: usize = 256 << 20;

/// Upper bound on `w * h` accepted from a payload.
pub const MAX_GRID_CELLS: u64 = (MAX_GRID_BYTES / size_of::<Scalar>()) as u64;

/// What user code receives for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Scalar(Scalar),
    Vector(Vec<Scalar>),
    Matrix(Vec<Vec<Scalar>>),
}

impl QueryOutput {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            QueryOutput::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Scalar]> {
        match self {
            QueryOutput::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&[Vec<Scalar>]> {
        match self {
            QueryOutput::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            QueryOutput::Scalar(_) => "scalar",
            QueryOutput::Vector(_) => "vector",
            QueryOutput::Matrix(_) => "matrix",
        }
    }
}

pub fn encode(payload: &CellsPayload) -> Result<String, serde_json::Error> {
    serde_json::to_string(payload)
}

pub fn decode_bytes(bytes: &[u8]) -> Result<QueryOutput, DecodeError> {
    decode_text(std::str::from_utf8(bytes)?)
}

pub fn decode_text(text: &str) -> Result<QueryOutput, DecodeError> {
    decode(serde_json::from_str(text)?)
}

pub fn decode(payload: CellsPayload) -> Result<QueryOutput, DecodeError> {
    if payload.version != WIRE_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: payload.version,
            expected: WIRE_VERSION,
        });
    }
    let grid = match payload.result {
        PayloadBody::Values(grid) => grid,
        PayloadBody::Error { message } => return Err(DecodeError::Engine(message)),
    };
    let rows = place_cells(&grid)?;
    Ok(infer_shape(&grid, rows))
}

/// Decode one cell. Blank is `None`; a payload that does not read as its
/// tag gives back the tag's reason in `Err`.
pub fn decode_cell(value: &TypedCellValue) -> Result<Scalar, String> {
    let bad = |what: &str| format!("not a valid {what}");
    let host = match value {
        TypedCellValue::Blank => return Ok(None),
        TypedCellValue::Text(s) => HostValue::Text(s.clone()),
        TypedCellValue::Html(s) => HostValue::Html(s.clone()),
        TypedCellValue::Image(s) => HostValue::Image(s.clone()),
        TypedCellValue::Number(s) => {
            HostValue::Number(s.trim().parse::<f64>().map_err(|_| bad("number"))?)
        }
        TypedCellValue::Logical(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                HostValue::Logical(true)
            } else if s.eq_ignore_ascii_case("false") {
                HostValue::Logical(false)
            } else {
                return Err(bad("logical"));
            }
        }
        TypedCellValue::Duration(s) => {
            let secs: f64 = s.trim().parse().map_err(|_| bad("duration"))?;
            if !secs.is_finite() {
                return Err(bad("duration"));
            }
            let ms = (secs * 1000.0).round() as i64;
            HostValue::Duration(ChronoDur::try_milliseconds(ms).ok_or_else(|| bad("duration"))?)
        }
        TypedCellValue::Error(s) => {
            HostValue::Error(CellError::parse(s).map_err(|e| e.to_string())?)
        }
        TypedCellValue::Date(s) => match NaiveDate::parse_from_str(s.trim(), DATE_FORMAT) {
            Ok(d) => HostValue::from_date(d),
            Err(_) => HostValue::Timestamp(parse_datetime(s).ok_or_else(|| bad("date"))?),
        },
        TypedCellValue::Time(s) => HostValue::Time(
            NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).map_err(|_| bad("time"))?,
        ),
        TypedCellValue::DateTime(s) => {
            HostValue::Timestamp(parse_datetime(s).ok_or_else(|| bad("datetime"))?)
        }
    };
    Ok(Some(host))
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, DATETIME_FORMAT_SPACED))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::default()))
        })
}

/// Row-major `h × w` grid; positions without a cell stay `None`.
fn place_cells(grid: &CellGrid) -> Result<Vec<Vec<Scalar>>, DecodeError> {
    if grid.w as u64 * grid.h as u64 > MAX_GRID_CELLS {
        return Err(DecodeError::GridTooLarge {
            w: grid.w,
            h: grid.h,
        });
    }
    let mut rows: Vec<Vec<Scalar>> = vec![vec![None; grid.w as usize]; grid.h as usize];
    for cell in &grid.cells {
        let out_of_bounds = || DecodeError::CellOutOfBounds {
            x: cell.x,
            y: cell.y,
            gx: grid.x,
            gy: grid.y,
            w: grid.w,
            h: grid.h,
        };
        let col = cell.x.checked_sub(grid.x).ok_or_else(out_of_bounds)?;
        let row = cell.y.checked_sub(grid.y).ok_or_else(out_of_bounds)?;
        if col >= grid.w || row >= grid.h {
            return Err(out_of_bounds());
        }
        let decoded = decode_cell(&cell.value).map_err(|_| DecodeError::BadCell {
            x: cell.x,
            y: cell.y,
            tag: cell.value.tag(),
            raw: cell.value.payload().unwrap_or_default().to_string(),
        })?;
        rows[row as usize][col as usize] = decoded;
    }
    Ok(rows)
}

fn infer_shape(grid: &CellGrid, rows: Vec<Vec<Scalar>>) -> QueryOutput {
    let (w, h) = (grid.w, grid.h);
    if w == 0 || h == 0 {
        return if grid.two_dimensional {
            QueryOutput::Matrix(Vec::new())
        } else {
            QueryOutput::Vector(Vec::new())
        };
    }
    if w == 1 && h == 1 && !grid.one_dimensional && !grid.two_dimensional {
        let cell = rows.into_iter().next().and_then(|r| r.into_iter().next());
        return QueryOutput::Scalar(cell.flatten());
    }
    if (w == 1 || h == 1) && !grid.two_dimensional {
        return if h == 1 {
            QueryOutput::Vector(rows.into_iter().next().unwrap_or_default())
        } else {
            QueryOutput::Vector(
                rows.into_iter()
                    .map(|r| r.into_iter().next().flatten())
                    .collect(),
            )
        };
    }
    QueryOutput::Matrix(rows)
}
