//! Messages between a runner and the engine worker, and the payload schema.
//!
//! Runner → engine: [`LengthRequest`] and [`DataRequest`] (blocking bridge),
//! [`AsyncCellRequest`] (message bridge). Engine → runner:
//! [`AsyncCellResponse`]. The blocking bridge never receives a message
//! back; the engine answers by writing into the shared buffer it was given.
//!
//! Phase-1 buffer: three i32 words `[status, byte_length, correlation_id]`.
//! Phase-2 buffer: one i32 status word followed by the UTF-8 payload.

use cellbridge_common::TypedCellValue;
use serde::{Deserialize, Serialize};

use crate::shared::SharedBuffer;

pub type RequestId = u32;
pub type CorrelationId = i32;

pub const WIRE_VERSION: u32 = 1;

pub const STATUS_SLOT: usize = 0;
pub const LENGTH_SLOT: usize = 1;
pub const ID_SLOT: usize = 2;

pub const LENGTH_HANDSHAKE_BYTES: usize = 12;
pub const DATA_OFFSET: usize = 4;

pub const STATUS_PENDING: i32 = 0;
pub const STATUS_READY: i32 = 1;
/// Phase 2 only: the engine had nothing stashed under the correlation id.
pub const STATUS_FAILED: i32 = 2;

#[derive(Debug, Clone)]
pub struct LengthRequest {
    pub buffer: SharedBuffer,
    pub range: String,
}

#[derive(Debug, Clone)]
pub struct DataRequest {
    pub id: CorrelationId,
    pub buffer: SharedBuffer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncCellRequest {
    pub request_id: RequestId,
    pub range: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Serialized [`CellsPayload`]; may itself carry an engine error.
    Payload(String),
    /// The engine failed before a payload existed.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncCellResponse {
    pub request_id: RequestId,
    pub body: ResponseBody,
}

#[derive(Debug, Clone)]
pub enum EngineRequest {
    Length(LengthRequest),
    Data(DataRequest),
    AsyncCells(AsyncCellRequest),
}

impl EngineRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineRequest::Length(_) => "length",
            EngineRequest::Data(_) => "data",
            EngineRequest::AsyncCells(_) => "async_cells",
        }
    }
}

fn default_version() -> u32 {
    WIRE_VERSION
}

/// Versioned result of a cell query as it travels between threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellsPayload {
    #[serde(default = "default_version")]
    pub version: u32,
    pub result: PayloadBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayloadBody {
    Values(CellGrid),
    Error { message: String },
}

/// A rectangle of cells plus the shape flags derived from the range text.
///
/// `x`/`y` is the 1-based sheet position of the top-left cell. `cells` is
/// sparse: positions without an entry are blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellGrid {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub one_dimensional: bool,
    pub two_dimensional: bool,
    #[serde(default)]
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub x: u32,
    pub y: u32,
    pub value: TypedCellValue,
}

impl CellsPayload {
    pub fn values(grid: CellGrid) -> Self {
        Self {
            version: WIRE_VERSION,
            result: PayloadBody::Values(grid),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: WIRE_VERSION,
            result: PayloadBody::Error {
                message: message.into(),
            },
        }
    }
}
