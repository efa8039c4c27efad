use std::fmt;
use std::time::Duration;

use cellbridge_common::CellTag;
use cellbridge_parse::AccessPatternError;
use thiserror::Error;

use crate::protocol::{CorrelationId, RequestId};

/// Which wait a timeout happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Phase 1 of the blocking bridge: waiting for the byte length.
    Length,
    /// Phase 2 of the blocking bridge: waiting for the payload bytes.
    Data,
    /// Message bridge: waiting for the matching response.
    Response,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Length => f.write_str("length handshake"),
            Phase::Data => f.write_str("data handshake"),
            Phase::Response => f.write_str("async response"),
        }
    }
}

/// A payload that could not be turned into a query result.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The engine answered with a domain error (bad range, unknown sheet).
    #[error("{0}")]
    Engine(String),
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported payload version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("cell {x},{y}: cannot read '{raw}' as {tag}")]
    BadCell {
        x: u32,
        y: u32,
        tag: CellTag,
        raw: String,
    },
    #[error("cell {x},{y} lies outside the {w}x{h} grid at {gx},{gy}")]
    CellOutOfBounds {
        x: u32,
        y: u32,
        gx: u32,
        gy: u32,
        w: u32,
        h: u32,
    },
    #[error("grid of {w}x{h} cells is too large to decode")]
    GridTooLarge { w: u32, h: u32 },
    #[error("engine has no payload for correlation id {0}")]
    MissingPayload(CorrelationId),
}

/// Failure surfaced to user code by either bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("engine returned an empty result")]
    EmptyResult,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no answer from the engine after {waited:?} ({phase})")]
    Timeout { phase: Phase, waited: Duration },
    #[error("response for request {0} matches no pending request")]
    UnmatchedResponse(RequestId),
    #[error("engine worker is gone")]
    Disconnected,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("environment flags were already configured")]
    AlreadyConfigured,
    #[error("shared-memory support was already decided; flags can no longer change")]
    AlreadyDecided,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid access pattern: {0}")]
    Pattern(#[from] AccessPatternError),
    #[error("query timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start response dispatcher: {0}")]
    Spawn(#[from] std::io::Error),
}
