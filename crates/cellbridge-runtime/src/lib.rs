//! Cell query bridge between a code runner and the engine that owns the grid.
//!
//! A runner asks for a range (`q.cells("A1:B5")`) and gets back a scalar,
//! a flat list or a matrix. Two transports exist and one is picked per
//! runner at startup:
//!
//! - [`SyncBridge`]: a two-phase handshake over [`SharedBuffer`]s that
//!   blocks the runner thread until the engine releases the status word.
//! - [`AsyncBridge`]: request/response messages correlated by id, resolved
//!   as futures. User code is rewritten with `cellbridge_parse` so that
//!   synchronous-looking calls are awaited.
//!
//! [`ViewportBuffer`] reuses the shared-word technique to mirror camera
//! state into a render thread.

pub mod async_bridge;
pub mod capability;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod runner;
pub mod shared;
pub mod sync_bridge;
pub mod viewport;

pub use async_bridge::{AsyncBridge, PendingQuery};
pub use capability::{CapabilityDetector, EnvFlags, WorkerInit, runtime_supports_shared_memory};
pub use codec::{QueryOutput, decode, decode_bytes, decode_cell, decode_text};
pub use config::BridgeConfig;
pub use engine::{CellSource, EngineHandle, EngineWorker, MemoryGrid};
pub use error::{BridgeError, CapabilityError, ConfigError, DecodeError, Phase, RunnerError};
pub use protocol::{CellGrid, CellsPayload, CorrelationId, GridCell, PayloadBody, RequestId};
pub use runner::{CellAccess, RunnerContext};
pub use shared::{SharedBuffer, WaitOutcome};
pub use sync_bridge::SyncBridge;
pub use viewport::{ViewportBuffer, ViewportState, ViewportUpdate, VisibleBounds};

pub use cellbridge_common::{CellError, CellTag, ErrorKind, HostValue, Scalar, TypedCellValue};
