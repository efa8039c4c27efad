//! Blocking cell queries over a two-phase shared-buffer handshake.
//!
//! 1. Send a 12-byte buffer with the range; wait for the engine to publish
//!    `[status, byte_length, correlation_id]`.
//! 2. Send a fresh `4 + byte_length` buffer with the correlation id; wait
//!    for the status word, then copy the payload out.
//!
//! The phases of one query never overlap, and a runner issues one query at
//! a time because each call blocks its thread.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::codec::{self, QueryOutput};
use crate::engine::EngineHandle;
use crate::error::{BridgeError, DecodeError, Phase};
use crate::protocol::{
    DATA_OFFSET, DataRequest, EngineRequest, ID_SLOT, LENGTH_HANDSHAKE_BYTES, LENGTH_SLOT,
    LengthRequest, STATUS_FAILED, STATUS_PENDING, STATUS_SLOT,
};
use crate::shared::{SharedBuffer, WaitOutcome};

#[derive(Debug, Clone)]
pub struct SyncBridge {
    engine: EngineHandle,
    timeout: Duration,
}

impl SyncBridge {
    pub fn new(engine: EngineHandle, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Query `range` and decode the result. Blocks the calling thread for
    /// at most two timeouts.
    pub fn query_cells(&self, range: &str) -> Result<QueryOutput, BridgeError> {
        let bytes = self.fetch_payload(range)?;
        Ok(codec::decode_bytes(&bytes)?)
    }

    /// Run both handshake phases and return a private copy of the payload.
    pub fn fetch_payload(&self, range: &str) -> Result<Vec<u8>, BridgeError> {
        let handshake = SharedBuffer::new(LENGTH_HANDSHAKE_BYTES);
        debug!(range, "length handshake");
        self.engine.send(EngineRequest::Length(LengthRequest {
            buffer: handshake.clone(),
            range: range.to_string(),
        }))?;
        if self.await_release(&handshake, Phase::Length)? == STATUS_FAILED {
            // the engine stopped with this request still queued
            return Err(BridgeError::Disconnected);
        }
        let byte_len = handshake.load(LENGTH_SLOT);
        let id = handshake.load(ID_SLOT);
        drop(handshake);

        if byte_len <= 0 {
            return Err(BridgeError::EmptyResult);
        }
        let byte_len = byte_len as usize;

        let data = SharedBuffer::new(DATA_OFFSET + byte_len);
        debug!(range, byte_len, correlation_id = id, "data handshake");
        self.engine.send(EngineRequest::Data(DataRequest {
            id,
            buffer: data.clone(),
        }))?;
        let status = self.await_release(&data, Phase::Data)?;
        if status == STATUS_FAILED {
            return Err(DecodeError::MissingPayload(id).into());
        }
        let bytes = data
            .read_bytes(DATA_OFFSET, byte_len)
            .map_err(|_| DecodeError::MissingPayload(id))?;
        drop(data);
        Ok(bytes)
    }

    fn await_release(&self, buffer: &SharedBuffer, phase: Phase) -> Result<i32, BridgeError> {
        let started = Instant::now();
        match buffer.wait(STATUS_SLOT, STATUS_PENDING, self.timeout) {
            WaitOutcome::TimedOut => {
                let waited = started.elapsed();
                warn!(%phase, ?waited, "engine did not release the handshake buffer");
                Err(BridgeError::Timeout { phase, waited })
            }
            WaitOutcome::Ok | WaitOutcome::NotEqual => Ok(buffer.load(STATUS_SLOT)),
        }
    }
}
