//! The engine worker: owns the grid and answers cell queries from runners.

mod grid;

pub use grid::{DEFAULT_SHEET, GridLoadError, MemoryGrid};

use std::collections::VecDeque;
use std::io;
use std::thread::{self, JoinHandle};

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, error, warn};

use crate::codec;
use crate::error::BridgeError;
use crate::protocol::{
    AsyncCellRequest, AsyncCellResponse, CellGrid, CellsPayload, CorrelationId, DATA_OFFSET,
    DataRequest, EngineRequest, ID_SLOT, LENGTH_SLOT, LengthRequest, ResponseBody, STATUS_FAILED,
    STATUS_READY, STATUS_SLOT,
};

type Inbox = UnboundedSender<EngineCommand>;

/// Payloads waiting for their phase-2 request. Oldest are dropped first.
pub const STASH_CAPACITY: usize = 256;

/// Anything that can resolve an A1 range to a grid of typed cells.
///
/// `Err` carries a domain error (bad range, unknown sheet); it reaches the
/// caller inside the payload rather than as a transport failure.
pub trait CellSource: Send + 'static {
    fn cells(&self, range: &str) -> Result<CellGrid, String>;
}

/// What travels over the engine's inbox.
#[derive(Debug)]
pub enum EngineCommand {
    Request {
        request: EngineRequest,
        reply_to: UnboundedSender<AsyncCellResponse>,
    },
    Shutdown,
}

/// A runner's connection to the engine: the shared inbox plus this
/// runner's own response channel.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    inbox: Inbox,
    reply_to: UnboundedSender<AsyncCellResponse>,
}

impl EngineHandle {
    pub fn new(inbox: Inbox, reply_to: UnboundedSender<AsyncCellResponse>) -> Self {
        Self { inbox, reply_to }
    }

    /// A handle wired to bare channels, for hosting a custom engine loop.
    pub fn pair() -> (
        Self,
        UnboundedReceiver<EngineCommand>,
        UnboundedReceiver<AsyncCellResponse>,
    ) {
        let (inbox, commands) = unbounded_channel();
        let (reply_to, responses) = unbounded_channel();
        (Self { inbox, reply_to }, commands, responses)
    }

    /// True once the engine has stopped taking requests.
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    /// Resolves when the engine stops taking requests. Anything still
    /// queued at that point was dropped unanswered.
    pub async fn closed(&self) {
        self.inbox.closed().await
    }

    pub fn send(&self, request: EngineRequest) -> Result<(), BridgeError> {
        self.inbox
            .send(EngineCommand::Request {
                request,
                reply_to: self.reply_to.clone(),
            })
            .map_err(|_| BridgeError::Disconnected)
    }
}

pub struct EngineWorker {
    inbox: Option<Inbox>,
    thread: Option<JoinHandle<()>>,
}

impl EngineWorker {
    /// Start the engine loop on its own thread.
    pub fn spawn<S: CellSource>(source: S) -> io::Result<Self> {
        let (inbox, commands) = unbounded_channel();
        let thread = thread::Builder::new()
            .name("cellbridge-engine".to_string())
            .spawn(move || EngineLoop::new(source).run(commands))?;
        Ok(Self {
            inbox: Some(inbox),
            thread: Some(thread),
        })
    }

    /// Connect a runner. Async responses for this runner arrive on the
    /// returned receiver.
    pub fn connect(&self) -> Result<(EngineHandle, UnboundedReceiver<AsyncCellResponse>), BridgeError> {
        let inbox = self.inbox.clone().ok_or(BridgeError::Disconnected)?;
        let (reply_to, responses) = unbounded_channel();
        Ok((EngineHandle::new(inbox, reply_to), responses))
    }

    /// Stop the loop and wait for the thread. Requests sent afterwards
    /// fail with [`BridgeError::Disconnected`].
    pub fn shutdown(mut self) -> thread::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> thread::Result<()> {
        if let Some(inbox) = self.inbox.take() {
            let _ = inbox.send(EngineCommand::Shutdown);
        }
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        }
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct EngineLoop<S> {
    source: S,
    next_id: CorrelationId,
    stash: FxHashMap<CorrelationId, Vec<u8>>,
    order: VecDeque<CorrelationId>,
}

impl<S: CellSource> EngineLoop<S> {
    fn new(source: S) -> Self {
        Self {
            source,
            next_id: 1,
            stash: FxHashMap::default(),
            order: VecDeque::new(),
        }
    }

    fn run(mut self, mut commands: UnboundedReceiver<EngineCommand>) {
        let span = tracing::info_span!("engine_worker");
        let _enter = span.enter();
        while let Some(command) = commands.blocking_recv() {
            match command {
                EngineCommand::Shutdown => {
                    commands.close();
                    Self::refuse_queued(&mut commands);
                    break;
                }
                EngineCommand::Request { request, reply_to } => {
                    debug!(kind = request.kind(), "engine request");
                    match request {
                        EngineRequest::Length(req) => self.on_length(req),
                        EngineRequest::Data(req) => self.on_data(req),
                        EngineRequest::AsyncCells(req) => self.on_async(req, &reply_to),
                    }
                }
            }
        }
        debug!(stashed = self.stash.len(), "engine loop stopped");
    }

    /// Release every request still queued behind a shutdown so blocked
    /// runners fail now instead of at their timeout. Async requests are
    /// dropped; the runner's dispatcher sees the closed inbox.
    fn refuse_queued(commands: &mut UnboundedReceiver<EngineCommand>) {
        let mut refused = 0usize;
        while let Ok(command) = commands.try_recv() {
            let EngineCommand::Request { request, .. } = command else {
                continue;
            };
            match request {
                EngineRequest::Length(req) => {
                    req.buffer.store(LENGTH_SLOT, 0);
                    req.buffer.store_and_notify(STATUS_SLOT, STATUS_FAILED);
                }
                EngineRequest::Data(req) => req.buffer.store_and_notify(STATUS_SLOT, STATUS_FAILED),
                EngineRequest::AsyncCells(_) => {}
            }
            refused += 1;
        }
        if refused > 0 {
            warn!(refused, "engine stopped with requests queued");
        }
    }

    fn resolve(&self, range: &str) -> Result<String, serde_json::Error> {
        let payload = match self.source.cells(range) {
            Ok(grid) => CellsPayload::values(grid),
            Err(message) => CellsPayload::error(message),
        };
        codec::encode(&payload)
    }

    fn allocate_id(&mut self) -> CorrelationId {
        let id = self.next_id;
        self.next_id = match self.next_id.wrapping_add(1) {
            n if n > 0 => n,
            _ => 1,
        };
        id
    }

    fn stash(&mut self, id: CorrelationId, bytes: Vec<u8>) {
        while self.order.len() >= STASH_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                if self.stash.remove(&evicted).is_some() {
                    warn!(correlation_id = evicted, "evicting unclaimed payload");
                }
            }
        }
        self.order.push_back(id);
        self.stash.insert(id, bytes);
    }

    fn on_length(&mut self, req: LengthRequest) {
        let LengthRequest { buffer, range } = req;
        let bytes = match self.resolve(&range) {
            Ok(text) => text.into_bytes(),
            Err(err) => {
                error!(%range, %err, "failed to serialize cell payload");
                Vec::new()
            }
        };
        match i32::try_from(bytes.len()) {
            Ok(len) if len > 0 => {
                let id = self.allocate_id();
                self.stash(id, bytes);
                buffer.store(LENGTH_SLOT, len);
                buffer.store(ID_SLOT, id);
                debug!(%range, len, correlation_id = id, "length handshake released");
            }
            _ => {
                if !bytes.is_empty() {
                    error!(%range, len = bytes.len(), "payload too large for the handshake");
                }
                buffer.store(LENGTH_SLOT, 0);
            }
        }
        buffer.store_and_notify(STATUS_SLOT, STATUS_READY);
    }

    fn on_data(&mut self, req: DataRequest) {
        let DataRequest { id, buffer } = req;
        let status = match self.stash.remove(&id) {
            Some(bytes) => {
                self.order.retain(|queued| *queued != id);
                match buffer.write_bytes(DATA_OFFSET, &bytes) {
                    Ok(()) => STATUS_READY,
                    Err(err) => {
                        error!(correlation_id = id, %err, "data buffer does not fit payload");
                        STATUS_FAILED
                    }
                }
            }
            None => {
                warn!(correlation_id = id, "no stashed payload for data request");
                STATUS_FAILED
            }
        };
        buffer.store_and_notify(STATUS_SLOT, status);
    }

    fn on_async(&mut self, req: AsyncCellRequest, reply_to: &UnboundedSender<AsyncCellResponse>) {
        let body = match self.resolve(&req.range) {
            Ok(text) => ResponseBody::Payload(text),
            Err(err) => {
                error!(range = %req.range, %err, "failed to serialize cell payload");
                ResponseBody::Error(err.to_string())
            }
        };
        let response = AsyncCellResponse {
            request_id: req.request_id,
            body,
        };
        if reply_to.send(response).is_err() {
            debug!(request_id = req.request_id, "runner dropped its response channel");
        }
    }
}
