//! Message-based cell queries for runners that cannot block.
//!
//! Each query gets a fresh [`RequestId`] and a oneshot slot in the pending
//! table. Responses may arrive in any order; each one resolves exactly the
//! query whose id it carries and removes that entry.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::codec::{self, QueryOutput};
use crate::engine::EngineHandle;
use crate::error::{BridgeError, DecodeError, Phase};
use crate::protocol::{AsyncCellRequest, AsyncCellResponse, EngineRequest, RequestId, ResponseBody};

type Reply = Result<QueryOutput, BridgeError>;

#[derive(Debug)]
struct AsyncInner {
    next_id: AtomicU32,
    pending: Mutex<FxHashMap<RequestId, oneshot::Sender<Reply>>>,
}

impl AsyncInner {
    fn allocate(&self) -> (RequestId, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        // skip 0 and any id still in flight after wraparound
        let id = loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 && !pending.contains_key(&id) {
                break id;
            }
        };
        pending.insert(id, tx);
        (id, rx)
    }

    fn take(&self, id: RequestId) -> Option<oneshot::Sender<Reply>> {
        self.pending.lock().remove(&id)
    }

    fn complete(&self, response: AsyncCellResponse) -> Result<(), BridgeError> {
        let AsyncCellResponse { request_id, body } = response;
        let Some(tx) = self.take(request_id) else {
            warn!(request_id, "dropping response with no pending request");
            return Err(BridgeError::UnmatchedResponse(request_id));
        };
        let reply = match body {
            ResponseBody::Payload(text) => codec::decode_text(&text).map_err(BridgeError::from),
            ResponseBody::Error(message) => Err(DecodeError::Engine(message).into()),
        };
        if tx.send(reply).is_err() {
            debug!(request_id, "query was abandoned before its response arrived");
        }
        Ok(())
    }

    fn fail_all(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            warn!(count = drained.len(), "engine disconnected with queries in flight");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(BridgeError::Disconnected));
        }
    }
}

#[derive(Debug, Clone)]
pub struct AsyncBridge {
    inner: Arc<AsyncInner>,
    engine: EngineHandle,
}

impl AsyncBridge {
    /// A bridge whose responses are fed in through [`AsyncBridge::complete`].
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            inner: Arc::new(AsyncInner {
                next_id: AtomicU32::new(1),
                pending: Mutex::new(FxHashMap::default()),
            }),
            engine,
        }
    }

    /// A bridge plus a dispatcher thread that drains `responses`. Once the
    /// engine stops taking requests, or the response channel closes, every
    /// query still pending resolves to `Disconnected`.
    pub fn start(
        engine: EngineHandle,
        mut responses: UnboundedReceiver<AsyncCellResponse>,
    ) -> io::Result<Self> {
        let bridge = Self::new(engine);
        let inner = Arc::clone(&bridge.inner);
        let inbox = bridge.engine.clone();
        let rt = tokio::runtime::Builder::new_current_thread().build()?;
        thread::Builder::new()
            .name("cellbridge-dispatch".to_string())
            .spawn(move || {
                rt.block_on(async {
                    loop {
                        tokio::select! {
                            response = responses.recv() => match response {
                                Some(response) => {
                                    let _ = inner.complete(response);
                                }
                                None => break,
                            },
                            () = inbox.closed() => break,
                        }
                    }
                });
                // answers sent before the engine stopped still count
                while let Ok(response) = responses.try_recv() {
                    let _ = inner.complete(response);
                }
                inner.fail_all();
            })?;
        Ok(bridge)
    }

    /// Send the request and return a future for its result.
    pub fn query_cells(&self, range: &str) -> PendingQuery {
        let (request_id, rx) = self.inner.allocate();
        debug!(request_id, range, "async cell query");
        let sent = self.engine.send(EngineRequest::AsyncCells(AsyncCellRequest {
            request_id,
            range: range.to_string(),
        }));
        if let Err(err) = sent {
            if let Some(tx) = self.inner.take(request_id) {
                let _ = tx.send(Err(err));
            }
        }
        PendingQuery { request_id, rx }
    }

    /// Like [`AsyncBridge::query_cells`], but gives up after `timeout` and
    /// forgets the pending entry, so a late response is reported unmatched.
    pub async fn query_cells_with_timeout(
        &self,
        range: &str,
        timeout: Duration,
    ) -> Result<QueryOutput, BridgeError> {
        let started = Instant::now();
        let query = self.query_cells(range);
        let request_id = query.request_id();
        match tokio::time::timeout(timeout, query).await {
            Ok(reply) => reply,
            Err(_) => {
                self.inner.take(request_id);
                let waited = started.elapsed();
                warn!(request_id, ?waited, "async cell query timed out");
                Err(BridgeError::Timeout {
                    phase: Phase::Response,
                    waited,
                })
            }
        }
    }

    /// Route one response to its pending query.
    pub fn complete(&self, response: AsyncCellResponse) -> Result<(), BridgeError> {
        self.inner.complete(response)
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

/// Result of an [`AsyncBridge::query_cells`] call.
#[derive(Debug)]
pub struct PendingQuery {
    request_id: RequestId,
    rx: oneshot::Receiver<Reply>,
}

impl PendingQuery {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}

impl Future for PendingQuery {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(reply)) => Poll::Ready(reply),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::Disconnected)),
            Poll::Pending => Poll::Pending,
        }
    }
}
