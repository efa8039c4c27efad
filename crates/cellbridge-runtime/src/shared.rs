//! Shared word buffer with wait/notify on a slot.
//!
//! Mirrors a `SharedArrayBuffer` viewed as `Int32Array` together with
//! `Atomics.wait`/`Atomics.notify`. Clones share the same memory. Bytes are
//! packed little-endian into the words; the status slot written with
//! [`SharedBuffer::store_and_notify`] is what orders them for the reader.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Result of [`SharedBuffer::wait`], named after `Atomics.wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The slot changed while we slept.
    Ok,
    /// The slot already differed from `expected`; no sleep happened.
    NotEqual,
    TimedOut,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("byte range {offset}..{end} is outside a {len}-byte buffer or not word aligned")]
pub struct BufferRangeError {
    pub offset: usize,
    pub end: usize,
    pub len: usize,
}

struct Inner {
    words: Box<[AtomicI32]>,
    byte_len: usize,
    gate: Mutex<()>,
    cond: Condvar,
}

#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<Inner>,
}

impl SharedBuffer {
    /// Zero-filled buffer of `byte_len` bytes (rounded up to whole words).
    pub fn new(byte_len: usize) -> Self {
        let words = byte_len.div_ceil(4);
        Self {
            inner: Arc::new(Inner {
                words: (0..words).map(|_| AtomicI32::new(0)).collect(),
                byte_len,
                gate: Mutex::new(()),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.inner.byte_len
    }

    pub fn word_len(&self) -> usize {
        self.inner.words.len()
    }

    /// Whether two handles share memory.
    pub fn ptr_eq(&self, other: &SharedBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// # Panics
    /// If `index` is not a word of this buffer.
    pub fn load(&self, index: usize) -> i32 {
        self.inner.words[index].load(Ordering::Acquire)
    }

    /// # Panics
    /// If `index` is not a word of this buffer.
    pub fn store(&self, index: usize, value: i32) {
        self.inner.words[index].store(value, Ordering::Release);
    }

    /// Store `value` and wake every thread waiting on the buffer.
    pub fn store_and_notify(&self, index: usize, value: i32) {
        let _gate = self.inner.gate.lock();
        self.store(index, value);
        self.inner.cond.notify_all();
    }

    /// Block while slot `index` still holds `expected`, for at most `timeout`.
    pub fn wait(&self, index: usize, expected: i32, timeout: Duration) -> WaitOutcome {
        let mut gate = self.inner.gate.lock();
        if self.load(index) != expected {
            return WaitOutcome::NotEqual;
        }
        let deadline = Instant::now().checked_add(timeout);
        loop {
            match deadline {
                Some(deadline) => {
                    let result = self.inner.cond.wait_until(&mut gate, deadline);
                    if self.load(index) != expected {
                        return WaitOutcome::Ok;
                    }
                    if result.timed_out() {
                        return WaitOutcome::TimedOut;
                    }
                }
                None => {
                    self.inner.cond.wait(&mut gate);
                    if self.load(index) != expected {
                        return WaitOutcome::Ok;
                    }
                }
            }
        }
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), BufferRangeError> {
        let end = offset.saturating_add(len);
        if offset % 4 != 0 || end > self.inner.byte_len {
            return Err(BufferRangeError {
                offset,
                end,
                len: self.inner.byte_len,
            });
        }
        Ok(())
    }

    /// Copy `bytes` in starting at the word-aligned byte `offset`.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<(), BufferRangeError> {
        self.check_range(offset, bytes.len())?;
        let first = offset / 4;
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.inner.words[first + i].store(i32::from_le_bytes(word), Ordering::Relaxed);
        }
        Ok(())
    }

    /// Copy `len` bytes out starting at the word-aligned byte `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, BufferRangeError> {
        self.check_range(offset, len)?;
        let first = offset / 4;
        let mut out = Vec::with_capacity(len.next_multiple_of(4));
        for word in &self.inner.words[first..first + len.div_ceil(4)] {
            out.extend_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
        }
        out.truncate(len);
        Ok(out)
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("byte_len", &self.inner.byte_len)
            .field("status", &self.inner.words.first().map(|w| w.load(Ordering::Relaxed)))
            .finish()
    }
}
