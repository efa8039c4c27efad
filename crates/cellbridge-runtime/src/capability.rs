//! Decides once per execution context whether the shared-memory bridge
//! may be used.
//!
//! The main thread reads the page URL; workers cannot (their own location
//! is the worker script), so the parent forwards [`EnvFlags`] inside a
//! [`WorkerInit`] message and the worker calls
//! [`CapabilityDetector::configure`] before anything asks for a decision.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CapabilityError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvFlags {
    pub is_embed_mode: bool,
    #[serde(rename = "forceNoSAB")]
    pub force_no_sab: bool,
}

impl EnvFlags {
    /// `?embed` and `?noSAB` on the hosting page. A flag counts as set
    /// unless its value is `false` or `0`.
    pub fn from_page_url(url: &Url) -> Self {
        let mut flags = Self::default();
        for (key, value) in url.query_pairs() {
            let on = !matches!(value.as_ref(), "false" | "0");
            match key.as_ref() {
                "embed" => flags.is_embed_mode = on,
                "noSAB" => flags.force_no_sab = on,
                _ => {}
            }
        }
        flags
    }
}

/// Initialization message a parent sends to every worker it spawns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInit {
    pub flags: EnvFlags,
}

/// Whether this build can share memory between threads at all: always on
/// native targets, and on wasm32 only with the `atomics` target feature.
pub fn runtime_supports_shared_memory() -> bool {
    cfg!(any(not(target_arch = "wasm32"), target_feature = "atomics"))
}

#[derive(Debug)]
pub struct CapabilityDetector {
    runtime_supports: bool,
    flags: Mutex<Option<EnvFlags>>,
    decision: OnceCell<bool>,
}

impl CapabilityDetector {
    pub fn new(runtime_supports: bool) -> Self {
        Self {
            runtime_supports,
            flags: Mutex::new(None),
            decision: OnceCell::new(),
        }
    }

    /// Detector for the current build, flags not yet known.
    pub fn detect() -> Self {
        Self::new(runtime_supports_shared_memory())
    }

    /// Main-thread detector with flags taken from the page URL.
    pub fn from_page_url(url: &Url) -> Self {
        Self::with_flags(runtime_supports_shared_memory(), EnvFlags::from_page_url(url))
    }

    pub fn with_flags(runtime_supports: bool, flags: EnvFlags) -> Self {
        let detector = Self::new(runtime_supports);
        *detector.flags.lock() = Some(flags);
        detector
    }

    /// Worker-side setter for the flags forwarded by the parent. Allowed
    /// once, and only before the first call to `can_use_shared_memory`.
    pub fn configure(&self, flags: EnvFlags) -> Result<(), CapabilityError> {
        let mut slot = self.flags.lock();
        if self.decision.get().is_some() {
            return Err(CapabilityError::AlreadyDecided);
        }
        if slot.is_some() {
            return Err(CapabilityError::AlreadyConfigured);
        }
        *slot = Some(flags);
        Ok(())
    }

    pub fn flags(&self) -> EnvFlags {
        self.flags.lock().unwrap_or_default()
    }

    /// Message to forward these flags to a child worker.
    pub fn worker_init(&self) -> WorkerInit {
        WorkerInit {
            flags: self.flags(),
        }
    }

    /// Computed on first call and cached for the life of the detector.
    pub fn can_use_shared_memory(&self) -> bool {
        if let Some(decision) = self.decision.get() {
            return *decision;
        }
        let flags = self.flags.lock();
        *self.decision.get_or_init(|| {
            let f = flags.unwrap_or_default();
            let allowed = self.runtime_supports && !f.is_embed_mode && !f.force_no_sab;
            tracing::debug!(
                runtime_supports = self.runtime_supports,
                embed = f.is_embed_mode,
                no_sab = f.force_no_sab,
                allowed,
                "shared-memory capability decided"
            );
            allowed
        })
    }
}

impl Default for CapabilityDetector {
    fn default() -> Self {
        Self::detect()
    }
}
