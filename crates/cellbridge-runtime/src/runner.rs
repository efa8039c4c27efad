//! Per-runner state: which transport this runner uses and how its source
//! is prepared. One context is built at runner startup and handed to the
//! sandbox; nothing here is global.

use std::borrow::Cow;

use cellbridge_parse::{AccessPattern, SourceDialect, SourceRewriter};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use crate::async_bridge::AsyncBridge;
use crate::capability::CapabilityDetector;
use crate::codec::QueryOutput;
use crate::config::BridgeConfig;
use crate::engine::EngineHandle;
use crate::error::{BridgeError, RunnerError};
use crate::protocol::AsyncCellResponse;
use crate::sync_bridge::SyncBridge;

#[derive(Debug, Clone)]
pub enum CellAccess {
    Sync(SyncBridge),
    Async(AsyncBridge),
}

#[derive(Debug, Clone)]
pub struct RunnerContext {
    access: CellAccess,
    pattern: AccessPattern,
    config: BridgeConfig,
}

impl RunnerContext {
    /// Pick the transport once from `detector`. `responses` feeds the async
    /// dispatcher and is dropped unused under the sync bridge.
    pub fn start(
        config: BridgeConfig,
        detector: &CapabilityDetector,
        engine: EngineHandle,
        responses: UnboundedReceiver<AsyncCellResponse>,
    ) -> Result<Self, RunnerError> {
        config.validate()?;
        let pattern = config.access_pattern()?;
        let access = if detector.can_use_shared_memory() {
            CellAccess::Sync(SyncBridge::new(engine, config.query_timeout))
        } else {
            CellAccess::Async(AsyncBridge::start(engine, responses)?)
        };
        info!(
            sync = matches!(access, CellAccess::Sync(_)),
            pattern = %pattern,
            "runner context started"
        );
        Ok(Self {
            access,
            pattern,
            config,
        })
    }

    pub fn access(&self) -> &CellAccess {
        &self.access
    }

    pub fn is_sync(&self) -> bool {
        matches!(self.access, CellAccess::Sync(_))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Source as it should be executed: unchanged under the blocking bridge,
    /// with data-access calls awaited under the message bridge.
    pub fn prepare_source<'s>(&self, source: &'s str, dialect: SourceDialect) -> Cow<'s, str> {
        match self.access {
            CellAccess::Sync(_) => Cow::Borrowed(source),
            CellAccess::Async(_) => {
                SourceRewriter::new(self.pattern.clone(), dialect).rewrite(source)
            }
        }
    }

    /// Query through whichever bridge was selected. Under the blocking
    /// bridge this parks the current thread.
    pub async fn query_cells(&self, range: &str) -> Result<QueryOutput, BridgeError> {
        match &self.access {
            CellAccess::Sync(bridge) => bridge.query_cells(range),
            CellAccess::Async(bridge) => {
                bridge
                    .query_cells_with_timeout(range, self.config.query_timeout)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::EnvFlags;
    use crate::error::ConfigError;
    use std::time::Duration;

    fn detector(no_sab: bool) -> CapabilityDetector {
        CapabilityDetector::with_flags(
            true,
            EnvFlags {
                force_no_sab: no_sab,
                ..Default::default()
            },
        )
    }

    #[test]
    fn transport_follows_capability() {
        let (handle, _commands, responses) = EngineHandle::pair();
        let sync = RunnerContext::start(BridgeConfig::testing(), &detector(false), handle, responses)
            .unwrap();
        assert!(sync.is_sync());
        let src = "let x = q.cells('A1')";
        assert!(matches!(
            sync.prepare_source(src, SourceDialect::JavaScript),
            Cow::Borrowed(s) if s == src
        ));

        let (handle, _commands, responses) = EngineHandle::pair();
        let rewriting = RunnerContext::start(BridgeConfig::testing(), &detector(true), handle, responses)
            .unwrap();
        assert!(!rewriting.is_sync());
        assert_eq!(
            rewriting.prepare_source(src, SourceDialect::JavaScript),
            "let x = (await q.cells('A1'))"
        );
    }

    #[test]
    fn custom_pattern_and_python() {
        let (handle, _commands, responses) = EngineHandle::pair();
        let config = BridgeConfig::testing().with_access_pattern("cells");
        let ctx = RunnerContext::start(config, &detector(true), handle, responses).unwrap();
        assert_eq!(
            ctx.prepare_source("v = cells(\"A1\") # cells(", SourceDialect::Python),
            "v = (await cells(\"A1\")) # cells("
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (handle, _commands, responses) = EngineHandle::pair();
        let config = BridgeConfig::testing().with_query_timeout(Duration::ZERO);
        let err = RunnerContext::start(config, &detector(false), handle, responses).unwrap_err();
        assert!(matches!(err, RunnerError::Config(ConfigError::ZeroTimeout)));
    }
}
