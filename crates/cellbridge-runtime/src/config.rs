use std::path::Path;
use std::time::Duration;

use cellbridge_parse::{AccessPattern, DEFAULT_ACCESS_PATTERN};
use serde::{Deserialize, Serialize};

use crate::capability::EnvFlags;
use crate::error::ConfigError;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Runner-side bridge settings.
///
/// JSON form, every field optional:
/// `{"query_timeout_ms": 30000, "access_pattern": "q.cells", "flags": {"isEmbedMode": false, "forceNoSAB": false}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bound on every wait for the engine, in both bridges.
    #[serde(rename = "query_timeout_ms", with = "duration_ms")]
    pub query_timeout: Duration,
    /// Dotted path of the data-access call rewritten under the async bridge.
    pub access_pattern: String,
    /// Environment flags a parent forwards to this runner.
    pub flags: EnvFlags,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            access_pattern: DEFAULT_ACCESS_PATTERN.to_string(),
            flags: EnvFlags::default(),
        }
    }
}

impl BridgeConfig {
    /// Settings for a user-facing session.
    pub fn interactive() -> Self {
        Self::default()
    }

    /// Short timeout so a stuck engine fails a test quickly.
    pub fn testing() -> Self {
        Self {
            query_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_access_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.access_pattern = pattern.into();
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.access_pattern()?;
        Ok(())
    }

    pub fn access_pattern(&self) -> Result<AccessPattern, ConfigError> {
        Ok(AccessPattern::parse(&self.access_pattern)?)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = BridgeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BridgeConfig::interactive());
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert_eq!(config.access_pattern, "q.cells");
    }

    #[test]
    fn reads_partial_json() {
        let config = BridgeConfig::from_json_str(
            r#"{"query_timeout_ms": 250, "flags": {"forceNoSAB": true}}"#,
        )
        .unwrap();
        assert_eq!(config.query_timeout, Duration::from_millis(250));
        assert!(config.flags.force_no_sab);
        assert!(!config.flags.is_embed_mode);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            BridgeConfig::from_json_str(r#"{"query_timeout_ms": 0}"#),
            Err(ConfigError::ZeroTimeout)
        ));
        assert!(matches!(
            BridgeConfig::from_json_str(r#"{"access_pattern": "q..cells"}"#),
            Err(ConfigError::Pattern(_))
        ));
        assert!(matches!(
            BridgeConfig::from_json_str("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"query_timeout_ms": 1500, "access_pattern": "sheet.cells"}}"#).unwrap();
        let config = BridgeConfig::from_path(file.path()).unwrap();
        assert_eq!(config.query_timeout, Duration::from_millis(1500));
        assert_eq!(config.access_pattern().unwrap().to_string(), "sheet.cells");

        let missing = BridgeConfig::from_path(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn serializes_in_millis() {
        let json = serde_json::to_value(BridgeConfig::testing()).unwrap();
        assert_eq!(json["query_timeout_ms"], 2000);
    }
}
