//! Engine settings.

use crate::config::error::ConfigError;
use crate::config::parser::parse_document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Timeouts and fixture location shared by both sides of the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// How long a request or response handler may run
    pub default_command_timeout_ms: u64,
    /// Filled into `responseTimeout` when a handler installs a response handler
    pub response_timeout_ms: u64,
    pub fixtures_folder: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_command_timeout_ms: 4000,
            response_timeout_ms: 30000,
            fixtures_folder: PathBuf::from("fixtures"),
        }
    }
}

impl EngineConfig {
    pub fn default_command_timeout(&self) -> Duration {
        Duration::from_millis(self.default_command_timeout_ms)
    }
}

/// Read an [`EngineConfig`] from a YAML, JSON or JSONC file.
pub async fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let shown = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: shown.clone(),
            source,
        })?;
    let config: EngineConfig = parse_document(&content, &shown)?;
    debug!(path = %shown, ?config, "loaded engine config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_command_timeout(), Duration::from_secs(4));
        assert_eq!(config.response_timeout_ms, 30000);
        assert_eq!(config.fixtures_folder, PathBuf::from("fixtures"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_load_config_yaml() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("Should create temp file");
        writeln!(file, "responseTimeoutMs: 500\nfixturesFolder: cypress/fixtures")
            .expect("Should write");

        let config = load_config(file.path()).await.expect("Should load");
        assert_eq!(config.response_timeout_ms, 500);
        assert_eq!(config.default_command_timeout_ms, 4000);
        assert_eq!(config.fixtures_folder, PathBuf::from("cypress/fixtures"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let result = load_config(dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
