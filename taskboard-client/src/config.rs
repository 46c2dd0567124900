/// Client configuration.
/// Reads client.json from ~/.config/taskboard/client.json (or platform equivalent).
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use taskboard_core::EngineConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer credential sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
            engine: EngineConfig::default(),
        }
    }
}

/// Default config path: ~/.config/taskboard/client.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskboard")
        .join("client.json")
}

/// Load config from path. A missing file yields defaults; anything else that
/// goes wrong is an error.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("No config at {}, using defaults", path.display());
            Ok(ClientConfig::default())
        }
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_core::ReconcilePolicy;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("client.json")).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_reads_nested_engine_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        fs::write(
            &path,
            r#"{"baseUrl":"https://board.example","token":"abc","engine":{"reconcile":"trustOptimistic","gap":10}}"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.base_url, "https://board.example");
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.engine.reconcile, ReconcilePolicy::TrustOptimistic);
        assert_eq!(config.engine.gap, 10.0);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }
}
