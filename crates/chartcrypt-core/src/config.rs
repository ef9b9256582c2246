use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CryptError, CryptResult};
use crate::paths;

/// Top-level configuration (loaded from ~/.chartcrypt/config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartcryptConfig {
    pub crypto: CryptoConfig,
    pub filter: FilterConfig,
    pub cluster: ClusterConfig,
    pub api: ApiConfig,
    pub log: LogConfig,
}

impl ChartcryptConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> CryptResult<Self> {
        if !path.exists() {
            tracing::debug!("config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| CryptError::file(path, e))?;
        toml::from_str(&content)
            .map_err(|e| CryptError::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// Key material locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Symmetric key file (default: ~/.chartcrypt/key)
    pub key_file: Option<PathBuf>,
    /// age identity file (default: ~/.chartcrypt/identity)
    pub identity_file: Option<PathBuf>,
}

impl CryptoConfig {
    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .as_deref()
            .map(paths::expand_tilde)
            .unwrap_or_else(paths::default_key_path)
    }

    pub fn identity_path(&self) -> PathBuf {
        self.identity_file
            .as_deref()
            .map(paths::expand_tilde)
            .unwrap_or_else(paths::default_identity_path)
    }
}

/// Git filter wiring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Command git runs for clean/smudge/textconv (default: chartcrypt)
    pub command: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            command: "chartcrypt".into(),
        }
    }
}

/// Where `recover` looks for the canonical key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub namespace: String,
    pub secret_name: String,
    /// Secret data field holding the key record
    pub field: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: "console".into(),
            secret_name: "console-conf".into(),
            field: "key".into(),
        }
    }
}

/// Identity registry endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// GraphQL endpoint URL
    pub endpoint: Option<String>,
    /// Bearer token (CHARTCRYPT_TOKEN takes precedence)
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn, so git filters stay quiet)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}
