//! Run configuration document.
//!
//! ```yaml
//! basedomain: woodpecker.example
//! cacertpath: ca.pem
//! cakeypath: ca.key
//! parallelism: 4
//! iterations: 100
//! logs:
//!   - url: https://log.example/2025h2/
//!     monitoring: https://mon.example/2025h2/
//!     publickey: MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAE...
//!     notafterstart: 2025-07-01T00:00:00Z
//!     notafterlimit: 2026-01-01T00:00:00Z
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use woodpecker_log::{DEFAULT_TIMEOUT, LogDescriptor};
use woodpecker_runtime::RunConfig;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("reading {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The document is not valid YAML for a config
    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field has an unusable value
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything a run needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Names are issued below this domain
    #[serde(rename = "basedomain")]
    pub base_domain: String,

    /// Logs to peck, in order
    #[serde(default)]
    pub logs: Vec<LogDescriptor>,

    /// CA certificate, PEM
    #[serde(rename = "cacertpath")]
    pub ca_cert_path: PathBuf,

    /// CA private key, PEM
    #[serde(rename = "cakeypath")]
    pub ca_key_path: PathBuf,

    /// Workers per log
    #[serde(default)]
    pub parallelism: usize,

    /// Cycles per worker
    #[serde(default)]
    pub iterations: u64,

    /// Per-request HTTP timeout in seconds
    #[serde(rename = "requesttimeout", default)]
    pub request_timeout: Option<u64>,
}

impl Config {
    /// Read and validate the config at `path`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is unreadable, malformed or invalid
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate a config document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed or invalid
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values a run cannot start without
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::Invalid(reason.to_string()));
        if self.base_domain.trim().is_empty() {
            return invalid("basedomain is empty");
        }
        if self.logs.is_empty() {
            return invalid("no logs configured");
        }
        if self.parallelism == 0 {
            return invalid("parallelism must be at least 1");
        }
        if self.iterations == 0 {
            return invalid("iterations must be at least 1");
        }
        if self.request_timeout == Some(0) {
            return invalid("requesttimeout must be at least 1 second");
        }
        Ok(())
    }

    /// Worker counts for the orchestrator
    #[must_use]
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            parallelism: self.parallelism,
            iterations: self.iterations,
        }
    }

    /// HTTP request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.request_timeout
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs)
    }
}
