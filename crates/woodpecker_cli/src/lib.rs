//! Woodpecker command-line support
//!
//! Configuration loading, exit statuses and logging setup shared by the
//! `woodpecker` and `woodpecker-root` binaries.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod setup;

pub use config::{Config, ConfigError};
pub use setup::{SetupError, setup, setup_with};

use tracing_subscriber::EnvFilter;
use woodpecker_runtime::{Orchestrator, RunError, RunReport};

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "woodpecker=info";

/// Process exit statuses
pub mod exit {
    /// Bad arguments or configuration
    pub const CONFIG: u8 = 1;
    /// The issuer or a log could not be set up
    pub const SETUP: u8 = 2;
    /// At least one cycle failed, or the run was cancelled
    pub const RUN: u8 = 3;
}

/// Install the fmt subscriber, filtered by `RUST_LOG` or [`DEFAULT_FILTER`]
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Why `woodpecker` stopped without success
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The issuer or a log could not be set up
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// The run finished with failed cycles or was cancelled
    #[error("woodpecking failed: {0}")]
    Run(#[from] RunError),
}

impl Failure {
    /// Process exit status for this failure
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => exit::CONFIG,
            Self::Setup(_) => exit::SETUP,
            Self::Run(_) => exit::RUN,
        }
    }
}

/// Run every worker to completion
///
/// # Errors
///
/// Returns [`Failure::Run`] unless every cycle succeeded
pub async fn woodpeck(orchestrator: Orchestrator) -> Result<RunReport, Failure> {
    Ok(orchestrator.run().await.into_result()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_failure() {
        let config = Failure::from(ConfigError::Invalid("no logs configured".into()));
        assert_eq!(config.exit_code(), exit::CONFIG);

        let run = Failure::from(RunError {
            attempts: 1,
            failures: Vec::new(),
            lost_workers: 0,
            cancelled: true,
        });
        assert_eq!(run.exit_code(), exit::RUN);
        assert!(run.to_string().starts_with("woodpecking failed: 0 of 1 cycles failed"));
    }
}
