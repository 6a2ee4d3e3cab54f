//! Issuer and log setup.
//!
//! Everything here runs before the first worker starts, so a bad CA or log
//! descriptor stops the process before any certificate is issued.

use std::sync::Arc;

use tracing::info;
use woodpecker_issue::{Issuer, LoadError};
use woodpecker_log::{LogDescriptor, LogError, connect, http_client};
use woodpecker_runtime::{LogTarget, Orchestrator};

use crate::config::Config;

/// Setup failures
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The CA certificate or key is unusable
    #[error("creating issuer: {0}")]
    Issuer(#[from] LoadError),

    /// The shared HTTP client could not be built
    #[error("creating HTTP client: {0}")]
    Client(#[source] LogError),

    /// A log descriptor is unusable
    #[error("setting up log {url}: {source}")]
    Log {
        /// Submission prefix of the log
        url: String,
        /// Underlying error
        #[source]
        source: LogError,
    },
}

/// Build the issuer and HTTP collaborators for every configured log
///
/// # Errors
///
/// Returns [`SetupError`] for the first component that cannot be built
pub fn setup(config: &Config) -> Result<Orchestrator, SetupError> {
    let client = http_client(config.timeout()).map_err(SetupError::Client)?;
    setup_with(config, |descriptor| {
        let clients = connect(descriptor, &client)?;
        Ok(LogTarget {
            name: clients.name,
            submitter: clients.submitter,
            verifier: clients.verifier,
        })
    })
}

/// Build the issuer, then a target per log with `connect`
///
/// `connect` is not called if the issuer cannot be built.
///
/// # Errors
///
/// Returns [`SetupError::Issuer`] if the CA does not load and
/// [`SetupError::Log`] for the first log `connect` rejects
pub fn setup_with<F>(config: &Config, mut connect: F) -> Result<Orchestrator, SetupError>
where
    F: FnMut(&LogDescriptor) -> Result<LogTarget, LogError>,
{
    let issuer = Issuer::from_files(&config.ca_cert_path, &config.ca_key_path)?;
    info!(cert = %config.ca_cert_path.display(), "issuer loaded");

    let mut orchestrator = Orchestrator::new(
        config.base_domain.clone(),
        Arc::new(issuer),
        config.run_config(),
    );
    for descriptor in &config.logs {
        let target = connect(descriptor).map_err(|source| SetupError::Log {
            url: descriptor.url.clone(),
            source,
        })?;
        orchestrator = orchestrator.with_target(target);
    }
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Failure, exit, woodpeck};
    use openssl::pkey::PKey;
    use std::path::Path;
    use woodpecker_issue::create_root;
    use woodpecker_sim::{FailurePlan, FailurePoint, MemoryLog};

    fn descriptor(public_key: &str) -> LogDescriptor {
        LogDescriptor {
            url: "https://log.example/2025h2/".into(),
            public_key: public_key.into(),
            monitoring: "https://mon.example/2025h2/".into(),
            not_after_start: None,
            not_after_limit: None,
        }
    }

    fn config(dir: &Path, logs: Vec<LogDescriptor>) -> Config {
        Config {
            base_domain: "woodpecker.example".into(),
            logs,
            ca_cert_path: dir.join("ca.pem"),
            ca_key_path: dir.join("ca-key.pem"),
            parallelism: 2,
            iterations: 2,
            request_timeout: Some(5),
        }
    }

    fn memory_target(log: &Arc<MemoryLog>) -> LogTarget {
        LogTarget {
            name: log.origin().to_string(),
            submitter: log.clone(),
            verifier: log.clone(),
        }
    }

    #[test]
    fn test_ed25519_ca_key_stops_setup() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), vec![descriptor("AAAA")]);
        create_root(&config.ca_cert_path, &config.ca_key_path).unwrap();
        let ed25519 = PKey::generate_ed25519().unwrap();
        std::fs::write(
            &config.ca_key_path,
            ed25519.private_key_to_pem_pkcs8().unwrap(),
        )
        .unwrap();

        let log = Arc::new(MemoryLog::new("sim.example/a", Arc::new(FailurePlan::none())).unwrap());
        let mut connected = 0;
        let err = setup_with(&config, |_| {
            connected += 1;
            Ok(memory_target(&log))
        })
        .unwrap_err();

        match &err {
            SetupError::Issuer(LoadError::UnsupportedKeyType(name)) => assert_eq!(name, "ED25519"),
            other => panic!("expected unsupported key, got {other:?}"),
        }
        assert_eq!(connected, 0);
        assert_eq!(log.size(), 0);
        assert_eq!(Failure::from(err).exit_code(), exit::SETUP);
    }

    #[test]
    fn test_unusable_log_descriptor_stops_setup() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), vec![descriptor("not base64!")]);
        create_root(&config.ca_cert_path, &config.ca_key_path).unwrap();

        let err = setup(&config).unwrap_err();
        match &err {
            SetupError::Log { url, source } => {
                assert_eq!(url, "https://log.example/2025h2/");
                assert!(matches!(source, LogError::Setup { .. }), "{source:?}");
            }
            other => panic!("expected log setup error, got {other:?}"),
        }
        assert_eq!(Failure::from(err).exit_code(), exit::SETUP);
    }

    #[tokio::test]
    async fn test_run_against_memory_log() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), vec![descriptor("AAAA")]);
        create_root(&config.ca_cert_path, &config.ca_key_path).unwrap();

        let log = Arc::new(MemoryLog::new("sim.example/a", Arc::new(FailurePlan::none())).unwrap());
        let orchestrator = setup_with(&config, |_| Ok(memory_target(&log))).unwrap();
        let report = woodpeck(orchestrator).await.unwrap();

        assert_eq!(report.attempts(), 4);
        assert_eq!(log.size(), 8);
    }

    #[tokio::test]
    async fn test_run_failure_has_its_own_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), vec![descriptor("AAAA")]);
        create_root(&config.ca_cert_path, &config.ca_key_path).unwrap();

        let plan = Arc::new(FailurePlan::none().fail_always(FailurePoint::AddChain));
        let log = Arc::new(MemoryLog::new("sim.example/a", plan).unwrap());
        let orchestrator = setup_with(&config, |_| Ok(memory_target(&log))).unwrap();
        let failure = woodpeck(orchestrator).await.unwrap_err();

        assert!(matches!(failure, Failure::Run(_)));
        assert_eq!(failure.exit_code(), exit::RUN);
        assert_ne!(exit::RUN, exit::SETUP);
        assert_ne!(exit::RUN, exit::CONFIG);
        assert_ne!(exit::SETUP, exit::CONFIG);
    }
}
