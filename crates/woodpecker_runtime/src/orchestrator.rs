//! Concurrent pecking across logs.
//!
//! Each log gets `parallelism` workers, one tokio task each, and every worker
//! runs `iterations` cycles. A failed cycle is recorded and the worker moves
//! on; siblings are never cancelled because of it. Cancellation comes only
//! from the caller's token.

use std::sync::Arc;

use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use woodpecker_issue::CertificateIssuer;
use woodpecker_log::{InclusionVerifier, LogSubmitter};

use crate::peck::Woodpecker;
use crate::report::{CycleFailure, RunReport, WorkerReport};

/// The collaborators for one log
#[derive(Clone)]
pub struct LogTarget {
    /// Name used in logs and reports
    pub name: String,
    /// Submission client
    pub submitter: Arc<dyn LogSubmitter>,
    /// Inclusion verifier
    pub verifier: Arc<dyn InclusionVerifier>,
}

impl std::fmt::Debug for LogTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogTarget")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Worker counts for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Workers per log
    pub parallelism: usize,
    /// Cycles per worker
    pub iterations: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            iterations: 1,
        }
    }
}

/// Runs workers for every log and collects their reports
pub struct Orchestrator {
    base_domain: String,
    issuer: Arc<dyn CertificateIssuer>,
    targets: Vec<LogTarget>,
    config: RunConfig,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("base_domain", &self.base_domain)
            .field("targets", &self.targets)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator sharing `issuer` across all logs
    #[must_use]
    pub fn new(
        base_domain: impl Into<String>,
        issuer: Arc<dyn CertificateIssuer>,
        config: RunConfig,
    ) -> Self {
        Self {
            base_domain: base_domain.into(),
            issuer,
            targets: Vec::new(),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Add a log to peck
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.targets.push(target);
        self
    }

    /// Stop starting network calls once `cancel` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this run
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every worker to completion
    pub async fn run(self) -> RunReport {
        info!(
            logs = self.targets.len(),
            parallelism = self.config.parallelism,
            iterations = self.config.iterations,
            "woodpecking"
        );

        let mut handles = Vec::new();
        for target in &self.targets {
            let woodpecker = Woodpecker::new(
                self.base_domain.clone(),
                self.issuer.clone(),
                target.submitter.clone(),
                target.verifier.clone(),
            );
            for slot in 0..self.config.parallelism {
                handles.push(tokio::spawn(worker(
                    woodpecker.clone(),
                    target.name.clone(),
                    slot,
                    self.config.iterations,
                    self.cancel.clone(),
                )));
            }
        }

        let mut report = RunReport::default();
        for joined in join_all(handles).await {
            match joined {
                Ok(worker) => report.workers.push(worker),
                Err(e) => {
                    error!(error = %e, "worker task failed");
                    report.lost_workers += 1;
                }
            }
        }
        report.cancelled = self.cancel.is_cancelled();

        info!(
            attempts = report.attempts(),
            successes = report.successes(),
            failures = report.failures().count(),
            cancelled = report.cancelled,
            "woodpecking finished"
        );
        report
    }
}

async fn worker(
    woodpecker: Woodpecker,
    log: String,
    slot: usize,
    iterations: u64,
    cancel: CancellationToken,
) -> WorkerReport {
    let mut rng = SmallRng::from_entropy();
    let mut report = WorkerReport::new(log.clone(), slot);

    for iteration in 0..iterations {
        if cancel.is_cancelled() {
            break;
        }
        report.attempts += 1;
        match woodpecker.peck(&mut rng, &cancel).await {
            Ok(outcome) => {
                report.successes += 1;
                debug!(
                    log = %log,
                    worker = slot,
                    iteration,
                    precert_index = outcome.precert_index,
                    final_index = outcome.final_index,
                    "peck succeeded"
                );
            }
            Err(e) => {
                warn!(log = %log, worker = slot, iteration, stage = %e.stage(), error = %e, "peck failed");
                report.failures.push(CycleFailure {
                    log: log.clone(),
                    worker: slot,
                    iteration,
                    error: e,
                });
            }
        }
    }

    info!(
        log = %log,
        worker = slot,
        attempts = report.attempts,
        successes = report.successes,
        failures = report.failures.len(),
        "worker finished"
    );
    report
}
