//! Per-worker and per-run results.

use std::collections::BTreeMap;
use std::fmt;

use crate::peck::{PeckError, Stage};

/// A failed cycle and where it ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFailure {
    /// Log name
    pub log: String,
    /// Worker slot within the log
    pub worker: usize,
    /// Iteration within the worker, from 0
    pub iteration: u64,
    /// What failed
    pub error: PeckError,
}

impl CycleFailure {
    /// Stage that failed
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.error.stage()
    }
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} worker {} iteration {}: {}",
            self.log, self.worker, self.iteration, self.error
        )
    }
}

/// What one worker did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Log name
    pub log: String,
    /// Worker slot within the log
    pub worker: usize,
    /// Cycles started
    pub attempts: u64,
    /// Cycles that completed every stage
    pub successes: u64,
    /// Cycles that failed, in order
    pub failures: Vec<CycleFailure>,
}

impl WorkerReport {
    /// An empty report for `worker` on `log`
    #[must_use]
    pub fn new(log: impl Into<String>, worker: usize) -> Self {
        Self {
            log: log.into(),
            worker,
            attempts: 0,
            successes: 0,
            failures: Vec::new(),
        }
    }
}

/// What a whole run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One report per worker that finished
    pub workers: Vec<WorkerReport>,
    /// Workers whose task panicked or was aborted
    pub lost_workers: usize,
    /// Whether the run was cancelled
    pub cancelled: bool,
}

impl RunReport {
    /// Cycles started across all workers
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.workers.iter().map(|w| w.attempts).sum()
    }

    /// Cycles that succeeded across all workers
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.workers.iter().map(|w| w.successes).sum()
    }

    /// Every failed cycle
    pub fn failures(&self) -> impl Iterator<Item = &CycleFailure> {
        self.workers.iter().flat_map(|w| w.failures.iter())
    }

    /// Whether every cycle of every worker succeeded and nothing interrupted the run
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.lost_workers == 0 && self.failures().next().is_none()
    }

    /// `Ok` if the run succeeded, else every failure joined into one error
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] if any cycle failed, a worker was lost or the run
    /// was cancelled
    pub fn into_result(self) -> Result<Self, RunError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(RunError {
            attempts: self.attempts(),
            failures: self.failures().cloned().collect(),
            lost_workers: self.lost_workers,
            cancelled: self.cancelled,
        })
    }
}

/// All failures of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    /// Cycles started
    pub attempts: u64,
    /// Every failed cycle
    pub failures: Vec<CycleFailure>,
    /// Workers whose task panicked or was aborted
    pub lost_workers: usize,
    /// Whether the run was cancelled
    pub cancelled: bool,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} cycles failed",
            self.failures.len(),
            self.attempts
        )?;
        if self.cancelled {
            write!(f, " (run cancelled)")?;
        }
        if self.lost_workers > 0 {
            write!(f, "\n{} workers lost", self.lost_workers)?;
        }
        let mut by_worker: BTreeMap<(&str, usize), Vec<&CycleFailure>> = BTreeMap::new();
        for failure in &self.failures {
            by_worker
                .entry((failure.log.as_str(), failure.worker))
                .or_default()
                .push(failure);
        }
        for ((log, worker), failures) in by_worker {
            write!(f, "\n{log} worker {worker}: {} failed", failures.len())?;
            for failure in failures {
                write!(f, "\n  iteration {}: {}", failure.iteration, failure.error)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RunError {}
