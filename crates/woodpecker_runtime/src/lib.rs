//! Woodpecker runtime
//!
//! The peck state machine and the orchestrator that runs it concurrently
//! against every configured log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domains;
pub mod orchestrator;
pub mod peck;
pub mod report;

pub use domains::{MAX_DOMAINS, generate_domains};
pub use orchestrator::{LogTarget, Orchestrator, RunConfig};
pub use peck::{PeckError, PeckOutcome, Stage, Woodpecker};
pub use report::{CycleFailure, RunError, RunReport, WorkerReport};
