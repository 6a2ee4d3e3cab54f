//! Woodpecker simulation
//!
//! In-memory doubles for the issuer and the log under test, with
//! reproducible failure injection.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod failure;
pub mod issuer;
pub mod log;

pub use failure::{FailureModel, FailurePlan, FailurePoint};
pub use issuer::StubIssuer;
pub use log::MemoryLog;
