//! Woodpecker log collaborators.
//!
//! This crate talks to the CT log under test:
//! - [`HttpLogClient`] submits chains through the RFC 6962 write API
//! - [`TileVerifier`] reads the log's signed checkpoint and static-ct-api
//!   tiles to prove an SCT's entry is included
//! - [`connect`] builds both from a configured [`LogDescriptor`]
//!
//! The [`LogSubmitter`] and [`InclusionVerifier`] traits are the seams the
//! runtime depends on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod client;
pub mod error;
pub mod setup;
pub mod tile;
pub mod trait_;
pub mod verifier;

#[cfg(test)]
mod test_server;

// Re-exports
pub use checkpoint::{CheckpointSigner, CheckpointVerifier, Note, NoteSignature, parse_checkpoint};
pub use client::{AddChainResponse, DEFAULT_TIMEOUT, HttpLogClient, USER_AGENT, http_client};
pub use error::{LogError, LogResult};
pub use setup::{LogClients, LogDescriptor, connect};
pub use tile::{HttpTileFetcher, TILE_HEIGHT, TILE_WIDTH, Tile, TileFetcher, TileKind};
pub use trait_::{InclusionVerifier, LogSubmitter};
pub use verifier::TileVerifier;
