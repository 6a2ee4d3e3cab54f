//! Log collaborator traits

use async_trait::async_trait;
use woodpecker_core::{CertChain, Checkpoint, SignedCertificateTimestamp};

use crate::error::LogResult;

/// Submits chains to a log's RFC 6962 write API
#[async_trait]
pub trait LogSubmitter: Send + Sync {
    /// Submit a precertificate chain
    ///
    /// # Errors
    ///
    /// Returns error if the log rejects the chain or the response is unusable
    async fn add_pre_chain(&self, chain: &CertChain) -> LogResult<SignedCertificateTimestamp>;

    /// Submit a certificate chain
    ///
    /// # Errors
    ///
    /// Returns error if the log rejects the chain or the response is unusable
    async fn add_chain(&self, chain: &CertChain) -> LogResult<SignedCertificateTimestamp>;
}

/// Confirms that logged entries are included in the log's Merkle tree
#[async_trait]
pub trait InclusionVerifier: Send + Sync {
    /// Fetch and verify the log's current checkpoint
    ///
    /// # Errors
    ///
    /// Returns error if the checkpoint cannot be fetched or does not verify
    async fn checkpoint(&self) -> LogResult<Checkpoint>;

    /// Check that the entry at `leaf_index`, issued as `sct`, is included
    /// under `checkpoint`
    ///
    /// # Errors
    ///
    /// Returns [`crate::LogError::InclusionVerificationFailed`] if it is not
    async fn check_inclusion(
        &self,
        checkpoint: &Checkpoint,
        sct: &SignedCertificateTimestamp,
        leaf_index: u64,
    ) -> LogResult<()>;
}
