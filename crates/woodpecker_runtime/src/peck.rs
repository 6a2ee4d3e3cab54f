//! One issue, submit, verify cycle against one log.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use woodpecker_core::SignedCertificateTimestamp;
use woodpecker_issue::{CertificateIssuer, IssueError};
use woodpecker_log::{InclusionVerifier, LogError, LogSubmitter};

use crate::domains::generate_domains;

/// Stages of a peck, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Pick throwaway names
    GenerateDomains,
    /// Issue the precertificate
    IssuePrecert,
    /// `add-pre-chain`
    SubmitPrecert,
    /// Issue the final certificate with the precertificate SCT
    IssueFinal,
    /// `add-chain`
    SubmitFinal,
    /// Prove the precertificate SCT's entry is in the tree
    VerifyPrecert,
    /// Prove the final certificate SCT's entry is in the tree
    VerifyFinal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GenerateDomains => "generate domains",
            Self::IssuePrecert => "issue precertificate",
            Self::SubmitPrecert => "submit precertificate",
            Self::IssueFinal => "issue final certificate",
            Self::SubmitFinal => "submit final certificate",
            Self::VerifyPrecert => "verify precertificate inclusion",
            Self::VerifyFinal => "verify final certificate inclusion",
        };
        f.write_str(name)
    }
}

/// Why a peck failed; one variant per failing stage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeckError {
    /// Precertificate issuance failed
    #[error("issue precertificate: {0}")]
    IssuePrecert(#[source] IssueError),

    /// The log did not accept the precertificate
    #[error("submit precertificate: {0}")]
    SubmitPrecert(#[source] LogError),

    /// Final certificate issuance failed
    #[error("issue final certificate: {0}")]
    IssueFinal(#[source] IssueError),

    /// The log did not accept the final certificate
    #[error("submit final certificate: {0}")]
    SubmitFinal(#[source] LogError),

    /// The precertificate SCT could not be proven included
    #[error("verify precertificate inclusion: {0}")]
    VerifyPrecert(#[source] LogError),

    /// The final certificate SCT could not be proven included
    #[error("verify final certificate inclusion: {0}")]
    VerifyFinal(#[source] LogError),

    /// The run was cancelled before the stage started
    #[error("cancelled before {0}")]
    Cancelled(Stage),
}

impl PeckError {
    /// The stage that failed
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::IssuePrecert(_) => Stage::IssuePrecert,
            Self::SubmitPrecert(_) => Stage::SubmitPrecert,
            Self::IssueFinal(_) => Stage::IssueFinal,
            Self::SubmitFinal(_) => Stage::SubmitFinal,
            Self::VerifyPrecert(_) => Stage::VerifyPrecert,
            Self::VerifyFinal(_) => Stage::VerifyFinal,
            Self::Cancelled(stage) => *stage,
        }
    }

    /// Whether the cycle stopped because of cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// What a successful peck did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeckOutcome {
    /// Names on the certificate
    pub domains: usize,
    /// Leaf index of the precertificate entry
    pub precert_index: u64,
    /// Leaf index of the final certificate entry
    pub final_index: u64,
}

/// Drives pecks against one log
#[derive(Clone)]
pub struct Woodpecker {
    base_domain: String,
    issuer: Arc<dyn CertificateIssuer>,
    submitter: Arc<dyn LogSubmitter>,
    verifier: Arc<dyn InclusionVerifier>,
}

impl fmt::Debug for Woodpecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Woodpecker")
            .field("base_domain", &self.base_domain)
            .finish_non_exhaustive()
    }
}

impl Woodpecker {
    /// Create a woodpecker issuing names below `base_domain`
    #[must_use]
    pub fn new(
        base_domain: impl Into<String>,
        issuer: Arc<dyn CertificateIssuer>,
        submitter: Arc<dyn LogSubmitter>,
        verifier: Arc<dyn InclusionVerifier>,
    ) -> Self {
        Self {
            base_domain: base_domain.into(),
            issuer,
            submitter,
            verifier,
        }
    }

    /// Run one cycle.
    ///
    /// `cancel` is checked before each network call; a call already in
    /// flight is allowed to finish.
    ///
    /// # Errors
    ///
    /// Returns the first failing stage's error
    pub async fn peck<R: Rng + Send>(
        &self,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<PeckOutcome, PeckError> {
        let proceed = |stage| {
            if cancel.is_cancelled() {
                Err(PeckError::Cancelled(stage))
            } else {
                Ok(())
            }
        };

        let domains = generate_domains(&self.base_domain, rng);
        debug!(count = domains.len(), first = %domains[0], "generated domains");

        let precert = self
            .issuer
            .issue_precert(&domains)
            .map_err(PeckError::IssuePrecert)?;
        debug!(len = precert.leaf().len(), "issued precertificate");

        proceed(Stage::SubmitPrecert)?;
        let precert_sct = self
            .submitter
            .add_pre_chain(&precert)
            .await
            .map_err(PeckError::SubmitPrecert)?;
        debug!(log_id = %precert_sct.log_id_hex(), timestamp = precert_sct.timestamp, "precertificate submitted");

        let final_chain = self
            .issuer
            .issue_final(&precert, std::slice::from_ref(&precert_sct))
            .map_err(PeckError::IssueFinal)?;
        debug!(len = final_chain.leaf().len(), "issued final certificate");

        proceed(Stage::SubmitFinal)?;
        let final_sct = self
            .submitter
            .add_chain(&final_chain)
            .await
            .map_err(PeckError::SubmitFinal)?;
        debug!(log_id = %final_sct.log_id_hex(), timestamp = final_sct.timestamp, "final certificate submitted");

        proceed(Stage::VerifyPrecert)?;
        let precert_index = self
            .verify(&precert_sct)
            .await
            .map_err(PeckError::VerifyPrecert)?;

        proceed(Stage::VerifyFinal)?;
        let final_index = self
            .verify(&final_sct)
            .await
            .map_err(PeckError::VerifyFinal)?;

        Ok(PeckOutcome {
            domains: domains.len(),
            precert_index,
            final_index,
        })
    }

    async fn verify(&self, sct: &SignedCertificateTimestamp) -> Result<u64, LogError> {
        let leaf_index = sct.leaf_index()?;
        let checkpoint = self.verifier.checkpoint().await?;
        self.verifier
            .check_inclusion(&checkpoint, sct, leaf_index)
            .await?;
        debug!(leaf_index, tree_size = checkpoint.size, "inclusion verified");
        Ok(leaf_index)
    }
}
