//! Deterministic stand-in for the certificate authority.

use std::sync::Arc;

use woodpecker_core::{CertChain, SignedCertificateTimestamp};
use woodpecker_issue::{CertificateIssuer, IssueError, IssueResult};

use crate::failure::{FailurePlan, FailurePoint};

const STUB_CA: &[u8] = b"stub-ca";

/// Issues placeholder "certificates" that encode their inputs.
///
/// Precertificates are `precert:` followed by the names joined with `,`;
/// final certificates are `final:<n>:` followed by the precertificate, where
/// `n` is the number of SCTs embedded.
#[derive(Debug, Default)]
pub struct StubIssuer {
    plan: Arc<FailurePlan>,
}

impl StubIssuer {
    /// Create an issuer failing according to `plan`
    #[must_use]
    pub fn new(plan: Arc<FailurePlan>) -> Self {
        Self { plan }
    }

    fn injected(point: FailurePoint) -> IssueError {
        IssueError::Issuance {
            reason: format!("injected {point:?} failure"),
        }
    }
}

impl CertificateIssuer for StubIssuer {
    fn issue_precert(&self, sans: &[String]) -> IssueResult<CertChain> {
        if self.plan.should_fail(FailurePoint::IssuePrecert) {
            return Err(Self::injected(FailurePoint::IssuePrecert));
        }
        if sans.is_empty() {
            return Err(IssueError::Issuance {
                reason: "no subject alternative names".into(),
            });
        }
        let leaf = format!("precert:{}", sans.join(",")).into_bytes();
        Ok(CertChain::new(leaf, STUB_CA.to_vec()))
    }

    fn issue_final(
        &self,
        precert: &CertChain,
        scts: &[SignedCertificateTimestamp],
    ) -> IssueResult<CertChain> {
        if self.plan.should_fail(FailurePoint::IssueFinal) {
            return Err(Self::injected(FailurePoint::IssueFinal));
        }
        let body = precert
            .leaf()
            .strip_prefix(b"precert:")
            .ok_or_else(|| IssueError::Parse {
                reason: "not a stub precertificate".into(),
            })?;
        let mut leaf = format!("final:{}:", scts.len()).into_bytes();
        leaf.extend_from_slice(body);
        Ok(CertChain::new(leaf, STUB_CA.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precert_then_final() {
        let issuer = StubIssuer::default();
        let precert = issuer
            .issue_precert(&["a.test".into(), "b.test".into()])
            .unwrap();
        assert_eq!(precert.leaf(), b"precert:a.test,b.test");
        assert_eq!(precert.issuer(), Some(STUB_CA));

        let final_chain = issuer.issue_final(&precert, &[]).unwrap();
        assert_eq!(final_chain.leaf(), b"final:0:a.test,b.test");
    }

    #[test]
    fn test_empty_sans_rejected() {
        assert!(matches!(
            StubIssuer::default().issue_precert(&[]),
            Err(IssueError::Issuance { .. })
        ));
    }

    #[test]
    fn test_final_needs_stub_precert() {
        let err = StubIssuer::default()
            .issue_final(&CertChain::new(vec![0x30], vec![]), &[])
            .unwrap_err();
        assert!(matches!(err, IssueError::Parse { .. }));
    }

    #[test]
    fn test_injected_failure() {
        let plan = Arc::new(FailurePlan::none().fail_nth(FailurePoint::IssuePrecert, 1));
        let issuer = StubIssuer::new(plan);
        assert!(issuer.issue_precert(&["a.test".into()]).is_err());
        assert!(issuer.issue_precert(&["a.test".into()]).is_ok());
    }
}
