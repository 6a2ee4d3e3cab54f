//! Certificate chains submitted to a log.

/// An ordered list of DER certificates: the leaf first, then each issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertChain {
    certificates: Vec<Vec<u8>>,
}

impl CertChain {
    /// Create a chain of `leaf` issued by `issuer`
    #[must_use]
    pub fn new(leaf: Vec<u8>, issuer: Vec<u8>) -> Self {
        Self {
            certificates: vec![leaf, issuer],
        }
    }

    /// Create a chain from DER certificates, leaf first.
    ///
    /// Returns `None` for an empty list.
    #[must_use]
    pub fn from_certificates(certificates: Vec<Vec<u8>>) -> Option<Self> {
        if certificates.is_empty() {
            None
        } else {
            Some(Self { certificates })
        }
    }

    /// The end-entity certificate
    #[must_use]
    pub fn leaf(&self) -> &[u8] {
        &self.certificates[0]
    }

    /// The certificate that issued the leaf, if present
    #[must_use]
    pub fn issuer(&self) -> Option<&[u8]> {
        self.certificates.get(1).map(Vec::as_slice)
    }

    /// All certificates, leaf first
    #[must_use]
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    /// Number of certificates
    #[must_use]
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Always false: a chain holds at least the leaf
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Consume the chain, returning the DER certificates
    #[must_use]
    pub fn into_certificates(self) -> Vec<Vec<u8>> {
        self.certificates
    }
}
