//! Issuer error types.

use std::path::PathBuf;

use openssl::error::ErrorStack;
use woodpecker_core::CodecError;

/// Issuance result type
pub type IssueResult<T> = Result<T, IssueError>;

/// Errors loading the CA certificate or key
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read or written
    #[error("{}: {source}", path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// No usable PEM block, or a block with the wrong label
    #[error("malformed PEM: {reason}")]
    MalformedPem {
        /// What was wrong
        reason: String,
    },

    /// A PKCS#8 key of an algorithm other than RSA or EC
    #[error("unsupported PKCS#8 key type {0}")]
    UnsupportedKeyType(String),

    /// The DER inside a PEM block could not be decoded
    #[error("parsing {what}: {source}")]
    Parse {
        /// Certificate or key
        what: &'static str,
        /// OpenSSL error
        #[source]
        source: ErrorStack,
    },

    /// The private key does not belong to the CA certificate
    #[error("private key does not match the CA certificate")]
    KeyMismatch,
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPem {
            reason: reason.into(),
        }
    }
}

/// Errors issuing a precertificate or final certificate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssueError {
    /// Building or signing the certificate failed
    #[error("issuance failed: {reason}")]
    Issuance {
        /// What failed
        reason: String,
    },

    /// The precertificate could not be parsed
    #[error("parsing precertificate: {reason}")]
    Parse {
        /// What was wrong
        reason: String,
    },
}

impl IssueError {
    pub(crate) fn issuance(reason: impl Into<String>) -> Self {
        Self::Issuance {
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}

impl From<ErrorStack> for IssueError {
    fn from(e: ErrorStack) -> Self {
        Self::issuance(e.to_string())
    }
}

impl From<CodecError> for IssueError {
    fn from(e: CodecError) -> Self {
        Self::issuance(format!("SCT list: {e}"))
    }
}

/// Errors creating a root CA
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Key or certificate generation failed
    #[error("generating root CA: {0}")]
    Generate(#[from] ErrorStack),

    /// The validity period does not fit the calendar
    #[error("root CA validity out of range")]
    Validity,

    /// Writing an output file failed
    #[error("writing {}: {source}", path.display())]
    Write {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
