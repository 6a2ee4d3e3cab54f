//! Woodpecker certificate authority
//!
//! Loads a test CA from PEM and mints the disposable certificates submitted to
//! CT logs: precertificates carrying the critical poison extension, and final
//! certificates carrying the SCTs returned for them. Also bootstraps the
//! self-signed root used as that CA.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod issuer;
pub mod load;
pub mod root;

pub use error::{BootstrapError, IssueError, IssueResult, LoadError};
pub use issuer::{CertificateIssuer, Issuer};
pub use load::{certificate_from_pem, load_certificate, load_private_key, private_key_from_pem};
pub use root::{RootAuthority, create_root};
