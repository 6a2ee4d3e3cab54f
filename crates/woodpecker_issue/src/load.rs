//! Loading the CA certificate and private key from PEM.
//!
//! Only the first PEM block of each input is considered.
//!
//! | label | encoding |
//! |---|---|
//! | `CERTIFICATE` | X.509 DER |
//! | `PRIVATE KEY` | PKCS#8, RSA or EC only |
//! | `RSA PRIVATE KEY` | PKCS#1 |
//! | `EC PRIVATE KEY`, `ECDSA PRIVATE KEY` | SEC1 |

use std::path::Path;

use openssl::ec::EcKey;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::X509;
use x509_parser::pem::Pem;

use crate::error::LoadError;

fn first_block(pem: &[u8]) -> Result<Pem, LoadError> {
    match Pem::iter_from_buffer(pem).next() {
        Some(Ok(block)) => Ok(block),
        Some(Err(e)) => Err(LoadError::malformed(format!("{e:?}"))),
        None => Err(LoadError::malformed("no PEM block found")),
    }
}

/// Decode a PEM `CERTIFICATE`
///
/// # Errors
///
/// Returns [`LoadError::MalformedPem`] for a missing block or wrong label, and
/// [`LoadError::Parse`] if the DER is not a certificate.
pub fn certificate_from_pem(pem: &[u8]) -> Result<X509, LoadError> {
    let block = first_block(pem)?;
    if block.label != "CERTIFICATE" {
        return Err(LoadError::malformed(format!(
            "wrong PEM type {}",
            block.label
        )));
    }
    X509::from_der(&block.contents).map_err(|source| LoadError::Parse {
        what: "certificate",
        source,
    })
}

/// Decode a PEM private key
///
/// # Errors
///
/// Returns [`LoadError::MalformedPem`] for a missing block or unknown label,
/// [`LoadError::UnsupportedKeyType`] for a PKCS#8 key that is neither RSA nor
/// EC, and [`LoadError::Parse`] if the DER does not decode.
pub fn private_key_from_pem(pem: &[u8]) -> Result<PKey<Private>, LoadError> {
    let block = first_block(pem)?;
    let parse = |source| LoadError::Parse {
        what: "private key",
        source,
    };

    match block.label.as_str() {
        "PRIVATE KEY" => {
            let key = PKey::private_key_from_pkcs8(&block.contents).map_err(parse)?;
            match key.id() {
                Id::RSA | Id::EC => Ok(key),
                other => Err(LoadError::UnsupportedKeyType(key_type_name(other))),
            }
        }
        "RSA PRIVATE KEY" => {
            let rsa = Rsa::private_key_from_der(&block.contents).map_err(parse)?;
            PKey::from_rsa(rsa).map_err(parse)
        }
        "EC PRIVATE KEY" | "ECDSA PRIVATE KEY" => {
            let ec = EcKey::private_key_from_der(&block.contents).map_err(parse)?;
            PKey::from_ec_key(ec).map_err(parse)
        }
        other => Err(LoadError::malformed(format!("incorrect PEM type {other}"))),
    }
}

fn key_type_name(id: Id) -> String {
    Nid::from_raw(id.as_raw())
        .short_name()
        .map_or_else(|_| format!("id {}", id.as_raw()), str::to_string)
}

/// Read and decode a PEM certificate file
///
/// # Errors
///
/// Returns [`LoadError::Io`] if the file cannot be read, else as [`certificate_from_pem`]
pub fn load_certificate(path: &Path) -> Result<X509, LoadError> {
    let pem = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;
    certificate_from_pem(&pem)
}

/// Read and decode a PEM private key file
///
/// # Errors
///
/// Returns [`LoadError::Io`] if the file cannot be read, else as [`private_key_from_pem`]
pub fn load_private_key(path: &Path) -> Result<PKey<Private>, LoadError> {
    let pem = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;
    private_key_from_pem(&pem)
}
