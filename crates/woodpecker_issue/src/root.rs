//! Self-signed root CA bootstrap.
//!
//! Produces the CA certificate and PKCS#8 key that the issuer is later loaded
//! from. The certificate has no real-world trust.

use std::path::Path;

use chrono::{Months, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectKeyIdentifier};
use openssl::x509::{X509, X509NameBuilder};
use tracing::info;

use crate::error::BootstrapError;

const X509_VERSION_3: i32 = 2;
const SERIAL_BITS: i32 = 128;
const VALIDITY_MONTHS: u32 = 10 * 12;

/// Subject common name of the root
pub const ROOT_COMMON_NAME: &str = "Test CA";
/// Subject organization of the root
pub const ROOT_ORGANIZATION: &str = "Sunlight-Woodpecker";
/// Subject country of the root
pub const ROOT_COUNTRY: &str = "CA";

/// A freshly generated root CA
pub struct RootAuthority {
    certificate: X509,
    key: PKey<Private>,
}

impl RootAuthority {
    /// Generate a P-256 key and a ten-year self-signed CA certificate
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Generate`] if OpenSSL fails
    pub fn generate() -> Result<Self, BootstrapError> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let key = PKey::from_ec_key(EcKey::generate(&group)?)?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_nid(Nid::COMMONNAME, ROOT_COMMON_NAME)?;
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, ROOT_ORGANIZATION)?;
        name.append_entry_by_nid(Nid::COUNTRYNAME, ROOT_COUNTRY)?;
        let name = name.build();

        let mut serial = BigNum::new()?;
        serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;
        let serial = serial.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;

        let now = Utc::now();
        let not_after = now
            .checked_add_months(Months::new(VALIDITY_MONTHS))
            .ok_or(BootstrapError::Validity)?;
        let not_before = Asn1Time::from_unix(now.timestamp())?;
        let not_after = Asn1Time::from_unix(not_after.timestamp())?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.set_pubkey(&key)?;

        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_cert_sign()
                .crl_sign()
                .build()?,
        )?;
        let skid = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
        builder.append_extension(skid)?;

        builder.sign(&key, MessageDigest::sha256())?;
        Ok(Self {
            certificate: builder.build(),
            key,
        })
    }

    /// The self-signed certificate
    #[must_use]
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    /// The CA private key
    #[must_use]
    pub fn key(&self) -> &PKey<Private> {
        &self.key
    }

    /// Write the certificate as a `CERTIFICATE` PEM and the key as a PKCS#8
    /// `PRIVATE KEY` PEM
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Write`] if a file cannot be written
    pub fn write_pem(&self, cert_path: &Path, key_path: &Path) -> Result<(), BootstrapError> {
        let cert_pem = self.certificate.to_pem()?;
        let key_pem = self.key.private_key_to_pem_pkcs8()?;
        write_file(cert_path, &cert_pem)?;
        write_file(key_path, &key_pem)?;
        info!(
            cert = %cert_path.display(),
            key = %key_path.display(),
            "wrote root CA"
        );
        Ok(())
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), BootstrapError> {
    std::fs::write(path, contents).map_err(|source| BootstrapError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Generate a root CA and write it to `cert_path` and `key_path`
///
/// # Errors
///
/// See [`RootAuthority::generate`] and [`RootAuthority::write_pem`]
pub fn create_root(cert_path: &Path, key_path: &Path) -> Result<RootAuthority, BootstrapError> {
    let root = RootAuthority::generate()?;
    root.write_pem(cert_path, key_path)?;
    Ok(root)
}
