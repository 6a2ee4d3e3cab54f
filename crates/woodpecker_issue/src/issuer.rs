//! Precertificate and final certificate issuance.

use std::path::Path;

use chrono::{Months, Utc};
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509, X509Builder, X509Extension, X509NameBuilder};
use tracing::debug;
use x509_parser::prelude::{FromDer, X509Certificate};

use woodpecker_core::{
    CT_POISON_OID, CT_POISON_VALUE, CertChain, SCT_LIST_OID, SignedCertificateTimestamp,
    encode_sct_list,
};

use crate::error::{IssueError, IssueResult, LoadError};
use crate::load;

const X509_VERSION_3: i32 = 2;
const SERIAL_BITS: i32 = 63;
const VALIDITY_MONTHS: u32 = 3;

/// Mints precertificates and final certificates for log submission
pub trait CertificateIssuer: Send + Sync {
    /// Issue a precertificate for `sans`, returning `[precert, ca]`
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::Issuance`] if `sans` is empty or signing fails
    fn issue_precert(&self, sans: &[String]) -> IssueResult<CertChain>;

    /// Issue the final certificate for a precertificate, embedding `scts`,
    /// returning `[certificate, ca]`
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::Parse`] if the precertificate does not parse and
    /// [`IssueError::Issuance`] if signing fails
    fn issue_final(
        &self,
        precert: &CertChain,
        scts: &[SignedCertificateTimestamp],
    ) -> IssueResult<CertChain>;
}

/// OpenSSL-backed certificate authority
pub struct Issuer {
    cert: X509,
    key: PKey<Private>,
    cert_der: Vec<u8>,
}

impl std::fmt::Debug for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Issuer").finish_non_exhaustive()
    }
}

impl Issuer {
    /// Create an issuer from a CA certificate and its private key
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::KeyMismatch`] if the key does not belong to the certificate
    pub fn new(cert: X509, key: PKey<Private>) -> Result<Self, LoadError> {
        let public = cert.public_key().map_err(|source| LoadError::Parse {
            what: "certificate public key",
            source,
        })?;
        if !public.public_eq(&key) {
            return Err(LoadError::KeyMismatch);
        }
        let cert_der = cert.to_der().map_err(|source| LoadError::Parse {
            what: "certificate",
            source,
        })?;
        Ok(Self {
            cert,
            key,
            cert_der,
        })
    }

    /// Load the CA certificate and key from PEM files
    ///
    /// # Errors
    ///
    /// See [`load::load_certificate`], [`load::load_private_key`] and [`Issuer::new`]
    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self, LoadError> {
        let cert = load::load_certificate(cert_path)?;
        let key = load::load_private_key(key_path)?;
        Self::new(cert, key)
    }

    /// DER encoding of the CA certificate
    #[must_use]
    pub fn ca_der(&self) -> &[u8] {
        &self.cert_der
    }

    fn builder(&self) -> IssueResult<X509Builder> {
        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;
        builder.set_issuer_name(self.cert.subject_name())?;
        Ok(builder)
    }

    fn sign(&self, mut builder: X509Builder) -> IssueResult<CertChain> {
        builder.sign(&self.key, MessageDigest::sha256())?;
        let leaf = builder.build().to_der()?;
        Ok(CertChain::new(leaf, self.cert_der.clone()))
    }
}

fn random_serial() -> IssueResult<BigNum> {
    let mut limit = BigNum::new()?;
    limit.set_bit(SERIAL_BITS)?;
    let mut serial = BigNum::new()?;
    limit.rand_range(&mut serial)?;
    Ok(serial)
}

fn throwaway_key() -> IssueResult<PKey<Private>> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    Ok(PKey::from_ec_key(EcKey::generate(&group)?)?)
}

fn poison_extension() -> IssueResult<X509Extension> {
    let oid = Asn1Object::from_str(CT_POISON_OID)?;
    let value = Asn1OctetString::new_from_bytes(&CT_POISON_VALUE)?;
    Ok(X509Extension::new_from_der(&oid, true, &value)?)
}

impl CertificateIssuer for Issuer {
    fn issue_precert(&self, sans: &[String]) -> IssueResult<CertChain> {
        if sans.is_empty() {
            return Err(IssueError::issuance("no subject alternative names"));
        }

        let mut builder = self.builder()?;
        let serial = random_serial()?.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;

        // Empty subject; the SAN carries the names and is therefore critical.
        let subject = X509NameBuilder::new()?.build();
        builder.set_subject_name(&subject)?;

        let now = Utc::now();
        let not_after = now
            .checked_add_months(Months::new(VALIDITY_MONTHS))
            .ok_or_else(|| IssueError::issuance("validity end out of range"))?;
        let not_before = Asn1Time::from_unix(now.timestamp())?;
        let not_after = Asn1Time::from_unix(not_after.timestamp())?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;

        let key = throwaway_key()?;
        builder.set_pubkey(&key)?;

        builder.append_extension(BasicConstraints::new().critical().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        builder.append_extension(
            ExtendedKeyUsage::new()
                .server_auth()
                .client_auth()
                .build()?,
        )?;

        let san = {
            let context = builder.x509v3_context(Some(&*self.cert), None);
            let mut san = SubjectAlternativeName::new();
            san.critical();
            for name in sans {
                san.dns(name);
            }
            san.build(&context)?
        };
        builder.append_extension(san)?;

        if self.cert.subject_key_id().is_some() {
            let akid = {
                let context = builder.x509v3_context(Some(&*self.cert), None);
                AuthorityKeyIdentifier::new().keyid(false).build(&context)?
            };
            builder.append_extension(akid)?;
        }

        builder.append_extension(poison_extension()?)?;

        let chain = self.sign(builder)?;
        debug!(names = sans.len(), "issued precertificate");
        Ok(chain)
    }

    fn issue_final(
        &self,
        precert: &CertChain,
        scts: &[SignedCertificateTimestamp],
    ) -> IssueResult<CertChain> {
        let leaf = precert.leaf();
        let parsed = X509::from_der(leaf).map_err(|e| IssueError::parse(e.to_string()))?;
        let (_, raw) =
            X509Certificate::from_der(leaf).map_err(|e| IssueError::parse(e.to_string()))?;

        let mut builder = self.builder()?;
        builder.set_serial_number(parsed.serial_number())?;
        builder.set_subject_name(parsed.subject_name())?;
        builder.set_not_before(parsed.not_before())?;
        builder.set_not_after(parsed.not_after())?;
        let public_key = parsed.public_key()?;
        builder.set_pubkey(&public_key)?;

        for extension in raw.extensions() {
            let oid = extension.oid.to_id_string();
            if oid == CT_POISON_OID {
                continue;
            }
            let object = Asn1Object::from_str(&oid)?;
            let value = Asn1OctetString::new_from_bytes(extension.value)?;
            builder.append_extension(X509Extension::new_from_der(
                &object,
                extension.critical,
                &value,
            )?)?;
        }

        let sct_list = encode_sct_list(scts)?;
        let object = Asn1Object::from_str(SCT_LIST_OID)?;
        let value = Asn1OctetString::new_from_bytes(&sct_list)?;
        builder.append_extension(X509Extension::new_from_der(&object, false, &value)?)?;

        let chain = self.sign(builder)?;
        debug!(scts = scts.len(), "issued final certificate");
        Ok(chain)
    }
}
