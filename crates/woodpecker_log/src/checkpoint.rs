//! Signed-note checkpoints.
//!
//! A static-ct-api log publishes its tree head as a signed note:
//!
//! ```text
//! example.com/log2025h1
//! 1234
//! 4d9Jd7Dh1Mb4xEnjBlVpbx6X2HnC0yQ+aF0w1Pzdhn4=
//!
//! — example.com/log2025h1 <base64(key id || RFC6962NoteSignature)>
//! ```
//!
//! The log's own signature is an RFC 6962 `TreeHeadSignature` prefixed with its
//! timestamp; its key id is derived from the log's SubjectPublicKeyInfo.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;
use openssl::hash::MessageDigest;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private, Public};
use openssl::sign::{Signer, Verifier};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read};
use woodpecker_core::{Checkpoint, DigitallySigned, Hash};

use crate::error::{LogError, LogResult};

const SIGNATURE_PREFIX: &str = "\u{2014} ";
const KEY_TYPE_RFC6962: u8 = 0x05;
const HASH_SHA256: u8 = 4;
const SIG_RSA: u8 = 1;
const SIG_ECDSA: u8 = 3;
const MAX_SIGNATURES: usize = 100;

/// One signature line of a note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSignature {
    /// Key name
    pub name: String,
    /// First four bytes of the key hash
    pub key_id: u32,
    /// Signature bytes after the key id
    pub signature: Vec<u8>,
}

/// A parsed, unverified signed note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Signed text, ending in a newline
    pub text: String,
    /// Signature lines in order
    pub signatures: Vec<NoteSignature>,
}

impl Note {
    /// Split a note into text and signatures
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Checkpoint`] if the note is malformed
    pub fn parse(bytes: &[u8]) -> LogResult<Self> {
        let note = std::str::from_utf8(bytes)
            .map_err(|_| LogError::checkpoint("note is not UTF-8"))?;
        if note.chars().any(|c| c.is_control() && c != '\n') {
            return Err(LogError::checkpoint("note contains control characters"));
        }
        let split = note
            .rfind("\n\n")
            .ok_or_else(|| LogError::checkpoint("note has no signature block"))?;
        let (text, signatures) = (&note[..=split], &note[split + 2..]);
        let signatures = signatures
            .strip_suffix('\n')
            .ok_or_else(|| LogError::checkpoint("signature block not newline-terminated"))?;

        let signatures = signatures
            .split('\n')
            .map(parse_signature_line)
            .collect::<LogResult<Vec<_>>>()?;
        if signatures.len() > MAX_SIGNATURES {
            return Err(LogError::checkpoint("too many signatures"));
        }
        Ok(Self {
            text: text.to_string(),
            signatures,
        })
    }
}

fn parse_signature_line(line: &str) -> LogResult<NoteSignature> {
    let rest = line
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| LogError::checkpoint(format!("malformed signature line {line:?}")))?;
    let (name, encoded) = rest
        .split_once(' ')
        .ok_or_else(|| LogError::checkpoint(format!("malformed signature line {line:?}")))?;
    if name.is_empty() || name.contains('+') {
        return Err(LogError::checkpoint(format!("invalid key name {name:?}")));
    }
    let decoded = BASE64
        .decode(encoded)
        .map_err(|e| LogError::checkpoint(format!("signature from {name}: {e}")))?;
    if decoded.len() < 5 {
        return Err(LogError::checkpoint(format!("signature from {name} too short")));
    }
    let (id, signature) = decoded.split_at(4);
    Ok(NoteSignature {
        name: name.to_string(),
        key_id: u32::from_be_bytes([id[0], id[1], id[2], id[3]]),
        signature: signature.to_vec(),
    })
}

/// Parse checkpoint note text: origin, tree size and root hash lines,
/// followed by optional extension lines
///
/// # Errors
///
/// Returns [`LogError::Checkpoint`] if the text is malformed
pub fn parse_checkpoint(text: &str) -> LogResult<Checkpoint> {
    let body = text
        .strip_suffix('\n')
        .ok_or_else(|| LogError::checkpoint("text not newline-terminated"))?;
    let mut lines = body.split('\n');
    let (Some(origin), Some(size), Some(root)) = (lines.next(), lines.next(), lines.next()) else {
        return Err(LogError::checkpoint("fewer than three lines"));
    };
    if origin.is_empty() {
        return Err(LogError::checkpoint("empty origin"));
    }
    if size.is_empty()
        || !size.bytes().all(|b| b.is_ascii_digit())
        || (size.len() > 1 && size.starts_with('0'))
    {
        return Err(LogError::checkpoint(format!("invalid tree size {size:?}")));
    }
    let size = size
        .parse::<u64>()
        .map_err(|_| LogError::checkpoint(format!("invalid tree size {size:?}")))?;
    let root: Hash = BASE64
        .decode(root)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| LogError::checkpoint(format!("invalid root hash {root:?}")))?;

    Ok(Checkpoint {
        origin: origin.to_string(),
        size,
        root_hash: root,
    })
}

/// Render checkpoint note text
#[must_use]
pub fn format_checkpoint(checkpoint: &Checkpoint) -> String {
    format!(
        "{}\n{}\n{}\n",
        checkpoint.origin,
        checkpoint.size,
        BASE64.encode(checkpoint.root_hash)
    )
}

/// Note key id of an RFC 6962 log key named `name`
#[must_use]
pub fn rfc6962_key_id(name: &str, spki_der: &[u8]) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"\n");
    hasher.update([KEY_TYPE_RFC6962]);
    hasher.update(Sha256::digest(spki_der));
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// RFC 6962 `TreeHeadSignature` input
#[must_use]
pub fn tree_head_signature_input(timestamp: u64, tree_size: u64, root_hash: &Hash) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(2 + 8 + 8 + 32);
    buffer.put_u8(0); // version v1
    buffer.put_u8(1); // signature_type tree_hash
    buffer.put_u64(timestamp);
    buffer.put_u64(tree_size);
    buffer.put_slice(root_hash);
    buffer
}

fn signature_algorithm<T: HasPublic>(key: &PKeyRef<T>) -> LogResult<u8> {
    match key.id() {
        openssl::pkey::Id::EC => Ok(SIG_ECDSA),
        openssl::pkey::Id::RSA => Ok(SIG_RSA),
        _ => Err(LogError::setup("log key is neither ECDSA nor RSA")),
    }
}

/// Verifies checkpoints signed by one log key
#[derive(Debug, Clone)]
pub struct CheckpointVerifier {
    key: PKey<Public>,
    spki: Vec<u8>,
    signature_algorithm: u8,
}

impl CheckpointVerifier {
    /// Create a verifier from a DER SubjectPublicKeyInfo
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Setup`] if the key does not parse or is not ECDSA or RSA
    pub fn new(spki_der: &[u8]) -> LogResult<Self> {
        let key = PKey::public_key_from_der(spki_der)
            .map_err(|e| LogError::setup(format!("parsing public key: {e}")))?;
        let signature_algorithm = signature_algorithm(&key)?;
        Ok(Self {
            key,
            spki: spki_der.to_vec(),
            signature_algorithm,
        })
    }

    /// RFC 6962 log ID: SHA-256 of the public key
    #[must_use]
    pub fn log_id(&self) -> [u8; 32] {
        Sha256::digest(&self.spki).into()
    }

    /// Parse a signed note and verify the log's signature on it.
    ///
    /// Signatures from other keys are ignored. Returns the checkpoint and
    /// the signature timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Checkpoint`] if the note is malformed, carries no
    /// signature from the log key, or the signature does not verify
    pub fn verify(&self, note: &[u8]) -> LogResult<(Checkpoint, u64)> {
        let note = Note::parse(note)?;
        let checkpoint = parse_checkpoint(&note.text)?;
        let key_id = rfc6962_key_id(&checkpoint.origin, &self.spki);

        let signature = note
            .signatures
            .iter()
            .find(|s| s.name == checkpoint.origin && s.key_id == key_id)
            .ok_or_else(|| {
                LogError::checkpoint(format!(
                    "no signature from {} with key id {key_id:08x}",
                    checkpoint.origin
                ))
            })?;

        let mut cursor = Cursor::new(signature.signature.as_slice());
        let timestamp = cursor
            .read_u64::<BigEndian>()
            .map_err(|_| LogError::checkpoint("truncated note signature"))?;
        let mut rest = Vec::new();
        cursor
            .read_to_end(&mut rest)
            .map_err(|_| LogError::checkpoint("truncated note signature"))?;
        let signed = DigitallySigned::from_bytes(&rest)
            .map_err(|e| LogError::checkpoint(e.to_string()))?;
        if signed.hash_algorithm != HASH_SHA256
            || signed.signature_algorithm != self.signature_algorithm
        {
            return Err(LogError::checkpoint(format!(
                "unexpected signature algorithm {}/{}",
                signed.hash_algorithm, signed.signature_algorithm
            )));
        }

        let input =
            tree_head_signature_input(timestamp, checkpoint.size, &checkpoint.root_hash);
        let valid = Verifier::new(MessageDigest::sha256(), &self.key)
            .and_then(|mut verifier| {
                verifier.update(&input)?;
                verifier.verify(&signed.signature)
            })
            .unwrap_or(false);
        if !valid {
            return Err(LogError::checkpoint("log signature does not verify"));
        }
        Ok((checkpoint, timestamp))
    }
}

/// Signs checkpoints the way a static-ct-api log does
pub struct CheckpointSigner {
    key: PKey<Private>,
    spki: Vec<u8>,
    signature_algorithm: u8,
}

impl CheckpointSigner {
    /// Create a signer for an ECDSA or RSA private key
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Setup`] for other key types
    pub fn new(key: PKey<Private>) -> LogResult<Self> {
        let spki = key
            .public_key_to_der()
            .map_err(|e| LogError::setup(e.to_string()))?;
        let signature_algorithm = signature_algorithm(&key)?;
        Ok(Self {
            key,
            spki,
            signature_algorithm,
        })
    }

    /// DER SubjectPublicKeyInfo of the signing key
    #[must_use]
    pub fn public_key_der(&self) -> &[u8] {
        &self.spki
    }

    /// Produce a signed note for `checkpoint`
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Checkpoint`] if signing fails
    pub fn sign(&self, checkpoint: &Checkpoint, timestamp: u64) -> LogResult<Vec<u8>> {
        let input =
            tree_head_signature_input(timestamp, checkpoint.size, &checkpoint.root_hash);
        let signature = Signer::new(MessageDigest::sha256(), &self.key)
            .and_then(|mut signer| {
                signer.update(&input)?;
                signer.sign_to_vec()
            })
            .map_err(|e| LogError::checkpoint(format!("signing: {e}")))?;

        let mut body = Vec::new();
        body.put_u32(rfc6962_key_id(&checkpoint.origin, &self.spki));
        body.put_u64(timestamp);
        body.extend(
            DigitallySigned {
                hash_algorithm: HASH_SHA256,
                signature_algorithm: self.signature_algorithm,
                signature,
            }
            .to_bytes()?,
        );

        let note = format!(
            "{}\n{SIGNATURE_PREFIX}{} {}\n",
            format_checkpoint(checkpoint),
            checkpoint.origin,
            BASE64.encode(body)
        );
        Ok(note.into_bytes())
    }
}
