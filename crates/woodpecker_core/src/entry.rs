//! static-ct-api log entries and data tiles.
//!
//! ```text
//! struct {
//!     TimestampedEntry timestamped_entry;
//!     select (entry_type) {
//!         case x509_entry: Empty;
//!         case precert_entry: ASN.1Cert pre_certificate;
//!     };
//!     Fingerprint certificate_chain<0..2^16-1>;
//! } TileLeaf;
//! ```

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;
use std::io::{self, Cursor, Read};

use crate::error::{CodecError, CodecResult};
use crate::extension;
use crate::merkle::{Hash, leaf_hash};
use crate::tls::{is_exhausted, put_length_prefixed, read_length_prefixed};

const X509_ENTRY: u16 = 0;
const PRECERT_ENTRY: u16 = 1;

/// A single entry of a static-ct-api log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEntry {
    /// `TimestampedEntry.timestamp`, milliseconds since the Unix epoch
    pub timestamp: u64,

    /// True for `precert_entry`
    pub is_precert: bool,

    /// `PreCert.issuer_key_hash`; zero for x509 entries
    pub issuer_key_hash: [u8; 32],

    /// The leaf certificate, or the precertificate's TBSCertificate
    pub certificate: Vec<u8>,

    /// Encoded `CtExtensions`, without the outer length prefix
    pub extensions: Vec<u8>,

    /// The full precertificate; empty for x509 entries
    pub pre_certificate: Vec<u8>,

    /// SHA-256 fingerprints of the submitted chain, leaf excluded
    pub chain_fingerprints: Vec<[u8; 32]>,
}

impl LogEntry {
    /// Decode the leaf_index extension
    ///
    /// # Errors
    ///
    /// See [`extension::leaf_index`]
    pub fn leaf_index(&self) -> CodecResult<u64> {
        extension::leaf_index(&self.extensions)
    }

    fn put_timestamped_entry(&self, buffer: &mut Vec<u8>) -> CodecResult<()> {
        buffer.put_u64(self.timestamp);
        if self.is_precert {
            buffer.put_u16(PRECERT_ENTRY);
            buffer.put_slice(&self.issuer_key_hash);
        } else {
            buffer.put_u16(X509_ENTRY);
        }
        put_length_prefixed(buffer, "certificate", &self.certificate, 3)?;
        put_length_prefixed(buffer, "extensions", &self.extensions, 2)
    }

    /// RFC 6962 `MerkleTreeLeaf` encoding of this entry
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooLong`] if a field exceeds its length prefix
    pub fn merkle_tree_leaf(&self) -> CodecResult<Vec<u8>> {
        // version v1, leaf_type timestamped_entry
        let mut buffer = vec![0, 0];
        self.put_timestamped_entry(&mut buffer)?;
        Ok(buffer)
    }

    /// Merkle leaf hash of this entry
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooLong`] if a field exceeds its length prefix
    pub fn leaf_hash(&self) -> CodecResult<Hash> {
        let leaf = self.merkle_tree_leaf()?;
        Ok(leaf_hash(&leaf))
    }

    /// static-ct-api `TileLeaf` encoding of this entry
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooLong`] if a field exceeds its length prefix
    pub fn tile_leaf(&self) -> CodecResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.put_timestamped_entry(&mut buffer)?;
        if self.is_precert {
            put_length_prefixed(&mut buffer, "pre_certificate", &self.pre_certificate, 3)?;
        }
        put_length_prefixed(
            &mut buffer,
            "certificate_chain",
            &self.chain_fingerprints.concat(),
            2,
        )?;
        Ok(buffer)
    }

    fn read(cursor: &mut Cursor<&[u8]>) -> CodecResult<Self> {
        let mut entry = Self {
            timestamp: cursor.read_u64::<BigEndian>().map_err(truncated)?,
            ..Self::default()
        };
        match cursor.read_u16::<BigEndian>().map_err(truncated)? {
            X509_ENTRY => {
                entry.certificate = read_length_prefixed(cursor, 3).map_err(truncated)?;
                entry.extensions = read_length_prefixed(cursor, 2).map_err(truncated)?;
            }
            PRECERT_ENTRY => {
                entry.is_precert = true;
                cursor
                    .read_exact(&mut entry.issuer_key_hash)
                    .map_err(truncated)?;
                entry.certificate = read_length_prefixed(cursor, 3).map_err(truncated)?;
                entry.extensions = read_length_prefixed(cursor, 2).map_err(truncated)?;
                entry.pre_certificate = read_length_prefixed(cursor, 3).map_err(truncated)?;
            }
            other => {
                return Err(CodecError::invalid_tile(format!("unknown entry type {other}")));
            }
        }

        let fingerprints = read_length_prefixed(cursor, 2).map_err(truncated)?;
        if fingerprints.len() % 32 != 0 {
            return Err(CodecError::invalid_tile(format!(
                "fingerprint list of {} bytes",
                fingerprints.len()
            )));
        }
        entry.chain_fingerprints = fingerprints
            .chunks_exact(32)
            .map(|chunk| {
                let mut fingerprint = [0u8; 32];
                fingerprint.copy_from_slice(chunk);
                fingerprint
            })
            .collect();
        Ok(entry)
    }
}

fn truncated(e: io::Error) -> CodecError {
    CodecError::invalid_tile(format!("truncated entry: {e}"))
}

/// Decode every entry of a data tile, in order.
///
/// # Errors
///
/// Returns [`CodecError::InvalidTile`] if an entry is malformed or truncated
pub fn parse_data_tile(tile: &[u8]) -> CodecResult<Vec<LogEntry>> {
    let mut cursor = Cursor::new(tile);
    let mut entries = Vec::new();
    while !is_exhausted(&cursor) {
        entries.push(LogEntry::read(&mut cursor)?);
    }
    Ok(entries)
}
