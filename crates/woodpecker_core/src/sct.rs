//! Signed certificate timestamps and the SCT-list X.509 extension.
//!
//! ```text
//! struct {
//!     Version sct_version;
//!     LogID id;
//!     uint64 timestamp;
//!     CtExtensions extensions;
//!     digitally-signed struct { ... };
//! } SignedCertificateTimestamp;
//!
//! opaque SerializedSCT<1..2^16-1>;
//!
//! struct {
//!     SerializedSCT sct_list <1..2^16-1>;
//! } SignedCertificateTimestampList;
//! ```
//!
//! The X.509 extension value is the TLS-encoded list wrapped in a DER OCTET STRING
//! (RFC 6962 section 3.3).

use bytes::BufMut;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

use crate::error::{CodecError, CodecResult};
use crate::extension;
use crate::tls::{is_exhausted, put_length_prefixed, read_length_prefixed};

/// OID of the embedded SCT-list extension
pub const SCT_LIST_OID: &str = "1.3.6.1.4.1.11129.2.4.2";

/// OID of the precertificate poison extension
pub const CT_POISON_OID: &str = "1.3.6.1.4.1.11129.2.4.3";

/// Poison extension value: DER NULL
pub const CT_POISON_VALUE: [u8; 2] = [0x05, 0x00];

const DER_OCTET_STRING: u8 = 0x04;

/// A `digitally-signed` struct (RFC 5246 section 4.7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    /// Hash algorithm (4 = sha256)
    pub hash_algorithm: u8,
    /// Signature algorithm (1 = rsa, 3 = ecdsa)
    pub signature_algorithm: u8,
    /// Signature bytes
    pub signature: Vec<u8>,
}

impl DigitallySigned {
    /// Decode a standalone `digitally-signed` struct
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidSct`] if the input is truncated or has trailing data
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let signed = Self::read(&mut cursor)
            .map_err(|e| CodecError::invalid_sct(format!("signature: {e}")))?;
        if !is_exhausted(&cursor) {
            return Err(CodecError::invalid_sct("trailing data after signature"));
        }
        Ok(signed)
    }

    /// Encode as a standalone `digitally-signed` struct
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooLong`] if the signature exceeds 2^16-1 bytes
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.put(&mut buffer)?;
        Ok(buffer)
    }

    fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            hash_algorithm: reader.read_u8()?,
            signature_algorithm: reader.read_u8()?,
            signature: read_length_prefixed(reader, 2)?,
        })
    }

    fn put(&self, buffer: &mut Vec<u8>) -> CodecResult<()> {
        buffer.put_u8(self.hash_algorithm);
        buffer.put_u8(self.signature_algorithm);
        put_length_prefixed(buffer, "signature", &self.signature, 2)
    }
}

/// A signed certificate timestamp as returned by a log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificateTimestamp {
    /// SCT version (0 = v1)
    pub version: u8,
    /// SHA-256 of the log's public key
    pub log_id: [u8; 32],
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Encoded `CtExtensions`, without the outer length prefix
    pub extensions: Vec<u8>,
    /// Log signature
    pub signature: DigitallySigned,
}

impl SignedCertificateTimestamp {
    /// TLS-encode the SCT
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooLong`] if extensions or signature exceed 2^16-1 bytes
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity(
            1 + 32 + 8 + 2 + self.extensions.len() + 4 + self.signature.signature.len(),
        );
        buffer.put_u8(self.version);
        buffer.put_slice(&self.log_id);
        buffer.put_u64(self.timestamp);
        put_length_prefixed(&mut buffer, "extensions", &self.extensions, 2)?;
        self.signature.put(&mut buffer)?;
        Ok(buffer)
    }

    /// Decode a TLS-encoded SCT
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidSct`] if the input is truncated or has trailing data
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let sct = Self::read(&mut cursor).map_err(|e| CodecError::invalid_sct(e.to_string()))?;
        if !is_exhausted(&cursor) {
            return Err(CodecError::invalid_sct("trailing data"));
        }
        Ok(sct)
    }

    fn read(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let version = cursor.read_u8()?;
        let mut log_id = [0u8; 32];
        cursor.read_exact(&mut log_id)?;
        Ok(Self {
            version,
            log_id,
            timestamp: cursor.read_u64::<BigEndian>()?,
            extensions: read_length_prefixed(cursor, 2)?,
            signature: DigitallySigned::read(cursor)?,
        })
    }

    /// Decode the leaf_index extension
    ///
    /// # Errors
    ///
    /// See [`extension::leaf_index`]
    pub fn leaf_index(&self) -> CodecResult<u64> {
        extension::leaf_index(&self.extensions)
    }

    /// Log ID as lowercase hex
    #[must_use]
    pub fn log_id_hex(&self) -> String {
        hex::encode(self.log_id)
    }
}

/// Build the SCT-list extension value for a final certificate.
///
/// The result is deterministic for a given ordered input.
///
/// # Errors
///
/// Returns [`CodecError::InvalidSctList`] for an empty input and
/// [`CodecError::TooLong`] if the list does not fit its length prefixes.
pub fn encode_sct_list(scts: &[SignedCertificateTimestamp]) -> CodecResult<Vec<u8>> {
    if scts.is_empty() {
        return Err(CodecError::invalid_sct_list("no SCTs"));
    }
    let mut list = Vec::new();
    for sct in scts {
        let serialized = sct.to_bytes()?;
        put_length_prefixed(&mut list, "serialized SCT", &serialized, 2)?;
    }
    let mut prefixed = Vec::with_capacity(list.len() + 2);
    put_length_prefixed(&mut prefixed, "SCT list", &list, 2)?;
    Ok(der_octet_string(&prefixed))
}

/// Split an SCT-list extension value into its serialized SCTs, in order.
///
/// # Errors
///
/// Returns [`CodecError::InvalidSctList`] if the value is not a well-formed list
pub fn decode_sct_list(value: &[u8]) -> CodecResult<Vec<Vec<u8>>> {
    let content = parse_der_octet_string(value)?;
    let mut cursor = Cursor::new(content);
    let list = read_length_prefixed(&mut cursor, 2)
        .map_err(|e| CodecError::invalid_sct_list(format!("list: {e}")))?;
    if !is_exhausted(&cursor) {
        return Err(CodecError::invalid_sct_list("trailing data after list"));
    }
    if list.is_empty() {
        return Err(CodecError::invalid_sct_list("empty list"));
    }

    let mut entries = Vec::new();
    let mut cursor = Cursor::new(list.as_slice());
    while !is_exhausted(&cursor) {
        let entry = read_length_prefixed(&mut cursor, 2)
            .map_err(|e| CodecError::invalid_sct_list(format!("entry {}: {e}", entries.len())))?;
        if entry.is_empty() {
            return Err(CodecError::invalid_sct_list("empty entry"));
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn der_octet_string(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 6);
    out.put_u8(DER_OCTET_STRING);
    let len = content.len();
    if len < 0x80 {
        out.put_u8(len as u8);
    } else {
        let be = (len as u64).to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count();
        out.put_u8(0x80 | (be.len() - skip) as u8);
        out.put_slice(&be[skip..]);
    }
    out.put_slice(content);
    out
}

fn parse_der_octet_string(bytes: &[u8]) -> CodecResult<&[u8]> {
    let (&tag, rest) = bytes
        .split_first()
        .ok_or_else(|| CodecError::invalid_sct_list("empty value"))?;
    if tag != DER_OCTET_STRING {
        return Err(CodecError::invalid_sct_list(format!(
            "expected OCTET STRING, got tag {tag:#04x}"
        )));
    }
    let (&first, rest) = rest
        .split_first()
        .ok_or_else(|| CodecError::invalid_sct_list("missing length"))?;

    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let count = (first & 0x7f) as usize;
        if count == 0 || count > 4 || rest.len() < count {
            return Err(CodecError::invalid_sct_list("bad length encoding"));
        }
        let len = rest[..count]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &rest[count..])
    };

    if rest.len() != len {
        return Err(CodecError::invalid_sct_list(format!(
            "OCTET STRING length {len}, {} bytes present",
            rest.len()
        )));
    }
    Ok(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::CtExtensions;
    use proptest::prelude::*;

    fn sample_sct(leaf_index: u64) -> SignedCertificateTimestamp {
        SignedCertificateTimestamp {
            version: 0,
            log_id: [7u8; 32],
            timestamp: 1_737_664_860_920 + leaf_index,
            extensions: CtExtensions::with_leaf_index(leaf_index)
                .unwrap()
                .to_bytes()
                .unwrap(),
            signature: DigitallySigned {
                hash_algorithm: 4,
                signature_algorithm: 3,
                signature: vec![0x30, 0x44, 1, 2, 3],
            },
        }
    }

    #[test]
    fn test_sct_roundtrip() {
        let sct = sample_sct(99);
        let bytes = sct.to_bytes().unwrap();
        assert_eq!(bytes.len(), 1 + 32 + 8 + 2 + 8 + 4 + 5);
        let decoded = SignedCertificateTimestamp::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, sct);
        assert_eq!(decoded.leaf_index().unwrap(), 99);
    }

    #[test]
    fn test_sct_trailing_data_rejected() {
        let mut bytes = sample_sct(1).to_bytes().unwrap();
        bytes.push(0);
        assert!(matches!(
            SignedCertificateTimestamp::from_bytes(&bytes),
            Err(CodecError::InvalidSct { .. })
        ));
    }

    #[test]
    fn test_sct_truncated_rejected() {
        let bytes = sample_sct(1).to_bytes().unwrap();
        assert!(SignedCertificateTimestamp::from_bytes(&bytes[..40]).is_err());
    }

    #[test]
    fn test_sct_without_leaf_index() {
        let mut sct = sample_sct(1);
        sct.extensions.clear();
        assert_eq!(sct.leaf_index(), Err(CodecError::MissingLeafIndex));
    }

    #[test]
    fn test_log_id_hex() {
        assert_eq!(sample_sct(0).log_id_hex(), "07".repeat(32));
    }

    #[test]
    fn test_digitally_signed_roundtrip() {
        let signed = sample_sct(0).signature;
        let bytes = signed.to_bytes().unwrap();
        assert_eq!(bytes[..4], [4, 3, 0, 5]);
        assert_eq!(DigitallySigned::from_bytes(&bytes).unwrap(), signed);
    }

    #[test]
    fn test_sct_list_wire_format() {
        let sct = sample_sct(5);
        let serialized = sct.to_bytes().unwrap();
        let value = encode_sct_list(&[sct]).unwrap();

        let list_len = serialized.len() + 2;
        assert_eq!(value[0], 0x04);
        assert_eq!(value[1] as usize, list_len + 2);
        assert_eq!(
            u16::from_be_bytes([value[2], value[3]]) as usize,
            list_len
        );
        assert_eq!(
            u16::from_be_bytes([value[4], value[5]]) as usize,
            serialized.len()
        );
        assert_eq!(&value[6..], serialized.as_slice());
    }

    #[test]
    fn test_sct_list_long_form_length() {
        let scts: Vec<_> = (0..3)
            .map(|i| {
                let mut sct = sample_sct(i);
                sct.signature.signature = vec![0xaa; 72];
                sct
            })
            .collect();
        let value = encode_sct_list(&scts).unwrap();
        assert_eq!(value[1], 0x81);
        assert_eq!(decode_sct_list(&value).unwrap().len(), 3);
    }

    #[test]
    fn test_sct_list_empty_input_rejected() {
        assert!(matches!(
            encode_sct_list(&[]),
            Err(CodecError::InvalidSctList { .. })
        ));
    }

    #[test]
    fn test_decode_sct_list_wrong_tag() {
        let mut value = encode_sct_list(&[sample_sct(0)]).unwrap();
        value[0] = 0x30;
        assert!(decode_sct_list(&value).is_err());
    }

    #[test]
    fn test_decode_sct_list_trailing_byte() {
        let mut value = encode_sct_list(&[sample_sct(0)]).unwrap();
        value.push(0);
        assert!(decode_sct_list(&value).is_err());
    }

    #[test]
    fn test_decode_sct_list_empty_list() {
        assert!(decode_sct_list(&[0x04, 0x02, 0x00, 0x00]).is_err());
        assert!(decode_sct_list(&[]).is_err());
    }

    #[test]
    fn test_encode_sct_list_deterministic() {
        let scts = vec![sample_sct(1), sample_sct(2)];
        assert_eq!(
            encode_sct_list(&scts).unwrap(),
            encode_sct_list(&scts).unwrap()
        );
    }

    fn arb_sct() -> impl Strategy<Value = SignedCertificateTimestamp> {
        (
            any::<[u8; 32]>(),
            any::<u64>(),
            0..=crate::extension::LEAF_INDEX_MAX,
            proptest::collection::vec(any::<u8>(), 1..80),
        )
            .prop_map(|(log_id, timestamp, index, signature)| SignedCertificateTimestamp {
                version: 0,
                log_id,
                timestamp,
                extensions: CtExtensions::with_leaf_index(index)
                    .unwrap()
                    .to_bytes()
                    .unwrap(),
                signature: DigitallySigned {
                    hash_algorithm: 4,
                    signature_algorithm: 3,
                    signature,
                },
            })
    }

    proptest! {
        #[test]
        fn prop_sct_list_roundtrip(scts in proptest::collection::vec(arb_sct(), 1..=5)) {
            let value = encode_sct_list(&scts).unwrap();
            let entries = decode_sct_list(&value).unwrap();
            prop_assert_eq!(entries.len(), scts.len());
            for (entry, sct) in entries.iter().zip(&scts) {
                prop_assert_eq!(entry, &sct.to_bytes().unwrap());
                prop_assert_eq!(&SignedCertificateTimestamp::from_bytes(entry).unwrap(), sct);
            }
        }
    }
}
