//! `CTExtensions` as used by static-ct-api logs.
//!
//! ```text
//! enum { leaf_index(0), (255) } ExtensionType;
//!
//! struct {
//!     ExtensionType extension_type;
//!     opaque extension_data<0..2^16-1>;
//! } Extension;
//!
//! Extension CTExtensions<0..2^16-1>;
//!
//! uint8 uint40[5];
//! uint40 leaf_index;
//! ```
//!
//! The outer `CTExtensions` length prefix belongs to the enclosing structure
//! (the SCT or `TimestampedEntry`); everything here works on the bytes inside it.

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;
use std::io::Cursor;

use crate::error::{CodecError, CodecResult};
use crate::tls::{is_exhausted, put_length_prefixed};

/// Extension type carrying the entry's position in the log
pub const LEAF_INDEX_TYPE: u8 = 0;

/// Largest leaf index representable in a uint40
pub const LEAF_INDEX_MAX: u64 = (1 << 40) - 1;

const LEAF_INDEX_LEN: usize = 5;

/// A single extension record borrowed from an encoded extension set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension<'a> {
    /// Extension type
    pub extension_type: u8,
    /// Opaque extension data
    pub data: &'a [u8],
}

/// Iterator over the records of an encoded extension set.
///
/// Yields one error and then stops if a record is truncated.
pub struct ExtensionIter<'a> {
    cursor: Cursor<&'a [u8]>,
    failed: bool,
}

impl<'a> ExtensionIter<'a> {
    /// Iterate over the records in `bytes`
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            failed: false,
        }
    }

    fn read_record(&mut self) -> CodecResult<Extension<'a>> {
        let extension_type = self
            .cursor
            .read_u8()
            .map_err(|_| CodecError::InvalidExtension)?;
        let length = self
            .cursor
            .read_u16::<BigEndian>()
            .map_err(|_| CodecError::InvalidExtension)? as usize;

        let bytes: &'a [u8] = *self.cursor.get_ref();
        let start = self.cursor.position() as usize;
        let data = bytes
            .get(start..start + length)
            .ok_or(CodecError::InvalidExtension)?;
        self.cursor.set_position((start + length) as u64);

        Ok(Extension {
            extension_type,
            data,
        })
    }
}

impl<'a> Iterator for ExtensionIter<'a> {
    type Item = CodecResult<Extension<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || is_exhausted(&self.cursor) {
            return None;
        }
        let record = self.read_record();
        self.failed = record.is_err();
        Some(record)
    }
}

/// Find the leaf_index extension in an encoded extension set.
///
/// Records before the leaf_index are skipped; scanning stops at the first
/// leaf_index record.
///
/// # Errors
///
/// Returns [`CodecError::InvalidExtension`] if a record before the leaf_index
/// is truncated, [`CodecError::InvalidLeafIndex`] if the value is not exactly
/// five bytes and [`CodecError::MissingLeafIndex`] if there is none.
pub fn leaf_index(extensions: &[u8]) -> CodecResult<u64> {
    for extension in ExtensionIter::new(extensions) {
        let extension = extension?;
        if extension.extension_type == LEAF_INDEX_TYPE {
            return decode_leaf_index(extension.data);
        }
    }
    Err(CodecError::MissingLeafIndex)
}

fn decode_leaf_index(data: &[u8]) -> CodecResult<u64> {
    let mut cursor = Cursor::new(data);
    let index = cursor
        .read_uint::<BigEndian>(LEAF_INDEX_LEN)
        .map_err(|_| CodecError::InvalidLeafIndex)?;
    if !is_exhausted(&cursor) {
        return Err(CodecError::InvalidLeafIndex);
    }
    Ok(index)
}

fn encode_leaf_index(index: u64) -> CodecResult<Vec<u8>> {
    if index > LEAF_INDEX_MAX {
        return Err(CodecError::InvalidLeafIndex);
    }
    let mut data = Vec::with_capacity(LEAF_INDEX_LEN);
    data.put_uint(index, LEAF_INDEX_LEN);
    Ok(data)
}

/// A decoded extension set: records keyed by type, in wire order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CtExtensions {
    records: Vec<(u8, Vec<u8>)>,
}

impl CtExtensions {
    /// Create an empty extension set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extension set holding only a leaf_index
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidLeafIndex`] if `index` exceeds [`LEAF_INDEX_MAX`]
    pub fn with_leaf_index(index: u64) -> CodecResult<Self> {
        let mut extensions = Self::new();
        extensions.insert(LEAF_INDEX_TYPE, encode_leaf_index(index)?);
        Ok(extensions)
    }

    /// Decode every record of an extension set.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidExtension`] if a record is truncated or a
    /// type appears more than once.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let mut extensions = Self::new();
        for extension in ExtensionIter::new(bytes) {
            let extension = extension?;
            if extensions.get(extension.extension_type).is_some() {
                return Err(CodecError::InvalidExtension);
            }
            extensions
                .records
                .push((extension.extension_type, extension.data.to_vec()));
        }
        Ok(extensions)
    }

    /// Encode the records, without the outer length prefix
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooLong`] if a record value exceeds 2^16-1 bytes
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut buffer = Vec::new();
        for (extension_type, data) in &self.records {
            buffer.put_u8(*extension_type);
            put_length_prefixed(&mut buffer, "extension_data", data, 2)?;
        }
        Ok(buffer)
    }

    /// Set the value for a type, returning the previous value
    pub fn insert(&mut self, extension_type: u8, data: Vec<u8>) -> Option<Vec<u8>> {
        match self
            .records
            .iter_mut()
            .find(|(existing, _)| *existing == extension_type)
        {
            Some((_, value)) => Some(std::mem::replace(value, data)),
            None => {
                self.records.push((extension_type, data));
                None
            }
        }
    }

    /// Get the value for a type
    #[must_use]
    pub fn get(&self, extension_type: u8) -> Option<&[u8]> {
        self.records
            .iter()
            .find(|(existing, _)| *existing == extension_type)
            .map(|(_, data)| data.as_slice())
    }

    /// Decode the leaf_index record
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingLeafIndex`] or [`CodecError::InvalidLeafIndex`]
    pub fn leaf_index(&self) -> CodecResult<u64> {
        self.get(LEAF_INDEX_TYPE)
            .ok_or(CodecError::MissingLeafIndex)
            .and_then(decode_leaf_index)
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
