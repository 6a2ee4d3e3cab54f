//! Woodpecker core types.
//!
//! This crate contains pure types and wire codecs with no I/O: signed
//! certificate timestamps, CT extensions, certificate chains, static-ct-api
//! log entries and RFC 6962 Merkle hashing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod entry;
pub mod error;
pub mod extension;
pub mod merkle;
pub mod sct;

mod tls;

// Re-exports
pub use chain::CertChain;
pub use entry::{LogEntry, parse_data_tile};
pub use error::{CodecError, CodecResult};
pub use extension::{
    CtExtensions, Extension, ExtensionIter, LEAF_INDEX_MAX, LEAF_INDEX_TYPE, leaf_index,
};
pub use merkle::{
    Checkpoint, Hash, inclusion_proof, leaf_hash, node_hash, root_hash, split_point, verify_inclusion,
};
pub use sct::{
    CT_POISON_OID, CT_POISON_VALUE, DigitallySigned, SCT_LIST_OID, SignedCertificateTimestamp,
    decode_sct_list, encode_sct_list,
};
