//! Codec error types.

/// Codec result type
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors produced while encoding or decoding CT wire structures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A CT extension record is truncated or malformed
    #[error("invalid extension")]
    InvalidExtension,

    /// The leaf_index extension value is not a 5-byte big-endian integer
    #[error("invalid leaf_index extension")]
    InvalidLeafIndex,

    /// No leaf_index extension present
    #[error("missing leaf_index extension")]
    MissingLeafIndex,

    /// A serialized SCT could not be decoded
    #[error("invalid signed certificate timestamp: {reason}")]
    InvalidSct {
        /// What was wrong
        reason: String,
    },

    /// An SCT-list extension value could not be decoded
    #[error("invalid SCT list: {reason}")]
    InvalidSctList {
        /// What was wrong
        reason: String,
    },

    /// A data tile could not be decoded
    #[error("invalid data tile: {reason}")]
    InvalidTile {
        /// What was wrong
        reason: String,
    },

    /// A variable-length field does not fit its length prefix
    #[error("{field} is {len} bytes, limit is {max}")]
    TooLong {
        /// Field name
        field: &'static str,
        /// Actual length
        len: usize,
        /// Largest encodable length
        max: usize,
    },
}

impl CodecError {
    pub(crate) fn invalid_sct(reason: impl Into<String>) -> Self {
        Self::InvalidSct {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_sct_list(reason: impl Into<String>) -> Self {
        Self::InvalidSctList {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_tile(reason: impl Into<String>) -> Self {
        Self::InvalidTile {
            reason: reason.into(),
        }
    }
}
