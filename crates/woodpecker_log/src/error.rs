//! Log collaborator errors.

use woodpecker_core::CodecError;

/// Log result type
pub type LogResult<T> = Result<T, LogError>;

/// Errors talking to, or verifying against, a CT log
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    /// The log descriptor is unusable
    #[error("log setup: {reason}")]
    Setup {
        /// What was wrong
        reason: String,
    },

    /// The log rejected a submission
    #[error("{endpoint} returned {status}: {body}")]
    Submission {
        /// Request URL
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The request did not complete
    #[error("request to {endpoint} failed: {reason}")]
    Transport {
        /// Request URL
        endpoint: String,
        /// Transport error
        reason: String,
    },

    /// The response could not be decoded
    #[error("decoding response from {endpoint}: {reason}")]
    Decode {
        /// Request URL
        endpoint: String,
        /// What was wrong
        reason: String,
    },

    /// The checkpoint is malformed or its signature does not verify
    #[error("checkpoint: {reason}")]
    Checkpoint {
        /// What was wrong
        reason: String,
    },

    /// A tile is missing or malformed
    #[error("tile {path}: {reason}")]
    Tile {
        /// Tile path below the monitoring prefix
        path: String,
        /// What was wrong
        reason: String,
    },

    /// The entry is not provably included under the checkpoint
    #[error("leaf {leaf_index} not included in tree of size {tree_size}: {reason}")]
    InclusionVerificationFailed {
        /// Leaf index from the SCT
        leaf_index: u64,
        /// Checkpoint tree size
        tree_size: u64,
        /// What did not match
        reason: String,
    },

    /// An SCT or tile could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl LogError {
    pub(crate) fn setup(reason: impl Into<String>) -> Self {
        Self::Setup {
            reason: reason.into(),
        }
    }

    pub(crate) fn checkpoint(reason: impl Into<String>) -> Self {
        Self::Checkpoint {
            reason: reason.into(),
        }
    }

    pub(crate) fn tile(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from the log rejecting or failing a request
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Submission { .. } | Self::Transport { .. } | Self::Decode { .. }
        )
    }
}
