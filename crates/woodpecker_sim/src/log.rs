//! In-memory CT log.
//!
//! [`MemoryLog`] accepts submissions, assigns leaf indexes, keeps an RFC 6962
//! Merkle tree over the entries and answers inclusion queries directly. It
//! also serves a signed checkpoint and static-ct-api tiles through
//! [`TileFetcher`], so the tile verifier can be run against it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::PKey;
use sha2::{Digest, Sha256};
use tracing::debug;
use woodpecker_core::{
    CertChain, Checkpoint, CtExtensions, DigitallySigned, Hash, LogEntry,
    SignedCertificateTimestamp, inclusion_proof, node_hash, root_hash, verify_inclusion,
};
use woodpecker_log::{
    CheckpointSigner, CheckpointVerifier, InclusionVerifier, LogError, LogResult, LogSubmitter,
    TILE_HEIGHT, TILE_WIDTH, Tile, TileFetcher, TileKind, TileVerifier,
};

use crate::failure::{FailurePlan, FailurePoint};

const EPOCH_MS: u64 = 1_700_000_000_000;

#[derive(Debug, Default)]
struct State {
    entries: Vec<LogEntry>,
    leaves: Vec<Hash>,
}

/// A CT log held in memory
pub struct MemoryLog {
    origin: String,
    plan: Arc<FailurePlan>,
    signer: CheckpointSigner,
    log_id: [u8; 32],
    state: Mutex<State>,
}

impl std::fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLog")
            .field("origin", &self.origin)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

impl MemoryLog {
    /// Create an empty log named `origin` with a fresh P-256 key
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Setup`] if key generation fails
    pub fn new(origin: impl Into<String>, plan: Arc<FailurePlan>) -> LogResult<Self> {
        let key = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)
            .and_then(|group| EcKey::generate(&group))
            .and_then(PKey::from_ec_key)
            .map_err(|e| LogError::Setup {
                reason: format!("generating log key: {e}"),
            })?;
        let signer = CheckpointSigner::new(key)?;
        let log_id = Sha256::digest(signer.public_key_der()).into();
        Ok(Self {
            origin: origin.into(),
            plan,
            signer,
            log_id,
            state: Mutex::new(State::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log origin, the first checkpoint line
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// SHA-256 of the log's public key
    #[must_use]
    pub fn log_id(&self) -> [u8; 32] {
        self.log_id
    }

    /// DER SubjectPublicKeyInfo of the log key
    #[must_use]
    pub fn public_key_der(&self) -> &[u8] {
        self.signer.public_key_der()
    }

    /// Number of entries
    #[must_use]
    pub fn size(&self) -> u64 {
        self.state().entries.len() as u64
    }

    /// Entry at `index`
    #[must_use]
    pub fn entry(&self, index: u64) -> Option<LogEntry> {
        let index = usize::try_from(index).ok()?;
        self.state().entries.get(index).cloned()
    }

    /// The current tree head, unsigned
    #[must_use]
    pub fn current_checkpoint(&self) -> Checkpoint {
        let state = self.state();
        Checkpoint {
            origin: self.origin.clone(),
            size: state.leaves.len() as u64,
            root_hash: root_hash(&state.leaves),
        }
    }

    /// A tile verifier reading this log's checkpoint and tiles
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Setup`] if the log key is rejected
    pub fn tile_verifier(self: &Arc<Self>) -> LogResult<TileVerifier> {
        let checkpoints = CheckpointVerifier::new(self.public_key_der())?;
        Ok(TileVerifier::new(self.clone(), checkpoints))
    }

    fn submit(
        &self,
        chain: &CertChain,
        precert: bool,
        point: FailurePoint,
    ) -> LogResult<SignedCertificateTimestamp> {
        let endpoint = format!(
            "sim://{}/ct/v1/{}",
            self.origin,
            if precert { "add-pre-chain" } else { "add-chain" }
        );
        if self.plan.should_fail(point) {
            return Err(LogError::Submission {
                endpoint,
                status: 500,
                body: format!("injected {point:?} failure"),
            });
        }
        let Some(issuer) = chain.issuer() else {
            return Err(LogError::Submission {
                endpoint,
                status: 400,
                body: "chain has no issuer".into(),
            });
        };
        let issuer_hash: [u8; 32] = Sha256::digest(issuer).into();

        let mut state = self.state();
        let index = state.entries.len() as u64;
        let extensions = CtExtensions::with_leaf_index(index)?.to_bytes()?;
        let entry = LogEntry {
            timestamp: EPOCH_MS + index,
            is_precert: precert,
            issuer_key_hash: if precert { issuer_hash } else { [0; 32] },
            certificate: chain.leaf().to_vec(),
            extensions: extensions.clone(),
            pre_certificate: if precert { chain.leaf().to_vec() } else { Vec::new() },
            chain_fingerprints: vec![issuer_hash],
        };
        let leaf = entry.leaf_hash()?;
        let sct = SignedCertificateTimestamp {
            version: 0,
            log_id: self.log_id,
            timestamp: entry.timestamp,
            extensions: if self.plan.omits_leaf_index() {
                Vec::new()
            } else {
                extensions
            },
            signature: DigitallySigned {
                hash_algorithm: 4,
                signature_algorithm: 3,
                signature: leaf.to_vec(),
            },
        };
        state.entries.push(entry);
        state.leaves.push(leaf);
        debug!(origin = %self.origin, index, precert, "entry sequenced");
        Ok(sct)
    }

    fn render(&self, path: &str) -> LogResult<Option<Vec<u8>>> {
        if path == "checkpoint" {
            let checkpoint = self.current_checkpoint();
            let timestamp = EPOCH_MS + checkpoint.size;
            return self.signer.sign(&checkpoint, timestamp).map(Some);
        }
        let Some((kind, index, width)) = parse_tile_path(path) else {
            return Ok(None);
        };

        let state = self.state();
        let Some(current) = Tile::in_tree(kind, index, state.leaves.len() as u64) else {
            return Ok(None);
        };
        // Only the tile's current form exists
        if width.unwrap_or(TILE_WIDTH) != current.width {
            return Ok(None);
        }
        let start = usize::try_from(index * TILE_WIDTH).unwrap_or(usize::MAX);
        let end = start + usize::try_from(current.width).unwrap_or(0);
        let body = match kind {
            TileKind::Data => state.entries[start..end]
                .iter()
                .map(LogEntry::tile_leaf)
                .collect::<Result<Vec<_>, _>>()?
                .concat(),
            TileKind::Hash(level) => stored_hashes(&state.leaves, level)[start..end].concat(),
        };
        Ok(Some(body))
    }
}

/// Hashes at tree level `8 * tile_level` covering complete subtrees
fn stored_hashes(leaves: &[Hash], tile_level: u8) -> Vec<Hash> {
    let mut hashes = leaves.to_vec();
    for _ in 0..u32::from(tile_level) * u32::from(TILE_HEIGHT) {
        hashes = hashes
            .chunks_exact(2)
            .map(|pair| node_hash(&pair[0], &pair[1]))
            .collect();
    }
    hashes
}

fn parse_tile_path(path: &str) -> Option<(TileKind, u64, Option<u64>)> {
    let rest = path.strip_prefix("tile/")?;
    let (level, rest) = rest.split_once('/')?;
    let kind = match level {
        "data" => TileKind::Data,
        level => TileKind::Hash(level.parse().ok()?),
    };
    let (index, width) = match rest.split_once(".p/") {
        Some((index, width)) => (index, Some(width.parse().ok()?)),
        None => (rest, None),
    };

    let groups: Vec<&str> = index.split('/').collect();
    let (last, leading) = groups.split_last()?;
    let mut value = 0u64;
    for group in leading {
        value = value * 1000 + parse_group(group.strip_prefix('x')?)?;
    }
    Some((kind, value * 1000 + parse_group(last)?, width))
}

fn parse_group(group: &str) -> Option<u64> {
    (group.len() == 3 && group.bytes().all(|b| b.is_ascii_digit()))
        .then(|| group.parse().ok())
        .flatten()
}

#[async_trait]
impl LogSubmitter for MemoryLog {
    async fn add_pre_chain(&self, chain: &CertChain) -> LogResult<SignedCertificateTimestamp> {
        self.submit(chain, true, FailurePoint::AddPreChain)
    }

    async fn add_chain(&self, chain: &CertChain) -> LogResult<SignedCertificateTimestamp> {
        self.submit(chain, false, FailurePoint::AddChain)
    }
}

#[async_trait]
impl InclusionVerifier for MemoryLog {
    async fn checkpoint(&self) -> LogResult<Checkpoint> {
        if self.plan.should_fail(FailurePoint::Checkpoint) {
            return Err(LogError::Checkpoint {
                reason: "injected Checkpoint failure".into(),
            });
        }
        Ok(self.current_checkpoint())
    }

    async fn check_inclusion(
        &self,
        checkpoint: &Checkpoint,
        sct: &SignedCertificateTimestamp,
        leaf_index: u64,
    ) -> LogResult<()> {
        let failed = |reason: &str| LogError::InclusionVerificationFailed {
            leaf_index,
            tree_size: checkpoint.size,
            reason: reason.to_string(),
        };
        if self.plan.should_fail(FailurePoint::CheckInclusion) {
            return Err(failed("injected CheckInclusion failure"));
        }

        let state = self.state();
        let size = usize::try_from(checkpoint.size).unwrap_or(usize::MAX);
        let index = usize::try_from(leaf_index).unwrap_or(usize::MAX);
        if index >= size || size > state.leaves.len() {
            return Err(failed("leaf index beyond checkpoint"));
        }
        if state.entries[index].timestamp != sct.timestamp {
            return Err(failed("timestamp does not match entry"));
        }
        let leaves = &state.leaves[..size];
        let proof = inclusion_proof(leaves, leaf_index)
            .ok_or_else(|| failed("no inclusion proof"))?;
        if !verify_inclusion(
            &leaves[index],
            leaf_index,
            checkpoint.size,
            &proof,
            &checkpoint.root_hash,
        ) {
            return Err(failed("root does not match checkpoint"));
        }
        Ok(())
    }
}

#[async_trait]
impl TileFetcher for MemoryLog {
    async fn fetch(&self, path: &str) -> LogResult<Option<Vec<u8>>> {
        self.render(path)
    }
}
