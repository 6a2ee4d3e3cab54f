//! Tile-based inclusion verification.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use woodpecker_core::{Checkpoint, Hash, SignedCertificateTimestamp, parse_data_tile, verify_inclusion};

use crate::checkpoint::CheckpointVerifier;
use crate::error::{LogError, LogResult};
use crate::tile::{
    Tile, TileFetcher, TileKind, TILE_WIDTH, audit_path, fetch_tile, fold_right, reduce,
    tile_hashes,
};
use crate::trait_::InclusionVerifier;

const CHECKPOINT_PATH: &str = "checkpoint";

/// Verifies inclusion by reading a log's checkpoint and tiles
pub struct TileVerifier {
    fetcher: Arc<dyn TileFetcher>,
    checkpoints: CheckpointVerifier,
}

impl std::fmt::Debug for TileVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileVerifier")
            .field("checkpoints", &self.checkpoints)
            .finish_non_exhaustive()
    }
}

impl TileVerifier {
    /// Create a verifier reading through `fetcher` and trusting `checkpoints`
    #[must_use]
    pub fn new(fetcher: Arc<dyn TileFetcher>, checkpoints: CheckpointVerifier) -> Self {
        Self {
            fetcher,
            checkpoints,
        }
    }

    async fn hashes<'a>(
        &self,
        tile: Tile,
        cache: &'a mut HashMap<Tile, Vec<Hash>>,
    ) -> LogResult<&'a [Hash]> {
        if !cache.contains_key(&tile) {
            let body = fetch_tile(self.fetcher.as_ref(), &tile).await?;
            cache.insert(tile, tile_hashes(&tile, &body)?);
        }
        cache
            .get(&tile)
            .map(Vec::as_slice)
            .ok_or_else(|| LogError::tile(tile.path(), "missing from cache"))
    }

    async fn audit_path(&self, leaf_index: u64, tree_size: u64) -> LogResult<Vec<Hash>> {
        let mut cache = HashMap::new();
        let mut proof = Vec::new();
        for element in audit_path(leaf_index, tree_size) {
            let mut folded = Vec::with_capacity(element.len());
            for subtree in element {
                let (tile, offset, count) = subtree.location(tree_size).ok_or_else(|| {
                    LogError::tile(
                        format!("subtree {}/{}", subtree.level, subtree.index),
                        "outside tree",
                    )
                })?;
                let hashes = self.hashes(tile, &mut cache).await?;
                let hash = hashes
                    .get(offset..offset + count)
                    .and_then(reduce)
                    .ok_or_else(|| LogError::tile(tile.path(), "subtree out of range"))?;
                folded.push(hash);
            }
            proof.push(
                fold_right(&folded)
                    .ok_or_else(|| LogError::tile("audit path", "empty path element"))?,
            );
        }
        debug!(
            leaf_index,
            tree_size,
            proof_len = proof.len(),
            tiles = cache.len(),
            "recomputed audit path"
        );
        Ok(proof)
    }
}

#[async_trait]
impl InclusionVerifier for TileVerifier {
    async fn checkpoint(&self) -> LogResult<Checkpoint> {
        let note = self
            .fetcher
            .fetch(CHECKPOINT_PATH)
            .await?
            .ok_or_else(|| LogError::checkpoint("not found"))?;
        let (checkpoint, timestamp) = self.checkpoints.verify(&note)?;
        debug!(
            origin = %checkpoint.origin,
            size = checkpoint.size,
            timestamp,
            "checkpoint verified"
        );
        Ok(checkpoint)
    }

    async fn check_inclusion(
        &self,
        checkpoint: &Checkpoint,
        sct: &SignedCertificateTimestamp,
        leaf_index: u64,
    ) -> LogResult<()> {
        let failed = |reason: String| LogError::InclusionVerificationFailed {
            leaf_index,
            tree_size: checkpoint.size,
            reason,
        };

        let data_tile = Tile::in_tree(TileKind::Data, leaf_index / TILE_WIDTH, checkpoint.size)
            .filter(|_| checkpoint.contains(leaf_index))
            .ok_or_else(|| failed("leaf index beyond checkpoint".to_string()))?;

        let body = fetch_tile(self.fetcher.as_ref(), &data_tile).await?;
        let entries = parse_data_tile(&body)
            .map_err(|e| LogError::tile(data_tile.path(), e.to_string()))?;
        let position = usize::try_from(leaf_index % TILE_WIDTH).unwrap_or(usize::MAX);
        let entry = entries.get(position).ok_or_else(|| {
            LogError::tile(
                data_tile.path(),
                format!("holds {} entries, need {}", entries.len(), position + 1),
            )
        })?;

        if entry.timestamp != sct.timestamp {
            return Err(failed(format!(
                "entry timestamp {} does not match SCT timestamp {}",
                entry.timestamp, sct.timestamp
            )));
        }
        let entry_index = entry.leaf_index()?;
        if entry_index != leaf_index {
            return Err(failed(format!("entry carries leaf index {entry_index}")));
        }

        let leaf = entry.leaf_hash()?;
        let proof = self.audit_path(leaf_index, checkpoint.size).await?;
        if !verify_inclusion(&leaf, leaf_index, checkpoint.size, &proof, &checkpoint.root_hash) {
            return Err(failed("recomputed root does not match checkpoint".to_string()));
        }
        debug!(leaf_index, tree_size = checkpoint.size, "inclusion verified");
        Ok(())
    }
}
