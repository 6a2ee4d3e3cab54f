//! static-ct-api tiles.
//!
//! The log's Merkle tree is stored as tiles of height 8: a level `L` tile
//! holds up to 256 consecutive hashes from tree level `8L`, and a data tile
//! holds the entries whose leaf hashes make up level 0. Tiles at the right
//! edge of the tree may be partial.

use async_trait::async_trait;
use tracing::trace;
use url::Url;
use woodpecker_core::{Hash, node_hash};

use crate::error::{LogError, LogResult};

/// Tree levels per tile
pub const TILE_HEIGHT: u8 = 8;

/// Hashes (or entries) in a full tile
pub const TILE_WIDTH: u64 = 1 << TILE_HEIGHT;

const HASH_SIZE: usize = 32;

/// Tile contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    /// Hashes at tree level `8 * level`
    Hash(u8),
    /// Log entries
    Data,
}

/// One tile of a tree of known size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    /// What the tile holds
    pub kind: TileKind,
    /// Index of the tile within its level
    pub index: u64,
    /// Number of hashes or entries, `1..=256`
    pub width: u64,
}

impl Tile {
    /// The tile at `kind` and `index` as it exists in a tree of `tree_size`.
    ///
    /// Returns `None` if the tree does not reach that tile.
    #[must_use]
    pub fn in_tree(kind: TileKind, index: u64, tree_size: u64) -> Option<Self> {
        let level = match kind {
            TileKind::Hash(level) => level,
            TileKind::Data => 0,
        };
        let shift = u32::from(level) * u32::from(TILE_HEIGHT);
        let stored = tree_size.checked_shr(shift).unwrap_or(0);
        let start = index.checked_mul(TILE_WIDTH)?;
        if stored <= start {
            return None;
        }
        Some(Self {
            kind,
            index,
            width: (stored - start).min(TILE_WIDTH),
        })
    }

    /// Whether the tile is narrower than a full tile
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.width < TILE_WIDTH
    }

    /// The full-width tile at the same position
    #[must_use]
    pub fn full(&self) -> Self {
        Self {
            width: TILE_WIDTH,
            ..*self
        }
    }

    /// Path below the monitoring prefix, e.g. `tile/0/x001/234` or
    /// `tile/data/005.p/17`
    #[must_use]
    pub fn path(&self) -> String {
        let level = match self.kind {
            TileKind::Hash(level) => level.to_string(),
            TileKind::Data => "data".to_string(),
        };
        let mut path = format!("tile/{level}/{}", encode_index(self.index));
        if self.is_partial() {
            path.push_str(&format!(".p/{}", self.width));
        }
        path
    }
}

/// Tile index as three-digit path elements, all but the last prefixed with `x`
fn encode_index(mut index: u64) -> String {
    let mut groups = vec![format!("{:03}", index % 1000)];
    index /= 1000;
    while index > 0 {
        groups.push(format!("x{:03}", index % 1000));
        index /= 1000;
    }
    groups.reverse();
    groups.join("/")
}

/// Reads files below a log's monitoring prefix
#[async_trait]
pub trait TileFetcher: Send + Sync {
    /// Fetch `path`; `Ok(None)` if the log reports it does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the log answers with an error
    async fn fetch(&self, path: &str) -> LogResult<Option<Vec<u8>>>;
}

/// Fetches tiles and checkpoints over HTTP
#[derive(Debug, Clone)]
pub struct HttpTileFetcher {
    client: reqwest::Client,
    base: Url,
}

impl HttpTileFetcher {
    /// Create a fetcher for the monitoring prefix `monitoring`
    #[must_use]
    pub fn new(client: reqwest::Client, monitoring: &Url) -> Self {
        let mut base = monitoring.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { client, base }
    }

    /// Monitoring prefix, ending in `/`
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, path: &str) -> LogResult<Option<Vec<u8>>> {
        let url = self
            .base
            .join(path)
            .map_err(|e| LogError::tile(path, e.to_string()))?;
        let transport = |e: reqwest::Error| LogError::Transport {
            endpoint: url.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LogError::tile(path, format!("server returned {status}")));
        }
        let body = response.bytes().await.map_err(transport)?;
        trace!(url = %url, bytes = body.len(), "fetched");
        Ok(Some(body.to_vec()))
    }
}

/// Fetch a tile, falling back to the full tile if the partial one is gone.
///
/// The returned bytes may cover more than `tile.width` entries.
///
/// # Errors
///
/// Returns [`LogError::Tile`] if neither form of the tile exists
pub async fn fetch_tile(fetcher: &dyn TileFetcher, tile: &Tile) -> LogResult<Vec<u8>> {
    if let Some(body) = fetcher.fetch(&tile.path()).await? {
        return Ok(body);
    }
    if tile.is_partial() {
        let full = tile.full();
        if let Some(body) = fetcher.fetch(&full.path()).await? {
            trace!(path = %full.path(), "partial tile gone, using full tile");
            return Ok(body);
        }
    }
    Err(LogError::tile(tile.path(), "not found"))
}

/// Split a hash tile body into the `tile.width` hashes it must hold
///
/// # Errors
///
/// Returns [`LogError::Tile`] if the body is too short or not a whole number
/// of hashes
pub fn tile_hashes(tile: &Tile, body: &[u8]) -> LogResult<Vec<Hash>> {
    if body.len() % HASH_SIZE != 0 {
        return Err(LogError::tile(
            tile.path(),
            format!("{} bytes is not a whole number of hashes", body.len()),
        ));
    }
    let width = usize::try_from(tile.width).unwrap_or(usize::MAX);
    if body.len() / HASH_SIZE < width {
        return Err(LogError::tile(
            tile.path(),
            format!("holds {} hashes, expected {width}", body.len() / HASH_SIZE),
        ));
    }
    Ok(body
        .chunks_exact(HASH_SIZE)
        .take(width)
        .map(|chunk| {
            let mut hash = [0u8; HASH_SIZE];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}

/// A perfect subtree: `2^level` leaves starting at `index << level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subtree {
    /// Height of the subtree
    pub level: u8,
    /// Position among subtrees of the same height
    pub index: u64,
}

impl Subtree {
    /// The tile holding the hashes this subtree reduces from, and the
    /// offset and count of those hashes within it
    #[must_use]
    pub fn location(&self, tree_size: u64) -> Option<(Tile, usize, usize)> {
        let tile_level = self.level / TILE_HEIGHT;
        let rest = self.level % TILE_HEIGHT;
        let first = self.index.checked_shl(u32::from(rest))?;
        let tile = Tile::in_tree(TileKind::Hash(tile_level), first / TILE_WIDTH, tree_size)?;
        let offset = usize::try_from(first % TILE_WIDTH).ok()?;
        Some((tile, offset, 1 << rest))
    }
}

/// Perfect subtrees covering `[lo, hi)`, largest first.
///
/// The range hash is their right fold: `node(s1, node(s2, ...))`.
#[must_use]
pub fn range_subtrees(lo: u64, hi: u64) -> Vec<Subtree> {
    let mut subtrees = Vec::new();
    let mut start = lo;
    let size = hi.saturating_sub(lo);
    for level in (0..64u8).rev() {
        if size & (1 << level) != 0 {
            subtrees.push(Subtree {
                level,
                index: start >> level,
            });
            start += 1 << level;
        }
    }
    subtrees
}

/// RFC 6962 audit path for `index` in a tree of `size`, bottom first, with
/// each element given as the subtrees it folds from
#[must_use]
pub fn audit_path(index: u64, size: u64) -> Vec<Vec<Subtree>> {
    let mut path = Vec::new();
    let (mut lo, mut hi) = (0, size);
    while hi - lo > 1 && index < hi {
        let k = woodpecker_core::split_point(hi - lo);
        if index < lo + k {
            path.push(range_subtrees(lo + k, hi));
            hi = lo + k;
        } else {
            path.push(range_subtrees(lo, lo + k));
            lo += k;
        }
    }
    path.reverse();
    path
}

/// Reduce `2^n` adjacent hashes to their subtree hash
#[must_use]
pub fn reduce(hashes: &[Hash]) -> Option<Hash> {
    match hashes.len() {
        0 => None,
        1 => Some(hashes[0]),
        n => {
            let mid = n / 2;
            Some(node_hash(&reduce(&hashes[..mid])?, &reduce(&hashes[mid..])?))
        }
    }
}

/// Right fold of subtree hashes into a range hash
#[must_use]
pub fn fold_right(hashes: &[Hash]) -> Option<Hash> {
    let (last, rest) = hashes.split_last()?;
    Some(rest.iter().rev().fold(*last, |acc, h| node_hash(h, &acc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{Reply, TestLog};
    use proptest::prelude::*;
    use woodpecker_core::{inclusion_proof, leaf_hash, root_hash};

    fn leaves(n: u64) -> Vec<Hash> {
        (0..n).map(|i| leaf_hash(&i.to_be_bytes())).collect()
    }

    fn subtree_hash(leaves: &[Hash], subtree: &Subtree) -> Hash {
        let start = (subtree.index << subtree.level) as usize;
        root_hash(&leaves[start..start + (1 << subtree.level)])
    }

    #[test]
    fn test_index_encoding() {
        assert_eq!(encode_index(0), "000");
        assert_eq!(encode_index(5), "005");
        assert_eq!(encode_index(1000), "x001/000");
        assert_eq!(encode_index(1_234_067), "x001/x234/067");
    }

    #[test]
    fn test_tile_paths() {
        let full = Tile::in_tree(TileKind::Hash(0), 1234, 1 << 30).unwrap();
        assert_eq!(full.path(), "tile/0/x001/234");

        let partial = Tile::in_tree(TileKind::Data, 5, 5 * 256 + 17).unwrap();
        assert_eq!(partial.path(), "tile/data/005.p/17");
        assert_eq!(partial.full().path(), "tile/data/005");
    }

    #[test]
    fn test_tile_widths() {
        // Level 1 of a 70000-leaf tree stores 273 hashes
        let tile = Tile::in_tree(TileKind::Hash(1), 1, 70_000).unwrap();
        assert_eq!(tile.width, 17);
        assert_eq!(tile.path(), "tile/1/001.p/17");
        assert!(Tile::in_tree(TileKind::Hash(1), 2, 70_000).is_none());
        assert!(Tile::in_tree(TileKind::Hash(2), 0, 65_535).is_none());
        assert_eq!(Tile::in_tree(TileKind::Data, 0, 256).unwrap().width, 256);
        assert!(Tile::in_tree(TileKind::Data, 1, 256).is_none());
    }

    #[test]
    fn test_range_subtrees() {
        assert_eq!(
            range_subtrees(8, 15),
            vec![
                Subtree { level: 2, index: 2 },
                Subtree { level: 1, index: 6 },
                Subtree { level: 0, index: 14 },
            ]
        );
        assert!(range_subtrees(3, 3).is_empty());
    }

    #[test]
    fn test_subtree_location() {
        let (tile, offset, count) = Subtree { level: 3, index: 33 }
            .location(1 << 20)
            .unwrap();
        assert_eq!(tile.kind, TileKind::Hash(0));
        assert_eq!(tile.index, 1);
        assert_eq!((offset, count), (8, 8));

        let (tile, offset, count) = Subtree { level: 9, index: 1 }
            .location(1 << 20)
            .unwrap();
        assert_eq!(tile.kind, TileKind::Hash(1));
        assert_eq!((tile.index, offset, count), (0, 2, 2));
    }

    #[test]
    fn test_fetched_tiles_reproduce_root() {
        let size = 600;
        let leaves = leaves(size);
        let level1: Vec<Hash> = leaves.chunks(256).filter(|c| c.len() == 256).map(root_hash).collect();

        for index in [0, 255, 256, 511, 599] {
            let proof: Vec<Hash> = audit_path(index, size)
                .iter()
                .map(|element| {
                    let hashes: Vec<Hash> = element
                        .iter()
                        .map(|subtree| {
                            let (tile, offset, count) = subtree.location(size).unwrap();
                            let stored = match tile.kind {
                                TileKind::Hash(0) => &leaves[..],
                                TileKind::Hash(1) => &level1[..],
                                _ => unreachable!(),
                            };
                            let start = (tile.index * TILE_WIDTH) as usize + offset;
                            reduce(&stored[start..start + count]).unwrap()
                        })
                        .collect();
                    fold_right(&hashes).unwrap()
                })
                .collect();
            assert_eq!(proof, inclusion_proof(&leaves, index).unwrap(), "index {index}");
        }
    }

    proptest! {
        #[test]
        fn test_audit_path_matches_direct_proof(size in 1u64..300, seed in any::<u64>()) {
            let index = seed % size;
            let leaves = leaves(size);
            let proof: Vec<Hash> = audit_path(index, size)
                .iter()
                .map(|element| {
                    let hashes: Vec<Hash> =
                        element.iter().map(|s| subtree_hash(&leaves, s)).collect();
                    fold_right(&hashes).unwrap()
                })
                .collect();
            prop_assert_eq!(proof, inclusion_proof(&leaves, index).unwrap());
        }
    }

    #[test]
    fn test_tile_hashes_checks_length() {
        let tile = Tile::in_tree(TileKind::Hash(0), 0, 3).unwrap();
        assert_eq!(tile_hashes(&tile, &[0u8; 96]).unwrap().len(), 3);
        // a full tile served in place of a partial one
        assert_eq!(tile_hashes(&tile, &[0u8; 256 * 32]).unwrap().len(), 3);
        assert!(tile_hashes(&tile, &[0u8; 64]).is_err());
        assert!(tile_hashes(&tile, &[0u8; 97]).is_err());
    }

    #[tokio::test]
    async fn test_http_fetcher_not_found_is_none() {
        let log = TestLog::start(vec![Reply::not_found()]).await;
        let url = Url::parse(&format!("{}/mon", log.base())).unwrap();
        let fetcher = HttpTileFetcher::new(reqwest::Client::new(), &url);
        assert_eq!(fetcher.base_url().path(), "/mon/");

        assert_eq!(fetcher.fetch("tile/0/000").await.unwrap(), None);
        assert_eq!(log.requests()[0].line(), "GET /mon/tile/0/000");
    }

    #[tokio::test]
    async fn test_http_fetcher_server_error() {
        let log = TestLog::start(vec![Reply::status(503, "busy")]).await;
        let fetcher =
            HttpTileFetcher::new(reqwest::Client::new(), &Url::parse(log.base()).unwrap());
        assert!(matches!(
            fetcher.fetch("checkpoint").await,
            Err(LogError::Tile { .. })
        ));
    }

    #[tokio::test]
    async fn test_partial_tile_falls_back_to_full() {
        let log = TestLog::start(vec![Reply::not_found(), Reply::ok(vec![7u8; 256 * 32])]).await;
        let fetcher =
            HttpTileFetcher::new(reqwest::Client::new(), &Url::parse(log.base()).unwrap());
        let tile = Tile::in_tree(TileKind::Hash(0), 0, 10).unwrap();

        let body = fetch_tile(&fetcher, &tile).await.unwrap();
        assert_eq!(tile_hashes(&tile, &body).unwrap(), vec![[7u8; 32]; 10]);

        let lines: Vec<_> = log.requests().iter().map(|r| r.line()).collect();
        assert_eq!(lines, ["GET /tile/0/000.p/10", "GET /tile/0/000"]);
    }

    #[tokio::test]
    async fn test_missing_tile_is_error() {
        let log = TestLog::start(vec![Reply::not_found(), Reply::not_found()]).await;
        let fetcher =
            HttpTileFetcher::new(reqwest::Client::new(), &Url::parse(log.base()).unwrap());
        let tile = Tile::in_tree(TileKind::Data, 0, 10).unwrap();
        let err = fetch_tile(&fetcher, &tile).await.unwrap_err();
        assert_eq!(err.to_string(), "tile tile/data/000.p/10: not found");
    }
}
