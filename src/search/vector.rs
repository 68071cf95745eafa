//! Flat dense-vector index with stage-and-swap persistence.
//!
//! Vectors are stored row-major as little-endian f32 behind an `ArcSwap`,
//! so readers always see a consistent snapshot while appends and rebuilds
//! publish whole new states. Embeddings are L2-normalized upstream, making
//! inner product equal cosine similarity. At the corpus sizes served here a
//! brute scan beats maintaining an ANN graph.
//!
//! On-disk format: `SRGV` magic, u32 version, u32 dimension, u64 count,
//! then `count * dimension` f32 values. Writes go to `<path>.staging` and
//! are renamed into place.

use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const MAGIC: &[u8; 4] = b"SRGV";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 { 0 } else { self.data.len() / self.dimension }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one vector, returning its position.
    pub fn push(&mut self, vector: &[f32]) -> anyhow::Result<usize> {
        anyhow::ensure!(
            vector.len() == self.dimension,
            "vector dimension {} does not match index dimension {}",
            vector.len(),
            self.dimension
        );
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Inner-product top-k scan. Results are sorted score-descending with
    /// position-ascending tie-breaks, so equal scores order deterministically.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dimension || self.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|position| {
                let score = self
                    .row(position)
                    .iter()
                    .zip(query)
                    .map(|(a, b)| a * b)
                    .sum::<f32>();
                (position, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(20 + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(bytes.len() >= 20, "index file truncated");
        anyhow::ensure!(&bytes[0..4] == MAGIC, "bad index magic");
        let version = u32::from_le_bytes(bytes[4..8].try_into()?);
        anyhow::ensure!(version == FORMAT_VERSION, "unsupported index version {version}");
        let dimension = u32::from_le_bytes(bytes[8..12].try_into()?) as usize;
        let count = u64::from_le_bytes(bytes[12..20].try_into()?) as usize;
        let expected = 20 + count * dimension * 4;
        anyhow::ensure!(bytes.len() >= expected, "index file shorter than header claims");

        let mut data = Vec::with_capacity(count * dimension);
        for chunk in bytes[20..expected].chunks_exact(4) {
            data.push(f32::from_le_bytes(chunk.try_into()?));
        }
        Ok(Self { dimension, data })
    }
}

/// Shared handle: lock-free reads, serialized writes, durable via
/// stage-and-swap.
pub struct SharedVectorIndex {
    current: ArcSwap<VectorIndex>,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SharedVectorIndex {
    /// Load the persisted index, or start empty when the file is absent or
    /// carries a different dimension (a model change invalidates it).
    pub async fn open(path: PathBuf, dimension: usize) -> Self {
        let index = match tokio::fs::read(&path).await {
            Ok(bytes) => match VectorIndex::from_bytes(&bytes) {
                Ok(index) if index.dimension() == dimension => index,
                Ok(index) => {
                    tracing::warn!(
                        found = index.dimension(),
                        expected = dimension,
                        "vector index dimension changed; starting empty"
                    );
                    VectorIndex::new(dimension)
                }
                Err(err) => {
                    tracing::warn!(error = %err, path = %path.display(), "unreadable vector index; starting empty");
                    VectorIndex::new(dimension)
                }
            },
            Err(_) => VectorIndex::new(dimension),
        };

        Self {
            current: ArcSwap::from_pointee(index),
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<VectorIndex> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    async fn persist(&self, index: &VectorIndex) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.path.with_extension("bin.staging");
        tokio::fs::write(&staging, index.to_bytes()).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    /// Append a batch of vectors, persist, and publish the new state.
    /// Returns the assigned positions.
    pub async fn append_batch(&self, vectors: &[Vec<f32>]) -> anyhow::Result<Vec<usize>> {
        let _guard = self.write_lock.lock().await;
        let mut next = VectorIndex::clone(&self.snapshot());
        let mut positions = Vec::with_capacity(vectors.len());
        for vector in vectors {
            positions.push(next.push(vector)?);
        }
        self.persist(&next).await?;
        self.current.store(Arc::new(next));
        Ok(positions)
    }

    /// Atomically replace the whole index (full rebuild).
    pub async fn replace(&self, index: VectorIndex) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.persist(&index).await?;
        self.current.store(Arc::new(index));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_bytes() {
        let mut index = VectorIndex::new(3);
        index.push(&[1.0, 0.0, 0.0]).unwrap();
        index.push(&[0.0, 1.0, 0.0]).unwrap();

        let restored = VectorIndex::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.dimension(), 3);
        assert_eq!(restored.row(1), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn search_ranks_by_inner_product() {
        let mut index = VectorIndex::new(2);
        index.push(&[1.0, 0.0]).unwrap();
        index.push(&[0.6, 0.8]).unwrap();
        index.push(&[0.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 1);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = VectorIndex::new(4);
        assert!(index.push(&[1.0, 2.0]).is_err());
        assert!(index.search(&[1.0, 2.0], 5).is_empty());
    }

    #[tokio::test]
    async fn stage_and_swap_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");

        let shared = SharedVectorIndex::open(path.clone(), 2).await;
        let positions = shared
            .append_batch(&[vec![1.0, 0.0], vec![0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(positions, vec![0, 1]);

        let reopened = SharedVectorIndex::open(path.clone(), 2).await;
        assert_eq!(reopened.len(), 2);

        // No staging file left behind.
        assert!(!path.with_extension("bin.staging").exists());
    }

    #[tokio::test]
    async fn dimension_change_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let shared = SharedVectorIndex::open(path.clone(), 2).await;
        shared.append_batch(&[vec![1.0, 0.0]]).await.unwrap();

        let reopened = SharedVectorIndex::open(path, 8).await;
        assert_eq!(reopened.len(), 0);
    }
}
