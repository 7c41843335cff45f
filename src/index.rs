//! Flat exact-nearest-neighbor index over embedded chunks.
//!
//! Each indexed page gets its own [`ChunkIndex`]: every chunk's vector is
//! held in memory and search is a linear scan under squared L2 distance.
//! Pages produce at most a few hundred chunks, so exact scan beats any
//! approximate structure at this scale and stays fully deterministic.
//!
//! Indexes are persisted as JSON (one file per page) and reloaded on later
//! requests for the same URL. The file records the embedding model name and
//! dimension it was built with; a stored dimension that disagrees with the
//! active embedder is an error rather than a silent rebuild.

use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::TextChunk;

// ============ Errors ============

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored or queried vectors do not match the index dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("chunk/vector count mismatch: {chunks} chunks, {vectors} vectors")]
    CountMismatch { chunks: usize, vectors: usize },
}

// ============ Data model ============

/// One chunk with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Opaque entry token, unique within the index.
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: TextChunk,
}

/// A search result: the chunk plus its L2 distance from the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub distance: f32,
    pub chunk: TextChunk,
}

/// Exact-scan vector index for one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkIndex {
    /// Embedding model the vectors were produced with.
    pub model: String,
    /// Vector dimensionality; every entry and every query must match.
    pub dimension: usize,
    pub entries: Vec<IndexEntry>,
}

impl ChunkIndex {
    /// Assemble an index from chunks and their vectors (parallel slices).
    ///
    /// Entries receive fresh v4 ids in input order. Every vector must have
    /// exactly `dimension` components.
    pub fn build(
        model: &str,
        dimension: usize,
        chunks: Vec<TextChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            entries.push(IndexEntry {
                id: Uuid::new_v4().to_string(),
                vector,
                chunk,
            });
        }

        Ok(Self {
            model: model.to_string(),
            dimension,
            entries,
        })
    }

    /// Write the index to `path` as JSON, creating parent directories.
    ///
    /// The bytes land in a sibling `.tmp` file and are renamed into place,
    /// so a concurrent load never observes a partially written file.
    pub async fn persist(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Load an index from `path`, or `None` if no index exists there.
    ///
    /// Errors if the stored dimension disagrees with `expected_dimension`:
    /// mixing vectors from different models corrupts search silently, so
    /// that case must surface to the operator instead.
    pub async fn load(path: &Path, expected_dimension: usize) -> Result<Option<Self>, IndexError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let index: Self = serde_json::from_slice(&bytes)?;
        if index.dimension != expected_dimension {
            return Err(IndexError::DimensionMismatch {
                expected: expected_dimension,
                actual: index.dimension,
            });
        }
        Ok(Some(index))
    }

    /// Exact k-nearest-neighbor search by L2 distance.
    ///
    /// Returns up to `k` hits ordered nearest first. Ties keep input order
    /// (the sort is stable).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (l2_squared(query, &entry.vector), entry))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(dist_sq, entry)| SearchHit {
                distance: dist_sq.sqrt(),
                chunk: entry.chunk.clone(),
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Squared L2 distance; monotonic in true L2, so fine for ranking.
fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn chunk(text: &str) -> TextChunk {
        TextChunk {
            text: text.to_string(),
            start_offset: 0,
            metadata: DocumentMetadata::default(),
        }
    }

    fn sample_index() -> ChunkIndex {
        ChunkIndex::build(
            "test-model",
            2,
            vec![chunk("origin"), chunk("east"), chunk("far east")],
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![10.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_build_assigns_unique_entry_ids() {
        let index = sample_index();
        let ids: std::collections::HashSet<&str> =
            index.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| !id.is_empty()));
        assert_eq!(index.len(), 3);
        assert!(!index.is_empty());
    }

    #[test]
    fn test_build_rejects_wrong_dimension() {
        let err = ChunkIndex::build("m", 3, vec![chunk("a")], vec![vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_build_rejects_count_mismatch() {
        let err =
            ChunkIndex::build("m", 2, vec![chunk("a"), chunk("b")], vec![vec![0.0, 0.0]])
                .unwrap_err();
        assert!(matches!(
            err,
            IndexError::CountMismatch {
                chunks: 2,
                vectors: 1
            }
        ));
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = sample_index();
        let hits = index.search(&[1.2, 0.0], 3).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "origin", "far east"]);
        assert!(hits[0].distance < hits[1].distance);
        assert!(hits[1].distance < hits[2].distance);
    }

    #[test]
    fn test_search_caps_at_k() {
        let index = sample_index();
        assert_eq!(index.search(&[0.0, 0.0], 2).unwrap().len(), 2);
        // Asking for more than exists returns everything.
        assert_eq!(index.search(&[0.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn test_search_rejects_wrong_query_dimension() {
        let index = sample_index();
        let err = index.search(&[1.0, 2.0, 3.0], 3).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_persist_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc123").join("index.json");

        let index = sample_index();
        index.persist(&path).await.unwrap();

        let loaded = ChunkIndex::load(&path, 2).await.unwrap().unwrap();
        assert_eq!(loaded.model, "test-model");
        assert_eq!(loaded.dimension, 2);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.entries[1].chunk.text, "east");
        assert_eq!(loaded.entries[1].vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_persist_replaces_without_leftover_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page").join("index.json");

        sample_index().persist(&path).await.unwrap();
        // Overwrite in place, as a rebuild would.
        sample_index().persist(&path).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["index.json"]);
        assert!(ChunkIndex::load(&path, 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("index.json");
        assert!(ChunkIndex::load(&path, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_dimension_mismatch_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page").join("index.json");
        sample_index().persist(&path).await.unwrap();

        let err = ChunkIndex::load(&path, 384).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 384,
                actual: 2
            }
        ));
    }
}
