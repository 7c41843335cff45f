//! Local text embedding via fastembed (ONNX models, no network at inference).
//!
//! A single [`FastEmbedder`] instance is shared across the whole service;
//! the underlying model is loaded once at startup and reused for both
//! document indexing and query embedding. Model inference is synchronous
//! CPU work, so batches run on the blocking thread pool.
//!
//! The embedding dimension is not hardcoded per model: after loading, the
//! embedder runs a one-off probe embedding and records the vector length it
//! got back. Persisted indexes carry that dimension and are checked against
//! it on load.
//!
//! Failure to load the model is fatal at startup. A missing `HF_TOKEN` is
//! not: the model downloads anonymously, just with lower rate limits.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use thiserror::Error;
use tracing::{info, warn};

// ============ Errors ============

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The model could not be loaded or resolved.
    #[error("failed to initialize embedding model: {0}")]
    Init(String),

    /// The model loaded but inference failed.
    #[error("failed to generate embeddings: {0}")]
    Generation(String),

    /// The model returned no vectors for a non-empty input.
    #[error("embedding model returned no vectors")]
    Empty,
}

// ============ Trait ============

/// Interface for turning text into vectors.
///
/// The service holds this behind an `Arc<dyn Embeddings>` so tests can
/// substitute a deterministic in-memory implementation.
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text (used for queries).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = self.embed_batch(vec![text.to_string()]).await?;
        vectors.into_iter().next().ok_or(EmbeddingError::Empty)
    }

    /// Dimensionality of the vectors this embedder produces.
    fn dimension(&self) -> usize;

    /// Model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
}

// ============ FastEmbedder ============

/// Embeddings backed by a locally-loaded fastembed model.
pub struct FastEmbedder {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedder {
    /// Load the named model and probe its output dimension.
    ///
    /// Downloads the model on first use (cached afterwards). This is the
    /// slow part of startup; callers should treat an error here as fatal.
    pub fn new(model_name: &str, batch_size: usize) -> Result<Self, EmbeddingError> {
        if std::env::var("HF_TOKEN").is_err() {
            warn!("HF_TOKEN not set; embedding model will download anonymously");
        }

        let embedding_model = resolve_model(model_name)?;
        info!(model = model_name, "loading local embedding model");

        let model = TextEmbedding::try_new(
            InitOptions::new(embedding_model).with_show_download_progress(true),
        )
        .map_err(|e| EmbeddingError::Init(e.to_string()))?;

        // Probe with a throwaway input so the dimension reflects what the
        // model actually emits rather than a hardcoded table.
        let probe = model
            .embed(vec!["hello world".to_string()], None)
            .map_err(|e| EmbeddingError::Init(e.to_string()))?;
        let dimension = probe.first().map(Vec::len).ok_or(EmbeddingError::Empty)?;

        info!(model = model_name, dimension, "embedding model ready");

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
            batch_size,
        })
    }
}

#[async_trait]
impl Embeddings for FastEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Inference is blocking CPU work; keep it off the async runtime.
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || {
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Generation(format!("embedding task failed: {}", e)))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Map a configured model name to a fastembed model.
fn resolve_model(name: &str) -> Result<EmbeddingModel, EmbeddingError> {
    match name {
        "all-minilm-l6-v2" | "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(EmbeddingModel::MultilingualE5Base),
        other => Err(EmbeddingError::Init(format!(
            "unknown embedding model: '{}'. Supported models: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_rejected() {
        let err = resolve_model("word2vec").unwrap_err();
        assert!(err.to_string().contains("unknown embedding model"));
        assert!(err.to_string().contains("word2vec"));
    }

    #[test]
    fn test_known_models_resolve() {
        assert!(resolve_model("all-minilm-l6-v2").is_ok());
        assert!(resolve_model("all-MiniLM-L6-v2").is_ok());
        assert!(resolve_model("bge-small-en-v1.5").is_ok());
        assert!(resolve_model("multilingual-e5-base").is_ok());
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_load_and_embed() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let embedder = FastEmbedder::new("all-minilm-l6-v2", 32).unwrap();
        assert_eq!(embedder.dimension(), 384);

        let vectors = runtime
            .block_on(embedder.embed_batch(vec![
                "first sentence".to_string(),
                "second sentence".to_string(),
            ]))
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 384);
    }
}
