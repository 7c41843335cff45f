//! Request orchestration: URL to indexed context to answer.
//!
//! [`Pipeline`] owns the collaborators (fetcher, embedder, chat model,
//! URL registry) and runs the full sequence for one question. Internally
//! every stage returns `Result` so causes stay diagnosable; the public
//! [`Pipeline::respond`] entry point renders any failure as a soft answer
//! string and never fails. HTTP callers always get a well-formed reply.
//!
//! Index builds are guarded per URL id: concurrent first questions about
//! the same page wait on one build instead of racing, while different
//! pages build in parallel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::answer;
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embeddings;
use crate::error::PipelineError;
use crate::fetch::PageFetcher;
use crate::identity::UrlRegistry;
use crate::index::ChunkIndex;
use crate::llm::ChatModel;
use crate::models::{ChatMessage, TextChunk};
use crate::planner;

/// Pages whose extracted text is shorter than this are not worth
/// indexing; the fetch-failure placeholder is also under this limit.
pub const MIN_CONTENT_CHARS: usize = 100;

const INDEX_FILE: &str = "index.json";

// ============ Keyed locks ============

/// One mutex per key, created on demand. Used to serialize index builds
/// for the same URL id without blocking unrelated ids.
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

// ============ Pipeline ============

pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    embedder: Arc<dyn Embeddings>,
    chat: Option<Arc<dyn ChatModel>>,
    registry: UrlRegistry,
    data_dir: PathBuf,
    window_chars: usize,
    overlap_chars: usize,
    top_k: usize,
    build_locks: KeyedLocks,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn PageFetcher>,
        embedder: Arc<dyn Embeddings>,
        chat: Option<Arc<dyn ChatModel>>,
    ) -> Self {
        Self {
            fetcher,
            embedder,
            chat,
            registry: UrlRegistry::new(&config.storage.data_dir),
            data_dir: config.storage.data_dir.clone(),
            window_chars: config.chunking.window_chars,
            overlap_chars: config.chunking.overlap_chars,
            top_k: config.retrieval.top_k,
            build_locks: KeyedLocks::new(),
        }
    }

    /// Answer `conversation` about `url`, rendering any failure as a
    /// fixed soft-answer text. This is the only entry point callers see;
    /// it cannot fail.
    pub async fn respond(&self, conversation: &[ChatMessage], url: &str) -> String {
        match self.answer_question(conversation, url).await {
            Ok(answer) => answer,
            Err(e) => {
                match &e {
                    PipelineError::EmptyUrl
                    | PipelineError::EmptyConversation
                    | PipelineError::InsufficientContent { .. }
                    | PipelineError::MissingApiKey => {
                        warn!(url = %url, error = %e, "request rejected, returning soft answer")
                    }
                    other => {
                        error!(url = %url, error = %other, "pipeline failed, returning soft answer")
                    }
                }
                e.soft_answer()
            }
        }
    }

    /// The fallible pipeline behind [`respond`](Self::respond).
    pub async fn answer_question(
        &self,
        conversation: &[ChatMessage],
        url: &str,
    ) -> Result<String, PipelineError> {
        if url.trim().is_empty() {
            return Err(PipelineError::EmptyUrl);
        }
        if conversation.is_empty() {
            return Err(PipelineError::EmptyConversation);
        }

        let id = self.registry.resolve_or_create(url).await?;
        let index = self.ensure_index(&id, url).await?;

        let chat = self.chat.as_deref().ok_or(PipelineError::MissingApiKey)?;

        let plan = planner::plan(conversation);
        let query = planner::resolve(plan, conversation, chat).await?;
        debug!(?plan, query = %query, "resolved search text");

        let query_vector = self.embedder.embed_one(&query).await?;
        let hits = index.search(&query_vector, self.top_k)?;
        debug!(hits = hits.len(), "retrieved context chunks");

        let chunks: Vec<TextChunk> = hits.into_iter().map(|h| h.chunk).collect();
        let reply = answer::synthesize(chat, &chunks, conversation).await?;
        debug!(answer_len = reply.len(), "synthesized answer");
        Ok(reply)
    }

    /// Load the persisted index for `id`, building it first if absent.
    ///
    /// The build path (fetch, chunk, embed, persist) runs under the per-id
    /// lock with a re-check after acquisition, so one URL is only ever
    /// fetched and embedded once no matter how many requests race.
    async fn ensure_index(&self, id: &str, url: &str) -> Result<ChunkIndex, PipelineError> {
        let path = self.index_path(id);
        let dimension = self.embedder.dimension();

        // Fast path: most requests hit an existing index.
        if let Some(index) = ChunkIndex::load(&path, dimension).await? {
            debug!(id, entries = index.len(), "loaded persisted index");
            return Ok(index);
        }

        let build_lock = self.build_locks.acquire(id).await;
        let _guard = build_lock.lock().await;

        // Another request may have finished the build while we waited.
        if let Some(index) = ChunkIndex::load(&path, dimension).await? {
            debug!(id, "index appeared while waiting for build lock");
            return Ok(index);
        }

        let document = self.fetcher.fetch(url).await;
        let chars = document.text.chars().count();
        if chars < MIN_CONTENT_CHARS {
            return Err(PipelineError::InsufficientContent { chars });
        }

        let chunks = chunk_text(&document, self.window_chars, self.overlap_chars);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(texts).await?;

        let index = ChunkIndex::build(self.embedder.model_name(), dimension, chunks, vectors)?;
        index.persist(&path).await?;
        info!(id, url, entries = index.len(), "built and persisted index");
        Ok(index)
    }

    fn index_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(id).join(INDEX_FILE)
    }
}
