//! Pipeline error type and its user-facing rendering.
//!
//! Stages return `Result<_, PipelineError>` internally so failures keep
//! their cause chain for logging. The HTTP boundary never sees those
//! errors raw: [`PipelineError::soft_answer`] maps each failure to a fixed
//! apology text that ships in a normal 200 response, in place of the
//! answer the model would have given.

use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::index::IndexError;
use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no URL was provided")]
    EmptyUrl,

    #[error("no messages were provided")]
    EmptyConversation,

    /// Extraction produced too little text to be worth indexing. Also the
    /// outcome of a failed fetch, whose placeholder text is short.
    #[error("extracted content too short: {chars} characters")]
    InsufficientContent { chars: usize },

    #[error("GROQ API key is not configured")]
    MissingApiKey,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// The text a user sees when this error occurs.
    ///
    /// These strings are part of the service's contract: clients key off
    /// them, so they must not drift.
    pub fn soft_answer(&self) -> String {
        match self {
            Self::EmptyUrl => "Error: No URL was provided for context.".to_string(),
            Self::EmptyConversation => {
                "Error: No messages were provided in the request.".to_string()
            }
            Self::InsufficientContent { .. } => {
                "I couldn't extract enough information from the provided URL.".to_string()
            }
            Self::MissingApiKey => "Error: GROQ API key is not configured.".to_string(),
            other => format!(
                "I encountered an error while processing your request: {}",
                other
            ),
        }
    }
}
