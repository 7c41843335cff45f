//! Core data models shared across the answering pipeline.
//!
//! These types represent the conversation coming in over the wire and the
//! documents and chunks that flow from the fetcher through chunking,
//! embedding, and retrieval.

use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
///
/// `Error` marks error turns a frontend injected into the transcript; it is
/// accepted on the wire like any other role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Error,
}

/// A single turn of the conversation sent with a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Metadata captured while extracting a page.
///
/// `error` is set only on the placeholder document produced for a failed
/// fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Plain text extracted from a fetched page, plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// A window of document text produced by the chunker.
///
/// `start_offset` is the starting position within the document text in
/// characters, not bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub start_offset: usize,
    pub metadata: DocumentMetadata,
}
