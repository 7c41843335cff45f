//! Chat completion client for the Groq OpenAI-compatible API.
//!
//! The pipeline talks to the model through the [`ChatModel`] trait so tests
//! can script replies without a network. [`GroqChat`] is the production
//! implementation: non-streaming `POST {endpoint}/v1/chat/completions` with
//! bearer auth. Requests are sent exactly once; a failure is reported, not
//! retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::models::{ChatMessage, Role};

// ============ Errors ============

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chat API returned status {status}: {snippet}")]
    HttpStatus { status: u16, snippet: String },

    #[error("chat API returned no choices")]
    EmptyResponse,
}

// ============ Trait ============

/// A conversational model that produces one reply for a message list.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `conversation` (optionally prefixed by a system prompt) and
    /// return the model's reply text.
    async fn complete(
        &self,
        system: Option<&str>,
        conversation: &[ChatMessage],
    ) -> Result<String, LlmError>;
}

// ============ Groq client ============

/// Groq chat completion client.
pub struct GroqChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl GroqChat {
    pub fn new(
        endpoint: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
        api_key: &str,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            api_key: api_key.to_string(),
        })
    }

    /// Build a client from `GROQ_API_KEY`, or `None` if the key is absent.
    ///
    /// The service still starts without a key; requests that need the model
    /// get a soft error instead.
    pub fn from_env(
        endpoint: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Option<Self>, LlmError> {
        match std::env::var("GROQ_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                Ok(Some(Self::new(endpoint, model, temperature, timeout, key.trim())?))
            }
            _ => {
                warn!("GROQ_API_KEY not set; requests will be answered with a configuration error");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ChatModel for GroqChat {
    async fn complete(
        &self,
        system: Option<&str>,
        conversation: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if let Some(system) = system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        for message in conversation {
            messages.push(WireMessage {
                role: wire_role(message.role),
                content: &message.content,
            });
        }

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let url = format!("{}/v1/chat/completions", self.endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                snippet: body.chars().take(240).collect(),
            });
        }

        let completion: CompletionResponse = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;
        Ok(choice.message.content)
    }
}

/// The API only knows `system`/`user`/`assistant`; the internal error
/// marker role goes over the wire as `user`.
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User | Role::Error => "user",
        Role::Assistant => "assistant",
    }
}

// ============ Wire format ============

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}
