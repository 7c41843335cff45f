//! Search text planning.
//!
//! Retrieval needs a single query string, but the input is a whole
//! conversation. A one-turn conversation is its own query; anything longer
//! is condensed by the model so follow-ups ("what about the second one?")
//! still retrieve against their real subject.

use crate::llm::{ChatModel, LlmError};
use crate::models::ChatMessage;

/// Instruction appended to the conversation when asking the model to
/// produce a standalone search query.
pub const REWRITE_INSTRUCTION: &str = "Given the above conversation, generate a search query \
     to look up information relevant to the conversation. Only respond with the query, \
     nothing else.";

/// How the search text will be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPlan {
    /// Single-turn conversation: embed the message as-is, no model call.
    UseLastMessage,
    /// Multi-turn: have the model rewrite the conversation into a query.
    RewriteQuery,
}

pub fn plan(conversation: &[ChatMessage]) -> QueryPlan {
    if conversation.len() == 1 {
        QueryPlan::UseLastMessage
    } else {
        QueryPlan::RewriteQuery
    }
}

/// Carry out `plan`, producing the text to embed for retrieval.
pub async fn resolve(
    plan: QueryPlan,
    conversation: &[ChatMessage],
    chat: &dyn ChatModel,
) -> Result<String, LlmError> {
    match plan {
        QueryPlan::UseLastMessage => Ok(conversation
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()),
        QueryPlan::RewriteQuery => {
            let mut messages = conversation.to_vec();
            messages.push(ChatMessage::user(REWRITE_INSTRUCTION));
            chat.complete(None, &messages).await
        }
    }
}
