//! Answer synthesis over retrieved context.
//!
//! The retrieved chunks are folded into a fixed system prompt that
//! instructs the model to answer only from that context and to refuse
//! with an exact phrase otherwise. The template and refusal wording are
//! contract: clients match on the refusal text, so neither may drift.

use crate::llm::{ChatModel, LlmError};
use crate::models::{ChatMessage, TextChunk};

/// What the model says when the context does not cover the question.
pub const REFUSAL_PHRASE: &str = "I don't know";

/// System prompt template; `{context}` is replaced with the retrieved
/// chunk texts joined by blank lines.
pub const SYSTEM_TEMPLATE: &str = r#"Answer the user's questions based on the below context.
If the context doesn't contain any relevant information to the question, don't make something up and just only respond back with "I don't know":

<context>
{context}
</context>"#;

/// Render the system prompt for a set of retrieved chunks.
pub fn build_system_prompt(chunks: &[TextChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    SYSTEM_TEMPLATE.replace("{context}", &context)
}

/// Ask the model to answer the conversation from the retrieved context.
pub async fn synthesize(
    chat: &dyn ChatModel,
    chunks: &[TextChunk],
    conversation: &[ChatMessage],
) -> Result<String, LlmError> {
    let system = build_system_prompt(chunks);
    chat.complete(Some(&system), conversation).await
}
