use std::fmt::Write;

use crate::config::LlmConfig;
use crate::history::History;
use crate::llm::completion::{complete, push_history, ChatMessage};
use crate::llm::prompts::ANSWER_SYSTEM_PROMPT;
use crate::models::RankedChunk;

/// Shown to the user when the answer call produced nothing.
pub const ERROR_ANSWER: &str = "ERROR";

/// Concatenate the selected chunks into the knowledge-base block of the
/// answer prompt, one section per line.
pub fn build_knowledge_base(chunks: &[RankedChunk]) -> String {
    let mut kb = String::new();
    for chunk in chunks {
        let excerpt = if chunk.answer.trim().is_empty() {
            &chunk.content
        } else {
            &chunk.answer
        };
        let _ = writeln!(kb, "Title: {}. Content: {}", chunk.title, excerpt);
    }
    kb
}

fn build_answer_prompt(knowledge_base: &str, question: &str) -> String {
    format!("**Knowledge base:**\nSections: {knowledge_base}\n**Question:** {question}\nFinal Response:")
}

fn build_answer_messages(knowledge_base: &str, question: &str, history: &History) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + 2 * history.len());
    messages.push(ChatMessage::system(ANSWER_SYSTEM_PROMPT));
    push_history(&mut messages, history.iter());
    messages.push(ChatMessage::user(build_answer_prompt(knowledge_base, question)));
    messages
}

/// Generate the final answer from the knowledge base. Prior turns are sent
/// as conversation context. Returns [`ERROR_ANSWER`] when the call fails.
pub async fn generate_answer(
    client: &reqwest::Client,
    config: &LlmConfig,
    knowledge_base: &str,
    question: &str,
    history: &History,
) -> String {
    let messages = build_answer_messages(knowledge_base, question, history);
    complete(client, config, &config.chat_deployment, &messages, 0.0, 1200)
        .await
        .unwrap_or_else(|| ERROR_ANSWER.to_string())
}
