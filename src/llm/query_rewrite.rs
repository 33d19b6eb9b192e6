use crate::config::LlmConfig;
use crate::history::History;
use crate::llm::completion::{complete, push_history, ChatMessage};
use crate::llm::prompts::{REWRITE_EXAMPLES, REWRITE_SYSTEM_PROMPT};

/// Ask the model for a standalone search query for `question`, taking the
/// recent turns into account. `None` when the model gave nothing usable.
pub async fn generate_search_query(
    client: &reqwest::Client,
    config: &LlmConfig,
    question: &str,
    history: &History,
) -> Option<String> {
    let messages = build_rewrite_messages(question, history);
    let response = complete(client, config, &config.chat_deployment, &messages, 0.0, 1200).await?;
    parse_search_query(&response)
}

/// Rewritten query, or the raw question when rewriting fails.
pub async fn resolve_search_query(
    client: &reqwest::Client,
    config: &LlmConfig,
    question: &str,
    history: &History,
) -> String {
    match generate_search_query(client, config, question, history).await {
        Some(query) => {
            tracing::info!("Query rewritten: {query}");
            query
        }
        None => {
            tracing::info!("Query rewrite unavailable, searching with the raw question");
            question.to_string()
        }
    }
}

fn build_rewrite_messages(question: &str, history: &History) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + 2 * (REWRITE_EXAMPLES.len() + history.len()));
    messages.push(ChatMessage::system(REWRITE_SYSTEM_PROMPT));
    for (q, a) in REWRITE_EXAMPLES {
        messages.push(ChatMessage::user(q));
        messages.push(ChatMessage::assistant(a));
    }
    push_history(&mut messages, history.iter());
    messages.push(ChatMessage::user(format!(
        "Generate search query for: {question}"
    )));
    messages
}

/// The prompt tells the model to answer `0` when it cannot produce a query.
fn parse_search_query(content: &str) -> Option<String> {
    let query = content
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    if query.is_empty() || query == "0" {
        return None;
    }
    Some(query.to_string())
}

/// Strip ChatML control tokens so user text cannot open a new turn.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|im_start|>", "")
        .replace("<|im_end|>", "")
        .replace("<|endoftext|>", "")
}
