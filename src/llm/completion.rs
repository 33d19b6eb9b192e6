use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::models::Turn;

/// A single chat-completion message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Append every history turn as a user/assistant pair.
pub fn push_history<'a>(messages: &mut Vec<ChatMessage>, history: impl Iterator<Item = &'a Turn>) {
    for turn in history {
        messages.push(ChatMessage::user(turn.question.clone()));
        messages.push(ChatMessage::assistant(turn.answer.clone()));
    }
}

/// Call the chat-completion API and return the first choice's content.
///
/// Never fails: transport errors, error statuses, malformed bodies and
/// `null` content all come back as `None`, logged at `warn`.
pub async fn complete(
    client: &reqwest::Client,
    config: &LlmConfig,
    deployment: &str,
    messages: &[ChatMessage],
    temperature: f32,
    max_tokens: u32,
) -> Option<String> {
    match try_complete(client, config, deployment, messages, temperature, max_tokens).await {
        Ok(Some(content)) => Some(content),
        Ok(None) => {
            tracing::warn!("Chat completion from {deployment} returned no content");
            None
        }
        Err(e) => {
            tracing::warn!("Chat completion from {deployment} failed: {e:#}");
            None
        }
    }
}

async fn try_complete(
    client: &reqwest::Client,
    config: &LlmConfig,
    deployment: &str,
    messages: &[ChatMessage],
    temperature: f32,
    max_tokens: u32,
) -> Result<Option<String>> {
    tracing::debug!(
        "Chat completion request to {deployment}: {}",
        serde_json::to_string_pretty(messages).unwrap_or_default()
    );

    let req = ChatCompletionRequest {
        model: (config.provider == "openai").then(|| deployment.to_string()),
        messages,
        temperature,
        max_tokens,
    };

    let request = match config.provider.as_str() {
        "azure" => client
            .post(format!(
                "{}/openai/deployments/{deployment}/chat/completions",
                config.endpoint
            ))
            .query(&[("api-version", config.api_version.as_str())])
            .header("api-key", &config.api_key),
        "openai" => client
            .post(format!("{}/v1/chat/completions", config.endpoint))
            .bearer_auth(&config.api_key),
        other => anyhow::bail!("Unknown LLM provider: {other}"),
    };

    let resp = request
        .json(&req)
        .send()
        .await
        .context("Failed to call chat completion API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Chat completion API returned {status}: {body}");
    }

    let body: ChatCompletionResponse = resp
        .json()
        .await
        .context("Failed to parse chat completion response")?;

    Ok(body.choices.into_iter().next().and_then(|c| c.message.content))
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
