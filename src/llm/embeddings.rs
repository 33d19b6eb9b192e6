use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

use crate::config::LlmConfig;

/// Input limit of the embedding models, in `cl100k_base` tokens.
const MAX_EMBED_TOKENS: usize = 8191;

fn encoding() -> Option<&'static CoreBPE> {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!("cl100k_base unavailable, embedding input will not be cut: {e}");
            None
        }
    })
    .as_ref()
}

/// Cut `text` to at most `MAX_EMBED_TOKENS` tokens.
pub fn cut_max_tokens(text: &str) -> Cow<'_, str> {
    let Some(bpe) = encoding() else {
        return Cow::Borrowed(text);
    };
    let tokens = bpe.encode_with_special_tokens(text);
    if tokens.len() <= MAX_EMBED_TOKENS {
        return Cow::Borrowed(text);
    }
    tracing::info!("Cutting embedding input from {} tokens", tokens.len());
    match bpe.decode(tokens[..MAX_EMBED_TOKENS].to_vec()) {
        Ok(cut) => Cow::Owned(cut),
        Err(e) => {
            tracing::warn!("Failed to decode cut tokens, sending full text: {e}");
            Cow::Borrowed(text)
        }
    }
}

/// Generate the embedding for a single text.
pub async fn create_embedding(
    client: &reqwest::Client,
    config: &LlmConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let input = cut_max_tokens(text);

    let req = EmbedRequest {
        model: (config.provider == "openai").then(|| config.embedding_deployment.clone()),
        input: vec![input.as_ref()],
    };

    let request = match config.provider.as_str() {
        "azure" => client
            .post(format!(
                "{}/openai/deployments/{}/embeddings",
                config.endpoint, config.embedding_deployment
            ))
            .query(&[("api-version", config.api_version.as_str())])
            .header("api-key", &config.api_key),
        "openai" => client
            .post(format!("{}/v1/embeddings", config.endpoint))
            .bearer_auth(&config.api_key),
        other => anyhow::bail!("Unknown LLM provider: {other}"),
    };

    let resp = request
        .json(&req)
        .send()
        .await
        .context("Failed to call embeddings API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Embeddings API returned {status}: {body}");
    }

    let body: EmbedResponse = resp
        .json()
        .await
        .context("Failed to parse embeddings response")?;

    body.data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .context("No embedding returned")
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}
