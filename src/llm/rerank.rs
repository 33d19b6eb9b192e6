use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::LlmConfig;
use crate::llm::completion::{complete, ChatMessage};
use crate::llm::prompts::RERANK_SYSTEM_PROMPT;
use crate::models::{RankedChunk, SearchResult};

/// Score every candidate against `query` with one model call each.
///
/// Calls run concurrently, at most `max_workers` at a time. A failed call
/// yields confidence 0 for its candidate and never affects the others.
/// Output order is completion order.
pub async fn rerank(
    client: &reqwest::Client,
    config: &LlmConfig,
    results: Vec<SearchResult>,
    query: &str,
    max_workers: usize,
) -> Vec<RankedChunk> {
    if results.is_empty() {
        return Vec::new();
    }

    let workers = results.len().min(max_workers).max(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for result in results {
        let client = client.clone();
        let config = config.clone();
        let query = query.to_string();
        let sem = semaphore.clone();

        tasks.spawn(async move {
            let _permit = sem.acquire_owned().await;
            calculate_rank(&client, &config, result, &query).await
        });
    }

    let mut ranked = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(chunk) => {
                tracing::debug!(
                    "Ranked id={} title={:?} confidence={}",
                    chunk.id,
                    chunk.title,
                    chunk.confidence
                );
                ranked.push(chunk);
            }
            Err(e) => tracing::warn!("Re-rank task aborted: {e}"),
        }
    }
    ranked
}

/// Keep chunks at or above `threshold`, best first, at most `max`.
pub fn select_chunks(chunks: Vec<RankedChunk>, threshold: u8, max: usize) -> Vec<RankedChunk> {
    let mut kept: Vec<RankedChunk> = chunks
        .into_iter()
        .filter(|c| c.confidence >= threshold)
        .collect();
    kept.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    kept.truncate(max);
    kept
}

/// Ask the re-rank deployment how relevant `result` is to `query` and for
/// the excerpt that supports it.
pub async fn calculate_rank(
    client: &reqwest::Client,
    config: &LlmConfig,
    result: SearchResult,
    query: &str,
) -> RankedChunk {
    let messages = [
        ChatMessage::system(RERANK_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Search Query: {query}\nText: {}\n",
            result.content
        )),
    ];

    let (confidence, answer) =
        match complete(client, config, &config.rerank_deployment, &messages, 0.0, 800).await {
            Some(response) => parse_rank_response(&response),
            None => (0, String::new()),
        };

    RankedChunk {
        id: result.id,
        title: result.title,
        content: result.content,
        confidence,
        answer,
    }
}

#[derive(Deserialize)]
struct RankResponse {
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    answer: Option<String>,
}

static CONFIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)confidence"\s*:\s*(.*?),"#).expect("confidence pattern is valid")
});

static ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)answer"\s*:\s*(.*?)\n\s*\}"#).expect("answer pattern is valid")
});

/// Extract `(confidence, answer)` from a re-rank reply.
///
/// Models do not always return valid JSON (trailing commas, unescaped
/// quotes), so after the JSON attempts the fields are cut out by their
/// delimiters instead.
fn parse_rank_response(content: &str) -> (u8, String) {
    if let Ok(v) = serde_json::from_str::<RankResponse>(content) {
        return from_json(v);
    }

    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<RankResponse>(&content[start..=end]) {
                return from_json(v);
            }
        }
    }

    let confidence = CONFIDENCE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_confidence_str(m.as_str()))
        .unwrap_or(0);
    let answer = ANSWER_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| strip_quotes(m.as_str()).to_string())
        .unwrap_or_default();
    (confidence, answer)
}

fn from_json(v: RankResponse) -> (u8, String) {
    let confidence = match v.confidence {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(clamp_confidence),
        Some(serde_json::Value::String(s)) => parse_confidence_str(&s),
        _ => None,
    }
    .unwrap_or(0);
    (confidence, v.answer.unwrap_or_default())
}

fn parse_confidence_str(raw: &str) -> Option<u8> {
    strip_quotes(raw)
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .map(clamp_confidence)
}

fn clamp_confidence(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches('"').trim()
}
