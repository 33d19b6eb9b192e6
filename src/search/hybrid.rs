use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::models::SearchResult;

const EMBEDDING_FIELDS: &str = "embeddingTitle, embeddingContent";
const SELECT_FIELDS: &str = "id, title, content";
const SEMANTIC_CONFIGURATION: &str = "semantic-config";

/// Client for one index of the hosted search service.
#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    index_name: String,
}

impl SearchClient {
    pub fn new(http: reqwest::Client, config: &SearchConfig, index_name: &str) -> Self {
        Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            index_name: index_name.to_string(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Run one lexical + vector + semantic query.
    ///
    /// `embedding` is the query's vector; `top` bounds both the nearest
    /// neighbours and the returned documents. Also returns the total match
    /// count when the service reports it.
    pub async fn semantic_hybrid_search(
        &self,
        query: &str,
        embedding: Vec<f32>,
        top: usize,
    ) -> Result<(Vec<SearchResult>, Option<u64>)> {
        let url = format!("{}/indexes/{}/docs/search", self.endpoint, self.index_name);

        let req = build_search_request(query, embedding, top);

        let resp = self
            .http
            .post(&url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .context("Failed to call search API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Search API returned {status}: {body}");
        }

        let body: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse search response")?;

        Ok((body.value.into_iter().map(SearchResult::from).collect(), body.count))
    }
}

/// Render results the way the `search` command prints them.
pub fn show_results(results: &[SearchResult]) -> String {
    let rows: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "title": r.title,
                "content": r.content,
                "score": r.score,
            })
        })
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_default()
}

fn build_search_request(query: &str, embedding: Vec<f32>, top: usize) -> SearchRequest<'_> {
    SearchRequest {
        search: query,
        vector_queries: vec![VectorQuery {
            kind: "vector",
            vector: embedding,
            k: top,
            fields: EMBEDDING_FIELDS,
        }],
        select: SELECT_FIELDS,
        query_type: "semantic",
        semantic_configuration: SEMANTIC_CONFIGURATION,
        captions: "extractive",
        answers: "extractive",
        count: true,
        top,
    }
}

// ─── Wire types ──────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    search: &'a str,
    vector_queries: Vec<VectorQuery>,
    select: &'static str,
    query_type: &'static str,
    semantic_configuration: &'static str,
    captions: &'static str,
    answers: &'static str,
    count: bool,
    top: usize,
}

#[derive(Serialize)]
struct VectorQuery {
    kind: &'static str,
    vector: Vec<f32>,
    k: usize,
    fields: &'static str,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "@odata.count")]
    count: Option<u64>,
    #[serde(default)]
    value: Vec<SearchDocument>,
}

#[derive(Deserialize)]
struct SearchDocument {
    id: serde_json::Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(rename = "@search.score", default)]
    score: f64,
    #[serde(rename = "@search.rerankerScore", default)]
    reranker_score: Option<f64>,
}

impl From<SearchDocument> for SearchResult {
    fn from(doc: SearchDocument) -> Self {
        // Index keys are strings, but tolerate numeric ids.
        let id = match doc.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        SearchResult {
            id,
            title: doc.title.unwrap_or_default(),
            content: doc.content.unwrap_or_default(),
            score: doc.score,
            reranker_score: doc.reranker_score,
        }
    }
}
