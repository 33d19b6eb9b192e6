//! One chat turn: rewrite → retrieve → re-rank → answer.

use crate::config::{LlmConfig, PipelineConfig};
use crate::history::History;
use crate::llm::answer::{build_knowledge_base, generate_answer};
use crate::llm::embeddings::create_embedding;
use crate::llm::query_rewrite::resolve_search_query;
use crate::llm::rerank::{rerank, select_chunks};
use crate::models::{RankedChunk, SearchResult};
use crate::search::hybrid::SearchClient;

/// Everything a single pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub search_query: String,
    pub candidates: usize,
    pub chunks: Vec<RankedChunk>,
    pub answer: String,
}

#[derive(Clone)]
pub struct RagPipeline {
    http: reqwest::Client,
    llm: LlmConfig,
    settings: PipelineConfig,
    docs: SearchClient,
}

impl RagPipeline {
    pub fn new(
        http: reqwest::Client,
        llm: LlmConfig,
        settings: PipelineConfig,
        docs: SearchClient,
    ) -> Self {
        Self {
            http,
            llm,
            settings,
            docs,
        }
    }

    pub fn settings(&self) -> &PipelineConfig {
        &self.settings
    }

    /// Answer `question` given the recent turns. Never fails: every stage
    /// degrades to its fallback value instead.
    pub async fn run(&self, question: &str, history: &History) -> PipelineOutcome {
        let search_query = resolve_search_query(&self.http, &self.llm, question, history).await;

        let results = self.retrieve(&search_query).await;
        let candidates = results.len();
        tracing::info!("query: {search_query}, candidates: {candidates}");

        // Relevance is judged against what the user asked, not the rewrite.
        let ranked = rerank(
            &self.http,
            &self.llm,
            results,
            question,
            self.settings.max_rerank_workers,
        )
        .await;
        let chunks = select_chunks(
            ranked,
            self.settings.confidence_threshold,
            self.settings.max_generate,
        );
        tracing::info!(
            "Kept {} of {candidates} chunks at confidence >= {}",
            chunks.len(),
            self.settings.confidence_threshold
        );

        let knowledge_base = build_knowledge_base(&chunks);
        let answer = generate_answer(&self.http, &self.llm, &knowledge_base, question, history).await;

        PipelineOutcome {
            search_query,
            candidates,
            chunks,
            answer,
        }
    }

    /// Hybrid search with the query's embedding. Any failure is an empty
    /// candidate set.
    pub async fn retrieve(&self, query: &str) -> Vec<SearchResult> {
        retrieve_from(&self.http, &self.llm, &self.docs, query, self.settings.retrieve_top).await
    }
}

/// Embed `query` and run it against `index`. Errors are logged and become
/// an empty result set.
pub async fn retrieve_from(
    http: &reqwest::Client,
    llm: &LlmConfig,
    index: &SearchClient,
    query: &str,
    top: usize,
) -> Vec<SearchResult> {
    let embedding = match create_embedding(http, llm, query).await {
        Ok(embedding) => embedding,
        Err(e) => {
            tracing::warn!("Embedding failed, skipping retrieval: {e:#}");
            return Vec::new();
        }
    };

    match index.semantic_hybrid_search(query, embedding, top).await {
        Ok((results, total)) => {
            tracing::debug!(
                "Index {} matched {} documents",
                index.index_name(),
                total.map_or_else(|| "?".to_string(), |t| t.to_string())
            );
            results
        }
        Err(e) => {
            tracing::warn!("Hybrid search on {} failed: {e:#}", index.index_name());
            Vec::new()
        }
    }
}
