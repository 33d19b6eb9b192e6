//! # rag-chat
//!
//! A retrieval-augmented chat assistant. Each question is rewritten into a
//! standalone search query, run against a hosted hybrid (keyword + vector +
//! semantic) search index, filtered by per-document LLM relevance scoring,
//! and answered from the surviving excerpts only.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────────────┐
//!            │ Question + last 3 turns  │
//!            └────────────┬─────────────┘
//!                         ▼
//!            ┌──────────────────────────┐
//!            │      Query Rewrite       │
//!            │ (LLM, falls back to raw) │
//!            └────────────┬─────────────┘
//!                         ▼
//!            ┌──────────────────────────┐
//!            │   Embed + Hybrid Search  │
//!            │  text + vector, top 10   │
//!            └────────────┬─────────────┘
//!                         │ candidates
//!        ┌────────────────┼────────────────┐
//!        ▼                ▼                ▼
//!  ┌───────────┐    ┌───────────┐    ┌───────────┐
//!  │ LLM score │    │ LLM score │    │ LLM score │   concurrent,
//!  │ + excerpt │    │ + excerpt │    │ + excerpt │   bounded
//!  └─────┬─────┘    └─────┬─────┘    └─────┬─────┘
//!        └────────────────┼────────────────┘
//!                         ▼
//!            ┌──────────────────────────┐
//!            │ Keep confidence >= 90    │
//!            │ sort desc, at most 10    │
//!            └────────────┬─────────────┘
//!                         ▼
//!            ┌──────────────────────────┐
//!            │  Grounded Answer (LLM)   │
//!            │  "ERROR" when it fails   │
//!            └──────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the services and pipeline knobs
//! - [`models`] - Shared data types: `SearchResult`, `RankedChunk`, `Turn`, request/response types
//! - [`history`] - Bounded conversation window (FIFO, three turns by default)
//! - [`search::hybrid`] - Semantic hybrid search against the hosted index
//! - [`llm::embeddings`] - Embedding generation with token-limit truncation
//! - [`llm::query_rewrite`] - Context-aware search query rewriting
//! - [`llm::rerank`] - Concurrent per-document relevance scoring and selection
//! - [`llm::answer`] - Knowledge base assembly and grounded answer generation
//! - [`pipeline`] - One full chat turn wired end to end
//! - [`session`] - Per-user transcript plus history
//! - [`api`] - Axum handlers for the chat UI and the SQL query endpoint
//! - [`repl`] - Terminal chat loop
//! - [`state`] - Shared application state

pub mod api;
pub mod config;
pub mod history;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod repl;
pub mod search;
pub mod session;
pub mod state;
