pub mod answer;
pub mod completion;
pub mod embeddings;
pub mod prompts;
pub mod query_rewrite;
pub mod rerank;
