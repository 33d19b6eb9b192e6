use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One answered question, kept for follow-up prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// A document returned by the hybrid search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub content: String,
    /// `@search.score` as reported by the service
    pub score: f64,
    /// Semantic ranker score, when the service returned one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_score: Option<f64>,
}

/// A search result after LLM re-ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    pub id: String,
    pub title: String,
    pub content: String,
    /// 0-100
    pub confidence: u8,
    /// Excerpt of `content` relevant to the query
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A rendered conversation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Omitted on the first message; the server then opens a new session
    pub session_id: Option<Uuid>,
    pub message: String,
}

/// Chat response
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub answer: String,
    pub search_query: String,
    pub sources: Vec<SourceRef>,
}

/// A chunk that made it into the answer prompt
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub id: String,
    pub title: String,
    pub confidence: u8,
}

/// Session transcript response
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub messages: Vec<ConversationMessage>,
    pub history: Vec<Turn>,
}

/// Raw SQL request for the query endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SqlQueryRequest {
    pub query: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}
