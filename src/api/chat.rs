use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::llm::query_rewrite::sanitize_for_prompt;
use crate::models::{ChatRequest, ChatResponse, SessionResponse, SourceRef};
use crate::session::ChatSession;
use crate::state::{AppState, SharedSession};

const MAX_CHAT_MESSAGE_LEN: usize = 2000;

/// POST /api/chat - run one RAG turn for a session.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    // ── Step 1: Validate and sanitize input ───────────────
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is required".to_string()));
    }
    let message = sanitize_for_prompt(&truncate_to_char_boundary(message, MAX_CHAT_MESSAGE_LEN));

    // ── Step 2: Resolve the session ───────────────────────
    let (session_id, session) = {
        let mut sessions = state.sessions.write();
        match req.session_id {
            Some(id) => match sessions.get(&id) {
                Some(session) => (id, session.clone()),
                None => return Err((StatusCode::NOT_FOUND, "Session not found".to_string())),
            },
            None => {
                let id = Uuid::new_v4();
                let session: SharedSession = Arc::new(Mutex::new(ChatSession::new(
                    state.config.pipeline.history_turns,
                )));
                sessions.insert(id, session.clone());
                tracing::info!("Opened chat session {id}");
                (id, session)
            }
        }
    };

    // ── Step 3: Run the turn ──────────────────────────────
    // Overlapping requests on one session queue here; the map lock is free.
    let outcome = {
        let mut session = session.lock().await;
        session.ask(&state.pipeline, &message).await
    };

    let sources = outcome
        .chunks
        .iter()
        .map(|c| SourceRef {
            id: c.id.clone(),
            title: c.title.clone(),
            confidence: c.confidence,
        })
        .collect();

    Ok(Json(ChatResponse {
        session_id,
        answer: outcome.answer,
        search_query: outcome.search_query,
        sources,
    }))
}

/// GET /api/sessions/{id} - full transcript and current history window.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let session = state
        .sessions
        .read()
        .get(&id)
        .cloned()
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Session not found".to_string()))?;
    let session = session.lock().await;
    Ok(Json(SessionResponse {
        session_id: id,
        messages: session.messages().to_vec(),
        history: session.history().to_vec(),
    }))
}

fn truncate_to_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    s.char_indices()
        .take_while(|(i, _)| *i < max_len)
        .map(|(_, c)| c)
        .collect()
}
