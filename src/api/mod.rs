pub mod chat;
pub mod sql;

use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Chat UI and its JSON API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/chat", post(chat::chat))
        .route("/api/sessions/{id}", get(chat::get_session))
        .with_state(state)
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}
