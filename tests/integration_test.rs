//! Integration tests for the chat pipeline.
//!
//! The completion, embedding and search services are replaced by an
//! in-process axum server on a random local port, so every test runs the
//! real HTTP clients end to end without network access.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use rag_chat::api;
use rag_chat::config::{Config, SqlEndpointConfig};
use rag_chat::history::History;
use rag_chat::llm::prompts::{ANSWER_SYSTEM_PROMPT, REWRITE_SYSTEM_PROMPT};
use rag_chat::session::ChatSession;
use rag_chat::state::AppState;

const API_KEY: &str = "test-key";
const SEARCH_KEY: &str = "search-key";

// ─── Mock services ───────────────────────────────────────

struct Scenario {
    /// Reply to the query rewrite call; `None` sends `null` content
    rewrite: Option<&'static str>,
    /// Reply to the answer call; `None` sends `null` content
    answer: Option<&'static str>,
    /// Documents returned by every search
    docs: Vec<Value>,
    search_fails: bool,
}

#[derive(Default)]
struct Recorded {
    searches: Vec<String>,
    answer_calls: Vec<Vec<Value>>,
    rerank_calls: usize,
    /// `Search Query:` line of every re-rank prompt
    rerank_queries: Vec<String>,
}

#[derive(Clone)]
struct Mock {
    scenario: Arc<Scenario>,
    recorded: Arc<Mutex<Recorded>>,
}

fn doc(id: &str, title: &str, content: &str) -> Value {
    json!({ "@search.score": 0.03, "id": id, "title": title, "content": content })
}

/// One document per re-rank behavior the mock knows about.
fn catalog() -> Vec<Value> {
    vec![
        doc("1", "Roaming", "[high] Roaming costs 5 EUR per day in the EU."),
        doc("2", "Fiber", "[low] Fiber installation takes two weeks."),
        doc("3", "Plans", "[messy] The Total plan costs 30 EUR."),
        doc("4", "Outage", "[fail] Outage map."),
        doc("5", "Travel", "[mid] Activate roaming from the app before travelling."),
    ]
}

fn scenario() -> Scenario {
    Scenario {
        rewrite: Some("roaming prices"),
        answer: Some("Roaming costs 5 EUR per day."),
        docs: catalog(),
        search_fails: false,
    }
}

fn completion(content: Option<&str>) -> Response {
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
    .into_response()
}

async fn chat_completions(
    State(mock): State<Mock>,
    Path(deployment): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if headers.get("api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let system = messages
        .first()
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();
    let last = messages
        .last()
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();

    match deployment.as_str() {
        "rerank-dep" => {
            {
                let mut recorded = mock.recorded.lock();
                recorded.rerank_calls += 1;
                let query = last
                    .lines()
                    .next()
                    .and_then(|l| l.strip_prefix("Search Query: "))
                    .unwrap_or_default();
                recorded.rerank_queries.push(query.to_string());
            }
            let text = last.split("\nText: ").nth(1).unwrap_or_default();
            if text.starts_with("[fail]") {
                (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded").into_response()
            } else if text.starts_with("[high]") {
                completion(Some(
                    r#"{"confidence": 98, "answer": "Roaming costs 5 EUR per day in the EU."}"#,
                ))
            } else if text.starts_with("[mid]") {
                completion(Some(r#"{"confidence": "92", "answer": ""}"#))
            } else if text.starts_with("[messy]") {
                completion(Some(
                    "{\n    \"confidence\": 96,\n    \"answer\": \"The \"Total\" plan costs 30 EUR.\"\n}",
                ))
            } else {
                completion(Some(r#"{"confidence": 20, "answer": "Nothing relevant."}"#))
            }
        }
        "chat-dep" if system == REWRITE_SYSTEM_PROMPT => completion(mock.scenario.rewrite),
        "chat-dep" if system == ANSWER_SYSTEM_PROMPT => {
            mock.recorded.lock().answer_calls.push(messages);
            completion(mock.scenario.answer)
        }
        _ => (StatusCode::NOT_FOUND, "unknown deployment").into_response(),
    }
}

async fn embeddings(Path(deployment): Path<String>, headers: HeaderMap) -> Response {
    if deployment != "embed-dep" || headers.get("api-key").is_none() {
        return (StatusCode::NOT_FOUND, "unknown deployment").into_response();
    }
    Json(json!({ "data": [{ "embedding": [0.1, 0.2, 0.3] }] })).into_response()
}

async fn search(
    State(mock): State<Mock>,
    Path(index): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if headers.get("api-key").and_then(|v| v.to_str().ok()) != Some(SEARCH_KEY) {
        return (StatusCode::FORBIDDEN, "bad key").into_response();
    }
    if params.get("api-version").map(String::as_str) != Some("2024-07-01") || index != "docs-index"
    {
        return (StatusCode::BAD_REQUEST, "bad request").into_response();
    }
    assert_eq!(body["vectorQueries"][0]["vector"].as_array().map(Vec::len), Some(3));

    mock.recorded
        .lock()
        .searches
        .push(body["search"].as_str().unwrap_or_default().to_string());

    if mock.scenario.search_fails {
        return (StatusCode::SERVICE_UNAVAILABLE, "index offline").into_response();
    }
    let top = body["top"].as_u64().unwrap_or(10) as usize;
    let docs: Vec<Value> = mock.scenario.docs.iter().take(top).cloned().collect();
    Json(json!({ "@odata.count": mock.scenario.docs.len(), "value": docs })).into_response()
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn start_mock(scenario: Scenario) -> (String, Arc<Mutex<Recorded>>) {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let mock = Mock {
        scenario: Arc::new(scenario),
        recorded: recorded.clone(),
    };
    let app = Router::new()
        .route(
            "/openai/deployments/{deployment}/chat/completions",
            post(chat_completions),
        )
        .route("/openai/deployments/{deployment}/embeddings", post(embeddings))
        .route("/indexes/{index}/docs/search", post(search))
        .with_state(mock);
    (spawn(app).await, recorded)
}

fn config_for(base: &str, extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("AZURE_OPENAI_ENDPOINT", base),
        ("AZURE_OPENAI_API_KEY", API_KEY),
        ("AZURE_OPENAI_API_VERSION", "2024-02-01"),
        ("AZURE_OPENAI_DEPLOYMENT_NAME", "chat-dep"),
        ("AZURE_OPENAI_EMBEDDING_DEPLOYMENT_NAME", "embed-dep"),
        ("AZURE_OPENAI_RERANK_DEPLOYMENT_NAME", "rerank-dep"),
        ("SEARCH_SERVICE_ENDPOINT", base),
        ("SEARCH_SERVICE_QUERY_KEY", SEARCH_KEY),
        ("SEARCH_INDEX_NAME_REGS", "regs-index"),
        ("SEARCH_INDEX_NAME_DOCS", "docs-index"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

async fn app_state(scenario: Scenario, extra: &[(&str, &str)]) -> (AppState, Arc<Mutex<Recorded>>) {
    let (base, recorded) = start_mock(scenario).await;
    let state = AppState::new(config_for(&base, extra)).unwrap();
    (state, recorded)
}

fn last_user_content(messages: &[Value]) -> String {
    messages
        .last()
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string()
}

// ─── Pipeline ────────────────────────────────────────────

#[tokio::test]
async fn test_full_turn_keeps_only_confident_chunks() {
    let (state, recorded) = app_state(scenario(), &[]).await;

    let outcome = state
        .pipeline
        .run("How much is roaming?", &History::with_capacity(3))
        .await;

    assert_eq!(outcome.search_query, "roaming prices");
    assert_eq!(outcome.candidates, 5);
    assert_eq!(outcome.answer, "Roaming costs 5 EUR per day.");

    // 98, 96 (parsed from malformed JSON), 92; the low score and the failed
    // call are dropped without affecting the rest.
    let ids: Vec<&str> = outcome.chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3", "5"]);
    let confidences: Vec<u8> = outcome.chunks.iter().map(|c| c.confidence).collect();
    assert_eq!(confidences, vec![98, 96, 92]);
    assert_eq!(outcome.chunks[1].answer, "The \"Total\" plan costs 30 EUR.");

    let recorded = recorded.lock();
    assert_eq!(recorded.searches, vec!["roaming prices"]);
    assert_eq!(recorded.rerank_calls, 5);
    assert_eq!(recorded.answer_calls.len(), 1);

    let prompt = last_user_content(&recorded.answer_calls[0]);
    assert!(prompt.starts_with("**Knowledge base:**\nSections: "));
    assert!(prompt.contains("Title: Roaming. Content: Roaming costs 5 EUR per day in the EU.\n"));
    // Empty excerpt falls back to the chunk content.
    assert!(prompt.contains(
        "Title: Travel. Content: [mid] Activate roaming from the app before travelling.\n"
    ));
    assert!(!prompt.contains("Fiber"));
    assert!(!prompt.contains("Outage"));
    assert!(prompt.ends_with("**Question:** How much is roaming?\nFinal Response:"));
}

#[tokio::test]
async fn test_rerank_scores_against_user_question() {
    let (state, recorded) = app_state(scenario(), &[]).await;

    let outcome = state
        .pipeline
        .run("How much is roaming?", &History::with_capacity(3))
        .await;

    assert_eq!(outcome.search_query, "roaming prices");
    let recorded = recorded.lock();
    assert_eq!(recorded.searches, vec!["roaming prices"]);
    assert_eq!(recorded.rerank_queries.len(), 5);
    assert!(recorded
        .rerank_queries
        .iter()
        .all(|q| q == "How much is roaming?"));
}

#[tokio::test]
async fn test_single_rerank_worker_still_scores_everything() {
    let (state, recorded) = app_state(scenario(), &[("RAG_MAX_RERANK_WORKERS", "1")]).await;

    let outcome = state.pipeline.run("roaming", &History::with_capacity(3)).await;

    assert_eq!(recorded.lock().rerank_calls, 5);
    assert_eq!(outcome.chunks.len(), 3);
}

#[tokio::test]
async fn test_retrieve_top_limits_candidates() {
    let (state, _recorded) = app_state(scenario(), &[("RAG_RETRIEVE_TOP", "2")]).await;

    let outcome = state.pipeline.run("roaming", &History::with_capacity(3)).await;

    assert_eq!(outcome.candidates, 2);
    let ids: Vec<&str> = outcome.chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["1"]);
}

#[tokio::test]
async fn test_rewrite_zero_searches_raw_question() {
    let (state, recorded) = app_state(
        Scenario {
            rewrite: Some("0"),
            ..scenario()
        },
        &[],
    )
    .await;

    let outcome = state.pipeline.run("hola", &History::with_capacity(3)).await;

    assert_eq!(outcome.search_query, "hola");
    assert_eq!(recorded.lock().searches, vec!["hola"]);
}

#[tokio::test]
async fn test_rewrite_without_content_searches_raw_question() {
    let (state, recorded) = app_state(
        Scenario {
            rewrite: None,
            ..scenario()
        },
        &[],
    )
    .await;

    let outcome = state.pipeline.run("What is 5G?", &History::with_capacity(3)).await;

    assert_eq!(outcome.search_query, "What is 5G?");
    assert_eq!(recorded.lock().searches, vec!["What is 5G?"]);
}

#[tokio::test]
async fn test_search_failure_still_answers_from_empty_knowledge_base() {
    let (state, recorded) = app_state(
        Scenario {
            search_fails: true,
            ..scenario()
        },
        &[],
    )
    .await;

    let outcome = state.pipeline.run("roaming", &History::with_capacity(3)).await;

    assert_eq!(outcome.candidates, 0);
    assert!(outcome.chunks.is_empty());
    assert_eq!(outcome.answer, "Roaming costs 5 EUR per day.");

    let recorded = recorded.lock();
    assert_eq!(recorded.rerank_calls, 0);
    let prompt = last_user_content(&recorded.answer_calls[0]);
    assert!(prompt.starts_with("**Knowledge base:**\nSections: \n**Question:** roaming"));
}

#[tokio::test]
async fn test_missing_answer_becomes_error_and_skips_history() {
    let (state, _recorded) = app_state(
        Scenario {
            answer: None,
            ..scenario()
        },
        &[],
    )
    .await;

    let mut session = ChatSession::new(3);
    let outcome = session.ask(&state.pipeline, "How much is roaming?").await;

    assert_eq!(outcome.answer, "ERROR");
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[1].content, "ERROR");
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_history_window_feeds_follow_up_prompts() {
    let (state, recorded) = app_state(scenario(), &[]).await;

    let mut session = ChatSession::new(3);
    for question in ["q1", "q2", "q3", "q4"] {
        session.ask(&state.pipeline, question).await;
    }

    let questions: Vec<&str> = session
        .history()
        .iter()
        .map(|t| t.question.as_str())
        .collect();
    assert_eq!(questions, vec!["q2", "q3", "q4"]);
    assert_eq!(session.messages().len(), 8);

    let recorded = recorded.lock();
    // system + 3 turns as user/assistant pairs + prompt
    let last_call = &recorded.answer_calls[3];
    assert_eq!(last_call.len(), 8);
    assert_eq!(last_call[1]["content"], "q1");
    assert_eq!(last_call[2]["content"], "Roaming costs 5 EUR per day.");
    assert!(last_user_content(last_call).contains("**Question:** q4"));
}

// ─── HTTP API ────────────────────────────────────────────

#[tokio::test]
async fn test_chat_api_keeps_session_across_requests() {
    let (state, recorded) = app_state(scenario(), &[]).await;
    let base = spawn(api::router(state)).await;
    let client = reqwest::Client::new();

    let first: Value = client
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "How much is roaming?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["answer"], "Roaming costs 5 EUR per day.");
    assert_eq!(first["search_query"], "roaming prices");
    assert_eq!(first["sources"].as_array().unwrap().len(), 3);
    assert_eq!(first["sources"][0]["title"], "Roaming");
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let second = client
        .post(format!("{base}/api/chat"))
        .json(&json!({ "session_id": session_id, "message": "And in the US?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["session_id"], session_id.as_str());

    let transcript: Value = client
        .get(format!("{base}/api/sessions/{session_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages = transcript["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "How much is roaming?");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(transcript["history"].as_array().unwrap().len(), 2);

    // The follow-up carried the first turn as context.
    let recorded = recorded.lock();
    assert_eq!(recorded.answer_calls[1].len(), 4);
}

#[tokio::test]
async fn test_overlapping_turns_on_one_session_see_each_other() {
    let (state, recorded) = app_state(scenario(), &[]).await;
    let base = spawn(api::router(state)).await;
    let client = reqwest::Client::new();

    let first: Value = client
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "q1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let send = |message: &'static str| {
        client
            .post(format!("{base}/api/chat"))
            .json(&json!({ "session_id": session_id, "message": message }))
            .send()
    };
    let (a, b) = tokio::join!(send("q2"), send("q3"));
    assert_eq!(a.unwrap().status(), 200);
    assert_eq!(b.unwrap().status(), 200);

    // Turns ran one after the other: the later one carried both earlier turns.
    let recorded = recorded.lock();
    let mut lens: Vec<usize> = recorded.answer_calls.iter().map(Vec::len).collect();
    lens.sort_unstable();
    assert_eq!(lens, vec![2, 4, 6]);
    drop(recorded);

    let transcript: Value = client
        .get(format!("{base}/api/sessions/{session_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(transcript["messages"].as_array().unwrap().len(), 6);
    assert_eq!(transcript["history"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_chat_api_rejects_bad_requests() {
    let (state, _recorded) = app_state(scenario(), &[]).await;
    let base = spawn(api::router(state)).await;
    let client = reqwest::Client::new();

    let empty = client
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);

    let unknown = client
        .post(format!("{base}/api/chat"))
        .json(&json!({
            "session_id": "00000000-0000-0000-0000-000000000000",
            "message": "hola"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);

    let missing = client
        .get(format!("{base}/api/sessions/00000000-0000-0000-0000-000000000000"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    let index = client.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(index.status(), 200);
    assert!(index.text().await.unwrap().contains("RAG Chat Demo"));
}

#[tokio::test]
async fn test_sql_endpoint_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.db");
    rusqlite::Connection::open(&db_path)
        .unwrap()
        .execute_batch(
            "CREATE TABLE tariff (name TEXT, price REAL);
             INSERT INTO tariff VALUES ('Basic', 9.5), ('Total', 30.0);",
        )
        .unwrap();

    let config = config_for(
        "http://127.0.0.1:9",
        &[
            ("SQL_QUERY_DB_PATH", db_path.to_str().unwrap()),
            ("SQL_QUERY_USER", "ops"),
            ("SQL_QUERY_PASSWORD", "hunter2"),
        ],
    );
    let base = spawn(api::sql::router(config.sql.unwrap())).await;
    let client = reqwest::Client::new();

    let denied = client
        .post(format!("{base}/sqlite-query"))
        .json(&json!({ "query": "SELECT 1", "user": "ops", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 401);
    let body: Value = denied.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Invalid credentials" }));

    let rows: Value = client
        .post(format!("{base}/sqlite-query"))
        .json(&json!({
            "query": "SELECT name, price FROM tariff ORDER BY price",
            "user": "ops",
            "password": "hunter2"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rows, json!([["Basic", 9.5], ["Total", 30.0]]));

    let broken = client
        .post(format!("{base}/sqlite-query"))
        .json(&json!({ "query": "SELECT * FROM nowhere", "user": "ops", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(broken.status(), 500);
    let body: Value = broken.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("nowhere"));
}

#[tokio::test]
async fn test_sql_endpoint_unreadable_body_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("empty.db");
    rusqlite::Connection::open(&db_path).unwrap();

    let base = spawn(api::sql::router(SqlEndpointConfig {
        bind_addr: "127.0.0.1:0".into(),
        db_path,
        user: "ops".into(),
        password: "hunter2".into(),
    }))
    .await;
    let client = reqwest::Client::new();

    let not_json = client
        .post(format!("{base}/sqlite-query"))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(not_json.status(), 500);
    let body: Value = not_json.json().await.unwrap();
    assert!(!body["error"].as_str().unwrap().is_empty());

    let wrong_type = client
        .post(format!("{base}/sqlite-query"))
        .json(&json!({ "query": 5, "user": "ops", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_type.status(), 500);
    let body: Value = wrong_type.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("query"));
}
