use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::pipeline::RagPipeline;
use crate::search::hybrid::SearchClient;
use crate::session::ChatSession;

/// One conversation. Turns on the same session run one at a time so every
/// answer sees the turns before it.
pub type SharedSession = Arc<tokio::sync::Mutex<ChatSession>>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub pipeline: RagPipeline,
    pub sessions: Arc<RwLock<HashMap<Uuid, SharedSession>>>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = build_http_client()?;
        let docs = SearchClient::new(
            http_client.clone(),
            &config.search,
            &config.search.index_docs,
        );
        let pipeline = RagPipeline::new(
            http_client.clone(),
            config.llm.clone(),
            config.pipeline.clone(),
            docs,
        );

        Ok(Self {
            config,
            http_client,
            pipeline,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Search client for either configured index.
    pub fn search_client(&self, index: IndexKind) -> SearchClient {
        let name = match index {
            IndexKind::Docs => &self.config.search.index_docs,
            IndexKind::Regs => &self.config.search.index_regs,
        };
        SearchClient::new(self.http_client.clone(), &self.config.search, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum IndexKind {
    Docs,
    Regs,
}

pub fn build_http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()?)
}
