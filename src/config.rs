use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chat server bind address
    pub bind_addr: String,
    /// Completion and embedding service configuration
    pub llm: LlmConfig,
    /// Hosted search service configuration
    pub search: SearchConfig,
    /// Retrieval and re-ranking limits
    pub pipeline: PipelineConfig,
    /// Raw SQL query endpoint, mounted only when configured
    pub sql: Option<SqlEndpointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "azure" or "openai"
    pub provider: String,
    /// Base URL of the completion/embedding service
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Only used by the "azure" provider
    pub api_version: String,
    /// Deployment (or model name) used for query rewriting and answers
    pub chat_deployment: String,
    /// Deployment used for embeddings
    pub embedding_deployment: String,
    /// Deployment used for per-candidate re-ranking
    pub rerank_deployment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub api_version: String,
    /// Regulations index
    pub index_regs: String,
    /// Documents index, the one the chat pipeline queries
    pub index_docs: String,
}

/// Limits for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Candidates requested from the search index
    pub retrieve_top: usize,
    /// Minimum re-rank confidence (0-100) for a chunk to reach the answer prompt
    pub confidence_threshold: u8,
    /// Maximum chunks handed to the answer prompt
    pub max_generate: usize,
    /// Upper bound on concurrent re-rank calls
    pub max_rerank_workers: usize,
    /// Question/answer turns kept for follow-up prompts
    pub history_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlEndpointConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieve_top: 10,
            confidence_threshold: 90,
            max_generate: 10,
            max_rerank_workers: 70,
            history_turns: 3,
        }
    }
}

impl Config {
    /// Load configuration from the process environment, reading a `.env`
    /// file first when one can be found.
    pub fn from_env() -> Result<Self> {
        load_dotenv()?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Missing required environment variable {key}"))
        };

        let llm = LlmConfig {
            provider: lookup("LLM_PROVIDER").unwrap_or_else(|| "azure".to_string()),
            endpoint: trim_url(required("AZURE_OPENAI_ENDPOINT")?),
            api_key: required("AZURE_OPENAI_API_KEY")?,
            api_version: required("AZURE_OPENAI_API_VERSION")?,
            chat_deployment: required("AZURE_OPENAI_DEPLOYMENT_NAME")?,
            embedding_deployment: required("AZURE_OPENAI_EMBEDDING_DEPLOYMENT_NAME")?,
            rerank_deployment: required("AZURE_OPENAI_RERANK_DEPLOYMENT_NAME")?,
        };
        match llm.provider.as_str() {
            "azure" | "openai" => {}
            other => anyhow::bail!("Unsupported LLM_PROVIDER: {other}"),
        }

        let search = SearchConfig {
            endpoint: trim_url(required("SEARCH_SERVICE_ENDPOINT")?),
            api_key: required("SEARCH_SERVICE_QUERY_KEY")?,
            api_version: lookup("SEARCH_API_VERSION").unwrap_or_else(|| "2024-07-01".to_string()),
            index_regs: required("SEARCH_INDEX_NAME_REGS")?,
            index_docs: required("SEARCH_INDEX_NAME_DOCS")?,
        };

        let mut pipeline = PipelineConfig::default();
        if let Some(v) = parse_var(&lookup, "RAG_RETRIEVE_TOP")? {
            pipeline.retrieve_top = v;
        }
        if let Some(v) = parse_var::<u8, _>(&lookup, "RAG_CONFIDENCE_THRESHOLD")? {
            pipeline.confidence_threshold = v.min(100);
        }
        if let Some(v) = parse_var(&lookup, "RAG_MAX_GENERATE")? {
            pipeline.max_generate = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "RAG_MAX_RERANK_WORKERS")? {
            pipeline.max_rerank_workers = v.max(1);
        }
        if let Some(v) = parse_var(&lookup, "RAG_HISTORY_TURNS")? {
            pipeline.history_turns = v;
        }

        let sql = SqlEndpointConfig::from_lookup(&lookup)?;

        Ok(Self {
            bind_addr: lookup("RAG_CHAT_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8501".to_string()),
            llm,
            search,
            pipeline,
            sql,
        })
    }

    /// Log the non-secret parts of the configuration.
    pub fn log_summary(&self) {
        tracing::info!("LLM provider: {} ({})", self.llm.provider, self.llm.endpoint);
        tracing::info!("Chat deployment: {}", self.llm.chat_deployment);
        tracing::info!("Embedding deployment: {}", self.llm.embedding_deployment);
        tracing::info!("Rerank deployment: {}", self.llm.rerank_deployment);
        tracing::info!("Search endpoint: {}", self.search.endpoint);
        tracing::info!(
            "Search indexes: regs={} docs={}",
            self.search.index_regs,
            self.search.index_docs
        );
    }
}

impl SqlEndpointConfig {
    /// Load only the `SQL_QUERY_*` block. The endpoint needs none of the
    /// model or search settings.
    pub fn from_env() -> Result<Option<Self>> {
        load_dotenv()?;
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// All-or-nothing: `None` when no SQL variable is set, an error when
    /// only some of them are.
    pub fn from_lookup<F>(lookup: &F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        match (
            lookup("SQL_QUERY_DB_PATH"),
            lookup("SQL_QUERY_USER"),
            lookup("SQL_QUERY_PASSWORD"),
        ) {
            (None, None, None) => Ok(None),
            (Some(db_path), Some(user), Some(password)) => Ok(Some(Self {
                bind_addr: lookup("SQL_QUERY_BIND_ADDR")
                    .unwrap_or_else(|| "127.0.0.1:5000".to_string()),
                db_path: PathBuf::from(db_path),
                user,
                password,
            })),
            _ => anyhow::bail!(
                "SQL_QUERY_DB_PATH, SQL_QUERY_USER and SQL_QUERY_PASSWORD must be set together"
            ),
        }
    }
}

fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e).context("Failed to read .env file"),
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {key} ({raw}): {e}")),
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
