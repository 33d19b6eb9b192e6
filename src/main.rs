use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rag_chat::api;
use rag_chat::config::{Config, SqlEndpointConfig};
use rag_chat::pipeline::retrieve_from;
use rag_chat::repl;
use rag_chat::search::hybrid::show_results;
use rag_chat::state::{AppState, IndexKind};

/// Retrieval-augmented chat over a hosted hybrid search index.
#[derive(Parser, Debug)]
#[command(name = "rag-chat", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the web chat UI (default)
    Serve {
        /// Override RAG_CHAT_BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
    },
    /// Chat in the terminal
    Chat,
    /// Run a single hybrid search and print the raw results
    Search {
        query: String,
        #[arg(long, value_enum, default_value = "docs")]
        index: IndexKind,
        #[arg(long)]
        top: Option<usize>,
    },
    /// Serve the raw SQL query endpoint
    SqlEndpoint,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let config = load_config()?;
            let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
            let state = AppState::new(config)?;
            let app = api::router(state);

            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            tracing::info!("Chat UI listening on http://{bind_addr}");
            axum::serve(listener, app).await?;
        }
        Command::Chat => {
            let state = AppState::new(load_config()?)?;
            repl::run_interactive(state.pipeline.clone()).await?;
        }
        Command::Search { query, index, top } => {
            let config = load_config()?;
            let top = top.unwrap_or(config.pipeline.retrieve_top);
            let state = AppState::new(config)?;
            let client = state.search_client(index);
            let results =
                retrieve_from(&state.http_client, &state.config.llm, &client, &query, top).await;
            tracing::info!("query: {query}, num results: {}", results.len());
            println!("Hybrid Search Results: {}", show_results(&results));
        }
        // Independent of the model and search services: only SQL_QUERY_* is read.
        Command::SqlEndpoint => serve_sql_endpoint().await?,
    }

    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::from_env()?;
    config.log_summary();
    Ok(config)
}

async fn serve_sql_endpoint() -> anyhow::Result<()> {
    let sql = SqlEndpointConfig::from_env()?.ok_or_else(|| {
        anyhow::anyhow!(
            "SQL endpoint not configured: set SQL_QUERY_DB_PATH, SQL_QUERY_USER and SQL_QUERY_PASSWORD"
        )
    })?;
    let bind_addr = sql.bind_addr.clone();
    tracing::info!("SQL endpoint database: {}", sql.db_path.display());
    let app = api::sql::router(sql);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("SQL endpoint listening on http://{bind_addr}/sqlite-query");
    axum::serve(listener, app).await?;
    Ok(())
}
