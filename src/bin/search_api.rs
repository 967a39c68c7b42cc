use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use classic_index::config::{init_tracing, EmbeddingArgs, StoreArgs};
use classic_index::server::{router, AppState};
use classic_index::VectorStore;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "classic-search-api",
    about = "HTTP API for semantic search over imported classic texts"
)]
struct ApiCli {
    /// Host to bind the HTTP server to
    #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the HTTP server to
    #[arg(long, env = "API_PORT", default_value_t = 8000)]
    port: u16,

    /// Maximum top_k honoured per request
    #[arg(long, env = "SEARCH_MAX_TOP_K", default_value_t = 100)]
    max_top_k: usize,

    #[command(flatten)]
    embedding: EmbeddingArgs,

    #[command(flatten)]
    store: StoreArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ApiCli::parse();
    init_tracing();

    let collection = cli.store.collection_name()?;
    let embedder = Arc::new(cli.embedding.build()?);

    info!(uri = %cli.store.uri, "connecting to vector store");
    let store: Option<Arc<dyn VectorStore>> = match cli.store.connect().await {
        Ok(client) => {
            info!("vector store connected");
            Some(Arc::new(client) as Arc<dyn VectorStore>)
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "vector store unavailable; search endpoints will answer 503");
            None
        }
    };
    let state = AppState::new(embedder, store, collection, cli.max_top_k);
    let app = router(state);

    let listener = bind(&cli.host, cli.port).await?;
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("classic-search-api listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    info!("vector store connection closed");
    Ok(())
}

/// Binds `host:port`, resolving hostnames such as `localhost` and bare IPv6 hosts.
async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))
}

async fn shutdown_signal() {
    wait_for(tokio::signal::ctrl_c()).await;
}

/// Resolves when `signal` fires. A signal that cannot be installed never resolves.
async fn wait_for<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(err) = signal.await {
        warn!(error = %err, "failed to listen for shutdown signal; serving until killed");
        std::future::pending::<()>().await;
    }
}
