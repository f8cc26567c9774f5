use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use piazza_reader::cache::{PostCache, SystemClock};
use piazza_reader::cli::{forward_ctrl_c, App};
use piazza_reader::config::Config;
use piazza_reader::embedding::{EmbeddingIndex, OpenAiEmbeddings};
use piazza_reader::fetcher::PageFetcher;
use piazza_reader::forum::{ForumClient, PiazzaClient};
use piazza_reader::search::QueryEngine;
use piazza_reader::text::{HtmlToText, ScraperText};
use piazza_reader::thread::ThreadFlattener;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
    // Ctrl-C at a prompt leaves a stdin read on a blocking thread, which would
    // hold up runtime shutdown until the next Enter.
    std::process::exit(0);
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(api_url = %config.api_url, page_size = config.page_size, "Configuration loaded");

    let piazza = PiazzaClient::new(&config.api_url).context("Failed to build forum client")?;
    piazza
        .login(&config.email, &config.password)
        .await
        .context("Failed to log in")?;
    info!("Logged in");
    let client: Arc<dyn ForumClient> = Arc::new(piazza);

    let index = if config.wants_embeddings() {
        let url = config.embedding_api_url.clone();
        let key = config.embedding_api_key.clone().unwrap_or_default();
        let model = config.embedding_model.clone();
        info!(model = %model, "Semantic search enabled, provider loads on first search");
        EmbeddingIndex::lazy(move || async move {
            OpenAiEmbeddings::connect(&url, &key, &model).await
        })
    } else {
        info!("Semantic search disabled, using keyword search");
        EmbeddingIndex::unavailable()
    };

    let text: Arc<dyn HtmlToText> = Arc::new(ScraperText);
    let cache = Arc::new(PostCache::new(config.cache_expiry, Arc::new(SystemClock)));
    let fetcher = PageFetcher::new(Arc::clone(&client), config.page_size);
    let engine = QueryEngine::new(
        Arc::clone(&cache),
        Arc::new(index),
        fetcher,
        Arc::clone(&text),
        config.top_k,
    );

    let mut app = App::new(
        client,
        cache,
        engine,
        ThreadFlattener::new(text),
        config.window_size,
    );
    app.load_courses().await.context("Failed to load courses")?;

    let ctrl_c = forward_ctrl_c(app.interrupt_handle());
    let result = app
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await;
    ctrl_c.abort();
    result?;

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,piazza_reader=info"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    // Logs go to stderr so they never interleave with the shell on stdout
    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
