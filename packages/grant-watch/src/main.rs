//! Grant Watch CLI
//!
//! Registers sources, runs monitoring passes and inspects stored changes.
//! Every command prints JSON on stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use grant_watch::{
    AppConfig, ChangeDetector, ContentExtractor, CrawlFrontier, DetectorConfig, ExtractorConfig,
    HttpFetcher, MonitorConfig, MonitoredSource, MonitoringCycle, OllamaSummarizer, SourceKind,
    SourceStore, SqliteStore,
};

#[derive(Parser)]
#[command(name = "grant-watch")]
#[command(about = "Monitor grant and subsidy pages for meaningful changes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a page to monitor
    Add {
        /// foundation, public_body or other
        kind: String,
        name: String,
        url: String,
    },

    /// List registered sources
    List,

    /// Run one monitoring pass over all enabled sources
    Check {
        /// Crawl each source instead of fetching only its page
        #[arg(long)]
        deep: bool,

        /// Link depth for deep crawls
        #[arg(long)]
        max_depth: Option<usize>,

        /// Skip due sublinks
        #[arg(long)]
        no_sublinks: bool,
    },

    /// Crawl a URL without storing anything
    Crawl {
        url: String,
        #[arg(long, default_value_t = 2)]
        max_depth: usize,
        #[arg(long, default_value_t = 30)]
        max_pages: usize,
    },

    /// List downloadable documents linked from a page
    Documents { url: String },

    /// Show stored changes for a source, newest first
    Changes { source_id: Uuid },

    /// Show sublinks registered for a source
    Sublinks { source_id: Uuid },
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,grant_watch=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Add { kind, name, url } => cmd_add(&config, &kind, name, url).await,
        Commands::List => cmd_list(&config).await,
        Commands::Check {
            deep,
            max_depth,
            no_sublinks,
        } => cmd_check(&config, deep, max_depth, !no_sublinks).await,
        Commands::Crawl {
            url,
            max_depth,
            max_pages,
        } => cmd_crawl(&config, &url, max_depth, max_pages).await,
        Commands::Documents { url } => cmd_documents(&config, &url).await,
        Commands::Changes { source_id } => cmd_changes(&config, source_id).await,
        Commands::Sublinks { source_id } => cmd_sublinks(&config, source_id).await,
    }
}

async fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    SqliteStore::new(&config.database_url)
        .await
        .context("Failed to open database")
}

fn frontier(config: &AppConfig) -> CrawlFrontier<HttpFetcher> {
    CrawlFrontier::new(
        HttpFetcher::new(&config.crawl),
        ContentExtractor::new(&config.keywords, ExtractorConfig::default()),
        config.crawl.clone(),
    )
}

async fn cmd_add(config: &AppConfig, kind: &str, name: String, url: String) -> Result<()> {
    let Some(kind) = SourceKind::parse(kind) else {
        bail!("Unknown source kind '{}' (expected foundation, public_body or other)", kind);
    };
    if url::Url::parse(&url).is_err() {
        bail!("Invalid URL: {}", url);
    }

    let store = open_store(config).await?;
    let source = MonitoredSource::new(kind, name, url);
    store.add_source(&source).await?;
    output(&source)
}

async fn cmd_list(config: &AppConfig) -> Result<()> {
    let store = open_store(config).await?;
    output(&store.list_sources(false).await?)
}

async fn cmd_check(
    config: &AppConfig,
    deep: bool,
    max_depth: Option<usize>,
    include_sublinks: bool,
) -> Result<()> {
    let store = open_store(config).await?;

    let mut crawl = config.crawl.clone();
    if let Some(depth) = max_depth {
        crawl = crawl.with_max_depth(depth);
    }
    let frontier = CrawlFrontier::new(
        HttpFetcher::new(&crawl),
        ContentExtractor::new(&config.keywords, ExtractorConfig::default()),
        crawl,
    );

    let mut cycle = MonitoringCycle::new(
        frontier,
        ChangeDetector::new(&config.keywords, DetectorConfig::default()),
        store,
        MonitorConfig::new()
            .with_deep_crawl(deep)
            .with_sublinks(include_sublinks),
    );

    if let Some(ollama_url) = &config.ollama_url {
        tracing::info!(url = %ollama_url, model = %config.ollama_model, "AI summaries enabled");
        cycle = cycle.with_summarizer(Box::new(OllamaSummarizer::new(
            ollama_url.clone(),
            config.ollama_model.clone(),
        )));
    }

    output(&cycle.run().await)
}

async fn cmd_crawl(config: &AppConfig, url: &str, max_depth: usize, max_pages: usize) -> Result<()> {
    let report = frontier(config).crawl(url, max_depth, max_pages).await;
    output(&report)
}

async fn cmd_documents(config: &AppConfig, url: &str) -> Result<()> {
    let documents = frontier(config)
        .find_documents(url)
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;
    output(&documents)
}

async fn cmd_changes(config: &AppConfig, source_id: Uuid) -> Result<()> {
    let store = open_store(config).await?;
    if store.get_source(source_id).await?.is_none() {
        bail!("Source {} not found", source_id);
    }
    output(&store.list_changes(source_id).await?)
}

async fn cmd_sublinks(config: &AppConfig, source_id: Uuid) -> Result<()> {
    let store = open_store(config).await?;
    if store.get_source(source_id).await?.is_none() {
        bail!("Source {} not found", source_id);
    }
    output(&store.list_sublinks(source_id).await?)
}
