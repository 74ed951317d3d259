//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use ragforge_core::{Pipeline, QueryOptions, RepoOptions, query_collection, summarize_chunks};
use ragforge_embedding::{BatchOptions, OpenAiEmbedder};
use ragforge_shared::{
    AppConfig, IngestConfig, IngestOverrides, IngestReport, init_config, load_config,
    resolve_ingest_config, validate_api_key,
};
use ragforge_store::ChromaStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RagForge — ingest anything, retrieve everything.
#[derive(Parser)]
#[command(
    name = "ragforge",
    version,
    about = "Ingest web pages, repositories, and documents into a vector store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Per-run settings that override the config file.
#[derive(Args, Debug, Default)]
pub(crate) struct OverrideArgs {
    /// Target collection name.
    #[arg(long)]
    collection: Option<String>,

    /// Target chunk size in characters.
    #[arg(long)]
    chunk_size: Option<usize>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl a URL and ingest the pages it yields.
    Crawl {
        /// Start URL: a page, a sitemap, or a plain text file.
        url: String,

        /// Crawl depth in levels (the start page counts as one).
        #[arg(long)]
        max_depth: Option<usize>,

        /// Maximum pages fetched.
        #[arg(long)]
        max_pages: Option<usize>,

        /// Maximum concurrent fetches.
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Crawl wall-clock budget in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Ingest a code repository (local path or remote clone URL).
    Repo {
        /// Local path, or an https/git URL to shallow-clone.
        source: String,

        /// Per-file size cap in KB.
        #[arg(long, default_value = "100")]
        max_file_size_kb: u64,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Ingest local files as documents.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Query a collection for the most similar chunks.
    Query {
        /// Query text.
        text: String,

        /// Number of matches to return.
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Drop matches below this similarity (0..1).
        #[arg(long)]
        min_similarity: Option<f32>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Summarize a local document hierarchically.
    Summarize {
        /// File to summarize.
        file: PathBuf,

        /// Chat model for summarization.
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ragforge=info",
        1 => "ragforge=debug",
        _ => "ragforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Crawl {
            url,
            max_depth,
            max_pages,
            max_concurrent,
            timeout_secs,
            overrides,
        } => {
            let crawl_overrides = IngestOverrides {
                chunk_size: overrides.chunk_size,
                collection: overrides.collection.clone(),
                max_depth,
                max_concurrent,
                max_pages,
                timeout_secs,
            };
            cmd_crawl(&url, &crawl_overrides).await
        }
        Command::Repo {
            source,
            max_file_size_kb,
            overrides,
        } => cmd_repo(&source, max_file_size_kb, &overrides.into()).await,
        Command::Ingest { files, overrides } => cmd_ingest(&files, &overrides.into()).await,
        Command::Query {
            text,
            top_k,
            min_similarity,
            overrides,
        } => cmd_query(&text, top_k, min_similarity, &overrides.into()).await,
        Command::Summarize {
            file,
            model,
            overrides,
        } => cmd_summarize(&file, &model, &overrides.into()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

impl From<OverrideArgs> for IngestOverrides {
    fn from(args: OverrideArgs) -> Self {
        IngestOverrides {
            chunk_size: args.chunk_size,
            collection: args.collection,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline construction
// ---------------------------------------------------------------------------

/// Validate credentials, resolve runtime settings, and build the pipeline
/// from constructed handles.
fn build_pipeline(overrides: &IngestOverrides) -> Result<(Pipeline, IngestConfig)> {
    let config = load_config()?;
    validate_api_key(&config)?;

    let api_key = std::env::var(&config.embedding.api_key_env)?;
    let ingest = resolve_ingest_config(overrides, &config);

    let embedder = OpenAiEmbedder::new(
        &api_key,
        &config.embedding.base_url,
        config.embedding.model.clone(),
        config.embedding.dimension,
    )?;
    let store = ChromaStore::new(&config.store.base_url)?;

    let batch = BatchOptions {
        max_items_per_call: config.embedding.max_items_per_call,
        max_tokens_per_call: config.embedding.max_tokens_per_call,
        max_retries: config.embedding.max_retries,
        ..BatchOptions::default()
    };

    let pipeline = Pipeline::new(Arc::new(embedder), Arc::new(store), ingest.clone(), batch);
    Ok((pipeline, ingest))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_crawl(url: &str, overrides: &IngestOverrides) -> Result<()> {
    let parsed_url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let (pipeline, ingest) = build_pipeline(overrides)?;

    info!(url, collection = %ingest.collection, "crawling and ingesting");

    let spinner = spinner(format!("Crawling {url}"));
    let report = pipeline.ingest_url(&parsed_url).await?;
    spinner.finish_and_clear();

    print_report(&ingest.collection, &report);
    Ok(())
}

async fn cmd_repo(source: &str, max_file_size_kb: u64, overrides: &IngestOverrides) -> Result<()> {
    let (pipeline, ingest) = build_pipeline(overrides)?;
    let opts = RepoOptions { max_file_size_kb };

    info!(source, collection = %ingest.collection, "ingesting repository");

    let spinner = spinner(format!("Ingesting {source}"));
    let report = pipeline.ingest_repository(source, &opts).await?;
    spinner.finish_and_clear();

    print_report(&ingest.collection, &report);
    Ok(())
}

async fn cmd_ingest(files: &[PathBuf], overrides: &IngestOverrides) -> Result<()> {
    let (pipeline, ingest) = build_pipeline(overrides)?;

    let mut uploads = Vec::with_capacity(files.len());
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| eyre!("not a file: {}", file.display()))?;
        let content = std::fs::read_to_string(file)
            .map_err(|e| eyre!("cannot read {}: {e}", file.display()))?;
        uploads.push((name, content));
    }

    info!(files = uploads.len(), collection = %ingest.collection, "ingesting documents");

    let spinner = spinner(format!("Ingesting {} file(s)", uploads.len()));
    let report = pipeline.ingest_uploads(uploads).await?;
    spinner.finish_and_clear();

    print_report(&ingest.collection, &report);
    Ok(())
}

async fn cmd_query(
    text: &str,
    top_k: usize,
    min_similarity: Option<f32>,
    overrides: &IngestOverrides,
) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;

    let api_key = std::env::var(&config.embedding.api_key_env)?;
    let ingest = resolve_ingest_config(overrides, &config);

    let embedder = OpenAiEmbedder::new(
        &api_key,
        &config.embedding.base_url,
        config.embedding.model.clone(),
        config.embedding.dimension,
    )?;
    let store = ChromaStore::new(&config.store.base_url)?;

    let opts = QueryOptions {
        top_k,
        min_similarity,
    };
    let matches =
        query_collection(&embedder, &store, &ingest.collection, text, &opts, None).await?;

    if matches.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for (rank, m) in matches.iter().enumerate() {
        let source = m.metadata.get("source").map(String::as_str).unwrap_or("?");
        println!();
        println!("  #{} [{:.3}] {}", rank + 1, m.similarity, source);
        println!("  {}", preview(&m.document, 200));
    }
    println!();

    Ok(())
}

async fn cmd_summarize(file: &PathBuf, model: &str, overrides: &IngestOverrides) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;

    let api_key = std::env::var(&config.embedding.api_key_env)?;
    let ingest = resolve_ingest_config(overrides, &config);

    let content = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read {}: {e}", file.display()))?;
    let chunks = ragforge_chunking::chunk_text(&content, ingest.chunk_size);
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let provider = ragforge_core::OpenAiCompletions::new(&api_key, &config.embedding.base_url, model)?;

    let spinner = spinner(format!("Summarizing {name}"));
    let summary = summarize_chunks(&provider, &name, &chunks).await?;
    spinner.finish_and_clear();

    println!();
    println!("{}", summary.text);
    println!();
    println!(
        "  ({} chunks, {} completion calls)",
        summary.chunks_processed, summary.llm_calls
    );

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    spinner
}

fn print_report(collection: &str, report: &IngestReport) {
    println!();
    println!("  Ingestion complete");
    println!("  Run:             {}", report.run_id);
    println!("  Collection:      {collection}");
    println!("  Items collected: {}", report.items_collected);
    println!("  Chunks created:  {}", report.chunks_created);
    println!("  Chunks stored:   {}", report.chunks_stored);
    println!("  Embedding calls: {}", report.embedding_calls);
    if report.zero_vector_chunks > 0 {
        println!("  Zero vectors:    {}", report.zero_vector_chunks);
    }
    if !report.issues.is_empty() {
        println!("  Issues:          {}", report.issues.len());
        for issue in &report.issues {
            println!("    - {}: {}", issue.source, issue.message);
        }
    }
    println!();
}

fn preview(text: &str, max_chars: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= max_chars {
        cleaned
    } else {
        let cut: String = cleaned.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
