//! # Lodestone CLI (`lode`)
//!
//! Operational interface for the connection and retrieval subsystem.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lode init` | Connect, bootstrap the schema, seed the starter corpus |
//! | `lode check` | Validate config and certificate without touching the network |
//! | `lode ingest` | Embed and store one document |
//! | `lode search "<query>"` | Ranked similarity search |
//! | `lode status` | Fresh connection chain, collection counts, attempt log |
//!
//! Human-readable output goes to stdout; diagnostics go to stderr via
//! `tracing` (`RUST_LOG` controls the level, default `info`). `init`
//! exits 0 even when the store is unreachable — degraded readiness is
//! data, not a crash — and exits non-zero only for configuration or
//! encoder errors.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lodestone::certificate;
use lodestone::config::{self, Config};
use lodestone::connect::ConnectionAttemptRecord;
use lodestone::runtime::Runtime;
use lodestone::seed::{self, SeedOutcome};

/// Lodestone — certificate-aware document-store connector and semantic
/// retrieval engine for chat assistants.
#[derive(Parser)]
#[command(
    name = "lode",
    about = "Lodestone — certificate-aware store connector and semantic retrieval engine",
    version,
    long_about = "Lodestone connects to a remote document store through an ordered chain of \
    authentication strategies (mutual TLS first, plaintext last), bootstraps collections and \
    a similarity index, and serves embedding-based retrieval over a reference corpus. \
    With the store unreachable it degrades to empty results instead of crashing."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lodestone.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the store, bootstrap the schema, and seed the corpus.
    ///
    /// Idempotent: re-running against a provisioned store changes nothing.
    /// Exits 0 even when every connection strategy fails; readiness is
    /// reported in the output.
    Init,

    /// Validate configuration and certificate material offline.
    ///
    /// Materializes the certificate (if configured) and prints what would
    /// be used, with secrets masked. No network traffic.
    Check,

    /// Embed and store one document in the vector corpus.
    Ingest {
        /// Document title.
        #[arg(long)]
        title: String,

        /// Document category (e.g. `procedures`, `general`).
        #[arg(long)]
        category: String,

        /// Document body, at least 50 characters.
        #[arg(long, conflicts_with = "file")]
        content: Option<String>,

        /// Read the document body from a file instead.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Search the vector corpus.
    Search {
        /// The query text.
        query: String,

        /// Maximum number of results (defaults to retrieval.default_limit).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run a fresh connection chain and report store health.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(config).await?,
        Commands::Check => run_check(config)?,
        Commands::Ingest {
            title,
            category,
            content,
            file,
        } => {
            let content = match (content, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read content file: {}", path.display()))?,
                (None, None) => anyhow::bail!("Provide --content or --file"),
            };
            run_ingest(config, &title, &content, &category).await?;
        }
        Commands::Search { query, limit } => run_search(config, &query, limit).await?,
        Commands::Status => run_status(config).await?,
    }

    Ok(())
}

async fn run_init(config: Config) -> Result<()> {
    let runtime = Runtime::initialize(config).await?;

    print_mode(&runtime);
    print_attempts(&runtime.attempts);

    let report = &runtime.bootstrap;
    println!(
        "bootstrap: collections {}, indexes {}, vector index: {}",
        report.collections_ensured,
        report.indexes_ensured,
        report.vector_index.as_str()
    );

    match seed::seed_if_empty(&runtime.store, &runtime.embedder).await {
        Ok(SeedOutcome::Seeded(n)) => println!("seeded {n} starter documents"),
        Ok(SeedOutcome::AlreadyPopulated(n)) => println!("corpus already holds {n} documents"),
        Ok(SeedOutcome::Unavailable) => println!("seeding skipped (store unavailable)"),
        Err(e) => println!("seeding failed: {e:#}"),
    }

    println!("ready: {}", runtime.ready());
    Ok(())
}

fn run_check(config: Config) -> Result<()> {
    println!("endpoint:  {}", config.store.endpoint);
    println!("database:  {}", config.store.database);
    println!(
        "username:  {}",
        config.store.username.as_deref().unwrap_or("(not set)")
    );
    println!(
        "password:  {}",
        if config.store.password.is_some() {
            "********"
        } else {
            "(not set)"
        }
    );
    println!("encoder:   {} ({} dims)", config.encoder.provider, config.encoder.dims);

    match certificate::materialize(&config.certificate) {
        Ok(Some(cert)) => {
            println!("certificate: materialized at {}", cert.path.display());
        }
        Ok(None) => println!("certificate: none configured"),
        Err(e) => {
            println!("certificate: FAILED ({e})");
            std::process::exit(1);
        }
    }

    println!("configuration ok");
    Ok(())
}

async fn run_ingest(config: Config, title: &str, content: &str, category: &str) -> Result<()> {
    let runtime = Runtime::initialize(config).await?;

    match runtime.retriever.ingest(title, content, category).await {
        Ok(true) => println!("stored: {title}"),
        Ok(false) => println!("not stored: store unavailable"),
        Err(e) => {
            println!("rejected: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn run_search(config: Config, query: &str, limit: Option<usize>) -> Result<()> {
    let runtime = Runtime::initialize(config).await?;

    let results = runtime.retriever.search(query, limit).await;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            result.score,
            result.category,
            result.title
        );
        println!("    excerpt: \"{}\"", excerpt(&result.content, 120));
        println!();
    }
    Ok(())
}

async fn run_status(config: Config) -> Result<()> {
    let runtime = Runtime::initialize(config).await?;

    print_mode(&runtime);
    print_attempts(&runtime.attempts);

    if !runtime.store.is_degraded() {
        println!("collections:");
        for collection in lodestone::bootstrap::COLLECTIONS {
            match runtime.store.count(collection).await {
                Ok(count) => println!("  {collection:<20} {count}"),
                Err(e) => println!("  {collection:<20} error: {e}"),
            }
        }
    }
    println!(
        "vector index: {}",
        runtime.bootstrap.vector_index.as_str()
    );
    println!("ready: {}", runtime.ready());
    Ok(())
}

fn print_mode(runtime: &Runtime) {
    match &*runtime.store {
        lodestone::store::StoreHandle::Connected(remote) => {
            println!("mode: connected ({})", remote.strategy());
        }
        lodestone::store::StoreHandle::Degraded => {
            println!("mode: degraded (no store connection)");
        }
    }
}

fn print_attempts(attempts: &[ConnectionAttemptRecord]) {
    if attempts.is_empty() {
        return;
    }
    println!("attempts:");
    for (i, attempt) in attempts.iter().enumerate() {
        let outcome = if attempt.succeeded { "ok" } else { "failed" };
        match &attempt.error {
            Some(error) => println!(
                "  {}. {:<14} {:<7} {:>5}ms  {}",
                i + 1,
                attempt.strategy,
                outcome,
                attempt.elapsed.as_millis(),
                error
            ),
            None => println!(
                "  {}. {:<14} {:<7} {:>5}ms",
                i + 1,
                attempt.strategy,
                outcome,
                attempt.elapsed.as_millis()
            ),
        }
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
