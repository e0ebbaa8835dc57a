use anyhow::{Context, Result};
use chrono::NaiveDate;
use chronam_acquire::{ArchiveClient, BuildRequest, Endpoints, FetchRequest, RetryPolicy};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "chronam")]
#[command(about = "Build and download Chronicling America newspaper page corpora")]
#[command(version)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info", value_enum)]
    log_level: LogLevel,

    /// Use UTC timestamps instead of local time
    #[arg(long, global = true)]
    utc: bool,

    /// Root directory holding one subdirectory per corpus
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the archive and write <data-dir>/<corpus>/metadata.json
    Build {
        /// Free-text search query (e.g., "gold rush")
        query: String,

        /// Corpus name, used as the directory name
        #[arg(short, long)]
        corpus: String,

        /// Maximum number of pages to record
        #[arg(short, long, default_value_t = chronam_acquire::builder::DEFAULT_MAX_PAGES)]
        max_pages: usize,

        /// Earliest publication date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// Latest publication date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// Only keep pages from this state (e.g., "california")
        #[arg(long)]
        state: Option<String>,

        /// Pause between search requests, in milliseconds
        #[arg(long, default_value_t = 3000)]
        delay_ms: u64,

        /// Retries per search request on timeouts, 429 and 5xx
        #[arg(long, default_value_t = 5)]
        max_retries: u32,
    },

    /// Download the PDF, JP2, XML and TXT files of every page in a corpus
    Fetch {
        /// Corpus name (must already have metadata.json)
        #[arg(short, long)]
        corpus: String,

        /// Process at most this many pages
        #[arg(long)]
        max_docs: Option<usize>,

        /// Pause after each download, in milliseconds
        #[arg(long, default_value_t = 2000)]
        delay_ms: u64,
    },

    /// Check corpus metadata invariants and report local completeness
    Validate {
        /// Corpus name
        #[arg(short, long)]
        corpus: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep connection-level chatter out of debug/trace output
    let level = match cli.log_level {
        LogLevel::Error => "error",
        LogLevel::Warn  => "warn",
        LogLevel::Info  => "info",
        LogLevel::Debug => "debug,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
        LogLevel::Trace => "trace,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // Timestamp format: 2026-02-14 19:44:09.123 -08:00
    let time_format = "%Y-%m-%d %H:%M:%S%.3f %:z";

    if cli.utc {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(time_format.to_string()))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(time_format.to_string()))
            .init();
    }

    match cli.command {
        Commands::Build {
            query,
            corpus,
            max_pages,
            start_date,
            end_date,
            state,
            delay_ms,
            max_retries,
        } => {
            let request = BuildRequest {
                max_pages,
                start_date,
                end_date,
                state,
                delay: Duration::from_millis(delay_ms),
                ..BuildRequest::new(&query, &corpus)
            };
            // Fail on bad input before touching the network
            request.validate()?;
            let retry = RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            };
            let client = ArchiveClient::new(Endpoints::default(), retry)?;
            let summary = chronam_acquire::build_corpus(&client, &cli.data_dir, &request)
                .await
                .with_context(|| format!("Failed to build corpus '{corpus}'"))?;
            tracing::info!(
                pages = summary.accepted,
                path = %summary.metadata_path.display(),
                "Corpus ready; run `chronam fetch --corpus {corpus}` to download files"
            );
        }
        Commands::Fetch {
            corpus,
            max_docs,
            delay_ms,
        } => {
            let request = FetchRequest {
                max_docs,
                delay: Duration::from_millis(delay_ms),
                ..FetchRequest::new(&corpus)
            };
            let client = ArchiveClient::new(Endpoints::default(), RetryPolicy::default())?;
            let summary = chronam_acquire::fetch_corpus(&client, &cli.data_dir, &request)
                .await
                .with_context(|| format!("Failed to fetch corpus '{corpus}'"))?;
            if summary.failed > 0 {
                tracing::warn!(
                    failed = summary.failed,
                    "Some files failed; re-run fetch to retry them"
                );
            }
        }
        Commands::Validate { corpus } => {
            tracing::info!(corpus = %corpus, "Validating");
            let report = chronam_validate::validate(&cli.data_dir, &corpus)?;
            tracing::info!(
                complete = report.complete,
                total = report.total,
                "Pages with all four files on disk"
            );
        }
    }

    Ok(())
}
