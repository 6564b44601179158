//! # kb-answer CLI (`kba`)
//!
//! ## Usage
//!
//! ```bash
//! kba --config ./config/kba.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kba serve` | Start the HTTP server |
//! | `kba ask "<question>"` | Answer a question with citations |
//! | `kba retrieve "<query>"` | Show ranked documents and sub-scores |
//! | `kba index` | Load the metadata store and print a summary |
//! | `kba get <path>` | Show one document as the answer step sees it |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use kb_answer::config::{self, Config};
use kb_answer::search::AskOptions;
use kb_answer::{get, search, server, stats};

/// kb-answer: grounded, contradiction-aware answers over an internal
/// knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kba.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kba",
    about = "kb-answer — hybrid retrieval and grounded answers over an internal knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kba.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Answer a question from the knowledge base.
    Ask {
        question: String,

        /// Number of documents to retrieve (overrides `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Reorder retrieved documents by model-judged relevance.
        #[arg(long, overrides_with = "no_rerank")]
        rerank: bool,

        /// Keep retrieval order even when `[rerank].enabled` is set.
        #[arg(long, overrides_with = "rerank")]
        no_rerank: bool,

        /// Blend paraphrase embeddings into the query vector.
        #[arg(long, overrides_with = "no_augment")]
        augment: bool,

        /// Embed the question alone even when `[augment].enabled` is set.
        #[arg(long, overrides_with = "augment")]
        no_augment: bool,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run hybrid retrieval only and print per-document sub-scores.
    Retrieve {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long, overrides_with = "no_augment")]
        augment: bool,

        #[arg(long, overrides_with = "augment")]
        no_augment: bool,
    },

    /// Load the metadata store and print a summary. No network access.
    Index {
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show a document's metadata and body by index path.
    Get {
        /// Path relative to the knowledge-base root.
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask {
            question,
            top_k,
            rerank,
            no_rerank,
            augment,
            no_augment,
            json,
        } => {
            let opts = AskOptions {
                top_k,
                rerank: toggle(rerank, no_rerank),
                augment: toggle(augment, no_augment),
                json,
            };
            search::run_ask(&cfg, &question, &opts).await?;
        }
        Commands::Retrieve {
            query,
            top_k,
            augment,
            no_augment,
        } => {
            search::run_retrieve(&cfg, &query, top_k, toggle(augment, no_augment)).await?;
        }
        Commands::Index { json } => {
            stats::run_index(&cfg, json)?;
        }
        Commands::Get { path } => {
            get::run_get(&cfg, &path).await?;
        }
    }

    Ok(())
}

/// `Some` when either flag of an on/off pair was given; `None` defers to config.
fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// `RUST_LOG` wins over `[log].level`. Logs go to stderr so command output stays clean.
fn init_tracing(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
