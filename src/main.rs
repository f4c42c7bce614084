//! # minerag CLI (`mrag`)
//!
//! The `mrag` binary manages knowledge-base indexes, ingests pre-extracted
//! text, and answers queries with retrieval-augmented prompts.
//!
//! ## Usage
//!
//! ```bash
//! mrag --config ./config/mrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mrag kb create <kb>` | Create the index for a knowledge base and apply settings |
//! | `mrag kb drop <kb>` | Delete a knowledge base's index |
//! | `mrag kb status <kb>` | Show whether the index exists and its size |
//! | `mrag ingest <kb> <paths>…` | Chunk, segment, and index text files |
//! | `mrag chunk <file>` | Preview chunking offline |
//! | `mrag segment "<text>"` | Segment text through the worker pool |
//! | `mrag search <kb> "<query>"` | Answer one query and print the prompt |
//! | `mrag chat <kb>` | Interactive multi-turn session |
//! | `mrag fragments <kb> <title>` | List a source's fragments in order |
//! | `mrag delete-source <kb> <title>` | Remove every fragment of a source |
//!
//! ## Examples
//!
//! ```bash
//! mrag kb create handbook
//! mrag ingest handbook ./extracted/ --include "**/*.txt"
//! mrag search handbook "上海明天天气怎么样" --session s1
//! mrag search handbook "那北京呢" --session s1 --json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use minerag::config::{self, Config};
use minerag::fragments;
use minerag::index_client::IndexClient;
use minerag::ingest;
use minerag::lifecycle::IndexManager;
use minerag::query::{self, QueryRequest, QueryService};
use minerag::segment_worker;
use minerag::segmenter::Segmenter;
use minerag::sessions::{SessionStore, DEFAULT_SESSION};
use minerag_core::chunk::chunk_text;
use minerag_core::keywords::Tokenizer;

/// minerag: retrieval-augmented prompts over a full-text index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/mrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "mrag",
    about = "minerag: chunk, index, and retrieve knowledge-base fragments for LLM prompts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mrag.toml")]
    config: PathBuf,

    /// More log output (-v debug, -vv trace). `MRAG_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage knowledge-base indexes.
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Ingest pre-extracted UTF-8 text files into a knowledge base.
    ///
    /// Directories are walked and filtered with `--include`/`--exclude`
    /// globs; explicit files are always taken. Each file becomes one
    /// source titled by its file name.
    Ingest {
        /// Knowledge base label.
        kb: String,

        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Display name stored on every fragment. Defaults to the label.
        #[arg(long)]
        name: Option<String>,

        /// Include glob for directory walks (repeatable).
        #[arg(long)]
        include: Vec<String>,

        /// Exclude glob for directory walks (repeatable).
        #[arg(long)]
        exclude: Vec<String>,

        /// Index raw text without segmentation.
        #[arg(long)]
        no_segment: bool,

        /// Show file and chunk counts without writing to the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the chunks of a text file without touching the index.
    Chunk {
        file: PathBuf,
    },

    /// Segment text through the worker pool and print the tokens.
    Segment {
        text: String,
    },

    /// Answer one query against a knowledge base.
    Search {
        kb: String,

        query: String,

        /// Restrict retrieval to these source titles (repeatable).
        #[arg(long = "doc")]
        docs: Vec<String>,

        /// Render the `--doc` sources whole instead of searching.
        #[arg(long)]
        full: bool,

        /// Conversation id.
        #[arg(long)]
        session: Option<String>,

        /// Clear the session's memory first.
        #[arg(long)]
        reset: bool,

        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive multi-turn session reading queries from stdin.
    Chat {
        kb: String,

        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,

        #[arg(long)]
        json: bool,
    },

    /// List the fragments of one source in sequence order.
    Fragments {
        kb: String,
        title: String,
    },

    /// Delete every fragment of one source.
    DeleteSource {
        kb: String,
        title: String,
    },

    /// Run as a segmentation worker (JSON lines on stdin/stdout).
    #[command(hide = true)]
    SegmentWorker,
}

#[derive(Subcommand)]
enum KbAction {
    /// Create the index (idempotent) and apply its settings.
    Create { kb: String },
    /// Delete the index. Succeeds when it does not exist.
    Drop { kb: String },
    /// Show existence and document count.
    Status { kb: String },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("MRAG_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// The config at `path`, or `None` when there is no file. A file that
/// exists but does not parse is still an error.
fn optional_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    config::load_config(path).map(Some)
}

fn index_manager(cfg: &Config) -> Result<IndexManager> {
    let client = IndexClient::new(&cfg.index).context("Failed to build index client")?;
    Ok(IndexManager::new(Arc::new(client), cfg.index.clone()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The worker speaks on stdout; logging stays on stderr.
    if let Commands::SegmentWorker = cli.command {
        return segment_worker::run();
    }

    init_tracing(cli.verbose, cli.quiet);

    // Commands that don't require an index
    match &cli.command {
        Commands::Chunk { file } => {
            let opts = optional_config(&cli.config)?
                .map(|c| c.chunking.options())
                .unwrap_or_default();
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let chunks = chunk_text(&text, &opts);
            for (i, chunk) in chunks.iter().enumerate() {
                println!("--- chunk {} ({} chars) ---", i + 1, chunk.chars().count());
                println!("{}", chunk);
            }
            println!("chunks: {}", chunks.len());
            return Ok(());
        }
        Commands::Segment { text } => {
            let seg_cfg = optional_config(&cli.config)?
                .map(|c| c.segmentation)
                .unwrap_or_default();
            let segmenter = Segmenter::from_config(&seg_cfg)?;
            let result = segmenter.segment(text).await;
            segmenter.shutdown().await;
            println!("{}", result?);
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;
    let manager = index_manager(&cfg)?;

    match cli.command {
        Commands::Kb { action } => match action {
            KbAction::Create { kb } => {
                let name = manager.prepare(&kb).await?;
                println!("Index {} ready.", name);
            }
            KbAction::Drop { kb } => {
                let name = manager.index_name(&kb);
                if manager.drop_index(&name).await? {
                    println!("Index {} dropped.", name);
                } else {
                    println!("Index {} does not exist.", name);
                }
            }
            KbAction::Status { kb } => {
                let status = manager.status(&kb).await?;
                println!("index: {}", status.name);
                println!("  exists: {}", status.exists);
                println!("  documents: {}", status.documents);
                println!("  indexing: {}", status.indexing);
            }
        },
        Commands::Ingest {
            kb,
            paths,
            name,
            include,
            exclude,
            no_segment,
            dry_run,
        } => {
            let segmenter = if dry_run || no_segment {
                None
            } else {
                Some(Segmenter::from_config(&cfg.segmentation)?)
            };
            let result = ingest::run_ingest(
                &cfg,
                &manager,
                segmenter.as_ref().map(|s| s as &dyn Tokenizer),
                &kb,
                name,
                &paths,
                &include,
                &exclude,
                dry_run,
            )
            .await;
            if let Some(segmenter) = segmenter {
                segmenter.shutdown().await;
            }
            result?;
        }
        Commands::Search {
            kb,
            query: text,
            docs,
            full,
            session,
            reset,
            json,
        } => {
            let segmenter = Segmenter::from_config(&cfg.segmentation)?;
            let service = QueryService::new(
                &cfg,
                manager.client().clone(),
                Arc::new(segmenter.clone()),
                Arc::new(SessionStore::new(cfg.memory.max_rounds)),
            );
            let request = QueryRequest {
                session,
                allowed_ids: docs,
                reset,
                full_documents: full,
                ..QueryRequest::new(kb, text)
            };
            let result = query::run_search(&service, request, json).await;
            segmenter.shutdown().await;
            result?;
        }
        Commands::Chat { kb, session, json } => {
            let segmenter = Segmenter::from_config(&cfg.segmentation)?;
            let service = QueryService::new(
                &cfg,
                manager.client().clone(),
                Arc::new(segmenter.clone()),
                Arc::new(SessionStore::new(cfg.memory.max_rounds)),
            );
            let result = query::run_chat(&service, &kb, &session, json).await;
            segmenter.shutdown().await;
            result?;
        }
        Commands::Fragments { kb, title } => {
            let index_name = manager.index_name(&kb);
            let frags =
                fragments::list_fragments(manager.client().as_ref(), &index_name, &title).await?;
            if frags.is_empty() {
                println!("No fragments.");
            }
            for f in &frags {
                println!("--- #{} ({}) ---", f.sequence_index, f.id);
                println!("{}", f.raw_content);
            }
        }
        Commands::DeleteSource { kb, title } => {
            let deleted = fragments::delete_source(&manager, &kb, &title).await?;
            println!("Deleted {} fragments of {}.", deleted, title);
        }
        Commands::Chunk { .. } | Commands::Segment { .. } | Commands::SegmentWorker => {}
    }

    Ok(())
}
