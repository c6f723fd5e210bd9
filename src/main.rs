//! # Repo Memory CLI (`repomem`)
//!
//! The `repomem` binary drives the ingestion and retrieval engine from the
//! command line. It operates on a local checkout as the source tree and a
//! SQLite database as the memory backend.
//!
//! ## Usage
//!
//! ```bash
//! repomem --config ./config/repomem.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repomem init` | Create the SQLite database and run schema migrations |
//! | `repomem ingest <repo> <path>` | Full scan, pattern detection, and embedding |
//! | `repomem update <repo> <path>` | Incremental update for changed files |
//! | `repomem context <repo>` | Ranked context retrieval |
//! | `repomem patterns <repo>` | Show detected patterns and improvement suggestions |
//! | `repomem novelty <repo>` | Check a candidate suggestion for novelty |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! repomem init --config ./config/repomem.toml
//!
//! # Full ingestion of a checkout
//! repomem ingest acme/webapp ./webapp --force
//!
//! # Incremental update after a push
//! repomem update acme/webapp ./webapp --modified src/auth.ts --removed src/legacy.ts
//!
//! # Retrieve context for an analysis request
//! repomem context acme/webapp --query "session handling" --file src/auth.ts
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use repo_memory::cache::TtlCache;
use repo_memory::config;
use repo_memory::context::ContextBuilder;
use repo_memory::db;
use repo_memory::embedder::create_embedder;
use repo_memory::ingest::{IngestOptions, IngestStatus, Ingestor};
use repo_memory::migrate;
use repo_memory::models::{CandidateSuggestion, ChangeKind, ChangedFile};
use repo_memory::novelty::check_novelty;
use repo_memory::patterns::suggest_patterns;
use repo_memory::progress::{CancelFlag, ProgressMode};
use repo_memory::sources::FilesystemTree;
use repo_memory::store::sqlite::SqliteStore;
use repo_memory::store::{MemoryStore, SuggestionStore, VectorStore};

/// Repo Memory CLI — repository ingestion and semantic-memory engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/repomem.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "repomem",
    about = "Repo Memory — repository ingestion and semantic-memory engine",
    version,
    long_about = "Repo Memory scans a repository checkout, detects frameworks and conventions, \
    chunks and embeds source files in rate-limited batches, and persists a queryable memory \
    record usable for similarity retrieval and duplicate-suggestion suppression."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/repomem.toml")]
    config: PathBuf,

    /// Progress output: `auto`, `off`, `human`, or `json` (stderr).
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Run a full ingestion of a repository checkout.
    ///
    /// Scans the tree, detects frameworks and patterns, chunks and embeds
    /// eligible files, and upserts the memory record. A recent scan is
    /// skipped unless `--force` is given.
    Ingest {
        /// Repository identifier (e.g. `owner/repo`).
        repository: String,

        /// Path to the local checkout.
        path: PathBuf,

        /// Bypass the freshness guard and the tree-hash short-circuit.
        #[arg(long)]
        force: bool,

        /// Scan and analyze, but write nothing and embed nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply an incremental update for changed files.
    ///
    /// Removed files lose their embeddings; added and modified files are
    /// re-chunked and re-embedded. No full re-scan is performed.
    Update {
        /// Repository identifier (e.g. `owner/repo`).
        repository: String,

        /// Path to the local checkout.
        path: PathBuf,

        /// Added file path (repeatable).
        #[arg(long = "added")]
        added: Vec<String>,

        /// Modified file path (repeatable).
        #[arg(long = "modified")]
        modified: Vec<String>,

        /// Removed file path (repeatable).
        #[arg(long = "removed")]
        removed: Vec<String>,
    },

    /// Retrieve ranked context for a repository.
    ///
    /// Combines exact path matches, semantic similarity against the query,
    /// and directory-proximity fallback. Prints one JSON object per result.
    Context {
        /// Repository identifier (e.g. `owner/repo`).
        repository: String,

        /// Free-text query for semantic matching.
        #[arg(long)]
        query: Option<String>,

        /// Affected file path (repeatable).
        #[arg(long = "file")]
        files: Vec<String>,

        /// Maximum number of results. Defaults to `retrieval.default_limit`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show detected patterns and improvement suggestions.
    Patterns {
        /// Repository identifier (e.g. `owner/repo`).
        repository: String,
    },

    /// Check a candidate suggestion for novelty against prior suggestions.
    Novelty {
        /// Repository identifier (e.g. `owner/repo`).
        repository: String,

        /// Suggestion type (e.g. `refactor`, `testing`).
        #[arg(long = "type")]
        suggestion_type: String,

        /// Candidate suggestion title.
        #[arg(long)]
        title: String,

        /// Affected file path (repeatable).
        #[arg(long = "file")]
        files: Vec<String>,
    },
}

fn progress_mode(flag: &str) -> ProgressMode {
    match flag {
        "off" => ProgressMode::Off,
        "human" => ProgressMode::Human,
        "json" => ProgressMode::Json,
        _ => ProgressMode::default_for_tty(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg.store.path).await?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&pool).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    migrate::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let mode = progress_mode(&cli.progress);

    match cli.command {
        Commands::Init => unreachable!(),

        Commands::Ingest {
            repository,
            path,
            force,
            dry_run,
        } => {
            let source = Arc::new(FilesystemTree::new(path)?);
            let embedder: Arc<dyn repo_memory::embedder::Embedder> =
                Arc::from(create_embedder(&cfg.embedding)?);
            let ingestor = Ingestor::new(
                &repository,
                source,
                embedder,
                Arc::clone(&store) as Arc<dyn VectorStore>,
                Arc::clone(&store) as Arc<dyn MemoryStore>,
                cfg.clone(),
            );

            let progress = mode.reporter(&repository);
            let result = ingestor
                .ingest(IngestOptions { force, dry_run }, progress.as_ref(), &CancelFlag::new())
                .await?;

            match result.status {
                IngestStatus::SkippedFresh => {
                    println!("Skipped: memory is fresh (use --force to re-scan).");
                }
                IngestStatus::SkippedUnchanged => {
                    println!("Skipped: repository unchanged since last scan.");
                }
                IngestStatus::Cancelled => {
                    println!("Cancelled between batches; partial progress kept.");
                }
                IngestStatus::Completed => {
                    println!("Ingested {}.", repository);
                    println!("  files processed:    {}", result.files_processed);
                    println!("  embeddings created: {}", result.embeddings_created);
                    println!(
                        "  languages:          {}",
                        result.languages_detected.join(", ")
                    );
                    println!(
                        "  frameworks:         {}",
                        result.frameworks_detected.join(", ")
                    );
                    println!("  patterns:           {}", result.patterns_identified);
                    if !result.summary.is_empty() {
                        println!("  summary:            {}", result.summary);
                    }
                    if !result.errors.is_empty() {
                        println!("  errors:             {}", result.errors.len());
                        for error in &result.errors {
                            eprintln!("    {}", serde_json::to_string(error)?);
                        }
                    }
                }
            }
        }

        Commands::Update {
            repository,
            path,
            added,
            modified,
            removed,
        } => {
            let mut changes: Vec<ChangedFile> = Vec::new();
            for (paths, kind) in [
                (added, ChangeKind::Added),
                (modified, ChangeKind::Modified),
                (removed, ChangeKind::Removed),
            ] {
                changes.extend(paths.into_iter().map(|path| ChangedFile { path, kind }));
            }
            if changes.is_empty() {
                println!("No changed files given; nothing to do.");
                return Ok(());
            }

            let source = Arc::new(FilesystemTree::new(path)?);
            let embedder: Arc<dyn repo_memory::embedder::Embedder> =
                Arc::from(create_embedder(&cfg.embedding)?);
            let ingestor = Ingestor::new(
                &repository,
                source,
                embedder,
                Arc::clone(&store) as Arc<dyn VectorStore>,
                Arc::clone(&store) as Arc<dyn MemoryStore>,
                cfg.clone(),
            );

            let progress = mode.reporter(&repository);
            let result = ingestor
                .update_from_change(&changes, progress.as_ref(), &CancelFlag::new())
                .await?;
            println!(
                "Updated {} file(s), removed {} file(s), {} error(s).",
                result.updated,
                result.removed,
                result.errors.len()
            );
            for error in &result.errors {
                eprintln!("  {}", serde_json::to_string(error)?);
            }
        }

        Commands::Context {
            repository,
            query,
            files,
            limit,
        } => {
            let embedder: Arc<dyn repo_memory::embedder::Embedder> =
                Arc::from(create_embedder(&cfg.embedding)?);
            let builder = ContextBuilder::new(
                Arc::clone(&store) as Arc<dyn VectorStore>,
                embedder,
                Arc::clone(&store) as Arc<dyn MemoryStore>,
                TtlCache::new(Duration::from_secs(60)),
            );

            let limit = limit.unwrap_or(cfg.retrieval.default_limit);

            if let Some(memory) = builder.repository_memory(&repository).await? {
                eprintln!("{}: {}", repository, memory.repo_summary);
            }

            let items = builder
                .get_context(&repository, query.as_deref(), &files, limit)
                .await?;

            if items.is_empty() {
                eprintln!("No context found for {}.", repository);
            }
            for item in items {
                println!("{}", serde_json::to_string(&item)?);
            }
        }

        Commands::Patterns { repository } => {
            let memory_store: &dyn MemoryStore = store.as_ref();
            let Some(memory) = memory_store.get(&repository).await? else {
                anyhow::bail!("No memory record for '{}'. Run `repomem ingest` first.", repository);
            };

            if memory.patterns.is_empty() {
                println!("No patterns detected.");
            } else {
                println!("Detected patterns:");
                for pattern in &memory.patterns {
                    println!(
                        "  [{:.2}] {} — {}",
                        pattern.confidence, pattern.name, pattern.description
                    );
                }
            }

            let suggestions = suggest_patterns(&memory.patterns);
            if !suggestions.is_empty() {
                println!("Suggested improvements:");
                for suggestion in &suggestions {
                    println!(
                        "  [{:?}] {} — {}",
                        suggestion.priority, suggestion.title, suggestion.rationale
                    );
                }
            }
        }

        Commands::Novelty {
            repository,
            suggestion_type,
            title,
            files,
        } => {
            let candidate = CandidateSuggestion {
                suggestion_type,
                title,
                affected_files: files,
            };
            let suggestion_store: &dyn SuggestionStore = store.as_ref();
            let result = check_novelty(suggestion_store, &repository, &candidate).await?;
            if result.is_novel {
                println!("Novel: no conflicting prior suggestion.");
            } else if let Some(conflict) = result.conflict {
                println!("Duplicate of prior suggestion: {}", conflict.title);
            }
        }
    }

    Ok(())
}
