//! # coderag CLI
//!
//! The `coderag` binary indexes a source tree into a local SQLite vector
//! store, retrieves code chunks for a query under a token budget, and
//! scaffolds unit tests for Python, JavaScript/TypeScript, C#, and C++.
//!
//! ## Usage
//!
//! ```bash
//! coderag --config ./coderag.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `coderag init` | Create the SQLite database and schema |
//! | `coderag index` | Walk, chunk, embed, and store the configured root |
//! | `coderag search "<query>"` | Retrieve relevant chunks |
//! | `coderag get <path>` | Show an indexed file and its chunks |
//! | `coderag stats` | Summarize the index |
//! | `coderag embed pending` | Backfill missing or stale embeddings |
//! | `coderag embed rebuild` | Regenerate all embeddings |
//! | `coderag gen-tests <file>` | Scaffold unit tests for a source file |
//! | `coderag serve` | Start the HTTP tool server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use coderag::progress::ProgressMode;
use coderag::search::SearchMode;
use coderag::testgen::{TestFramework, TestGenOptions};
use coderag::{config, embed_cmd, get, index, migrate, search, server, stats, testgen};

/// coderag: local code retrieval and test scaffolding for AI coding tools.
#[derive(Parser)]
#[command(
    name = "coderag",
    about = "Local code indexing, retrieval, and test scaffolding for AI coding tools",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./coderag.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index the configured source tree.
    ///
    /// Unchanged files are skipped unless `--full` is given. Files over
    /// `[indexing].max_file_size` are never read.
    Index {
        /// Re-chunk and re-embed every file regardless of content hash.
        #[arg(long)]
        full: bool,

        /// Report what would be indexed without writing.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Retrieve code chunks relevant to a query.
    Search {
        query: String,

        /// `keyword` (FTS5), `semantic` (vector), or `hybrid`.
        #[arg(long, value_enum, default_value = "keyword")]
        mode: SearchMode,

        /// Only chunks from files in this language (e.g. `python`).
        #[arg(long)]
        language: Option<String>,

        /// Only chunks from files under this path prefix.
        #[arg(long = "path")]
        path_prefix: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Token budget for the returned chunks.
        #[arg(long)]
        budget: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show an indexed file and its chunks.
    Get {
        /// File path relative to the indexing root.
        path: String,

        #[arg(long)]
        json: bool,
    },

    /// Summarize the index: files, chunks, languages, embedding coverage.
    Stats,

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Scaffold unit tests for a source file.
    ///
    /// Works without a database; the `[testgen]` config section is used when
    /// the config file exists.
    GenTests {
        file: PathBuf,

        /// `module`, `function:<name>`, `function:<Class>.<method>`, or `class:<name>`.
        #[arg(long, default_value = "module")]
        target: String,

        /// Override the framework configured for the file's language.
        #[arg(long, value_enum)]
        framework: Option<TestFramework>,

        /// Write the generated tests here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Mock collaborator dependencies.
        #[arg(long, overrides_with = "no_mocks")]
        mocks: bool,

        #[arg(long, overrides_with = "mocks")]
        no_mocks: bool,

        /// Emit boundary-input cases.
        #[arg(long, overrides_with = "no_edge_cases")]
        edge_cases: bool,

        #[arg(long, overrides_with = "edge_cases")]
        no_edge_cases: bool,

        /// Emit one case per raised error type.
        #[arg(long, overrides_with = "no_error_cases")]
        error_cases: bool,

        #[arg(long, overrides_with = "error_cases")]
        no_error_cases: bool,

        /// Emit skipped integration-test stubs.
        #[arg(long)]
        integration: bool,

        /// Cap on generated cases per function or method.
        #[arg(long)]
        max_tests: Option<usize>,
    },

    /// Start the HTTP tool server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that are missing or have stale embeddings.
    Pending {
        #[arg(long)]
        limit: Option<usize>,

        /// Override `[embedding].batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    Rebuild {
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

/// Resolve a `--flag` / `--no-flag` pair against the configured default.
fn flag(on: bool, off: bool, default: bool) -> bool {
    if on {
        true
    } else if off {
        false
    } else {
        default
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        // Test generation never touches the store, so a missing config is fine.
        Commands::GenTests {
            file,
            target,
            framework,
            output,
            mocks,
            no_mocks,
            edge_cases,
            no_edge_cases,
            error_cases,
            no_error_cases,
            integration,
            max_tests,
        } => {
            let cfg = if cli.config.exists() {
                config::load_config(&cli.config)?
            } else {
                tracing::debug!(path = %cli.config.display(), "no config file, using defaults");
                config::Config::default()
            };
            let defaults = TestGenOptions::from(&cfg.testgen);
            let options = TestGenOptions {
                include_mocks: flag(mocks, no_mocks, defaults.include_mocks),
                include_edge_cases: flag(edge_cases, no_edge_cases, defaults.include_edge_cases),
                include_error_cases: flag(error_cases, no_error_cases, defaults.include_error_cases),
                include_integration_tests: integration || defaults.include_integration_tests,
                max_tests_per_function: max_tests.unwrap_or(defaults.max_tests_per_function),
            };
            testgen::run_gen_tests(
                &cfg.testgen,
                &file,
                &target,
                framework,
                output.as_deref(),
                &options,
            )
        }
        command => {
            let cfg = config::load_config(&cli.config)?;
            run(command, &cfg).await
        }
    }
}

async fn run(command: Commands, cfg: &config::Config) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            migrate::run_migrations(cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Index {
            full,
            dry_run,
            limit,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            index::run_index(cfg, full, dry_run, limit, mode).await?;
        }
        Commands::Search {
            query,
            mode,
            language,
            path_prefix,
            limit,
            budget,
            json,
        } => {
            search::run_search(cfg, &query, mode, language, path_prefix, limit, budget, json)
                .await?;
        }
        Commands::Get { path, json } => {
            get::run_get(cfg, &path, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(cfg).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(cfg, batch_size).await?;
            }
        },
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::GenTests { file, .. } => {
            anyhow::bail!("gen-tests for {} is handled without a store", file.display());
        }
    }
    Ok(())
}
