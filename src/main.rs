//! # docchat CLI
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat chat [PATHS]` | Interactive chat, optionally over uploaded documents |
//! | `docchat ask "<question>"` | Ask one question and exit |
//! | `docchat inspect <PATHS>` | Show how documents would be chunked |
//! | `docchat history list` | Show stored turns |
//! | `docchat history export` | Export stored turns as JSON or Markdown |
//! | `docchat history clear` | Delete stored turns |
//! | `docchat serve` | Start the HTTP API |
//! | `docchat completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Chat over a folder of manuals
//! GEMINI_API_KEY=... docchat chat ./manuals
//!
//! # One question against a single PDF, without saving the turn
//! docchat ask "What is the refund policy?" --file policy.pdf --private
//!
//! # Markdown transcript of everything asked so far
//! docchat history export --format markdown --output transcript.md
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use docchat::config::{self, DEFAULT_CONFIG_PATH};
use docchat::export::{self, ExportFormat};
use docchat::history::{self, TurnLog};
use docchat::{inspect, repl, server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docchat: chat with your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Chat with your documents, grounded answers with a general-knowledge fallback",
    version,
    long_about = "docchat indexes uploaded PDF and text documents in memory and answers questions \
    from the passages that match. Questions with no relevant passage are answered from general \
    knowledge. Backends: Google Gemini and Hugging Face, selected by which credential is set."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// A missing file at the default path means built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log progress to stderr (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat.
    ///
    /// Files and directories given here are uploaded before the first
    /// question. Type `/help` inside the session for commands.
    Chat {
        /// PDF, text, or Markdown files, or directories to search for them.
        paths: Vec<PathBuf>,

        /// Start in private mode: turns are not saved to the history log.
        #[arg(long)]
        private: bool,
    },

    /// Ask a single question and print the answer.
    Ask {
        question: String,

        /// Documents to ground the answer in (repeatable).
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,

        /// Do not save the turn to the history log.
        #[arg(long)]
        private: bool,
    },

    /// Chunk documents without embedding them and report the result.
    Inspect {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Browse, export, or clear the long-term turn log.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print shell completions.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored turns, newest first.
    List {
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Write every stored turn, oldest first.
    Export {
        /// Output file. Defaults to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },

    /// Delete all stored turns.
    Clear,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // No config needed
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "docchat", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Chat { paths, private } => {
            repl::run_chat(&cfg, &paths, private).await?;
        }
        Commands::Ask {
            question,
            files,
            private,
        } => {
            repl::run_ask(&cfg, &question, &files, private).await?;
        }
        Commands::Inspect { paths } => {
            inspect::run_inspect(&cfg, &paths)?;
        }
        Commands::History { action } => {
            let log = TurnLog::open(&cfg.history.path).await?;
            match action {
                HistoryAction::List { limit } => {
                    if matches!(limit, Some(l) if l < 1) {
                        anyhow::bail!("--limit must be >= 1");
                    }
                    history::run_list(&log, limit).await?;
                }
                HistoryAction::Export { output, format } => {
                    export::run_export(&log, output.as_deref(), format).await?;
                }
                HistoryAction::Clear => {
                    history::run_clear(&log).await?;
                }
            }
            log.close().await;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}
