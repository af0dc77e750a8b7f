//! `docchat chat` and `docchat ask`.
//!
//! The REPL reads one line at a time from stdin. Lines starting with `/`
//! are session commands; anything else is a question. The prompt marker is
//! only printed when stdin is a terminal so piped input produces clean
//! output.

use anyhow::Result;
use docchat_core::models::{Role, ScoredChunk};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::Reply;
use crate::config::Config;
use crate::session::ChatSession;
use crate::upload::load_documents;

const HELP: &str = "\
Commands:
  /upload <paths...>   index files or directories (replaces the current documents)
  /private on|off      stop or resume saving turns to the history log
  /clear               forget the conversation and the uploaded documents
  /history             show this session's conversation
  /help                show this help
  /quit                exit";

/// One parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Upload(Vec<PathBuf>),
    Private(bool),
    Clear,
    History,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Ask(line.to_string());
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match (name, args.as_slice()) {
        ("upload", []) => Command::Invalid("usage: /upload <paths...>".to_string()),
        ("upload", paths) => Command::Upload(paths.iter().map(PathBuf::from).collect()),
        ("private", ["on"]) => Command::Private(true),
        ("private", ["off"]) => Command::Private(false),
        ("private", _) => Command::Invalid("usage: /private on|off".to_string()),
        ("clear", []) => Command::Clear,
        ("history", []) => Command::History,
        ("help", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        _ => Command::Invalid(format!("unknown command: /{} (try /help)", name)),
    }
}

/// Interactive chat over stdin/stdout.
pub async fn run_chat(config: &Config, paths: &[PathBuf], private: bool) -> Result<()> {
    let session = ChatSession::from_config(config).await?;
    session.set_private(private);

    if !paths.is_empty() {
        upload(&session, paths).await?;
    }

    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        println!("docchat {}. Type /help for commands.", env!("CARGO_PKG_VERSION"));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::Invalid(msg) => eprintln!("{}", msg),
            Command::Upload(paths) => {
                if let Err(e) = upload(&session, &paths).await {
                    eprintln!("Upload failed: {:#}", e);
                }
            }
            Command::Private(enabled) => {
                session.set_private(enabled);
                println!(
                    "Private mode {}.",
                    if enabled { "on: turns are not saved" } else { "off" }
                );
            }
            Command::Clear => {
                session.clear().await;
                println!("Session cleared.");
            }
            Command::History => {
                let history = session.history().await;
                if history.is_empty() {
                    println!("No messages yet.");
                }
                for m in history {
                    let who = match m.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    println!("{}: {}", who, m.content);
                }
            }
            Command::Ask(query) => match session.ask(&query).await {
                Ok(reply) => print_reply(&reply),
                Err(e) => eprintln!("{}", e.user_message()),
            },
        }
    }

    if let Some(log) = session.turn_log() {
        log.clone().close().await;
    }
    Ok(())
}

/// One question, optionally grounded in `files`. Fails when the turn fails.
pub async fn run_ask(
    config: &Config,
    question: &str,
    files: &[PathBuf],
    private: bool,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let session = ChatSession::from_config(config).await?;
    session.set_private(private);
    if !files.is_empty() {
        upload(&session, files).await?;
    }

    let reply = session
        .ask(question)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    print_reply(&reply);
    Ok(())
}

async fn upload(session: &ChatSession, paths: &[PathBuf]) -> Result<()> {
    let docs = load_documents(paths)?;
    if docs.is_empty() {
        anyhow::bail!("no .pdf, .txt or .md files found");
    }

    let report = session.upload(docs).await?;
    for skipped in &report.skipped {
        eprintln!("skipped {}", skipped);
    }
    println!(
        "Indexed {} documents ({} chunks).",
        report.documents_indexed, report.chunks
    );
    Ok(())
}

fn print_reply(reply: &Reply) {
    println!("{}", reply.turn.response);
    if reply.is_grounded() {
        let sources = source_labels(reply.context.iter());
        println!("\n[{} · sources: {}]", reply.backend, sources.join(", "));
    } else {
        println!("\n[{} · general knowledge]", reply.backend);
    }
}

/// `"{source} p.{page}"` for each hit, first occurrence only, best hit first.
fn source_labels<'a>(hits: impl Iterator<Item = &'a ScoredChunk>) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.map(|h| format!("{} p.{}", h.chunk.source, h.chunk.page))
        .filter(|label| seen.insert(label.clone()))
        .collect()
}
