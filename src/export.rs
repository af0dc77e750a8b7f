//! Export the turn log as JSON or a Markdown transcript.
//!
//! Turns are written oldest first. Output goes to a file when a path is
//! given, otherwise to stdout for piping.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use docchat_core::models::Turn;
use serde::Serialize;
use std::path::Path;

use crate::history::TurnLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

#[derive(Serialize)]
struct ExportData<'a> {
    exported_at: i64,
    turn_count: usize,
    turns: &'a [Turn],
}

pub fn render_json(turns: &[Turn]) -> Result<String> {
    let data = ExportData {
        exported_at: Utc::now().timestamp(),
        turn_count: turns.len(),
        turns,
    };
    Ok(serde_json::to_string_pretty(&data)?)
}

pub fn render_markdown(turns: &[Turn]) -> String {
    let mut out = String::from("# docchat transcript\n");
    for turn in turns {
        let when = Utc
            .timestamp_opt(turn.created_at, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| turn.created_at.to_string());
        let source = if turn.grounded {
            "documents"
        } else {
            "general"
        };
        out.push_str(&format!(
            "\n## {}\n\n_{} · {}_\n\n**You:** {}\n\n**Assistant:** {}\n",
            when, turn.backend, source, turn.query, turn.response
        ));
    }
    out
}

/// Export every stored turn in `format`.
pub async fn run_export(log: &TurnLog, output: Option<&Path>, format: ExportFormat) -> Result<()> {
    let mut turns = log.list(None).await?;
    turns.reverse();

    let rendered = match format {
        ExportFormat::Json => render_json(&turns)?,
        ExportFormat::Markdown => render_markdown(&turns),
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &rendered)?;
            eprintln!("Exported {} turns to {}", turns.len(), path.display());
        }
        None => {
            println!("{}", rendered);
        }
    }

    Ok(())
}
