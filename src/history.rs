//! Long-term turn log in SQLite.
//!
//! Separate from the in-session conversation history: the session keeps
//! the messages sent to the model, the turn log keeps completed turns
//! across runs for browsing and export. Private mode never writes here.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use docchat_core::models::Turn;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::migrate;

#[derive(Debug, Clone)]
pub struct TurnLog {
    pool: SqlitePool,
}

impl TurnLog {
    /// Open the log at `path`, creating the database and schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn append(&self, turn: &Turn) -> Result<()> {
        sqlx::query(
            "INSERT INTO turns (id, query, response, backend, grounded, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.id)
        .bind(&turn.query)
        .bind(&turn.response)
        .bind(&turn.backend)
        .bind(turn.grounded)
        .bind(turn.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stored turns, newest first.
    pub async fn list(&self, limit: Option<i64>) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            "SELECT id, query, response, backend, grounded, created_at \
             FROM turns ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Turn {
                id: row.get("id"),
                query: row.get("query"),
                response: row.get("response"),
                backend: row.get("backend"),
                grounded: row.get("grounded"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM turns")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Delete every stored turn, returning how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM turns").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// `docchat history list`: print stored turns, newest first.
pub async fn run_list(log: &TurnLog, limit: Option<i64>) -> Result<()> {
    let turns = log.list(limit).await?;
    if turns.is_empty() {
        println!("No stored turns.");
        return Ok(());
    }

    let total = log.count().await?;
    println!("{} of {} stored turns:\n", turns.len(), total);
    for turn in &turns {
        let when = Utc
            .timestamp_opt(turn.created_at, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| turn.created_at.to_string());
        let source = if turn.grounded { "documents" } else { "general" };
        println!("{}  [{}, {}]  {}", when, turn.backend, source, preview(&turn.query, 60));
        println!("    {}", preview(&turn.response, 76));
    }
    Ok(())
}

/// `docchat history clear`.
pub async fn run_clear(log: &TurnLog) -> Result<()> {
    let removed = log.clear().await?;
    println!("Deleted {} stored turns.", removed);
    Ok(())
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(query: &str, created_at: i64) -> Turn {
        let mut t = Turn::new(query, format!("answer to {}", query), "gemini", false);
        t.created_at = created_at;
        t
    }

    #[tokio::test]
    async fn test_append_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = TurnLog::open(&dir.path().join("data/turns.sqlite"))
            .await
            .unwrap();

        let mut grounded = turn("first", 100);
        grounded.grounded = true;
        log.append(&grounded).await.unwrap();
        log.append(&turn("second", 200)).await.unwrap();
        log.append(&turn("third", 200)).await.unwrap();

        let all = log.list(None).await.unwrap();
        let queries: Vec<&str> = all.iter().map(|t| t.query.as_str()).collect();
        assert_eq!(queries, vec!["third", "second", "first"]);
        assert_eq!(all[2], grounded);

        assert_eq!(log.list(Some(1)).await.unwrap().len(), 1);
        assert_eq!(log.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let log = TurnLog::open(&dir.path().join("t.sqlite")).await.unwrap();
        log.append(&turn("a", 1)).await.unwrap();
        log.append(&turn("b", 2)).await.unwrap();
        assert_eq!(log.clear().await.unwrap(), 2);
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b", 10), "a b");
        assert_eq!(preview("abcdefghij", 4), "abcd...");
    }

    #[tokio::test]
    async fn test_reopen_keeps_turns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.sqlite");
        let log = TurnLog::open(&path).await.unwrap();
        log.append(&turn("persisted", 5)).await.unwrap();
        log.close().await;

        let log = TurnLog::open(&path).await.unwrap();
        assert_eq!(log.list(None).await.unwrap()[0].query, "persisted");
    }
}
