use anyhow::Result;
use sqlx::SqlitePool;

/// Create the turn log schema. Safe to run on every open.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turns (
            id TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            response TEXT NOT NULL,
            backend TEXT NOT NULL,
            grounded INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_created_at ON turns(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
