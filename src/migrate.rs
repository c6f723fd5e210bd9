use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent — safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One memory record per repository; the record body is JSON.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repository_memory (
            repository TEXT PRIMARY KEY,
            record TEXT NOT NULL,
            last_full_scan_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_leases (
            repository TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Unique per (repository, path, chunk_index); vectors are little-endian
    // f32 BLOBs.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            repository TEXT NOT NULL,
            path TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            vector BLOB NOT NULL,
            PRIMARY KEY (repository, path, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS suggestions (
            repository TEXT NOT NULL,
            suggestion_type TEXT NOT NULL,
            title TEXT NOT NULL,
            affected_files TEXT NOT NULL DEFAULT '[]',
            outcome TEXT NOT NULL DEFAULT 'pending'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_repo_path ON embeddings(repository, path)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_suggestions_repo_type ON suggestions(repository, suggestion_type)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
