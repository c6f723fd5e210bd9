//! SQLite-backed storage.
//!
//! A single [`SqliteStore`] implements all three storage traits over one
//! connection pool. The memory record is stored as a JSON column keyed by
//! repository; embedding vectors are little-endian f32 BLOBs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedder::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{PriorSuggestion, RepositoryMemory, SuggestionOutcome};
use crate::store::{
    memory::apply_patch, EmbeddingRecord, IngestLease, LeaseAcquisition, LeaseState, MemoryPatch,
    MemoryStore, ScoredChunk, SuggestionStore, VectorStore,
};

/// SQLite implementation of the storage traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_record(&self, repository: &str) -> Result<Option<RepositoryMemory>> {
        let row = sqlx::query("SELECT record FROM repository_memory WHERE repository = ?")
            .bind(repository)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("record");
                let record: RepositoryMemory =
                    serde_json::from_str(&json).context("Corrupt memory record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn save_record(&self, record: &RepositoryMemory) -> Result<()> {
        let json = serde_json::to_string(record)?;
        sqlx::query(
            r#"
            INSERT INTO repository_memory (repository, record, last_full_scan_at)
            VALUES (?, ?, ?)
            ON CONFLICT(repository) DO UPDATE SET
                record = excluded.record,
                last_full_scan_at = excluded.last_full_scan_at
            "#,
        )
        .bind(&record.repository)
        .bind(&json)
        .bind(record.last_full_scan_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn get(&self, repository: &str) -> Result<Option<RepositoryMemory>> {
        self.load_record(repository).await
    }

    async fn upsert_full_scan(&self, memory: &RepositoryMemory) -> Result<()> {
        // last_full_scan_at only moves forward.
        let mut record = memory.clone();
        if let Some(existing) = self.load_record(&memory.repository).await? {
            record.last_full_scan_at = record.last_full_scan_at.max(existing.last_full_scan_at);
        }
        self.save_record(&record).await
    }

    async fn patch(&self, repository: &str, patch: &MemoryPatch) -> Result<()> {
        let Some(mut record) = self.load_record(repository).await? else {
            anyhow::bail!("No memory record for repository '{}'", repository);
        };
        apply_patch(&mut record, patch);
        self.save_record(&record).await
    }

    async fn primary_languages(&self, repository: &str) -> Result<Vec<String>> {
        Ok(self
            .load_record(repository)
            .await?
            .map(|r| r.primary_languages)
            .unwrap_or_default())
    }

    async fn acquire_lease(
        &self,
        repository: &str,
        now: i64,
        lease_secs: i64,
    ) -> Result<LeaseAcquisition> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT state, expires_at FROM ingest_leases WHERE repository = ?")
            .bind(repository)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = row {
            let expires_at: i64 = row.get("expires_at");
            if expires_at > now {
                let state: String = row.get("state");
                let state = if state == "running" {
                    LeaseState::Running
                } else {
                    LeaseState::Pending
                };
                tx.rollback().await?;
                return Ok(LeaseAcquisition::Held(IngestLease {
                    repository: repository.to_string(),
                    state,
                    expires_at,
                }));
            }
            // Expired lease: take it over.
        }

        let expires_at = now + lease_secs;
        sqlx::query(
            r#"
            INSERT INTO ingest_leases (repository, state, expires_at)
            VALUES (?, 'running', ?)
            ON CONFLICT(repository) DO UPDATE SET
                state = 'running',
                expires_at = excluded.expires_at
            "#,
        )
        .bind(repository)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(LeaseAcquisition::Acquired(IngestLease {
            repository: repository.to_string(),
            state: LeaseState::Running,
            expires_at,
        }))
    }

    async fn release_lease(&self, repository: &str) -> Result<()> {
        sqlx::query("DELETE FROM ingest_leases WHERE repository = ?")
            .bind(repository)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO embeddings (repository, path, chunk_index, content, content_hash, metadata, vector)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repository, path, chunk_index) DO UPDATE SET
                content = excluded.content,
                content_hash = excluded.content_hash,
                metadata = excluded.metadata,
                vector = excluded.vector
            "#,
        )
        .bind(&record.repository)
        .bind(&record.path)
        .bind(record.chunk_index as i64)
        .bind(&record.content)
        .bind(&record.content_hash)
        .bind(record.metadata.to_string())
        .bind(vec_to_blob(&record.vector))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_embeddings(&self, repository: &str, path: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embeddings WHERE repository = ? AND path = ?")
            .bind(repository)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_by_paths(
        &self,
        repository: &str,
        paths: &[String],
    ) -> Result<Vec<EmbeddingRecord>> {
        let mut out = Vec::new();
        for path in paths {
            let rows = sqlx::query(
                r#"
                SELECT path, chunk_index, content, content_hash, metadata, vector
                FROM embeddings
                WHERE repository = ? AND path = ?
                ORDER BY chunk_index
                "#,
            )
            .bind(repository)
            .bind(path)
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                out.push(row_to_record(repository, &row)?);
            }
        }
        Ok(out)
    }

    async fn existing_hashes(&self, repository: &str, path: &str) -> Result<Vec<(usize, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_index, content_hash FROM embeddings
            WHERE repository = ? AND path = ?
            ORDER BY chunk_index
            "#,
        )
        .bind(repository)
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let index: i64 = row.get("chunk_index");
                let hash: String = row.get("content_hash");
                (index as usize, hash)
            })
            .collect())
    }

    async fn query_by_similarity(
        &self,
        repository: &str,
        vector: &[f32],
        exclude_paths: &[String],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        // Brute-force scan: fetch candidate vectors and rank in memory.
        // Fine at repository scale; swap the backend for anything bigger.
        let rows = sqlx::query("SELECT path, content, vector FROM embeddings WHERE repository = ?")
            .bind(repository)
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let path: String = row.get("path");
                if exclude_paths.contains(&path) {
                    return None;
                }
                let blob: Vec<u8> = row.get("vector");
                let content: String = row.get("content");
                let score = cosine_similarity(vector, &blob_to_vec(&blob));
                Some(ScoredChunk {
                    path,
                    content,
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn query_by_path_prefix(
        &self,
        repository: &str,
        dirs: &[String],
        exclude_paths: &[String],
        limit: usize,
    ) -> Result<Vec<EmbeddingRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT path, chunk_index, content, content_hash, metadata, vector
            FROM embeddings
            WHERE repository = ?
            ORDER BY path, chunk_index
            "#,
        )
        .bind(repository)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for row in rows {
            if out.len() >= limit {
                break;
            }
            let path: String = row.get("path");
            if exclude_paths.contains(&path) {
                continue;
            }
            let in_dir = dirs.iter().any(|d| {
                if d.is_empty() {
                    !path.contains('/')
                } else {
                    path.starts_with(&format!("{}/", d))
                }
            });
            if in_dir {
                out.push(row_to_record(repository, &row)?);
            }
        }
        Ok(out)
    }

    async fn count(&self, repository: &str) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM embeddings WHERE repository = ?")
            .bind(repository)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }
}

#[async_trait]
impl SuggestionStore for SqliteStore {
    async fn find_prior(
        &self,
        repository: &str,
        suggestion_type: &str,
        affected_files: &[String],
    ) -> Result<Vec<PriorSuggestion>> {
        let rows = sqlx::query(
            r#"
            SELECT suggestion_type, title, affected_files, outcome
            FROM suggestions
            WHERE repository = ? AND suggestion_type = ? AND outcome != 'outdated'
            "#,
        )
        .bind(repository)
        .bind(suggestion_type)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for row in rows {
            let files_json: String = row.get("affected_files");
            let files: Vec<String> = serde_json::from_str(&files_json).unwrap_or_default();
            if !files.iter().any(|f| affected_files.contains(f)) {
                continue;
            }
            let outcome: String = row.get("outcome");
            out.push(PriorSuggestion {
                suggestion_type: row.get("suggestion_type"),
                title: row.get("title"),
                affected_files: files,
                outcome: parse_outcome(&outcome),
            });
        }
        Ok(out)
    }
}

fn parse_outcome(s: &str) -> SuggestionOutcome {
    match s {
        "accepted" => SuggestionOutcome::Accepted,
        "rejected" => SuggestionOutcome::Rejected,
        "outdated" => SuggestionOutcome::Outdated,
        _ => SuggestionOutcome::Pending,
    }
}

fn row_to_record(repository: &str, row: &sqlx::sqlite::SqliteRow) -> Result<EmbeddingRecord> {
    let index: i64 = row.get("chunk_index");
    let metadata_json: String = row.get("metadata");
    let blob: Vec<u8> = row.get("vector");
    Ok(EmbeddingRecord {
        repository: repository.to_string(),
        path: row.get("path"),
        chunk_index: index as usize,
        content: row.get("content"),
        content_hash: row.get("content_hash"),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
        vector: blob_to_vec(&blob),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn record(path: &str, chunk_index: usize, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            repository: "owner/repo".to_string(),
            path: path.to_string(),
            chunk_index,
            content: format!("content of {}", path),
            content_hash: format!("hash-{}-{}", path, chunk_index),
            metadata: serde_json::json!({"language": "typescript"}),
            vector,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_same_key() {
        let store = test_store().await;
        store
            .upsert_embedding(&record("src/a.ts", 0, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(&record("src/a.ts", 0, vec![0.0, 1.0]))
            .await
            .unwrap();

        assert_eq!(store.count("owner/repo").await.unwrap(), 1);
        let rows = store
            .get_by_paths("owner/repo", &["src/a.ts".to_string()])
            .await
            .unwrap();
        assert_eq!(rows[0].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn delete_scoped_to_path() {
        let store = test_store().await;
        store
            .upsert_embedding(&record("src/a.ts", 0, vec![1.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(&record("src/a.ts", 1, vec![1.0]))
            .await
            .unwrap();
        store
            .upsert_embedding(&record("src/b.ts", 0, vec![1.0]))
            .await
            .unwrap();

        let removed = store.delete_embeddings("owner/repo", "src/a.ts").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("owner/repo").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn similarity_ranks_descending() {
        let store = test_store().await;
        store
            .upsert_embedding(&record("src/close.ts", 0, vec![1.0, 0.1]))
            .await
            .unwrap();
        store
            .upsert_embedding(&record("src/far.ts", 0, vec![0.0, 1.0]))
            .await
            .unwrap();

        let hits = store
            .query_by_similarity("owner/repo", &[1.0, 0.0], &[], 10)
            .await
            .unwrap();
        assert_eq!(hits[0].path, "src/close.ts");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn memory_record_roundtrip_and_patch() {
        let store = test_store().await;
        let mut memory = RepositoryMemory {
            repository: "owner/repo".to_string(),
            primary_languages: vec!["typescript".to_string()],
            frameworks: vec![],
            build_tools: vec![],
            testing_frameworks: vec![],
            package_manager: None,
            directory_map: Default::default(),
            key_files: vec![],
            entry_points: vec![],
            repo_summary: String::new(),
            architecture_summary: String::new(),
            patterns: vec![],
            tree_hash: "t1".to_string(),
            last_full_scan_at: 100,
        };
        store.upsert_full_scan(&memory).await.unwrap();

        // Older full scan must not move the timestamp backwards.
        memory.last_full_scan_at = 50;
        memory.tree_hash = "t2".to_string();
        store.upsert_full_scan(&memory).await.unwrap();
        let loaded = store.get("owner/repo").await.unwrap().unwrap();
        assert_eq!(loaded.last_full_scan_at, 100);
        assert_eq!(loaded.tree_hash, "t2");

        let patch = MemoryPatch {
            frameworks: Some(vec!["next.js".to_string()]),
            ..Default::default()
        };
        store.patch("owner/repo", &patch).await.unwrap();
        let loaded = store.get("owner/repo").await.unwrap().unwrap();
        assert_eq!(loaded.frameworks, vec!["next.js"]);
        assert_eq!(loaded.primary_languages, vec!["typescript"]);
    }

    #[tokio::test]
    async fn lease_blocks_until_expiry() {
        let store = test_store().await;
        let first = store.acquire_lease("owner/repo", 1000, 900).await.unwrap();
        assert!(matches!(first, LeaseAcquisition::Acquired(_)));

        let second = store.acquire_lease("owner/repo", 1500, 900).await.unwrap();
        assert!(matches!(second, LeaseAcquisition::Held(_)));

        // Past expiry the lease may be taken over.
        let third = store.acquire_lease("owner/repo", 2000, 900).await.unwrap();
        assert!(matches!(third, LeaseAcquisition::Acquired(_)));

        store.release_lease("owner/repo").await.unwrap();
        let fourth = store.acquire_lease("owner/repo", 2001, 900).await.unwrap();
        assert!(matches!(fourth, LeaseAcquisition::Acquired(_)));
    }

    #[tokio::test]
    async fn find_prior_filters_type_overlap_and_outcome() {
        let store = test_store().await;
        for (ty, title, files, outcome) in [
            ("refactor", "Split the auth module", r#"["src/auth.ts"]"#, "pending"),
            ("refactor", "Old and gone", r#"["src/auth.ts"]"#, "outdated"),
            ("testing", "Add tests", r#"["src/auth.ts"]"#, "pending"),
            ("refactor", "Elsewhere", r#"["src/other.ts"]"#, "pending"),
        ] {
            sqlx::query(
                "INSERT INTO suggestions (repository, suggestion_type, title, affected_files, outcome) VALUES (?, ?, ?, ?, ?)",
            )
            .bind("owner/repo")
            .bind(ty)
            .bind(title)
            .bind(files)
            .bind(outcome)
            .execute(&store.pool)
            .await
            .unwrap();
        }

        let prior = store
            .find_prior("owner/repo", "refactor", &["src/auth.ts".to_string()])
            .await
            .unwrap();
        assert_eq!(prior.len(), 1);
        assert_eq!(prior[0].title, "Split the auth module");
    }
}
