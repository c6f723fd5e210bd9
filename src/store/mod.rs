//! Storage abstractions for the repository memory engine.
//!
//! Three capability traits keep the pipeline storage-engine-agnostic:
//! [`MemoryStore`] for the durable per-repository record,
//! [`VectorStore`] for chunk embeddings and similarity queries, and
//! [`SuggestionStore`] for read-only access to prior suggestions.
//!
//! Implementations must be `Send + Sync`; all operations are async (via
//! `async-trait`) so backends can be in-process or remote.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DetectedPattern, KeyFile, PriorSuggestion, RepositoryMemory};

/// One stored chunk embedding. Unique per
/// `(repository, path, chunk_index)` — re-ingestion overwrites, never
/// duplicates.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub repository: String,
    pub path: String,
    pub chunk_index: usize,
    /// Embedding-ready text representation, not the raw file content.
    pub content: String,
    pub content_hash: String,
    pub metadata: serde_json::Value,
    pub vector: Vec<f32>,
}

/// A similarity query hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub path: String,
    pub content: String,
    pub score: f32,
}

/// Partial update for a memory record. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub primary_languages: Option<Vec<String>>,
    pub frameworks: Option<Vec<String>>,
    pub build_tools: Option<Vec<String>>,
    pub testing_frameworks: Option<Vec<String>>,
    pub package_manager: Option<Option<String>>,
    pub key_files: Option<Vec<KeyFile>>,
    pub entry_points: Option<Vec<String>>,
    pub patterns: Option<Vec<DetectedPattern>>,
    pub tree_hash: Option<String>,
}

/// State of an ingest lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Pending,
    Running,
}

/// An explicit write lease for one repository, acquired before any memory
/// write and released on completion or failure. Replaces the advisory-only
/// freshness check for mutual exclusion.
#[derive(Debug, Clone)]
pub struct IngestLease {
    pub repository: String,
    pub state: LeaseState,
    pub expires_at: i64,
}

/// Result of a lease acquisition attempt.
#[derive(Debug, Clone)]
pub enum LeaseAcquisition {
    /// The lease was granted to this caller.
    Acquired(IngestLease),
    /// Another writer holds an unexpired lease.
    Held(IngestLease),
}

/// Durable per-repository memory record store.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Fetch the full memory record for a repository.
    async fn get(&self, repository: &str) -> Result<Option<RepositoryMemory>>;

    /// Replace the record with a full scan result.
    ///
    /// `last_full_scan_at` only advances: an incoming timestamp older than
    /// the stored one keeps the stored value.
    async fn upsert_full_scan(&self, memory: &RepositoryMemory) -> Result<()>;

    /// Apply a partial update without touching unspecified fields.
    /// Does not advance `last_full_scan_at`.
    async fn patch(&self, repository: &str, patch: &MemoryPatch) -> Result<()>;

    /// Lightweight read of the ranked language list only.
    async fn primary_languages(&self, repository: &str) -> Result<Vec<String>>;

    /// Try to acquire the ingest lease for a repository. An expired lease
    /// may be taken over.
    async fn acquire_lease(
        &self,
        repository: &str,
        now: i64,
        lease_secs: i64,
    ) -> Result<LeaseAcquisition>;

    /// Release the ingest lease. Safe to call when no lease is held.
    async fn release_lease(&self, repository: &str) -> Result<()>;
}

/// Vector-capable embedding store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite the embedding for `(repository, path,
    /// chunk_index)`.
    async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<()>;

    /// Delete every embedding for a file path. Returns the number removed.
    async fn delete_embeddings(&self, repository: &str, path: &str) -> Result<u64>;

    /// Fetch stored embeddings for exact paths.
    async fn get_by_paths(&self, repository: &str, paths: &[String]) -> Result<Vec<EmbeddingRecord>>;

    /// Stored content hashes for a path, keyed by chunk index. Used to skip
    /// re-embedding unchanged chunks.
    async fn existing_hashes(&self, repository: &str, path: &str) -> Result<Vec<(usize, String)>>;

    /// Rank stored chunks by cosine similarity to a query vector,
    /// excluding the given paths.
    async fn query_by_similarity(
        &self,
        repository: &str,
        vector: &[f32],
        exclude_paths: &[String],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Fetch chunks whose path falls directly under one of the given
    /// directories, excluding the given paths.
    async fn query_by_path_prefix(
        &self,
        repository: &str,
        dirs: &[String],
        exclude_paths: &[String],
        limit: usize,
    ) -> Result<Vec<EmbeddingRecord>>;

    /// Count live embeddings for a repository.
    async fn count(&self, repository: &str) -> Result<u64>;
}

/// Read-only access to prior suggestions for novelty comparison.
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    /// Prior suggestions of the given type whose affected files overlap
    /// the given set.
    async fn find_prior(
        &self,
        repository: &str,
        suggestion_type: &str,
        affected_files: &[String],
    ) -> Result<Vec<PriorSuggestion>>;
}
