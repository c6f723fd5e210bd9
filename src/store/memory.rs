//! In-memory store implementations for testing and embedded use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Similarity search is brute-force cosine over all stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedder::cosine_similarity;
use crate::models::{PriorSuggestion, RepositoryMemory, SuggestionOutcome};

use super::{
    EmbeddingRecord, IngestLease, LeaseAcquisition, LeaseState, MemoryPatch, MemoryStore,
    ScoredChunk, SuggestionStore, VectorStore,
};

/// In-memory [`MemoryStore`].
pub struct InMemoryMemoryStore {
    records: RwLock<HashMap<String, RepositoryMemory>>,
    leases: RwLock<HashMap<String, IngestLease>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            leases: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get(&self, repository: &str) -> Result<Option<RepositoryMemory>> {
        Ok(self.records.read().unwrap().get(repository).cloned())
    }

    async fn upsert_full_scan(&self, memory: &RepositoryMemory) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let mut incoming = memory.clone();
        if let Some(existing) = records.get(&memory.repository) {
            // The scan timestamp never moves backward.
            if existing.last_full_scan_at > incoming.last_full_scan_at {
                incoming.last_full_scan_at = existing.last_full_scan_at;
            }
        }
        records.insert(incoming.repository.clone(), incoming);
        Ok(())
    }

    async fn patch(&self, repository: &str, patch: &MemoryPatch) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(repository)
            .ok_or_else(|| anyhow::anyhow!("No memory record for '{}'", repository))?;
        apply_patch(record, patch);
        Ok(())
    }

    async fn primary_languages(&self, repository: &str) -> Result<Vec<String>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .get(repository)
            .map(|r| r.primary_languages.clone())
            .unwrap_or_default())
    }

    async fn acquire_lease(
        &self,
        repository: &str,
        now: i64,
        lease_secs: i64,
    ) -> Result<LeaseAcquisition> {
        let mut leases = self.leases.write().unwrap();
        if let Some(existing) = leases.get(repository) {
            if existing.expires_at > now {
                return Ok(LeaseAcquisition::Held(existing.clone()));
            }
        }
        let lease = IngestLease {
            repository: repository.to_string(),
            state: LeaseState::Running,
            expires_at: now + lease_secs,
        };
        leases.insert(repository.to_string(), lease.clone());
        Ok(LeaseAcquisition::Acquired(lease))
    }

    async fn release_lease(&self, repository: &str) -> Result<()> {
        self.leases.write().unwrap().remove(repository);
        Ok(())
    }
}

pub(crate) fn apply_patch(record: &mut RepositoryMemory, patch: &MemoryPatch) {
    if let Some(v) = &patch.primary_languages {
        record.primary_languages = v.clone();
    }
    if let Some(v) = &patch.frameworks {
        record.frameworks = v.clone();
    }
    if let Some(v) = &patch.build_tools {
        record.build_tools = v.clone();
    }
    if let Some(v) = &patch.testing_frameworks {
        record.testing_frameworks = v.clone();
    }
    if let Some(v) = &patch.package_manager {
        record.package_manager = v.clone();
    }
    if let Some(v) = &patch.key_files {
        record.key_files = v.clone();
    }
    if let Some(v) = &patch.entry_points {
        record.entry_points = v.clone();
    }
    if let Some(v) = &patch.patterns {
        record.patterns = v.clone();
    }
    if let Some(v) = &patch.tree_hash {
        record.tree_hash = v.clone();
    }
}

/// In-memory [`VectorStore`] with brute-force cosine search.
pub struct InMemoryVectorStore {
    // Keyed by (repository, path, chunk_index).
    rows: RwLock<Vec<EmbeddingRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        rows.retain(|r| {
            !(r.repository == record.repository
                && r.path == record.path
                && r.chunk_index == record.chunk_index)
        });
        rows.push(record.clone());
        Ok(())
    }

    async fn delete_embeddings(&self, repository: &str, path: &str) -> Result<u64> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.repository == repository && r.path == path));
        Ok((before - rows.len()) as u64)
    }

    async fn get_by_paths(
        &self,
        repository: &str,
        paths: &[String],
    ) -> Result<Vec<EmbeddingRecord>> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.repository == repository && paths.contains(&r.path))
            .cloned()
            .collect())
    }

    async fn existing_hashes(&self, repository: &str, path: &str) -> Result<Vec<(usize, String)>> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.repository == repository && r.path == path)
            .map(|r| (r.chunk_index, r.content_hash.clone()))
            .collect())
    }

    async fn query_by_similarity(
        &self,
        repository: &str,
        vector: &[f32],
        exclude_paths: &[String],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = self.rows.read().unwrap();
        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .filter(|r| r.repository == repository && !exclude_paths.contains(&r.path))
            .map(|r| ScoredChunk {
                path: r.path.clone(),
                content: r.content.clone(),
                score: cosine_similarity(vector, &r.vector),
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
        let rows = self.rows.read().unwrap();
        let mut matches: Vec<EmbeddingRecord> = rows
            .iter()
            .filter(|r| {
                r.repository == repository
                    && !exclude_paths.contains(&r.path)
                    && dirs.iter().any(|d| {
                        if d.is_empty() {
                            !r.path.contains('/')
                        } else {
                            r.path.starts_with(&format!("{d}/"))
                        }
                    })
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn count(&self, repository: &str) -> Result<u64> {
        let rows = self.rows.read().unwrap();
        Ok(rows.iter().filter(|r| r.repository == repository).count() as u64)
    }
}

/// In-memory [`SuggestionStore`], preloaded with prior suggestions.
pub struct InMemorySuggestionStore {
    suggestions: RwLock<Vec<(String, PriorSuggestion)>>,
}

impl InMemorySuggestionStore {
    pub fn new() -> Self {
        Self {
            suggestions: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, repository: &str, suggestion: PriorSuggestion) {
        self.suggestions
            .write()
            .unwrap()
            .push((repository.to_string(), suggestion));
    }
}

impl Default for InMemorySuggestionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SuggestionStore for InMemorySuggestionStore {
    async fn find_prior(
        &self,
        repository: &str,
        suggestion_type: &str,
        affected_files: &[String],
    ) -> Result<Vec<PriorSuggestion>> {
        let suggestions = self.suggestions.read().unwrap();
        Ok(suggestions
            .iter()
            .filter(|(repo, s)| {
                repo == repository
                    && s.suggestion_type == suggestion_type
                    && s.outcome != SuggestionOutcome::Outdated
                    && s.affected_files.iter().any(|f| affected_files.contains(f))
            })
            .map(|(_, s)| s.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SuggestionOutcome;
    use std::collections::BTreeMap;

    fn record(path: &str, chunk_index: usize, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            repository: "repo".to_string(),
            path: path.to_string(),
            chunk_index,
            content: format!("content of {path}"),
            content_hash: format!("hash-{path}-{chunk_index}"),
            metadata: serde_json::json!({}),
            vector,
        }
    }

    fn memory(repo: &str, scanned_at: i64) -> RepositoryMemory {
        RepositoryMemory {
            repository: repo.to_string(),
            primary_languages: vec!["typescript".to_string()],
            frameworks: vec![],
            build_tools: vec![],
            testing_frameworks: vec![],
            package_manager: None,
            directory_map: BTreeMap::new(),
            key_files: vec![],
            entry_points: vec![],
            repo_summary: String::new(),
            architecture_summary: String::new(),
            patterns: vec![],
            tree_hash: String::new(),
            last_full_scan_at: scanned_at,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_same_key() {
        let store = InMemoryVectorStore::new();
        store.upsert_embedding(&record("src/a.ts", 0, vec![1.0, 0.0])).await.unwrap();
        store.upsert_embedding(&record("src/a.ts", 0, vec![0.0, 1.0])).await.unwrap();
        assert_eq!(store.count("repo").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn distinct_chunk_indices_coexist() {
        let store = InMemoryVectorStore::new();
        store.upsert_embedding(&record("src/a.ts", 0, vec![1.0, 0.0])).await.unwrap();
        store.upsert_embedding(&record("src/a.ts", 1, vec![0.0, 1.0])).await.unwrap();
        assert_eq!(store.count("repo").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_removes_only_target_path() {
        let store = InMemoryVectorStore::new();
        store.upsert_embedding(&record("src/a.ts", 0, vec![1.0])).await.unwrap();
        store.upsert_embedding(&record("src/a.ts", 1, vec![1.0])).await.unwrap();
        store.upsert_embedding(&record("src/b.ts", 0, vec![1.0])).await.unwrap();
        let removed = store.delete_embeddings("repo", "src/a.ts").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("repo").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn similarity_results_are_ranked() {
        let store = InMemoryVectorStore::new();
        store.upsert_embedding(&record("a.ts", 0, vec![1.0, 0.0])).await.unwrap();
        store.upsert_embedding(&record("b.ts", 0, vec![0.7, 0.7])).await.unwrap();
        store.upsert_embedding(&record("c.ts", 0, vec![0.0, 1.0])).await.unwrap();

        let hits = store
            .query_by_similarity("repo", &[1.0, 0.0], &[], 10)
            .await
            .unwrap();
        assert_eq!(hits[0].path, "a.ts");
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn path_prefix_query_matches_direct_children() {
        let store = InMemoryVectorStore::new();
        store.upsert_embedding(&record("src/components/A.tsx", 0, vec![1.0])).await.unwrap();
        store.upsert_embedding(&record("src/services/s.ts", 0, vec![1.0])).await.unwrap();

        let hits = store
            .query_by_path_prefix("repo", &["src/components".to_string()], &[], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/components/A.tsx");
    }

    #[tokio::test]
    async fn scan_timestamp_never_regresses() {
        let store = InMemoryMemoryStore::new();
        store.upsert_full_scan(&memory("r", 1000)).await.unwrap();
        store.upsert_full_scan(&memory("r", 500)).await.unwrap();
        let record = store.get("r").await.unwrap().unwrap();
        assert_eq!(record.last_full_scan_at, 1000);
    }

    #[tokio::test]
    async fn patch_updates_only_given_fields() {
        let store = InMemoryMemoryStore::new();
        store.upsert_full_scan(&memory("r", 1000)).await.unwrap();
        let patch = MemoryPatch {
            frameworks: Some(vec!["next.js".to_string()]),
            ..MemoryPatch::default()
        };
        store.patch("r", &patch).await.unwrap();
        let record = store.get("r").await.unwrap().unwrap();
        assert_eq!(record.frameworks, vec!["next.js".to_string()]);
        assert_eq!(record.primary_languages, vec!["typescript".to_string()]);
    }

    #[tokio::test]
    async fn lease_blocks_second_writer_until_expiry() {
        let store = InMemoryMemoryStore::new();
        let first = store.acquire_lease("r", 100, 60).await.unwrap();
        assert!(matches!(first, LeaseAcquisition::Acquired(_)));

        let second = store.acquire_lease("r", 120, 60).await.unwrap();
        assert!(matches!(second, LeaseAcquisition::Held(_)));

        // Expired lease can be taken over.
        let third = store.acquire_lease("r", 200, 60).await.unwrap();
        assert!(matches!(third, LeaseAcquisition::Acquired(_)));

        store.release_lease("r").await.unwrap();
        let fourth = store.acquire_lease("r", 201, 60).await.unwrap();
        assert!(matches!(fourth, LeaseAcquisition::Acquired(_)));
    }

    #[tokio::test]
    async fn suggestion_store_filters_type_overlap_and_outcome() {
        let store = InMemorySuggestionStore::new();
        store.insert(
            "r",
            PriorSuggestion {
                suggestion_type: "refactor".to_string(),
                title: "Extract validation".to_string(),
                affected_files: vec!["src/a.ts".to_string()],
                outcome: SuggestionOutcome::Pending,
            },
        );
        store.insert(
            "r",
            PriorSuggestion {
                suggestion_type: "refactor".to_string(),
                title: "Old and gone".to_string(),
                affected_files: vec!["src/a.ts".to_string()],
                outcome: SuggestionOutcome::Outdated,
            },
        );
        store.insert(
            "r",
            PriorSuggestion {
                suggestion_type: "security".to_string(),
                title: "Different type".to_string(),
                affected_files: vec!["src/a.ts".to_string()],
                outcome: SuggestionOutcome::Pending,
            },
        );

        let found = store
            .find_prior("r", "refactor", &["src/a.ts".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Extract validation");
    }
}
