//! Context retrieval for downstream analysis.
//!
//! Given an optional query and an optional set of affected files, assembles
//! a ranked list of prior chunks in three tiers:
//!
//! 1. **Exact** — chunks whose path is in the affected-files list, at
//!    similarity 1.0.
//! 2. **Semantic** — when a query is given and more results are needed,
//!    the query is embedded and remaining chunks are ranked by cosine
//!    similarity.
//! 3. **Directory fallback** — when still short of the limit, chunks from
//!    the affected files' parent directories at a fixed 0.5.
//!
//! The fallback tier guarantees some context is always returned when
//! affected files are known, even without a working semantic index.

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::embedder::{embed_query, Embedder};
use crate::languages::{extract_imports, Language};
use crate::models::{ContextItem, RepositoryMemory};
use crate::store::{MemoryStore, VectorStore};

const DIRECTORY_FALLBACK_SIMILARITY: f32 = 0.5;

pub struct ContextBuilder {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    memory: Arc<dyn MemoryStore>,
    /// Memory-record reads are cached per repository; retrieval may observe
    /// a record up to the TTL stale, never older.
    memory_cache: TtlCache<String, RepositoryMemory>,
}

impl ContextBuilder {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        memory: Arc<dyn MemoryStore>,
        memory_cache: TtlCache<String, RepositoryMemory>,
    ) -> Self {
        Self {
            vectors,
            embedder,
            memory,
            memory_cache,
        }
    }

    /// The cached memory record, refreshed from the store on a miss.
    pub async fn repository_memory(
        &self,
        repository: &str,
    ) -> Result<Option<RepositoryMemory>> {
        if let Some(record) = self.memory_cache.get(&repository.to_string()) {
            return Ok(Some(record));
        }
        let record = self.memory.get(repository).await?;
        if let Some(record) = &record {
            self.memory_cache
                .insert(repository.to_string(), record.clone());
        }
        Ok(record)
    }

    /// Retrieve ranked context for a repository.
    pub async fn get_context(
        &self,
        repository: &str,
        query: Option<&str>,
        affected_files: &[String],
        limit: usize,
    ) -> Result<Vec<ContextItem>> {
        let mut items: Vec<ContextItem> = Vec::new();
        let mut seen_paths: Vec<String> = Vec::new();

        // Tier 1: exact path matches.
        if !affected_files.is_empty() {
            for record in self.vectors.get_by_paths(repository, affected_files).await? {
                if !seen_paths.contains(&record.path) {
                    seen_paths.push(record.path.clone());
                }
                items.push(ContextItem {
                    path: record.path,
                    content: record.content,
                    similarity: 1.0,
                });
            }
        }

        // Tier 2: semantic matches against the query.
        if items.len() < limit {
            if let Some(query) = query {
                // A broken or disabled embedder degrades to the fallback
                // tier instead of failing retrieval.
                if let Ok(vector) = embed_query(self.embedder.as_ref(), query).await {
                    let hits = self
                        .vectors
                        .query_by_similarity(
                            repository,
                            &vector,
                            &seen_paths,
                            limit - items.len(),
                        )
                        .await?;
                    for hit in hits {
                        if !seen_paths.contains(&hit.path) {
                            seen_paths.push(hit.path.clone());
                        }
                        items.push(ContextItem {
                            path: hit.path,
                            content: hit.content,
                            similarity: hit.score,
                        });
                    }
                }
            }
        }

        // Tier 3: directory proximity.
        if items.len() < limit && !affected_files.is_empty() {
            let dirs = parent_directories(affected_files);
            let neighbors = self
                .vectors
                .query_by_path_prefix(repository, &dirs, &seen_paths, limit - items.len())
                .await?;
            for record in neighbors {
                if seen_paths.contains(&record.path) {
                    continue;
                }
                seen_paths.push(record.path.clone());
                items.push(ContextItem {
                    path: record.path,
                    content: record.content,
                    similarity: DIRECTORY_FALLBACK_SIMILARITY,
                });
            }
        }

        items.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        items.truncate(limit);
        Ok(items)
    }
}

/// Distinct parent directories of the given paths. A root-level file maps
/// to the empty directory.
pub fn parent_directories(paths: &[String]) -> Vec<String> {
    let mut dirs: BTreeSet<String> = BTreeSet::new();
    for path in paths {
        match path.rsplit_once('/') {
            Some((dir, _)) => dirs.insert(dir.to_string()),
            None => dirs.insert(String::new()),
        };
    }
    dirs.into_iter().collect()
}

/// Summary of a file set used to phrase retrieval context concisely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSetSummary {
    /// Imports appearing in more than one file, sorted.
    pub common_imports: Vec<String>,
    /// Longest directory prefix shared by every file (empty when none).
    pub common_prefix: String,
}

/// Compute the shared imports and the longest common directory prefix of a
/// file set.
pub fn summarize_files(files: &[(String, String)]) -> FileSetSummary {
    let mut import_counts: HashMap<String, usize> = HashMap::new();
    for (path, content) in files {
        let language = Language::from_path(path);
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for import in extract_imports(language, content) {
            seen.insert(import);
        }
        for import in seen {
            *import_counts.entry(import).or_insert(0) += 1;
        }
    }

    let mut common_imports: Vec<String> = import_counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(import, _)| import)
        .collect();
    common_imports.sort();

    let paths: Vec<&str> = files.iter().map(|(path, _)| path.as_str()).collect();
    FileSetSummary {
        common_imports,
        common_prefix: common_directory_prefix(&paths),
    }
}

fn common_directory_prefix(paths: &[&str]) -> String {
    let Some(first) = paths.first() else {
        return String::new();
    };
    let mut prefix: Vec<&str> = match first.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => return String::new(),
    };

    for path in &paths[1..] {
        let dir: Vec<&str> = match path.rsplit_once('/') {
            Some((dir, _)) => dir.split('/').collect(),
            None => return String::new(),
        };
        let shared = prefix
            .iter()
            .zip(dir.iter())
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(shared);
        if prefix.is_empty() {
            return String::new();
        }
    }

    prefix.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::DisabledEmbedder;
    use crate::models::Embedding;
    use crate::store::memory::{InMemoryMemoryStore, InMemoryVectorStore};
    use crate::store::EmbeddingRecord;
    use async_trait::async_trait;
    use std::time::Duration;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(texts
                .iter()
                .map(|_| Embedding {
                    vector: vec![1.0, 0.0],
                    token_count: 1,
                })
                .collect())
        }
    }

    fn record(path: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            repository: "owner/repo".to_string(),
            path: path.to_string(),
            chunk_index: 0,
            content: format!("content of {}", path),
            content_hash: format!("hash-{}", path),
            metadata: serde_json::Value::Null,
            vector,
        }
    }

    async fn seeded_builder(embedder: Arc<dyn Embedder>) -> ContextBuilder {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors
            .upsert_embedding(&record("src/components/Button.tsx", vec![1.0, 0.0]))
            .await
            .unwrap();
        vectors
            .upsert_embedding(&record("src/components/Input.tsx", vec![0.9, 0.1]))
            .await
            .unwrap();
        vectors
            .upsert_embedding(&record("src/services/auth.ts", vec![0.0, 1.0]))
            .await
            .unwrap();

        ContextBuilder::new(
            vectors,
            embedder,
            Arc::new(InMemoryMemoryStore::new()),
            TtlCache::new(Duration::from_secs(60)),
        )
    }

    #[tokio::test]
    async fn exact_matches_score_one() {
        let builder = seeded_builder(Arc::new(UnitEmbedder)).await;
        let items = builder
            .get_context(
                "owner/repo",
                None,
                &["src/services/auth.ts".to_string()],
                10,
            )
            .await
            .unwrap();

        assert_eq!(items[0].path, "src/services/auth.ts");
        assert_eq!(items[0].similarity, 1.0);
    }

    #[tokio::test]
    async fn semantic_matches_fill_remaining_slots() {
        let builder = seeded_builder(Arc::new(UnitEmbedder)).await;
        let items = builder
            .get_context("owner/repo", Some("button component"), &[], 2)
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].path, "src/components/Button.tsx");
        // Ranked output is non-increasing in similarity.
        assert!(items[0].similarity >= items[1].similarity);
    }

    #[tokio::test]
    async fn directory_fallback_without_semantic_index() {
        // Disabled embedder: tier 2 degrades, tier 3 still produces context.
        let builder = seeded_builder(Arc::new(DisabledEmbedder)).await;
        let items = builder
            .get_context(
                "owner/repo",
                Some("anything"),
                &["src/components/Button.tsx".to_string()],
                10,
            )
            .await
            .unwrap();

        assert!(items.iter().any(|i| i.path == "src/components/Button.tsx"
            && i.similarity == 1.0));
        assert!(items
            .iter()
            .any(|i| i.path == "src/components/Input.tsx" && i.similarity == 0.5));
    }

    #[tokio::test]
    async fn respects_limit_and_ordering() {
        let builder = seeded_builder(Arc::new(UnitEmbedder)).await;
        let items = builder
            .get_context(
                "owner/repo",
                Some("anything"),
                &["src/components/Button.tsx".to_string()],
                2,
            )
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        for pair in items.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn memory_reads_hit_the_cache_within_ttl() {
        use crate::models::RepositoryMemory;
        use crate::store::{LeaseAcquisition, MemoryPatch};
        use std::collections::BTreeMap;
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Delegating store that counts full-record reads.
        struct CountingMemoryStore {
            inner: InMemoryMemoryStore,
            reads: AtomicUsize,
        }

        #[async_trait]
        impl MemoryStore for CountingMemoryStore {
            async fn get(&self, repository: &str) -> Result<Option<RepositoryMemory>> {
                self.reads.fetch_add(1, Ordering::SeqCst);
                self.inner.get(repository).await
            }
            async fn upsert_full_scan(&self, memory: &RepositoryMemory) -> Result<()> {
                self.inner.upsert_full_scan(memory).await
            }
            async fn patch(&self, repository: &str, patch: &MemoryPatch) -> Result<()> {
                self.inner.patch(repository, patch).await
            }
            async fn primary_languages(&self, repository: &str) -> Result<Vec<String>> {
                self.inner.primary_languages(repository).await
            }
            async fn acquire_lease(
                &self,
                repository: &str,
                now: i64,
                lease_secs: i64,
            ) -> Result<LeaseAcquisition> {
                self.inner.acquire_lease(repository, now, lease_secs).await
            }
            async fn release_lease(&self, repository: &str) -> Result<()> {
                self.inner.release_lease(repository).await
            }
        }

        let store = Arc::new(CountingMemoryStore {
            inner: InMemoryMemoryStore::new(),
            reads: AtomicUsize::new(0),
        });
        store
            .upsert_full_scan(&RepositoryMemory {
                repository: "owner/repo".to_string(),
                primary_languages: vec!["typescript".to_string()],
                frameworks: vec![],
                build_tools: vec![],
                testing_frameworks: vec![],
                package_manager: None,
                directory_map: BTreeMap::new(),
                key_files: vec![],
                entry_points: vec![],
                repo_summary: "Repository (main) with 3 files.".to_string(),
                architecture_summary: String::new(),
                patterns: vec![],
                tree_hash: "abc".to_string(),
                last_full_scan_at: 1,
            })
            .await
            .unwrap();

        let builder = ContextBuilder::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(UnitEmbedder),
            Arc::clone(&store) as Arc<dyn MemoryStore>,
            TtlCache::new(Duration::from_secs(60)),
        );

        let first = builder.repository_memory("owner/repo").await.unwrap();
        let second = builder.repository_memory("owner/repo").await.unwrap();

        assert_eq!(first.unwrap().tree_hash, "abc");
        assert_eq!(second.unwrap().tree_hash, "abc");
        // The second read is served from the cache.
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parent_directories_deduplicate() {
        let dirs = parent_directories(&[
            "src/components/Button.tsx".to_string(),
            "src/components/Input.tsx".to_string(),
            "README.md".to_string(),
        ]);
        assert_eq!(dirs, vec!["".to_string(), "src/components".to_string()]);
    }

    #[test]
    fn summarize_shared_imports_and_prefix() {
        let files = vec![
            (
                "src/components/Button.tsx".to_string(),
                "import React from 'react';\nimport { theme } from '../theme';\n".to_string(),
            ),
            (
                "src/components/Input.tsx".to_string(),
                "import React from 'react';\nimport { log } from '../log';\n".to_string(),
            ),
        ];
        let summary = summarize_files(&files);
        assert_eq!(summary.common_imports, vec!["react".to_string()]);
        assert_eq!(summary.common_prefix, "src/components");
    }

    #[test]
    fn summarize_disjoint_paths_has_empty_prefix() {
        let files = vec![
            ("src/a.ts".to_string(), String::new()),
            ("lib/b.ts".to_string(), String::new()),
        ];
        assert_eq!(summarize_files(&files).common_prefix, "");
    }
}
