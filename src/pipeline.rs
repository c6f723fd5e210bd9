//! Batched chunk-and-embed pipeline.
//!
//! Files are processed in fixed-size batches: fetch and chunk concurrently
//! within a batch, then one embedding call per batch, then the upserts.
//! Batches run serially with a pacing delay between them so the embedding
//! API's rate limits are respected. Chunks whose content hash already exists
//! at the same chunk index are skipped without an embedding call, which is
//! what makes re-ingestion and incremental updates cheap.
//!
//! Failures are contained: a file that cannot be fetched or chunked becomes
//! a file-scoped error and the batch continues; a failed embedding call
//! drops that batch's vectors behind a batch-scoped error. Only the caller
//! decides whether accumulated errors are fatal.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::chunker::{chunk_file, ChunkOptions};
use crate::embedder::Embedder;
use crate::error::IngestErrorRecord;
use crate::models::{ChunkKind, CodeChunk};
use crate::progress::{CancelFlag, IngestPhase, ProgressEvent, ProgressReporter};
use crate::sources::SourceTree;
use crate::store::{EmbeddingRecord, VectorStore};

/// What one pipeline run produced.
#[derive(Debug, Default)]
pub struct EmbedOutcome {
    pub files_processed: usize,
    pub embeddings_created: usize,
    pub errors: Vec<IngestErrorRecord>,
    /// True when the run stopped early on a cancellation request.
    pub cancelled: bool,
}

/// One file's chunks, ready for embedding decisions.
struct PreparedFile {
    path: String,
    chunks: Vec<CodeChunk>,
}

/// A chunk that actually needs an embedding call.
struct PendingChunk {
    path: String,
    chunk_index: usize,
    chunk: CodeChunk,
    text: String,
}

pub struct EmbedPipeline {
    pub source: Arc<dyn SourceTree>,
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorStore>,
    pub chunk_opts: ChunkOptions,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub embed_delay: Duration,
}

impl EmbedPipeline {
    /// Chunk and embed the given files for a repository.
    ///
    /// `language_hint` applies to every file that has no recognizable
    /// extension; per-file detection still wins when it succeeds.
    pub async fn embed_files(
        &self,
        repository: &str,
        paths: &[String],
        language_hint: Option<&str>,
        progress: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<EmbedOutcome> {
        let mut outcome = EmbedOutcome::default();
        let total = paths.len() as u64;
        let hint = language_hint.map(|s| s.to_string());

        for (batch_index, batch) in paths.chunks(self.batch_size.max(1)).enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if batch_index > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }

            let prepared = self
                .fetch_and_chunk_batch(batch, hint.as_deref(), &mut outcome.errors)
                .await;

            let mut pending: Vec<PendingChunk> = Vec::new();
            let mut full_rewrites: Vec<String> = Vec::new();

            for file in &prepared {
                let stored = self
                    .vectors
                    .existing_hashes(repository, &file.path)
                    .await?;

                if stored.len() != file.chunks.len() {
                    // Chunk count changed: stale indices would linger, so the
                    // whole path is rewritten. A file that now chunks to
                    // nothing has no embed call to piggyback on, so its old
                    // rows are deleted here.
                    if !stored.is_empty() {
                        if file.chunks.is_empty() {
                            self.vectors
                                .delete_embeddings(repository, &file.path)
                                .await?;
                        } else {
                            full_rewrites.push(file.path.clone());
                        }
                    }
                    for (index, chunk) in file.chunks.iter().enumerate() {
                        pending.push(self.pending(file, index, chunk));
                    }
                } else {
                    for (index, chunk) in file.chunks.iter().enumerate() {
                        let unchanged = stored
                            .iter()
                            .any(|(i, hash)| *i == index && *hash == chunk.content_hash);
                        if !unchanged {
                            pending.push(self.pending(file, index, chunk));
                        }
                    }
                }
            }

            outcome.files_processed += prepared.len();

            if !pending.is_empty() {
                if outcome.embeddings_created > 0 {
                    // Embedding API pacing is stricter than batch pacing.
                    tokio::time::sleep(self.embed_delay).await;
                }

                let texts: Vec<String> = pending.iter().map(|p| p.text.clone()).collect();
                match self.embedder.embed_batch(&texts).await {
                    Ok(embeddings) => {
                        for path in &full_rewrites {
                            self.vectors.delete_embeddings(repository, path).await?;
                        }
                        for (item, embedding) in pending.iter().zip(embeddings) {
                            self.vectors
                                .upsert_embedding(&EmbeddingRecord {
                                    repository: repository.to_string(),
                                    path: item.path.clone(),
                                    chunk_index: item.chunk_index,
                                    content: item.text.clone(),
                                    content_hash: item.chunk.content_hash.clone(),
                                    metadata: chunk_metadata(&item.chunk),
                                    vector: embedding.vector,
                                })
                                .await?;
                            outcome.embeddings_created += 1;
                        }
                    }
                    Err(e) => {
                        outcome
                            .errors
                            .push(IngestErrorRecord::batch(batch_index, e));
                    }
                }
            }

            progress.report(ProgressEvent {
                phase: IngestPhase::Embedding,
                total_files: total,
                processed_files: outcome.files_processed as u64,
                current_file: batch.last().cloned(),
                errors: outcome.errors.len() as u64,
            });
        }

        Ok(outcome)
    }

    /// Fetch and chunk one batch concurrently. Fetch or decode failures
    /// become file-scoped errors; missing files are skipped silently since
    /// the tree listing may be slightly stale.
    async fn fetch_and_chunk_batch(
        &self,
        batch: &[String],
        language_hint: Option<&str>,
        errors: &mut Vec<IngestErrorRecord>,
    ) -> Vec<PreparedFile> {
        let mut set = JoinSet::new();
        for path in batch {
            let source = Arc::clone(&self.source);
            let path = path.clone();
            let opts = self.chunk_opts.clone();
            let hint = language_hint.map(|s| s.to_string());
            set.spawn(async move {
                let content = source.get_file_content(&path).await;
                (path, content, opts, hint)
            });
        }

        let mut prepared = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (path, content, opts, hint) = match joined {
                Ok(v) => v,
                Err(e) => {
                    errors.push(IngestErrorRecord::file("<unknown>", e));
                    continue;
                }
            };
            match content {
                Ok(Some(file)) => {
                    let chunks = chunk_file(&path, &file.content, hint.as_deref(), &opts);
                    prepared.push(PreparedFile { path, chunks });
                }
                Ok(None) => {}
                Err(e) => errors.push(IngestErrorRecord::file(path, e)),
            }
        }

        // JoinSet completion order is nondeterministic.
        prepared.sort_by(|a, b| a.path.cmp(&b.path));
        prepared
    }

    fn pending(&self, file: &PreparedFile, index: usize, chunk: &CodeChunk) -> PendingChunk {
        PendingChunk {
            path: file.path.clone(),
            chunk_index: index,
            chunk: chunk.clone(),
            text: prepare_chunk_text(&file.path, chunk),
        }
    }
}

/// Build the embedding-ready text for a chunk: a short header naming the
/// file, language, and declaration, then the chunk content. The header keeps
/// retrieval matches anchored to real paths.
pub fn prepare_chunk_text(path: &str, chunk: &CodeChunk) -> String {
    let mut text = format!("File: {}\n", path);
    if let Some(language) = &chunk.language {
        text.push_str(&format!("Language: {}\n", language));
    }
    if let Some(name) = &chunk.name {
        text.push_str(&format!("Symbol: {} ({})\n", name, kind_label(chunk.kind)));
    }
    if !chunk.imports.is_empty() {
        let shown: Vec<&str> = chunk.imports.iter().take(5).map(|s| s.as_str()).collect();
        text.push_str(&format!("Imports: {}\n", shown.join(", ")));
    }
    text.push('\n');
    text.push_str(&chunk.content);
    text
}

fn kind_label(kind: ChunkKind) -> &'static str {
    match kind {
        ChunkKind::File => "file",
        ChunkKind::Function => "function",
        ChunkKind::Class => "class",
        ChunkKind::Module => "module",
        ChunkKind::Section => "section",
    }
}

fn chunk_metadata(chunk: &CodeChunk) -> serde_json::Value {
    serde_json::json!({
        "language": chunk.language,
        "kind": kind_label(chunk.kind),
        "name": chunk.name,
        "start_line": chunk.start_line,
        "end_line": chunk.end_line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::hash_content;
    use crate::models::Embedding;
    use crate::progress::NoProgress;
    use crate::store::memory::InMemoryVectorStore;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubTree {
        files: HashMap<String, String>,
    }

    #[async_trait]
    impl SourceTree for StubTree {
        async fn list_tree(&self) -> Result<Vec<crate::models::TreeItem>> {
            Ok(Vec::new())
        }
        async fn get_file_content(
            &self,
            path: &str,
        ) -> Result<Option<crate::models::FileContent>> {
            if path == "src/broken.ts" {
                bail!("read error");
            }
            Ok(self.files.get(path).map(|c| crate::models::FileContent {
                content: c.clone(),
                size: c.len() as u64,
            }))
        }
        async fn language_stats(&self) -> Result<HashMap<String, u64>> {
            Ok(HashMap::new())
        }
    }

    /// Deterministic embedder: the vector encodes the text length, and every
    /// call is counted so tests can assert on skip behavior.
    struct StubEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("embedding unavailable");
            }
            Ok(texts
                .iter()
                .map(|t| Embedding {
                    vector: vec![t.len() as f32, 1.0],
                    token_count: t.len() / 4,
                })
                .collect())
        }
    }

    fn pipeline(
        files: &[(&str, &str)],
        embedder: StubEmbedder,
    ) -> (EmbedPipeline, Arc<InMemoryVectorStore>) {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let tree = StubTree {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        };
        let pipeline = EmbedPipeline {
            source: Arc::new(tree),
            embedder: Arc::new(embedder),
            vectors: Arc::clone(&vectors) as Arc<dyn VectorStore>,
            chunk_opts: ChunkOptions {
                max_chunk_size: 2000,
                min_chunk_size: 1,
                overlap_lines: 2,
            },
            batch_size: 2,
            batch_delay: Duration::ZERO,
            embed_delay: Duration::ZERO,
        };
        (pipeline, vectors)
    }

    #[tokio::test]
    async fn embeds_each_small_file_once() {
        let (pipeline, vectors) = pipeline(
            &[
                ("src/a.ts", "export const a = 1;\n"),
                ("src/b.ts", "export const b = 2;\n"),
                ("src/c.ts", "export const c = 3;\n"),
            ],
            StubEmbedder::new(),
        );
        let paths: Vec<String> = ["src/a.ts", "src/b.ts", "src/c.ts"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let outcome = pipeline
            .embed_files("owner/repo", &paths, None, &NoProgress, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.files_processed, 3);
        assert_eq!(outcome.embeddings_created, 3);
        assert!(outcome.errors.is_empty());
        assert_eq!(vectors.count("owner/repo").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn unchanged_chunks_skip_embedding_calls() {
        let (pipeline, _vectors) = pipeline(
            &[("src/a.ts", "export const a = 1;\n")],
            StubEmbedder::new(),
        );
        let paths = vec!["src/a.ts".to_string()];

        pipeline
            .embed_files("owner/repo", &paths, None, &NoProgress, &CancelFlag::new())
            .await
            .unwrap();
        let second = pipeline
            .embed_files("owner/repo", &paths, None, &NoProgress, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(second.embeddings_created, 0);
    }

    #[tokio::test]
    async fn file_shrunk_below_min_size_loses_stale_embeddings() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let opts = ChunkOptions {
            max_chunk_size: 2000,
            min_chunk_size: 10,
            overlap_lines: 2,
        };
        let with_content = |content: &str| EmbedPipeline {
            source: Arc::new(StubTree {
                files: [("src/a.ts".to_string(), content.to_string())]
                    .into_iter()
                    .collect(),
            }),
            embedder: Arc::new(StubEmbedder::new()),
            vectors: Arc::clone(&vectors) as Arc<dyn VectorStore>,
            chunk_opts: opts.clone(),
            batch_size: 2,
            batch_delay: Duration::ZERO,
            embed_delay: Duration::ZERO,
        };
        let paths = vec!["src/a.ts".to_string()];

        with_content("export function original(a: number, b: number) {\n  return a + b;\n}\n")
            .embed_files("owner/repo", &paths, None, &NoProgress, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(vectors.count("owner/repo").await.unwrap(), 1);

        // The new content chunks to nothing; the old row must still go.
        let outcome = with_content("x\n")
            .embed_files("owner/repo", &paths, None, &NoProgress, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.embeddings_created, 0);
        assert!(outcome.errors.is_empty());
        assert_eq!(vectors.count("owner/repo").await.unwrap(), 0);
        assert!(vectors
            .get_by_paths("owner/repo", &paths)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_is_file_scoped_and_run_continues() {
        let (pipeline, _vectors) = pipeline(
            &[("src/a.ts", "export const a = 1;\n")],
            StubEmbedder::new(),
        );
        let paths = vec!["src/broken.ts".to_string(), "src/a.ts".to_string()];

        let outcome = pipeline
            .embed_files("owner/repo", &paths, None, &NoProgress, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.embeddings_created, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            &outcome.errors[0].scope,
            crate::error::ErrorScope::File { path } if path == "src/broken.ts"
        ));
    }

    #[tokio::test]
    async fn embed_failure_is_batch_scoped() {
        let mut embedder = StubEmbedder::new();
        embedder.fail = true;
        let (pipeline, vectors) = pipeline(&[("src/a.ts", "export const a = 1;\n")], embedder);
        let paths = vec!["src/a.ts".to_string()];

        let outcome = pipeline
            .embed_files("owner/repo", &paths, None, &NoProgress, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.embeddings_created, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            &outcome.errors[0].scope,
            crate::error::ErrorScope::Batch { index: 0 }
        ));
        assert_eq!(vectors.count("owner/repo").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancellation_stops_between_batches() {
        let (pipeline, _vectors) = pipeline(
            &[
                ("src/a.ts", "export const a = 1;\n"),
                ("src/b.ts", "export const b = 2;\n"),
            ],
            StubEmbedder::new(),
        );
        let cancel = CancelFlag::new();
        cancel.cancel();
        let paths = vec!["src/a.ts".to_string(), "src/b.ts".to_string()];

        let outcome = pipeline
            .embed_files("owner/repo", &paths, None, &NoProgress, &cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.files_processed, 0);
    }

    #[test]
    fn chunk_text_header_names_path_and_symbol() {
        let content = "export function greet() {}".to_string();
        let chunk = CodeChunk {
            content_hash: hash_content(&content),
            content,
            start_line: 1,
            end_line: 1,
            kind: ChunkKind::Function,
            name: Some("greet".to_string()),
            language: Some("typescript".to_string()),
            imports: vec!["react".to_string()],
            exports: vec!["greet".to_string()],
        };
        let text = prepare_chunk_text("src/greet.ts", &chunk);
        assert!(text.starts_with("File: src/greet.ts\n"));
        assert!(text.contains("Language: typescript"));
        assert!(text.contains("Symbol: greet (function)"));
        assert!(text.contains("Imports: react"));
        assert!(text.ends_with("export function greet() {}"));
    }
}
