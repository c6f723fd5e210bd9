//! Ingestion orchestrator.
//!
//! Drives a full scan end to end: freshness guard, lease acquisition, tree
//! listing, analysis, batched embedding, and the final memory upsert. Also
//! handles incremental updates for changed-file sets so a push never forces
//! a full re-scan.
//!
//! Write safety rests on two mechanisms. The freshness guard makes repeat
//! runs cheap; the ingest lease makes concurrent runs safe. The lease is
//! released on every exit path, including failures, so a crashed run only
//! blocks others until the lease expires.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::{IngestError, IngestErrorRecord};
use crate::filters::FileFilter;
use crate::models::{
    ChangeKind, ChangedFile, RepositoryMemory, TreeItem, TreeItemKind,
};
use crate::patterns::analyze_patterns;
use crate::pipeline::EmbedPipeline;
use crate::progress::{CancelFlag, IngestPhase, ProgressEvent, ProgressReporter};
use crate::scanner::{scan_tree, tree_hash};
use crate::sources::{rank_languages, SourceTree};
use crate::store::{LeaseAcquisition, MemoryStore, VectorStore};

/// How a full ingestion run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Completed,
    /// The memory record was fresh enough; nothing ran.
    SkippedFresh,
    /// The tree fingerprint matched the stored one; nothing changed.
    SkippedUnchanged,
    Cancelled,
}

/// Summary of one full ingestion run.
#[derive(Debug)]
pub struct IngestionResult {
    pub status: IngestStatus,
    pub files_processed: usize,
    pub embeddings_created: usize,
    pub languages_detected: Vec<String>,
    pub frameworks_detected: Vec<String>,
    pub patterns_identified: usize,
    pub summary: String,
    pub errors: Vec<IngestErrorRecord>,
}

impl IngestionResult {
    fn skipped(status: IngestStatus) -> Self {
        Self {
            status,
            files_processed: 0,
            embeddings_created: 0,
            languages_detected: Vec::new(),
            frameworks_detected: Vec::new(),
            patterns_identified: 0,
            summary: String::new(),
            errors: Vec::new(),
        }
    }
}

/// Summary of one incremental update.
#[derive(Debug, Default)]
pub struct UpdateResult {
    pub updated: usize,
    pub removed: usize,
    pub errors: Vec<IngestErrorRecord>,
}

/// Knobs for one ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Bypass the freshness guard and the tree-hash short-circuit.
    pub force: bool,
    /// Scan and analyze, but write nothing and embed nothing.
    pub dry_run: bool,
}

pub struct Ingestor {
    repository: String,
    source: Arc<dyn SourceTree>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    memory: Arc<dyn MemoryStore>,
    config: Config,
}

impl Ingestor {
    pub fn new(
        repository: impl Into<String>,
        source: Arc<dyn SourceTree>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        memory: Arc<dyn MemoryStore>,
        config: Config,
    ) -> Self {
        Self {
            repository: repository.into(),
            source,
            embedder,
            vectors,
            memory,
            config,
        }
    }

    /// Run a full ingestion.
    pub async fn ingest(
        &self,
        options: IngestOptions,
        progress: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<IngestionResult, IngestError> {
        let now = Utc::now().timestamp();

        // Freshness guard: a recent completed scan makes this run a no-op.
        if !options.force {
            let existing = self
                .memory
                .get(&self.repository)
                .await
                .map_err(IngestError::PersistenceFailure)?;
            if let Some(existing) = &existing {
                let age_secs = now - existing.last_full_scan_at;
                if age_secs < self.config.scan.freshness_hours * 3600 {
                    return Ok(IngestionResult::skipped(IngestStatus::SkippedFresh));
                }
            }
        }

        if options.dry_run {
            // No lease and no writes: scan, analyze, report.
            return self.run_scan_phases(options, progress, cancel, now).await;
        }

        match self
            .memory
            .acquire_lease(&self.repository, now, self.config.scan.lease_secs)
            .await
            .map_err(IngestError::PersistenceFailure)?
        {
            LeaseAcquisition::Acquired(_) => {}
            LeaseAcquisition::Held(lease) => {
                return Err(IngestError::LeaseHeld {
                    repository: self.repository.clone(),
                    expires_at: lease.expires_at,
                });
            }
        }

        let result = self.run_scan_phases(options, progress, cancel, now).await;

        // Release on every exit path.
        if let Err(e) = self.memory.release_lease(&self.repository).await {
            eprintln!(
                "warning: failed to release ingest lease for {}: {}",
                self.repository, e
            );
        }

        result
    }

    async fn run_scan_phases(
        &self,
        options: IngestOptions,
        progress: &dyn ProgressReporter,
        cancel: &CancelFlag,
        now: i64,
    ) -> Result<IngestionResult, IngestError> {
        progress.report(phase_event(IngestPhase::Scanning, 0, 0, 0));

        let items = self
            .source
            .list_tree()
            .await
            .map_err(IngestError::ScanFailure)?;
        let fingerprint = tree_hash(&items);

        if !options.force {
            let existing = self
                .memory
                .get(&self.repository)
                .await
                .map_err(IngestError::PersistenceFailure)?;
            if let Some(existing) = &existing {
                if existing.tree_hash == fingerprint {
                    return Ok(IngestionResult::skipped(IngestStatus::SkippedUnchanged));
                }
            }
        }

        let filter =
            FileFilter::new(&self.config.filters).map_err(IngestError::ScanFailure)?;
        let eligible: Vec<String> = items
            .iter()
            .filter(|i| i.kind == TreeItemKind::Blob)
            .filter(|i| filter.is_eligible(&i.path, i.size))
            .map(|i| i.path.clone())
            .collect();

        progress.report(phase_event(
            IngestPhase::Analyzing,
            eligible.len() as u64,
            0,
            0,
        ));

        let scan = scan_tree(&items, &self.config.scan.branch);
        let stats = self
            .source
            .language_stats()
            .await
            .map_err(IngestError::ScanFailure)?;
        let languages = rank_languages(&stats);
        let patterns = analyze_patterns(&scan, &items, &languages);

        let mut errors = Vec::new();
        let mut embeddings_created = 0;
        let mut files_processed = eligible.len();
        let mut cancelled = false;

        if self.config.embedding.is_enabled() && !options.dry_run {
            let pipeline = self.pipeline();
            let hint = languages.first().map(|s| s.as_str());
            let outcome = pipeline
                .embed_files(&self.repository, &eligible, hint, progress, cancel)
                .await
                .map_err(IngestError::PersistenceFailure)?;
            files_processed = outcome.files_processed;
            embeddings_created = outcome.embeddings_created;
            errors = outcome.errors;
            cancelled = outcome.cancelled;
        }

        if cancelled {
            return Ok(IngestionResult {
                status: IngestStatus::Cancelled,
                files_processed,
                embeddings_created,
                languages_detected: languages,
                frameworks_detected: scan.frameworks,
                patterns_identified: patterns.len(),
                summary: String::new(),
                errors,
            });
        }

        progress.report(phase_event(
            IngestPhase::Summarizing,
            eligible.len() as u64,
            files_processed as u64,
            errors.len() as u64,
        ));

        let memory = RepositoryMemory {
            repository: self.repository.clone(),
            primary_languages: languages.clone(),
            frameworks: scan.frameworks.clone(),
            build_tools: scan.build_tools.clone(),
            testing_frameworks: scan.testing_frameworks.clone(),
            package_manager: scan.package_manager.clone(),
            directory_map: scan.directory_map.clone(),
            key_files: scan.key_files.clone(),
            entry_points: scan.entry_points.clone(),
            repo_summary: scan.repo_summary.clone(),
            architecture_summary: scan.architecture_summary.clone(),
            patterns: patterns.clone(),
            tree_hash: fingerprint,
            last_full_scan_at: now,
        };

        if !options.dry_run {
            self.memory
                .upsert_full_scan(&memory)
                .await
                .map_err(IngestError::PersistenceFailure)?;
        }

        progress.report(phase_event(
            IngestPhase::Complete,
            eligible.len() as u64,
            files_processed as u64,
            errors.len() as u64,
        ));

        Ok(IngestionResult {
            status: IngestStatus::Completed,
            files_processed,
            embeddings_created,
            languages_detected: memory.primary_languages,
            frameworks_detected: memory.frameworks,
            patterns_identified: memory.patterns.len(),
            summary: memory.repo_summary,
            errors,
        })
    }

    /// Apply a changed-file set without a full re-scan. Removed files lose
    /// their embeddings; added and modified files are re-chunked and
    /// re-embedded (unchanged chunks are still skipped by hash).
    pub async fn update_from_change(
        &self,
        changes: &[ChangedFile],
        progress: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<UpdateResult, IngestError> {
        let now = Utc::now().timestamp();
        match self
            .memory
            .acquire_lease(&self.repository, now, self.config.scan.lease_secs)
            .await
            .map_err(IngestError::PersistenceFailure)?
        {
            LeaseAcquisition::Acquired(_) => {}
            LeaseAcquisition::Held(lease) => {
                return Err(IngestError::LeaseHeld {
                    repository: self.repository.clone(),
                    expires_at: lease.expires_at,
                });
            }
        }

        let result = self.apply_changes(changes, progress, cancel).await;

        if let Err(e) = self.memory.release_lease(&self.repository).await {
            eprintln!(
                "warning: failed to release ingest lease for {}: {}",
                self.repository, e
            );
        }

        result
    }

    async fn apply_changes(
        &self,
        changes: &[ChangedFile],
        progress: &dyn ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<UpdateResult, IngestError> {
        let mut result = UpdateResult::default();

        let filter =
            FileFilter::new(&self.config.filters).map_err(IngestError::ScanFailure)?;

        for change in changes {
            if change.kind == ChangeKind::Removed {
                let removed = self
                    .vectors
                    .delete_embeddings(&self.repository, &change.path)
                    .await
                    .map_err(IngestError::PersistenceFailure)?;
                if removed > 0 {
                    result.removed += 1;
                }
            }
        }

        let to_embed: Vec<String> = changes
            .iter()
            .filter(|c| matches!(c.kind, ChangeKind::Added | ChangeKind::Modified))
            .filter(|c| filter.is_eligible(&c.path, None))
            .map(|c| c.path.clone())
            .collect();

        if self.config.embedding.is_enabled() && !to_embed.is_empty() {
            let pipeline = self.pipeline();
            let languages = self
                .memory
                .primary_languages(&self.repository)
                .await
                .map_err(IngestError::PersistenceFailure)?;
            let hint = languages.first().map(|s| s.as_str());
            let outcome = pipeline
                .embed_files(&self.repository, &to_embed, hint, progress, cancel)
                .await
                .map_err(IngestError::PersistenceFailure)?;
            result.updated = outcome.files_processed;
            result.errors = outcome.errors;
        }

        Ok(result)
    }

    fn pipeline(&self) -> EmbedPipeline {
        EmbedPipeline {
            source: Arc::clone(&self.source),
            embedder: Arc::clone(&self.embedder),
            vectors: Arc::clone(&self.vectors),
            chunk_opts: (&self.config.chunking).into(),
            batch_size: self.config.embedding.batch_size,
            batch_delay: Duration::from_millis(self.config.embedding.batch_delay_ms),
            embed_delay: Duration::from_millis(self.config.embedding.embed_delay_ms),
        }
    }
}

fn phase_event(phase: IngestPhase, total: u64, processed: u64, errors: u64) -> ProgressEvent {
    ProgressEvent {
        phase,
        total_files: total,
        processed_files: processed,
        current_file: None,
        errors,
    }
}

/// Compute the changed-file set between two tree listings. Useful when the
/// caller has a previous snapshot instead of an explicit change list.
pub fn diff_trees(before: &[TreeItem], after: &[TreeItem]) -> Vec<ChangedFile> {
    use std::collections::HashMap;

    let old: HashMap<&str, &str> = before
        .iter()
        .filter(|i| i.kind == TreeItemKind::Blob)
        .map(|i| (i.path.as_str(), i.content_hash.as_str()))
        .collect();
    let new: HashMap<&str, &str> = after
        .iter()
        .filter(|i| i.kind == TreeItemKind::Blob)
        .map(|i| (i.path.as_str(), i.content_hash.as_str()))
        .collect();

    let mut changes = Vec::new();
    for (path, hash) in &new {
        match old.get(path) {
            None => changes.push(ChangedFile {
                path: path.to_string(),
                kind: ChangeKind::Added,
            }),
            Some(old_hash) if old_hash != hash => changes.push(ChangedFile {
                path: path.to_string(),
                kind: ChangeKind::Modified,
            }),
            Some(_) => {}
        }
    }
    for path in old.keys() {
        if !new.contains_key(path) {
            changes.push(ChangedFile {
                path: path.to_string(),
                kind: ChangeKind::Removed,
            });
        }
    }
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(path: &str, hash: &str) -> TreeItem {
        TreeItem {
            path: path.to_string(),
            kind: TreeItemKind::Blob,
            content_hash: hash.to_string(),
            size: Some(10),
        }
    }

    #[test]
    fn diff_trees_classifies_changes() {
        let before = vec![blob("a.ts", "h1"), blob("b.ts", "h2"), blob("c.ts", "h3")];
        let after = vec![blob("a.ts", "h1"), blob("b.ts", "h9"), blob("d.ts", "h4")];

        let changes = diff_trees(&before, &after);
        assert_eq!(changes.len(), 3);
        assert!(changes
            .iter()
            .any(|c| c.path == "b.ts" && c.kind == ChangeKind::Modified));
        assert!(changes
            .iter()
            .any(|c| c.path == "c.ts" && c.kind == ChangeKind::Removed));
        assert!(changes
            .iter()
            .any(|c| c.path == "d.ts" && c.kind == ChangeKind::Added));
    }

    #[test]
    fn diff_trees_empty_when_identical() {
        let items = vec![blob("a.ts", "h1")];
        assert!(diff_trees(&items, &items).is_empty());
    }
}
