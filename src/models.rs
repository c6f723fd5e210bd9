//! Core data models for the repository memory engine.
//!
//! These types represent the tree snapshots, chunks, detected patterns, and
//! memory records that flow through the ingestion and retrieval pipeline.
//! Records that land in a store derive `Serialize`/`Deserialize` so backends
//! can persist them as JSON columns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of entry in a repository tree listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeItemKind {
    /// A file.
    Blob,
    /// A directory.
    Tree,
}

/// Immutable snapshot of one entry in an ingestion run's file listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeItem {
    pub path: String,
    pub kind: TreeItemKind,
    /// Content hash of the blob (empty for trees).
    pub content_hash: String,
    pub size: Option<u64>,
}

/// Structural role of a chunk within its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    File,
    Function,
    Class,
    Module,
    Section,
}

/// A bounded, independently embeddable slice of a file's text.
///
/// Chunks are ephemeral: they are produced fresh on every ingestion or
/// incremental update and superseded by comparing `content_hash`. The hash
/// is a deterministic digest of `content` only, so an unchanged chunk
/// re-ingested later is recognized without re-embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeChunk {
    pub content: String,
    pub content_hash: String,
    /// 1-based line number of the first line in this chunk.
    pub start_line: usize,
    /// 1-based line number of the last line in this chunk (inclusive).
    pub end_line: usize,
    pub kind: ChunkKind,
    /// Declaration name when the chunk starts at a recognized boundary.
    pub name: Option<String>,
    pub language: Option<String>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

/// Category of a heuristically detected convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    Architecture,
    Naming,
    Testing,
    ErrorHandling,
    State,
    Api,
}

/// A named convention detected in the repository, with a confidence score.
///
/// Multiple patterns may coexist; rules are independent and there is no
/// exclusivity between detections. Confidence is always within `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub category: PatternCategory,
    pub name: String,
    pub description: String,
    /// File or directory references supporting the detection.
    pub examples: Vec<String>,
    pub confidence: f64,
}

/// Importance tier assigned to a key file by the scanner's rules.
///
/// Ordered so that `Critical > High > Medium` for sorting and truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceTier {
    Medium,
    High,
    Critical,
}

/// A file the scanner considers structurally important.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    pub path: String,
    pub tier: ImportanceTier,
    pub reason: String,
}

/// One directory's entry in the exported directory map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryInfo {
    /// Responsibility label from the scanner's dictionary.
    pub responsibility: String,
    /// A few representative files directly under this directory.
    pub representative_files: Vec<String>,
    pub file_count: usize,
}

/// The durable, repository-scoped memory record.
///
/// Created on first ingestion and replaced (not appended) on each full scan;
/// individual fields may be patched by incremental updates.
/// `last_full_scan_at` only ever advances forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryMemory {
    pub repository: String,
    /// Languages ordered by descending byte share.
    pub primary_languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub build_tools: Vec<String>,
    pub testing_frameworks: Vec<String>,
    pub package_manager: Option<String>,
    /// Path → responsibility + representative files. BTreeMap for stable
    /// iteration order in summaries and serialized output.
    pub directory_map: BTreeMap<String, DirectoryInfo>,
    pub key_files: Vec<KeyFile>,
    pub entry_points: Vec<String>,
    pub repo_summary: String,
    pub architecture_summary: String,
    pub patterns: Vec<DetectedPattern>,
    /// Fingerprint of the last-seen repository state.
    pub tree_hash: String,
    /// Unix timestamp of the last completed full scan.
    pub last_full_scan_at: i64,
}

/// File content fetched from a source tree.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub content: String,
    pub size: u64,
}

/// A single embedding vector with its token accounting.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub token_count: usize,
}

/// Outcome recorded against a prior suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionOutcome {
    Pending,
    Accepted,
    Rejected,
    /// Terminal state: the suggestion no longer applies. Excluded from
    /// novelty comparison.
    Outdated,
}

/// A previously issued suggestion, read-only from this crate's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorSuggestion {
    pub suggestion_type: String,
    pub title: String,
    pub affected_files: Vec<String>,
    pub outcome: SuggestionOutcome,
}

/// Candidate suggestion checked for novelty before any LLM cost is spent.
#[derive(Debug, Clone)]
pub struct CandidateSuggestion {
    pub suggestion_type: String,
    pub title: String,
    pub affected_files: Vec<String>,
}

/// How a file changed in an incremental update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One changed file in an incremental update request.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub kind: ChangeKind,
}

/// One ranked item returned by the context builder.
#[derive(Debug, Clone, Serialize)]
pub struct ContextItem {
    pub path: String,
    pub content: String,
    /// 1.0 for exact path matches, cosine similarity for semantic matches,
    /// a fixed 0.5 for directory-proximity fallback matches.
    pub similarity: f32,
}
