//! Source tree abstraction and the local-checkout implementation.
//!
//! Ingestion never touches the filesystem directly: it goes through
//! [`SourceTree`], which hands back an immutable listing of blobs and trees,
//! file contents on demand, and per-language byte counts. [`FilesystemTree`]
//! adapts a local checkout; a hosted-Git implementation would satisfy the
//! same trait.

use anyhow::{bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::languages::Language;
use crate::models::{FileContent, TreeItem, TreeItemKind};

/// A read-only view of one repository's files at a point in time.
#[async_trait]
pub trait SourceTree: Send + Sync {
    /// List every blob and tree, sorted by path for deterministic ordering.
    /// Blob entries carry a content hash and size.
    async fn list_tree(&self) -> Result<Vec<TreeItem>>;

    /// Fetch one file's content. `None` when the path does not exist or is
    /// not valid UTF-8 text.
    async fn get_file_content(&self, path: &str) -> Result<Option<FileContent>>;

    /// Bytes of source per language, for ranking primary languages.
    async fn language_stats(&self) -> Result<HashMap<String, u64>>;
}

/// [`SourceTree`] over a local checkout.
pub struct FilesystemTree {
    root: PathBuf,
    exclude_set: GlobSet,
}

impl FilesystemTree {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            bail!("Source tree root does not exist: {}", root.display());
        }

        let default_excludes = [
            "**/.git/**".to_string(),
            "**/node_modules/**".to_string(),
            "**/target/**".to_string(),
        ];
        let exclude_set = build_globset(&default_excludes)?;

        Ok(Self { root, exclude_set })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl SourceTree for FilesystemTree {
    async fn list_tree(&self) -> Result<Vec<TreeItem>> {
        let mut items = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry?;
            let path = entry.path();
            if path == self.root {
                continue;
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude_set.is_match(&rel_str) {
                continue;
            }

            if entry.file_type().is_dir() {
                items.push(TreeItem {
                    path: rel_str,
                    kind: TreeItemKind::Tree,
                    content_hash: String::new(),
                    size: None,
                });
            } else if entry.file_type().is_file() {
                let bytes = std::fs::read(path)?;
                items.push(TreeItem {
                    path: rel_str,
                    kind: TreeItemKind::Blob,
                    content_hash: hash_bytes(&bytes),
                    size: Some(bytes.len() as u64),
                });
            }
        }

        // Sort for deterministic ordering
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    async fn get_file_content(&self, path: &str) -> Result<Option<FileContent>> {
        let full = self.resolve(path);
        if !full.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&full)?;
        let size = bytes.len() as u64;
        match String::from_utf8(bytes) {
            Ok(content) => Ok(Some(FileContent { content, size })),
            Err(_) => Ok(None),
        }
    }

    async fn language_stats(&self) -> Result<HashMap<String, u64>> {
        let mut stats: HashMap<String, u64> = HashMap::new();
        for item in self.list_tree().await? {
            if item.kind != TreeItemKind::Blob {
                continue;
            }
            let Some(name) = Language::from_path(&item.path).name() else {
                continue;
            };
            *stats.entry(name.to_string()).or_insert(0) += item.size.unwrap_or(0);
        }
        Ok(stats)
    }
}

/// Ranked language names, highest byte share first. Ties break
/// alphabetically so the ordering is stable.
pub fn rank_languages(stats: &HashMap<String, u64>) -> Vec<String> {
    let mut ranked: Vec<(&String, &u64)> = stats.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().map(|(name, _)| name.clone()).collect()
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
