//! File eligibility filters applied before chunking and embedding.
//!
//! Binary and media files, lockfiles, minified bundles, and files under
//! build or dependency directories are excluded up front, as are files over
//! the configured size limit. Exclusion is decided from the path and size
//! alone, never from content.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::FilterConfig;

/// Dependency/build directories whose contents are never embedded.
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "dist",
    "build",
    "out",
    "vendor",
    "coverage",
    ".next",
    ".nuxt",
    ".venv",
    "venv",
    "__pycache__",
];

/// Binary and media extensions.
const EXCLUDED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "pdf", "zip", "tar", "gz", "bz2",
    "7z", "mp3", "mp4", "mov", "avi", "woff", "woff2", "ttf", "eot", "otf", "exe", "dll", "so",
    "dylib", "bin", "jar", "class", "pyc", "wasm", "db", "sqlite",
];

/// Lockfiles carry no embeddable signal.
const LOCK_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "Cargo.lock",
    "poetry.lock",
    "Pipfile.lock",
    "Gemfile.lock",
    "composer.lock",
    "go.sum",
];

/// Path-based eligibility filter for the embedding pipeline.
pub struct FileFilter {
    max_file_bytes: u64,
    extra_excludes: GlobSet,
}

impl FileFilter {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude_globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            max_file_bytes: config.max_file_bytes,
            extra_excludes: builder.build()?,
        })
    }

    /// Whether a file may be chunked and embedded.
    pub fn is_eligible(&self, path: &str, size: Option<u64>) -> bool {
        self.rejection_reason(path, size).is_none()
    }

    /// Why a file is excluded, or `None` when it is eligible. The reason is
    /// surfaced in progress output rather than the error list — exclusion
    /// is expected behavior, not a failure.
    pub fn rejection_reason(&self, path: &str, size: Option<u64>) -> Option<&'static str> {
        if let Some(size) = size {
            if size > self.max_file_bytes {
                return Some("exceeds size limit");
            }
        }

        if path
            .split('/')
            .any(|segment| EXCLUDED_DIRS.contains(&segment))
        {
            return Some("inside excluded directory");
        }

        let name = path.rsplit('/').next().unwrap_or(path);
        if LOCK_FILES.contains(&name) {
            return Some("lockfile");
        }
        if name.ends_with(".min.js") || name.ends_with(".min.css") || name.ends_with(".map") {
            return Some("minified or generated");
        }

        let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
        if EXCLUDED_EXTENSIONS.contains(&ext.as_str()) {
            return Some("binary or media file");
        }

        if self.extra_excludes.is_match(path) {
            return Some("matched exclude glob");
        }

        None
    }
}
