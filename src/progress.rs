//! Ingestion progress reporting.
//!
//! Reports observable progress during full ingestion and incremental updates
//! so users see which phase is running, how many files remain, and how many
//! errors have accumulated. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Phase of the ingestion pipeline, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IngestPhase {
    /// Listing the tree and filtering eligible files. Total becomes known here.
    Scanning,
    /// Detecting frameworks, key files, and patterns.
    Analyzing,
    /// Chunking and embedding file batches.
    Embedding,
    /// Assembling and persisting the memory record.
    Summarizing,
    /// Done.
    Complete,
}

impl IngestPhase {
    pub fn name(&self) -> &'static str {
        match self {
            IngestPhase::Scanning => "scanning",
            IngestPhase::Analyzing => "analyzing",
            IngestPhase::Embedding => "embedding",
            IngestPhase::Summarizing => "summarizing",
            IngestPhase::Complete => "complete",
        }
    }
}

/// A single progress event.
#[derive(Clone, Debug)]
pub struct ProgressEvent {
    pub phase: IngestPhase,
    pub total_files: u64,
    pub processed_files: u64,
    /// File currently being embedded, when one is in flight.
    pub current_file: Option<String>,
    pub errors: u64,
}

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the ingestion pipeline.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr:
/// "ingest owner/repo  embedding  12 / 40 files  (2 errors)".
pub struct StderrProgress {
    pub repository: String,
}

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let mut line = format!("ingest {}  {}", self.repository, event.phase.name());
        if event.total_files > 0 {
            line.push_str(&format!(
                "  {} / {} files",
                event.processed_files, event.total_files
            ));
        }
        if let Some(file) = &event.current_file {
            line.push_str(&format!("  {}", file));
        }
        if event.errors > 0 {
            line.push_str(&format!("  ({} errors)", event.errors));
        }
        line.push('\n');
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress {
    pub repository: String,
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "repository": self.repository,
            "phase": event.phase.name(),
            "total_files": event.total_files,
            "processed_files": event.processed_files,
            "current_file": event.current_file,
            "errors": event.errors,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self, repository: &str) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress {
                repository: repository.to_string(),
            }),
            ProgressMode::Json => Box::new(JsonProgress {
                repository: repository.to_string(),
            }),
        }
    }
}

/// Cooperative cancellation flag, checked between embedding batches.
///
/// Cancellation never leaves a batch half-applied: the current batch runs to
/// completion, then the pipeline stops before starting the next one.
#[derive(Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names() {
        assert_eq!(IngestPhase::Scanning.name(), "scanning");
        assert_eq!(IngestPhase::Complete.name(), "complete");
    }

    #[test]
    fn cancel_flag_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
