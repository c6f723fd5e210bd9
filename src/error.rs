//! Ingestion error taxonomy.
//!
//! Per-file and per-batch failures are recorded and the run continues; they
//! surface as [`IngestErrorRecord`]s in the final result and are never
//! swallowed. Scan and persistence failures are fatal for the run and are
//! raised to the orchestrator as tagged [`IngestError`] variants so the
//! caller can drive a repository status of `error` versus `ready`.

use serde::Serialize;
use thiserror::Error;

/// Fatal ingestion failure. The run produced no usable memory write.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The tree listing failed entirely; nothing was written.
    #[error("repository scan failed: {0}")]
    ScanFailure(#[source] anyhow::Error),

    /// The final memory upsert failed. The run must not report complete.
    #[error("memory persistence failed: {0}")]
    PersistenceFailure(#[source] anyhow::Error),

    /// Another writer holds the ingest lease for this repository.
    #[error("ingest lease for '{repository}' is held until {expires_at}")]
    LeaseHeld { repository: String, expires_at: i64 },
}

/// Where a non-fatal error occurred.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "scope")]
pub enum ErrorScope {
    /// A single file failed to fetch or chunk and was skipped.
    File { path: String },
    /// An embedding call failed for a whole batch; its vectors were dropped.
    Batch { index: usize },
}

/// A non-fatal error aggregated into the ingestion result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestErrorRecord {
    #[serde(flatten)]
    pub scope: ErrorScope,
    pub message: String,
}

impl IngestErrorRecord {
    pub fn file(path: impl Into<String>, message: impl ToString) -> Self {
        Self {
            scope: ErrorScope::File { path: path.into() },
            message: message.to_string(),
        }
    }

    pub fn batch(index: usize, message: impl ToString) -> Self {
        Self {
            scope: ErrorScope::Batch { index },
            message: message.to_string(),
        }
    }
}
