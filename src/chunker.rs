//! Language-aware code chunker.
//!
//! Splits a file's text into bounded [`CodeChunk`]s. Files at or under the
//! maximum chunk size become a single file-level chunk. Larger files are
//! split on declaration boundaries from the per-language rule tables in
//! [`crate::languages`]; any piece still over the limit is recursively split
//! into overlapping line windows, and files with no recognizable boundaries
//! go straight to line windows. Chunks below the minimum size are dropped.
//!
//! Each chunk carries a SHA-256 hash of its content so an unchanged chunk
//! re-ingested later is recognized without re-embedding. Chunking is a pure
//! function of its inputs: same text and options, same boundaries and hashes.

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::languages::{self, Language};
use crate::models::{ChunkKind, CodeChunk};

/// Chunking options, lifted from [`ChunkingConfig`].
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Upper bound on chunk content length, in characters.
    pub max_chunk_size: usize,
    /// Chunks shorter than this are dropped.
    pub min_chunk_size: usize,
    /// Line overlap between consecutive fallback windows.
    pub overlap_lines: usize,
}

impl From<&ChunkingConfig> for ChunkOptions {
    fn from(cfg: &ChunkingConfig) -> Self {
        Self {
            max_chunk_size: cfg.max_chunk_size,
            min_chunk_size: cfg.min_chunk_size,
            overlap_lines: cfg.overlap_lines,
        }
    }
}

/// Split file text into ordered chunks.
///
/// The language is detected from the file extension; `language_hint` only
/// applies when the extension is not recognized.
pub fn chunk_file(
    path: &str,
    content: &str,
    language_hint: Option<&str>,
    opts: &ChunkOptions,
) -> Vec<CodeChunk> {
    let language = match Language::from_path(path) {
        Language::Other => language_hint
            .and_then(Language::from_hint)
            .unwrap_or(Language::Other),
        detected => detected,
    };

    let mut chunks = if content.len() <= opts.max_chunk_size {
        vec![make_chunk(
            content,
            1,
            content.lines().count().max(1),
            ChunkKind::File,
            None,
            language,
        )]
    } else {
        let boundaries = find_boundaries(language, content);
        if boundaries.is_empty() {
            window_chunks(content, 1, opts, language)
        } else {
            semantic_chunks(content, &boundaries, opts, language)
        }
    };

    chunks.retain(|c| c.content.len() >= opts.min_chunk_size);
    chunks
}

/// Deterministic hex digest of chunk content.
pub fn hash_content(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct Boundary {
    /// 0-based line index.
    line: usize,
    kind: ChunkKind,
    name: Option<String>,
}

fn find_boundaries(language: Language, content: &str) -> Vec<Boundary> {
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            languages::match_boundary(language, line).map(|(kind, name)| Boundary {
                line: i,
                kind,
                name,
            })
        })
        .collect()
}

/// Build chunks spanning each boundary line to the line before the next
/// boundary (or end of file). Lines before the first boundary become a
/// leading section chunk.
fn semantic_chunks(
    content: &str,
    boundaries: &[Boundary],
    opts: &ChunkOptions,
    language: Language,
) -> Vec<CodeChunk> {
    let lines: Vec<&str> = content.lines().collect();
    let mut chunks = Vec::new();

    if boundaries[0].line > 0 {
        let text = lines[..boundaries[0].line].join("\n");
        push_bounded(&mut chunks, &text, 1, ChunkKind::Section, None, opts, language);
    }

    for (i, boundary) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map(|next| next.line)
            .unwrap_or(lines.len());
        let text = lines[boundary.line..end].join("\n");
        push_bounded(
            &mut chunks,
            &text,
            boundary.line + 1,
            boundary.kind,
            boundary.name.clone(),
            opts,
            language,
        );
    }

    chunks
}

/// Append a chunk, recursively splitting it into line windows when it still
/// exceeds the maximum size.
fn push_bounded(
    chunks: &mut Vec<CodeChunk>,
    text: &str,
    start_line: usize,
    kind: ChunkKind,
    name: Option<String>,
    opts: &ChunkOptions,
    language: Language,
) {
    if text.len() <= opts.max_chunk_size {
        let end_line = start_line + text.lines().count().saturating_sub(1);
        chunks.push(make_chunk(text, start_line, end_line, kind, name, language));
    } else {
        chunks.extend(window_chunks(text, start_line, opts, language));
    }
}

/// Fallback chunking: fixed-size line windows with overlap.
///
/// Lines per window is derived from the size budget and the average line
/// length; the overlap keeps boundary-adjacent information in both windows
/// for retrieval quality.
fn window_chunks(
    text: &str,
    first_line: usize,
    opts: &ChunkOptions,
    language: Language,
) -> Vec<CodeChunk> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let avg_line_len = (text.len() / lines.len()).max(1);
    let lines_per_chunk = (opts.max_chunk_size / avg_line_len).max(1);
    let step = lines_per_chunk.saturating_sub(opts.overlap_lines).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < lines.len() {
        let end = (start + lines_per_chunk).min(lines.len());
        let chunk_text = lines[start..end].join("\n");
        chunks.push(make_chunk(
            &chunk_text,
            first_line + start,
            first_line + end - 1,
            ChunkKind::Section,
            None,
            language,
        ));
        if end == lines.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn make_chunk(
    text: &str,
    start_line: usize,
    end_line: usize,
    kind: ChunkKind,
    name: Option<String>,
    language: Language,
) -> CodeChunk {
    CodeChunk {
        content: text.to_string(),
        content_hash: hash_content(text),
        start_line,
        end_line,
        kind,
        name,
        language: language.name().map(|s| s.to_string()),
        imports: languages::extract_imports(language, text),
        exports: languages::extract_exports(language, text),
    }
}
