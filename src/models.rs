//! Core data models used throughout the indexing and retrieval pipeline.

use serde::Serialize;

/// A file discovered by the scanner. The body is not loaded until indexing.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Path relative to the indexing root, `/`-separated.
    pub rel_path: String,
    pub abs_path: std::path::PathBuf,
    pub language: String,
    pub size_bytes: u64,
    pub modified_at: i64,
}

/// File metadata stored alongside its chunks.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: String,
    pub path: String,
    pub language: String,
    pub size_bytes: i64,
    pub modified_at: i64,
    pub content_hash: String,
}

/// A bounded span of a file's text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub file_id: String,
    pub chunk_index: i64,
    /// 1-based, inclusive.
    pub start_line: i64,
    pub end_line: i64,
    pub token_count: i64,
    pub text: String,
    pub hash: String,
}

/// A retrieved chunk with its relevance score in `[0, 1]`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub chunk_id: String,
    pub path: String,
    pub language: String,
    pub chunk_index: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub token_count: i64,
    pub score: f64,
    pub text: String,
}
