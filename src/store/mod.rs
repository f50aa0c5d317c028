//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines every storage operation the indexer
//! and retriever need, so the pipeline can run against SQLite in production
//! and an in-memory store in tests.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert_file`](VectorStore::upsert_file) | Insert or update file metadata |
//! | [`file_hash`](VectorStore::file_hash) | Content hash of an indexed file |
//! | [`replace_chunks`](VectorStore::replace_chunks) | Replace all chunks for a file |
//! | [`upsert_embedding`](VectorStore::upsert_embedding) | Store the vector for a chunk |
//! | [`keyword_search`](VectorStore::keyword_search) | Full-text candidate search |
//! | [`vector_search`](VectorStore::vector_search) | Cosine-similarity candidate search |
//! | [`prune_files`](VectorStore::prune_files) | Drop files no longer on disk |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, SourceFile};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Metadata pre-filter applied before any scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkFilter {
    /// Canonical language tag (e.g. `"python"`).
    pub language: Option<String>,
    /// Only chunks whose file path starts with this prefix.
    pub path_prefix: Option<String>,
}

impl ChunkFilter {
    pub fn matches(&self, language: &str, path: &str) -> bool {
        if let Some(ref lang) = self.language {
            if lang != language {
                return false;
            }
        }
        if let Some(ref prefix) = self.path_prefix {
            if !path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A chunk returned from keyword or vector search, carrying enough metadata
/// to build a [`QueryResult`](crate::models::QueryResult) without another lookup.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub path: String,
    pub language: String,
    pub chunk_index: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub token_count: i64,
    pub text: String,
    /// BM25 rank (negated) or cosine similarity; higher is better.
    pub raw_score: f64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or update a file by path. Returns the file ID.
    async fn upsert_file(&self, file: &SourceFile) -> Result<String>;

    /// Content hash recorded for `path`, if the file is indexed.
    async fn file_hash(&self, path: &str) -> Result<Option<String>>;

    /// Replace all chunks (and their vectors) for a file.
    async fn replace_chunks(&self, file_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Store or update the embedding vector for a chunk.
    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        file_id: &str,
        vector: &[f32],
        model: &str,
        text_hash: &str,
    ) -> Result<()>;

    async fn keyword_search(
        &self,
        query: &str,
        limit: i64,
        filter: &ChunkFilter,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Cosine search over vectors produced by `model`. Vectors written by
    /// any other model are not comparable and are never scored.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: i64,
        filter: &ChunkFilter,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Delete every file (and its chunks) whose path is not in `keep`.
    /// Returns the number of files removed.
    async fn prune_files(&self, keep: &[String]) -> Result<u64>;
}

/// Split a free-form query into lowercase search terms.
///
/// Identifiers keep their underscores so `parse_config` stays one term.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_terms() {
        assert_eq!(
            query_terms("parse_config(path) -> Config"),
            vec!["parse_config", "path", "config"]
        );
        assert!(query_terms("  ()->  ").is_empty());
    }

    #[test]
    fn test_filter_matches() {
        let f = ChunkFilter {
            language: Some("python".to_string()),
            path_prefix: Some("src/".to_string()),
        };
        assert!(f.matches("python", "src/app.py"));
        assert!(!f.matches("rust", "src/app.rs"));
        assert!(!f.matches("python", "tests/test_app.py"));
        assert!(ChunkFilter::default().matches("any", "thing"));
    }
}
