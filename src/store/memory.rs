//! In-memory [`VectorStore`] used by tests and dry runs.
//!
//! Keyword scores are the number of query-term occurrences in the chunk;
//! vector scores are cosine similarity.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{query_terms, ChunkCandidate, ChunkFilter, VectorStore};
use crate::embedding::cosine_similarity;
use crate::models::{Chunk, SourceFile};

#[derive(Default)]
pub struct InMemoryStore {
    files: RwLock<HashMap<String, SourceFile>>, // keyed by path
    chunks: RwLock<HashMap<String, Vec<Chunk>>>, // keyed by file id
    vectors: RwLock<HashMap<String, (String, Vec<f32>)>>, // chunk id -> (model, vector)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn chunk_count(&self) -> usize {
        self.chunks.read().await.values().map(|c| c.len()).sum()
    }

    pub async fn vector_count(&self) -> usize {
        self.vectors.read().await.len()
    }

    /// Visit every chunk whose file passes `filter`.
    async fn filtered<F>(&self, filter: &ChunkFilter, mut f: F)
    where
        F: FnMut(&SourceFile, &Chunk),
    {
        let files = self.files.read().await;
        let chunks = self.chunks.read().await;
        for file in files.values() {
            if !filter.matches(&file.language, &file.path) {
                continue;
            }
            if let Some(file_chunks) = chunks.get(&file.id) {
                for chunk in file_chunks {
                    f(file, chunk);
                }
            }
        }
    }
}

fn candidate(file: &SourceFile, chunk: &Chunk, raw_score: f64) -> ChunkCandidate {
    ChunkCandidate {
        chunk_id: chunk.id.clone(),
        path: file.path.clone(),
        language: file.language.clone(),
        chunk_index: chunk.chunk_index,
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        token_count: chunk.token_count,
        text: chunk.text.clone(),
        raw_score,
    }
}

fn sort_and_truncate(candidates: &mut Vec<ChunkCandidate>, limit: i64) {
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    candidates.truncate(limit.max(0) as usize);
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert_file(&self, file: &SourceFile) -> Result<String> {
        let mut files = self.files.write().await;
        let id = match files.get(&file.path) {
            Some(existing) => existing.id.clone(),
            None if file.id.is_empty() => Uuid::new_v4().to_string(),
            None => file.id.clone(),
        };
        let mut stored = file.clone();
        stored.id = id.clone();
        files.insert(file.path.clone(), stored);
        Ok(id)
    }

    async fn file_hash(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .files
            .read()
            .await
            .get(path)
            .map(|f| f.content_hash.clone()))
    }

    async fn replace_chunks(&self, file_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut all = self.chunks.write().await;
        if let Some(old) = all.remove(file_id) {
            let mut vectors = self.vectors.write().await;
            for c in old {
                vectors.remove(&c.id);
            }
        }
        all.insert(file_id.to_string(), chunks.to_vec());
        Ok(())
    }

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        _file_id: &str,
        vector: &[f32],
        model: &str,
        _text_hash: &str,
    ) -> Result<()> {
        self.vectors
            .write()
            .await
            .insert(chunk_id.to_string(), (model.to_string(), vector.to_vec()));
        Ok(())
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: i64,
        filter: &ChunkFilter,
    ) -> Result<Vec<ChunkCandidate>> {
        let terms: HashSet<String> = query_terms(query).into_iter().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        self.filtered(filter, |file, chunk| {
            let hits = query_terms(&chunk.text)
                .iter()
                .filter(|t| terms.contains(*t))
                .count();
            if hits > 0 {
                out.push(candidate(file, chunk, hits as f64));
            }
        })
        .await;

        sort_and_truncate(&mut out, limit);
        Ok(out)
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: i64,
        filter: &ChunkFilter,
    ) -> Result<Vec<ChunkCandidate>> {
        let vectors = self.vectors.read().await;
        let mut out = Vec::new();
        self.filtered(filter, |file, chunk| {
            if let Some((_, vec)) = vectors.get(&chunk.id).filter(|(m, _)| m == model) {
                let score = cosine_similarity(query_vec, vec) as f64;
                out.push(candidate(file, chunk, score));
            }
        })
        .await;

        sort_and_truncate(&mut out, limit);
        Ok(out)
    }

    async fn prune_files(&self, keep: &[String]) -> Result<u64> {
        let keep: HashSet<&str> = keep.iter().map(|s| s.as_str()).collect();
        let mut files = self.files.write().await;
        let stale: Vec<String> = files
            .keys()
            .filter(|p| !keep.contains(p.as_str()))
            .cloned()
            .collect();

        let mut chunks = self.chunks.write().await;
        let mut vectors = self.vectors.write().await;
        for path in &stale {
            if let Some(file) = files.remove(path) {
                for c in chunks.remove(&file.id).unwrap_or_default() {
                    vectors.remove(&c.id);
                }
            }
        }
        Ok(stale.len() as u64)
    }
}
