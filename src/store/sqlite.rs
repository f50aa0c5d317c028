//! SQLite-backed [`VectorStore`].
//!
//! Chunks are mirrored into an FTS5 table for keyword search; vectors are
//! stored as little-endian f32 BLOBs and scored with cosine similarity in
//! Rust after the metadata filter has been applied in SQL.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use super::{query_terms, ChunkCandidate, ChunkFilter, VectorStore};
use crate::embedding;
use crate::models::{Chunk, SourceFile};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Build an FTS5 MATCH expression that ORs quoted query terms.
fn fts_expression(query: &str) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

async fn delete_file_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    file_id: &str,
) -> Result<()> {
    sqlx::query("DELETE FROM chunk_vectors WHERE file_id = ?")
        .bind(file_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE file_id = ?)",
    )
    .bind(file_id)
    .execute(&mut **tx)
    .await?;
    sqlx::query("DELETE FROM chunks_fts WHERE file_id = ?")
        .bind(file_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE file_id = ?")
        .bind(file_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert_file(&self, file: &SourceFile) -> Result<String> {
        let existing_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM files WHERE path = ?")
                .bind(&file.path)
                .fetch_optional(&self.pool)
                .await?;

        let file_id = existing_id.unwrap_or_else(|| {
            if file.id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                file.id.clone()
            }
        });
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO files (id, path, language, size_bytes, modified_at, content_hash, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                language = excluded.language,
                size_bytes = excluded.size_bytes,
                modified_at = excluded.modified_at,
                content_hash = excluded.content_hash,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&file_id)
        .bind(&file.path)
        .bind(&file.language)
        .bind(file.size_bytes)
        .bind(file.modified_at)
        .bind(&file.content_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(file_id)
    }

    async fn file_hash(&self, path: &str) -> Result<Option<String>> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM files WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash)
    }

    async fn replace_chunks(&self, file_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_file_rows(&mut tx, file_id).await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, file_id, chunk_index, start_line, end_line, token_count, text, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(file_id)
            .bind(chunk.chunk_index)
            .bind(chunk.start_line)
            .bind(chunk.end_line)
            .bind(chunk.token_count)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, file_id, text) VALUES (?, ?, ?)")
                .bind(&chunk.id)
                .bind(file_id)
                .bind(&chunk.text)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        file_id: &str,
        vector: &[f32],
        model: &str,
        text_hash: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO embeddings (chunk_id, model, dims, created_at, hash)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                created_at = excluded.created_at,
                hash = excluded.hash
            "#,
        )
        .bind(chunk_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(now)
        .bind(text_hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, file_id, embedding)
            VALUES (?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                file_id = excluded.file_id,
                embedding = excluded.embedding
            "#,
        )
        .bind(chunk_id)
        .bind(file_id)
        .bind(embedding::vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: i64,
        filter: &ChunkFilter,
    ) -> Result<Vec<ChunkCandidate>> {
        let Some(expr) = fts_expression(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, f.path, f.language, c.chunk_index, c.start_line,
                   c.end_line, c.token_count, c.text, bm25(chunks_fts) AS rank
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.chunk_id
            JOIN files f ON f.id = c.file_id
            WHERE chunks_fts MATCH ?
              AND (? IS NULL OR f.language = ?)
              AND (? IS NULL OR substr(f.path, 1, length(?)) = ?)
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&expr)
        .bind(&filter.language)
        .bind(&filter.language)
        .bind(&filter.path_prefix)
        .bind(&filter.path_prefix)
        .bind(&filter.path_prefix)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    path: row.get("path"),
                    language: row.get("language"),
                    chunk_index: row.get("chunk_index"),
                    start_line: row.get("start_line"),
                    end_line: row.get("end_line"),
                    token_count: row.get("token_count"),
                    text: row.get("text"),
                    raw_score: -rank, // bm25 is lower-is-better
                }
            })
            .collect())
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: i64,
        filter: &ChunkFilter,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, f.path, f.language, c.chunk_index, c.start_line,
                   c.end_line, c.token_count, c.text, cv.embedding
            FROM chunk_vectors cv
            JOIN embeddings e ON e.chunk_id = cv.chunk_id AND e.model = ?
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN files f ON f.id = c.file_id
            WHERE (? IS NULL OR f.language = ?)
              AND (? IS NULL OR substr(f.path, 1, length(?)) = ?)
            "#,
        )
        .bind(model)
        .bind(&filter.language)
        .bind(&filter.language)
        .bind(&filter.path_prefix)
        .bind(&filter.path_prefix)
        .bind(&filter.path_prefix)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    path: row.get("path"),
                    language: row.get("language"),
                    chunk_index: row.get("chunk_index"),
                    start_line: row.get("start_line"),
                    end_line: row.get("end_line"),
                    token_count: row.get("token_count"),
                    text: row.get("text"),
                    raw_score: embedding::cosine_similarity(query_vec, &vec) as f64,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit.max(0) as usize);

        Ok(candidates)
    }

    async fn prune_files(&self, keep: &[String]) -> Result<u64> {
        let keep: HashSet<&str> = keep.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query("SELECT id, path FROM files")
            .fetch_all(&self.pool)
            .await?;

        let stale: Vec<String> = rows
            .iter()
            .filter(|row| !keep.contains(row.get::<String, _>("path").as_str()))
            .map(|row| row.get("id"))
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for file_id in &stale {
            delete_file_rows(&mut tx, file_id).await?;
            sqlx::query("DELETE FROM files WHERE id = ?")
                .bind(file_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(stale.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn file(path: &str, language: &str) -> SourceFile {
        SourceFile {
            id: String::new(),
            path: path.to_string(),
            language: language.to_string(),
            size_bytes: 10,
            modified_at: 0,
            content_hash: format!("hash-{}", path),
        }
    }

    fn chunk(file_id: &str, index: i64, text: &str) -> Chunk {
        Chunk {
            id: format!("{}-{}", file_id, index),
            file_id: file_id.to_string(),
            chunk_index: index,
            start_line: 1,
            end_line: 1,
            token_count: crate::chunk::estimate_tokens(text) as i64,
            text: text.to_string(),
            hash: crate::chunk::hash_text(text),
        }
    }

    #[test]
    fn test_fts_expression_quotes_terms() {
        assert_eq!(
            fts_expression("load_config(path)").as_deref(),
            Some("\"load_config\" OR \"path\"")
        );
        assert_eq!(fts_expression("()"), None);
    }

    #[tokio::test]
    async fn test_upsert_file_keeps_id() {
        let store = memory_store().await;
        let id1 = store.upsert_file(&file("a.py", "python")).await.unwrap();
        let id2 = store.upsert_file(&file("a.py", "python")).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(
            store.file_hash("a.py").await.unwrap().as_deref(),
            Some("hash-a.py")
        );
        assert_eq!(store.file_hash("missing.py").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keyword_search_with_filter() {
        let store = memory_store().await;
        let py = store.upsert_file(&file("src/a.py", "python")).await.unwrap();
        let js = store.upsert_file(&file("web/b.js", "javascript")).await.unwrap();
        store
            .replace_chunks(&py, &[chunk(&py, 0, "def load_config(path): pass")])
            .await
            .unwrap();
        store
            .replace_chunks(&js, &[chunk(&js, 0, "function load_config(path) {}")])
            .await
            .unwrap();

        let all = store
            .keyword_search("load_config", 10, &ChunkFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let only_py = store
            .keyword_search(
                "load_config",
                10,
                &ChunkFilter {
                    language: Some("python".to_string()),
                    path_prefix: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(only_py.len(), 1);
        assert_eq!(only_py[0].path, "src/a.py");

        let by_prefix = store
            .keyword_search(
                "load_config",
                10,
                &ChunkFilter {
                    language: None,
                    path_prefix: Some("web/".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_prefix.len(), 1);
        assert_eq!(by_prefix[0].language, "javascript");
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_similarity() {
        let store = memory_store().await;
        let id = store.upsert_file(&file("a.py", "python")).await.unwrap();
        let chunks = vec![chunk(&id, 0, "alpha"), chunk(&id, 1, "beta")];
        store.replace_chunks(&id, &chunks).await.unwrap();
        store
            .upsert_embedding(&chunks[0].id, &id, &[1.0, 0.0], "m", &chunks[0].hash)
            .await
            .unwrap();
        store
            .upsert_embedding(&chunks[1].id, &id, &[0.0, 1.0], "m", &chunks[1].hash)
            .await
            .unwrap();

        let hits = store
            .vector_search(&[0.1, 0.9], "m", 10, &ChunkFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "beta");
        assert!(hits[0].raw_score > hits[1].raw_score);
    }

    #[tokio::test]
    async fn test_vector_search_ignores_other_models() {
        let store = memory_store().await;
        let id = store.upsert_file(&file("a.py", "python")).await.unwrap();
        let chunks = vec![chunk(&id, 0, "alpha"), chunk(&id, 1, "beta")];
        store.replace_chunks(&id, &chunks).await.unwrap();
        store
            .upsert_embedding(&chunks[0].id, &id, &[1.0, 0.0], "all-minilm-l6-v2", &chunks[0].hash)
            .await
            .unwrap();
        store
            .upsert_embedding(&chunks[1].id, &id, &[0.0, 1.0], "bge-small-en-v1.5", &chunks[1].hash)
            .await
            .unwrap();

        let hits = store
            .vector_search(&[1.0, 0.0], "bge-small-en-v1.5", 10, &ChunkFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "beta");

        let none = store
            .vector_search(&[1.0, 0.0], "nomic-embed-text", 10, &ChunkFilter::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_replace_chunks_drops_vectors() {
        let store = memory_store().await;
        let id = store.upsert_file(&file("a.py", "python")).await.unwrap();
        let c = chunk(&id, 0, "alpha");
        store.replace_chunks(&id, &[c.clone()]).await.unwrap();
        store
            .upsert_embedding(&c.id, &id, &[1.0], "m", &c.hash)
            .await
            .unwrap();
        store.replace_chunks(&id, &[]).await.unwrap();
        let hits = store
            .vector_search(&[1.0], "m", 10, &ChunkFilter::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_prune_files() {
        let store = memory_store().await;
        let a = store.upsert_file(&file("a.py", "python")).await.unwrap();
        store.upsert_file(&file("b.py", "python")).await.unwrap();
        store
            .replace_chunks(&a, &[chunk(&a, 0, "alpha")])
            .await
            .unwrap();

        let removed = store.prune_files(&["b.py".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.file_hash("a.py").await.unwrap(), None);
        assert!(store.file_hash("b.py").await.unwrap().is_some());
        let hits = store
            .keyword_search("alpha", 10, &ChunkFilter::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
