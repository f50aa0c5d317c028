//! File lookup by path.
//!
//! Fetches an indexed file and its chunks. Used by the `coderag get` CLI
//! command.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub path: String,
    pub language: String,
    pub size_bytes: i64,
    pub modified_at: String, // ISO8601
    pub indexed_at: String,  // ISO8601
    pub content_hash: String,
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub index: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub token_count: i64,
    pub embedded: bool,
    pub text: String,
}

pub async fn get_file(pool: &SqlitePool, path: &str) -> Result<FileResponse> {
    let path = path.trim_start_matches("./");
    let row = sqlx::query(
        "SELECT id, path, language, size_bytes, modified_at, indexed_at, content_hash FROM files WHERE path = ?",
    )
    .bind(path)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        bail!("file not indexed: {}", path);
    };

    let file_id: String = row.get("id");
    let chunk_rows = sqlx::query(
        r#"
        SELECT c.chunk_index, c.start_line, c.end_line, c.token_count, c.text,
               cv.chunk_id IS NOT NULL AS embedded
        FROM chunks c
        LEFT JOIN chunk_vectors cv ON cv.chunk_id = c.id
        WHERE c.file_id = ?
        ORDER BY c.chunk_index ASC
        "#,
    )
    .bind(&file_id)
    .fetch_all(pool)
    .await?;

    let chunks = chunk_rows
        .iter()
        .map(|r| ChunkResponse {
            index: r.get("chunk_index"),
            start_line: r.get("start_line"),
            end_line: r.get("end_line"),
            token_count: r.get("token_count"),
            embedded: r.get::<i64, _>("embedded") != 0,
            text: r.get("text"),
        })
        .collect();

    Ok(FileResponse {
        id: file_id,
        path: row.get("path"),
        language: row.get("language"),
        size_bytes: row.get("size_bytes"),
        modified_at: format_ts_iso(row.get("modified_at")),
        indexed_at: format_ts_iso(row.get("indexed_at")),
        content_hash: row.get("content_hash"),
        chunks,
    })
}

pub async fn run_get(config: &Config, path: &str, json: bool) -> Result<()> {
    let store = db::open_store(config).await?;
    let result = get_file(store.pool(), path).await;
    store.close().await;
    let file = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&file)?);
        return Ok(());
    }

    println!("--- File ---");
    println!("path:         {}", file.path);
    println!("language:     {}", file.language);
    println!("size:         {} bytes", file.size_bytes);
    println!("modified_at:  {}", file.modified_at);
    println!("indexed_at:   {}", file.indexed_at);
    println!("sha256:       {}", file.content_hash);
    println!();

    println!("--- Chunks ({}) ---", file.chunks.len());
    for chunk in &file.chunks {
        println!(
            "[chunk {}] lines {}-{}, {} tokens{}",
            chunk.index,
            chunk.start_line,
            chunk.end_line,
            chunk.token_count,
            if chunk.embedded { ", embedded" } else { "" }
        );
        println!("{}", chunk.text);
        println!();
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_source, ChunkParams};
    use crate::migrate::apply_schema;
    use crate::models::SourceFile;
    use crate::store::{SqliteStore, VectorStore};
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_get_file_with_chunks() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        let store = SqliteStore::new(pool);

        let id = store
            .upsert_file(&SourceFile {
                id: String::new(),
                path: "src/app.py".to_string(),
                language: "python".to_string(),
                size_bytes: 20,
                modified_at: 0,
                content_hash: "abc".to_string(),
            })
            .await
            .unwrap();
        let params = ChunkParams {
            max_tokens: 100,
            overlap_tokens: 0,
            overflow_allowance: 0.0,
        };
        let chunks = chunk_source(&id, "def main():\n    pass", &params);
        store.replace_chunks(&id, &chunks).await.unwrap();

        let file = get_file(store.pool(), "./src/app.py").await.unwrap();
        assert_eq!(file.language, "python");
        assert_eq!(file.modified_at, "1970-01-01T00:00:00Z");
        assert_eq!(file.chunks.len(), 1);
        assert_eq!(file.chunks[0].end_line, 2);
        assert!(!file.chunks[0].embedded);

        assert!(get_file(store.pool(), "missing.py").await.is_err());
    }
}
