//! Index statistics.
//!
//! Totals plus a per-language breakdown of files, chunks and embedding
//! coverage. Used by `coderag stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LanguageStats {
    pub language: String,
    pub files: i64,
    pub chunks: i64,
    pub embedded: i64,
    pub tokens: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub files: i64,
    pub chunks: i64,
    pub embedded: i64,
    pub last_indexed_at: Option<i64>,
    pub by_language: Vec<LanguageStats>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<IndexStats> {
    let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
        .fetch_one(pool)
        .await?;
    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;
    let embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(pool)
        .await?;
    let last_indexed_at: Option<i64> = sqlx::query_scalar("SELECT MAX(indexed_at) FROM files")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT
            f.language,
            COUNT(DISTINCT f.id) AS files,
            COUNT(DISTINCT c.id) AS chunks,
            COUNT(DISTINCT cv.chunk_id) AS embedded,
            COALESCE(SUM(c.token_count), 0) AS tokens
        FROM files f
        LEFT JOIN chunks c ON c.file_id = f.id
        LEFT JOIN chunk_vectors cv ON cv.chunk_id = c.id
        GROUP BY f.language
        ORDER BY files DESC, f.language ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_language = rows
        .iter()
        .map(|row| LanguageStats {
            language: row.get("language"),
            files: row.get("files"),
            chunks: row.get("chunks"),
            embedded: row.get("embedded"),
            tokens: row.get("tokens"),
        })
        .collect();

    Ok(IndexStats {
        files,
        chunks,
        embedded,
        last_indexed_at,
        by_language,
    })
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = db::open_store(config).await?;
    let result = collect_stats(store.pool()).await;
    store.close().await;
    let stats = result?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("coderag index stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Indexed:     {}",
        stats
            .last_indexed_at
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Files:       {}", stats.files);
    println!("  Chunks:      {}", stats.chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded,
        stats.chunks,
        coverage(stats.embedded, stats.chunks)
    );

    if !stats.by_language.is_empty() {
        println!();
        println!("  By language:");
        println!(
            "  {:<14} {:>6} {:>8} {:>10} {:>10}",
            "LANGUAGE", "FILES", "CHUNKS", "EMBEDDED", "TOKENS"
        );
        println!("  {}", "-".repeat(52));
        for s in &stats.by_language {
            println!(
                "  {:<14} {:>6} {:>8} {:>10} {:>10}",
                s.language, s.files, s.chunks, s.embedded, s.tokens
            );
        }
    }

    println!();
    Ok(())
}

fn coverage(embedded: i64, chunks: i64) -> i64 {
    if chunks > 0 {
        (embedded * 100) / chunks
    } else {
        0
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
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

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_coverage() {
        assert_eq!(coverage(0, 0), 0);
        assert_eq!(coverage(1, 4), 25);
    }

    #[tokio::test]
    async fn test_collect_stats_by_language() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        let store = SqliteStore::new(pool);
        let params = ChunkParams {
            max_tokens: 100,
            overlap_tokens: 0,
            overflow_allowance: 0.0,
        };

        for (path, lang) in [("a.py", "python"), ("b.py", "python"), ("c.ts", "typescript")] {
            let id = store
                .upsert_file(&SourceFile {
                    id: String::new(),
                    path: path.to_string(),
                    language: lang.to_string(),
                    size_bytes: 1,
                    modified_at: 0,
                    content_hash: path.to_string(),
                })
                .await
                .unwrap();
            let chunks = chunk_source(&id, "abcd", &params);
            store.replace_chunks(&id, &chunks).await.unwrap();
            if lang == "typescript" {
                store
                    .upsert_embedding(&chunks[0].id, &id, &[1.0], "m", &chunks[0].hash)
                    .await
                    .unwrap();
            }
        }

        let stats = collect_stats(store.pool()).await.unwrap();
        assert_eq!(stats.files, 3);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.embedded, 1);
        assert_eq!(
            stats.by_language[0],
            LanguageStats {
                language: "python".to_string(),
                files: 2,
                chunks: 2,
                embedded: 0,
                tokens: 2,
            }
        );
        assert_eq!(stats.by_language[1].embedded, 1);
    }
}
