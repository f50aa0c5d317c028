//! `coderag embed pending` / `coderag embed rebuild`.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, ConfiguredEmbedder, Embedder};
use crate::index::{EmbedBatcher, PendingEmbedding};

/// Find and embed chunks that are missing or have stale embeddings.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = ConfiguredEmbedder::new(&config.embedding)?;
    let store = db::open_store(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let pending = find_pending_chunks(store.pool(), embedder.model_name(), limit).await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  chunks needing embeddings: {}", pending.len());
        store.close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all chunks up to date");
        store.close().await;
        return Ok(());
    }

    let total = pending.len();
    let (embedded, failed) = embed_all(&store, &embedder, batch_size, pending).await;
    embedding::unload_local_model();

    println!("embed pending");
    println!("  total pending: {}", total);
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    store.close().await;
    Ok(())
}

/// Delete all embeddings and regenerate them for every chunk.
pub async fn run_embed_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = ConfiguredEmbedder::new(&config.embedding)?;
    let store = db::open_store(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    sqlx::query("DELETE FROM chunk_vectors")
        .execute(store.pool())
        .await?;
    sqlx::query("DELETE FROM embeddings")
        .execute(store.pool())
        .await?;
    println!("embed rebuild: cleared existing embeddings");

    let all_chunks = find_pending_chunks(store.pool(), embedder.model_name(), None).await?;
    if all_chunks.is_empty() {
        println!("  no chunks to embed");
        store.close().await;
        return Ok(());
    }

    let total = all_chunks.len();
    let (embedded, failed) = embed_all(&store, &embedder, batch_size, all_chunks).await;
    embedding::unload_local_model();

    println!("embed rebuild");
    println!("  total chunks: {}", total);
    println!("  dims: {}", embedder.dims());
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    store.close().await;
    Ok(())
}

async fn embed_all(
    store: &crate::store::SqliteStore,
    embedder: &dyn Embedder,
    batch_size: usize,
    items: Vec<PendingEmbedding>,
) -> (u64, u64) {
    tracing::info!(chunks = items.len(), batch_size, model = embedder.model_name(), "embedding chunks");
    let mut batcher = EmbedBatcher::new(store, embedder, batch_size);
    for item in items {
        batcher.push(item).await;
    }
    batcher.flush().await;
    (batcher.written, batcher.failed)
}

/// Chunks with no vector for `model`, or whose vector was computed from
/// different text.
async fn find_pending_chunks(
    pool: &SqlitePool,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingEmbedding>> {
    let limit_val = limit.map(|l| l as i64).unwrap_or(-1);

    let rows = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.file_id, c.text, c.hash
        FROM chunks c
        JOIN files f ON f.id = c.file_id
        LEFT JOIN embeddings e ON e.chunk_id = c.id AND e.model = ?
        WHERE e.chunk_id IS NULL OR e.hash != c.hash
        ORDER BY f.path, c.chunk_index
        LIMIT ?
        "#,
    )
    .bind(model)
    .bind(limit_val)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| PendingEmbedding {
            chunk_id: row.get("chunk_id"),
            file_id: row.get("file_id"),
            text: row.get("text"),
            text_hash: row.get("hash"),
        })
        .collect())
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
    async fn test_pending_tracks_model_and_hash() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        let store = SqliteStore::new(pool);

        let file_id = store
            .upsert_file(&SourceFile {
                id: String::new(),
                path: "a.py".to_string(),
                language: "python".to_string(),
                size_bytes: 3,
                modified_at: 0,
                content_hash: "h".to_string(),
            })
            .await
            .unwrap();
        let params = ChunkParams {
            max_tokens: 4,
            overlap_tokens: 0,
            overflow_allowance: 0.0,
        };
        let chunks = chunk_source(&file_id, "first line\nsecond line", &params);
        assert_eq!(chunks.len(), 2);
        store.replace_chunks(&file_id, &chunks).await.unwrap();

        let pending = find_pending_chunks(store.pool(), "m1", None).await.unwrap();
        assert_eq!(pending.len(), 2);

        store
            .upsert_embedding(&chunks[0].id, &file_id, &[1.0], "m1", &chunks[0].hash)
            .await
            .unwrap();
        let pending = find_pending_chunks(store.pool(), "m1", None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].chunk_id, chunks[1].id);

        // A different model sees everything as pending.
        let other = find_pending_chunks(store.pool(), "m2", Some(1)).await.unwrap();
        assert_eq!(other.len(), 1);

        store
            .upsert_embedding(&chunks[1].id, &file_id, &[1.0], "m1", "stale")
            .await
            .unwrap();
        let pending = find_pending_chunks(store.pool(), "m1", None).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}
