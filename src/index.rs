//! Indexing pipeline orchestration.
//!
//! Coordinates the full flow: scan → read → hash → chunk → store → embed.
//! Files are processed one at a time; chunks are queued into a cross-file
//! embedding batch that is flushed whenever it reaches `batch_size`.
//! Embedding failures are non-fatal: the affected chunks stay pending and
//! `coderag embed pending` picks them up later.

use anyhow::Result;

use crate::chunk::{chunk_source, estimate_tokens, hash_text, ChunkParams};
use crate::config::Config;
use crate::db;
use crate::embedding::{self, ConfiguredEmbedder, Embedder};
use crate::models::{Chunk, SourceFile};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, ProgressMode};
use crate::scanner::{self, ScanReport};
use crate::store::VectorStore;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexReport {
    pub scanned: u64,
    pub indexed: u64,
    pub unchanged: u64,
    pub skipped_large: u64,
    pub skipped_unreadable: u64,
    pub pruned: u64,
    pub chunks_written: u64,
    pub embeddings_written: u64,
    pub embeddings_pending: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Re-index files even when their content hash is unchanged.
    pub full: bool,
    /// Drop indexed files that no longer appear in the scan.
    pub prune: bool,
}

/// A chunk waiting for its vector.
#[derive(Debug, Clone)]
pub struct PendingEmbedding {
    pub chunk_id: String,
    pub file_id: String,
    pub text: String,
    pub text_hash: String,
}

impl From<&Chunk> for PendingEmbedding {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            file_id: chunk.file_id.clone(),
            text: chunk.text.clone(),
            text_hash: chunk.hash.clone(),
        }
    }
}

/// Accumulates chunks across files and embeds them in fixed-size batches.
pub struct EmbedBatcher<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    batch_size: usize,
    queue: Vec<PendingEmbedding>,
    pub written: u64,
    pub failed: u64,
}

impl<'a> EmbedBatcher<'a> {
    pub fn new(store: &'a dyn VectorStore, embedder: &'a dyn Embedder, batch_size: usize) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
            queue: Vec::with_capacity(batch_size),
            written: 0,
            failed: 0,
        }
    }

    pub async fn push(&mut self, item: PendingEmbedding) {
        self.queue.push(item);
        if self.queue.len() >= self.batch_size {
            self.flush().await;
        }
    }

    /// Embed everything queued. Failures are logged and counted, never returned.
    pub async fn flush(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.queue);
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match self.embedder.embed(&texts).await {
            Ok(vectors) => {
                let model = self.embedder.model_name();
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    match self
                        .store
                        .upsert_embedding(&item.chunk_id, &item.file_id, vec, model, &item.text_hash)
                        .await
                    {
                        Ok(()) => self.written += 1,
                        Err(e) => {
                            tracing::warn!(chunk = %item.chunk_id, error = %e, "failed to store embedding");
                            self.failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(batch = batch.len(), error = %e, "embedding batch failed");
                self.failed += batch.len() as u64;
            }
        }
    }
}

/// Index the scanned files into `store`.
pub async fn index_files(
    store: &dyn VectorStore,
    scan: &ScanReport,
    config: &Config,
    embedder: Option<&dyn Embedder>,
    options: IndexOptions,
    progress: &dyn IndexProgressReporter,
) -> Result<IndexReport> {
    let params = ChunkParams::from_config(&config.chunking);
    let mut batcher =
        embedder.map(|e| EmbedBatcher::new(store, e, config.embedding.batch_size));

    let mut report = IndexReport {
        scanned: (scan.files.len() + scan.skipped_large.len()) as u64,
        skipped_large: scan.skipped_large.len() as u64,
        ..Default::default()
    };
    let total = scan.files.len() as u64;

    for (n, file) in scan.files.iter().enumerate() {
        let content = match scanner::read_source(&file.abs_path) {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::warn!(path = %file.rel_path, "skipping binary or non-UTF-8 file");
                report.skipped_unreadable += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(path = %file.rel_path, error = %e, "skipping unreadable file");
                report.skipped_unreadable += 1;
                continue;
            }
        };

        let content_hash = hash_text(&content);
        if !options.full
            && store.file_hash(&file.rel_path).await?.as_deref() == Some(content_hash.as_str())
        {
            report.unchanged += 1;
            progress.report(IndexProgressEvent::Indexing {
                n: n as u64 + 1,
                total,
            });
            continue;
        }

        // The hash is recorded only once the chunks are in, so a failed
        // chunk write leaves the file looking changed on the next run.
        let mut record = SourceFile {
            id: String::new(),
            path: file.rel_path.clone(),
            language: file.language.clone(),
            size_bytes: file.size_bytes as i64,
            modified_at: file.modified_at,
            content_hash: String::new(),
        };
        let file_id = store.upsert_file(&record).await?;

        let chunks = chunk_source(&file_id, &content, &params);
        store.replace_chunks(&file_id, &chunks).await?;
        record.id = file_id.clone();
        record.content_hash = content_hash;
        store.upsert_file(&record).await?;
        report.indexed += 1;
        report.chunks_written += chunks.len() as u64;

        match batcher.as_mut() {
            Some(b) => {
                for chunk in &chunks {
                    b.push(PendingEmbedding::from(chunk)).await;
                }
                progress.report(IndexProgressEvent::Embedding { n: b.written });
            }
            None if config.embedding.is_enabled() => {
                report.embeddings_pending += chunks.len() as u64;
            }
            None => {}
        }

        progress.report(IndexProgressEvent::Indexing {
            n: n as u64 + 1,
            total,
        });
    }

    if let Some(mut b) = batcher {
        b.flush().await;
        report.embeddings_written = b.written;
        report.embeddings_pending += b.failed;
    }

    if options.prune {
        let keep: Vec<String> = scan.files.iter().map(|f| f.rel_path.clone()).collect();
        report.pruned = store.prune_files(&keep).await?;
    }

    Ok(report)
}

pub async fn run_index(
    config: &Config,
    full: bool,
    dry_run: bool,
    limit: Option<usize>,
    progress_mode: ProgressMode,
) -> Result<()> {
    let progress = progress_mode.reporter();
    progress.report(IndexProgressEvent::Scanning {
        root: config.indexing.root.display().to_string(),
    });

    let mut scan = scanner::scan(&config.indexing)?;
    if let Some(lim) = limit {
        scan.files.truncate(lim);
    }

    if dry_run {
        return print_dry_run(config, &scan);
    }

    let store = db::open_store(config).await?;

    let embedder = if config.embedding.is_enabled() {
        match ConfiguredEmbedder::new(&config.embedding) {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!(error = %e, "could not create embedding provider; chunks left pending");
                None
            }
        }
    } else {
        None
    };

    let options = IndexOptions {
        full,
        prune: limit.is_none(),
    };
    let result = index_files(
        &store,
        &scan,
        config,
        embedder.as_ref().map(|e| e as &dyn Embedder),
        options,
        progress.as_ref(),
    )
    .await;

    embedding::unload_local_model();
    store.close().await;
    let report = result?;

    println!("index {}", config.indexing.root.display());
    println!("  scanned: {} files", report.scanned);
    println!("  indexed: {}", report.indexed);
    println!("  unchanged: {}", report.unchanged);
    println!("  skipped (too large): {}", report.skipped_large);
    println!("  skipped (unreadable): {}", report.skipped_unreadable);
    println!("  pruned: {}", report.pruned);
    println!("  chunks written: {}", report.chunks_written);
    if config.embedding.is_enabled() {
        println!("  embeddings written: {}", report.embeddings_written);
        println!("  embeddings pending: {}", report.embeddings_pending);
    }
    println!("ok");

    Ok(())
}

fn print_dry_run(config: &Config, scan: &ScanReport) -> Result<()> {
    let params = ChunkParams::from_config(&config.chunking);
    let mut total_chunks = 0usize;
    let mut total_tokens = 0usize;
    for file in &scan.files {
        if let Ok(Some(text)) = scanner::read_source(&file.abs_path) {
            let chunks = chunk_source("dry-run", &text, &params);
            total_chunks += chunks.len();
            total_tokens += estimate_tokens(&text);
        }
    }

    println!("index {} (dry-run)", config.indexing.root.display());
    println!("  files found: {}", scan.files.len());
    println!("  skipped (too large): {}", scan.skipped_large.len());
    println!("  estimated chunks: {}", total_chunks);
    println!("  estimated tokens: {}", total_tokens);

    for path in &scan.skipped_large {
        println!("  too large: {}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::progress::NoProgress;
    use crate::store::{ChunkCandidate, ChunkFilter, InMemoryStore};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records every text it sees and returns a length-based vector.
    #[derive(Default)]
    struct RecordingEmbedder {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for RecordingEmbedder {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.fail {
                anyhow::bail!("provider unavailable");
            }
            self.seen.lock().unwrap().extend(texts.iter().cloned());
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    /// Fails the next `replace_chunks` call once `fail_next` is set.
    #[derive(Default)]
    struct FailingChunkStore {
        inner: InMemoryStore,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl VectorStore for FailingChunkStore {
        async fn upsert_file(&self, file: &SourceFile) -> Result<String> {
            self.inner.upsert_file(file).await
        }

        async fn file_hash(&self, path: &str) -> Result<Option<String>> {
            self.inner.file_hash(path).await
        }

        async fn replace_chunks(&self, file_id: &str, chunks: &[Chunk]) -> Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.replace_chunks(file_id, chunks).await
        }

        async fn upsert_embedding(
            &self,
            chunk_id: &str,
            file_id: &str,
            vector: &[f32],
            model: &str,
            text_hash: &str,
        ) -> Result<()> {
            self.inner
                .upsert_embedding(chunk_id, file_id, vector, model, text_hash)
                .await
        }

        async fn keyword_search(
            &self,
            query: &str,
            limit: i64,
            filter: &ChunkFilter,
        ) -> Result<Vec<ChunkCandidate>> {
            self.inner.keyword_search(query, limit, filter).await
        }

        async fn vector_search(
            &self,
            query_vec: &[f32],
            model: &str,
            limit: i64,
            filter: &ChunkFilter,
        ) -> Result<Vec<ChunkCandidate>> {
            self.inner.vector_search(query_vec, model, limit, filter).await
        }

        async fn prune_files(&self, keep: &[String]) -> Result<u64> {
            self.inner.prune_files(keep).await
        }
    }

    fn config_for(root: &std::path::Path, max_file_size: u64) -> Config {
        let mut config = Config::default();
        config.indexing = IndexingConfig {
            root: root.to_path_buf(),
            max_file_size,
            ..IndexingConfig::default()
        };
        config.embedding.provider = "local".to_string();
        config.embedding.batch_size = 2;
        config
    }

    #[tokio::test]
    async fn test_oversized_files_never_embedded() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("small.py"), "def small():\n    return 1\n").unwrap();
        fs::write(
            tmp.path().join("huge.py"),
            format!("HUGE_MARKER = 1\n{}", "x = 2\n".repeat(400)),
        )
        .unwrap();

        let config = config_for(tmp.path(), 512);
        let scan = scanner::scan(&config.indexing).unwrap();
        let store = InMemoryStore::new();
        let embedder = RecordingEmbedder::default();

        let report = index_files(
            &store,
            &scan,
            &config,
            Some(&embedder),
            IndexOptions::default(),
            &NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(report.skipped_large, 1);
        assert_eq!(report.indexed, 1);
        assert!(embedder
            .seen
            .lock()
            .unwrap()
            .iter()
            .all(|t| !t.contains("HUGE_MARKER")));
        assert_eq!(store.file_hash("huge.py").await.unwrap(), None);
        assert_eq!(report.embeddings_written, report.chunks_written);
    }

    #[tokio::test]
    async fn test_unchanged_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.py"), "a = 1\n").unwrap();
        let config = config_for(tmp.path(), 1024);
        let store = InMemoryStore::new();

        let scan = scanner::scan(&config.indexing).unwrap();
        let first = index_files(&store, &scan, &config, None, IndexOptions::default(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(first.indexed, 1);

        let second = index_files(&store, &scan, &config, None, IndexOptions::default(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(second.indexed, 0);
        assert_eq!(second.unchanged, 1);

        let forced = index_files(
            &store,
            &scan,
            &config,
            None,
            IndexOptions {
                full: true,
                prune: false,
            },
            &NoProgress,
        )
        .await
        .unwrap();
        assert_eq!(forced.indexed, 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_write_is_retried() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.py"), "def old_name():\n    pass\n").unwrap();
        let config = config_for(tmp.path(), 1024);
        let store = FailingChunkStore::default();

        let scan = scanner::scan(&config.indexing).unwrap();
        index_files(&store, &scan, &config, None, IndexOptions::default(), &NoProgress)
            .await
            .unwrap();

        fs::write(tmp.path().join("a.py"), "def new_name():\n    pass\n").unwrap();
        let scan = scanner::scan(&config.indexing).unwrap();
        store.fail_next.store(true, Ordering::SeqCst);
        let err = index_files(&store, &scan, &config, None, IndexOptions::default(), &NoProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));

        let retry = index_files(&store, &scan, &config, None, IndexOptions::default(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(retry.indexed, 1);
        assert_eq!(retry.unchanged, 0);

        let filter = ChunkFilter::default();
        assert_eq!(store.keyword_search("new_name", 10, &filter).await.unwrap().len(), 1);
        assert!(store.keyword_search("old_name", 10, &filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_chunks_pending() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.py"), "a = 1\n").unwrap();
        fs::write(tmp.path().join("b.py"), "b = 2\n").unwrap();
        let config = config_for(tmp.path(), 1024);
        let store = InMemoryStore::new();
        let embedder = RecordingEmbedder {
            fail: true,
            ..Default::default()
        };

        let scan = scanner::scan(&config.indexing).unwrap();
        let report = index_files(
            &store,
            &scan,
            &config,
            Some(&embedder),
            IndexOptions::default(),
            &NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(report.indexed, 2);
        assert_eq!(report.embeddings_written, 0);
        assert_eq!(report.embeddings_pending, 2);
        assert_eq!(store.chunk_count().await, 2);
    }

    #[tokio::test]
    async fn test_prune_removes_deleted_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.py"), "a = 1\n").unwrap();
        fs::write(tmp.path().join("b.py"), "b = 2\n").unwrap();
        let config = config_for(tmp.path(), 1024);
        let store = InMemoryStore::new();
        let options = IndexOptions {
            full: false,
            prune: true,
        };

        let scan = scanner::scan(&config.indexing).unwrap();
        index_files(&store, &scan, &config, None, options, &NoProgress)
            .await
            .unwrap();
        assert_eq!(store.file_count().await, 2);

        fs::remove_file(tmp.path().join("b.py")).unwrap();
        let scan = scanner::scan(&config.indexing).unwrap();
        let report = index_files(&store, &scan, &config, None, options, &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.pruned, 1);
        assert_eq!(store.file_count().await, 1);
    }

    #[tokio::test]
    async fn test_batcher_flushes_across_files() {
        let store = InMemoryStore::new();
        let embedder = RecordingEmbedder::default();
        let mut batcher = EmbedBatcher::new(&store, &embedder, 3);
        for i in 0..4 {
            batcher
                .push(PendingEmbedding {
                    chunk_id: format!("c{}", i),
                    file_id: format!("f{}", i % 2),
                    text: format!("text {}", i),
                    text_hash: String::new(),
                })
                .await;
        }
        assert_eq!(batcher.written, 3);
        batcher.flush().await;
        assert_eq!(batcher.written, 4);
        assert_eq!(store.vector_count().await, 4);
    }
}
