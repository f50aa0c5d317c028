//! Process-wide, lazily loaded fastembed model.
//!
//! The model is created inside the first `embed` call and then reused by
//! every later batch. [`unload`] drops it to release memory.

use anyhow::{anyhow, bail, Result};
use std::sync::{Mutex, OnceLock};

use super::resolve_local_model;
use crate::config::EmbeddingConfig;

struct LoadedModel {
    name: String,
    model: fastembed::TextEmbedding,
}

fn slot() -> &'static Mutex<Option<LoadedModel>> {
    static SLOT: OnceLock<Mutex<Option<LoadedModel>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

pub(super) fn is_loaded() -> bool {
    slot().lock().map(|g| g.is_some()).unwrap_or(false)
}

pub(super) fn unload() -> bool {
    match slot().lock() {
        Ok(mut guard) => match guard.take() {
            Some(loaded) => {
                tracing::info!(model = %loaded.name, "unloaded local embedding model");
                true
            }
            None => false,
        },
        Err(_) => false,
    }
}

pub(super) fn check_model_name(name: &str) -> Result<()> {
    config_to_fastembed_model(name).map(|_| ())
}

fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "jina-embeddings-v2-base-code" => Ok(fastembed::EmbeddingModel::JinaEmbeddingsV2BaseCode),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, jina-embeddings-v2-base-code",
            other
        ),
    }
}

pub(super) async fn embed(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let (model_name, _) = resolve_local_model(config);
    let fastembed_model = config_to_fastembed_model(&model_name)?;
    let batch_size = config.batch_size;
    let cache_dir = config.cache_dir.clone();
    let use_gpu = config.use_gpu;
    let texts = texts.to_vec();

    tokio::task::spawn_blocking(move || {
        let mut guard = slot()
            .lock()
            .map_err(|_| anyhow!("local embedding model lock poisoned"))?;

        let needs_load = guard.as_ref().map(|m| m.name != model_name).unwrap_or(true);
        if needs_load {
            if use_gpu {
                tracing::warn!(
                    "embedding.use_gpu is set but no GPU execution provider is compiled in; using CPU"
                );
            }
            let mut options =
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }
            let model = fastembed::TextEmbedding::try_new(options)
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
            tracing::info!(model = %model_name, "loaded local embedding model");
            *guard = Some(LoadedModel {
                name: model_name,
                model,
            });
        }

        let loaded = guard
            .as_mut()
            .ok_or_else(|| anyhow!("local embedding model not loaded"))?;
        loaded
            .model
            .embed(texts, Some(batch_size))
            .map_err(|e| anyhow!("Local embedding failed: {}", e))
    })
    .await?
}
