//! Retrieval: keyword, semantic, and hybrid search over indexed chunks.
//!
//! Candidates are fetched per channel from the [`VectorStore`] with the
//! metadata filter already applied, min-max normalised to `[0, 1]`, and
//! blended as `(1 - alpha) * keyword + alpha * semantic`. Results are then
//! ordered, capped per file, truncated to `top_k`, and finally fitted to an
//! optional token budget.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::{Config, RetrievalConfig};
use crate::db;
use crate::embedding;
use crate::lang::Lang;
use crate::models::QueryResult;
use crate::store::{ChunkCandidate, ChunkFilter, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn needs_embeddings(&self) -> bool {
        matches!(self, Self::Semantic | Self::Hybrid)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        })
    }
}

impl FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keyword" => Ok(Self::Keyword),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => bail!(
                "Unknown search mode: {}. Use keyword, semantic, or hybrid.",
                other
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub mode: SearchMode,
    pub filter: ChunkFilter,
    pub top_k: usize,
    /// Upper bound on the summed `token_count` of returned chunks.
    pub token_budget: Option<usize>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode, config: &RetrievalConfig) -> Self {
        Self {
            query: query.into(),
            mode,
            filter: ChunkFilter::default(),
            top_k: config.top_k,
            token_budget: config.token_budget,
        }
    }
}

/// Build a [`ChunkFilter`] from user input, canonicalising the language name.
pub fn build_filter(language: Option<&str>, path_prefix: Option<&str>) -> Result<ChunkFilter> {
    let language = match language {
        Some(name) => match Lang::from_name(name) {
            Some(lang) => Some(lang.name().to_string()),
            None => bail!("Unknown language filter: {}", name),
        },
        None => None,
    };
    Ok(ChunkFilter {
        language,
        path_prefix: path_prefix
            .filter(|p| !p.is_empty())
            .map(|p| p.trim_start_matches("./").to_string()),
    })
}

/// A query vector and the model that produced it.
#[derive(Debug, Clone, Copy)]
pub struct QueryEmbedding<'a> {
    pub vector: &'a [f32],
    pub model: &'a str,
}

/// Rank chunks for `request`.
///
/// `query` must be present for semantic and hybrid modes. Only chunk vectors
/// written by the same model are scored.
pub async fn retrieve(
    store: &dyn VectorStore,
    config: &RetrievalConfig,
    request: &RetrievalRequest,
    query: Option<QueryEmbedding<'_>>,
) -> Result<Vec<QueryResult>> {
    if request.query.trim().is_empty() || request.top_k == 0 {
        return Ok(Vec::new());
    }

    let keyword_candidates = if matches!(request.mode, SearchMode::Keyword | SearchMode::Hybrid) {
        store
            .keyword_search(&request.query, config.candidate_k, &request.filter)
            .await?
    } else {
        Vec::new()
    };

    let vector_candidates = if request.mode.needs_embeddings() {
        let Some(query) = query else {
            bail!("Mode '{}' requires a query embedding", request.mode);
        };
        store
            .vector_search(query.vector, query.model, config.candidate_k, &request.filter)
            .await?
    } else {
        Vec::new()
    };

    let alpha = match request.mode {
        SearchMode::Keyword => 0.0,
        SearchMode::Semantic => 1.0,
        SearchMode::Hybrid => config.hybrid_alpha,
    };

    let mut results = blend(&keyword_candidates, &vector_candidates, alpha);
    sort_results(&mut results);
    results.retain(|r| r.score >= config.min_score);
    let mut results = cap_per_file(results, config.max_chunks_per_file);
    results.truncate(request.top_k);

    Ok(fit_to_budget(results, request.token_budget))
}

/// Embed the query when the mode needs it, then [`retrieve`].
pub async fn search(
    store: &dyn VectorStore,
    config: &Config,
    request: &RetrievalRequest,
) -> Result<Vec<QueryResult>> {
    if request.query.trim().is_empty() {
        return Ok(Vec::new());
    }
    if request.mode.needs_embeddings() && !config.embedding.is_enabled() {
        bail!(
            "Mode '{}' requires embeddings. Set [embedding] provider in config.",
            request.mode
        );
    }

    if !request.mode.needs_embeddings() {
        return retrieve(store, &config.retrieval, request, None).await;
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let vector = embedding::embed_query(provider.as_ref(), &config.embedding, &request.query).await?;
    let query = QueryEmbedding {
        vector: &vector,
        model: provider.model_name(),
    };
    retrieve(store, &config.retrieval, request, Some(query)).await
}

/// Longest relevance-ordered prefix whose summed token count fits `budget`.
///
/// Lowering the budget never lengthens the result.
pub fn fit_to_budget(results: Vec<QueryResult>, budget: Option<usize>) -> Vec<QueryResult> {
    let Some(budget) = budget else {
        return results;
    };
    let mut used = 0usize;
    let mut out = Vec::with_capacity(results.len());
    for r in results {
        let cost = r.token_count.max(0) as usize;
        if used + cost > budget {
            break;
        }
        used += cost;
        out.push(r);
    }
    out
}

fn blend(keyword: &[ChunkCandidate], vector: &[ChunkCandidate], alpha: f64) -> Vec<QueryResult> {
    let kw_map: HashMap<&str, f64> = normalize_scores(keyword)
        .into_iter()
        .map(|(c, s)| (c.chunk_id.as_str(), s))
        .collect();
    let vec_map: HashMap<&str, f64> = normalize_scores(vector)
        .into_iter()
        .map(|(c, s)| (c.chunk_id.as_str(), s))
        .collect();

    let mut all: HashMap<&str, &ChunkCandidate> = HashMap::new();
    for c in keyword.iter().chain(vector.iter()) {
        all.entry(c.chunk_id.as_str()).or_insert(c);
    }

    all.into_iter()
        .map(|(id, c)| {
            let k = kw_map.get(id).copied().unwrap_or(0.0);
            let v = vec_map.get(id).copied().unwrap_or(0.0);
            QueryResult {
                chunk_id: c.chunk_id.clone(),
                path: c.path.clone(),
                language: c.language.clone(),
                chunk_index: c.chunk_index,
                start_line: c.start_line,
                end_line: c.end_line,
                token_count: c.token_count,
                score: (1.0 - alpha) * k + alpha * v,
                text: c.text.clone(),
            }
        })
        .collect()
}

/// Score desc, path asc, chunk index asc.
fn sort_results(results: &mut [QueryResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
}

fn cap_per_file(results: Vec<QueryResult>, max_per_file: usize) -> Vec<QueryResult> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    results
        .into_iter()
        .filter(|r| {
            let n = seen.entry(r.path.clone()).or_insert(0);
            *n += 1;
            *n <= max_per_file
        })
        .collect()
}

/// Min-max normalise raw scores to `[0, 1]`. A single distinct score maps to 1.0.
fn normalize_scores(candidates: &[ChunkCandidate]) -> Vec<(&ChunkCandidate, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c, norm)
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    config: &Config,
    query: &str,
    mode: SearchMode,
    language: Option<String>,
    path_prefix: Option<String>,
    limit: Option<usize>,
    budget: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut request = RetrievalRequest::new(query, mode, &config.retrieval);
    request.filter = build_filter(language.as_deref(), path_prefix.as_deref())?;
    if let Some(l) = limit {
        request.top_k = l;
    }
    if budget.is_some() {
        request.token_budget = budget;
    }

    let store = db::open_store(config).await?;
    let results = search(&store, config, &request).await;
    embedding::unload_local_model();
    store.close().await;
    let results = results?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {}:{}-{} ({})",
            i + 1,
            r.score,
            r.path,
            r.start_line,
            r.end_line,
            r.language
        );
        println!("    tokens: {}", r.token_count);
        println!("    excerpt: \"{}\"", excerpt(&r.text, 160));
        println!("    id: {}", r.chunk_id);
        println!();
    }
    let total: i64 = results.iter().map(|r| r.token_count).sum();
    println!("{} results, {} tokens", results.len(), total);

    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
