//! TOML configuration parsing and validation.
//!
//! Every section carries defaults, so a config file may be as small as a
//! single `[db]` table. [`load_config`] parses and validates; commands that
//! never touch the store (e.g. `gen-tests`) fall back to [`Config::default`]
//! when no file is present.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::lang::Lang;
use crate::testgen::TestFramework;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub testgen: TestGenConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Location of the SQLite file that backs the vector store.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/coderag.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Files larger than this many bytes are never read or embedded.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_include_extensions")]
    pub include_extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_file_size: default_max_file_size(),
            include_extensions: default_include_extensions(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_max_file_size() -> u64 {
    1024 * 1024
}
fn default_include_extensions() -> Vec<String> {
    Lang::all()
        .iter()
        .flat_map(|l| l.extensions().iter())
        .map(|e| e.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
    /// Fraction above `max_tokens` a chunk may grow to absorb a short tail.
    #[serde(default = "default_overflow_allowance")]
    pub overflow_allowance: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
            overflow_allowance: default_overflow_allowance(),
        }
    }
}

fn default_max_tokens() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}
fn default_overflow_allowance() -> f64 {
    0.1
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub use_gpu: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Model download cache for the local provider.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            use_gpu: false,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
            cache_dir: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: i64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_chunks_per_file")]
    pub max_chunks_per_file: usize,
    #[serde(default)]
    pub min_score: f64,
    #[serde(default)]
    pub token_budget: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k: default_candidate_k(),
            top_k: default_top_k(),
            max_chunks_per_file: default_max_chunks_per_file(),
            min_score: 0.0,
            token_budget: None,
        }
    }
}

fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> i64 {
    80
}
fn default_top_k() -> usize {
    5
}
fn default_max_chunks_per_file() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct TestGenConfig {
    #[serde(default = "default_python_framework")]
    pub python: String,
    #[serde(default = "default_js_framework")]
    pub javascript: String,
    #[serde(default = "default_js_framework")]
    pub typescript: String,
    #[serde(default = "default_csharp_framework")]
    pub csharp: String,
    #[serde(default = "default_cpp_framework")]
    pub cpp: String,
    #[serde(default = "default_true")]
    pub include_mocks: bool,
    #[serde(default = "default_true")]
    pub include_edge_cases: bool,
    #[serde(default = "default_true")]
    pub include_error_cases: bool,
    #[serde(default)]
    pub include_integration_tests: bool,
    #[serde(default = "default_max_tests_per_function")]
    pub max_tests_per_function: usize,
}

impl Default for TestGenConfig {
    fn default() -> Self {
        Self {
            python: default_python_framework(),
            javascript: default_js_framework(),
            typescript: default_js_framework(),
            csharp: default_csharp_framework(),
            cpp: default_cpp_framework(),
            include_mocks: true,
            include_edge_cases: true,
            include_error_cases: true,
            include_integration_tests: false,
            max_tests_per_function: default_max_tests_per_function(),
        }
    }
}

fn default_python_framework() -> String {
    "pytest".to_string()
}
fn default_js_framework() -> String {
    "jest".to_string()
}
fn default_csharp_framework() -> String {
    "xunit".to_string()
}
fn default_cpp_framework() -> String {
    "gtest".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_tests_per_function() -> usize {
    5
}

impl TestGenConfig {
    /// The configured framework selector for a language, if it has one.
    pub fn framework_for(&self, lang: Lang) -> Option<&str> {
        match lang {
            Lang::Python => Some(&self.python),
            Lang::JavaScript => Some(&self.javascript),
            Lang::TypeScript => Some(&self.typescript),
            Lang::CSharp => Some(&self.csharp),
            Lang::Cpp => Some(&self.cpp),
            _ => None,
        }
    }

    fn selectors(&self) -> HashMap<Lang, &str> {
        Lang::all()
            .iter()
            .filter_map(|&l| self.framework_for(l).map(|f| (l, f)))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        bail!("chunking.overlap_tokens must be < chunking.max_tokens");
    }
    if !(0.0..=1.0).contains(&config.chunking.overflow_allowance) {
        bail!("chunking.overflow_allowance must be in [0.0, 1.0]");
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_chunks_per_file < 1 {
        bail!("retrieval.max_chunks_per_file must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }

    // Embedding
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }

    // Test generation
    if config.testgen.max_tests_per_function == 0 {
        bail!("testgen.max_tests_per_function must be >= 1");
    }
    for (lang, selector) in config.testgen.selectors() {
        let framework: TestFramework = selector
            .parse()
            .with_context(|| format!("testgen.{}", lang.name()))?;
        if !framework.supports(lang) {
            bail!(
                "testgen.{}: framework '{}' cannot test {} code",
                lang.name(),
                framework,
                lang.name()
            );
        }
    }

    Ok(())
}
