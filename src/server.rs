//! HTTP tool server.
//!
//! Exposes retrieval and test generation over a small JSON API so editors
//! and agents can call them without shelling out to the CLI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/tools/search` | Retrieve chunks for a query |
//! | `POST` | `/tools/generate_tests` | Generate a test scaffold for a source file |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `embeddings_disabled` (400),
//! `internal` (500).
//!
//! All origins, methods, and headers are permitted (CORS).

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::QueryResult;
use crate::search::{self, build_filter, RetrievalRequest, SearchMode};
use crate::store::VectorStore;
use crate::testgen::{self, GeneratedTests, TestFramework, TestGenError, TestGenOptions, TestTarget};

/// Shared state handed to every route handler.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<dyn VectorStore>,
}

/// Start the server on `[server].bind` and run until Ctrl-C.
///
/// A local embedding model stays resident across requests and is released
/// on shutdown.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let store = db::open_store(config).await?;
    let app = router(Arc::new(config.clone()), Arc::new(store));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("coderag server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await;

    if embedding::unload_local_model() {
        tracing::info!("released local embedding model");
    }
    tracing::info!("server stopped");
    served?;
    Ok(())
}

fn router(config: Arc<Config>, store: Arc<dyn VectorStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/search", post(handle_search))
        .route("/tools/generate_tests", post(handle_generate_tests))
        .layer(cors)
        .with_state(AppState { config, store })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    error(StatusCode::NOT_FOUND, "not_found", message)
}

fn internal(message: impl Into<String>) -> AppError {
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Map retrieval failures to the error contract by message.
fn classify_search_error(err: anyhow::Error) -> AppError {
    let msg = format!("{:#}", err);
    if msg.contains("requires embeddings") {
        error(StatusCode::BAD_REQUEST, "embeddings_disabled", msg)
    } else if msg.contains("Unknown language") {
        bad_request(msg)
    } else {
        internal(msg)
    }
}

impl From<TestGenError> for AppError {
    fn from(err: TestGenError) -> Self {
        let msg = err.to_string();
        match err {
            TestGenError::TargetNotFound { .. } => not_found(msg),
            TestGenError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => not_found(msg),
            TestGenError::Io(_) | TestGenError::Parse { .. } => internal(msg),
            TestGenError::UnknownFramework(_)
            | TestGenError::UnsupportedLanguage { .. }
            | TestGenError::FrameworkMismatch { .. }
            | TestGenError::InvalidTarget(_) => bad_request(msg),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /tools/search ============

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    mode: SearchMode,
    language: Option<String>,
    path_prefix: Option<String>,
    limit: Option<usize>,
    token_budget: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<QueryResult>,
    total_tokens: i64,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(params): Json<SearchParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    if params.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let mut request = RetrievalRequest::new(&params.query, params.mode, &state.config.retrieval);
    request.filter = build_filter(params.language.as_deref(), params.path_prefix.as_deref())
        .map_err(classify_search_error)?;
    if let Some(limit) = params.limit {
        if limit == 0 {
            return Err(bad_request("limit must be >= 1"));
        }
        request.top_k = limit;
    }
    if params.token_budget.is_some() {
        request.token_budget = params.token_budget;
    }

    let results = search::search(state.store.as_ref(), &state.config, &request)
        .await
        .map_err(classify_search_error)?;

    let total_tokens = results.iter().map(|r| r.token_count).sum();
    let response = SearchResponse {
        results,
        total_tokens,
    };
    Ok(Json(serde_json::json!({ "result": response })))
}

// ============ POST /tools/generate_tests ============

#[derive(Debug, Deserialize)]
struct GenerateParams {
    /// Source file, relative to `[indexing].root`.
    path: String,
    /// Source text; when absent the file is read from disk.
    source: Option<String>,
    #[serde(default = "default_target")]
    target: String,
    framework: Option<TestFramework>,
    include_mocks: Option<bool>,
    include_edge_cases: Option<bool>,
    include_error_cases: Option<bool>,
    include_integration_tests: Option<bool>,
    max_tests_per_function: Option<usize>,
}

fn default_target() -> String {
    "module".to_string()
}

impl GenerateParams {
    fn options(&self, config: &Config) -> TestGenOptions {
        let mut options = TestGenOptions::from(&config.testgen);
        if let Some(v) = self.include_mocks {
            options.include_mocks = v;
        }
        if let Some(v) = self.include_edge_cases {
            options.include_edge_cases = v;
        }
        if let Some(v) = self.include_error_cases {
            options.include_error_cases = v;
        }
        if let Some(v) = self.include_integration_tests {
            options.include_integration_tests = v;
        }
        if let Some(v) = self.max_tests_per_function {
            options.max_tests_per_function = v.max(1);
        }
        options
    }
}

/// Resolve a request path under the indexing root, refusing escapes.
fn resolve_under_root(root: &Path, requested: &str) -> Result<PathBuf, AppError> {
    let rel = Path::new(requested);
    let escapes = rel.is_absolute()
        || rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(bad_request(format!(
            "path must be relative to the indexing root: {}",
            requested
        )));
    }
    Ok(root.join(rel))
}

async fn handle_generate_tests(
    State(state): State<AppState>,
    Json(params): Json<GenerateParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    if params.path.trim().is_empty() {
        return Err(bad_request("path must not be empty"));
    }
    let target: TestTarget = params.target.parse()?;
    let options = params.options(&state.config);
    let config = Arc::clone(&state.config);

    // File IO and parsing are blocking work.
    let generated = tokio::task::spawn_blocking(move || -> Result<GeneratedTests, AppError> {
        let source = match params.source {
            Some(source) => source,
            None => {
                let full = resolve_under_root(&config.indexing.root, &params.path)?;
                std::fs::read_to_string(&full).map_err(TestGenError::from)?
            }
        };
        Ok(testgen::generate_tests(
            Path::new(&params.path),
            &source,
            &target,
            params.framework,
            &config.testgen,
            &options,
        )?)
    })
    .await
    .map_err(|e| internal(format!("test generation task failed: {}", e)))??;

    Ok(Json(serde_json::json!({ "result": generated })))
}
