//! # coderag
//!
//! A local retrieval-augmented coding assistant: index a source tree into a
//! SQLite vector store, retrieve the chunks most relevant to a query within
//! a token budget, and scaffold unit tests from a file's code structure.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │ scanner  │──▶│ chunk+embed  │──▶│ VectorStore  │
//! │ walk+cap │   │ token budget │   │ SQLite/FTS5  │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │ search
//! ┌──────────┐   ┌──────────────┐          ▼
//! │ analysis │──▶│   testgen    │     ┌─────────┐
//! │tree-sitter│  │ plan+render  │     │ CLI/HTTP│
//! └──────────┘   └──────────────┘     └─────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`lang`] | Supported languages and extension mapping |
//! | [`scanner`] | Source tree walk with size and glob filters |
//! | [`chunk`] | Token-budgeted chunking with overlap |
//! | [`embedding`] | Embedding providers and batching |
//! | [`store`] | Vector store trait, SQLite and in-memory backends |
//! | [`index`] | Indexing pipeline |
//! | [`search`] | Keyword, semantic, and hybrid retrieval |
//! | [`analysis`] | Code structure extraction |
//! | [`testgen`] | Test plan and framework templates |
//! | [`server`] | HTTP tool server |

pub mod analysis;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod index;
pub mod lang;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod scanner;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
pub mod testgen;
