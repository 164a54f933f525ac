//! # docqa
//!
//! A document question-answering service.
//!
//! Users upload files (PDF, text, Markdown, EPUB, spreadsheets), docqa
//! extracts and chunks their text, embeds the chunks into a SQLite-backed
//! vector index, and answers natural-language questions by retrieving
//! relevant chunks and prompting a chat-completion provider.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────┐   ┌───────────┐
//! │  Upload  │──▶│ Extract + Chunk   │──▶│  SQLite    │
//! │ PDF/EPUB │   │ Embed (cached)    │   │ chunk idx │
//! └──────────┘   └───────────────────┘   └────┬──────┘
//!                                             │
//!                         ┌───────────────────┤
//!                         ▼                   ▼
//!                    ┌──────────┐       ┌──────────┐
//!                    │   CLI    │       │   HTTP   │
//!                    │ (docqa)  │       │  (axum)  │
//!                    └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init                          # create the index
//! docqa ingest ./manual.pdf --tags manual
//! docqa query "how do I configure the proxy?"
//! docqa serve                         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`validate`] | Upload and query validation |
//! | [`extract`] | Multi-format text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`cache`] | Content-addressed embedding cache |
//! | [`embedding`] | Embedding providers and vector utilities |
//! | [`store`] | Chunk index with document-level views |
//! | [`llm`] | Answer generation |
//! | [`ingest`] | Upload pipeline orchestration |
//! | [`query`] | Question-answering orchestration |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |

pub mod cache;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod query;
pub mod server;
pub mod store;
pub mod validate;
