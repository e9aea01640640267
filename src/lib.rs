//! # Lantern
//!
//! A local-first retrieval-augmented-generation (RAG) assistant: ingest
//! documents from the filesystem or a task tracker into a persistent vector
//! index, retrieve the passages most relevant to a question, and hand
//! question plus context to a configurable language-model endpoint.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────────┐   ┌────────────┐
//! │  Loaders   │──▶│ Chunk + Embed   │──▶│  SQLite    │
//! │ FS/Tracker │   │ (IndexManager)  │   │ vec store  │
//! └────────────┘   └─────────────────┘   └─────┬──────┘
//!                                              │
//!              question ─▶ Retriever ─▶ Context Assembler
//!                                              │
//!                               Orchestrator ──┴─▶ answer + citations
//!                                              (or retrieval-only context
//!                                               when no endpoint is set)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, validated at load |
//! | [`models`] | Documents, chunks, hits, context, answers |
//! | [`chunk`] | Overlapping sliding-window chunker |
//! | [`store`] | Vector store trait, SQLite and in-memory backends |
//! | [`embedding`] | Embedding provider trait + HTTP provider |
//! | [`index`] | Upsert/delete with batching and partial-write reporting |
//! | [`retrieve`] | Top-k similarity retrieval |
//! | [`context`] | Budgeted, deduplicated context assembly |
//! | [`answer`] | Prompt building, generation client, degraded mode |
//! | [`prioritize`] | Deterministic ranking of ingested tracker tasks |
//! | [`loader_fs`] | Filesystem document loader |
//! | [`loader_tracker`] | Task-tracker document loader |
//! | [`ingest`] | Ingestion pipeline and run reports |
//! | [`error`] | Error taxonomy |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod loader_fs;
pub mod loader_tracker;
pub mod models;
pub mod prioritize;
pub mod retrieve;
pub mod store;

pub use error::{Error, Result};
