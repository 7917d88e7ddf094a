//! # RAG Chat
//!
//! A retrieval-augmented chat service: upload documents, ask questions, and
//! get answers grounded in the uploaded text, either in one piece over HTTP
//! or streamed token by token over a WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Upload  │──▶│  Ingestion   │──▶│ Vector index │
//! │ PDF/DOCX │   │ Chunk+Embed  │   │ SQLite / mem │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │ top-k
//!                ┌──────────────┐   ┌──────▼───────┐
//!   client ◀────▶│ /ws/chat     │──▶│ QueryEngine  │──▶ LLM (SSE)
//!                │ /chat        │   └──────────────┘
//!                └──────────────┘
//! ```
//!
//! Orchestration (ingestion, query, sessions) lives in the transport-free
//! [`rag_chat_core`] crate; this crate supplies the production adapters and
//! the axum server.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed vector index |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completions generator with SSE streaming |
//! | [`extract`] | PDF/DOCX/TXT document loader |
//! | [`upload`] | Upload validation and storage |
//! | [`services`] | Service wiring from configuration |
//! | [`server`] | HTTP routes |
//! | [`ws`] | WebSocket session transport |

pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod llm;
pub mod migrate;
pub mod server;
pub mod services;
pub mod sqlite_store;
pub mod upload;
pub mod ws;

pub use rag_chat_core as core;
