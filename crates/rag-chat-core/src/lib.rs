//! # RAG Chat Core
//!
//! Transport-free logic for RAG Chat: data models, the error taxonomy,
//! capability traits for the external collaborators (document loader,
//! chunker, embedder, vector index, text generator), and the orchestration
//! built on top of them.
//!
//! This crate contains no tokio runtime, sqlx, or HTTP dependencies. Every
//! collaborator is reached through a trait, so the same orchestration runs
//! against production adapters (in the `rag-chat` app crate) and against
//! in-memory fakes in tests.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Chunks, answers, stream events, inbound messages |
//! | [`error`] | [`RagError`](error::RagError) taxonomy |
//! | [`chunk`] | Recursive character splitter |
//! | [`embedding`] | Embedder trait, hashing embedder, vector helpers |
//! | [`store`] | Vector index trait and in-memory index |
//! | [`generation`] | Text generator trait and token streams |
//! | [`loader`] | Document loader trait and extension checks |
//! | [`prompt`] | Fixed RAG prompt template |
//! | [`ingest`] | Load → chunk → store pipeline |
//! | [`query`] | Blocking and streaming query orchestration |
//! | [`session`] | Connection registry and per-connection session loop |

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod prompt;
pub mod query;
pub mod session;
pub mod store;
