#![deny(missing_docs)]

//! Core library for the ragserve retrieval-augmented generation backend.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Generation and embedding provider abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Document chunking pipeline and chunk persistence boundary.
pub mod processing;
/// Retrieval-augmented generation orchestration.
pub mod rag;
/// Prompt template engine.
pub mod templates;
/// Vector store abstraction and backends.
pub mod vectordb;
