//! # Clinical RAG
//!
//! Retrieval-augmented question answering over per-domain clinical document
//! collections. Passages from each domain are embedded into a flat
//! inner-product index; a query is embedded once, searched across domains,
//! thresholded, pooled and ranked, and the top passages are handed to an LLM
//! with instructions to answer only from that evidence and cite it.
//!
//! The retrieval and composition logic lives in [`clinical_rag_core`]. This
//! crate supplies the I/O around it.
//!
//! ## Architecture
//!
//! ```text
//! passages/<domain>/*.json ──▶ clinrag build ──▶ <domain>_index.bin
//!                                                <domain>_metadata.json
//!                                                         │
//!                                                         ▼
//!          CLI (clinrag) ──┐                  ┌──────────────────┐
//!                          ├────────────────▶ │   QueryService   │
//!          HTTP (axum) ────┘                  │ engine + composer│
//!                                             └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding providers (fastembed, OpenAI, Ollama) |
//! | [`generation`] | OpenRouter chat-completions provider |
//! | [`store`] | Index and metadata artifacts, build manifest |
//! | [`build_cmd`] | Embed passages and write domain indexes |
//! | [`service`] | Boundary validation, query flow, atomic reload |
//! | [`server`] | HTTP API |

pub mod build_cmd;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod server;
pub mod service;
pub mod store;
