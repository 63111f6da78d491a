//! # Clinical RAG Core
//!
//! Runtime-free retrieval and answer-composition logic for Clinical RAG:
//! the passage model, the domain registry, per-domain vector indexes, the
//! cross-domain retrieval engine, and the grounded answer composer.
//!
//! This crate has no HTTP client or filesystem I/O, and uses tokio only for
//! the generation deadline. Embedding
//! and text generation are reached through the [`embedding::Embedder`] and
//! [`generation::GenerationProvider`] traits; concrete providers and index
//! persistence live in the `clinical-rag` application crate.
//!
//! ## Data Flow
//!
//! ```text
//! query ─▶ RetrievalEngine ─────────────────────────▶ AnswerComposer ─▶ Answer
//!          domain filter → embed → per-domain k-NN      context → prompt →
//!          → threshold → pool → sort → truncate        generate → confidence
//! ```

pub mod composer;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;
pub mod registry;
pub mod retrieval;

pub use composer::{Answer, AnswerComposer, ComposerParams, EvidenceContext};
pub use error::{GenerationError, IndexError, RetrievalError};
pub use index::{DomainIndex, FlatIndex, IndexHit, VectorIndex};
pub use models::{AnswerResult, ChunkType, Confidence, Passage, RetrievedPassage, SourceCitation};
pub use registry::{DomainRegistry, DomainSpec};
pub use retrieval::{DomainHealth, RetrievalEngine, RetrievalParams};
