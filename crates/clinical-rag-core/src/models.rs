//! Core data models that flow through retrieval and answer composition.
//!
//! [`Passage`] is the unit of indexed evidence. Retrieval annotates it with a
//! per-query score ([`RetrievedPassage`]), and the composer turns the passages
//! it consumed into [`SourceCitation`]s for the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of content a passage was extracted from.
///
/// Unknown tags produced by an extraction pipeline deserialize as
/// [`ChunkType::Other`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// Narrative text from a document page.
    #[default]
    Text,
    /// One row of a tabular source rendered as `column: value | ...`.
    StructuredData,
    #[serde(other)]
    Other,
}

/// A unit of retrievable evidence.
///
/// Passages are created at ingestion time and are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Passage text. Never empty for an indexed passage.
    pub text: String,
    /// Originating document identifier (e.g. a PDF file name).
    pub source: String,
    /// Owning domain identifier.
    #[serde(default)]
    pub domain: String,
    /// Page number within the source, `0` when unknown.
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub chunk_type: ChunkType,
    /// Identifier unique within `source`.
    #[serde(default)]
    pub chunk_id: String,
    /// Opaque positional metadata from the extractor.
    #[serde(default)]
    pub grounding: Vec<serde_json::Value>,
}

/// A [`Passage`] annotated with its similarity to one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    #[serde(flatten)]
    pub passage: Passage,
    /// Cosine similarity between the query and the passage embedding.
    pub similarity_score: f32,
}

/// Verifiable evidence returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub source: String,
    pub page: u32,
    pub chunk_type: ChunkType,
    pub similarity: f32,
    /// Leading characters of the passage text.
    pub text_excerpt: String,
}

impl SourceCitation {
    pub fn from_retrieved(retrieved: &RetrievedPassage, excerpt_chars: usize) -> Self {
        Self {
            source: retrieved.passage.source.clone(),
            page: retrieved.passage.page,
            chunk_type: retrieved.passage.chunk_type,
            similarity: retrieved.similarity_score,
            text_excerpt: excerpt(&retrieved.passage.text, excerpt_chars),
        }
    }
}

/// Coarse signal summarizing evidence volume and generation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Error,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
            Confidence::Error => "error",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat wire shape of an answer: `{ response, sources, confidence }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub response: String,
    pub sources: Vec<SourceCitation>,
    pub confidence: Confidence,
}

/// Return at most `max_chars` leading characters of `text`.
///
/// Counts Unicode scalar values, so the cut never lands inside a multi-byte
/// character.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
