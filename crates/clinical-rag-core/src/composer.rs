//! Grounded answer composition.
//!
//! [`AnswerComposer::generate`] turns ranked passages into an [`Answer`]:
//!
//! - no passages: a fixed fallback, no provider call;
//! - otherwise the first `context_limit` passages are rendered as labeled
//!   evidence, cited, and sent to the provider in one attempt.
//!
//! The call is bounded by [`ComposerParams::timeout`] whether or not the
//! provider honours [`GenerationRequest::timeout`]; a late answer is dropped
//! and reported as [`GenerationError::Timeout`].
//!
//! Provider failures are carried in [`Answer::Failed`] together with the
//! citations, never returned as `Err`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::GenerationError;
use crate::generation::{GenerationProvider, GenerationRequest};
use crate::models::{AnswerResult, Confidence, RetrievedPassage, SourceCitation};
use crate::prompt::{answer_prompt, SYSTEM_PROMPT};

/// Fixed answer when retrieval found nothing above the threshold.
pub const NO_EVIDENCE_RESPONSE: &str = "I couldn't find sufficient information in the \
provided clinical datasets to answer this question. Please try rephrasing your question \
or selecting a different medical domain.";

/// Passages needed for a `high` confidence answer.
const HIGH_CONFIDENCE_MIN_PASSAGES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ComposerParams {
    /// Maximum passages rendered into the prompt.
    pub context_limit: usize,
    /// Maximum characters of passage text kept in each citation.
    pub excerpt_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ComposerParams {
    fn default() -> Self {
        Self {
            context_limit: 5,
            excerpt_chars: 500,
            temperature: 0.3,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

/// The bounded evidence shown to the provider and its citations.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceContext {
    blocks: Vec<String>,
    citations: Vec<SourceCitation>,
}

impl EvidenceContext {
    /// Take the first `limit` passages, in rank order.
    pub fn assemble(passages: &[RetrievedPassage], limit: usize, excerpt_chars: usize) -> Self {
        let used = &passages[..passages.len().min(limit)];
        let blocks = used
            .iter()
            .enumerate()
            .map(|(i, rp)| {
                format!(
                    "[Source {}: {}, Page {}]\n{}",
                    i + 1,
                    rp.passage.source,
                    rp.passage.page,
                    rp.passage.text
                )
            })
            .collect();
        let citations = used
            .iter()
            .map(|rp| SourceCitation::from_retrieved(rp, excerpt_chars))
            .collect();
        Self { blocks, citations }
    }

    /// Labeled blocks separated by blank lines.
    pub fn render(&self) -> String {
        self.blocks.join("\n\n")
    }

    pub fn citations(&self) -> &[SourceCitation] {
        &self.citations
    }

    pub fn into_citations(self) -> Vec<SourceCitation> {
        self.citations
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Outcome of one composition.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Retrieval produced nothing; the provider was not called.
    NoEvidence { response: String },
    /// The provider answered.
    Generated {
        response: String,
        sources: Vec<SourceCitation>,
        /// Number of retrieved passages handed to the composer.
        passages_used: usize,
    },
    /// Evidence was found but the provider call failed.
    Failed {
        response: String,
        sources: Vec<SourceCitation>,
        error: GenerationError,
    },
}

impl Answer {
    pub fn confidence(&self) -> Confidence {
        match self {
            Answer::NoEvidence { .. } => Confidence::Low,
            Answer::Generated { passages_used, .. } => {
                if *passages_used >= HIGH_CONFIDENCE_MIN_PASSAGES {
                    Confidence::High
                } else {
                    Confidence::Medium
                }
            }
            Answer::Failed { .. } => Confidence::Error,
        }
    }

    pub fn response(&self) -> &str {
        match self {
            Answer::NoEvidence { response }
            | Answer::Generated { response, .. }
            | Answer::Failed { response, .. } => response,
        }
    }

    pub fn sources(&self) -> &[SourceCitation] {
        match self {
            Answer::NoEvidence { .. } => &[],
            Answer::Generated { sources, .. } | Answer::Failed { sources, .. } => sources,
        }
    }

    /// Flatten into the `{ response, sources, confidence }` wire shape.
    pub fn into_result(self) -> AnswerResult {
        let confidence = self.confidence();
        match self {
            Answer::NoEvidence { response } => AnswerResult {
                response,
                sources: Vec::new(),
                confidence,
            },
            Answer::Generated {
                response, sources, ..
            }
            | Answer::Failed {
                response, sources, ..
            } => AnswerResult {
                response,
                sources,
                confidence,
            },
        }
    }
}

pub struct AnswerComposer {
    provider: Arc<dyn GenerationProvider>,
    params: ComposerParams,
}

impl AnswerComposer {
    pub fn new(provider: Arc<dyn GenerationProvider>, params: ComposerParams) -> Self {
        Self { provider, params }
    }

    pub fn params(&self) -> &ComposerParams {
        &self.params
    }

    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    /// Compose an answer for `query` from rank-ordered `passages`.
    pub async fn generate(&self, query: &str, passages: &[RetrievedPassage]) -> Answer {
        if passages.is_empty() {
            tracing::info!("no evidence retrieved; returning fallback answer");
            return Answer::NoEvidence {
                response: NO_EVIDENCE_RESPONSE.to_string(),
            };
        }

        let context = EvidenceContext::assemble(
            passages,
            self.params.context_limit,
            self.params.excerpt_chars,
        );
        let request = GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: answer_prompt(&context.render(), query),
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            timeout: self.params.timeout,
        };

        tracing::info!(
            model = self.provider.model_name(),
            context_passages = context.len(),
            prompt_chars = request.prompt.len(),
            "calling generation provider"
        );

        let started = Instant::now();
        let outcome =
            match tokio::time::timeout(self.params.timeout, self.provider.generate(&request)).await
            {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout {
                    secs: self.params.timeout.as_secs(),
                }),
            };
        match outcome {
            Ok(completion) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    response_chars = completion.text.len(),
                    "generation succeeded"
                );
                if let Some(usage) = completion.usage {
                    tracing::info!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        total_tokens = usage.total_tokens,
                        cost = completion.cost,
                        "generation usage"
                    );
                }
                Answer::Generated {
                    response: completion.text,
                    sources: context.into_citations(),
                    passages_used: passages.len(),
                }
            }
            Err(error) => {
                tracing::error!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %error,
                    "generation failed"
                );
                Answer::Failed {
                    response: error.diagnostic(),
                    sources: context.into_citations(),
                    error,
                }
            }
        }
    }
}
