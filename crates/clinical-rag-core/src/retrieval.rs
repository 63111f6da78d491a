//! Cross-domain retrieval engine.
//!
//! The engine owns one [`DomainIndex`] per loaded domain and answers
//! `retrieve(query, domain, k)`:
//!
//! 1. Embed the query once.
//! 2. Pick the domain set (the filter, or every loaded domain in registry order).
//! 3. Search each domain for up to `k` hits.
//! 4. Resolve rows to passages, dropping hits below `min_similarity`.
//! 5. Pool all survivors, stable-sort by score descending, keep the first `k`.
//!
//! Pooling happens before truncation, so one domain with uniformly stronger
//! matches can fill the whole result.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::embedding::{embed_query, l2_normalize, Embedder};
use crate::error::RetrievalError;
use crate::index::{DomainIndex, FlatIndex, VectorIndex};
use crate::models::RetrievedPassage;
use crate::registry::DomainRegistry;

/// Tunables for [`RetrievalEngine::retrieve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// Hits scoring strictly below this are discarded.
    pub min_similarity: f32,
    /// `k` used when the caller does not supply one.
    pub default_k: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            min_similarity: 0.3,
            default_k: 5,
        }
    }
}

/// Readiness of one registered domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DomainHealth {
    pub loaded: bool,
    pub vector_count: usize,
}

/// Owns the loaded [`DomainIndex`]es and answers ranked retrieval queries.
///
/// The index map is filled once (at startup or by a reload that builds a
/// fresh engine) and only read while serving, so `retrieve` takes `&self`
/// and concurrent queries need no coordination.
pub struct RetrievalEngine<I = FlatIndex> {
    registry: Arc<DomainRegistry>,
    indexes: HashMap<String, DomainIndex<I>>,
    embedder: Arc<dyn Embedder>,
    params: RetrievalParams,
    desync_hits: AtomicU64,
}

impl<I: VectorIndex> RetrievalEngine<I> {
    /// Create an engine with no indexes attached.
    ///
    /// # Arguments
    ///
    /// - `registry` — every domain this engine may serve, in tie-break order.
    /// - `embedder` — turns the query into a vector; must produce the same
    ///   dimensionality the domain indexes were built with.
    /// - `params` — similarity threshold and default `k`.
    pub fn new(
        registry: Arc<DomainRegistry>,
        embedder: Arc<dyn Embedder>,
        params: RetrievalParams,
    ) -> Self {
        Self {
            registry,
            indexes: HashMap::new(),
            embedder,
            params,
            desync_hits: AtomicU64::new(0),
        }
    }

    /// Attach a loaded index. The domain must be registered.
    pub fn insert_index(
        &mut self,
        domain: &str,
        index: DomainIndex<I>,
    ) -> Result<(), RetrievalError> {
        if !self.registry.contains(domain) {
            return Err(self.unknown_domain(domain));
        }
        self.indexes.insert(domain.to_string(), index);
        Ok(())
    }

    /// Builder form of [`insert_index`](Self::insert_index).
    pub fn with_index(
        mut self,
        domain: &str,
        index: DomainIndex<I>,
    ) -> Result<Self, RetrievalError> {
        self.insert_index(domain, index)?;
        Ok(self)
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn params(&self) -> RetrievalParams {
        self.params
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Whether `domain` has an attached index.
    pub fn is_loaded(&self, domain: &str) -> bool {
        self.indexes.contains_key(domain)
    }

    /// `false` when nothing is loaded, i.e. the corpus is empty.
    pub fn has_any_index(&self) -> bool {
        !self.indexes.is_empty()
    }

    /// Loaded domain ids in registry order.
    pub fn loaded_domains(&self) -> Vec<String> {
        self.registry
            .iter()
            .filter(|d| self.indexes.contains_key(&d.id))
            .map(|d| d.id.clone())
            .collect()
    }

    /// Number of hits dropped because their row had no passage.
    pub fn desync_count(&self) -> u64 {
        self.desync_hits.load(AtomicOrdering::Relaxed)
    }

    /// Per-domain readiness for every registered domain.
    pub fn health(&self) -> BTreeMap<String, DomainHealth> {
        self.registry
            .iter()
            .map(|d| {
                let health = match self.indexes.get(&d.id) {
                    Some(idx) => DomainHealth {
                        loaded: true,
                        vector_count: idx.vector_count(),
                    },
                    None => DomainHealth {
                        loaded: false,
                        vector_count: 0,
                    },
                };
                (d.id.clone(), health)
            })
            .collect()
    }

    /// Resolve an optional domain filter to the list of domains to search.
    ///
    /// An unregistered domain is [`RetrievalError::UnknownDomain`]; a
    /// registered but unloaded one is [`RetrievalError::UnavailableDomain`].
    pub fn resolve_domains(&self, domain: Option<&str>) -> Result<Vec<&str>, RetrievalError> {
        match domain {
            Some(id) => {
                let spec = self
                    .registry
                    .get(id)
                    .ok_or_else(|| self.unknown_domain(id))?;
                if !self.indexes.contains_key(&spec.id) {
                    return Err(RetrievalError::UnavailableDomain(spec.id.clone()));
                }
                Ok(vec![spec.id.as_str()])
            }
            None => Ok(self
                .registry
                .iter()
                .filter(|d| self.indexes.contains_key(&d.id))
                .map(|d| d.id.as_str())
                .collect()),
        }
    }

    /// Top-`k` passages across the selected domains, best first.
    ///
    /// # Arguments
    ///
    /// - `query` — free text; any string is accepted. Blank-query rejection
    ///   happens at the service boundary.
    /// - `domain` — restrict the search to one registered, loaded domain;
    ///   `None` searches every loaded domain.
    /// - `k` — maximum number of passages; must be at least 1.
    ///
    /// # Returns
    ///
    /// At most `k` passages sorted by descending `similarity_score`, none
    /// below `min_similarity`. An empty vector when nothing matches or no
    /// domain is loaded.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::InvalidInput`] for `k == 0`,
    /// [`RetrievalError::UnknownDomain`] / [`RetrievalError::UnavailableDomain`]
    /// for a bad filter, and [`RetrievalError::Embedding`] when the query
    /// cannot be embedded.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use clinical_rag_core::{RetrievalEngine, RetrievalError};
    ///
    /// # async fn example(engine: &RetrievalEngine) -> Result<(), RetrievalError> {
    /// let hits = engine.retrieve("What are COVID symptoms?", Some("covid"), 5).await?;
    /// for hit in &hits {
    ///     println!("{:.3} {} p.{}", hit.similarity_score, hit.passage.source, hit.passage.page);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn retrieve(
        &self,
        query: &str,
        domain: Option<&str>,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::InvalidInput(
                "k must be a positive integer".to_string(),
            ));
        }

        let domains = self.resolve_domains(domain)?;
        if domains.is_empty() {
            tracing::debug!("no domain indexes loaded; returning empty result");
            return Ok(Vec::new());
        }

        let mut query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| RetrievalError::Embedding(format!("{e:#}")))?;
        l2_normalize(&mut query_vec);

        let mut pool: Vec<RetrievedPassage> = Vec::new();
        for id in domains {
            let Some(domain_index) = self.indexes.get(id) else {
                continue;
            };
            if domain_index.index().dims() != query_vec.len() {
                tracing::warn!(
                    domain = id,
                    index_dims = domain_index.index().dims(),
                    query_dims = query_vec.len(),
                    "query embedding dimension does not match index; skipping domain"
                );
                continue;
            }

            for hit in domain_index.index().search(&query_vec, k) {
                // negated so NaN scores are dropped too
                if !(hit.score >= self.params.min_similarity) {
                    continue;
                }
                match domain_index.passage(hit.row) {
                    Some(passage) => pool.push(RetrievedPassage {
                        passage: passage.clone(),
                        similarity_score: hit.score,
                    }),
                    None => {
                        self.desync_hits.fetch_add(1, AtomicOrdering::Relaxed);
                        tracing::warn!(
                            domain = id,
                            row = hit.row,
                            passages = domain_index.passages().len(),
                            "index row has no metadata entry; dropping hit"
                        );
                    }
                }
            }
        }

        // sort_by is stable: equal scores keep domain-then-rank order
        pool.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(Ordering::Equal)
        });
        pool.truncate(k);
        Ok(pool)
    }

    fn unknown_domain(&self, domain: &str) -> RetrievalError {
        RetrievalError::UnknownDomain {
            domain: domain.to_string(),
            known: self.registry.ids(),
        }
    }
}
