//! Query service: boundary validation over the retrieval engine and the
//! answer composer, plus atomic index reload.
//!
//! The current engine lives behind `RwLock<Arc<_>>`. Requests clone the
//! `Arc` and work on that snapshot; a reload builds a whole new engine and
//! swaps the pointer, so in-flight requests never see a half-loaded state.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use thiserror::Error;

use clinical_rag_core::embedding::Embedder;
use clinical_rag_core::{
    Answer, AnswerComposer, DomainHealth, DomainRegistry, RetrievalEngine, RetrievalError,
    RetrievalParams, RetrievedPassage,
};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::store::load_all;

/// Boundary failures of [`QueryService`]; all are reported to the caller
/// before any generation work.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("no domain indexes are loaded; build indexes with `clinrag build` first")]
    NotReady,
}

/// Result of [`QueryService::ask`].
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: Answer,
    pub retrieved: Vec<RetrievedPassage>,
}

/// Registered domain as listed by `GET /domains`.
#[derive(Debug, Clone, Serialize)]
pub struct DomainInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `healthy` when every domain is loaded, `degraded` when some are,
    /// `unavailable` when none are.
    pub status: &'static str,
    pub indexes: BTreeMap<String, DomainHealth>,
    pub total_domains: usize,
}

/// The query path shared by the CLI and the HTTP server.
///
/// # Example
///
/// ```rust,no_run
/// use clinical_rag::config::Config;
/// use clinical_rag::service::QueryService;
///
/// # async fn example() -> anyhow::Result<()> {
/// let service = QueryService::from_config(&Config::minimal())?;
/// let outcome = service.ask("What are COVID symptoms?", Some("covid")).await?;
/// println!("{} ({})", outcome.answer.response(), outcome.answer.confidence());
/// # Ok(())
/// # }
/// ```
pub struct QueryService {
    engine: RwLock<Arc<RetrievalEngine>>,
    composer: AnswerComposer,
    registry: Arc<DomainRegistry>,
    embedder: Arc<dyn Embedder>,
    params: RetrievalParams,
}

impl QueryService {
    /// Wrap an already-loaded engine. Reloads reuse the engine's registry,
    /// embedder and parameters.
    pub fn new(engine: RetrievalEngine, composer: AnswerComposer) -> Self {
        let registry = Arc::new(engine.registry().clone());
        let embedder = Arc::clone(engine.embedder());
        let params = engine.params();
        Self {
            engine: RwLock::new(Arc::new(engine)),
            composer,
            registry,
            embedder,
            params,
        }
    }

    /// Wire everything from configuration and load indexes from disk.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(config.registry()?);
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let engine = load_engine(registry, embedder, config.retrieval_params());
        let composer = AnswerComposer::new(generator, config.composer_params());
        Ok(Self::new(engine, composer))
    }

    /// Snapshot of the current engine.
    pub fn engine(&self) -> Arc<RetrievalEngine> {
        Arc::clone(&self.engine.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    /// Registered domains in registry order.
    pub fn domains(&self) -> Vec<DomainInfo> {
        self.registry
            .iter()
            .map(|d| DomainInfo {
                id: d.id.clone(),
                name: d.name.clone(),
            })
            .collect()
    }

    /// Replace the engine. Readers holding the old snapshot finish on it.
    pub fn swap_engine(&self, engine: RetrievalEngine) {
        let mut guard = self.engine.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(engine);
    }

    /// Reload every domain from disk and swap the engine.
    pub async fn reload(&self) -> HealthReport {
        let registry = Arc::clone(&self.registry);
        let embedder = Arc::clone(&self.embedder);
        let params = self.params;
        let engine = match tokio::task::spawn_blocking(move || {
            load_engine(registry, embedder, params)
        })
        .await
        {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!(error = %e, "index reload task failed; keeping current indexes");
                return self.health();
            }
        };
        self.swap_engine(engine);
        tracing::info!("domain indexes reloaded");
        self.health()
    }

    /// Readiness of every registered domain in the current engine snapshot.
    pub fn health(&self) -> HealthReport {
        let indexes = self.engine().health();
        let loaded = indexes.values().filter(|h| h.loaded).count();
        let status = if loaded == 0 {
            "unavailable"
        } else if loaded == indexes.len() {
            "healthy"
        } else {
            "degraded"
        };
        HealthReport {
            status,
            total_domains: indexes.len(),
            indexes,
        }
    }

    /// Boundary checks, run before any retrieval work. Returns the domain
    /// filter with blank values folded to `None`.
    pub fn validate<'a>(
        &self,
        engine: &RetrievalEngine,
        query: &str,
        domain: Option<&'a str>,
        k: usize,
    ) -> Result<Option<&'a str>, ServiceError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidInput("Query cannot be empty".to_string()).into());
        }
        if k == 0 {
            return Err(
                RetrievalError::InvalidInput("k must be a positive integer".to_string()).into(),
            );
        }
        let domain = domain.map(str::trim).filter(|d| !d.is_empty());
        if let Some(id) = domain {
            if !self.registry.contains(id) {
                return Err(RetrievalError::UnknownDomain {
                    domain: id.to_string(),
                    known: self.registry.ids(),
                }
                .into());
            }
        }
        if !engine.has_any_index() {
            return Err(ServiceError::NotReady);
        }
        Ok(domain)
    }

    /// Validate, then return ranked passages without calling the generator.
    ///
    /// # Arguments
    ///
    /// - `query` — must contain non-whitespace text.
    /// - `domain` — optional filter; blank strings mean "all domains".
    /// - `k` — passage count, defaulting to `[retrieval].top_k`.
    ///
    /// # Returns
    ///
    /// Passages best first, or a [`ServiceError`] naming the rejected input.
    pub async fn retrieve(
        &self,
        query: &str,
        domain: Option<&str>,
        k: Option<usize>,
    ) -> Result<Vec<RetrievedPassage>, ServiceError> {
        let engine = self.engine();
        let k = k.unwrap_or(self.params.default_k);
        let domain = self.validate(&engine, query, domain, k)?;
        Ok(engine.retrieve(query, domain, k).await?)
    }

    /// Retrieve with the configured `top_k`, then compose an answer.
    pub async fn ask(&self, query: &str, domain: Option<&str>) -> Result<QueryOutcome, ServiceError> {
        let started = Instant::now();
        let preview: String = query.chars().take(100).collect();
        tracing::info!(query = %preview, domain = domain.unwrap_or("all"), "query received");

        let retrieved = self.retrieve(query, domain, None).await?;
        tracing::info!(retrieved = retrieved.len(), "retrieval complete");

        let answer = self.composer.generate(query, &retrieved).await;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            confidence = %answer.confidence(),
            sources = answer.sources().len(),
            "query complete"
        );
        Ok(QueryOutcome { answer, retrieved })
    }
}

/// Build an engine holding every domain that loads cleanly from disk.
pub fn load_engine(
    registry: Arc<DomainRegistry>,
    embedder: Arc<dyn Embedder>,
    params: RetrievalParams,
) -> RetrievalEngine {
    let report = load_all(&registry);
    let mut engine = RetrievalEngine::new(registry, embedder, params);
    for (id, index) in report.loaded {
        if let Err(e) = engine.insert_index(&id, index) {
            tracing::error!(domain = %id, error = %e, "could not attach domain index");
        }
    }
    engine
}
