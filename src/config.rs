//! TOML configuration.
//!
//! Every section is optional; an empty file yields the same values as
//! [`Config::minimal`]. Secrets never live in the file: the generation API
//! key comes from `OPENROUTER_API_KEY` and the OpenAI embedding key from
//! `OPENAI_API_KEY`.
//!
//! ```toml
//! [retrieval]
//! top_k = 5
//! min_similarity = 0.3
//!
//! [generation]
//! model = "meta-llama/llama-3.1-8b-instruct:free"
//!
//! [index]
//! dir = "indexes"
//!
//! [[domains]]
//! id = "covid"
//! name = "COVID Clinical Research"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clinical_rag_core::{ComposerParams, DomainRegistry, DomainSpec, RetrievalParams};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            context_limit: default_context_limit(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_min_similarity() -> f32 {
    0.3
}
fn default_context_limit() -> usize {
    5
}
fn default_excerpt_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_url")]
    pub url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    /// Sent as `HTTP-Referer` for provider-side attribution.
    #[serde(default = "default_referer")]
    pub referer: String,
    /// Sent as `X-Title`.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            url: default_generation_url(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout_secs(),
            referer: default_referer(),
            title: default_title(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_provider() -> String {
    "openrouter".to_string()
}
fn default_generation_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}
fn default_generation_model() -> String {
    "meta-llama/llama-3.1-8b-instruct:free".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_generation_timeout_secs() -> u64 {
    30
}
fn default_referer() -> String {
    "http://localhost:8000".to_string()
}
fn default_title() -> String {
    "Clinical RAG".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("indexes")
}

/// One `[[domains]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct DomainConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub index_path: Option<PathBuf>,
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,
}

impl Config {
    /// All-defaults configuration for commands that can run without a file.
    pub fn minimal() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Build the domain registry. Without `[[domains]]` entries this is the
    /// four clinical domains under `index.dir`.
    pub fn registry(&self) -> Result<DomainRegistry> {
        if self.domains.is_empty() {
            return Ok(DomainRegistry::clinical_defaults(&self.index.dir));
        }
        let specs = self
            .domains
            .iter()
            .map(|d| {
                let mut spec = DomainSpec::in_dir(&d.id, &d.name, &self.index.dir);
                if let Some(p) = &d.index_path {
                    spec.index_path = p.clone();
                }
                if let Some(p) = &d.metadata_path {
                    spec.metadata_path = p.clone();
                }
                spec
            })
            .collect();
        Ok(DomainRegistry::new(specs)?)
    }

    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            min_similarity: self.retrieval.min_similarity,
            default_k: self.retrieval.top_k,
        }
    }

    pub fn composer_params(&self) -> ComposerParams {
        ComposerParams {
            context_limit: self.retrieval.context_limit,
            excerpt_chars: self.retrieval.excerpt_chars,
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            timeout: Duration::from_secs(self.generation.timeout_secs),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("OPENROUTER_MODEL") {
            if !model.trim().is_empty() {
                self.generation.model = model;
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env_overrides();
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.context_limit < 1 {
        bail!("retrieval.context_limit must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_similarity) {
        bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "openrouter" | "disabled" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be openrouter or disabled.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }
    if config.generation.max_tokens == 0 {
        bail!("generation.max_tokens must be > 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if config.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }
    }

    // Validate domains
    for d in &config.domains {
        if d.id.trim().is_empty() {
            bail!("domains: id must not be empty");
        }
        if d.name.trim().is_empty() {
            bail!("domains.{}: name must not be empty", d.id);
        }
    }
    config.registry()?;

    Ok(())
}
