#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clinical_rag::build_cmd::build_domains;
use clinical_rag::service::{load_engine, QueryService};
use clinical_rag_core::embedding::Embedder;
use clinical_rag_core::generation::{Completion, GenerationProvider, GenerationRequest};
use clinical_rag_core::{
    AnswerComposer, ComposerParams, DomainRegistry, DomainSpec, GenerationError, RetrievalParams,
};

pub const VOCAB: &[&str] = &[
    "fever",
    "cough",
    "covid",
    "ventilation",
    "insulin",
    "glucose",
    "diabetes",
    "chest",
    "pain",
    "heart",
    "knee",
    "ligament",
];

/// Bag-of-words embedder over [`VOCAB`]; texts without vocabulary words
/// embed to the zero vector.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }
    fn dims(&self) -> usize {
        VOCAB.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    VOCAB
        .iter()
        .map(|v| words.iter().filter(|w| *w == v).count() as f32)
        .collect()
}

pub enum StubBehavior {
    Echo(String),
    Fail(GenerationError),
    Slow(Duration),
}

/// Generation stub that records calls and the last prompt.
pub struct StubGenerator {
    pub behavior: StubBehavior,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl StubGenerator {
    pub fn new(behavior: StubBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn echo(text: &str) -> Arc<Self> {
        Self::new(StubBehavior::Echo(text.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for StubGenerator {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(request.prompt.clone());
        match &self.behavior {
            StubBehavior::Echo(text) => Ok(Completion::text(text.clone())),
            StubBehavior::Fail(e) => Err(e.clone()),
            StubBehavior::Slow(delay) => {
                if *delay >= request.timeout {
                    tokio::time::sleep(request.timeout).await;
                    Err(GenerationError::Timeout {
                        secs: request.timeout.as_secs(),
                    })
                } else {
                    tokio::time::sleep(*delay).await;
                    Ok(Completion::text("slow answer"))
                }
            }
        }
    }
}

/// Registry of the four clinical domains with artifacts under `dir`.
pub fn clinical_registry(dir: &Path) -> Arc<DomainRegistry> {
    Arc::new(DomainRegistry::clinical_defaults(dir))
}

pub fn registry_of(dir: &Path, ids: &[&str]) -> Arc<DomainRegistry> {
    Arc::new(
        DomainRegistry::new(
            ids.iter()
                .map(|id| DomainSpec::in_dir(id, &id.to_uppercase(), dir))
                .collect(),
        )
        .unwrap(),
    )
}

/// Write `<input>/<domain>/passages.json`.
pub fn write_passages(input: &Path, domain: &str, passages: &[(&str, &str, u32)]) {
    let dir = input.join(domain);
    std::fs::create_dir_all(&dir).unwrap();
    let json: Vec<serde_json::Value> = passages
        .iter()
        .map(|(text, source, page)| {
            serde_json::json!({ "text": text, "source": source, "page": page })
        })
        .collect();
    std::fs::write(
        dir.join("passages.json"),
        serde_json::to_string_pretty(&json).unwrap(),
    )
    .unwrap();
}

/// Small corpus: covid and diabetes have passages, heart_attack and
/// knee_injuries are left unbuilt.
pub fn write_clinical_corpus(input: &Path) {
    write_passages(
        input,
        "covid",
        &[
            ("Fever and cough are common COVID symptoms", "covid_p1.pdf", 3),
            ("Severe covid cases may need ventilation", "covid_p1.pdf", 4),
            ("Vaccination schedules for adults", "covid_p2.pdf", 1),
        ],
    );
    write_passages(
        input,
        "diabetes",
        &[
            ("Insulin lowers blood glucose in diabetes", "dm.pdf", 2),
            ("Monitor glucose daily", "dm.pdf", 5),
        ],
    );
}

/// Build indexes for `registry` from `input` with the keyword embedder.
pub async fn build(registry: &DomainRegistry, input: &Path, index_dir: &Path) {
    let embedder = KeywordEmbedder::new();
    build_domains(registry, embedder.as_ref(), input, 2, index_dir)
        .await
        .unwrap();
}

/// Service over whatever is on disk for `registry`.
pub fn service(
    registry: Arc<DomainRegistry>,
    generator: Arc<dyn GenerationProvider>,
    params: ComposerParams,
) -> QueryService {
    let engine = load_engine(registry, KeywordEmbedder::new(), RetrievalParams::default());
    QueryService::new(engine, AnswerComposer::new(generator, params))
}
