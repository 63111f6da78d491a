mod common;

use std::time::Duration;
use tempfile::TempDir;

use clinical_rag::service::{load_engine, ServiceError};
use clinical_rag_core::{
    Answer, ComposerParams, Confidence, GenerationError, RetrievalError, RetrievalParams,
};
use common::*;

async fn setup() -> (TempDir, std::sync::Arc<clinical_rag_core::DomainRegistry>) {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("passages");
    let index_dir = tmp.path().join("indexes");
    write_clinical_corpus(&input);
    let registry = clinical_registry(&index_dir);
    build(&registry, &input, &index_dir).await;
    (tmp, registry)
}

#[tokio::test]
async fn test_single_passage_answer_is_medium() {
    let (_tmp, registry) = setup().await;
    let generator = StubGenerator::echo("Fever and cough [Source 1].");
    let svc = service(registry, generator.clone(), ComposerParams::default());

    let outcome = svc.ask("fever cough", None).await.unwrap();
    assert_eq!(outcome.retrieved.len(), 1);
    assert_eq!(outcome.answer.confidence(), Confidence::Medium);
    assert_eq!(outcome.answer.response(), "Fever and cough [Source 1].");
    assert_eq!(outcome.answer.sources()[0].source, "covid_p1.pdf");
    assert_eq!(outcome.answer.sources()[0].page, 3);
    assert_eq!(generator.calls(), 1);

    let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("[Source 1: covid_p1.pdf, Page 3]"));
}

#[tokio::test]
async fn test_cross_domain_pool_is_ranked_with_registry_tie_break() {
    let (_tmp, registry) = setup().await;
    let svc = service(registry, StubGenerator::echo("ok"), ComposerParams::default());

    let passages = svc.retrieve("covid glucose", None, None).await.unwrap();
    let order: Vec<(&str, u32)> = passages
        .iter()
        .map(|p| (p.passage.domain.as_str(), p.passage.page))
        .collect();
    assert_eq!(
        order,
        vec![("diabetes", 5), ("covid", 4), ("covid", 3), ("diabetes", 2)]
    );
    for w in passages.windows(2) {
        assert!(w[0].similarity_score >= w[1].similarity_score);
    }
    assert!(passages.iter().all(|p| p.similarity_score >= 0.3));
}

#[tokio::test]
async fn test_four_passages_make_high_confidence() {
    let (_tmp, registry) = setup().await;
    let svc = service(registry, StubGenerator::echo("ok"), ComposerParams::default());
    let outcome = svc.ask("covid glucose", None).await.unwrap();
    assert_eq!(outcome.retrieved.len(), 4);
    assert_eq!(outcome.answer.confidence(), Confidence::High);
    assert_eq!(outcome.answer.sources().len(), 4);
}

#[tokio::test]
async fn test_no_evidence_skips_generation() {
    let (_tmp, registry) = setup().await;
    let generator = StubGenerator::echo("should not be used");
    let svc = service(registry, generator.clone(), ComposerParams::default());

    let outcome = svc.ask("knee ligament", None).await.unwrap();
    assert!(outcome.retrieved.is_empty());
    assert!(matches!(outcome.answer, Answer::NoEvidence { .. }));
    assert_eq!(outcome.answer.confidence(), Confidence::Low);
    assert!(outcome.answer.sources().is_empty());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_provider_error_keeps_sources() {
    let (_tmp, registry) = setup().await;
    let generator = StubGenerator::new(StubBehavior::Fail(GenerationError::Status {
        status: 429,
        body: "rate limited".to_string(),
    }));
    let svc = service(registry, generator, ComposerParams::default());

    let result = svc.ask("covid", None).await.unwrap().answer.into_result();
    assert_eq!(result.confidence, Confidence::Error);
    assert_eq!(result.sources.len(), 2);
    assert!(result.response.contains("429"));
}

#[tokio::test]
async fn test_generation_timeout_keeps_sources() {
    let (_tmp, registry) = setup().await;
    let generator = StubGenerator::new(StubBehavior::Slow(Duration::from_secs(5)));
    let params = ComposerParams {
        timeout: Duration::from_millis(50),
        ..ComposerParams::default()
    };
    let svc = service(registry, generator, params);

    let outcome = svc.ask("covid", None).await.unwrap();
    assert_eq!(outcome.answer.confidence(), Confidence::Error);
    assert!(!outcome.answer.sources().is_empty());
    assert!(outcome.answer.response().contains("timed out"));
}

#[tokio::test]
async fn test_validation_errors_are_distinct() {
    let (_tmp, registry) = setup().await;
    let svc = service(registry, StubGenerator::echo("ok"), ComposerParams::default());

    let err = svc.ask("   ", None).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Retrieval(RetrievalError::InvalidInput(_))
    ));

    let err = svc.ask("covid", Some("oncology")).await.unwrap_err();
    match err {
        ServiceError::Retrieval(RetrievalError::UnknownDomain { domain, known }) => {
            assert_eq!(domain, "oncology");
            assert_eq!(known.len(), 4);
        }
        other => panic!("expected unknown domain, got {other:?}"),
    }

    let err = svc.ask("heart pain", Some("heart_attack")).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Retrieval(RetrievalError::UnavailableDomain(ref d)) if d == "heart_attack"
    ));

    let err = svc.retrieve("covid", None, Some(0)).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Retrieval(RetrievalError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_domain_filter_and_blank_domain() {
    let (_tmp, registry) = setup().await;
    let svc = service(registry, StubGenerator::echo("ok"), ComposerParams::default());

    let only_diabetes = svc
        .retrieve("covid glucose", Some("diabetes"), None)
        .await
        .unwrap();
    assert_eq!(only_diabetes.len(), 2);
    assert!(only_diabetes.iter().all(|p| p.passage.domain == "diabetes"));

    let blank = svc.retrieve("covid glucose", Some("  "), None).await.unwrap();
    assert_eq!(blank.len(), 4);
}

#[tokio::test]
async fn test_retrieve_is_idempotent_and_bounded() {
    let (_tmp, registry) = setup().await;
    let svc = service(registry, StubGenerator::echo("ok"), ComposerParams::default());
    let a = svc.retrieve("covid glucose", None, Some(3)).await.unwrap();
    let b = svc.retrieve("covid glucose", None, Some(3)).await.unwrap();
    assert_eq!(a.len(), 3);
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_health_reports_loaded_and_missing() {
    let (_tmp, registry) = setup().await;
    let svc = service(registry, StubGenerator::echo("ok"), ComposerParams::default());
    let health = svc.health();
    assert_eq!(health.status, "degraded");
    assert_eq!(health.total_domains, 4);
    assert!(health.indexes["covid"].loaded);
    assert_eq!(health.indexes["covid"].vector_count, 3);
    assert_eq!(health.indexes["diabetes"].vector_count, 2);
    assert!(!health.indexes["heart_attack"].loaded);
    assert_eq!(health.indexes["knee_injuries"].vector_count, 0);
}

#[tokio::test]
async fn test_empty_corpus_is_not_ready_until_reload() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("passages");
    let index_dir = tmp.path().join("indexes");
    let registry = clinical_registry(&index_dir);
    let svc = service(registry.clone(), StubGenerator::echo("ok"), ComposerParams::default());

    assert!(matches!(
        svc.ask("covid", None).await.unwrap_err(),
        ServiceError::NotReady
    ));
    assert_eq!(svc.health().status, "unavailable");

    let before = svc.engine();
    write_clinical_corpus(&input);
    build(&registry, &input, &index_dir).await;
    let health = svc.reload().await;

    assert_eq!(health.status, "degraded");
    assert!(!before.has_any_index());
    let outcome = svc.ask("covid", None).await.unwrap();
    assert_eq!(outcome.retrieved.len(), 2);
}

#[tokio::test]
async fn test_swap_engine_replaces_snapshot() {
    let (tmp, registry) = setup().await;
    let svc = service(registry, StubGenerator::echo("ok"), ComposerParams::default());
    assert!(svc.engine().is_loaded("covid"));

    let empty_dir = tmp.path().join("nowhere");
    let replacement = load_engine(
        clinical_registry(&empty_dir),
        KeywordEmbedder::new(),
        RetrievalParams::default(),
    );
    svc.swap_engine(replacement);
    assert!(!svc.engine().is_loaded("covid"));
}
