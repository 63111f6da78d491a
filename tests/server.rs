mod common;

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use clinical_rag::server::router;
use clinical_rag::service::QueryService;
use clinical_rag_core::ComposerParams;

use common::{build, clinical_registry, service, write_clinical_corpus, StubGenerator};

/// Serve the router on an ephemeral port and return its base URL.
async fn spawn(service: QueryService) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::new(service));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn built_server(tmp: &TempDir) -> (String, Arc<StubGenerator>) {
    let input = tmp.path().join("passages");
    let index_dir = tmp.path().join("indexes");
    write_clinical_corpus(&input);
    let registry = clinical_registry(&index_dir);
    build(&registry, &input, &index_dir).await;
    let generator = StubGenerator::echo("Fever and cough [Source 1].");
    let svc = service(registry, generator.clone(), ComposerParams::default());
    (spawn(svc).await, generator)
}

#[tokio::test]
async fn test_root_and_domains() {
    let tmp = TempDir::new().unwrap();
    let (base, _) = built_server(&tmp).await;
    let client = reqwest::Client::new();

    let root: Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(root["status"], "online");
    assert_eq!(
        root["domains"],
        json!(["covid", "diabetes", "heart_attack", "knee_injuries"])
    );

    let domains: Value = client
        .get(format!("{base}/domains"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(domains["domains"][0], json!({"id": "covid", "name": "COVID Clinical Research"}));
    assert_eq!(domains["domains"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_health_reports_degraded() {
    let tmp = TempDir::new().unwrap();
    let (base, _) = built_server(&tmp).await;

    let health: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["total_domains"], 4);
    assert_eq!(health["indexes"]["covid"]["loaded"], true);
    assert_eq!(health["indexes"]["covid"]["vector_count"], 3);
    assert_eq!(health["indexes"]["knee_injuries"]["loaded"], false);
}

#[tokio::test]
async fn test_query_returns_answer_with_sources() {
    let tmp = TempDir::new().unwrap();
    let (base, generator) = built_server(&tmp).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/query"))
        .json(&json!({"query": "covid fever", "domain": "covid"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["response"], "Fever and cough [Source 1].");
    assert_eq!(body["confidence"], "medium");
    let sources = body["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["source"], "covid_p1.pdf");
    assert_eq!(sources[0]["page"], 3);
    assert_eq!(body["retrieved_docs"].as_array().unwrap().len(), 2);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_query_without_evidence() {
    let tmp = TempDir::new().unwrap();
    let (base, generator) = built_server(&tmp).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{base}/query"))
        .json(&json!({"query": "knee ligament"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["confidence"], "low");
    assert_eq!(body["sources"], json!([]));
    assert_eq!(body["retrieved_docs"], json!([]));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_retrieve_respects_k() {
    let tmp = TempDir::new().unwrap();
    let (base, generator) = built_server(&tmp).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{base}/retrieve"))
        .json(&json!({"query": "covid glucose", "k": 2}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let passages = body["passages"].as_array().unwrap();
    assert_eq!(passages.len(), 2);
    let first = passages[0]["similarity_score"].as_f64().unwrap();
    let second = passages[1]["similarity_score"].as_f64().unwrap();
    assert!(first >= second);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_bad_requests_use_error_envelope() {
    let tmp = TempDir::new().unwrap();
    let (base, generator) = built_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/query"))
        .json(&json!({"query": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "Query cannot be empty");

    let resp = client
        .post(format!("{base}/query"))
        .json(&json!({"query": "fever", "domain": "oncology"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("oncology"));

    let resp = client
        .post(format!("{base}/retrieve"))
        .json(&json!({"query": "fever", "k": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/retrieve"))
        .json(&json!({"query": "fever", "k": -1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("k"));

    let resp = client
        .post(format!("{base}/retrieve"))
        .json(&json!({"k": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("query"));

    let resp = client
        .post(format!("{base}/query"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{base}/feedback"))
        .json(&json!({"rating": "up"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_unbuilt_domain_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let (base, _) = built_server(&tmp).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/query"))
        .json(&json!({"query": "chest pain", "domain": "heart_attack"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unavailable");
}

#[tokio::test]
async fn test_not_ready_then_reload() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("passages");
    let index_dir = tmp.path().join("indexes");
    let registry = clinical_registry(&index_dir);
    let svc = service(
        registry.clone(),
        StubGenerator::echo("ok"),
        ComposerParams::default(),
    );
    let base = spawn(svc).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/query"))
        .json(&json!({"query": "fever"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    write_clinical_corpus(&input);
    build(&registry, &input, &index_dir).await;

    let health: Value = client
        .post(format!("{base}/admin/reload"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "degraded");

    let resp = client
        .post(format!("{base}/query"))
        .json(&json!({"query": "fever"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_feedback_validation() {
    let tmp = TempDir::new().unwrap();
    let (base, _) = built_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/feedback"))
        .json(&json!({"query": "fever", "response": "answer", "rating": "up"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");

    let resp = client
        .post(format!("{base}/feedback"))
        .json(&json!({"query": "fever", "rating": "meh"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let (base, _) = built_server(&tmp).await;

    let resp = reqwest::get(format!("{base}/nope")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}
