//! End-to-end scenarios against a running server: malformed input,
//! reset-then-analyze, reset idempotency, and the health endpoint. Pure
//! scoring and degraded-pipeline behavior are covered closer to the source
//! in `scoring::tests` and `orchestrator::tests`.

use std::sync::Arc;
use std::time::Duration;

use impulseguard::baselines::Baselines;
use impulseguard::config::Config;
use impulseguard::cost_tracker::CostTracker;
use impulseguard::llm::LlmGateway;
use impulseguard::memory::MemoryStore;
use impulseguard::scoring::weights::WeightProfile;
use impulseguard::server::{router, AppState};
use impulseguard::vector_index::{InMemoryIndex, VectorIndex};
use serde_json::{json, Value};

fn test_config(memory_dir: &std::path::Path) -> Config {
    Config {
        memory_dir: memory_dir.to_path_buf(),
        llm_credentials_path: None,
        prior_p: 0.2,
        weight_profile: WeightProfile::BehaviorOnly,
        refinement_threshold: 7,
        consolidation_size_threshold: 2048,
        consolidation_observation_threshold: 10,
        vector_index_dir: memory_dir.join(".vector-index"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        request_timeout_secs: 5,
        llm_model: "gemini-1.5-pro".to_string(),
        llm_base_url: "https://example.invalid/v1".to_string(),
    }
}

fn neutral_daytime_sample() -> Value {
    json!({
        "product": "Wireless Mouse",
        "cost": 29.99,
        "website": "bestbuy.com",
        "time_to_cart": 180,
        "time_on_site": 200,
        "click_count": 5,
        "peak_scroll_velocity": 100,
        "system_hour": 14
    })
}

/// Spin up the real Axum router on an ephemeral port, against a fresh
/// tempdir memory store, with no LLM credentials configured (so the
/// Reasoner always takes its degraded path) and an in-memory vector index
/// (so the test doesn't need a real embedding model on disk or network
/// access).
async fn spawn_server() -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let memory = MemoryStore::new(config.memory_dir.clone());
    memory.ensure_initialized().unwrap();
    let index = InMemoryIndex::new();
    let files = memory.read_all().unwrap();
    index.reindex(&files).await.unwrap();
    let gateway = LlmGateway::new(
        config.llm_base_url.clone(),
        config.llm_model.clone(),
        None,
        Duration::from_secs(config.request_timeout_secs),
    )
    .unwrap();

    let state = Arc::new(AppState {
        memory,
        index: Box::new(index),
        gateway,
        baselines: Baselines::default(),
        cost_tracker: CostTracker::new(),
        config,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // give the listener a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (format!("http://{addr}"), dir)
}

#[tokio::test]
async fn invalid_hour_returns_4xx() {
    let (base_url, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    let mut sample = neutral_daytime_sample();
    sample["system_hour"] = json!(24);

    let response = client
        .post(format!("{base_url}/analyze"))
        .json(&sample)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("system_hour"));
}

#[tokio::test]
async fn reset_then_analyze_yields_well_formed_verdict() {
    let (base_url, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    let reset_response = client
        .post(format!("{base_url}/reset"))
        .send()
        .await
        .unwrap();
    assert_eq!(reset_response.status().as_u16(), 200);
    let reset_body: Value = reset_response.json().await.unwrap();
    assert_eq!(reset_body["files_reset"], 4);

    let analyze_response = client
        .post(format!("{base_url}/analyze"))
        .json(&neutral_daytime_sample())
        .send()
        .await
        .unwrap();
    assert_eq!(analyze_response.status().as_u16(), 200);

    let verdict: Value = analyze_response.json().await.unwrap();
    let impulse_score = verdict["impulse_score"].as_f64().unwrap();
    let confidence = verdict["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&impulse_score));
    assert!((0.0..=1.0).contains(&confidence));
    assert!(verdict["memory_update"].is_null());
    // No LLM is configured, so the fallback mapping applies directly:
    // nothing from a prior run survives reset to bias this reasoning.
    assert_eq!(verdict["intervention_action"], verdict["fast_brain_intervention"]);
}

#[tokio::test]
async fn reset_is_idempotent_modulo_timestamp() {
    let (base_url, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .post(format!("{base_url}/reset"))
            .send()
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["files_reset"], 4);
    }
}

#[tokio::test]
async fn health_reports_unconfigured_llm_and_nonempty_index() {
    let (base_url, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{base_url}/health")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["llm_available"], false);
    assert_eq!(body["scorer_available"], true);
}
