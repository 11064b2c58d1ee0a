use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;
use zkpf_mina_prover::{
    testing::{EngineBehavior, MockChain, MockCompiler, MockEngine},
    MinaNetwork, ProverConfig, ProverState, TxProver,
};
use zkpf_rails_mina_prover::{app_router, AppState};

const BODY_LIMIT: usize = usize::MAX;

struct TestApp {
    app: axum::Router,
    chain: Arc<MockChain>,
    compiler: Arc<MockCompiler>,
    engine: Arc<MockEngine>,
    cache_dir: TempDir,
}

fn test_app(behavior: EngineBehavior) -> TestApp {
    let cache_dir = tempfile::tempdir().unwrap();
    let chain = Arc::new(MockChain::default());
    let compiler = Arc::new(MockCompiler::default());
    let engine = Arc::new(MockEngine::new(behavior));
    let config = ProverConfig {
        network: MinaNetwork::Devnet,
        cache_dir: cache_dir.path().to_path_buf(),
        ..ProverConfig::default()
    };
    let prover = TxProver::new(
        Arc::new(ProverState::new()),
        chain.clone(),
        compiler.clone(),
        engine.clone(),
        config,
    );
    TestApp {
        app: app_router(AppState::new(Arc::new(prover))),
        chain,
        compiler,
        engine,
        cache_dir,
    }
}

fn prove_body(token: &str, admin: &str) -> Value {
    json!({
        "payload": {
            "tokenAddress": token,
            "adminContractAddress": admin,
            "serializedTransaction": format!("tx-{token}"),
            "signedData": "{\"signature\":\"7mX\"}",
        }
    })
}

async fn post_prove(app: &axum::Router, body: Body) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/prove")
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .expect("prove response");

    let status = response.status();
    let body_bytes = body::to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body_bytes).unwrap())
}

fn json_body(value: &Value) -> Body {
    Body::from(serde_json::to_vec(value).unwrap())
}

#[tokio::test]
async fn concurrent_requests_share_one_build() {
    let test = test_app(EngineBehavior::Succeed);
    let body = prove_body("B62qToken", "B62qAdmin");

    let (first, second) = tokio::join!(
        post_prove(&test.app, json_body(&body)),
        post_prove(&test.app, json_body(&body)),
    );

    for (status, value) in [first, second] {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["result"]["success"], true);
        assert_eq!(
            value["result"]["serializedProvenTransaction"],
            "proven:tx-B62qToken"
        );
        assert!(value["result"].get("errors").is_none());
    }

    assert_eq!(test.chain.init_calls(), 1);
    assert_eq!(test.compiler.compile_calls(), 1);
    assert_eq!(test.engine.calls(), 2);
    assert_eq!(test.engine.max_in_flight(), 1);
}

#[tokio::test]
async fn different_contract_pair_is_rejected() {
    let test = test_app(EngineBehavior::Succeed);

    let (status, _) = post_prove(&test.app, json_body(&prove_body("T1", "E1"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, value) = post_prove(&test.app, json_body(&prove_body("T2", "E1"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(value["error"], "CompilationConfigMismatch");
    assert!(value["message"].as_str().unwrap().contains("T2"));
    assert!(value["executionTime"].is_u64());
    assert!(value["memoryUsage"].is_object());

    assert_eq!(test.compiler.compile_calls(), 1);
    assert_eq!(test.engine.calls(), 1);
}

#[tokio::test]
async fn rejected_proof_is_a_normal_response() {
    let test = test_app(EngineBehavior::Fail(vec!["insufficient balance".into()]));

    let (status, value) = post_prove(&test.app, json_body(&prove_body("T1", "E1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        value,
        json!({ "result": { "success": false, "errors": ["insufficient balance"] } })
    );
}

#[tokio::test]
async fn empty_body_is_rejected_before_proving() {
    let test = test_app(EngineBehavior::Succeed);

    let (status, value) = post_prove(&test.app, Body::empty()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(value["message"], "No body provided");
    assert_eq!(test.engine.calls(), 0);
    assert_eq!(test.chain.init_calls(), 0);

    let counter = std::fs::read_to_string(test.cache_dir.path().join("invocations.txt")).unwrap();
    assert_eq!(counter, "1");
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let test = test_app(EngineBehavior::Succeed);

    let (status, value) = post_prove(&test.app, Body::from("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "MalformedRequest");

    let (status, _) = post_prove(&test.app, json_body(&json!({ "other": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(test.engine.calls(), 0);
}

#[tokio::test]
async fn health_reports_bound_state() {
    let test = test_app(EngineBehavior::Succeed);
    let (status, _) = post_prove(&test.app, json_body(&prove_body("T1", "E1"))).await;
    assert_eq!(status, StatusCode::OK);

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("health response");

    assert_eq!(response.status(), StatusCode::OK);
    let body_bytes = body::to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .unwrap();
    let value: Value = serde_json::from_slice(&body_bytes).unwrap();

    assert_eq!(value["status"], "ok");
    assert_eq!(value["network"], "devnet");
    assert_eq!(value["state"]["network"], "devnet");
    assert_eq!(value["state"]["artifactsReady"], true);
    assert_eq!(value["state"]["proving"], false);
    assert_eq!(value["state"]["gateHeld"], false);
}
