//! Node client behavior against an in-process stub of the node REST API

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rng_bridge::{config::ErgoNodeConfig, errors::NodeError, node::ErgoNodeClient};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

#[derive(Clone, Default)]
struct Stub {
    calls: Arc<AtomicUsize>,
    /// Number of leading calls answered with 503
    failures: usize,
}

fn box_json(box_id: &str, tree: &str) -> serde_json::Value {
    json!({
        "boxId": box_id,
        "value": 1000000,
        "ergoTree": tree,
        "creationHeight": 2776,
        "assets": [],
        "additionalRegisters": {}
    })
}

async fn get_fee(State(stub): State<Stub>, headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    let n = stub.calls.fetch_add(1, Ordering::SeqCst);
    if n < stub.failures {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    if headers.get("api_key").and_then(|v| v.to_str().ok()) != Some("hello") {
        return (StatusCode::FORBIDDEN, "bad key").into_response();
    }
    let size: u64 = q.get("txSize").and_then(|s| s.parse().ok()).unwrap_or(0);
    Json(json!(1_000_000 + size)).into_response()
}

async fn unconfirmed(State(stub): State<Stub>, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    stub.calls.fetch_add(1, Ordering::SeqCst);
    let limit: usize = q.get("limit").and_then(|s| s.parse().ok()).unwrap_or(0);
    let txs: Vec<_> = (0..limit)
        .map(|i| {
            json!({
                "id": format!("tx{}", i),
                "inputs": [{"boxId": "in"}],
                "dataInputs": [],
                "outputs": [box_json(&format!("out{}", i), "0008cd03")]
            })
        })
        .collect();
    Json(txs)
}

async fn by_ergo_tree(State(stub): State<Stub>, Json(tree): Json<String>) -> impl IntoResponse {
    stub.calls.fetch_add(1, Ordering::SeqCst);
    Json(vec![box_json("match", &tree)])
}

async fn spawn_stub(stub: Stub) -> String {
    let app = Router::new()
        .route("/transactions/getFee", get(get_fee))
        .route("/transactions/unconfirmed", get(unconfirmed))
        .route("/transactions/unconfirmed/outputs/byErgoTree", post(by_ergo_tree))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client_for(endpoint: String, api_key: &str) -> ErgoNodeClient {
    let config = ErgoNodeConfig {
        endpoint,
        api_key: Some(api_key.to_string()),
        wallet_password: Some("pw".to_string()),
        retry_wait_min_ms: 1,
        retry_wait_max_ms: 5,
        ..ErgoNodeConfig::default()
    };
    ErgoNodeClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_get_tx_fee() {
    let stub = Stub::default();
    let client = client_for(spawn_stub(stub.clone()).await, "hello");

    let fee = client.get_tx_fee(2776).await.unwrap();

    assert!(fee >= 1_000_000, "unexpected fee value");
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let stub = Stub {
        failures: 2,
        ..Stub::default()
    };
    let client = client_for(spawn_stub(stub.clone()).await, "hello");

    let fee = client.get_tx_fee(100).await.unwrap();

    assert_eq!(fee, 1_000_100);
    // two failures + one success
    assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_gives_up_after_retry_budget() {
    let stub = Stub {
        failures: usize::MAX,
        ..Stub::default()
    };
    let client = client_for(spawn_stub(stub.clone()).await, "hello");

    let err = client.get_tx_fee(100).await.unwrap_err();

    assert!(matches!(err, NodeError::Status { status: 503, .. }));
    assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let stub = Stub::default();
    let client = client_for(spawn_stub(stub.clone()).await, "wrong");

    let err = client.get_tx_fee(100).await.unwrap_err();

    assert!(matches!(err, NodeError::Status { status: 403, .. }));
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unconfirmed_outputs_by_ergo_tree() {
    let stub = Stub::default();
    let client = client_for(spawn_stub(stub).await, "hello");

    // get 1 unconfirmed tx, then filter by one of its output trees
    let txs = client.get_unconfirmed_txs(1, 0).await.unwrap();
    assert_eq!(txs.len(), 1);
    let ergo_tree = txs[0].outputs[0].ergo_tree.clone();

    let boxes = client
        .get_unconfirmed_outputs_by_ergo_tree(&ergo_tree, 1, 0)
        .await
        .unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].ergo_tree, ergo_tree);
}

#[tokio::test]
async fn test_unreachable_node_is_transport_error() {
    // bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(format!("http://{}", addr), "hello");
    let err = client.get_unconfirmed_txs(1, 0).await.unwrap_err();

    assert!(matches!(err, NodeError::Transport(_)));
}
