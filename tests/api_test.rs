//! HTTP surface tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use callbroker::application::{BrokerSettings, IntentProcessor, ProviderConnection, SessionBroker};
use callbroker::domain::account::AccountRegistry;
use callbroker::infrastructure::audio::TracingAudioCoordinator;
use callbroker::infrastructure::provider::{LoopbackProvider, LoopbackSettings};
use callbroker::interface::api::{build_router, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot`

async fn setup() -> Router {
    let broker = SessionBroker::spawn(
        BrokerSettings::default(),
        Arc::new(TracingAudioCoordinator),
        None,
    );
    let connection = ProviderConnection::new("loop");
    let loopback = Arc::new(LoopbackProvider::new(
        connection.clone(),
        LoopbackSettings {
            auto_answer: None,
            ..LoopbackSettings::default()
        },
    ));
    broker.bind_provider(connection, loopback).await.unwrap();

    let intents = IntentProcessor::new(Arc::new(AccountRegistry::new()), broker.clone(), "tel");
    let prometheus_handle = PrometheusBuilder::new().build_recorder().handle();
    build_router(AppState::new(broker, intents), prometheus_handle)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn line1() -> Value {
    json!({
        "provider_id": "loop",
        "account_id": "line1",
        "label": "Line 1",
        "schemes": ["tel"]
    })
}

#[tokio::test]
async fn test_health() {
    let app = setup().await;
    let (status, json) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"], "OK");
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let app = setup().await;
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_account_registration_and_listing() {
    let app = setup().await;

    let (status, json) = send(&app, "POST", "/accounts", Some(line1())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["account_id"], "line1");

    let (status, _) = send(&app, "POST", "/accounts", Some(line1())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, "GET", "/accounts?scheme=tel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (_, json) = send(&app, "GET", "/accounts?scheme=sip", None).await;
    assert!(json["data"].as_array().unwrap().is_empty());

    let (status, _) = send(
        &app,
        "PUT",
        "/accounts/default",
        Some(json!({"provider_id": "loop", "account_id": "line1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = send(&app, "GET", "/accounts", None).await;
    assert_eq!(json["data"][0]["is_default"], true);

    let (status, _) = send(&app, "DELETE", "/accounts/loop/line1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = send(&app, "DELETE", "/accounts/loop/line1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "unknown_account");
}

#[tokio::test]
async fn test_place_call_and_list() {
    let app = setup().await;

    let (status, json) = send(
        &app,
        "POST",
        "/calls",
        Some(json!({"address": "650-555-1212"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "no_matching_account");

    send(&app, "POST", "/accounts", Some(line1())).await;
    let (status, json) = send(
        &app,
        "POST",
        "/calls",
        Some(json!({"address": "650-555-1212"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let call_id = json["data"]["call_id"].as_str().unwrap().to_string();

    let (status, json) = send(&app, "GET", "/calls", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["calls"][0]["id"], call_id.as_str());
    assert_eq!(json["data"]["calls"][0]["address"]["target"], "650-555-1212");

    let (status, json) = send(&app, "GET", &format!("/calls/{}", call_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["direction"], "outgoing");
}

#[tokio::test]
async fn test_unknown_call_is_not_found() {
    let app = setup().await;
    let (status, json) = send(
        &app,
        "GET",
        &format!("/calls/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_incoming_call_on_unknown_account() {
    let app = setup().await;
    let (status, json) = send(
        &app,
        "POST",
        "/calls/incoming",
        Some(json!({
            "account": {"provider_id": "loop", "account_id": "nope"},
            "address": "650-555-2323"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "unknown_account");
}
