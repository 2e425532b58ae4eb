//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use openkick::VtnService;
use tower::ServiceExt;

mod common;
use common::{RefusingConnector, running_service, seeded_store, test_service};

async fn call(
    service: &Arc<VtnService>,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let app = openkick::api::router(Arc::clone(service));

    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let service = Arc::new(test_service());
    let (status, json) = call(&service, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_stopped_service_is_unavailable() {
    let service = Arc::new(test_service());

    for (method, uri) in [
        ("GET", "/ven/registered"),
        ("GET", "/ven/connected"),
        ("GET", "/ven/connect"),
        ("POST", "/ven/create"),
        ("DELETE", "/ven/delete"),
    ] {
        let (status, json) = call(&service, method, uri, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{method} {uri}");
        assert_eq!(json["error"]["code"], "not_running");
        assert_eq!(json["error"]["message"], "VTN server is not running");
    }
}

#[tokio::test]
async fn test_registered_lists_seeded_devices() {
    let service = running_service(5).await;

    let (status, json) = call(&service, "GET", "/ven/registered", None).await;
    assert_eq!(status, StatusCode::OK);

    let vens = json.as_array().unwrap();
    assert_eq!(vens.len(), 5);
    assert_eq!(vens[0]["name"], "ven-0");
    assert_eq!(vens[0]["id"], "ID-0");
    assert_eq!(vens[0]["registration_id"], "REG-0");
    assert_eq!(vens[0]["is_connected"], false);

    let (_, connected) = call(&service, "GET", "/ven/connected", None).await;
    assert!(connected.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_then_send_event() {
    let service = running_service(3).await;

    let (status, json) = call(
        &service,
        "POST",
        "/event/send-event",
        Some(serde_json::json!({ "ven_id": "ID-1", "signal_level": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "not_connected");

    let (status, json) = call(&service, "GET", "/ven/connect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["started"].as_array().unwrap().len(), 3);

    let (_, connected) = call(&service, "GET", "/ven/connected", None).await;
    assert_eq!(connected.as_array().unwrap().len(), 3);

    let (status, json) = call(
        &service,
        "POST",
        "/event/send-event",
        Some(serde_json::json!({ "ven_id": "ID-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "event sent");
    assert!(json["event_id"].is_string());

    // Second pass starts nothing
    let (status, json) = call(&service, "POST", "/ven/connect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["started"].as_array().unwrap().is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn test_send_event_to_unknown_device() {
    let service = running_service(2).await;

    let (status, json) = call(
        &service,
        "POST",
        "/event/send-event",
        Some(serde_json::json!({ "ven_id": "ID-99", "signal_level": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "unknown_device");
    assert_eq!(json["error"]["message"], "VEN not registered: ID-99");
}

#[tokio::test]
async fn test_send_event_requires_ven_id() {
    let service = running_service(1).await;

    let (status, _) = call(
        &service,
        "POST",
        "/event/send-event",
        Some(serde_json::json!({ "signal_level": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_and_delete_are_stubs() {
    let service = running_service(1).await;

    let (status, json) = call(&service, "POST", "/ven/create", None).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(json["error"]["code"], "not_implemented");

    let (status, _) = call(&service, "DELETE", "/ven/delete", None).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_partial_connect_failure_is_structured() {
    let service = Arc::new(test_service().connector(Arc::new(RefusingConnector::new("ID-0"))));
    service.run(&seeded_store(2)).await.unwrap();

    let (status, json) = call(&service, "GET", "/ven/connect", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "spawn_failed");

    let (_, connected) = call(&service, "GET", "/ven/connected", None).await;
    let connected = connected.as_array().unwrap();
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0]["id"], "ID-1");

    service.shutdown().await;
}
