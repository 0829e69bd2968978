//! `HttpAnalysisService` against a local axum server.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::{json, Value};

use campaign_assist::config::ServiceConfig;
use campaign_assist::service::{AnalysisService, HttpAnalysisService, JobStatus, ServiceError};

const CREDENTIAL: &str = "test-credential";

#[derive(Clone, Default)]
struct Seen {
    submitted_urls: Arc<Mutex<Vec<String>>>,
    status_paths: Arc<Mutex<Vec<String>>>,
    job_ids: Arc<Mutex<Vec<String>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == CREDENTIAL)
}

async fn submit(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "missing credential" })));
    }
    let url = body["url"].as_str().unwrap_or_default().to_string();
    if url.contains("explode") {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "x".repeat(1000) })),
        );
    }
    seen.submitted_urls.lock().unwrap().push(url);
    (
        StatusCode::OK,
        Json(json!({ "jobId": "a/b c?d", "status": "pending" })),
    )
}

async fn status(
    State(seen): State<Seen>,
    headers: HeaderMap,
    uri: Uri,
    Path(job_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    seen.status_paths.lock().unwrap().push(uri.path().to_string());
    seen.job_ids.lock().unwrap().push(job_id);
    (
        StatusCode::OK,
        Json(json!({
            "status": "COMPLETED",
            "currentStep": "done",
            "result": {
                "tags": ["b2b", "saas"],
                "suggestedDescription": "X",
                "productDescription": "",
            },
            "completedAt": "2026-03-01T12:00:00Z",
        })),
    )
}

async fn garbage() -> &'static str {
    "not json"
}

async fn spawn_server(seen: Seen) -> String {
    let app = Router::new()
        .route("/v1/analyze", post(submit))
        .route("/v1/analyze/status/:job_id", get(status))
        .route("/broken/analyze", post(garbage))
        .with_state(seen);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: String, credential: Option<&str>) -> HttpAnalysisService {
    HttpAnalysisService::new(
        &ServiceConfig::new(base_url),
        credential.map(|c| SecretString::from(c.to_string())),
    )
    .unwrap()
}

#[tokio::test]
async fn submit_and_poll_round_trip() {
    let seen = Seen::default();
    let base = spawn_server(seen.clone()).await;
    let service = client(format!("{}/v1", base), Some(CREDENTIAL));

    let submitted = service.submit("https://acme.com").await.unwrap();
    assert_eq!(submitted.job_id, "a/b c?d");
    assert_eq!(submitted.status, JobStatus::Pending);
    assert_eq!(*seen.submitted_urls.lock().unwrap(), vec!["https://acme.com"]);

    let status = service.get_status(&submitted.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.current_step.as_deref(), Some("done"));
    let result = status.result.unwrap();
    assert_eq!(result.tags, vec!["b2b", "saas"]);
    assert_eq!(result.suggested_description.as_deref(), Some("X"));
    assert_eq!(result.product_description.as_deref(), Some(""));
    assert!(result.target_audience.is_none());

    assert_eq!(
        *seen.status_paths.lock().unwrap(),
        vec!["/v1/analyze/status/a%2Fb%20c%3Fd"]
    );
    assert_eq!(*seen.job_ids.lock().unwrap(), vec!["a/b c?d"]);
}

#[tokio::test]
async fn missing_credential_is_an_http_error() {
    let base = spawn_server(Seen::default()).await;
    let service = client(format!("{}/v1", base), None);

    let err = service.submit("https://acme.com").await.unwrap_err();
    assert!(matches!(err, ServiceError::Http { status: 401, .. }));
    assert!(err.is_http_status());
}

#[tokio::test]
async fn server_error_body_is_truncated() {
    let base = spawn_server(Seen::default()).await;
    let service = client(format!("{}/v1", base), Some(CREDENTIAL));

    match service.submit("https://explode.example").await.unwrap_err() {
        ServiceError::Http { status, body } => {
            assert_eq!(status, 500);
            assert!(body.ends_with("... (truncated)"));
            assert!(body.len() < 250);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let base = spawn_server(Seen::default()).await;
    let service = client(format!("{}/broken", base), Some(CREDENTIAL));

    let err = service.submit("https://acme.com").await.unwrap_err();
    assert!(matches!(err, ServiceError::Decode(_)));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let service = client(format!("http://{}", addr), Some(CREDENTIAL));
    let err = service.get_status("job-1").await.unwrap_err();
    assert!(matches!(err, ServiceError::Transport(_)));
}
