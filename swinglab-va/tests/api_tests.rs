//! Job Contract API Tests
//! Test File: api_tests.rs
//! Coverage: submission and polling surfaces, error envelope, structurally
//! complete poll responses.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use swinglab_common::events::EventBus;
use swinglab_va::config::AnalysisConfig;
use swinglab_va::models::AnalysisJob;
use swinglab_va::{build_router, AppState};
use tower::util::ServiceExt;

struct ApiHarness {
    _root: tempfile::TempDir,
    state: AppState,
}

async fn api_harness() -> ApiHarness {
    let root = tempfile::tempdir().unwrap();
    swinglab_common::config::ensure_root_layout(&root.path().to_path_buf()).unwrap();

    let config = AnalysisConfig::resolve(root.path().to_path_buf(), None).unwrap();
    let db = swinglab_va::db::init_database_pool(&config.database_path())
        .await
        .unwrap();
    let state = AppState::new(db, EventBus::new(100), Arc::new(config));

    ApiHarness { _root: root, state }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// TC-API-001: Health endpoint reports service identity
#[tokio::test]
async fn tc_api_001_health() {
    let h = api_harness().await;
    let response = build_router(h.state.clone())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "swinglab-va");
}

/// TC-API-002: Polling an unknown job returns 404 with the error envelope
#[tokio::test]
async fn tc_api_002_unknown_job_404() {
    let h = api_harness().await;
    let response = build_router(h.state.clone())
        .oneshot(
            Request::get("/analysis/jobs/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

/// TC-API-003: Invalid submissions are rejected synchronously with 400
#[tokio::test]
async fn tc_api_003_invalid_submission() {
    let h = api_harness().await;

    let submit = |payload: Value| {
        let router = build_router(h.state.clone());
        async move {
            router
                .oneshot(
                    Request::post("/analysis/jobs")
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(payload.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap()
        }
    };

    // Unsupported extension
    let response = submit(json!({"jobId": "j", "filename": "swing.gif"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Path separator in identifier
    let response = submit(json!({"jobId": "../j", "filename": "swing.mp4"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Missing source clip
    let response = submit(json!({"jobId": "j", "filename": "absent.mp4"})).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// TC-API-004: Accepted submission returns 202 and polls with a
/// structurally complete body even before any result exists
#[tokio::test]
async fn tc_api_004_submit_and_poll() {
    let h = api_harness().await;

    // Pre-seed a pending job with no result to pin the poll shape
    let pending = AnalysisJob::new("seeded".to_string(), "seeded.mp4".to_string());
    swinglab_va::db::jobs::save_job(&h.state.db, &pending)
        .await
        .unwrap();

    let response = build_router(h.state.clone())
        .oneshot(
            Request::get("/analysis/jobs/seeded")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["jobId"], "seeded");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["errorMessage"], Value::Null);
    // Null-filled but structurally complete events and metrics
    assert_eq!(body["events"]["impactMs"], Value::Null);
    assert_eq!(body["events"]["addressMs"], Value::Null);
    assert_eq!(body["metrics"]["tempo"]["ratio"], Value::Null);
    assert_eq!(body["metrics"]["swingPlane"]["label"], "neutral");
    assert_eq!(body["metrics"]["impactStability"]["label"], "unstable");
    assert_eq!(body["summary"], "");

    // Live submission against a real clip
    std::fs::File::create(h._root.path().join("media/live.mp4")).unwrap();
    let response = build_router(h.state.clone())
        .oneshot(
            Request::post("/analysis/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"jobId": "live", "filename": "live.mp4"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["jobId"], "live");
    assert_eq!(body["status"], "running");
    assert_eq!(body["dispatched"], true);
}
