#![cfg(feature = "http_api")]

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use chrono::{TimeZone, Utc};
use schedule_board::{Config, Dashboard, InMemoryBackend, Job, Machine, ScheduleSnapshot, http_api};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn snapshot() -> ScheduleSnapshot {
    let day = |d| Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap();
    let mut j2 = Job::new("J2", "M1", day(6), day(7));
    j2.prerequisites = vec!["J1".into()];
    ScheduleSnapshot {
        machines: vec![
            Machine::new("M1", "Press", 1.0),
            Machine::new("M2", "Lathe", 1.0),
        ],
        jobs: vec![Job::new("J1", "M1", day(1), day(5)), j2],
    }
}

async fn new_router_with(config: Config) -> (Arc<InMemoryBackend>, axum::Router) {
    let backend = Arc::new(InMemoryBackend::new(snapshot(), Vec::new()));
    let dashboard = Dashboard::new(backend.clone(), &config);
    dashboard.initialize().await.unwrap();
    let state = http_api::AppState::new(Arc::new(dashboard));
    (backend, http_api::router(state))
}

async fn new_router() -> axum::Router {
    new_router_with(Config::default()).await.1
}

async fn call(app: &axum::Router, method: &str, uri: &str, payload: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match payload {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&payload).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn jobs_are_listed_and_looked_up() {
    let app = new_router().await;

    let (status, jobs) = call(&app, "GET", "/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 2);

    let (status, job) = call(&app, "GET", "/jobs/J1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["machine_id"], "M1");

    let (status, conflict) = call(&app, "GET", "/jobs/J1/conflict", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conflict["conflict"], "none");

    let (status, body) = call(&app, "GET", "/jobs/J404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn move_lifecycle_via_http_api() {
    let (backend, app) = new_router_with(Config::default()).await;

    let (status, effect) = call(&app, "POST", "/moves/drag", Some(json!({ "job_id": "J1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(effect["effect"], "drag_started");

    let (status, effect) = call(
        &app,
        "POST",
        "/moves/drop",
        Some(json!({ "machine_id": "M2", "start": "2024-03-08" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(effect["effect"], "confirmation_required");

    let (_, state) = call(&app, "GET", "/moves", None).await;
    assert_eq!(state["state"], "pending_confirmation");

    // Only one move may be outstanding.
    let (status, body) = call(&app, "POST", "/moves/drag", Some(json!({ "job_id": "J2" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, effect) = call(&app, "POST", "/moves/confirm", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(effect["effect"], "committed");
    assert_eq!(backend.commits().len(), 1);

    let (_, job) = call(&app, "GET", "/jobs/J1", None).await;
    assert_eq!(job["machine_id"], "M2");
}

#[tokio::test]
async fn rejected_drops_and_bad_dates() {
    let app = new_router().await;

    call(&app, "POST", "/moves/drag", Some(json!({ "job_id": "J2" }))).await;
    let (status, effect) = call(
        &app,
        "POST",
        "/moves/drop",
        Some(json!({ "machine_id": "M1", "start": "2024-03-04" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(effect["effect"], "rejected");
    assert_eq!(effect["result"]["conflict_type"], "dependency");

    call(&app, "POST", "/moves/drag", Some(json!({ "job_id": "J2" }))).await;
    let (status, body) = call(
        &app,
        "POST",
        "/moves/drop",
        Some(json!({ "machine_id": "M1", "start": "someday" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (status, _) = call(&app, "POST", "/moves/confirm", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn dependencies_reject_cycles() {
    let app = new_router().await;

    let (status, edges) = call(&app, "GET", "/dependencies", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edges, json!([{ "prerequisite": "J1", "dependent": "J2" }]));

    let (status, _) = call(
        &app,
        "POST",
        "/dependencies",
        Some(json!({ "prerequisite": "J2", "dependent": "J1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, edge) = call(
        &app,
        "POST",
        "/dependencies",
        Some(json!({ "prerequisite": "J2", "dependent": "J3" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(edge["dependent"], "J3");
}

#[tokio::test(start_paused = true)]
async fn slow_backend_maps_to_gateway_timeout() {
    let config = Config {
        fetch_timeout: Duration::from_millis(100),
        ..Config::default()
    };
    let (backend, app) = new_router_with(config).await;
    backend.set_fetch_delay(Some(Duration::from_secs(5)));

    let (status, body) = call(&app, "POST", "/refresh?force=true", None).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["message"], "request timed out after 100ms");

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
