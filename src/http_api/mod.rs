use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::backend::BackendError;
use crate::calculations::conflicts::ConflictReport;
use crate::calculations::move_validation::parse_instant;
use crate::coordinator::{MoveEffect, MoveError, MoveState, MoveTarget};
use crate::dashboard::{Dashboard, DashboardError};
use crate::graph::{DependencyEdge, DependencyError};
use crate::job::{ConflictDetail, ConflictKind, Job, Machine};
use crate::schedule::{LoadOutcome, ScheduleError};

#[derive(Clone)]
pub struct AppState {
    dashboard: Arc<Dashboard>,
}

impl AppState {
    pub fn new(dashboard: Arc<Dashboard>) -> Self {
        Self { dashboard }
    }

    fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String),
    Invalid(String),
    BadGateway(String),
    GatewayTimeout(String),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }
}

impl From<BackendError> for ApiError {
    fn from(value: BackendError) -> Self {
        let message = value.to_string();
        match value {
            BackendError::Client { status: 404, .. } => ApiError::NotFound(message),
            BackendError::Client { status: 409, .. } => ApiError::Conflict(message),
            BackendError::Client { .. } => ApiError::Invalid(message),
            BackendError::Timeout(_) => ApiError::GatewayTimeout(message),
            BackendError::Server { .. } | BackendError::Transport(_) | BackendError::Decode(_) => {
                ApiError::BadGateway(message)
            }
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::UnknownJob(_) => ApiError::NotFound(value.to_string()),
            ScheduleError::InvalidData(_) => ApiError::BadGateway(value.to_string()),
        }
    }
}

impl From<DependencyError> for ApiError {
    fn from(value: DependencyError) -> Self {
        ApiError::Conflict(value.to_string())
    }
}

impl From<MoveError> for ApiError {
    fn from(value: MoveError) -> Self {
        match value {
            MoveError::UnknownJob(_) => ApiError::NotFound(value.to_string()),
            MoveError::Schedule(err) => err.into(),
            MoveError::MoveInProgress { .. }
            | MoveError::CommitInFlight { .. }
            | MoveError::InvalidTransition { .. } => ApiError::Conflict(value.to_string()),
        }
    }
}

impl From<DashboardError> for ApiError {
    fn from(value: DashboardError) -> Self {
        match value {
            DashboardError::Backend(err) => err.into(),
            DashboardError::Schedule(err) => err.into(),
            DashboardError::Dependency(err) => err.into(),
            DashboardError::Move(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, "conflict", message),
            ApiError::Invalid(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            ApiError::BadGateway(message) => (StatusCode::BAD_GATEWAY, "backend_error", message),
            ApiError::GatewayTimeout(message) => {
                (StatusCode::GATEWAY_TIMEOUT, "backend_timeout", message)
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RefreshParams {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct DragPayload {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct DropPayload {
    machine_id: String,
    /// RFC 3339 instant or a bare `YYYY-MM-DD` date.
    start: String,
}

#[derive(Debug, Serialize)]
struct JobConflict {
    job_id: String,
    conflict: ConflictKind,
    detail: Option<ConflictDetail>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/conflict", get(get_job_conflict))
        .route("/machines", get(list_machines))
        .route("/conflicts", get(list_conflicts))
        .route("/refresh", post(refresh))
        .route("/dependencies", get(list_dependencies).post(create_dependency))
        .route("/moves", get(move_state))
        .route("/moves/drag", post(drag))
        .route("/moves/drop", post(drop_move))
        .route("/moves/confirm", post(confirm))
        .route("/moves/cancel", post(cancel))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, dashboard: Arc<Dashboard>) -> std::io::Result<()> {
    let app = router(AppState::new(dashboard));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.dashboard().jobs())
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .dashboard()
        .job(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))
}

async fn get_job_conflict(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobConflict>, ApiError> {
    let job = state
        .dashboard()
        .job(&job_id)
        .ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;
    Ok(Json(JobConflict {
        job_id: job.id,
        conflict: job.conflict,
        detail: job.conflict_detail,
    }))
}

async fn list_machines(State(state): State<AppState>) -> Json<Vec<Machine>> {
    Json(state.dashboard().machines())
}

async fn list_conflicts(State(state): State<AppState>) -> Json<ConflictReport> {
    Json(state.dashboard().conflicts())
}

async fn refresh(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<LoadOutcome>, ApiError> {
    let outcome = state.dashboard().refresh(params.force).await?;
    Ok(Json(outcome))
}

async fn list_dependencies(State(state): State<AppState>) -> Json<Vec<DependencyEdge>> {
    Json(state.dashboard().dependencies())
}

async fn create_dependency(
    State(state): State<AppState>,
    Json(edge): Json<DependencyEdge>,
) -> Result<(StatusCode, Json<DependencyEdge>), ApiError> {
    if edge.prerequisite.trim().is_empty() || edge.dependent.trim().is_empty() {
        return Err(ApiError::invalid("prerequisite and dependent are required"));
    }
    let created = state
        .dashboard()
        .add_dependency(&edge.prerequisite, &edge.dependent)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn move_state(State(state): State<AppState>) -> Json<MoveState> {
    Json(state.dashboard().move_state())
}

async fn drag(
    State(state): State<AppState>,
    Json(payload): Json<DragPayload>,
) -> Result<Json<MoveEffect>, ApiError> {
    Ok(Json(state.dashboard().begin_drag(&payload.job_id)?))
}

async fn drop_move(
    State(state): State<AppState>,
    Json(payload): Json<DropPayload>,
) -> Result<Json<MoveEffect>, ApiError> {
    let start = parse_instant(&payload.start)
        .map_err(|result| ApiError::invalid(result.message.unwrap_or_default()))?;
    let effect = state
        .dashboard()
        .drop_on(MoveTarget::new(payload.machine_id, start))?;
    Ok(Json(effect))
}

async fn confirm(State(state): State<AppState>) -> Result<Response, ApiError> {
    let effect = state.dashboard().confirm().await?;
    let status = match effect {
        MoveEffect::Failed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    Ok((status, Json(effect)).into_response())
}

async fn cancel(State(state): State<AppState>) -> Result<Json<MoveEffect>, ApiError> {
    Ok(Json(state.dashboard().cancel()?))
}
