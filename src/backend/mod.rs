//! The three backend operations the scheduling core depends on.
//!
//! The core never persists anything itself; it fetches the schedule and the
//! dependency edges, and asks the backend to commit a single move.

use crate::config::Config;
use crate::graph::DependencyEdge;
use crate::job::{Job, Machine};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub mod cache;
pub mod file;
#[cfg(feature = "remote")]
pub mod http;
pub mod memory;
pub mod normalize;

pub use cache::{FetchedSnapshot, ScheduleFetcher};
pub use file::{
    FileBackend, PersistenceError, ScheduleDocument, load_jobs_from_csv, save_jobs_to_csv,
};
#[cfg(feature = "remote")]
pub use http::HttpBackend;
pub use memory::InMemoryBackend;
pub use normalize::normalize_error_message;

/// Full job and machine set as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    #[serde(default)]
    pub machines: Vec<Machine>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// A move the user confirmed, on its way to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub job_id: String,
    pub machine_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// 4xx responses; the message is already normalized for display.
    #[error("{message}")]
    Client { status: u16, message: String },
    #[error("service unavailable")]
    Server { status: u16 },
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn client(status: u16, raw_body: &str) -> Self {
        BackendError::Client {
            status,
            message: normalize_error_message(raw_body),
        }
    }

    /// Maps an HTTP status and body onto the taxonomy the UI reports.
    pub fn from_status(status: u16, raw_body: &str) -> Self {
        if status >= 500 {
            BackendError::Server { status }
        } else {
            BackendError::client(status, raw_body)
        }
    }

    /// Message shown to the user; transport and decode details are normalized too.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Client { message, .. } => message.clone(),
            BackendError::Transport(detail) | BackendError::Decode(detail) => {
                normalize_error_message(detail)
            }
            other => other.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout(_))
    }
}

#[async_trait]
pub trait ScheduleBackend: Send + Sync {
    /// `force_fresh` asks the backend to bypass any cache it keeps.
    async fn fetch_schedule(&self, force_fresh: bool) -> Result<ScheduleSnapshot, BackendError>;

    async fn fetch_dependencies(&self) -> Result<Vec<DependencyEdge>, BackendError>;

    async fn commit_move(&self, request: &CommitRequest) -> Result<(), BackendError>;
}

/// Picks the backend named by the config: remote URL, then schedule file, then an empty in-memory board.
pub fn build_backend(config: &Config) -> Result<Arc<dyn ScheduleBackend>, BackendError> {
    #[cfg(feature = "remote")]
    if let Some(url) = &config.backend_url {
        info!(url = %url, "Using HTTP scheduling backend");
        return Ok(Arc::new(HttpBackend::new(url.clone(), config.fetch_timeout)?));
    }
    #[cfg(not(feature = "remote"))]
    if config.backend_url.is_some() {
        return Err(BackendError::Transport(
            "built without the `remote` feature; cannot reach a backend URL".to_string(),
        ));
    }

    if let Some(path) = &config.schedule_file {
        info!(path = %path.display(), "Using schedule file backend");
        return Ok(Arc::new(FileBackend::new(path.clone())));
    }

    info!("No backend configured; starting with an empty in-memory board");
    Ok(Arc::new(InMemoryBackend::default()))
}
