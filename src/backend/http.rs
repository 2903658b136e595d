use super::{BackendError, CommitRequest, ScheduleBackend, ScheduleSnapshot};
use crate::graph::DependencyEdge;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

/// Scheduling backend reached over HTTP.
///
/// `timeout` bounds connecting and the read-only fetches. A commit that has
/// been sent is never cut short locally; its outcome is whatever the server answers.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct MoveBody<'a> {
    machine_id: &'a str,
    target_date: DateTime<Utc>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Backend request failed");
        Err(BackendError::from_status(status.as_u16(), &body))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, BackendError> {
        debug!(url = %url, "Fetching from backend");
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.map_transport(err))?;
        let response = self.check(response).await?;
        response.json().await.map_err(|err| self.map_transport(err))
    }
}

#[async_trait]
impl ScheduleBackend for HttpBackend {
    async fn fetch_schedule(&self, force_fresh: bool) -> Result<ScheduleSnapshot, BackendError> {
        let url = if force_fresh {
            format!("{}/schedule?fresh=true", self.base_url)
        } else {
            format!("{}/schedule", self.base_url)
        };
        let snapshot: ScheduleSnapshot = self.get_json(&url).await?;
        debug!(
            jobs = snapshot.jobs.len(),
            machines = snapshot.machines.len(),
            "Fetched schedule"
        );
        Ok(snapshot)
    }

    async fn fetch_dependencies(&self) -> Result<Vec<DependencyEdge>, BackendError> {
        self.get_json(&format!("{}/dependencies", self.base_url)).await
    }

    async fn commit_move(&self, request: &CommitRequest) -> Result<(), BackendError> {
        let url = format!("{}/jobs/{}/move", self.base_url, request.job_id);
        debug!(job_id = %request.job_id, machine_id = %request.machine_id, "Committing move");
        let body = MoveBody {
            machine_id: &request.machine_id,
            target_date: request.start,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.map_transport(err))?;
        self.check(response).await?;
        Ok(())
    }
}
