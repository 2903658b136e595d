use crate::backend::{BackendError, ScheduleBackend, ScheduleFetcher};
use crate::calculations::conflicts::ConflictReport;
use crate::config::Config;
use crate::coordinator::{MoveCoordinator, MoveEffect, MoveError, MoveEvent, MoveNotification, MoveState, MoveTarget};
use crate::graph::{DependencyEdge, DependencyError, DependencyGraph};
use crate::job::{ConflictKind, Job, Machine};
use crate::schedule::{LoadOutcome, Schedule, ScheduleError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notifications for the surrounding UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScheduleEvent {
    JobUpdated { notification: MoveNotification },
    DependencyCreated { edge: DependencyEdge },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    Move(#[from] MoveError),
}

/// Everything the board mutates, behind one lock.
pub struct BoardState {
    pub schedule: Schedule,
    pub graph: DependencyGraph,
    pub coordinator: MoveCoordinator,
}

pub struct Dashboard {
    backend: Arc<dyn ScheduleBackend>,
    fetcher: ScheduleFetcher,
    fetch_timeout: Duration,
    state: Mutex<BoardState>,
    events: broadcast::Sender<ScheduleEvent>,
}

impl Dashboard {
    pub fn new(backend: Arc<dyn ScheduleBackend>, config: &Config) -> Self {
        let fetcher = ScheduleFetcher::new(
            Arc::clone(&backend),
            config.cache_window,
            config.fetch_timeout,
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            fetcher,
            fetch_timeout: config.fetch_timeout,
            state: Mutex::new(BoardState {
                schedule: Schedule::with_limits(
                    config.max_confirmed_updates,
                    config.stale_override_warning,
                ),
                graph: DependencyGraph::new(),
                coordinator: MoveCoordinator::new(),
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.events.subscribe()
    }

    /// Forced schedule fetch followed by the dependency edges.
    pub async fn initialize(&self) -> Result<LoadOutcome, DashboardError> {
        let outcome = self.refresh(true).await?;
        self.load_dependencies().await?;
        Ok(outcome)
    }

    pub async fn refresh(&self, force_fresh: bool) -> Result<LoadOutcome, DashboardError> {
        let fetched = self.fetcher.fetch(force_fresh).await?;
        let jobs = fetched.snapshot.jobs.clone();
        let machines = fetched.snapshot.machines.clone();
        let mut state = self.state.lock();
        let outcome = if fetched.cached {
            state.schedule.reapply(jobs, machines)?
        } else {
            state.schedule.load(jobs, machines)?
        };
        Ok(outcome)
    }

    /// Rebuilds the graph from the backend's edges plus each job's prerequisite list.
    pub async fn load_dependencies(&self) -> Result<usize, DashboardError> {
        let edges = tokio::time::timeout(self.fetch_timeout, self.backend.fetch_dependencies())
            .await
            .map_err(|_| BackendError::Timeout(self.fetch_timeout))??;

        let mut state = self.state.lock();
        let job_edges: Vec<DependencyEdge> = state
            .schedule
            .jobs()
            .flat_map(|job| {
                job.prerequisites
                    .iter()
                    .map(|p| DependencyEdge::new(p.clone(), job.id.clone()))
            })
            .collect();

        let mut graph = DependencyGraph::new();
        for edge in edges.into_iter().chain(job_edges) {
            if let Err(err) = graph.add_dependency(&edge.prerequisite, &edge.dependent) {
                warn!(error = %err, "Skipping dependency edge");
            }
        }
        let count = graph.edge_count();
        state.graph = graph;
        info!(edges = count, "Dependencies loaded");
        Ok(count)
    }

    pub fn add_dependency(
        &self,
        prerequisite: &str,
        dependent: &str,
    ) -> Result<DependencyEdge, DashboardError> {
        let edge = self.state.lock().graph.add_dependency(prerequisite, dependent)?;
        info!(prerequisite, dependent, "Dependency created");
        let _ = self.events.send(ScheduleEvent::DependencyCreated { edge: edge.clone() });
        Ok(edge)
    }

    pub fn begin_drag(&self, job_id: &str) -> Result<MoveEffect, DashboardError> {
        self.dispatch(MoveEvent::DragStart {
            job_id: job_id.to_string(),
        })
    }

    pub fn drop_on(&self, target: MoveTarget) -> Result<MoveEffect, DashboardError> {
        self.dispatch(MoveEvent::Drop { target })
    }

    /// Drag and drop in one step; the move still needs confirming.
    pub fn propose_move(&self, job_id: &str, target: MoveTarget) -> Result<MoveEffect, DashboardError> {
        self.begin_drag(job_id)?;
        self.drop_on(target)
    }

    pub fn cancel(&self) -> Result<MoveEffect, DashboardError> {
        self.dispatch(MoveEvent::Cancel)
    }

    /// Sends the pending move to the backend and settles it.
    pub async fn confirm(&self) -> Result<MoveEffect, DashboardError> {
        let request = match self.dispatch(MoveEvent::Confirm)? {
            MoveEffect::CommitRequested { request } => request,
            other => return Ok(other),
        };

        let event = match self.backend.commit_move(&request).await {
            Ok(()) => MoveEvent::CommitSucceeded,
            Err(error) => MoveEvent::CommitFailed { error },
        };
        let effect = self.dispatch(event)?;

        if let MoveEffect::Committed { notification } = &effect {
            let _ = self.events.send(ScheduleEvent::JobUpdated {
                notification: notification.clone(),
            });
            self.fetcher.invalidate().await;
            if let Err(err) = self.refresh(true).await {
                warn!(error = %err, "Refresh after commit failed");
            }
        }
        Ok(effect)
    }

    /// Background refresh for the conflict panel; failures fall back to an empty report.
    pub async fn refresh_conflicts_in_background(&self) -> ConflictReport {
        match self.refresh(false).await {
            Ok(LoadOutcome::Applied(summary)) => summary.conflicts,
            Ok(LoadOutcome::Deferred { .. }) => self.conflicts(),
            Err(err) => {
                warn!(error = %err, "Background conflict refresh failed");
                ConflictReport::default()
            }
        }
    }

    pub fn conflict_of(&self, job_id: &str) -> Option<ConflictKind> {
        self.state.lock().schedule.conflict_of(job_id)
    }

    pub fn conflicts(&self) -> ConflictReport {
        self.state.lock().schedule.conflicts().clone()
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.state.lock().schedule.job(job_id).cloned()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().schedule.jobs().cloned().collect()
    }

    pub fn machines(&self) -> Vec<Machine> {
        self.state.lock().schedule.machines().to_vec()
    }

    pub fn dependencies(&self) -> Vec<DependencyEdge> {
        self.state.lock().graph.edges()
    }

    pub fn temporal_violations(&self) -> Vec<DependencyError> {
        let state = self.state.lock();
        state.graph.temporal_violations(&state.schedule)
    }

    pub fn move_state(&self) -> MoveState {
        self.state.lock().coordinator.state().clone()
    }

    /// Read access to the whole board under a single lock.
    pub fn with_state<R>(&self, read: impl FnOnce(&BoardState) -> R) -> R {
        read(&self.state.lock())
    }

    fn dispatch(&self, event: MoveEvent) -> Result<MoveEffect, DashboardError> {
        let mut guard = self.state.lock();
        let BoardState {
            schedule,
            graph,
            coordinator,
        } = &mut *guard;
        Ok(coordinator.dispatch(event, schedule, graph)?)
    }
}
