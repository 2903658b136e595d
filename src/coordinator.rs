//! Drag-and-drop move transactions.
//!
//! A move travels `Idle -> Dragging -> PendingConfirmation -> Committing -> Idle`.
//! The coordinator is a plain reducer: every event is dispatched together with
//! the schedule and dependency graph it may touch, and it answers with the
//! effect the caller has to surface. It never performs I/O; when a commit is
//! requested the caller talks to the backend and feeds the outcome back in as
//! `CommitSucceeded` or `CommitFailed`.

use crate::backend::{BackendError, CommitRequest};
use crate::calculations::move_validation::{MoveValidator, ValidationResult};
use crate::graph::DependencyGraph;
use crate::job::Job;
use crate::schedule::{Schedule, ScheduleError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTarget {
    pub machine_id: String,
    pub start: DateTime<Utc>,
}

impl MoveTarget {
    pub fn new(machine_id: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            machine_id: machine_id.into(),
            start,
        }
    }
}

/// The one move allowed to wait for the user's confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMove {
    pub snapshot: Job,
    pub target_machine_id: String,
    pub target_start: DateTime<Utc>,
    pub target_end: DateTime<Utc>,
}

impl PendingMove {
    pub fn job_id(&self) -> &str {
        &self.snapshot.id
    }

    pub fn commit_request(&self) -> CommitRequest {
        CommitRequest {
            job_id: self.snapshot.id.clone(),
            machine_id: self.target_machine_id.clone(),
            start: self.target_start,
            end: self.target_end,
        }
    }

    fn prompt(&self) -> ConfirmationPrompt {
        ConfirmationPrompt {
            job_id: self.snapshot.id.clone(),
            from_machine_id: self.snapshot.machine_id.clone(),
            machine_id: self.target_machine_id.clone(),
            start: self.target_start,
            end: self.target_end,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MoveState {
    #[default]
    Idle,
    Dragging {
        snapshot: Job,
    },
    PendingConfirmation {
        pending: PendingMove,
    },
    /// The commit has been sent; it cannot be aborted, only its result handled.
    Committing {
        pending: PendingMove,
    },
}

impl MoveState {
    pub fn name(&self) -> &'static str {
        match self {
            MoveState::Idle => "idle",
            MoveState::Dragging { .. } => "dragging",
            MoveState::PendingConfirmation { .. } => "pending_confirmation",
            MoveState::Committing { .. } => "committing",
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            MoveState::Idle => None,
            MoveState::Dragging { snapshot } => Some(&snapshot.id),
            MoveState::PendingConfirmation { pending } | MoveState::Committing { pending } => {
                Some(pending.job_id())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveEvent {
    DragStart { job_id: String },
    Drop { target: MoveTarget },
    Confirm,
    Cancel,
    CommitSucceeded,
    CommitFailed { error: BackendError },
}

impl MoveEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MoveEvent::DragStart { .. } => "drag_start",
            MoveEvent::Drop { .. } => "drop",
            MoveEvent::Confirm => "confirm",
            MoveEvent::Cancel => "cancel",
            MoveEvent::CommitSucceeded => "commit_succeeded",
            MoveEvent::CommitFailed { .. } => "commit_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPrompt {
    pub job_id: String,
    pub from_machine_id: String,
    pub machine_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ConfirmationPrompt {
    pub fn message(&self) -> String {
        format!(
            "Move job {} from {} to {} starting {}?",
            self.job_id,
            self.from_machine_id,
            self.machine_id,
            self.start.format("%Y-%m-%d %H:%M")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveNotification {
    pub job_id: String,
    pub machine_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MoveNotification {
    pub fn message(&self) -> String {
        format!(
            "Job {} moved to {} on {}",
            self.job_id,
            self.machine_id,
            self.start.format("%Y-%m-%d")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum MoveEffect {
    DragStarted { job_id: String },
    /// Validation failed; nothing was mutated and the coordinator is idle again.
    Rejected { result: ValidationResult },
    ConfirmationRequired { prompt: ConfirmationPrompt },
    CommitRequested { request: CommitRequest },
    Committed { notification: MoveNotification },
    Cancelled { job_id: String },
    Failed { job_id: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoveError {
    #[error("job {job_id} is still being moved; finish or cancel the current move first")]
    MoveInProgress { job_id: String },
    #[error("the commit for job {job_id} is already in flight")]
    CommitInFlight { job_id: String },
    #[error("job {0} not found")]
    UnknownJob(String),
    #[error("cannot handle {event} while {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[derive(Debug, Default)]
pub struct MoveCoordinator {
    state: MoveState,
}

impl MoveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &MoveState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, MoveState::Idle)
    }

    pub fn pending(&self) -> Option<&PendingMove> {
        match &self.state {
            MoveState::PendingConfirmation { pending } | MoveState::Committing { pending } => {
                Some(pending)
            }
            _ => None,
        }
    }

    pub fn dispatch(
        &mut self,
        event: MoveEvent,
        schedule: &mut Schedule,
        graph: &DependencyGraph,
    ) -> Result<MoveEffect, MoveError> {
        let state = std::mem::take(&mut self.state);
        match (state, event) {
            (state @ (MoveState::Idle | MoveState::Dragging { .. }), MoveEvent::DragStart { job_id }) => {
                let Some(snapshot) = schedule.job(&job_id).cloned() else {
                    self.state = state;
                    return Err(MoveError::UnknownJob(job_id));
                };
                self.state = MoveState::Dragging { snapshot };
                Ok(MoveEffect::DragStarted { job_id })
            }
            (
                state @ (MoveState::PendingConfirmation { .. } | MoveState::Committing { .. }),
                MoveEvent::DragStart { .. },
            ) => {
                let job_id = state.job_id().unwrap_or_default().to_string();
                self.state = state;
                Err(MoveError::MoveInProgress { job_id })
            }
            (MoveState::Dragging { snapshot }, MoveEvent::Drop { target }) => {
                self.drop_onto(snapshot, target, schedule, graph)
            }
            (MoveState::Dragging { snapshot }, MoveEvent::Cancel) => {
                Ok(MoveEffect::Cancelled { job_id: snapshot.id })
            }
            (MoveState::PendingConfirmation { pending }, MoveEvent::Confirm) => {
                let request = pending.commit_request();
                self.state = MoveState::Committing { pending };
                Ok(MoveEffect::CommitRequested { request })
            }
            (MoveState::PendingConfirmation { pending }, MoveEvent::Cancel) => {
                schedule.revert(&pending.snapshot);
                schedule.end_pending();
                info!(job_id = %pending.job_id(), "Move cancelled");
                Ok(MoveEffect::Cancelled {
                    job_id: pending.snapshot.id,
                })
            }
            (MoveState::Committing { pending }, MoveEvent::CommitSucceeded) => {
                if let Err(err) = schedule.commit(
                    &pending.snapshot.id,
                    &pending.target_machine_id,
                    pending.target_start,
                    pending.target_end,
                ) {
                    self.state = MoveState::Committing { pending };
                    return Err(err.into());
                }
                schedule.end_pending();
                info!(
                    job_id = %pending.job_id(),
                    machine_id = %pending.target_machine_id,
                    start = %pending.target_start,
                    "Move committed"
                );
                Ok(MoveEffect::Committed {
                    notification: MoveNotification {
                        job_id: pending.snapshot.id,
                        machine_id: pending.target_machine_id,
                        start: pending.target_start,
                        end: pending.target_end,
                    },
                })
            }
            (MoveState::Committing { pending }, MoveEvent::CommitFailed { error }) => {
                schedule.rollback(&pending.snapshot.id, &pending.snapshot);
                schedule.end_pending();
                let message = error.user_message();
                warn!(job_id = %pending.job_id(), error = %message, "Move commit failed");
                Ok(MoveEffect::Failed {
                    job_id: pending.snapshot.id,
                    message,
                })
            }
            (MoveState::Committing { pending }, MoveEvent::Cancel) => {
                let job_id = pending.job_id().to_string();
                self.state = MoveState::Committing { pending };
                Err(MoveError::CommitInFlight { job_id })
            }
            (state, event) => {
                let err = MoveError::InvalidTransition {
                    state: state.name(),
                    event: event.name(),
                };
                self.state = state;
                Err(err)
            }
        }
    }

    fn drop_onto(
        &mut self,
        snapshot: Job,
        target: MoveTarget,
        schedule: &mut Schedule,
        graph: &DependencyGraph,
    ) -> Result<MoveEffect, MoveError> {
        let result =
            MoveValidator::new(schedule, graph).validate_move(&snapshot, &target.machine_id, target.start);
        if !result.valid {
            info!(
                job_id = %snapshot.id,
                machine_id = %target.machine_id,
                reason = result.message.as_deref().unwrap_or_default(),
                "Move rejected"
            );
            return Ok(MoveEffect::Rejected { result });
        }

        let target_end = target.start + snapshot.duration();
        if let Err(err) =
            schedule.apply_optimistic(&snapshot.id, &target.machine_id, target.start, target_end)
        {
            self.state = MoveState::Dragging { snapshot };
            return Err(err.into());
        }
        schedule.begin_pending(&snapshot.id);

        let pending = PendingMove {
            snapshot,
            target_machine_id: target.machine_id,
            target_start: target.start,
            target_end,
        };
        let prompt = pending.prompt();
        self.state = MoveState::PendingConfirmation { pending };
        Ok(MoveEffect::ConfirmationRequired { prompt })
    }
}
