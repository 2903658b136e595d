pub mod backend;
pub mod calculations;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod graph;
#[cfg(feature = "http_api")]
pub mod http_api;
pub mod job;
pub(crate) mod job_validation;
pub mod schedule;
pub mod telemetry;

pub use backend::{
    BackendError, CommitRequest, FileBackend, InMemoryBackend, ScheduleBackend, ScheduleDocument,
    FetchedSnapshot, ScheduleFetcher, ScheduleSnapshot, build_backend, normalize_error_message,
};
#[cfg(feature = "remote")]
pub use backend::HttpBackend;
pub use calculations::conflicts::{ConflictAssessment, ConflictReport, detect_conflicts};
pub use calculations::move_validation::{
    MoveConflict, MoveValidator, ValidationResult, parse_instant,
};
pub use config::{Config, ConfigError};
pub use coordinator::{
    ConfirmationPrompt, MoveCoordinator, MoveEffect, MoveError, MoveEvent, MoveNotification,
    MoveState, MoveTarget, PendingMove,
};
pub use dashboard::{BoardState, Dashboard, DashboardError, ScheduleEvent};
pub use graph::{DependencyEdge, DependencyError, DependencyGraph, MIN_GAP_HOURS};
pub use job::{ConflictDetail, ConflictKind, Job, Machine, MaterialRequirement, MaterialStatus};
pub use job_validation::JobValidationError;
pub use schedule::{
    ConfirmedUpdate, LoadOutcome, LoadSummary, ReconcileSummary, Schedule, ScheduleError,
};
