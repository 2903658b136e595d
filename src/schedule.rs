use crate::calculations::conflicts::{ConflictReport, detect_conflicts};
use crate::job::{ConflictKind, Job, Machine, intervals_overlap};
use crate::job_validation::{self, JobValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_CONFIRMED_UPDATES: usize = 256;
pub const DEFAULT_STALE_OVERRIDE_WARNING: u32 = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("job {0} not found")]
    UnknownJob(String),
    #[error("invalid schedule data: {0}")]
    InvalidData(#[from] JobValidationError),
}

/// A move the backend accepted but a fetch has not yet echoed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedUpdate {
    pub job_id: String,
    pub machine_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub sequence: u64,
    pub mismatched_fetches: u32,
}

impl ConfirmedUpdate {
    /// Backends round timestamps and shift timezones, so the start is compared by day.
    pub fn matches(&self, job: &Job) -> bool {
        self.machine_id == job.machine_id && self.start.date_naive() == job.start.date_naive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub synced: Vec<String>,
    pub overridden: Vec<String>,
}

impl ReconcileSummary {
    pub fn is_empty(&self) -> bool {
        self.synced.is_empty() && self.overridden.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub job_count: usize,
    pub machine_count: usize,
    pub reconcile: ReconcileSummary,
    pub conflicts: ConflictReport,
}

impl LoadSummary {
    pub fn to_cli_summary(&self) -> String {
        let mut parts = vec![
            format!("machines={}", self.machine_count),
            self.conflicts.to_cli_summary(),
        ];
        if !self.reconcile.synced.is_empty() {
            parts.push(format!("synced={}", self.reconcile.synced.join(",")));
        }
        if !self.reconcile.overridden.is_empty() {
            parts.push(format!("catching_up={}", self.reconcile.overridden.join(",")));
        }
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Applied(LoadSummary),
    /// A move is awaiting confirmation; the fetched data was dropped.
    Deferred { pending_job: String },
}

pub struct Schedule {
    jobs: BTreeMap<String, Job>,
    machines: Vec<Machine>,
    confirmed: HashMap<String, ConfirmedUpdate>,
    next_sequence: u64,
    max_confirmed_updates: usize,
    stale_override_warning: u32,
    pending_job: Option<String>,
    conflicts: ConflictReport,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_CONFIRMED_UPDATES, DEFAULT_STALE_OVERRIDE_WARNING)
    }

    pub fn with_limits(max_confirmed_updates: usize, stale_override_warning: u32) -> Self {
        Self {
            jobs: BTreeMap::new(),
            machines: Vec::new(),
            confirmed: HashMap::new(),
            next_sequence: 0,
            max_confirmed_updates: max_confirmed_updates.max(1),
            stale_override_warning,
            pending_job: None,
            conflicts: ConflictReport::default(),
        }
    }

    pub fn with_data(jobs: Vec<Job>, machines: Vec<Machine>) -> Result<Self, ScheduleError> {
        let mut schedule = Self::new();
        schedule.load(jobs, machines)?;
        Ok(schedule)
    }

    /// Replaces jobs and machines with an authoritative snapshot.
    pub fn load(
        &mut self,
        jobs: Vec<Job>,
        machines: Vec<Machine>,
    ) -> Result<LoadOutcome, ScheduleError> {
        self.load_snapshot(jobs, machines, true)
    }

    /// Like [`Schedule::load`] for a snapshot that was already seen, e.g. one
    /// served from the fetch cache. Stale overrides are not counted again.
    pub fn reapply(
        &mut self,
        jobs: Vec<Job>,
        machines: Vec<Machine>,
    ) -> Result<LoadOutcome, ScheduleError> {
        self.load_snapshot(jobs, machines, false)
    }

    fn load_snapshot(
        &mut self,
        jobs: Vec<Job>,
        machines: Vec<Machine>,
        fresh: bool,
    ) -> Result<LoadOutcome, ScheduleError> {
        if let Some(pending_job) = &self.pending_job {
            info!(pending_job = %pending_job, "Deferring schedule load while a move is pending");
            return Ok(LoadOutcome::Deferred {
                pending_job: pending_job.clone(),
            });
        }

        job_validation::validate_job_collection(&jobs, &machines)?;

        let (mut jobs, reconcile) = self.merge_confirmed(jobs, fresh);
        let conflicts = detect_conflicts(&jobs);
        for job in &mut jobs {
            match conflicts.get(&job.id) {
                Some(assessment) => {
                    job.conflict = assessment.kind;
                    job.conflict_detail = assessment.detail.clone();
                }
                None => {
                    job.conflict = ConflictKind::None;
                    job.conflict_detail = None;
                }
            }
        }

        self.jobs = jobs.into_iter().map(|job| (job.id.clone(), job)).collect();
        self.machines = machines;
        self.conflicts = conflicts.clone();

        let summary = LoadSummary {
            job_count: self.jobs.len(),
            machine_count: self.machines.len(),
            reconcile,
            conflicts,
        };
        info!(
            jobs = summary.job_count,
            machines = summary.machine_count,
            capacity_conflicts = summary.conflicts.count(ConflictKind::Capacity),
            material_conflicts = summary.conflicts.count(ConflictKind::Material),
            "Schedule loaded"
        );
        Ok(LoadOutcome::Applied(summary))
    }

    /// Merges fetched jobs with moves the backend confirmed but has not echoed yet.
    pub fn reconcile(&mut self, fresh_jobs: Vec<Job>) -> (Vec<Job>, ReconcileSummary) {
        self.merge_confirmed(fresh_jobs, true)
    }

    fn merge_confirmed(
        &mut self,
        fresh_jobs: Vec<Job>,
        count_mismatches: bool,
    ) -> (Vec<Job>, ReconcileSummary) {
        let mut summary = ReconcileSummary::default();
        let mut jobs = Vec::with_capacity(fresh_jobs.len());

        for mut job in fresh_jobs {
            let Some(update) = self.confirmed.get_mut(&job.id) else {
                jobs.push(job);
                continue;
            };

            if update.matches(&job) {
                debug!(job_id = %job.id, "Confirmed move echoed by backend");
                self.confirmed.remove(&job.id);
                summary.synced.push(job.id.clone());
            } else {
                if count_mismatches {
                    update.mismatched_fetches += 1;
                }
                if count_mismatches && update.mismatched_fetches >= self.stale_override_warning {
                    warn!(
                        job_id = %job.id,
                        fetches = update.mismatched_fetches,
                        "Backend still has not reflected a confirmed move"
                    );
                }
                job.place(&update.machine_id, update.start, update.end);
                summary.overridden.push(job.id.clone());
            }
            jobs.push(job);
        }

        (jobs, summary)
    }

    /// Moves a job locally ahead of backend confirmation.
    pub fn apply_optimistic(
        &mut self,
        job_id: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ScheduleError::UnknownJob(job_id.to_string()))?;
        job.place(machine_id, start, end);
        debug!(job_id, machine_id, %start, "Applied optimistic move");
        Ok(())
    }

    pub fn commit(
        &mut self,
        job_id: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        if !self.jobs.contains_key(job_id) {
            return Err(ScheduleError::UnknownJob(job_id.to_string()));
        }
        self.record_confirmed(job_id, machine_id, start, end);
        self.apply_optimistic(job_id, machine_id, start, end)
    }

    /// Restores a job to its pre-move snapshot and forgets any confirmed move for it.
    pub fn rollback(&mut self, job_id: &str, snapshot: &Job) {
        if self.confirmed.remove(job_id).is_some() {
            debug!(job_id, "Dropped confirmed update on rollback");
        }
        self.jobs.insert(job_id.to_string(), snapshot.clone());
        info!(job_id, machine_id = %snapshot.machine_id, "Rolled back move");
    }

    /// Undoes an optimistic move that never reached the backend.
    pub fn revert(&mut self, snapshot: &Job) {
        self.jobs.insert(snapshot.id.clone(), snapshot.clone());
    }

    pub fn begin_pending(&mut self, job_id: &str) {
        self.pending_job = Some(job_id.to_string());
    }

    pub fn end_pending(&mut self) {
        self.pending_job = None;
    }

    pub fn pending_job(&self) -> Option<&str> {
        self.pending_job.as_deref()
    }

    pub fn job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn jobs_on_machine(&self, machine_id: &str) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self
            .jobs
            .values()
            .filter(|job| job.machine_id == machine_id)
            .collect();
        jobs.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn machine(&self, machine_id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == machine_id)
    }

    pub fn conflict_of(&self, job_id: &str) -> Option<ConflictKind> {
        self.jobs.get(job_id).map(|job| job.conflict)
    }

    pub fn conflicts(&self) -> &ConflictReport {
        &self.conflicts
    }

    pub fn confirmed_update(&self, job_id: &str) -> Option<&ConfirmedUpdate> {
        self.confirmed.get(job_id)
    }

    pub fn confirmed_update_count(&self) -> usize {
        self.confirmed.len()
    }

    /// Booked share of a machine's capacity inside a window, as a percentage.
    pub fn machine_load(
        &self,
        machine_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Option<f64> {
        let machine = self.machine(machine_id)?;
        if window_end <= window_start || machine.capacity <= 0.0 {
            return None;
        }
        let booked_seconds: i64 = self
            .jobs_on_machine(machine_id)
            .into_iter()
            .filter(|job| intervals_overlap(job.start, job.end, window_start, window_end))
            .map(|job| (job.end.min(window_end) - job.start.max(window_start)).num_seconds())
            .sum();
        let window_seconds = (window_end - window_start).num_seconds();
        if window_seconds == 0 {
            return None;
        }
        Some(booked_seconds as f64 / (window_seconds as f64 * machine.capacity) * 100.0)
    }

    fn record_confirmed(
        &mut self,
        job_id: &str,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) {
        if !self.confirmed.contains_key(job_id) && self.confirmed.len() >= self.max_confirmed_updates
        {
            let oldest = self
                .confirmed
                .values()
                .min_by_key(|update| update.sequence)
                .map(|update| update.job_id.clone());
            if let Some(oldest) = oldest {
                warn!(job_id = %oldest, "Evicting oldest confirmed update");
                self.confirmed.remove(&oldest);
            }
        }

        self.next_sequence += 1;
        self.confirmed.insert(
            job_id.to_string(),
            ConfirmedUpdate {
                job_id: job_id.to_string(),
                machine_id: machine_id.to_string(),
                start,
                end,
                sequence: self.next_sequence,
                mismatched_fetches: 0,
            },
        );
    }
}
