use crate::graph::DependencyGraph;
use crate::job::{Job, intervals_overlap};
use crate::schedule::Schedule;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveConflict {
    Validation,
    Dependency,
    Capacity,
}

impl MoveConflict {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveConflict::Validation => "validation",
            MoveConflict::Dependency => "dependency",
            MoveConflict::Capacity => "capacity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_type: Option<MoveConflict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            conflict_type: None,
            message: None,
        }
    }

    pub fn rejected(conflict: MoveConflict, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            conflict_type: Some(conflict),
            message: Some(message.into()),
        }
    }
}

/// Parses an RFC 3339 instant or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, ValidationResult> {
    let trimmed = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            ValidationResult::rejected(
                MoveConflict::Validation,
                format!("'{raw}' is not a valid target date"),
            )
        })
}

/// Pre-flight check for relocating one job.
pub struct MoveValidator<'a> {
    schedule: &'a Schedule,
    graph: &'a DependencyGraph,
}

impl<'a> MoveValidator<'a> {
    pub fn new(schedule: &'a Schedule, graph: &'a DependencyGraph) -> Self {
        Self { schedule, graph }
    }

    pub fn validate_move(
        &self,
        job: &Job,
        target_machine_id: &str,
        target_start: DateTime<Utc>,
    ) -> ValidationResult {
        if self.schedule.machine(target_machine_id).is_none() {
            return ValidationResult::rejected(
                MoveConflict::Validation,
                format!("Machine {target_machine_id} does not exist"),
            );
        }

        let Some(target_end) = target_start.checked_add_signed(job.duration()) else {
            return ValidationResult::rejected(
                MoveConflict::Validation,
                format!("Target start {target_start} is out of range"),
            );
        };

        for prerequisite_id in self.graph.prerequisites_of(&job.id) {
            let Some(prerequisite) = self.schedule.job(&prerequisite_id) else {
                debug!(job_id = %job.id, prerequisite = %prerequisite_id, "Prerequisite not loaded");
                continue;
            };
            if prerequisite.end > target_start {
                return ValidationResult::rejected(
                    MoveConflict::Dependency,
                    format!(
                        "Job {} cannot start before prerequisite {} ends on {}",
                        job.id,
                        prerequisite.id,
                        prerequisite.end.format("%Y-%m-%d %H:%M")
                    ),
                );
            }
        }

        let overlaps = self
            .schedule
            .jobs_on_machine(target_machine_id)
            .into_iter()
            .filter(|other| other.id != job.id)
            .filter(|other| intervals_overlap(target_start, target_end, other.start, other.end))
            .count();
        if overlaps > 0 {
            return ValidationResult::rejected(
                MoveConflict::Capacity,
                format!("{overlaps} overlapping job(s) on machine {target_machine_id}"),
            );
        }

        ValidationResult::ok()
    }
}
