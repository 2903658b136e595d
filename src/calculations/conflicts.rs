use crate::job::{ConflictDetail, ConflictKind, Job, intervals_overlap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const CAPACITY_RECOMMENDATION: &str =
    "Reschedule one of the overlapping jobs to a free slot or another machine";
pub const MATERIAL_RECOMMENDATION: &str =
    "Expedite procurement or swap in a job whose materials are in stock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictAssessment {
    pub job_id: String,
    pub kind: ConflictKind,
    pub overlap_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ConflictDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub assessments: BTreeMap<String, ConflictAssessment>,
}

impl ConflictReport {
    pub fn get(&self, job_id: &str) -> Option<&ConflictAssessment> {
        self.assessments.get(job_id)
    }

    pub fn kind_of(&self, job_id: &str) -> ConflictKind {
        self.get(job_id).map(|a| a.kind).unwrap_or_default()
    }

    pub fn count(&self, kind: ConflictKind) -> usize {
        self.assessments.values().filter(|a| a.kind == kind).count()
    }

    pub fn conflicted(&self) -> impl Iterator<Item = &ConflictAssessment> {
        self.assessments.values().filter(|a| a.kind.is_conflict())
    }

    pub fn to_cli_summary(&self) -> String {
        let mut parts = Vec::new();
        parts.push(format!("jobs={}", self.assessments.len()));
        parts.push(format!("capacity={}", self.count(ConflictKind::Capacity)));
        parts.push(format!("material={}", self.count(ConflictKind::Material)));
        let flagged = self
            .conflicted()
            .map(|a| format!("{}:{}", a.job_id, a.kind.as_str()))
            .collect::<Vec<_>>();
        if !flagged.is_empty() {
            parts.push(format!("flagged={}", flagged.join(",")));
        }
        parts.join(", ")
    }
}

/// Classifies every job: capacity overlaps win over material shortages.
pub fn detect_conflicts(jobs: &[Job]) -> ConflictReport {
    let overlaps = overlap_counts(jobs);
    let mut assessments = BTreeMap::new();

    for job in jobs {
        let overlap_count = overlaps.get(job.id.as_str()).copied().unwrap_or(0);
        let (kind, detail) = if overlap_count > 0 {
            (
                ConflictKind::Capacity,
                Some(ConflictDetail {
                    reason: format!(
                        "Overlaps with {} other job(s) on machine {}",
                        overlap_count, job.machine_id
                    ),
                    recommendation: CAPACITY_RECOMMENDATION.to_string(),
                }),
            )
        } else {
            let blocking: Vec<&str> = job.blocking_materials().map(|m| m.name.as_str()).collect();
            if blocking.is_empty() {
                (ConflictKind::None, None)
            } else {
                (
                    ConflictKind::Material,
                    Some(ConflictDetail {
                        reason: format!("Materials short: {}", blocking.join(", ")),
                        recommendation: MATERIAL_RECOMMENDATION.to_string(),
                    }),
                )
            }
        };

        assessments.insert(
            job.id.clone(),
            ConflictAssessment {
                job_id: job.id.clone(),
                kind,
                overlap_count,
                detail,
            },
        );
    }

    ConflictReport { assessments }
}

/// Number of other jobs each job overlaps on its machine.
///
/// Jobs are grouped per machine, sorted by start and swept once; the inner loop
/// stops as soon as a later job starts at or after the current job's end.
pub fn overlap_counts(jobs: &[Job]) -> HashMap<&str, usize> {
    let mut per_machine: HashMap<&str, Vec<&Job>> = HashMap::new();
    for job in jobs {
        per_machine.entry(job.machine_id.as_str()).or_default().push(job);
    }

    let mut counts: HashMap<&str, usize> = HashMap::with_capacity(jobs.len());
    for machine_jobs in per_machine.values_mut() {
        machine_jobs.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        for (i, &current) in machine_jobs.iter().enumerate() {
            for &later in &machine_jobs[i + 1..] {
                if later.start >= current.end {
                    break;
                }
                if intervals_overlap(current.start, current.end, later.start, later.end) {
                    *counts.entry(current.id.as_str()).or_default() += 1;
                    *counts.entry(later.id.as_str()).or_default() += 1;
                }
            }
        }
    }
    counts
}
