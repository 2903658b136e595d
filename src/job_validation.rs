use crate::job::{Job, Machine};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct JobValidationError {
    message: String,
}

impl JobValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn validate_job(job: &Job) -> Result<(), JobValidationError> {
    if job.id.trim().is_empty() {
        return Err(JobValidationError::new("job requires a non-empty id"));
    }

    if job.machine_id.trim().is_empty() {
        return Err(JobValidationError::new(format!(
            "job {} requires a non-empty machine_id",
            job.id
        )));
    }

    if job.end < job.start {
        return Err(JobValidationError::new(format!(
            "job {} ends at {} before it starts at {}",
            job.id, job.end, job.start
        )));
    }

    if job.prerequisites.iter().any(|p| p == &job.id) {
        return Err(JobValidationError::new(format!(
            "job {} lists itself as a prerequisite",
            job.id
        )));
    }

    for (idx, material) in job.materials.iter().enumerate() {
        if material.name.trim().is_empty() {
            return Err(JobValidationError::new(format!(
                "job {} material #{} requires a non-empty name",
                job.id, idx
            )));
        }
        if !material.required_quantity.is_finite() || material.required_quantity < 0.0 {
            return Err(JobValidationError::new(format!(
                "job {} material '{}' has invalid required_quantity {}",
                job.id, material.name, material.required_quantity
            )));
        }
        if !material.available_quantity.is_finite() || material.available_quantity < 0.0 {
            return Err(JobValidationError::new(format!(
                "job {} material '{}' has invalid available_quantity {}",
                job.id, material.name, material.available_quantity
            )));
        }
    }

    Ok(())
}

pub fn validate_machine(machine: &Machine) -> Result<(), JobValidationError> {
    if machine.id.trim().is_empty() {
        return Err(JobValidationError::new("machine requires a non-empty id"));
    }
    if !machine.capacity.is_finite() || machine.capacity < 0.0 {
        return Err(JobValidationError::new(format!(
            "machine {} has invalid capacity {}",
            machine.id, machine.capacity
        )));
    }
    Ok(())
}

pub fn validate_job_collection(jobs: &[Job], machines: &[Machine]) -> Result<(), JobValidationError> {
    let mut machine_ids = HashSet::with_capacity(machines.len());
    for machine in machines {
        validate_machine(machine)?;
        if !machine_ids.insert(machine.id.as_str()) {
            return Err(JobValidationError::new(format!(
                "duplicate machine id {}",
                machine.id
            )));
        }
    }

    let mut seen_ids = HashSet::with_capacity(jobs.len());
    for job in jobs {
        if !seen_ids.insert(job.id.as_str()) {
            return Err(JobValidationError::new(format!("duplicate job id {}", job.id)));
        }
        validate_job(job)?;
    }
    Ok(())
}
