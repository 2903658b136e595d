use super::{BackendError, CommitRequest, ScheduleBackend, ScheduleSnapshot};
use crate::graph::DependencyEdge;
use crate::job::{Job, Machine, MaterialRequirement};
use crate::job_validation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// On-disk layout: machines, jobs and dependency edges in one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDocument {
    #[serde(default)]
    pub machines: Vec<Machine>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEdge>,
}

impl ScheduleDocument {
    pub fn load<P: AsRef<Path>>(path: P) -> PersistenceResult<Self> {
        let file = File::open(path)?;
        let document: ScheduleDocument = serde_json::from_reader(file)?;
        job_validation::validate_job_collection(&document.jobs, &document.machines)
            .map_err(|err| PersistenceError::InvalidData(err.to_string()))?;
        Ok(document)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> PersistenceResult<()> {
        job_validation::validate_job_collection(&self.jobs, &self.machines)
            .map_err(|err| PersistenceError::InvalidData(err.to_string()))?;
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Backend that reads and writes a [`ScheduleDocument`] on disk.
pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<ScheduleDocument, BackendError> {
        ScheduleDocument::load(&self.path).map_err(persistence_to_backend)
    }
}

fn persistence_to_backend(err: PersistenceError) -> BackendError {
    match err {
        PersistenceError::Io(err) => BackendError::Transport(err.to_string()),
        other => BackendError::Decode(other.to_string()),
    }
}

#[async_trait]
impl ScheduleBackend for FileBackend {
    async fn fetch_schedule(&self, _force_fresh: bool) -> Result<ScheduleSnapshot, BackendError> {
        let document = self.read()?;
        Ok(ScheduleSnapshot {
            machines: document.machines,
            jobs: document.jobs,
        })
    }

    async fn fetch_dependencies(&self) -> Result<Vec<DependencyEdge>, BackendError> {
        Ok(self.read()?.dependencies)
    }

    async fn commit_move(&self, request: &CommitRequest) -> Result<(), BackendError> {
        let _guard = self.write_lock.lock();
        let mut document = self.read()?;
        if !document.machines.iter().any(|m| m.id == request.machine_id) {
            return Err(BackendError::client(
                400,
                &format!(r#"{{"message": "machine {} does not exist"}}"#, request.machine_id),
            ));
        }
        let Some(job) = document.jobs.iter_mut().find(|j| j.id == request.job_id) else {
            return Err(BackendError::client(
                404,
                &format!(r#"{{"message": "job {} not found"}}"#, request.job_id),
            ));
        };
        job.machine_id = request.machine_id.clone();
        job.start = request.start;
        job.end = request.end;
        document.save(&self.path).map_err(persistence_to_backend)?;
        info!(job_id = %request.job_id, path = %self.path.display(), "Move written to schedule file");
        Ok(())
    }
}

#[derive(Default, Serialize, Deserialize)]
struct JobCsvRecord {
    id: String,
    name: String,
    machine_id: String,
    start: String,
    end: String,
    prerequisites: String,
    #[serde(default)]
    materials: String,
}

impl From<&Job> for JobCsvRecord {
    fn from(job: &Job) -> Self {
        JobCsvRecord {
            id: job.id.clone(),
            name: job.name.clone(),
            machine_id: job.machine_id.clone(),
            start: job.start.to_rfc3339(),
            end: job.end.to_rfc3339(),
            prerequisites: job.prerequisites.join(";"),
            materials: serde_json::to_string(&job.materials).unwrap_or_else(|_| "[]".to_string()),
        }
    }
}

impl JobCsvRecord {
    fn into_job(self) -> PersistenceResult<Job> {
        let start = parse_instant(&self.start)?;
        let end = parse_instant(&self.end)?;
        let mut job = Job::new(self.id, self.machine_id, start, end);
        if !self.name.trim().is_empty() {
            job.name = self.name;
        }
        job.prerequisites = split_ids(&self.prerequisites);
        job.materials = if self.materials.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str::<Vec<MaterialRequirement>>(&self.materials).map_err(|err| {
                PersistenceError::InvalidData(format!("invalid materials for job {}: {err}", job.id))
            })?
        };
        Ok(job)
    }
}

pub fn save_jobs_to_csv<'a, P, I>(jobs: I, path: P) -> PersistenceResult<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a Job>,
{
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for job in jobs {
        job_validation::validate_job(job)
            .map_err(|err| PersistenceError::InvalidData(err.to_string()))?;
        writer.serialize(JobCsvRecord::from(job))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_jobs_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<Vec<Job>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut jobs = Vec::new();
    for record in reader.deserialize::<JobCsvRecord>() {
        jobs.push(record?.into_job()?);
    }
    if jobs.is_empty() {
        return Err(PersistenceError::InvalidData("CSV file contained no jobs".into()));
    }
    job_validation::validate_job_collection(&jobs, &[])
        .map_err(|err| PersistenceError::InvalidData(err.to_string()))?;
    Ok(jobs)
}

fn parse_instant(input: &str) -> PersistenceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|e| PersistenceError::InvalidData(format!("invalid instant '{input}': {e}")))
}

fn split_ids(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    input
        .split(';')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}
