use super::{BackendError, CommitRequest, ScheduleBackend, ScheduleSnapshot};
use crate::graph::DependencyEdge;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct MemoryState {
    snapshot: ScheduleSnapshot,
    dependencies: Vec<DependencyEdge>,
    commit_failures: VecDeque<BackendError>,
    fetch_delay: Option<Duration>,
    echo_commits: bool,
    commits: Vec<CommitRequest>,
}

/// In-process backend used by the demo server and the test suite.
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    fetch_count: AtomicUsize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(ScheduleSnapshot::default(), Vec::new())
    }
}

impl InMemoryBackend {
    pub fn new(snapshot: ScheduleSnapshot, dependencies: Vec<DependencyEdge>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                snapshot,
                dependencies,
                commit_failures: VecDeque::new(),
                fetch_delay: None,
                echo_commits: true,
                commits: Vec::new(),
            }),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// The next commit fails with `error` instead of being applied.
    pub fn fail_next_commit(&self, error: BackendError) {
        self.state.lock().commit_failures.push_back(error);
    }

    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state.lock().fetch_delay = delay;
    }

    /// When disabled, commits succeed but fetches keep reporting the old placement.
    pub fn set_echo_commits(&self, echo: bool) {
        self.state.lock().echo_commits = echo;
    }

    pub fn replace_snapshot(&self, snapshot: ScheduleSnapshot) {
        self.state.lock().snapshot = snapshot;
    }

    pub fn snapshot(&self) -> ScheduleSnapshot {
        self.state.lock().snapshot.clone()
    }

    pub fn commits(&self) -> Vec<CommitRequest> {
        self.state.lock().commits.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScheduleBackend for InMemoryBackend {
    async fn fetch_schedule(&self, _force_fresh: bool) -> Result<ScheduleSnapshot, BackendError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let (snapshot, delay) = {
            let state = self.state.lock();
            (state.snapshot.clone(), state.fetch_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn fetch_dependencies(&self) -> Result<Vec<DependencyEdge>, BackendError> {
        Ok(self.state.lock().dependencies.clone())
    }

    async fn commit_move(&self, request: &CommitRequest) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if let Some(error) = state.commit_failures.pop_front() {
            return Err(error);
        }
        if !state.snapshot.machines.iter().any(|m| m.id == request.machine_id) {
            return Err(BackendError::client(
                400,
                &format!(r#"{{"message": "machine {} does not exist"}}"#, request.machine_id),
            ));
        }
        let echo = state.echo_commits;
        let Some(job) = state.snapshot.jobs.iter_mut().find(|j| j.id == request.job_id) else {
            return Err(BackendError::client(
                404,
                &format!(r#"{{"message": "job {} not found"}}"#, request.job_id),
            ));
        };
        if echo {
            job.machine_id = request.machine_id.clone();
            job.start = request.start;
            job.end = request.end;
        }
        state.commits.push(request.clone());
        Ok(())
    }
}
