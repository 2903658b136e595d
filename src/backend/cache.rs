use super::{BackendError, ScheduleBackend, ScheduleSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

struct CachedSnapshot {
    fetched_at: Instant,
    snapshot: Arc<ScheduleSnapshot>,
}

/// A snapshot handed out by [`ScheduleFetcher::fetch`].
#[derive(Debug, Clone)]
pub struct FetchedSnapshot {
    pub snapshot: Arc<ScheduleSnapshot>,
    /// Served from the cache window rather than a new backend call.
    pub cached: bool,
}

/// Shares schedule fetches between callers.
///
/// Callers arriving while a fetch is in flight wait on the same lock and then
/// read its result from the cache instead of issuing their own request. Every
/// network call is bounded by `timeout`.
pub struct ScheduleFetcher {
    backend: Arc<dyn ScheduleBackend>,
    cache_window: Duration,
    timeout: Duration,
    cached: Mutex<Option<CachedSnapshot>>,
}

impl ScheduleFetcher {
    pub fn new(backend: Arc<dyn ScheduleBackend>, cache_window: Duration, timeout: Duration) -> Self {
        Self {
            backend,
            cache_window,
            timeout,
            cached: Mutex::new(None),
        }
    }

    pub async fn fetch(&self, force_fresh: bool) -> Result<FetchedSnapshot, BackendError> {
        let mut cached = self.cached.lock().await;

        if !force_fresh {
            if let Some(entry) = cached.as_ref() {
                if entry.fetched_at.elapsed() < self.cache_window {
                    debug!("Serving schedule from fetch cache");
                    return Ok(FetchedSnapshot {
                        snapshot: Arc::clone(&entry.snapshot),
                        cached: true,
                    });
                }
            }
        }

        let snapshot = match tokio::time::timeout(self.timeout, self.backend.fetch_schedule(force_fresh)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Schedule fetch timed out");
                return Err(BackendError::Timeout(self.timeout));
            }
        };

        let snapshot = Arc::new(snapshot);
        *cached = Some(CachedSnapshot {
            fetched_at: Instant::now(),
            snapshot: Arc::clone(&snapshot),
        });
        Ok(FetchedSnapshot {
            snapshot,
            cached: false,
        })
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
