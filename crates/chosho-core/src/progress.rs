//! Per-job progress tracking for long-running batches.
//!
//! Each batch publishes into its own slot keyed by [`JobId`], so concurrent
//! uploads never overwrite each other's counters. Pollers that do not know
//! their job id can still read the most recently started job.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Finished jobs stay visible this long before being pruned.
pub const DEFAULT_FINISHED_TTL: Duration = Duration::from_secs(10 * 60);

/// Identifier under which a batch publishes its progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// A random 16 hex digit id.
    pub fn generate() -> Self {
        Self(format!("{:016x}", fastrand::u64(..)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress events emitted while a batch is processed.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    FileStarted {
        /// 0-based position in the batch.
        file_index: usize,
        total: usize,
        filename: String,
    },
    /// The current file was rasterized into `total` pages.
    PagesCounted { total: usize },
    PageStarted {
        /// 1-based page number.
        page: usize,
        total: usize,
    },
    FileSkipped { filename: String },
    PageFailed { page: usize, message: String },
}

/// What a poller sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub current_file: usize,
    pub total_files: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub filename: String,
    pub finished: bool,
}

impl ProgressSnapshot {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::FileStarted {
                file_index,
                total,
                filename,
            } => {
                self.current_file = file_index + 1;
                self.total_files = *total;
                self.filename = filename.clone();
                self.current_page = 0;
                self.total_pages = 0;
            }
            ProgressEvent::PagesCounted { total } => {
                self.total_pages = *total;
            }
            ProgressEvent::PageStarted { page, total } => {
                self.current_page = *page;
                self.total_pages = *total;
            }
            ProgressEvent::FileSkipped { .. } | ProgressEvent::PageFailed { .. } => {}
        }
    }
}

struct Entry {
    /// Distinguishes reuses of the same job id.
    generation: u64,
    snapshot: ProgressSnapshot,
    finished_at: Option<Instant>,
}

/// Shared map of job id to progress snapshot.
pub struct ProgressRegistry {
    jobs: DashMap<JobId, Entry>,
    latest: ArcSwapOption<JobId>,
    next_generation: AtomicU64,
    finished_ttl: Duration,
}

impl std::fmt::Debug for ProgressRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressRegistry")
            .field("jobs", &self.jobs.len())
            .field("finished_ttl", &self.finished_ttl)
            .finish()
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FINISHED_TTL)
    }
}

impl ProgressRegistry {
    pub fn new(finished_ttl: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            latest: ArcSwapOption::empty(),
            next_generation: AtomicU64::new(0),
            finished_ttl,
        }
    }

    /// Register a job and return the handle the batch reports through.
    ///
    /// Reusing an id replaces the previous entry. Handles from the earlier
    /// registration stop affecting the slot.
    pub fn start(self: &Arc<Self>, job_id: JobId, total_files: usize) -> ProgressHandle {
        self.prune();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let replaced = self.jobs.insert(
            job_id.clone(),
            Entry {
                generation,
                snapshot: ProgressSnapshot::new(total_files),
                finished_at: None,
            },
        );
        if replaced.is_some_and(|old| old.finished_at.is_none()) {
            tracing::warn!(job_id = %job_id, "job id reused while still running");
        }
        self.latest.store(Some(Arc::new(job_id.clone())));
        ProgressHandle {
            registry: Arc::clone(self),
            job_id,
            generation,
        }
    }

    pub fn snapshot(&self, job_id: &JobId) -> Option<ProgressSnapshot> {
        self.jobs.get(job_id).map(|e| e.snapshot.clone())
    }

    /// The most recently started job that is still registered.
    pub fn latest(&self) -> Option<(JobId, ProgressSnapshot)> {
        let id = self.latest.load_full()?;
        let snapshot = self.snapshot(&id)?;
        Some((JobId::clone(&id), snapshot))
    }

    /// Drop finished jobs older than the TTL.
    pub fn prune(&self) {
        let ttl = self.finished_ttl;
        self.jobs
            .retain(|_, entry| entry.finished_at.is_none_or(|at| at.elapsed() < ttl));
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Write side of one job's slot. Dropping it marks the job finished.
pub struct ProgressHandle {
    registry: Arc<ProgressRegistry>,
    job_id: JobId,
    generation: u64,
}

impl std::fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressHandle")
            .field("job_id", &self.job_id)
            .finish()
    }
}

impl ProgressHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    fn with_entry(&self, f: impl FnOnce(&mut Entry)) {
        if let Some(mut entry) = self.registry.jobs.get_mut(&self.job_id) {
            if entry.generation == self.generation {
                f(&mut entry);
            }
        }
    }

    pub fn apply(&self, event: &ProgressEvent) {
        self.with_entry(|entry| entry.snapshot.apply(event));
    }

    /// Mark the job finished; it is pruned once the TTL elapses.
    pub fn finish(&self) {
        self.with_entry(|entry| {
            entry.snapshot.finished = true;
            if entry.finished_at.is_none() {
                entry.finished_at = Some(Instant::now());
            }
        });
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.finish();
    }
}
