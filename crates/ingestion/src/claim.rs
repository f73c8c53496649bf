//! File claims and candidate filtering.
//!
//! A file is processed by at most one worker at a time. Workers take a
//! [`FileClaim`] from the [`ClaimRegistry`] before touching a file; the claim
//! is released exactly once, when it is completed or dropped.

use avi_common::FileReference;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::debug;
use uuid::Uuid;

use crate::context::{LoggingContext, SharedLoggingContext, StatisticsSummary};
use crate::events::FileOutcome;

const MAX_COMPLETED: usize = 100;

/// Time-ordered processing id, e.g. `20190505T102120.123Z-1f3a9c2e`.
pub fn new_processing_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"), &uuid[..8])
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A file seen in an input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub reference: FileReference,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

struct ActiveFile {
    processing_id: String,
    started_at: DateTime<Utc>,
    context: SharedLoggingContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveFileStatus {
    pub processing_id: String,
    pub file: String,
    pub started_at: DateTime<Utc>,
    /// Current position, e.g. `id:taf/file.txt:1(FTFI33 EFPP 020500):2`.
    pub position: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedFile {
    pub processing_id: String,
    pub file: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: Option<FileOutcome>,
    pub destination: Option<PathBuf>,
    pub statistics: Option<StatisticsSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub in_flight: usize,
    pub active: Vec<ActiveFileStatus>,
    pub recent: Vec<CompletedFile>,
    pub total_completed: usize,
}

/// Files currently being processed plus a short history of finished ones.
pub struct ClaimRegistry {
    active: Mutex<HashMap<FileReference, ActiveFile>>,
    completed: Mutex<VecDeque<CompletedFile>>,
    total_completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_completed: usize,
}

impl Default for ClaimRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            completed: Mutex::new(VecDeque::new()),
            total_completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_completed: MAX_COMPLETED,
        }
    }

    /// Claim `reference` under a fresh processing id. `None` when another
    /// worker holds it.
    pub fn claim(self: &Arc<Self>, reference: FileReference) -> Option<FileClaim> {
        let processing_id = new_processing_id();
        let context = SharedLoggingContext::new(LoggingContext::new(processing_id.clone()));
        context.enter_file(Some(reference.clone()));
        let started_at = Utc::now();

        {
            let mut active = lock(&self.active);
            if active.contains_key(&reference) {
                return None;
            }
            active.insert(
                reference.clone(),
                ActiveFile {
                    processing_id: processing_id.clone(),
                    started_at,
                    context: context.clone(),
                },
            );
            self.in_flight.fetch_add(1, Ordering::SeqCst);
        }
        debug!(ctx = %context, "Claimed file");

        Some(FileClaim {
            registry: Arc::clone(self),
            reference,
            processing_id,
            context,
            released: false,
        })
    }

    pub fn is_claimed(&self, reference: &FileReference) -> bool {
        lock(&self.active).contains_key(reference)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn release(&self, reference: &FileReference, result: Option<(FileOutcome, Option<PathBuf>, StatisticsSummary)>) {
        let Some(active) = lock(&self.active).remove(reference) else {
            return;
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let completed_at = Utc::now();
        let (outcome, destination, statistics) = match result {
            Some((outcome, destination, statistics)) => (Some(outcome), destination, Some(statistics)),
            None => (None, None, None),
        };
        let entry = CompletedFile {
            processing_id: active.processing_id,
            file: reference.to_string(),
            started_at: active.started_at,
            completed_at,
            duration_ms: (completed_at - active.started_at).num_milliseconds().max(0) as u64,
            outcome,
            destination,
            statistics,
        };

        let mut completed = lock(&self.completed);
        completed.push_front(entry);
        while completed.len() > self.max_completed {
            completed.pop_back();
        }
        self.total_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn status(&self) -> RegistryStatus {
        let active = lock(&self.active)
            .iter()
            .map(|(reference, file)| ActiveFileStatus {
                processing_id: file.processing_id.clone(),
                file: reference.to_string(),
                started_at: file.started_at,
                position: file.context.to_string(),
            })
            .collect();
        let recent = lock(&self.completed).iter().take(20).cloned().collect();
        RegistryStatus {
            in_flight: self.in_flight(),
            active,
            recent,
            total_completed: self.total_completed.load(Ordering::SeqCst),
        }
    }
}

/// Exclusive right to process one file.
pub struct FileClaim {
    registry: Arc<ClaimRegistry>,
    reference: FileReference,
    processing_id: String,
    context: SharedLoggingContext,
    released: bool,
}

impl FileClaim {
    pub fn reference(&self) -> &FileReference {
        &self.reference
    }

    pub fn processing_id(&self) -> &str {
        &self.processing_id
    }

    pub fn context(&self) -> &SharedLoggingContext {
        &self.context
    }

    /// Release the claim, recording how processing ended.
    pub fn complete(mut self, outcome: FileOutcome, destination: Option<PathBuf>, statistics: StatisticsSummary) {
        self.released = true;
        self.registry
            .release(&self.reference, Some((outcome, destination, statistics)));
    }
}

impl Drop for FileClaim {
    fn drop(&mut self) {
        if !self.released {
            self.registry.release(&self.reference, None);
        }
    }
}

/// Decides whether a listed file should be picked up now.
pub trait FileFilter: Send + Sync {
    fn name(&self) -> &'static str;
    fn accept(&self, candidate: &FileCandidate) -> bool;

    /// Forget state kept for files missing from the latest listing.
    fn retain_listed(&self, _listed: &HashSet<FileReference>) {}
}

/// Skips files another worker is processing.
pub struct ExclusivityFilter {
    registry: Arc<ClaimRegistry>,
}

impl ExclusivityFilter {
    pub fn new(registry: Arc<ClaimRegistry>) -> Self {
        Self { registry }
    }
}

impl FileFilter for ExclusivityFilter {
    fn name(&self) -> &'static str {
        "exclusivity"
    }

    fn accept(&self, candidate: &FileCandidate) -> bool {
        !self.registry.is_claimed(&candidate.reference)
    }
}

/// Skips files that may still be written to.
///
/// A file is stable once its size and modification time are unchanged
/// between two listings, or on first sight when it was last modified at
/// least `settle_time` ago.
pub struct StabilityFilter {
    settle_time: Duration,
    last_seen: Mutex<HashMap<FileReference, (u64, Option<SystemTime>)>>,
}

impl StabilityFilter {
    pub fn new(settle_time: Duration) -> Self {
        Self {
            settle_time,
            last_seen: Mutex::new(HashMap::new()),
        }
    }
}

impl FileFilter for StabilityFilter {
    fn name(&self) -> &'static str {
        "stability"
    }

    fn accept(&self, candidate: &FileCandidate) -> bool {
        let current = (candidate.size, candidate.modified);
        let previous = lock(&self.last_seen).insert(candidate.reference.clone(), current);
        if previous == Some(current) {
            return true;
        }
        let age = candidate
            .modified
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        matches!(age, Some(age) if age >= self.settle_time)
    }

    fn retain_listed(&self, listed: &HashSet<FileReference>) {
        lock(&self.last_seen).retain(|reference, _| listed.contains(reference));
    }
}

/// Skips a file version that has already been picked up.
///
/// Keyed by reference and modification time, so a replaced file with the
/// same name is seen again.
pub struct OnceFilter {
    seen: Mutex<LruCache<(FileReference, Option<SystemTime>), ()>>,
}

impl OnceFilter {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl FileFilter for OnceFilter {
    fn name(&self) -> &'static str {
        "once"
    }

    fn accept(&self, candidate: &FileCandidate) -> bool {
        let key = (candidate.reference.clone(), candidate.modified);
        lock(&self.seen).put(key, ()).is_none()
    }
}

/// Filters applied in order; the first rejection wins.
pub struct FileFilterChain {
    filters: Vec<Box<dyn FileFilter>>,
}

impl FileFilterChain {
    pub fn new(filters: Vec<Box<dyn FileFilter>>) -> Self {
        Self { filters }
    }

    /// Exclusivity, then stability, then once-only.
    pub fn standard(registry: Arc<ClaimRegistry>, settle_time: Duration, once_capacity: usize) -> Self {
        Self::new(vec![
            Box::new(ExclusivityFilter::new(registry)),
            Box::new(StabilityFilter::new(settle_time)),
            Box::new(OnceFilter::new(once_capacity)),
        ])
    }

    pub fn accept(&self, candidate: &FileCandidate) -> bool {
        for filter in &self.filters {
            if !filter.accept(candidate) {
                debug!(file = %candidate.reference, filter = filter.name(), "File skipped");
                return false;
            }
        }
        true
    }

    pub fn retain_listed(&self, listed: &HashSet<FileReference>) {
        for filter in &self.filters {
            filter.retain_listed(listed);
        }
    }
}
