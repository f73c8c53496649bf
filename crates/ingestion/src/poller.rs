//! Periodic listing of a product's input directory.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::claim::{ClaimRegistry, FileCandidate, FileFilterChain};
use crate::error::Result;
use crate::processor::{FileProcessor, ProcessingReport};
use crate::product::AviationProduct;

/// Lists one input directory and hands new files to workers.
pub struct DirectoryPoller {
    product: Arc<AviationProduct>,
    filters: FileFilterChain,
    registry: Arc<ClaimRegistry>,
    processor: Arc<FileProcessor>,
    workers: Arc<Semaphore>,
    poll_interval: Duration,
}

impl DirectoryPoller {
    pub fn new(
        product: Arc<AviationProduct>,
        filters: FileFilterChain,
        registry: Arc<ClaimRegistry>,
        processor: Arc<FileProcessor>,
        workers: Arc<Semaphore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            product,
            filters,
            registry,
            processor,
            workers,
            poll_interval,
        }
    }

    pub fn product(&self) -> &AviationProduct {
        &self.product
    }

    /// Regular files in the input directory, sorted by name.
    pub async fn list_candidates(&self) -> Result<Vec<FileCandidate>> {
        let mut entries = tokio::fs::read_dir(&self.product.input_dir).await?;
        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let filename = entry.file_name().to_string_lossy().into_owned();
            candidates.push(FileCandidate {
                reference: self.product.file_reference(filename),
                path: entry.path(),
                size: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }
        candidates.sort_by(|a, b| a.reference.filename().cmp(b.reference.filename()));
        Ok(candidates)
    }

    /// One listing pass. Spawns a worker per accepted file and returns their
    /// handles; stops early once shutdown is signalled.
    pub async fn poll_once(&self, shutdown: &watch::Receiver<bool>) -> Result<Vec<JoinHandle<ProcessingReport>>> {
        let mut handles = Vec::new();
        let candidates = self.list_candidates().await?;
        let listed: HashSet<_> = candidates.iter().map(|c| c.reference.clone()).collect();
        self.filters.retain_listed(&listed);
        for candidate in candidates {
            if *shutdown.borrow() {
                debug!(product = %self.product.id, "Shutdown signalled, not picking up more files");
                break;
            }
            if !self.filters.accept(&candidate) {
                continue;
            }
            let Some(claim) = self.registry.claim(candidate.reference.clone()) else {
                continue;
            };
            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };

            let processor = self.processor.clone();
            let product = self.product.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                processor.process(claim, &product, &candidate).await
            }));
        }
        Ok(handles)
    }

    /// Poll until shutdown. Workers keep running after the loop ends; the
    /// shutdown coordinator waits for them through the claim registry.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            product = %self.product.id,
            input_dir = %self.product.input_dir.display(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Starting directory poller"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    match self.poll_once(&shutdown).await {
                        Ok(handles) if !handles.is_empty() => {
                            debug!(product = %self.product.id, files = handles.len(), "Dispatched files");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(product = %self.product.id, error = %e, "Failed to list input directory"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(product = %self.product.id, "Directory poller stopped");
    }
}
