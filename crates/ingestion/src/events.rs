//! Notification of file processing outcomes.

use avi_common::FileReference;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::context::StatisticsSummary;

/// Where a processed file ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileOutcome {
    Archived,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileProcessedEvent {
    pub processing_id: String,
    pub file: FileReference,
    pub outcome: FileOutcome,
    /// Final location, absent when the move itself failed.
    pub destination: Option<PathBuf>,
    pub statistics: StatisticsSummary,
}

/// Fire-and-forget publisher. Implementations must not block or fail the
/// pipeline.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &FileProcessedEvent);
}

/// Publishes events as log records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: &FileProcessedEvent) {
        let destination = event
            .destination
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match event.outcome {
            FileOutcome::Archived => info!(
                processing_id = %event.processing_id,
                file = %event.file,
                destination = %destination,
                messages = event.statistics.message_total,
                "File archived"
            ),
            FileOutcome::Failed => warn!(
                processing_id = %event.processing_id,
                file = %event.file,
                destination = %destination,
                result = %event.statistics.file,
                "File failed"
            ),
        }
    }
}
