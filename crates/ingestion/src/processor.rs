//! Processing of a single claimed file, from reading to routing.

use avi_common::{FileMetadata, FileReference};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::claim::{FileCandidate, FileClaim};
use crate::context::{SharedLoggingContext, StatisticsResult, StatisticsSummary};
use crate::decoder::MessageDecoder;
use crate::error::{IngestionError, Result};
use crate::events::{EventPublisher, FileOutcome, FileProcessedEvent};
use crate::persistence::Persistence;
use crate::population::MessagePopulationService;
use crate::product::{AviationProduct, RouteDestination};
use crate::retry::{retry, RetryPolicy};
use crate::router::FileRouter;

/// Summary of one processed file.
#[derive(Debug, Clone)]
pub struct ProcessingReport {
    pub processing_id: String,
    pub file: FileReference,
    /// Worst result across the file, its bulletins and messages.
    pub result: StatisticsResult,
    pub outcome: FileOutcome,
    pub destination: Option<PathBuf>,
    pub statistics: StatisticsSummary,
}

/// Reads, decodes, populates, persists and routes one file.
pub struct FileProcessor {
    decoder: Arc<dyn MessageDecoder>,
    population: MessagePopulationService,
    persistence: Arc<dyn Persistence>,
    database_retry: RetryPolicy,
    router: FileRouter,
    events: Arc<dyn EventPublisher>,
}

impl FileProcessor {
    pub fn new(
        decoder: Arc<dyn MessageDecoder>,
        population: MessagePopulationService,
        persistence: Arc<dyn Persistence>,
        database_retry: RetryPolicy,
        router: FileRouter,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            decoder,
            population,
            persistence,
            database_retry,
            router,
            events,
        }
    }

    /// Process a claimed file. Never fails: problems end up in the report and
    /// route the file to the fail directory.
    #[instrument(skip_all, fields(processing_id = %claim.processing_id(), file = %claim.reference()))]
    pub async fn process(&self, claim: FileClaim, product: &AviationProduct, candidate: &FileCandidate) -> ProcessingReport {
        let context = claim.context().clone();
        info!(ctx = %context, size = candidate.size, "Start processing file");

        if let Err(e) = self.read_and_store(product, candidate, &context).await {
            error!(ctx = %context, error = %e, "File processing failed");
            context.leave_bulletin();
            context.record_processing_result(StatisticsResult::Failed);
        }

        context.init_statistics();
        let destination = RouteDestination::for_result(context.statistics().file_result());

        let routed = self
            .router
            .route_or_fail(&candidate.path, product, destination, &context)
            .await;
        let outcome = match routed {
            Some((RouteDestination::Archive, _)) => FileOutcome::Archived,
            _ => FileOutcome::Failed,
        };
        if destination == RouteDestination::Archive && outcome == FileOutcome::Failed {
            context.leave_bulletin();
            context.record_processing_result(StatisticsResult::Failed);
        }
        let moved = routed.map(|(_, path)| path);
        let statistics = context.statistics();
        let result = statistics.file_result();

        info!(ctx = %context, statistics = %statistics, outcome = ?outcome, "Finished processing file");

        let report = ProcessingReport {
            processing_id: claim.processing_id().to_string(),
            file: claim.reference().clone(),
            result,
            outcome,
            destination: moved,
            statistics: statistics.summary(),
        };
        self.events.publish(&FileProcessedEvent {
            processing_id: report.processing_id.clone(),
            file: report.file.clone(),
            outcome,
            destination: report.destination.clone(),
            statistics: report.statistics.clone(),
        });
        claim.complete(outcome, report.destination.clone(), report.statistics.clone());
        report
    }

    async fn read_and_store(
        &self,
        product: &AviationProduct,
        candidate: &FileCandidate,
        context: &SharedLoggingContext,
    ) -> Result<()> {
        let filename = candidate.reference.filename();
        let file_config = product
            .file_config_for(filename)
            .cloned()
            .ok_or_else(|| IngestionError::UnmatchedFile(candidate.reference.to_string()))?;
        let modified = candidate.modified.map(DateTime::<Utc>::from);
        let metadata = Arc::new(FileMetadata::new(candidate.reference.clone(), file_config, modified));

        let bytes = tokio::fs::read(&candidate.path).await?;
        let content = String::from_utf8_lossy(&bytes);
        let decoded = self.decoder.decode(&content, &metadata);

        for decode_error in &decoded.errors {
            context.enter_bulletin(Some(decode_error.bulletin_index));
            if let Some(message) = decode_error.message_index {
                context.enter_message(Some(message));
            }
            warn!(ctx = %context, error = %decode_error.reason, "Could not decode");
            context.record_processing_result(StatisticsResult::Failed);
        }
        context.leave_bulletin();

        let populated = self.population.populate(&decoded.messages, context).await;
        if populated.is_empty() {
            return Ok(());
        }

        let records: Vec<_> = populated.iter().map(|p| p.record.clone()).collect();
        let stored = retry(&self.database_retry, "insert_messages", || {
            self.persistence.insert_messages(&records, context)
        })
        .await;
        if let Err(e) = stored {
            for message in &populated {
                context.enter_bulletin(Some(message.reference.bulletin_index));
                context.enter_message(Some(message.reference.message_index));
                context.record_processing_result(StatisticsResult::Failed);
            }
            context.leave_bulletin();
            return Err(e.into());
        }
        info!(ctx = %context, count = records.len(), "Stored messages");
        Ok(())
    }
}
