//! End-to-end tests of file processing: decode, populate, persist, route.

use async_trait::async_trait;
use avi_common::{ArchiveAviationMessage, FileConfig, FixedClock, MessageFormat, ProcessingResult};
use chrono::FixedOffset;
use ingestion::{
    AviationProduct, ClaimRegistry, DirectoryPoller, EventPublisher, FileCandidate, FileFilterChain, FileOutcome,
    FileProcessedEvent, FileProcessor, FileRouter, IdMappings, MessagePopulationService, Persistence,
    PersistenceError, PopulatorDependencies, PopulatorInstanceSpec, PopulatorRegistry, ProcessingReport,
    RetryPolicy, SharedLoggingContext, ShutdownCoordinator, StatisticsResult, TacBulletinDecoder,
};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utils::fixtures::{self, expected};
use test_utils::{assert_routed, wait_until, ProductDirs};
use tokio::sync::{watch, Semaphore};

const CHAIN: &str = r#"
- name: FileMetadataPopulator
- name: BulletinHeadingDataPopulator
- name: MessageDataPopulator
- name: MessageDiscarder
  activate_on:
    heading:
      matchesAnyOf: ["^..XX42"]
- name: StationIdPopulator
- name: MessageFutureTimeValidator
  config:
    acceptInFuture: PT12H
- name: MessageMaximumAgeValidator
  config:
    maximumAge: P7D
- name: MessageValidityPeriodValidator
"#;

#[derive(Default)]
struct RecordingPersistence {
    stored: Mutex<Vec<ArchiveAviationMessage>>,
    insert_calls: AtomicUsize,
    scripted_failures: Mutex<VecDeque<PersistenceError>>,
    permanent_failure: Option<PersistenceError>,
}

impl RecordingPersistence {
    fn failing_first(failures: Vec<PersistenceError>) -> Self {
        Self {
            scripted_failures: Mutex::new(failures.into()),
            ..Default::default()
        }
    }

    fn always_failing(error: PersistenceError) -> Self {
        Self {
            permanent_failure: Some(error),
            ..Default::default()
        }
    }

    fn stored(&self) -> Vec<ArchiveAviationMessage> {
        self.stored.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Persistence for RecordingPersistence {
    async fn insert_messages(
        &self,
        messages: &[ArchiveAviationMessage],
        _context: &SharedLoggingContext,
    ) -> Result<(), PersistenceError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.permanent_failure {
            return Err(error.clone());
        }
        if let Some(error) = self.scripted_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.stored.lock().unwrap().extend_from_slice(messages);
        Ok(())
    }

    async fn query_station_id(
        &self,
        icao_code: &str,
        _context: &SharedLoggingContext,
    ) -> Result<Option<i32>, PersistenceError> {
        Ok((icao_code == expected::STATION).then_some(1))
    }
}

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<FileProcessedEvent>>,
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: &FileProcessedEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

struct Pipeline {
    dirs: ProductDirs,
    product: Arc<AviationProduct>,
    registry: Arc<ClaimRegistry>,
    processor: Arc<FileProcessor>,
    persistence: Arc<RecordingPersistence>,
    events: Arc<RecordingPublisher>,
}

fn ids() -> IdMappings {
    IdMappings {
        routes: HashMap::from([("DEFAULT".to_string(), 1)]),
        formats: HashMap::from([("TAC".to_string(), 1), ("IWXXM".to_string(), 2)]),
        types: HashMap::from([
            ("METAR".to_string(), 1),
            ("TAF".to_string(), 2),
            ("SIGMET".to_string(), 3),
        ]),
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_initial_interval(Duration::from_millis(1))
        .with_max_interval(Duration::from_millis(5))
        .with_timeout(Duration::from_millis(200))
}

impl Pipeline {
    fn new(persistence: RecordingPersistence) -> Self {
        Self::with_archive_dir(persistence, |dirs| dirs.archive.clone())
    }

    fn with_archive_dir(persistence: RecordingPersistence, archive_dir: impl FnOnce(&ProductDirs) -> PathBuf) -> Self {
        let dirs = ProductDirs::new();
        let archive_dir = archive_dir(&dirs);
        let product = Arc::new(AviationProduct {
            id: "taf".to_string(),
            route: "DEFAULT".to_string(),
            input_dir: dirs.input.clone(),
            archive_dir,
            fail_dir: dirs.fail.clone(),
            files: vec![FileConfig::new(
                Regex::new(fixtures::TAF_FILENAME_PATTERN).unwrap(),
                MessageFormat::Tac,
                FixedOffset::east_opt(0).unwrap(),
            )],
        });

        let persistence = Arc::new(persistence);
        let dependencies = PopulatorDependencies::new(
            Arc::new(FixedClock::new(fixtures::taf_processing_time())),
            Arc::new(ids()),
            persistence.clone(),
        )
        .with_product_routes(HashMap::from([(product.id.clone(), product.route.clone())]))
        .with_database_retry(fast_retry());
        let registry = PopulatorRegistry::with_builtins(dependencies).unwrap();
        let specs: Vec<PopulatorInstanceSpec> = serde_yaml::from_str(CHAIN).unwrap();
        let chain = registry.build_chain(&specs).unwrap();

        let events = Arc::new(RecordingPublisher::default());
        let processor = Arc::new(FileProcessor::new(
            Arc::new(TacBulletinDecoder),
            MessagePopulationService::new(chain),
            persistence.clone(),
            fast_retry(),
            FileRouter::new(fast_retry()),
            events.clone(),
        ));

        Self {
            dirs,
            product,
            registry: Arc::new(ClaimRegistry::new()),
            processor,
            persistence,
            events,
        }
    }

    async fn process(&self, filename: &str, content: &str) -> ProcessingReport {
        let path = self.dirs.write_input(filename, content);
        let metadata = std::fs::metadata(&path).unwrap();
        let candidate = FileCandidate {
            reference: self.product.file_reference(filename),
            path,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        };
        let claim = self.registry.claim(candidate.reference.clone()).unwrap();
        self.processor.process(claim, &self.product, &candidate).await
    }
}

#[tokio::test]
async fn test_taf_file_is_archived_with_completed_times() {
    let pipeline = Pipeline::new(RecordingPersistence::default());
    let report = pipeline.process(fixtures::TAF_FILENAME, fixtures::TAF_BULLETIN).await;

    assert_eq!(report.outcome, FileOutcome::Archived);
    assert_eq!(report.result, StatisticsResult::Archived);

    let stored = pipeline.persistence.stored();
    assert_eq!(stored.len(), 1);
    let record = &stored[0];
    assert_eq!(record.route, 1);
    assert_eq!(record.format, 1);
    assert_eq!(record.type_id, 2);
    assert_eq!(record.message_time, expected::message_time());
    assert_eq!(record.valid_from, Some(expected::valid_from()));
    assert_eq!(record.valid_to, Some(expected::valid_to()));
    assert_eq!(record.icao_airport_code, expected::STATION);
    assert_eq!(record.station_id, Some(1));
    assert_eq!(record.heading.as_deref(), Some(expected::HEADING));
    assert_eq!(record.version, None);
    assert!(record.file_modified.is_some());
    assert_eq!(record.processing_result, ProcessingResult::Ok);
    assert!(record.message.starts_with("TAF EFKE 020532Z 0206/0312"));

    assert!(pipeline.dirs.input_files().is_empty());
    let archived = format!("{}.{}", fixtures::TAF_FILENAME, report.processing_id);
    assert_eq!(pipeline.dirs.archive_files(), vec![archived]);
    assert_eq!(report.destination, Some(pipeline.dirs.archive.join(&pipeline.dirs.archive_files()[0])));

    let events = pipeline.events.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].statistics.messages.get("ARCHIVED"), Some(&1));
    assert_eq!(pipeline.registry.in_flight(), 0);
}

#[tokio::test]
async fn test_delayed_bulletin_sets_version() {
    let pipeline = Pipeline::new(RecordingPersistence::default());
    let report = pipeline
        .process("TAF_20190505_102013_12332320", fixtures::DELAYED_TAF_BULLETIN)
        .await;

    assert_eq!(report.outcome, FileOutcome::Archived);
    let stored = pipeline.persistence.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].version.as_deref(), Some("RRB"));
    assert_eq!(stored[0].heading.as_deref(), Some("FTFI33 EFPP 020500 RRB"));
}

#[tokio::test]
async fn test_test_bulletin_is_discarded() {
    let pipeline = Pipeline::new(RecordingPersistence::default());
    let report = pipeline
        .process(fixtures::TAF_FILENAME, fixtures::TAF_AND_TEST_BULLETINS)
        .await;

    let stored = pipeline.persistence.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].icao_airport_code, expected::STATION);

    assert_eq!(report.statistics.messages.get("ARCHIVED"), Some(&1));
    assert_eq!(report.statistics.messages.get("DISCARDED"), Some(&1));
    assert_eq!(report.result, StatisticsResult::Discarded);
    assert_eq!(report.outcome, FileOutcome::Archived);
    assert_routed!(pipeline.dirs.archive_files(), fixtures::TAF_FILENAME, 1);
}

#[tokio::test]
async fn test_non_transient_persistence_error_is_not_retried() {
    let pipeline = Pipeline::new(RecordingPersistence::failing_first(vec![PersistenceError::NonTransient(
        "constraint violation".into(),
    )]));
    let report = pipeline.process(fixtures::TAF_FILENAME, fixtures::TAF_BULLETIN).await;

    assert_eq!(pipeline.persistence.calls(), 1);
    assert!(pipeline.persistence.stored().is_empty());
    assert_eq!(report.result, StatisticsResult::Failed);
    assert_eq!(report.outcome, FileOutcome::Failed);
    assert_eq!(report.statistics.messages.get("FAILED"), Some(&1));
    assert_routed!(pipeline.dirs.fail_files(), fixtures::TAF_FILENAME, 1);
    assert!(pipeline.dirs.archive_files().is_empty());
}

#[tokio::test]
async fn test_transient_persistence_errors_are_retried() {
    let pipeline = Pipeline::new(RecordingPersistence::failing_first(vec![
        PersistenceError::Transient("connection reset".into()),
        PersistenceError::Transient("connection reset".into()),
    ]));
    let report = pipeline.process(fixtures::TAF_FILENAME, fixtures::TAF_BULLETIN).await;

    assert_eq!(pipeline.persistence.calls(), 3);
    assert_eq!(pipeline.persistence.stored().len(), 1);
    assert_eq!(report.outcome, FileOutcome::Archived);
}

#[tokio::test]
async fn test_transient_errors_give_up_after_timeout() {
    let pipeline = Pipeline::new(RecordingPersistence::always_failing(PersistenceError::Transient(
        "database unavailable".into(),
    )));
    let report = pipeline.process(fixtures::TAF_FILENAME, fixtures::TAF_BULLETIN).await;

    assert!(pipeline.persistence.calls() > 1);
    assert_eq!(report.outcome, FileOutcome::Failed);
    assert_routed!(pipeline.dirs.fail_files(), fixtures::TAF_FILENAME, 1);
}

#[tokio::test]
async fn test_unarchivable_file_is_routed_to_fail_dir() {
    let pipeline = Pipeline::with_archive_dir(RecordingPersistence::default(), |dirs| {
        std::fs::write(dirs.root().join("blocked"), "").unwrap();
        dirs.root().join("blocked/archive")
    });
    let report = pipeline.process(fixtures::TAF_FILENAME, fixtures::TAF_BULLETIN).await;

    assert_eq!(report.outcome, FileOutcome::Failed);
    assert_eq!(report.result, StatisticsResult::Failed);
    assert!(pipeline.dirs.input_files().is_empty());
    assert_routed!(pipeline.dirs.fail_files(), fixtures::TAF_FILENAME, 1);
    let failed = format!("{}.{}", fixtures::TAF_FILENAME, report.processing_id);
    assert_eq!(report.destination, Some(pipeline.dirs.fail.join(failed)));

    assert_eq!(pipeline.registry.in_flight(), 0);
    let status = pipeline.registry.status();
    assert_eq!(status.recent[0].outcome, Some(FileOutcome::Failed));
}

#[tokio::test]
async fn test_empty_and_unmatched_files_fail() {
    let pipeline = Pipeline::new(RecordingPersistence::default());

    let empty = pipeline.process(fixtures::TAF_FILENAME, fixtures::EMPTY_CONTENT).await;
    assert_eq!(empty.outcome, FileOutcome::Failed);

    let unmatched = pipeline.process("notes.txt", fixtures::TAF_BULLETIN).await;
    assert_eq!(unmatched.outcome, FileOutcome::Failed);
    assert_eq!(unmatched.statistics.file, StatisticsResult::Failed);

    assert_routed!(pipeline.dirs.fail_files(), fixtures::TAF_FILENAME, 1);
    assert_routed!(pipeline.dirs.fail_files(), "notes.txt", 1);
    assert!(pipeline.persistence.stored().is_empty());
}

#[tokio::test]
async fn test_poll_once_processes_each_file_once() {
    let pipeline = Pipeline::new(RecordingPersistence::default());
    pipeline.dirs.write_input(fixtures::TAF_FILENAME, fixtures::TAF_BULLETIN);
    pipeline
        .dirs
        .write_input("TAF_20190505_102013_12332320", fixtures::DELAYED_TAF_BULLETIN);

    let poller = DirectoryPoller::new(
        pipeline.product.clone(),
        FileFilterChain::standard(pipeline.registry.clone(), Duration::ZERO, 64),
        pipeline.registry.clone(),
        pipeline.processor.clone(),
        Arc::new(Semaphore::new(2)),
        Duration::from_millis(10),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = poller.poll_once(&shutdown_rx).await.unwrap();
    assert_eq!(handles.len(), 2);
    for handle in handles {
        assert_eq!(handle.await.unwrap().outcome, FileOutcome::Archived);
    }
    assert_eq!(pipeline.dirs.archive_files().len(), 2);
    assert!(poller.poll_once(&shutdown_rx).await.unwrap().is_empty());

    shutdown_tx.send(true).unwrap();
    pipeline.dirs.write_input(fixtures::TAF_FILENAME, fixtures::TAF_BULLETIN);
    assert!(poller.poll_once(&shutdown_rx).await.unwrap().is_empty());
    assert_eq!(pipeline.dirs.input_files().len(), 1);
}

#[tokio::test]
async fn test_running_poller_drains_on_shutdown() {
    let pipeline = Pipeline::new(RecordingPersistence::default());
    let coordinator = ShutdownCoordinator::new(
        pipeline.registry.clone(),
        Duration::from_secs(5),
        Duration::from_millis(5),
    );
    let poller = DirectoryPoller::new(
        pipeline.product.clone(),
        FileFilterChain::standard(pipeline.registry.clone(), Duration::ZERO, 64),
        pipeline.registry.clone(),
        pipeline.processor.clone(),
        Arc::new(Semaphore::new(4)),
        Duration::from_millis(10),
    );
    let task = tokio::spawn(poller.run(coordinator.subscribe()));

    pipeline.dirs.write_input(fixtures::TAF_FILENAME, fixtures::TAF_BULLETIN);
    assert!(wait_until(Duration::from_secs(5), || pipeline.dirs.archive_files().len() == 1).await);

    assert!(coordinator.shutdown().await);
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    assert_eq!(pipeline.registry.status().total_completed, 1);
}
