//! Persistence of archive records.

use async_trait::async_trait;
use avi_common::ArchiveAviationMessage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use crate::context::SharedLoggingContext;
use crate::error::PersistenceError;

/// Storage backend for archive records and station lookups.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Store a batch of records atomically.
    async fn insert_messages(
        &self,
        messages: &[ArchiveAviationMessage],
        context: &SharedLoggingContext,
    ) -> Result<(), PersistenceError>;

    /// Look up the station id for an ICAO code.
    async fn query_station_id(
        &self,
        icao_code: &str,
        context: &SharedLoggingContext,
    ) -> Result<Option<i32>, PersistenceError>;
}

/// Appends records as JSON lines to a file. Station ids come from
/// configuration.
pub struct JsonLinesPersistence {
    path: PathBuf,
    stations: HashMap<String, i32>,
    write_lock: Mutex<()>,
}

impl JsonLinesPersistence {
    pub fn new(path: impl Into<PathBuf>, stations: HashMap<String, i32>) -> Self {
        Self {
            path: path.into(),
            stations,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_error(e: std::io::Error) -> PersistenceError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::InvalidInput => {
            PersistenceError::NonTransient(e.to_string())
        }
        _ => PersistenceError::Transient(e.to_string()),
    }
}

/// Append `batch` through `writer`. On failure `path` is cut back to
/// `start` bytes so a retried batch is not stored twice.
async fn append_or_truncate<W>(writer: &mut W, path: &Path, start: u64, batch: &[u8]) -> Result<(), PersistenceError>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(batch).await {
        Ok(()) => writer.flush().await,
        Err(e) => {
            let _ = writer.flush().await;
            Err(e)
        }
    };
    let Err(write_error) = written else {
        return Ok(());
    };

    let truncated = async {
        let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        file.set_len(start).await
    }
    .await;
    match truncated {
        Ok(()) => Err(io_error(write_error)),
        Err(truncate_error) => {
            error!(
                path = %path.display(),
                error = %truncate_error,
                "Failed to remove partially written records"
            );
            // A retry would append after the partial batch.
            Err(PersistenceError::NonTransient(write_error.to_string()))
        }
    }
}

#[async_trait]
impl Persistence for JsonLinesPersistence {
    #[instrument(skip_all, fields(ctx = %context, count = messages.len()))]
    async fn insert_messages(
        &self,
        messages: &[ArchiveAviationMessage],
        context: &SharedLoggingContext,
    ) -> Result<(), PersistenceError> {
        // Serialize the whole batch first so a bad record writes nothing.
        let mut batch = String::new();
        for message in messages {
            let line = serde_json::to_string(message)
                .map_err(|e| PersistenceError::NonTransient(e.to_string()))?;
            batch.push_str(&line);
            batch.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error)?;
        let start = file.metadata().await.map_err(io_error)?.len();
        append_or_truncate(&mut file, &self.path, start, batch.as_bytes()).await?;

        debug!(path = %self.path.display(), "Appended archive records");
        Ok(())
    }

    async fn query_station_id(
        &self,
        icao_code: &str,
        _context: &SharedLoggingContext,
    ) -> Result<Option<i32>, PersistenceError> {
        Ok(self.stations.get(icao_code).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LoggingContext;
    use chrono::{TimeZone, Utc};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn record(icao: &str) -> ArchiveAviationMessage {
        let mut builder = ArchiveAviationMessage::builder();
        builder
            .set_route(1)
            .set_format(1)
            .set_type_id(2)
            .set_message_time(Utc.with_ymd_and_hms(2019, 5, 2, 5, 32, 0).unwrap())
            .set_icao_airport_code(icao)
            .set_message("TAF ...=");
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/messages.jsonl");
        let persistence = JsonLinesPersistence::new(&path, HashMap::from([("EFKE".to_string(), 7)]));
        let ctx = SharedLoggingContext::new(LoggingContext::new("id"));

        persistence.insert_messages(&[record("EFKE")], &ctx).await.unwrap();
        persistence.insert_messages(&[record("EFHK"), record("EFKE")], &ctx).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["icao_airport_code"], "EFHK");

        assert_eq!(persistence.query_station_id("EFKE", &ctx).await, Ok(Some(7)));
        assert_eq!(persistence.query_station_id("XXXX", &ctx).await, Ok(None));
    }

    /// Passes `budget` bytes through to the file, then fails like a full disk.
    struct FailingAfter {
        inner: tokio::fs::File,
        budget: usize,
    }

    impl AsyncWrite for FailingAfter {
        fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
            if self.budget == 0 {
                return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left")));
            }
            let len = buf.len().min(self.budget);
            let this = &mut *self;
            let written = Pin::new(&mut this.inner).poll_write(cx, &buf[..len]);
            if let Poll::Ready(Ok(n)) = written {
                this.budget -= n;
            }
            written
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn test_failed_append_leaves_no_partial_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");
        tokio::fs::write(&path, "{\"existing\":1}\n").await.unwrap();
        let start = tokio::fs::metadata(&path).await.unwrap().len();

        let file = tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap();
        let mut writer = FailingAfter { inner: file, budget: 7 };
        let batch = "{\"icao\":\"EFKE\"}\n{\"icao\":\"EFHK\"}\n";
        let err = append_or_truncate(&mut writer, &path, start, batch.as_bytes())
            .await
            .unwrap_err();

        assert!(matches!(err, PersistenceError::Transient(_)));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "{\"existing\":1}\n");
    }
}
