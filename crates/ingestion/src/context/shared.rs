//! Thread-safe handle to a [`LoggingContext`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use avi_common::FileReference;

use super::logging::{BulletinLogReference, LoggingContext, MessageLogReference};
use super::statistics::{FileProcessingStatistics, StatisticsResult};

/// A [`LoggingContext`] shared between the worker processing a file and
/// readers such as the status endpoint.
///
/// Every operation takes the lock only for its own duration, so a handle can
/// be held across `.await` points.
#[derive(Clone, Default)]
pub struct SharedLoggingContext {
    inner: Arc<Mutex<LoggingContext>>,
}

impl SharedLoggingContext {
    pub fn new(context: LoggingContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoggingContext> {
        // A panic while holding the lock leaves the context consistent enough
        // for logging purposes.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with exclusive access to the context.
    pub fn with<R>(&self, f: impl FnOnce(&mut LoggingContext) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn processing_id(&self) -> String {
        self.lock().processing_id().to_string()
    }

    pub fn file(&self) -> Option<FileReference> {
        self.lock().file().cloned()
    }

    pub fn enter_file(&self, file: Option<FileReference>) {
        self.lock().enter_file(file);
    }

    pub fn leave_file(&self) {
        self.lock().leave_file();
    }

    pub fn enter_bulletin(&self, index: Option<usize>) {
        self.lock().enter_bulletin(index);
    }

    pub fn enter_bulletin_reference(&self, reference: BulletinLogReference) {
        self.lock().enter_bulletin_reference(reference);
    }

    pub fn leave_bulletin(&self) {
        self.lock().leave_bulletin();
    }

    pub fn enter_message(&self, index: Option<usize>) {
        self.lock().enter_message(index);
    }

    pub fn enter_message_reference(&self, reference: MessageLogReference) {
        self.lock().enter_message_reference(reference);
    }

    pub fn leave_message(&self) {
        self.lock().leave_message();
    }

    pub fn modify_bulletin(&self, f: impl FnOnce(&mut BulletinLogReference)) {
        self.lock().modify_bulletin(f);
    }

    pub fn modify_message(&self, f: impl FnOnce(&mut MessageLogReference)) {
        self.lock().modify_message(f);
    }

    pub fn record_processing_result(&self, result: StatisticsResult) {
        self.lock().record_processing_result(result);
    }

    pub fn init_statistics(&self) {
        self.lock().init_statistics();
    }

    pub fn statistics(&self) -> FileProcessingStatistics {
        self.lock().statistics().clone()
    }
}

impl fmt::Display for SharedLoggingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self.lock().to_string();
        f.write_str(&rendered)
    }
}

impl fmt::Debug for SharedLoggingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedLoggingContext").field(&self.to_string()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_updates_visible_across_tasks() {
        let shared = SharedLoggingContext::new(LoggingContext::new("id"));
        shared.enter_file(Some(FileReference::new("taf", "a.txt")));

        let writer = shared.clone();
        tokio::spawn(async move {
            writer.enter_bulletin(Some(0));
            writer.enter_message(Some(1));
            writer.record_processing_result(StatisticsResult::Archived);
        })
        .await
        .unwrap();

        assert_eq!(shared.to_string(), "id:taf/a.txt:1:2");
        assert_eq!(shared.statistics().message_result(0, 1), StatisticsResult::Archived);
    }
}
