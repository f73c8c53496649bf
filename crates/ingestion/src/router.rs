//! Moves processed files to their archive or fail directory.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::context::{SharedLoggingContext, StatisticsResult};
use crate::error::RouteError;
use crate::product::{AviationProduct, RouteDestination};
use crate::retry::{retry, RetryPolicy};

impl RouteDestination {
    /// Only failed files go to the fail directory; discarded and rejected
    /// content still counts as handled.
    pub fn for_result(result: StatisticsResult) -> Self {
        if result == StatisticsResult::Failed {
            RouteDestination::Fail
        } else {
            RouteDestination::Archive
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileRouter {
    retry_policy: RetryPolicy,
}

impl FileRouter {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    /// Destination path for `source` processed under `processing_id`.
    ///
    /// The processing id suffix keeps repeated deliveries of a same-named
    /// file from overwriting each other.
    pub fn destination_path(dir: &Path, source: &Path, processing_id: &str) -> PathBuf {
        let filename = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        dir.join(format!("{}.{}", filename, processing_id))
    }

    /// Move `source` into the product's directory for `destination`.
    pub async fn route(
        &self,
        source: &Path,
        product: &AviationProduct,
        destination: RouteDestination,
        context: &SharedLoggingContext,
    ) -> Result<PathBuf, RouteError> {
        let target = Self::destination_path(product.dir(destination), source, &context.processing_id());
        retry(&self.retry_policy, "move_file", || move_file(source, &target)).await?;
        info!(ctx = %context, destination = %target.display(), "Moved file");
        Ok(target)
    }

    /// Move `source` to `destination`, falling back to a single attempt at
    /// the fail directory when archiving fails. Returns where the file
    /// landed, or `None` when it had to be left in place.
    pub async fn route_or_fail(
        &self,
        source: &Path,
        product: &AviationProduct,
        destination: RouteDestination,
        context: &SharedLoggingContext,
    ) -> Option<(RouteDestination, PathBuf)> {
        match self.route(source, product, destination, context).await {
            Ok(path) => return Some((destination, path)),
            Err(e) => error!(ctx = %context, error = %e, destination = ?destination, "Failed to move file"),
        }
        if destination == RouteDestination::Archive {
            let target = Self::destination_path(product.dir(RouteDestination::Fail), source, &context.processing_id());
            match move_file(source, &target).await {
                Ok(()) => {
                    info!(ctx = %context, destination = %target.display(), "Moved file to fail directory instead");
                    return Some((RouteDestination::Fail, target));
                }
                Err(e) => error!(ctx = %context, error = %e, "Failed to move file to fail directory"),
            }
        }
        error!(ctx = %context, "Leaving file in place");
        None
    }
}

async fn move_file(source: &Path, target: &Path) -> Result<(), RouteError> {
    let move_error = |source_path: &Path, e: io::Error| RouteError::Move {
        from: source_path.display().to_string(),
        to: target.display().to_string(),
        source: e,
    };

    if !tokio::fs::try_exists(source).await.unwrap_or(false) {
        return Err(RouteError::SourceMissing(source.display().to_string()));
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| move_error(source, e))?;
    }

    match tokio::fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(rename_error) if rename_error.kind() == io::ErrorKind::NotFound => Err(move_error(source, rename_error)),
        Err(_) => {
            // Rename fails across file systems; fall back to copy and delete.
            tokio::fs::copy(source, target)
                .await
                .map_err(|e| move_error(source, e))?;
            tokio::fs::remove_file(source)
                .await
                .map_err(|e| move_error(source, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LoggingContext;
    use avi_common::FileReference;
    use std::time::Duration;

    fn product(root: &Path) -> AviationProduct {
        AviationProduct {
            id: "taf".into(),
            route: "DEFAULT".into(),
            input_dir: root.join("in"),
            archive_dir: root.join("archive"),
            fail_dir: root.join("fail"),
            files: Vec::new(),
        }
    }

    fn context() -> SharedLoggingContext {
        let ctx = SharedLoggingContext::new(LoggingContext::new("20190505T102120.000Z-abcd1234"));
        ctx.enter_file(Some(FileReference::new("taf", "a.txt")));
        ctx
    }

    #[test]
    fn test_destination_for_result() {
        assert_eq!(RouteDestination::for_result(StatisticsResult::Failed), RouteDestination::Fail);
        assert_eq!(RouteDestination::for_result(StatisticsResult::Rejected), RouteDestination::Archive);
        assert_eq!(RouteDestination::for_result(StatisticsResult::Discarded), RouteDestination::Archive);
        assert_eq!(RouteDestination::for_result(StatisticsResult::Nothing), RouteDestination::Archive);
    }

    #[tokio::test]
    async fn test_moves_with_processing_id_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let product = product(dir.path());
        tokio::fs::create_dir_all(&product.input_dir).await.unwrap();
        let source = product.input_dir.join("a.txt");
        tokio::fs::write(&source, "TAF=").await.unwrap();

        let router = FileRouter::default();
        let moved = router
            .route(&source, &product, RouteDestination::Fail, &context())
            .await
            .unwrap();

        assert_eq!(moved, dir.path().join("fail/a.txt.20190505T102120.000Z-abcd1234"));
        assert!(!source.exists());
        assert_eq!(tokio::fs::read_to_string(&moved).await.unwrap(), "TAF=");
    }

    #[tokio::test]
    async fn test_unarchivable_file_goes_to_fail_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut product = product(dir.path());
        std::fs::write(dir.path().join("blocked"), "").unwrap();
        product.archive_dir = dir.path().join("blocked/archive");
        tokio::fs::create_dir_all(&product.input_dir).await.unwrap();
        let source = product.input_dir.join("a.txt");
        tokio::fs::write(&source, "TAF=").await.unwrap();

        let router = FileRouter::new(RetryPolicy::default().with_timeout(Duration::from_millis(50)));
        let (landed, path) = router
            .route_or_fail(&source, &product, RouteDestination::Archive, &context())
            .await
            .unwrap();

        assert_eq!(landed, RouteDestination::Fail);
        assert_eq!(path, dir.path().join("fail/a.txt.20190505T102120.000Z-abcd1234"));
        assert!(!source.exists());

        let gone = router
            .route_or_fail(&source, &product, RouteDestination::Archive, &context())
            .await;
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_missing_source_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let product = product(dir.path());
        let router = FileRouter::new(RetryPolicy::default().with_timeout(Duration::from_secs(60)));
        let started = std::time::Instant::now();
        let err = router
            .route(&dir.path().join("in/gone.txt"), &product, RouteDestination::Archive, &context())
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::SourceMissing(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
