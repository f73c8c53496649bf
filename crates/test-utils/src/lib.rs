//! Shared test utilities for the avi-archiver workspace.
//!
//! This crate provides common testing infrastructure including:
//! - TAC bulletin fixtures with known expected values
//! - Temporary product directory layouts
//! - Polling helpers for asynchronous assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, ProductDirs};
//! ```

pub mod dirs;
pub mod fixtures;

pub use dirs::*;

use std::time::Duration;

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// passes. Returns the final evaluation.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return condition();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Assert that a directory holds exactly `count` files whose names start
/// with `prefix`.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_routed;
///
/// assert_routed!(dirs.archive_files(), "TAF_20190505", 1);
/// ```
#[macro_export]
macro_rules! assert_routed {
    ($files:expr, $prefix:expr, $count:expr) => {{
        let files: Vec<String> = $files;
        let matching = files.iter().filter(|name| name.starts_with($prefix)).count();
        if matching != $count {
            panic!(
                "assertion failed: expected {} file(s) starting with `{}`, found {}: {:?}",
                $count, $prefix, matching, files
            );
        }
    }};
}
