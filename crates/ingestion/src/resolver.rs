//! Completion of partial message times against the best reference time
//! available for a file.
//!
//! References are tried in order:
//!
//! 1. an explicitly supplied primary reference (periods only),
//! 2. the timestamp encoded in the filename,
//! 3. the file's last-modified time,
//! 4. the clock.
//!
//! A partial reference is itself completed against the references after it
//! before it is used.

use avi_common::{Clock, FileMetadata, PartialOrCompleteTimeInstant, PartialOrCompleteTimePeriod};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Complete `instant`, or `None` when no reference resolves.
pub fn resolve_complete_time(
    instant: &PartialOrCompleteTimeInstant,
    file_metadata: &FileMetadata,
    clock: &dyn Clock,
) -> Option<DateTime<Utc>> {
    if let Some(complete) = instant.complete_time() {
        return Some(complete);
    }
    let partial = instant.partial_time()?;
    let reference = resolve_reference(&reference_candidates(None, file_metadata, clock))?;
    partial.complete_near(reference)
}

/// Complete both ends of `period` where possible.
///
/// Best effort: when completion fails the period is returned as given.
pub fn resolve_complete_period(
    period: &PartialOrCompleteTimePeriod,
    primary_reference: Option<&PartialOrCompleteTimeInstant>,
    file_metadata: &FileMetadata,
    clock: &dyn Clock,
) -> PartialOrCompleteTimePeriod {
    if period.is_complete() {
        return *period;
    }
    let completed = if period.has_complete_end() {
        period.complete_from_known_end()
    } else {
        let candidates = reference_candidates(primary_reference.copied(), file_metadata, clock);
        match resolve_reference(&candidates) {
            Some(reference) => period.complete_near(reference),
            None => return *period,
        }
    };
    completed.unwrap_or_else(|e| {
        debug!(period = %period, error = %e, "Leaving period incomplete");
        *period
    })
}

fn reference_candidates(
    primary: Option<PartialOrCompleteTimeInstant>,
    file_metadata: &FileMetadata,
    clock: &dyn Clock,
) -> Vec<Option<PartialOrCompleteTimeInstant>> {
    vec![
        primary,
        file_metadata.filename_matcher().timestamp(),
        file_metadata.file_modified().map(PartialOrCompleteTimeInstant::of_complete),
        Some(PartialOrCompleteTimeInstant::of_complete(clock.now())),
    ]
}

/// First candidate that resolves to a complete time. Partial candidates are
/// completed against the remaining ones.
fn resolve_reference(candidates: &[Option<PartialOrCompleteTimeInstant>]) -> Option<DateTime<Utc>> {
    for (i, candidate) in candidates.iter().enumerate() {
        let Some(candidate) = candidate else {
            continue;
        };
        if let Some(complete) = candidate.complete_time() {
            return Some(complete);
        }
        if let Some(partial) = candidate.partial_time() {
            let resolved = resolve_reference(&candidates[i + 1..])
                .and_then(|reference| partial.complete_near(reference));
            if resolved.is_some() {
                return resolved;
            }
        }
    }
    None
}
