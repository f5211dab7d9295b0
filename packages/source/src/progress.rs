//! Progress reporting for ingestion and aggregation runs.
//!
//! The pipeline reports through [`ProgressCallback`] so it never depends
//! on a terminal. The CLI plugs in an `indicatif` bar; library callers and
//! tests use [`null_progress`].

use std::sync::Arc;

/// Receives progress updates from a long-running pipeline step.
///
/// Units are records. The total is usually unknown during ingestion (the
/// API does not report a row count), so implementations must cope with
/// `inc` being called without a prior `set_total`.
pub trait ProgressCallback: Send + Sync {
    /// Sets the expected number of records, when known.
    fn set_total(&self, total: u64);

    /// Advances by `delta` records.
    fn inc(&self, delta: u64);

    /// Replaces the status message (e.g., the current cursor).
    fn set_message(&self, msg: String);

    /// Marks the step as complete.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
