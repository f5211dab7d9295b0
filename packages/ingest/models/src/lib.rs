#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingest run options and result types.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use parking_map_source_models::{IngestCursor, IngestWindow};
use serde::{Deserialize, Serialize};

/// Options for one ingest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Inclusive lower bound on the issue date.
    pub issue_date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the issue date.
    pub issue_date_to: Option<NaiveDate>,
    /// Records per page request. Clamped to the API limit.
    pub page_size: u32,
    /// Delay between page requests.
    pub sleep: Duration,
    /// Stop after this many raw records (useful for testing).
    pub limit: Option<u64>,
    /// Reset the persisted cursor and walk from the beginning.
    pub force: bool,
    /// Fetch and normalize without writing to the store.
    pub dry_run: bool,
    /// Write every fetched raw record to this newline-delimited JSON file.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            issue_date_from: None,
            issue_date_to: None,
            page_size: 1_000,
            sleep: Duration::from_millis(250),
            limit: None,
            force: false,
            dry_run: false,
            snapshot_path: None,
        }
    }
}

impl IngestOptions {
    /// The requested issue-date window.
    #[must_use]
    pub const fn window(&self) -> IngestWindow {
        IngestWindow::new(self.issue_date_from, self.issue_date_to)
    }
}

/// Result of a completed ingest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    /// Non-empty pages received.
    pub pages_fetched: u64,
    /// Raw records received.
    pub records_fetched: u64,
    /// Records that normalized successfully.
    pub records_normalized: u64,
    /// Records newly added to the store (duplicates excluded).
    pub records_inserted: u64,
    /// Records rejected by the normalizer.
    pub records_dropped: u64,
    /// How long the run took.
    pub duration: Duration,
    /// Cursor after the last committed page.
    pub final_cursor: IngestCursor,
    /// Window the run walked; a resumed run inherits the stored one.
    pub window: IngestWindow,
}

impl IngestResult {
    /// Normalized records that were already stored.
    #[must_use]
    pub const fn records_skipped(&self) -> u64 {
        self.records_normalized.saturating_sub(self.records_inserted)
    }
}
