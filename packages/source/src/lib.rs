#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Violation page fetching, classification and normalization logic.
//!
//! The upstream API is reached through the [`PageSource`] trait. The
//! production implementation is [`socrata::SocrataClient`]; replaying a
//! newline-delimited JSON snapshot goes through
//! [`snapshot::SnapshotSource`]. Raw records from either are turned into
//! canonical records by [`normalize::Normalizer`].

pub mod classify;
pub mod normalize;
pub mod parsing;
pub mod progress;
pub mod retry;
pub mod segment;
pub mod snapshot;
pub mod socrata;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_map_source_models::{IngestCursor, IngestWindow, RawViolationRecord};

/// Maximum number of rows the API returns for a single request.
pub const API_MAX_PAGE_SIZE: u32 = 1_000;

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a status that will not succeed on retry.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: reqwest::StatusCode,
        /// Requested URL.
        url: String,
    },

    /// Every retry attempt failed with a transient error.
    #[error("request failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// The classification rule table is invalid.
    #[error("Invalid classification rules: {message}")]
    Rules {
        /// Description of what went wrong.
        message: String,
    },

    /// TOML parsing failed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// One page request against the violations API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// Maximum number of records to return (at most [`API_MAX_PAGE_SIZE`]).
    pub page_size: u32,
    /// Only records strictly after this position are returned.
    pub after: IngestCursor,
    /// Inclusive lower bound on the issue date.
    pub issue_date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the issue date.
    pub issue_date_to: Option<NaiveDate>,
}

impl PageQuery {
    /// Lower bound literal for the `issue_date` column, if any.
    #[must_use]
    pub fn lower_bound(&self) -> Option<String> {
        self.issue_date_from.map(date_literal)
    }

    /// Exclusive upper bound literal for the `issue_date` column: midnight
    /// of the day after `issue_date_to`, so the whole last day is included.
    #[must_use]
    pub fn upper_bound(&self) -> Option<String> {
        self.issue_date_to
            .map(|d| date_literal(d.succ_opt().unwrap_or(NaiveDate::MAX)))
    }

    /// The query's issue-date window.
    #[must_use]
    pub const fn window(&self) -> IngestWindow {
        IngestWindow::new(self.issue_date_from, self.issue_date_to)
    }

    /// Returns `true` if `record` belongs on a page answering this query.
    ///
    /// The window is checked on the parsed calendar date, so date-only and
    /// `MM/DD/YYYY` values are placed correctly. With a window set, records
    /// whose date cannot be parsed are excluded. Keyset order is the raw
    /// `(issue_date, summons_number)` text, as the API sorts it.
    #[must_use]
    pub fn admits(&self, record: &RawViolationRecord) -> bool {
        let Some(position) = record.cursor_position() else {
            return false;
        };
        let window = self.window();
        if !window.is_unbounded() {
            let in_window = record
                .issue_date()
                .and_then(parsing::parse_issue_date)
                .is_some_and(|date| window.contains(date));
            if !in_window {
                return false;
            }
        }
        position > self.after
    }
}

fn date_literal(date: NaiveDate) -> String {
    format!("{}T00:00:00", date.format("%Y-%m-%d"))
}

/// A paginated upstream of raw violation records.
///
/// Implementations return records in ascending `(issue_date,
/// summons_number)` order, restricted to the query's window and to
/// positions strictly after its cursor.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Returns a short label for log messages.
    fn label(&self) -> &str;

    /// Fetches one page of records.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the page cannot be retrieved.
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawViolationRecord>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, id: &str) -> RawViolationRecord {
        RawViolationRecord {
            summons_number: Some(id.to_string()),
            issue_date: Some(date.to_string()),
            ..RawViolationRecord::default()
        }
    }

    #[test]
    fn window_bounds_cover_whole_days() {
        let query = PageQuery {
            page_size: 10,
            after: IngestCursor::Beginning,
            issue_date_from: NaiveDate::from_ymd_opt(2023, 1, 5),
            issue_date_to: NaiveDate::from_ymd_opt(2023, 1, 6),
        };
        assert_eq!(query.lower_bound().as_deref(), Some("2023-01-05T00:00:00"));
        assert_eq!(query.upper_bound().as_deref(), Some("2023-01-07T00:00:00"));

        assert!(!query.admits(&record("2023-01-04T23:59:59.000", "1")));
        assert!(query.admits(&record("2023-01-05T00:00:00.000", "1")));
        assert!(query.admits(&record("2023-01-06T18:00:00.000", "1")));
        assert!(!query.admits(&record("2023-01-07T00:00:00.000", "1")));
    }

    #[test]
    fn window_accepts_date_only_layouts() {
        let query = PageQuery {
            page_size: 10,
            after: IngestCursor::Beginning,
            issue_date_from: NaiveDate::from_ymd_opt(2023, 1, 5),
            issue_date_to: NaiveDate::from_ymd_opt(2023, 1, 5),
        };
        assert!(query.admits(&record("2023-01-05", "1")));
        assert!(query.admits(&record("01/05/2023", "1")));
        assert!(!query.admits(&record("01/06/2023", "1")));
        assert!(!query.admits(&record("2023-01-04", "1")));
        assert!(!query.admits(&record("garbage", "1")));

        let unbounded = PageQuery {
            issue_date_from: None,
            issue_date_to: None,
            ..query
        };
        assert!(unbounded.admits(&record("garbage", "1")));
    }

    #[test]
    fn cursor_breaks_ties_on_ticket_id() {
        let query = PageQuery {
            page_size: 10,
            after: IngestCursor::At {
                issue_date: "2023-01-05T00:00:00.000".to_string(),
                ticket_id: "200".to_string(),
            },
            issue_date_from: None,
            issue_date_to: None,
        };
        assert!(!query.admits(&record("2023-01-05T00:00:00.000", "100")));
        assert!(!query.admits(&record("2023-01-05T00:00:00.000", "200")));
        assert!(query.admits(&record("2023-01-05T00:00:00.000", "300")));
        assert!(query.admits(&record("2023-01-06T00:00:00.000", "100")));
    }

    #[test]
    fn records_without_position_are_never_admitted() {
        let query = PageQuery {
            page_size: 10,
            after: IngestCursor::Beginning,
            issue_date_from: None,
            issue_date_to: None,
        };
        let mut missing_id = record("2023-01-05", "1");
        missing_id.summons_number = None;
        assert!(!query.admits(&missing_id));
    }
}
