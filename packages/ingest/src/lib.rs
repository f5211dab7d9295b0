#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Resumable ingestion of parking violations.
//!
//! [`run_ingest`] walks a [`PageSource`] one page at a time. Each page is
//! normalized and committed to the store together with the advanced
//! cursor and the issue-date window it belongs to, so a run interrupted at
//! any point resumes exactly after the last committed page of the same
//! window.

pub mod config;

use std::time::Instant;

use duckdb::Connection;
use parking_map_database::DbError;
use parking_map_database::ticket_db;
use parking_map_ingest_models::{IngestOptions, IngestResult};
use parking_map_source::normalize::Normalizer;
use parking_map_source::progress::ProgressCallback;
use parking_map_source::snapshot::SnapshotWriter;
use parking_map_source::{API_MAX_PAGE_SIZE, PageQuery, PageSource, SourceError};
use parking_map_source_models::{IngestCursor, IngestWindow, RawViolationRecord};

/// Errors that can occur during ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A page could not be fetched.
    #[error("Failed to fetch page {page}: {source}")]
    Source {
        page: u64,
        #[source]
        source: SourceError,
    },

    /// A page could not be committed; the cursor was not advanced.
    #[error("Failed to commit page {page}: {source}")]
    Store {
        page: u64,
        #[source]
        source: DbError,
    },

    /// A page did not move the cursor forward.
    #[error("Page {page} did not advance the cursor past {cursor}")]
    Stalled { page: u64, cursor: IngestCursor },

    /// The raw-record snapshot could not be written.
    #[error("Snapshot error: {0}")]
    Snapshot(#[source] SourceError),

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// An ingest option is invalid.
    #[error("Invalid option: {message}")]
    InvalidOption { message: String },
}

/// Validates a requested page size against the API limit.
///
/// # Errors
///
/// Returns [`IngestError::InvalidOption`] for zero.
pub fn clamp_page_size(requested: u32) -> Result<u32, IngestError> {
    if requested == 0 {
        return Err(IngestError::InvalidOption {
            message: "page size must be at least 1".to_string(),
        });
    }
    if requested > API_MAX_PAGE_SIZE {
        log::warn!(
            "Page size {requested} exceeds the API limit; using {API_MAX_PAGE_SIZE}"
        );
        return Ok(API_MAX_PAGE_SIZE);
    }
    Ok(requested)
}

fn validate(options: &IngestOptions) -> Result<u32, IngestError> {
    if let (Some(from), Some(to)) = (options.issue_date_from, options.issue_date_to)
        && from > to
    {
        return Err(IngestError::InvalidOption {
            message: format!("issue date window is empty ({from} > {to})"),
        });
    }
    clamp_page_size(options.page_size)
}

/// Chooses the window and starting cursor of a run.
///
/// Without a requested window the stored one is resumed. A requested
/// window that differs from the stored one starts from the beginning, as
/// does `force`.
fn resume_point(
    conn: &Connection,
    options: &IngestOptions,
    label: &str,
) -> Result<(IngestWindow, IngestCursor), DbError> {
    let requested = options.window();
    let stored_window = ticket_db::get_window(conn)?;
    let stored_cursor = ticket_db::get_cursor(conn)?;

    let restart = if options.force {
        log::info!("{label}: starting {requested} from the beginning (--force)");
        true
    } else if !requested.is_unbounded() && requested != stored_window {
        if !stored_cursor.is_beginning() {
            log::info!(
                "{label}: window changed from {stored_window} to {requested}, starting from the beginning"
            );
        }
        true
    } else {
        false
    };

    if restart {
        if !options.dry_run {
            ticket_db::set_cursor(conn, &IngestCursor::Beginning)?;
            ticket_db::set_window(conn, &requested)?;
        }
        return Ok((requested, IngestCursor::Beginning));
    }

    if stored_cursor.is_beginning() {
        log::info!("{label}: starting {stored_window} from the beginning");
    } else {
        log::info!("{label}: resuming {stored_window} after {stored_cursor}");
    }
    Ok((stored_window, stored_cursor))
}

/// Greatest cursor position among the page's records.
fn page_cursor(page: &[RawViolationRecord]) -> Option<IngestCursor> {
    page.iter().filter_map(RawViolationRecord::cursor_position).max()
}

/// Runs one ingest pass.
///
/// Pages are requested strictly after the persisted cursor (or from the
/// beginning with `force`), in ascending `(issue_date, summons_number)`
/// order, until a short page, an empty page, or the record limit. A run
/// without a window resumes the window of the persisted cursor.
///
/// Records lacking a ticket id or issue date are dropped like any other
/// malformed record. A page made up only of such records cannot advance
/// the cursor, so it ends the walk after its drops are committed.
///
/// With `dry_run` nothing is written to `conn`; the cursor advances in
/// memory only.
///
/// # Errors
///
/// Returns [`IngestError`] if a page cannot be fetched or committed, if a
/// page fails to advance the cursor, or if the options are invalid. Pages
/// committed before the failure stay committed.
#[allow(clippy::too_many_lines)]
pub async fn run_ingest(
    conn: &Connection,
    source: &dyn PageSource,
    normalizer: &Normalizer,
    options: &IngestOptions,
    progress: &dyn ProgressCallback,
) -> Result<IngestResult, IngestError> {
    let start = Instant::now();
    let page_size = validate(options)?;

    let (window, mut cursor) = resume_point(conn, options, source.label())
        .map_err(|source| IngestError::Store { page: 0, source })?;

    let mut snapshot = options
        .snapshot_path
        .as_deref()
        .map(SnapshotWriter::create)
        .transpose()
        .map_err(IngestError::Snapshot)?;

    if let Some(limit) = options.limit {
        progress.set_total(limit);
    }

    let mut result = IngestResult {
        pages_fetched: 0,
        records_fetched: 0,
        records_normalized: 0,
        records_inserted: 0,
        records_dropped: 0,
        duration: start.elapsed(),
        final_cursor: cursor.clone(),
        window,
    };
    let mut page: u64 = 0;

    loop {
        let request_size = match options.limit {
            Some(limit) => {
                let remaining = limit.saturating_sub(result.records_fetched);
                if remaining == 0 {
                    log::info!("Reached record limit of {limit}");
                    break;
                }
                u32::try_from(remaining).map_or(page_size, |r| r.min(page_size))
            }
            None => page_size,
        };

        if page > 0 && !options.sleep.is_zero() {
            tokio::time::sleep(options.sleep).await;
        }

        page += 1;
        let query = PageQuery {
            page_size: request_size,
            after: cursor.clone(),
            issue_date_from: window.issue_date_from,
            issue_date_to: window.issue_date_to,
        };

        let raws = source
            .fetch_page(&query)
            .await
            .map_err(|source| IngestError::Source { page, source })?;

        if raws.is_empty() {
            log::debug!("Page {page} is empty");
            break;
        }

        let next = page_cursor(&raws);
        if let Some(next) = &next
            && *next <= cursor
        {
            return Err(IngestError::Stalled { page, cursor });
        }

        if let Some(writer) = snapshot.as_mut() {
            writer.write_page(&raws).map_err(IngestError::Snapshot)?;
        }

        let (records, drops) = normalizer.normalize_page(&raws);

        let inserted = if options.dry_run {
            0
        } else {
            ticket_db::commit_page(conn, &records, &drops, next.as_ref(), &window)
                .map_err(|source| IngestError::Store { page, source })?
        };

        let raw_count = raws.len() as u64;
        result.pages_fetched += 1;
        result.records_fetched += raw_count;
        result.records_normalized += records.len() as u64;
        result.records_dropped += drops.len() as u64;
        result.records_inserted += inserted;
        let Some(next) = next else {
            log::warn!(
                "{}: page {page} has no record with both a ticket id and an issue date; \
                 dropped {} and stopping at {cursor}",
                source.label(),
                drops.len(),
            );
            progress.inc(raw_count);
            break;
        };
        cursor = next;
        result.final_cursor = cursor.clone();

        log::info!(
            "{}: page {page}: normalized {}/{raw_count}, dropped {}, inserted {inserted}, cursor {cursor}",
            source.label(),
            records.len(),
            drops.len(),
        );
        progress.inc(raw_count);
        progress.set_message(format!("page {page}, cursor {cursor}"));

        if raws.len() < request_size as usize {
            break;
        }
    }

    if let Some(writer) = snapshot {
        let written = writer.finish().map_err(IngestError::Snapshot)?;
        log::info!("Wrote {written} raw records to snapshot");
    }

    result.duration = start.elapsed();
    log::info!(
        "Ingest complete: {} pages, {} fetched, {} normalized, {} inserted, {} dropped, took {:.1}s{}",
        result.pages_fetched,
        result.records_fetched,
        result.records_normalized,
        result.records_inserted,
        result.records_dropped,
        result.duration.as_secs_f64(),
        if options.dry_run { " (dry run)" } else { "" },
    );
    progress.finish(format!(
        "{} records fetched, {} inserted",
        result.records_fetched, result.records_inserted
    ));

    Ok(result)
}
