//! Ticket record store and ingest cursor store.
//!
//! The database file (default `data/parking_tickets.duckdb`) contains:
//!
//! - `tickets`: one row per normalized record, keyed by `ticket_id`.
//!   Append-only: a ticket id that already exists is silently ignored, so
//!   the first committed version of a ticket wins.
//! - `dropped_records`: the drop ledger of malformed raw records.
//! - `_meta`: key/value pairs; the cursor lives under
//!   [`CURSOR_ISSUE_DATE_KEY`] and [`CURSOR_TICKET_ID_KEY`], the window it
//!   was reached in under [`WINDOW_FROM_KEY`] and [`WINDOW_TO_KEY`].
//!
//! [`commit_page`] writes a page's records, drops, cursor and window in a
//! single transaction, so an interrupted run never leaves the cursor ahead of (or
//! behind) the stored records.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::Connection;
use parking_map_source_models::{
    DroppedRecord, IngestCursor, IngestWindow, NormalizedRecord, SegmentKey,
};
use parking_map_ticket_models::{ConfidenceTier, TicketType};

use crate::DbError;

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 2_000;

/// `_meta` key holding the cursor's raw issue date.
pub const CURSOR_ISSUE_DATE_KEY: &str = "cursor_issue_date";

/// `_meta` key holding the cursor's ticket id.
pub const CURSOR_TICKET_ID_KEY: &str = "cursor_ticket_id";

/// `_meta` key holding the first issue date of the cursor's window.
pub const WINDOW_FROM_KEY: &str = "window_issue_date_from";

/// `_meta` key holding the last issue date of the cursor's window.
pub const WINDOW_TO_KEY: &str = "window_issue_date_to";

const WINDOW_DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp layout used when binding `issued_at`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Optional restrictions for [`all_records`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Inclusive lower bound on `issued_at`.
    pub issued_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `issued_at`.
    pub issued_before: Option<DateTime<Utc>>,
    /// Restrict to these ticket types. Empty means all types.
    pub ticket_types: Vec<TicketType>,
}

/// Opens (or creates) the ticket database and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    create_schema(&conn)?;

    log::debug!("Opened ticket database at {}", path.display());
    Ok(conn)
}

/// Opens a fresh in-memory ticket database.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tickets (
            ticket_id TEXT NOT NULL PRIMARY KEY,
            issued_at TIMESTAMP NOT NULL,
            day_of_week SMALLINT NOT NULL,
            hour_of_day SMALLINT NOT NULL,
            ticket_type TEXT NOT NULL,
            borough TEXT NOT NULL,
            street_name TEXT NOT NULL,
            cross_from TEXT NOT NULL,
            cross_to TEXT NOT NULL,
            confidence_tier TEXT NOT NULL,
            violation_code TEXT,
            violation_description TEXT,
            latitude DOUBLE,
            longitude DOUBLE
        );

        CREATE TABLE IF NOT EXISTS dropped_records (
            drop_key TEXT NOT NULL PRIMARY KEY,
            ticket_id TEXT,
            reason TEXT NOT NULL,
            detail TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    Ok(())
}

/// Appends normalized records, ignoring ticket ids that are already
/// stored. Within the batch the first occurrence of an id wins.
///
/// Returns the number of rows actually inserted.
///
/// # Errors
///
/// Returns [`DbError`] if any database operation fails.
pub fn append_batch(conn: &Connection, records: &[NormalizedRecord]) -> Result<u64, DbError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut seen = BTreeSet::new();
    let deduped: Vec<&NormalizedRecord> = records
        .iter()
        .filter(|record| seen.insert(record.ticket_id.as_str()))
        .collect();

    if deduped.len() < records.len() {
        log::info!(
            "Deduplicated INSERT batch: {} -> {} rows ({} duplicates removed)",
            records.len(),
            deduped.len(),
            records.len() - deduped.len(),
        );
    }

    let before = record_count(conn)?;

    for chunk in deduped.chunks(CHUNK_SIZE) {
        let mut sql = String::from(
            "INSERT INTO tickets (
                ticket_id, issued_at, day_of_week, hour_of_day, ticket_type,
                borough, street_name, cross_from, cross_to, confidence_tier,
                violation_code, violation_description, latitude, longitude
            ) VALUES ",
        );

        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str("(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)");
        }

        sql.push_str(" ON CONFLICT (ticket_id) DO NOTHING");

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for record in chunk {
            let key = &record.segment_key;

            stmt.raw_bind_parameter(param_idx, &record.ticket_id)?;
            stmt.raw_bind_parameter(
                param_idx + 1,
                record.issued_at.format(TIMESTAMP_FORMAT).to_string(),
            )?;
            stmt.raw_bind_parameter(param_idx + 2, i16::from(record.day_of_week))?;
            stmt.raw_bind_parameter(param_idx + 3, i16::from(record.hour_of_day))?;
            stmt.raw_bind_parameter(param_idx + 4, record.ticket_type.as_ref())?;
            stmt.raw_bind_parameter(param_idx + 5, &key.borough)?;
            stmt.raw_bind_parameter(param_idx + 6, &key.street_name)?;
            stmt.raw_bind_parameter(param_idx + 7, &key.cross_from)?;
            stmt.raw_bind_parameter(param_idx + 8, &key.cross_to)?;
            stmt.raw_bind_parameter(param_idx + 9, record.confidence_tier.as_ref())?;
            stmt.raw_bind_parameter(param_idx + 10, record.violation_code.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 11, record.violation_description.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 12, record.latitude)?;
            stmt.raw_bind_parameter(param_idx + 13, record.longitude)?;

            param_idx += 14;
        }

        stmt.raw_execute()?;
    }

    let after = record_count(conn)?;
    Ok(after.saturating_sub(before))
}

/// Appends entries to the drop ledger. An identical entry (same reason,
/// ticket id and detail) is stored only once, so re-ingesting a page does
/// not inflate the ledger.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn append_drops(conn: &Connection, drops: &[DroppedRecord]) -> Result<(), DbError> {
    if drops.is_empty() {
        return Ok(());
    }

    let mut stmt = conn.prepare(
        "INSERT INTO dropped_records (drop_key, ticket_id, reason, detail)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (drop_key) DO NOTHING",
    )?;

    for drop in drops {
        let drop_key = format!(
            "{}|{}|{}",
            drop.reason,
            drop.ticket_id.as_deref().unwrap_or_default(),
            drop.detail
        );
        stmt.execute(duckdb::params![
            drop_key,
            drop.ticket_id.as_deref(),
            drop.reason.as_ref(),
            drop.detail,
        ])?;
    }

    Ok(())
}

/// Writes one page atomically: records, drop-ledger entries and (when
/// given) the advanced cursor together with its window. Either everything
/// is visible afterwards or nothing is.
///
/// Returns the number of records inserted.
///
/// # Errors
///
/// Returns [`DbError`] if any write fails; the transaction is rolled back.
pub fn commit_page(
    conn: &Connection,
    records: &[NormalizedRecord],
    drops: &[DroppedRecord],
    cursor: Option<&IngestCursor>,
    window: &IngestWindow,
) -> Result<u64, DbError> {
    conn.execute_batch("BEGIN TRANSACTION")?;

    match write_page(conn, records, drops, cursor, window) {
        Ok(inserted) => {
            conn.execute_batch("COMMIT")?;
            Ok(inserted)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                log::error!("Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

fn write_page(
    conn: &Connection,
    records: &[NormalizedRecord],
    drops: &[DroppedRecord],
    cursor: Option<&IngestCursor>,
    window: &IngestWindow,
) -> Result<u64, DbError> {
    let inserted = append_batch(conn, records)?;
    append_drops(conn, drops)?;
    if let Some(cursor) = cursor {
        set_cursor(conn, cursor)?;
        set_window(conn, window)?;
    }
    Ok(inserted)
}

/// Reads stored records matching `filter`, ordered by `ticket_id`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored value cannot be
/// converted back.
pub fn all_records(
    conn: &Connection,
    filter: &RecordFilter,
) -> Result<Vec<NormalizedRecord>, DbError> {
    let mut sql = String::from(
        "SELECT ticket_id, issued_at::TEXT, day_of_week, hour_of_day, ticket_type,
                borough, street_name, cross_from, cross_to, confidence_tier,
                violation_code, violation_description, latitude, longitude
         FROM tickets",
    );
    let mut clauses = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(from) = filter.issued_from {
        clauses.push("issued_at >= CAST(? AS TIMESTAMP)".to_string());
        params.push(from.format(TIMESTAMP_FORMAT).to_string());
    }
    if let Some(before) = filter.issued_before {
        clauses.push("issued_at < CAST(? AS TIMESTAMP)".to_string());
        params.push(before.format(TIMESTAMP_FORMAT).to_string());
    }
    if !filter.ticket_types.is_empty() {
        let placeholders = vec!["?"; filter.ticket_types.len()].join(", ");
        clauses.push(format!("ticket_type IN ({placeholders})"));
        params.extend(filter.ticket_types.iter().map(ToString::to_string));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY ticket_id");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(duckdb::params_from_iter(params.iter()))?;
    let mut records = Vec::new();

    while let Some(row) = rows.next()? {
        let ticket_id: String = row.get(0)?;
        let issued_at_text: String = row.get(1)?;
        let day_of_week: i16 = row.get(2)?;
        let hour_of_day: i16 = row.get(3)?;
        let ticket_type: String = row.get(4)?;
        let confidence_tier: String = row.get(9)?;

        let issued_at = parse_timestamp(&issued_at_text).ok_or_else(|| DbError::Conversion {
            message: format!("ticket {ticket_id}: bad issued_at {issued_at_text:?}"),
        })?;

        records.push(NormalizedRecord {
            issued_at,
            day_of_week: small_to_u8(&ticket_id, day_of_week)?,
            hour_of_day: small_to_u8(&ticket_id, hour_of_day)?,
            ticket_type: TicketType::from_str(&ticket_type).map_err(|_| DbError::Conversion {
                message: format!("ticket {ticket_id}: unknown ticket type {ticket_type:?}"),
            })?,
            segment_key: SegmentKey::new(
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ),
            confidence_tier: ConfidenceTier::from_str(&confidence_tier).map_err(|_| {
                DbError::Conversion {
                    message: format!(
                        "ticket {ticket_id}: unknown confidence tier {confidence_tier:?}"
                    ),
                }
            })?,
            violation_code: row.get(10)?,
            violation_description: row.get(11)?,
            latitude: row.get(12)?,
            longitude: row.get(13)?,
            ticket_id,
        });
    }

    Ok(records)
}

fn small_to_u8(ticket_id: &str, value: i16) -> Result<u8, DbError> {
    u8::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("ticket {ticket_id}: value {value} out of range"),
    })
}

/// Returns the number of stored tickets.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
#[allow(clippy::cast_sign_loss)]
pub fn record_count(conn: &Connection) -> Result<u64, DbError> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM tickets")?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(count as u64)
}

/// Returns drop-ledger counts keyed by reason.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn drop_counts(conn: &Connection) -> Result<BTreeMap<String, u64>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT reason, COUNT(*) FROM dropped_records GROUP BY reason ORDER BY reason",
    )?;
    let mut rows = stmt.query([])?;

    let mut counts = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let reason: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        #[allow(clippy::cast_sign_loss)]
        counts.insert(reason, count as u64);
    }

    Ok(counts)
}

/// Returns the persisted cursor, or [`IngestCursor::Beginning`] when none
/// has been stored.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_cursor(conn: &Connection) -> Result<IngestCursor, DbError> {
    let issue_date = get_meta(conn, CURSOR_ISSUE_DATE_KEY)?;
    let ticket_id = get_meta(conn, CURSOR_TICKET_ID_KEY)?;

    Ok(match (issue_date, ticket_id) {
        (Some(issue_date), Some(ticket_id)) => IngestCursor::At {
            issue_date,
            ticket_id,
        },
        (None, None) => IngestCursor::Beginning,
        (issue_date, ticket_id) => {
            log::warn!(
                "Incomplete cursor in _meta (issue_date={issue_date:?}, ticket_id={ticket_id:?}); \
                 starting from the beginning"
            );
            IngestCursor::Beginning
        }
    })
}

/// Persists the cursor. Storing [`IngestCursor::Beginning`] clears it.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub fn set_cursor(conn: &Connection, cursor: &IngestCursor) -> Result<(), DbError> {
    match cursor {
        IngestCursor::Beginning => {
            conn.execute(
                "DELETE FROM _meta WHERE key IN (?, ?)",
                duckdb::params![CURSOR_ISSUE_DATE_KEY, CURSOR_TICKET_ID_KEY],
            )?;
        }
        IngestCursor::At {
            issue_date,
            ticket_id,
        } => {
            set_meta(conn, CURSOR_ISSUE_DATE_KEY, issue_date)?;
            set_meta(conn, CURSOR_TICKET_ID_KEY, ticket_id)?;
        }
    }
    Ok(())
}

/// Returns the window the persisted cursor belongs to. Unbounded when
/// none has been stored.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored date is malformed.
pub fn get_window(conn: &Connection) -> Result<IngestWindow, DbError> {
    let read = |key: &str| -> Result<Option<NaiveDate>, DbError> {
        get_meta(conn, key)?
            .map(|value| {
                NaiveDate::parse_from_str(&value, WINDOW_DATE_FORMAT).map_err(|e| {
                    DbError::Conversion {
                        message: format!("invalid {key} {value:?}: {e}"),
                    }
                })
            })
            .transpose()
    };

    Ok(IngestWindow::new(read(WINDOW_FROM_KEY)?, read(WINDOW_TO_KEY)?))
}

/// Persists the cursor's window. Unset bounds are removed.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub fn set_window(conn: &Connection, window: &IngestWindow) -> Result<(), DbError> {
    for (key, bound) in [
        (WINDOW_FROM_KEY, window.issue_date_from),
        (WINDOW_TO_KEY, window.issue_date_to),
    ] {
        match bound {
            Some(date) => set_meta(conn, key, &date.format(WINDOW_DATE_FORMAT).to_string())?,
            None => {
                conn.execute("DELETE FROM _meta WHERE key = ?", [key])?;
            }
        }
    }
    Ok(())
}

/// Gets a metadata value from the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM _meta WHERE key = ?")?;
    let result = stmt.query_row([key], |row| row.get(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        duckdb::params![key, value],
    )?;
    Ok(())
}

/// Parses `DuckDB`'s `TIMESTAMP::TEXT` output (with or without fractional
/// seconds) as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use parking_map_source_models::DropReason;

    use super::*;

    fn record(id: &str, hour: u32, ticket_type: TicketType) -> NormalizedRecord {
        let issued_at = Utc.with_ymd_and_hms(2023, 1, 5, hour, 30, 0).unwrap();
        NormalizedRecord {
            ticket_id: id.to_string(),
            issued_at,
            day_of_week: 3,
            hour_of_day: u8::try_from(hour).unwrap(),
            ticket_type,
            segment_key: SegmentKey::new("MANHATTAN", "W 41 ST", "8 AVE", "7 AVE"),
            confidence_tier: ConfidenceTier::Segment,
            violation_code: Some("21".to_string()),
            violation_description: None,
            latitude: Some(40.758),
            longitude: Some(-73.9855),
        }
    }

    fn cursor(date: &str, id: &str) -> IngestCursor {
        IngestCursor::At {
            issue_date: date.to_string(),
            ticket_id: id.to_string(),
        }
    }

    #[test]
    fn records_round_trip_through_store() {
        let conn = open_in_memory().unwrap();
        let original = record("100", 19, TicketType::Parking);
        assert_eq!(append_batch(&conn, std::slice::from_ref(&original)).unwrap(), 1);

        let stored = all_records(&conn, &RecordFilter::default()).unwrap();
        assert_eq!(stored, vec![original]);
    }

    #[test]
    fn existing_ids_are_ignored() {
        let conn = open_in_memory().unwrap();
        let first = record("100", 10, TicketType::Parking);
        append_batch(&conn, &[first.clone()]).unwrap();

        let mut changed = first.clone();
        changed.ticket_type = TicketType::RedLightCamera;
        let inserted = append_batch(&conn, &[changed, record("101", 11, TicketType::Parking)])
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(record_count(&conn).unwrap(), 2);
        let stored = all_records(&conn, &RecordFilter::default()).unwrap();
        assert_eq!(stored[0], first);
    }

    #[test]
    fn first_occurrence_wins_within_batch() {
        let conn = open_in_memory().unwrap();
        let first = record("100", 10, TicketType::Parking);
        let mut second = first.clone();
        second.hour_of_day = 11;

        assert_eq!(append_batch(&conn, &[first.clone(), second]).unwrap(), 1);
        let stored = all_records(&conn, &RecordFilter::default()).unwrap();
        assert_eq!(stored, vec![first]);
    }

    #[test]
    fn filters_by_time_and_type() {
        let conn = open_in_memory().unwrap();
        append_batch(
            &conn,
            &[
                record("1", 8, TicketType::Parking),
                record("2", 12, TicketType::RedLightCamera),
                record("3", 16, TicketType::Parking),
            ],
        )
        .unwrap();

        let filter = RecordFilter {
            issued_from: Some(Utc.with_ymd_and_hms(2023, 1, 5, 9, 0, 0).unwrap()),
            issued_before: None,
            ticket_types: vec![TicketType::Parking],
        };
        let ids: Vec<_> = all_records(&conn, &filter)
            .unwrap()
            .into_iter()
            .map(|r| r.ticket_id)
            .collect();
        assert_eq!(ids, ["3"]);

        let filter = RecordFilter {
            issued_before: Some(Utc.with_ymd_and_hms(2023, 1, 5, 12, 30, 0).unwrap()),
            ..RecordFilter::default()
        };
        assert_eq!(all_records(&conn, &filter).unwrap().len(), 1);
    }

    #[test]
    fn cursor_defaults_to_beginning_and_persists() {
        let conn = open_in_memory().unwrap();
        assert_eq!(get_cursor(&conn).unwrap(), IngestCursor::Beginning);

        let at = cursor("2023-01-05T00:00:00.000", "1234");
        set_cursor(&conn, &at).unwrap();
        assert_eq!(get_cursor(&conn).unwrap(), at);

        set_cursor(&conn, &IngestCursor::Beginning).unwrap();
        assert_eq!(get_cursor(&conn).unwrap(), IngestCursor::Beginning);
    }

    #[test]
    fn commit_page_is_atomic() {
        let conn = open_in_memory().unwrap();
        let drops = vec![DroppedRecord {
            ticket_id: Some("9".to_string()),
            reason: DropReason::UnparsableTimestamp,
            detail: "issue_date=\"garbage\"".to_string(),
        }];
        let at = cursor("2023-01-05T00:00:00.000", "2");

        let inserted = commit_page(
            &conn,
            &[
                record("1", 8, TicketType::Parking),
                record("2", 9, TicketType::Parking),
            ],
            &drops,
            Some(&at),
            &IngestWindow::default(),
        )
        .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(get_cursor(&conn).unwrap(), at);
        assert_eq!(
            drop_counts(&conn).unwrap().get("unparsable timestamp"),
            Some(&1)
        );

        // Re-committing the same page changes nothing.
        let inserted = commit_page(
            &conn,
            &[record("1", 8, TicketType::Parking)],
            &drops,
            Some(&at),
            &IngestWindow::default(),
        )
        .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(record_count(&conn).unwrap(), 2);
        assert_eq!(
            drop_counts(&conn).unwrap().get("unparsable timestamp"),
            Some(&1)
        );
    }

    #[test]
    fn failed_commit_leaves_nothing_behind() {
        let conn = open_in_memory().unwrap();
        conn.execute_batch("DROP TABLE dropped_records").unwrap();

        let drops = vec![DroppedRecord {
            ticket_id: None,
            reason: DropReason::MissingTicketId,
            detail: String::new(),
        }];
        let result = commit_page(
            &conn,
            &[record("1", 8, TicketType::Parking)],
            &drops,
            Some(&cursor("2023-01-05T00:00:00.000", "1")),
            &IngestWindow::new(NaiveDate::from_ymd_opt(2023, 1, 5), None),
        );

        assert!(result.is_err());
        assert_eq!(record_count(&conn).unwrap(), 0);
        assert_eq!(get_cursor(&conn).unwrap(), IngestCursor::Beginning);
        assert!(get_window(&conn).unwrap().is_unbounded());
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.duckdb");
        let at = cursor("2023-01-05T00:00:00.000", "1");
        let window = IngestWindow::new(
            NaiveDate::from_ymd_opt(2023, 1, 1),
            NaiveDate::from_ymd_opt(2023, 1, 31),
        );

        {
            let conn = open(&path).unwrap();
            commit_page(
                &conn,
                &[record("1", 8, TicketType::Parking)],
                &[],
                Some(&at),
                &window,
            )
            .unwrap();
        }

        let conn = open(&path).unwrap();
        assert_eq!(record_count(&conn).unwrap(), 1);
        assert_eq!(get_cursor(&conn).unwrap(), at);
        assert_eq!(get_window(&conn).unwrap(), window);
    }

    #[test]
    fn window_persists_and_clears() {
        let conn = open_in_memory().unwrap();
        assert!(get_window(&conn).unwrap().is_unbounded());

        let window = IngestWindow::new(NaiveDate::from_ymd_opt(2023, 1, 2), None);
        set_window(&conn, &window).unwrap();
        assert_eq!(get_window(&conn).unwrap(), window);
        assert_eq!(
            get_meta(&conn, WINDOW_FROM_KEY).unwrap().as_deref(),
            Some("2023-01-02")
        );

        set_window(&conn, &IngestWindow::default()).unwrap();
        assert!(get_window(&conn).unwrap().is_unbounded());
    }

    #[test]
    fn fractional_seconds_survive_round_trip() {
        let conn = open_in_memory().unwrap();
        let mut original = record("100", 19, TicketType::Parking);
        original.issued_at += chrono::Duration::milliseconds(500);
        append_batch(&conn, std::slice::from_ref(&original)).unwrap();

        let stored = all_records(&conn, &RecordFilter::default()).unwrap();
        assert_eq!(stored, vec![original]);
    }

    #[test]
    fn parses_duckdb_timestamp_text() {
        assert_eq!(
            parse_timestamp("2023-01-05 19:30:00").unwrap().to_rfc3339(),
            "2023-01-05T19:30:00+00:00"
        );
        assert!(parse_timestamp("2023-01-05 19:30:00.250").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
