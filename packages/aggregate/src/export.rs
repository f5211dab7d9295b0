//! Parquet and manifest export of the derived tables.
//!
//! Tables are staged in an in-memory `DuckDB` database and written with
//! `COPY (SELECT ... ORDER BY ...) TO ... (FORMAT PARQUET)`. A single
//! `DuckDB` thread and an explicit sort order keep the files byte-identical
//! across runs over the same store.

use std::path::Path;

use duckdb::Connection;
use parking_map_aggregate_models::{
    AggregateRow, ColumnSpec, MANIFEST_FILE, OUTPUT_SCHEMA_VERSION, OutputManifest,
    SUMMARY_FILE, SegmentSummary, TIME_COUNTS_FILE, TableManifest,
};
use parking_map_ticket_models::TicketType;

use crate::AggregateError;

const TIME_COUNTS_TABLE: &str = "segment_time_counts";
const SUMMARY_TABLE: &str = "segment_summary";

const KEY_COLUMNS: &str = "borough, street_name, cross_from, cross_to";

fn key_columns() -> Vec<ColumnSpec> {
    ["borough", "street_name", "cross_from", "cross_to"]
        .into_iter()
        .map(|name| ColumnSpec::new(name, "VARCHAR"))
        .collect()
}

/// Column layout of `segment_time_counts.parquet`.
#[must_use]
pub fn time_count_columns() -> Vec<ColumnSpec> {
    let mut columns = key_columns();
    columns.extend([
        ColumnSpec::new("day_of_week", "SMALLINT"),
        ColumnSpec::new("hour_of_day", "SMALLINT"),
        ColumnSpec::new("ticket_type", "VARCHAR"),
        ColumnSpec::new("ticket_class", "VARCHAR"),
        ColumnSpec::new("confidence_tier", "VARCHAR"),
        ColumnSpec::new("count", "BIGINT"),
    ]);
    columns
}

/// Column layout of `segment_summary.parquet`: one `count_*` column per
/// ticket type.
#[must_use]
pub fn summary_columns() -> Vec<ColumnSpec> {
    let mut columns = key_columns();
    columns.push(ColumnSpec::new("confidence_tier", "VARCHAR"));
    columns.push(ColumnSpec::new("total_count", "BIGINT"));
    columns.extend(
        TicketType::all()
            .iter()
            .map(|t| ColumnSpec::new(type_count_column(*t), "BIGINT")),
    );
    columns.push(ColumnSpec::new("mean_latitude", "DOUBLE"));
    columns.push(ColumnSpec::new("mean_longitude", "DOUBLE"));
    columns
}

fn type_count_column(ticket_type: TicketType) -> String {
    format!("count_{}", ticket_type.as_ref().to_lowercase())
}

/// Writes both tables and `manifest.json` into `output_dir`, creating it
/// if needed. Existing files are overwritten.
///
/// # Errors
///
/// Returns [`AggregateError`] if staging, the Parquet copy or the manifest
/// write fails.
pub fn write_outputs(
    output_dir: &Path,
    rows: &[AggregateRow],
    summaries: &[SegmentSummary],
    min_samples: u64,
) -> Result<OutputManifest, AggregateError> {
    std::fs::create_dir_all(output_dir)?;

    let conn = Connection::open_in_memory()?;
    conn.execute_batch("SET threads = 1;")?;

    let time_columns = time_count_columns();
    create_table(&conn, TIME_COUNTS_TABLE, &time_columns)?;
    stage_time_counts(&conn, rows)?;
    copy_to_parquet(
        &conn,
        TIME_COUNTS_TABLE,
        &format!("{KEY_COLUMNS}, day_of_week, hour_of_day, ticket_type"),
        &output_dir.join(TIME_COUNTS_FILE),
    )?;

    let summary_columns = summary_columns();
    create_table(&conn, SUMMARY_TABLE, &summary_columns)?;
    stage_summaries(&conn, summaries)?;
    copy_to_parquet(
        &conn,
        SUMMARY_TABLE,
        KEY_COLUMNS,
        &output_dir.join(SUMMARY_FILE),
    )?;

    let manifest = OutputManifest {
        schema_version: OUTPUT_SCHEMA_VERSION,
        min_samples,
        tables: vec![
            TableManifest {
                name: TIME_COUNTS_TABLE.to_string(),
                file: TIME_COUNTS_FILE.to_string(),
                row_count: rows.len() as u64,
                columns: time_columns,
            },
            TableManifest {
                name: SUMMARY_TABLE.to_string(),
                file: SUMMARY_FILE.to_string(),
                row_count: summaries.len() as u64,
                columns: summary_columns,
            },
        ],
    };

    let mut json = serde_json::to_string_pretty(&manifest)?;
    json.push('\n');
    std::fs::write(output_dir.join(MANIFEST_FILE), json)?;

    log::info!(
        "Wrote {} time-count rows and {} segment summaries to {}",
        rows.len(),
        summaries.len(),
        output_dir.display()
    );

    Ok(manifest)
}

fn create_table(conn: &Connection, table: &str, columns: &[ColumnSpec]) -> Result<(), AggregateError> {
    let column_defs = columns
        .iter()
        .map(|c| format!("\"{}\" {}", c.name, c.data_type))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!("CREATE TABLE {table} ({column_defs});"))?;
    Ok(())
}

fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn stage_time_counts(conn: &Connection, rows: &[AggregateRow]) -> Result<(), AggregateError> {
    conn.execute_batch("BEGIN TRANSACTION")?;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {TIME_COUNTS_TABLE} VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))?;

    for row in rows {
        let key = &row.segment_key;
        stmt.execute(duckdb::params![
            key.borough,
            key.street_name,
            key.cross_from,
            key.cross_to,
            i16::from(row.day_of_week),
            i16::from(row.hour_of_day),
            row.ticket_type.as_ref(),
            row.ticket_type.class().as_ref(),
            row.confidence_tier.as_ref(),
            to_bigint(row.count),
        ])?;
    }

    conn.execute_batch("COMMIT")?;
    Ok(())
}

fn stage_summaries(conn: &Connection, summaries: &[SegmentSummary]) -> Result<(), AggregateError> {
    let types = TicketType::all();
    // 4 key columns, tier, total, one per type, 2 coordinates.
    let placeholders = vec!["?"; 6 + types.len() + 2].join(", ");

    conn.execute_batch("BEGIN TRANSACTION")?;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {SUMMARY_TABLE} VALUES ({placeholders})"
    ))?;

    for summary in summaries {
        let key = &summary.segment_key;
        stmt.raw_bind_parameter(1, &key.borough)?;
        stmt.raw_bind_parameter(2, &key.street_name)?;
        stmt.raw_bind_parameter(3, &key.cross_from)?;
        stmt.raw_bind_parameter(4, &key.cross_to)?;
        stmt.raw_bind_parameter(5, summary.confidence_tier.as_ref())?;
        stmt.raw_bind_parameter(6, to_bigint(summary.total_count))?;

        let mut idx = 7;
        for ticket_type in types {
            stmt.raw_bind_parameter(idx, to_bigint(summary.count_for(*ticket_type)))?;
            idx += 1;
        }
        stmt.raw_bind_parameter(idx, summary.mean_latitude)?;
        stmt.raw_bind_parameter(idx + 1, summary.mean_longitude)?;

        stmt.raw_execute()?;
    }

    conn.execute_batch("COMMIT")?;
    Ok(())
}

fn copy_to_parquet(
    conn: &Connection,
    table: &str,
    order_by: &str,
    path: &Path,
) -> Result<(), AggregateError> {
    let target = path.display().to_string().replace('\'', "''");
    conn.execute_batch(&format!(
        "COPY (SELECT * FROM {table} ORDER BY {order_by}) TO '{target}' (FORMAT PARQUET);"
    ))?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use parking_map_source_models::SegmentKey;
    use parking_map_ticket_models::ConfidenceTier;

    use super::*;

    fn rows() -> Vec<AggregateRow> {
        let segment = SegmentKey::new("MANHATTAN", "W 41 ST", "8 AVE", "7 AVE");
        vec![
            AggregateRow {
                segment_key: segment.clone(),
                day_of_week: 3,
                hour_of_day: 19,
                ticket_type: TicketType::Parking,
                confidence_tier: ConfidenceTier::Segment,
                count: 2,
            },
            AggregateRow {
                segment_key: segment,
                day_of_week: 3,
                hour_of_day: 19,
                ticket_type: TicketType::BusLaneCamera,
                confidence_tier: ConfidenceTier::Segment,
                count: 1,
            },
            AggregateRow {
                segment_key: SegmentKey::unknown_location(None),
                day_of_week: 6,
                hour_of_day: 23,
                ticket_type: TicketType::Unclassified,
                confidence_tier: ConfidenceTier::Unknown,
                count: 1,
            },
        ]
    }

    fn summaries() -> Vec<SegmentSummary> {
        vec![SegmentSummary {
            segment_key: SegmentKey::new("MANHATTAN", "W 41 ST", "8 AVE", "7 AVE"),
            borough: "MANHATTAN".to_string(),
            confidence_tier: ConfidenceTier::Segment,
            total_count: 3,
            type_counts: BTreeMap::from([
                (TicketType::Parking, 2),
                (TicketType::BusLaneCamera, 1),
            ]),
            mean_latitude: Some(40.758),
            mean_longitude: None,
        }]
    }

    #[test]
    fn manifest_describes_written_tables() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_outputs(dir.path(), &rows(), &summaries(), 2).unwrap();

        assert_eq!(manifest.schema_version, OUTPUT_SCHEMA_VERSION);
        assert_eq!(manifest.table(TIME_COUNTS_TABLE).unwrap().row_count, 3);
        assert_eq!(manifest.table(SUMMARY_TABLE).unwrap().row_count, 1);
        assert!(
            summary_columns()
                .iter()
                .any(|c| c.name == "count_school_zone_speed_camera")
        );

        let on_disk: OutputManifest = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk, manifest);
    }

    #[test]
    fn parquet_tables_read_back() {
        let dir = tempfile::tempdir().unwrap();
        write_outputs(dir.path(), &rows(), &summaries(), 2).unwrap();

        let conn = Connection::open_in_memory().unwrap();
        let counts = dir.path().join(TIME_COUNTS_FILE);
        let total: i64 = conn
            .query_row(
                &format!("SELECT SUM(\"count\")::BIGINT FROM read_parquet('{}')", counts.display()),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(total, 4);

        let summary = dir.path().join(SUMMARY_FILE);
        let (parking, bus_lane): (i64, i64) = conn
            .query_row(
                &format!(
                    "SELECT count_parking, count_bus_lane_camera FROM read_parquet('{}')",
                    summary.display()
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((parking, bus_lane), (2, 1));
    }

    #[test]
    fn reruns_are_byte_identical() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write_outputs(first.path(), &rows(), &summaries(), 2).unwrap();
        write_outputs(second.path(), &rows(), &summaries(), 2).unwrap();

        for file in [TIME_COUNTS_FILE, SUMMARY_FILE, MANIFEST_FILE] {
            let a = std::fs::read(first.path().join(file)).unwrap();
            let b = std::fs::read(second.path().join(file)).unwrap();
            assert_eq!(a, b, "{file} differs between runs");
        }
    }

    #[test]
    fn empty_tables_still_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_outputs(dir.path(), &[], &[], 5).unwrap();
        assert_eq!(manifest.table(SUMMARY_TABLE).unwrap().row_count, 0);
        assert!(dir.path().join(TIME_COUNTS_FILE).exists());
        assert!(dir.path().join(SUMMARY_FILE).exists());
    }
}
