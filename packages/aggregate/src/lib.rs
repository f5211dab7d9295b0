#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Segment/time aggregation of normalized tickets.
//!
//! [`aggregate`] and [`summarize`] are pure functions of the records they
//! are given; [`build_outputs`] reads the record store and writes the
//! derived tables through [`export`].

pub mod export;

use std::collections::BTreeMap;
use std::path::Path;

use parking_map_aggregate_models::{AggregateRow, OutputManifest, SegmentSummary};
use parking_map_database::DbError;
use parking_map_database::ticket_db::{self, RecordFilter};
use parking_map_source_models::{NormalizedRecord, SegmentKey};
use parking_map_source::progress::ProgressCallback;
use parking_map_ticket_models::{ConfidenceTier, TicketType};

/// Errors that can occur while building the derived tables.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// Reading the record store failed.
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// Writing an output table failed.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (output directory, manifest).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

type CellKey<'a> = (&'a SegmentKey, u8, u8, TicketType);

/// Counts records per `(segment_key, day_of_week, hour_of_day,
/// ticket_type)`.
///
/// Emits one row per non-empty cell, sorted by that tuple. Each row
/// carries its segment's confidence tier; when records sharing a key
/// disagree on the tier, the least precise one is reported.
#[must_use]
pub fn aggregate(records: &[NormalizedRecord]) -> Vec<AggregateRow> {
    let tiers = segment_tiers(records);

    let mut cells: BTreeMap<CellKey<'_>, u64> = BTreeMap::new();
    for record in records {
        *cells
            .entry((
                &record.segment_key,
                record.day_of_week,
                record.hour_of_day,
                record.ticket_type,
            ))
            .or_default() += 1;
    }

    cells
        .into_iter()
        .map(
            |((segment_key, day_of_week, hour_of_day, ticket_type), count)| AggregateRow {
                confidence_tier: tiers
                    .get(segment_key)
                    .copied()
                    .unwrap_or(ConfidenceTier::Unknown),
                segment_key: segment_key.clone(),
                day_of_week,
                hour_of_day,
                ticket_type,
                count,
            },
        )
        .collect()
}

fn segment_tiers(records: &[NormalizedRecord]) -> BTreeMap<&SegmentKey, ConfidenceTier> {
    let mut tiers: BTreeMap<&SegmentKey, ConfidenceTier> = BTreeMap::new();
    for record in records {
        tiers
            .entry(&record.segment_key)
            .and_modify(|tier| {
                if record.confidence_tier.precision() < tier.precision() {
                    *tier = record.confidence_tier;
                }
            })
            .or_insert(record.confidence_tier);
    }
    tiers
}

#[derive(Default)]
struct CoordinateMean {
    lat_sum: f64,
    lng_sum: f64,
    n: u32,
}

impl CoordinateMean {
    fn add(&mut self, lat: f64, lng: f64) {
        self.lat_sum += lat;
        self.lng_sum += lng;
        self.n += 1;
    }

    fn mean(&self) -> Option<(f64, f64)> {
        (self.n > 0).then(|| {
            let n = f64::from(self.n);
            (self.lat_sum / n, self.lng_sum / n)
        })
    }
}

/// Builds per-segment totals from the aggregate rows.
///
/// Counts come from `rows`; `records` only contribute mean coordinates.
/// Segments with fewer than `min_samples` tickets are left out. Output is
/// sorted by segment key.
#[must_use]
pub fn summarize(
    rows: &[AggregateRow],
    records: &[NormalizedRecord],
    min_samples: u64,
) -> Vec<SegmentSummary> {
    let mut coords: BTreeMap<&SegmentKey, CoordinateMean> = BTreeMap::new();
    for record in records {
        if let (Some(lat), Some(lng)) = (record.latitude, record.longitude) {
            coords.entry(&record.segment_key).or_default().add(lat, lng);
        }
    }

    let mut summaries: BTreeMap<&SegmentKey, SegmentSummary> = BTreeMap::new();
    for row in rows {
        let summary = summaries
            .entry(&row.segment_key)
            .or_insert_with(|| SegmentSummary {
                segment_key: row.segment_key.clone(),
                borough: row.segment_key.borough.clone(),
                confidence_tier: row.confidence_tier,
                total_count: 0,
                type_counts: BTreeMap::new(),
                mean_latitude: None,
                mean_longitude: None,
            });
        summary.total_count += row.count;
        *summary.type_counts.entry(row.ticket_type).or_default() += row.count;
    }

    summaries
        .into_iter()
        .filter(|(_, summary)| summary.total_count >= min_samples)
        .map(|(key, mut summary)| {
            if let Some((lat, lng)) = coords.get(key).and_then(CoordinateMean::mean) {
                summary.mean_latitude = Some(lat);
                summary.mean_longitude = Some(lng);
            }
            summary
        })
        .collect()
}

/// Returns the `n` busiest segments, ties broken by segment key.
#[must_use]
pub fn top_segments(summaries: &[SegmentSummary], n: usize) -> Vec<&SegmentSummary> {
    let mut sorted: Vec<&SegmentSummary> = summaries.iter().collect();
    sorted.sort_by(|a, b| {
        b.total_count
            .cmp(&a.total_count)
            .then_with(|| a.segment_key.cmp(&b.segment_key))
    });
    sorted.truncate(n);
    sorted
}

/// Reads every stored record, rebuilds both tables and writes them to
/// `output_dir`.
///
/// # Errors
///
/// Returns [`AggregateError`] if the store cannot be read or an output
/// cannot be written.
pub fn build_outputs(
    conn: &duckdb::Connection,
    output_dir: &Path,
    min_samples: u64,
    progress: &dyn ProgressCallback,
) -> Result<(OutputManifest, Vec<SegmentSummary>), AggregateError> {
    let records = ticket_db::all_records(conn, &RecordFilter::default())?;
    log::info!("Aggregating {} records", records.len());
    progress.set_total(records.len() as u64);

    let rows = aggregate(&records);
    let summaries = summarize(&rows, &records, min_samples);
    progress.inc(records.len() as u64);

    log::info!(
        "{} aggregate rows, {} segments with at least {min_samples} tickets",
        rows.len(),
        summaries.len()
    );

    let manifest = export::write_outputs(output_dir, &rows, &summaries, min_samples)?;
    progress.finish(format!("Wrote {}", output_dir.display()));

    Ok((manifest, summaries))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn record(
        id: &str,
        key: &SegmentKey,
        tier: ConfidenceTier,
        day: u8,
        hour: u8,
        ticket_type: TicketType,
    ) -> NormalizedRecord {
        NormalizedRecord {
            ticket_id: id.to_string(),
            issued_at: DateTime::<Utc>::UNIX_EPOCH,
            day_of_week: day,
            hour_of_day: hour,
            ticket_type,
            segment_key: key.clone(),
            confidence_tier: tier,
            violation_code: None,
            violation_description: None,
            latitude: None,
            longitude: None,
        }
    }

    fn sample() -> Vec<NormalizedRecord> {
        let segment = SegmentKey::new("MANHATTAN", "W 41 ST", "8 AVE", "7 AVE");
        let blockface = SegmentKey::new("BROOKLYN", "ATLANTIC AVE", "", "");
        let unknown = SegmentKey::unknown_location(None);
        vec![
            record("1", &segment, ConfidenceTier::Segment, 3, 19, TicketType::Parking),
            record("2", &segment, ConfidenceTier::Segment, 3, 19, TicketType::Parking),
            record("3", &segment, ConfidenceTier::Segment, 3, 20, TicketType::Parking),
            record("4", &segment, ConfidenceTier::Segment, 3, 19, TicketType::BusLaneCamera),
            record("5", &blockface, ConfidenceTier::Blockface, 0, 8, TicketType::Parking),
            record("6", &unknown, ConfidenceTier::Unknown, 6, 23, TicketType::Unclassified),
        ]
    }

    #[test]
    fn counts_are_conserved_per_segment() {
        let records = sample();
        let rows = aggregate(&records);

        let mut per_segment: BTreeMap<&SegmentKey, u64> = BTreeMap::new();
        for row in &rows {
            *per_segment.entry(&row.segment_key).or_default() += row.count;
        }
        let mut expected: BTreeMap<&SegmentKey, u64> = BTreeMap::new();
        for record in &records {
            *expected.entry(&record.segment_key).or_default() += 1;
        }
        assert_eq!(per_segment, expected);
        assert_eq!(rows.iter().map(|r| r.count).sum::<u64>(), 6);
    }

    #[test]
    fn one_row_per_non_empty_cell_in_key_order() {
        let rows = aggregate(&sample());
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.count > 0));

        let keys: Vec<_> = rows
            .iter()
            .map(|r| (&r.segment_key, r.day_of_week, r.hour_of_day, r.ticket_type))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        let busiest = rows
            .iter()
            .find(|r| r.hour_of_day == 19 && r.ticket_type == TicketType::Parking)
            .unwrap();
        assert_eq!(busiest.count, 2);
        assert_eq!(busiest.confidence_tier, ConfidenceTier::Segment);
    }

    #[test]
    fn unknown_bucket_is_aggregated() {
        let rows = aggregate(&sample());
        let unknown: Vec<_> = rows
            .iter()
            .filter(|r| r.segment_key.is_unknown_location())
            .collect();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].confidence_tier, ConfidenceTier::Unknown);
    }

    #[test]
    fn summary_applies_threshold_without_touching_rows() {
        let records = sample();
        let rows = aggregate(&records);

        let all = summarize(&rows, &records, 1);
        assert_eq!(all.len(), 3);

        let busy = summarize(&rows, &records, 2);
        assert_eq!(busy.len(), 1);
        let summary = &busy[0];
        assert_eq!(summary.borough, "MANHATTAN");
        assert_eq!(summary.total_count, 4);
        assert_eq!(summary.count_for(TicketType::Parking), 3);
        assert_eq!(summary.count_for(TicketType::BusLaneCamera), 1);
        assert_eq!(summary.confidence_tier, ConfidenceTier::Segment);

        assert_eq!(aggregate(&records), rows);
    }

    #[test]
    fn summary_carries_mean_coordinates() {
        let mut records = sample();
        records[0].latitude = Some(40.0);
        records[0].longitude = Some(-74.0);
        records[1].latitude = Some(41.0);
        records[1].longitude = Some(-73.0);

        let rows = aggregate(&records);
        let summaries = summarize(&rows, &records, 1);
        let segment = summaries
            .iter()
            .find(|s| s.segment_key.borough == "MANHATTAN")
            .unwrap();
        assert_eq!(segment.mean_latitude, Some(40.5));
        assert_eq!(segment.mean_longitude, Some(-73.5));

        let blockface = summaries
            .iter()
            .find(|s| s.segment_key.borough == "BROOKLYN")
            .unwrap();
        assert_eq!(blockface.mean_latitude, None);
    }

    #[test]
    fn mixed_tiers_report_least_precise() {
        let key = SegmentKey::new("QUEENS", "X", "", "");
        let records = vec![
            record("1", &key, ConfidenceTier::Blockface, 1, 1, TicketType::Parking),
            record("2", &key, ConfidenceTier::Unknown, 1, 2, TicketType::Parking),
        ];
        let rows = aggregate(&records);
        assert!(rows.iter().all(|r| r.confidence_tier == ConfidenceTier::Unknown));
    }

    #[test]
    fn top_segments_orders_by_count() {
        let records = sample();
        let rows = aggregate(&records);
        let summaries = summarize(&rows, &records, 0);
        let top = top_segments(&summaries, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].total_count, 4);
        // Ties on one ticket break by key: BROOKLYN before UNKNOWN.
        assert_eq!(top[1].borough, "BROOKLYN");
    }

    #[test]
    fn empty_input_yields_empty_tables() {
        let rows = aggregate(&[]);
        assert!(rows.is_empty());
        assert!(summarize(&rows, &[], 0).is_empty());
    }
}
