#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Derived output tables consumed by the presentation layer.
//!
//! Two tables are produced from the record store: [`AggregateRow`]s
//! (ticket counts per segment, day of week, hour and ticket type) and
//! [`SegmentSummary`]s (per-segment totals). Their on-disk layout is
//! described by an [`OutputManifest`] versioned with
//! [`OUTPUT_SCHEMA_VERSION`].

use std::collections::BTreeMap;

use parking_map_source_models::SegmentKey;
use parking_map_ticket_models::{ConfidenceTier, TicketType};
use serde::{Deserialize, Serialize};

/// Version of the output table layout. Bump whenever a column is added,
/// removed, renamed or changes type.
pub const OUTPUT_SCHEMA_VERSION: u32 = 1;

/// File name of the time/segment count table.
pub const TIME_COUNTS_FILE: &str = "segment_time_counts.parquet";

/// File name of the segment summary table.
pub const SUMMARY_FILE: &str = "segment_summary.parquet";

/// File name of the manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Ticket count for one `(segment, day of week, hour, ticket type)` cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub segment_key: SegmentKey,
    /// Monday = 0.
    pub day_of_week: u8,
    pub hour_of_day: u8,
    pub ticket_type: TicketType,
    /// Tier of the segment the cell belongs to (descriptive only).
    pub confidence_tier: ConfidenceTier,
    pub count: u64,
}

/// Per-segment totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub segment_key: SegmentKey,
    pub borough: String,
    pub confidence_tier: ConfidenceTier,
    pub total_count: u64,
    /// Tickets per type. Types with no tickets are absent.
    pub type_counts: BTreeMap<TicketType, u64>,
    /// Mean latitude of the segment's tickets that carry coordinates.
    pub mean_latitude: Option<f64>,
    /// Mean longitude of the segment's tickets that carry coordinates.
    pub mean_longitude: Option<f64>,
}

impl SegmentSummary {
    /// Returns the count for one ticket type (zero when absent).
    #[must_use]
    pub fn count_for(&self, ticket_type: TicketType) -> u64 {
        self.type_counts.get(&ticket_type).copied().unwrap_or(0)
    }
}

/// A column in an output table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// `DuckDB` / Parquet logical type name.
    pub data_type: String,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Description of one written output table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManifest {
    pub name: String,
    pub file: String,
    pub row_count: u64,
    pub columns: Vec<ColumnSpec>,
}

/// Contents of `manifest.json`.
///
/// Holds no timestamps, so identical inputs produce an identical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputManifest {
    pub schema_version: u32,
    /// Threshold applied to the summary table.
    pub min_samples: u64,
    pub tables: Vec<TableManifest>,
}

impl OutputManifest {
    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableManifest> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_for_missing_type_is_zero() {
        let summary = SegmentSummary {
            segment_key: SegmentKey::new("QUEENS", "QUEENS BLVD", "", ""),
            borough: "QUEENS".to_string(),
            confidence_tier: ConfidenceTier::Blockface,
            total_count: 3,
            type_counts: BTreeMap::from([(TicketType::Parking, 3)]),
            mean_latitude: None,
            mean_longitude: None,
        };
        assert_eq!(summary.count_for(TicketType::Parking), 3);
        assert_eq!(summary.count_for(TicketType::BusLaneCamera), 0);
    }

    #[test]
    fn manifest_serializes_without_timestamps() {
        let manifest = OutputManifest {
            schema_version: OUTPUT_SCHEMA_VERSION,
            min_samples: 5,
            tables: vec![TableManifest {
                name: "segment_summary".to_string(),
                file: SUMMARY_FILE.to_string(),
                row_count: 0,
                columns: vec![ColumnSpec::new("borough", "VARCHAR")],
            }],
        };
        let json = serde_json::to_string(&manifest).unwrap();
        assert_eq!(
            json,
            r#"{"schema_version":1,"min_samples":5,"tables":[{"name":"segment_summary","file":"segment_summary.parquet","row_count":0,"columns":[{"name":"borough","data_type":"VARCHAR"}]}]}"#
        );
        assert!(manifest.table("segment_summary").is_some());
        assert!(manifest.table("nope").is_none());
    }
}
