#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw violation records, normalized records, segment keys and the ingest
//! cursor.
//!
//! The upstream API produces [`RawViolationRecord`]s. The normalizer turns
//! each into either a [`NormalizedRecord`] or a [`DroppedRecord`], and the
//! fetcher tracks its progress through the API with an [`IngestCursor`].

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use parking_map_ticket_models::{ConfidenceTier, TicketType};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Segment key street value used for records whose location could not be
/// resolved at all.
pub const UNKNOWN_LOCATION: &str = "UNKNOWN LOCATION";

/// Borough value used in the unknown bucket when the borough is missing.
pub const UNKNOWN_BOROUGH: &str = "UNKNOWN";

/// A violation record as returned by the Open Parking and Camera
/// Violations API.
///
/// Every field is optional on the wire; the normalizer decides which
/// missing fields are fatal for a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawViolationRecord {
    /// Unique ticket identifier (dedup key).
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub summons_number: Option<String>,
    /// Issue date or date-time, as the API reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    /// Time of day in `HHMM` with an optional `A`/`P` suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_time: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub violation_code: Option<String>,
    #[serde(
        default,
        alias = "violation",
        skip_serializing_if = "Option::is_none"
    )]
    pub violation_description: Option<String>,
    /// Borough name or county code.
    #[serde(
        default,
        alias = "county",
        skip_serializing_if = "Option::is_none"
    )]
    pub violation_county: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,
    /// Cross street at the start of the block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersecting_street_1: Option<String>,
    /// Cross street at the end of the block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersecting_street_2: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub latitude: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub longitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuing_agency: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub fine_amount: Option<String>,
}

impl RawViolationRecord {
    /// Returns the trimmed ticket identifier, or `None` when missing or
    /// blank.
    #[must_use]
    pub fn ticket_id(&self) -> Option<&str> {
        non_blank(self.summons_number.as_deref())
    }

    /// Returns the trimmed issue date, or `None` when missing or blank.
    #[must_use]
    pub fn issue_date(&self) -> Option<&str> {
        non_blank(self.issue_date.as_deref())
    }

    /// Returns the cursor position this record occupies in the API's
    /// `(issue_date, summons_number)` ordering, if it has both fields.
    #[must_use]
    pub fn cursor_position(&self) -> Option<IngestCursor> {
        Some(IngestCursor::At {
            issue_date: self.issue_date()?.to_string(),
            ticket_id: self.ticket_id()?.to_string(),
        })
    }
}

/// Accepts a JSON string, number or boolean and keeps its text form.
///
/// The API reports most values as strings, but numeric columns sometimes
/// arrive as bare numbers.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|v| match v {
        Scalar::Str(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
    }))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Composite identity approximating a street segment from textual fields.
///
/// Fields are normalized (uppercase, trimmed, whitespace collapsed). Fields
/// that do not contribute at the record's [`ConfidenceTier`] are empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    pub borough: String,
    pub street_name: String,
    pub cross_from: String,
    pub cross_to: String,
}

impl SegmentKey {
    /// Creates a segment key from already-normalized components.
    #[must_use]
    pub fn new(
        borough: impl Into<String>,
        street_name: impl Into<String>,
        cross_from: impl Into<String>,
        cross_to: impl Into<String>,
    ) -> Self {
        Self {
            borough: borough.into(),
            street_name: street_name.into(),
            cross_from: cross_from.into(),
            cross_to: cross_to.into(),
        }
    }

    /// The explicit bucket for records whose location could not be
    /// resolved. Keeps the borough when one is known.
    #[must_use]
    pub fn unknown_location(borough: Option<&str>) -> Self {
        Self::new(
            borough.unwrap_or(UNKNOWN_BOROUGH),
            UNKNOWN_LOCATION,
            "",
            "",
        )
    }

    /// Returns `true` if this is the unknown-location bucket.
    #[must_use]
    pub fn is_unknown_location(&self) -> bool {
        self.street_name == UNKNOWN_LOCATION && self.cross_from.is_empty() && self.cross_to.is_empty()
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | {}",
            self.borough, self.street_name, self.cross_from, self.cross_to
        )
    }
}

/// Watermark of ingestion progress through the API's
/// `(issue_date, summons_number)` ordering.
///
/// `Beginning` sorts before every position, so the derived ordering can be
/// used directly to check that the cursor never moves backwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestCursor {
    /// Nothing has been ingested yet.
    #[default]
    Beginning,
    /// The last committed record.
    At {
        /// Raw `issue_date` value as the API reports it.
        issue_date: String,
        /// Raw `summons_number` of the last committed record.
        ticket_id: String,
    },
}

impl IngestCursor {
    /// Returns `true` for the "from the beginning" sentinel.
    #[must_use]
    pub const fn is_beginning(&self) -> bool {
        matches!(self, Self::Beginning)
    }
}

impl fmt::Display for IngestCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beginning => f.write_str("<beginning>"),
            Self::At {
                issue_date,
                ticket_id,
            } => write!(f, "{issue_date} / {ticket_id}"),
        }
    }
}

/// Inclusive issue-date window an ingest walk is restricted to.
///
/// A cursor is only meaningful together with the window it was reached
/// in, so the two are persisted side by side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngestWindow {
    pub issue_date_from: Option<NaiveDate>,
    pub issue_date_to: Option<NaiveDate>,
}

impl IngestWindow {
    #[must_use]
    pub const fn new(issue_date_from: Option<NaiveDate>, issue_date_to: Option<NaiveDate>) -> Self {
        Self {
            issue_date_from,
            issue_date_to,
        }
    }

    /// Returns `true` when neither bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.issue_date_from.is_none() && self.issue_date_to.is_none()
    }

    /// Returns `true` if `date` falls inside the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.issue_date_from.is_none_or(|from| date >= from)
            && self.issue_date_to.is_none_or(|to| date <= to)
    }
}

impl fmt::Display for IngestWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.issue_date_from, self.issue_date_to) {
            (None, None) => f.write_str("all issue dates"),
            (Some(from), None) => write!(f, "{from}.."),
            (None, Some(to)) => write!(f, "..={to}"),
            (Some(from), Some(to)) => write!(f, "{from}..={to}"),
        }
    }
}

/// A violation record normalized to the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Unique ticket identifier.
    pub ticket_id: String,
    /// Issue instant in UTC.
    pub issued_at: DateTime<Utc>,
    /// Day of week derived from `issued_at`, Monday = 0.
    pub day_of_week: u8,
    /// Hour of day derived from `issued_at`.
    pub hour_of_day: u8,
    pub ticket_type: TicketType,
    pub segment_key: SegmentKey,
    pub confidence_tier: ConfidenceTier,
    pub violation_code: Option<String>,
    pub violation_description: Option<String>,
    /// Latitude (WGS84). `None` if the source lacks usable coordinates.
    pub latitude: Option<f64>,
    /// Longitude (WGS84). `None` if the source lacks usable coordinates.
    pub longitude: Option<f64>,
}

/// Why a raw record was not normalized.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum DropReason {
    #[strum(serialize = "missing ticket id")]
    #[serde(rename = "missing ticket id")]
    MissingTicketId,
    #[strum(serialize = "unparsable timestamp")]
    #[serde(rename = "unparsable timestamp")]
    UnparsableTimestamp,
}

/// A raw record rejected by the normalizer, kept for the drop ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRecord {
    /// Ticket identifier, when the record had one.
    pub ticket_id: Option<String>,
    pub reason: DropReason,
    /// Offending value or other context.
    pub detail: String,
}

impl fmt::Display for DroppedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ticket {}: {} ({})",
            self.ticket_id.as_deref().unwrap_or("<none>"),
            self.reason,
            self.detail
        )
    }
}
