//! Raw record → canonical record conversion.

use chrono::{Datelike as _, FixedOffset, Timelike as _};
use parking_map_source_models::{
    DropReason, DroppedRecord, NormalizedRecord, RawViolationRecord,
};

use crate::classify::ClassificationRules;
use crate::parsing::{parse_issue_timestamp, parse_lat_lng_str};
use crate::segment::derive_segment;

/// Fixed offset applied to naive timestamps when none is configured
/// (US Eastern standard time).
pub const DEFAULT_SOURCE_UTC_OFFSET: &str = "-05:00";

const EASTERN_STANDARD: FixedOffset = match FixedOffset::west_opt(5 * 3600) {
    Some(offset) => offset,
    None => panic!("invalid default offset"),
};

/// Converts raw API records into [`NormalizedRecord`]s.
///
/// Pure with respect to its inputs: the same raw record always yields the
/// same result.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: ClassificationRules,
    source_offset: FixedOffset,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(ClassificationRules::default(), EASTERN_STANDARD)
    }
}

impl Normalizer {
    /// Creates a normalizer with the given rule table and source offset.
    #[must_use]
    pub const fn new(rules: ClassificationRules, source_offset: FixedOffset) -> Self {
        Self {
            rules,
            source_offset,
        }
    }

    /// The classification rule table in use.
    #[must_use]
    pub const fn rules(&self) -> &ClassificationRules {
        &self.rules
    }

    /// Normalizes one record.
    ///
    /// # Errors
    ///
    /// Returns a [`DroppedRecord`] when the record has no ticket id or its
    /// issue timestamp cannot be parsed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn normalize(&self, raw: &RawViolationRecord) -> Result<NormalizedRecord, DroppedRecord> {
        let Some(ticket_id) = raw.ticket_id() else {
            return Err(DroppedRecord {
                ticket_id: None,
                reason: DropReason::MissingTicketId,
                detail: format!(
                    "issue_date={}",
                    raw.issue_date.as_deref().unwrap_or("<missing>")
                ),
            });
        };

        let issued_at = raw
            .issue_date()
            .and_then(|date| {
                parse_issue_timestamp(date, raw.violation_time.as_deref(), self.source_offset)
            })
            .ok_or_else(|| DroppedRecord {
                ticket_id: Some(ticket_id.to_string()),
                reason: DropReason::UnparsableTimestamp,
                detail: format!(
                    "issue_date={:?} violation_time={:?}",
                    raw.issue_date.as_deref().unwrap_or_default(),
                    raw.violation_time.as_deref().unwrap_or_default()
                ),
            })?;

        let ticket_type = self.rules.classify(
            raw.violation_code.as_deref(),
            raw.violation_description.as_deref(),
        );

        let (segment_key, confidence_tier) = derive_segment(
            raw.violation_county.as_deref(),
            raw.street_name.as_deref(),
            raw.intersecting_street_1.as_deref(),
            raw.intersecting_street_2.as_deref(),
        );

        let coords = parse_lat_lng_str(raw.latitude.as_deref(), raw.longitude.as_deref());

        Ok(NormalizedRecord {
            ticket_id: ticket_id.to_string(),
            issued_at,
            day_of_week: issued_at.weekday().num_days_from_monday() as u8,
            hour_of_day: issued_at.hour() as u8,
            ticket_type,
            segment_key,
            confidence_tier,
            violation_code: trimmed(raw.violation_code.as_deref()),
            violation_description: trimmed(raw.violation_description.as_deref()),
            latitude: coords.map(|(lat, _)| lat),
            longitude: coords.map(|(_, lng)| lng),
        })
    }

    /// Normalizes a page of records, splitting them into accepted records
    /// and drop-ledger entries. Order is preserved within each side.
    #[must_use]
    pub fn normalize_page(
        &self,
        raws: &[RawViolationRecord],
    ) -> (Vec<NormalizedRecord>, Vec<DroppedRecord>) {
        let mut records = Vec::with_capacity(raws.len());
        let mut dropped = Vec::new();

        for raw in raws {
            match self.normalize(raw) {
                Ok(record) => records.push(record),
                Err(drop) => {
                    log::debug!("Dropping record: {drop}");
                    dropped.push(drop);
                }
            }
        }

        if !dropped.is_empty() {
            log::warn!(
                "Dropped {} of {} records on this page",
                dropped.len(),
                raws.len()
            );
        }

        (records, dropped)
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use parking_map_source_models::SegmentKey;
    use parking_map_ticket_models::{ConfidenceTier, TicketType};

    use super::*;

    fn raw(id: &str, date: &str) -> RawViolationRecord {
        RawViolationRecord {
            summons_number: Some(id.to_string()),
            issue_date: Some(date.to_string()),
            violation_code: Some("21".to_string()),
            violation_description: Some("NO PARKING-STREET CLEANING".to_string()),
            violation_county: Some("NY".to_string()),
            street_name: Some("W 41 St".to_string()),
            intersecting_street_1: Some("8 Ave".to_string()),
            intersecting_street_2: Some("7 Ave".to_string()),
            ..RawViolationRecord::default()
        }
    }

    #[test]
    fn derives_utc_day_and_hour() {
        let record = Normalizer::default()
            .normalize(&raw("1", "2023-01-05T14:30:00"))
            .unwrap();
        assert_eq!(record.day_of_week, 3);
        assert_eq!(record.hour_of_day, 19);
        assert_eq!(record.issued_at.to_rfc3339(), "2023-01-05T19:30:00+00:00");
    }

    #[test]
    fn late_local_time_shifts_day_of_week() {
        let mut input = raw("1", "2023-01-08T00:00:00.000");
        input.violation_time = Some("1130P".to_string());
        let record = Normalizer::default().normalize(&input).unwrap();
        // Sunday 23:30 local is Monday 04:30 UTC.
        assert_eq!(record.day_of_week, 0);
        assert_eq!(record.hour_of_day, 4);
    }

    #[test]
    fn fills_segment_and_classification() {
        let record = Normalizer::default()
            .normalize(&raw("1", "2023-01-05T14:30:00"))
            .unwrap();
        assert_eq!(record.ticket_type, TicketType::Parking);
        assert_eq!(record.confidence_tier, ConfidenceTier::Segment);
        assert_eq!(
            record.segment_key,
            SegmentKey::new("MANHATTAN", "W 41 ST", "8 AVE", "7 AVE")
        );
        assert_eq!(record.violation_code.as_deref(), Some("21"));
        assert_eq!(record.latitude, None);
    }

    #[test]
    fn drops_missing_ticket_id() {
        let mut input = raw("1", "2023-01-05T14:30:00");
        input.summons_number = Some("  ".to_string());
        let drop = Normalizer::default().normalize(&input).unwrap_err();
        assert_eq!(drop.reason, DropReason::MissingTicketId);
        assert_eq!(drop.ticket_id, None);
    }

    #[test]
    fn drops_unparsable_timestamp() {
        let drop = Normalizer::default()
            .normalize(&raw("42", "sometime last week"))
            .unwrap_err();
        assert_eq!(drop.reason, DropReason::UnparsableTimestamp);
        assert_eq!(drop.ticket_id.as_deref(), Some("42"));

        let mut input = raw("43", "2023-01-05");
        input.issue_date = None;
        let drop = Normalizer::default().normalize(&input).unwrap_err();
        assert_eq!(drop.reason, DropReason::UnparsableTimestamp);
    }

    #[test]
    fn unresolved_location_is_kept_in_unknown_bucket() {
        let mut input = raw("7", "2023-01-05T14:30:00");
        input.violation_county = None;
        input.street_name = None;
        let record = Normalizer::default().normalize(&input).unwrap();
        assert_eq!(record.confidence_tier, ConfidenceTier::Unknown);
        assert!(record.segment_key.is_unknown_location());
    }

    #[test]
    fn page_split_preserves_order() {
        let mut bad = raw("2", "2023-01-05T10:00:00");
        bad.issue_date = Some("garbage".to_string());
        let page = vec![
            raw("1", "2023-01-05T09:00:00"),
            bad,
            raw("3", "2023-01-05T11:00:00"),
        ];
        let (records, dropped) = Normalizer::default().normalize_page(&page);
        let ids: Vec<_> = records.iter().map(|r| r.ticket_id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].ticket_id.as_deref(), Some("2"));
    }
}
