//! Segment key derivation.
//!
//! Approximates street-segment identity from the borough, street and
//! cross-street text fields. No geocoding is involved: the key is only as
//! good as the text, and [`ConfidenceTier`] records how much of it was
//! usable.

use std::sync::LazyLock;

use parking_map_source_models::SegmentKey;
use parking_map_ticket_models::{Borough, ConfidenceTier};
use regex::Regex;

/// Punctuation that carries no meaning in street names.
static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.,;:'"`#]+"#).expect("valid regex"));

/// Values the source uses in place of a missing field.
const PLACEHOLDERS: &[&str] = &["N/A", "NA", "NONE", "NULL", "UNKNOWN", "-", "--", "0"];

/// Normalizes a location text field: uppercase, strip punctuation,
/// collapse whitespace, trim. Returns `None` for blank or placeholder
/// values.
#[must_use]
pub fn normalize_field(value: Option<&str>) -> Option<String> {
    let upper = value?.to_uppercase();
    let stripped = PUNCTUATION_RE.replace_all(&upper, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() || PLACEHOLDERS.contains(&collapsed.as_str()) {
        None
    } else {
        Some(collapsed)
    }
}

/// Normalizes a borough field, resolving county codes to borough names.
/// Unrecognized values keep their normalized text.
#[must_use]
pub fn normalize_borough(value: Option<&str>) -> Option<String> {
    let normalized = normalize_field(value)?;
    Some(
        Borough::from_alias(&normalized)
            .map_or(normalized, |borough| borough.name().to_string()),
    )
}

/// Derives the segment key and confidence tier for a location.
///
/// | borough | street | cross streets | tier |
/// |---|---|---|---|
/// | yes | yes | both | `Segment` |
/// | yes | yes | fewer than two | `Blockface` |
/// | yes | missing or same as a cross street | both | `Intersection` |
/// | anything else | | | `Unknown` |
///
/// `Unknown` records get the explicit unknown-location bucket key.
#[must_use]
pub fn derive_segment(
    borough: Option<&str>,
    street_name: Option<&str>,
    cross_from: Option<&str>,
    cross_to: Option<&str>,
) -> (SegmentKey, ConfidenceTier) {
    let borough = normalize_borough(borough);
    let street = normalize_field(street_name);
    let from = normalize_field(cross_from);
    let to = normalize_field(cross_to);

    let Some(borough) = borough else {
        return (SegmentKey::unknown_location(None), ConfidenceTier::Unknown);
    };

    let street_is_cross =
        street.is_some() && (street == from || street == to);

    match (street, from, to) {
        (Some(street), Some(from), Some(to)) if !street_is_cross => (
            SegmentKey::new(borough, street, from, to),
            ConfidenceTier::Segment,
        ),
        (Some(street), None, _) | (Some(street), _, None) => (
            SegmentKey::new(borough, street, "", ""),
            ConfidenceTier::Blockface,
        ),
        (_, Some(from), Some(to)) => (
            SegmentKey::new(borough, "", from, to),
            ConfidenceTier::Intersection,
        ),
        (None, _, _) => (
            SegmentKey::unknown_location(Some(borough.as_str())),
            ConfidenceTier::Unknown,
        ),
    }
}
