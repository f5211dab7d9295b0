#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Ticket type taxonomy, borough and confidence tier definitions.
//!
//! This crate defines the canonical categorical values shared across the
//! parking-map pipeline. Every raw violation is classified into a
//! [`TicketType`], and every derived segment key carries a
//! [`ConfidenceTier`] describing how precisely it localizes the ticket.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Broad grouping of ticket types.
///
/// Parking tickets are written by an agent at the curb; camera tickets are
/// issued from automated enforcement and do not describe parking behavior.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketClass {
    /// Curbside parking violations
    Parking,
    /// Automated camera enforcement
    Camera,
    /// Records the rule table could not place
    Unclassified,
}

/// Ticket type category assigned by the classification rule table.
///
/// The category is kept verbatim through aggregation so the presentation
/// layer can filter on it; it is never collapsed into [`TicketClass`].
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketType {
    /// Any curbside parking violation
    Parking,
    /// Red light camera
    RedLightCamera,
    /// School zone speed camera
    SchoolZoneSpeedCamera,
    /// Bus lane camera
    BusLaneCamera,
    /// Any other automated camera violation
    OtherCamera,
    /// No code or description to classify on
    Unclassified,
}

impl TicketType {
    /// Returns the [`TicketClass`] this type belongs to.
    #[must_use]
    pub const fn class(self) -> TicketClass {
        match self {
            Self::Parking => TicketClass::Parking,
            Self::RedLightCamera
            | Self::SchoolZoneSpeedCamera
            | Self::BusLaneCamera
            | Self::OtherCamera => TicketClass::Camera,
            Self::Unclassified => TicketClass::Unclassified,
        }
    }

    /// Returns `true` for automated camera violations.
    #[must_use]
    pub const fn is_camera(self) -> bool {
        matches!(self.class(), TicketClass::Camera)
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Parking,
            Self::RedLightCamera,
            Self::SchoolZoneSpeedCamera,
            Self::BusLaneCamera,
            Self::OtherCamera,
            Self::Unclassified,
        ]
    }
}

/// How precisely a segment key localizes a ticket.
///
/// Ordered from most to least precise:
/// `Segment > Blockface > Intersection > Unknown`.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConfidenceTier {
    /// Borough, street and both cross streets known
    Segment,
    /// Borough and street known, cross streets incomplete
    Blockface,
    /// Only the crossing of two streets is known
    Intersection,
    /// Location could not be resolved
    Unknown,
}

impl ConfidenceTier {
    /// Returns a rank where a higher value means a more precise location.
    #[must_use]
    pub const fn precision(self) -> u8 {
        match self {
            Self::Segment => 3,
            Self::Blockface => 2,
            Self::Intersection => 1,
            Self::Unknown => 0,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Segment,
            Self::Blockface,
            Self::Intersection,
            Self::Unknown,
        ]
    }
}

/// The five NYC boroughs.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Borough {
    Manhattan,
    Brooklyn,
    Queens,
    Bronx,
    StatenIsland,
}

impl Borough {
    /// Resolves a borough from a name or one of the county codes used by
    /// the violations dataset (`NY`, `K`, `Q`, `BX`, `R`, ...).
    ///
    /// Input is expected to be uppercased with whitespace collapsed.
    #[must_use]
    pub fn from_alias(value: &str) -> Option<Self> {
        match value {
            "MANHATTAN" | "NY" | "MN" | "MAN" | "NEW YORK" => Some(Self::Manhattan),
            "BROOKLYN" | "K" | "BK" | "KINGS" => Some(Self::Brooklyn),
            "QUEENS" | "Q" | "QN" | "QNS" | "QUEEN" => Some(Self::Queens),
            "BRONX" | "BX" | "THE BRONX" => Some(Self::Bronx),
            "STATEN ISLAND" | "R" | "ST" | "RICH" | "RICHMOND" | "SI" => Some(Self::StatenIsland),
            _ => None,
        }
    }

    /// Returns the display name used inside segment keys.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Manhattan => "MANHATTAN",
            Self::Brooklyn => "BROOKLYN",
            Self::Queens => "QUEENS",
            Self::Bronx => "BRONX",
            Self::StatenIsland => "STATEN ISLAND",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn camera_types_map_to_camera_class() {
        assert_eq!(TicketType::RedLightCamera.class(), TicketClass::Camera);
        assert_eq!(TicketType::BusLaneCamera.class(), TicketClass::Camera);
        assert!(TicketType::SchoolZoneSpeedCamera.is_camera());
        assert!(!TicketType::Parking.is_camera());
        assert_eq!(TicketType::Unclassified.class(), TicketClass::Unclassified);
    }

    #[test]
    fn ticket_type_string_forms() {
        assert_eq!(TicketType::RedLightCamera.as_ref(), "RED_LIGHT_CAMERA");
        assert_eq!(
            TicketType::from_str("SCHOOL_ZONE_SPEED_CAMERA").unwrap(),
            TicketType::SchoolZoneSpeedCamera
        );
        assert_eq!(
            serde_json::to_string(&TicketType::Parking).unwrap(),
            "\"PARKING\""
        );
    }

    #[test]
    fn tiers_are_ordered_by_precision() {
        let mut tiers = ConfidenceTier::all().to_vec();
        tiers.sort_by_key(|t| std::cmp::Reverse(t.precision()));
        assert_eq!(tiers, ConfidenceTier::all());
        assert_eq!(ConfidenceTier::Blockface.to_string(), "blockface");
    }

    #[test]
    fn resolves_borough_aliases() {
        assert_eq!(Borough::from_alias("NY"), Some(Borough::Manhattan));
        assert_eq!(Borough::from_alias("K"), Some(Borough::Brooklyn));
        assert_eq!(Borough::from_alias("QNS"), Some(Borough::Queens));
        assert_eq!(Borough::from_alias("BX"), Some(Borough::Bronx));
        assert_eq!(Borough::from_alias("R"), Some(Borough::StatenIsland));
        assert_eq!(Borough::StatenIsland.name(), "STATEN ISLAND");
        assert_eq!(Borough::from_alias("GOTHAM"), None);
    }
}
