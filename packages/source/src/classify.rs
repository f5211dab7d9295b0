//! Ticket type classification.
//!
//! Maps a violation's `(code, description)` pair to a [`TicketType`]
//! through an ordered rule table. The table is plain data: the default is
//! embedded from `rules/default.toml`, and an alternate table can be
//! loaded from disk, so new violation codes never require code changes.

use std::path::Path;

use parking_map_ticket_models::TicketType;
use serde::Deserialize;

use crate::SourceError;

/// Rule table embedded at compile time.
const DEFAULT_RULES_TOML: &str = include_str!("../rules/default.toml");

/// A single classification rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassificationRule {
    /// Type assigned when this rule matches.
    pub ticket_type: TicketType,
    /// Violation codes that match exactly (leading zeros ignored).
    #[serde(default)]
    pub codes: Vec<String>,
    /// Case-insensitive substrings of the violation description.
    #[serde(default)]
    pub description_contains: Vec<String>,
}

impl ClassificationRule {
    fn matches(&self, code: Option<&str>, description: Option<&str>) -> bool {
        let code_match =
            code.is_some_and(|code| self.codes.iter().any(|c| canonical_code(c) == code));
        code_match
            || description.is_some_and(|desc| {
                self.description_contains
                    .iter()
                    .any(|needle| desc.contains(needle.as_str()))
            })
    }
}

/// Ordered rule table with a fallback type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassificationRules {
    /// Type for records that match no rule.
    pub fallback: TicketType,
    /// Rules in priority order.
    #[serde(default)]
    pub rules: Vec<ClassificationRule>,
}

impl Default for ClassificationRules {
    /// Returns the embedded rule table.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (covered by tests).
    fn default() -> Self {
        Self::from_toml_str(DEFAULT_RULES_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse rules/default.toml: {e}"))
    }
}

impl ClassificationRules {
    /// Parses and validates a rule table.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the TOML is malformed or a rule has
    /// nothing to match on.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, SourceError> {
        let mut rules: Self = toml::from_str(toml_str)?;

        for (i, rule) in rules.rules.iter_mut().enumerate() {
            rule.codes.retain(|c| !c.trim().is_empty());
            rule.description_contains.retain(|d| !d.trim().is_empty());
            if rule.codes.is_empty() && rule.description_contains.is_empty() {
                return Err(SourceError::Rules {
                    message: format!(
                        "rule {} ({}) has neither codes nor description_contains",
                        i + 1,
                        rule.ticket_type
                    ),
                });
            }
            for needle in &mut rule.description_contains {
                *needle = needle.to_uppercase();
            }
        }

        Ok(rules)
    }

    /// Loads a rule table from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path)?;
        let rules = Self::from_toml_str(&contents)?;
        log::info!(
            "Loaded {} classification rules from {}",
            rules.rules.len(),
            path.display()
        );
        Ok(rules)
    }

    /// Classifies a violation.
    #[must_use]
    pub fn classify(&self, code: Option<&str>, description: Option<&str>) -> TicketType {
        let code = code.map(canonical_code).filter(|c| !c.is_empty());
        let description = description
            .map(|d| d.trim().to_uppercase())
            .filter(|d| !d.is_empty());

        if code.is_none() && description.is_none() {
            return TicketType::Unclassified;
        }

        self.rules
            .iter()
            .find(|rule| rule.matches(code, description.as_deref()))
            .map_or(self.fallback, |rule| rule.ticket_type)
    }
}

/// Trims a violation code and strips leading zeros (`"07"` → `"7"`).
fn canonical_code(code: &str) -> &str {
    let trimmed = code.trim();
    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() && !trimmed.is_empty() {
        "0"
    } else {
        stripped
    }
}
