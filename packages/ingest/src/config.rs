//! Pipeline configuration.
//!
//! Loaded from an optional TOML file; every key has a default, so an empty
//! file (or none at all) yields a working configuration. Command-line
//! flags override file values in `main.rs`.
//!
//! ```toml
//! page_size = 1000
//! sleep_seconds = 0.25
//! source_utc_offset = "-05:00"
//! database_path = "data/parking_tickets.duckdb"
//! rules_path = "rules/custom.toml"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use parking_map_database::paths;
use parking_map_source::classify::ClassificationRules;
use parking_map_source::normalize::{DEFAULT_SOURCE_UTC_OFFSET, Normalizer};
use parking_map_source::parsing::parse_utc_offset;
use parking_map_source::retry::RetryPolicy;
use parking_map_source::socrata::{DEFAULT_API_URL, SocrataConfig};
use serde::Deserialize;

use crate::IngestError;

/// Config file picked up from the working directory when `--config` is not
/// given.
pub const DEFAULT_CONFIG_FILE: &str = "parking_map.toml";

/// Static configuration for every pipeline stage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub api_url: String,
    pub page_size: u32,
    pub sleep_seconds: f64,
    pub http_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Offset applied to timestamps that carry none, e.g. `-05:00`.
    pub source_utc_offset: String,
    pub database_path: PathBuf,
    pub output_dir: PathBuf,
    pub min_samples: u64,
    /// Alternate classification rule table. The embedded table is used
    /// when unset.
    pub rules_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            page_size: 1_000,
            sleep_seconds: 0.25,
            http_timeout_seconds: 60,
            max_retries: retry.max_retries,
            retry_base_delay_ms: u64::try_from(retry.base_delay.as_millis()).unwrap_or(2_000),
            source_utc_offset: DEFAULT_SOURCE_UTC_OFFSET.to_string(),
            database_path: paths::default_db_path(),
            output_dir: paths::derived_dir(),
            min_samples: 5,
            rules_path: None,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if the TOML is malformed or has
    /// unknown keys.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, IngestError> {
        toml::from_str(toml_str).map_err(|e| IngestError::Config {
            message: e.to_string(),
        })
    }

    /// Loads the configuration.
    ///
    /// With an explicit `path` the file must exist. Without one,
    /// [`DEFAULT_CONFIG_FILE`] is read if present and defaults are used
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, IngestError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    log::debug!("No {DEFAULT_CONFIG_FILE} found, using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| IngestError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses [`Self::source_utc_offset`].
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if the offset is not `+HH:MM` or
    /// `-HH:MM`.
    pub fn source_offset(&self) -> Result<FixedOffset, IngestError> {
        parse_utc_offset(&self.source_utc_offset).ok_or_else(|| IngestError::Config {
            message: format!("invalid source_utc_offset {:?}", self.source_utc_offset),
        })
    }

    /// Inter-request delay.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] for a negative or non-finite value.
    pub fn sleep(&self) -> Result<Duration, IngestError> {
        Duration::try_from_secs_f64(self.sleep_seconds).map_err(|e| IngestError::Config {
            message: format!("invalid sleep_seconds {}: {e}", self.sleep_seconds),
        })
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// Builds the Socrata client configuration.
    #[must_use]
    pub fn socrata_config(&self, app_token: Option<String>) -> SocrataConfig {
        SocrataConfig {
            api_url: self.api_url.clone(),
            app_token,
            timeout: Duration::from_secs(self.http_timeout_seconds),
            retry: self.retry_policy(),
        }
    }

    /// Builds the normalizer, loading the alternate rule table if one is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if the offset or rule table is
    /// invalid.
    pub fn normalizer(&self) -> Result<Normalizer, IngestError> {
        let rules = match &self.rules_path {
            Some(path) => ClassificationRules::load(path).map_err(|e| IngestError::Config {
                message: format!("failed to load rules from {}: {e}", path.display()),
            })?,
            None => ClassificationRules::default(),
        };
        Ok(Normalizer::new(rules, self.source_offset()?))
    }
}
