//! Socrata SODA API page fetcher.
//!
//! Pages through the Open Parking and Camera Violations dataset with
//! keyset pagination: `$order` by `issue_date, summons_number` and a
//! `$where` clause that starts strictly after the last committed record.
//! Unlike `$offset` paging, this stays correct when a run is interrupted
//! and resumed from the persisted cursor.

use std::time::Duration;

use async_trait::async_trait;
use parking_map_source_models::{IngestCursor, RawViolationRecord};

use crate::retry::{self, RetryPolicy};
use crate::{PageQuery, PageSource, SourceError};

/// Default endpoint of the Open Parking and Camera Violations dataset.
pub const DEFAULT_API_URL: &str = "https://data.cityofnewyork.us/resource/nc67-uf89.json";

/// Column the API orders and filters on.
const DATE_COLUMN: &str = "issue_date";

/// Column used to break ties between records issued at the same instant.
const ID_COLUMN: &str = "summons_number";

/// Header carrying the optional application token.
const APP_TOKEN_HEADER: &str = "X-App-Token";

/// Configuration for a [`SocrataClient`].
#[derive(Debug, Clone)]
pub struct SocrataConfig {
    /// Resource URL (e.g., [`DEFAULT_API_URL`]).
    pub api_url: String,
    /// Optional app token for elevated rate limits.
    pub app_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Backoff applied to transient failures.
    pub retry: RetryPolicy,
}

impl Default for SocrataConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            app_token: None,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// [`PageSource`] backed by a Socrata resource endpoint.
pub struct SocrataClient {
    client: reqwest::Client,
    config: SocrataConfig,
}

impl SocrataClient {
    /// Builds a client for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(config: SocrataConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent("parking-map/1.0")
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PageSource for SocrataClient {
    fn label(&self) -> &str {
        &self.config.api_url
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawViolationRecord>, SourceError> {
        let params = build_params(query);
        log::debug!("GET {} {params:?}", self.config.api_url);

        let body = retry::send_json(&self.config.retry, || {
            let mut request = self.client.get(&self.config.api_url).query(&params);
            if let Some(token) = &self.config.app_token {
                request = request.header(APP_TOKEN_HEADER, token);
            }
            request
        })
        .await?;

        let records: Vec<RawViolationRecord> = serde_json::from_value(body)?;
        Ok(records)
    }
}

/// Builds the SODA query parameters for one page.
#[must_use]
pub fn build_params(query: &PageQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("$limit", query.page_size.to_string()),
        ("$order", format!("{DATE_COLUMN} ASC, {ID_COLUMN} ASC")),
    ];
    params.push(("$where", build_where_clause(query)));
    params
}

/// Builds the `$where` clause: rows without a keyset position are
/// excluded, then the issue-date window and the cursor condition apply.
#[must_use]
pub fn build_where_clause(query: &PageQuery) -> String {
    let mut clauses = vec![format!(
        "{ID_COLUMN} IS NOT NULL AND {DATE_COLUMN} IS NOT NULL"
    )];

    if let Some(lower) = query.lower_bound() {
        clauses.push(format!("{DATE_COLUMN} >= {}", quote(&lower)));
    }
    if let Some(upper) = query.upper_bound() {
        clauses.push(format!("{DATE_COLUMN} < {}", quote(&upper)));
    }
    if let IngestCursor::At {
        issue_date,
        ticket_id,
    } = &query.after
    {
        let date = quote(issue_date);
        clauses.push(format!(
            "({DATE_COLUMN} > {date} OR ({DATE_COLUMN} = {date} AND {ID_COLUMN} > {}))",
            quote(ticket_id)
        ));
    }

    clauses.join(" AND ")
}

/// Quotes a SoQL string literal, doubling embedded single quotes.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
