#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration, track state and run summary types for the ETL.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default MercadoLibre API host.
pub const DEFAULT_API_URL: &str = "https://api.mercadolibre.com";

/// Default search page size.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Default cap on search hits per run.
pub const DEFAULT_MAX_ITEMS: u64 = 1_000;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default warehouse file.
pub const DEFAULT_DATABASE_PATH: &str = "data/meli.duckdb";

/// ETL job configuration, read from `meli_etl.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Marketplace site code (e.g. `"MLA"`).
    pub site: String,
    /// Search term.
    pub query: String,
    /// Optional item condition filter.
    #[serde(default)]
    pub condition: Option<String>,
    /// Attribute list for item detail lookups.
    #[serde(default)]
    pub items_attributes: Option<String>,
    /// Warehouse dataset (`DuckDB` schema).
    pub dataset: String,
    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Search page size.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Cap on search hits. `0` follows every page.
    #[serde(default = "default_max_items")]
    pub max_items: Option<u64>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Warehouse file path.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Currency pairs loaded by the currency track.
    pub currency_pairs: Vec<CurrencyPair>,
    /// Destination table names.
    pub tables: TableNames,
    /// Backoff for transient upstream errors.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

#[allow(clippy::unnecessary_wraps)]
const fn default_max_items() -> Option<u64> {
    Some(DEFAULT_MAX_ITEMS)
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

impl EtlConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A `base -> quote` currency pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency code.
    pub base: String,
    /// Quote currency code.
    pub quote: String,
}

impl std::fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.base, self.quote)
    }
}

/// Destination table names inside the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    /// Listing details.
    #[serde(default = "default_items_table")]
    pub items: String,
    /// Seller details.
    #[serde(default = "default_sellers_table")]
    pub sellers: String,
    /// Currency conversion rates.
    #[serde(default = "default_currency_table")]
    pub currency: String,
}

fn default_items_table() -> String {
    "items_details".to_string()
}

fn default_sellers_table() -> String {
    "sellers_details".to_string()
}

fn default_currency_table() -> String {
    "currency_conversions".to_string()
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            items: default_items_table(),
            sellers: default_sellers_table(),
            currency: default_currency_table(),
        }
    }
}

impl TableNames {
    /// Returns the table name for `track`.
    #[must_use]
    pub fn for_track(&self, track: Track) -> &str {
        match track {
            Track::Items => &self.items,
            Track::Sellers => &self.sellers,
            Track::Currency => &self.currency,
        }
    }
}

/// Retry settings as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// One of the three independent ETL streams.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Track {
    /// Listing details.
    Items,
    /// Seller details.
    Sellers,
    /// Currency conversion rates.
    Currency,
}

impl Track {
    /// All tracks in run order.
    pub const ALL: [Self; 3] = [Self::Items, Self::Sellers, Self::Currency];
}

/// Lifecycle of a track: `Pending -> Fetching -> Mapping -> Loading`,
/// ending in `Done` or `Failed`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackState {
    /// Not started.
    Pending,
    /// Calling the upstream API.
    Fetching,
    /// Turning raw JSON into records.
    Mapping,
    /// Appending to the warehouse.
    Loading,
    /// Finished successfully.
    Done,
    /// Stopped by a fetch or load error.
    Failed,
}

impl TrackState {
    /// Returns `true` for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns `true` if `next` may follow `self`.
    ///
    /// Any non-terminal state may fail; otherwise states advance one step
    /// at a time.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching)
                | (Self::Fetching, Self::Mapping)
                | (Self::Mapping, Self::Loading)
                | (Self::Loading, Self::Done)
                | (Self::Pending | Self::Fetching | Self::Mapping | Self::Loading, Self::Failed)
        )
    }
}

/// Outcome of one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackReport {
    /// Which track.
    pub track: Track,
    /// Destination table (`dataset.table`).
    pub table: String,
    /// Current or terminal state.
    pub state: TrackState,
    /// Raw records returned by the API.
    pub fetched: u64,
    /// Raw records that failed mapping.
    pub skipped: u64,
    /// Rows appended to the warehouse.
    pub written: u64,
    /// Error that failed the track.
    pub error: Option<String>,
    /// Wall-clock time spent on the track.
    pub duration: Duration,
}

impl TrackReport {
    /// Creates a pending report for `track` loading into `table`.
    #[must_use]
    pub const fn new(track: Track, table: String) -> Self {
        Self {
            track,
            table,
            state: TrackState::Pending,
            fetched: 0,
            skipped: 0,
            written: 0,
            error: None,
            duration: Duration::ZERO,
        }
    }
}

/// Aggregate outcome of a run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// Every track is `Done`.
    Success,
    /// Some tracks are `Done`, some `Failed`.
    Partial,
    /// No track is `Done`.
    Failed,
}

impl RunOutcome {
    /// Process exit code: 0, 1 or 2.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
            Self::Failed => 2,
        }
    }
}

/// Per-track results of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// One report per track, in run order.
    pub tracks: Vec<TrackReport>,
}

impl RunSummary {
    /// Derives the aggregate outcome from the track states.
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        let done = self
            .tracks
            .iter()
            .filter(|t| t.state == TrackState::Done)
            .count();

        if done == self.tracks.len() {
            RunOutcome::Success
        } else if done == 0 {
            RunOutcome::Failed
        } else {
            RunOutcome::Partial
        }
    }

    /// Process exit code for [`Self::outcome`].
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.outcome().exit_code()
    }

    /// Returns the report for `track`.
    #[must_use]
    pub fn track(&self, track: Track) -> Option<&TrackReport> {
        self.tracks.iter().find(|t| t.track == track)
    }

    /// Total rows written across all tracks.
    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.tracks.iter().map(|t| t.written).sum()
    }
}
