#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! MercadoLibre API client and listing record mapping.
//!
//! The [`MarketplaceApi`] trait is the seam between the ETL tracks and the
//! upstream API: [`client::MeliClient`] talks HTTP, tests substitute an
//! in-memory implementation. Raw JSON returned by the API is turned into
//! flat records by the functions in [`mapping`].

pub mod client;
pub mod mapping;
pub mod paging;
pub mod progress;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;

use crate::progress::ProgressCallback;

/// Errors that can occur while talking to the upstream API.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// No credential was supplied.
    #[error("Missing API credential (set MELI_API_KEY)")]
    MissingCredential,

    /// The upstream rejected the credential (HTTP 401/403).
    #[error("Credential rejected by {url} (HTTP {status})")]
    Auth {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The upstream answered with a non-success status.
    #[error("Upstream returned HTTP {status} for {url}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The response parsed as JSON but not in the expected shape.
    #[error("Unexpected response from {url}: {message}")]
    Response {
        /// Requested URL.
        url: String,
        /// Description of what was wrong.
        message: String,
    },

    /// A request argument was rejected before any HTTP call.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the invalid argument.
        message: String,
    },
}

impl SourceError {
    /// Returns `true` for credential problems (missing or rejected).
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::Auth { .. })
    }
}

/// What to search for on the marketplace.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Marketplace site code (e.g. `"MLA"`).
    pub site: String,
    /// Free-text search term.
    pub query: String,
    /// Optional item condition filter (`"new"`, `"used"`).
    pub condition: Option<String>,
    /// Attribute list for the item multi-get endpoint.
    pub item_attributes: Option<String>,
    /// Records requested per search page.
    pub page_size: u64,
    /// Upper bound on search hits to follow.
    pub max_items: Option<u64>,
}

impl SearchQuery {
    /// Creates a query with the default page size and no optional filters.
    #[must_use]
    pub fn new(site: &str, query: &str) -> Self {
        Self {
            site: site.to_owned(),
            query: query.to_owned(),
            condition: None,
            item_attributes: None,
            page_size: paging::DEFAULT_PAGE_SIZE,
            max_items: None,
        }
    }

    /// Checks that the site and search term are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidInput`] if either is blank or the page
    /// size is zero.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.site.trim().is_empty() {
            return Err(SourceError::InvalidInput {
                message: "site must not be empty".to_string(),
            });
        }
        if self.query.trim().is_empty() {
            return Err(SourceError::InvalidInput {
                message: "query must not be empty".to_string(),
            });
        }
        if self.page_size == 0 {
            return Err(SourceError::InvalidInput {
                message: "page_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Returns `true` if `code` looks like an ISO 4217 code (`"ARS"`, `"USD"`).
#[must_use]
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Checks a currency pair before it is sent upstream.
///
/// # Errors
///
/// Returns [`SourceError::InvalidInput`] naming the first bad code.
pub fn validate_currency_pair(base: &str, quote: &str) -> Result<(), SourceError> {
    for code in [base, quote] {
        if !is_currency_code(code) {
            return Err(SourceError::InvalidInput {
                message: format!("invalid currency code {code:?}"),
            });
        }
    }
    Ok(())
}

/// Read access to the marketplace data the ETL tracks need.
///
/// Every method returns raw JSON objects; mapping into records happens
/// separately so a malformed record never fails a whole fetch. The items
/// and sellers tracks share one [`search`](Self::search) and expand its
/// hits independently.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Returns the raw search hits for `query`, following pagination until
    /// upstream reports no more pages or `max_items` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the query is invalid or any request fails
    /// after retries.
    async fn search(
        &self,
        query: &SearchQuery,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Vec<serde_json::Value>, SourceError>;

    /// Returns the detail payload of every listing among `hits`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if any request fails after retries.
    async fn fetch_item_details(
        &self,
        query: &SearchQuery,
        hits: &[serde_json::Value],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Vec<serde_json::Value>, SourceError>;

    /// Returns the user payload of every distinct seller among `hits`, in
    /// first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if any request fails after retries.
    async fn fetch_sellers(
        &self,
        hits: &[serde_json::Value],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Vec<serde_json::Value>, SourceError>;

    /// Returns the conversion payload for `base` → `quote`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if a code is invalid or the request fails
    /// after retries.
    async fn fetch_currency_rate(
        &self,
        base: &str,
        quote: &str,
    ) -> Result<serde_json::Value, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_iso_codes() {
        assert!(is_currency_code("ARS"));
        assert!(is_currency_code("USD"));
        assert!(validate_currency_pair("ARS", "USD").is_ok());
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!(!is_currency_code("usd"));
        assert!(!is_currency_code("US"));
        assert!(!is_currency_code("USDT"));
        assert!(matches!(
            validate_currency_pair("ARS", "U$D"),
            Err(SourceError::InvalidInput { .. })
        ));
    }

    #[test]
    fn rejects_blank_query() {
        assert!(SearchQuery::new("MLA", "chromecast").validate().is_ok());
        assert!(SearchQuery::new("", "chromecast").validate().is_err());
        assert!(SearchQuery::new("MLA", "  ").validate().is_err());
    }

    #[test]
    fn auth_errors_are_flagged() {
        assert!(SourceError::MissingCredential.is_auth());
        assert!(
            SourceError::Auth {
                status: 401,
                url: String::new()
            }
            .is_auth()
        );
        assert!(
            !SourceError::Upstream {
                status: 500,
                url: String::new()
            }
            .is_auth()
        );
    }
}
