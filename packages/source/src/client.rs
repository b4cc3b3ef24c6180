//! `reqwest` implementation of [`MarketplaceApi`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::paging::{self, MULTIGET_CHUNK};
use crate::progress::ProgressCallback;
use crate::retry::{self, RetryPolicy};
use crate::{MarketplaceApi, SearchQuery, SourceError, validate_currency_pair};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer token for the MercadoLibre API.
///
/// The token never appears in `Debug` output.
#[derive(Clone)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wraps a token, rejecting blank values.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingCredential`] if `token` is blank.
    pub fn new(token: impl Into<String>) -> Result<Self, SourceError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SourceError::MissingCredential);
        }
        Ok(Self(token.trim().to_owned()))
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// HTTP client for the MercadoLibre public API.
#[derive(Debug, Clone)]
pub struct MeliClient {
    http: reqwest::Client,
    base_url: String,
    token: ApiToken,
    retry: RetryPolicy,
}

impl MeliClient {
    /// Creates a client for `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the underlying HTTP client cannot be
    /// built.
    pub fn new(
        base_url: &str,
        token: ApiToken,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent("meli-etl/0.1")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
            retry,
        })
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, url: reqwest::Url) -> Result<Value, SourceError> {
        log::debug!("GET {url}");
        retry::send_json(&self.retry, || {
            self.http
                .get(url.clone())
                .bearer_auth(self.token.expose())
                .header(reqwest::header::ACCEPT, "application/json")
        })
        .await
    }
}

#[async_trait]
impl MarketplaceApi for MeliClient {
    async fn search(
        &self,
        query: &SearchQuery,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Vec<Value>, SourceError> {
        query.validate()?;

        log::info!(
            "[{}] Searching {:?} (page size {})",
            query.site,
            query.query,
            query.page_size
        );

        let mut results: Vec<Value> = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let url = paging::search_url(&self.base_url, query, offset)?;
            let body = match self.get_json(url.clone()).await {
                Ok(body) => body,
                Err(SourceError::Upstream { status: 400, url }) if offset > 0 => {
                    log::warn!(
                        "[{}] Search rejected offset {offset} ({url}), keeping {} results",
                        query.site,
                        results.len()
                    );
                    break;
                }
                Err(e) => return Err(e),
            };
            let page = paging::parse_search_page(&body).map_err(|message| {
                SourceError::Response {
                    url: url.to_string(),
                    message,
                }
            })?;

            if offset == 0
                && let Some(total) = page.total
            {
                progress.set_total(query.max_items.map_or(total, |m| m.min(total)));
            }

            let count = page.results.len() as u64;
            results.extend(page.results);
            offset += count;
            progress.inc(count);

            log::info!(
                "[{}] Search page at offset {}: {count} results (total: {offset})",
                query.site,
                offset - count
            );

            if !paging::has_more(offset, count, query.page_size, page.total, query.max_items) {
                break;
            }
        }

        if let Some(max) = query.max_items {
            results.truncate(usize::try_from(max).unwrap_or(usize::MAX));
        }

        Ok(results)
    }

    async fn fetch_item_details(
        &self,
        query: &SearchQuery,
        hits: &[Value],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Vec<Value>, SourceError> {
        let ids = paging::item_ids(hits);
        let attributes = query
            .item_attributes
            .as_deref()
            .unwrap_or(paging::DEFAULT_ITEM_ATTRIBUTES);

        progress.set_total(ids.len() as u64);
        progress.set_message(format!("fetching {} detail records", ids.len()));

        let mut items = Vec::with_capacity(ids.len());
        let mut dropped = 0u64;

        for chunk in ids.chunks(MULTIGET_CHUNK) {
            let url = paging::items_url(&self.base_url, chunk, attributes)?;
            let body = self.get_json(url.clone()).await?;
            let (bodies, chunk_dropped) =
                paging::multiget_bodies(&body).map_err(|message| SourceError::Response {
                    url: url.to_string(),
                    message,
                })?;
            items.extend(bodies);
            dropped += chunk_dropped;
            progress.inc(chunk.len() as u64);
        }

        if dropped > 0 {
            log::warn!("[{}] {dropped} item detail lookups failed", query.site);
        }

        Ok(items)
    }

    async fn fetch_sellers(
        &self,
        hits: &[Value],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Vec<Value>, SourceError> {
        let seller_ids = paging::unique_seller_ids(hits);

        progress.set_total(seller_ids.len() as u64);
        progress.set_message(format!("fetching {} users", seller_ids.len()));

        let mut sellers = Vec::with_capacity(seller_ids.len());
        for seller_id in &seller_ids {
            let url = paging::user_url(&self.base_url, seller_id)?;
            sellers.push(self.get_json(url).await?);
            progress.inc(1);
        }

        Ok(sellers)
    }

    async fn fetch_currency_rate(&self, base: &str, quote: &str) -> Result<Value, SourceError> {
        validate_currency_pair(base, quote)?;
        let url = paging::currency_url(&self.base_url, base, quote)?;
        self.get_json(url).await
    }
}
