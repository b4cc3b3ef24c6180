//! Search pagination and multi-get helpers.
//!
//! The search endpoint pages with `offset`/`limit` and reports the number
//! of matches in `paging.total`. Item details are fetched through the
//! multi-get endpoint, which accepts at most [`MULTIGET_CHUNK`] ids per
//! request and wraps each item as `{"code": 200, "body": {...}}`.

use std::collections::BTreeSet;

use reqwest::Url;
use serde_json::Value;

use crate::{SearchQuery, SourceError};

/// Records per search page when the configuration does not say.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Deepest search offset the public search endpoint serves. Requests
/// beyond it are rejected with HTTP 400.
pub const MAX_SEARCH_OFFSET: u64 = 1000;

/// Maximum ids accepted by one `/items?ids=` request.
pub const MULTIGET_CHUNK: usize = 20;

/// Attributes requested from the multi-get endpoint by default: exactly the
/// fields the item mapper reads.
pub const DEFAULT_ITEM_ATTRIBUTES: &str =
    "id,site_id,title,price,currency_id,seller_id,category_id,sale_terms,warranty,shipping";

/// One page of search results.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    /// Raw result objects.
    pub results: Vec<Value>,
    /// Total matches reported by `paging.total`, if present.
    pub total: Option<u64>,
}

/// Joins `path` onto the API base URL.
fn endpoint(base_url: &str, path: &str) -> Result<Url, SourceError> {
    let joined = format!("{}/{}", base_url.trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| SourceError::InvalidInput {
        message: format!("invalid URL {joined:?}: {e}"),
    })
}

/// Builds the search URL for the page starting at `offset`.
///
/// # Errors
///
/// Returns [`SourceError::InvalidInput`] if the base URL does not parse.
pub fn search_url(base_url: &str, query: &SearchQuery, offset: u64) -> Result<Url, SourceError> {
    let mut url = endpoint(base_url, &format!("sites/{}/search", query.site))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("q", &query.query);
        if let Some(condition) = &query.condition {
            pairs.append_pair("condition", condition);
        }
        pairs.append_pair("offset", &offset.to_string());
        pairs.append_pair("limit", &query.page_size.to_string());
    }
    Ok(url)
}

/// Builds the multi-get URL for a chunk of item ids.
///
/// # Errors
///
/// Returns [`SourceError::InvalidInput`] if the base URL does not parse.
pub fn items_url(base_url: &str, ids: &[String], attributes: &str) -> Result<Url, SourceError> {
    let mut url = endpoint(base_url, "items")?;
    url.query_pairs_mut()
        .append_pair("ids", &ids.join(","))
        .append_pair("attributes", attributes);
    Ok(url)
}

/// Builds the user detail URL for a seller.
///
/// # Errors
///
/// Returns [`SourceError::InvalidInput`] if the base URL does not parse.
pub fn user_url(base_url: &str, seller_id: &str) -> Result<Url, SourceError> {
    endpoint(base_url, &format!("users/{seller_id}"))
}

/// Builds the currency conversion URL.
///
/// # Errors
///
/// Returns [`SourceError::InvalidInput`] if the base URL does not parse.
pub fn currency_url(base_url: &str, base: &str, quote: &str) -> Result<Url, SourceError> {
    let mut url = endpoint(base_url, "currency_conversions/search")?;
    url.query_pairs_mut()
        .append_pair("from", base)
        .append_pair("to", quote);
    Ok(url)
}

/// Splits a search response body into its results and reported total.
///
/// # Errors
///
/// Returns a message if the body has no `results` array.
pub fn parse_search_page(body: &Value) -> Result<SearchPage, String> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| "search response has no `results` array".to_string())?;

    let total = body
        .get("paging")
        .and_then(|p| p.get("total"))
        .and_then(Value::as_u64);

    Ok(SearchPage { results, total })
}

/// Decides whether another search page should be requested.
///
/// Stops when the last page was short or empty, when `paging.total` has
/// been reached, when `max_items` has been collected, or when the next
/// offset would pass [`MAX_SEARCH_OFFSET`].
#[must_use]
pub fn has_more(
    fetched: u64,
    last_page_len: u64,
    page_size: u64,
    total: Option<u64>,
    max_items: Option<u64>,
) -> bool {
    if last_page_len == 0 || last_page_len < page_size {
        return false;
    }
    if total.is_some_and(|t| fetched >= t) {
        return false;
    }
    if max_items.is_some_and(|m| fetched >= m) {
        return false;
    }
    fetched < MAX_SEARCH_OFFSET
}

/// Reads an identifier that may be a JSON string or integer.
pub(crate) fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => n.as_i64().map(|n| n.to_string()),
        _ => None,
    }
}

/// Collects listing ids from search results, in order, without repeats.
#[must_use]
pub fn item_ids(results: &[Value]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    results
        .iter()
        .filter_map(|r| r.get("id").and_then(id_value))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Collects seller ids from search results, in first-seen order.
///
/// Accepts both the nested `seller.id` and the flat `seller_id` shapes.
#[must_use]
pub fn unique_seller_ids(results: &[Value]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    results
        .iter()
        .filter_map(|r| {
            r.get("seller")
                .and_then(|s| s.get("id"))
                .or_else(|| r.get("seller_id"))
                .and_then(id_value)
        })
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Unwraps a multi-get response into item bodies.
///
/// Entries whose `code` is not 200 are dropped and counted.
///
/// # Errors
///
/// Returns a message if the body is not a JSON array.
pub fn multiget_bodies(body: &Value) -> Result<(Vec<Value>, u64), String> {
    let entries = body
        .as_array()
        .ok_or_else(|| "multi-get response is not an array".to_string())?;

    let mut bodies = Vec::with_capacity(entries.len());
    let mut dropped = 0u64;

    for entry in entries {
        let code = entry.get("code").and_then(Value::as_u64);
        match (code, entry.get("body")) {
            (Some(200), Some(item)) => bodies.push(item.clone()),
            _ => {
                log::warn!(
                    "Dropping multi-get entry with code {code:?}: {}",
                    entry
                        .get("body")
                        .and_then(|b| b.get("id"))
                        .and_then(id_value)
                        .unwrap_or_else(|| "<unknown>".to_string())
                );
                dropped += 1;
            }
        }
    }

    Ok((bodies, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_search_url_with_condition() {
        let mut query = SearchQuery::new("MLA", "smart tv");
        query.condition = Some("new".to_string());
        let url = search_url("https://api.mercadolibre.com/", &query, 100).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.mercadolibre.com/sites/MLA/search?q=smart+tv&condition=new&offset=100&limit=50"
        );
    }

    #[test]
    fn builds_items_url() {
        let ids = vec!["MLA1".to_string(), "MLA2".to_string()];
        let url = items_url("https://api.mercadolibre.com", &ids, "id,title").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.mercadolibre.com/items?ids=MLA1%2CMLA2&attributes=id%2Ctitle"
        );
    }

    #[test]
    fn builds_currency_url() {
        let url = currency_url("https://api.mercadolibre.com", "ARS", "USD").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.mercadolibre.com/currency_conversions/search?from=ARS&to=USD"
        );
    }

    #[test]
    fn rejects_bad_base_url() {
        let query = SearchQuery::new("MLA", "tv");
        assert!(matches!(
            search_url("not a url", &query, 0),
            Err(SourceError::InvalidInput { .. })
        ));
    }

    #[test]
    fn parses_search_page() {
        let body = json!({
            "paging": {"total": 2, "offset": 0, "limit": 50},
            "results": [{"id": "MLA1"}, {"id": "MLA2"}]
        });
        let page = parse_search_page(&body).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.total, Some(2));
    }

    #[test]
    fn search_page_requires_results() {
        assert!(parse_search_page(&json!({"paging": {}})).is_err());
    }

    #[test]
    fn stops_on_short_or_empty_page() {
        assert!(!has_more(10, 10, 50, None, None));
        assert!(!has_more(0, 0, 50, None, None));
        assert!(has_more(50, 50, 50, None, None));
    }

    #[test]
    fn stops_at_total_or_cap() {
        assert!(!has_more(100, 50, 50, Some(100), None));
        assert!(has_more(100, 50, 50, Some(150), None));
        assert!(!has_more(100, 50, 50, Some(1000), Some(100)));
    }

    #[test]
    fn stops_at_deepest_offset() {
        assert!(has_more(950, 50, 50, Some(20_000), None));
        assert!(!has_more(MAX_SEARCH_OFFSET, 50, 50, Some(20_000), None));
    }

    #[test]
    fn collects_unique_ids() {
        let results = vec![
            json!({"id": "MLA1", "seller": {"id": 7}}),
            json!({"id": "MLA2", "seller_id": 9}),
            json!({"id": "MLA1", "seller": {"id": 7}}),
            json!({"title": "no id"}),
        ];
        assert_eq!(item_ids(&results), vec!["MLA1", "MLA2"]);
        assert_eq!(unique_seller_ids(&results), vec!["7", "9"]);
    }

    #[test]
    fn unwraps_multiget_entries() {
        let body = json!([
            {"code": 200, "body": {"id": "MLA1"}},
            {"code": 404, "body": {"id": "MLA2", "message": "not found"}},
            {"code": 200, "body": {"id": "MLA3"}}
        ]);
        let (bodies, dropped) = multiget_bodies(&body).unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(dropped, 1);
        assert_eq!(bodies[1]["id"], "MLA3");
    }
}
