#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flat record types produced from MercadoLibre API payloads.
//!
//! Each record has a fixed shape that matches one warehouse table. Optional
//! upstream fields never disappear from a record: text fields fall back to
//! [`NO_DATA`] and flags fall back to `false`.

use serde::{Deserialize, Serialize};

/// Placeholder stored when an optional text field is absent upstream.
pub const NO_DATA: &str = "no data";

/// Warranty type stored when a listing carries no warranty sale term.
pub const NO_WARRANTY: &str = "no warranty";

/// One listing, flattened from the item detail payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Listing identifier (e.g. `"MLA123456"`).
    pub item_id: String,
    /// Marketplace site code (e.g. `"MLA"`).
    pub site_id: String,
    /// Listing title.
    pub title: String,
    /// Listing price in `currency_id`.
    pub price: f64,
    /// ISO currency code of `price`.
    pub currency_id: String,
    /// Seller identifier, stored as text.
    pub seller_id: String,
    /// Category identifier, or [`NO_DATA`].
    pub category_id: String,
    /// Value of the `WARRANTY_TYPE` sale term, or [`NO_WARRANTY`].
    pub warranty_type: String,
    /// Value of the `WARRANTY_TIME` sale term, or [`NO_DATA`].
    pub warranty_time: String,
    /// Whether shipping is free.
    pub free_shipping: bool,
    /// Whether the buyer can pick the item up locally.
    pub local_pick_up: bool,
    /// Logistic type (e.g. `"fulfillment"`), or [`NO_DATA`].
    pub logistic_type: String,
    /// Shipping mode (e.g. `"me2"`), or [`NO_DATA`].
    pub shipping_mode: String,
}

/// Sales volume for one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerRecord {
    /// Seller identifier, stored as text.
    pub seller_id: String,
    /// Completed transactions from the seller's reputation.
    pub qty_sales: i64,
}

/// Exchange rate between two currencies at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConversionRecord {
    /// Currency converted from (e.g. `"ARS"`).
    pub currency_base: String,
    /// Currency converted to (e.g. `"USD"`).
    pub currency_quote: String,
    /// Units of `currency_quote` per unit of `currency_base`.
    pub rate: f64,
}
