#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Warehouse table references and analytical report rows.
//!
//! These types describe data as it sits in the warehouse. The record types
//! that get loaded live in `meli_etl_listing_models`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A table inside a dataset (`dataset.table`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Dataset (DuckDB schema) name.
    pub dataset: String,
    /// Table name.
    pub table: String,
}

impl TableRef {
    /// Creates a table reference.
    #[must_use]
    pub fn new(dataset: &str, table: &str) -> Self {
        Self {
            dataset: dataset.to_owned(),
            table: table.to_owned(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// Returns `true` if `name` is a plain SQL identifier
/// (`[A-Za-z_][A-Za-z0-9_]*`).
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A seller ranked by how many of the loaded listings it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerConcentrationRow {
    /// Seller identifier.
    pub seller_id: String,
    /// Listings owned by the seller.
    pub listings: i64,
    /// Fraction of all listings (0.0 - 1.0).
    pub share: f64,
    /// Completed sales, if the seller was loaded.
    pub qty_sales: Option<i64>,
}

/// Average listing price for one currency, converted to USD when a rate is
/// loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragePriceRow {
    /// Listing currency.
    pub currency_id: String,
    /// Listings priced in this currency.
    pub listings: i64,
    /// Average price in `currency_id`.
    pub avg_price: f64,
    /// Average price in USD. `None` when no `currency_id -> USD` rate exists.
    pub avg_price_usd: Option<f64>,
}

/// Listing count for one warranty type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarrantyCoverageRow {
    /// Warranty type as loaded.
    pub warranty_type: String,
    /// Listings with this warranty type.
    pub listings: i64,
    /// Fraction of all listings (0.0 - 1.0).
    pub share: f64,
}

/// Listing count for one shipping configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingMixRow {
    /// Logistic type.
    pub logistic_type: String,
    /// Shipping mode.
    pub shipping_mode: String,
    /// Free shipping flag.
    pub free_shipping: bool,
    /// Listings with this configuration.
    pub listings: i64,
    /// Fraction of all listings (0.0 - 1.0).
    pub share: f64,
}
