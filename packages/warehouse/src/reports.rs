//! Analytical queries over the loaded tables.
//!
//! Every report reads the full tables, so repeated loads (which append)
//! count every copy of a listing.

use duckdb::Connection;
use meli_etl_warehouse_models::{
    AveragePriceRow, SellerConcentrationRow, ShippingMixRow, TableRef, WarrantyCoverageRow,
};

use crate::{LoadError, check_table_ref};

/// Top `limit` sellers by number of listings, with their completed sales
/// when the seller was loaded.
///
/// # Errors
///
/// Returns [`LoadError`] if either table is missing or the query fails.
pub fn seller_concentration(
    conn: &Connection,
    items: &TableRef,
    sellers: &TableRef,
    limit: usize,
) -> Result<Vec<SellerConcentrationRow>, LoadError> {
    check_table_ref(items)?;
    check_table_ref(sellers)?;

    let sql = format!(
        "WITH counts AS (
            SELECT seller_id, COUNT(*) AS listings FROM {items} GROUP BY seller_id
        ), sales AS (
            SELECT seller_id, MAX(qty_sales) AS qty_sales FROM {sellers} GROUP BY seller_id
        )
        SELECT c.seller_id, c.listings,
               (c.listings::DOUBLE / SUM(c.listings) OVER ())::DOUBLE AS share,
               s.qty_sales
        FROM counts c
        LEFT JOIN sales s ON s.seller_id = c.seller_id
        ORDER BY c.listings DESC, c.seller_id
        LIMIT {limit}"
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| LoadError::classify(items, e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SellerConcentrationRow {
                seller_id: row.get(0)?,
                listings: row.get(1)?,
                share: row.get(2)?,
                qty_sales: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Average listing price per currency, converted with the loaded
/// `<currency> -> USD` rates. USD listings convert at 1.
///
/// # Errors
///
/// Returns [`LoadError`] if either table is missing or the query fails.
pub fn average_price_usd(
    conn: &Connection,
    items: &TableRef,
    currency: &TableRef,
) -> Result<Vec<AveragePriceRow>, LoadError> {
    check_table_ref(items)?;
    check_table_ref(currency)?;

    let sql = format!(
        "WITH rates AS (
            SELECT currency_base, AVG(rate) AS rate
            FROM {currency}
            WHERE currency_quote = 'USD'
            GROUP BY currency_base
        )
        SELECT i.currency_id,
               COUNT(*) AS listings,
               AVG(i.price) AS avg_price,
               CASE WHEN i.currency_id = 'USD' THEN AVG(i.price)
                    ELSE AVG(i.price * r.rate) END AS avg_price_usd
        FROM {items} i
        LEFT JOIN rates r ON r.currency_base = i.currency_id
        GROUP BY i.currency_id
        ORDER BY i.currency_id"
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| LoadError::classify(items, e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AveragePriceRow {
                currency_id: row.get(0)?,
                listings: row.get(1)?,
                avg_price: row.get(2)?,
                avg_price_usd: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Listing counts per warranty type, most common first.
///
/// # Errors
///
/// Returns [`LoadError`] if the table is missing or the query fails.
pub fn warranty_coverage(
    conn: &Connection,
    items: &TableRef,
) -> Result<Vec<WarrantyCoverageRow>, LoadError> {
    check_table_ref(items)?;

    let sql = format!(
        "SELECT warranty_type,
                COUNT(*) AS listings,
                (COUNT(*)::DOUBLE / SUM(COUNT(*)) OVER ())::DOUBLE AS share
         FROM {items}
         GROUP BY warranty_type
         ORDER BY listings DESC, warranty_type"
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| LoadError::classify(items, e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(WarrantyCoverageRow {
                warranty_type: row.get(0)?,
                listings: row.get(1)?,
                share: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Listing counts per shipping configuration, most common first.
///
/// # Errors
///
/// Returns [`LoadError`] if the table is missing or the query fails.
pub fn shipping_mix(conn: &Connection, items: &TableRef) -> Result<Vec<ShippingMixRow>, LoadError> {
    check_table_ref(items)?;

    let sql = format!(
        "SELECT logistic_type, shipping_mode, free_shipping,
                COUNT(*) AS listings,
                (COUNT(*)::DOUBLE / SUM(COUNT(*)) OVER ())::DOUBLE AS share
         FROM {items}
         GROUP BY logistic_type, shipping_mode, free_shipping
         ORDER BY listings DESC, logistic_type, shipping_mode, free_shipping"
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| LoadError::classify(items, e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ShippingMixRow {
                logistic_type: row.get(0)?,
                shipping_mode: row.get(1)?,
                free_shipping: row.get(2)?,
                listings: row.get(3)?,
                share: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
