//! Column layout of the destination tables.
//!
//! Each loaded record type implements [`WarehouseRow`], which fixes its
//! column names, SQL types and the order values are bound in. The same
//! description drives `CREATE TABLE`, `INSERT` and read-back.

use meli_etl_listing_models::{CurrencyConversionRecord, ItemRecord, SellerRecord};

/// A destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: &'static str,
    /// DuckDB type.
    pub sql_type: &'static str,
}

const fn col(name: &'static str, sql_type: &'static str) -> Column {
    Column { name, sql_type }
}

/// A single bound value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell<'a> {
    /// `TEXT` value.
    Text(&'a str),
    /// `DOUBLE` value.
    Double(f64),
    /// `BIGINT` value.
    BigInt(i64),
    /// `BOOLEAN` value.
    Bool(bool),
}

/// A record type that maps onto one warehouse table.
pub trait WarehouseRow: Sized {
    /// Columns in bind order.
    const COLUMNS: &'static [Column];

    /// Values in the same order as [`Self::COLUMNS`].
    fn cells(&self) -> Vec<Cell<'_>>;

    /// Rebuilds a record from a row selected with [`Self::COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns a `duckdb` error if a column has an incompatible type.
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self>;
}

/// Comma-separated column names, in bind order.
#[must_use]
pub fn column_list<R: WarehouseRow>() -> String {
    R::COLUMNS
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Column definitions for `CREATE TABLE`.
#[must_use]
pub fn column_definitions<R: WarehouseRow>() -> String {
    R::COLUMNS
        .iter()
        .map(|c| format!("{} {} NOT NULL", c.name, c.sql_type))
        .collect::<Vec<_>>()
        .join(",\n            ")
}

impl WarehouseRow for ItemRecord {
    const COLUMNS: &'static [Column] = &[
        col("item_id", "TEXT"),
        col("site_id", "TEXT"),
        col("title", "TEXT"),
        col("price", "DOUBLE"),
        col("currency_id", "TEXT"),
        col("seller_id", "TEXT"),
        col("category_id", "TEXT"),
        col("warranty_type", "TEXT"),
        col("warranty_time", "TEXT"),
        col("free_shipping", "BOOLEAN"),
        col("local_pick_up", "BOOLEAN"),
        col("logistic_type", "TEXT"),
        col("shipping_mode", "TEXT"),
    ];

    fn cells(&self) -> Vec<Cell<'_>> {
        vec![
            Cell::Text(&self.item_id),
            Cell::Text(&self.site_id),
            Cell::Text(&self.title),
            Cell::Double(self.price),
            Cell::Text(&self.currency_id),
            Cell::Text(&self.seller_id),
            Cell::Text(&self.category_id),
            Cell::Text(&self.warranty_type),
            Cell::Text(&self.warranty_time),
            Cell::Bool(self.free_shipping),
            Cell::Bool(self.local_pick_up),
            Cell::Text(&self.logistic_type),
            Cell::Text(&self.shipping_mode),
        ]
    }

    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            item_id: row.get(0)?,
            site_id: row.get(1)?,
            title: row.get(2)?,
            price: row.get(3)?,
            currency_id: row.get(4)?,
            seller_id: row.get(5)?,
            category_id: row.get(6)?,
            warranty_type: row.get(7)?,
            warranty_time: row.get(8)?,
            free_shipping: row.get(9)?,
            local_pick_up: row.get(10)?,
            logistic_type: row.get(11)?,
            shipping_mode: row.get(12)?,
        })
    }
}

impl WarehouseRow for SellerRecord {
    const COLUMNS: &'static [Column] = &[col("seller_id", "TEXT"), col("qty_sales", "BIGINT")];

    fn cells(&self) -> Vec<Cell<'_>> {
        vec![Cell::Text(&self.seller_id), Cell::BigInt(self.qty_sales)]
    }

    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            seller_id: row.get(0)?,
            qty_sales: row.get(1)?,
        })
    }
}

impl WarehouseRow for CurrencyConversionRecord {
    const COLUMNS: &'static [Column] = &[
        col("currency_base", "TEXT"),
        col("currency_quote", "TEXT"),
        col("rate", "DOUBLE"),
    ];

    fn cells(&self) -> Vec<Cell<'_>> {
        vec![
            Cell::Text(&self.currency_base),
            Cell::Text(&self.currency_quote),
            Cell::Double(self.rate),
        ]
    }

    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            currency_base: row.get(0)?,
            currency_quote: row.get(1)?,
            rate: row.get(2)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_match_columns() {
        let seller = SellerRecord {
            seller_id: "1".to_string(),
            qty_sales: 3,
        };
        assert_eq!(seller.cells().len(), SellerRecord::COLUMNS.len());

        let rate = CurrencyConversionRecord {
            currency_base: "ARS".to_string(),
            currency_quote: "USD".to_string(),
            rate: 0.0012,
        };
        assert_eq!(rate.cells().len(), CurrencyConversionRecord::COLUMNS.len());
    }

    #[test]
    fn renders_column_lists() {
        assert_eq!(column_list::<SellerRecord>(), "seller_id, qty_sales");
        assert_eq!(
            column_definitions::<CurrencyConversionRecord>(),
            "currency_base TEXT NOT NULL,\n            currency_quote TEXT NOT NULL,\n            rate DOUBLE NOT NULL"
        );
    }
}
