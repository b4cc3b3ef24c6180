#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` warehouse for the `MercadoLibre` ETL.
//!
//! Records are appended to `<dataset>.<table>` inside a single `DuckDB`
//! file, where a dataset is a `DuckDB` schema. Tables and datasets are
//! created on first use. Loads are append-only; nothing is ever updated or
//! deleted.

pub mod loader;
pub mod paths;
pub mod reports;
pub mod schema;

pub use loader::{DuckDbWarehouse, Warehouse};
pub use meli_etl_warehouse_models::TableRef;
pub use schema::WarehouseRow;

use meli_etl_warehouse_models::is_identifier;

/// Errors from loading into or reading from the warehouse.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The destination table exists with incompatible columns, or a value
    /// could not be converted to the column type.
    #[error("Schema mismatch for {table}: {message}")]
    Schema {
        /// Destination table.
        table: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The warehouse rejected the write (read-only file, missing rights).
    #[error("Permission denied for {table}: {message}")]
    Permission {
        /// Destination table.
        table: String,
        /// Message reported by the warehouse.
        message: String,
    },

    /// A dataset or table name is not a plain SQL identifier.
    #[error("Invalid warehouse identifier: {name:?}")]
    InvalidIdentifier {
        /// The rejected name.
        name: String,
    },

    /// Any other `DuckDB` failure.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error while preparing the warehouse file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    /// Maps a `DuckDB` error raised while working on `table` to the most
    /// specific variant.
    #[must_use]
    pub fn classify(table: &TableRef, err: duckdb::Error) -> Self {
        let message = err.to_string();
        let lower = message.to_ascii_lowercase();

        if lower.contains("read-only") || lower.contains("permission denied") {
            Self::Permission {
                table: table.to_string(),
                message,
            }
        } else if lower.contains("binder error")
            || lower.contains("conversion error")
            || lower.contains("constraint error")
        {
            Self::Schema {
                table: table.to_string(),
                message,
            }
        } else {
            Self::DuckDb(err)
        }
    }
}

/// Checks that both parts of `table` are plain SQL identifiers.
///
/// # Errors
///
/// Returns [`LoadError::InvalidIdentifier`] naming the first bad part.
pub fn check_table_ref(table: &TableRef) -> Result<(), LoadError> {
    for name in [&table.dataset, &table.table] {
        if !is_identifier(name) {
            return Err(LoadError::InvalidIdentifier { name: name.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_quoted_names() {
        assert!(check_table_ref(&TableRef::new("meli", "items_details")).is_ok());
        assert!(matches!(
            check_table_ref(&TableRef::new("meli", "items\"; --")),
            Err(LoadError::InvalidIdentifier { name }) if name == "items\"; --"
        ));
        assert!(matches!(
            check_table_ref(&TableRef::new("", "items")),
            Err(LoadError::InvalidIdentifier { .. })
        ));
    }
}
