//! Append-only loading into `DuckDB` tables.

use std::path::{Path, PathBuf};

use duckdb::{AccessMode, Config, Connection, Statement};
use meli_etl_listing_models::{CurrencyConversionRecord, ItemRecord, SellerRecord};
use meli_etl_warehouse_models::TableRef;

use crate::schema::{self, Cell, WarehouseRow};
use crate::{LoadError, check_table_ref};

/// Number of rows per INSERT statement.
const CHUNK_SIZE: usize = 1_000;

/// A destination that accepts append-only batches of records.
pub trait Warehouse {
    /// Creates `table` (and its dataset) if missing and checks that an
    /// existing table has the columns `R` writes.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Schema`] on a column mismatch,
    /// [`LoadError::Permission`] if the table cannot be created.
    fn ensure_table<R: WarehouseRow>(&mut self, table: &TableRef) -> Result<(), LoadError>;

    /// Appends `rows` to `table` and returns the number written.
    ///
    /// An empty batch still creates the table and returns `0`. A failed
    /// batch writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the table cannot be prepared or the insert
    /// fails.
    fn append<R: WarehouseRow>(&mut self, table: &TableRef, rows: &[R]) -> Result<u64, LoadError>;

    /// Returns the number of rows currently in `table`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the table does not exist or the query fails.
    fn row_count(&self, table: &TableRef) -> Result<u64, LoadError>;
}

/// [`Warehouse`] backed by a `DuckDB` database.
pub struct DuckDbWarehouse {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for DuckDbWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbWarehouse")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DuckDbWarehouse {
    /// Opens (or creates) the warehouse file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the parent directory cannot be created or
    /// the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        log::debug!("Opened warehouse {}", path.display());

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens an existing warehouse file without write access.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> Result<Self, LoadError> {
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, config)?;
        log::debug!("Opened warehouse {} (read-only)", path.display());

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a throwaway in-memory warehouse.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if `DuckDB` cannot start.
    pub fn open_in_memory() -> Result<Self, LoadError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
        })
    }

    /// Returns the file path, or `None` for an in-memory warehouse.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the underlying connection for ad-hoc queries.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns the column names of `table` in ordinal order, or an empty
    /// list if the table does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the catalog query fails.
    pub fn table_columns(&self, table: &TableRef) -> Result<Vec<String>, LoadError> {
        check_table_ref(table)?;

        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ?
             ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map(duckdb::params![table.dataset, table.table], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(columns)
    }

    /// Lists the tables in `dataset`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the catalog query fails.
    pub fn list_tables(&self, dataset: &str) -> Result<Vec<TableRef>, LoadError> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = ?
             ORDER BY table_name",
        )?;
        let tables = stmt
            .query_map(duckdb::params![dataset], |row| row.get::<_, String>(0))?
            .map(|name| name.map(|name| TableRef::new(dataset, &name)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tables)
    }

    /// Reads every row of `table` in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the table is missing or a row does not fit
    /// `R`.
    pub fn read_rows<R: WarehouseRow>(&self, table: &TableRef) -> Result<Vec<R>, LoadError> {
        check_table_ref(table)?;

        let sql = format!(
            "SELECT {} FROM {table} ORDER BY rowid",
            schema::column_list::<R>()
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| LoadError::classify(table, e))?;
        let rows = stmt
            .query_map([], R::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Reads back the items table.
    ///
    /// # Errors
    ///
    /// See [`Self::read_rows`].
    pub fn read_items(&self, table: &TableRef) -> Result<Vec<ItemRecord>, LoadError> {
        self.read_rows(table)
    }

    /// Reads back the sellers table.
    ///
    /// # Errors
    ///
    /// See [`Self::read_rows`].
    pub fn read_sellers(&self, table: &TableRef) -> Result<Vec<SellerRecord>, LoadError> {
        self.read_rows(table)
    }

    /// Reads back the currency conversion table.
    ///
    /// # Errors
    ///
    /// See [`Self::read_rows`].
    pub fn read_currency_conversions(
        &self,
        table: &TableRef,
    ) -> Result<Vec<CurrencyConversionRecord>, LoadError> {
        self.read_rows(table)
    }
}

impl Warehouse for DuckDbWarehouse {
    fn ensure_table<R: WarehouseRow>(&mut self, table: &TableRef) -> Result<(), LoadError> {
        let existing = self.table_columns(table)?;

        if existing.is_empty() {
            let sql = format!(
                "CREATE SCHEMA IF NOT EXISTS {dataset};
                 CREATE TABLE IF NOT EXISTS {table} (
            {columns}
                 );",
                dataset = table.dataset,
                columns = schema::column_definitions::<R>(),
            );
            self.conn
                .execute_batch(&sql)
                .map_err(|e| LoadError::classify(table, e))?;
            log::info!("Created table {table}");
            return Ok(());
        }

        let expected: Vec<&str> = R::COLUMNS.iter().map(|c| c.name).collect();
        if existing != expected {
            return Err(LoadError::Schema {
                table: table.to_string(),
                message: format!(
                    "expected columns [{}], found [{}]",
                    expected.join(", "),
                    existing.join(", ")
                ),
            });
        }

        Ok(())
    }

    fn append<R: WarehouseRow>(&mut self, table: &TableRef, rows: &[R]) -> Result<u64, LoadError> {
        self.ensure_table::<R>(table)?;

        if rows.is_empty() {
            log::info!("Nothing to append to {table}");
            return Ok(0);
        }

        let columns = schema::column_list::<R>();
        let placeholders = format!("({})", vec!["?"; R::COLUMNS.len()].join(", "));
        let classify = |e| LoadError::classify(table, e);

        let tx = self.conn.transaction().map_err(classify)?;
        let mut total_inserted = 0u64;

        for chunk in rows.chunks(CHUNK_SIZE) {
            let mut sql = format!("INSERT INTO {table} ({columns}) VALUES ");
            for i in 0..chunk.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&placeholders);
            }

            let mut stmt = tx.prepare(&sql).map_err(classify)?;
            let mut param_idx = 1usize;

            for row in chunk {
                for cell in row.cells() {
                    bind_cell(&mut stmt, param_idx, &cell).map_err(classify)?;
                    param_idx += 1;
                }
            }

            let inserted = stmt.raw_execute().map_err(classify)?;
            total_inserted += u64::try_from(inserted).unwrap_or(0);
        }

        tx.commit().map_err(classify)?;
        log::info!("Appended {total_inserted} rows to {table}");

        Ok(total_inserted)
    }

    fn row_count(&self, table: &TableRef) -> Result<u64, LoadError> {
        check_table_ref(table)?;

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT COUNT(*) FROM {table}"))
            .map_err(|e| LoadError::classify(table, e))?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn bind_cell(stmt: &mut Statement<'_>, idx: usize, cell: &Cell<'_>) -> duckdb::Result<()> {
    match *cell {
        Cell::Text(value) => stmt.raw_bind_parameter(idx, value),
        Cell::Double(value) => stmt.raw_bind_parameter(idx, value),
        Cell::BigInt(value) => stmt.raw_bind_parameter(idx, value),
        Cell::Bool(value) => stmt.raw_bind_parameter(idx, value),
    }
}

#[cfg(test)]
mod tests {
    use meli_etl_listing_models::{NO_DATA, NO_WARRANTY};

    use super::*;

    fn item(id: &str, seller_id: &str, price: f64) -> ItemRecord {
        ItemRecord {
            item_id: id.to_string(),
            site_id: "MLA".to_string(),
            title: format!("Item {id}"),
            price,
            currency_id: "ARS".to_string(),
            seller_id: seller_id.to_string(),
            category_id: "MLA1055".to_string(),
            warranty_type: NO_WARRANTY.to_string(),
            warranty_time: NO_DATA.to_string(),
            free_shipping: true,
            local_pick_up: false,
            logistic_type: "fulfillment".to_string(),
            shipping_mode: "me2".to_string(),
        }
    }

    fn items_table() -> TableRef {
        TableRef::new("meli", "items_details")
    }

    #[test]
    fn appends_and_reads_back_items() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let rows = vec![item("MLA1", "10", 1500.5), item("MLA2", "11", 99.0)];

        assert_eq!(wh.append(&items_table(), &rows).unwrap(), 2);
        assert_eq!(wh.row_count(&items_table()).unwrap(), 2);
        assert_eq!(wh.read_items(&items_table()).unwrap(), rows);
    }

    #[test]
    fn appending_twice_keeps_both_batches() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let rows = vec![item("MLA1", "10", 10.0)];

        wh.append(&items_table(), &rows).unwrap();
        wh.append(&items_table(), &rows).unwrap();

        assert_eq!(wh.row_count(&items_table()).unwrap(), 2);
    }

    #[test]
    fn empty_batch_creates_table() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let table = TableRef::new("meli", "sellers_details");

        assert_eq!(wh.append::<SellerRecord>(&table, &[]).unwrap(), 0);
        assert_eq!(wh.row_count(&table).unwrap(), 0);
        assert_eq!(wh.list_tables("meli").unwrap(), vec![table]);
    }

    #[test]
    fn writes_currency_conversion() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let table = TableRef::new("meli", "currency_conversion");
        let rows = vec![CurrencyConversionRecord {
            currency_base: "ARS".to_string(),
            currency_quote: "USD".to_string(),
            rate: 0.0012,
        }];

        assert_eq!(wh.append(&table, &rows).unwrap(), 1);
        assert_eq!(wh.read_currency_conversions(&table).unwrap(), rows);
    }

    #[test]
    fn large_batches_are_chunked() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let table = TableRef::new("meli", "sellers_details");
        let rows: Vec<SellerRecord> = (0..2_500)
            .map(|i| SellerRecord {
                seller_id: i.to_string(),
                qty_sales: i,
            })
            .collect();

        assert_eq!(wh.append(&table, &rows).unwrap(), 2_500);
        assert_eq!(wh.read_sellers(&table).unwrap(), rows);
    }

    #[test]
    fn column_mismatch_is_a_schema_error() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        wh.connection()
            .execute_batch(
                "CREATE SCHEMA meli;
                 CREATE TABLE meli.sellers_details (seller_id TEXT, reputation TEXT);",
            )
            .unwrap();
        let table = TableRef::new("meli", "sellers_details");
        let rows = vec![SellerRecord {
            seller_id: "1".to_string(),
            qty_sales: 5,
        }];

        let err = wh.append(&table, &rows).unwrap_err();
        assert!(matches!(err, LoadError::Schema { .. }), "{err}");
        assert_eq!(wh.row_count(&table).unwrap(), 0);
    }

    #[test]
    fn read_only_file_is_a_permission_error() {
        let path = std::env::temp_dir().join(format!(
            "meli_etl_read_only_{}.duckdb",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        drop(DuckDbWarehouse::open(&path).unwrap());

        let mut wh = DuckDbWarehouse::open_read_only(&path).unwrap();
        let err = wh
            .append(
                &TableRef::new("meli", "sellers_details"),
                &[SellerRecord {
                    seller_id: "1".to_string(),
                    qty_sales: 5,
                }],
            )
            .unwrap_err();
        drop(wh);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("duckdb.wal"));

        assert!(matches!(err, LoadError::Permission { .. }), "{err}");
    }

    #[test]
    fn rejects_invalid_table_name() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let err = wh
            .append::<SellerRecord>(&TableRef::new("meli", "bad name"), &[])
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidIdentifier { .. }));
    }
}
