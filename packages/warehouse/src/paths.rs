#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the `DuckDB` warehouse.
//!
//! Relative paths resolve against the working directory the ETL runs in.

use std::path::{Path, PathBuf};

/// Default warehouse file name.
pub const DATABASE_FILE: &str = "meli.duckdb";

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Returns the default warehouse file path (`data/meli.duckdb`).
#[must_use]
pub fn default_database_path() -> PathBuf {
    data_dir().join(DATABASE_FILE)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
