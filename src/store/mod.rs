//! Relational store access
//!
//! Tables are read and written whole. Connections are opened at the start of
//! each operation and closed at the end of it.

mod mssql;
mod sqlite;

pub use self::{mssql::MssqlStore, sqlite::SqliteStore};

use crate::{
    config::DbConfig,
    error::{Error, Result},
    progress::ProgressReport,
    table::Table,
};
use std::num::NonZeroUsize;

/// Relational store that tables can be loaded from and saved to
pub trait Store {
    /// Read every row of a table
    fn load(&self, table_name: &str) -> Result<Table>;

    /// Replace a table with new contents
    ///
    /// The previous table, if any, is dropped and recreated with the columns
    /// of `table`, then rows are inserted `batch_size` at a time.
    fn replace(&self, table_name: &str, table: &Table, batch_size: NonZeroUsize) -> Result<()>;
}

/// Set up access to the store that a connection descriptor points to
pub fn connect(config: &DbConfig, report: &ProgressReport) -> Result<Box<dyn Store>> {
    log::debug!("Connecting to {}", config.describe());
    match &*config.driver.to_ascii_lowercase() {
        "sqlite" | "sqlite3" => Ok(Box::new(SqliteStore::new(config, report.clone()))),
        "mssql" | "sqlserver" => Ok(Box::new(MssqlStore::new(config, report.clone())?)),
        // ODBC driver names, like "ODBC Driver 18 for SQL Server"
        odbc if odbc.contains("sql server") => {
            Ok(Box::new(MssqlStore::new(config, report.clone())?))
        }
        other => {
            log::error!("Database driver '{other}' is not supported");
            Err(Error::Connection {
                target: config.describe(),
                message: format!("unsupported database driver '{other}'"),
            })
        }
    }
}

/// Quote a possibly schema-qualified table name for use in SQL statements
fn quote_table_name(name: &str) -> String {
    name.split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// Quote an SQL identifier
fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Connection descriptor of an SQLite database file
#[cfg(test)]
pub(crate) fn sqlite_config(path: &std::path::Path) -> DbConfig {
    DbConfig {
        server: "localhost".into(),
        database: path.to_string_lossy().into(),
        username: None,
        password: None,
        driver: "sqlite".into(),
    }
}
