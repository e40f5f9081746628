//! SQLite store backend

use super::{quote_identifier, quote_table_name, Store};
use crate::{
    config::DbConfig,
    error::{Error, Result},
    progress::{ProgressConfig, ProgressReport, Work},
    table::{Table, Value},
};
use rusqlite::{
    types::{ToSql, ToSqlOutput, ValueRef},
    Connection, OpenFlags,
};
use std::{fmt::Display, num::NonZeroUsize, path::PathBuf};

/// Maximal number of bound parameters in a single SQLite statement
const MAX_BOUND_PARAMETERS: usize = 32766;

/// Store backed by an SQLite database file
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file
    path: PathBuf,

    /// Description of the database, for error messages
    target: String,

    /// Progress report for batch writes
    report: ProgressReport,
}
//
impl SqliteStore {
    /// Prepare to access the SQLite database file designated by `config`
    pub fn new(config: &DbConfig, report: ProgressReport) -> Self {
        if config.password.is_some() {
            log::warn!("SQLite databases do not authenticate, ignoring the database password");
        }
        Self {
            path: PathBuf::from(&*config.database),
            target: config.describe(),
            report,
        }
    }

    /// Open the database file
    fn open(&self, flags: OpenFlags) -> Result<Connection> {
        Connection::open_with_flags(&self.path, flags | OpenFlags::SQLITE_OPEN_NO_MUTEX).map_err(
            |e| {
                log::error!("Failed to open {}: {e}", self.path.display());
                Error::Connection {
                    target: self.target.clone(),
                    message: e.to_string(),
                }
            },
        )
    }
}
//
impl Store for SqliteStore {
    fn load(&self, table_name: &str) -> Result<Table> {
        let connection = self.open(OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let query_error = |e: rusqlite::Error| Error::Query {
            table: table_name.into(),
            message: e.to_string(),
        };

        let mut statement = connection
            .prepare(&format!("SELECT * FROM {}", quote_table_name(table_name)))
            .map_err(query_error)?;
        let columns = (statement.column_names().into_iter())
            .map(Box::<str>::from)
            .collect::<Vec<_>>();
        let num_columns = columns.len();
        let mut table = Table::new(columns);

        let mut rows = statement.query([]).map_err(query_error)?;
        while let Some(row) = rows.next().map_err(query_error)? {
            let values = (0..num_columns)
                .map(|idx| row.get_ref(idx).map(Value::from))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(query_error)?;
            table.push_row(values);
        }
        log::info!("Loaded {} rows from table {table_name}", table.num_rows());
        Ok(table)
    }

    fn replace(&self, table_name: &str, table: &Table, batch_size: NonZeroUsize) -> Result<()> {
        let write_error = |message: &dyn Display| {
            log::error!("Failed to save data to table {table_name}: {message}");
            Error::Write {
                table: table_name.into(),
                message: message.to_string(),
            }
        };
        let num_columns = table.columns().len();
        if num_columns == 0 {
            return Err(write_error(&"tables must have at least one column"));
        }
        if num_columns > MAX_BOUND_PARAMETERS {
            return Err(write_error(&format!(
                "{num_columns} columns exceed the SQLite bound parameter limit"
            )));
        }
        let rows_per_batch = batch_size.get().min(MAX_BOUND_PARAMETERS / num_columns);

        // Everything happens in one transaction, so a failure leaves the
        // previous table untouched
        let mut connection =
            self.open(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE)?;
        let transaction = connection.transaction().map_err(|e| write_error(&e))?;
        let quoted_name = quote_table_name(table_name);
        let column_defs = (table.columns().iter().enumerate())
            .map(|(idx, name)| format!("{} {}", quote_identifier(name), column_type(table, idx)))
            .collect::<Vec<_>>()
            .join(", ");
        transaction
            .execute_batch(&format!(
                "DROP TABLE IF EXISTS {quoted_name};
                 CREATE TABLE {quoted_name} ({column_defs});"
            ))
            .map_err(|e| write_error(&e))?;

        let progress = self.report.add(
            format!("Saving {table_name}"),
            ProgressConfig::new(Work::Steps(table.num_rows())).dont_show_rate_eta(),
        );
        for batch in table.rows().chunks(rows_per_batch) {
            let sql = insert_statement(&quoted_name, num_columns, batch.len());
            let mut statement = transaction
                .prepare_cached(&sql)
                .map_err(|e| write_error(&e))?;
            statement
                .execute(rusqlite::params_from_iter(batch.iter().flat_map(|row| row.iter())))
                .map_err(|e| write_error(&e))?;
            log::trace!("Inserted a batch of {} rows into {table_name}", batch.len());
            progress.make_progress(batch.len() as u64);
        }
        transaction.commit().map_err(|e| write_error(&e))?;
        log::info!("Saved {} rows to table {table_name}", table.num_rows());
        Ok(())
    }
}

/// SQL type of a column, inferred from its first non-null value
fn column_type(table: &Table, idx: usize) -> &'static str {
    match table.column(idx).find(|value| !value.is_null()) {
        Some(Value::Integer(_)) => "INTEGER",
        Some(Value::Real(_)) => "REAL",
        Some(Value::Blob(_)) => "BLOB",
        Some(Value::Text(_) | Value::Null) | None => "TEXT",
    }
}

/// Multi-row INSERT statement
fn insert_statement(quoted_name: &str, num_columns: usize, num_rows: usize) -> String {
    let row = format!("({})", vec!["?"; num_columns].join(", "));
    format!(
        "INSERT INTO {quoted_name} VALUES {}",
        vec![row.as_str(); num_rows].join(", ")
    )
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(text) => Self::Text(String::from_utf8_lossy(text).into()),
            ValueRef::Blob(blob) => Self::Blob(blob.into()),
        }
    }
}
//
impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Self::Null => ValueRef::Null,
            Self::Integer(i) => ValueRef::Integer(*i),
            Self::Real(r) => ValueRef::Real(*r),
            Self::Text(text) => ValueRef::Text(text.as_bytes()),
            Self::Blob(blob) => ValueRef::Blob(blob),
        }))
    }
}
