//! SQL Server store backend
//!
//! Talks TDS to SQL Server or Azure SQL. The client is asynchronous, so each
//! store owns a single-threaded tokio runtime and blocks on it.

use super::Store;
use crate::{
    config::{DbConfig, Password},
    error::{Error, Result},
    progress::{ProgressConfig, ProgressReport, Work},
    table::{Table, Value},
};
use std::{borrow::Cow, fmt::Display, num::NonZeroUsize, time::Duration};
use tiberius::{AuthMethod, Client, ColumnData, EncryptionLevel, ToSql};
use tokio::{net::TcpStream, runtime::Runtime};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// TCP port that SQL Server listens on unless told otherwise
const DEFAULT_PORT: u16 = 1433;

/// Time allowed for reaching the server and logging in
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximal number of parameters of a request, minus the two that
/// `sp_executesql` uses for the statement and parameter declarations
const MAX_PARAMETERS: usize = 2098;

/// Maximal number of rows in a single `INSERT ... VALUES` statement
const MAX_ROWS_PER_INSERT: usize = 1000;

/// Client connection to the server
type Connection = Client<Compat<TcpStream>>;

/// Store backed by a SQL Server database
#[derive(Debug)]
pub struct MssqlStore {
    /// Server host name
    host: Box<str>,

    /// Server TCP port
    port: u16,

    /// Database name
    database: Box<str>,

    /// SQL Server login
    username: Box<str>,
    password: Password,

    /// Description of the database, for error messages
    target: String,

    /// Runtime that drives the client
    runtime: Runtime,

    /// Progress report for batch writes
    report: ProgressReport,
}
//
impl MssqlStore {
    /// Prepare to access the SQL Server database designated by `config`
    ///
    /// No connection is made yet, but the server address and credentials are
    /// checked for completeness.
    pub fn new(config: &DbConfig, report: ProgressReport) -> Result<Self> {
        let target = config.describe();
        let connection_error = |message: &dyn Display| {
            log::error!("Cannot connect to {target}: {message}");
            Error::Connection {
                target: target.clone(),
                message: message.to_string(),
            }
        };
        let (host, port) = parse_server(&config.server).map_err(|e| connection_error(&e))?;
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Err(connection_error(
                &"SQL Server logins need both a user name and a password",
            ));
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| connection_error(&e))?;
        Ok(Self {
            host: host.into(),
            port,
            database: config.database.clone(),
            username: username.clone(),
            password: password.clone(),
            target,
            runtime,
            report,
        })
    }

    /// Open a connection and log in
    async fn connect(&self) -> Result<Connection> {
        let mut config = tiberius::Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.database(&self.database);
        config.application_name(env!("CARGO_PKG_NAME"));
        config.authentication(AuthMethod::sql_server(&self.username, &self.password.0));
        config.encryption(EncryptionLevel::Required);

        let login = async move {
            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            let client = Client::connect(config, tcp.compat_write()).await?;
            Ok::<_, tiberius::error::Error>(client)
        };
        let message = match tokio::time::timeout(CONNECT_TIMEOUT, login).await {
            Ok(Ok(client)) => {
                log::debug!("Logged into {}", self.target);
                return Ok(client);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no answer after {}s", CONNECT_TIMEOUT.as_secs()),
        };
        log::error!("Failed to connect to {}: {message}", self.target);
        Err(Error::Connection {
            target: self.target.clone(),
            message,
        })
    }

    /// Drop and recreate a table, then fill it, within the current transaction
    async fn write_table(
        &self,
        client: &mut Connection,
        table_name: &str,
        table: &Table,
        rows_per_batch: usize,
    ) -> tiberius::Result<()> {
        let quoted_name = bracket_table_name(table_name);
        let column_defs = (table.columns().iter().enumerate())
            .map(|(idx, name)| format!("{} {}", bracket_identifier(name), column_type(table, idx)))
            .collect::<Vec<_>>()
            .join(", ");
        client
            .execute(
                format!(
                    "DROP TABLE IF EXISTS {quoted_name}; CREATE TABLE {quoted_name} ({column_defs})"
                ),
                &[],
            )
            .await?;

        let progress = self.report.add(
            format!("Saving {table_name}"),
            ProgressConfig::new(Work::Steps(table.num_rows())).dont_show_rate_eta(),
        );
        for batch in table.rows().chunks(rows_per_batch) {
            let params = (batch.iter().flat_map(|row| row.iter()))
                .map(|value| value as &dyn ToSql)
                .collect::<Vec<_>>();
            let sql = insert_statement(&quoted_name, table.columns().len(), batch.len());
            client.execute(sql, &params).await?;
            log::trace!("Inserted a batch of {} rows into {table_name}", batch.len());
            progress.make_progress(batch.len() as u64);
        }
        Ok(())
    }

    /// Read every row of a table
    async fn load_table(&self, table_name: &str) -> Result<Table> {
        let mut client = self.connect().await?;
        let query_error = |e: tiberius::error::Error| Error::Query {
            table: table_name.into(),
            message: e.to_string(),
        };

        let sql = format!("SELECT * FROM {}", bracket_table_name(table_name));
        let mut stream = client.simple_query(sql).await.map_err(query_error)?;
        let columns = (stream.columns().await.map_err(query_error)?)
            .map(|columns| {
                (columns.iter())
                    .map(|column| Box::<str>::from(column.name()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let mut table = Table::new(columns);
        for row in stream.into_first_result().await.map_err(query_error)? {
            table.push_row(row.into_iter().map(Value::from).collect::<Vec<_>>());
        }
        log::info!("Loaded {} rows from table {table_name}", table.num_rows());
        Ok(table)
    }

    /// Replace a table within a transaction that is rolled back on failure
    async fn replace_table(
        &self,
        table_name: &str,
        table: &Table,
        rows_per_batch: usize,
    ) -> Result<()> {
        let mut client = self.connect().await?;
        run_batch(&mut client, "BEGIN TRANSACTION")
            .await
            .map_err(|e| write_error(table_name, &e))?;
        if let Err(e) = self
            .write_table(&mut client, table_name, table, rows_per_batch)
            .await
        {
            if let Err(rollback) = run_batch(&mut client, "ROLLBACK TRANSACTION").await {
                log::warn!("Failed to roll back changes to table {table_name}: {rollback}");
            }
            return Err(write_error(table_name, &e));
        }
        run_batch(&mut client, "COMMIT TRANSACTION")
            .await
            .map_err(|e| write_error(table_name, &e))?;
        log::info!("Saved {} rows to table {table_name}", table.num_rows());
        Ok(())
    }
}
//
impl Store for MssqlStore {
    fn load(&self, table_name: &str) -> Result<Table> {
        self.runtime.block_on(self.load_table(table_name))
    }

    fn replace(&self, table_name: &str, table: &Table, batch_size: NonZeroUsize) -> Result<()> {
        let num_columns = table.columns().len();
        if num_columns == 0 {
            return Err(write_error(
                table_name,
                &"tables must have at least one column",
            ));
        }
        if num_columns > MAX_PARAMETERS {
            return Err(write_error(
                table_name,
                &format!("{num_columns} columns exceed the SQL Server parameter limit"),
            ));
        }
        let rows_per_batch = (batch_size.get())
            .min(MAX_ROWS_PER_INSERT)
            .min(MAX_PARAMETERS / num_columns);
        self.runtime
            .block_on(self.replace_table(table_name, table, rows_per_batch))
    }
}

/// Report a failure to save a table
fn write_error(table_name: &str, message: &dyn Display) -> Error {
    log::error!("Failed to save data to table {table_name}: {message}");
    Error::Write {
        table: table_name.into(),
        message: message.to_string(),
    }
}

/// Run a plain SQL batch and discard its results
async fn run_batch(client: &mut Connection, sql: &str) -> tiberius::Result<()> {
    client.simple_query(sql).await?.into_results().await?;
    Ok(())
}

/// Split a server specification like `tcp:host,1433` into host and port
fn parse_server(server: &str) -> std::result::Result<(&str, u16), String> {
    let server = server.trim();
    let server = server.strip_prefix("tcp:").unwrap_or(server);
    let (host, port) = match server.split_once(',') {
        Some((host, port)) => {
            let port = (port.trim().parse::<u16>())
                .map_err(|e| format!("invalid server port '{}': {e}", port.trim()))?;
            (host.trim(), port)
        }
        None => (server, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err("no server host specified".into());
    }
    Ok((host, port))
}

/// Quote a possibly schema-qualified table name with brackets
fn bracket_table_name(name: &str) -> String {
    name.split('.')
        .map(bracket_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// Quote an identifier with brackets
fn bracket_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// SQL type of a column, inferred from its first non-null value
fn column_type(table: &Table, idx: usize) -> &'static str {
    match table.column(idx).find(|value| !value.is_null()) {
        Some(Value::Integer(_)) => "BIGINT",
        Some(Value::Real(_)) => "FLOAT",
        Some(Value::Blob(_)) => "VARBINARY(MAX)",
        Some(Value::Text(_) | Value::Null) | None => "NVARCHAR(MAX)",
    }
}

/// Multi-row INSERT statement with numbered parameters
fn insert_statement(quoted_name: &str, num_columns: usize, num_rows: usize) -> String {
    let rows = (0..num_rows)
        .map(|row| {
            let params = (1..=num_columns)
                .map(|col| format!("@P{}", row * num_columns + col))
                .collect::<Vec<_>>();
            format!("({})", params.join(", "))
        })
        .collect::<Vec<_>>();
    format!("INSERT INTO {quoted_name} VALUES {}", rows.join(", "))
}

// Date and time columns are not used by the analysis and load as NULL
impl From<ColumnData<'_>> for Value {
    fn from(data: ColumnData<'_>) -> Self {
        match data {
            ColumnData::U8(Some(i)) => Self::Integer(i.into()),
            ColumnData::I16(Some(i)) => Self::Integer(i.into()),
            ColumnData::I32(Some(i)) => Self::Integer(i.into()),
            ColumnData::I64(Some(i)) => Self::Integer(i),
            ColumnData::Bit(Some(b)) => Self::Integer(b.into()),
            ColumnData::F32(Some(r)) => Self::Real(r.into()),
            ColumnData::F64(Some(r)) => Self::Real(r),
            ColumnData::Numeric(Some(n)) => Self::Real(n.into()),
            ColumnData::String(Some(text)) => Self::Text(text.into()),
            ColumnData::Guid(Some(guid)) => Self::Text(guid.to_string().into()),
            ColumnData::Xml(Some(xml)) => Self::Text(xml.to_string().into()),
            ColumnData::Binary(Some(blob)) => Self::Blob(blob.into()),
            _ => Self::Null,
        }
    }
}
//
impl ToSql for Value {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            Self::Null => ColumnData::String(None),
            Self::Integer(i) => ColumnData::I64(Some(*i)),
            Self::Real(r) => ColumnData::F64(Some(*r)),
            Self::Text(text) => ColumnData::String(Some(Cow::Borrowed(text))),
            Self::Blob(blob) => ColumnData::Binary(Some(Cow::Borrowed(blob))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Read, net::TcpListener, thread};

    fn config(server: &str) -> DbConfig {
        DbConfig {
            server: server.into(),
            database: "imdb".into(),
            username: Some("analyst".into()),
            password: Some(Password("hunter2".into())),
            driver: "ODBC Driver 18 for SQL Server".into(),
        }
    }

    fn store(server: &str) -> MssqlStore {
        MssqlStore::new(&config(server), ProgressReport::hidden()).unwrap()
    }

    #[test]
    fn server_addresses() {
        assert_eq!(
            parse_server("tcp:reviews.database.windows.net,1433"),
            Ok(("reviews.database.windows.net", 1433))
        );
        assert_eq!(parse_server("localhost"), Ok(("localhost", DEFAULT_PORT)));
        assert_eq!(parse_server(" db.local , 14330 "), Ok(("db.local", 14330)));
        assert!(parse_server("localhost,port").is_err());
        assert!(parse_server("tcp:,1433").is_err());
    }

    #[test]
    fn logins_need_credentials() {
        for config in [
            DbConfig {
                username: None,
                ..config("localhost")
            },
            DbConfig {
                password: None,
                ..config("localhost")
            },
            config("localhost,99999"),
        ] {
            let result = MssqlStore::new(&config, ProgressReport::hidden());
            assert!(matches!(result, Err(Error::Connection { .. })));
        }
    }

    #[test]
    fn refused_connections() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let store = store(&format!("127.0.0.1,{port}"));
        assert!(matches!(
            store.load("dbo.imdb_reviews"),
            Err(Error::Connection { .. })
        ));
        let mut table = Table::new(["Word", "Frequency"]);
        table.push_row([Value::from("great"), Value::Integer(3)]);
        assert!(matches!(
            store.replace("Top_Words", &table, NonZeroUsize::MIN),
            Err(Error::Connection { .. })
        ));
    }

    #[test]
    fn failed_handshakes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut prelogin = [0; 8];
            let _ = stream.read(&mut prelogin);
        });
        let result = store(&format!("127.0.0.1,{port}")).load("dbo.imdb_reviews");
        assert!(matches!(result, Err(Error::Connection { .. })));
        server.join().unwrap();
    }

    #[test]
    fn bracket_quoting() {
        assert_eq!(bracket_table_name("dbo.imdb_reviews"), "[dbo].[imdb_reviews]");
        assert_eq!(bracket_identifier("odd]name"), "[odd]]name]");
    }

    #[test]
    fn insert_statement_layout() {
        assert_eq!(
            insert_statement("[t]", 2, 3),
            "INSERT INTO [t] VALUES (@P1, @P2), (@P3, @P4), (@P5, @P6)"
        );
    }

    #[test]
    fn column_types() {
        let mut table = Table::new(["a", "b", "c", "d"]);
        table.push_row([
            Value::Integer(1),
            Value::Real(1.5),
            Value::from("x"),
            Value::Blob([0].into()),
        ]);
        let types = (0..4).map(|idx| column_type(&table, idx)).collect::<Vec<_>>();
        assert_eq!(types, ["BIGINT", "FLOAT", "NVARCHAR(MAX)", "VARBINARY(MAX)"]);
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from(ColumnData::I32(Some(7))), Value::Integer(7));
        assert_eq!(Value::from(ColumnData::Bit(Some(true))), Value::Integer(1));
        assert_eq!(Value::from(ColumnData::F32(Some(0.5))), Value::Real(0.5));
        assert_eq!(
            Value::from(ColumnData::String(Some("great film".into()))),
            Value::from("great film")
        );
        assert_eq!(Value::from(ColumnData::I64(None)), Value::Null);
        assert_eq!(Value::from("great").to_sql(), ColumnData::String(Some("great".into())));
        assert_eq!(Value::Integer(9).to_sql(), ColumnData::I64(Some(9)));
        assert_eq!(Value::Null.to_sql(), ColumnData::String(None));
    }
}
