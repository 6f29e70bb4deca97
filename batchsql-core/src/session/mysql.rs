//! MySQL sessions over a single `sqlx` connection.
//!
//! # Security
//! - Passwords go into connect options only, never into SQL or log output
//! - Connection errors carry the redacted config, not the connection string

use super::{Connector, Session};
use crate::Result;
use crate::config::ConnectionConfig;
use crate::error::BatchSqlError;
use crate::models::{ResultTable, SqlValue};
use crate::query::BoundStatement;
use crate::security::Credentials;
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, TypeInfo};
use std::time::Duration;

impl ConnectionConfig {
    /// Driver connect options for this config and `credentials`.
    ///
    /// The credentials' username wins over the config's.
    pub fn connect_options(&self, credentials: &Credentials) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.effective_port())
            .username(credentials.username());

        if let Some(password) = credentials.password() {
            options = options.password(password);
        }
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        options
    }
}

/// Opens [`MySqlSession`]s.
#[derive(Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
    target: String,
}

impl std::fmt::Debug for MySqlConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnector")
            .field("target", &self.target)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl MySqlConnector {
    /// Creates a connector from validated settings.
    ///
    /// # Errors
    /// Returns a configuration error if `config` fails validation.
    pub fn new(config: &ConnectionConfig, credentials: &Credentials) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            options: config.connect_options(credentials),
            connect_timeout: config.connect_timeout,
            target: config.to_string(),
        })
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        let connection = tokio::time::timeout(self.connect_timeout, self.options.connect())
            .await
            .map_err(|_| BatchSqlError::Timeout {
                elapsed_ms: self.connect_timeout.as_millis(),
            })?
            .map_err(|e| {
                BatchSqlError::connection_failed(format!("Failed to connect to {}", self.target), e)
            })?;

        tracing::debug!("Opened MySQL session to {}", self.target);
        Ok(Box::new(MySqlSession::new(connection)))
    }
}

/// A [`Session`] over one `MySqlConnection`.
#[derive(Debug)]
pub struct MySqlSession {
    connection: Option<MySqlConnection>,
}

impl MySqlSession {
    /// Wraps an already open connection.
    pub fn new(connection: MySqlConnection) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    fn connection(&mut self) -> Result<&mut MySqlConnection> {
        self.connection.as_mut().ok_or(BatchSqlError::NotConnected)
    }
}

fn bind_values<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &'q [SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::UInt(u) => query.bind(*u),
            SqlValue::Float(x) => query.bind(*x),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Bytes(b) => query.bind(b.as_slice()),
            SqlValue::Date(d) => query.bind(*d),
            SqlValue::Time(t) => query.bind(*t),
            SqlValue::DateTime(dt) => query.bind(*dt),
        };
    }
    query
}

/// Decodes one cell, choosing the Rust type from the column's MySQL type.
fn decode_cell(row: &MySqlRow, index: usize) -> SqlValue {
    let type_name = row.column(index).type_info().name().to_ascii_uppercase();

    let decoded = match type_name.as_str() {
        "NULL" => Some(SqlValue::Null),
        "BOOLEAN" => get::<bool>(row, index),
        name if name.ends_with("UNSIGNED") => get::<u64>(row, index),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            get::<i64>(row, index)
        }
        "FLOAT" => row
            .try_get_unchecked::<Option<f32>, _>(index)
            .ok()
            .map(|v| v.map_or(SqlValue::Null, |x| SqlValue::Float(f64::from(x)))),
        "DOUBLE" => get::<f64>(row, index),
        "DATE" => get::<chrono::NaiveDate>(row, index),
        "TIME" => get::<chrono::NaiveTime>(row, index),
        "DATETIME" | "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, index),
        "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT"
        | "GEOMETRY" => get::<Vec<u8>>(row, index),
        // DECIMAL, JSON, ENUM, SET and character types arrive as text
        _ => get::<String>(row, index),
    };

    decoded
        .or_else(|| get::<String>(row, index))
        .or_else(|| {
            row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
                .ok()
                .map(|v| {
                    v.map_or(SqlValue::Null, |b| {
                        SqlValue::Text(String::from_utf8_lossy(&b).into_owned())
                    })
                })
        })
        .unwrap_or(SqlValue::Null)
}

fn get<'r, T>(row: &'r MySqlRow, index: usize) -> Option<SqlValue>
where
    T: sqlx::Decode<'r, MySql> + Into<SqlValue>,
{
    row.try_get_unchecked::<Option<T>, _>(index)
        .ok()
        .map(SqlValue::from)
}

fn to_result_table(rows: &[MySqlRow]) -> ResultTable {
    let Some(first) = rows.first() else {
        return ResultTable::empty();
    };

    let columns = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| decode_cell(row, i)).collect())
        .collect();

    ResultTable { columns, rows }
}

#[async_trait]
impl Session for MySqlSession {
    async fn ping(&mut self) -> Result<()> {
        self.connection()?
            .ping()
            .await
            .map_err(|e| BatchSqlError::connection_failed("Ping failed", e))
    }

    async fn execute(&mut self, statement: &BoundStatement) -> Result<u64> {
        if statement.values.is_empty() {
            return self.execute_raw(&statement.sql).await;
        }
        let connection = self.connection()?;
        let query = bind_values(sqlx::query(&statement.sql), &statement.values);
        let result = query
            .execute(&mut *connection)
            .await
            .map_err(|e| BatchSqlError::execution_failed("Statement rejected by server", e))?;
        Ok(result.rows_affected())
    }

    async fn fetch(&mut self, statement: &BoundStatement) -> Result<ResultTable> {
        let connection = self.connection()?;
        let rows = if statement.values.is_empty() {
            connection.fetch_all(statement.sql.as_str()).await
        } else {
            bind_values(sqlx::query(&statement.sql), &statement.values)
                .fetch_all(&mut *connection)
                .await
        }
        .map_err(|e| BatchSqlError::execution_failed("Query rejected by server", e))?;

        Ok(to_result_table(&rows))
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<u64> {
        let connection = self.connection()?;
        let result = connection
            .execute(sql)
            .await
            .map_err(|e| BatchSqlError::execution_failed("Statement rejected by server", e))?;
        Ok(result.rows_affected())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            connection
                .close()
                .await
                .map_err(|e| BatchSqlError::connection_failed("Failed to close connection", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_rejects_invalid_config() {
        let config = ConnectionConfig::new(String::new());
        let credentials = Credentials::new("root".to_string(), None);
        assert!(MySqlConnector::new(&config, &credentials).is_err());
    }

    #[test]
    fn test_connect_options_use_effective_port() {
        let config = ConnectionConfig::new("db.internal".to_string())
            .with_database("app".to_string());
        let credentials = Credentials::new("loader".to_string(), Some("secret".to_string()));
        let options = config.connect_options(&credentials);

        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 3306);
        assert_eq!(options.get_username(), "loader");
        assert_eq!(options.get_database(), Some("app"));
    }

    #[test]
    fn test_connector_debug_omits_password() {
        let config = ConnectionConfig::new("db.internal".to_string());
        let credentials = Credentials::new("loader".to_string(), Some("hunter2".to_string()));
        let connector = MySqlConnector::new(&config, &credentials).unwrap();
        assert_eq!(connector.target, config.to_string());
        assert!(!format!("{:?}", connector).contains("hunter2"));
    }
}
