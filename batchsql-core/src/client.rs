//! Connection manager and batch executor.
//!
//! A [`DbClient`] owns one lazily opened session and serializes every
//! statement through a per-instance lock, so a client can be shared behind an
//! `Arc` and two clients never wait on each other. Each operation re-checks
//! the held session with a ping and reopens it if the ping fails.

use std::path::Path;

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::audit::{self, AuditRecord};
use crate::bulk::{BulkLoadJob, BulkLoadSummary, run_bulk_load};
use crate::config::{ConnectionConfig, SanitizationPolicy};
use crate::error::BatchSqlError;
use crate::models::{DataTable, ParamDef, ResultTable, RowMap, SqlValue};
use crate::query::csv::{self, CsvEncoding};
use crate::query::{LiteralInsert, ParamInsert, PreparedInsert, Statement};
use crate::sanitize;
use crate::session::{Connector, Session, Timed};

type SessionSlot = Option<Box<dyn Session>>;

/// How [`DbClient::write_batch`] puts values into the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Values bound by the driver
    #[default]
    Parameterized,
    /// Values inlined as quoted text; trusted input only
    Literal,
}

/// Client for one MySQL database.
///
/// # Example
/// ```rust,no_run
/// use batchsql_core::{DbClient, parse_connection_string};
/// use batchsql_core::query::Statement;
///
/// # async fn example() -> batchsql_core::Result<()> {
/// let (config, credentials) =
///     parse_connection_string("Server=localhost;Database=shop;Uid=loader;Pwd=secret;")?;
/// let client = DbClient::new(config, &credentials)?;
///
/// let orders = client
///     .execute_read(&Statement::new("SELECT id, total FROM orders"))
///     .await?;
/// println!("{} order(s)", orders.row_count());
/// # Ok(())
/// # }
/// ```
pub struct DbClient {
    config: ConnectionConfig,
    connector: Box<dyn Connector>,
    session: Mutex<SessionSlot>,
    check_identifiers: AtomicBool,
    check_values: AtomicBool,
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("config", &self.config)
            .field("policy", &self.policy())
            .finish_non_exhaustive()
    }
}

impl DbClient {
    /// Creates a MySQL client. No connection is opened until first use.
    ///
    /// # Errors
    /// Returns a configuration error if `config` fails validation.
    #[cfg(feature = "mysql")]
    pub fn new(config: ConnectionConfig, credentials: &crate::security::Credentials) -> Result<Self> {
        let connector = crate::session::MySqlConnector::new(&config, credentials)?;
        Self::with_connector(config, Box::new(connector))
    }

    /// Creates a MySQL client from either connection string form.
    #[cfg(feature = "mysql")]
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let (config, credentials) = crate::security::parse_connection_string(connection_string)?;
        Self::new(config, &credentials)
    }

    /// Creates a client that opens sessions through `connector`.
    pub fn with_connector(config: ConnectionConfig, connector: Box<dyn Connector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            session: Mutex::new(None),
            check_identifiers: AtomicBool::new(false),
            check_values: AtomicBool::new(false),
        })
    }

    /// Connection settings (no credentials).
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current sanitization switches.
    pub fn policy(&self) -> SanitizationPolicy {
        SanitizationPolicy {
            check_identifiers: self.check_identifiers.load(Ordering::Relaxed),
            check_values: self.check_values.load(Ordering::Relaxed),
        }
    }

    /// Replaces the sanitization switches; later writes see the new values.
    pub fn set_policy(&self, policy: SanitizationPolicy) {
        self.check_identifiers
            .store(policy.check_identifiers, Ordering::Relaxed);
        self.check_values.store(policy.check_values, Ordering::Relaxed);
    }

    // =========================================================================
    // Connection management
    // =========================================================================

    /// Opens the session if needed and reports whether it is live.
    ///
    /// A held session that fails its ping is closed and reopened.
    pub async fn connect(&self) -> bool {
        match self.acquire().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Connection to {} is not available: {}", self.config, e);
                false
            }
        }
    }

    /// Closes the held session and adopts `session` in its place.
    pub async fn replace(&self, session: Box<dyn Session>) {
        let mut slot = self.session.lock().await;
        if let Some(mut old) = slot.take()
            && let Err(e) = old.close().await
        {
            tracing::warn!("Failed to close replaced session: {}", e);
        }
        *slot = Some(session);
        tracing::debug!("Session for {} replaced", self.config);
    }

    /// Closes the held session, if any.
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        match slot.take() {
            Some(mut session) => session.close().await,
            None => Ok(()),
        }
    }

    /// Runs `f` with exclusive access to the live session.
    ///
    /// Statements issued inside `f` are not subject to the query timeout.
    ///
    /// # Example
    /// ```rust,no_run
    /// use batchsql_core::DbClient;
    /// use futures::FutureExt;
    ///
    /// # async fn example(client: &DbClient) -> batchsql_core::Result<()> {
    /// let affected = client
    ///     .with_session(|session| {
    ///         async move { session.execute_raw("SET @batch = 1").await }.boxed()
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut dyn Session) -> BoxFuture<'s, Result<T>>,
    {
        let mut slot = self.acquire().await?;
        let session = slot.as_deref_mut().ok_or(BatchSqlError::NotConnected)?;
        f(session).await
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, SessionSlot>> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_deref_mut() {
            let ping = Timed::new(session, self.config.query_timeout).ping().await;
            match ping {
                Ok(()) => return Ok(slot),
                Err(e) => tracing::warn!("Held session failed ping, reopening: {}", e),
            }
            if let Some(mut stale) = slot.take()
                && let Err(e) = stale.close().await
            {
                tracing::debug!("Closing stale session failed: {}", e);
            }
        }
        *slot = Some(self.connector.connect().await?);
        Ok(slot)
    }

    fn timed<'a>(&self, slot: &'a mut SessionSlot) -> Result<Timed<'a>> {
        let session = slot.as_deref_mut().ok_or(BatchSqlError::NotConnected)?;
        Ok(Timed::new(session, self.config.query_timeout))
    }

    // =========================================================================
    // Batch executor
    // =========================================================================

    /// Runs a query and returns its rows.
    ///
    /// Returns an empty table when no connection can be opened.
    ///
    /// # Errors
    /// Returns an input error for an unbound placeholder, or the driver
    /// error if the server rejects the query.
    pub async fn execute_read(&self, statement: &Statement) -> Result<ResultTable> {
        let bound = statement.bind()?;
        let mut slot = match self.acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!("Read skipped, connection not available: {}", e);
                return Ok(ResultTable::empty());
            }
        };
        tracing::debug!("Executing read: {}", bound.sql);
        self.timed(&mut slot)?.fetch(&bound).await
    }

    /// Runs a statement and returns the affected-row count.
    ///
    /// # Errors
    /// Returns a connection error if no connection can be opened, or the
    /// driver error if the server rejects the statement.
    pub async fn execute_write(&self, statement: &Statement) -> Result<u64> {
        let bound = statement.bind()?;
        let mut slot = self.acquire().await?;
        tracing::debug!("Executing write: {}", bound.sql);
        self.timed(&mut slot)?.execute(&bound).await
    }

    /// Runs several statements in one transaction.
    async fn execute_all_or_nothing(&self, statements: &[Statement]) -> Result<u64> {
        let bound = statements
            .iter()
            .map(Statement::bind)
            .collect::<Result<Vec<_>>>()?;
        let mut slot = self.acquire().await?;
        let mut session = self.timed(&mut slot)?;

        session.begin().await?;
        let mut affected = 0u64;
        for statement in &bound {
            tracing::debug!("Executing write: {}", statement.sql);
            match session.execute(statement).await {
                Ok(count) => affected = affected.saturating_add(count),
                Err(e) => return Err(rollback_after(&mut session, e).await),
            }
        }
        if let Err(e) = session.commit().await {
            return Err(rollback_after(&mut session, e).await);
        }
        Ok(affected)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    fn check_target<C: AsRef<str>>(&self, table: &str, columns: &[C]) -> Result<()> {
        if self.policy().check_identifiers {
            sanitize::check_identifier(table)?;
            sanitize::check_identifiers(columns)?;
        }
        Ok(())
    }

    /// Inserts one row from a column-to-value map.
    ///
    /// An empty map writes nothing and returns 0 without connecting. Values
    /// are bound, so only identifier checks apply.
    pub async fn write_single_row(&self, table: &str, data: &RowMap) -> Result<u64> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut data = data.clone();
        let policy = self.policy().with_value_checks(false);
        sanitize::check_map(&mut data, policy)?;
        if policy.check_identifiers {
            sanitize::check_identifier(table)?;
        }

        let statement = ParamInsert::single_row(table, &data)?;
        self.execute_write(&statement).await
    }

    /// Inserts every row in as few statements as the placeholder limit allows.
    ///
    /// In [`WriteMode::Literal`] text values are escaped first when value
    /// checks are enabled. Parameterized batches that need more than one
    /// statement run inside a single transaction.
    pub async fn write_batch<C: AsRef<str>>(
        &self,
        table: &str,
        columns: &[C],
        rows: &[Vec<SqlValue>],
        mode: WriteMode,
    ) -> Result<u64> {
        self.check_target(table, columns)?;
        match mode {
            WriteMode::Parameterized => self.write_parameterized(table, columns, rows).await,
            WriteMode::Literal => {
                let mut rows = rows.to_vec();
                sanitize::escape_rows(&mut rows, self.policy());
                let statement = LiteralInsert::multi_row(table, columns, &rows)?;
                self.execute_write(&statement).await
            }
        }
    }

    async fn write_parameterized<C: AsRef<str>>(
        &self,
        table: &str,
        columns: &[C],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        let statements = ParamInsert::multi_row_chunks(table, columns, rows)?;
        match statements.as_slice() {
            [single] => self.execute_write(single).await,
            _ => {
                tracing::debug!(
                    "Splitting {} row(s) into {} statements",
                    rows.len(),
                    statements.len()
                );
                self.execute_all_or_nothing(&statements).await
            }
        }
    }

    /// Inserts the records of a CSV payload.
    ///
    /// # Errors
    /// Returns [`BatchSqlError::EmptyInput`] if `csv_text` is blank.
    pub async fn write_csv_text<C: AsRef<str>>(
        &self,
        table: &str,
        columns: &[C],
        csv_text: &str,
        skip_header: bool,
    ) -> Result<u64> {
        if csv_text.trim().is_empty() {
            return Err(BatchSqlError::empty_input("CSV text"));
        }
        self.check_target(table, columns)?;
        let rows = csv::parse_rows(csv_text, columns.len(), skip_header)?;
        self.write_parameterized(table, columns, &rows).await
    }

    /// Inserts the records of a CSV file.
    ///
    /// # Errors
    /// Returns [`BatchSqlError::FileNotFound`] if `path` does not exist.
    pub async fn write_csv_file<C: AsRef<str>>(
        &self,
        table: &str,
        columns: &[C],
        path: &Path,
        skip_header: bool,
        encoding: CsvEncoding,
    ) -> Result<u64> {
        let text = csv::read_file(path, encoding).await?;
        self.check_target(table, columns)?;
        let rows = csv::parse_rows(&text, columns.len(), skip_header)?;
        self.write_parameterized(table, columns, &rows).await
    }

    /// Inserts a table as one literal-mode statement.
    pub async fn write_table(&self, table: &DataTable) -> Result<u64> {
        self.check_target(table.name(), &table.schema.column_names())?;
        let statement = if self.policy().check_values {
            let mut rows = table.rows().to_vec();
            sanitize::escape_rows(&mut rows, self.policy());
            LiteralInsert::from_table(&DataTable::with_rows(table.schema.clone(), rows)?)?
        } else {
            LiteralInsert::from_table(table)?
        };
        self.execute_write(&statement).await
    }

    /// Inserts a table one row at a time through a prepared statement.
    ///
    /// Each row is its own autocommitted statement; a failure stops the
    /// load and leaves earlier rows in place.
    pub async fn write_table_rows(&self, table: &DataTable, params: &[ParamDef]) -> Result<u64> {
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        self.check_target(table.name(), &names)?;
        if table.is_empty() {
            return Err(BatchSqlError::empty_input(format!(
                "rows of table '{}'",
                table.name()
            )));
        }
        let prepared = PreparedInsert::new(&table.schema, params)?;

        let mut slot = self.acquire().await?;
        let mut session = self.timed(&mut slot)?;
        tracing::debug!("Executing per row: {}", prepared.sql());
        let mut affected = 0u64;
        for row in table.rows() {
            let count = session.execute(&prepared.bind_row(row)?).await?;
            affected = affected.saturating_add(count);
        }
        Ok(affected)
    }

    /// Bulk-loads a table, committing every `submission_count` rows.
    ///
    /// See [`crate::bulk`] for the commit and rollback contract.
    pub async fn write_table_bulk(
        &self,
        table: &DataTable,
        submission_count: usize,
        params: &[ParamDef],
    ) -> Result<u64> {
        let token = CancellationToken::new();
        self.write_table_bulk_with_cancel(table, submission_count, params, &token)
            .await
            .map(|summary| summary.affected_rows)
    }

    /// Bulk-loads a table and stops at the next row or commit once `token`
    /// is cancelled.
    pub async fn write_table_bulk_with_cancel(
        &self,
        table: &DataTable,
        submission_count: usize,
        params: &[ParamDef],
        token: &CancellationToken,
    ) -> Result<BulkLoadSummary> {
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        self.check_target(table.name(), &names)?;
        if params.is_empty() {
            return Err(BatchSqlError::InvalidArgument {
                name: "parameters".to_string(),
            });
        }

        let job = BulkLoadJob::new(params.to_vec(), submission_count);
        let mut slot = self.acquire().await?;
        let mut session = self.timed(&mut slot)?;
        run_bulk_load(&mut session, &job, table, token).await
    }

    // =========================================================================
    // Audit logger
    // =========================================================================

    /// Stores an audit record, creating the audit table if it is absent.
    ///
    /// The `CREATE TABLE IF NOT EXISTS` runs before every insert, so a table
    /// dropped between calls is recreated. Returns `Ok(false)` without
    /// writing when no connection can be opened. Otherwise returns whether
    /// exactly one row was inserted.
    pub async fn record_error(&self, record: &AuditRecord) -> Result<bool> {
        let table = self.config.audit_table.as_str();
        let insert = record.insert_statement(table)?.bind()?;

        let mut slot = match self.acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!("Audit record dropped, connection not available: {}", e);
                return Ok(false);
            }
        };
        let mut session = self.timed(&mut slot)?;

        session.execute_raw(&audit::create_table_sql(table)).await?;
        let affected = session.execute(&insert).await?;
        Ok(affected == 1)
    }

    /// Stores `error` under the configured project name.
    ///
    /// `module_path` is the qualified location, typically `module_path!()`.
    pub async fn record_failure(
        &self,
        method_name: &str,
        module_path: &str,
        error: &(dyn std::error::Error + 'static),
    ) -> Result<bool> {
        let record =
            AuditRecord::from_error(&self.config.project_name, method_name, module_path, error);
        self.record_error(&record).await
    }
}

/// Rolls back the open transaction after `cause` and returns `cause`.
async fn rollback_after(session: &mut Timed<'_>, cause: BatchSqlError) -> BatchSqlError {
    if let Err(e) = session.rollback().await {
        tracing::error!("Rollback after failed write also failed: {}", e);
    }
    cause
}
