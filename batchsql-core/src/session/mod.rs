//! Driver seam for a single database connection.
//!
//! The connection manager, executor and bulk loader talk to the database only
//! through [`Session`]; new sessions come from a [`Connector`]. Both traits
//! are object-safe so a client holds `Box<dyn Session>` and tests can swap in
//! an in-process implementation.
//!
//! # Module Structure
//! - `mysql`: sqlx-backed implementation (feature `mysql`)

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(test)]
pub(crate) mod fake;

#[cfg(feature = "mysql")]
pub use mysql::{MySqlConnector, MySqlSession};

use crate::Result;
use crate::error::BatchSqlError;
use crate::models::ResultTable;
use crate::query::BoundStatement;
use async_trait::async_trait;
use std::time::Duration;

/// One open connection.
///
/// Transaction control is explicit: [`begin`](Session::begin) starts a
/// transaction and every statement until [`commit`](Session::commit) or
/// [`rollback`](Session::rollback) belongs to it.
#[async_trait]
pub trait Session: Send {
    /// Round-trips to the server; fails if the connection is no longer usable.
    async fn ping(&mut self) -> Result<()>;

    /// Runs a statement and returns the affected-row count.
    async fn execute(&mut self, statement: &BoundStatement) -> Result<u64>;

    /// Runs a query and collects every row.
    async fn fetch(&mut self, statement: &BoundStatement) -> Result<ResultTable>;

    /// Sends SQL text as-is over the text protocol.
    ///
    /// Used for transaction control and DDL.
    async fn execute_raw(&mut self, sql: &str) -> Result<u64>;

    /// Starts a transaction.
    async fn begin(&mut self) -> Result<()> {
        self.execute_raw("START TRANSACTION").await.map(|_| ())
    }

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<()> {
        self.execute_raw("COMMIT").await.map(|_| ())
    }

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<()> {
        self.execute_raw("ROLLBACK").await.map(|_| ())
    }

    /// Closes the connection. Later calls fail with `NotConnected`.
    async fn close(&mut self) -> Result<()>;
}

/// Opens new sessions from stored connection settings.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a fresh session.
    ///
    /// # Errors
    /// Returns a connection error with credentials removed from the context.
    async fn connect(&self) -> Result<Box<dyn Session>>;
}

/// Borrowed session whose every call is bounded by a timeout.
///
/// A call that overruns is abandoned and reported as
/// [`BatchSqlError::Timeout`]; the next `ping` decides whether the
/// underlying connection is still usable.
pub(crate) struct Timed<'a> {
    inner: &'a mut dyn Session,
    limit: Duration,
}

impl<'a> Timed<'a> {
    pub(crate) fn new(inner: &'a mut dyn Session, limit: Duration) -> Self {
        Self { inner, limit }
    }

    fn expired(&self) -> BatchSqlError {
        tracing::warn!("Statement exceeded the {:?} query timeout", self.limit);
        BatchSqlError::Timeout {
            elapsed_ms: self.limit.as_millis(),
        }
    }
}

#[async_trait]
impl Session for Timed<'_> {
    async fn ping(&mut self) -> Result<()> {
        tokio::time::timeout(self.limit, self.inner.ping())
            .await
            .unwrap_or_else(|_| Err(self.expired()))
    }

    async fn execute(&mut self, statement: &BoundStatement) -> Result<u64> {
        tokio::time::timeout(self.limit, self.inner.execute(statement))
            .await
            .unwrap_or_else(|_| Err(self.expired()))
    }

    async fn fetch(&mut self, statement: &BoundStatement) -> Result<ResultTable> {
        tokio::time::timeout(self.limit, self.inner.fetch(statement))
            .await
            .unwrap_or_else(|_| Err(self.expired()))
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<u64> {
        tokio::time::timeout(self.limit, self.inner.execute_raw(sql))
            .await
            .unwrap_or_else(|_| Err(self.expired()))
    }

    async fn begin(&mut self) -> Result<()> {
        tokio::time::timeout(self.limit, self.inner.begin())
            .await
            .unwrap_or_else(|_| Err(self.expired()))
    }

    async fn commit(&mut self) -> Result<()> {
        tokio::time::timeout(self.limit, self.inner.commit())
            .await
            .unwrap_or_else(|_| Err(self.expired()))
    }

    async fn rollback(&mut self) -> Result<()> {
        tokio::time::timeout(self.limit, self.inner.rollback())
            .await
            .unwrap_or_else(|_| Err(self.expired()))
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    #[async_trait]
    impl Session for Stalled {
        async fn ping(&mut self) -> Result<()> {
            Ok(())
        }

        async fn execute(&mut self, _statement: &BoundStatement) -> Result<u64> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(1)
        }

        async fn fetch(&mut self, _statement: &BoundStatement) -> Result<ResultTable> {
            Ok(ResultTable::empty())
        }

        async fn execute_raw(&mut self, _sql: &str) -> Result<u64> {
            Ok(0)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_session_reports_timeout() {
        let mut inner = Stalled;
        let mut timed = Timed::new(&mut inner, Duration::from_millis(250));

        let err = timed
            .execute(&BoundStatement::raw("SELECT SLEEP(3600)"))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchSqlError::Timeout { elapsed_ms: 250 }));

        // Calls that finish in time pass through
        assert_eq!(timed.execute_raw("COMMIT").await.unwrap(), 0);
        timed.begin().await.unwrap();
    }
}
