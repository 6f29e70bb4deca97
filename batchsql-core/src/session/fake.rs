//! Recording in-process session for unit tests.

use super::{Connector, Session};
use crate::Result;
use crate::error::BatchSqlError;
use crate::models::{ResultTable, SqlValue};
use crate::query::BoundStatement;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Connect,
    Ping,
    Execute { sql: String, values: Vec<SqlValue> },
    Fetch { sql: String, values: Vec<SqlValue> },
    Raw(String),
    Begin,
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    executes: usize,
    commits: usize,
    fail_execute_at: Option<usize>,
    fail_commit_at: Option<usize>,
    fail_ping: bool,
    fail_connect: bool,
    fetch_result: ResultTable,
}

/// Shared handle to the event log and failure switches.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeDb {
    state: Arc<Mutex<State>>,
}

fn injected(what: &str) -> BatchSqlError {
    BatchSqlError::execution_failed(
        format!("injected {} failure", what),
        std::io::Error::other("fake server error"),
    )
}

impl FakeDb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn session(&self) -> Box<dyn Session> {
        Box::new(FakeSession {
            db: self.clone(),
            open: true,
        })
    }

    pub(crate) fn connector(&self) -> Box<dyn Connector> {
        Box::new(FakeConnector { db: self.clone() })
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.with_state(|s| s.events.clone())
    }

    /// Events with connection bookkeeping filtered out.
    pub(crate) fn statements(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, Event::Connect | Event::Ping))
            .collect()
    }

    /// Fails the `n`th execute call (1-based).
    pub(crate) fn fail_execute_at(&self, n: usize) {
        self.with_state(|s| s.fail_execute_at = Some(n));
    }

    /// Fails the `n`th commit call (1-based).
    pub(crate) fn fail_commit_at(&self, n: usize) {
        self.with_state(|s| s.fail_commit_at = Some(n));
    }

    pub(crate) fn set_ping_fails(&self, fails: bool) {
        self.with_state(|s| s.fail_ping = fails);
    }

    pub(crate) fn set_connect_fails(&self, fails: bool) {
        self.with_state(|s| s.fail_connect = fails);
    }

    pub(crate) fn set_fetch_result(&self, table: ResultTable) {
        self.with_state(|s| s.fetch_result = table);
    }
}

struct FakeSession {
    db: FakeDb,
    open: bool,
}

impl FakeSession {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(BatchSqlError::NotConnected)
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn ping(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.db.with_state(|s| {
            s.events.push(Event::Ping);
            if s.fail_ping {
                Err(BatchSqlError::connection_failed(
                    "Ping failed",
                    std::io::Error::other("connection reset"),
                ))
            } else {
                Ok(())
            }
        })
    }

    async fn execute(&mut self, statement: &BoundStatement) -> Result<u64> {
        self.ensure_open()?;
        self.db.with_state(|s| {
            s.executes = s.executes.saturating_add(1);
            s.events.push(Event::Execute {
                sql: statement.sql.clone(),
                values: statement.values.clone(),
            });
            if s.fail_execute_at == Some(s.executes) {
                return Err(injected("execute"));
            }
            // One affected row per value tuple
            Ok(statement.sql.matches('(').count().saturating_sub(1).max(1) as u64)
        })
    }

    async fn fetch(&mut self, statement: &BoundStatement) -> Result<ResultTable> {
        self.ensure_open()?;
        self.db.with_state(|s| {
            s.events.push(Event::Fetch {
                sql: statement.sql.clone(),
                values: statement.values.clone(),
            });
            Ok(s.fetch_result.clone())
        })
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<u64> {
        self.ensure_open()?;
        self.db.with_state(|s| s.events.push(Event::Raw(sql.to_string())));
        Ok(0)
    }

    async fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.db.with_state(|s| s.events.push(Event::Begin));
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.db.with_state(|s| {
            s.commits = s.commits.saturating_add(1);
            s.events.push(Event::Commit);
            if s.fail_commit_at == Some(s.commits) {
                Err(injected("commit"))
            } else {
                Ok(())
            }
        })
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.db.with_state(|s| s.events.push(Event::Rollback));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.db.with_state(|s| s.events.push(Event::Close));
        Ok(())
    }
}

struct FakeConnector {
    db: FakeDb,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        let fails = self.db.with_state(|s| {
            s.events.push(Event::Connect);
            s.fail_connect
        });
        if fails {
            return Err(BatchSqlError::connection_failed(
                "Failed to connect to fake",
                std::io::Error::other("connection refused"),
            ));
        }
        Ok(self.db.session())
    }
}
