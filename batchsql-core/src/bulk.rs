//! Transactional bulk loading in fixed-size commit windows.
//!
//! One positional INSERT is prepared from the parameter definitions and
//! executed once per source row. Rows are committed in windows of
//! `submission_count`: after row `k` (1-based) when `k` is a multiple of the
//! window size, and after the last row. A failure rolls back only the open
//! window; earlier windows stay committed.
//!
//! A bulk load is therefore a sequence of independently committed chunks.
//! Callers that need all-or-nothing semantics pass a `submission_count` of at
//! least the row count; callers that re-run failed loads need an idempotent
//! target (for example an upsert key).

use crate::Result;
use crate::error::BatchSqlError;
use crate::models::{DataTable, ParamDef};
use crate::query::PreparedInsert;
use crate::session::Session;
use tokio_util::sync::CancellationToken;

/// Parameters of one bulk load.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkLoadJob {
    /// Columns to bind, each naming a column of the source table
    pub params: Vec<ParamDef>,
    /// Rows per commit window
    pub submission_count: usize,
}

impl BulkLoadJob {
    /// Creates a job.
    pub fn new(params: Vec<ParamDef>, submission_count: usize) -> Self {
        Self {
            params,
            submission_count,
        }
    }

    /// Whether a commit follows row `k` (1-based) of `total`.
    pub fn commits_after(&self, k: usize, total: usize) -> bool {
        k > 0 && (k.checked_rem(self.submission_count) == Some(0) || k == total)
    }
}

/// Outcome of a finished bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkLoadSummary {
    /// Sum of the affected-row counts of every row statement
    pub affected_rows: u64,
    /// Number of windows committed
    pub commits: usize,
}

/// Rolls back the open window and wraps `cause`.
async fn abort(
    session: &mut dyn Session,
    committed_rows: u64,
    rolled_back_rows: u64,
    cause: BatchSqlError,
) -> BatchSqlError {
    tracing::warn!(
        "Bulk load failed, rolling back {} uncommitted row(s): {}",
        rolled_back_rows,
        cause
    );
    if let Err(e) = session.rollback().await {
        tracing::error!("Rollback after bulk load failure also failed: {}", e);
    }
    BatchSqlError::transaction_aborted(committed_rows, rolled_back_rows, cause)
}

/// Loads every row of `table` into `table.name()` through `session`.
///
/// The session must be open; sanitization is the caller's concern.
///
/// # Errors
/// - Input errors (empty parameters, zero window, empty table, unknown column)
///   before anything is sent
/// - [`BatchSqlError::Transaction`] when a statement, a commit, or a
///   cancellation aborts the load; the source error is carried unchanged
pub async fn run_bulk_load(
    session: &mut dyn Session,
    job: &BulkLoadJob,
    table: &DataTable,
    token: &CancellationToken,
) -> Result<BulkLoadSummary> {
    if job.submission_count == 0 {
        return Err(BatchSqlError::InvalidArgument {
            name: "submission count".to_string(),
        });
    }
    if table.is_empty() {
        return Err(BatchSqlError::empty_input(format!(
            "rows of table '{}'",
            table.name()
        )));
    }
    let prepared = PreparedInsert::new(&table.schema, &job.params)?;
    let total = table.len();
    tracing::debug!(
        "Bulk loading {} row(s) into '{}' in windows of {}: {}",
        total,
        table.name(),
        job.submission_count,
        prepared.sql()
    );

    session.begin().await?;

    let mut affected_rows = 0u64;
    let mut committed_rows = 0u64;
    let mut window_rows = 0u64;
    let mut commits = 0usize;

    for (index, row) in table.rows().iter().enumerate() {
        if token.is_cancelled() {
            return Err(abort(session, committed_rows, window_rows, BatchSqlError::Cancelled).await);
        }

        let result = match prepared.bind_row(row) {
            Ok(bound) => session.execute(&bound).await,
            Err(e) => Err(e),
        };
        window_rows = window_rows.saturating_add(1);
        match result {
            Ok(count) => affected_rows = affected_rows.saturating_add(count),
            Err(e) => return Err(abort(session, committed_rows, window_rows, e).await),
        }

        let k = index.saturating_add(1);
        if job.commits_after(k, total) {
            if token.is_cancelled() {
                return Err(
                    abort(session, committed_rows, window_rows, BatchSqlError::Cancelled).await,
                );
            }
            if let Err(e) = session.commit().await {
                return Err(abort(session, committed_rows, window_rows, e).await);
            }
            committed_rows = committed_rows.saturating_add(window_rows);
            window_rows = 0;
            commits = commits.saturating_add(1);
            tracing::info!(
                "Committed {} of {} row(s) into '{}'",
                committed_rows,
                total,
                table.name()
            );

            if k < total {
                session.begin().await.map_err(|e| {
                    BatchSqlError::transaction_aborted(committed_rows, 0, e)
                })?;
            }
        }
    }

    tracing::info!(
        "Bulk load into '{}' finished: {} row(s) affected in {} commit(s)",
        table.name(),
        affected_rows,
        commits
    );
    Ok(BulkLoadSummary {
        affected_rows,
        commits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDef, ColumnType, SqlValue, TableSchema};
    use crate::session::fake::{Event, FakeDb};

    fn people(rows: usize) -> DataTable {
        let schema = TableSchema::new(
            "people",
            vec![
                ColumnDef::new("id", ColumnType::Int),
                ColumnDef::new("name", ColumnType::VarChar),
            ],
        )
        .unwrap();
        let rows = (1..=rows)
            .map(|i| vec![SqlValue::from(i as i64), SqlValue::from(format!("p{}", i))])
            .collect();
        DataTable::with_rows(schema, rows).unwrap()
    }

    fn job(n: usize) -> BulkLoadJob {
        BulkLoadJob::new(
            vec![
                ParamDef::new("id", ColumnType::Int),
                ParamDef::new("name", ColumnType::VarChar).with_length(20),
            ],
            n,
        )
    }

    /// Compresses the event log into B/E/C/R letters.
    fn trace(db: &FakeDb) -> String {
        db.statements()
            .iter()
            .map(|e| match e {
                Event::Begin => 'B',
                Event::Execute { .. } => 'E',
                Event::Commit => 'C',
                Event::Rollback => 'R',
                _ => '?',
            })
            .collect()
    }

    #[test]
    fn test_commit_rule() {
        let window_of_three = job(3);
        let commits: Vec<usize> = (1..=7)
            .filter(|&k| window_of_three.commits_after(k, 7))
            .collect();
        assert_eq!(commits, vec![3, 6, 7]);

        let window_of_one = job(1);
        assert!(window_of_one.commits_after(1, 1));
        assert!(!window_of_one.commits_after(0, 1));
    }

    #[tokio::test]
    async fn test_seven_rows_window_three() {
        let db = FakeDb::new();
        let mut session = db.session();
        let summary = run_bulk_load(
            session.as_mut(),
            &job(3),
            &people(7),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.affected_rows, 7);
        assert_eq!(summary.commits, 3);
        assert_eq!(trace(&db), "BEEECBEEECBEC");
    }

    #[tokio::test]
    async fn test_single_row_commits_once() {
        let db = FakeDb::new();
        let mut session = db.session();
        let summary = run_bulk_load(
            session.as_mut(),
            &job(3),
            &people(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.commits, 1);
        assert_eq!(trace(&db), "BEC");
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_transaction() {
        let db = FakeDb::new();
        let mut session = db.session();
        run_bulk_load(
            session.as_mut(),
            &job(2),
            &people(4),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(trace(&db), "BEECBEEC");
    }

    #[tokio::test]
    async fn test_failure_on_row_five_rolls_back_open_window() {
        let db = FakeDb::new();
        db.fail_execute_at(5);
        let mut session = db.session();
        let err = run_bulk_load(
            session.as_mut(),
            &job(3),
            &people(7),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            BatchSqlError::Transaction {
                committed_rows,
                rolled_back_rows,
                source,
            } => {
                assert_eq!(committed_rows, 3);
                assert_eq!(rolled_back_rows, 2);
                assert!(matches!(*source, BatchSqlError::Execution { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(trace(&db), "BEEECBEER");
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back_window() {
        let db = FakeDb::new();
        db.fail_commit_at(2);
        let mut session = db.session();
        let err = run_bulk_load(
            session.as_mut(),
            &job(3),
            &people(7),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            BatchSqlError::Transaction {
                committed_rows: 3,
                rolled_back_rows: 3,
                ..
            }
        ));
        assert_eq!(trace(&db), "BEEECBEEECR");
    }

    #[tokio::test]
    async fn test_bind_failure_rolls_back() {
        let db = FakeDb::new();
        let mut table = people(2);
        table
            .push_row(vec![SqlValue::from(3), SqlValue::from("a name far too long for twenty")])
            .unwrap();
        let mut session = db.session();
        let err = run_bulk_load(session.as_mut(), &job(10), &table, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            BatchSqlError::Transaction {
                committed_rows,
                rolled_back_rows,
                source,
            } => {
                assert_eq!(committed_rows, 0);
                assert_eq!(rolled_back_rows, 3);
                assert!(matches!(*source, BatchSqlError::Input { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(trace(&db), "BEER");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_sends_nothing_but_rollback() {
        let db = FakeDb::new();
        let token = CancellationToken::new();
        token.cancel();
        let mut session = db.session();
        let err = run_bulk_load(session.as_mut(), &job(3), &people(4), &token)
            .await
            .unwrap_err();

        match err {
            BatchSqlError::Transaction { source, .. } => {
                assert!(matches!(*source, BatchSqlError::Cancelled));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(trace(&db), "BR");
    }

    #[tokio::test]
    async fn test_invalid_jobs_rejected_before_begin() {
        let db = FakeDb::new();
        let mut session = db.session();
        let token = CancellationToken::new();

        assert!(
            run_bulk_load(session.as_mut(), &job(0), &people(3), &token)
                .await
                .is_err()
        );
        assert!(
            run_bulk_load(session.as_mut(), &job(3), &people(0), &token)
                .await
                .is_err()
        );
        let unknown = BulkLoadJob::new(vec![ParamDef::new("email", ColumnType::VarChar)], 3);
        assert!(
            run_bulk_load(session.as_mut(), &unknown, &people(3), &token)
                .await
                .is_err()
        );
        assert!(db.statements().is_empty());
    }
}
