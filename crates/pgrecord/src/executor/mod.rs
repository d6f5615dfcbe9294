//! Statement execution with reconnect and transaction bookkeeping.
//!
//! An [`Executor`] owns one physical [`Connection`] and runs a single statement
//! at a time on it. Failures are split in two:
//!
//! - **statement errors** (the server rejected the SQL) are recorded in the
//!   error list and reported as [`Outcome::Failure`]; they are never retried.
//! - **transient errors** (lost or unreachable session) trigger a reconnect
//!   and a retry, up to [`ExecutorConfig::max_reconnects`] times. When the
//!   budget is spent the call fails with [`OrmError::FatalConnection`].
//!
//! Inside a transaction nothing is retried: a transient error is recorded like
//! a statement error, so [`Executor::end_transaction`] rolls back.

mod config;
mod registry;
pub mod wire;

pub use config::{ConnectParams, DeveloperContext, ExecutorConfig};
pub use registry::{Connector, PgConnector, Registry};

use crate::connection::{BackendError, Connection, DataRow, FailureKind, Reply};
use crate::error::{OrmError, OrmResult};
use crate::qb::{ParamTable, PlaceholderSeq, QueryBuilder};
use std::sync::{Arc, Mutex};
use wire::WireStatement;

/// Classified result of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The statement returned a result set (possibly empty).
    RowSet(Vec<DataRow>),
    /// An INSERT produced a positive generated id.
    InsertId(i64),
    /// Rows were changed.
    AffectedRows(u64),
    /// The statement ran but produced nothing of the above.
    Success,
    /// The statement failed; see [`Executor::last_errors`].
    Failure,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure)
    }

    pub fn rows(&self) -> &[DataRow] {
        match self {
            Outcome::RowSet(rows) => rows,
            _ => &[],
        }
    }

    pub fn into_rows(self) -> Vec<DataRow> {
        match self {
            Outcome::RowSet(rows) => rows,
            _ => Vec::new(),
        }
    }

    pub fn insert_id(&self) -> Option<i64> {
        match self {
            Outcome::InsertId(id) => Some(*id),
            _ => None,
        }
    }

    pub fn affected(&self) -> u64 {
        match self {
            Outcome::AffectedRows(n) => *n,
            Outcome::InsertId(_) => 1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TxState {
    active: bool,
    autocommit: bool,
    /// Length of the error list when the transaction began.
    error_mark: usize,
}

impl Default for TxState {
    fn default() -> Self {
        Self {
            active: false,
            autocommit: true,
            error_mark: 0,
        }
    }
}

/// Runs statements on one connection.
///
/// Share it as `Arc<Executor>`; every method takes `&self`. Statements are
/// serialized on the connection, so concurrent callers simply queue.
pub struct Executor {
    params: ConnectParams,
    config: ExecutorConfig,
    conn: tokio::sync::Mutex<Box<dyn Connection>>,
    errors: Mutex<Vec<String>>,
    tx: Mutex<TxState>,
    seq: Arc<PlaceholderSeq>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("params", &self.params)
            .field("config", &self.config)
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Wrap an unopened connection. The session is opened on first use.
    pub fn new(
        params: ConnectParams,
        conn: Box<dyn Connection>,
        config: ExecutorConfig,
        seq: Arc<PlaceholderSeq>,
    ) -> Self {
        Self {
            params,
            config,
            conn: tokio::sync::Mutex::new(conn),
            errors: Mutex::new(Vec::new()),
            tx: Mutex::new(TxState::default()),
            seq,
        }
    }

    pub fn connect_params(&self) -> &ConnectParams {
        &self.params
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn placeholder_seq(&self) -> &Arc<PlaceholderSeq> {
        &self.seq
    }

    /// A fresh builder for `table` drawing placeholder names from this
    /// executor's sequence.
    pub fn builder(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(table, Arc::clone(&self.seq))
    }

    /// Every error recorded so far, oldest first.
    pub fn last_errors(&self) -> Vec<String> {
        self.errors.lock().expect("error list mutex poisoned").clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors
            .lock()
            .expect("error list mutex poisoned")
            .last()
            .cloned()
    }

    pub fn clear_errors(&self) {
        let mut tx = self.tx.lock().expect("transaction mutex poisoned");
        self.errors.lock().expect("error list mutex poisoned").clear();
        tx.error_mark = 0;
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.lock().expect("transaction mutex poisoned").active
    }

    pub fn autocommit(&self) -> bool {
        self.tx.lock().expect("transaction mutex poisoned").autocommit
    }

    /// Append to the error list. Inside a transaction this makes
    /// [`Executor::end_transaction`] roll back.
    pub fn record_error(&self, message: impl Into<String>) {
        self.errors
            .lock()
            .expect("error list mutex poisoned")
            .push(message.into());
    }

    fn error_count(&self) -> usize {
        self.errors.lock().expect("error list mutex poisoned").len()
    }

    // ==================== Statements ====================

    /// Run `sql` with the named parameters in `params`.
    ///
    /// Returns `Err` for a fatal connection failure or a result column that
    /// cannot be decoded. A statement the server rejects yields
    /// `Ok(Outcome::Failure)` with the message recorded.
    pub async fn execute(&self, sql: &str, params: &ParamTable) -> OrmResult<Outcome> {
        let stmt = wire::to_wire(sql, params);
        let mut conn = self.conn.lock().await;
        // Transaction state only changes under the connection lock.
        let in_tx = self.in_transaction();

        let mut reconnects = 0u32;
        loop {
            let err = match run_once(conn.as_mut(), &stmt).await {
                Ok(reply) => {
                    tracing::debug!(
                        target: "pgrecord.sql",
                        sql = %stmt.sql,
                        param_count = stmt.params.len(),
                        reconnects,
                        "statement ok"
                    );
                    return Ok(classify(sql, reply));
                }
                Err(err) => err,
            };

            if err.kind == FailureKind::Decode {
                self.statement_failed(&stmt, &err);
                return Err(OrmError::decode(
                    err.column.unwrap_or_default(),
                    err.message,
                ));
            }

            if !err.is_transient() {
                self.statement_failed(&stmt, &err);
                return Ok(Outcome::Failure);
            }

            if in_tx {
                tracing::warn!(
                    target: "pgrecord.sql",
                    sql = %stmt.sql,
                    error = %err,
                    "connection lost inside a transaction; not retrying"
                );
                self.statement_failed(&stmt, &err);
                return Ok(Outcome::Failure);
            }

            if reconnects >= self.config.max_reconnects {
                let attempts = reconnects + 1;
                tracing::error!(
                    target: "pgrecord.sql",
                    sql = %stmt.sql,
                    attempts,
                    error = %err,
                    "giving up after repeated connection failures"
                );
                self.record_error(err.message.clone());
                return Err(OrmError::FatalConnection {
                    attempts,
                    message: err.message,
                });
            }

            reconnects += 1;
            tracing::warn!(
                target: "pgrecord.sql",
                attempt = reconnects,
                max = self.config.max_reconnects,
                error = %err,
                "connection lost; reconnecting"
            );
            conn.disconnect();
            let delay = self.config.reconnect_delay_duration();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Run raw SQL with no parameters.
    pub async fn execute_sql(&self, sql: &str) -> OrmResult<Outcome> {
        self.execute(sql, &ParamTable::new()).await
    }

    fn statement_failed(&self, stmt: &WireStatement, err: &BackendError) {
        tracing::warn!(
            target: "pgrecord.sql",
            sql = %stmt.sql,
            error = %err,
            "statement failed"
        );
        if self.config.developer_context.enabled() {
            eprintln!("{}", failure_context(stmt, err));
        }
        self.record_error(err.message.clone());
    }

    // ==================== Session ====================

    /// Make sure a live session exists.
    ///
    /// With `probe_first`, an open session is pinged and kept when it answers.
    /// Otherwise (or when the ping fails) the session is replaced. Returns
    /// `false` and records the error when no session can be opened.
    pub async fn reconnect(&self, probe_first: bool) -> bool {
        let mut conn = self.conn.lock().await;
        self.reconnect_locked(conn.as_mut(), probe_first).await
    }

    async fn reconnect_locked(&self, conn: &mut dyn Connection, probe_first: bool) -> bool {
        if probe_first && conn.is_connected() && conn.ping().await.is_ok() {
            return true;
        }
        conn.disconnect();
        match conn.connect().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(target: "pgrecord.sql", error = %err, "reconnect failed");
                self.record_error(err.message);
                false
            }
        }
    }

    // ==================== Transactions ====================

    /// Open a transaction on a verified session.
    ///
    /// Returns `false` (and records why) when a transaction is already open,
    /// when no session can be established, or when `BEGIN` fails.
    pub async fn begin_transaction(&self) -> bool {
        let mut conn = self.conn.lock().await;
        if self.in_transaction() {
            self.record_error(
                OrmError::TransactionMisuse("a transaction is already in progress".to_string())
                    .to_string(),
            );
            return false;
        }

        if !self.reconnect_locked(conn.as_mut(), true).await {
            return false;
        }
        if let Err(err) = conn.run("BEGIN", &[]).await {
            tracing::warn!(target: "pgrecord.sql", error = %err, "BEGIN failed");
            self.record_error(err.message);
            return false;
        }

        let mark = self.error_count();
        *self.tx.lock().expect("transaction mutex poisoned") = TxState {
            active: true,
            autocommit: false,
            error_mark: mark,
        };
        drop(conn);
        tracing::debug!(target: "pgrecord.sql", "transaction started");
        true
    }

    /// Close the open transaction: `COMMIT` when no error was recorded since
    /// it began, `ROLLBACK` otherwise.
    ///
    /// Returns `true` only for a successful commit. Autocommit is restored in
    /// every case.
    pub async fn end_transaction(&self) -> bool {
        let mut conn = self.conn.lock().await;
        let state = *self.tx.lock().expect("transaction mutex poisoned");
        if !state.active {
            self.record_error(
                OrmError::TransactionMisuse("no transaction in progress".to_string()).to_string(),
            );
            return false;
        }

        let clean = self.error_count() == state.error_mark;
        let sql = if clean { "COMMIT" } else { "ROLLBACK" };

        let ok = match conn.run(sql, &[]).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(target: "pgrecord.sql", error = %err, "{sql} failed");
                self.record_error(err.message);
                false
            }
        };

        *self.tx.lock().expect("transaction mutex poisoned") = TxState::default();
        drop(conn);
        tracing::debug!(target: "pgrecord.sql", committed = clean && ok, "transaction finished");
        clean && ok
    }
}

/// Developer-facing echo of a failed statement.
fn failure_context(stmt: &WireStatement, err: &BackendError) -> String {
    format!(
        "[pgrecord] statement failed: {err}\n  sql:    {}\n  params: {:?}",
        stmt.sql, stmt.params
    )
}

async fn run_once(conn: &mut dyn Connection, stmt: &WireStatement) -> Result<Reply, BackendError> {
    if !conn.is_connected() {
        conn.connect().await?;
    }
    conn.run(&stmt.sql, &stmt.params).await
}

fn classify(sql: &str, reply: Reply) -> Outcome {
    match reply {
        Reply::Rows(rows) => Outcome::RowSet(rows),
        Reply::Command {
            insert_id: Some(id),
            ..
        } if id > 0 && wire::is_insert(sql) => Outcome::InsertId(id),
        Reply::Command { affected, .. } if affected > 0 => Outcome::AffectedRows(affected),
        Reply::Command { .. } => Outcome::Success,
    }
}

#[cfg(test)]
mod tests;
