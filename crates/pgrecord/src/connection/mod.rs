//! Physical connections behind the executor.
//!
//! The executor never talks to `tokio-postgres` directly. It drives a boxed
//! [`Connection`], which runs one positional-parameter statement at a time and
//! reports failures as either transient (connection-level, worth a reconnect)
//! or statement-level (the server rejected the SQL).

mod postgres;
mod scripted;

pub use postgres::PgConnection;
pub use scripted::{Script, ScriptedConnection};

use crate::value::Value;
use async_trait::async_trait;
use thiserror::Error;

/// One result row, columns in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataRow {
    columns: Vec<(String, Value)>,
}

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push((name.into(), value.into()));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for DataRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DataRow {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// What the backend answered to one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The statement produced a result set (possibly empty).
    Rows(Vec<DataRow>),
    /// The statement produced no result set.
    Command { affected: u64, insert_id: Option<i64> },
}

impl Reply {
    pub fn command(affected: u64) -> Self {
        Reply::Command {
            affected,
            insert_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection lost, unreachable or reset by the server.
    Transient,
    /// The server rejected the statement; the connection is still usable.
    Statement,
    /// A returned column could not be converted to a [`Value`].
    Decode,
}

/// A failed round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
    /// Offending column of a [`FailureKind::Decode`] failure.
    pub column: Option<String>,
}

impl BackendError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
            column: None,
        }
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Statement,
            message: message.into(),
            column: None,
        }
    }

    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Decode,
            message: message.into(),
            column: Some(column.into()),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// A single database session.
///
/// Implementations only move bytes; retry, error bookkeeping and transaction
/// state all live in [`Executor`](crate::Executor).
#[async_trait]
pub trait Connection: Send {
    /// Whether a session is currently open.
    fn is_connected(&self) -> bool;

    /// Open a new session, replacing any existing one.
    async fn connect(&mut self) -> Result<(), BackendError>;

    /// Drop the current session, if any.
    fn disconnect(&mut self);

    /// Cheap round trip proving the session is alive.
    async fn ping(&mut self) -> Result<(), BackendError>;

    /// Run one statement with `$n` positional parameters.
    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<Reply, BackendError>;
}
