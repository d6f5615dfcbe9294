use super::{BackendError, Connection, DataRow, Reply};
use crate::error::{OrmError, OrmResult};
use crate::executor::wire;
use crate::value::Value;
use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config, NoTls, Row};

/// A `tokio-postgres` session.
///
/// The driver's connection future is spawned onto the current tokio runtime
/// on every [`Connection::connect`].
pub struct PgConnection {
    config: Config,
    client: Option<Client>,
}

impl PgConnection {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Parse a `postgres://` URL or a key/value connection string.
    pub fn from_url(url: &str) -> OrmResult<Self> {
        let config = url
            .parse::<Config>()
            .map_err(|e| OrmError::Config(format!("invalid connection string: {e}")))?;
        Ok(Self::new(config))
    }

    fn client(&self) -> Result<&Client, BackendError> {
        self.client
            .as_ref()
            .filter(|c| !c.is_closed())
            .ok_or_else(|| BackendError::transient("not connected"))
    }
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("hosts", &self.config.get_hosts())
            .field("dbname", &self.config.get_dbname())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Connection for PgConnection {
    fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    async fn connect(&mut self) -> Result<(), BackendError> {
        self.client = None;
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| BackendError::transient(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(target: "pgrecord.sql", error = %e, "connection task ended");
            }
        });
        self.client = Some(client);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
    }

    async fn ping(&mut self) -> Result<(), BackendError> {
        self.client()?
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<Reply, BackendError> {
        let client = self.client()?;
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        if wire::is_insert(sql) && !wire::has_returning(sql) {
            // PostgreSQL has no last-insert-id; read the new row back instead.
            let sql = format!("{sql} RETURNING *");
            let rows = client.query(&sql, &refs).await.map_err(classify)?;
            let rows = decode_rows(&rows)?;
            return Ok(Reply::Command {
                affected: rows.len() as u64,
                insert_id: returned_id(&rows),
            });
        }

        if wire::returns_rows(sql) {
            let rows = client.query(sql, &refs).await.map_err(classify)?;
            return decode_rows(&rows).map(Reply::Rows);
        }

        let affected = client.execute(sql, &refs).await.map_err(classify)?;
        Ok(Reply::command(affected))
    }
}

fn decode_rows(rows: &[Row]) -> Result<Vec<DataRow>, BackendError> {
    rows.iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    row.try_get::<_, Value>(idx)
                        .map(|v| (col.name().to_string(), v))
                        .map_err(|e| BackendError::decode(col.name(), e.to_string()))
                })
                .collect::<Result<DataRow, _>>()
        })
        .collect()
}

/// Generated id of a raw INSERT: the returned `id` column, when integral.
fn returned_id(rows: &[DataRow]) -> Option<i64> {
    rows.first()
        .and_then(|row| row.get("id"))
        .and_then(Value::as_i64)
}

/// Connection-class SQLSTATEs (08xxx) and server shutdown (57P01..57P03)
/// are transient; so is any failure that never reached the server.
fn classify(err: tokio_postgres::Error) -> BackendError {
    if err.is_closed() {
        return BackendError::transient(err.to_string());
    }
    if let Some(db) = err.as_db_error() {
        let code = db.code().code();
        let message = format!("{}: {}", code, db.message());
        return if code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03") {
            BackendError::transient(message)
        } else {
            BackendError::statement(message)
        };
    }
    let io = std::error::Error::source(&err).is_some_and(|s| s.is::<std::io::Error>());
    if io {
        BackendError::transient(err.to_string())
    } else {
        BackendError::statement(err.to_string())
    }
}
