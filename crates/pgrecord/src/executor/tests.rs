//! Tests for the executor module.

use super::*;
use crate::connection::{BackendError, Connection, DataRow, Reply, Script, ScriptedConnection};
use crate::value::Value;
use async_trait::async_trait;

/// Scripted session that yields to the scheduler on every round trip, so
/// concurrent callers interleave at each await point.
struct YieldingConnection(ScriptedConnection);

#[async_trait]
impl Connection for YieldingConnection {
    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }

    async fn connect(&mut self) -> Result<(), BackendError> {
        tokio::task::yield_now().await;
        self.0.connect().await
    }

    fn disconnect(&mut self) {
        self.0.disconnect();
    }

    async fn ping(&mut self) -> Result<(), BackendError> {
        tokio::task::yield_now().await;
        self.0.ping().await
    }

    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<Reply, BackendError> {
        tokio::task::yield_now().await;
        self.0.run(sql, params).await
    }
}

fn yielding_executor(script: &Script) -> Executor {
    Executor::new(
        ConnectParams::new("postgres://localhost/test"),
        Box::new(YieldingConnection(script.connection())),
        ExecutorConfig::new().developer_context(DeveloperContext::Off),
        PlaceholderSeq::shared(),
    )
}

fn executor(script: &Script, config: ExecutorConfig) -> Executor {
    Executor::new(
        ConnectParams::new("postgres://localhost/test"),
        Box::new(script.connection()),
        config.developer_context(DeveloperContext::Off),
        PlaceholderSeq::shared(),
    )
}

#[tokio::test]
async fn test_connects_lazily_and_classifies_rows() {
    let script = Script::new();
    script.rows(vec![DataRow::new().with("id", 1)]);
    let exec = executor(&script, ExecutorConfig::default());
    assert_eq!(script.connects(), 0);

    let out = exec.execute_sql("SELECT 1 AS id").await.unwrap();
    assert_eq!(out.rows().len(), 1);
    assert_eq!(script.connects(), 1);
}

#[tokio::test]
async fn test_classification() {
    let script = Script::new();
    script.inserted(42).command(3).command(0).inserted(0);
    let exec = executor(&script, ExecutorConfig::default());

    assert_eq!(
        exec.execute_sql("INSERT INTO t (a) VALUES (1)").await.unwrap(),
        Outcome::InsertId(42)
    );
    assert_eq!(
        exec.execute_sql("UPDATE t SET a = 2").await.unwrap(),
        Outcome::AffectedRows(3)
    );
    assert_eq!(exec.execute_sql("UPDATE t SET a = 2").await.unwrap(), Outcome::Success);
    // Nothing generated: the affected count decides.
    assert_eq!(
        exec.execute_sql("INSERT INTO t (a) VALUES (1)").await.unwrap(),
        Outcome::AffectedRows(1)
    );
}

#[tokio::test]
async fn test_named_params_sent_positionally() {
    let script = Script::new();
    let exec = executor(&script, ExecutorConfig::default());
    let mut qb = exec.builder("users");
    qb.eq("name", "ann").gt("age", 30);
    let (sql, params) = qb.take_statement(&crate::qb::Clause::SELECT_ORDER).unwrap();

    exec.execute(&sql, &params).await.unwrap();
    let executed = script.executed();
    assert_eq!(
        executed[0].0,
        "SELECT users.* FROM users WHERE users.name = $1 AND users.age > $2"
    );
    assert_eq!(executed[0].1, vec![Value::from("ann"), Value::Int(30)]);
}

#[tokio::test]
async fn test_statement_error_recorded_once_without_retry() {
    let script = Script::new();
    script.fail(BackendError::statement("42601: syntax error"));
    let exec = executor(&script, ExecutorConfig::default());

    let out = exec.execute_sql("SELEC 1").await.unwrap();
    assert!(out.is_failure());
    assert_eq!(script.statements().len(), 1);
    assert_eq!(script.connects(), 1);
    assert_eq!(exec.last_errors(), vec!["42601: syntax error".to_string()]);
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let script = Script::new();
    script
        .fail(BackendError::transient("connection reset"))
        .rows(vec![DataRow::new().with("n", 1)]);
    let exec = executor(&script, ExecutorConfig::default());

    let out = exec.execute_sql("SELECT 1 AS n").await.unwrap();
    assert_eq!(out.rows().len(), 1);
    assert_eq!(script.statements().len(), 2);
    assert_eq!(script.connects(), 2);
    assert!(exec.last_errors().is_empty());
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let script = Script::new();
    for _ in 0..5 {
        script.fail(BackendError::transient("connection reset"));
    }
    let exec = executor(&script, ExecutorConfig::default());

    let err = exec.execute_sql("SELECT 1").await.unwrap_err();
    match err {
        OrmError::FatalConnection { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("unexpected error: {other:?}"),
    }
    // One initial run plus three reconnects.
    assert_eq!(script.statements().len(), 4);
    assert_eq!(script.connects(), 4);
    assert_eq!(script.pending(), 1);
}

#[tokio::test]
async fn test_zero_reconnects() {
    let script = Script::new();
    script.fail(BackendError::transient("connection reset"));
    let exec = executor(&script, ExecutorConfig::new().max_reconnects(0));

    let err = exec.execute_sql("SELECT 1").await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(script.statements().len(), 1);
}

#[tokio::test]
async fn test_unreachable_server_is_fatal() {
    let script = Script::new();
    script.set_reachable(false);
    let exec = executor(&script, ExecutorConfig::new().max_reconnects(2));

    assert!(exec.execute_sql("SELECT 1").await.unwrap_err().is_fatal());
    assert_eq!(script.connects(), 3);
    assert!(script.statements().is_empty());
}

#[tokio::test]
async fn test_commit_when_clean() {
    let script = Script::new();
    script.command(1);
    let exec = executor(&script, ExecutorConfig::default());

    assert!(exec.begin_transaction().await);
    assert!(exec.in_transaction());
    assert!(!exec.autocommit());
    exec.execute_sql("UPDATE t SET a = 1").await.unwrap();
    assert!(exec.end_transaction().await);

    assert!(!exec.in_transaction());
    assert!(exec.autocommit());
    assert_eq!(script.statements(), ["BEGIN", "UPDATE t SET a = 1", "COMMIT"]);
}

#[tokio::test]
async fn test_rollback_after_statement_error() {
    let script = Script::new();
    script
        .command(1)
        .fail(BackendError::statement("23505: duplicate key"));
    let exec = executor(&script, ExecutorConfig::default());

    assert!(exec.begin_transaction().await);
    exec.execute_sql("UPDATE t SET a = 1").await.unwrap();
    assert!(exec.execute_sql("INSERT INTO t VALUES (1)").await.unwrap().is_failure());
    assert!(!exec.end_transaction().await);

    assert!(exec.autocommit());
    assert_eq!(script.statements().last().map(String::as_str), Some("ROLLBACK"));
}

#[tokio::test]
async fn test_errors_before_transaction_do_not_force_rollback() {
    let script = Script::new();
    script.fail(BackendError::statement("boom"));
    let exec = executor(&script, ExecutorConfig::default());

    exec.execute_sql("SELECT boom").await.unwrap();
    assert!(exec.begin_transaction().await);
    assert!(exec.end_transaction().await);
    assert_eq!(script.statements().last().map(String::as_str), Some("COMMIT"));
}

#[tokio::test]
async fn test_no_retry_inside_transaction() {
    let script = Script::new();
    script.fail(BackendError::transient("connection reset"));
    let exec = executor(&script, ExecutorConfig::default());

    assert!(exec.begin_transaction().await);
    let out = exec.execute_sql("UPDATE t SET a = 1").await.unwrap();
    assert!(out.is_failure());
    assert_eq!(script.statements(), ["BEGIN", "UPDATE t SET a = 1"]);

    // The session is gone, so ROLLBACK cannot be sent either.
    assert!(!exec.end_transaction().await);
    assert!(exec.autocommit());
    assert!(!exec.in_transaction());
}

#[tokio::test]
async fn test_begin_twice_fails() {
    let script = Script::new();
    let exec = executor(&script, ExecutorConfig::default());

    assert!(exec.begin_transaction().await);
    assert!(!exec.begin_transaction().await);
    assert!(exec.in_transaction());
    assert_eq!(script.statements(), ["BEGIN"]);
    assert!(exec.last_error().unwrap().contains("already in progress"));
}

#[tokio::test]
async fn test_concurrent_begins_open_one_transaction() {
    let script = Script::new();
    let exec = yielding_executor(&script);

    let (first, second) = tokio::join!(exec.begin_transaction(), exec.begin_transaction());
    assert!(first ^ second, "exactly one begin wins: {first} {second}");
    assert_eq!(script.statements(), ["BEGIN"]);
    assert!(exec.in_transaction());
    assert!(exec.last_error().unwrap().contains("already in progress"));
}

#[tokio::test]
async fn test_concurrent_ends_close_once() {
    let script = Script::new();
    let exec = yielding_executor(&script);
    assert!(exec.begin_transaction().await);

    let (first, second) = tokio::join!(exec.end_transaction(), exec.end_transaction());
    assert!(first ^ second);
    assert_eq!(script.statements(), ["BEGIN", "COMMIT"]);
    assert!(!exec.in_transaction());
}

#[tokio::test]
async fn test_statement_waits_for_begin_to_finish() {
    let script = Script::new();
    script.fail(BackendError::transient("connection reset"));
    let exec = yielding_executor(&script);

    let (began, out) = tokio::join!(exec.begin_transaction(), exec.execute_sql("UPDATE t SET a = 1"));
    assert!(began);
    // Queued behind BEGIN, so the lost session is not retried.
    assert!(out.unwrap().is_failure());
    assert_eq!(script.connects(), 1);
    assert!(!exec.end_transaction().await);
}

#[tokio::test]
async fn test_begin_on_unreachable_server() {
    let script = Script::new();
    script.set_reachable(false);
    let exec = executor(&script, ExecutorConfig::default());

    assert!(!exec.begin_transaction().await);
    assert!(!exec.in_transaction());
    assert!(exec.autocommit());
    assert_eq!(exec.last_errors().len(), 1);
}

#[tokio::test]
async fn test_undecodable_column_is_a_decode_error() {
    let script = Script::new();
    script
        .fail(BackendError::decode("born_on", "cannot convert between types"))
        .rows(vec![DataRow::new().with("id", 1)]);
    let exec = executor(&script, ExecutorConfig::default());

    let err = exec.execute_sql("SELECT born_on FROM people").await.unwrap_err();
    assert!(err.is_decode());
    assert!(matches!(&err, OrmError::Decode { column, .. } if column == "born_on"));
    assert_eq!(exec.last_errors(), ["cannot convert between types"]);

    // Not a connection problem: the session is kept and nothing is retried.
    assert_eq!(exec.execute_sql("SELECT 1 AS id").await.unwrap().rows().len(), 1);
    assert_eq!(script.connects(), 1);
}

#[tokio::test]
async fn test_end_without_begin() {
    let script = Script::new();
    let exec = executor(&script, ExecutorConfig::default());
    assert!(!exec.end_transaction().await);
    assert!(script.statements().is_empty());
}

#[tokio::test]
async fn test_reconnect_probe_keeps_live_session() {
    let script = Script::new();
    let exec = executor(&script, ExecutorConfig::default());

    assert!(exec.reconnect(true).await);
    assert!(exec.reconnect(true).await);
    assert_eq!(script.connects(), 1);
    assert!(exec.reconnect(false).await);
    assert_eq!(script.connects(), 2);
}

// ==================== Developer context ====================

#[test]
fn test_developer_context_modes() {
    assert!(DeveloperContext::On.enabled());
    assert!(!DeveloperContext::Off.enabled());
}

#[test]
fn test_failure_context_names_sql_and_params() {
    let stmt = WireStatement {
        sql: "UPDATE users SET name = $1 WHERE users.id = $2".to_string(),
        params: vec![Value::from("ann"), Value::Int(3)],
    };
    let text = failure_context(&stmt, &BackendError::statement("23505: duplicate key"));
    assert!(text.starts_with("[pgrecord] statement failed: 23505: duplicate key"));
    assert!(text.contains("sql:    UPDATE users SET name = $1 WHERE users.id = $2"));
    assert!(text.contains(r#"params: [Text("ann"), Int(3)]"#));
}

#[tokio::test]
async fn test_echo_on_still_records_the_failure() {
    let script = Script::new();
    script.fail(BackendError::statement("42601: syntax error"));
    let exec = Executor::new(
        ConnectParams::new("postgres://localhost/test"),
        Box::new(script.connection()),
        ExecutorConfig::new().developer_context(DeveloperContext::On),
        PlaceholderSeq::shared(),
    );

    assert!(exec.execute_sql("SELEC 1").await.unwrap().is_failure());
    assert_eq!(exec.last_errors(), ["42601: syntax error"]);
}

// ==================== Registry ====================

fn scripted_registry(script: &Script) -> Registry {
    let script = script.clone();
    Registry::with_connector(
        move |_: &ConnectParams| -> OrmResult<Box<dyn Connection>> {
            Ok(Box::new(script.connection()))
        },
        ExecutorConfig::default(),
    )
}

#[test]
fn test_registry_identity() {
    let registry = scripted_registry(&Script::new());
    let a = ConnectParams::new("postgres://db-a/app");
    let b = ConnectParams::new("postgres://db-b/app");

    let first = registry.get(Some(&a)).unwrap();
    let again = registry.get(Some(&a.clone())).unwrap();
    let other = registry.get(Some(&b)).unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    assert!(Arc::ptr_eq(first.placeholder_seq(), other.placeholder_seq()));
    assert_eq!(registry.len(), 2);

    let default = registry.get(None).unwrap();
    assert!(Arc::ptr_eq(&default, &first));
}

#[test]
fn test_registry_get_none_when_empty() {
    let registry = scripted_registry(&Script::new());
    assert!(matches!(registry.get(None), Err(OrmError::Config(_))));
}

#[test]
fn test_application_name_distinguishes_params() {
    let registry = scripted_registry(&Script::new());
    let plain = ConnectParams::new("postgres://db/app");
    let named = ConnectParams::new("postgres://db/app").application_name("worker");
    let a = registry.get(Some(&plain)).unwrap();
    let b = registry.get(Some(&named)).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

// ==================== Config ====================

#[test]
fn test_config_from_toml() {
    let config: ExecutorConfig = toml::from_str(
        r#"
        max_reconnects = 5
        developer_context = "off"
        "#,
    )
    .unwrap();
    assert_eq!(config.max_reconnects, 5);
    assert_eq!(config.reconnect_delay_ms, 0);
    assert_eq!(config.developer_context, DeveloperContext::Off);

    let empty: ExecutorConfig = toml::from_str("").unwrap();
    assert_eq!(empty, ExecutorConfig::default());
}

#[test]
fn test_connect_params_from_toml() {
    let params: ConnectParams = toml::from_str(r#"url = "postgres://u@h/db""#).unwrap();
    assert_eq!(params, ConnectParams::new("postgres://u@h/db"));
    assert!(params.pg_config().is_ok());
    assert!(ConnectParams::new("postgres://host:notaport/db").pg_config().is_err());
}
