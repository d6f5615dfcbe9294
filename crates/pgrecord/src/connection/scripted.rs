use super::{BackendError, Connection, DataRow, Reply};
use crate::executor::wire;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct ScriptState {
    replies: VecDeque<Result<Reply, BackendError>>,
    executed: Vec<(String, Vec<Value>)>,
    connects: u32,
    reachable: bool,
}

/// Canned replies and a statement log, shared between a test and the
/// [`ScriptedConnection`]s it hands out.
///
/// Replies are consumed in order by every statement except transaction
/// control (`BEGIN`, `COMMIT`, `ROLLBACK`), which always succeeds while the
/// session is up. An exhausted script answers `Command { affected: 0 }`.
/// A transient failure drops the session, as a lost socket would.
#[derive(Clone, Debug)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                replies: VecDeque::new(),
                executed: Vec::new(),
                connects: 0,
                reachable: true,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().expect("script mutex poisoned")
    }

    pub fn push(&self, reply: Result<Reply, BackendError>) -> &Self {
        self.lock().replies.push_back(reply);
        self
    }

    pub fn rows(&self, rows: Vec<DataRow>) -> &Self {
        self.push(Ok(Reply::Rows(rows)))
    }

    pub fn command(&self, affected: u64) -> &Self {
        self.push(Ok(Reply::command(affected)))
    }

    pub fn inserted(&self, id: i64) -> &Self {
        self.push(Ok(Reply::Command {
            affected: 1,
            insert_id: Some(id),
        }))
    }

    pub fn fail(&self, err: BackendError) -> &Self {
        self.push(Err(err))
    }

    /// While unreachable, `connect` and `ping` fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// SQL of every statement that reached a live session.
    pub fn statements(&self) -> Vec<String> {
        self.lock().executed.iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// Like [`Script::statements`], with the positional parameters sent.
    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.lock().executed.clone()
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    /// Replies not consumed yet.
    pub fn pending(&self) -> usize {
        self.lock().replies.len()
    }

    pub fn connection(&self) -> ScriptedConnection {
        ScriptedConnection {
            script: self.clone(),
            connected: false,
        }
    }
}

/// In-memory [`Connection`] driven by a [`Script`].
#[derive(Debug)]
pub struct ScriptedConnection {
    script: Script,
    connected: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), BackendError> {
        let mut state = self.script.lock();
        state.connects += 1;
        self.connected = state.reachable;
        if self.connected {
            Ok(())
        } else {
            Err(BackendError::transient("server unreachable"))
        }
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn ping(&mut self) -> Result<(), BackendError> {
        if self.connected && self.script.lock().reachable {
            Ok(())
        } else {
            self.connected = false;
            Err(BackendError::transient("ping failed"))
        }
    }

    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<Reply, BackendError> {
        if !self.connected {
            return Err(BackendError::transient("not connected"));
        }
        let mut state = self.script.lock();
        state.executed.push((sql.to_string(), params.to_vec()));

        if wire::is_transaction_control(sql) {
            return Ok(Reply::command(0));
        }

        let reply = state
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(Reply::command(0)));
        if matches!(&reply, Err(e) if e.is_transient()) {
            self.connected = false;
        }
        reply
    }
}
