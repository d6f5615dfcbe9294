use super::{ConnectParams, Executor, ExecutorConfig};
use crate::connection::{Connection, PgConnection};
use crate::error::{OrmError, OrmResult};
use crate::qb::PlaceholderSeq;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

/// Opens the physical connection for a parameter set.
pub trait Connector: Send + Sync {
    fn open(&self, params: &ConnectParams) -> OrmResult<Box<dyn Connection>>;
}

impl<F> Connector for F
where
    F: Fn(&ConnectParams) -> OrmResult<Box<dyn Connection>> + Send + Sync,
{
    fn open(&self, params: &ConnectParams) -> OrmResult<Box<dyn Connection>> {
        self(params)
    }
}

/// Opens [`PgConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl Connector for PgConnector {
    fn open(&self, params: &ConnectParams) -> OrmResult<Box<dyn Connection>> {
        Ok(Box::new(PgConnection::new(params.pg_config()?)))
    }
}

#[derive(Default)]
struct Slots {
    executors: HashMap<u64, Arc<Executor>>,
    first: Option<u64>,
}

/// One executor per distinct set of connection parameters.
///
/// Every executor handed out by a registry shares one
/// [`PlaceholderSeq`], so statements built against different databases never
/// reuse a placeholder name.
pub struct Registry {
    connector: Box<dyn Connector>,
    config: ExecutorConfig,
    seq: Arc<PlaceholderSeq>,
    slots: Mutex<Slots>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("executors", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry of PostgreSQL executors with default settings.
    pub fn new() -> Self {
        Self::with_connector(PgConnector, ExecutorConfig::default())
    }

    pub fn with_connector(connector: impl Connector + 'static, config: ExecutorConfig) -> Self {
        Self {
            connector: Box::new(connector),
            config,
            seq: PlaceholderSeq::shared(),
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn placeholder_seq(&self) -> &Arc<PlaceholderSeq> {
        &self.seq
    }

    /// Executor for `params`, created on first request.
    ///
    /// With `None`, returns the first executor ever created; that is an error
    /// while the registry is still empty.
    pub fn get(&self, params: Option<&ConnectParams>) -> OrmResult<Arc<Executor>> {
        let mut slots = self.slots.lock().expect("registry mutex poisoned");

        let Some(params) = params else {
            return slots
                .first
                .and_then(|key| slots.executors.get(&key).cloned())
                .ok_or_else(|| OrmError::Config("no executor has been created yet".to_string()));
        };

        let key = params_key(params);
        if let Some(existing) = slots.executors.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let conn = self.connector.open(params)?;
        let executor = Arc::new(Executor::new(
            params.clone(),
            conn,
            self.config.clone(),
            Arc::clone(&self.seq),
        ));
        tracing::debug!(target: "pgrecord.sql", key, "executor created");
        slots.executors.insert(key, Arc::clone(&executor));
        slots.first.get_or_insert(key);
        Ok(executor)
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .expect("registry mutex poisoned")
            .executors
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn params_key(params: &ConnectParams) -> u64 {
    let mut hasher = DefaultHasher::new();
    params.hash(&mut hasher);
    hasher.finish()
}
