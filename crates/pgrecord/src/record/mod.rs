//! Entity rows: field state, dirty tracking and the terminal statement calls.
//!
//! A [`Record`] is a row of one [`EntityDef`] plus the [`QueryBuilder`] used
//! to find, insert, update or delete it. The builder is reachable through
//! `Deref`, so condition calls go straight onto the record:
//!
//! ```ignore
//! static USERS: EntityDef = EntityDef::new("User", "users", "id");
//!
//! let mut users = USERS.record(&exec);
//! users.eq("status", "active").order_by(&["id DESC"]);
//! let active = users.fetch_all().await?;
//!
//! let mut ann = USERS.record(&exec);
//! ann.set("name", "ann").set("status", "active");
//! ann.insert().await?; // ann.pk_value() is now the generated id
//! ```

mod relation;

pub use relation::{Related, RelationDef, RelationKind};

use crate::connection::DataRow;
use crate::error::{BuilderError, OrmError, OrmResult};
use crate::executor::{Executor, Outcome};
use crate::qb::{Arg, Clause, QueryBuilder};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Static description of an entity type.
#[derive(Debug)]
pub struct EntityDef {
    pub name: &'static str,
    pub table: &'static str,
    pub primary_key: &'static str,
    pub relations: &'static [RelationDef],
}

impl EntityDef {
    pub const fn new(name: &'static str, table: &'static str, primary_key: &'static str) -> Self {
        Self {
            name,
            table,
            primary_key,
            relations: &[],
        }
    }

    pub const fn with_relations(mut self, relations: &'static [RelationDef]) -> Self {
        self.relations = relations;
        self
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// An empty row bound to `exec`.
    pub fn record(&'static self, exec: &Arc<Executor>) -> Record {
        Record::new(self, Arc::clone(exec))
    }
}

/// Result of [`Record::call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// A builder call was applied; keep chaining.
    Chained,
    /// A forwarded executor operation answered with a flag.
    Flag(bool),
    /// `lastErrors`.
    Errors(Vec<String>),
}

/// One entity row.
#[derive(Debug, Clone)]
pub struct Record {
    def: &'static EntityDef,
    exec: Arc<Executor>,
    values: BTreeMap<String, Value>,
    dirty: BTreeMap<String, Value>,
    query: QueryBuilder,
    relations: HashMap<&'static str, Related>,
    back_refs: HashMap<String, Box<Record>>,
}

impl Record {
    pub fn new(def: &'static EntityDef, exec: Arc<Executor>) -> Self {
        let query = exec.builder(def.table);
        Self {
            def,
            exec,
            values: BTreeMap::new(),
            dirty: BTreeMap::new(),
            query,
            relations: HashMap::new(),
            back_refs: HashMap::new(),
        }
    }

    /// Build a row from fetched columns. Nothing is marked dirty.
    pub fn materialize(def: &'static EntityDef, exec: Arc<Executor>, row: DataRow) -> Self {
        let mut record = Self::new(def, exec);
        record.values.extend(row);
        record
    }

    pub fn def(&self) -> &'static EntityDef {
        self.def
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.exec
    }

    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryBuilder {
        &mut self.query
    }

    // ==================== Fields ====================

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Set a field and mark it dirty.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.values.insert(field.to_string(), value.clone());
        self.dirty.insert(field.to_string(), value);
        self
    }

    /// Remove a field's value and its dirty entry.
    pub fn unset(&mut self, field: &str) -> &mut Self {
        self.values.remove(field);
        self.dirty.remove(field);
        self
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn is_field_dirty(&self, field: &str) -> bool {
        self.dirty.contains_key(field)
    }

    /// Fields changed since construction or the last successful write.
    pub fn dirty(&self) -> &BTreeMap<String, Value> {
        &self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Primary key value, if present and not NULL.
    pub fn pk_value(&self) -> Option<&Value> {
        self.values
            .get(self.def.primary_key)
            .filter(|v| !v.is_null())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.values).unwrap_or(serde_json::Value::Null)
    }

    fn require_pk(&self) -> OrmResult<Value> {
        self.pk_value()
            .cloned()
            .ok_or_else(|| BuilderError::MissingPrimaryKey(self.def.table.to_string()).into())
    }

    // ==================== Terminal calls ====================

    async fn run(&mut self, clauses: &[Clause]) -> OrmResult<Outcome> {
        let (sql, params) = self.query.take_statement(clauses)?;
        let outcome = self.exec.execute(&sql, &params).await?;
        if outcome.is_failure() {
            let message = self
                .exec
                .last_error()
                .unwrap_or_else(|| "statement failed".to_string());
            return Err(OrmError::Statement(message));
        }
        Ok(outcome)
    }

    /// First row matching the current conditions (`LIMIT 1`).
    pub async fn fetch(&mut self) -> OrmResult<Option<Record>> {
        self.query.limit(1);
        let outcome = self.run(&Clause::SELECT_ORDER).await?;
        Ok(outcome
            .into_rows()
            .into_iter()
            .next()
            .map(|row| Record::materialize(self.def, Arc::clone(&self.exec), row)))
    }

    /// Every row matching the current conditions, in server order.
    pub async fn fetch_all(&mut self) -> OrmResult<Vec<Record>> {
        let outcome = self.run(&Clause::SELECT_ORDER).await?;
        Ok(outcome
            .into_rows()
            .into_iter()
            .map(|row| Record::materialize(self.def, Arc::clone(&self.exec), row))
            .collect())
    }

    /// Row whose primary key equals `id`.
    pub async fn find(&mut self, id: impl Into<Value>) -> OrmResult<Option<Record>> {
        self.query.restrict(self.def.primary_key, id.into());
        self.fetch().await
    }

    /// Insert the dirty fields as a new row.
    ///
    /// The statement returns the primary key column; a returned key is stored
    /// without marking it dirty. A positive integral key is reported as
    /// [`Outcome::InsertId`]. With nothing dirty this is a no-op returning
    /// [`Outcome::Success`].
    pub async fn insert(&mut self) -> OrmResult<Outcome> {
        if self.dirty.is_empty() {
            return Ok(Outcome::Success);
        }
        let fields: Vec<(String, Value)> = self
            .dirty
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.query.insert_row(fields);
        self.query.returning(&[self.def.primary_key]);
        let outcome = self.run(&Clause::INSERT_ORDER).await?;

        let returned = outcome
            .rows()
            .first()
            .and_then(|row| row.get(self.def.primary_key))
            .filter(|v| !v.is_null())
            .cloned();
        let outcome = match (&returned, outcome) {
            (Some(Value::Int(id)), _) if *id > 0 => Outcome::InsertId(*id),
            (_, Outcome::RowSet(rows)) if !rows.is_empty() => {
                Outcome::AffectedRows(rows.len() as u64)
            }
            (_, Outcome::RowSet(_)) => Outcome::Success,
            (_, other) => other,
        };
        if let Some(pk) = returned {
            self.values.insert(self.def.primary_key.to_string(), pk);
        }
        self.dirty.clear();
        Ok(outcome)
    }

    /// Write the dirty fields back to the row identified by the primary key.
    pub async fn update(&mut self) -> OrmResult<Outcome> {
        if self.dirty.is_empty() {
            return Ok(Outcome::Success);
        }
        let pk = self.require_pk()?;
        for (field, value) in &self.dirty {
            self.query.assign(field, value.clone());
        }
        self.query.restrict(self.def.primary_key, pk);
        let outcome = self.run(&Clause::UPDATE_ORDER).await?;
        self.dirty.clear();
        Ok(outcome)
    }

    /// Delete the row identified by the primary key.
    pub async fn delete(&mut self) -> OrmResult<Outcome> {
        let pk = self.require_pk()?;
        self.query.mark_delete();
        self.query.restrict(self.def.primary_key, pk);
        let outcome = self.run(&Clause::DELETE_ORDER).await?;
        self.dirty.clear();
        Ok(outcome)
    }

    // ==================== Dynamic calls ====================

    /// Builder call by name; names the builder does not know are tried as
    /// executor operations (`beginTransaction`, `endTransaction`,
    /// `reconnect`, `lastErrors`).
    pub async fn call(&mut self, name: &str, args: &[Arg]) -> OrmResult<CallOutcome> {
        match self.query.call(name, args) {
            Ok(_) => return Ok(CallOutcome::Chained),
            Err(BuilderError::UnknownCall(_)) => {}
            Err(err) => return Err(err.into()),
        }

        let key: String = name
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "begintransaction" => Ok(CallOutcome::Flag(self.exec.begin_transaction().await)),
            "endtransaction" => Ok(CallOutcome::Flag(self.exec.end_transaction().await)),
            "reconnect" => {
                let probe_first = match args.first() {
                    None => true,
                    Some(Arg::One(Value::Bool(b))) => *b,
                    Some(_) => {
                        return Err(BuilderError::InvalidArgument(format!(
                            "{name} expects a boolean"
                        ))
                        .into());
                    }
                };
                Ok(CallOutcome::Flag(self.exec.reconnect(probe_first).await))
            }
            "lasterrors" => Ok(CallOutcome::Errors(self.exec.last_errors())),
            _ => Err(BuilderError::UnknownCall(name.to_string()).into()),
        }
    }
}

impl std::ops::Deref for Record {
    type Target = QueryBuilder;

    fn deref(&self) -> &Self::Target {
        &self.query
    }
}

impl std::ops::DerefMut for Record {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.query
    }
}
