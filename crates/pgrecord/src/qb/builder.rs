//! The fluent statement builder.

use crate::error::BuilderError;
use crate::qb::clause::{Clause, ClauseState, Connective, GroupState};
use crate::qb::expr::{Expr, ExprGroup, Operand};
use crate::qb::op::{Arg, Op, Shape};
use crate::qb::param::{ParamTable, PlaceholderSeq};
use crate::value::Value;
use std::sync::Arc;

/// JOIN flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Left,
    Inner,
    Right,
    Full,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }

    pub(crate) fn from_arg(arg: &str) -> Option<Self> {
        match arg.to_ascii_uppercase().as_str() {
            "LEFT" => Some(JoinKind::Left),
            "INNER" => Some(JoinKind::Inner),
            "RIGHT" => Some(JoinKind::Right),
            "FULL" => Some(JoinKind::Full),
            _ => None,
        }
    }
}

/// Builds one statement at a time for a single table.
///
/// Condition and clause calls mutate the builder in place and return `&mut Self`
/// so they chain. A call with a malformed operand does not fail the chain; the
/// error is kept and reported by [`QueryBuilder::build_sql`].
///
/// ```ignore
/// let mut qb = QueryBuilder::new("users", seq);
/// qb.eq("status", "active")
///     .group(Connective::Or, |g| {
///         g.lt("age", 18).or_filter("age", Op::Gt, 65);
///     })
///     .order_by(&["id DESC"])
///     .limit(10);
/// let sql = qb.to_sql()?;
/// ```
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    table: String,
    seq: Arc<PlaceholderSeq>,
    state: ClauseState,
    params: ParamTable,
    build_error: Option<BuilderError>,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>, seq: Arc<PlaceholderSeq>) -> Self {
        Self {
            table: table.into(),
            seq,
            state: ClauseState::new(),
            params: ParamTable::new(),
            build_error: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn state(&self) -> &ClauseState {
        &self.state
    }

    pub fn params(&self) -> &ParamTable {
        &self.params
    }

    pub fn placeholder_seq(&self) -> &Arc<PlaceholderSeq> {
        &self.seq
    }

    pub fn is_grouping(&self) -> bool {
        self.state.group_state() == GroupState::Grouping
    }

    // ==================== Conditions ====================

    /// Add a WHERE condition with an explicit connective.
    pub fn filter(
        &mut self,
        field: &str,
        op: Op,
        arg: impl Into<Arg>,
        connective: Connective,
    ) -> &mut Self {
        self.condition(Clause::Where, field, op, arg.into(), connective)
    }

    /// Add a WHERE condition joined with OR.
    pub fn or_filter(&mut self, field: &str, op: Op, arg: impl Into<Arg>) -> &mut Self {
        self.filter(field, op, arg, Connective::Or)
    }

    /// Add a HAVING condition.
    pub fn having(
        &mut self,
        field: &str,
        op: Op,
        arg: impl Into<Arg>,
        connective: Connective,
    ) -> &mut Self {
        self.condition(Clause::Having, field, op, arg.into(), connective)
    }

    pub fn eq(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::Eq, Arg::One(value.into()), Connective::And)
    }

    pub fn ne(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::Ne, Arg::One(value.into()), Connective::And)
    }

    pub fn gt(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::Gt, Arg::One(value.into()), Connective::And)
    }

    pub fn ge(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::Ge, Arg::One(value.into()), Connective::And)
    }

    pub fn lt(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::Lt, Arg::One(value.into()), Connective::And)
    }

    pub fn le(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::Le, Arg::One(value.into()), Connective::And)
    }

    pub fn like(&mut self, field: &str, pattern: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::Like, Arg::One(pattern.into()), Connective::And)
    }

    pub fn not_like(&mut self, field: &str, pattern: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::NotLike, Arg::One(pattern.into()), Connective::And)
    }

    pub fn ilike(&mut self, field: &str, pattern: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::Ilike, Arg::One(pattern.into()), Connective::And)
    }

    pub fn is_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(field, Op::In, Arg::many(values), Connective::And)
    }

    pub fn not_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(field, Op::NotIn, Arg::many(values), Connective::And)
    }

    pub fn between(&mut self, field: &str, lo: impl Into<Value>, hi: impl Into<Value>) -> &mut Self {
        self.filter(field, Op::Between, Arg::Many(vec![lo.into(), hi.into()]), Connective::And)
    }

    pub fn not_between(
        &mut self,
        field: &str,
        lo: impl Into<Value>,
        hi: impl Into<Value>,
    ) -> &mut Self {
        self.filter(field, Op::NotBetween, Arg::Many(vec![lo.into(), hi.into()]), Connective::And)
    }

    pub fn is_null(&mut self, field: &str) -> &mut Self {
        self.filter(field, Op::IsNull, Arg::None, Connective::And)
    }

    pub fn is_not_null(&mut self, field: &str) -> &mut Self {
        self.filter(field, Op::IsNotNull, Arg::None, Connective::And)
    }

    /// Add a raw SQL condition to WHERE (no parameters are bound).
    pub fn where_raw(&mut self, sql: &str, connective: Connective) -> &mut Self {
        self.state
            .push_condition(Clause::Where, Expr::prefix("", sql), connective);
        self
    }

    pub(crate) fn condition(
        &mut self,
        clause: Clause,
        field: &str,
        op: Op,
        arg: Arg,
        connective: Connective,
    ) -> &mut Self {
        if let Err(err) = op.check(&arg) {
            self.defer_error(err);
            return self;
        }

        let source = if clause == Clause::Where && !field.contains('.') {
            format!("{}.{}", self.table, field)
        } else {
            field.to_string()
        };

        let target = match arg {
            Arg::None => Operand::Text(String::new()),
            Arg::One(value) => Operand::Text(self.params.bind(&self.seq, value)),
            Arg::Many(values) => {
                let names = self.params.bind_all(&self.seq, values);
                if op.shape() == Shape::Range {
                    ExprGroup::range(names[0].clone(), names[1].clone()).into()
                } else {
                    ExprGroup::of_text(names).into()
                }
            }
        };

        self.state
            .push_condition(clause, Expr::binary(source, op.sql(), target), connective);
        self
    }

    fn defer_error(&mut self, err: BuilderError) {
        if self.build_error.is_none() {
            self.build_error = Some(err);
        }
    }

    // ==================== Grouping ====================

    /// Start buffering conditions for a parenthesized group.
    pub fn open_group(&mut self) -> &mut Self {
        self.state.open_group();
        self
    }

    /// Close the open group and attach it to WHERE with `connective`.
    ///
    /// Closing with nothing buffered only leaves grouping mode.
    pub fn close_group(&mut self, connective: Connective) -> &mut Self {
        self.state.close_group(connective);
        self
    }

    /// Run `f` inside a group that is closed (and attached with `connective`)
    /// when `f` returns. Groups do not nest.
    pub fn group(&mut self, connective: Connective, f: impl FnOnce(&mut Self)) -> &mut Self {
        self.open_group();
        f(self);
        self.close_group(connective)
    }

    // ==================== Clauses ====================

    /// Replace the SELECT list (default `<table>.*`).
    pub fn select(&mut self, cols: &[&str]) -> &mut Self {
        self.state
            .set(Clause::Select, Expr::prefix("SELECT", cols.join(", ")));
        self
    }

    /// Replace the FROM expression (default `<table>`).
    pub fn from(&mut self, from: &str) -> &mut Self {
        self.state.set(Clause::From, Expr::prefix("FROM", from));
        self
    }

    pub fn join(&mut self, table: &str, on: &str, kind: JoinKind) -> &mut Self {
        self.state
            .fold(Clause::Join, kind.keyword(), Expr::binary(table, "ON", on));
        self
    }

    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join(table, on, JoinKind::Left)
    }

    pub fn inner_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join(table, on, JoinKind::Inner)
    }

    pub fn order_by(&mut self, cols: &[&str]) -> &mut Self {
        self.state
            .set(Clause::Order, Expr::prefix("ORDER BY", cols.join(", ")));
        self
    }

    pub fn group_by(&mut self, cols: &[&str]) -> &mut Self {
        self.state
            .set(Clause::Group, Expr::prefix("GROUP BY", cols.join(", ")));
        self
    }

    /// Columns an INSERT hands back.
    pub fn returning(&mut self, cols: &[&str]) -> &mut Self {
        self.state
            .set(Clause::Returning, Expr::prefix("RETURNING", cols.join(", ")));
        self
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.state.set(Clause::Limit, Expr::prefix("LIMIT", n.to_string()));
        self
    }

    pub fn limit_offset(&mut self, n: u64, offset: u64) -> &mut Self {
        self.state
            .set(Clause::Limit, Expr::prefix("LIMIT", format!("{n} OFFSET {offset}")));
        self
    }

    // ==================== Statement internals ====================

    /// `SET field = :ph` assignment; never buffered by grouping.
    pub(crate) fn assign(&mut self, field: &str, value: Value) {
        let ph = self.params.bind(&self.seq, value);
        self.state
            .attach(Clause::Set, Expr::binary(field, "=", ph), Connective::Comma);
    }

    /// `WHERE <table>.field = :ph`, attached directly even while grouping.
    pub(crate) fn restrict(&mut self, field: &str, value: Value) {
        let ph = self.params.bind(&self.seq, value);
        let source = format!("{}.{}", self.table, field);
        self.state
            .attach(Clause::Where, Expr::binary(source, "=", ph), Connective::And);
    }

    pub(crate) fn insert_row(&mut self, fields: Vec<(String, Value)>) {
        let (columns, values): (Vec<String>, Vec<Value>) = fields.into_iter().unzip();
        let names = self.params.bind_all(&self.seq, values);
        self.state.set(
            Clause::Insert,
            Expr::prefix(format!("INSERT INTO {}", self.table), ExprGroup::of_text(columns)),
        );
        self.state
            .set(Clause::Values, Expr::prefix("VALUES", ExprGroup::of_text(names)));
    }

    pub(crate) fn mark_delete(&mut self) {
        self.state.set(Clause::Delete, Expr::prefix("DELETE", ""));
    }

    // ==================== Rendering ====================

    /// Render the requested clauses, in the given order, joined by single spaces.
    ///
    /// Unset SELECT renders `SELECT <table>.*`; unset FROM/UPDATE render
    /// `FROM <table>` / `UPDATE <table>`; other unset clauses are omitted.
    pub fn build_sql(&self, clauses: &[Clause]) -> Result<String, BuilderError> {
        if let Some(err) = &self.build_error {
            return Err(err.clone());
        }

        let parts: Vec<String> = clauses
            .iter()
            .filter_map(|clause| match self.state.get(*clause) {
                Some(expr) => Some(expr.render()),
                None => match clause {
                    Clause::Select => Some(format!("SELECT {}.*", self.table)),
                    Clause::From | Clause::Update => {
                        Some(format!("{} {}", clause.keyword(), self.table))
                    }
                    _ => None,
                },
            })
            .filter(|part| !part.is_empty())
            .collect();
        Ok(parts.join(" "))
    }

    /// Render a SELECT over the canonical clause order.
    pub fn to_sql(&self) -> Result<String, BuilderError> {
        self.build_sql(&Clause::SELECT_ORDER)
    }

    /// Render `clauses` and hand out the statement with its parameters,
    /// resetting the builder for the next statement.
    pub fn take_statement(&mut self, clauses: &[Clause]) -> Result<(String, ParamTable), BuilderError> {
        let built = self.build_sql(clauses);
        let params = self.params.take();
        self.reset();
        built.map(|sql| (sql, params))
    }

    /// Drop every clause, parameter and deferred error.
    pub fn reset(&mut self) -> &mut Self {
        self.state.clear();
        self.params.clear();
        self.build_error = None;
        self
    }
}
