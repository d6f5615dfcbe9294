//! Clause slots and the condition grouping state machine.

use crate::qb::expr::{Expr, ExprGroup, Operand};
use std::collections::HashMap;

/// A named SQL fragment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Select,
    From,
    Join,
    Where,
    Group,
    Having,
    Order,
    Limit,
    Update,
    Set,
    Insert,
    Values,
    Returning,
    Delete,
}

impl Clause {
    /// Canonical clause order of a SELECT statement.
    pub const SELECT_ORDER: [Clause; 8] = [
        Clause::Select,
        Clause::From,
        Clause::Join,
        Clause::Where,
        Clause::Group,
        Clause::Having,
        Clause::Order,
        Clause::Limit,
    ];
    /// Canonical clause order of an INSERT statement.
    pub const INSERT_ORDER: [Clause; 3] = [Clause::Insert, Clause::Values, Clause::Returning];
    /// Canonical clause order of an UPDATE statement.
    pub const UPDATE_ORDER: [Clause; 3] = [Clause::Update, Clause::Set, Clause::Where];
    /// Canonical clause order of a DELETE statement.
    pub const DELETE_ORDER: [Clause; 3] = [Clause::Delete, Clause::From, Clause::Where];

    /// Leading SQL keyword of the clause.
    pub fn keyword(self) -> &'static str {
        match self {
            Clause::Select => "SELECT",
            Clause::From => "FROM",
            Clause::Join => "JOIN",
            Clause::Where => "WHERE",
            Clause::Group => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::Order => "ORDER BY",
            Clause::Limit => "LIMIT",
            Clause::Update => "UPDATE",
            Clause::Set => "SET",
            Clause::Insert => "INSERT INTO",
            Clause::Values => "VALUES",
            Clause::Returning => "RETURNING",
            Clause::Delete => "DELETE",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Clause::Select => "select",
            Clause::From => "from",
            Clause::Join => "join",
            Clause::Where => "where",
            Clause::Group => "group",
            Clause::Having => "having",
            Clause::Order => "order",
            Clause::Limit => "limit",
            Clause::Update => "update",
            Clause::Set => "set",
            Clause::Insert => "insert",
            Clause::Values => "values",
            Clause::Returning => "returning",
            Clause::Delete => "delete",
        }
    }

    pub fn from_name(name: &str) -> Option<Clause> {
        let name = name.to_ascii_lowercase();
        [
            Clause::Select,
            Clause::From,
            Clause::Join,
            Clause::Where,
            Clause::Group,
            Clause::Having,
            Clause::Order,
            Clause::Limit,
            Clause::Update,
            Clause::Set,
            Clause::Insert,
            Clause::Values,
            Clause::Returning,
            Clause::Delete,
        ]
        .into_iter()
        .find(|c| c.name() == name)
    }
}

/// Boolean (or list) joiner used when a clause already holds an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connective {
    #[default]
    And,
    Or,
    /// Used between SET assignments.
    Comma,
}

impl Connective {
    pub fn sql(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
            Connective::Comma => ",",
        }
    }

    /// `"or"` in any case selects OR; anything else selects AND.
    pub fn from_arg(arg: &str) -> Self {
        if arg.eq_ignore_ascii_case("or") {
            Connective::Or
        } else {
            Connective::And
        }
    }
}

/// Whether condition calls attach directly or are buffered for a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupState {
    #[default]
    Plain,
    Grouping,
}

/// Per-statement clause slots plus the grouping buffer.
///
/// While [`GroupState::Grouping`], condition calls reduce into a single
/// buffered expression; [`ClauseState::close_group`] wraps it in parentheses and
/// attaches it to WHERE. A group that is never closed is dropped when the state
/// is cleared.
#[derive(Debug, Clone, Default)]
pub struct ClauseState {
    clauses: HashMap<Clause, Expr>,
    group: GroupState,
    group_buffer: Option<Expr>,
}

impl ClauseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, clause: Clause) -> Option<&Expr> {
        self.clauses.get(&clause)
    }

    /// Store `expr` in `clause`, overwriting any prior value.
    pub fn set(&mut self, clause: Clause, expr: Expr) {
        self.clauses.insert(clause, expr);
    }

    pub fn group_state(&self) -> GroupState {
        self.group
    }

    pub fn group_buffer(&self) -> Option<&Expr> {
        self.group_buffer.as_ref()
    }

    /// Route a condition: buffered while grouping, attached to `clause` otherwise.
    pub fn push_condition(&mut self, clause: Clause, cond: Expr, connective: Connective) {
        match self.group {
            GroupState::Plain => self.attach(clause, cond, connective),
            GroupState::Grouping => {
                self.group_buffer = Some(match self.group_buffer.take() {
                    None => cond,
                    Some(prev) => Expr::binary(prev, connective.sql(), cond),
                });
            }
        }
    }

    /// Clause-attach rule.
    ///
    /// An empty clause becomes `KEYWORD cond`; otherwise the clause's current
    /// target becomes the source of `target connective cond`.
    pub fn attach(&mut self, clause: Clause, cond: impl Into<Operand>, connective: Connective) {
        let cond = cond.into();
        match self.clauses.get_mut(&clause) {
            None => {
                self.clauses.insert(clause, Expr::prefix(clause.keyword(), cond));
            }
            Some(existing) => {
                let target = existing.target_mut();
                let prev = std::mem::replace(target, Operand::Text(String::new()));
                *target = Expr::binary(prev, connective.sql(), cond).into();
            }
        }
    }

    /// Fold `operator target` onto the whole current clause expression.
    ///
    /// Used for clauses such as JOIN where every addition carries its own keyword.
    pub fn fold(&mut self, clause: Clause, operator: &str, target: impl Into<Operand>) {
        let expr = match self.clauses.remove(&clause) {
            None => Expr::prefix(operator, target),
            Some(prev) => Expr::binary(prev, operator, target),
        };
        self.clauses.insert(clause, expr);
    }

    /// Enter grouping. An existing buffer is kept.
    pub fn open_group(&mut self) {
        self.group = GroupState::Grouping;
    }

    /// Leave grouping, attaching the buffered conditions to WHERE as one
    /// parenthesized group. Returns `true` when something was attached.
    pub fn close_group(&mut self, connective: Connective) -> bool {
        self.group = GroupState::Plain;
        match self.group_buffer.take() {
            Some(buffered) => {
                let group = ExprGroup::new(vec![buffered.into()]).delimiter(" ");
                self.attach(Clause::Where, group, connective);
                true
            }
            None => false,
        }
    }

    /// Empty every clause and the grouping state.
    pub fn clear(&mut self) {
        if self.group_buffer.is_some() {
            tracing::debug!(
                target: "pgrecord.qb",
                "discarding condition group that was never closed"
            );
        }
        self.clauses.clear();
        self.group = GroupState::Plain;
        self.group_buffer = None;
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty() && self.group_buffer.is_none()
    }
}
