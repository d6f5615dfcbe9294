//! Fluent expression-tree query builder.
//!
//! Every clause of a statement is stored as an [`Expr`] tree. New conditions
//! are folded into the right-hand side of the WHERE expression, so
//! `eq("a", 1).gt("b", 2)` yields `WHERE t.a = :ph1 AND t.b > :ph2`. Values are
//! never inlined; each one is bound under a fresh `:phN` placeholder taken from
//! a [`PlaceholderSeq`] shared by every builder of the same registry.
//!
//! # Usage
//!
//! ```ignore
//! use pgrecord::qb::{Connective, Op, QueryBuilder};
//!
//! let mut qb = QueryBuilder::new("users", seq);
//! qb.eq("status", "active")
//!     .group(Connective::Or, |g| {
//!         g.lt("age", 18).or_filter("age", Op::Gt, 65);
//!     })
//!     .order_by(&["id DESC"])
//!     .limit(20);
//!
//! // SELECT users.* FROM users WHERE users.status = :ph1
//! //   OR (users.age < :ph2 OR users.age > :ph3) ORDER BY id DESC LIMIT 20
//! let sql = qb.to_sql()?;
//!
//! // The same chain, resolved by name at runtime.
//! qb.call("eq", &["status".into(), "active".into()])?
//!     .call("wrap", &[])?
//!     .call("lt", &["age".into(), 18.into()])?
//!     .call("gt", &["age".into(), 65.into(), "or".into()])?
//!     .call("wrap", &["or".into()])?;
//! ```

mod builder;
mod clause;
mod dispatch;
mod expr;
mod op;
mod param;

pub use builder::{JoinKind, QueryBuilder};
pub use clause::{Clause, ClauseState, Connective, GroupState};
pub use expr::{Expr, ExprGroup, Operand};
pub use op::{Arg, Op, Shape};
pub use param::{PLACEHOLDER_PREFIX, ParamTable, PlaceholderSeq};
