//! # pgrecord
//!
//! An active-record style query layer for PostgreSQL.
//!
//! ## Features
//!
//! - **Expression-tree builder**: chained condition calls fold into a clause
//!   tree and render to SQL with named `:phN` placeholders
//! - **Explicit grouping**: `open_group` / `close_group` (or the scoped `group`)
//!   produce parenthesized condition groups
//! - **Dynamic dispatch**: the same calls by name (`call("eq", ...)`,
//!   `call("orderBy", ...)`, `call("wrap", ...)`)
//! - **Resilient executor**: transient connection loss is retried a bounded
//!   number of times; statement errors are recorded, never retried
//! - **Transactions**: `begin_transaction` / `end_transaction` commit or roll
//!   back based on the errors recorded in between, plus a `transaction!` macro
//! - **Lazy relations**: `belongs_to`, `has_one` and `has_many`, resolved on
//!   demand and cached per record, with optional back-references
//!
//! ## Example
//!
//! ```ignore
//! use pgrecord::{ConnectParams, EntityDef, Registry, RelationDef};
//!
//! static USERS: EntityDef = EntityDef::new("User", "users", "id")
//!     .with_relations(&[RelationDef::has_many("posts", &POSTS, "user_id").back_ref("author")]);
//! static POSTS: EntityDef = EntityDef::new("Post", "posts", "id");
//!
//! let registry = Registry::new();
//! let exec = registry.get(Some(&ConnectParams::from_env()?))?;
//!
//! let mut users = USERS.record(&exec);
//! users.eq("status", "active").order_by(&["id"]);
//! for mut user in users.fetch_all().await? {
//!     let posts = user.resolve("posts").await?;
//!     println!("{} has {} posts", user.to_json(), posts.len());
//! }
//! ```

pub mod connection;
pub mod error;
pub mod executor;
pub mod qb;
pub mod record;
pub mod transaction;
pub mod value;

pub use connection::{BackendError, Connection, DataRow, PgConnection, Reply, Script, ScriptedConnection};
pub use error::{BuilderError, OrmError, OrmResult};
pub use executor::{
    ConnectParams, Connector, DeveloperContext, Executor, ExecutorConfig, Outcome, PgConnector,
    Registry,
};
pub use qb::{Arg, Clause, Connective, JoinKind, Op, ParamTable, PlaceholderSeq, QueryBuilder};
pub use record::{CallOutcome, EntityDef, Record, Related, RelationDef, RelationKind};
pub use value::Value;
