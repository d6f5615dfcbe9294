//! Statement text on its way to the server.
//!
//! Builders emit named placeholders (`:ph12`); PostgreSQL wants positional
//! ones (`$1`). [`to_wire`] renumbers them in order of first appearance and
//! collects the matching values. A name used twice maps to the same `$n`, and
//! only names that occur in the text are sent.

use crate::qb::ParamTable;
use crate::value::Value;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// A statement ready for [`Connection::run`](crate::connection::Connection::run).
#[derive(Debug, Clone, PartialEq)]
pub struct WireStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `::` is matched first so casts like `x::phone_type` are left alone.
    RE.get_or_init(|| Regex::new(r"::|:ph\d+").expect("invalid built-in placeholder regex"))
}

fn insert_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(INSERT|REPLACE)\b").expect("invalid built-in insert regex")
    })
}

fn returning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bRETURNING\b").expect("invalid built-in returning regex"))
}

fn row_returning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(SELECT|WITH|SHOW|VALUES|TABLE|EXPLAIN)\b")
            .expect("invalid built-in row-returning regex")
    })
}

fn transaction_control_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(BEGIN|START\s+TRANSACTION|COMMIT|ROLLBACK|END)\b")
            .expect("invalid built-in transaction regex")
    })
}

/// Rewrite `:phN` placeholders to `$k` and collect their values.
///
/// Placeholders with no entry in `params` are left untouched.
pub fn to_wire(sql: &str, params: &ParamTable) -> WireStatement {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut values = Vec::new();

    let rewritten = placeholder_re().replace_all(sql, |caps: &regex::Captures<'_>| {
        let Some(m) = caps.get(0) else {
            return String::new();
        };
        let name = m.as_str();
        if name == "::" {
            return name.to_string();
        }
        let Some(value) = params.get(name) else {
            return name.to_string();
        };
        let position = *positions.entry(name.to_string()).or_insert_with(|| {
            values.push(value.clone());
            values.len()
        });
        format!("${position}")
    });

    WireStatement {
        sql: rewritten.into_owned(),
        params: values,
    }
}

/// `INSERT ...` or `REPLACE ...`.
pub fn is_insert(sql: &str) -> bool {
    insert_re().is_match(sql)
}

pub fn has_returning(sql: &str) -> bool {
    returning_re().is_match(sql)
}

/// Whether the statement produces a result set.
pub fn returns_rows(sql: &str) -> bool {
    row_returning_re().is_match(sql) || has_returning(sql)
}

pub fn is_transaction_control(sql: &str) -> bool {
    transaction_control_re().is_match(sql)
}
