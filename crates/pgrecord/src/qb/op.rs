//! Condition kinds.
//!
//! [`Op`] is the closed set of conditions the builder understands. Each kind
//! knows its SQL operator, the name it answers to in dynamic dispatch, and the
//! operand shape it requires.

use crate::error::BuilderError;
use crate::value::Value;

/// Operand shape a condition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// No operand (`IS NULL`).
    Unary,
    /// Exactly one value.
    Single,
    /// One or more values rendered as a parenthesized list.
    List,
    /// Exactly two values joined by `AND`.
    Range,
}

impl Shape {
    fn describe(self) -> &'static str {
        match self {
            Shape::Unary => "no value",
            Shape::Single => "a single value",
            Shape::List => "a list of values",
            Shape::Range => "exactly two values",
        }
    }
}

/// Condition operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    Ilike,
    In,
    NotIn,
    Between,
    NotBetween,
    IsNull,
    IsNotNull,
}

impl Op {
    pub const ALL: [Op; 15] = [
        Op::Eq,
        Op::Ne,
        Op::Gt,
        Op::Ge,
        Op::Lt,
        Op::Le,
        Op::Like,
        Op::NotLike,
        Op::Ilike,
        Op::In,
        Op::NotIn,
        Op::Between,
        Op::NotBetween,
        Op::IsNull,
        Op::IsNotNull,
    ];

    /// SQL operator text.
    pub fn sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
            Op::Ilike => "ILIKE",
            Op::In => "IN",
            Op::NotIn => "NOT IN",
            Op::Between => "BETWEEN",
            Op::NotBetween => "NOT BETWEEN",
            Op::IsNull => "IS NULL",
            Op::IsNotNull => "IS NOT NULL",
        }
    }

    /// Name used by dynamic dispatch (`eq`, `notin`, `isnull`, ...).
    pub fn call_name(self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Gt => "gt",
            Op::Ge => "ge",
            Op::Lt => "lt",
            Op::Le => "le",
            Op::Like => "like",
            Op::NotLike => "notlike",
            Op::Ilike => "ilike",
            Op::In => "in",
            Op::NotIn => "notin",
            Op::Between => "between",
            Op::NotBetween => "notbetween",
            Op::IsNull => "isnull",
            Op::IsNotNull => "isnotnull",
        }
    }

    pub fn shape(self) -> Shape {
        match self {
            Op::IsNull | Op::IsNotNull => Shape::Unary,
            Op::In | Op::NotIn => Shape::List,
            Op::Between | Op::NotBetween => Shape::Range,
            _ => Shape::Single,
        }
    }

    /// Resolve a dynamic call name, ignoring case and underscores
    /// (`isNull`, `is_null` and `isnull` all match).
    pub fn from_call_name(name: &str) -> Option<Op> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Op::ALL.into_iter().find(|op| op.call_name() == normalized)
    }

    /// Check that `operand` fits this operator.
    pub fn check(self, operand: &Arg) -> Result<(), BuilderError> {
        let ok = match (self.shape(), operand) {
            (Shape::Unary, Arg::None) => true,
            (Shape::Single, Arg::One(_)) => true,
            (Shape::List, Arg::Many(values)) => !values.is_empty(),
            (Shape::Range, Arg::Many(values)) => values.len() == 2,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(BuilderError::OperandShape {
                op: self.sql(),
                expected: self.shape().describe(),
            })
        }
    }
}

/// The value side of a condition, before binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    None,
    One(Value),
    Many(Vec<Value>),
}

impl Arg {
    pub fn many<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Arg::Many(values.into_iter().map(Into::into).collect())
    }
}

macro_rules! impl_arg_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Self {
                Arg::One(v.into())
            }
        })*
    };
}

impl_arg_from!(
    Value,
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    &str,
    String,
    serde_json::Value,
    uuid::Uuid,
    std::net::IpAddr,
    rust_decimal::Decimal,
    chrono::NaiveDate,
    chrono::NaiveTime,
    chrono::DateTime<chrono::Utc>
);
