//! Builder calls resolved by name at runtime.
//!
//! Lookup order: the condition table ([`Op`]), `wrap`, the plain clause calls
//! (`select`, `from`, `join`, `limit`/`top`), then `<clause>By` for ORDER and
//! GROUP. Anything else is [`BuilderError::UnknownCall`].

use crate::error::BuilderError;
use crate::qb::builder::{JoinKind, QueryBuilder};
use crate::qb::clause::{Clause, Connective};
use crate::qb::op::{Arg, Op, Shape};
use crate::value::Value;

impl QueryBuilder {
    /// Apply a builder call given by name.
    ///
    /// Conditions take `(field, operand?, connective?)`; the connective is OR
    /// only when the trailing argument is the text `"or"` in any case. `wrap`
    /// with no argument opens a group, `wrap(connective)` closes it.
    pub fn call(&mut self, name: &str, args: &[Arg]) -> Result<&mut Self, BuilderError> {
        if let Some(op) = Op::from_call_name(name) {
            return self.call_condition(op, name, args);
        }

        let key: String = name
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match key.as_str() {
            "wrap" => {
                return match args {
                    [] => Ok(self.open_group()),
                    [arg] => {
                        let connective = text_arg(name, arg).map(|s| Connective::from_arg(&s))?;
                        Ok(self.close_group(connective))
                    }
                    _ => Err(BuilderError::InvalidArgument(format!(
                        "{name} takes at most one argument"
                    ))),
                };
            }
            "select" => {
                let cols = text_args(name, args)?;
                let cols: Vec<&str> = cols.iter().map(String::as_str).collect();
                return Ok(self.select(&cols));
            }
            "from" => {
                return match args {
                    [arg] => {
                        let from = text_arg(name, arg)?;
                        Ok(self.from(&from))
                    }
                    _ => Err(BuilderError::InvalidArgument(format!(
                        "{name} takes exactly one argument"
                    ))),
                };
            }
            "join" => return self.call_join(name, args),
            "limit" | "top" => return self.call_limit(name, args),
            _ => {}
        }

        let by_clause = key
            .strip_suffix("by")
            .and_then(Clause::from_name)
            .filter(|c| matches!(c, Clause::Order | Clause::Group));
        if let Some(clause) = by_clause {
            let cols = text_args(name, args)?;
            let cols: Vec<&str> = cols.iter().map(String::as_str).collect();
            return Ok(match clause {
                Clause::Order => self.order_by(&cols),
                _ => self.group_by(&cols),
            });
        }

        Err(BuilderError::UnknownCall(name.to_string()))
    }

    fn call_condition(&mut self, op: Op, name: &str, args: &[Arg]) -> Result<&mut Self, BuilderError> {
        let operand_count = usize::from(op.shape() != Shape::Unary);
        if args.is_empty() || args.len() > operand_count + 2 {
            return Err(BuilderError::InvalidArgument(format!(
                "{name} expects a field, {operand_count} operand(s) and an optional connective"
            )));
        }

        let field = match &args[0] {
            Arg::One(Value::Text(field)) => field.clone(),
            _ => {
                return Err(BuilderError::InvalidArgument(format!(
                    "{name}: first argument must be a field name"
                )));
            }
        };

        let operand = if operand_count == 1 {
            args.get(1).cloned().ok_or_else(|| {
                BuilderError::InvalidArgument(format!("{name}: missing operand"))
            })?
        } else {
            Arg::None
        };

        let connective = match args.get(operand_count + 1) {
            None => Connective::And,
            Some(arg) => Connective::from_arg(&text_arg(name, arg)?),
        };

        op.check(&operand)?;
        Ok(self.condition(Clause::Where, &field, op, operand, connective))
    }

    fn call_join(&mut self, name: &str, args: &[Arg]) -> Result<&mut Self, BuilderError> {
        let (table, on, kind) = match args {
            [table, on] => (text_arg(name, table)?, text_arg(name, on)?, JoinKind::Left),
            [table, on, kind] => {
                let kind_text = text_arg(name, kind)?;
                let kind = JoinKind::from_arg(&kind_text).ok_or_else(|| {
                    BuilderError::InvalidArgument(format!("{name}: unknown join kind '{kind_text}'"))
                })?;
                (text_arg(name, table)?, text_arg(name, on)?, kind)
            }
            _ => {
                return Err(BuilderError::InvalidArgument(format!(
                    "{name} expects (table, on, kind?)"
                )));
            }
        };
        Ok(self.join(&table, &on, kind))
    }

    fn call_limit(&mut self, name: &str, args: &[Arg]) -> Result<&mut Self, BuilderError> {
        let count = |arg: &Arg| match arg {
            Arg::One(Value::Int(n)) if *n >= 0 => Ok(n.unsigned_abs()),
            _ => Err(BuilderError::InvalidArgument(format!(
                "{name} expects non-negative integers"
            ))),
        };
        match args {
            [n] => Ok(self.limit(count(n)?)),
            [n, offset] => Ok(self.limit_offset(count(n)?, count(offset)?)),
            _ => Err(BuilderError::InvalidArgument(format!(
                "{name} expects (count, offset?)"
            ))),
        }
    }
}

fn text_arg(name: &str, arg: &Arg) -> Result<String, BuilderError> {
    match arg {
        Arg::One(Value::Null) | Arg::None | Arg::Many(_) => Err(BuilderError::InvalidArgument(
            format!("{name} expects plain values"),
        )),
        Arg::One(value) => Ok(value.to_string()),
    }
}

fn text_args(name: &str, args: &[Arg]) -> Result<Vec<String>, BuilderError> {
    if args.is_empty() {
        return Err(BuilderError::InvalidArgument(format!(
            "{name} expects at least one argument"
        )));
    }
    args.iter().map(|arg| text_arg(name, arg)).collect()
}
