//! Dynamic column values.
//!
//! [`Value`] is what records store per field and what the parameter table binds.
//! It converts to and from the PostgreSQL wire format so it can travel through
//! `tokio-postgres` unchanged.

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::net::IpAddr;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// A single dynamically-typed SQL value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Uuid(Uuid),
    Inet(IpAddr),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    Interval(Interval),
    /// One-dimensional array; elements may be `Null`.
    Array(Vec<Value>),
}

/// PostgreSQL `interval`, kept in the server's own three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl Interval {
    pub fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.microseconds < 0 { "-" } else { "" };
        let micros = self.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        write!(
            f,
            "{} mons {} days {sign}{:02}:{:02}:{:02}",
            self.months,
            self.days,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        )?;
        match micros % 1_000_000 {
            0 => Ok(()),
            frac => write!(f, ".{frac:06}"),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Numeric(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => {
                f.write_str("\\x")?;
                v.iter().try_for_each(|b| write!(f, "{b:02x}"))
            }
            Value::Json(v) => write!(f, "{v}"),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::Inet(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{v}"),
            Value::Time(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Interval(v) => write!(f, "{v}"),
            Value::Array(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::from(*v).to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::try_from(*v)?.to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Numeric(v) => v.to_sql(ty, out),
            Value::Text(v) => {
                if <String as ToSql>::accepts(ty) {
                    v.to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    v.parse::<Decimal>()?.to_sql(ty, out)
                } else if *ty == Type::DATE {
                    v.parse::<NaiveDate>()?.to_sql(ty, out)
                } else if *ty == Type::INET {
                    v.parse::<IpAddr>()?.to_sql(ty, out)
                } else if *ty == Type::UUID {
                    v.parse::<Uuid>()?.to_sql(ty, out)
                } else {
                    Err(format!("cannot bind text to a {ty} parameter").into())
                }
            }
            Value::Bytes(v) => v.to_sql(ty, out),
            Value::Json(v) => v.to_sql(ty, out),
            Value::Uuid(v) => v.to_sql(ty, out),
            Value::Inet(v) => v.to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Time(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => {
                if *ty == Type::TIMESTAMP {
                    v.naive_utc().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Interval(v) => {
                if *ty != Type::INTERVAL {
                    return Err(format!("cannot bind an interval to a {ty} parameter").into());
                }
                out.put_i64(v.microseconds);
                out.put_i32(v.days);
                out.put_i32(v.months);
                Ok(IsNull::No)
            }
            Value::Array(items) => match ty.kind() {
                Kind::Array(_) => items.to_sql(ty, out),
                _ => Err(format!("cannot bind an array to a {ty} parameter").into()),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Column types [`Value`] can be read from.
fn decodable(ty: &Type) -> bool {
    match ty.kind() {
        Kind::Array(member) => decodable(member),
        Kind::Enum(_) => true,
        _ => [
            Type::BOOL,
            Type::INT2,
            Type::INT4,
            Type::INT8,
            Type::OID,
            Type::FLOAT4,
            Type::FLOAT8,
            Type::NUMERIC,
            Type::TEXT,
            Type::VARCHAR,
            Type::BPCHAR,
            Type::NAME,
            Type::UNKNOWN,
            Type::BYTEA,
            Type::JSON,
            Type::JSONB,
            Type::UUID,
            Type::INET,
            Type::DATE,
            Type::TIME,
            Type::TIMESTAMP,
            Type::TIMESTAMPTZ,
            Type::INTERVAL,
        ]
        .contains(ty),
    }
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        if let Kind::Array(_) = ty.kind() {
            return Ok(Value::Array(Vec::<Value>::from_sql(ty, raw)?));
        }
        if let Kind::Enum(_) = ty.kind() {
            return Ok(Value::Text(std::str::from_utf8(raw)?.to_string()));
        }

        let value = if *ty == Type::BOOL {
            Value::Bool(bool::from_sql(ty, raw)?)
        } else if *ty == Type::INT2 {
            Value::Int(i16::from_sql(ty, raw)?.into())
        } else if *ty == Type::INT4 {
            Value::Int(i32::from_sql(ty, raw)?.into())
        } else if *ty == Type::INT8 {
            Value::Int(i64::from_sql(ty, raw)?)
        } else if *ty == Type::OID {
            Value::Int(u32::from_sql(ty, raw)?.into())
        } else if *ty == Type::FLOAT4 {
            Value::Float(f32::from_sql(ty, raw)?.into())
        } else if *ty == Type::FLOAT8 {
            Value::Float(f64::from_sql(ty, raw)?)
        } else if *ty == Type::NUMERIC {
            Value::Numeric(Decimal::from_sql(ty, raw)?)
        } else if *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::BPCHAR
            || *ty == Type::NAME
            || *ty == Type::UNKNOWN
        {
            Value::Text(String::from_sql(ty, raw)?)
        } else if *ty == Type::BYTEA {
            Value::Bytes(Vec::<u8>::from_sql(ty, raw)?)
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            Value::Json(serde_json::Value::from_sql(ty, raw)?)
        } else if *ty == Type::UUID {
            Value::Uuid(Uuid::from_sql(ty, raw)?)
        } else if *ty == Type::INET {
            Value::Inet(IpAddr::from_sql(ty, raw)?)
        } else if *ty == Type::DATE {
            Value::Date(NaiveDate::from_sql(ty, raw)?)
        } else if *ty == Type::TIME {
            Value::Time(NaiveTime::from_sql(ty, raw)?)
        } else if *ty == Type::TIMESTAMPTZ {
            Value::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?)
        } else if *ty == Type::TIMESTAMP {
            Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?.and_utc())
        } else if *ty == Type::INTERVAL {
            let raw: &[u8; 16] = raw
                .try_into()
                .map_err(|_| format!("interval is 16 bytes, got {}", raw.len()))?;
            let (micros, rest) = raw.split_at(8);
            let (days, months) = rest.split_at(4);
            Value::Interval(Interval {
                months: i32::from_be_bytes(months.try_into()?),
                days: i32::from_be_bytes(days.try_into()?),
                microseconds: i64::from_be_bytes(micros.try_into()?),
            })
        } else {
            return Err(format!("unsupported column type {ty}").into());
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(ty: &Type) -> bool {
        decodable(ty)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v.into())
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! impl_from_variant {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

impl_from_variant!(
    bool => Bool,
    f64 => Float,
    Decimal => Numeric,
    String => Text,
    Vec<u8> => Bytes,
    serde_json::Value => Json,
    Uuid => Uuid,
    IpAddr => Inet,
    NaiveDate => Date,
    NaiveTime => Time,
    DateTime<Utc> => Timestamp,
    Interval => Interval,
);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
