//! Error types for pgrecord

use thiserror::Error;

/// Result type alias for pgrecord operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Errors raised by the query builder surface.
///
/// These are caller mistakes and are always reported, never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    /// A dynamic call name matched neither the condition table, the clause
    /// table nor an executor operation.
    #[error("Unknown call: {0}")]
    UnknownCall(String),

    /// A relation name that the entity does not declare.
    #[error("Relation '{name}' not found on '{entity}'")]
    UnknownRelation { entity: String, name: String },

    /// A condition received an operand of the wrong shape (e.g. BETWEEN with one value).
    #[error("Operator {op} expects {expected}")]
    OperandShape { op: &'static str, expected: &'static str },

    /// A dynamic call received arguments it cannot interpret.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The primary key is required but has no value.
    #[error("Missing primary key value for '{0}'")]
    MissingPrimaryKey(String),
}

/// Error types for database operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Builder misuse
    #[error(transparent)]
    Builder(#[from] BuilderError),

    /// The backend rejected a statement (syntax, constraint, type mismatch)
    #[error("Statement error: {0}")]
    Statement(String),

    /// Connection lost and every reconnect attempt was used up
    #[error("Fatal connection error after {attempts} attempts: {message}")]
    FatalConnection { attempts: u32, message: String },

    /// Transaction begun twice, or begun while the connection is unreachable
    #[error("Transaction misuse: {0}")]
    TransactionMisuse(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this is a builder error
    pub fn is_builder(&self) -> bool {
        matches!(self, Self::Builder(_))
    }

    /// Check if this is a fatal connection error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConnection { .. })
    }

    /// Check if this is a decode error
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Check if this is a statement error
    pub fn is_statement(&self) -> bool {
        matches!(self, Self::Statement(_))
    }
}
