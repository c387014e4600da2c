//! Error types for SQLRel.
//!
//! Every fallible operation in the workspace returns [`Error`]. The variants
//! follow the lifecycle of a query: declarations are checked first
//! ([`Error::Config`]), hand-written fragments next ([`Error::Validation`]),
//! then execution ([`Error::Query`]) and finally row assembly
//! ([`Error::Mapping`], [`Error::Decode`]).

use std::error::Error as StdError;
use std::fmt;

/// Result type alias used across SQLRel.
pub type Result<T> = std::result::Result<T, Error>;

/// The top-level error type.
#[derive(Debug)]
pub enum Error {
    /// A relation declaration is incomplete or inconsistent.
    Config(ConfigError),
    /// A SQL fragment failed the security or structural checks.
    Validation(ValidationError),
    /// A child mapper failed while assembling a relation.
    Mapping(MappingError),
    /// An aggregated JSON column could not be decoded.
    Decode(DecodeError),
    /// The query executor reported a failure or an unexpected result.
    Query(QueryError),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(kind: ConfigErrorKind, alias: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            alias: alias.into(),
            message: message.into(),
        })
    }

    /// Shorthand for a fragment validation error.
    pub fn validation(
        kind: ValidationErrorKind,
        fragment: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation(ValidationError {
            kind,
            fragment: fragment.into(),
            message: message.into(),
        })
    }

    /// Shorthand for a query error without SQL context.
    pub fn query(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind,
            message: message.into(),
            sql: None,
        })
    }

    /// Wrap a child failure with the alias of the relation being assembled.
    pub fn mapping(alias: impl Into<String>, source: Error) -> Self {
        Error::Mapping(MappingError {
            alias: alias.into(),
            source: Box::new(source),
        })
    }

    /// Shorthand for a decode error.
    pub fn decode(
        column: impl Into<String>,
        message: impl Into<String>,
        source: Option<serde_json::Error>,
    ) -> Self {
        Error::Decode(DecodeError {
            column: column.into(),
            message: message.into(),
            source,
        })
    }

    /// Returns `true` if this error was raised by the injection scan.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Error::Validation(ValidationError {
                kind: ValidationErrorKind::Security,
                ..
            })
        )
    }

    /// Returns `true` if this is a "no rows" query error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Query(QueryError {
                kind: QueryErrorKind::NotFound,
                ..
            })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "configuration error: {}", e),
            Error::Validation(e) => write!(f, "validation error: {}", e),
            Error::Mapping(e) => write!(f, "mapping error: {}", e),
            Error::Decode(e) => write!(f, "decode error: {}", e),
            Error::Query(e) => write!(f, "query error: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Mapping(e) => Some(e.source.as_ref()),
            Error::Decode(e) => e.source.as_ref().map(|s| s as &(dyn StdError + 'static)),
            _ => None,
        }
    }
}

/// Why a relation declaration was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The alias is empty.
    MissingAlias,
    /// The local key is empty.
    MissingLocalKey,
    /// The related table name is empty.
    MissingTable,
    /// Neither a related schema nor a manual override was given.
    MissingTarget,
    /// Both a related schema and a manual override were given.
    AmbiguousTarget,
    /// A schema-backed relation has no entity field name.
    MissingEntityField,
    /// An identifier failed the fragment checks.
    InvalidIdentifier,
    /// Two relations in the same SQL scope share an alias.
    DuplicateAlias,
    /// A `through` anchor names no known relation.
    UnknownThrough,
    /// `through` pointers form a cycle.
    CyclicThrough,
    /// Nested relations exceed the configured depth.
    DepthExceeded,
    /// A builder setter was called before any relation was started.
    BuilderMisuse,
    /// A mapping binding was attached to a relation assembled from its
    /// HasMany anchor's JSON, where only the anchor's child mapper sees it.
    AbsorbedBinding,
}

/// A rejected relation declaration.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    /// Alias of the offending relation (may be empty when the alias itself is missing).
    pub alias: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alias.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "relation {:?}: {}", self.alias, self.message)
        }
    }
}

/// Which check a fragment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A required fragment is empty.
    Empty,
    /// A reserved keyword or comment/terminator literal was found.
    Security,
    /// The fragment does not match the identifier whitelist.
    Structural,
    /// A filter or sort column is not a field of the root schema.
    UnknownField,
}

/// A rejected SQL fragment.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub fragment: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.message, self.fragment)
    }
}

/// A child mapper failure, tagged with the relation it belongs to.
#[derive(Debug)]
pub struct MappingError {
    pub alias: String,
    pub source: Box<Error>,
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relation {:?}: {}", self.alias, self.source)
    }
}

/// Malformed aggregated JSON.
#[derive(Debug)]
pub struct DecodeError {
    pub column: String,
    pub message: String,
    pub source: Option<serde_json::Error>,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column {:?}: {}", self.column, self.message)
    }
}

/// Kind of executor-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The database rejected the statement.
    Database,
    /// A point lookup matched no row.
    NotFound,
    /// The result set did not have the expected shape.
    UnexpectedResult,
}

/// A failure at the query execution boundary.
#[derive(Debug, Clone)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    pub sql: Option<String>,
}

impl QueryError {
    /// Attach the SQL text that produced this error.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "{} (sql: {})", self.message, sql),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_names_alias() {
        let err = Error::config(ConfigErrorKind::MissingLocalKey, "vt", "local key is required");
        assert_eq!(
            err.to_string(),
            "configuration error: relation \"vt\": local key is required"
        );
    }

    #[test]
    fn test_mapping_error_exposes_source() {
        let inner = Error::query(QueryErrorKind::UnexpectedResult, "bad row");
        let err = Error::Mapping(MappingError {
            alias: "r".to_string(),
            source: Box::new(inner),
        });
        assert!(err.source().is_some());
        assert!(err.to_string().contains("\"r\""));
    }

    #[test]
    fn test_kind_predicates() {
        let sec = Error::validation(ValidationErrorKind::Security, "a;b", "dangerous literal");
        assert!(sec.is_security());
        assert!(!sec.is_not_found());

        let nf = Error::query(QueryErrorKind::NotFound, "entity not found");
        assert!(nf.is_not_found());
    }
}
