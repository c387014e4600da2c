//! Core types and traits for SQLRel.
//!
//! `sqlrel-core` is the foundation layer of the workspace. It defines the
//! relation descriptors that the compiler walks, the row and value types the
//! mapper consumes, and the validation rules that guard every SQL fragment.
//!
//! # Role In The Architecture
//!
//! - **Declarations**: [`RelationSpec`], [`Relation`] and [`RelationBuilder`]
//!   describe BelongsTo/HasMany relations once, at schema registration.
//! - **Data model**: [`Row`], [`FieldValue`] and [`Value`] carry query results
//!   using the `alias__field` column naming convention.
//! - **Safety**: [`validate`] rejects reserved keywords, comment markers and
//!   malformed identifiers before anything reaches SQL text.
//! - **Execution seam**: [`QueryExecutor`] is implemented by drivers and uses
//!   asupersync's `Cx`/`Outcome` for cancel-correct async.
//!
//! `sqlrel-query` compiles declarations into SQL, `sqlrel-mapper` turns rows
//! back into entities, and the `sqlrel` facade ties them to an executor.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod builder;
pub mod error;
pub mod executor;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod validate;
pub mod value;

pub use builder::RelationBuilder;
pub use error::{
    ConfigError, ConfigErrorKind, DecodeError, Error, MappingError, QueryError, QueryErrorKind,
    Result, ValidationError, ValidationErrorKind,
};
pub use executor::QueryExecutor;
pub use relationship::{
    Attach, EntityMapper, JoinKind, ManualRelation, Relation, RelationBinding, RelationKind,
    RelationSpec, mapped_binding, specs,
};
pub use row::{FieldValue, Row};
pub use schema::{SchemaDef, TableSchema};
pub use value::Value;
