//! SQLRel: declarative relations, one query per fetch.
//!
//! Relations are declared once per entity type. BelongsTo relations become
//! JOINs whose columns are prefixed with the relation's alias chain
//! (`vt__vg__name`); HasMany relations become correlated `JSON_AGG`
//! subqueries returned in a single `alias__json` column. The rows that come
//! back are assembled into nested entities without ever issuing a second
//! query.
//!
//! # Crates
//!
//! - `sqlrel-core`: values, rows, relation declarations, validation, errors
//!   and the [`QueryExecutor`] seam.
//! - `sqlrel-query`: the relation graph compiler and statement builder.
//! - `sqlrel-mapper`: the recursive row assembler.
//! - `sqlrel` (this crate): [`Repository`] and the [`prelude`].
//!
//! # Example
//!
//! ```
//! use sqlrel::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Role {
//!     name: String,
//! }
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i64,
//!     role: Option<Role>,
//! }
//!
//! let roles = SchemaDef::new("roles", ["id", "name"]).shared();
//! let role_mapper = std::sync::Arc::new(|cells: &[FieldValue]| -> Result<Role> {
//!     let name = find_value(cells, "name").and_then(Value::as_str).unwrap_or_default();
//!     Ok(Role { name: name.to_string() })
//! });
//! let relations = RelationBuilder::<User>::new()
//!     .belongs_to("r", roles)
//!     .local_key("role_id")
//!     .entity_field("role")
//!     .join(JoinKind::Inner)
//!     .map_with(role_mapper, |u: User, r: Role| User { role: Some(r), ..u })
//!     .build()
//!     .unwrap();
//!
//! let users = SchemaDef::new("users", ["id", "role_id"]);
//! let repo = Repository::compile(
//!     &users,
//!     relations,
//!     |cells: &[FieldValue]| -> Result<User> {
//!         let id = find_value(cells, "id").and_then(Value::as_i64).unwrap_or_default();
//!         Ok(User { id, role: None })
//!     },
//!     &CompilerConfig::default(),
//! )
//! .unwrap();
//!
//! let (sql, _) = repo.select().build_list().unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT users.*, r.id AS r__id, r.name AS r__name FROM users \
//!      INNER JOIN roles r ON users.role_id = r.id"
//! );
//! ```

pub mod repository;

pub use repository::Repository;

pub use sqlrel_core::{
    Attach, ConfigError, ConfigErrorKind, Cx, DecodeError, EntityMapper, Error, FieldValue,
    JoinKind, ManualRelation, MappingError, Outcome, QueryError, QueryErrorKind, QueryExecutor,
    Relation, RelationBinding, RelationBuilder, RelationKind, RelationSpec, Result, Row, SchemaDef,
    TableSchema, ValidationError, ValidationErrorKind, Value, mapped_binding, specs,
};
pub use sqlrel_core::{row, validate};
pub use sqlrel_mapper::{ChildErrorPolicy, MapperConfig, RelationMapper, decode_has_many};
pub use sqlrel_query::{
    CompiledRelation, CompilerConfig, EMPTY_JSON_ARRAY, Filter, FilterOp, FindParams, JoinClause,
    JoinOptions, RelationGraph, SelectQuery, SortBy, SortDirection, merge,
};

/// Everything needed to declare relations, build a repository and run it.
pub mod prelude {
    pub use crate::Repository;
    pub use sqlrel_core::row::{extract_own, extract_prefixed, find_value};
    pub use sqlrel_core::{
        Cx, EntityMapper, Error, FieldValue, JoinKind, ManualRelation, Outcome, QueryExecutor,
        Relation, RelationBuilder, RelationKind, RelationSpec, Result, Row, SchemaDef, TableSchema,
        Value,
    };
    pub use sqlrel_mapper::{ChildErrorPolicy, MapperConfig, RelationMapper};
    pub use sqlrel_query::{
        CompilerConfig, Filter, FindParams, JoinClause, JoinOptions, RelationGraph, SelectQuery,
        SortBy, SortDirection,
    };
}
