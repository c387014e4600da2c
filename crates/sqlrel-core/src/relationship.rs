//! Relation descriptors.
//!
//! A relation is declared once, when a schema is registered, and is immutable
//! afterwards. The SQL-facing half of a declaration ([`RelationSpec`]) is
//! untyped so that relations to different record types can live in one list
//! and be walked recursively by the compiler. The entity-facing half
//! ([`RelationBinding`]) erases the child type behind a closure: it maps the
//! child's cells and returns a function that folds the child into its parent.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigErrorKind, Error, Result};
use crate::row::{FieldValue, object_cells};
use crate::schema::TableSchema;
use crate::validate;

/// Default remote key when none is declared.
pub const DEFAULT_REMOTE_KEY: &str = "id";

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Many-to-one: the foreign key lives on this table. Compiled to a JOIN.
    #[default]
    BelongsTo,
    /// One-to-many: the foreign key lives on the related table. Compiled to a
    /// correlated JSON aggregation subquery, never a JOIN.
    HasMany,
}

/// SQL join flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    /// Tolerates a missing match; the default.
    #[default]
    Left,
    Right,
}

impl JoinKind {
    /// The SQL keyword for this join.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Hand-specified target for a table without a declared schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualRelation {
    pub table: String,
    /// Plain column names, or expressions carrying their own ` AS alias`.
    pub columns: Vec<String>,
}

impl ManualRelation {
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// The SQL-facing declaration of one relationship.
#[derive(Debug, Clone)]
pub struct RelationSpec {
    kind: RelationKind,
    alias: String,
    local_key: String,
    remote_key: String,
    join: JoinKind,
    through: Option<String>,
    entity_field: Option<String>,
    schema: Option<Arc<dyn TableSchema>>,
    manual: Option<ManualRelation>,
}

impl RelationSpec {
    /// Create a relation of the given kind. The target is attached separately.
    pub fn new(kind: RelationKind, alias: impl Into<String>) -> Self {
        Self {
            kind,
            alias: alias.into(),
            local_key: String::new(),
            remote_key: DEFAULT_REMOTE_KEY.to_string(),
            join: JoinKind::default(),
            through: None,
            entity_field: None,
            schema: None,
            manual: None,
        }
    }

    /// Many-to-one relation to a schema.
    pub fn belongs_to(alias: impl Into<String>, schema: Arc<dyn TableSchema>) -> Self {
        Self::new(RelationKind::BelongsTo, alias).schema(schema)
    }

    /// One-to-many relation to a schema.
    pub fn has_many(alias: impl Into<String>, schema: Arc<dyn TableSchema>) -> Self {
        Self::new(RelationKind::HasMany, alias).schema(schema)
    }

    /// Many-to-one relation to a table with no declared schema.
    pub fn manual(alias: impl Into<String>, manual: ManualRelation) -> Self {
        let mut spec = Self::new(RelationKind::BelongsTo, alias);
        spec.manual = Some(manual);
        spec
    }

    /// Set the foreign key column on this table (or on the `through` anchor).
    pub fn local_key(mut self, key: impl Into<String>) -> Self {
        self.local_key = key.into();
        self
    }

    /// Set the key column on the related table. Empty resets to `id`.
    pub fn remote_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.remote_key = if key.is_empty() {
            DEFAULT_REMOTE_KEY.to_string()
        } else {
            key
        };
        self
    }

    pub fn join(mut self, join: JoinKind) -> Self {
        self.join = join;
        self
    }

    /// Anchor this relation on an ancestor relation instead of the root table.
    pub fn through(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.through = (!alias.is_empty()).then_some(alias);
        self
    }

    /// Logical name of the field the child is attached to.
    pub fn entity_field(mut self, name: impl Into<String>) -> Self {
        self.entity_field = Some(name.into());
        self
    }

    /// Set the related schema.
    pub fn schema(mut self, schema: Arc<dyn TableSchema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set a manual table/columns override.
    pub fn with_manual(mut self, manual: ManualRelation) -> Self {
        self.manual = Some(manual);
        self
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn is_has_many(&self) -> bool {
        self.kind == RelationKind::HasMany
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn local_key_name(&self) -> &str {
        &self.local_key
    }

    pub fn remote_key_name(&self) -> &str {
        &self.remote_key
    }

    pub fn join_kind(&self) -> JoinKind {
        self.join
    }

    pub fn through_alias(&self) -> Option<&str> {
        self.through.as_deref()
    }

    pub fn entity_field_name(&self) -> Option<&str> {
        self.entity_field.as_deref()
    }

    pub fn related_schema(&self) -> Option<&Arc<dyn TableSchema>> {
        self.schema.as_ref()
    }

    pub fn manual_override(&self) -> Option<&ManualRelation> {
        self.manual.as_ref()
    }

    /// Related table name from the schema or the manual override.
    pub fn table_name(&self) -> &str {
        match (&self.schema, &self.manual) {
            (Some(schema), _) => schema.table_name(),
            (None, Some(manual)) => &manual.table,
            (None, None) => "",
        }
    }

    /// Relations declared on the related schema (empty for manual relations).
    pub fn nested_relations(&self) -> Vec<Arc<RelationSpec>> {
        self.schema
            .as_ref()
            .map(|s| s.relations())
            .unwrap_or_default()
    }

    /// Check that the declaration is complete and every identifier is safe to
    /// splice into SQL.
    pub fn validate(&self) -> Result<()> {
        let alias = self.alias.as_str();
        if alias.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::MissingAlias,
                "",
                "relation alias is required",
            ));
        }
        if self.local_key.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::MissingLocalKey,
                alias,
                "local key is required",
            ));
        }
        match (&self.schema, &self.manual) {
            (None, None) => {
                return Err(Error::config(
                    ConfigErrorKind::MissingTarget,
                    alias,
                    "either a related schema or a manual table override is required",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(Error::config(
                    ConfigErrorKind::AmbiguousTarget,
                    alias,
                    "a relation cannot have both a related schema and a manual override",
                ));
            }
            (Some(_), None) if self.entity_field.as_deref().is_none_or(str::is_empty) => {
                return Err(Error::config(
                    ConfigErrorKind::MissingEntityField,
                    alias,
                    "entity field name is required for schema-backed relations",
                ));
            }
            _ => {}
        }
        if self.table_name().is_empty() {
            return Err(Error::config(
                ConfigErrorKind::MissingTable,
                alias,
                "related table name is required",
            ));
        }
        if self.manual.is_some() && self.is_has_many() {
            return Err(Error::config(
                ConfigErrorKind::AmbiguousTarget,
                alias,
                "manual overrides are only supported for belongs-to relations",
            ));
        }

        let invalid = |e: Error| Error::config(ConfigErrorKind::InvalidIdentifier, alias, e.to_string());
        if alias.contains('.') {
            return Err(Error::config(
                ConfigErrorKind::InvalidIdentifier,
                alias,
                "alias must be a plain identifier",
            ));
        }
        validate::validate_identifier(alias, "alias").map_err(invalid)?;
        validate::validate_identifier(&self.local_key, "local key").map_err(invalid)?;
        validate::validate_identifier(&self.remote_key, "remote key").map_err(invalid)?;
        validate::validate_identifier(self.table_name(), "table").map_err(invalid)?;
        if let Some(through) = &self.through {
            validate::validate_identifier(through, "through alias").map_err(invalid)?;
        }
        if let Some(schema) = &self.schema {
            for field in schema.field_names() {
                validate::validate_identifier(&field, "field").map_err(invalid)?;
            }
        }
        if let Some(manual) = &self.manual {
            validate::validate_select_columns(&manual.columns).map_err(invalid)?;
        }
        Ok(())
    }
}

/// Maps a flat slice of cells into one entity.
///
/// Implemented by leaf mapping functions and by the recursive relation mapper.
pub trait EntityMapper<E>: Send + Sync {
    /// Map the cells of one record (already stripped of its relation prefix).
    fn map_entity(&self, cells: &[FieldValue]) -> Result<E>;

    /// Map one element of an aggregated HasMany array.
    ///
    /// The default treats every key of the JSON object as a plain cell.
    fn map_json(&self, item: &serde_json::Value) -> Result<E> {
        self.map_entity(&object_cells(item)?)
    }
}

impl<E, F> EntityMapper<E> for F
where
    F: Fn(&[FieldValue]) -> Result<E> + Send + Sync,
{
    fn map_entity(&self, cells: &[FieldValue]) -> Result<E> {
        self(cells)
    }
}

/// Deferred attachment of an already-mapped child to its parent.
pub type Attach<P> = Box<dyn FnOnce(P) -> P>;

/// Type-erased entity side of a relation on parent type `P`.
pub trait RelationBinding<P>: Send + Sync {
    /// Map the child from its sliced cells.
    fn bind_cells(&self, cells: &[FieldValue]) -> Result<Attach<P>>;

    /// Map the child from one aggregated JSON element.
    fn bind_json(&self, item: &serde_json::Value) -> Result<Attach<P>>;
}

/// Binding from a child mapper plus a pure attach function.
struct MappedBinding<P, C> {
    mapper: Arc<dyn EntityMapper<C>>,
    attach: Arc<dyn Fn(P, C) -> P + Send + Sync>,
}

impl<P: 'static, C: 'static> MappedBinding<P, C> {
    fn defer(&self, child: C) -> Attach<P> {
        let attach = Arc::clone(&self.attach);
        Box::new(move |parent| attach(parent, child))
    }
}

impl<P: 'static, C: 'static> RelationBinding<P> for MappedBinding<P, C> {
    fn bind_cells(&self, cells: &[FieldValue]) -> Result<Attach<P>> {
        let child = self.mapper.map_entity(cells)?;
        Ok(self.defer(child))
    }

    fn bind_json(&self, item: &serde_json::Value) -> Result<Attach<P>> {
        let child = self.mapper.map_json(item)?;
        Ok(self.defer(child))
    }
}

/// Binding that maps the child with `mapper` and folds it in with `attach`.
pub fn mapped_binding<P, C, M, F>(mapper: Arc<M>, attach: F) -> Arc<dyn RelationBinding<P>>
where
    P: 'static,
    C: 'static,
    M: EntityMapper<C> + 'static,
    F: Fn(P, C) -> P + Send + Sync + 'static,
{
    let mapper: Arc<dyn EntityMapper<C>> = mapper;
    Arc::new(MappedBinding {
        mapper,
        attach: Arc::new(attach),
    })
}

/// A relation on parent entity type `P`: the SQL declaration plus an
/// optional binding used when assembling results.
pub struct Relation<P> {
    spec: Arc<RelationSpec>,
    binding: Option<Arc<dyn RelationBinding<P>>>,
}

impl<P> Clone for Relation<P> {
    fn clone(&self) -> Self {
        Self {
            spec: Arc::clone(&self.spec),
            binding: self.binding.clone(),
        }
    }
}

impl<P> fmt::Debug for Relation<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("spec", &self.spec)
            .field("bound", &self.binding.is_some())
            .finish()
    }
}

impl<P: 'static> Relation<P> {
    /// A relation used only for SQL generation.
    pub fn unbound(spec: RelationSpec) -> Self {
        Self {
            spec: Arc::new(spec),
            binding: None,
        }
    }

    /// A relation whose child is mapped by `mapper` and folded in by `attach`.
    pub fn bound<C, M, F>(spec: RelationSpec, mapper: Arc<M>, attach: F) -> Self
    where
        C: 'static,
        M: EntityMapper<C> + 'static,
        F: Fn(P, C) -> P + Send + Sync + 'static,
    {
        Self::with_binding(spec, mapped_binding(mapper, attach))
    }

    /// Attach a custom binding.
    pub fn with_binding(spec: RelationSpec, binding: Arc<dyn RelationBinding<P>>) -> Self {
        Self {
            spec: Arc::new(spec),
            binding: Some(binding),
        }
    }
}

impl<P> Relation<P> {
    pub fn spec(&self) -> &Arc<RelationSpec> {
        &self.spec
    }

    pub fn alias(&self) -> &str {
        self.spec.alias()
    }

    pub fn binding(&self) -> Option<&dyn RelationBinding<P>> {
        self.binding.as_deref()
    }
}

/// The SQL declarations of a list of relations, for [`TableSchema::relations`].
pub fn specs<P>(relations: &[Relation<P>]) -> Vec<Arc<RelationSpec>> {
    relations.iter().map(|r| Arc::clone(&r.spec)).collect()
}
