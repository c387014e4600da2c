//! Schema descriptions consumed by the relation compiler.
//!
//! The compiler never sees concrete record types. It only needs a table name,
//! the ordered list of column names, and (optionally) the relations that the
//! record type itself declares. [`TableSchema`] is that narrow capability.

use std::fmt;
use std::sync::Arc;

use crate::relationship::RelationSpec;

/// Table/collection metadata for one record type.
pub trait TableSchema: Send + Sync {
    /// Table name, optionally schema-qualified (`insurance.persons`).
    fn table_name(&self) -> &str;

    /// Column names in SELECT order.
    fn field_names(&self) -> Vec<String>;

    /// Relations declared on this record type.
    ///
    /// The compiler follows these to discover relations nested under a
    /// relation that targets this schema.
    fn relations(&self) -> Vec<Arc<RelationSpec>> {
        Vec::new()
    }
}

impl fmt::Debug for dyn TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSchema")
            .field("table", &self.table_name())
            .field("fields", &self.field_names())
            .finish()
    }
}

/// A schema described at runtime.
///
/// Useful for record types without a hand-written [`TableSchema`] impl and in
/// tests.
///
/// # Example
///
/// ```
/// use sqlrel_core::schema::{SchemaDef, TableSchema};
///
/// let roles = SchemaDef::new("roles", ["id", "name"]);
/// assert_eq!(roles.table_name(), "roles");
/// assert_eq!(roles.field_names(), vec!["id", "name"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaDef {
    table_name: String,
    fields: Vec<String>,
    relations: Vec<Arc<RelationSpec>>,
}

impl SchemaDef {
    /// Create a schema with the given table name and ordered fields.
    pub fn new<I, S>(table_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table_name: table_name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            relations: Vec::new(),
        }
    }

    /// Declare the relations of this record type.
    pub fn with_relations<I>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = Arc<RelationSpec>>,
    {
        self.relations = relations.into_iter().collect();
        self
    }

    /// Append a single field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    /// Wrap in an `Arc` for use as a relation target.
    pub fn shared(self) -> Arc<dyn TableSchema> {
        Arc::new(self)
    }
}

impl TableSchema for SchemaDef {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.clone()
    }

    fn relations(&self) -> Vec<Arc<RelationSpec>> {
        self.relations.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_def_builder() {
        let s = SchemaDef::new("vehicle_types", ["id"]).field("name");
        assert_eq!(s.table_name(), "vehicle_types");
        assert_eq!(s.field_names(), vec!["id", "name"]);
        assert!(s.relations().is_empty());
    }

    #[test]
    fn test_debug_for_trait_object() {
        let s: Arc<dyn TableSchema> = SchemaDef::new("roles", ["id"]).shared();
        let dbg = format!("{:?}", s);
        assert!(dbg.contains("roles"));
    }
}
