//! Fluent relation declarations.
//!
//! ```
//! use sqlrel_core::builder::RelationBuilder;
//! use sqlrel_core::relationship::JoinKind;
//! use sqlrel_core::schema::SchemaDef;
//!
//! let roles = SchemaDef::new("roles", ["id", "name"]).shared();
//! let relations = RelationBuilder::<()>::new()
//!     .belongs_to("r", roles)
//!     .local_key("role_id")
//!     .entity_field("role")
//!     .join(JoinKind::Inner)
//!     .build()
//!     .unwrap();
//! assert_eq!(relations[0].alias(), "r");
//! ```

use std::sync::Arc;

use crate::error::{ConfigErrorKind, Error, Result};
use crate::relationship::{
    EntityMapper, JoinKind, ManualRelation, Relation, RelationBinding, RelationKind, RelationSpec,
    mapped_binding,
};
use crate::schema::TableSchema;

struct Pending<P> {
    spec: RelationSpec,
    binding: Option<Arc<dyn RelationBinding<P>>>,
}

/// Declares the relations of parent type `P`.
///
/// `belongs_to`, `has_many` and `belongs_to_table` start a new relation; the
/// other setters modify the most recently started one. Every declaration is
/// validated by [`build`](Self::build).
pub struct RelationBuilder<P> {
    pending: Vec<Pending<P>>,
    misuse: Option<String>,
}

impl<P: 'static> Default for RelationBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static> RelationBuilder<P> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            misuse: None,
        }
    }

    fn start(mut self, spec: RelationSpec) -> Self {
        self.pending.push(Pending {
            spec,
            binding: None,
        });
        self
    }

    fn modify(mut self, setter: &str, f: impl FnOnce(RelationSpec) -> RelationSpec) -> Self {
        match self.pending.pop() {
            Some(mut last) => {
                last.spec = f(last.spec);
                self.pending.push(last);
            }
            None => {
                self.misuse
                    .get_or_insert_with(|| format!("{setter} called before declaring a relation"));
            }
        }
        self
    }

    /// Start a many-to-one relation.
    pub fn belongs_to(self, alias: impl Into<String>, schema: Arc<dyn TableSchema>) -> Self {
        self.start(RelationSpec::belongs_to(alias, schema))
    }

    /// Start a one-to-many relation.
    pub fn has_many(self, alias: impl Into<String>, schema: Arc<dyn TableSchema>) -> Self {
        self.start(RelationSpec::has_many(alias, schema))
    }

    /// Start a many-to-one relation to a table with no declared schema.
    pub fn belongs_to_table<I, S>(self, alias: impl Into<String>, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start(RelationSpec::manual(alias, ManualRelation::new(table, columns)))
    }

    pub fn local_key(self, key: impl Into<String>) -> Self {
        self.modify("local_key", |s| s.local_key(key))
    }

    pub fn remote_key(self, key: impl Into<String>) -> Self {
        self.modify("remote_key", |s| s.remote_key(key))
    }

    pub fn join(self, join: JoinKind) -> Self {
        self.modify("join", |s| s.join(join))
    }

    pub fn through(self, alias: impl Into<String>) -> Self {
        self.modify("through", |s| s.through(alias))
    }

    pub fn entity_field(self, name: impl Into<String>) -> Self {
        self.modify("entity_field", |s| s.entity_field(name))
    }

    /// Map the child with `mapper` and fold it into the parent with `attach`.
    pub fn map_with<C, M, F>(mut self, mapper: Arc<M>, attach: F) -> Self
    where
        C: 'static,
        M: EntityMapper<C> + 'static,
        F: Fn(P, C) -> P + Send + Sync + 'static,
    {
        match self.pending.last_mut() {
            Some(last) => last.binding = Some(mapped_binding(mapper, attach)),
            None => {
                self.misuse
                    .get_or_insert_with(|| "map_with called before declaring a relation".to_string());
            }
        }
        self
    }

    /// Validate every declaration and freeze it.
    pub fn build(self) -> Result<Vec<Relation<P>>> {
        if let Some(message) = self.misuse {
            return Err(Error::config(ConfigErrorKind::BuilderMisuse, "", message));
        }
        self.pending
            .into_iter()
            .map(|p| {
                p.spec.validate()?;
                Ok(match p.binding {
                    Some(binding) => Relation::with_binding(p.spec, binding),
                    None => Relation::unbound(p.spec),
                })
            })
            .collect()
    }

    /// Number of relations declared so far.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Kind of the most recently started relation.
    pub fn last_kind(&self) -> Option<RelationKind> {
        self.pending.last().map(|p| p.spec.kind())
    }
}
