//! Recursive assembly of flat rows into nested entities.
//!
//! A [`RelationMapper`] owns a leaf mapper for its own columns and the bound
//! relations of its entity type. Mapping one row:
//!
//! 1. the row's own (unprefixed) cells go to the leaf mapper;
//! 2. for each BelongsTo relation the `alias__` cells are sliced out with the
//!    prefix stripped; if the relation's own cells are all null the relation
//!    is skipped before anything beneath it is looked at, otherwise the child
//!    mapper (usually another `RelationMapper`) maps the slice;
//! 3. for each HasMany relation the `alias__json` cell is decoded and every
//!    element is mapped and attached in order.
//!
//! A relation declared with `through` still attaches to this entity, but its
//! columns carry the anchor's chain (`vt__vg__name`). Such relations are
//! registered with [`RelationMapper::with_prefix`] so the right cells are
//! sliced; `Repository::compile` does that from the compiled graph.
//!
//! HasMany elements are JSON objects shaped like the subquery's
//! `json_build_object`: own fields, nested BelongsTo relations as objects
//! under their alias, nested HasMany relations as arrays under their alias.
//! [`EntityMapper::map_json`] walks that shape with the same rules.

use std::collections::{HashMap, HashSet};

use sqlrel_core::error::{Error, Result};
use sqlrel_core::relationship::{Attach, EntityMapper, Relation};
use sqlrel_core::row::{
    FieldValue, Row, extract_own, extract_prefixed, find_value, json_column, own_cells_null,
};
use sqlrel_core::value::Value;

use crate::config::{ChildErrorPolicy, MapperConfig};
use crate::json::{decode_has_many, decode_json, json_own_null};

/// Maps rows of entity type `E` together with its relations.
pub struct RelationMapper<E> {
    leaf: Box<dyn EntityMapper<E>>,
    relations: Vec<Relation<E>>,
    prefixes: HashMap<String, String>,
    config: MapperConfig,
}

impl<E> std::fmt::Debug for RelationMapper<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationMapper")
            .field("relations", &self.relations)
            .field("prefixes", &self.prefixes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: 'static> RelationMapper<E> {
    /// Create a mapper whose own columns are mapped by `leaf`.
    pub fn new<M: EntityMapper<E> + 'static>(leaf: M) -> Self {
        Self {
            leaf: Box::new(leaf),
            relations: Vec::new(),
            prefixes: HashMap::new(),
            config: MapperConfig::default(),
        }
    }

    /// Relations to assemble. Unbound relations are ignored.
    pub fn with_relations(mut self, relations: Vec<Relation<E>>) -> Self {
        self.relations = relations;
        self
    }

    /// Read the relation `alias` from `prefix__` columns instead of
    /// `alias__` ones.
    pub fn with_prefix(mut self, alias: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.prefixes.insert(alias.into(), prefix.into());
        self
    }

    /// Column prefix the relation `alias` is read from in flat rows.
    pub fn prefix_of<'a>(&'a self, alias: &'a str) -> &'a str {
        self.prefixes.get(alias).map_or(alias, String::as_str)
    }

    pub fn with_config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    pub fn relations(&self) -> &[Relation<E>] {
        &self.relations
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Map one result row.
    pub fn map_row(&self, row: &Row) -> Result<E> {
        self.map_entity(row.cells())
    }

    /// Map every row independently, stopping at the first error.
    pub fn map_rows(&self, rows: &[Row]) -> Result<Vec<E>> {
        rows.iter().map(|row| self.map_row(row)).collect()
    }

    /// Fold a prepared child into `entity` according to the error policy.
    fn attach(&self, alias: &str, entity: E, prepared: Result<Attach<E>>) -> Result<E> {
        match prepared {
            Ok(attach) => Ok(attach(entity)),
            Err(err @ Error::Decode(_)) => Err(err),
            Err(err) => match self.config.on_child_error {
                ChildErrorPolicy::FailFast => Err(Error::mapping(alias, err)),
                ChildErrorPolicy::BestEffort => {
                    tracing::warn!(
                        target: "sqlrel::map",
                        alias,
                        error = %err,
                        "child mapping failed; relation left unset"
                    );
                    Ok(entity)
                }
            },
        }
    }

    fn attach_all(
        &self,
        alias: &str,
        mut entity: E,
        items: &[serde_json::Value],
        relation: &Relation<E>,
    ) -> Result<E> {
        let Some(binding) = relation.binding() else {
            return Ok(entity);
        };
        for item in items {
            entity = self.attach(alias, entity, binding.bind_json(item))?;
        }
        Ok(entity)
    }
}

impl<E: 'static> EntityMapper<E> for RelationMapper<E> {
    fn map_entity(&self, cells: &[FieldValue]) -> Result<E> {
        let mut entity = self.leaf.map_entity(&extract_own(cells))?;

        for relation in &self.relations {
            let Some(binding) = relation.binding() else {
                continue;
            };
            let spec = relation.spec();
            let alias = spec.alias();
            let prefix = self.prefix_of(alias);

            if spec.is_has_many() {
                let column = json_column(prefix);
                if let Some(items) = decode_has_many(&column, find_value(cells, &column))? {
                    entity = self.attach_all(alias, entity, &items, relation)?;
                }
                continue;
            }

            let sliced = extract_prefixed(cells, prefix);
            if own_cells_null(&sliced) {
                tracing::debug!(target: "sqlrel::map", alias, prefix, "relation has no match; skipped");
                continue;
            }
            entity = self.attach(alias, entity, binding.bind_cells(&sliced))?;
        }
        Ok(entity)
    }

    fn map_json(&self, item: &serde_json::Value) -> Result<E> {
        let Some(object) = item.as_object() else {
            return Err(Error::decode(
                "",
                format!("expected a JSON object, got {item}"),
                None,
            ));
        };

        let relation_keys: HashSet<&str> = self.relations.iter().map(Relation::alias).collect();
        let own: Vec<FieldValue> = object
            .iter()
            .filter(|(k, _)| !relation_keys.contains(k.as_str()))
            .map(|(k, v)| FieldValue::new(k.as_str(), Value::from_json(v)))
            .collect();
        let mut entity = self.leaf.map_entity(&own)?;

        for relation in &self.relations {
            let Some(binding) = relation.binding() else {
                continue;
            };
            let alias = relation.alias();
            let Some(value) = object.get(alias) else {
                continue;
            };

            if relation.spec().is_has_many() {
                if let Some(items) = decode_json(alias, value)? {
                    entity = self.attach_all(alias, entity, &items, relation)?;
                }
                continue;
            }

            match value {
                serde_json::Value::Object(child) if !json_own_null(child) => {
                    entity = self.attach(alias, entity, binding.bind_json(value))?;
                }
                serde_json::Value::Object(_) | serde_json::Value::Null => {
                    tracing::debug!(target: "sqlrel::map", alias, "relation has no match; skipped");
                }
                other => {
                    return Err(Error::decode(
                        alias,
                        format!("expected a JSON object, got {other}"),
                        None,
                    ));
                }
            }
        }
        Ok(entity)
    }
}
