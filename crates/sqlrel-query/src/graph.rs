//! Relation graph compilation.
//!
//! The relations declared on a root schema form a tree: a relation's target
//! schema may declare relations of its own, and a root-level relation may be
//! anchored on another one via `through`. Compilation flattens that tree into
//! one list in dependency order, where every entry knows
//!
//! - its parent (the relation it is anchored on, if any),
//! - its full alias chain (`vt`, `vg` → prefix `vt__vg`),
//! - whether it sits beneath a HasMany (then it is rendered inside that
//!   HasMany's subquery and never as a top-level JOIN), and
//! - the alias it takes in SQL (`da` at top level, `docs_da` inside the
//!   `docs` subquery).
//!
//! Declarations are shared, never copied: a nested relation is wrapped with
//! its effective anchor, so one schema's relations can appear under several
//! parents.

use std::collections::HashSet;
use std::sync::Arc;

use sqlrel_core::error::{ConfigErrorKind, Error, Result};
use sqlrel_core::relationship::RelationSpec;
use sqlrel_core::row::{join_prefix, json_column};
use sqlrel_core::schema::TableSchema;
use sqlrel_core::validate;

use crate::config::CompilerConfig;

/// One relation placed in the compiled graph.
#[derive(Debug, Clone)]
pub struct CompiledRelation {
    spec: Arc<RelationSpec>,
    through: Option<String>,
    parent: Option<usize>,
    chain: Vec<String>,
    sql_alias: String,
    absorbed: bool,
    declared: bool,
}

impl CompiledRelation {
    pub fn spec(&self) -> &Arc<RelationSpec> {
        &self.spec
    }

    pub fn alias(&self) -> &str {
        self.spec.alias()
    }

    /// Effective anchor alias: the parent's alias, or the declared `through`.
    pub fn through(&self) -> Option<&str> {
        self.through.as_deref()
    }

    /// Index of the anchor relation in [`RelationGraph::relations`].
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Ancestor aliases followed by this relation's alias.
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// Column prefix: the alias chain joined by `__`.
    pub fn prefix(&self) -> String {
        join_prefix(&self.chain)
    }

    /// Name of the aggregated column for a HasMany relation.
    pub fn json_column(&self) -> String {
        json_column(&self.prefix())
    }

    /// Table alias used in generated SQL.
    pub fn sql_alias(&self) -> &str {
        &self.sql_alias
    }

    /// Returns `true` if an ancestor is a HasMany relation.
    pub fn is_absorbed(&self) -> bool {
        self.absorbed
    }

    /// Returns `true` if the relation was declared on the root table rather
    /// than discovered on a related schema.
    pub fn is_declared(&self) -> bool {
        self.declared
    }
}

/// The compiled relation graph of one root table.
#[derive(Debug, Clone)]
pub struct RelationGraph {
    table: String,
    root_alias: Option<String>,
    relations: Vec<CompiledRelation>,
}

struct Discovered {
    spec: Arc<RelationSpec>,
    through: Option<String>,
    parent: Option<usize>,
    declared: bool,
}

struct Discovery<'a> {
    config: &'a CompilerConfig,
    out: Vec<Discovered>,
    visited: HashSet<String>,
}

impl Discovery<'_> {
    /// Depth-first walk over declared relations and the relations of their
    /// target schemas.
    fn walk(
        &mut self,
        specs: &[Arc<RelationSpec>],
        parent: Option<usize>,
        path: &str,
        ancestors: &mut Vec<Arc<RelationSpec>>,
    ) -> Result<()> {
        for spec in specs {
            spec.validate()?;
            let alias = spec.alias();

            if ancestors.iter().any(|a| Arc::ptr_eq(a, spec)) {
                tracing::debug!(
                    target: "sqlrel::compile",
                    alias,
                    path,
                    "relation already declared on an ancestor; not descending again"
                );
                continue;
            }

            let key = if path.is_empty() {
                alias.to_string()
            } else {
                format!("{path}.{alias}")
            };
            if !self.visited.insert(key.clone()) {
                continue;
            }

            let depth = ancestors.len() + 1;
            if depth > self.config.max_depth {
                return Err(Error::config(
                    ConfigErrorKind::DepthExceeded,
                    alias,
                    format!(
                        "relation nesting depth {depth} exceeds the limit of {}",
                        self.config.max_depth
                    ),
                ));
            }

            let through = match parent {
                Some(p) => Some(self.out[p].spec.alias().to_string()),
                None => spec.through_alias().map(str::to_string),
            };
            let index = self.out.len();
            self.out.push(Discovered {
                spec: Arc::clone(spec),
                through,
                parent,
                declared: parent.is_none(),
            });

            let nested = spec.nested_relations();
            if !nested.is_empty() {
                ancestors.push(Arc::clone(spec));
                self.walk(&nested, Some(index), &key, ancestors)?;
                ancestors.pop();
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Order node indices so that every node follows its parent.
///
/// Returns the index of a node on a cycle if the parent pointers loop.
pub(crate) fn topological_order(parents: &[Option<usize>]) -> std::result::Result<Vec<usize>, usize> {
    fn visit(
        node: usize,
        parents: &[Option<usize>],
        marks: &mut [Mark],
        order: &mut Vec<usize>,
    ) -> std::result::Result<(), usize> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(node),
            Mark::Unvisited => {}
        }
        marks[node] = Mark::InProgress;
        if let Some(parent) = parents[node] {
            visit(parent, parents, marks, order)?;
        }
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; parents.len()];
    let mut order = Vec::with_capacity(parents.len());
    for node in 0..parents.len() {
        visit(node, parents, &mut marks, &mut order)?;
    }
    Ok(order)
}

impl RelationGraph {
    /// Compile the relations declared on `table`.
    ///
    /// Fails if any declaration is invalid, a `through` names no relation,
    /// `through` pointers form a cycle, nesting exceeds `max_depth`, or (when
    /// enabled) two JOINed relations share an alias.
    pub fn compile(
        table: impl Into<String>,
        specs: &[Arc<RelationSpec>],
        config: &CompilerConfig,
    ) -> Result<Self> {
        let table = table.into();
        let invalid = |e: Error| Error::config(ConfigErrorKind::InvalidIdentifier, "", e.to_string());
        validate::validate_identifier(&table, "table").map_err(invalid)?;
        if let Some(alias) = &config.root_alias {
            validate::validate_identifier(alias, "root alias").map_err(invalid)?;
        }

        let mut discovery = Discovery {
            config,
            out: Vec::with_capacity(specs.len()),
            visited: HashSet::new(),
        };
        discovery.walk(specs, None, "", &mut Vec::new())?;
        let mut found = discovery.out;

        // Root-level `through` anchors resolve against the discovered list.
        for i in 0..found.len() {
            if found[i].parent.is_some() {
                continue;
            }
            let Some(through) = found[i].through.clone() else {
                continue;
            };
            let anchor = found
                .iter()
                .enumerate()
                .find(|(j, d)| *j != i && d.spec.alias() == through)
                .map(|(j, _)| j);
            match anchor {
                Some(j) => found[i].parent = Some(j),
                None => {
                    return Err(Error::config(
                        ConfigErrorKind::UnknownThrough,
                        found[i].spec.alias(),
                        format!("through alias {through:?} does not name a declared relation"),
                    ));
                }
            }
        }

        let parents: Vec<_> = found.iter().map(|d| d.parent).collect();
        let order = topological_order(&parents).map_err(|node| {
            Error::config(
                ConfigErrorKind::CyclicThrough,
                found[node].spec.alias(),
                "through references form a cycle",
            )
        })?;

        // Place relations in dependency order; parents are always placed first.
        let mut position = vec![0usize; found.len()];
        let mut relations: Vec<CompiledRelation> = Vec::with_capacity(found.len());
        for old in order {
            let d = &found[old];
            let parent = d.parent.map(|p| position[p]);
            let (chain, absorbed, sql_alias) = match parent {
                None => (vec![d.spec.alias().to_string()], false, d.spec.alias().to_string()),
                Some(p) => {
                    let anchor = &relations[p];
                    let mut chain = anchor.chain.clone();
                    chain.push(d.spec.alias().to_string());
                    let absorbed = anchor.absorbed || anchor.spec.is_has_many();
                    let sql_alias = if absorbed {
                        format!("{}_{}", anchor.sql_alias, d.spec.alias())
                    } else {
                        d.spec.alias().to_string()
                    };
                    (chain, absorbed, sql_alias)
                }
            };
            if chain.len() > config.max_depth {
                return Err(Error::config(
                    ConfigErrorKind::DepthExceeded,
                    d.spec.alias(),
                    format!(
                        "relation nesting depth {} exceeds the limit of {}",
                        chain.len(),
                        config.max_depth
                    ),
                ));
            }
            position[old] = relations.len();
            relations.push(CompiledRelation {
                spec: Arc::clone(&d.spec),
                through: d.through.clone(),
                parent,
                chain,
                sql_alias,
                absorbed,
                declared: d.declared,
            });
        }

        let mut graph = Self {
            table,
            root_alias: config.root_alias.clone(),
            relations,
        };
        graph.qualify_absorbed_aliases();
        if config.reject_duplicate_aliases {
            graph.check_unique_aliases()?;
        }

        tracing::debug!(
            target: "sqlrel::compile",
            table = %graph.table,
            relations = graph.relations.len(),
            joins = graph.joined().count(),
            subqueries = graph.top_level_has_many().count(),
            "compiled relation graph"
        );
        Ok(graph)
    }

    /// Compile the relations a schema declares on itself.
    pub fn from_schema(schema: &dyn TableSchema, config: &CompilerConfig) -> Result<Self> {
        Self::compile(schema.table_name(), &schema.relations(), config)
    }

    /// Give every absorbed relation an alias no other relation uses.
    ///
    /// The qualified alias is the parent's alias and the relation's own
    /// joined by `_`. Plain concatenation is not injective (`a` + `b_c` and
    /// `a_b` + `c` both give `a_b_c`), so a taken name gets a numeric suffix.
    /// Relations are in dependency order, so a parent is final before any
    /// child reads it.
    fn qualify_absorbed_aliases(&mut self) {
        let mut taken: HashSet<String> = self
            .top_level()
            .map(|r| r.sql_alias.clone())
            .chain(std::iter::once(self.anchor().to_string()))
            .collect();
        for i in 0..self.relations.len() {
            if !self.relations[i].absorbed {
                continue;
            }
            let Some(parent) = self.relations[i].parent else {
                continue;
            };
            let base = format!(
                "{}_{}",
                self.relations[parent].sql_alias,
                self.relations[i].alias()
            );
            let mut candidate = base.clone();
            let mut n = 2;
            while taken.contains(&candidate) {
                candidate = format!("{base}_{n}");
                n += 1;
            }
            if candidate != base {
                tracing::debug!(
                    target: "sqlrel::compile",
                    alias = self.relations[i].alias(),
                    qualified = %candidate,
                    "qualified alias already taken; numbered"
                );
            }
            taken.insert(candidate.clone());
            self.relations[i].sql_alias = candidate;
        }
    }

    fn check_unique_aliases(&self) -> Result<()> {
        let mut seen = HashSet::new();
        seen.insert(self.anchor());
        for rel in &self.relations {
            if !seen.insert(rel.sql_alias()) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateAlias,
                    rel.alias(),
                    "alias is already used by another relation or the root table",
                ));
            }
        }
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn root_alias(&self) -> Option<&str> {
        self.root_alias.as_deref()
    }

    /// The name top-level relations are anchored on: root alias or table.
    pub fn anchor(&self) -> &str {
        self.root_alias.as_deref().unwrap_or(&self.table)
    }

    /// Every relation, parents before children.
    pub fn relations(&self) -> &[CompiledRelation] {
        &self.relations
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Relations rendered in the top-level statement.
    pub fn top_level(&self) -> impl Iterator<Item = &CompiledRelation> {
        self.relations.iter().filter(|r| !r.absorbed)
    }

    /// Top-level relations rendered as JOINs.
    pub fn joined(&self) -> impl Iterator<Item = &CompiledRelation> {
        self.top_level().filter(|r| !r.spec.is_has_many())
    }

    /// Top-level relations rendered as aggregation subqueries.
    pub fn top_level_has_many(&self) -> impl Iterator<Item = &CompiledRelation> {
        self.top_level().filter(|r| r.spec.is_has_many())
    }

    /// Direct children of the relation at `index`.
    pub fn children(&self, index: usize) -> impl Iterator<Item = (usize, &CompiledRelation)> {
        self.relations
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.parent == Some(index))
    }

    /// SQL alias of the relation's anchor: its parent, or the root.
    pub fn anchor_of(&self, relation: &CompiledRelation) -> &str {
        match relation.parent {
            Some(p) => self.relations[p].sql_alias(),
            None => self.anchor(),
        }
    }

    /// Compiled entry of `spec` as declared on the root table.
    pub fn declared(&self, spec: &Arc<RelationSpec>) -> Option<&CompiledRelation> {
        self.relations
            .iter()
            .find(|r| r.declared && Arc::ptr_eq(&r.spec, spec))
    }

    /// Find a top-level relation by alias.
    pub fn find(&self, alias: &str) -> Option<&CompiledRelation> {
        self.top_level().find(|r| r.alias() == alias)
    }
}
