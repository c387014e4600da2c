//! Read repository over a compiled relation graph.
//!
//! Every operation composes exactly one statement, runs it through the
//! caller's [`QueryExecutor`], and maps the returned rows with the
//! repository's [`RelationMapper`]. Relations never trigger a second query.

use std::fmt;

use sqlrel_core::error::{ConfigErrorKind, Error, QueryError, QueryErrorKind, Result};
use sqlrel_core::executor::QueryExecutor;
use sqlrel_core::relationship::{EntityMapper, Relation, specs};
use sqlrel_core::row::Row;
use sqlrel_core::schema::TableSchema;
use sqlrel_core::value::Value;
use sqlrel_core::{Cx, Outcome};
use sqlrel_mapper::{MapperConfig, RelationMapper};
use sqlrel_query::{CompilerConfig, FindParams, RelationGraph, SelectQuery};

/// List/Get/Exists/Count for entity type `E`.
pub struct Repository<E> {
    graph: RelationGraph,
    fields: Vec<String>,
    mapper: RelationMapper<E>,
}

impl<E> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.graph.table())
            .field("fields", &self.fields)
            .field("relations", &self.graph.relations().len())
            .finish_non_exhaustive()
    }
}

impl<E: 'static> Repository<E> {
    /// Assemble a repository from already compiled parts.
    pub fn new(graph: RelationGraph, fields: Vec<String>, mapper: RelationMapper<E>) -> Self {
        Self {
            graph,
            fields,
            mapper,
        }
    }

    /// Compile `relations` against `schema` and map rows with `leaf` plus
    /// the relations' bindings.
    ///
    /// A bound relation anchored with `through` is read from its anchor's
    /// column prefix. Binding a relation that sits beneath a HasMany fails
    /// with [`ConfigErrorKind::AbsorbedBinding`]: its data only exists inside
    /// the HasMany's JSON, so it must be bound on that relation's child
    /// mapper instead.
    pub fn compile<M>(
        schema: &dyn TableSchema,
        relations: Vec<Relation<E>>,
        leaf: M,
        config: &CompilerConfig,
    ) -> Result<Self>
    where
        M: EntityMapper<E> + 'static,
    {
        let graph = RelationGraph::compile(schema.table_name(), &specs(&relations), config)?;
        let mut mapper = RelationMapper::new(leaf);
        for relation in relations.iter().filter(|r| r.binding().is_some()) {
            let Some(compiled) = graph.declared(relation.spec()) else {
                continue;
            };
            if compiled.is_absorbed() {
                return Err(Error::config(
                    ConfigErrorKind::AbsorbedBinding,
                    relation.alias(),
                    format!(
                        "relation {} is assembled from a HasMany JSON column; \
                         bind it on the HasMany's child mapper",
                        compiled.prefix()
                    ),
                ));
            }
            let prefix = compiled.prefix();
            if prefix != relation.alias() {
                mapper = mapper.with_prefix(relation.alias(), prefix);
            }
        }
        let mapper = mapper.with_relations(relations);
        Ok(Self::new(graph, schema.field_names(), mapper))
    }

    pub fn with_mapper_config(mut self, config: MapperConfig) -> Self {
        self.mapper = self.mapper.with_config(config);
        self
    }

    pub fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn mapper(&self) -> &RelationMapper<E> {
        &self.mapper
    }

    /// Statement builder for this repository's table.
    pub fn select(&self) -> SelectQuery<'_> {
        SelectQuery::new(&self.graph, &self.fields)
    }

    /// Every entity matching `params`, with relations attached.
    pub async fn list(
        &self,
        cx: &Cx,
        executor: &impl QueryExecutor,
        params: FindParams,
    ) -> Outcome<Vec<E>, Error> {
        let (sql, args) = match self.select().params(params).build_list() {
            Ok(stmt) => stmt,
            Err(e) => return Outcome::Err(e),
        };
        let rows = match executor.query(cx, &sql, &args).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        tracing::debug!(
            target: "sqlrel::repo",
            table = self.graph.table(),
            rows = rows.len(),
            "list"
        );
        match self.mapper.map_rows(&rows) {
            Ok(entities) => Outcome::Ok(entities),
            Err(e) => Outcome::Err(e),
        }
    }

    /// The entity whose `key` column equals `value`.
    ///
    /// Zero rows is a [`QueryErrorKind::NotFound`] error.
    pub async fn get(
        &self,
        cx: &Cx,
        executor: &impl QueryExecutor,
        key: &str,
        value: impl Into<Value>,
    ) -> Outcome<E, Error> {
        self.get_with(cx, executor, key, value, FindParams::default())
            .await
    }

    /// Like [`get`](Self::get), with extra filters and request joins.
    /// Sort and paging in `params` are ignored.
    pub async fn get_with(
        &self,
        cx: &Cx,
        executor: &impl QueryExecutor,
        key: &str,
        value: impl Into<Value>,
        params: FindParams,
    ) -> Outcome<E, Error> {
        let (sql, args) = match self.select().params(params).build_get(key, value) {
            Ok(stmt) => stmt,
            Err(e) => return Outcome::Err(e),
        };
        let row = match executor.query_one(cx, &sql, &args).await {
            Outcome::Ok(Some(row)) => row,
            Outcome::Ok(None) => {
                return Outcome::Err(Error::Query(
                    QueryError {
                        kind: QueryErrorKind::NotFound,
                        message: format!("no {} row where {key} matches", self.graph.table()),
                        sql: None,
                    }
                    .with_sql(sql),
                ));
            }
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match self.mapper.map_row(&row) {
            Ok(entity) => Outcome::Ok(entity),
            Err(e) => Outcome::Err(e),
        }
    }

    /// Whether any row matches `params`.
    pub async fn exists(
        &self,
        cx: &Cx,
        executor: &impl QueryExecutor,
        params: FindParams,
    ) -> Outcome<bool, Error> {
        let (sql, args) = match self.select().params(params).build_exists() {
            Ok(stmt) => stmt,
            Err(e) => return Outcome::Err(e),
        };
        let row = match executor.query_one(cx, &sql, &args).await {
            Outcome::Ok(row) => row,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match scalar(row.as_ref(), &sql).and_then(|v| as_flag(v, &sql)) {
            Ok(found) => Outcome::Ok(found),
            Err(e) => Outcome::Err(e),
        }
    }

    /// Number of rows matching `params`, ignoring sort and paging.
    pub async fn count(
        &self,
        cx: &Cx,
        executor: &impl QueryExecutor,
        params: FindParams,
    ) -> Outcome<u64, Error> {
        let (sql, args) = match self.select().params(params).build_count() {
            Ok(stmt) => stmt,
            Err(e) => return Outcome::Err(e),
        };
        let row = match executor.query_one(cx, &sql, &args).await {
            Outcome::Ok(row) => row,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match scalar(row.as_ref(), &sql).and_then(|v| as_count(v, &sql)) {
            Ok(n) => Outcome::Ok(n),
            Err(e) => Outcome::Err(e),
        }
    }
}

fn unexpected(message: String, sql: &str) -> Error {
    Error::Query(
        QueryError {
            kind: QueryErrorKind::UnexpectedResult,
            message,
            sql: None,
        }
        .with_sql(sql),
    )
}

/// First cell of a single-value result.
fn scalar<'r>(row: Option<&'r Row>, sql: &str) -> Result<&'r Value> {
    row.and_then(|r| r.get(0))
        .ok_or_else(|| unexpected("expected a single value, got no rows".to_string(), sql))
}

fn as_flag(value: &Value, sql: &str) -> Result<bool> {
    if let Some(flag) = value.as_bool() {
        return Ok(flag);
    }
    value
        .as_i64()
        .map(|n| n != 0)
        .ok_or_else(|| unexpected(format!("expected a boolean, got a {} value", value.type_name()), sql))
}

fn as_count(value: &Value, sql: &str) -> Result<u64> {
    value
        .as_i64()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| unexpected(format!("expected a row count, got a {} value", value.type_name()), sql))
}
