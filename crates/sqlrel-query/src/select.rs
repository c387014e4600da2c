//! Full statement composition over a compiled relation graph.
//!
//! Every statement is one query: the root table, the graph's JOINs, and the
//! graph's prefixed columns and aggregation subqueries. Filters and sort keys
//! are restricted to the root schema's own fields and bound as `$n`
//! parameters.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlrel_core::error::{Error, Result, ValidationErrorKind};
use sqlrel_core::value::Value;

use crate::graph::RelationGraph;
use crate::join::{self, JoinOptions};

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    In,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Like => "LIKE",
            FilterOp::ILike => "ILIKE",
            FilterOp::In => "IN",
            FilterOp::IsNull => "IS NULL",
            FilterOp::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A condition on one root column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    column: String,
    op: FilterOp,
    values: Vec<Value>,
}

impl Filter {
    fn binary(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            values: vec![value.into()],
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, FilterOp::Eq, value)
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, FilterOp::NotEq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, FilterOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, FilterOp::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, FilterOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, FilterOp::Lte, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Self::binary(column, FilterOp::Like, pattern)
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Self::binary(column, FilterOp::ILike, pattern)
    }

    pub fn in_list<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            column: column.into(),
            op: FilterOp::In,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::IsNull,
            values: Vec::new(),
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::IsNotNull,
            values: Vec::new(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// Render against `qualifier.column`, pushing bound values onto `params`.
    fn render(&self, qualifier: &str, params: &mut Vec<Value>) -> String {
        let column = format!("{qualifier}.{}", self.column);
        match self.op {
            FilterOp::IsNull | FilterOp::IsNotNull => format!("{column} {}", self.op.as_sql()),
            FilterOp::In if self.values.is_empty() => "FALSE".to_string(),
            FilterOp::In => {
                let placeholders: Vec<_> = self
                    .values
                    .iter()
                    .map(|v| {
                        params.push(v.clone());
                        format!("${}", params.len())
                    })
                    .collect();
                format!("{column} IN ({})", placeholders.join(", "))
            }
            op => {
                params.push(self.values.first().cloned().unwrap_or_default());
                format!("{column} {} ${}", op.as_sql(), params.len())
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("ASC"),
            SortDirection::Desc => f.write_str("DESC"),
        }
    }
}

/// One `ORDER BY` key on a root column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Parameters of a list query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindParams {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Request-supplied joins and column selection, merged over the defaults.
    pub joins: Option<JoinOptions>,
}

impl FindParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, sort: SortBy) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn joins(mut self, joins: JoinOptions) -> Self {
        self.joins = Some(joins);
        self
    }
}

/// Statement builder over a compiled graph and the root schema's fields.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sqlrel_core::{JoinKind, RelationSpec, SchemaDef};
/// use sqlrel_query::{CompilerConfig, Filter, FindParams, RelationGraph, SelectQuery};
///
/// let roles = SchemaDef::new("roles", ["name"]).shared();
/// let specs = vec![Arc::new(
///     RelationSpec::belongs_to("r", roles)
///         .local_key("role_id")
///         .entity_field("role")
///         .join(JoinKind::Inner),
/// )];
/// let graph = RelationGraph::compile("users", &specs, &CompilerConfig::default()).unwrap();
/// let fields = vec!["id".to_string(), "role_id".to_string()];
///
/// let (sql, params) = SelectQuery::new(&graph, &fields)
///     .params(FindParams::new().filter(Filter::eq("id", 7_i64)))
///     .build_list()
///     .unwrap();
/// assert_eq!(
///     sql,
///     "SELECT users.*, r.name AS r__name FROM users \
///      INNER JOIN roles r ON users.role_id = r.id WHERE users.id = $1"
/// );
/// assert_eq!(params.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SelectQuery<'a> {
    graph: &'a RelationGraph,
    fields: &'a [String],
    params: FindParams,
}

impl<'a> SelectQuery<'a> {
    pub fn new(graph: &'a RelationGraph, fields: &'a [String]) -> Self {
        Self {
            graph,
            fields,
            params: FindParams::default(),
        }
    }

    pub fn params(mut self, params: FindParams) -> Self {
        self.params = params;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.params.filters.push(filter);
        self
    }

    pub fn order_by(mut self, sort: SortBy) -> Self {
        self.params.sort.push(sort);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.params.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.params.offset = Some(offset);
        self
    }

    fn check_column(&self, column: &str) -> Result<()> {
        if self.fields.iter().any(|f| f == column) {
            return Ok(());
        }
        Err(Error::validation(
            ValidationErrorKind::UnknownField,
            column,
            format!("{column:?} is not a field of {}", self.graph.table()),
        ))
    }

    /// Validate the request, then merge its joins over the graph's defaults.
    fn resolve(&self) -> Result<JoinOptions> {
        for filter in &self.params.filters {
            self.check_column(filter.column())?;
        }
        for sort in &self.params.sort {
            self.check_column(&sort.column)?;
        }
        if let Some(request) = &self.params.joins {
            request.validate()?;
        }
        let defaults = self.graph.default_join_options();
        Ok(join::merge(Some(&defaults), self.params.joins.as_ref())
            .map(std::borrow::Cow::into_owned)
            .unwrap_or_default())
    }

    fn from_clause(&self, options: &JoinOptions) -> String {
        let mut sql = format!("FROM {}", self.graph.table());
        if let Some(alias) = self.graph.root_alias() {
            sql.push(' ');
            sql.push_str(alias);
        }
        if !options.joins.is_empty() {
            sql.push(' ');
            sql.push_str(&options.joins_sql());
        }
        sql
    }

    fn where_clause(&self, extra: Option<&Filter>, params: &mut Vec<Value>) -> String {
        let anchor = self.graph.anchor();
        let conditions: Vec<_> = self
            .params
            .filters
            .iter()
            .chain(extra)
            .map(|f| f.render(anchor, params))
            .collect();
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    fn tail(&self) -> String {
        let anchor = self.graph.anchor();
        let mut sql = String::new();
        if !self.params.sort.is_empty() {
            let keys: Vec<_> = self
                .params
                .sort
                .iter()
                .map(|s| format!("{anchor}.{} {}", s.column, s.direction))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        if let Some(limit) = self.params.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.params.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }

    fn select(&self, extra: Option<&Filter>, paged: bool) -> Result<(String, Vec<Value>)> {
        let options = self.resolve()?;
        let mut params = Vec::new();
        let columns = if options.select_columns.is_empty() {
            self.graph.default_select_list()
        } else {
            options.select_columns.clone()
        };
        let mut sql = format!(
            "SELECT {} {}{}",
            columns.join(", "),
            self.from_clause(&options),
            self.where_clause(extra, &mut params)
        );
        if paged {
            sql.push_str(&self.tail());
        }
        trace_statement(&sql, &params);
        Ok((sql, params))
    }

    /// `SELECT` with relations, filters, sort and paging.
    pub fn build_list(&self) -> Result<(String, Vec<Value>)> {
        self.select(None, true)
    }

    /// `SELECT` of the single row whose `key` column equals `value`.
    pub fn build_get(&self, key: &str, value: impl Into<Value>) -> Result<(String, Vec<Value>)> {
        self.check_column(key)?;
        let filter = Filter::eq(key, value);
        self.select(Some(&filter), false)
    }

    /// `SELECT COUNT(*)` over the same rows as [`build_list`](Self::build_list),
    /// ignoring sort and paging.
    pub fn build_count(&self) -> Result<(String, Vec<Value>)> {
        let options = self.resolve()?;
        let mut params = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) {}{}",
            self.from_clause(&options),
            self.where_clause(None, &mut params)
        );
        trace_statement(&sql, &params);
        Ok((sql, params))
    }

    /// `SELECT EXISTS(...)` over the same rows as [`build_list`](Self::build_list).
    pub fn build_exists(&self) -> Result<(String, Vec<Value>)> {
        let options = self.resolve()?;
        let mut params = Vec::new();
        let sql = format!(
            "SELECT EXISTS(SELECT 1 {}{})",
            self.from_clause(&options),
            self.where_clause(None, &mut params)
        );
        trace_statement(&sql, &params);
        Ok((sql, params))
    }
}

fn trace_statement(sql: &str, params: &[Value]) {
    tracing::trace!(
        target: "sqlrel::compile",
        sql,
        params = params.len(),
        "composed statement"
    );
}
