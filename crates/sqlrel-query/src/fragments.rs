//! SQL fragments generated from a compiled relation graph.
//!
//! BelongsTo relations become a JOIN plus one prefixed column per field:
//!
//! ```text
//! LEFT JOIN vehicle_groups vg ON vt.group_id = vg.id
//! vg.name AS vt__vg__name
//! ```
//!
//! HasMany relations never JOIN (that would repeat the parent row once per
//! child). Each becomes a correlated subquery aggregating the children into
//! one JSON array, with the children's own relations rendered inside it:
//!
//! ```text
//! (SELECT COALESCE(JSON_AGG(json_build_object('id', docs.id, 'da', json_build_object(...))), '[]'::json)
//!  FROM person_documents docs LEFT JOIN document_authorities docs_da ON docs.authority_id = docs_da.id
//!  WHERE docs.person_id = p.id) AS docs__json
//! ```
//!
//! An unmatched HasMany yields `'[]'`, never NULL.

use sqlrel_core::relationship::RelationSpec;
use sqlrel_core::validate;

use crate::graph::{CompiledRelation, RelationGraph};
use crate::join::{JoinClause, JoinOptions};

/// Empty-array default of every aggregation subquery.
pub const EMPTY_JSON_ARRAY: &str = "'[]'::json";

/// Fields a relation contributes: schema fields, or manual columns.
///
/// Each entry is `(output name, expression relative to the relation alias)`;
/// the expression is `None` for plain columns read as `<alias>.<name>`.
fn relation_fields(spec: &RelationSpec) -> Vec<(String, Option<String>)> {
    if let Some(manual) = spec.manual_override() {
        return manual
            .columns
            .iter()
            .map(|col| match validate::split_alias_clause(col) {
                Some((expr, name)) => (name.to_string(), Some(expr.to_string())),
                None => (col.trim().to_string(), None),
            })
            .collect();
    }
    spec.related_schema()
        .map(|s| s.field_names().into_iter().map(|f| (f, None)).collect())
        .unwrap_or_default()
}

impl RelationGraph {
    /// JOIN clause for a top-level BelongsTo relation.
    pub fn join_clause(&self, relation: &CompiledRelation) -> JoinClause {
        let spec = relation.spec();
        JoinClause::new(
            spec.join_kind(),
            spec.table_name(),
            format!("{}.{}", self.anchor_of(relation), spec.local_key_name()),
            format!("{}.{}", relation.sql_alias(), spec.remote_key_name()),
        )
        .alias(relation.sql_alias())
    }

    /// JOIN clauses for every top-level BelongsTo relation, anchors first.
    pub fn join_clauses(&self) -> Vec<JoinClause> {
        self.joined().map(|r| self.join_clause(r)).collect()
    }

    /// SELECT entries for every top-level relation, in dependency order.
    ///
    /// BelongsTo relations contribute `<alias>.<field> AS <prefix>__<field>`;
    /// manual columns that carry their own ` AS ` clause are passed through
    /// unchanged. HasMany relations contribute one aggregation subquery
    /// aliased `<prefix>__json`.
    pub fn select_columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        for (index, relation) in self.relations().iter().enumerate() {
            if relation.is_absorbed() {
                continue;
            }
            if relation.spec().is_has_many() {
                columns.push(format!(
                    "{} AS {}",
                    self.has_many_subquery(index),
                    relation.json_column()
                ));
                continue;
            }
            let alias = relation.sql_alias();
            let prefix = relation.prefix();
            if let Some(manual) = relation.spec().manual_override() {
                for col in &manual.columns {
                    if validate::has_alias_clause(col) {
                        columns.push(col.clone());
                    } else {
                        let col = col.trim();
                        columns.push(format!("{alias}.{col} AS {prefix}__{col}"));
                    }
                }
                continue;
            }
            for (field, _) in relation_fields(relation.spec()) {
                columns.push(format!("{alias}.{field} AS {prefix}__{field}"));
            }
        }
        columns
    }

    /// `<root>.*` followed by every relation column.
    pub fn default_select_list(&self) -> Vec<String> {
        let mut list = vec![format!("{}.*", self.anchor())];
        list.extend(self.select_columns());
        list
    }

    /// The graph's joins and full SELECT list, as mergeable defaults.
    pub fn default_join_options(&self) -> JoinOptions {
        JoinOptions {
            joins: self.join_clauses(),
            select_columns: self.default_select_list(),
        }
    }

    /// Correlated aggregation subquery for the HasMany relation at `index`,
    /// without the trailing `AS` alias.
    pub fn has_many_subquery(&self, index: usize) -> String {
        let relation = &self.relations()[index];
        let spec = relation.spec();
        let alias = relation.sql_alias();

        let mut joins = Vec::new();
        let object = self.json_object(index, &mut joins);

        let mut sql = format!(
            "(SELECT COALESCE(JSON_AGG({object}), {EMPTY_JSON_ARRAY}) FROM {} {alias}",
            spec.table_name()
        );
        for join in &joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&format!(
            " WHERE {alias}.{} = {}.{})",
            spec.remote_key_name(),
            self.anchor_of(relation),
            spec.local_key_name()
        ));
        sql
    }

    /// `json_build_object(...)` for the relation at `index`, recursing into its
    /// children. JOINs needed by nested BelongsTo relations are appended to
    /// `joins` in order.
    fn json_object(&self, index: usize, joins: &mut Vec<String>) -> String {
        let relation = &self.relations()[index];
        let alias = relation.sql_alias();

        let mut entries: Vec<String> = relation_fields(relation.spec())
            .into_iter()
            .map(|(name, expr)| match expr {
                Some(expr) => format!("'{name}', {expr}"),
                None => format!("'{name}', {alias}.{name}"),
            })
            .collect();

        for (child_index, child) in self.children(index) {
            if child.spec().is_has_many() {
                entries.push(format!(
                    "'{}', {}",
                    child.alias(),
                    self.has_many_subquery(child_index)
                ));
            } else {
                joins.push(self.join_clause(child).to_sql());
                entries.push(format!(
                    "'{}', {}",
                    child.alias(),
                    self.json_object(child_index, joins)
                ));
            }
        }

        format!("json_build_object({})", entries.join(", "))
    }
}
