//! Flat result rows and the `alias__field` naming convention.
//!
//! A JOINed query returns one flat row per root entity. Columns belonging to
//! a related record are named `<prefix>__<field>`, where the prefix is the
//! full chain of relation aliases (`vt__vg__name`). The helpers here slice a
//! row into the part owned by one relation.

use crate::error::{Error, Result};
use crate::value::Value;

/// Separator between prefix segments in flattened column names.
pub const PREFIX_SEPARATOR: &str = "__";

/// Suffix of the aggregated column produced for a HasMany relation.
pub const JSON_SUFFIX: &str = "json";

/// One named cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    name: String,
    value: Value,
}

impl FieldValue {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Null-or-zero test, independent of the declared column type.
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Returns `true` if the name carries no relation prefix.
    pub fn is_own(&self) -> bool {
        !self.name.contains(PREFIX_SEPARATOR)
    }

    fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: self.value.clone(),
        }
    }
}

/// An ordered list of cells, as returned by the query executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<FieldValue>,
}

impl Row {
    pub fn new(cells: Vec<FieldValue>) -> Self {
        Self { cells }
    }

    /// Build a row from `(name, value)` pairs.
    pub fn from_pairs<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<Value>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(n, v)| FieldValue::new(n, v))
                .collect(),
        }
    }

    pub fn cells(&self) -> &[FieldValue] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<FieldValue> {
        self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Get a cell by position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.cells.get(index).map(FieldValue::value)
    }

    /// Get a cell by column name.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        find_value(&self.cells, name)
    }
}

impl From<Vec<FieldValue>> for Row {
    fn from(cells: Vec<FieldValue>) -> Self {
        Self::new(cells)
    }
}

/// Join prefix segments with [`PREFIX_SEPARATOR`].
pub fn join_prefix<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(PREFIX_SEPARATOR)
}

/// Name of the aggregated JSON column for a relation prefix (`docs` → `docs__json`).
pub fn json_column(prefix: &str) -> String {
    format!("{prefix}{PREFIX_SEPARATOR}{JSON_SUFFIX}")
}

/// Cells whose name starts with `<prefix>__`, with that prefix stripped.
///
/// Deeper prefixes survive: `vt__vg__id` sliced by `vt` becomes `vg__id`, so
/// the child mapper can slice again for its own relations.
pub fn extract_prefixed(cells: &[FieldValue], prefix: &str) -> Vec<FieldValue> {
    let full = format!("{prefix}{PREFIX_SEPARATOR}");
    cells
        .iter()
        .filter_map(|fv| fv.name().strip_prefix(&full).map(|rest| fv.renamed(rest)))
        .collect()
}

/// Cells whose name contains no `__` separator.
pub fn extract_own(cells: &[FieldValue]) -> Vec<FieldValue> {
    cells.iter().filter(|fv| fv.is_own()).cloned().collect()
}

/// Returns `true` if every cell is null or zero. An empty slice counts as null.
pub fn all_null(cells: &[FieldValue]) -> bool {
    cells.iter().all(FieldValue::is_zero)
}

/// Returns `true` if every *own* cell is null or zero.
///
/// Deeper-prefixed cells are ignored: an empty-array default on a nested
/// HasMany column must not make an unmatched parent look present.
pub fn own_cells_null(cells: &[FieldValue]) -> bool {
    cells
        .iter()
        .filter(|fv| fv.is_own())
        .all(FieldValue::is_zero)
}

/// Every key of a JSON object as a plain cell, in key order.
///
/// Scalars are converted with [`Value::from_json`]; nested objects and arrays
/// are kept as `Value::Json`.
pub fn object_cells(item: &serde_json::Value) -> Result<Vec<FieldValue>> {
    let Some(object) = item.as_object() else {
        return Err(Error::decode(
            "",
            format!("expected a JSON object, got {item}"),
            None,
        ));
    };
    Ok(object
        .iter()
        .map(|(k, v)| FieldValue::new(k.as_str(), Value::from_json(v)))
        .collect())
}

/// Find a cell's value by exact name.
pub fn find_value<'a>(cells: &'a [FieldValue], name: &str) -> Option<&'a Value> {
    cells.iter().find(|fv| fv.name() == name).map(FieldValue::value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Vec<FieldValue> {
        vec![
            FieldValue::new("id", 1_i64),
            FieldValue::new("name", "car"),
            FieldValue::new("vt__id", 10_i64),
            FieldValue::new("vt__name", "sedan"),
            FieldValue::new("vt__vg__id", 100_i64),
            FieldValue::new("vtx__id", 5_i64),
        ]
    }

    #[test]
    fn test_extract_prefixed_strips_and_keeps_nested() {
        let vt = extract_prefixed(&row(), "vt");
        let names: Vec<_> = vt.iter().map(FieldValue::name).collect();
        assert_eq!(names, vec!["id", "name", "vg__id"]);
        assert_eq!(vt[0].value(), &Value::BigInt(10));
    }

    #[test]
    fn test_extract_prefixed_requires_separator() {
        // "vtx__id" must not leak into the "vt" slice.
        let vt = extract_prefixed(&row(), "vt");
        assert!(vt.iter().all(|fv| fv.value() != &Value::BigInt(5)));
    }

    #[test]
    fn test_extract_own() {
        let own = extract_own(&row());
        let names: Vec<_> = own.iter().map(FieldValue::name).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_all_null() {
        assert!(all_null(&[]));
        assert!(all_null(&[
            FieldValue::new("id", Value::Null),
            FieldValue::new("name", Value::Null),
        ]));
        assert!(!all_null(&[
            FieldValue::new("id", Value::Null),
            FieldValue::new("name", "x"),
        ]));
    }

    #[test]
    fn test_own_cells_null_ignores_nested_defaults() {
        let cells = vec![
            FieldValue::new("id", Value::Null),
            FieldValue::new("docs__json", "[]"),
        ];
        assert!(own_cells_null(&cells));
        assert!(!all_null(&cells));
    }

    #[test]
    fn test_row_lookup() {
        let r = Row::from_pairs([("id", Value::BigInt(1)), ("name", Value::from("a"))]);
        assert_eq!(r.len(), 2);
        assert_eq!(r.get(0), Some(&Value::BigInt(1)));
        assert_eq!(r.get_named("name").and_then(Value::as_str), Some("a"));
        assert!(r.get_named("missing").is_none());
    }

    #[test]
    fn test_object_cells() {
        let cells = object_cells(&serde_json::json!({"id": 3, "name": "x"})).unwrap();
        assert_eq!(find_value(&cells, "id"), Some(&Value::BigInt(3)));
        assert_eq!(find_value(&cells, "name").and_then(Value::as_str), Some("x"));
        assert!(object_cells(&serde_json::json!([1])).is_err());
    }

    #[test]
    fn test_prefix_helpers() {
        assert_eq!(join_prefix(&["p", "d", "dr"]), "p__d__dr");
        assert_eq!(json_column("vt__docs"), "vt__docs__json");
    }
}
