//! Hand-written JOIN clauses and column selections.
//!
//! These bypass the declarative relation model, so every free-text field is
//! validated (security scan first, then structure) before it can reach SQL.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlrel_core::error::{Error, Result, ValidationErrorKind};
use sqlrel_core::relationship::JoinKind;
use sqlrel_core::validate;

/// One `JOIN` clause.
///
/// # Example
///
/// ```
/// use sqlrel_core::JoinKind;
/// use sqlrel_query::JoinClause;
///
/// let join = JoinClause::new(JoinKind::Inner, "roles", "users.role_id", "r.id").alias("r");
/// assert!(join.validate().is_ok());
/// assert_eq!(join.to_sql(), "INNER JOIN roles r ON users.role_id = r.id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinClause {
    #[serde(default)]
    pub kind: JoinKind,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Left side of the `ON` equality (`users.role_id`).
    pub left: String,
    /// Right side of the `ON` equality (`r.id`).
    pub right: String,
}

impl JoinClause {
    pub fn new(
        kind: JoinKind,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            alias: None,
            left: left.into(),
            right: right.into(),
        }
    }

    /// Set the table alias. Empty clears it.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.alias = (!alias.is_empty()).then_some(alias);
        self
    }

    fn alias_str(&self) -> Option<&str> {
        self.alias.as_deref().filter(|a| !a.is_empty())
    }

    /// Check required fields, then run the security scan over every
    /// non-empty field, then the structural checks.
    pub fn validate(&self) -> Result<()> {
        for (value, what) in [
            (&self.table, "join table"),
            (&self.left, "join left column"),
            (&self.right, "join right column"),
        ] {
            if value.is_empty() {
                return Err(Error::validation(
                    ValidationErrorKind::Empty,
                    "",
                    format!("{what} cannot be empty"),
                ));
            }
        }

        for value in [
            Some(self.table.as_str()),
            self.alias_str(),
            Some(self.left.as_str()),
            Some(self.right.as_str()),
        ]
        .into_iter()
        .flatten()
        {
            validate::check_dangerous_sql(value)?;
        }

        validate::validate_identifier(&self.table, "table")?;
        validate::validate_identifier(&self.left, "left column")?;
        validate::validate_identifier(&self.right, "right column")?;
        if let Some(alias) = self.alias_str() {
            validate::validate_identifier(alias, "table alias")?;
        }
        Ok(())
    }

    /// Render as `<KIND> <table> [<alias>] ON <left> = <right>`.
    pub fn to_sql(&self) -> String {
        match self.alias_str() {
            Some(alias) => format!(
                "{} {} {} ON {} = {}",
                self.kind.as_sql(),
                self.table,
                alias,
                self.left,
                self.right
            ),
            None => format!(
                "{} {} ON {} = {}",
                self.kind.as_sql(),
                self.table,
                self.left,
                self.right
            ),
        }
    }
}

impl fmt::Display for JoinClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// JOINs plus an optional SELECT list for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOptions {
    #[serde(default)]
    pub joins: Vec<JoinClause>,
    /// Replaces the default SELECT list when non-empty.
    #[serde(default)]
    pub select_columns: Vec<String>,
}

impl JoinOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(mut self, clause: JoinClause) -> Self {
        self.joins.push(clause);
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.select_columns.is_empty()
    }

    /// Validate every clause, then every select column.
    pub fn validate(&self) -> Result<()> {
        for join in &self.joins {
            join.validate()?;
        }
        validate::validate_select_columns(&self.select_columns)
    }

    /// All JOIN clauses rendered and joined by a space.
    pub fn joins_sql(&self) -> String {
        self.joins
            .iter()
            .map(JoinClause::to_sql)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Combine a schema's default joins with request-supplied ones.
///
/// When one side is absent the other is returned as-is (borrowed). Otherwise
/// the joins are concatenated, defaults first, and the request's select list
/// wins only if it is non-empty.
pub fn merge<'a>(
    defaults: Option<&'a JoinOptions>,
    request: Option<&'a JoinOptions>,
) -> Option<Cow<'a, JoinOptions>> {
    match (defaults, request) {
        (None, None) => None,
        (None, Some(request)) => Some(Cow::Borrowed(request)),
        (Some(defaults), None) => Some(Cow::Borrowed(defaults)),
        (Some(defaults), Some(request)) => {
            let joins = defaults
                .joins
                .iter()
                .chain(&request.joins)
                .cloned()
                .collect();
            let select_columns = if request.select_columns.is_empty() {
                defaults.select_columns.clone()
            } else {
                request.select_columns.clone()
            };
            Some(Cow::Owned(JoinOptions {
                joins,
                select_columns,
            }))
        }
    }
}
