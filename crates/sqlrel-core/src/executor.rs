//! The query execution seam.
//!
//! SQLRel generates SQL and assembles results; running the statement is the
//! job of whatever driver the application already uses. Drivers implement
//! [`QueryExecutor`] and receive SQL text with `$n` placeholders plus the
//! bound parameters.

use std::future::Future;

use asupersync::{Cx, Outcome};

use crate::error::{Error, QueryError, QueryErrorKind};
use crate::row::Row;
use crate::value::Value;

/// Runs a read-only statement and returns its rows.
pub trait QueryExecutor: Send + Sync {
    /// Execute `sql` with `params` bound to `$1..$n`.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute and return at most one row.
    ///
    /// More than one row is reported as [`QueryErrorKind::UnexpectedResult`].
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        async move {
            let mut rows = match self.query(cx, sql, params).await {
                Outcome::Ok(rows) => rows,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if rows.len() > 1 {
                return Outcome::Err(Error::Query(
                    QueryError {
                        kind: QueryErrorKind::UnexpectedResult,
                        message: format!("expected at most one row, got {}", rows.len()),
                        sql: None,
                    }
                    .with_sql(sql),
                ));
            }
            Outcome::Ok(rows.pop())
        }
    }
}
