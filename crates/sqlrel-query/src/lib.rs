//! Relation graph compiler and SQL fragment generator for SQLRel.
//!
//! `sqlrel-query` turns relation declarations into SQL text. It never talks to
//! a database.
//!
//! - [`RelationGraph`] flattens a root schema's relations (and the relations
//!   of their target schemas) into dependency order with full alias chains.
//! - The graph renders BelongsTo relations as JOINs with `prefix__field`
//!   columns and HasMany relations as correlated `JSON_AGG` subqueries.
//! - [`JoinClause`] / [`JoinOptions`] carry hand-written fragments, validated
//!   and merged over the graph's defaults.
//! - [`SelectQuery`] composes complete list, get, count and exists statements
//!   with `$n` parameters.

pub mod config;
pub mod fragments;
pub mod graph;
pub mod join;
pub mod select;

pub use config::CompilerConfig;
pub use fragments::EMPTY_JSON_ARRAY;
pub use graph::{CompiledRelation, RelationGraph};
pub use join::{JoinClause, JoinOptions, merge};
pub use select::{Filter, FilterOp, FindParams, SelectQuery, SortBy, SortDirection};
