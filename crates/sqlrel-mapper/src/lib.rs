//! Row-to-entity assembly for SQLRel.
//!
//! The compiler in `sqlrel-query` flattens a relation graph into one row per
//! root entity: BelongsTo columns named `alias__field`, HasMany collections as
//! a single `alias__json` array. This crate walks those rows back into nested
//! entities.
//!
//! - [`RelationMapper`] maps the unprefixed cells with a leaf mapper, then
//!   hands each relation its slice of the row (or its JSON array) and attaches
//!   the result.
//! - A BelongsTo relation whose own columns are all NULL is treated as "no
//!   match" and skipped together with everything beneath it.
//! - [`decode_has_many`] distinguishes a missing collection (`NULL`) from an
//!   empty one (`[]`).

pub mod config;
pub mod json;
pub mod mapper;

pub use config::{ChildErrorPolicy, MapperConfig};
pub use json::decode_has_many;
pub use mapper::RelationMapper;
