//! Dialect-neutral SQL construction for hedge.
//!
//! Values, the clause store and predicate renderer, SQL fragments, dialect
//! strategies and the query builder. Nothing here performs I/O.

pub mod clause;
pub mod dialect;
mod drivers;
pub mod error;
pub mod join;
pub mod query;
pub mod render;
pub mod sql;
pub mod tracing;
pub mod value;

// Re-export key types and traits
pub use clause::{Clause, Condition, Connector, ParamNaming, Predicate};
pub use dialect::{Binding, Dialect, DialectKind, MySql, Postgres, SqlServer, Sqlite};
pub use error::{AggregateError, HedgeError, Result};
pub use join::{Join, JoinKind, Source};
pub use query::{Direction, OrderBy, Query};
pub use render::render_predicate;
pub use sql::{BoundParam, Chunk, SqlFragment, Statement};
pub use value::{Row, Value};
