//! # hedge
//!
//! A SQL query builder with hedged, streamed execution.
//!
//! Queries are built with [`Query`] (re-exported from `hedge-core`) and run
//! against a logical database resolved through a [`ConnectionRegistry`]:
//!
//! - [`Database::fetch`] returns [`Rows`] for simple, sequential reads.
//! - [`Database::fetch_stream`] returns a [`StreamSession`], a cancellable
//!   stream with explicit ready/start/next signals and one row in flight.
//! - [`Database::race`] runs several redundant executions and adopts the
//!   first one that becomes ready, cancelling the rest.
//! - [`Database::concurrent_fetch`] races many queries at once under a
//!   single deadline.
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "rusqlite")]
//! # async fn demo() -> hedge::Result<()> {
//! use std::sync::Arc;
//! use hedge::{ConnectionConfig, ConnectionRegistry, Connections};
//!
//! let connections = Connections::new().insert("app", ConnectionConfig::sqlite("./app.db"));
//! let registry = Arc::new(ConnectionRegistry::with_default_drivers(connections));
//! let db = registry.open("app")?;
//!
//! let query = db
//!     .query()
//!     .table("users")
//!     .cols(["id", "name"])
//!     .where_("active", "=", 1, true)
//!     .order_by("name", "asc");
//!
//! let mut rows = db.fetch(&query).await?;
//! while let Some(row) = rows.next().await? {
//!     println!("{:?}", row.get_by_name("name"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Database Support
//!
//! | Database   | Driver         | Feature Flag     |
//! |------------|----------------|------------------|
//! | SQLite     | rusqlite       | `rusqlite`       |
//! | PostgreSQL | tokio-postgres | `tokio-postgres` |
//!
//! MySQL and SQL Server statements can be built with every feature set; run
//! them by registering a custom [`Driver`].

pub mod config;
pub mod database;
pub mod driver;
pub mod fan_out;
pub mod race;
pub mod registry;
pub mod stream;

pub use config::{ConnectionConfig, Connections, FetchOptions};
pub use database::{Database, Rows};
pub use driver::{Connection, Cursor, Driver, ExecResult};
pub use fan_out::{FanOutResults, concurrent_fetch, fan_out};
pub use race::{Winner, race};
pub use registry::ConnectionRegistry;
pub use stream::{SessionState, Signal, StreamSession};

pub use hedge_core::{
    AggregateError, Binding, Clause, Condition, Connector, Dialect, DialectKind, Direction,
    HedgeError, Join, JoinKind, MySql, OrderBy, ParamNaming, Postgres, Predicate, Query, Result,
    Row, SqlFragment, SqlServer, Sqlite, Statement, Value,
};

/// Error type for every hedge operation.
pub use hedge_core::HedgeError as Error;

pub mod prelude {
    pub use crate::{ConnectionRegistry, Connections, Database, Query, Signal, Value};
}
