//! Backend driver contracts.
//!
//! A [`Driver`] opens [`Connection`]s from a [`ConnectionConfig`]. Connections
//! run statements and hand back forward-only [`Cursor`]s. Every method returns
//! a boxed future so the traits stay object safe and drivers can be mixed in
//! one registry.

#[cfg(feature = "rusqlite")]
pub mod rusqlite;
#[cfg(feature = "tokio-postgres")]
pub mod tokio_postgres;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use hedge_core::{HedgeError, Result, Row, Statement};

use crate::config::ConnectionConfig;

/// The error a connection reports when a statement runs past its timeout.
pub fn statement_timeout(timeout: Duration) -> HedgeError {
    HedgeError::Timeout(format!("statement exceeded {timeout:?}"))
}

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Identity generated by the statement, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

pub trait Driver: Send + Sync {
    fn open<'a>(&'a self, config: &'a ConnectionConfig) -> BoxFuture<'a, Result<Arc<dyn Connection>>>;
}

/// An open connection. Pooled connections are shared between concurrent
/// executions, so implementations must tolerate concurrent calls.
///
/// Implementations enforce the `timeout` they are given and report
/// [`statement_timeout`] when it runs out. A statement reported as timed out
/// must not take effect afterwards.
pub trait Connection: Send + Sync {
    /// Run a row-returning statement. `timeout` bounds opening the cursor,
    /// not reading its rows.
    fn query<'a>(
        &'a self,
        statement: &'a Statement,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Box<dyn Cursor>>>;

    fn execute<'a>(
        &'a self,
        statement: &'a Statement,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ExecResult>>;

    fn close(&self) -> BoxFuture<'_, Result<()>>;
}

/// Forward-only row source. `next` yields `None` once exhausted.
pub trait Cursor: Send {
    fn next(&mut self) -> BoxFuture<'_, Result<Option<Row>>>;

    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// A connection checked out for one execution.
///
/// Dedicated connections belong to the execution and are closed on release.
/// Pooled connections stay open for the next caller.
pub(crate) struct Lease {
    connection: Arc<dyn Connection>,
    dedicated: bool,
}

impl Lease {
    pub(crate) fn pooled(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            dedicated: false,
        }
    }

    pub(crate) fn dedicated(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            dedicated: true,
        }
    }

    #[inline]
    pub(crate) fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    /// Give the connection back. Close failures are logged, not returned.
    pub(crate) async fn release(self) {
        if self.dedicated
            && let Err(err) = self.connection.close().await
        {
            hedge_core::hedge_trace_warn!(err, stage = "close connection");
        }
    }
}

/// Close a cursor, logging rather than returning a failure.
pub(crate) async fn close_cursor(cursor: &mut dyn Cursor) {
    if let Err(err) = cursor.close().await {
        hedge_core::hedge_trace_warn!(err, stage = "close cursor");
    }
}
