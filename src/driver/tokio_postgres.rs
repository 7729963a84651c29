//! PostgreSQL driver backed by [`tokio_postgres`].
//!
//! Statement timeouts are enforced by the server through the session's
//! `statement_timeout`, so a statement that runs out of time is cancelled and
//! rolled back there rather than abandoned by the client.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use hedge_core::{HedgeError, Result, Row, Statement, Value};
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, RowStream};

use crate::config::ConnectionConfig;
use crate::driver::{Connection, Cursor, Driver, ExecResult, statement_timeout};

/// Connects without TLS using the config's key/value connection string.
#[derive(Debug, Clone, Default)]
pub struct TokioPostgresDriver;

impl Driver for TokioPostgresDriver {
    fn open<'a>(&'a self, config: &'a ConnectionConfig) -> BoxFuture<'a, Result<Arc<dyn Connection>>> {
        Box::pin(async move {
            let params = config.connection_string();
            let (client, connection) = tokio_postgres::connect(&params, NoTls).await?;
            let task = tokio::spawn(async move {
                if let Err(err) = connection.await {
                    hedge_core::hedge_trace_warn!(err, stage = "postgres connection");
                }
            });
            Ok(Arc::new(PostgresConnection {
                client,
                task: Mutex::new(Some(task)),
                session_timeout: AtomicU64::new(0),
            }) as Arc<dyn Connection>)
        })
    }
}

pub struct PostgresConnection {
    client: Client,
    task: Mutex<Option<JoinHandle<()>>>,
    /// `statement_timeout` last set on the session, in milliseconds. `0` means
    /// the server default.
    session_timeout: AtomicU64,
}

impl PostgresConnection {
    async fn apply_timeout(&self, timeout: Duration) -> Result<()> {
        let millis = timeout.as_millis().min(i32::MAX as u128) as u64;
        if self.session_timeout.swap(millis, Ordering::AcqRel) == millis {
            return Ok(());
        }
        let set = format!("SET statement_timeout = {millis}");
        if let Err(err) = self.client.batch_execute(&set).await {
            self.session_timeout.store(0, Ordering::Release);
            return Err(err.into());
        }
        Ok(())
    }
}

impl Connection for PostgresConnection {
    fn query<'a>(
        &'a self,
        statement: &'a Statement,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Box<dyn Cursor>>> {
        Box::pin(async move {
            self.apply_timeout(timeout).await?;
            let prepared = self
                .client
                .prepare(&statement.sql)
                .await
                .map_err(|err| postgres_error(err, timeout))?;
            let columns: Arc<[String]> = prepared
                .columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect();
            let rows = self
                .client
                .query_raw(&prepared, statement.params.iter())
                .await
                .map_err(|err| postgres_error(err, timeout))?;
            Ok(Box::new(PostgresCursor {
                rows: Some(Box::pin(rows)),
                columns,
                timeout,
            }) as Box<dyn Cursor>)
        })
    }

    fn execute<'a>(
        &'a self,
        statement: &'a Statement,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ExecResult>> {
        Box::pin(async move {
            self.apply_timeout(timeout).await?;
            let rows_affected = self
                .client
                .execute_raw(statement.sql.as_str(), statement.params.iter())
                .await
                .map_err(|err| postgres_error(err, timeout))?;
            Ok(ExecResult {
                rows_affected,
                last_insert_id: None,
            })
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Box::pin(async move {
            if let Some(task) = task {
                task.abort();
            }
            Ok(())
        })
    }
}

struct PostgresCursor {
    rows: Option<Pin<Box<RowStream>>>,
    columns: Arc<[String]>,
    timeout: Duration,
}

impl Cursor for PostgresCursor {
    fn next(&mut self) -> BoxFuture<'_, Result<Option<Row>>> {
        Box::pin(async move {
            let Some(rows) = self.rows.as_mut() else {
                return Ok(None);
            };
            let fetched = rows.next().await.transpose();
            let Some(row) = fetched.map_err(|err| postgres_error(err, self.timeout))? else {
                return Ok(None);
            };
            let values = (0..row.len())
                .map(|i| row.try_get::<_, Value>(i))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(Row::new(Arc::clone(&self.columns), values)))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        self.rows = None;
        Box::pin(async { Ok(()) })
    }
}

/// Server-side cancellations surface as timeouts; everything else passes
/// through.
fn postgres_error(err: tokio_postgres::Error, timeout: Duration) -> HedgeError {
    if err.code() == Some(&SqlState::QUERY_CANCELED) {
        statement_timeout(timeout)
    } else {
        err.into()
    }
}
