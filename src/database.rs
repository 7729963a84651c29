//! Database handles and the simple (blocking-cursor) execution path.

use std::sync::Arc;

use hedge_core::{
    DialectKind, HedgeError, Query, Result, Row, Statement, Value, hedge_trace_query,
};

use crate::config::{ConnectionConfig, FetchOptions};
use crate::driver::{self, Cursor, ExecResult, Lease};
use crate::fan_out::{self, FanOutResults};
use crate::race::{self, Winner};
use crate::registry::ConnectionRegistry;
use crate::stream::StreamSession;

/// Handle to one logical database. Cheap to clone.
///
/// Queries flagged with [`Query::run_parallel`] open a dedicated connection
/// that lives as long as their execution; every other query runs on the
/// registry's pooled connection for this name.
#[derive(Clone)]
pub struct Database {
    registry: Arc<ConnectionRegistry>,
    name: Arc<str>,
    config: Arc<ConnectionConfig>,
}

impl Database {
    pub(crate) fn new(registry: Arc<ConnectionRegistry>, name: &str, config: ConnectionConfig) -> Self {
        Self {
            registry,
            name: Arc::from(name),
            config: Arc::new(config),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[inline]
    pub fn kind(&self) -> DialectKind {
        self.config.kind
    }

    #[inline]
    pub fn options(&self) -> &FetchOptions {
        self.registry.fetch_options()
    }

    #[inline]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// An empty query using this database's dialect.
    pub fn query(&self) -> Query {
        Query::for_kind(self.kind())
    }

    async fn lease(&self, parallel: bool) -> Result<Lease> {
        if parallel {
            self.registry
                .open_dedicated(&self.name)
                .await
                .map(Lease::dedicated)
        } else {
            self.registry.pooled(&self.name).await.map(Lease::pooled)
        }
    }

    /// Run `statement` and return its cursor together with the connection it
    /// holds. On failure the connection has already been released.
    pub(crate) async fn open_cursor(
        &self,
        statement: &Statement,
        parallel: bool,
    ) -> Result<(Box<dyn Cursor>, Lease)> {
        hedge_trace_query!(statement.sql, statement.params.len());
        let timeout = self.options().statement_timeout;
        let lease = self.lease(parallel).await?;

        match lease.connection().query(statement, timeout).await {
            Ok(cursor) => Ok((cursor, lease)),
            Err(err) => {
                lease.release().await;
                Err(err)
            }
        }
    }

    async fn execute(&self, statement: &Statement, parallel: bool) -> Result<ExecResult> {
        hedge_trace_query!(statement.sql, statement.params.len());
        let timeout = self.options().statement_timeout;
        let lease = self.lease(parallel).await?;

        let executed = lease.connection().execute(statement, timeout).await;
        lease.release().await;
        executed
    }

    // -------------------------------------------------------------------------
    // Simple path
    // -------------------------------------------------------------------------

    /// Run the SELECT for `query` and return its rows.
    pub async fn fetch(&self, query: &Query) -> Result<Rows> {
        let statement = query.to_select();
        self.fetch_statement(&statement, query.is_parallel()).await
    }

    pub async fn fetch_statement(&self, statement: &Statement, parallel: bool) -> Result<Rows> {
        let (cursor, lease) = self.open_cursor(statement, parallel).await?;
        Ok(Rows::new(cursor, lease))
    }

    /// Run raw SQL that returns rows. Parameters are positional.
    pub async fn raw_query(&self, sql: &str, params: Vec<Value>) -> Result<Rows> {
        self.fetch_statement(&Statement::new(sql, params), false).await
    }

    /// Run raw SQL that returns no rows. Parameters are positional.
    pub async fn raw_non_query(&self, sql: &str, params: Vec<Value>) -> Result<ExecResult> {
        self.execute(&Statement::new(sql, params), false).await
    }

    /// Insert the query's insert payload, or apply its update payload.
    ///
    /// Dialects that read back the identity with a trailing clause report the
    /// id of the first inserted row.
    pub async fn save(&self, query: &Query) -> Result<ExecResult> {
        if query.has_insert() {
            let statement = query.to_insert();
            if query.dialect().last_insert_id_clause().is_none() {
                return self.execute(&statement, query.is_parallel()).await;
            }

            let rows = query.insert_row_count() as i64;
            let mut readback = self.fetch_statement(&statement, query.is_parallel()).await?;
            let identity = readback.next().await;
            readback.close().await?;
            let last = identity?
                .and_then(|row| row.get(0).and_then(Value::as_i64))
                .unwrap_or(-1);
            let last_insert_id = if last < 0 { None } else { Some(last - (rows - 1)) };
            return Ok(ExecResult {
                rows_affected: rows as u64,
                last_insert_id,
            });
        }

        if query.has_update() {
            return self.execute(&query.to_update(), query.is_parallel()).await;
        }

        Err(HedgeError::Statement(
            "nothing to save: query has no insert or update payload".into(),
        ))
    }

    pub async fn delete(&self, query: &Query) -> Result<ExecResult> {
        self.execute(&query.to_delete(), query.is_parallel()).await
    }

    pub async fn does_table_exist(&self, table: &str) -> Result<bool> {
        let statement = match self.kind() {
            DialectKind::Sqlite => Statement::new(
                "SELECT COUNT(*) num FROM sqlite_master WHERE type = 'table' AND name = ?",
                vec![Value::from(table)],
            ),
            kind => {
                let query = self.query();
                let num = query.count("*", "num");
                query
                    .table("information_schema.TABLES")
                    .cols([num])
                    .where_(catalog_column(kind), "=", self.config.database.as_str(), true)
                    .where_("TABLE_NAME", "=", table, true)
                    .to_select()
            }
        };
        Ok(self.count(&statement).await? > 0)
    }

    pub async fn does_column_exist(&self, table: &str, column: &str) -> Result<bool> {
        let statement = match self.kind() {
            DialectKind::Sqlite => Statement::new(
                "SELECT COUNT(*) num FROM pragma_table_info(?) WHERE name = ?",
                vec![Value::from(table), Value::from(column)],
            ),
            kind => {
                let query = self.query();
                let num = query.count("*", "num");
                query
                    .table("information_schema.COLUMNS")
                    .cols([num])
                    .where_(catalog_column(kind), "=", self.config.database.as_str(), true)
                    .where_("TABLE_NAME", "=", table, true)
                    .where_("COLUMN_NAME", "=", column, true)
                    .to_select()
            }
        };
        Ok(self.count(&statement).await? > 0)
    }

    async fn count(&self, statement: &Statement) -> Result<i64> {
        let mut rows = self.fetch_statement(statement, false).await?;
        let first = rows.next().await;
        rows.close().await?;
        Ok(first?
            .and_then(|row| row.get(0).and_then(Value::as_i64))
            .unwrap_or(0))
    }

    // -------------------------------------------------------------------------
    // Streaming, hedged and fan-out paths
    // -------------------------------------------------------------------------

    /// Start executing `query` and return its stream session immediately.
    /// Must be called inside a Tokio runtime.
    pub fn fetch_stream(&self, query: &Query) -> StreamSession {
        self.stream_statement(query.to_select(), query.is_parallel())
    }

    pub fn stream_statement(&self, statement: Statement, parallel: bool) -> StreamSession {
        let database = self.clone();
        StreamSession::spawn(async move { database.open_cursor(&statement, parallel).await })
    }

    /// Race `replicas` parallel executions of `query` and adopt the first one
    /// that becomes ready. The others are cancelled in the background.
    pub async fn race(&self, query: &Query) -> Result<Winner> {
        let query = query.clone().run_parallel();
        let sessions = (0..self.options().replicas.max(1))
            .map(|_| self.fetch_stream(&query))
            .collect();
        race::race(sessions).await
    }

    /// Race every query at once, bounded by the configured fan-out deadline.
    pub async fn concurrent_fetch<I>(&self, queries: I) -> FanOutResults
    where
        I: IntoIterator<Item = Query>,
    {
        let jobs = queries
            .into_iter()
            .map(|query| (self.clone(), query))
            .collect::<Vec<_>>();
        fan_out::concurrent_fetch(jobs, self.options().fan_out_deadline).await
    }
}

fn catalog_column(kind: DialectKind) -> &'static str {
    match kind {
        DialectKind::MySql => "TABLE_SCHEMA",
        _ => "TABLE_CATALOG",
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("kind", &self.config.kind)
            .finish()
    }
}

/// Rows from the simple fetch path.
///
/// The cursor and its connection are released when the rows are exhausted,
/// when the backend reports an error, or on [`Rows::close`].
pub struct Rows {
    cursor: Option<Box<dyn Cursor>>,
    lease: Option<Lease>,
}

impl Rows {
    pub(crate) fn new(cursor: Box<dyn Cursor>, lease: Lease) -> Self {
        Self {
            cursor: Some(cursor),
            lease: Some(lease),
        }
    }

    pub async fn next(&mut self) -> Result<Option<Row>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        let fetched = cursor.next().await;
        match fetched {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.close().await?;
                Ok(None)
            }
            Err(err) => {
                let _ = self.close().await;
                Err(err)
            }
        }
    }

    /// Release the cursor and connection. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let closed = match self.cursor.take() {
            Some(mut cursor) => cursor.close().await,
            None => Ok(()),
        };
        if let Some(lease) = self.lease.take() {
            lease.release().await;
        }
        closed
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    /// Read every remaining row.
    pub async fn collect(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        let (Some(mut cursor), Some(lease)) = (self.cursor.take(), self.lease.take()) else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                driver::close_cursor(cursor.as_mut()).await;
                lease.release().await;
            });
        }
    }
}
