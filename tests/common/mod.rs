//! Scripted in-memory driver for exercising the runtime without a server.
//!
//! Scripts and counters are keyed by the configured `database` name, so each
//! logical database in a test can behave differently.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use hedge::driver::statement_timeout;
use hedge::{
    Connection, ConnectionConfig, ConnectionRegistry, Connections, Cursor, Database, DialectKind,
    Driver, ExecResult, FetchOptions, HedgeError, Result, Row, Statement, Value,
};

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub open_delay: Duration,
    pub open_error: Option<String>,
    pub query_delay: Duration,
    pub query_error: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// The cursor fails instead of yielding the row at this index.
    pub fail_at_row: Option<usize>,
    pub exec_result: ExecResult,
}

impl Script {
    pub fn rows<C, R>(columns: C, rows: R) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator<Item = Vec<Value>>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: rows.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Three rows of `(id, name)`.
    pub fn users() -> Self {
        Self::rows(
            ["id", "name"],
            [
                vec![Value::from(1), Value::from("ann")],
                vec![Value::from(2), Value::from("bob")],
                vec![Value::from(3), Value::from("cy")],
            ],
        )
    }

    pub fn open_delay(mut self, millis: u64) -> Self {
        self.open_delay = Duration::from_millis(millis);
        self
    }

    pub fn open_error(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }

    pub fn query_delay(mut self, millis: u64) -> Self {
        self.query_delay = Duration::from_millis(millis);
        self
    }

    pub fn query_error(mut self, message: &str) -> Self {
        self.query_error = Some(message.to_string());
        self
    }

    pub fn fail_at_row(mut self, index: usize) -> Self {
        self.fail_at_row = Some(index);
        self
    }

    pub fn exec_result(mut self, rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        self.exec_result = ExecResult {
            rows_affected,
            last_insert_id,
        };
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub opens: usize,
    pub connection_closes: usize,
    pub cursor_closes: usize,
    pub rows_served: usize,
    pub queries: Vec<Statement>,
    pub executes: Vec<Statement>,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    counters: Arc<Mutex<HashMap<String, Counters>>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, database: &str, script: Script) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(database.to_string(), script);
        self
    }

    pub fn counters(&self, database: &str) -> Counters {
        self.counters
            .lock()
            .unwrap()
            .get(database)
            .cloned()
            .unwrap_or_default()
    }

    fn bump(&self, database: &str, update: impl FnOnce(&mut Counters)) {
        let mut counters = self.counters.lock().unwrap();
        update(counters.entry(database.to_string()).or_default());
    }

    fn script_for(&self, database: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get(database)
            .cloned()
            .unwrap_or_default()
    }
}

impl Driver for MockDriver {
    fn open<'a>(&'a self, config: &'a ConnectionConfig) -> BoxFuture<'a, Result<Arc<dyn Connection>>> {
        Box::pin(async move {
            let database = config.database.clone();
            let script = self.script_for(&database);
            tokio::time::sleep(script.open_delay).await;
            if let Some(message) = &script.open_error {
                return Err(HedgeError::Connection(message.clone()));
            }
            self.bump(&database, |c| c.opens += 1);
            Ok(Arc::new(MockConnection {
                driver: self.clone(),
                database,
                script,
            }) as Arc<dyn Connection>)
        })
    }
}

struct MockConnection {
    driver: MockDriver,
    database: String,
    script: Script,
}

impl MockConnection {
    /// Simulated backend work, bounded by the statement timeout.
    async fn work(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, tokio::time::sleep(self.script.query_delay))
            .await
            .map_err(|_| statement_timeout(timeout))
    }
}

impl Connection for MockConnection {
    fn query<'a>(
        &'a self,
        statement: &'a Statement,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Box<dyn Cursor>>> {
        Box::pin(async move {
            self.driver
                .bump(&self.database, |c| c.queries.push(statement.clone()));
            self.work(timeout).await?;
            if let Some(message) = &self.script.query_error {
                return Err(HedgeError::Statement(message.clone()));
            }
            Ok(Box::new(MockCursor {
                driver: self.driver.clone(),
                database: self.database.clone(),
                columns: self.script.columns.clone().into(),
                rows: self.script.rows.clone().into(),
                fail_at_row: self.script.fail_at_row,
                served: 0,
                closed: false,
            }) as Box<dyn Cursor>)
        })
    }

    fn execute<'a>(
        &'a self,
        statement: &'a Statement,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ExecResult>> {
        Box::pin(async move {
            self.driver
                .bump(&self.database, |c| c.executes.push(statement.clone()));
            self.work(timeout).await?;
            match &self.script.query_error {
                Some(message) => Err(HedgeError::Statement(message.clone())),
                None => Ok(self.script.exec_result),
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.driver.bump(&self.database, |c| c.connection_closes += 1);
            Ok(())
        })
    }
}

struct MockCursor {
    driver: MockDriver,
    database: String,
    columns: Arc<[String]>,
    rows: VecDeque<Vec<Value>>,
    fail_at_row: Option<usize>,
    served: usize,
    closed: bool,
}

impl Cursor for MockCursor {
    fn next(&mut self) -> BoxFuture<'_, Result<Option<Row>>> {
        Box::pin(async move {
            if self.fail_at_row == Some(self.served) {
                return Err(HedgeError::Connection("connection reset".into()));
            }
            let Some(values) = self.rows.pop_front() else {
                return Ok(None);
            };
            self.served += 1;
            self.driver.bump(&self.database, |c| c.rows_served += 1);
            Ok(Some(Row::new(Arc::clone(&self.columns), values)))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.closed {
                self.closed = true;
                self.driver.bump(&self.database, |c| c.cursor_closes += 1);
            }
            Ok(())
        })
    }
}

/// Registry where every name is a MySQL database served by `driver`.
pub fn registry(driver: &MockDriver, names: &[&str]) -> Arc<ConnectionRegistry> {
    let databases: Vec<_> = names.iter().map(|n| (*n, DialectKind::MySql)).collect();
    registry_with(driver, &databases, FetchOptions::default())
}

pub fn registry_with(
    driver: &MockDriver,
    databases: &[(&str, DialectKind)],
    options: FetchOptions,
) -> Arc<ConnectionRegistry> {
    let connections = databases
        .iter()
        .fold(Connections::new(), |connections, (name, kind)| {
            connections.insert(*name, ConnectionConfig::new(*kind, *name))
        })
        .with_fetch_options(options);

    let mut registry = ConnectionRegistry::new(connections);
    for kind in DialectKind::ALL {
        registry.register_driver(*kind, Arc::new(driver.clone()));
    }
    Arc::new(registry)
}

pub fn open(registry: &Arc<ConnectionRegistry>, name: &str) -> Database {
    registry.open(name).unwrap()
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
