//! SQLite driver backed by [`rusqlite`].
//!
//! rusqlite is synchronous, so every call runs on Tokio's blocking pool. A
//! cursor keeps its connection locked until it is exhausted or closed: a
//! pooled SQLite connection serves one open cursor at a time and other
//! statements on it wait for that cursor to be released.
//!
//! Waiting for the lock counts against the statement timeout. A call that
//! times out before it gets the lock is abandoned and never runs. One that
//! is already running is interrupted, and the caller gets whatever the
//! statement actually did.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use hedge_core::{HedgeError, Result, Row, Statement, Value};
use rusqlite::{ErrorCode, InterruptHandle, params_from_iter};
use tokio::sync::{mpsc, oneshot};

use crate::config::ConnectionConfig;
use crate::driver::{Connection, Cursor, Driver, ExecResult, statement_timeout};

/// Opens SQLite databases; `database` in the config is the file path.
#[derive(Debug, Clone)]
pub struct RusqliteDriver {
    busy_timeout: Duration,
}

impl RusqliteDriver {
    pub fn new(busy_timeout: Duration) -> Self {
        Self { busy_timeout }
    }
}

impl Default for RusqliteDriver {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Driver for RusqliteDriver {
    fn open<'a>(&'a self, config: &'a ConnectionConfig) -> BoxFuture<'a, Result<Arc<dyn Connection>>> {
        let path = config.connection_string();
        let busy_timeout = self.busy_timeout;
        Box::pin(async move {
            let conn = blocking(move || {
                let conn = rusqlite::Connection::open(&path)?;
                conn.busy_timeout(busy_timeout)?;
                Ok(conn)
            })
            .await?;
            let interrupt = Arc::new(conn.get_interrupt_handle());
            Ok(Arc::new(RusqliteConnection {
                inner: Arc::new(Mutex::new(Some(conn))),
                interrupt,
            }) as Arc<dyn Connection>)
        })
    }
}

type Shared = Arc<Mutex<Option<rusqlite::Connection>>>;

pub struct RusqliteConnection {
    inner: Shared,
    interrupt: Arc<InterruptHandle>,
}

impl Connection for RusqliteConnection {
    fn query<'a>(
        &'a self,
        statement: &'a Statement,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Box<dyn Cursor>>> {
        let inner = Arc::clone(&self.inner);
        let statement = statement.clone();
        let call = Call::new(Arc::clone(&self.interrupt));
        let worker = Arc::clone(&call);
        Box::pin(async move {
            let (ready_tx, mut ready_rx) = oneshot::channel();
            let (rows_tx, rows_rx) = mpsc::channel(1);
            tokio::task::spawn_blocking(move || {
                stream_rows(&inner, &statement, &worker, timeout, ready_tx, rows_tx)
            });

            let mut pending = Pending::new(call);
            let opened = match tokio::time::timeout(timeout, &mut ready_rx).await {
                Ok(opened) => opened,
                Err(_) if pending.abandon() => return Err(statement_timeout(timeout)),
                Err(_) => (&mut ready_rx).await,
            };
            pending.disarm();

            match opened {
                Ok(Ok(())) => Ok(Box::new(RusqliteCursor { rows: Some(rows_rx) }) as Box<dyn Cursor>),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(HedgeError::Connection("sqlite worker stopped".into())),
            }
        })
    }

    fn execute<'a>(
        &'a self,
        statement: &'a Statement,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ExecResult>> {
        let inner = Arc::clone(&self.inner);
        let statement = statement.clone();
        let call = Call::new(Arc::clone(&self.interrupt));
        let worker = Arc::clone(&call);
        Box::pin(async move {
            let mut handle = tokio::task::spawn_blocking(move || {
                let guard = lock(&inner);
                if !worker.begin() {
                    return Err(statement_timeout(timeout));
                }
                let executed = execute_locked(guard.as_ref(), &statement, timeout);
                worker.finish();
                executed
            });

            let mut pending = Pending::new(call);
            let joined = match tokio::time::timeout(timeout, &mut handle).await {
                Ok(joined) => joined,
                Err(_) if pending.abandon() => return Err(statement_timeout(timeout)),
                Err(_) => (&mut handle).await,
            };
            pending.disarm();
            joined.map_err(|e| HedgeError::Connection(format!("sqlite worker failed: {e}")))?
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(blocking(move || match lock(&inner).take() {
            Some(conn) => conn.close().map_err(|(_, err)| err.into()),
            None => Ok(()),
        }))
    }
}

fn execute_locked(
    conn: Option<&rusqlite::Connection>,
    statement: &Statement,
    timeout: Duration,
) -> Result<ExecResult> {
    let conn = conn.ok_or_else(closed)?;
    let changed = conn
        .execute(&statement.sql, params_from_iter(statement.params.iter()))
        .map_err(|err| sqlite_error(err, timeout))?;
    let rowid = conn.last_insert_rowid();
    Ok(ExecResult {
        rows_affected: changed as u64,
        last_insert_id: (changed > 0 && rowid > 0).then_some(rowid),
    })
}

// -----------------------------------------------------------------------------
// Call lifecycle
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Waiting,
    Running,
    Finished,
    Abandoned,
}

/// One statement's progress on a shared connection.
///
/// The worker moves `Waiting -> Running -> Finished` while it holds the
/// connection lock. The caller may abandon a waiting call, or interrupt a
/// running one. Both sides take the state lock for every transition, so an
/// interrupt can only ever reach this call's own statement.
struct Call {
    state: Mutex<CallState>,
    interrupt: Arc<InterruptHandle>,
}

impl Call {
    fn new(interrupt: Arc<InterruptHandle>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CallState::Waiting),
            interrupt,
        })
    }

    fn state(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the call for the worker. `false` when the caller gave up first.
    fn begin(&self) -> bool {
        let mut state = self.state();
        if *state != CallState::Waiting {
            return false;
        }
        *state = CallState::Running;
        true
    }

    /// Must run before the worker releases the connection lock.
    fn finish(&self) {
        let mut state = self.state();
        if *state == CallState::Running {
            *state = CallState::Finished;
        }
    }

    /// Gives up on the call. Returns `true` when the statement never started;
    /// a running statement is interrupted instead.
    fn abandon(&self) -> bool {
        let mut state = self.state();
        match *state {
            CallState::Waiting => {
                *state = CallState::Abandoned;
                true
            }
            CallState::Running => {
                self.interrupt.interrupt();
                false
            }
            CallState::Finished | CallState::Abandoned => false,
        }
    }
}

/// Abandons its call when the caller's future is dropped before the outcome
/// is known.
struct Pending {
    call: Option<Arc<Call>>,
}

impl Pending {
    fn new(call: Arc<Call>) -> Self {
        Self { call: Some(call) }
    }

    fn abandon(&self) -> bool {
        self.call.as_ref().is_some_and(|call| call.abandon())
    }

    fn disarm(&mut self) {
        self.call = None;
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(call) = self.call.take() {
            call.abandon();
        }
    }
}

struct RusqliteCursor {
    rows: Option<mpsc::Receiver<Result<Row>>>,
}

impl Cursor for RusqliteCursor {
    fn next(&mut self) -> BoxFuture<'_, Result<Option<Row>>> {
        Box::pin(async move {
            match self.rows.as_mut() {
                Some(rows) => rows.recv().await.transpose(),
                None => Ok(None),
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        // Dropping the receiver stops the worker and unlocks the connection.
        self.rows = None;
        Box::pin(async { Ok(()) })
    }
}

fn stream_rows(
    inner: &Mutex<Option<rusqlite::Connection>>,
    statement: &Statement,
    call: &Call,
    timeout: Duration,
    ready: oneshot::Sender<Result<()>>,
    rows: mpsc::Sender<Result<Row>>,
) {
    let guard = lock(inner);
    if !call.begin() {
        return;
    }
    let opened = guard
        .as_ref()
        .ok_or_else(closed)
        .and_then(|conn| {
            conn.prepare(&statement.sql)
                .map_err(|err| sqlite_error(err, timeout))
        });
    let mut stmt = match opened {
        Ok(stmt) => stmt,
        Err(err) => {
            call.finish();
            let _ = ready.send(Err(err));
            return;
        }
    };
    let columns: Arc<[String]> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let queried = stmt.query(params_from_iter(statement.params.iter()));
    call.finish();
    let mut cursor = match queried {
        Ok(cursor) => cursor,
        Err(err) => {
            let _ = ready.send(Err(sqlite_error(err, timeout)));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    loop {
        let fetched = cursor.next().and_then(|row| match row {
            Some(row) => (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map(|values| Some(Row::new(Arc::clone(&columns), values))),
            None => Ok(None),
        });

        match fetched {
            Ok(Some(row)) => {
                if rows.blocking_send(Ok(row)).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(err) => {
                let _ = rows.blocking_send(Err(err.into()));
                return;
            }
        }
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| HedgeError::Connection(format!("sqlite worker failed: {e}")))?
}

fn lock(inner: &Mutex<Option<rusqlite::Connection>>) -> MutexGuard<'_, Option<rusqlite::Connection>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Interrupted statements surface as timeouts; everything else passes through.
fn sqlite_error(err: rusqlite::Error, timeout: Duration) -> HedgeError {
    if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
        statement_timeout(timeout)
    } else {
        err.into()
    }
}

fn closed() -> HedgeError {
    HedgeError::Connection("sqlite connection is closed".into())
}
