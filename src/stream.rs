//! Streamed, cancellable result sessions.
//!
//! Each session is backed by a producer task that owns the cursor and its
//! connection. The consumer drives it with explicit signals:
//!
//! ```text
//! Pending --ready--> Ready --start--> Streaming --complete--> Completed
//!    |                 |                 |  ^
//!    |                 |               row  next
//!    |                 |                 v  |
//!    +--error--> Errored      cancel from Ready or Streaming --> Cancelled
//! ```
//!
//! At most one row is in flight: the producer offers a row and does not touch
//! the cursor again until the consumer acknowledges it with [`StreamSession::next`]
//! or cancels. Exactly one of complete, cancel or error ends a session, and the
//! cursor and connection are released before it is reported.
//!
//! Dropping a session that has not reached a terminal state cancels it.

use std::fmt;
use std::future::Future;

use futures_util::Stream;
use hedge_core::{HedgeError, Result, Row, hedge_trace_stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::driver::{self, Cursor, Lease};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The statement was sent; waiting for the backend
    Pending,
    Ready,
    Streaming,
    Completed,
    Cancelled,
    Errored,
}

impl SessionState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// What [`StreamSession::recv`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// A row that must be acknowledged with [`StreamSession::next`] or
    /// answered with [`StreamSession::cancel`].
    Row(Row),
    Complete,
}

enum Control {
    Start,
    Next,
    Cancel,
}

enum Event {
    Ready,
    Row(Row),
    Complete,
    Error(HedgeError),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Ready => "ready",
            Event::Row(_) => "row",
            Event::Complete => "complete",
            Event::Error(_) => "error",
        }
    }
}

/// Consumer side of one streamed execution.
pub struct StreamSession {
    control: mpsc::UnboundedSender<Control>,
    events: mpsc::Receiver<Event>,
    state: SessionState,
    row_pending: bool,
    producer: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Spawn the producer for an execution. `open` sends the statement and
    /// resolves to the cursor plus the connection lease that backs it.
    pub(crate) fn spawn<F>(open: F) -> Self
    where
        F: Future<Output = Result<(Box<dyn Cursor>, Lease)>> + Send + 'static,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        // Capacity 1: the producer only sends after the previous event was taken.
        let (events_tx, events_rx) = mpsc::channel(1);
        let producer = tokio::spawn(produce(open, control_rx, events_tx));
        Self {
            control: control_tx,
            events: events_rx,
            state: SessionState::Pending,
            row_pending: false,
            producer: Some(producer),
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Wait for the statement to be accepted.
    pub async fn ready(&mut self) -> Result<()> {
        match self.state {
            SessionState::Pending => {}
            SessionState::Ready | SessionState::Streaming => return Ok(()),
            _ => return Err(self.terminal_error()),
        }

        match self.events.recv().await {
            Some(Event::Ready) => {
                self.state = SessionState::Ready;
                hedge_trace_stream!("ready");
                Ok(())
            }
            Some(Event::Error(err)) => {
                self.state = SessionState::Errored;
                hedge_trace_stream!("error", error = %err);
                Err(err)
            }
            Some(event) => Err(self.violation(format!("{} signal before ready", event.name()))),
            None => Err(self.producer_gone()),
        }
    }

    /// Begin consuming rows. Waits for readiness first if needed.
    pub async fn start(&mut self) -> Result<()> {
        if self.state == SessionState::Pending {
            self.ready().await?;
        }

        match self.state {
            SessionState::Ready => {
                let _ = self.control.send(Control::Start);
                self.state = SessionState::Streaming;
                hedge_trace_stream!("start");
                Ok(())
            }
            SessionState::Streaming => Err(HedgeError::ProtocolViolation("start sent twice".into())),
            _ => Err(self.terminal_error()),
        }
    }

    /// Wait for the next row or for completion.
    pub async fn recv(&mut self) -> Result<Signal> {
        match self.state {
            SessionState::Streaming if self.row_pending => {
                return Err(HedgeError::ProtocolViolation(
                    "previous row not acknowledged; send next or cancel".into(),
                ));
            }
            SessionState::Streaming => {}
            SessionState::Pending | SessionState::Ready => {
                return Err(HedgeError::ProtocolViolation("recv before start".into()));
            }
            _ => return Err(self.terminal_error()),
        }

        match self.events.recv().await {
            Some(Event::Row(row)) => {
                self.row_pending = true;
                Ok(Signal::Row(row))
            }
            Some(Event::Complete) => {
                self.state = SessionState::Completed;
                self.producer = None;
                hedge_trace_stream!("complete");
                Ok(Signal::Complete)
            }
            Some(Event::Error(err)) => {
                self.state = SessionState::Errored;
                self.producer = None;
                hedge_trace_stream!("error", error = %err);
                Err(err)
            }
            Some(event) => Err(self.violation(format!("{} signal while streaming", event.name()))),
            None => Err(self.producer_gone()),
        }
    }

    /// Acknowledge the pending row so the producer advances.
    pub fn next(&mut self) -> Result<()> {
        if self.state != SessionState::Streaming || !self.row_pending {
            return Err(HedgeError::ProtocolViolation("next sent with no row pending".into()));
        }
        self.row_pending = false;
        let _ = self.control.send(Control::Next);
        Ok(())
    }

    /// Stop the execution. Returns once the cursor and connection have been
    /// released. No complete signal follows.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(HedgeError::ProtocolViolation(format!(
                "cancel sent after session {}",
                self.state
            )));
        }

        let _ = self.control.send(Control::Cancel);
        self.state = SessionState::Cancelled;
        self.row_pending = false;
        hedge_trace_stream!("cancel");
        if let Some(producer) = self.producer.take() {
            let _ = producer.await;
        }
        Ok(())
    }

    /// Consume the session as a stream of rows. Each row is acknowledged when
    /// the next one is requested.
    pub fn into_stream(self) -> impl Stream<Item = Result<Row>> + Send {
        futures_util::stream::unfold(Some(self), |session| async move {
            let mut session = session?;
            if session.row_pending
                && let Err(err) = session.next()
            {
                return Some((Err(err), None));
            }
            if session.state != SessionState::Streaming
                && let Err(err) = session.start().await
            {
                return Some((Err(err), None));
            }
            match session.recv().await {
                Ok(Signal::Row(row)) => Some((Ok(row), Some(session))),
                Ok(Signal::Complete) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    fn terminal_error(&self) -> HedgeError {
        match self.state {
            SessionState::Cancelled => HedgeError::Cancelled,
            state => HedgeError::ProtocolViolation(format!("session already {state}")),
        }
    }

    fn violation(&mut self, message: String) -> HedgeError {
        self.state = SessionState::Errored;
        HedgeError::ProtocolViolation(message)
    }

    fn producer_gone(&mut self) -> HedgeError {
        self.state = SessionState::Errored;
        HedgeError::Connection("stream producer stopped unexpectedly".into())
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            let _ = self.control.send(Control::Cancel);
        }
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state)
            .field("row_pending", &self.row_pending)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Producer
// -----------------------------------------------------------------------------

enum Fetched {
    Row(Result<Option<Row>>),
    Cancel,
    Ignore,
}

async fn produce<F>(
    open: F,
    mut control: mpsc::UnboundedReceiver<Control>,
    events: mpsc::Sender<Event>,
) where
    F: Future<Output = Result<(Box<dyn Cursor>, Lease)>>,
{
    let (mut cursor, lease) = match open.await {
        Ok(opened) => opened,
        Err(err) => {
            let _ = events.send(Event::Error(err)).await;
            return;
        }
    };

    if events.send(Event::Ready).await.is_err() || !proceed(&mut control).await {
        release(cursor, lease).await;
        return;
    }

    loop {
        let fetched = tokio::select! {
            biased;
            signal = control.recv() => match signal {
                Some(Control::Cancel) | None => Fetched::Cancel,
                Some(_) => Fetched::Ignore,
            },
            fetched = cursor.next() => Fetched::Row(fetched),
        };

        match fetched {
            Fetched::Ignore => continue,
            Fetched::Cancel => {
                release(cursor, lease).await;
                return;
            }
            Fetched::Row(Ok(Some(row))) => {
                if events.send(Event::Row(row)).await.is_err() || !proceed(&mut control).await {
                    release(cursor, lease).await;
                    return;
                }
            }
            Fetched::Row(Ok(None)) => {
                release(cursor, lease).await;
                let _ = events.send(Event::Complete).await;
                return;
            }
            Fetched::Row(Err(err)) => {
                release(cursor, lease).await;
                let _ = events.send(Event::Error(err)).await;
                return;
            }
        }
    }
}

/// Wait for the consumer to start or acknowledge. `false` means stop.
async fn proceed(control: &mut mpsc::UnboundedReceiver<Control>) -> bool {
    matches!(control.recv().await, Some(Control::Start | Control::Next))
}

async fn release(mut cursor: Box<dyn Cursor>, lease: Lease) {
    driver::close_cursor(cursor.as_mut()).await;
    lease.release().await;
}
