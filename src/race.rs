//! Replica race: adopt whichever execution becomes ready first.

use hedge_core::{AggregateError, HedgeError, Result, hedge_trace_race, hedge_trace_warn};
use tokio::sync::mpsc;

use crate::stream::StreamSession;

/// The adopted execution of a race.
#[derive(Debug)]
pub struct Winner {
    /// Position of the winning session in the input.
    pub index: usize,
    pub session: StreamSession,
}

type Report = (usize, Result<StreamSession>);

/// Wait for the first session to become ready and return it.
///
/// Launch order does not matter, only readiness order. Sessions that become
/// ready after the winner are cancelled exactly once by a background task.
/// Failed sessions are not reported unless every session fails, in which
/// case all errors are returned in the order they arrived.
pub async fn race(sessions: Vec<StreamSession>) -> Result<Winner> {
    let total = sessions.len();
    if total == 0 {
        return Err(AggregateError::default().into());
    }

    let (reports_tx, mut reports) = mpsc::channel::<Report>(total);
    for (index, mut session) in sessions.into_iter().enumerate() {
        let reports_tx = reports_tx.clone();
        tokio::spawn(async move {
            let outcome = session.ready().await.map(|()| session);
            // A closed channel drops the session, which cancels it.
            let _ = reports_tx.send((index, outcome)).await;
        });
    }
    drop(reports_tx);

    let mut errors = Vec::new();
    while let Some((index, outcome)) = reports.recv().await {
        match outcome {
            Ok(session) => {
                hedge_trace_race!("winner", replica = index, failed = errors.len());
                tokio::spawn(cancel_losers(reports));
                return Ok(Winner { index, session });
            }
            Err(err) => {
                hedge_trace_warn!(err, replica = index);
                errors.push(err);
            }
        }
    }

    hedge_trace_race!("all failed", replicas = total);
    Err(HedgeError::Aggregate(AggregateError::new(errors)))
}

async fn cancel_losers(mut reports: mpsc::Receiver<Report>) {
    while let Some((index, outcome)) = reports.recv().await {
        if let Ok(mut session) = outcome {
            hedge_trace_race!("cancel loser", replica = index);
            let _ = session.cancel().await;
        }
    }
}
