//! Fan-out: run many executions at once under one deadline.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use hedge_core::{Query, Result, hedge_trace_race};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::database::Database;
use crate::stream::StreamSession;

/// Outcomes keyed by input position. Positions missing from the map did not
/// finish before the deadline.
pub type FanOutResults = BTreeMap<usize, Result<StreamSession>>;

type Report = (usize, Result<StreamSession>);

/// Drive every future concurrently and collect what finishes before
/// `deadline`.
///
/// A short map is a partial success. Sessions that become ready after the
/// deadline are cancelled in the background.
pub async fn fan_out<I, F>(futures: I, deadline: Duration) -> FanOutResults
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<StreamSession>> + Send + 'static,
{
    let deadline = Instant::now() + deadline;
    let (reports_tx, mut reports) = mpsc::unbounded_channel::<Report>();

    let mut total = 0;
    for (index, future) in futures.into_iter().enumerate() {
        let reports_tx = reports_tx.clone();
        tokio::spawn(async move {
            let outcome = future.await;
            let _ = reports_tx.send((index, outcome));
        });
        total += 1;
    }
    drop(reports_tx);

    let mut results = FanOutResults::new();
    while results.len() < total {
        let received = tokio::time::timeout_at(deadline, reports.recv()).await;
        match received {
            Ok(Some((index, outcome))) => {
                results.insert(index, outcome);
            }
            Ok(None) => break,
            Err(_) => {
                hedge_trace_race!(
                    "deadline",
                    collected = results.len(),
                    outstanding = total - results.len()
                );
                tokio::spawn(cancel_stragglers(reports));
                break;
            }
        }
    }
    results
}

/// Race each query on its database and collect the winners by position.
pub async fn concurrent_fetch<I>(jobs: I, deadline: Duration) -> FanOutResults
where
    I: IntoIterator<Item = (Database, Query)>,
{
    let races = jobs.into_iter().map(|(database, query)| async move {
        database.race(&query).await.map(|winner| winner.session)
    });
    fan_out(races, deadline).await
}

async fn cancel_stragglers(mut reports: mpsc::UnboundedReceiver<Report>) {
    while let Some((index, outcome)) = reports.recv().await {
        if let Ok(mut session) = outcome {
            hedge_trace_race!("cancel straggler", query = index);
            let _ = session.cancel().await;
        }
    }
}
