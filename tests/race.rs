use hedge::{FetchOptions, HedgeError, Signal, race};

use common::{MockDriver, Script, open, registry, registry_with, wait_until};

mod common;

#[tokio::test]
async fn test_first_ready_wins_and_losers_are_cancelled_once() {
    let driver = MockDriver::new();
    driver
        .script("r0", Script::users().query_delay(150))
        .script("r1", Script::users().query_delay(10))
        .script("r2", Script::users().query_delay(250));
    let registry = registry(&driver, &["r0", "r1", "r2"]);

    let sessions = ["r0", "r1", "r2"]
        .into_iter()
        .map(|name| {
            let db = open(&registry, name);
            db.fetch_stream(&db.query().table("users").run_parallel())
        })
        .collect();

    let winner = race(sessions).await.unwrap();
    assert_eq!(winner.index, 1);

    wait_until(|| {
        ["r0", "r2"].iter().all(|name| {
            let counters = driver.counters(name);
            counters.cursor_closes == 1 && counters.connection_closes == 1
        })
    })
    .await;

    for name in ["r0", "r2"] {
        let counters = driver.counters(name);
        assert_eq!(counters.rows_served, 0, "{name}");
        assert_eq!(counters.cursor_closes, 1, "{name}");
    }
    // The winner still owns its cursor.
    assert_eq!(driver.counters("r1").cursor_closes, 0);

    let mut session = winner.session;
    session.start().await.unwrap();
    assert!(matches!(session.recv().await.unwrap(), Signal::Row(_)));
    session.cancel().await.unwrap();
    assert_eq!(driver.counters("r1").connection_closes, 1);
}

#[tokio::test]
async fn test_single_success_wins_regardless_of_position() {
    let driver = MockDriver::new();
    driver
        .script("r0", Script::users().query_error("replica down"))
        .script("r1", Script::users().open_error("refused"))
        .script("r2", Script::users().query_delay(30));
    let registry = registry(&driver, &["r0", "r1", "r2"]);

    let sessions = ["r0", "r1", "r2"]
        .into_iter()
        .map(|name| {
            let db = open(&registry, name);
            db.fetch_stream(&db.query().table("users").run_parallel())
        })
        .collect();

    let winner = race(sessions).await.unwrap();
    assert_eq!(winner.index, 2);
    // The failed statement released its dedicated connection.
    assert_eq!(driver.counters("r0").connection_closes, 1);
}

#[tokio::test]
async fn test_all_failures_are_aggregated() {
    let driver = MockDriver::new();
    driver
        .script("r0", Script::users().query_error("first").query_delay(10))
        .script("r1", Script::users().query_error("second").query_delay(60))
        .script("r2", Script::users().open_error("third").open_delay(120));
    let registry = registry(&driver, &["r0", "r1", "r2"]);

    let sessions = ["r0", "r1", "r2"]
        .into_iter()
        .map(|name| {
            let db = open(&registry, name);
            db.fetch_stream(&db.query().table("users").run_parallel())
        })
        .collect();

    let err = race(sessions).await.unwrap_err();
    let HedgeError::Aggregate(aggregate) = err else {
        panic!("expected aggregate error, got {err:?}");
    };
    let messages: Vec<_> = aggregate.iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        [
            "Statement error: first",
            "Statement error: second",
            "Connection error: third"
        ]
    );
}

#[tokio::test]
async fn test_empty_race() {
    let err = race(Vec::new()).await.unwrap_err();
    assert!(matches!(err, HedgeError::Aggregate(ref a) if a.is_empty()));
}

#[tokio::test]
async fn test_database_race_uses_configured_replicas() {
    let driver = MockDriver::new();
    driver.script("app", Script::users());
    let options = FetchOptions {
        replicas: 4,
        ..FetchOptions::default()
    };
    let registry = registry_with(&driver, &[("app", hedge::DialectKind::MySql)], options);
    let db = open(&registry, "app");

    let winner = db.race(&db.query().table("users")).await.unwrap();
    assert!(winner.index < 4);

    // Every replica opened its own connection; three of them were cancelled.
    wait_until(|| {
        let counters = driver.counters("app");
        counters.cursor_closes == 3 && counters.connection_closes == 3
    })
    .await;
    assert_eq!(driver.counters("app").opens, 4);

    let rows: Vec<_> = {
        use futures_util::TryStreamExt;
        winner.session.into_stream().try_collect().await.unwrap()
    };
    assert_eq!(rows.len(), 3);

    let counters = driver.counters("app");
    assert_eq!(counters.cursor_closes, 4);
    assert_eq!(counters.connection_closes, 4);
}
