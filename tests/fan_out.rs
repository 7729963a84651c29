use std::time::Duration;

use hedge::{DialectKind, FetchOptions, HedgeError, Signal, Value, concurrent_fetch};

use common::{MockDriver, Script, open, registry, registry_with, wait_until};

mod common;

fn script(label: &str) -> Script {
    Script::rows(["source"], [vec![Value::from(label)]])
}

#[tokio::test]
async fn test_results_are_keyed_by_position() {
    let driver = MockDriver::new();
    driver
        .script("a", script("a").query_delay(40))
        .script("b", script("b"));
    let registry = registry(&driver, &["a", "b"]);
    let (a, b) = (open(&registry, "a"), open(&registry, "b"));

    let jobs = vec![
        (a.clone(), a.query().table("t")),
        (b.clone(), b.query().table("t")),
    ];
    let mut results = concurrent_fetch(jobs, Duration::from_secs(2)).await;
    assert_eq!(results.keys().copied().collect::<Vec<_>>(), [0, 1]);

    for (index, label) in [(0, "a"), (1, "b")] {
        let mut session = results.remove(&index).unwrap().unwrap();
        session.start().await.unwrap();
        let Signal::Row(row) = session.recv().await.unwrap() else {
            panic!("expected a row");
        };
        assert_eq!(row.get(0).and_then(Value::as_str), Some(label));
        session.cancel().await.unwrap();
    }
}

#[tokio::test]
async fn test_failures_stay_at_their_index() {
    let driver = MockDriver::new();
    driver
        .script("ok", script("ok"))
        .script("down", script("down").open_error("refused"));
    let registry = registry(&driver, &["ok", "down"]);
    let (ok, down) = (open(&registry, "ok"), open(&registry, "down"));

    let results = concurrent_fetch(
        vec![
            (down.clone(), down.query().table("t")),
            (ok.clone(), ok.query().table("t")),
        ],
        Duration::from_secs(2),
    )
    .await;

    match &results[&0] {
        Err(HedgeError::Aggregate(errors)) => assert_eq!(errors.len(), 3),
        other => panic!("expected aggregate error, got {other:?}"),
    }
    assert!(results[&1].is_ok());
}

#[tokio::test]
async fn test_deadline_truncates_and_cancels_stragglers() {
    let driver = MockDriver::new();
    driver
        .script("fast", script("fast"))
        .script("slow", script("slow").query_delay(300));
    let options = FetchOptions {
        fan_out_deadline: Duration::from_millis(50),
        ..FetchOptions::default()
    };
    let registry = registry_with(
        &driver,
        &[("fast", DialectKind::MySql), ("slow", DialectKind::MySql)],
        options,
    );
    let fast = open(&registry, "fast");
    let slow = open(&registry, "slow");

    let jobs = vec![
        (slow.clone(), slow.query().table("t")),
        (fast.clone(), fast.query().table("t")),
    ];
    let results = concurrent_fetch(jobs, fast.options().fan_out_deadline).await;
    assert!(!results.contains_key(&0));
    assert!(results[&1].is_ok());

    // The late race still resolves; its winner and both losers are released.
    wait_until(|| {
        let counters = driver.counters("slow");
        counters.cursor_closes == 3 && counters.connection_closes == 3
    })
    .await;
    assert_eq!(driver.counters("slow").rows_served, 0);
}

#[tokio::test]
async fn test_database_concurrent_fetch() {
    let driver = MockDriver::new();
    driver.script("app", Script::users());
    let db = open(&registry(&driver, &["app"]), "app");

    let queries = vec![
        db.query().table("users"),
        db.query().table("users").where_("id", "=", 2, true),
        db.query().table("users").limit(1),
    ];
    let results = db.concurrent_fetch(queries).await;
    assert_eq!(results.len(), 3);
    assert!(results.values().all(Result::is_ok));
}
