//! End-to-end tests for the hub: delivery ordering, request/response,
//! reentrancy drops, timers, and lifecycle.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use topichub::prelude::*;

/// Short timings so the suite runs in milliseconds, not tens of seconds.
fn test_config(realm: &str) -> HubConfig {
    HubConfig {
        realm: realm.into(),
        timer_tick_ms: 100,
        stop_grace_ms: 2_000,
        drain_poll_ms: 10,
    }
}

fn started_hub(realm: &str) -> Hub {
    let hub = Hub::new(test_config(realm));
    hub.start(&tokio::runtime::Handle::current())
        .expect("fresh hub should start");
    hub
}

/// A callback that appends `(key, payload)` to a shared log.
fn recorder(log: Arc<Mutex<Vec<(String, Value)>>>) -> Callback {
    callback_fn(move |key, payload| {
        log.lock().unwrap().push((key.to_string(), payload));
        Ok(None)
    })
}

async fn settle() {
    sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn delivers_once_with_key_and_payload() {
    let hub = started_hub("e2e-basic");
    let log = Arc::new(Mutex::new(Vec::new()));
    hub.subscribe("^/a$", recorder(log.clone()), SubscribeOptions::default())
        .await
        .unwrap();

    hub.publish("/a", json!("hello"), 5, true, None);
    settle().await;

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[("/a".to_string(), json!("hello"))]
    );
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn messages_queued_before_start_are_delivered_by_priority() {
    let hub = Hub::new(test_config("e2e-priority"));
    let log = Arc::new(Mutex::new(Vec::new()));
    hub.subscribe("^/jobs/", recorder(log.clone()), SubscribeOptions::default())
        .await
        .unwrap();

    // Published in scrambled order while the reactor is not yet running.
    hub.publish("/jobs/low", json!(null), 9, true, None);
    hub.publish("/jobs/high", json!(null), 1, true, None);
    hub.publish("/jobs/mid", json!(null), 5, true, None);

    hub.start(&tokio::runtime::Handle::current()).unwrap();
    settle().await;

    let keys: Vec<String> = log.lock().unwrap().iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec!["/jobs/high", "/jobs/mid", "/jobs/low"]);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn equal_priorities_are_delivered_in_publish_order() {
    let hub = Hub::new(test_config("e2e-fifo"));
    let log = Arc::new(Mutex::new(Vec::new()));
    hub.subscribe("^/fifo/", recorder(log.clone()), SubscribeOptions::default())
        .await
        .unwrap();

    for name in ["first", "second", "third"] {
        hub.publish(&format!("/fifo/{name}"), json!(null), 3, true, None);
    }

    hub.start(&tokio::runtime::Handle::current()).unwrap();
    settle().await;

    let keys: Vec<String> = log.lock().unwrap().iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec!["/fifo/first", "/fifo/second", "/fifo/third"]);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn duplicate_suppression_drops_the_second_publish() {
    let hub = Hub::new(test_config("e2e-dup"));

    assert!(hub.publish("/dup", json!(1), 1, false, None));
    assert!(!hub.publish("/dup", json!(1), 1, false, None));
    assert_eq!(hub.pending(), 1);

    // An identical publish with allow_duplicate set is accepted.
    assert!(hub.publish("/dup", json!(1), 1, true, None));
    assert_eq!(hub.pending(), 2);
}

#[tokio::test]
async fn publish_and_wait_round_trips_a_computed_result() {
    let hub = started_hub("e2e-reqrep");
    hub.subscribe(
        "^/q$",
        callback_fn(|_key, payload| Ok(payload.as_i64().map(|n| json!(n * 2)))),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    let answer = hub.publish_and_wait("/q", json!(7), DEFAULT_PRIORITY, true).await;
    assert_eq!(answer, Some(json!(14)));
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn publish_and_wait_without_subscribers_is_unblocked() {
    let hub = started_hub("e2e-nomatch");

    let answer = timeout(
        Duration::from_secs(1),
        hub.publish_and_wait("/nobody/home", json!(1), DEFAULT_PRIORITY, true),
    )
    .await
    .expect("caller must not hang when nobody is listening");
    assert_eq!(answer, None);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn publishes_are_dropped_while_dispatch_is_in_flight() {
    let hub = started_hub("e2e-reentrancy");
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    hub.subscribe(
        "^/slow$",
        callback_async(move |_key, _payload| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(300)).await;
                Ok(None)
            }
        }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    assert!(hub.publish("/slow", json!(null), 1, true, None));
    sleep(Duration::from_millis(100)).await; // first dispatch is now in flight

    // Dropped: the key is locked until the slow callback finishes.
    assert!(!hub.publish("/slow", json!(null), 1, true, None));

    sleep(Duration::from_millis(400)).await; // slow callback has completed
    assert!(hub.publish("/slow", json!(null), 1, true, None));
    sleep(Duration::from_millis(500)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn timer_pattern_publishes_periodically() {
    let hub = started_hub("e2e-timer");
    let fires = Arc::new(AtomicU32::new(0));

    let counter = fires.clone();
    hub.subscribe(
        "timer://x/each/2",
        callback_fn(move |_key, _payload| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    // 6.5 ticks at a 100ms tick: a /each/2 timer fires every third tick,
    // starting with the first. Expect ~3 deliveries, with scheduling slack.
    sleep(Duration::from_millis(650)).await;
    let fired = fires.load(Ordering::SeqCst);
    assert!(
        (2..=4).contains(&fired),
        "expected 3 +/- 1 timer deliveries, got {fired}"
    );
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn unsubscribing_everywhere_silences_the_callback() {
    let hub = started_hub("e2e-unsub");
    let log = Arc::new(Mutex::new(Vec::new()));
    let callback = recorder(log.clone());

    hub.subscribe("^/a$", callback.clone(), SubscribeOptions::default())
        .await
        .unwrap();
    hub.subscribe("^/b$", callback.clone(), SubscribeOptions::default())
        .await
        .unwrap();

    // Default filter (.*) matches every registered pattern source.
    let removed = hub.unsubscribe(None, Some(&callback)).await.unwrap();
    assert_eq!(removed, 2);

    hub.publish("/a", json!(null), 1, true, None);
    hub.publish("/b", json!(null), 1, true, None);
    settle().await;

    assert!(log.lock().unwrap().is_empty());
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn detach_silences_an_owner_but_not_others() {
    let hub = started_hub("e2e-detach");
    let owned_calls = Arc::new(AtomicU32::new(0));
    let other_calls = Arc::new(AtomicU32::new(0));
    let owner: Owner = Arc::new(());

    let counter = owned_calls.clone();
    hub.subscribe(
        "^/d$",
        callback_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }),
        SubscribeOptions {
            owner: Some(owner.clone()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let counter = other_calls.clone();
    hub.subscribe(
        "^/d$",
        callback_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(hub.detach(&owner).await, 1);

    hub.publish("/d", json!(null), 1, true, None);
    settle().await;

    assert_eq!(owned_calls.load(Ordering::SeqCst), 0);
    assert_eq!(other_calls.load(Ordering::SeqCst), 1);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn failing_callbacks_do_not_poison_the_hub() {
    let hub = started_hub("e2e-errors");
    let ok_calls = Arc::new(AtomicU32::new(0));

    hub.subscribe(
        "^/mixed$",
        callback_fn(|_, _| anyhow::bail!("subscriber exploded")),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();
    let counter = ok_calls.clone();
    hub.subscribe(
        "^/mixed$",
        callback_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    hub.publish("/mixed", json!(null), 1, true, None);
    settle().await;
    assert_eq!(ok_calls.load(Ordering::SeqCst), 1);

    // The guard was released despite the failure: the key is publishable.
    hub.publish("/mixed", json!(null), 1, true, None);
    settle().await;
    assert_eq!(ok_calls.load(Ordering::SeqCst), 2);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn stop_drains_the_queue_before_returning() {
    let hub = started_hub("e2e-drain");
    let log = Arc::new(Mutex::new(Vec::new()));
    hub.subscribe("^/drain/", recorder(log.clone()), SubscribeOptions::default())
        .await
        .unwrap();

    for n in 0..10 {
        hub.publish(&format!("/drain/{n}"), json!(n), 1, true, None);
    }
    hub.stop().await.unwrap();
    settle().await; // callback tasks may still be finishing

    assert_eq!(hub.pending(), 0);
    assert_eq!(log.lock().unwrap().len(), 10);
    assert_eq!(hub.state(), HubState::Stopped);
}

#[tokio::test]
async fn lifecycle_guards_and_restart() {
    let hub = Hub::new(test_config("e2e-lifecycle"));
    let runtime = tokio::runtime::Handle::current();

    hub.start(&runtime).unwrap();
    assert!(matches!(
        hub.start(&runtime),
        Err(HubError::AlreadyRunning { .. })
    ));
    assert_eq!(hub.state(), HubState::Running);

    hub.stop().await.unwrap();
    assert_eq!(hub.state(), HubState::Stopped);
    assert!(matches!(hub.stop().await, Err(HubError::NotRunning { .. })));

    // A stopped hub restarts with a clean registry, not stale subscribers.
    hub.start(&runtime).unwrap();
    assert_eq!(hub.state(), HubState::Running);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn system_stop_is_delivered_by_the_draining_reactor() {
    let hub = started_hub("e2e-system-stop");
    let log = Arc::new(Mutex::new(Vec::new()));
    hub.subscribe(
        "^/system/stop$",
        recorder(log.clone()),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    // Queue unrelated work so the stop message lands behind a real drain.
    hub.publish("/unrelated", json!(null), 1, true, None);
    hub.stop().await.unwrap();

    // Enqueued after the drain-poll, yet dispatched before stop() returned:
    // the reactor keeps consuming while it drains.
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, TOPIC_SYSTEM_STOP);
    assert!(log[0].1.is_string(), "payload is the stop timestamp");
}

#[tokio::test]
async fn concurrent_stop_callers_get_exactly_one_winner() {
    let hub = started_hub("e2e-double-stop");

    let (a, b) = tokio::join!(hub.stop(), hub.stop());
    assert_eq!(
        usize::from(a.is_ok()) + usize::from(b.is_ok()),
        1,
        "exactly one stop() may claim the shutdown"
    );
    assert!(matches!(a.and(b), Err(HubError::NotRunning { .. })));
    assert_eq!(hub.state(), HubState::Stopped);
}

#[tokio::test]
async fn same_key_messages_queued_together_both_dispatch() {
    let hub = Hub::new(test_config("e2e-guard-set"));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    hub.subscribe(
        "^/burst$",
        callback_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    // Both accepted: the guard only drops publishes for keys already in
    // flight, and nothing is in flight while the reactor is down. The guard
    // tracks in-flight keys as a set, so the pair then dispatches
    // back-to-back rather than the second being dropped.
    assert!(hub.publish("/burst", json!(1), 1, true, None));
    assert!(hub.publish("/burst", json!(2), 1, true, None));

    hub.start(&tokio::runtime::Handle::current()).unwrap();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn system_start_is_observable_by_subscribers() {
    let hub = Hub::new(test_config("e2e-system"));
    let log = Arc::new(Mutex::new(Vec::new()));
    hub.subscribe(
        "^/system/start$",
        recorder(log.clone()),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    hub.start(&tokio::runtime::Handle::current()).unwrap();
    settle().await;

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, TOPIC_SYSTEM_START);
    assert!(log[0].1.is_string(), "payload is the start timestamp");
    drop(log);
    hub.stop().await.unwrap();
}
