// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for per-key serialized dispatch.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{Exploded, FlakyPersistence, GatedPersistence, Tally, TallyRequest, start_runtime};
use pizzashop_grains::{GrainError, GrainKey, KeyKind, MemoryPersistence, Persistence};

fn tally_key(name: &str) -> GrainKey {
    GrainKey::new("tally", KeyKind::String, name).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_linearizable() {
    let persistence = Arc::new(MemoryPersistence::new());
    let runtime = start_runtime(persistence.clone()).await;
    let grain = runtime.client().grain::<Tally>("shared").unwrap();

    let calls = (0..50).map(|_| {
        let grain = grain.clone();
        tokio::spawn(async move { grain.call(TallyRequest::Increment).await })
    });
    let results = futures::future::join_all(calls).await;

    let observed: HashSet<i64> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap().count)
        .collect();

    // Every call saw a distinct intermediate value: no lost updates
    assert_eq!(observed, (1..=50).collect::<HashSet<i64>>());

    let state = grain.call(TallyRequest::Get).await.unwrap();
    assert_eq!(state.count, 50);

    let record = persistence
        .load_state(&tally_key("shared"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.version, 50);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_calls_on_one_key_run_in_arrival_order() {
    let persistence = Arc::new(GatedPersistence::default());
    persistence.gate("tally/queue").await;
    let runtime = start_runtime(persistence.clone()).await;
    let grain = runtime.client().grain::<Tally>("queue").unwrap();

    // The first call parks inside its save while holding the execution lock
    let first = {
        let grain = grain.clone();
        tokio::spawn(async move {
            grain
                .call(TallyRequest::Append {
                    entry: "0".to_string(),
                })
                .await
        })
    };
    persistence.entered.notified().await;

    let queued: Vec<_> = (1..=5)
        .map(|i| {
            let grain = grain.clone();
            tokio::spawn(async move {
                grain
                    .call(TallyRequest::Append {
                        entry: i.to_string(),
                    })
                    .await
            })
        })
        .collect();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    persistence.ungate("tally/queue").await;
    persistence.release.notify_one();

    first.await.unwrap().unwrap();
    for handle in queued {
        handle.await.unwrap().unwrap();
    }

    let state = grain.call(TallyRequest::Get).await.unwrap();
    assert_eq!(state.log, vec!["0", "1", "2", "3", "4", "5"]);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submission_order_holds_on_multi_thread_runtime() {
    let persistence = Arc::new(GatedPersistence::default());
    persistence.gate("tally/ordered").await;
    let runtime = start_runtime(persistence.clone()).await;
    let grain = runtime.client().grain::<Tally>("ordered").unwrap();

    let first = {
        let grain = grain.clone();
        tokio::spawn(async move {
            grain
                .call(TallyRequest::Append {
                    entry: "0".to_string(),
                })
                .await
        })
    };
    persistence.entered.notified().await;
    persistence.ungate("tally/ordered").await;

    // One caller task submits a burst; the calls must run in the order submitted
    let caller = {
        let grain = grain.clone();
        tokio::spawn(async move {
            let calls = (1..=5).map(|i| {
                grain.call(TallyRequest::Append {
                    entry: i.to_string(),
                })
            });
            futures::future::join_all(calls).await
        })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    persistence.release.notify_one();
    first.await.unwrap().unwrap();
    for result in caller.await.unwrap() {
        result.unwrap();
    }

    let state = grain.call(TallyRequest::Get).await.unwrap();
    assert_eq!(state.log, vec!["0", "1", "2", "3", "4", "5"]);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_other_keys_progress_while_one_is_blocked() {
    let persistence = Arc::new(GatedPersistence::default());
    persistence.gate("tally/slow").await;
    let runtime = start_runtime(persistence.clone()).await;
    let client = runtime.client();

    let slow = client.grain::<Tally>("slow").unwrap();
    let blocked = tokio::spawn(async move { slow.call(TallyRequest::Increment).await });
    persistence.entered.notified().await;

    let fast = client.grain::<Tally>("fast").unwrap();
    let state = tokio::time::timeout(
        Duration::from_secs(5),
        fast.call(TallyRequest::Increment),
    )
    .await
    .expect("independent key must not wait for the blocked one")
    .unwrap();
    assert_eq!(state.count, 1);
    assert!(!blocked.is_finished());

    persistence.release.notify_one();
    assert_eq!(blocked.await.unwrap().unwrap().count, 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_call_leaves_state_unchanged() {
    let persistence = Arc::new(MemoryPersistence::new());
    let runtime = start_runtime(persistence.clone()).await;
    let grain = runtime.client().grain::<Tally>("fragile").unwrap();

    grain.call(TallyRequest::Increment).await.unwrap();

    let err = grain.call(TallyRequest::Explode).await.unwrap_err();
    assert_eq!(err.error_code(), "INVOCATION_FAILED");
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(source.downcast_ref::<Exploded>().unwrap().0, 1001);

    let state = grain.call(TallyRequest::Get).await.unwrap();
    assert_eq!(state.count, 1);
    assert!(state.log.is_empty());

    let record = persistence
        .load_state(&tally_key("fragile"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.version, 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_save_failure_is_reported_and_state_advances() {
    let persistence = Arc::new(FlakyPersistence::default());
    let runtime = start_runtime(persistence.clone()).await;
    let grain = runtime.client().grain::<Tally>("unlucky").unwrap();

    persistence.fail_saves(1);
    let err = grain.call(TallyRequest::Increment).await.unwrap_err();
    assert!(matches!(err, GrainError::Persistence { .. }));
    assert!(err.is_durability_uncertain());

    // In memory the call was applied
    assert_eq!(grain.call(TallyRequest::Get).await.unwrap().count, 1);
    assert!(persistence.inner.is_empty().await);

    // The next save carries the advanced state
    assert_eq!(grain.call(TallyRequest::Increment).await.unwrap().count, 2);
    let record = persistence
        .load_state(&tally_key("unlucky"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, br#"{"count":2,"log":[]}"#.to_vec());

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_activation_failure_is_surfaced_then_retried() {
    let persistence = Arc::new(FlakyPersistence::default());
    let runtime = start_runtime(persistence.clone()).await;
    let grain = runtime.client().grain::<Tally>("cold").unwrap();

    persistence.fail_loads(1);
    let err = grain.call(TallyRequest::Increment).await.unwrap_err();
    assert_eq!(err.error_code(), "ACTIVATION_FAILED");
    assert_eq!(persistence.loads.load(Ordering::SeqCst), 1);

    let state = grain.call(TallyRequest::Increment).await.unwrap();
    assert_eq!(state.count, 1);
    assert_eq!(persistence.loads.load(Ordering::SeqCst), 2);

    // Loaded once; later calls reuse the resident state
    grain.call(TallyRequest::Get).await.unwrap();
    assert_eq!(persistence.loads.load(Ordering::SeqCst), 2);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_read_only_calls_do_not_save() {
    let persistence = Arc::new(MemoryPersistence::new());
    let runtime = start_runtime(persistence.clone()).await;

    let state = runtime
        .client()
        .grain::<Tally>("never-written")
        .unwrap()
        .call(TallyRequest::Get)
        .await
        .unwrap();

    assert_eq!(state.count, 0);
    assert!(persistence.is_empty().await);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_abandoned_caller_does_not_cancel_call() {
    let persistence = Arc::new(GatedPersistence::default());
    persistence.gate("tally/abandoned").await;
    let runtime = start_runtime(persistence.clone()).await;
    let grain = runtime.client().grain::<Tally>("abandoned").unwrap();

    let caller = {
        let grain = grain.clone();
        tokio::spawn(async move { grain.call(TallyRequest::Increment).await })
    };
    persistence.entered.notified().await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    persistence.ungate("tally/abandoned").await;
    persistence.release.notify_one();

    let state = grain.call(TallyRequest::Get).await.unwrap();
    assert_eq!(state.count, 1);

    let record = persistence
        .inner()
        .load_state(&tally_key("abandoned"))
        .await
        .unwrap();
    assert_eq!(record.map(|r| r.version), Some(1));

    runtime.shutdown().await.unwrap();
}
