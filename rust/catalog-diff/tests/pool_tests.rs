//! Orchestrator behavior under load, failure and cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use catalog_diff::error::Stage;
use catalog_diff::pool::{self, FailureDetail, Outcome};
use catalog_diff::report;

/// Deterministic worker used for the equivalence runs: fails every seventh
/// key, doubles the rest.
async fn deterministic_worker(key: u32) -> Result<u32, FailureDetail> {
    if key % 7 == 0 {
        Err(FailureDetail::new(
            Stage::Compile,
            format!("synthetic failure for {key}"),
        ))
    } else {
        Ok(key * 2)
    }
}

fn normalize(outcomes: &HashMap<u32, Outcome<u32>>) -> Vec<(u32, Option<u32>, Option<String>)> {
    let mut rows: Vec<_> = outcomes
        .iter()
        .map(|(key, outcome)| {
            (
                *key,
                outcome.success().copied(),
                outcome.failure().map(|f| f.message.clone()),
            )
        })
        .collect();
    rows.sort_by_key(|(key, _, _)| *key);
    rows
}

#[tokio::test]
async fn outcome_map_is_total_over_fifty_keys() {
    let keys: Vec<u32> = (0..50).collect();
    let outcomes = pool::run(keys.clone(), 10, deterministic_worker).await;

    assert_eq!(outcomes.len(), 50);
    for key in keys {
        assert!(outcomes.contains_key(&key), "missing outcome for {key}");
    }
}

#[tokio::test]
async fn degree_of_parallelism_does_not_affect_results() {
    let keys: Vec<u32> = (0..50).collect();

    let serial = pool::run(keys.clone(), 1, deterministic_worker).await;
    let parallel = pool::run(keys, 10, deterministic_worker).await;

    assert_eq!(normalize(&serial), normalize(&parallel));

    // The aggregated report is identical too, down to cluster ranking.
    let as_report = |outcomes: &HashMap<u32, Outcome<u32>>| {
        let keyed: HashMap<String, Outcome<u32>> = outcomes
            .iter()
            .map(|(key, outcome)| (format!("node{key:02}.example.com"), outcome.clone()))
            .collect();
        serde_json::to_value(report::pull_report(&keyed, 10)).unwrap()
    };
    assert_eq!(as_report(&serial), as_report(&parallel));
}

#[tokio::test]
async fn concurrency_ceiling_is_respected() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let keys: Vec<u32> = (0..40).collect();
    let outcomes = pool::run(keys, 5, |_key| {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, FailureDetail>(())
        }
    })
    .await;

    assert_eq!(outcomes.len(), 40);
    assert!(
        peak.load(Ordering::SeqCst) <= 5,
        "peak concurrency {} exceeded the ceiling",
        peak.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn panics_are_converted_without_poisoning_the_run() {
    let keys: Vec<u32> = (0..20).collect();
    let outcomes = pool::run(keys, 4, |key| async move {
        if key == 13 {
            panic!("unlucky");
        }
        Ok::<_, FailureDetail>(key)
    })
    .await;

    assert_eq!(outcomes.len(), 20);
    let failed: Vec<u32> = outcomes
        .iter()
        .filter(|(_, outcome)| !outcome.is_success())
        .map(|(key, _)| *key)
        .collect();
    assert_eq!(failed, vec![13]);
    assert_eq!(outcomes[&13].failure().unwrap().stage, Stage::Internal);
}

#[tokio::test]
async fn cancellation_keeps_partial_results_valid() {
    let keys: Vec<u32> = (0..20).collect();

    // Half the workers finish quickly, half hang far past the shutdown.
    let outcomes = pool::run_until(
        keys,
        20,
        |key| async move {
            if key < 10 {
                Ok::<_, FailureDetail>(key)
            } else {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(key)
            }
        },
        tokio::time::sleep(Duration::from_millis(300)),
    )
    .await;

    assert!(outcomes.len() >= 10, "fast workers should have been collected");
    assert!(outcomes.len() < 20, "hung workers should have been abandoned");
    for (key, outcome) in &outcomes {
        assert_eq!(outcome.success(), Some(key));
    }
}
