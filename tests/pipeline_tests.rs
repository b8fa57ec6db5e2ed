//! Batch pipeline tests: tallies, pacing, cancellation, shutdown timeout.

use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tickpool::{
    AggregateResult, BatchOpts, CancellationToken, PipelineError, run_batch,
    run_batch_with_observer,
};

fn always_ok(_: &u32, _: &CancellationToken) -> Result<(), String> {
    Ok(())
}

/// Items are 1-based; even items fail.
fn fail_even(item: &u32, _: &CancellationToken) -> Result<u32, String> {
    if item % 2 == 0 {
        Err(format!("item {item} rejected"))
    } else {
        Ok(*item)
    }
}

fn items(n: u32) -> Vec<u32> {
    (1..=n).collect()
}

// --- concrete scenarios ---

#[test]
fn test_four_items_two_workers_all_succeed() {
    let cancel = CancellationToken::new();
    let result = run_batch(items(4), &BatchOpts::new(2), always_ok, &cancel).unwrap();
    assert_eq!(result.success_count, 4);
    assert_eq!(result.error_count, 0);
    assert!(!result.partial);
    assert_eq!(result.admitted, 4);
    assert_eq!(result.total, 4);
    assert!(!result.shutdown_timed_out);
}

#[test]
fn test_four_items_two_workers_fail_second_and_fourth() {
    let cancel = CancellationToken::new();
    let result = run_batch(items(4), &BatchOpts::new(2), fail_even, &cancel).unwrap();
    assert_eq!(result.success_count, 2);
    assert_eq!(result.error_count, 2);
    assert!(!result.partial);
    assert!(result.is_complete());
}

#[test]
fn test_paced_cancel_after_one_and_a_half_intervals() {
    let cancel = CancellationToken::new();
    let opts = BatchOpts::new(2)
        .with_interval(Duration::from_millis(200))
        .with_shutdown_grace(Duration::from_secs(1));
    cancel.cancel_after(Duration::from_millis(300)).unwrap();
    let result = run_batch(items(10), &opts, always_ok, &cancel).unwrap();
    assert!(result.partial);
    assert!(
        (1..=2).contains(&result.processed()),
        "processed {} outcomes",
        result.processed()
    );
    assert!(result.admitted <= 2);
    assert!(result.processed() <= result.admitted);
}

// --- properties ---

#[test]
fn test_count_matches_batch_size_for_any_worker_count() {
    for workers in [1, 2, 3, 8, 16] {
        let cancel = CancellationToken::new();
        let result = run_batch(items(25), &BatchOpts::new(workers), fail_even, &cancel).unwrap();
        assert_eq!(result.processed(), 25, "workers = {workers}");
        assert_eq!(result.success_count, 13);
        assert_eq!(result.error_count, 12);
        assert!(!result.partial);
    }
}

#[test]
fn test_randomized_scheduling_gives_same_counts() {
    let jittered = |item: &u32, _: &CancellationToken| -> Result<(), String> {
        let ms = rand::rng().random_range(0..4u64);
        thread::sleep(Duration::from_millis(ms));
        if item % 3 == 0 {
            Err("multiple of three".to_string())
        } else {
            Ok(())
        }
    };
    let mut results = Vec::new();
    for _ in 0..3 {
        let cancel = CancellationToken::new();
        results.push(run_batch(items(30), &BatchOpts::new(4), jittered, &cancel).unwrap());
    }
    assert!(results.iter().all(|r| *r == results[0]));
    assert_eq!(results[0].success_count, 20);
    assert_eq!(results[0].error_count, 10);
}

#[test]
fn test_deterministic_batch_rerun_is_identical() {
    let run = || {
        let cancel = CancellationToken::new();
        run_batch(items(12), &BatchOpts::new(3), fail_even, &cancel).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_observer_sees_each_item_exactly_once() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_obs = Arc::clone(&seen);
    let cancel = CancellationToken::new();
    let result = run_batch_with_observer(
        items(20),
        &BatchOpts::new(5),
        fail_even,
        &cancel,
        move |outcome| seen_obs.lock().unwrap().push(outcome.index),
    )
    .unwrap();
    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..20).collect::<Vec<_>>());
    assert_eq!(result.processed(), 20);
}

#[test]
fn test_paced_admission_takes_at_least_n_minus_one_intervals() {
    let interval = Duration::from_millis(60);
    let cancel = CancellationToken::new();
    let start = Instant::now();
    let result = run_batch(
        items(4),
        &BatchOpts::new(2).with_interval(interval),
        always_ok,
        &cancel,
    )
    .unwrap();
    assert!(start.elapsed() >= interval * 3);
    assert_eq!(result.success_count, 4);
    assert!(!result.partial);
}

#[test]
fn test_paced_admission_preserves_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let order_fn = Arc::clone(&order);
    let cancel = CancellationToken::new();
    let record = move |item: &u32, _: &CancellationToken| -> Result<(), String> {
        order_fn.lock().unwrap().push(*item);
        Ok(())
    };
    // One item per tick and four workers: each item is picked up before the next is admitted.
    let opts = BatchOpts::new(4).with_interval(Duration::from_millis(40));
    run_batch(items(5), &opts, record, &cancel).unwrap();
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}

// --- cancellation ---

#[test]
fn test_cancelled_before_start_admits_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = run_batch(items(5), &BatchOpts::new(2), always_ok, &cancel).unwrap();
    assert!(result.partial);
    assert_eq!(result.admitted, 0);
    assert_eq!(result.processed(), 0);
    assert!(!result.shutdown_timed_out);
}

#[test]
fn test_cancellation_aware_workers_stop_within_grace() {
    let waits_for_cancel = |_: &u32, cancel: &CancellationToken| -> Result<(), String> {
        if cancel.wait_timeout(Duration::from_secs(10)) {
            Err("cancelled".to_string())
        } else {
            Ok(())
        }
    };
    let cancel = CancellationToken::new();
    cancel.cancel_after(Duration::from_millis(100)).unwrap();
    let start = Instant::now();
    let opts = BatchOpts::new(3).with_shutdown_grace(Duration::from_secs(2));
    let result = run_batch(items(6), &opts, waits_for_cancel, &cancel).unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(result.partial);
    assert!(!result.shutdown_timed_out);
    assert_eq!(result.processed(), 0);
    assert_eq!(result.admitted, 6);
}

#[test]
fn test_stuck_worker_hits_shutdown_timeout() {
    let ignores_cancel = |_: &u32, _: &CancellationToken| -> Result<(), String> {
        thread::sleep(Duration::from_secs(2));
        Ok(())
    };
    let cancel = CancellationToken::new();
    cancel.cancel_after(Duration::from_millis(50)).unwrap();
    let start = Instant::now();
    let opts = BatchOpts::new(1).with_shutdown_grace(Duration::from_millis(100));
    let result = run_batch(items(2), &opts, ignores_cancel, &cancel).unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(result.partial);
    assert!(result.shutdown_timed_out);
    assert_eq!(result.processed(), 0);
}

#[test]
fn test_cancel_mid_batch_bounds_outcomes_by_admitted() {
    let cancel = CancellationToken::new();
    let slow = |_: &u32, _: &CancellationToken| -> Result<(), String> {
        thread::sleep(Duration::from_millis(5));
        Ok(())
    };
    cancel.cancel_after(Duration::from_millis(130)).unwrap();
    let opts = BatchOpts::new(2).with_interval(Duration::from_millis(50));
    let result = run_batch(items(20), &opts, slow, &cancel).unwrap();
    assert!(result.partial);
    assert!(result.admitted < 20);
    assert!(result.processed() <= result.admitted);
}

#[test]
fn test_panicking_observer_yields_partial_result() {
    let cancel = CancellationToken::new();
    let result = run_batch_with_observer(
        items(4),
        &BatchOpts::new(2),
        always_ok,
        &cancel,
        |_| panic!("storage callback failed"),
    )
    .unwrap();
    assert!(result.partial);
    assert_eq!(result.total, 4);
    assert!(result.processed() < result.total);
    assert!(!result.is_complete());
}

// --- edge cases ---

#[test]
fn test_zero_workers_is_rejected() {
    let cancel = CancellationToken::new();
    let err = run_batch(items(3), &BatchOpts::new(0), always_ok, &cancel).unwrap_err();
    assert_eq!(err, PipelineError::InvalidWorkerCount(0));
}

#[test]
fn test_empty_batch_immediate_and_paced() {
    for interval in [Duration::ZERO, Duration::from_millis(20)] {
        let cancel = CancellationToken::new();
        let opts = BatchOpts::new(2).with_interval(interval);
        let result = run_batch(Vec::<u32>::new(), &opts, always_ok, &cancel).unwrap();
        assert_eq!(result, AggregateResult::new(0));
        assert!(!result.partial);
    }
}

#[test]
fn test_more_workers_than_items() {
    let cancel = CancellationToken::new();
    let result = run_batch(items(3), &BatchOpts::new(10), always_ok, &cancel).unwrap();
    assert_eq!(result.success_count, 3);
    assert!(!result.partial);
}

#[test]
fn test_process_fn_receives_every_payload() {
    let seen = Arc::new(Mutex::new(HashSet::new()));
    let seen_fn = Arc::clone(&seen);
    let cancel = CancellationToken::new();
    let record = move |item: &u32, _: &CancellationToken| -> Result<(), String> {
        seen_fn.lock().unwrap().insert(*item);
        Ok(())
    };
    run_batch(items(50), &BatchOpts::new(6), record, &cancel).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 50);
}
