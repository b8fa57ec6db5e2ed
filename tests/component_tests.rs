//! Stage-level tests: cancellation token, completion latch, job source, collector, lifecycle.

use crossbeam_channel::{RecvTimeoutError, TryRecvError, bounded};
use std::time::{Duration, Instant};
use tickpool::pipeline::{
    CollectExit, CollectorParams, CompletionLatch, Coordinator, Lifecycle, LifecycleState,
    collect_outcomes, create_pipeline_channels, run_job_source,
};
use tickpool::{Admission, AggregateResult, BatchOpts, CancellationToken, Outcome, WorkItem};

// --- CancellationToken ---

#[test]
fn test_cancel_flips_once() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());
    assert!(token.cancel());
    assert!(!token.cancel());
    assert!(token.is_cancelled());
}

#[test]
fn test_clones_share_state() {
    let token = CancellationToken::new();
    let other = token.clone();
    other.cancel();
    assert!(token.is_cancelled());
}

#[test]
fn test_subscriber_blocks_until_cancelled() {
    let token = CancellationToken::new();
    let signal = token.subscribe();
    assert_eq!(
        signal.recv_timeout(Duration::from_millis(20)),
        Err(RecvTimeoutError::Timeout)
    );
    token.cancel();
    assert_eq!(
        signal.recv_timeout(Duration::from_millis(20)),
        Err(RecvTimeoutError::Disconnected)
    );
    // Subscribing after the fact is ready immediately too.
    assert_eq!(token.subscribe().try_recv(), Err(TryRecvError::Disconnected));
}

#[test]
fn test_wait_timeout_without_cancel() {
    let token = CancellationToken::new();
    let start = Instant::now();
    assert!(!token.wait_timeout(Duration::from_millis(30)));
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_cancel_after_deadline() {
    let token = CancellationToken::new();
    let timer = token.cancel_after(Duration::from_millis(30)).unwrap();
    assert!(token.wait_timeout(Duration::from_secs(2)));
    timer.join().unwrap();
}

#[test]
fn test_deadline_thread_is_named() {
    let token = CancellationToken::new();
    let timer = token.cancel_after(Duration::from_millis(10)).unwrap();
    assert_eq!(timer.thread().name(), Some("tickpool-deadline"));
    timer.join().unwrap();
    assert!(token.is_cancelled());
}

#[test]
fn test_cancel_after_exits_early_when_already_cancelled() {
    let token = CancellationToken::new();
    let timer = token.cancel_after(Duration::from_secs(60)).unwrap();
    token.cancel();
    let start = Instant::now();
    timer.join().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
}

// --- CompletionLatch ---

#[test]
fn test_latch_signals_after_last_guard() {
    let latch = CompletionLatch::new(2);
    let a = latch.guard();
    let b = latch.guard();
    let done = latch.done_signal();
    drop(a);
    assert_eq!(latch.remaining(), 1);
    assert_eq!(done.try_recv(), Err(TryRecvError::Empty));
    drop(b);
    assert!(latch.is_done());
    assert_eq!(done.try_recv(), Err(TryRecvError::Disconnected));
}

#[test]
fn test_latch_of_zero_is_done() {
    let latch = CompletionLatch::new(0);
    assert!(latch.is_done());
    assert_eq!(latch.done_signal().try_recv(), Err(TryRecvError::Disconnected));
}

#[test]
fn test_latch_counts_down_on_panic() {
    let latch = CompletionLatch::new(1);
    let guard = latch.guard();
    let handle = std::thread::spawn(move || {
        let _guard = guard;
        panic!("worker blew up");
    });
    assert!(handle.join().is_err());
    assert!(latch.is_done());
}

// --- Job source ---

#[test]
fn test_immediate_source_admits_in_order_and_closes() {
    let (tx, rx) = bounded::<WorkItem<char>>(3);
    let token = CancellationToken::new();
    let admitted = run_job_source(vec!['a', 'b', 'c'], Admission::Immediate, tx, &token);
    assert_eq!(admitted, 3);
    let got: Vec<(usize, char)> = rx.iter().map(|w| (w.index, w.payload)).collect();
    assert_eq!(got, vec![(0, 'a'), (1, 'b'), (2, 'c')]);
}

#[test]
fn test_cancelled_source_admits_nothing_and_closes() {
    let (tx, rx) = bounded::<WorkItem<u8>>(3);
    let token = CancellationToken::new();
    token.cancel();
    let admitted = run_job_source(vec![1, 2, 3], Admission::Immediate, tx, &token);
    assert_eq!(admitted, 0);
    assert!(rx.recv().is_err());
}

#[test]
fn test_paced_source_stops_between_ticks() {
    let (tx, rx) = bounded::<WorkItem<u8>>(10);
    let token = CancellationToken::new();
    token.cancel_after(Duration::from_millis(80)).unwrap();
    let admitted = run_job_source(
        (0..10).collect(),
        Admission::Paced(Duration::from_millis(50)),
        tx,
        &token,
    );
    assert_eq!(admitted, 2);
    assert_eq!(rx.iter().count(), 2);
}

#[test]
fn test_admission_from_interval() {
    assert_eq!(Admission::from_interval(Duration::ZERO), Admission::Immediate);
    assert_eq!(
        Admission::from_interval(Duration::from_secs(2)),
        Admission::Paced(Duration::from_secs(2))
    );
}

// --- Collector ---

fn outcome(index: usize, ok: bool) -> Outcome<(), String> {
    Outcome {
        index,
        result: if ok { Ok(()) } else { Err("boom".into()) },
    }
}

#[test]
fn test_collector_counts_until_close() {
    let channels = create_pipeline_channels::<(), (), String>(4);
    for (i, ok) in [true, false, true, true].into_iter().enumerate() {
        channels.outcome_tx.send(outcome(i, ok)).unwrap();
    }
    drop(channels.outcome_tx);
    let latch = CompletionLatch::new(0);
    let token = CancellationToken::new();
    let lifecycle = Lifecycle::new();
    let mut tally = AggregateResult::new(4);
    let exit = collect_outcomes(
        &mut tally,
        CollectorParams {
            outcome_rx: channels.outcome_rx,
            pool_done: latch.done_signal(),
            cancel: &token,
            shutdown_grace: Duration::from_millis(100),
            lifecycle: &lifecycle,
            on_outcome: None,
        },
    );
    assert_eq!(exit, CollectExit::Drained);
    assert_eq!(tally.success_count, 3);
    assert_eq!(tally.error_count, 1);
}

#[test]
fn test_collector_times_out_waiting_for_pool() {
    let channels = create_pipeline_channels::<(), (), String>(2);
    channels.outcome_tx.send(outcome(0, true)).unwrap();
    let latch = CompletionLatch::new(1);
    let _still_running = latch.guard();
    let token = CancellationToken::new();
    token.cancel();
    let lifecycle = Lifecycle::new();
    lifecycle.begin_running();
    let mut tally = AggregateResult::new(2);
    let start = Instant::now();
    let exit = collect_outcomes(
        &mut tally,
        CollectorParams {
            outcome_rx: channels.outcome_rx,
            pool_done: latch.done_signal(),
            cancel: &token,
            shutdown_grace: Duration::from_millis(50),
            lifecycle: &lifecycle,
            on_outcome: None,
        },
    );
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(
        exit,
        CollectExit::Cancelled {
            workers_exited: false
        }
    );
    assert!(tally.shutdown_timed_out);
    // Already-queued outcome is still counted.
    assert_eq!(tally.success_count, 1);
    assert_eq!(lifecycle.state(), LifecycleState::Draining);
}

// --- AggregateResult ---

#[test]
fn test_merge_is_commutative() {
    let a = AggregateResult {
        success_count: 3,
        error_count: 1,
        admitted: 4,
        total: 4,
        ..AggregateResult::default()
    };
    let b = AggregateResult {
        success_count: 1,
        error_count: 2,
        admitted: 3,
        total: 5,
        partial: true,
        ..AggregateResult::default()
    };
    let mut ab = a;
    ab.merge(&b);
    let mut ba = b;
    ba.merge(&a);
    assert_eq!(ab, ba);
    assert_eq!(ab.processed(), 7);
    assert!(ab.partial);
}

#[test]
fn test_record_order_does_not_matter() {
    let outcomes: Vec<_> = (0..6).map(|i| outcome(i, i % 2 == 0)).collect();
    let mut forward = AggregateResult::new(6);
    outcomes.iter().for_each(|o| forward.record(o));
    let mut backward = AggregateResult::new(6);
    outcomes.iter().rev().for_each(|o| backward.record(o));
    assert_eq!(forward, backward);
    assert_eq!(forward.success_count, 3);
}

// --- Lifecycle / Coordinator ---

#[test]
fn test_lifecycle_transitions() {
    let lc = Lifecycle::new();
    assert_eq!(lc.state(), LifecycleState::Idle);
    assert!(!lc.begin_draining());
    assert!(lc.begin_running());
    assert!(!lc.begin_running());
    assert!(lc.begin_draining());
    assert!(!lc.begin_draining());
    lc.finish();
    assert_eq!(lc.state(), LifecycleState::Done);
    assert!(!lc.begin_running());
}

#[test]
fn test_coordinator_reaches_done() {
    let token = CancellationToken::new();
    let coordinator = Coordinator::new(&token);
    assert_eq!(coordinator.state(), LifecycleState::Idle);
    let handles = coordinator
        .start(
            vec![1_u8, 2, 3],
            &BatchOpts::new(2),
            |_: &u8, _: &CancellationToken| Ok::<(), String>(()),
            None,
        )
        .unwrap();
    let result = coordinator.finish(handles);
    assert_eq!(coordinator.state(), LifecycleState::Done);
    assert_eq!(result.success_count, 3);
}
