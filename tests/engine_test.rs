//! Integration tests for the engine: submission, processing, pool sizing.

use calcq::config::WORKERS_KEY;
use calcq::engine::{Engine, PoolConfig};
use calcq::model::{Request, RequestId, Status};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn test_engine(pairs: &[(&str, u64)]) -> Engine {
    let initial = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    Engine::new(initial, PoolConfig::default())
}

async fn wait_terminal(request: &Request) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !request.status().is_terminal() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("request did not reach a terminal state");
}

async fn wait_status(request: &Request, status: Status) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while request.status() != status {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("request never reached {status}"));
}

async fn wait_live_workers(engine: &Engine, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.pool().live_workers() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {expected} live workers, have {}",
            engine.pool().live_workers()
        )
    });
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[test]
fn submit_creates_waiting_request() {
    let engine = test_engine(&[]);

    let request = engine.submit("2*3");

    assert_eq!(request.id(), RequestId(1));
    assert_eq!(request.expr(), "2*3");
    assert_eq!(request.status(), Status::Waiting);
    assert!(request.result().is_none());
    assert!(request.end().is_none());
}

#[test]
fn ids_are_sequential_in_submission_order() {
    let engine = test_engine(&[]);

    let ids: Vec<_> = ["1", "", "bogus(", "4/2", "5"]
        .into_iter()
        .map(|expr| engine.submit(expr).id())
        .collect();

    assert_eq!(ids, (1..=5).map(RequestId).collect::<Vec<_>>());

    let listed: Vec<_> = engine.requests().into_iter().map(|v| v.expr).collect();
    assert_eq!(listed, vec!["1", "", "bogus(", "4/2", "5"]);
    assert_eq!(engine.request(RequestId(4)).unwrap().expr(), "4/2");
    assert!(engine.request(RequestId(0)).is_none());
    assert!(engine.request(RequestId(6)).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_get_unique_ids_in_log_order() {
    let engine = Arc::new(test_engine(&[]));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                (0..25)
                    .map(|i| engine.submit(format!("{t}+{i}")).id())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.extend(handle.await.unwrap());
    }
    ids.sort();
    assert_eq!(ids, (1..=200).map(RequestId).collect::<Vec<_>>());

    let listed: Vec<_> = engine.requests().into_iter().map(|v| v.id).collect();
    assert_eq!(listed, (1..=200).map(RequestId).collect::<Vec<_>>());
}

#[test]
fn requests_wait_while_pool_is_empty() {
    let engine = test_engine(&[("1", 1)]);
    let request = engine.submit("1+1");
    assert_eq!(engine.pool().worker_count(), 0);
    assert_eq!(engine.pool().queued(), 1);
    assert_eq!(request.status(), Status::Waiting);
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_to_end_latency_and_result() {
    let engine = test_engine(&[(WORKERS_KEY, 1), ("1", 50), ("+", 10)]);
    engine.reconcile().await;

    let started = Instant::now();
    let request = engine.submit("1+1");
    wait_terminal(&request).await;

    assert!(started.elapsed() >= Duration::from_millis(110));
    assert_eq!(request.status(), Status::Done);
    assert_eq!(request.result().as_deref(), Some("2"));

    let view = request.view();
    assert_eq!(view.status, "OK");
    assert_eq!(view.result, "2");
}

#[tokio::test(start_paused = true)]
async fn provisional_end_is_visible_then_overwritten() {
    let engine = test_engine(&[(WORKERS_KEY, 1), ("1", 50), ("+", 10)]);
    engine.reconcile().await;

    let request = engine.submit("1+1");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(request.status(), Status::Processing);
    let provisional = request.end().expect("estimate set while processing");
    assert!(provisional - request.start() >= chrono::Duration::milliseconds(110));
    assert!(request.result().is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(request.status(), Status::Done);
    let actual = request.end().expect("actual end set");
    assert_ne!(actual, provisional);
}

#[tokio::test]
async fn bad_expressions_are_rejected_without_result() {
    let engine = test_engine(&[(WORKERS_KEY, 2), ("1", 1000)]);
    engine.reconcile().await;

    let requests: Vec<_> = ["1+", "", "(1", "1/0", "x1"]
        .into_iter()
        .map(|expr| engine.submit(expr))
        .collect();

    let started = Instant::now();
    for request in &requests {
        wait_terminal(request).await;
        assert_eq!(request.status(), Status::Rejected, "{:?}", request.expr());
        assert!(request.result().is_none());
        assert!(request.end().is_some());
        assert_eq!(request.view().status, "Bad Request");
    }
    // Rejection skips the simulated latency even for costly characters.
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[tokio::test]
async fn rejected_request_does_not_affect_others() {
    let engine = test_engine(&[(WORKERS_KEY, 1)]);
    engine.reconcile().await;

    let bad = engine.submit("2**");
    let good = engine.submit("2*(3+4)");
    wait_terminal(&bad).await;
    wait_terminal(&good).await;

    assert_eq!(bad.status(), Status::Rejected);
    assert_eq!(good.status(), Status::Done);
    assert_eq!(good.result().as_deref(), Some("14"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_workers_can_finish_out_of_order() {
    let engine = test_engine(&[(WORKERS_KEY, 2), ("9", 400)]);
    engine.reconcile().await;

    let slow = engine.submit("9");
    let fast = engine.submit("1");

    wait_terminal(&fast).await;
    assert_eq!(fast.status(), Status::Done);
    assert_ne!(slow.status(), Status::Done);

    wait_terminal(&slow).await;
    assert_eq!(slow.result().as_deref(), Some("9"));
}

#[tokio::test]
async fn queued_requests_run_once_workers_appear() {
    let engine = test_engine(&[]);
    let request = engine.submit("3-1");
    engine.reconcile().await;
    assert_eq!(request.status(), Status::Waiting);

    engine.edit_config([(WORKERS_KEY, "1")]);
    engine.reconcile().await;
    wait_terminal(&request).await;
    assert_eq!(request.result().as_deref(), Some("2"));
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconcile_grows_from_zero_to_five() {
    let engine = test_engine(&[(WORKERS_KEY, 5)]);
    assert_eq!(engine.pool().worker_count(), 0);

    assert_eq!(engine.reconcile().await, 5);
    assert_eq!(engine.pool().worker_count(), 5);
    wait_live_workers(&engine, 5).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconcile_shrinks_from_five_to_zero() {
    let engine = test_engine(&[(WORKERS_KEY, 5)]);
    engine.reconcile().await;

    engine.edit_config([(WORKERS_KEY, "0")]);
    assert_eq!(engine.reconcile().await, 0);
    assert_eq!(engine.pool().worker_count(), 0);
    wait_live_workers(&engine, 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconcile_is_idempotent() {
    let engine = test_engine(&[(WORKERS_KEY, 3)]);
    assert_eq!(engine.reconcile().await, 3);
    wait_live_workers(&engine, 3).await;

    for _ in 0..3 {
        assert_eq!(engine.reconcile().await, 3);
        assert_eq!(engine.pool().worker_count(), 3);
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.pool().live_workers(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_worker_key_means_zero_workers() {
    let engine = test_engine(&[(WORKERS_KEY, 2)]);
    engine.reconcile().await;

    // Only the pool sizer reads NumOfWorkers; unrelated edits keep it.
    engine.edit_config([("7", "5")]);
    assert_eq!(engine.reconcile().await, 2);

    let empty = test_engine(&[("7", 5)]);
    assert_eq!(empty.reconcile().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shrink_waits_for_busy_worker() {
    let engine = test_engine(&[(WORKERS_KEY, 1), ("9", 150)]);
    engine.reconcile().await;

    let request = engine.submit("9");
    wait_status(&request, Status::Processing).await;

    engine.edit_config([(WORKERS_KEY, "0")]);
    assert_eq!(engine.reconcile().await, 0);

    // The only worker could take the stop signal only after finishing.
    assert_eq!(request.status(), Status::Done);
    wait_live_workers(&engine, 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_reconciles_converge() {
    let engine = test_engine(&[(WORKERS_KEY, 4)]);

    let (a, b) = tokio::join!(engine.reconcile(), engine.reconcile());
    assert_eq!((a, b), (4, 4));
    assert_eq!(engine.pool().worker_count(), 4);

    engine.edit_config([(WORKERS_KEY, "1")]);
    let (a, b) = tokio::join!(engine.reconcile(), engine.reconcile());
    assert_eq!((a, b), (1, 1));
    wait_live_workers(&engine, 1).await;
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_stops_all_workers() {
    let engine = test_engine(&[(WORKERS_KEY, 3)]);
    engine.reconcile().await;
    wait_live_workers(&engine, 3).await;

    engine.shutdown();
    assert!(engine.is_shut_down());
    engine.stopped().await;
    wait_live_workers(&engine, 0).await;

    // Shrinking after shutdown gives up instead of waiting forever.
    engine.edit_config([(WORKERS_KEY, "0")]);
    let reached = tokio::time::timeout(Duration::from_secs(1), engine.reconcile())
        .await
        .expect("reconcile must not spin after shutdown");
    assert_eq!(reached, 0);
    assert_eq!(engine.pool().worker_count(), 0);

    // Growing after shutdown spawns nothing.
    engine.edit_config([(WORKERS_KEY, "4")]);
    assert_eq!(engine.reconcile().await, 0);
    assert_eq!(engine.pool().worker_count(), 0);
    assert_eq!(engine.pool().live_workers(), 0);
}

#[tokio::test]
async fn reconcile_after_shutdown_spawns_no_workers() {
    let engine = test_engine(&[(WORKERS_KEY, 3)]);
    engine.shutdown();

    assert_eq!(engine.reconcile().await, 0);
    assert_eq!(engine.pool().worker_count(), 0);
    assert_eq!(engine.pool().live_workers(), 0);
}
