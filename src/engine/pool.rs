//! Elastic worker pool.
//!
//! All workers pull from one shared job channel. The number of workers
//! follows the `NumOfWorkers` configuration value: [`WorkerPool::reconcile`]
//! spawns workers to grow and hands stop signals to idle workers to shrink.
//! A worker busy with a request is never interrupted.

use crate::config::ConfigStore;
use crate::model::Request;
use crate::telemetry::metrics;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::process::process;

/// Pool of worker tasks sized from the configuration store.
pub struct WorkerPool {
    jobs_tx: flume::Sender<Arc<Request>>,
    jobs_rx: flume::Receiver<Arc<Request>>,
    /// Zero capacity: a send only succeeds while some worker is parked on it.
    stop_tx: flume::Sender<()>,
    stop_rx: flume::Receiver<()>,
    store: Arc<ConfigStore>,
    shutdown: CancellationToken,
    retry_interval: Duration,
    /// Workers the pool has started and not yet stopped.
    actual: AtomicUsize,
    /// Worker tasks still running their loop.
    live: Arc<AtomicUsize>,
    next_worker_id: AtomicUsize,
    /// Serializes reconciliation; `actual` only changes while this is held.
    reconcile_lock: Mutex<()>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<ConfigStore>,
        shutdown: CancellationToken,
        retry_interval: Duration,
    ) -> Self {
        let (jobs_tx, jobs_rx) = flume::unbounded();
        let (stop_tx, stop_rx) = flume::bounded(0);
        Self {
            jobs_tx,
            jobs_rx,
            stop_tx,
            stop_rx,
            store,
            shutdown,
            retry_interval,
            actual: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            next_worker_id: AtomicUsize::new(1),
            reconcile_lock: Mutex::new(()),
        }
    }

    /// Queue a request for whichever worker is free next. Never blocks.
    pub fn run(&self, request: Arc<Request>) {
        let id = request.id();
        if self.jobs_tx.send(request).is_err() {
            // Unreachable while the pool holds its own receiver.
            error!(request_id = %id, "job channel closed, request dropped");
        }
    }

    /// Number of workers the pool currently counts as running.
    pub fn worker_count(&self) -> usize {
        self.actual.load(Ordering::SeqCst)
    }

    /// Worker tasks that have not exited yet. Lags `worker_count` briefly
    /// after a stop signal is delivered.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Requests submitted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.jobs_rx.len()
    }

    /// Bring the worker count to the configured `NumOfWorkers`.
    ///
    /// Shrinking waits for idle workers, retrying every `retry_interval`,
    /// so it can take as long as the longest in-flight request. After
    /// shutdown nothing is spawned and the count drops to 0. Returns the
    /// worker count reached.
    pub async fn reconcile(&self) -> usize {
        let _guard = self.reconcile_lock.lock().await;
        // Every worker exits on shutdown, so none remain to count or spawn.
        if self.shutdown.is_cancelled() {
            debug!("pool is shut down, not reconciling");
            self.actual.store(0, Ordering::SeqCst);
            return 0;
        }
        let desired = self.store.desired_workers();
        let mut actual = self.actual.load(Ordering::SeqCst);
        if actual != desired {
            info!(desired, actual, "reconciling worker pool");
        }

        while actual < desired {
            self.spawn_worker();
            actual += 1;
            self.actual.store(actual, Ordering::SeqCst);
        }

        while actual > desired {
            if self.shutdown.is_cancelled() {
                warn!(desired, actual, "shutdown during pool shrink");
                actual = 0;
                self.actual.store(actual, Ordering::SeqCst);
                break;
            }
            match self.stop_tx.try_send(()) {
                Ok(()) => {
                    actual -= 1;
                    self.actual.store(actual, Ordering::SeqCst);
                    metrics::workers_retired().add(1, &[]);
                }
                Err(flume::TrySendError::Full(())) => {
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(flume::TrySendError::Disconnected(())) => {
                    error!("stop channel closed");
                    break;
                }
            }
        }

        actual
    }

    fn spawn_worker(&self) {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::SeqCst);
        metrics::workers_spawned().add(1, &[]);

        let worker = Worker {
            id: worker_id,
            jobs: self.jobs_rx.clone(),
            stop: self.stop_rx.clone(),
            store: Arc::clone(&self.store),
            shutdown: self.shutdown.clone(),
            live: Arc::clone(&self.live),
        };
        tokio::spawn(worker.run());
    }
}

struct Worker {
    id: usize,
    jobs: flume::Receiver<Arc<Request>>,
    stop: flume::Receiver<()>,
    store: Arc<ConfigStore>,
    shutdown: CancellationToken,
    live: Arc<AtomicUsize>,
}

impl Worker {
    async fn run(self) {
        debug!(worker_id = self.id, "worker started");
        loop {
            tokio::select! {
                job = self.jobs.recv_async() => match job {
                    Ok(request) => process(&request, &self.store, self.id).await,
                    Err(_) => break,
                },
                _ = self.stop.recv_async() => {
                    debug!(worker_id = self.id, "stop signal received");
                    break;
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!(worker_id = self.id, "worker stopped");
    }
}
