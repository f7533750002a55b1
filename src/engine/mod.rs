//! The engine: request log, configuration store and worker pool behind one
//! context object. Submission, configuration edits and reconciliation all
//! go through here.

pub mod pool;
pub mod process;

pub use pool::WorkerPool;

use crate::config::{ConfigStore, EditOutcome};
use crate::model::{Request, RequestId, RequestView};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Tuning for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pause between stop-signal attempts while no worker is idle.
    pub shrink_retry: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            shrink_retry: Duration::from_millis(10),
        }
    }
}

/// Owns all state and enforces the request lifecycle.
pub struct Engine {
    store: Arc<ConfigStore>,
    pool: WorkerPool,
    /// Append-only; insertion order is display order and id order.
    log: RwLock<Vec<Arc<Request>>>,
    shutdown: CancellationToken,
}

impl Engine {
    /// Build an engine with no workers yet. Call [`Engine::reconcile`] to
    /// start the pool from the initial configuration.
    pub fn new(initial: HashMap<String, u64>, config: PoolConfig) -> Self {
        let store = Arc::new(ConfigStore::new(initial));
        let shutdown = CancellationToken::new();
        let pool = WorkerPool::new(Arc::clone(&store), shutdown.clone(), config.shrink_retry);
        Self {
            store,
            pool,
            log: RwLock::new(Vec::new()),
            shutdown,
        }
    }

    /// Record a new request and queue it. Validation happens in the worker,
    /// so any string is accepted.
    pub fn submit(&self, expr: impl Into<String>) -> Arc<Request> {
        let request = {
            let mut log = self.log.write();
            let id = RequestId(log.len() as u64 + 1);
            let request = Arc::new(Request::new(id, expr));
            log.push(Arc::clone(&request));
            request
        };

        debug!(request_id = %request.id(), expr = request.expr(), "request submitted");
        metrics::requests_submitted().add(1, &[]);
        self.pool.run(Arc::clone(&request));
        request
    }

    /// Every request ever submitted, in submission order.
    pub fn requests(&self) -> Vec<RequestView> {
        self.log.read().iter().map(|r| r.view()).collect()
    }

    pub fn request(&self, id: RequestId) -> Option<Arc<Request>> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.log.read().get(index).cloned()
    }

    pub fn config(&self) -> &ConfigStore {
        &self.store
    }

    pub fn config_snapshot(&self) -> BTreeMap<String, u64> {
        self.store.snapshot()
    }

    /// Apply a batch of raw key/value pairs. Invalid pairs are dropped
    /// individually. Follow with [`Engine::reconcile`].
    pub fn edit_config<I, K, V>(&self, pairs: I) -> EditOutcome
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let outcome = self.store.apply_edit(pairs);
        let counter = metrics::config_edits();
        counter.add(
            outcome.applied.len() as u64,
            &[KeyValue::new("result", "applied")],
        );
        counter.add(
            outcome.rejected.len() as u64,
            &[KeyValue::new("result", "rejected")],
        );
        info!(
            applied = outcome.applied.len(),
            rejected = outcome.rejected.len(),
            "config edited"
        );
        outcome
    }

    /// Match the worker count to the configuration. See
    /// [`WorkerPool::reconcile`].
    pub async fn reconcile(&self) -> usize {
        self.pool.reconcile().await
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Stop everything now. In-flight requests are abandoned.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once [`Engine::shutdown`] has been called.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await
    }
}
