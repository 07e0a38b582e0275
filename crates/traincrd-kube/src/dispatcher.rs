//! Work queue feeding watch events to the reconciler
//!
//! Events are queued per job. A job's events are reconciled one at a time, in
//! arrival order; different jobs are reconciled concurrently, up to the
//! configured number of workers. A failed reconcile is retried with backoff
//! when the error is transient and logged otherwise; it never stops the loop.

use std::collections::hash_map::Entry;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use traincrd_core::JobKey;

use crate::config::{DispatcherConfig, RetryConfig};
use crate::engine::ReconcileOutcome;
use crate::error::ReconcileError;
use crate::event::JobEvent;
use crate::retry::retry_with_backoff;

/// Something that can reconcile one event
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    async fn reconcile(&self, event: &JobEvent) -> Result<ReconcileOutcome, ReconcileError>;
}

/// Counters reported when the dispatcher stops
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events reconciled successfully
    pub handled: usize,
    /// Events whose reconcile failed for good
    pub failed: usize,
    /// Events never reconciled (no key, or discarded at shutdown)
    pub dropped: usize,
}

/// Dispatches job events to a `Reconciler`
pub struct EventDispatcher<R: Reconciler> {
    reconciler: Arc<R>,
    config: DispatcherConfig,
}

struct Shared<R> {
    reconciler: Arc<R>,
    retry: RetryConfig,
    permits: Arc<Semaphore>,
    /// Pending events per job; a key is present while a worker owns it
    queues: Mutex<HashMap<JobKey, VecDeque<JobEvent>>>,
    stats: Mutex<DispatchStats>,
    shutdown: CancellationToken,
}

impl<R: Reconciler> EventDispatcher<R> {
    pub fn new(reconciler: Arc<R>, config: DispatcherConfig) -> Self {
        Self { reconciler, config }
    }

    /// Consume `events` until the stream ends or `shutdown` fires
    ///
    /// Returns once every worker has finished. On shutdown, reconciles already
    /// running complete, and events still queued are discarded.
    pub async fn run<S>(&self, events: S, shutdown: CancellationToken) -> DispatchStats
    where
        S: Stream<Item = JobEvent> + Send,
    {
        let shared = Arc::new(Shared {
            reconciler: self.reconciler.clone(),
            retry: self.config.retry.clone(),
            permits: Arc::new(Semaphore::new(self.config.workers.max(1))),
            queues: Mutex::new(HashMap::new()),
            stats: Mutex::new(DispatchStats::default()),
            shutdown: shutdown.clone(),
        });
        let mut workers = JoinSet::new();
        let mut events = std::pin::pin!(events);

        info!(workers = self.config.workers.max(1), "dispatcher started");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event.key() {
                Some(key) => {
                    if shared.enqueue(key.clone(), event) {
                        workers.spawn(drain(shared.clone(), key));
                    }
                }
                None => {
                    warn!(event = %event.describe(), "event without namespace/name, dropping");
                    lock(&shared.stats).dropped += 1;
                }
            }

            while let Some(joined) = workers.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "worker panicked");
                }
            }
        }

        debug!(in_flight = workers.len(), "waiting for workers to drain");
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker panicked");
            }
        }

        let stats = lock(&shared.stats).clone();
        info!(
            handled = stats.handled,
            failed = stats.failed,
            dropped = stats.dropped,
            "dispatcher stopped"
        );
        stats
    }
}

impl<R: Reconciler> Shared<R> {
    /// Queue `event`; true when no worker owns `key` yet and one must be spawned
    fn enqueue(&self, key: JobKey, event: JobEvent) -> bool {
        let mut queues = lock(&self.queues);
        match queues.entry(key) {
            Entry::Occupied(mut pending) => {
                pending.get_mut().push_back(event);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::from([event]));
                true
            }
        }
    }

    /// Next event for `key`; releases ownership of the key when none is left
    fn next_for(&self, key: &JobKey) -> Option<JobEvent> {
        let mut queues = lock(&self.queues);
        let next = queues.get_mut(key).and_then(VecDeque::pop_front);
        if next.is_none() {
            queues.remove(key);
        }
        next
    }

    /// Drop everything queued for `key` and release it
    fn discard(&self, key: &JobKey) -> usize {
        lock(&self.queues)
            .remove(key)
            .map(|pending| pending.len())
            .unwrap_or(0)
    }

    /// Reconcile one event; a panicking reconciler counts as a failure
    async fn process(&self, key: &JobKey, event: JobEvent) {
        let action = event.action();
        let attempt = retry_with_backoff(
            &self.retry,
            action,
            &self.shutdown,
            ReconcileError::is_retryable,
            || self.reconciler.reconcile(&event),
        );

        let result = match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                error!(job = %key, action, panic = %panic_message(&*panic), "reconcile panicked");
                lock(&self.stats).failed += 1;
                return;
            }
        };

        match result {
            Ok(outcome) if outcome.is_noop() => {
                debug!(job = %key, action, "nothing to do");
                lock(&self.stats).handled += 1;
            }
            Ok(outcome) => {
                info!(job = %key, action, result = %outcome.summary(), "reconciled");
                lock(&self.stats).handled += 1;
            }
            Err(e) => {
                error!(job = %key, action, error = %e, "reconcile failed");
                lock(&self.stats).failed += 1;
            }
        }
    }
}

/// No lock is held while reconciling, so a poisoned guard still holds consistent data
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Reconcile every queued event of `key` in order, then release the key
async fn drain<R: Reconciler>(shared: Arc<Shared<R>>, key: JobKey) {
    while let Some(event) = shared.next_for(&key) {
        let permit = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => None,
            permit = shared.permits.clone().acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            let dropped = 1 + shared.discard(&key);
            debug!(job = %key, dropped, "shutting down, discarding queued events");
            lock(&shared.stats).dropped += dropped;
            return;
        };

        shared.process(&key, event).await;
    }
}
