//! Bounded worker pool for connection processing.
//!
//! # Responsibilities
//! - Run processors inline on the calling task, or queue them to workers
//! - Grow the worker set on demand between its core and max sizes
//! - Distinguish saturation from faults; neither crosses the boundary
//! - Shut down within a bounded grace period, then abort stragglers
//!
//! # Design Decisions
//! - Workers share one receiver behind an async lock; an idle worker parks
//!   inside `recv` and hands the lock over as soon as an item arrives
//! - Resizing is a watch-channel target; surplus workers exit at the next
//!   loop turn instead of being interrupted mid-item

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinSet;

use crate::config::WorkerConfig;
use crate::net::connection::{Connection, SocketEvent};
use crate::observability::metrics::{BUSY_WORKERS, DISPATCH_REJECTED_TOTAL};
use crate::worker::processor::{Processor, ProcessorPool};
use crate::worker::ProtocolHandler;

/// Why a dispatch did not happen. The connection stays with the caller,
/// which is responsible for closing it.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Administrative saturation: every worker is busy and the queue is
    /// full.
    #[error("worker queue is full")]
    QueueFull,
    /// The dispatcher has been shut down.
    #[error("dispatcher is shut down")]
    Terminated,
    /// The protocol handler panicked while processing inline.
    #[error("handler panicked while processing the connection")]
    Panicked,
}

struct Shared<C: Send + Sync + 'static> {
    name: String,
    tx: mpsc::Sender<Processor<C>>,
    rx: AsyncMutex<mpsc::Receiver<Processor<C>>>,
    handler: Arc<dyn ProtocolHandler<C>>,
    pool: Arc<ProcessorPool<C>>,
    /// Upper bound on live workers; shrinking it retires surplus workers.
    target: watch::Sender<usize>,
    spawned: AtomicUsize,
    busy: AtomicUsize,
    stopped: AtomicBool,
    grace: Duration,
}

/// Submits connection-processing work to a bounded set of worker tasks.
pub struct WorkerDispatcher<C: Send + Sync + 'static> {
    shared: Arc<Shared<C>>,
    workers: Mutex<JoinSet<()>>,
}

impl<C: Send + Sync + 'static> WorkerDispatcher<C> {
    /// Create the dispatcher and spawn its core workers. Must be called
    /// from within a tokio runtime.
    pub fn new(
        name: impl Into<String>,
        config: &WorkerConfig,
        handler: Arc<dyn ProtocolHandler<C>>,
        pool: Arc<ProcessorPool<C>>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (target, _) = watch::channel(config.max.max(1));
        let dispatcher = Arc::new(Self {
            shared: Arc::new(Shared {
                name: name.into(),
                tx,
                rx: AsyncMutex::new(rx),
                handler,
                pool,
                target,
                spawned: AtomicUsize::new(0),
                busy: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
                grace: Duration::from_millis(config.termination_grace_ms),
            }),
            workers: Mutex::new(JoinSet::new()),
        });
        for _ in 0..config.core.min(config.max).max(1) {
            dispatcher.spawn_worker();
        }
        dispatcher
    }

    /// Hand a connection event to the worker pool.
    ///
    /// With `offload` the processor is queued for a worker task; otherwise
    /// it runs to completion on the calling task. Failures are logged here
    /// and reported to the caller, never panicked across the boundary.
    pub async fn dispatch(
        &self,
        conn: Arc<Connection<C>>,
        event: SocketEvent,
        offload: bool,
    ) -> Result<(), DispatchError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(DispatchError::Terminated);
        }
        let mut processor = self.shared.pool.take();
        processor.reset(conn, event);

        if offload {
            self.maybe_grow();
            match self.shared.tx.try_send(processor) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    self.shared.pool.put(rejected);
                    metrics::counter!(DISPATCH_REJECTED_TOTAL).increment(1);
                    tracing::warn!(
                        dispatcher = %self.shared.name,
                        "worker queue is full, connection will not be processed"
                    );
                    Err(DispatchError::QueueFull)
                }
                Err(TrySendError::Closed(rejected)) => {
                    self.shared.pool.put(rejected);
                    tracing::error!(
                        dispatcher = %self.shared.name,
                        "dispatch to a terminated worker pool"
                    );
                    Err(DispatchError::Terminated)
                }
            }
        } else {
            // Inline on the calling task; a panicking handler must not take
            // the accept loop down with it. Abort-class faults are not
            // catchable and still propagate.
            let handler = Arc::clone(&self.shared.handler);
            let run = async move {
                processor.run(&handler).await;
                processor
            };
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(processor) => {
                    self.shared.pool.put(processor);
                    Ok(())
                }
                Err(_) => {
                    tracing::error!(
                        dispatcher = %self.shared.name,
                        "handler panicked during inline processing"
                    );
                    Err(DispatchError::Panicked)
                }
            }
        }
    }

    /// Raise or lower the maximum worker count. Surplus workers retire at
    /// their next loop turn.
    pub fn set_max_workers(&self, max: usize) {
        self.shared.target.send_replace(max.max(1));
    }

    /// Ensure at least `core` workers exist right now (bounded by the
    /// current maximum).
    pub fn set_core_workers(&self, core: usize) {
        let target = *self.shared.target.borrow();
        while self.shared.spawned.load(Ordering::Relaxed) < core.min(target) {
            self.spawn_worker();
        }
    }

    /// Live worker count.
    pub fn worker_count(&self) -> usize {
        self.shared.spawned.load(Ordering::Relaxed)
    }

    /// Workers currently processing an item.
    pub fn busy_workers(&self) -> usize {
        self.shared.busy.load(Ordering::Relaxed)
    }

    /// Stop the pool: refuse new work, retire workers, and wait up to the
    /// configured grace period before aborting whatever is left. Queued
    /// items that never ran are dropped, which releases their connections.
    pub async fn shutdown(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.target.send_replace(0);

        let mut workers = std::mem::take(&mut *self.workers.lock());
        let drained = tokio::time::timeout(self.shared.grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                dispatcher = %self.shared.name,
                grace_ms = self.shared.grace.as_millis() as u64,
                "workers did not stop within the grace period, aborting"
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        // All workers are gone, so the receiver is free: cancel whatever
        // never got picked up.
        let mut rx = self.shared.rx.lock().await;
        rx.close();
        while let Ok(stale) = rx.try_recv() {
            self.shared.pool.put(stale);
        }
        tracing::debug!(dispatcher = %self.shared.name, "worker pool shut down");
    }

    fn spawn_worker(&self) {
        let index = self.shared.spawned.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        self.workers.lock().spawn(worker_loop(shared, index));
    }

    fn maybe_grow(&self) {
        let spawned = self.shared.spawned.load(Ordering::Relaxed);
        let target = *self.shared.target.borrow();
        if spawned < target && self.shared.busy.load(Ordering::Relaxed) >= spawned {
            self.spawn_worker();
        }
    }
}

async fn worker_loop<C: Send + Sync + 'static>(shared: Arc<Shared<C>>, index: usize) {
    let mut target_rx = shared.target.subscribe();
    loop {
        if *target_rx.borrow_and_update() <= index {
            break;
        }
        let item = tokio::select! {
            item = async { shared.rx.lock().await.recv().await } => item,
            changed = target_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        };
        let Some(mut processor) = item else {
            break;
        };
        shared.busy.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!(BUSY_WORKERS).increment(1.0);
        let outcome = AssertUnwindSafe(processor.run(&shared.handler))
            .catch_unwind()
            .await;
        shared.busy.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!(BUSY_WORKERS).decrement(1.0);
        if outcome.is_err() {
            tracing::error!(dispatcher = %shared.name, worker = index, "handler panicked in worker");
        }
        shared.pool.put(processor);
    }
    shared.spawned.fetch_sub(1, Ordering::Relaxed);
    tracing::trace!(dispatcher = %shared.name, worker = index, "worker retired");
}
