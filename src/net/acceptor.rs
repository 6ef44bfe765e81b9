//! Acceptor tasks and their lifecycle state.
//!
//! # Responsibilities
//! - Run the accept loop: accept, admit, wrap, dispatch
//! - Apply exponential backoff to repeated transient accept failures
//! - Track per-acceptor state for the unlock/stop bookkeeping
//!
//! # Design Decisions
//! - A paused endpoint keeps its acceptors alive; they sleep-poll and
//!   discard anything accepted purely to wake them up
//! - `Paused` exists in the state set for transports that want to report
//!   it, but this loop never assigns it
//! - A fatal accept failure ends one acceptor, never the whole endpoint

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::lifecycle::endpoint::EndpointFlags;
use crate::lifecycle::shutdown::StopSignal;
use crate::net::admission::AdmissionGate;
use crate::net::connection::{Connection, SocketEvent};
use crate::net::transport::{AcceptError, Transport};
use crate::observability::metrics::ACCEPT_ERRORS_TOTAL;
use crate::resilience::backoff;
use crate::worker::WorkerDispatcher;

/// Lifecycle state of one acceptor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    New,
    Running,
    Paused,
    Ended,
}

#[derive(Debug)]
pub(crate) struct AcceptorStateCell(AtomicU8);

impl AcceptorStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub(crate) fn get(&self) -> AcceptorState {
        match self.0.load(Ordering::Acquire) {
            0 => AcceptorState::New,
            1 => AcceptorState::Running,
            2 => AcceptorState::Paused,
            _ => AcceptorState::Ended,
        }
    }

    pub(crate) fn set(&self, state: AcceptorState) {
        let value = match state {
            AcceptorState::New => 0,
            AcceptorState::Running => 1,
            AcceptorState::Paused => 2,
            AcceptorState::Ended => 3,
        };
        self.0.store(value, Ordering::Release);
    }
}

/// Handle to one spawned acceptor.
#[derive(Debug)]
pub struct AcceptorHandle {
    name: String,
    state: Arc<AcceptorStateCell>,
    join: JoinHandle<()>,
}

impl AcceptorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AcceptorState {
        self.state.get()
    }
}

/// Everything an acceptor task needs, shared with the endpoint.
pub(crate) struct AcceptorContext<T: Transport> {
    pub(crate) endpoint_name: String,
    pub(crate) transport: Arc<T>,
    pub(crate) dispatcher: Arc<WorkerDispatcher<T::Conn>>,
    pub(crate) gate: Arc<ArcSwapOption<AdmissionGate>>,
    pub(crate) flags: Arc<EndpointFlags>,
    pub(crate) stop: StopSignal,
}

impl<T: Transport> Clone for AcceptorContext<T> {
    fn clone(&self) -> Self {
        Self {
            endpoint_name: self.endpoint_name.clone(),
            transport: Arc::clone(&self.transport),
            dispatcher: Arc::clone(&self.dispatcher),
            gate: Arc::clone(&self.gate),
            flags: Arc::clone(&self.flags),
            stop: self.stop.clone(),
        }
    }
}

/// The set of acceptor tasks launched by one endpoint start.
#[derive(Debug)]
pub struct AcceptorGroup {
    handles: Mutex<Vec<AcceptorHandle>>,
}

impl AcceptorGroup {
    pub(crate) fn spawn<T: Transport>(count: usize, ctx: &AcceptorContext<T>) -> Self {
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let name = format!("{}-acceptor-{}", ctx.endpoint_name, index);
            let state = Arc::new(AcceptorStateCell::new());
            let join = tokio::spawn(accept_loop(ctx.clone(), Arc::clone(&state), name.clone()));
            handles.push(AcceptorHandle { name, state, join });
        }
        Self {
            handles: Mutex::new(handles),
        }
    }

    pub fn states(&self) -> Vec<AcceptorState> {
        self.handles
            .lock()
            .iter()
            .map(AcceptorHandle::state)
            .collect()
    }

    pub fn any_running(&self) -> bool {
        self.handles
            .lock()
            .iter()
            .any(|handle| handle.state() == AcceptorState::Running)
    }

    /// Poll until no acceptor reports `Running`, at most `max` long.
    /// Returns true when every acceptor left the running state in time.
    pub(crate) async fn wait_not_running(&self, max: Duration) -> bool {
        let mut left = max;
        while self.any_running() && !left.is_zero() {
            let step = Duration::from_millis(50).min(left);
            tokio::time::sleep(step).await;
            left = left.saturating_sub(step);
        }
        !self.any_running()
    }

    /// Join every acceptor task, aborting any that outlives `each`.
    pub(crate) async fn shut_down(&self, each: Duration) {
        let handles: Vec<AcceptorHandle> = self.handles.lock().drain(..).collect();
        for mut handle in handles {
            if tokio::time::timeout(each, &mut handle.join).await.is_err() {
                tracing::warn!(acceptor = %handle.name, "acceptor did not stop in time, aborting");
                handle.join.abort();
            }
        }
    }
}

async fn accept_loop<T: Transport>(
    ctx: AcceptorContext<T>,
    state: Arc<AcceptorStateCell>,
    name: String,
) {
    let mut stop_rx = ctx.stop.subscribe();
    let mut error_delay = 0u64;
    state.set(AcceptorState::Running);
    tracing::debug!(acceptor = %name, "accept loop started");

    while ctx.flags.is_running() {
        // A paused endpoint keeps the loop alive but admits nothing.
        if ctx.flags.is_paused() {
            tokio::time::sleep(Duration::from_millis(50)).await;
            continue;
        }

        let accepted = tokio::select! {
            accepted = ctx.transport.accept_one() => accepted,
            _ = stop_rx.recv() => break,
        };

        match accepted {
            Ok(raw) => {
                error_delay = 0;
                // Connections accepted only to unblock this loop are
                // discarded.
                if !ctx.flags.is_running() || ctx.flags.is_paused() {
                    drop(raw);
                    continue;
                }
                let permit = match ctx.gate.load_full() {
                    Some(gate) => {
                        let permit = tokio::select! {
                            permit = gate.acquire() => permit,
                            _ = stop_rx.recv() => {
                                drop(raw);
                                break;
                            }
                        };
                        Some(permit)
                    }
                    None => None,
                };
                let conn = Arc::new(Connection::new(raw, permit));
                let connection_id = conn.id();
                if let Err(err) = ctx
                    .dispatcher
                    .dispatch(Arc::clone(&conn), SocketEvent::OpenRead, true)
                    .await
                {
                    tracing::warn!(
                        acceptor = %name,
                        connection_id = %connection_id,
                        error = %err,
                        "connection could not be dispatched"
                    );
                    conn.close();
                }
            }
            Err(AcceptError::Transient(err)) => {
                metrics::counter!(ACCEPT_ERRORS_TOTAL).increment(1);
                tracing::warn!(acceptor = %name, error = %err, "transient accept failure");
                error_delay = backoff::delay_on_failure(error_delay).await;
            }
            Err(AcceptError::Fatal(err)) => {
                if ctx.flags.is_running() {
                    tracing::error!(acceptor = %name, error = %err, "accept failed, acceptor is ending");
                }
                break;
            }
        }
    }

    state.set(AcceptorState::Ended);
    tracing::debug!(acceptor = %name, "accept loop ended");
}
