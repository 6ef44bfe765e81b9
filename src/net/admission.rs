//! Connection admission gate.
//!
//! # Responsibilities
//! - Bound the number of connections the endpoint holds open
//! - Park acceptors when the bound is reached, wake them as slots free
//! - Support raising, lowering and disabling the bound at runtime
//!
//! # Design Decisions
//! - Count and limit share one lock so limit changes cannot lose wakeups
//! - Waiters re-check through a watch channel rather than consuming permits,
//!   so waking more tasks than there are free slots is harmless
//! - A disabled gate stays disabled; re-enabling admission swaps in a fresh
//!   gate instance so stale permits cannot corrupt the new count

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::observability::metrics::OPEN_CONNECTIONS;

#[derive(Debug)]
struct GateState {
    count: u64,
    limit: u64,
    released: bool,
}

/// Counting latch that admits at most `limit` concurrent connections.
///
/// `acquire` parks until a slot is free; the returned [`AdmissionPermit`]
/// frees the slot when dropped. [`release_all`](AdmissionGate::release_all)
/// permanently disables the instance and wakes every waiter.
#[derive(Debug)]
pub struct AdmissionGate {
    state: Mutex<GateState>,
    changed: watch::Sender<()>,
    underflow: AtomicBool,
}

impl AdmissionGate {
    pub fn new(limit: u64) -> Arc<Self> {
        let (changed, _) = watch::channel(());
        Arc::new(Self {
            state: Mutex::new(GateState {
                count: 0,
                limit,
                released: false,
            }),
            changed,
            underflow: AtomicBool::new(false),
        })
    }

    /// Wait for a slot and claim it.
    ///
    /// Returns immediately with an uncounted permit once the gate has been
    /// disabled via [`release_all`](AdmissionGate::release_all). Dropping the
    /// future while parked leaves the count untouched.
    pub async fn acquire(self: Arc<Self>) -> AdmissionPermit {
        // Subscribing before the first check means a release or limit change
        // between a failed check and the await below is never lost.
        let mut rx = self.changed.subscribe();
        loop {
            {
                let mut state = self.state.lock();
                if state.released {
                    return AdmissionPermit {
                        gate: Arc::clone(&self),
                        counted: false,
                    };
                }
                if state.count < state.limit {
                    state.count += 1;
                    metrics::gauge!(OPEN_CONNECTIONS).set(state.count as f64);
                    return AdmissionPermit {
                        gate: Arc::clone(&self),
                        counted: true,
                    };
                }
            }
            if rx.changed().await.is_err() {
                // Sender gone means the gate itself is being torn down.
                return AdmissionPermit {
                    gate: self,
                    counted: false,
                };
            }
        }
    }

    /// Give one slot back.
    ///
    /// Returns the remaining count, or -1 once the gate is disabled.
    /// Releasing more times than acquired is a caller accounting bug; it is
    /// flagged and logged but the count saturates at zero.
    pub fn release(&self) -> i64 {
        let remaining = {
            let mut state = self.state.lock();
            if state.released {
                return -1;
            }
            if state.count == 0 {
                self.underflow.store(true, Ordering::Relaxed);
                tracing::warn!("admission gate released more times than it was acquired");
                0
            } else {
                state.count -= 1;
                metrics::gauge!(OPEN_CONNECTIONS).set(state.count as f64);
                state.count
            }
        };
        let _ = self.changed.send(());
        remaining as i64
    }

    /// Adjust the bound. A negative limit disables the gate entirely, as
    /// [`release_all`](AdmissionGate::release_all) does; raising the bound
    /// wakes parked waiters up to the new capacity.
    pub fn set_limit(&self, limit: i64) {
        if limit < 0 {
            self.release_all();
            return;
        }
        let grew = {
            let mut state = self.state.lock();
            let grew = (limit as u64) > state.limit;
            state.limit = limit as u64;
            grew
        };
        if grew {
            let _ = self.changed.send(());
        }
    }

    /// Disable the gate and wake every waiter unconditionally. The instance
    /// stays disabled for the rest of its life.
    pub fn release_all(&self) {
        {
            let mut state = self.state.lock();
            state.released = true;
            state.count = 0;
        }
        metrics::gauge!(OPEN_CONNECTIONS).set(0.0);
        let _ = self.changed.send(());
    }

    /// Live count, or -1 once the gate is disabled.
    pub fn count(&self) -> i64 {
        let state = self.state.lock();
        if state.released {
            -1
        } else {
            state.count as i64
        }
    }

    /// Configured bound, or -1 once the gate is disabled.
    pub fn limit(&self) -> i64 {
        let state = self.state.lock();
        if state.released {
            -1
        } else {
            state.limit as i64
        }
    }

    /// True if a release/acquire imbalance was ever detected.
    pub fn saw_underflow(&self) -> bool {
        self.underflow.load(Ordering::Relaxed)
    }
}

/// A claimed admission slot. Dropping the permit frees the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
    counted: bool,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if self.counted {
            self.gate.release();
        }
    }
}
