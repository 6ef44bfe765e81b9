//! Reusable connection-processing tasks and their pool.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::net::connection::{Connection, SocketEvent, SocketState};
use crate::worker::ProtocolHandler;

/// One unit of work: "process this connection for this event".
///
/// Processors are recycled through a [`ProcessorPool`]; a pooled processor
/// never holds a reference to a retired connection.
#[derive(Debug)]
pub struct Processor<C: Send + Sync + 'static> {
    conn: Option<Arc<Connection<C>>>,
    event: SocketEvent,
}

impl<C: Send + Sync + 'static> Processor<C> {
    fn new() -> Self {
        Self {
            conn: None,
            event: SocketEvent::OpenRead,
        }
    }

    /// Arm the processor for one dispatch.
    pub(crate) fn reset(&mut self, conn: Arc<Connection<C>>, event: SocketEvent) {
        self.conn = Some(conn);
        self.event = event;
    }

    /// Drop the connection reference.
    pub(crate) fn clear(&mut self) {
        self.conn = None;
    }

    pub(crate) fn has_connection(&self) -> bool {
        self.conn.is_some()
    }

    /// Run the armed work item to completion.
    pub(crate) async fn run(&mut self, handler: &Arc<dyn ProtocolHandler<C>>) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let event = self.event;
        let state = handler.process(&conn, event).await;
        tracing::trace!(connection_id = %conn.id(), event = %event, state = ?state, "connection processed");
        if state == SocketState::Closed {
            handler.release(&conn).await;
            conn.close();
        }
    }
}

/// Bounded cache of idle processors.
///
/// Checkout pops from the stack or creates a fresh processor; return scrubs
/// the connection reference and pushes, dropping the processor instead when
/// the pool is full.
#[derive(Debug)]
pub struct ProcessorPool<C: Send + Sync + 'static> {
    stack: Mutex<Vec<Processor<C>>>,
    capacity: usize,
}

impl<C: Send + Sync + 'static> ProcessorPool<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub(crate) fn take(&self) -> Processor<C> {
        self.stack.lock().pop().unwrap_or_else(Processor::new)
    }

    pub(crate) fn put(&self, mut processor: Processor<C>) {
        // Scrub here, not at the call sites, so the no-stale-connection
        // invariant cannot depend on every caller remembering it.
        processor.clear();
        let mut stack = self.stack.lock();
        if stack.len() < self.capacity {
            stack.push(processor);
        }
    }

    pub fn idle(&self) -> usize {
        self.stack.lock().len()
    }
}
