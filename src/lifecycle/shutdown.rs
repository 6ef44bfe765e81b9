//! Stop signalling for acceptor tasks.

use tokio::sync::broadcast;

/// Broadcast used to interrupt blocked accept calls when the endpoint
/// stops.
///
/// Transports whose accept future can be raced against this signal stop
/// promptly without any network traffic; the loopback unlock connection
/// remains the portability fallback for the rest.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: broadcast::Sender<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Tasks that subscribed later still observe it as a
    /// closed channel once the endpoint drops the signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still subscribed.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
