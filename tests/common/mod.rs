//! Shared helpers for the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use portico::config::EndpointConfig;
use portico::net::connection::{Connection, SocketEvent, SocketState};
use portico::worker::ProtocolHandler;

/// Reads the first chunk from each connection, optionally holds the
/// admission slot for a while, and closes. Data-carrying connections are
/// counted separately so wakeup connections never skew assertions.
pub struct RecordingHandler {
    pub total: AtomicUsize,
    pub with_data: AtomicUsize,
    hold: Duration,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Self::holding(Duration::ZERO)
    }

    pub fn holding(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            total: AtomicUsize::new(0),
            with_data: AtomicUsize::new(0),
            hold,
        })
    }

    pub fn processed_with_data(&self) -> usize {
        self.with_data.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolHandler<TcpStream> for RecordingHandler {
    async fn process(&self, conn: &Arc<Connection<TcpStream>>, _event: SocketEvent) -> SocketState {
        let mut buf = [0u8; 1024];
        let read = {
            let mut io = conn.io().lock().await;
            io.read(&mut buf).await.unwrap_or(0)
        };
        if read > 0 {
            self.with_data.fetch_add(1, Ordering::SeqCst);
        }
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        self.total.fetch_add(1, Ordering::SeqCst);
        SocketState::Closed
    }

    fn open_connections(&self) -> usize {
        0
    }

    async fn release(&self, _conn: &Arc<Connection<TcpStream>>) {}

    fn pause(&self) {}

    fn recycle(&self) {}
}

/// Loopback config with an ephemeral port and a small worker pool.
pub fn test_config(name: &str) -> EndpointConfig {
    let mut config = EndpointConfig::default();
    config.name = name.to_string();
    config.bind_address = "127.0.0.1:0".to_string();
    config.bind_on_init = false;
    config.workers.core = 2;
    config.workers.max = 4;
    config.workers.queue_capacity = 8;
    config.workers.termination_grace_ms = 1_000;
    config
}

/// Poll until `check` passes or a few seconds elapse.
pub async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
