//! Endpoint lifecycle state machine.
//!
//! # Responsibilities
//! - Pair bind with the matching unbind (init/destroy vs start/stop)
//! - Launch and drain the acceptor group
//! - Own the admission gate and the worker dispatcher
//! - Break blocked accept calls so pause/stop complete promptly
//!
//! # Design Decisions
//! - No call-order validation beyond the bind bookkeeping: the owner is
//!   trusted to sequence init/start/stop/destroy, and guards here would
//!   only mask owner bugs
//! - Stopping interrupts acceptors through the stop signal first; the
//!   loopback unlock connection is the portability fallback and the pause
//!   mechanism

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::EndpointConfig;
use crate::lifecycle::shutdown::StopSignal;
use crate::net::acceptor::{AcceptorContext, AcceptorGroup, AcceptorState};
use crate::net::admission::AdmissionGate;
use crate::net::tls::{TlsConfigRegistry, TlsContextBuilder, TlsHostConfig, TlsHostEntry, TlsRegistryError};
use crate::net::transport::Transport;
use crate::worker::{ProcessorPool, ProtocolHandler, WorkerDispatcher};

/// How long unlock/stop wait for acceptors to leave the running state.
const ACCEPTOR_WAIT: Duration = Duration::from_millis(1000);

/// Request line pushed through deferred-accept filters to wake a blocked
/// accept; the acceptor discards the connection.
const UNLOCK_WAKEUP_REQUEST: &[u8] =
    b"OPTIONS * HTTP/1.0\r\nUser-Agent: portico wakeup connection\r\n\r\n";

/// Whether and how the listening transport is currently bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Unbound,
    BoundOnInit,
    BoundOnStart,
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
    #[error("failed to unbind listener: {0}")]
    Unbind(#[source] io::Error),
    #[error(transparent)]
    Tls(#[from] TlsRegistryError),
}

/// Running/paused flags shared with the acceptor tasks.
#[derive(Debug, Default)]
pub(crate) struct EndpointFlags {
    running: AtomicBool,
    paused: AtomicBool,
}

impl EndpointFlags {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::Release);
    }

    fn set_paused(&self, value: bool) {
        self.paused.store(value, Ordering::Release);
    }
}

/// The shared listener endpoint: admission, acceptors, dispatch and
/// lifecycle over an injected [`Transport`] and [`ProtocolHandler`].
pub struct Endpoint<T: Transport> {
    name: String,
    config: EndpointConfig,
    transport: Arc<T>,
    handler: Arc<dyn ProtocolHandler<T::Conn>>,
    tls_builder: Arc<dyn TlsContextBuilder>,
    tls_registry: Arc<TlsConfigRegistry>,
    flags: Arc<EndpointFlags>,
    bind_state: Mutex<BindState>,
    max_connections: AtomicI64,
    gate: Arc<ArcSwapOption<AdmissionGate>>,
    pool: Arc<ProcessorPool<T::Conn>>,
    dispatcher: Mutex<Option<Arc<WorkerDispatcher<T::Conn>>>>,
    internal_dispatcher: AtomicBool,
    stop_signal: Mutex<StopSignal>,
    acceptors: Mutex<Option<Arc<AcceptorGroup>>>,
}

impl<T: Transport> Endpoint<T> {
    pub fn new(
        config: EndpointConfig,
        transport: T,
        handler: Arc<dyn ProtocolHandler<T::Conn>>,
    ) -> Self {
        let tls_registry = Arc::new(TlsConfigRegistry::new());
        tls_registry.set_default_host_name(&config.default_tls_host);
        Self {
            name: config.name.clone(),
            max_connections: AtomicI64::new(config.max_connections),
            pool: Arc::new(ProcessorPool::new(config.workers.processor_cache)),
            transport: Arc::new(transport),
            handler,
            tls_builder: Arc::new(crate::net::tls::PemTlsContextBuilder),
            tls_registry,
            flags: Arc::new(EndpointFlags::default()),
            bind_state: Mutex::new(BindState::Unbound),
            gate: Arc::new(ArcSwapOption::empty()),
            dispatcher: Mutex::new(None),
            internal_dispatcher: AtomicBool::new(true),
            stop_signal: Mutex::new(StopSignal::new()),
            acceptors: Mutex::new(None),
            config,
        }
    }

    /// Replace the TLS identity builder. Must happen before entries are
    /// registered against a bound endpoint.
    pub fn with_tls_context_builder(mut self, builder: Arc<dyn TlsContextBuilder>) -> Self {
        self.tls_builder = builder;
        self
    }

    /// Supply an externally owned dispatcher. The endpoint will use it but
    /// not shut it down on stop.
    pub fn set_dispatcher(&self, dispatcher: Arc<WorkerDispatcher<T::Conn>>) {
        *self.dispatcher.lock() = Some(dispatcher);
        self.internal_dispatcher.store(false, Ordering::Release);
    }

    // ------------------------------------------------------------- lifecycle

    /// Bind the transport eagerly when so configured. Calling `init` twice
    /// without an intervening `destroy` is an owner error.
    pub async fn init(&self) -> Result<(), EndpointError> {
        if self.config.bind_on_init {
            self.bind().await?;
            *self.bind_state.lock() = BindState::BoundOnInit;
        }
        Ok(())
    }

    /// Bind if still unbound, then start accepting: admission gate from the
    /// configured limit, internal dispatcher unless one was supplied, one
    /// acceptor task per configured acceptor.
    pub async fn start(&self) -> Result<(), EndpointError> {
        if *self.bind_state.lock() == BindState::Unbound {
            self.bind().await?;
            *self.bind_state.lock() = BindState::BoundOnStart;
        }

        self.initialize_admission_gate();
        let dispatcher = {
            let mut slot = self.dispatcher.lock();
            match slot.as_ref() {
                Some(dispatcher) => Arc::clone(dispatcher),
                None => {
                    let created = WorkerDispatcher::new(
                        self.name.clone(),
                        &self.config.workers,
                        Arc::clone(&self.handler),
                        Arc::clone(&self.pool),
                    );
                    *slot = Some(Arc::clone(&created));
                    self.internal_dispatcher.store(true, Ordering::Release);
                    created
                }
            }
        };
        let stop = {
            let mut signal = self.stop_signal.lock();
            *signal = StopSignal::new();
            signal.clone()
        };

        self.flags.set_paused(false);
        self.flags.set_running(true);
        let ctx = AcceptorContext {
            endpoint_name: self.name.clone(),
            transport: Arc::clone(&self.transport),
            dispatcher,
            gate: Arc::clone(&self.gate),
            flags: Arc::clone(&self.flags),
            stop,
        };
        let group = Arc::new(AcceptorGroup::spawn(self.config.acceptor_count, &ctx));
        *self.acceptors.lock() = Some(group);
        tracing::info!(
            endpoint = %self.name,
            acceptors = self.config.acceptor_count,
            max_connections = self.max_connections.load(Ordering::Relaxed),
            "endpoint started"
        );
        Ok(())
    }

    /// Stop accepting new connections without tearing anything down.
    /// No-op unless running and not already paused.
    pub async fn pause(&self) {
        if self.flags.is_running() && !self.flags.is_paused() {
            self.flags.set_paused(true);
            self.unlock_accept().await;
            self.handler.pause();
            tracing::info!(endpoint = %self.name, "endpoint paused");
        }
    }

    /// Accept new connections again. No-op unless running.
    pub fn resume(&self) {
        if self.flags.is_running() {
            self.flags.set_paused(false);
            tracing::info!(endpoint = %self.name, "endpoint resumed");
        }
    }

    /// Drain acceptors, shut down an internally owned dispatcher, and
    /// unbind when the bind happened on start.
    pub async fn stop(&self) -> Result<(), EndpointError> {
        self.flags.set_running(false);
        self.stop_signal.lock().trigger();
        self.unlock_accept().await;

        if let Some(group) = self.acceptor_group() {
            group.wait_not_running(ACCEPTOR_WAIT).await;
            group.shut_down(ACCEPTOR_WAIT).await;
        }
        *self.acceptors.lock() = None;

        // The gate dies with this run; a fresh one is built on restart so
        // stale permits can never leak into it.
        if let Some(gate) = self.gate.swap(None) {
            gate.release_all();
        }

        if self.internal_dispatcher.load(Ordering::Acquire) {
            let dispatcher = self.dispatcher.lock().take();
            if let Some(dispatcher) = dispatcher {
                dispatcher.shutdown().await;
            }
        }
        self.handler.recycle();

        let bound_on_start = *self.bind_state.lock() == BindState::BoundOnStart;
        if bound_on_start {
            self.unbind().await?;
            *self.bind_state.lock() = BindState::Unbound;
        }
        tracing::info!(endpoint = %self.name, "endpoint stopped");
        Ok(())
    }

    /// Undo an init-time bind.
    pub async fn destroy(&self) -> Result<(), EndpointError> {
        let bound_on_init = *self.bind_state.lock() == BindState::BoundOnInit;
        if bound_on_init {
            self.unbind().await?;
            *self.bind_state.lock() = BindState::Unbound;
        }
        Ok(())
    }

    async fn bind(&self) -> Result<(), EndpointError> {
        let addr = self
            .transport
            .bind(&self.config)
            .await
            .map_err(EndpointError::Bind)?;
        // Build the identity for every registered TLS host up front, so a
        // broken configuration fails the bind rather than a handshake.
        for entry in self.tls_registry.entries() {
            if entry.context().is_none() {
                let context = self.tls_builder.build(entry.config()).map_err(|source| {
                    TlsRegistryError::ContextBuild {
                        host: entry.config().host_name.clone(),
                        source,
                    }
                })?;
                entry.set_context(context);
            }
        }
        tracing::info!(endpoint = %self.name, address = %addr, "endpoint bound");
        Ok(())
    }

    async fn unbind(&self) -> Result<(), EndpointError> {
        self.transport.unbind().await.map_err(EndpointError::Unbind)?;
        self.tls_registry.clear_contexts();
        tracing::info!(endpoint = %self.name, "endpoint unbound");
        Ok(())
    }

    // ------------------------------------------------------------- admission

    fn initialize_admission_gate(&self) {
        let max = self.max_connections.load(Ordering::Relaxed);
        if max < 0 {
            self.gate.store(None);
        } else if self.gate.load().is_none() {
            self.gate.store(Some(AdmissionGate::new(max as u64)));
        }
    }

    /// Adjust the admission limit at runtime. -1 removes the limit and
    /// wakes every parked acceptor.
    pub fn set_max_connections(&self, max: i64) {
        self.max_connections.store(max, Ordering::Relaxed);
        match self.gate.load_full() {
            Some(gate) => {
                if max < 0 {
                    self.gate.store(None);
                    gate.release_all();
                } else {
                    gate.set_limit(max);
                }
            }
            None => {
                if max > 0 {
                    self.initialize_admission_gate();
                }
            }
        }
    }

    pub fn max_connections(&self) -> i64 {
        self.max_connections.load(Ordering::Relaxed)
    }

    /// Live count of admitted connections, or -1 when admission is
    /// unlimited.
    pub fn connection_count(&self) -> i64 {
        self.gate.load_full().map_or(-1, |gate| gate.count())
    }

    // ----------------------------------------------------------------- TLS

    /// Register a TLS host configuration. On an already-bound endpoint the
    /// identity is built eagerly; a build failure rejects the call without
    /// touching the registry.
    pub fn add_tls_host_config(&self, config: TlsHostConfig) -> Result<(), TlsRegistryError> {
        if config.host_name.is_empty() {
            return Err(TlsRegistryError::EmptyHostName);
        }
        let bound = *self.bind_state.lock() != BindState::Unbound;
        let context = if bound {
            Some(
                self.tls_builder
                    .build(&config)
                    .map_err(|source| TlsRegistryError::ContextBuild {
                        host: config.host_name.clone(),
                        source,
                    })?,
            )
        } else {
            None
        };
        self.tls_registry.add(config, context)
    }

    /// Register every TLS host carried by the endpoint configuration.
    pub fn register_configured_tls_hosts(&self) -> Result<(), TlsRegistryError> {
        for host in &self.config.tls_hosts {
            self.add_tls_host_config(host.clone())?;
        }
        Ok(())
    }

    /// Pick the TLS identity for a client-supplied SNI host name.
    pub fn resolve_tls_host(&self, sni_host_name: Option<&str>) -> Arc<TlsHostEntry> {
        self.tls_registry.resolve(sni_host_name)
    }

    pub fn set_default_tls_host_name(&self, name: impl Into<String>) {
        self.tls_registry.set_default_host_name(name);
    }

    pub fn tls_registry(&self) -> &Arc<TlsConfigRegistry> {
        &self.tls_registry
    }

    // ------------------------------------------------------------- workers

    pub fn set_max_workers(&self, max: usize) {
        if let Some(dispatcher) = self.dispatcher.lock().as_ref() {
            dispatcher.set_max_workers(max);
        }
    }

    pub fn set_core_workers(&self, core: usize) {
        if let Some(dispatcher) = self.dispatcher.lock().as_ref() {
            dispatcher.set_core_workers(core);
        }
    }

    pub fn worker_count(&self) -> Option<usize> {
        self.dispatcher
            .lock()
            .as_ref()
            .map(|dispatcher| dispatcher.worker_count())
    }

    pub fn busy_workers(&self) -> Option<usize> {
        self.dispatcher
            .lock()
            .as_ref()
            .map(|dispatcher| dispatcher.busy_workers())
    }

    // ----------------------------------------------------------- inspection

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Protocol names offered for negotiation (e.g. ALPN identifiers),
    /// passed through to whatever performs the handshake.
    pub fn negotiable_protocols(&self) -> &[String] {
        &self.config.negotiable_protocols
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn bind_state(&self) -> BindState {
        *self.bind_state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.flags.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.flags.is_paused()
    }

    pub fn acceptor_states(&self) -> Vec<AcceptorState> {
        self.acceptor_group()
            .map(|group| group.states())
            .unwrap_or_default()
    }

    fn acceptor_group(&self) -> Option<Arc<AcceptorGroup>> {
        self.acceptors.lock().clone()
    }

    // -------------------------------------------------------- unlock accept

    /// Break a blocked accept call with a throwaway loopback connection.
    ///
    /// Best effort: a failure to connect is logged and ignored, since the
    /// acceptor will notice the paused/stopped flags on its own eventually.
    async fn unlock_accept(&self) {
        let Some(group) = self.acceptor_group() else {
            return;
        };
        if !group.any_running() {
            return;
        }
        let Some(local_addr) = self.transport.local_addr() else {
            return;
        };
        let connect_addr = unlock_target(local_addr);
        let connect_timeout =
            Duration::from_millis(self.config.socket.unlock_timeout_ms.max(2_000));

        let result: io::Result<()> = async {
            let mut stream =
                tokio::time::timeout(connect_timeout, TcpStream::connect(connect_addr))
                    .await
                    .map_err(|_| {
                        io::Error::new(io::ErrorKind::TimedOut, "unlock connect timed out")
                    })??;
            if self.transport.defer_accept() {
                // Deferred-accept filters only release the connection once
                // data arrives; push a request line through and let the
                // acceptor discard it.
                stream.write_all(UNLOCK_WAKEUP_REQUEST).await?;
                stream.flush().await?;
            }
            Ok(())
        }
        .await;
        match result {
            Ok(()) => tracing::debug!(endpoint = %self.name, address = %connect_addr, "accept unlocked"),
            Err(err) => {
                tracing::debug!(endpoint = %self.name, error = %err, "unlock connection failed")
            }
        }

        group.wait_not_running(ACCEPTOR_WAIT).await;
    }
}

/// A wildcard bind address is not connectable; aim the unlock connection at
/// the loopback of the same family instead.
fn unlock_target(local_addr: SocketAddr) -> SocketAddr {
    if local_addr.ip().is_unspecified() {
        let loopback: IpAddr = match local_addr {
            SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
            SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
        };
        SocketAddr::new(loopback, local_addr.port())
    } else {
        local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::{Connection, SocketEvent, SocketState};
    use crate::net::transport::AcceptError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;
    use tokio::sync::Mutex as AsyncMutex;

    /// Scripted transport: connections are injected through a channel and
    /// bind/unbind calls are counted.
    struct ScriptedTransport {
        binds: AtomicUsize,
        unbinds: AtomicUsize,
        inject: mpsc::UnboundedSender<u32>,
        pending: AsyncMutex<mpsc::UnboundedReceiver<u32>>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            let (inject, pending) = mpsc::unbounded_channel();
            Self {
                binds: AtomicUsize::new(0),
                unbinds: AtomicUsize::new(0),
                inject,
                pending: AsyncMutex::new(pending),
            }
        }

        fn inject_connection(&self, value: u32) {
            self.inject.send(value).expect("inject");
        }

        fn bind_count(&self) -> usize {
            self.binds.load(Ordering::SeqCst)
        }

        fn unbind_count(&self) -> usize {
            self.unbinds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        type Conn = u32;

        async fn bind(&self, _config: &EndpointConfig) -> io::Result<SocketAddr> {
            self.binds.fetch_add(1, Ordering::SeqCst);
            Ok("127.0.0.1:0".parse().expect("addr"))
        }

        async fn unbind(&self) -> io::Result<()> {
            self.unbinds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn accept_one(&self) -> Result<u32, AcceptError> {
            match self.pending.lock().await.recv().await {
                Some(value) => Ok(value),
                None => Err(AcceptError::Fatal(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "scripted listener closed",
                ))),
            }
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            // No real socket: the unlock path skips its loopback connection.
            None
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        processed: AtomicUsize,
        paused: AtomicUsize,
        recycled: AtomicUsize,
    }

    #[async_trait]
    impl ProtocolHandler<u32> for RecordingHandler {
        async fn process(&self, _conn: &Arc<Connection<u32>>, _event: SocketEvent) -> SocketState {
            self.processed.fetch_add(1, Ordering::SeqCst);
            SocketState::Closed
        }

        fn open_connections(&self) -> usize {
            0
        }

        async fn release(&self, _conn: &Arc<Connection<u32>>) {}

        fn pause(&self) {
            self.paused.fetch_add(1, Ordering::SeqCst);
        }

        fn recycle(&self) {
            self.recycled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn endpoint_with(
        config: EndpointConfig,
    ) -> (Endpoint<ScriptedTransport>, Arc<RecordingHandler>) {
        let handler = Arc::new(RecordingHandler::default());
        let endpoint = Endpoint::new(config, ScriptedTransport::new(), handler.clone());
        (endpoint, handler)
    }

    fn quick_config(bind_on_init: bool) -> EndpointConfig {
        EndpointConfig {
            bind_on_init,
            ..EndpointConfig::default()
        }
    }

    async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn init_binds_and_destroy_unbinds_exactly_once() {
        let (endpoint, _) = endpoint_with(quick_config(true));
        endpoint.init().await.expect("init");
        assert_eq!(endpoint.bind_state(), BindState::BoundOnInit);
        assert_eq!(endpoint.transport().bind_count(), 1);

        endpoint.destroy().await.expect("destroy");
        assert_eq!(endpoint.bind_state(), BindState::Unbound);
        assert_eq!(endpoint.transport().unbind_count(), 1);

        // A second destroy must not unbind again.
        endpoint.destroy().await.expect("destroy again");
        assert_eq!(endpoint.transport().unbind_count(), 1);
    }

    #[tokio::test]
    async fn start_binds_lazily_and_stop_unbinds() {
        let (endpoint, _) = endpoint_with(quick_config(false));
        endpoint.init().await.expect("init");
        assert_eq!(endpoint.bind_state(), BindState::Unbound);
        assert_eq!(endpoint.transport().bind_count(), 0);

        endpoint.start().await.expect("start");
        assert_eq!(endpoint.bind_state(), BindState::BoundOnStart);
        assert_eq!(endpoint.transport().bind_count(), 1);
        assert!(endpoint.is_running());

        endpoint.stop().await.expect("stop");
        assert_eq!(endpoint.bind_state(), BindState::Unbound);
        assert_eq!(endpoint.transport().unbind_count(), 1);
        assert!(!endpoint.is_running());

        // Destroy after a start-time bind has nothing left to unbind.
        endpoint.destroy().await.expect("destroy");
        assert_eq!(endpoint.transport().unbind_count(), 1);
    }

    #[tokio::test]
    async fn init_time_bind_survives_stop_until_destroy() {
        let (endpoint, _) = endpoint_with(quick_config(true));
        endpoint.init().await.expect("init");
        endpoint.start().await.expect("start");
        // Already bound: start must not bind again.
        assert_eq!(endpoint.transport().bind_count(), 1);

        endpoint.stop().await.expect("stop");
        assert_eq!(endpoint.bind_state(), BindState::BoundOnInit);
        assert_eq!(endpoint.transport().unbind_count(), 0);

        endpoint.destroy().await.expect("destroy");
        assert_eq!(endpoint.bind_state(), BindState::Unbound);
        assert_eq!(endpoint.transport().unbind_count(), 1);
    }

    #[tokio::test]
    async fn pause_is_a_no_op_when_not_running() {
        let (endpoint, handler) = endpoint_with(quick_config(true));
        endpoint.pause().await;
        assert!(!endpoint.is_paused());
        assert_eq!(handler.paused.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pause_is_idempotent_while_running() {
        let (endpoint, handler) = endpoint_with(quick_config(true));
        endpoint.init().await.expect("init");
        endpoint.start().await.expect("start");

        endpoint.pause().await;
        assert!(endpoint.is_paused());
        assert_eq!(handler.paused.load(Ordering::SeqCst), 1);

        // Repeat pauses change nothing and do not re-notify the handler.
        endpoint.pause().await;
        assert_eq!(handler.paused.load(Ordering::SeqCst), 1);

        endpoint.resume();
        assert!(!endpoint.is_paused());

        endpoint.stop().await.expect("stop");
        endpoint.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn resume_is_a_no_op_when_not_running() {
        let (endpoint, _) = endpoint_with(quick_config(true));
        endpoint.resume();
        assert!(!endpoint.is_paused());
        assert!(!endpoint.is_running());
    }

    #[tokio::test]
    async fn accepted_connections_flow_to_the_handler() {
        let (endpoint, handler) = endpoint_with(quick_config(true));
        endpoint.init().await.expect("init");
        endpoint.start().await.expect("start");

        endpoint.transport().inject_connection(7);
        endpoint.transport().inject_connection(8);
        wait_until("handler to process both connections", || {
            handler.processed.load(Ordering::SeqCst) == 2
        })
        .await;

        // Both connections finished, so every admission slot is free again.
        wait_until("admission count to drain", || {
            endpoint.connection_count() == 0
        })
        .await;

        endpoint.stop().await.expect("stop");
        endpoint.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn stop_ends_blocked_acceptors_and_recycles_handler() {
        let (endpoint, handler) = endpoint_with(quick_config(true));
        endpoint.init().await.expect("init");
        endpoint.start().await.expect("start");
        wait_until("acceptor to start", || {
            endpoint
                .acceptor_states()
                .iter()
                .any(|state| *state == AcceptorState::Running)
        })
        .await;

        endpoint.stop().await.expect("stop");
        assert!(endpoint.acceptor_states().is_empty());
        assert_eq!(handler.recycled.load(Ordering::SeqCst), 1);
        assert_eq!(endpoint.connection_count(), -1);

        endpoint.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn max_connections_updates_flow_into_the_gate() {
        let (endpoint, _) = endpoint_with(quick_config(true));
        endpoint.init().await.expect("init");
        endpoint.start().await.expect("start");
        assert_eq!(endpoint.connection_count(), 0);

        endpoint.set_max_connections(-1);
        assert_eq!(endpoint.connection_count(), -1);

        endpoint.set_max_connections(5);
        assert_eq!(endpoint.connection_count(), 0);
        assert_eq!(endpoint.max_connections(), 5);

        endpoint.stop().await.expect("stop");
        endpoint.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn unlimited_endpoint_admits_without_counting() {
        let config = EndpointConfig {
            max_connections: -1,
            ..quick_config(true)
        };
        let (endpoint, handler) = endpoint_with(config);
        endpoint.init().await.expect("init");
        endpoint.start().await.expect("start");
        assert_eq!(endpoint.connection_count(), -1);

        endpoint.transport().inject_connection(1);
        wait_until("handler to process the connection", || {
            handler.processed.load(Ordering::SeqCst) == 1
        })
        .await;
        assert_eq!(endpoint.connection_count(), -1);

        endpoint.stop().await.expect("stop");
        endpoint.destroy().await.expect("destroy");
    }
}
