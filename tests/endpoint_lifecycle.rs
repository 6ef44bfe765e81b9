//! Lifecycle and admission tests over a real TCP transport.

use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use portico::{AcceptorState, Endpoint, TcpTransport, Transport};

mod common;

use common::{test_config, wait_for, RecordingHandler};

#[tokio::test]
async fn accepted_connections_reach_the_handler() {
    let handler = RecordingHandler::new();
    let endpoint = Endpoint::new(
        test_config("e2e"),
        TcpTransport::new(),
        handler.clone(),
    );

    endpoint.init().await.expect("init");
    endpoint.start().await.expect("start");
    let addr = endpoint
        .transport()
        .local_addr()
        .expect("bound transport has an address");

    let mut client = TcpStream::connect(addr).await.expect("connect");
    client.write_all(b"hello endpoint").await.expect("write");
    client.shutdown().await.expect("shutdown write");

    wait_for("the handler to process the connection", || {
        handler.processed_with_data() == 1
    })
    .await;
    wait_for("the admission slot to be returned", || {
        endpoint.connection_count() == 0
    })
    .await;

    endpoint.stop().await.expect("stop");
    assert!(
        TcpStream::connect(addr).await.is_err(),
        "a stopped endpoint must not accept connections"
    );
    endpoint.destroy().await.expect("destroy");
}

#[tokio::test]
async fn admission_limit_caps_concurrent_connections() {
    let handler = RecordingHandler::holding(Duration::from_millis(400));
    let mut config = test_config("limited");
    config.max_connections = 1;
    let endpoint = Endpoint::new(config, TcpTransport::new(), handler.clone());

    endpoint.start().await.expect("start");
    let addr = endpoint.transport().local_addr().expect("address");

    let mut first = TcpStream::connect(addr).await.expect("connect first");
    first.write_all(b"one").await.expect("write first");
    let mut second = TcpStream::connect(addr).await.expect("connect second");
    second.write_all(b"two").await.expect("write second");

    // Sample the live count while both connections work through the
    // endpoint; it must never exceed the limit.
    let mut highest = 0i64;
    let started = Instant::now();
    while handler.processed_with_data() < 2 {
        highest = highest.max(endpoint.connection_count());
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "both connections should eventually be processed"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(highest <= 1, "admission count exceeded the limit: {highest}");

    endpoint.stop().await.expect("stop");
}

#[tokio::test]
async fn paused_endpoint_defers_processing_until_resume() {
    let handler = RecordingHandler::new();
    let endpoint = Endpoint::new(
        test_config("pausable"),
        TcpTransport::new(),
        handler.clone(),
    );

    endpoint.start().await.expect("start");
    let addr = endpoint.transport().local_addr().expect("address");
    endpoint.pause().await;
    assert!(endpoint.is_paused());

    // The OS backlog still completes the handshake; the endpoint just
    // must not process anything while paused.
    let mut client = TcpStream::connect(addr).await.expect("connect while paused");
    client.write_all(b"patience").await.expect("write");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(handler.processed_with_data(), 0);

    endpoint.resume();
    wait_for("the deferred connection to be processed", || {
        handler.processed_with_data() == 1
    })
    .await;

    endpoint.stop().await.expect("stop");
}

#[tokio::test]
async fn stop_interrupts_a_blocked_accept() {
    let handler = RecordingHandler::new();
    let endpoint = Endpoint::new(
        test_config("stoppable"),
        TcpTransport::new(),
        handler.clone(),
    );

    endpoint.start().await.expect("start");
    wait_for("the acceptor to enter its loop", || {
        endpoint
            .acceptor_states()
            .iter()
            .any(|state| *state == AcceptorState::Running)
    })
    .await;

    // No client ever connects: the acceptor is parked inside accept.
    let started = Instant::now();
    endpoint.stop().await.expect("stop");
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "stop must not hang on a blocked accept"
    );
    assert!(!endpoint.is_running());
}

#[tokio::test]
async fn restart_after_stop_accepts_again() {
    let handler = RecordingHandler::new();
    let endpoint = Endpoint::new(
        test_config("restartable"),
        TcpTransport::new(),
        handler.clone(),
    );

    endpoint.start().await.expect("first start");
    endpoint.stop().await.expect("first stop");

    endpoint.start().await.expect("second start");
    let addr = endpoint.transport().local_addr().expect("address");
    let mut client = TcpStream::connect(addr).await.expect("connect");
    client.write_all(b"again").await.expect("write");
    client.shutdown().await.expect("shutdown write");

    wait_for("the restarted endpoint to process a connection", || {
        handler.processed_with_data() == 1
    })
    .await;
    endpoint.stop().await.expect("second stop");
}
