//! Integration tests for the peer client.
//!
//! The first group runs the client against a bare tokio listener standing in
//! for the relay. The last group runs real clients through a real relay.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use chatmux_client::{ChatClient, ClientError};
use chatmux_core::{ClientConfig, PumpEnd, RelayConfig};
use chatmuxd::EventLoop;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Test timeout for async operations
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..Default::default()
    }
}

/// A client running on a task with an in-memory terminal.
struct TestPeer {
    terminal: DuplexStream,
    cancel: CancellationToken,
    task: JoinHandle<chatmux_client::Result<PumpEnd>>,
}

impl TestPeer {
    async fn start(addr: SocketAddr) -> Self {
        let client = timeout(TEST_TIMEOUT, ChatClient::connect(&config_for(addr)))
            .await
            .expect("connect timed out")
            .expect("connect");
        assert_eq!(client.peer_addr(), addr);

        let (terminal, local) = duplex(1024);
        let (input, output) = tokio::io::split(local);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { client.run(input, output, &token).await });

        Self {
            terminal,
            cancel,
            task,
        }
    }

    async fn type_line(&mut self, text: &[u8]) {
        self.terminal.write_all(text).await.unwrap();
    }

    async fn expect(&mut self, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        timeout(TEST_TIMEOUT, self.terminal.read_exact(&mut buf))
            .await
            .expect("read timed out")
            .unwrap();
        assert_eq!(buf, expected);
    }

    async fn finish(self) -> PumpEnd {
        timeout(TEST_TIMEOUT, self.task)
            .await
            .expect("client did not stop")
            .unwrap()
            .unwrap()
    }
}

// ============================================================================
// Against a Stand-in Relay
// ============================================================================

#[tokio::test]
async fn test_connect_refused_is_a_connect_error() {
    // Bind then drop to get a port with nothing listening.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let err = ChatClient::connect(&config_for(addr)).await.unwrap_err();
    match err {
        ClientError::Connect { host, port, .. } => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(port, addr.port());
        }
        other => panic!("expected connect error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unresolvable_host_is_a_connect_error() {
    let config = ClientConfig {
        host: "host.invalid".to_string(),
        port: 5055,
        ..Default::default()
    };
    let err = ChatClient::connect(&config).await.unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));
}

#[tokio::test]
async fn test_terminal_bytes_reach_relay_and_back() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut peer = TestPeer::start(addr).await;
    let (mut relay_side, _) = listener.accept().await.unwrap();

    peer.type_line(b"hello\n").await;
    let mut buf = [0u8; 6];
    relay_side.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello\n");

    relay_side.write_all(b"hi\n").await.unwrap();
    peer.expect(b"hi\n").await;

    drop(relay_side);
    assert_eq!(peer.finish().await, PumpEnd::RemoteClosed);
}

#[tokio::test]
async fn test_local_end_of_stream_half_closes_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = TestPeer::start(addr).await;
    let (mut relay_side, _) = listener.accept().await.unwrap();

    let TestPeer { terminal, task, .. } = peer;
    drop(terminal);

    let mut buf = [0u8; 8];
    let n = timeout(TEST_TIMEOUT, relay_side.read(&mut buf))
        .await
        .expect("relay side did not see end-of-stream")
        .unwrap();
    assert_eq!(n, 0);

    let end = timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
    assert_eq!(end, PumpEnd::LocalClosed);
}

#[tokio::test]
async fn test_cancel_hangs_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = TestPeer::start(addr).await;
    let (mut relay_side, _) = listener.accept().await.unwrap();

    peer.cancel.cancel();
    let mut buf = [0u8; 8];
    let n = timeout(TEST_TIMEOUT, relay_side.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(peer.finish().await, PumpEnd::Cancelled);
}

// ============================================================================
// Through a Real Relay
// ============================================================================

/// Starts a relay on its own thread; dropping the returned operator end stops it.
fn spawn_relay(max_clients: usize) -> (SocketAddr, UnixStream, std::thread::JoinHandle<()>) {
    let config = RelayConfig {
        bind: "127.0.0.1".to_string(),
        port: 0,
        max_clients,
        poll_interval_ms: 20,
        ..Default::default()
    };
    let (relay, front) = EventLoop::bind(&config).unwrap();
    let addr = relay.local_addr();
    let handle = std::thread::spawn(move || relay.run().unwrap());

    let operator = front.into_std();
    operator.set_read_timeout(Some(TEST_TIMEOUT)).unwrap();
    (addr, operator, handle)
}

/// Waits until the relay has registered `peer` by pinging through the
/// operator channel until a ping arrives.
async fn wait_until_registered(peer: &mut TestPeer, operator: &mut UnixStream) {
    loop {
        operator.write_all(b"ping;").unwrap();
        let mut buf = [0u8; 5];
        let read = timeout(Duration::from_millis(200), peer.terminal.read_exact(&mut buf)).await;
        if let Ok(result) = read {
            result.unwrap();
            assert_eq!(&buf, b"ping;");
            return;
        }
    }
}

/// Discards whatever the peer has been sent so far.
async fn drain(peer: &mut TestPeer) {
    let mut buf = [0u8; 256];
    while let Ok(result) = timeout(Duration::from_millis(100), peer.terminal.read(&mut buf)).await {
        if result.unwrap() == 0 {
            break;
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_peers_chat_through_relay() {
    let (addr, mut operator, relay) = spawn_relay(2);

    let mut a = TestPeer::start(addr).await;
    wait_until_registered(&mut a, &mut operator).await;
    let mut b = TestPeer::start(addr).await;
    wait_until_registered(&mut b, &mut operator).await;
    drain(&mut a).await;
    drain(&mut b).await;

    a.type_line(b"hello").await;
    b.expect(b"hello").await;

    let mut buf = [0u8; 5];
    operator.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");

    b.type_line(b"hi").await;
    a.expect(b"hi").await;

    drop(operator);
    relay.join().unwrap();

    assert_eq!(a.finish().await, PumpEnd::RemoteClosed);
    assert_eq!(b.finish().await, PumpEnd::RemoteClosed);
}
