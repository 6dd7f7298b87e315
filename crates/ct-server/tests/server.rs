//! Listener and end-to-end tests over real TCP sockets

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ct_client::{BufferedConsole, ClientState, Interpreter};
use ct_core::auth::SecretKey;
use ct_core::config::ServerConfig;
use ct_core::CtError;
use ct_server::demo::DemoService;
use ct_server::{Listener, Service, Session};

/// Asks for one line and prints it back
struct EchoService;

#[async_trait]
impl Service for EchoService {
    async fn service(&self, session: &mut Session) -> Result<(), CtError> {
        let line = session.key_wait().await?;
        session.println(&format!("echo: {}", line)).await?;
        session.close().await
    }
}

async fn start(
    service: Arc<dyn Service>,
    max_connections: Option<usize>,
) -> (SocketAddr, CancellationToken, JoinHandle<anyhow::Result<()>>) {
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        max_connections,
        ..ServerConfig::default()
    };
    let listener = Listener::bind(config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(listener.serve(service, cancel.clone()));
    (addr, cancel, handle)
}

async fn expect_frame(stream: &mut TcpStream, frame: &[u8]) {
    let mut buf = vec![0u8; frame.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, frame);
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let (addr, cancel, handle) = start(Arc::new(EchoService), None).await;

    let mut clients = Vec::new();
    for i in 0..8 {
        clients.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            expect_frame(&mut stream, b"\x11KEY").await;
            stream
                .write_all(format!("client-{}", i).as_bytes())
                .await
                .unwrap();

            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
            (i, String::from_utf8(rest).unwrap())
        }));
    }

    for client in clients {
        let (i, output) = client.await.unwrap();
        assert_eq!(
            output,
            format!("\x11STXecho: client-{}\n\x11ETX\x11EDT", i)
        );
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancel_stops_server_and_open_sessions() {
    let (addr, cancel, handle) = start(Arc::new(EchoService), None).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    expect_frame(&mut stream, b"\x11KEY").await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    // The worker shut its socket down on the way out
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_busy_server_turns_away_extra_connections() {
    let (addr, cancel, handle) = start(Arc::new(EchoService), Some(1)).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    expect_frame(&mut first, b"\x11KEY").await;

    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut output = Vec::new();
    second.read_to_end(&mut output).await.unwrap();
    let output = String::from_utf8(output).unwrap();
    assert!(output.contains("Server busy"));
    assert!(output.ends_with("\x11EDT"));

    // The first session is unaffected
    first.write_all(b"still here").await.unwrap();
    let mut rest = Vec::new();
    first.read_to_end(&mut rest).await.unwrap();
    assert!(String::from_utf8(rest).unwrap().contains("echo: still here"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_demo_service_with_client() {
    let key = SecretKey::from_passphrase("open sesame");
    let service = DemoService::new("Welcome to the test", Some(key.public_key()));
    let (addr, cancel, handle) = start(Arc::new(service), None).await;

    let console = BufferedConsole::new()
        .with_lines(["alice", "echo hi there", "run ls -l", "whoami", "exit"])
        .with_secrets(["open sesame"]);
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut interpreter = Interpreter::new(stream, console);

    interpreter.run().await.unwrap();
    assert_eq!(interpreter.state(), ClientState::Close);

    let console = interpreter.into_console();
    let output = console.output();
    assert!(output.starts_with("Welcome to the test\nName: "));
    assert!(output.contains("Authenticated"));
    assert!(output.contains("Hello, alice"));
    assert!(output.contains("hi there\n"));
    assert!(output.contains("Command sent"));
    assert!(output.contains("alice\n"));
    assert!(output.ends_with("Bye\n"));
    assert_eq!(console.commands(), &["ls -l".to_string()]);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_demo_service_rejects_wrong_passphrase() {
    let key = SecretKey::from_passphrase("open sesame");
    let service = DemoService::new("Welcome", Some(key.public_key()));
    let (addr, cancel, handle) = start(Arc::new(service), None).await;

    let console = BufferedConsole::new()
        .with_lines(["mallory"])
        .with_secrets(["guess 1", "guess 2", "guess 3"]);
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut interpreter = Interpreter::new(stream, console);

    interpreter.run().await.unwrap();

    let console = interpreter.into_console();
    assert_eq!(console.output().matches("Authentication failed").count(), 3);
    assert!(console.output().contains("Too many failed attempts"));
    assert!(!console.output().contains("Hello"));
    assert!(console.commands().is_empty());

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_slot_frees_after_session_ends() {
    let (addr, cancel, handle) = start(Arc::new(EchoService), Some(1)).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    expect_frame(&mut first, b"\x11KEY").await;

    // Turned-away clients do not hold the slot
    for _ in 0..3 {
        let mut busy = TcpStream::connect(addr).await.unwrap();
        let mut output = Vec::new();
        busy.read_to_end(&mut output).await.unwrap();
        assert!(String::from_utf8(output).unwrap().contains("Server busy"));
    }

    first.write_all(b"done").await.unwrap();
    let mut rest = Vec::new();
    first.read_to_end(&mut rest).await.unwrap();
    assert!(String::from_utf8(rest).unwrap().ends_with("\x11EDT"));

    let mut next = TcpStream::connect(addr).await.unwrap();
    expect_frame(&mut next, b"\x11KEY").await;
    next.write_all(b"again").await.unwrap();
    let mut rest = Vec::new();
    next.read_to_end(&mut rest).await.unwrap();
    assert!(String::from_utf8(rest).unwrap().contains("echo: again"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
