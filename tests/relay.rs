//! End-to-end relay tests over real sockets

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use camstream::{RelayServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct TestRelay {
    addr: SocketAddr,
    server: Arc<RelayServer>,
    output_dir: tempfile::TempDir,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<camstream::Result<()>>,
}

impl TestRelay {
    async fn start() -> Self {
        Self::start_with(|dir| dir.to_path_buf()).await
    }

    /// Start with recordings going to `output(tempdir)`
    async fn start_with(output: impl FnOnce(&Path) -> PathBuf) -> Self {
        let output_dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = ServerConfig::with_addr(addr).output_dir(output(output_dir.path()));
        let server = Arc::new(RelayServer::new(config));
        let (stop, stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                server
                    .serve(listener, async move {
                        let _ = stopped.await;
                    })
                    .await
            }
        });

        Self {
            addr,
            server,
            output_dir,
            stop: Some(stop),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    async fn connect(&self, path: &str) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(self.url(path)).await.unwrap();
        ws
    }

    async fn wait_for_viewers(&self, count: usize) {
        let registry = self.server.registry();
        wait_until(move || async move { registry.len().await == count }).await;
    }

    async fn wait_for_producer(&self, live: bool) {
        let server = &self.server;
        wait_until(move || async move { server.has_producer() == live }).await;
    }

    fn recordings(&self) -> Vec<PathBuf> {
        recordings_in(self.output_dir.path())
    }

    async fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(WAIT, &mut self.handle)
            .await
            .expect("relay did not stop")
            .unwrap()
            .unwrap();
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn recordings_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

/// Next binary message, skipping control frames
async fn next_binary(ws: &mut Client) -> Vec<u8> {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Binary(data))) => return data,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("expected a binary frame, got {:?}", other),
            }
        }
    })
    .await
    .expect("no frame received in time")
}

/// Wait until the relay closes the connection
async fn expect_closed(ws: &mut Client) {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(Message::Binary(data))) => panic!("unexpected frame {:?}", data),
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("connection was not closed");
}

/// Plain HTTP/1.1 exchange; returns the raw response
async fn http(addr: SocketAddr, method: &str, target: &str) -> String {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        method, target
    );
    socket.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(WAIT, socket.read_to_string(&mut response))
        .await
        .expect("no response in time")
        .unwrap();
    response
}

async fn send(ws: &mut Client, payload: &[u8]) {
    ws.send(Message::Binary(payload.to_vec())).await.unwrap();
}

#[tokio::test]
async fn test_late_viewer_receives_only_later_frames() {
    let mut relay = TestRelay::start().await;

    let mut viewer1 = relay.connect("/view").await;
    relay.wait_for_viewers(1).await;

    let mut producer = relay.connect("/ws").await;
    relay.wait_for_producer(true).await;

    send(&mut producer, b"A").await;
    send(&mut producer, b"B").await;
    assert_eq!(next_binary(&mut viewer1).await, b"A");
    assert_eq!(next_binary(&mut viewer1).await, b"B");

    let mut viewer2 = relay.connect("/view").await;
    relay.wait_for_viewers(2).await;

    send(&mut producer, b"C").await;
    assert_eq!(next_binary(&mut viewer1).await, b"C");
    assert_eq!(next_binary(&mut viewer2).await, b"C");

    producer.close(None).await.unwrap();
    relay.wait_for_producer(false).await;

    let files = relay.recordings();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"ABC");

    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("webcam_"), "unexpected name {}", name);
    assert!(name.ends_with(".h264"), "unexpected name {}", name);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_producer_disconnect_closes_viewers() {
    let mut relay = TestRelay::start().await;

    let mut viewer = relay.connect("/view").await;
    relay.wait_for_viewers(1).await;

    let mut producer = relay.connect("/ws").await;
    send(&mut producer, b"frame").await;
    assert_eq!(next_binary(&mut viewer).await, b"frame");

    drop(producer);

    expect_closed(&mut viewer).await;
    relay.wait_for_viewers(0).await;
    relay.wait_for_producer(false).await;

    relay.shutdown().await;
}

#[tokio::test]
async fn test_second_producer_rejected() {
    let mut relay = TestRelay::start().await;

    let mut producer = relay.connect("/ws").await;
    relay.wait_for_producer(true).await;

    let second = tokio_tungstenite::connect_async(relay.url("/ws")).await;
    match second {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::CONFLICT)
        }
        other => panic!("expected HTTP 409, got {:?}", other.map(|_| ())),
    }

    // The live session is unaffected
    let mut viewer = relay.connect("/view").await;
    relay.wait_for_viewers(1).await;
    send(&mut producer, b"still live").await;
    assert_eq!(next_binary(&mut viewer).await, b"still live");
    assert_eq!(relay.recordings().len(), 1);

    producer.close(None).await.unwrap();
    relay.wait_for_producer(false).await;

    // The slot is free again
    let mut next = relay.connect("/ws").await;
    relay.wait_for_producer(true).await;
    next.close(None).await.unwrap();
    relay.wait_for_producer(false).await;

    assert_eq!(relay.recordings().len(), 2);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_unknown_path_rejected() {
    let mut relay = TestRelay::start().await;

    let result = tokio_tungstenite::connect_async(relay.url("/nope")).await;
    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::NOT_FOUND)
        }
        other => panic!("expected HTTP 404, got {:?}", other.map(|_| ())),
    }

    relay.shutdown().await;
}

#[tokio::test]
async fn test_status_page() {
    let mut relay = TestRelay::start().await;

    let response = http(relay.addr, "GET", "/").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("text/html"));
    assert!(response.contains("Relay is running"));
    assert!(response.contains("Viewers: 0"));

    // Query strings do not affect routing
    let response = http(relay.addr, "GET", "/?refresh=1").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("Relay is running"));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_status_page_methods() {
    let mut relay = TestRelay::start().await;

    let response = http(relay.addr, "HEAD", "/").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    let (_, body) = response.split_once("\r\n\r\n").unwrap();
    assert!(body.is_empty(), "HEAD returned a body: {:?}", body);

    let response = http(relay.addr, "DELETE", "/").await;
    assert!(
        response.starts_with("HTTP/1.1 405"),
        "unexpected response {:?}",
        response
    );

    let response = http(relay.addr, "GET", "/missing").await;
    assert!(response.starts_with("HTTP/1.1 404"));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_survives_recording_failure() {
    // A regular file where the output directory should be
    let mut relay = TestRelay::start_with(|dir| {
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        blocker.join("rec")
    })
    .await;

    let mut viewer = relay.connect("/view").await;
    relay.wait_for_viewers(1).await;

    let mut producer = relay.connect("/ws").await;
    relay.wait_for_producer(true).await;

    send(&mut producer, b"A").await;
    assert_eq!(next_binary(&mut viewer).await, b"A");
    send(&mut producer, b"B").await;
    assert_eq!(next_binary(&mut viewer).await, b"B");

    producer.close(None).await.unwrap();
    expect_closed(&mut viewer).await;
    relay.wait_for_producer(false).await;

    // Nothing was written and the slot is free for the next producer
    let output = relay.server.config().output_dir.clone();
    assert!(!output.exists());

    let mut next = relay.connect("/ws").await;
    relay.wait_for_producer(true).await;
    next.close(None).await.unwrap();
    relay.wait_for_producer(false).await;

    relay.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let mut relay = TestRelay::start().await;

    let mut viewer = relay.connect("/view").await;
    relay.wait_for_viewers(1).await;

    let mut producer = relay.connect("/ws").await;
    send(&mut producer, b"last").await;
    assert_eq!(next_binary(&mut viewer).await, b"last");

    relay.shutdown().await;

    expect_closed(&mut viewer).await;

    // The recording was flushed on shutdown
    let files = relay.recordings();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"last");
}
