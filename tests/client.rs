//! Capture client against a live relay

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use camstream::client::{
    CaptureBackend, ClientConfig, DeviceInfo, FrameSource, ReaderSource, WsConnector,
};
use camstream::{CaptureService, LinkEvent, RelayServer, ServerConfig, SessionEnd, StreamConfig};

const WAIT: Duration = Duration::from_secs(10);

/// Serves a fixed byte buffer as the camera
struct BufferBackend {
    data: Vec<u8>,
    chunk_size: usize,
}

#[async_trait]
impl CaptureBackend for BufferBackend {
    fn list_devices(&self) -> camstream::Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            id: "buffer".into(),
            label: "Buffer camera".into(),
            kind: "videoinput".into(),
        }])
    }

    async fn open(&self, _config: &StreamConfig) -> camstream::Result<Box<dyn FrameSource>> {
        Ok(Box::new(ReaderSource::new(
            "buffer",
            Cursor::new(self.data.clone()),
            self.chunk_size,
        )))
    }
}

async fn start_relay(
    listener: TcpListener,
    output_dir: &std::path::Path,
) -> (Arc<RelayServer>, oneshot::Sender<()>) {
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(RelayServer::new(
        ServerConfig::with_addr(addr).output_dir(output_dir),
    ));
    let (stop, stopped) = oneshot::channel::<()>();

    tokio::spawn({
        let server = Arc::clone(&server);
        async move {
            server
                .serve(listener, async move {
                    let _ = stopped.await;
                })
                .await
        }
    });

    (server, stop)
}

async fn wait_for_end(events: &mut mpsc::Receiver<LinkEvent>) -> (u32, SessionEnd) {
    tokio::time::timeout(WAIT, async {
        let mut dial_failures = 0;
        while let Some(event) = events.recv().await {
            match event {
                LinkEvent::DialFailed { .. } => dial_failures += 1,
                LinkEvent::Terminated(end) => return (dial_failures, end),
                _ => {}
            }
        }
        panic!("event channel closed without termination");
    })
    .await
    .expect("session did not end in time")
}

async fn wait_for_idle(server: &RelayServer) {
    tokio::time::timeout(WAIT, async {
        while server.has_producer() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("producer still attached");
}

fn sample_stream() -> Vec<u8> {
    (0..64 * 1024).map(|i| (i % 251) as u8).collect()
}

fn service(data: Vec<u8>, config: ClientConfig) -> CaptureService {
    CaptureService::new(
        Arc::new(BufferBackend {
            data,
            chunk_size: 4096,
        }),
        Arc::new(WsConnector::new(config.connect_timeout)),
        config,
    )
}

fn recording(dir: &std::path::Path) -> Vec<u8> {
    let files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1, "expected exactly one recording");
    std::fs::read(&files[0]).unwrap()
}

#[tokio::test]
async fn test_stream_is_recorded() {
    let output_dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (server, stop) = start_relay(listener, output_dir.path()).await;

    let data = sample_stream();
    let service = service(data.clone(), ClientConfig::default());

    let mut events = service
        .start_capture(StreamConfig::for_address(&addr.to_string()))
        .await
        .unwrap();

    let (failures, end) = wait_for_end(&mut events).await;
    assert_eq!(failures, 0);
    assert_eq!(end, SessionEnd::SourceExhausted);

    wait_for_idle(&server).await;
    assert_eq!(recording(output_dir.path()), data);

    service.stop_capture().await.unwrap();
    let _ = stop.send(());
}

#[tokio::test]
async fn test_client_waits_for_relay() {
    let output_dir = tempfile::tempdir().unwrap();

    // Reserve a port, then leave it closed until the relay starts
    let addr: SocketAddr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    let data = sample_stream();
    let config = ClientConfig::default()
        .retry_interval(Duration::from_millis(100))
        .connect_timeout(Duration::from_secs(1));
    let service = service(data.clone(), config);

    let mut events = service
        .start_capture(StreamConfig::for_address(&addr.to_string()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(350)).await;
    let listener = TcpListener::bind(addr).await.unwrap();
    let (server, stop) = start_relay(listener, output_dir.path()).await;

    let (failures, end) = wait_for_end(&mut events).await;
    assert!(failures >= 1, "client never had to retry");
    assert_eq!(end, SessionEnd::SourceExhausted);

    wait_for_idle(&server).await;
    assert_eq!(recording(output_dir.path()), data);

    service.stop_capture().await.unwrap();
    let _ = stop.send(());
}

#[tokio::test]
async fn test_stop_during_dial_retries() {
    let addr: SocketAddr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    let service = service(sample_stream(), ClientConfig::default());
    let mut events = service
        .start_capture(StreamConfig::for_address(&addr.to_string()))
        .await
        .unwrap();

    // Wait for the first failed dial, then stop during the retry pause
    tokio::time::timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            if matches!(event, LinkEvent::DialFailed { .. }) {
                return;
            }
        }
    })
    .await
    .unwrap();

    let started = tokio::time::Instant::now();
    service.stop_capture().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!service.is_active().await);
}
