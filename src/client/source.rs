//! Frame sources
//!
//! The capture layer is external to the relay: all the pipeline needs is an
//! ordered sequence of opaque frames and a way to close it. `DeviceBackend`
//! is the bundled implementation, reading an encoder's output from a device
//! node, a named pipe, a file, or stdin.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::config::StreamConfig;
use crate::error::{Error, Result};
use crate::registry::Frame;

/// Default read size, large enough for one encoded frame
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Device id selecting standard input
pub const STDIN_DEVICE: &str = "-";

/// Ordered producer of opaque frames
#[async_trait]
pub trait FrameSource: Send {
    /// Source identifier for logs
    fn id(&self) -> &str;

    /// Read the next frame
    ///
    /// `Ok(None)` means the source is exhausted.
    async fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the source; closing twice is not an error
    async fn close(&mut self) -> Result<()>;
}

/// A capture device as reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Value to pass as `StreamConfig::device_id`
    pub id: String,
    /// Human-readable name
    pub label: String,
    /// Device kind, e.g. `videoinput`
    pub kind: String,
}

/// Enumerates and opens capture devices
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Devices available for capture
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Open a frame source for `config`
    async fn open(&self, config: &StreamConfig) -> Result<Box<dyn FrameSource>>;
}

/// Frame source over any async byte reader
///
/// Every read of up to `chunk_size` bytes becomes one frame. Each payload is
/// copied out of the read buffer, so frames never alias it.
pub struct ReaderSource<R> {
    id: String,
    reader: Option<R>,
    buf: Vec<u8>,
    sequence: u64,
}

impl<R> ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(id: impl Into<String>, reader: R, chunk_size: usize) -> Self {
        Self {
            id: id.into(),
            reader: Some(reader),
            buf: vec![0u8; chunk_size.max(1)],
            sequence: 0,
        }
    }
}

#[async_trait]
impl<R> FrameSource for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::Device(format!("{} is closed", self.id)))?;

        let n = reader
            .read(&mut self.buf)
            .await
            .map_err(|e| Error::Device(format!("read from {}: {}", self.id, e)))?;

        if n == 0 {
            return Ok(None);
        }

        self.sequence += 1;
        Ok(Some(Frame::new(
            self.sequence,
            Bytes::copy_from_slice(&self.buf[..n]),
        )))
    }

    async fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            tracing::debug!(source = %self.id, frames = self.sequence, "Frame source closed");
        }
        Ok(())
    }
}

/// Backend reading encoded video from device nodes, files, pipes or stdin
#[derive(Debug, Clone)]
pub struct DeviceBackend {
    device_dir: PathBuf,
    chunk_size: usize,
}

impl Default for DeviceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend {
    /// Backend scanning `/dev` with the default chunk size
    pub fn new() -> Self {
        Self {
            device_dir: PathBuf::from("/dev"),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Scan another directory for `video*` nodes
    pub fn device_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.device_dir = dir.into();
        self
    }

    /// Set the maximum frame size
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    fn scan(dir: &Path) -> std::io::Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("video") {
                devices.push(DeviceInfo {
                    id: entry.path().display().to_string(),
                    label: name,
                    kind: "videoinput".to_string(),
                });
            }
        }

        devices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(devices)
    }
}

#[async_trait]
impl CaptureBackend for DeviceBackend {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        Self::scan(&self.device_dir).map_err(|e| {
            Error::Device(format!("cannot list {}: {}", self.device_dir.display(), e))
        })
    }

    async fn open(&self, config: &StreamConfig) -> Result<Box<dyn FrameSource>> {
        tracing::info!(
            width = config.width,
            height = config.height,
            fps = config.frame_rate,
            bitrate = config.bit_rate,
            codec = %config.codec_name,
            "Opening capture source"
        );

        let device = config.device_id.as_str();
        if device.is_empty() || device == STDIN_DEVICE {
            tracing::info!(source = "stdin", "Using capture source");
            return Ok(Box::new(ReaderSource::new(
                "stdin",
                tokio::io::stdin(),
                self.chunk_size,
            )));
        }

        let file = tokio::fs::File::open(device)
            .await
            .map_err(|e| Error::Device(format!("cannot open {}: {}", device, e)))?;

        tracing::info!(source = %device, "Using capture source");
        Ok(Box::new(ReaderSource::new(device, file, self.chunk_size)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[tokio::test]
    async fn test_reader_source_chunks() {
        let data: Vec<u8> = (0u8..10).collect();
        let mut source = ReaderSource::new("test", Cursor::new(data), 4);

        let first = source.read_frame().await.unwrap().unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(&first.payload[..], &[0, 1, 2, 3]);

        let second = source.read_frame().await.unwrap().unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.byte_length(), 4);

        let third = source.read_frame().await.unwrap().unwrap();
        assert_eq!(&third.payload[..], &[8, 9]);

        assert!(source.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_source_close() {
        let mut source = ReaderSource::new("test", Cursor::new(vec![1u8, 2, 3]), 16);

        source.close().await.unwrap();
        source.close().await.unwrap();

        assert!(matches!(source.read_frame().await, Err(Error::Device(_))));
    }

    #[test]
    fn test_list_devices() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("video1"), b"").unwrap();
        std::fs::write(dir.path().join("video0"), b"").unwrap();
        std::fs::write(dir.path().join("null"), b"").unwrap();

        let backend = DeviceBackend::new().device_dir(dir.path());
        let devices = backend.list_devices().unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].label, "video0");
        assert_eq!(devices[1].label, "video1");
        assert_eq!(devices[0].kind, "videoinput");
    }

    #[test]
    fn test_list_devices_missing_dir() {
        let backend = DeviceBackend::new().device_dir("/nonexistent/camstream");
        assert!(matches!(backend.list_devices(), Err(Error::Device(_))));
    }

    #[tokio::test]
    async fn test_open_file_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.h264");
        std::fs::write(&path, b"\x00\x00\x00\x01\x67").unwrap();

        let backend = DeviceBackend::new().chunk_size(64);
        let config = StreamConfig::default().device(path.display().to_string());
        let mut source = backend.open(&config).await.unwrap();

        let frame = source.read_frame().await.unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"\x00\x00\x00\x01\x67");
        assert!(source.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let backend = DeviceBackend::new();
        let config = StreamConfig::default().device("/nonexistent/video9");

        let result = backend.open(&config).await;
        assert!(matches!(result, Err(Error::Device(_))));
    }
}
