//! Recording files
//!
//! Each ingest session appends the raw frame payloads, in receipt order, to
//! its own file named after the session start time. No container or framing
//! is added, so an H.264 producer yields a playable elementary stream.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Prefix of every recording file name
pub const FILE_PREFIX: &str = "webcam_";

/// Extension of every recording file name
pub const FILE_EXTENSION: &str = "h264";

/// Gives up after this many name collisions within one second
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Append-only sink for one ingest session
///
/// Only the ingest task writes, but the writer sits behind a mutex so
/// `close` from shutdown paths cannot interleave with a write.
pub struct RecordingFile {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    bytes_written: AtomicU64,
}

impl RecordingFile {
    /// Create a new recording in `dir` stamped with the current local time
    pub async fn create(dir: &Path) -> Result<Self> {
        Self::create_at(dir, Local::now()).await
    }

    /// Create a new recording in `dir` stamped with `started`
    ///
    /// The directory is created if needed. An existing file is never reused:
    /// on a name clash a `_N` suffix is added.
    pub async fn create_at(dir: &Path, started: DateTime<Local>) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            Error::Persistence(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let stem = file_stem(started);

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}.{}", stem, FILE_EXTENSION)
            } else {
                format!("{}_{}.{}", stem, attempt, FILE_EXTENSION)
            };
            let path = dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => {
                    tracing::info!(path = %path.display(), "Recording started");
                    return Ok(Self {
                        path,
                        writer: Mutex::new(Some(BufWriter::new(file))),
                        bytes_written: AtomicU64::new(0),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(Error::Persistence(format!(
                        "cannot create {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        Err(Error::Persistence(format!(
            "no free file name for {} in {}",
            stem,
            dir.display()
        )))
    }

    /// Path of the recording
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Append one payload
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| Error::Persistence(format!("{} is closed", self.path.display())))?;

        writer
            .write_all(data)
            .await
            .map_err(|e| Error::Persistence(format!("write to {}: {}", self.path.display(), e)))?;

        self.bytes_written.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Flush and close the file
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };

        tracing::info!(
            path = %self.path.display(),
            bytes = self.bytes_written(),
            "Recording closed"
        );

        writer
            .flush()
            .await
            .map_err(|e| Error::Persistence(format!("flush {}: {}", self.path.display(), e)))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| Error::Persistence(format!("sync {}: {}", self.path.display(), e)))
    }
}

/// File name without extension for a session started at `started`
pub fn file_stem(started: DateTime<Local>) -> String {
    format!("{}{}", FILE_PREFIX, started.format("%Y-%m-%d_%H-%M-%S"))
}
