//! Serialized, append-only output file shared by every writer of a session.
//!
//! The input echo and both stream capturers append through the same
//! [`Sink`]. Each append holds the lock for exactly one write + flush, so
//! lines from concurrent writers never interleave mid-line.

use crate::error::{SessionError, SessionResult};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// A file destination guarded by a single mutex.
#[derive(Debug)]
pub struct Sink {
    path: PathBuf,
    /// `None` once closed.
    file: Mutex<Option<File>>,
}

impl Sink {
    /// Create (or truncate) the destination file at `path`.
    pub async fn create(path: impl Into<PathBuf>) -> SessionResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|source| SessionError::Destination {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "output file created");
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// Path of the destination file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `text` as one atomic write. Returns the number of bytes written.
    pub async fn append(&self, text: &str) -> SessionResult<usize> {
        self.append_bytes(text.as_bytes()).await
    }

    /// Byte variant of [`Sink::append`], used for captured lines that may not be UTF-8.
    pub async fn append_bytes(&self, data: &[u8]) -> SessionResult<usize> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(SessionError::DestinationClosed)?;
        file.write_all(data).await.map_err(SessionError::Append)?;
        file.flush().await.map_err(SessionError::Append)?;
        Ok(data.len())
    }

    /// Flush and release the file. Later appends fail with
    /// [`SessionError::DestinationClosed`]; closing again is a no-op.
    pub async fn close(&self) -> SessionResult<()> {
        let mut guard = self.file.lock().await;
        match guard.take() {
            Some(mut file) => {
                let flushed = file.flush().await;
                drop(file);
                debug!(path = %self.path.display(), "output file closed");
                flushed.map_err(SessionError::Io)
            }
            None => Ok(()),
        }
    }

    /// Whether [`Sink::close`] has run.
    pub async fn is_closed(&self) -> bool {
        self.file.lock().await.is_none()
    }

    /// Read everything appended so far.
    pub async fn read_all(&self) -> SessionResult<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn append_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Sink::create(dir.path().join("out.txt")).await.unwrap();

        assert_eq!(sink.append("> 4*5\n").await.unwrap(), 6);
        sink.append("20\n").await.unwrap();

        let content = sink.read_all().await.unwrap();
        assert_eq!(content, b"> 4*5\n20\n");
    }

    #[tokio::test]
    async fn create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "stale\n").unwrap();

        let sink = Sink::create(&path).await.unwrap();
        assert!(sink.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Sink::create(dir.path().join("nope").join("out.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Destination { .. }));
        assert!(err.is_spawn_error());
    }

    #[tokio::test]
    async fn append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Sink::create(dir.path().join("out.txt")).await.unwrap();
        sink.append("before\n").await.unwrap();
        sink.close().await.unwrap();

        assert!(sink.is_closed().await);
        let err = sink.append("after\n").await.unwrap_err();
        assert!(matches!(err, SessionError::DestinationClosed));
        assert_eq!(sink.read_all().await.unwrap(), b"before\n");
    }

    #[tokio::test]
    async fn double_close_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Sink::create(dir.path().join("out.txt")).await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(Sink::create(dir.path().join("out.txt")).await.unwrap());

        let mut handles = Vec::new();
        for writer in 0..4 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let line = format!("writer{writer}-line{i:03}-{}\n", "x".repeat(64));
                    sink.append(&line).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let content = String::from_utf8(sink.read_all().await.unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 200);
        for line in &lines {
            assert!(line.starts_with("writer"), "corrupted line: {line:?}");
            assert!(line.ends_with(&"x".repeat(64)), "corrupted line: {line:?}");
        }
        // Each writer's own lines keep their order.
        for writer in 0..4 {
            let prefix = format!("writer{writer}-");
            let seq: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with(&prefix)).collect();
            let mut sorted = seq.clone();
            sorted.sort();
            assert_eq!(seq, sorted);
        }
    }
}
