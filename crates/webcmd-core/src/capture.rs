//! Stream capturers: drain one subprocess output stream into the sink.

use crate::error::SessionError;
use crate::hooks::HookSet;
use crate::sink::Sink;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Which standard stream a capturer is draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Spawn a task that copies `reader` into `sink` line by line.
///
/// The task ends when the stream reaches EOF, a read fails, or the sink
/// has been closed. None of those are reported to the session owner.
pub fn spawn_capturer<R>(
    kind: StreamKind,
    reader: R,
    sink: Arc<Sink>,
    hooks: HookSet,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(capture(kind, reader, sink, hooks))
}

async fn capture<R>(kind: StreamKind, reader: R, sink: Arc<Sink>, hooks: HookSet)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    let mut lines: u64 = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!(stream = %kind, lines, "stream closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(stream = %kind, error = %e, "error reading from subprocess");
                break;
            }
        }

        let line = trim_line_break(&buf);
        let rewritten = hooks.rewrite_output(line);
        trace!(stream = %kind, line = %String::from_utf8_lossy(&rewritten), "captured");

        let mut record = Vec::with_capacity(rewritten.len() + 1);
        record.extend_from_slice(&rewritten);
        record.push(b'\n');

        match sink.append_bytes(&record).await {
            Ok(_) => lines += 1,
            Err(SessionError::DestinationClosed) => {
                debug!(stream = %kind, lines, "output closed, capturer stopping");
                break;
            }
            Err(e) => warn!(stream = %kind, error = %e, "failed to store captured line"),
        }
    }
}

/// Strip a trailing `\n` and then a trailing `\r`.
fn trim_line_break(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{Hooks, IdentityHooks};
    use std::borrow::Cow;

    #[derive(Debug)]
    struct Upper;

    impl Hooks for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn rewrite_output<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
            Cow::Owned(line.to_ascii_uppercase())
        }
    }

    async fn capture_to_string(input: &'static [u8], hooks: HookSet) -> String {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(Sink::create(dir.path().join("out.txt")).await.unwrap());
        spawn_capturer(StreamKind::Stdout, input, sink.clone(), hooks)
            .await
            .unwrap();
        String::from_utf8(sink.read_all().await.unwrap()).unwrap()
    }

    #[test]
    fn trims_lf_and_crlf() {
        assert_eq!(trim_line_break(b"abc\n"), b"abc");
        assert_eq!(trim_line_break(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_break(b"abc"), b"abc");
        assert_eq!(trim_line_break(b"a\rb\n"), b"a\rb");
    }

    #[tokio::test]
    async fn preserves_line_order() {
        let out = capture_to_string(b"one\ntwo\r\nthree\n", Arc::new(IdentityHooks)).await;
        assert_eq!(out, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn final_unterminated_line_is_kept() {
        let out = capture_to_string(b"20\n64", Arc::new(IdentityHooks)).await;
        assert_eq!(out, "20\n64\n");
    }

    #[tokio::test]
    async fn applies_output_transform_to_every_line() {
        let out = capture_to_string(b"a\nb\n\nc\n", Arc::new(Upper)).await;
        assert_eq!(out, "A\nB\n\nC\n");
    }

    #[tokio::test]
    async fn stops_when_sink_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(Sink::create(dir.path().join("out.txt")).await.unwrap());
        sink.close().await.unwrap();

        let handle = spawn_capturer(
            StreamKind::Stderr,
            &b"lost\nlost\n"[..],
            sink.clone(),
            Arc::new(IdentityHooks),
        );
        handle.await.unwrap();
        assert!(sink.read_all().await.unwrap().is_empty());
    }
}
