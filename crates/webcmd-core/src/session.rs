//! Process session lifecycle.
//!
//! A [`ProcessSession`] owns one subprocess, its stdin pipe, the two stream
//! capturers and the output [`Sink`]. State moves Created → Running → Done
//! and never backwards; a Done session can only be replaced via
//! [`ProcessSession::restart`].

use crate::capture::{spawn_capturer, StreamKind};
use crate::error::{SessionError, SessionResult};
use crate::hooks::{HookRegistry, HookSet};
use crate::sink::Sink;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long [`ProcessSession::wait`] lets the capturers drain after exit.
const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Prefix written before every echoed input line.
pub const ECHO_PREFIX: &str = "> ";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    Running = 1,
    Done = 2,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Created,
            1 => SessionState::Running,
            _ => SessionState::Done,
        }
    }
}

/// One subprocess bridged to an output file.
#[derive(Debug)]
pub struct ProcessSession {
    command: String,
    hooks: HookSet,
    sink: Arc<Sink>,
    state: AtomicU8,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    capturers: Mutex<Vec<JoinHandle<()>>>,
}

/// Build and start a session for `command`, writing to `output_path`.
///
/// Hooks are resolved from `registry` before the process starts.
pub async fn start_session(
    command: &str,
    output_path: impl Into<PathBuf>,
    registry: &HookRegistry,
) -> SessionResult<Arc<ProcessSession>> {
    let hooks = registry.resolve(command);
    let session = ProcessSession::new(command, output_path, hooks).await?;
    session.start().await?;
    Ok(Arc::new(session))
}

impl ProcessSession {
    /// Create the output file and a session in the `Created` state.
    pub async fn new(
        command: impl Into<String>,
        output_path: impl Into<PathBuf>,
        hooks: HookSet,
    ) -> SessionResult<Self> {
        let command = command.into();
        if command.split_whitespace().next().is_none() {
            return Err(SessionError::EmptyCommand);
        }
        let sink = Sink::create(output_path).await?;
        Ok(Self {
            command,
            hooks,
            sink: Arc::new(sink),
            state: AtomicU8::new(SessionState::Created as u8),
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            capturers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the subprocess and its two capturers.
    pub async fn start(&self) -> SessionResult<()> {
        if self.state() != SessionState::Created {
            return Err(SessionError::AlreadyStarted);
        }

        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or(SessionError::EmptyCommand)?;
        let mut cmd = Command::new(program);
        cmd.args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SessionError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            (stdin, stdout, _) => {
                let missing = if stdin.is_none() {
                    "stdin"
                } else if stdout.is_none() {
                    "stdout"
                } else {
                    "stderr"
                };
                if let Err(e) = child.start_kill() {
                    warn!(command = %self.command, error = %e, "failed to kill half-started subprocess");
                }
                return Err(SessionError::Pipe(missing));
            }
        };

        let pid = child.id();
        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);

        let mut capturers = self.capturers.lock().await;
        capturers.push(spawn_capturer(
            StreamKind::Stdout,
            stdout,
            self.sink.clone(),
            self.hooks.clone(),
        ));
        capturers.push(spawn_capturer(
            StreamKind::Stderr,
            stderr,
            self.sink.clone(),
            self.hooks.clone(),
        ));
        drop(capturers);

        self.mark_running().await?;

        info!(command = %self.command, pid = ?pid, hooks = self.hooks.name(), "session started");
        Ok(())
    }

    /// Move Created → Running. If `close` raced us the session stays Done
    /// and the child that was just spawned is killed.
    async fn mark_running(&self) -> SessionResult<()> {
        let claimed = self.state.compare_exchange(
            SessionState::Created as u8,
            SessionState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if claimed.is_ok() {
            return Ok(());
        }

        if let Some(child) = self.child.lock().await.as_mut() {
            debug!(command = %self.command, "closed during start, killing subprocess");
            if let Err(e) = child.start_kill() {
                warn!(command = %self.command, error = %e, "failed to kill subprocess");
            }
        }
        Err(SessionError::AlreadyStarted)
    }

    /// Forward `text` to the subprocess and echo it into the output file.
    ///
    /// Returns the number of bytes echoed. Empty input is ignored. A failed
    /// stdin write does not close the session.
    pub async fn write_input(&self, text: &str) -> SessionResult<usize> {
        if text.is_empty() {
            return Ok(0);
        }
        debug!(input = text, "input");

        let stdin_result = self.write_stdin(text).await;
        if let Err(e) = &stdin_result {
            warn!(command = %self.command, error = %e, "error writing to stdin");
        }

        let echo = format!("{ECHO_PREFIX}{text}\n");
        let written = self.sink.append(&echo).await?;
        stdin_result?;
        Ok(written)
    }

    async fn write_stdin(&self, text: &str) -> SessionResult<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| {
            SessionError::Stdin(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin is closed",
            ))
        })?;
        let bytes = self.hooks.encode_input(text);
        stdin.write_all(&bytes).await.map_err(SessionError::Stdin)?;
        stdin.flush().await.map_err(SessionError::Stdin)?;
        Ok(())
    }

    /// Block until the subprocess exits, then close the session.
    ///
    /// A non-zero exit is returned as [`SessionError::Exit`]; the session is
    /// closed either way.
    pub async fn wait(&self) -> SessionResult<ExitStatus> {
        debug!(command = %self.command, "waiting for subprocess");
        let status = {
            let mut guard = self.child.lock().await;
            match guard.as_mut() {
                Some(child) => child.wait().await.map_err(SessionError::Wait),
                None => Err(SessionError::Wait(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "subprocess was never started",
                ))),
            }
        };

        self.drain_capturers().await;
        if let Err(e) = self.close().await {
            warn!(command = %self.command, error = %e, "error closing session");
        }

        match status {
            Ok(status) if status.success() => {
                info!(command = %self.command, "subprocess exited");
                Ok(status)
            }
            Ok(status) => {
                warn!(command = %self.command, %status, "subprocess exited with error");
                Err(SessionError::Exit(status))
            }
            Err(e) => {
                warn!(command = %self.command, error = %e, "error waiting for subprocess");
                Err(e)
            }
        }
    }

    async fn drain_capturers(&self) {
        let handles: Vec<_> = self.capturers.lock().await.drain(..).collect();
        for mut handle in handles {
            match tokio::time::timeout(CAPTURE_DRAIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "capturer task failed"),
                Err(_) => {
                    warn!("capturer still reading after exit, aborting");
                    handle.abort();
                }
            }
        }
    }

    /// Mark the session Done, close stdin and the output file.
    ///
    /// Safe to call any number of times.
    pub async fn close(&self) -> SessionResult<()> {
        let previous = self.state.swap(SessionState::Done as u8, Ordering::AcqRel);
        if previous != SessionState::Done as u8 {
            debug!(command = %self.command, "closing session");
        }
        self.stdin.lock().await.take();
        self.sink.close().await
    }

    /// Start a fresh session with the same command, output path and hooks.
    ///
    /// Only valid once this session is Done.
    pub async fn restart(&self) -> SessionResult<Arc<ProcessSession>> {
        if !self.is_done() {
            return Err(SessionError::StillRunning);
        }
        info!(command = %self.command, "restarting session");
        let session =
            ProcessSession::new(self.command.clone(), self.sink.path(), self.hooks.clone()).await?;
        session.start().await?;
        Ok(Arc::new(session))
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Non-blocking check used by the request surface.
    pub fn is_done(&self) -> bool {
        self.state() == SessionState::Done
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// Path of the output file.
    pub fn output_path(&self) -> &Path {
        self.sink.path()
    }

    /// Everything written to the output file so far.
    pub async fn read_output(&self) -> SessionResult<Vec<u8>> {
        self.sink.read_all().await
    }
}
