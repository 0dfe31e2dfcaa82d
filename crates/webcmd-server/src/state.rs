//! Shared application state: the current session and how to replace it.

use crate::config::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use webcmd_core::{start_session, HookRegistry, ProcessSession, SessionResult};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    command: String,
    input_delay: Duration,
    current: RwLock<Arc<ProcessSession>>,
}

impl AppState {
    /// Resolve hooks and start the first session.
    pub async fn start(config: &ServerConfig) -> anyhow::Result<Self> {
        let registry = HookRegistry::from_rules(&config.hook_rules)?;
        let session = start_session(&config.command, &config.output_path, &registry).await?;
        Ok(Self::from_session(session, config.input_delay))
    }

    /// Wrap an already started session.
    pub fn from_session(session: Arc<ProcessSession>, input_delay: Duration) -> Self {
        spawn_waiter(session.clone());
        Self {
            inner: Arc::new(Inner {
                command: session.command().to_string(),
                input_delay,
                current: RwLock::new(session),
            }),
        }
    }

    pub async fn current(&self) -> Arc<ProcessSession> {
        self.inner.current.read().await.clone()
    }

    pub fn command(&self) -> &str {
        &self.inner.command
    }

    pub fn input_delay(&self) -> Duration {
        self.inner.input_delay
    }

    /// Replace the current session if it is Done. Returns whether it did.
    pub async fn restart_if_done(&self) -> SessionResult<bool> {
        let mut current = self.inner.current.write().await;
        if !current.is_done() {
            debug!(command = %self.inner.command, "restart ignored, session still running");
            return Ok(false);
        }
        info!(command = %self.inner.command, "restarting commander");
        let session = current.restart().await?;
        spawn_waiter(session.clone());
        *current = session;
        Ok(true)
    }

    /// Close the current session and remove its output file.
    pub async fn shutdown(&self) {
        let session = self.current().await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "error closing session");
        }
        let path = session.output_path();
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "output file removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove output file"),
        }
    }
}

/// Wait on the session in the background so `is_done()` flips when it exits.
fn spawn_waiter(session: Arc<ProcessSession>) {
    tokio::spawn(async move {
        // Exit errors are already logged by `wait`.
        let _ = session.wait().await;
        debug!(command = %session.command(), "session done");
    });
}
