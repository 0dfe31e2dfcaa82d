use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors produced by a process session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to attach {0} pipe")]
    Pipe(&'static str),

    #[error("cannot create output file {}: {source}", .path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session already started")]
    AlreadyStarted,

    #[error("session is still running")]
    StillRunning,

    #[error("error writing to stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("error appending to output: {0}")]
    Append(#[source] std::io::Error),

    #[error("destination closed")]
    DestinationClosed,

    #[error("subprocess exited with {0}")]
    Exit(ExitStatus),

    #[error("wait error: {0}")]
    Wait(#[source] std::io::Error),

    #[error("invalid hook pattern `{pattern}`: {source}")]
    InvalidHook {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// True for errors raised while constructing or starting a session.
    pub fn is_spawn_error(&self) -> bool {
        matches!(
            self,
            SessionError::EmptyCommand
                | SessionError::Spawn { .. }
                | SessionError::Pipe(_)
                | SessionError::Destination { .. }
                | SessionError::AlreadyStarted
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
