//! webcmd-core: bridge a line-oriented interactive subprocess to a file.
//!
//! Spawns the subprocess with piped stdio, drains stdout and stderr into a
//! single serialized output file, forwards submitted input to stdin (with an
//! audit echo), and applies per-command input/output hooks.

pub mod capture;
pub mod error;
pub mod hooks;
pub mod session;
pub mod sink;

// Re-export commonly used items at crate root.
pub use capture::StreamKind;
pub use error::{SessionError, SessionResult};
pub use hooks::{HookRegistry, HookRule, HookSet, Hooks, IdentityHooks, PianobarHooks};
pub use session::{start_session, ProcessSession, SessionState, ECHO_PREFIX};
pub use sink::Sink;
