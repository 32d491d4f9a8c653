//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Tool Resolution Errors
    // ─────────────────────────────────────────────────────────────
    #[error("minipro not found at '{path}' (PATH={search_path})")]
    ToolNotFound { path: PathBuf, search_path: String },

    // ─────────────────────────────────────────────────────────────
    // Runner Errors
    // ─────────────────────────────────────────────────────────────
    #[error("PTY command timeout after {seconds}s: {command}")]
    Timeout { command: String, seconds: u64 },

    #[error("failed to spawn process: {reason}")]
    Spawn { reason: String },

    #[error("PTY error: {message}")]
    Pty { message: String },

    #[error("command '{command}' exited with code {code}")]
    CommandFailed { command: String, code: i32 },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn tool_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ToolNotFound {
            path: path.into(),
            search_path: std::env::var("PATH").unwrap_or_default(),
        }
    }

    pub fn timeout(command: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            command: command.into(),
            seconds,
        }
    }

    pub fn spawn(reason: impl Into<String>) -> Self {
        Self::Spawn {
            reason: reason.into(),
        }
    }

    pub fn pty(message: impl Into<String>) -> Self {
        Self::Pty {
            message: message.into(),
        }
    }

    pub fn command_failed(command: impl Into<String>, code: i32) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code,
        }
    }

    /// Check if this is a recoverable error
    ///
    /// A nonzero exit or a timeout means the tool ran and failed; the session
    /// continues. Tool resolution and spawn failures are fatal to the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::CommandFailed { .. } | Error::Timeout { .. })
    }

    /// Check if this error should end the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ToolNotFound { .. } | Error::Spawn { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
