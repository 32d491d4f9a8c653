//! Domain event definitions
//!
//! Events flow from the backend workers to whatever front end is attached
//! (the `mdemon` CLI, or a GUI). Within one runner invocation, `Log` chunks
//! are delivered in the exact order bytes were read from the terminal.

/// Event emitted by the backend while operations run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Raw tool output chunk, forwarded as produced (lossy UTF-8).
    Log(String),

    /// Detected programmer model changed ("Unknown" on failed reload).
    ProgrammerChanged(String),

    /// Selected chip changed (empty string clears the selection).
    ChipChanged(String),

    /// Compact chip info summary recomputed.
    ChipInfoChanged(String),

    /// An operation reached its terminal state. Emitted exactly once per
    /// operation.
    OperationFinished { ok: bool, message: String },
}

impl BackendEvent {
    /// Convenience constructor for terminal events.
    pub fn finished(ok: bool, message: impl Into<String>) -> Self {
        Self::OperationFinished {
            ok,
            message: message.into(),
        }
    }

    /// True for `OperationFinished`, regardless of outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::OperationFinished { .. })
    }
}
