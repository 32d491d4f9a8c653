//! # mdemon-daemon - minipro Process Management
//!
//! Runs the external `minipro` command-line tool under a pseudo-terminal,
//! resolves the executable, and maintains a cached catalog of supported
//! devices.
//!
//! Depends on [`mdemon_core`] for domain types, parsing, and error handling.
//!
//! ## Public API
//!
//! ### PTY Runner
//! - [`run_tty()`] - Run a command under a PTY and capture its output
//! - [`run_tty_stream()`] - Same, streaming chunks to a callback as they arrive
//! - [`TtyOutput`] - Exit code plus captured text
//!
//! ### Command Construction
//! - [`MiniproCommand`] - One enum variant per minipro invocation, with
//!   argument list and timeout class
//! - [`Timeouts`] - Per-class wall-clock budgets, overridable from
//!   configuration
//!
//! ### Tool Resolution
//! - [`resolve_tool()`] - Find the minipro executable from a path or name
//! - [`ensure_search_path()`] - Augment PATH with common install directories
//! - [`tool_exists()`], [`missing_tool_message()`] - Availability diagnostics
//!
//! ### Device Catalog
//! - [`DeviceCatalog`] - Cached prefix/search/info lookups and programmer
//!   identity, rebuilt by `reload`

pub mod catalog;
pub mod commands;
pub mod pty;
pub mod tool;

pub use catalog::DeviceCatalog;
pub use commands::{MiniproCommand, Timeouts};
pub use pty::{run_tty, run_tty_stream, TtyOutput};
pub use tool::{
    ensure_search_path, missing_tool_message, resolve_tool, tool_exists, DEFAULT_TOOL_NAME,
};
