//! # mdemon-core - Core Domain Types
//!
//! Foundation crate for minipro-demon. Provides domain types, error
//! handling, event definitions, and the pure text parsers for minipro's
//! output.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (thiserror, regex, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`ChipInfo`] - Raw and shortened per-chip info query output
//! - [`WriteOptions`] - Erase/verify toggles for write operations
//!
//! ### Events (`events`)
//! - [`BackendEvent`] - Log stream, identity/selection/summary changes, and
//!   terminal operation results
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Output Parsing (`parse`)
//! - [`parse_programmer_identity()`] - Programmer model from `-k` output
//! - [`parse_device_tokens()`] - `NAME@PACKAGE` tokens from list output
//! - [`filter_by_prefix()`] - Defensive leading-character re-filter
//! - [`shorten_chip_info()`] - Recognized info lines from `-d` output
//! - [`parse_chip_id()`] - Hardware identifier from `-D` output
//! - [`parse_autodetect_device()`] - Chip token from `-a` output
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use mdemon_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod parse;
pub mod prelude;
pub mod types;

pub use error::{Error, Result, ResultExt};
pub use events::BackendEvent;
pub use types::{ChipInfo, WriteOptions, UNKNOWN_PROGRAMMER};

pub use parse::{
    filter_by_prefix, parse_autodetect_device, parse_chip_id, parse_device_tokens,
    parse_programmer_identity, shorten_chip_info, KNOWN_PROGRAMMERS,
};
