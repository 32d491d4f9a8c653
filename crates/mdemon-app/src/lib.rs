//! # mdemon-app - Operation Orchestration
//!
//! Ties the catalog and the PTY runner together behind an event-driven
//! [`Backend`], and loads user configuration.
//!
//! ## Public API
//!
//! - [`Backend`] - Runs device operations on blocking workers and reports
//!   progress through a [`mdemon_core::BackendEvent`] channel
//! - [`Settings`], [`load_settings()`] - User configuration from
//!   `~/.config/minipro-demon/config.toml`

pub mod backend;
pub mod config;

pub use backend::Backend;
pub use config::{config_file_path, load_settings, load_settings_from, Settings, TimeoutSettings};
