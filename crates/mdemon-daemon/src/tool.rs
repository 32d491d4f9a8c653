//! minipro executable resolution
//!
//! The invoking process may have a minimal inherited PATH (launched from a
//! desktop environment rather than a shell), so resolution first augments
//! PATH with the common install directories, then walks the chain:
//! explicit path if it exists, search-path lookup of the requested name,
//! search-path lookup of the default name, and finally the literal request
//! so a later invocation surfaces a clear "not found" failure.

use std::env;
use std::path::{Path, PathBuf};

use mdemon_core::prelude::*;

/// Name looked up when no explicit path is configured.
pub const DEFAULT_TOOL_NAME: &str = "minipro";

/// Common install directories prepended to PATH when missing.
const FALLBACK_PATH_DIRS: &[&str] = &[
    "/opt/homebrew/bin",
    "/usr/local/bin",
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
    "/opt/local/bin",
];

/// Prepend the fallback directories to PATH if they exist and are absent.
pub fn ensure_search_path() {
    let current = env::var("PATH").unwrap_or_default();
    let mut parts: Vec<String> = current
        .split(':')
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect();

    for dir in FALLBACK_PATH_DIRS {
        if !parts.iter().any(|p| p == dir) && Path::new(dir).is_dir() {
            parts.insert(0, (*dir).to_string());
        }
    }

    env::set_var("PATH", parts.join(":"));
}

/// Resolve the minipro executable from an explicit path or name.
///
/// Never fails: an unresolvable request is returned literally so the
/// eventual spawn produces a diagnosable error instead of a silent no-op.
pub fn resolve_tool(requested: &str) -> PathBuf {
    let requested = requested.trim();
    let name = if requested.is_empty() {
        DEFAULT_TOOL_NAME
    } else {
        requested
    };

    // Explicit path forms are honored when they exist on disk.
    if name.contains(std::path::MAIN_SEPARATOR) || name.starts_with('.') {
        let p = Path::new(name);
        if p.exists() {
            return p.to_path_buf();
        }
        if let Ok(abs) = std::path::absolute(p) {
            if abs.exists() {
                return abs;
            }
        }
    }

    if let Ok(found) = which::which(name) {
        return found;
    }
    if let Ok(found) = which::which(DEFAULT_TOOL_NAME) {
        return found;
    }

    PathBuf::from(name)
}

/// Check whether a resolved tool can actually be invoked.
pub fn tool_exists(resolved: &Path) -> bool {
    if resolved.components().count() > 1 {
        resolved.exists()
    } else {
        which::which(resolved).is_ok()
    }
}

/// Diagnostic message for a missing tool, with the attempted path and the
/// current search path.
pub fn missing_tool_message(resolved: &Path) -> String {
    format!(
        "minipro not found.\n\n\
         Install minipro and make sure it is in PATH.\n\
         Common locations:\n\
         \x20 /opt/homebrew/bin/minipro\n\
         \x20 /usr/local/bin/minipro\n\n\
         Resolved path='{}'\n\
         PATH='{}'",
        resolved.display(),
        env::var("PATH").unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_resolve_explicit_existing_path() {
        assert_eq!(resolve_tool("/bin/sh"), PathBuf::from("/bin/sh"));
    }

    #[test]
    fn test_resolve_unknown_name_falls_back_to_literal() {
        // Assumes neither this name nor minipro is installed in CI.
        let resolved = resolve_tool("definitely-not-a-real-tool-xyz");
        assert!(
            resolved == PathBuf::from("definitely-not-a-real-tool-xyz")
                || resolved.ends_with(DEFAULT_TOOL_NAME)
        );
    }

    #[test]
    fn test_resolve_empty_uses_default_name() {
        let resolved = resolve_tool("   ");
        assert!(resolved.ends_with(DEFAULT_TOOL_NAME) || resolved == PathBuf::from("minipro"));
    }

    #[test]
    fn test_tool_exists_for_paths() {
        assert!(tool_exists(Path::new("/bin/sh")));
        assert!(!tool_exists(Path::new("/nonexistent/dir/minipro")));
    }

    #[test]
    #[serial]
    fn test_ensure_search_path_adds_standard_dirs() {
        let saved = env::var("PATH").unwrap_or_default();
        env::set_var("PATH", "/tmp");

        ensure_search_path();
        let path = env::var("PATH").unwrap_or_default();
        assert!(path.split(':').any(|p| p == "/usr/bin"));
        assert!(path.split(':').any(|p| p == "/tmp"));

        env::set_var("PATH", saved);
    }

    #[test]
    #[serial]
    fn test_missing_message_includes_path_and_search_path() {
        let msg = missing_tool_message(Path::new("/opt/nowhere/minipro"));
        assert!(msg.contains("/opt/nowhere/minipro"));
        assert!(msg.contains("PATH='"));
    }
}
