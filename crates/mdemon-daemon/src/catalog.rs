//! Device catalog built by parsing minipro list/query output
//!
//! The catalog owns its caches (no globals) and populates them lazily
//! through the PTY runner and the pure parsers. All methods are blocking
//! and intended to run on worker threads. The caches are shared, read-mostly
//! structures: concurrent lookups for different keys are safe, and
//! concurrent misses on the *same* key may run the underlying command
//! twice -- an accepted race, since list queries are idempotent and cheap
//! next to real device operations. No per-key lock is taken.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use mdemon_core::parse::{
    filter_by_prefix, parse_device_tokens, parse_programmer_identity, shorten_chip_info,
};
use mdemon_core::prelude::*;
use mdemon_core::{ChipInfo, UNKNOWN_PROGRAMMER};

use crate::commands::{MiniproCommand, Timeouts};
use crate::pty::{run_tty, TtyOutput};

/// Candidate prefix characters probed by [`DeviceCatalog::compute_prefixes`]:
/// digits, letters (both cases; the cache key is uppercased), then the
/// punctuation minipro device names use.
const PREFIX_CANDIDATES: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_+-.";

/// Lazily populated catalog of devices supported by the attached programmer.
///
/// Created empty; populated on first query; fully cleared and rebuilt by
/// [`reload`](Self::reload).
pub struct DeviceCatalog {
    tool: PathBuf,
    timeouts: Timeouts,
    programmer: Mutex<String>,
    prefix_cache: Mutex<HashMap<char, Vec<String>>>,
    search_cache: Mutex<HashMap<String, Vec<String>>>,
    info_cache: Mutex<HashMap<String, ChipInfo>>,
    prefixes: Mutex<Option<Vec<char>>>,
}

/// Poison-tolerant lock: a panicked worker must not wedge every later query.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DeviceCatalog {
    pub fn new(tool: PathBuf) -> Self {
        Self::with_timeouts(tool, Timeouts::default())
    }

    /// Build a catalog with custom per-class command budgets.
    pub fn with_timeouts(tool: PathBuf, timeouts: Timeouts) -> Self {
        Self {
            tool,
            timeouts,
            programmer: Mutex::new(UNKNOWN_PROGRAMMER.to_string()),
            prefix_cache: Mutex::new(HashMap::new()),
            search_cache: Mutex::new(HashMap::new()),
            info_cache: Mutex::new(HashMap::new()),
            prefixes: Mutex::new(None),
        }
    }

    /// Path of the resolved minipro executable this catalog drives.
    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Last detected programmer model; "Unknown" until a reload succeeds.
    pub fn programmer(&self) -> String {
        lock(&self.programmer).clone()
    }

    fn set_programmer(&self, model: &str) {
        *lock(&self.programmer) = model.to_string();
    }

    fn run(&self, cmd: &MiniproCommand) -> Result<TtyOutput> {
        run_tty(&self.tool, &cmd.args(), cmd.timeout_with(&self.timeouts))
    }

    /// Clear every cache and re-probe the programmer identity.
    ///
    /// A failed probe (missing tool, runner error, or nonzero exit) resets
    /// the identity to "Unknown" and is the one catalog failure that
    /// propagates as an error.
    pub fn reload(&self) -> Result<String> {
        lock(&self.prefix_cache).clear();
        lock(&self.search_cache).clear();
        lock(&self.info_cache).clear();
        *lock(&self.prefixes) = None;

        if !crate::tool::tool_exists(&self.tool) {
            self.set_programmer(UNKNOWN_PROGRAMMER);
            return Err(Error::tool_not_found(&self.tool));
        }

        let cmd = MiniproCommand::Probe;
        let out = match self.run(&cmd) {
            Ok(out) => out,
            Err(e) => {
                self.set_programmer(UNKNOWN_PROGRAMMER);
                return Err(e);
            }
        };

        if !out.success() {
            self.set_programmer(UNKNOWN_PROGRAMMER);
            return Err(Error::command_failed(cmd.describe(), out.code));
        }

        let identity = parse_programmer_identity(&out.text);
        info!("programmer identity: {}", identity);
        self.set_programmer(&identity);
        Ok(identity)
    }

    /// Ordered prefixes for which at least one chip token exists.
    ///
    /// Digits first, then letters, then punctuation, each class sorted.
    /// Computed once; idempotent until the next [`reload`](Self::reload).
    pub fn compute_prefixes(&self) -> Vec<char> {
        if let Some(cached) = lock(&self.prefixes).clone() {
            return cached;
        }

        let mut found: Vec<char> = Vec::new();
        for ch in PREFIX_CANDIDATES.chars() {
            if self.list_by_prefix(&ch.to_string()).is_empty() {
                continue;
            }
            let key = normalize_prefix(ch);
            if !found.contains(&key) {
                found.push(key);
            }
        }

        let mut digits: Vec<char> = found.iter().copied().filter(|c| c.is_ascii_digit()).collect();
        let mut letters: Vec<char> = found
            .iter()
            .copied()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        let mut other: Vec<char> = found
            .iter()
            .copied()
            .filter(|c| !c.is_ascii_alphanumeric())
            .collect();
        digits.sort_unstable();
        letters.sort_unstable();
        other.sort_unstable();

        let mut ordered = digits;
        ordered.append(&mut letters);
        ordered.append(&mut other);

        *lock(&self.prefixes) = Some(ordered.clone());
        ordered
    }

    /// Chip tokens whose name starts with the given character.
    ///
    /// Only the first character of the trimmed input is used; empty input
    /// returns an empty result without running anything. Results are
    /// re-filtered by true leading character (minipro's own `-L` filtering
    /// is not trusted), de-duplicated and sorted. A failed command is
    /// cached as "no results" rather than retried.
    pub fn list_by_prefix(&self, prefix: &str) -> Vec<String> {
        let trimmed = prefix.trim();
        let Some(p) = trimmed.chars().next() else {
            return Vec::new();
        };

        let key = normalize_prefix(p);
        if let Some(hit) = lock(&self.prefix_cache).get(&key) {
            return hit.clone();
        }

        let cmd = MiniproCommand::List {
            query: p.to_string(),
        };
        let chips = match self.run(&cmd) {
            Ok(out) if out.success() => {
                let tokens = parse_device_tokens(&out.text);
                let mut filtered = filter_by_prefix(&tokens, p);
                filtered.sort_unstable();
                filtered.dedup();
                filtered
            }
            Ok(out) => {
                debug!("{} exited {}; caching empty result", cmd.describe(), out.code);
                Vec::new()
            }
            Err(e) => {
                debug!("{} failed ({}); caching empty result", cmd.describe(), e);
                Vec::new()
            }
        };

        lock(&self.prefix_cache).insert(key, chips.clone());
        chips
    }

    /// Chip tokens matching a free-text query.
    ///
    /// Unlike [`list_by_prefix`](Self::list_by_prefix) no re-filter is
    /// applied: minipro's own free-text matching is trusted. Empty queries
    /// return empty without running anything.
    pub fn search(&self, query: &str) -> Vec<String> {
        let q = query.trim();
        if q.is_empty() {
            return Vec::new();
        }

        if let Some(hit) = lock(&self.search_cache).get(q) {
            return hit.clone();
        }

        let cmd = MiniproCommand::List {
            query: q.to_string(),
        };
        let chips = match self.run(&cmd) {
            Ok(out) if out.success() => {
                let mut tokens = parse_device_tokens(&out.text);
                tokens.sort_unstable();
                tokens.dedup();
                tokens
            }
            Ok(_) | Err(_) => Vec::new(),
        };

        lock(&self.search_cache).insert(q.to_string(), chips.clone());
        chips
    }

    /// Raw and shortened info for one chip, cached by exact name.
    ///
    /// Empty names return an empty shell without running anything. If the
    /// query cannot run at all, an empty shell is cached; whatever text the
    /// tool produced is kept otherwise, regardless of exit code.
    pub fn get_info(&self, chip: &str) -> ChipInfo {
        let chip = chip.trim();
        if chip.is_empty() {
            return ChipInfo::default();
        }

        if let Some(hit) = lock(&self.info_cache).get(chip) {
            return hit.clone();
        }

        let cmd = MiniproCommand::Info {
            chip: chip.to_string(),
        };
        let info = match self.run(&cmd) {
            Ok(out) => {
                let raw = out.text.trim().to_string();
                ChipInfo {
                    chip: chip.to_string(),
                    short: shorten_chip_info(&raw),
                    raw,
                }
            }
            Err(e) => {
                debug!("{} failed ({}); caching empty shell", cmd.describe(), e);
                ChipInfo::shell(chip)
            }
        };

        lock(&self.info_cache).insert(chip.to_string(), info.clone());
        info
    }
}

/// Letters are cached under their uppercase form; everything else is exact.
fn normalize_prefix(c: char) -> char {
    if c.is_ascii_alphabetic() {
        c.to_ascii_uppercase()
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Stub minipro: answers `-k`, `-L`, `-d` and appends each argument
    /// list to a counter file so tests can assert invocation counts.
    fn stub_tool(dir: &TempDir) -> (PathBuf, PathBuf) {
        let count = dir.path().join("invocations.txt");
        let script = dir.path().join("minipro-stub");
        let body = format!(
            r#"#!/bin/sh
echo "$@" >> "{count}"
case "$1" in
  -k)
    echo "Found T48 01-2-3"
    ;;
  -L)
    case "$2" in
      A|a)
        echo "AT28C256 @ DIP28"
        echo "AT29C010@PLCC32"
        echo "AT28C256@DIP28"
        echo "XC9536@PLCC44"
        echo "found 4 device(s)"
        ;;
      2)
        echo "27C512@DIP28"
        ;;
    esac
    ;;
  -d)
    echo "Name: $2"
    echo "Device code: 0x1234"
    echo "Memory: 8192 Bits"
    echo "Usage: nonsense"
    ;;
esac
exit 0
"#,
            count = count.display()
        );
        fs::write(&script, body).expect("write stub");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod stub");
        (script, count)
    }

    fn invocations(count: &Path, needle: &str) -> usize {
        fs::read_to_string(count)
            .unwrap_or_default()
            .lines()
            .filter(|l| l.trim() == needle)
            .count()
    }

    #[test]
    fn test_list_by_prefix_filters_sorts_dedupes() {
        let dir = TempDir::new().expect("tempdir");
        let (tool, _count) = stub_tool(&dir);
        let catalog = DeviceCatalog::new(tool);

        let chips = catalog.list_by_prefix("A");
        assert_eq!(chips, vec!["AT28C256@DIP28", "AT29C010@PLCC32"]);
    }

    #[test]
    fn test_list_by_prefix_cache_suppresses_reinvocation() {
        let dir = TempDir::new().expect("tempdir");
        let (tool, count) = stub_tool(&dir);
        let catalog = DeviceCatalog::new(tool);

        let first = catalog.list_by_prefix("A");
        let second = catalog.list_by_prefix("A");
        // Lowercase hits the same normalized key.
        let third = catalog.list_by_prefix("a");

        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(invocations(&count, "-L A"), 1);
        assert_eq!(invocations(&count, "-L a"), 0);
    }

    #[test]
    fn test_list_by_prefix_empty_input_runs_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let (tool, count) = stub_tool(&dir);
        let catalog = DeviceCatalog::new(tool);

        assert!(catalog.list_by_prefix("").is_empty());
        assert!(catalog.list_by_prefix("   ").is_empty());
        assert!(!count.exists());
    }

    #[test]
    fn test_search_trusts_tool_matching() {
        let dir = TempDir::new().expect("tempdir");
        let (tool, _count) = stub_tool(&dir);
        let catalog = DeviceCatalog::new(tool);

        // The defensive re-filter applies to prefix listing only: the
        // non-"A" token survives a free-text search for "A".
        let chips = catalog.search("A");
        assert!(chips.contains(&"XC9536@PLCC44".to_string()));
        assert!(chips.contains(&"AT28C256@DIP28".to_string()));
    }

    #[test]
    fn test_search_empty_runs_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let (tool, count) = stub_tool(&dir);
        let catalog = DeviceCatalog::new(tool);

        assert!(catalog.search("").is_empty());
        assert!(catalog.search("  ").is_empty());
        assert!(!count.exists());
    }

    #[test]
    fn test_get_info_shortens_and_caches() {
        let dir = TempDir::new().expect("tempdir");
        let (tool, count) = stub_tool(&dir);
        let catalog = DeviceCatalog::new(tool);

        let info = catalog.get_info("AT28C256@DIP28");
        assert_eq!(info.chip, "AT28C256@DIP28");
        assert_eq!(info.short, "Device code: 0x1234\nMemory: 8192 Bits");
        assert!(info.raw.contains("Name: AT28C256@DIP28"));

        let again = catalog.get_info("AT28C256@DIP28");
        assert_eq!(info, again);
        assert_eq!(invocations(&count, "-d AT28C256@DIP28"), 1);
    }

    #[test]
    fn test_get_info_empty_name_runs_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let (tool, count) = stub_tool(&dir);
        let catalog = DeviceCatalog::new(tool);

        let info = catalog.get_info("");
        assert!(info.chip.is_empty());
        assert!(info.raw.is_empty());
        assert!(!count.exists());
    }

    #[test]
    fn test_get_info_unresolvable_tool_yields_shell() {
        let catalog = DeviceCatalog::new(PathBuf::from("/nonexistent/minipro"));
        let info = catalog.get_info("AT28C256@DIP28");
        assert_eq!(info.chip, "AT28C256@DIP28");
        assert!(info.short.is_empty());
        assert!(info.raw.is_empty());
    }

    #[test]
    fn test_compute_prefixes_order_and_idempotence() {
        let dir = TempDir::new().expect("tempdir");
        let (tool, count) = stub_tool(&dir);
        let catalog = DeviceCatalog::new(tool);

        let prefixes = catalog.compute_prefixes();
        assert_eq!(prefixes, vec!['2', 'A']);

        let before = fs::read_to_string(&count).expect("count file").lines().count();
        let again = catalog.compute_prefixes();
        let after = fs::read_to_string(&count).expect("count file").lines().count();

        assert_eq!(prefixes, again);
        assert_eq!(before, after, "second computation must not re-run queries");
    }

    #[test]
    fn test_reload_updates_identity_and_clears_caches() {
        let dir = TempDir::new().expect("tempdir");
        let (tool, count) = stub_tool(&dir);
        let catalog = DeviceCatalog::new(tool);

        assert_eq!(catalog.programmer(), "Unknown");
        catalog.list_by_prefix("A");
        assert_eq!(invocations(&count, "-L A"), 1);

        let identity = catalog.reload().expect("reload should succeed");
        assert_eq!(identity, "T48");
        assert_eq!(catalog.programmer(), "T48");

        // Caches were cleared: the next lookup runs the command again.
        catalog.list_by_prefix("A");
        assert_eq!(invocations(&count, "-L A"), 2);
    }

    #[test]
    fn test_custom_timeouts_bound_list_queries() {
        use std::time::{Duration, Instant};

        let dir = TempDir::new().expect("tempdir");
        let script = dir.path().join("slow-stub");
        fs::write(&script, "#!/bin/sh\nsleep 5\n").expect("write stub");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod stub");

        let timeouts = Timeouts {
            list: Duration::from_secs(1),
            ..Timeouts::default()
        };
        let catalog = DeviceCatalog::with_timeouts(script, timeouts);

        let started = Instant::now();
        let chips = catalog.list_by_prefix("A");
        let elapsed = started.elapsed();

        assert!(chips.is_empty());
        assert!(elapsed >= Duration::from_secs(1));
        assert!(
            elapsed < Duration::from_secs(3),
            "configured list budget should apply, took {:?}",
            elapsed
        );
    }

    #[test]
    fn test_reload_missing_tool_is_structured_error() {
        let catalog = DeviceCatalog::new(PathBuf::from("/nonexistent/minipro"));
        let err = catalog.reload().unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
        assert!(err.is_fatal());
        assert_eq!(catalog.programmer(), "Unknown");
    }

    #[test]
    fn test_reload_failure_resets_identity() {
        let dir = TempDir::new().expect("tempdir");
        let script = dir.path().join("broken-stub");
        fs::write(&script, "#!/bin/sh\nexit 3\n").expect("write stub");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod stub");

        let catalog = DeviceCatalog::new(script);
        let err = catalog.reload().unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: 3, .. }));
        assert_eq!(catalog.programmer(), "Unknown");
    }
}
