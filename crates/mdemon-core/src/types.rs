//! Domain types shared across the minipro-demon crates

/// Per-chip information captured from a `minipro -d <chip>` query.
///
/// `raw` is the full captured text; `short` keeps only the recognized
/// informational lines (device code, memory, package, protocol, buffer
/// sizes). Immutable once computed; cached for the process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChipInfo {
    /// Chip name exactly as queried (cache key).
    pub chip: String,
    /// Recognized informational lines, original order and text.
    pub short: String,
    /// Full captured query output.
    pub raw: String,
}

impl ChipInfo {
    /// Empty shell for a chip name; used when the query could not run.
    pub fn shell(chip: impl Into<String>) -> Self {
        Self {
            chip: chip.into(),
            ..Self::default()
        }
    }
}

/// Options for a chip write operation.
///
/// Both flags are independent: the erase and verification steps minipro
/// performs around a write can each be skipped on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Erase the chip before writing (default true).
    pub erase_before_write: bool,
    /// Skip the post-write verification pass (default false).
    pub skip_verification: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            erase_before_write: true,
            skip_verification: false,
        }
    }
}

/// Sentinel identity reported when no programmer was detected.
pub const UNKNOWN_PROGRAMMER: &str = "Unknown";
