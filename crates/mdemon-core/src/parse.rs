//! Parsers for minipro's unstructured text output
//!
//! Pure, stateless functions. Each one operates on the full captured text of
//! a single command invocation; none of them know anything about processes
//! or terminals. minipro's output is informal and varies between builds, so
//! every extraction here tolerates garbled or partial text and degrades to
//! an empty result rather than erroring.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::UNKNOWN_PROGRAMMER;

/// Hardware programmer models minipro is known to report.
pub const KNOWN_PROGRAMMERS: &[&str] = &["T48", "T56", "TL866II+", "TL866A", "TL866CS"];

fn model_alternation() -> String {
    KNOWN_PROGRAMMERS
        .iter()
        .map(|m| regex::escape(m))
        .collect::<Vec<_>>()
        .join("|")
}

// "label: MODEL" on its own line, e.g. "Device: T48".
static IDENTITY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?im)^\s*\w+\s*:\s*({})\s*$", model_alternation()))
        .expect("identity line regex")
});

// Looser fallback: "Found MODEL" anywhere in the text. A trailing \b would
// reject models ending in "+", so the end is guarded by a character class.
static IDENTITY_LOOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bFound\s+({})(?:[^0-9A-Za-z+]|$)",
        model_alternation()
    ))
    .expect("identity regex")
});

// Whitespace around the NAME@PACKAGE separator, collapsed before matching.
static AT_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*@\s*").expect("at-spacing regex"));

// A chip token: NAME@PACKAGE where each side is alphanumeric plus _.+- and
// starts alphanumeric.
static CHIP_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z0-9][A-Za-z0-9_.+\-]*@[A-Za-z0-9][A-Za-z0-9_.+\-]*)\b")
        .expect("chip token regex")
});

static ID_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bid\b").expect("id word regex"));

static HEX_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"0x[0-9a-fA-F]+").expect("hex literal regex"));

static HEX_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F]{8,}\b").expect("hex run regex"));

static DETECTED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:detected|found)\s*:\s*(.+?)\s*$").expect("detected line regex")
});

/// Lines minipro prints around every command that carry no device data.
fn is_noise_line(lowercased: &str) -> bool {
    lowercased.starts_with("found ")
        || lowercased.starts_with("warning:")
        || lowercased.starts_with("minipro version")
        || lowercased.contains("usage:")
}

/// Extract the programmer model from `minipro -k` output.
///
/// Prefers a strict "label: MODEL" line; falls back to "Found MODEL"
/// anywhere; otherwise [`UNKNOWN_PROGRAMMER`].
pub fn parse_programmer_identity(text: &str) -> String {
    if let Some(caps) = IDENTITY_LINE.captures(text) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = IDENTITY_LOOSE.captures(text) {
        return caps[1].trim().to_string();
    }
    UNKNOWN_PROGRAMMER.to_string()
}

/// Extract all chip tokens (`NAME@PACKAGE`) from list/search output.
///
/// Noise lines are dropped and whitespace around `@` is collapsed before
/// matching. Order of appearance is preserved; callers de-duplicate and
/// sort.
pub fn parse_device_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || is_noise_line(&line.to_lowercase()) {
            continue;
        }

        let collapsed = AT_SPACING.replace_all(line, "@");
        for caps in CHIP_TOKEN.captures_iter(&collapsed) {
            tokens.push(caps[1].to_string());
        }
    }

    tokens
}

/// Keep only tokens whose name portion (before `@`) starts with `prefix`.
///
/// Letters match case-insensitively; any other character matches exactly.
/// This re-filter defends against minipro ignoring its own `-L` argument.
pub fn filter_by_prefix(tokens: &[String], prefix: char) -> Vec<String> {
    tokens
        .iter()
        .filter(|token| {
            let name = token.split('@').next().unwrap_or("");
            match name.chars().next() {
                Some(first) if prefix.is_ascii_alphabetic() => {
                    first.eq_ignore_ascii_case(&prefix)
                }
                Some(first) => first == prefix,
                None => false,
            }
        })
        .cloned()
        .collect()
}

const INFO_KEEP_PREFIXES: &[&str] = &[
    "device code:",
    "memory:",
    "package:",
    "protocol:",
    "read buffer",
    "write buffer",
];

/// Reduce raw `minipro -d` output to the recognized informational lines.
///
/// Original line order and text are preserved; noise lines are dropped.
pub fn shorten_chip_info(raw: &str) -> String {
    let mut kept = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let low = line.to_lowercase();
        if is_noise_line(&low) {
            continue;
        }
        if INFO_KEEP_PREFIXES.iter().any(|p| low.starts_with(p)) {
            kept.push(line);
        }
    }

    kept.join("\n").trim().to_string()
}

/// Extract a hardware identifier from read-ID (`-D`) output.
///
/// Prefers a line mentioning "chip id" or a standalone word "id" (text
/// after the first colon, or the whole line); falls back to the first
/// `0x` hex literal, then the first bare hex run of 8+ characters; empty
/// if nothing matched.
pub fn parse_chip_id(text: &str) -> String {
    for line in text.lines() {
        let line = line.trim();
        let low = line.to_lowercase();
        if low.contains("chip id") || ID_WORD.is_match(&low) {
            return match line.split_once(':') {
                Some((_, value)) => value.trim().to_string(),
                None => line.to_string(),
            };
        }
    }

    if let Some(m) = HEX_LITERAL.find(text) {
        return m.as_str().to_string();
    }

    if let Some(m) = HEX_RUN.find(text) {
        return m.as_str().to_string();
    }

    String::new()
}

/// Extract the detected chip token from SPI auto-detect (`-a`) output.
///
/// Prefers the first `NAME@PACKAGE` token anywhere; otherwise the trailing
/// text of a "detected:"/"found:" line; empty if nothing matched.
pub fn parse_autodetect_device(text: &str) -> String {
    if let Some(caps) = CHIP_TOKEN.captures(text) {
        return caps[1].trim().to_string();
    }

    if let Some(caps) = DETECTED_LINE.captures(text) {
        return caps[1].trim().to_string();
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_strict_line() {
        let out = "minipro version 0.7\nProgrammer: T56\nDevice database: ...";
        assert_eq!(parse_programmer_identity(out), "T56");
    }

    #[test]
    fn test_identity_found_fallback() {
        assert_eq!(parse_programmer_identity("Found T48\n"), "T48");
        assert_eq!(parse_programmer_identity("blah Found TL866II+ blah"), "TL866II+");
    }

    #[test]
    fn test_identity_covers_every_known_model() {
        for model in KNOWN_PROGRAMMERS {
            let strict = format!("Programmer: {}\n", model);
            assert_eq!(parse_programmer_identity(&strict), *model);

            let loose = format!("Found {} 01-2-3", model);
            assert_eq!(parse_programmer_identity(&loose), *model);
        }
    }

    #[test]
    fn test_identity_unknown() {
        assert_eq!(parse_programmer_identity("no programmer here"), "Unknown");
        assert_eq!(parse_programmer_identity(""), "Unknown");
    }

    #[test]
    fn test_tokens_collapse_at_spacing_and_drop_noise() {
        let out = "  AT28C256 @ DIP28 \nfound 2 device(s)";
        assert_eq!(parse_device_tokens(out), vec!["AT28C256@DIP28"]);
    }

    #[test]
    fn test_tokens_multiple_per_line() {
        let out = "AT28C256@DIP28 AT28C256@PLCC32\nW25Q64@SOIC8";
        assert_eq!(
            parse_device_tokens(out),
            vec!["AT28C256@DIP28", "AT28C256@PLCC32", "W25Q64@SOIC8"]
        );
    }

    #[test]
    fn test_tokens_skip_banner_and_usage() {
        let out = "minipro version 0.7     A free ...\nWarning: no ICSP\nUsage: minipro [options]\nAT29C010@PLCC32";
        assert_eq!(parse_device_tokens(out), vec!["AT29C010@PLCC32"]);
    }

    #[test]
    fn test_filter_by_prefix_letter_case_insensitive() {
        let tokens: Vec<String> = ["at28c256@DIP28", "AT29C010@PLCC32", "W25Q64@SOIC8"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let filtered = filter_by_prefix(&tokens, 'A');
        assert_eq!(filtered, vec!["at28c256@DIP28", "AT29C010@PLCC32"]);
    }

    #[test]
    fn test_filter_by_prefix_non_letter_exact() {
        let tokens: Vec<String> = ["27C512@DIP28", "2764@DIP28", "W25Q64@SOIC8"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(filter_by_prefix(&tokens, '2'), vec!["27C512@DIP28", "2764@DIP28"]);
        assert!(filter_by_prefix(&tokens, '9').is_empty());
    }

    #[test]
    fn test_short_info_keeps_recognized_lines_in_order() {
        let raw = "Device code: 0x1234\nMemory: 8192 bits\nUsage: foo";
        assert_eq!(shorten_chip_info(raw), "Device code: 0x1234\nMemory: 8192 bits");
    }

    #[test]
    fn test_short_info_buffer_lines() {
        let raw = "Name: AT28C256\nPackage: DIP28\nRead buffer size: 1024 Bytes\nWrite buffer size: 128 Bytes\nProtocol: 0x05";
        let short = shorten_chip_info(raw);
        assert_eq!(
            short,
            "Package: DIP28\nRead buffer size: 1024 Bytes\nWrite buffer size: 128 Bytes\nProtocol: 0x05"
        );
    }

    #[test]
    fn test_short_info_empty() {
        assert_eq!(shorten_chip_info(""), "");
        assert_eq!(shorten_chip_info("minipro version 0.7\nfound 1 device"), "");
    }

    #[test]
    fn test_chip_id_from_labeled_line() {
        let out = "Chip ID: 0xEF4017\nOK";
        assert_eq!(parse_chip_id(out), "0xEF4017");
    }

    #[test]
    fn test_chip_id_standalone_word_without_colon() {
        let out = "silicon id EF4017A1";
        assert_eq!(parse_chip_id(out), "silicon id EF4017A1");
    }

    #[test]
    fn test_chip_id_hex_literal_fallback() {
        assert_eq!(parse_chip_id("something 0xCAFE something"), "0xCAFE");
    }

    #[test]
    fn test_chip_id_bare_hex_run_fallback() {
        assert_eq!(parse_chip_id("raw deadbeef01"), "deadbeef01");
        // Shorter runs don't qualify
        assert_eq!(parse_chip_id("raw beef"), "");
    }

    #[test]
    fn test_autodetect_prefers_token() {
        let out = "Autodetecting device (ID:0xEF4017)\nW25Q64@SOIC8 detected";
        assert_eq!(parse_autodetect_device(out), "W25Q64@SOIC8");
    }

    #[test]
    fn test_autodetect_detected_line_fallback() {
        assert_eq!(parse_autodetect_device("Detected: W25Q64"), "W25Q64");
        assert_eq!(parse_autodetect_device("found: XM25QH64"), "XM25QH64");
    }

    #[test]
    fn test_autodetect_nothing() {
        assert_eq!(parse_autodetect_device("no spi device"), "");
    }
}
