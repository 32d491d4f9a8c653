//! Configuration file parsing for minipro-demon
//!
//! Reads `config.toml` from the user config directory
//! (`~/.config/minipro-demon/` on Linux). Missing or unparsable files fall
//! back to defaults; configuration is never a hard failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mdemon_core::prelude::*;
use mdemon_daemon::Timeouts;

const CONFIG_DIR: &str = "minipro-demon";
const CONFIG_FILENAME: &str = "config.toml";

/// User-facing settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Explicit path or name of the minipro executable. Empty means
    /// "resolve from PATH".
    pub minipro_path: String,

    /// Per-class command timeout overrides, in seconds.
    pub timeouts: TimeoutSettings,
}

/// Optional per-class timeout overrides from `[timeouts]` in the config
/// file. Unset classes keep their built-in budgets.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub probe_secs: Option<u64>,
    pub info_secs: Option<u64>,
    pub list_secs: Option<u64>,
    pub read_id_secs: Option<u64>,
    pub autodetect_secs: Option<u64>,
    pub flash_secs: Option<u64>,
    pub long_flash_secs: Option<u64>,
}

impl TimeoutSettings {
    /// Apply the configured overrides on top of the default budgets.
    pub fn to_timeouts(&self) -> Timeouts {
        let mut t = Timeouts::default();
        if let Some(s) = self.probe_secs {
            t.probe = Duration::from_secs(s);
        }
        if let Some(s) = self.info_secs {
            t.info = Duration::from_secs(s);
        }
        if let Some(s) = self.list_secs {
            t.list = Duration::from_secs(s);
        }
        if let Some(s) = self.read_id_secs {
            t.read_id = Duration::from_secs(s);
        }
        if let Some(s) = self.autodetect_secs {
            t.autodetect = Duration::from_secs(s);
        }
        if let Some(s) = self.flash_secs {
            t.flash = Duration::from_secs(s);
        }
        if let Some(s) = self.long_flash_secs {
            t.long_flash = Duration::from_secs(s);
        }
        t
    }
}

/// Path of the user config file, if a config directory exists.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILENAME))
}

/// Load settings from the user config directory.
///
/// Returns defaults if the file doesn't exist or can't be parsed.
pub fn load_settings() -> Settings {
    match config_file_path() {
        Some(path) => load_settings_from(&path),
        None => {
            debug!("no config directory available, using defaults");
            Settings::default()
        }
    }
}

/// Load settings from an explicit file path.
pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        debug!("no config file at {:?}, using defaults", path);
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("failed to parse {:?}: {}", path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_settings_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        let settings = load_settings_from(&temp.path().join("config.toml"));
        assert!(settings.minipro_path.is_empty());
    }

    #[test]
    fn test_load_settings_custom_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "minipro_path = \"/opt/tools/minipro\"\n").unwrap();

        let settings = load_settings_from(&path);
        assert_eq!(settings.minipro_path, "/opt/tools/minipro");
    }

    #[test]
    fn test_load_settings_invalid_toml_falls_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "minipro_path = [not toml").unwrap();

        let settings = load_settings_from(&path);
        assert!(settings.minipro_path.is_empty());
    }

    #[test]
    fn test_timeout_overrides_parse_and_apply() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "minipro_path = \"minipro\"\n\n[timeouts]\nflash_secs = 1800\nprobe_secs = 5\n",
        )
        .unwrap();

        let settings = load_settings_from(&path);
        let timeouts = settings.timeouts.to_timeouts();
        assert_eq!(timeouts.flash, Duration::from_secs(1800));
        assert_eq!(timeouts.probe, Duration::from_secs(5));
        // Unset classes keep the defaults.
        assert_eq!(timeouts.read_id, Timeouts::default().read_id);
    }

    #[test]
    fn test_timeouts_default_when_section_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "minipro_path = \"minipro\"\n").unwrap();

        let settings = load_settings_from(&path);
        assert_eq!(settings.timeouts.to_timeouts(), Timeouts::default());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "minipro_path = \"minipro\"\nfuture_option = true\n",
        )
        .unwrap();

        let settings = load_settings_from(&path);
        assert_eq!(settings.minipro_path, "minipro");
    }
}
