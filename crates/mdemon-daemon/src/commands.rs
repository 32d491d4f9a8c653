//! minipro command construction
//!
//! One enum variant per tool invocation the system issues, with the
//! argument list and the timeout class appropriate to it. Flash operations
//! are slow on large parts, hence the generous budgets.

use std::path::PathBuf;
use std::time::Duration;

use mdemon_core::WriteOptions;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const INFO_TIMEOUT: Duration = Duration::from_secs(20);
const LIST_TIMEOUT: Duration = Duration::from_secs(30);
const READ_ID_TIMEOUT: Duration = Duration::from_secs(60);
const AUTODETECT_TIMEOUT: Duration = Duration::from_secs(90);
const FLASH_TIMEOUT: Duration = Duration::from_secs(600);
const LONG_FLASH_TIMEOUT: Duration = Duration::from_secs(1200);

/// Wall-clock budget per command class.
///
/// Defaults suit real hardware; configuration can override any class
/// individually (large EPROMs can exceed the stock flash budgets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub probe: Duration,
    pub info: Duration,
    pub list: Duration,
    pub read_id: Duration,
    pub autodetect: Duration,
    pub flash: Duration,
    pub long_flash: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: PROBE_TIMEOUT,
            info: INFO_TIMEOUT,
            list: LIST_TIMEOUT,
            read_id: READ_ID_TIMEOUT,
            autodetect: AUTODETECT_TIMEOUT,
            flash: FLASH_TIMEOUT,
            long_flash: LONG_FLASH_TIMEOUT,
        }
    }
}

/// A single minipro invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiniproCommand {
    /// `-k`: programmer capability/identity probe.
    Probe,
    /// `-L <query>`: list devices by prefix character or free text.
    List { query: String },
    /// `-d <chip>`: per-device info query.
    Info { chip: String },
    /// `-p <chip> -D`: read the hardware identifier.
    ReadId { chip: String },
    /// `-a <width>`: SPI 25xx auto-detect at 8 or 16 bit width.
    AutoDetect { width: u8 },
    /// `-p <chip> -r <path>`: read chip contents into a file.
    Read { chip: String, output: PathBuf },
    /// `-p <chip> -w <path>`: write a file to the chip.
    Write {
        chip: String,
        input: PathBuf,
        options: WriteOptions,
    },
    /// `-p <chip> -E`: erase.
    Erase { chip: String },
    /// `-p <chip> -b`: blank check.
    BlankCheck { chip: String },
    /// `-F <path>`: programmer firmware update.
    FirmwareUpdate { input: PathBuf },
}

impl MiniproCommand {
    /// Argument list for this invocation.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Probe => vec!["-k".into()],
            Self::List { query } => vec!["-L".into(), query.clone()],
            Self::Info { chip } => vec!["-d".into(), chip.clone()],
            Self::ReadId { chip } => vec!["-p".into(), chip.clone(), "-D".into()],
            Self::AutoDetect { width } => vec!["-a".into(), width.to_string()],
            Self::Read { chip, output } => vec![
                "-p".into(),
                chip.clone(),
                "-r".into(),
                output.display().to_string(),
            ],
            Self::Write {
                chip,
                input,
                options,
            } => {
                let mut args = vec![
                    "-p".into(),
                    chip.clone(),
                    "-w".into(),
                    input.display().to_string(),
                ];
                if !options.erase_before_write {
                    args.push("-e".into());
                }
                if options.skip_verification {
                    args.push("-v".into());
                }
                args
            }
            Self::Erase { chip } => vec!["-p".into(), chip.clone(), "-E".into()],
            Self::BlankCheck { chip } => vec!["-p".into(), chip.clone(), "-b".into()],
            Self::FirmwareUpdate { input } => {
                vec!["-F".into(), input.display().to_string()]
            }
        }
    }

    /// Default wall-clock budget for this invocation.
    pub fn timeout(&self) -> Duration {
        self.timeout_with(&Timeouts::default())
    }

    /// Wall-clock budget for this invocation under the given budgets.
    pub fn timeout_with(&self, timeouts: &Timeouts) -> Duration {
        match self {
            Self::Probe => timeouts.probe,
            Self::Info { .. } => timeouts.info,
            Self::List { .. } => timeouts.list,
            Self::ReadId { .. } => timeouts.read_id,
            Self::AutoDetect { .. } => timeouts.autodetect,
            Self::Read { .. } | Self::Erase { .. } | Self::BlankCheck { .. } => timeouts.flash,
            Self::Write { .. } | Self::FirmwareUpdate { .. } => timeouts.long_flash,
        }
    }

    /// Short description for log and error messages.
    pub fn describe(&self) -> String {
        format!("minipro {}", self.args().join(" "))
    }
}
