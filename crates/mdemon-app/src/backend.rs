//! Operation orchestration
//!
//! [`Backend`] owns the resolved tool path, the shared [`DeviceCatalog`] and
//! the selection state, and runs every device operation on a blocking worker
//! (`tokio::task::spawn_blocking`). Progress and results flow through a
//! single unbounded event channel as [`BackendEvent`]s; operations never
//! return values directly.
//!
//! Every operation emits exactly one terminal [`BackendEvent::OperationFinished`],
//! including precondition failures that never reach a worker thread.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task;

use mdemon_core::parse::{parse_autodetect_device, parse_chip_id};
use mdemon_core::prelude::*;
use mdemon_core::{BackendEvent, ChipInfo, WriteOptions, UNKNOWN_PROGRAMMER};
use mdemon_daemon::catalog::DeviceCatalog;
use mdemon_daemon::commands::{MiniproCommand, Timeouts};
use mdemon_daemon::pty::{run_tty_stream, TtyOutput};
use mdemon_daemon::tool::{ensure_search_path, missing_tool_message, resolve_tool, tool_exists};

use crate::config::Settings;

/// Name of the scratch dump file used by [`Backend::read_to_tmp`].
const DUMP_FILENAME: &str = "dump.bin";

/// Mutable selection state shared between workers.
#[derive(Debug, Default)]
struct OperationState {
    current_chip: String,
    last_dump_path: Option<PathBuf>,
    last_chip_id: String,
}

/// Poison-tolerant lock: a panicked worker must not wedge the state.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Driver for minipro device operations.
///
/// Cheap to clone; clones share the catalog, the state, and the event
/// channel sender.
#[derive(Clone)]
pub struct Backend {
    minipro: PathBuf,
    timeouts: Timeouts,
    catalog: Arc<DeviceCatalog>,
    state: Arc<Mutex<OperationState>>,
    event_tx: mpsc::UnboundedSender<BackendEvent>,
}

impl Backend {
    /// Build a backend from user settings.
    ///
    /// Augments PATH with the common install directories, resolves the
    /// executable, applies configured timeout overrides, and announces the
    /// result on the event channel.
    pub fn new(settings: &Settings) -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        ensure_search_path();
        Self::with_tool_and_timeouts(
            resolve_tool(&settings.minipro_path),
            settings.timeouts.to_timeouts(),
        )
    }

    /// Build a backend around an already resolved executable path with
    /// default command budgets.
    pub fn with_tool(minipro: PathBuf) -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        Self::with_tool_and_timeouts(minipro, Timeouts::default())
    }

    /// Build a backend around a resolved path and explicit command budgets.
    pub fn with_tool_and_timeouts(
        minipro: PathBuf,
        timeouts: Timeouts,
    ) -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let backend = Self {
            catalog: Arc::new(DeviceCatalog::with_timeouts(minipro.clone(), timeouts)),
            minipro,
            timeouts,
            state: Arc::new(Mutex::new(OperationState::default())),
            event_tx,
        };

        backend.emit_log(format!("[init] minipro path: {}\n", backend.minipro.display()));
        backend.emit_log(format!(
            "[init] PATH: {}\n",
            std::env::var("PATH").unwrap_or_default()
        ));

        (backend, event_rx)
    }

    pub fn tool(&self) -> &Path {
        &self.minipro
    }

    pub fn catalog(&self) -> &Arc<DeviceCatalog> {
        &self.catalog
    }

    pub fn programmer(&self) -> String {
        self.catalog.programmer()
    }

    pub fn current_chip(&self) -> String {
        lock(&self.state).current_chip.clone()
    }

    pub fn last_chip_id(&self) -> String {
        lock(&self.state).last_chip_id.clone()
    }

    pub fn last_dump_path(&self) -> Option<PathBuf> {
        lock(&self.state).last_dump_path.clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event plumbing
    // ─────────────────────────────────────────────────────────────────────

    fn emit(&self, event: BackendEvent) {
        if self.event_tx.send(event).is_err() {
            warn!("event receiver dropped, discarding event");
        }
    }

    fn emit_log(&self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.emit(BackendEvent::Log(text));
        }
    }

    fn emit_finished(&self, ok: bool, message: impl Into<String>) {
        self.emit(BackendEvent::finished(ok, message));
    }

    /// Run a worker to completion. A panicked worker still produces a
    /// terminal event.
    async fn run_worker(&self, work: impl FnOnce() + Send + 'static) {
        if let Err(e) = task::spawn_blocking(work).await {
            error!("operation worker failed: {}", e);
            self.emit_finished(false, "internal worker failure");
        }
    }

    /// Run one minipro invocation, streaming its output as log events.
    fn run_streaming(&self, cmd: &MiniproCommand) -> Result<TtyOutput> {
        let tx = self.event_tx.clone();
        run_tty_stream(
            &self.minipro,
            &cmd.args(),
            cmd.timeout_with(&self.timeouts),
            move |chunk| {
                let _ = tx.send(BackendEvent::Log(chunk.to_string()));
            },
        )
    }

    fn tool_available(&self) -> bool {
        tool_exists(&self.minipro)
    }

    fn missing_message(&self) -> String {
        missing_tool_message(&self.minipro)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Catalog operations
    // ─────────────────────────────────────────────────────────────────────

    /// Re-probe the programmer and rebuild the device catalog.
    pub async fn reload(&self) {
        let this = self.clone();
        self.run_worker(move || {
            if !this.tool_available() {
                let msg = this.missing_message();
                this.emit_log(format!("[reload] failed: {}\n", msg));
                this.emit(BackendEvent::ProgrammerChanged(
                    UNKNOWN_PROGRAMMER.to_string(),
                ));
                this.emit_finished(false, msg);
                return;
            }

            this.emit_log("[reload] probing programmer via TTY ...\n");
            match this.catalog.reload() {
                Ok(programmer) => {
                    this.emit_log(format!("[detect] programmer: {}\n", programmer));
                    this.emit(BackendEvent::ProgrammerChanged(programmer.clone()));
                    this.emit_finished(true, format!("Programmer: {}", programmer));
                }
                Err(e) => {
                    this.emit_log(format!("[reload] failed: {}\n", e));
                    this.emit(BackendEvent::ProgrammerChanged(
                        UNKNOWN_PROGRAMMER.to_string(),
                    ));
                    this.emit_finished(false, format!("Reload failed: {}", e));
                }
            }
        })
        .await;
    }

    /// Select a chip (or clear the selection with an empty name) and refresh
    /// its compact info.
    pub async fn set_chip(&self, chip: &str) {
        let chip = chip.trim().to_string();
        let this = self.clone();
        self.run_worker(move || {
            this.select_chip_blocking(&chip);
            if chip.is_empty() {
                this.emit_finished(true, "Selection cleared");
            } else {
                this.emit_finished(true, format!("Selected {}", chip));
            }
        })
        .await;
    }

    /// Apply a selection without a terminal event, so operations that end
    /// with a selection can reuse it.
    fn select_chip_blocking(&self, chip: &str) {
        lock(&self.state).current_chip = chip.to_string();
        self.emit(BackendEvent::ChipChanged(chip.to_string()));

        if chip.is_empty() {
            lock(&self.state).last_chip_id.clear();
            self.emit(BackendEvent::ChipInfoChanged(String::new()));
        } else {
            let info = self.catalog.get_info(chip);
            self.refresh_compact_info(&info);
        }
    }

    /// Emit the compact info panel text for a chip: the device name, the
    /// hardware id when one has been read, and the salient raw info lines.
    fn refresh_compact_info(&self, info: &ChipInfo) {
        let mut lines = vec![format!("Device: {}", info.chip)];

        let chip_id = self.last_chip_id();
        if !chip_id.is_empty() {
            lines.push(format!("Chip ID: {}", chip_id));
        }

        let find_line = |prefixes: &[&str]| -> Option<String> {
            info.raw.lines().map(str::trim).find_map(|s| {
                let low = s.to_lowercase();
                prefixes
                    .iter()
                    .any(|p| low.starts_with(p))
                    .then(|| s.to_string())
            })
        };

        for found in [
            find_line(&["device code:"]),
            find_line(&["memory:"]),
            find_line(&["protocol:"]),
            find_line(&["read buffer"]),
            find_line(&["write buffer"]),
        ]
        .into_iter()
        .flatten()
        {
            lines.push(found);
        }

        if lines.len() <= 1 && !info.short.is_empty() {
            lines.push(info.short.clone());
        }

        self.emit(BackendEvent::ChipInfoChanged(
            lines.join("\n").trim().to_string(),
        ));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Identification operations
    // ─────────────────────────────────────────────────────────────────────

    /// Identify silicon: read the hardware id of the selected chip, or run
    /// SPI auto-detect when nothing is selected.
    pub async fn auto_detect(&self) {
        if self.current_chip().is_empty() {
            self.spi_auto_detect().await;
        } else {
            self.read_chip_id().await;
        }
    }

    /// Read the hardware identifier of the selected chip.
    pub async fn read_chip_id(&self) {
        let chip = self.current_chip();
        if chip.is_empty() {
            self.emit_finished(false, "Select IC first (required for Read ID)");
            return;
        }

        let this = self.clone();
        self.run_worker(move || {
            if !this.tool_available() {
                this.emit_finished(false, this.missing_message());
                return;
            }

            let cmd = MiniproCommand::ReadId { chip: chip.clone() };
            this.emit_log(format!("[op] read id: {} ...\n", cmd.describe()));

            match this.run_streaming(&cmd) {
                Ok(out) if out.success() => {
                    let parsed = parse_chip_id(&out.text);
                    let found = !parsed.is_empty();
                    lock(&this.state).last_chip_id = parsed;

                    let info = this.catalog.get_info(&chip);
                    this.refresh_compact_info(&info);

                    let msg = if found {
                        "Read ID finished"
                    } else {
                        "Read ID finished (not parsed)"
                    };
                    this.emit_finished(true, msg);
                }
                Ok(out) => {
                    this.emit_finished(false, format!("Read ID failed (rc={})", out.code));
                }
                Err(e) => {
                    this.emit_finished(false, format!("Read ID failed: {}", e));
                }
            }
        })
        .await;
    }

    /// Probe for SPI 25xx flash at 8-bit then 16-bit pin width; a detected
    /// device becomes the current selection.
    pub async fn spi_auto_detect(&self) {
        let this = self.clone();
        self.run_worker(move || {
            if !this.tool_available() {
                this.emit_finished(false, this.missing_message());
                return;
            }

            let mut device = this.autodetect_pass(8);
            if device.is_empty() {
                this.emit_log("\n");
                device = this.autodetect_pass(16);
            }

            if device.is_empty() {
                this.emit_log("\n[detect] SPI auto-detect found nothing.\n");
                this.emit_finished(
                    false,
                    "Auto-detect: only SPI 25xx is supported by minipro (-a 8/16). \
                     Select IC manually.",
                );
            } else {
                this.emit_log(format!("\n[detect] SPI device: {}\n", device));
                lock(&this.state).last_chip_id.clear();
                this.select_chip_blocking(&device);
                this.emit_finished(true, format!("Auto-detected SPI: {}", device));
            }
        })
        .await;
    }

    fn autodetect_pass(&self, width: u8) -> String {
        let cmd = MiniproCommand::AutoDetect { width };
        self.emit_log(format!("[op] spi auto-detect: {} ...\n", cmd.describe()));
        match self.run_streaming(&cmd) {
            Ok(out) if out.success() => parse_autodetect_device(&out.text),
            Ok(_) | Err(_) => String::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Flash operations
    // ─────────────────────────────────────────────────────────────────────

    /// Read the selected chip into a scratch file under the system temp
    /// directory; the path is remembered for later inspection.
    pub async fn read_to_tmp(&self) {
        let chip = self.current_chip();
        if chip.is_empty() {
            self.emit_finished(false, "No chip selected");
            return;
        }

        let this = self.clone();
        self.run_worker(move || {
            if !this.tool_available() {
                this.emit_finished(false, this.missing_message());
                return;
            }

            let out_path = std::env::temp_dir().join(DUMP_FILENAME);
            lock(&this.state).last_dump_path = Some(out_path.clone());
            this.emit_log(format!("[op] read -> {}\n", out_path.display()));

            let cmd = MiniproCommand::Read {
                chip,
                output: out_path.clone(),
            };
            match this.run_streaming(&cmd) {
                Ok(out) if out.success() && out_path.exists() => {
                    this.emit_finished(true, "Read OK");
                }
                Ok(out) => {
                    this.emit_finished(false, format!("Read failed (rc={})", out.code));
                }
                Err(e) => {
                    this.emit_finished(false, format!("Read failed: {}", e));
                }
            }
        })
        .await;
    }

    /// Write an image file to the selected chip.
    pub async fn write_chip(&self, input: PathBuf, options: WriteOptions) {
        let chip = self.current_chip();
        if chip.is_empty() {
            self.emit_finished(false, "No chip selected");
            return;
        }
        if !input.exists() {
            self.emit_finished(false, "Input file does not exist");
            return;
        }

        let this = self.clone();
        self.run_worker(move || {
            if !this.tool_available() {
                this.emit_finished(false, this.missing_message());
                return;
            }

            this.emit_log(format!("[op] write: {} -> {}\n", input.display(), chip));
            let cmd = MiniproCommand::Write {
                chip,
                input,
                options,
            };
            match this.run_streaming(&cmd) {
                Ok(out) if out.success() => this.emit_finished(true, "Write OK"),
                Ok(out) => {
                    this.emit_finished(false, format!("Write failed (rc={})", out.code));
                }
                Err(e) => this.emit_finished(false, format!("Write failed: {}", e)),
            }
        })
        .await;
    }

    /// Erase the selected chip.
    pub async fn erase_chip(&self) {
        self.simple_flash_op("erase", "Erase", |chip| MiniproCommand::Erase { chip })
            .await;
    }

    /// Check that the selected chip is blank.
    pub async fn blank_check(&self) {
        self.simple_flash_op("blank_check", "Blank Check", |chip| {
            MiniproCommand::BlankCheck { chip }
        })
        .await;
    }

    /// Shared shape of erase and blank check: chip-only command, pass/fail
    /// by exit code.
    async fn simple_flash_op(
        &self,
        log_name: &'static str,
        label: &'static str,
        make: impl FnOnce(String) -> MiniproCommand + Send + 'static,
    ) {
        let chip = self.current_chip();
        if chip.is_empty() {
            self.emit_finished(false, "No chip selected");
            return;
        }

        let this = self.clone();
        self.run_worker(move || {
            if !this.tool_available() {
                this.emit_finished(false, this.missing_message());
                return;
            }

            this.emit_log(format!("[op] {}: {}\n", log_name, chip));
            let cmd = make(chip);
            match this.run_streaming(&cmd) {
                Ok(out) if out.success() => {
                    this.emit_finished(true, format!("{} OK", label));
                }
                Ok(out) => {
                    this.emit_finished(false, format!("{} failed (rc={})", label, out.code));
                }
                Err(e) => this.emit_finished(false, format!("{} failed: {}", label, e)),
            }
        })
        .await;
    }

    /// Flash a firmware image to the programmer itself.
    pub async fn update_firmware(&self, input: PathBuf) {
        if !input.exists() {
            self.emit_finished(false, "update.dat not found");
            return;
        }

        let this = self.clone();
        self.run_worker(move || {
            if !this.tool_available() {
                this.emit_finished(false, this.missing_message());
                return;
            }

            this.emit_log(format!("[op] firmware update: {}\n", input.display()));
            let cmd = MiniproCommand::FirmwareUpdate { input };
            match this.run_streaming(&cmd) {
                Ok(out) if out.success() => {
                    this.emit_finished(true, "Firmware update OK");
                }
                Ok(out) => {
                    this.emit_finished(false, format!("Firmware update failed (rc={})", out.code));
                }
                Err(e) => {
                    this.emit_finished(false, format!("Firmware update failed: {}", e));
                }
            }
        })
        .await;
    }
}
