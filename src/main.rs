//! minipro-demon - drive TL866/T48/T56 programmers through the minipro CLI
//!
//! This is the binary entry point. All logic lives in the workspace crates.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use tokio::sync::mpsc;
use tokio::task;

use mdemon_app::{load_settings, Backend};
use mdemon_core::{BackendEvent, WriteOptions};

/// Drive TL866/T48/T56 device programmers through the minipro CLI
#[derive(Parser, Debug)]
#[command(name = "mdemon")]
#[command(about = "Drive TL866/T48/T56 device programmers through the minipro CLI", long_about = None)]
struct Args {
    /// Path or name of the minipro executable (overrides config)
    #[arg(long, value_name = "PATH")]
    minipro: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Probe the attached programmer
    Probe,
    /// Show device name prefixes with at least one supported chip
    Prefixes,
    /// List supported chips by leading character
    List {
        /// Prefix character
        prefix: String,
    },
    /// Search supported chips by free text
    Search {
        /// Search text
        query: String,
    },
    /// Show info for one chip
    Info {
        /// Chip name, e.g. AT28C256@DIP28
        chip: String,
    },
    /// Auto-detect an SPI 25xx flash chip
    Detect,
    /// Read the hardware id of a chip
    ReadId {
        /// Chip name
        chip: String,
    },
    /// Read chip contents into a scratch dump file
    Read {
        /// Chip name
        chip: String,
    },
    /// Write an image file to a chip
    Write {
        /// Chip name
        chip: String,
        /// Image file to write
        input: PathBuf,
        /// Skip the erase cycle before writing
        #[arg(long)]
        no_erase: bool,
        /// Skip verification after writing
        #[arg(long)]
        no_verify: bool,
    },
    /// Erase a chip
    Erase {
        /// Chip name
        chip: String,
    },
    /// Check that a chip is blank
    Blank {
        /// Chip name
        chip: String,
    },
    /// Update the programmer firmware from an update.dat file
    Firmware {
        /// Firmware image (update.dat)
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    mdemon_core::logging::init()?;

    let args = Args::parse();
    let mut settings = load_settings();
    if let Some(minipro) = args.minipro {
        settings.minipro_path = minipro;
    }

    let (backend, mut rx) = Backend::new(&settings);

    match args.command {
        Cmd::Probe => {
            backend.reload().await;
            finish(drive(&mut rx).await)?;
        }
        Cmd::Prefixes => {
            let catalog = backend.catalog().clone();
            let prefixes = task::spawn_blocking(move || catalog.compute_prefixes()).await?;
            for p in prefixes {
                println!("{}", p);
            }
        }
        Cmd::List { prefix } => {
            let catalog = backend.catalog().clone();
            let chips = task::spawn_blocking(move || catalog.list_by_prefix(&prefix)).await?;
            for chip in chips {
                println!("{}", chip);
            }
        }
        Cmd::Search { query } => {
            let catalog = backend.catalog().clone();
            let chips = task::spawn_blocking(move || catalog.search(&query)).await?;
            for chip in chips {
                println!("{}", chip);
            }
        }
        Cmd::Info { chip } => {
            let catalog = backend.catalog().clone();
            let info = task::spawn_blocking(move || catalog.get_info(&chip)).await?;
            if info.raw.is_empty() {
                return Err(eyre!("no info available for {}", info.chip));
            }
            println!("{}", info.raw);
        }
        Cmd::Detect => {
            backend.spi_auto_detect().await;
            finish(drive(&mut rx).await)?;
        }
        Cmd::ReadId { chip } => {
            select(&backend, &mut rx, &chip).await?;
            backend.read_chip_id().await;
            finish(drive(&mut rx).await)?;
            println!("{}", backend.last_chip_id());
        }
        Cmd::Read { chip } => {
            select(&backend, &mut rx, &chip).await?;
            backend.read_to_tmp().await;
            finish(drive(&mut rx).await)?;
            if let Some(path) = backend.last_dump_path() {
                println!("{}", path.display());
            }
        }
        Cmd::Write {
            chip,
            input,
            no_erase,
            no_verify,
        } => {
            select(&backend, &mut rx, &chip).await?;
            let options = WriteOptions {
                erase_before_write: !no_erase,
                skip_verification: no_verify,
            };
            backend.write_chip(input, options).await;
            finish(drive(&mut rx).await)?;
        }
        Cmd::Erase { chip } => {
            select(&backend, &mut rx, &chip).await?;
            backend.erase_chip().await;
            finish(drive(&mut rx).await)?;
        }
        Cmd::Blank { chip } => {
            select(&backend, &mut rx, &chip).await?;
            backend.blank_check().await;
            finish(drive(&mut rx).await)?;
        }
        Cmd::Firmware { input } => {
            backend.update_firmware(input).await;
            finish(drive(&mut rx).await)?;
        }
    }

    Ok(())
}

/// Select a chip before a device operation, consuming its events.
async fn select(
    backend: &Backend,
    rx: &mut mpsc::UnboundedReceiver<BackendEvent>,
    chip: &str,
) -> color_eyre::Result<()> {
    backend.set_chip(chip).await;
    finish(drive(rx).await)
}

/// Consume events up to and including the next terminal one, streaming tool
/// output to stdout as it arrives.
async fn drive(rx: &mut mpsc::UnboundedReceiver<BackendEvent>) -> (bool, String) {
    use std::io::Write;

    while let Some(event) = rx.recv().await {
        match event {
            BackendEvent::Log(text) => {
                print!("{}", text);
                std::io::stdout().flush().ok();
            }
            BackendEvent::OperationFinished { ok, message } => return (ok, message),
            BackendEvent::ProgrammerChanged(_)
            | BackendEvent::ChipChanged(_)
            | BackendEvent::ChipInfoChanged(_) => {}
        }
    }
    (false, "event channel closed".to_string())
}

fn finish((ok, message): (bool, String)) -> color_eyre::Result<()> {
    if ok {
        println!("{}", message);
        Ok(())
    } else {
        Err(eyre!(message))
    }
}
