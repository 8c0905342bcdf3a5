use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use yubikit_management::Mode;
use yubikit_pcsc::{PcscConfig, PcscDeviceManager};

mod commands;
mod utils;

use commands::*;

#[derive(Parser)]
#[command(version, about = "Inspect and configure YubiKeys over PC/SC")]
struct Cli {
    /// Optional reader name to use (will auto-detect if not specified)
    #[arg(short, long)]
    reader: Option<String>,

    /// Trace level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    List,

    /// Show device information
    Info,

    /// Set the enabled USB interfaces
    Mode {
        /// Interfaces joined by '+', e.g. otp+fido+ccid
        #[arg(required = true)]
        mode: Mode,

        /// Challenge-response touch timeout in seconds
        #[arg(long, default_value_t = 0)]
        chalresp_timeout: u8,

        /// CCID auto-eject timeout in seconds
        #[arg(long, default_value_t = 0)]
        autoeject_timeout: u16,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let manager = PcscDeviceManager::new()?;

    if let Commands::List = cli.command {
        return list_command(&manager);
    }

    let reader = utils::find_reader(&manager, cli.reader.as_deref())?;
    info!("Using reader: {}", reader.name());
    let transport = manager.open_reader_with_config(reader.name(), PcscConfig::default())?;

    match cli.command {
        Commands::List => Ok(()),
        Commands::Info => info_command(transport),
        Commands::Mode {
            mode,
            chalresp_timeout,
            autoeject_timeout,
        } => mode_command(transport, mode, chalresp_timeout, autoeject_timeout),
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();
}
