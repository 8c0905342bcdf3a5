//! Command implementations

use anyhow::Context;
use colored::Colorize;
use tracing::debug;
use yubikit_management::{DeviceConnection, ManagementSession, Mode};
use yubikit_pcsc::{PcscDeviceManager, PcscTransport};

use crate::utils;

/// List all available readers
pub(crate) fn list_command(manager: &PcscDeviceManager) -> anyhow::Result<()> {
    let readers = manager.list_readers()?;

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = if reader.has_card() {
            "card present".green()
        } else {
            "no card".dimmed()
        };
        println!(
            "{}. {} [{}] ({})",
            i + 1,
            reader.name(),
            reader.transport(),
            status
        );
    }

    Ok(())
}

fn open_session(transport: PcscTransport) -> anyhow::Result<ManagementSession> {
    ManagementSession::open(DeviceConnection::smart_card(transport))
        .context("Failed to open management session")
}

/// Print device information
pub(crate) fn info_command(transport: PcscTransport) -> anyhow::Result<()> {
    let mut session = open_session(transport)?;

    match session.get_device_info() {
        Ok(info) => utils::print_device_info(&info),
        Err(e) if e.is_unsupported() => {
            debug!(error = %e, "Device info not available");
            println!("{}", "Device information".bold());
            println!("  {:<14}{}", "Firmware:", session.version());
            println!("  {}", "Further details are not readable on this firmware".dimmed());
        }
        Err(e) => return Err(e).context("Failed to read device info"),
    }

    session.close()?;
    Ok(())
}

/// Switch the enabled USB interfaces
pub(crate) fn mode_command(
    transport: PcscTransport,
    mode: Mode,
    chalresp_timeout: u8,
    autoeject_timeout: u16,
) -> anyhow::Result<()> {
    let mut session = open_session(transport)?;
    session
        .set_mode(mode, chalresp_timeout, autoeject_timeout)
        .with_context(|| format!("Failed to set mode {mode}"))?;
    session.close()?;

    println!("USB mode set to {}", mode.to_string().green());
    println!("Remove and re-insert the YubiKey for the change to take effect.");
    Ok(())
}
