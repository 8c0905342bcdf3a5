//! Reader selection and output helpers

use anyhow::{Context, bail};
use colored::Colorize;
use yubikit_core::Transport;
use yubikit_management::{Capability, DeviceInfo};
use yubikit_pcsc::{PcscDeviceManager, PcscReader};

/// Find the reader to use: by name when given, otherwise the first YubiKey
/// reader with a card, otherwise any reader with a card
pub(crate) fn find_reader(
    manager: &PcscDeviceManager,
    reader_name: Option<&str>,
) -> anyhow::Result<PcscReader> {
    let readers = manager.list_readers()?;

    if let Some(name) = reader_name {
        return readers
            .into_iter()
            .find(|r| r.name() == name)
            .with_context(|| format!("Reader '{name}' not found"));
    }

    let mut with_card: Vec<_> = readers.into_iter().filter(PcscReader::has_card).collect();
    if with_card.is_empty() {
        bail!("No card found in any reader!");
    }
    let index = with_card
        .iter()
        .position(|r| r.name().to_lowercase().contains("yubico"))
        .unwrap_or(0);
    Ok(with_card.swap_remove(index))
}

fn capability_line(label: &str, supported: Capability, enabled: Option<Capability>) -> String {
    let names = [
        (Capability::OTP, "OTP"),
        (Capability::U2F, "FIDO U2F"),
        (Capability::FIDO2, "FIDO2"),
        (Capability::OATH, "OATH"),
        (Capability::PIV, "PIV"),
        (Capability::OPENPGP, "OpenPGP"),
    ];
    let entries: Vec<String> = names
        .iter()
        .filter(|(capability, _)| supported.contains(*capability))
        .map(|(capability, name)| match enabled {
            Some(enabled) if !enabled.contains(*capability) => name.dimmed().to_string(),
            _ => name.green().to_string(),
        })
        .collect();
    format!("  {label:<14}{}", entries.join(", "))
}

/// Print device information
pub(crate) fn print_device_info(info: &DeviceInfo) {
    println!("{}", "Device information".bold());
    println!("  {:<14}{}", "Form factor:", info.form_factor());
    println!("  {:<14}{}", "Firmware:", info.version());
    match info.serial() {
        Some(serial) => println!("  {:<14}{serial}", "Serial:"),
        None => println!("  {:<14}{}", "Serial:", "unavailable".dimmed()),
    }
    if info.is_fips() {
        println!("  {:<14}{}", "Model:", "FIPS".yellow());
    }
    if info.is_sky() {
        println!("  {:<14}{}", "Model:", "Security Key".yellow());
    }
    if info.is_locked() {
        println!("  {:<14}{}", "Config:", "locked".red());
    }

    for (transport, label) in [(Transport::Usb, "USB:"), (Transport::Nfc, "NFC:")] {
        if let Some(supported) = info.supported_capabilities(transport) {
            let enabled = info.config().enabled_capabilities(transport);
            println!("{}", capability_line(label, supported, enabled));
        }
    }
    if let Some(timeout) = info.config().auto_eject_timeout() {
        println!("  {:<14}{timeout}s", "Auto-eject:");
    }
    if let Some(timeout) = info.config().challenge_response_timeout() {
        println!("  {:<14}{timeout}s", "Touch timeout:");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_line_lists_supported() {
        colored::control::set_override(false);
        let line = capability_line(
            "USB:",
            Capability::OTP | Capability::PIV,
            Some(Capability::OTP),
        );
        assert_eq!(line, "  USB:          OTP, PIV");
    }
}
