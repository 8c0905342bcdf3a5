//! Device information and configuration records
//!
//! Both are exchanged as a length-prefixed block of TLVs. The same block
//! format is used by all three backends.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use yubikit_core::{Error, Result, TlvMap, Transport, Version};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::capability::Capability;

/// Configuration TLV tags
pub mod tag {
    /// Applications supported over USB
    pub const USB_SUPPORTED: u32 = 0x01;
    /// Serial number
    pub const SERIAL: u32 = 0x02;
    /// Applications enabled over USB
    pub const USB_ENABLED: u32 = 0x03;
    /// Form factor and FIPS/Sky bits
    pub const FORM_FACTOR: u32 = 0x04;
    /// Firmware version
    pub const VERSION: u32 = 0x05;
    /// CCID auto-eject timeout in seconds
    pub const AUTO_EJECT_TIMEOUT: u32 = 0x06;
    /// Challenge-response touch timeout in seconds
    pub const CHALRESP_TIMEOUT: u32 = 0x07;
    /// Device flags
    pub const DEVICE_FLAGS: u32 = 0x08;
    /// Configuration lock state (read) or new lock code (write)
    pub const CONFIG_LOCK: u32 = 0x0A;
    /// Current lock code
    pub const UNLOCK: u32 = 0x0B;
    /// Reboot after applying the configuration
    pub const REBOOT: u32 = 0x0C;
    /// Applications supported over NFC
    pub const NFC_SUPPORTED: u32 = 0x0D;
    /// Applications enabled over NFC
    pub const NFC_ENABLED: u32 = 0x0E;
}

/// Device flag: remote wakeup
pub const FLAG_REMOTE_WAKEUP: u8 = 0x40;
/// Device flag: CCID eject on touch
pub const FLAG_EJECT: u8 = 0x80;

const FORM_FACTOR_FIPS: u8 = 0x80;
const FORM_FACTOR_SKY: u8 = 0x40;

const LOCK_CODE_SIZE: usize = 16;
const MAX_CONFIG_SIZE: usize = 0xFF;

/// Physical form of the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
pub enum FormFactor {
    /// Not reported
    #[default]
    #[display("Unknown")]
    Unknown,
    /// USB-A keychain
    #[display("Keychain (USB-A)")]
    UsbAKeychain,
    /// USB-A nano
    #[display("Nano (USB-A)")]
    UsbANano,
    /// USB-C keychain
    #[display("Keychain (USB-C)")]
    UsbCKeychain,
    /// USB-C nano
    #[display("Nano (USB-C)")]
    UsbCNano,
    /// USB-C and Lightning
    #[display("Keychain (USB-C, Lightning)")]
    UsbCLightning,
}

impl FormFactor {
    /// Form factor from the low nibble of the FORM_FACTOR value
    pub const fn from_code(code: u8) -> Self {
        match code & 0x0F {
            1 => Self::UsbAKeychain,
            2 => Self::UsbANano,
            3 => Self::UsbCKeychain,
            4 => Self::UsbCNano,
            5 => Self::UsbCLightning,
            _ => Self::Unknown,
        }
    }

    /// Device code
    pub const fn code(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::UsbAKeychain => 1,
            Self::UsbANano => 2,
            Self::UsbCKeychain => 3,
            Self::UsbCNano => 4,
            Self::UsbCLightning => 5,
        }
    }
}

/// 16 byte configuration lock code
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct LockCode([u8; LOCK_CODE_SIZE]);

impl LockCode {
    /// Wrap a lock code
    pub const fn new(code: [u8; LOCK_CODE_SIZE]) -> Self {
        Self(code)
    }

    /// Parse a lock code from 32 hex digits
    pub fn from_hex(text: &str) -> Result<Self> {
        let mut code = [0u8; LOCK_CODE_SIZE];
        hex::decode_to_slice(text, &mut code)
            .map_err(|_| Error::InvalidArgument("Lock code must be 32 hex digits".into()))?;
        Ok(Self(code))
    }

    /// Raw code bytes
    pub const fn as_bytes(&self) -> &[u8; LOCK_CODE_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for LockCode {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let code = <[u8; LOCK_CODE_SIZE]>::try_from(bytes).map_err(|_| {
            Error::InvalidArgument(format!(
                "Lock code must be {LOCK_CODE_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(code))
    }
}

impl fmt::Debug for LockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LockCode(..)")
    }
}

/// Mutable device settings; only fields that are set are written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    enabled_capabilities: HashMap<Transport, Capability>,
    auto_eject_timeout: Option<u16>,
    challenge_response_timeout: Option<u8>,
    device_flags: Option<u8>,
}

impl DeviceConfig {
    /// Start building a configuration
    pub fn builder() -> DeviceConfigBuilder {
        DeviceConfigBuilder::default()
    }

    /// Applications enabled over `transport`
    pub fn enabled_capabilities(&self, transport: Transport) -> Option<Capability> {
        self.enabled_capabilities.get(&transport).copied()
    }

    /// CCID auto-eject timeout in seconds
    pub const fn auto_eject_timeout(&self) -> Option<u16> {
        self.auto_eject_timeout
    }

    /// Challenge-response touch timeout in seconds
    pub const fn challenge_response_timeout(&self) -> Option<u8> {
        self.challenge_response_timeout
    }

    /// Device flags
    pub const fn device_flags(&self) -> Option<u8> {
        self.device_flags
    }

    /// Serialize for a write-config command
    ///
    /// Lock codes, when given, must be 16 bytes. The result is the TLV
    /// block prefixed with its one byte length.
    pub fn to_bytes(
        &self,
        reboot: bool,
        current_lock_code: Option<&LockCode>,
        new_lock_code: Option<&LockCode>,
    ) -> Result<Bytes> {
        let mut values = TlvMap::new();
        if reboot {
            values.insert(tag::REBOOT, Bytes::new());
        }
        if let Some(code) = current_lock_code {
            values.insert(tag::UNLOCK, code.as_bytes().to_vec());
        }
        if let Some(usb) = self.enabled_capabilities(Transport::Usb) {
            values.insert(tag::USB_ENABLED, usb.bits().to_be_bytes().to_vec());
        }
        if let Some(nfc) = self.enabled_capabilities(Transport::Nfc) {
            values.insert(tag::NFC_ENABLED, nfc.bits().to_be_bytes().to_vec());
        }
        if let Some(timeout) = self.auto_eject_timeout {
            values.insert(tag::AUTO_EJECT_TIMEOUT, timeout.to_be_bytes().to_vec());
        }
        if let Some(timeout) = self.challenge_response_timeout {
            values.insert(tag::CHALRESP_TIMEOUT, vec![timeout]);
        }
        if let Some(flags) = self.device_flags {
            values.insert(tag::DEVICE_FLAGS, vec![flags]);
        }
        if let Some(code) = new_lock_code {
            values.insert(tag::CONFIG_LOCK, code.as_bytes().to_vec());
        }

        let data = values.encode();
        if data.len() > MAX_CONFIG_SIZE {
            return Err(Error::InvalidArgument(format!(
                "Device configuration too large: {} bytes",
                data.len()
            )));
        }
        let mut block = Vec::with_capacity(data.len() + 1);
        block.push(data.len() as u8);
        block.extend_from_slice(&data);
        Ok(block.into())
    }
}

/// Builder for [`DeviceConfig`]
#[derive(Debug, Clone, Default)]
pub struct DeviceConfigBuilder {
    config: DeviceConfig,
}

impl DeviceConfigBuilder {
    /// Applications to enable over `transport`
    pub fn enabled_capabilities(mut self, transport: Transport, capabilities: Capability) -> Self {
        self.config
            .enabled_capabilities
            .insert(transport, capabilities);
        self
    }

    /// CCID auto-eject timeout in seconds
    pub const fn auto_eject_timeout(mut self, seconds: u16) -> Self {
        self.config.auto_eject_timeout = Some(seconds);
        self
    }

    /// Challenge-response touch timeout in seconds
    pub const fn challenge_response_timeout(mut self, seconds: u8) -> Self {
        self.config.challenge_response_timeout = Some(seconds);
        self
    }

    /// Device flags
    pub const fn device_flags(mut self, flags: u8) -> Self {
        self.config.device_flags = Some(flags);
        self
    }

    /// Finish
    pub fn build(self) -> DeviceConfig {
        self.config
    }
}

/// Identity and configuration reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    config: DeviceConfig,
    serial: Option<u32>,
    version: Version,
    form_factor: FormFactor,
    supported_capabilities: HashMap<Transport, Capability>,
    is_locked: bool,
    is_fips: bool,
    is_sky: bool,
}

impl DeviceInfo {
    /// Parse a read-config response
    ///
    /// `default_version` is used when the block carries no VERSION tag.
    pub fn parse(response: &[u8], default_version: Version) -> Result<Self> {
        let (&length, body) = response
            .split_first()
            .ok_or_else(|| Error::invalid_response("Empty device info"))?;
        if usize::from(length) != body.len() {
            return Err(Error::invalid_response(format!(
                "Invalid device info length: {length}, have {} bytes",
                body.len()
            )));
        }
        let data = TlvMap::decode(body)?;
        let read = |tag| read_int(data.get(tag).map(|value| &value[..]));

        let form_factor_code = read(tag::FORM_FACTOR) as u8;
        let version = match data.get(tag::VERSION) {
            Some(value) => Version::from_bytes(value)?,
            None => default_version,
        };

        let mut supported_capabilities = HashMap::new();
        let mut enabled_capabilities = HashMap::new();
        if version == Version::new(4, 2, 4) {
            // 4.2.4 reports USB_SUPPORTED incorrectly
            supported_capabilities.insert(Transport::Usb, Capability::from_bits(0x3F));
        } else {
            supported_capabilities.insert(
                Transport::Usb,
                Capability::from_bits(read(tag::USB_SUPPORTED) as u16),
            );
        }
        // YubiKey 4 reports USB_ENABLED incorrectly
        if data.contains(tag::USB_ENABLED) && version.major != 4 {
            enabled_capabilities.insert(
                Transport::Usb,
                Capability::from_bits(read(tag::USB_ENABLED) as u16),
            );
        }
        if data.contains(tag::NFC_SUPPORTED) {
            supported_capabilities.insert(
                Transport::Nfc,
                Capability::from_bits(read(tag::NFC_SUPPORTED) as u16),
            );
            enabled_capabilities.insert(
                Transport::Nfc,
                Capability::from_bits(read(tag::NFC_ENABLED) as u16),
            );
        }

        let serial = read(tag::SERIAL);
        Ok(Self {
            config: DeviceConfig {
                enabled_capabilities,
                auto_eject_timeout: Some(read(tag::AUTO_EJECT_TIMEOUT) as u16),
                challenge_response_timeout: Some(read(tag::CHALRESP_TIMEOUT) as u8),
                device_flags: Some(read(tag::DEVICE_FLAGS) as u8),
            },
            serial: (serial != 0).then_some(serial),
            version,
            form_factor: FormFactor::from_code(form_factor_code),
            supported_capabilities,
            is_locked: read(tag::CONFIG_LOCK) == 1,
            is_fips: form_factor_code & FORM_FACTOR_FIPS != 0,
            is_sky: form_factor_code & FORM_FACTOR_SKY != 0,
        })
    }

    /// Current configuration
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Serial number, if readable
    pub const fn serial(&self) -> Option<u32> {
        self.serial
    }

    /// Firmware version
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Form factor
    pub const fn form_factor(&self) -> FormFactor {
        self.form_factor
    }

    /// Applications supported over `transport`, if the device has it
    pub fn supported_capabilities(&self, transport: Transport) -> Option<Capability> {
        self.supported_capabilities.get(&transport).copied()
    }

    /// Whether the device exposes `transport`
    pub fn has_transport(&self, transport: Transport) -> bool {
        self.supported_capabilities.contains_key(&transport)
    }

    /// Whether the configuration is protected by a lock code
    pub const fn is_locked(&self) -> bool {
        self.is_locked
    }

    /// Whether this is a FIPS model
    pub const fn is_fips(&self) -> bool {
        self.is_fips
    }

    /// Whether this is a Security Key (Sky) model
    pub const fn is_sky(&self) -> bool {
        self.is_sky
    }
}

/// Big-endian integer of up to four bytes; missing values read as 0
fn read_int(value: Option<&[u8]>) -> u32 {
    value
        .unwrap_or_default()
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}
