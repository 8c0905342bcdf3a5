//! Wire-level management backends
//!
//! Each backend lowers the three management operations onto one interface:
//! APDUs to the management applet, OTP slot commands, or CTAPHID vendor
//! commands. The configuration block format is the same on all three.

use bytes::Bytes;
use tracing::{debug, warn};
use yubikit_core::{
    Apdu, Error, FidoConnection, OtpConnection, Result, SmartCardConnection, StatusWord, Version,
};
use yubikit_fido::{Capabilities, FidoProtocol};
use yubikit_otp::slot::{CMD_DEVICE_CONFIG, CMD_YK4_CAPABILITIES, CMD_YK4_SET_DEVICE_INFO};
use yubikit_otp::{OtpProtocol, check_crc};
use yubikit_smartcard::SmartCardProtocol;

/// Management applet AID
pub const AID_MANAGEMENT: [u8; 8] = [0xA0, 0x00, 0x00, 0x05, 0x27, 0x47, 0x11, 0x17];
/// OTP applet AID, used for mode switching on the NEO
pub const AID_OTP: [u8; 8] = [0xA0, 0x00, 0x00, 0x05, 0x27, 0x20, 0x01, 0x01];

const INS_SET_MODE: u8 = 0x16;
const INS_READ_CONFIG: u8 = 0x1D;
const INS_WRITE_CONFIG: u8 = 0x1C;
const P1_DEVICE_CONFIG: u8 = 0x11;
const OTP_INS_CONFIG: u8 = 0x01;

const CTAP_SET_MODE: u8 = 0xC0;
const CTAP_READ_CONFIG: u8 = 0xC2;
const CTAP_WRITE_CONFIG: u8 = 0xC3;

/// Select with a truncated AID, makes the NEO drop the current applet
const NEO_DESELECT: [u8; 4] = [0xA4, 0x04, 0x00, 0x08];

/// Kind of interface a session talks over
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum BackendKind {
    /// CCID or NFC smart card
    #[display("smart card")]
    SmartCard,
    /// OTP HID keyboard
    #[display("OTP")]
    Otp,
    /// FIDO HID
    #[display("FIDO")]
    Fido,
}

/// An open device interface handed to [`ManagementSession`](crate::ManagementSession)
#[derive(Debug)]
pub enum DeviceConnection {
    /// Smart card interface
    SmartCard(Box<dyn SmartCardConnection>),
    /// OTP HID interface
    Otp(Box<dyn OtpConnection>),
    /// FIDO HID interface
    Fido(Box<dyn FidoConnection>),
}

impl DeviceConnection {
    /// Wrap a smart card connection
    pub fn smart_card<C: SmartCardConnection + 'static>(connection: C) -> Self {
        Self::SmartCard(Box::new(connection))
    }

    /// Wrap an OTP connection
    pub fn otp<C: OtpConnection + 'static>(connection: C) -> Self {
        Self::Otp(Box::new(connection))
    }

    /// Wrap a FIDO connection
    pub fn fido<C: FidoConnection + 'static>(connection: C) -> Self {
        Self::Fido(Box::new(connection))
    }

    /// Kind of interface, which also orders backend preference
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::SmartCard(_) => BackendKind::SmartCard,
            Self::Otp(_) => BackendKind::Otp,
            Self::Fido(_) => BackendKind::Fido,
        }
    }
}

/// Management operations lowered onto one wire protocol
pub trait DeviceProtocol {
    /// Read the raw device information block
    fn read_config(&mut self) -> Result<Bytes>;

    /// Write a length-prefixed configuration block
    fn write_config(&mut self, config: &[u8]) -> Result<()>;

    /// Send a legacy set-mode payload
    fn set_mode(&mut self, data: &[u8]) -> Result<()>;
}

/// Management applet over a smart card connection
#[derive(Debug)]
pub struct SmartCardBackend {
    protocol: SmartCardProtocol<Box<dyn SmartCardConnection>>,
    neo: bool,
}

impl SmartCardBackend {
    fn open(connection: Box<dyn SmartCardConnection>) -> Result<(Self, Version)> {
        let mut protocol = SmartCardProtocol::new(connection);
        let banner = protocol.select(&AID_MANAGEMENT)?;
        let text = String::from_utf8_lossy(&banner);
        let version = Version::parse_embedded(&text).ok_or_else(|| {
            Error::invalid_response(format!("No firmware version in select response: {text}"))
        })?;
        protocol.enable_workarounds(version);

        let neo = version.major == 3;
        if neo {
            debug!("YubiKey NEO, switching to OTP applet");
            let response = protocol.connection_mut().transmit_raw(&NEO_DESELECT)?;
            debug!(response = %hex::encode(&response), "NEO de-select");
            protocol.select(&AID_OTP)?;
        }
        Ok((Self { protocol, neo }, version))
    }
}

impl DeviceProtocol for SmartCardBackend {
    fn read_config(&mut self) -> Result<Bytes> {
        if self.neo {
            return Err(Error::UnsupportedOperation("read config not supported on YubiKey NEO"));
        }
        self.protocol
            .send_and_receive(&Apdu::new(0x00, INS_READ_CONFIG, 0x00, 0x00))
    }

    fn write_config(&mut self, config: &[u8]) -> Result<()> {
        if self.neo {
            return Err(Error::UnsupportedOperation("write config not supported on YubiKey NEO"));
        }
        self.protocol.send_and_receive(&Apdu::new_with_data(
            0x00,
            INS_WRITE_CONFIG,
            0x00,
            0x00,
            config.to_vec(),
        ))?;
        Ok(())
    }

    fn set_mode(&mut self, data: &[u8]) -> Result<()> {
        let apdu = if self.neo {
            Apdu::new_with_data(0x00, OTP_INS_CONFIG, P1_DEVICE_CONFIG, 0x00, data.to_vec())
        } else {
            Apdu::new_with_data(0x00, INS_SET_MODE, P1_DEVICE_CONFIG, 0x00, data.to_vec())
        };
        self.protocol.send_and_receive(&apdu)?;
        Ok(())
    }
}

/// Management commands over the OTP HID interface
#[derive(Debug)]
pub struct OtpBackend {
    protocol: OtpProtocol<Box<dyn OtpConnection>>,
}

impl OtpBackend {
    fn open(connection: Box<dyn OtpConnection>) -> Result<(Self, Version)> {
        let protocol = OtpProtocol::new(connection)?;
        let version = protocol.version();
        if version.is_at_least(1, 0, 0) && version.is_less_than(3, 0, 0) {
            debug!(%version, "No management support over OTP");
            return Err(Error::ApplicationNotAvailable(StatusWord::FILE_NOT_FOUND));
        }
        Ok((Self { protocol }, version))
    }
}

impl DeviceProtocol for OtpBackend {
    fn read_config(&mut self) -> Result<Bytes> {
        let response = self.protocol.send_and_receive(CMD_YK4_CAPABILITIES, &[], None)?;
        let length = usize::from(
            *response
                .first()
                .ok_or_else(|| Error::invalid_response("Empty config response"))?,
        );
        if response.len() < length + 3 || !check_crc(&response[..length + 3]) {
            return Err(Error::invalid_response("Invalid checksum"));
        }
        Ok(response.slice(..length + 1))
    }

    fn write_config(&mut self, config: &[u8]) -> Result<()> {
        self.protocol
            .send_and_receive(CMD_YK4_SET_DEVICE_INFO, config, None)?;
        Ok(())
    }

    fn set_mode(&mut self, data: &[u8]) -> Result<()> {
        self.protocol.send_and_receive(CMD_DEVICE_CONFIG, data, None)?;
        Ok(())
    }
}

/// Management commands as CTAPHID vendor commands
#[derive(Debug)]
pub struct FidoBackend {
    protocol: FidoProtocol<Box<dyn FidoConnection>>,
}

impl FidoBackend {
    fn open(connection: Box<dyn FidoConnection>) -> Result<(Self, Version)> {
        let protocol = FidoProtocol::new(connection)?;
        let mut version = protocol.version();
        // Before YubiKey 4 INIT did not carry the firmware version
        if version.major < 4
            && !(version.major == 0 && protocol.capabilities().contains(Capabilities::CBOR))
        {
            debug!(reported = %version, "Assuming firmware 3.0.0");
            version = Version::new(3, 0, 0);
        }
        Ok((Self { protocol }, version))
    }
}

impl DeviceProtocol for FidoBackend {
    fn read_config(&mut self) -> Result<Bytes> {
        self.protocol.send_and_receive(CTAP_READ_CONFIG, &[], None)
    }

    fn write_config(&mut self, config: &[u8]) -> Result<()> {
        self.protocol
            .send_and_receive(CTAP_WRITE_CONFIG, config, None)?;
        Ok(())
    }

    fn set_mode(&mut self, data: &[u8]) -> Result<()> {
        self.protocol.send_and_receive(CTAP_SET_MODE, data, None)?;
        Ok(())
    }
}

/// The backend a session selected, one variant per wire protocol
#[derive(Debug)]
pub enum Backend {
    /// Smart card
    SmartCard(SmartCardBackend),
    /// OTP HID
    Otp(OtpBackend),
    /// FIDO HID
    Fido(FidoBackend),
}

impl Backend {
    /// Open the management application on `connection` and read the firmware version
    pub fn open(connection: DeviceConnection) -> Result<(Self, Version)> {
        match connection {
            DeviceConnection::SmartCard(c) => {
                SmartCardBackend::open(c).map(|(b, v)| (Self::SmartCard(b), v))
            }
            DeviceConnection::Otp(c) => OtpBackend::open(c).map(|(b, v)| (Self::Otp(b), v)),
            DeviceConnection::Fido(c) => FidoBackend::open(c).map(|(b, v)| (Self::Fido(b), v)),
        }
    }

    /// Which wire protocol is in use
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::SmartCard(_) => BackendKind::SmartCard,
            Self::Otp(_) => BackendKind::Otp,
            Self::Fido(_) => BackendKind::Fido,
        }
    }

    /// Close the underlying connection
    pub fn close(self) -> Result<()> {
        let result = match self {
            Self::SmartCard(b) => b.protocol.close(),
            Self::Otp(b) => b.protocol.close(),
            Self::Fido(b) => b.protocol.close(),
        };
        if let Err(e) = &result {
            warn!(error = %e, "Failed to close connection");
        }
        result
    }
}

impl DeviceProtocol for Backend {
    fn read_config(&mut self) -> Result<Bytes> {
        match self {
            Self::SmartCard(b) => b.read_config(),
            Self::Otp(b) => b.read_config(),
            Self::Fido(b) => b.read_config(),
        }
    }

    fn write_config(&mut self, config: &[u8]) -> Result<()> {
        match self {
            Self::SmartCard(b) => b.write_config(config),
            Self::Otp(b) => b.write_config(config),
            Self::Fido(b) => b.write_config(config),
        }
    }

    fn set_mode(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::SmartCard(b) => b.set_mode(data),
            Self::Otp(b) => b.set_mode(data),
            Self::Fido(b) => b.set_mode(data),
        }
    }
}
