//! Connection traits for the three physical framings a YubiKey exposes
//!
//! A connection is an already-opened handle to one device interface. The
//! protocol layers own a connection for the length of a session and never
//! open, enumerate or request permission for devices themselves.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Size of an OTP HID feature report
pub const OTP_REPORT_SIZE: usize = 8;

/// Default CTAPHID packet size for USB HID
pub const FIDO_PACKET_SIZE: usize = 64;

/// Physical medium a connection runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Transport {
    /// USB (CCID, HID keyboard or HID FIDO interface)
    #[display("USB")]
    Usb,
    /// NFC (ISO-DEP)
    #[display("NFC")]
    Nfc,
}

/// Synchronous request/response exchange of raw APDU bytes
///
/// Implemented over USB CCID or NFC ISO-DEP. A connection has no knowledge
/// of command chaining or GET RESPONSE handling.
pub trait SmartCardConnection: Send + fmt::Debug {
    /// Send raw APDU bytes and return the raw response bytes, status word included
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// The physical medium of this connection
    fn transport(&self) -> Transport;

    /// Release the underlying device handle
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// HID feature-report exchange used by the OTP application
pub trait OtpConnection: Send + fmt::Debug {
    /// Write one feature report
    fn send(&mut self, report: &[u8; OTP_REPORT_SIZE]) -> Result<(), TransportError>;

    /// Read one feature report
    fn receive(&mut self, report: &mut [u8; OTP_REPORT_SIZE]) -> Result<(), TransportError>;

    /// Release the underlying device handle
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Fixed-size HID packet exchange used by CTAPHID
pub trait FidoConnection: Send + fmt::Debug {
    /// Size of every packet sent or received on this connection
    fn packet_size(&self) -> usize {
        FIDO_PACKET_SIZE
    }

    /// Write one packet of exactly `packet_size()` bytes
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError>;

    /// Read one packet into a buffer of `packet_size()` bytes
    fn receive(&mut self, packet: &mut [u8]) -> Result<(), TransportError>;

    /// Release the underlying device handle
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: SmartCardConnection + ?Sized> SmartCardConnection for Box<T> {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transmit_raw(command)
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transmit_raw(command)
    }

    fn transport(&self) -> Transport {
        (**self).transport()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

impl<T: OtpConnection + ?Sized> OtpConnection for Box<T> {
    fn send(&mut self, report: &[u8; OTP_REPORT_SIZE]) -> Result<(), TransportError> {
        (**self).send(report)
    }

    fn receive(&mut self, report: &mut [u8; OTP_REPORT_SIZE]) -> Result<(), TransportError> {
        (**self).receive(report)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

impl<T: FidoConnection + ?Sized> FidoConnection for Box<T> {
    fn packet_size(&self) -> usize {
        (**self).packet_size()
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        (**self).send(packet)
    }

    fn receive(&mut self, packet: &mut [u8]) -> Result<(), TransportError> {
        (**self).receive(packet)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct MockConnection {
    /// Mock responses to return
    pub(crate) responses: Vec<Bytes>,
    /// Commands that were sent
    pub(crate) commands: Vec<Bytes>,
}

#[cfg(test)]
impl MockConnection {
    pub(crate) fn new(responses: Vec<Bytes>) -> Self {
        Self {
            responses,
            commands: Vec::new(),
        }
    }
}

#[cfg(test)]
impl SmartCardConnection for MockConnection {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.commands.push(Bytes::copy_from_slice(command));
        if self.responses.is_empty() {
            return Err(TransportError::Transmission);
        }
        Ok(self.responses.remove(0))
    }

    fn transport(&self) -> Transport {
        Transport::Usb
    }
}
