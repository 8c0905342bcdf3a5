//! USB CCID bulk transfer framing
//!
//! Every APDU is wrapped in a `PC_to_RDR_XfrBlock` message and written in
//! packets of the OUT endpoint's max packet size. The answer is read until a
//! short packet arrives and must be a `RDR_to_PC_DataBlock` echoing the
//! command's sequence number.

pub mod header;

use std::time::Duration;
use std::{fmt, io};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};
use yubikit_core::{Result, SmartCardConnection, Transport, TransportError};

use header::{CcidHeader, HEADER_SIZE, MESSAGE_TYPE_POWER_ON, MESSAGE_TYPE_XFR_BLOCK};

/// Default per-transfer timeout
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Raw access to a claimed CCID interface's bulk endpoints
pub trait BulkPipe: Send + fmt::Debug {
    /// Max packet size of the bulk OUT endpoint
    fn max_packet_size_out(&self) -> usize;

    /// Max packet size of the bulk IN endpoint
    fn max_packet_size_in(&self) -> usize;

    /// Write one packet, returning the number of bytes written
    fn write(&mut self, packet: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Read one packet into `buf`, returning the number of bytes read
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Release the interface
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Configuration for [`UsbCcidConnection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcidConfig {
    /// Timeout applied to every individual bulk transfer
    pub transfer_timeout: Duration,
}

impl Default for CcidConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }
}

impl CcidConfig {
    /// Set the per-transfer timeout
    pub const fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }
}

/// Smart card connection over a USB CCID interface
pub struct UsbCcidConnection<P: BulkPipe> {
    pipe: P,
    config: CcidConfig,
    sequence: u8,
    atr: Bytes,
}

impl<P: BulkPipe> UsbCcidConnection<P> {
    /// Power on the card behind `pipe` with the default configuration
    pub fn open(pipe: P) -> Result<Self, TransportError> {
        Self::open_with_config(pipe, CcidConfig::default())
    }

    /// Power on the card behind `pipe`
    pub fn open_with_config(pipe: P, config: CcidConfig) -> Result<Self, TransportError> {
        if pipe.max_packet_size_out() == 0 || pipe.max_packet_size_in() == 0 {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "CCID endpoint max packet size must be non-zero",
            )));
        }
        let mut connection = Self {
            pipe,
            config,
            sequence: 0,
            atr: Bytes::new(),
        };
        connection.atr = connection.transceive(MESSAGE_TYPE_POWER_ON, &[])?;
        debug!(atr = %hex::encode(&connection.atr), "CCID slot powered on");
        Ok(connection)
    }

    /// Answer-to-reset returned by the power-on command
    pub const fn atr(&self) -> &Bytes {
        &self.atr
    }

    /// Underlying bulk pipe
    pub const fn pipe(&self) -> &P {
        &self.pipe
    }

    fn transceive(&mut self, message_type: u8, data: &[u8]) -> Result<Bytes, TransportError> {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        let length = u32::try_from(data.len())
            .map_err(|_| TransportError::other("CCID payload too long"))?;

        let mut message = BytesMut::with_capacity(HEADER_SIZE + data.len());
        CcidHeader::command(message_type, length, sequence).encode_into(&mut message);
        message.extend_from_slice(data);
        self.write_message(&message)?;

        let (header, payload) = self.read_message(sequence)?;
        let declared = header.length as usize;
        Ok(payload.slice(..declared.min(payload.len())))
    }

    fn write_message(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let packet_size = self.pipe.max_packet_size_out();
        let timeout = self.config.transfer_timeout;
        for chunk in message.chunks(packet_size) {
            let written = self.pipe.write(chunk, timeout)?;
            if written != chunk.len() {
                return Err(TransportError::ShortWrite {
                    expected: chunk.len(),
                    written,
                });
            }
        }
        if message.len() % packet_size == 0 {
            trace!("Sending zero length packet");
            self.pipe.write(&[], timeout)?;
        }
        Ok(())
    }

    fn read_message(&mut self, sequence: u8) -> Result<(CcidHeader, Bytes), TransportError> {
        let packet_size = self.pipe.max_packet_size_in();
        let timeout = self.config.transfer_timeout;
        let mut packet = vec![0u8; packet_size];
        loop {
            let mut buffer = BytesMut::new();
            loop {
                let read = self.pipe.read(&mut packet, timeout)?;
                buffer.extend_from_slice(&packet[..read]);
                if read < packet_size {
                    break;
                }
            }

            let header = CcidHeader::decode(&buffer)?;
            header.validate_response(sequence)?;
            if header.is_time_extension() {
                trace!(sequence, "Reader requested time extension");
                continue;
            }
            return Ok((header, buffer.split_off(HEADER_SIZE).freeze()));
        }
    }
}

impl<P: BulkPipe> SmartCardConnection for UsbCcidConnection<P> {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.transceive(MESSAGE_TYPE_XFR_BLOCK, command)
    }

    fn transport(&self) -> Transport {
        Transport::Usb
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.pipe.close()
    }
}

impl<P: BulkPipe> fmt::Debug for UsbCcidConnection<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbCcidConnection")
            .field("pipe", &self.pipe)
            .field("sequence", &self.sequence)
            .field("atr", &hex::encode(&self.atr))
            .finish()
    }
}
