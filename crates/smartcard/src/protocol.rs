//! APDU encoding, command chaining and response continuation

use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, instrument, trace};
use yubikit_core::{
    Apdu, ApduResponse, Error, Result, ResultExt, SmartCardConnection, StatusWord, Transport,
    Version,
};

const INS_SELECT: u8 = 0xA4;
const P1_SELECT: u8 = 0x04;
const P2_SELECT: u8 = 0x00;

const INS_SEND_REMAINING: u8 = 0xC0;

const CLA_CHAINING: u8 = 0x10;
const SHORT_APDU_MAX_CHUNK: usize = 0xFF;

/// Responses longer than this arm the touch workaround
const TOUCH_WORKAROUND_THRESHOLD: usize = 54;
/// Window after a long response in which the next command is preceded by a dummy APDU
const TOUCH_WORKAROUND_WINDOW: Duration = Duration::from_secs(2);
const DUMMY_APDU: [u8; 5] = [0; 5];

/// Length encoding used for outgoing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApduFormat {
    /// One-byte Lc, payloads above 255 bytes are chained
    #[default]
    Short,
    /// Three-byte Lc, single command for any payload up to 65535 bytes
    Extended,
}

/// Command/response exchange with a smart card application
#[derive(Debug)]
pub struct SmartCardProtocol<C: SmartCardConnection> {
    connection: C,
    format: ApduFormat,
    ins_send_remaining: u8,
    touch_workaround: bool,
    last_long_response: Option<Instant>,
}

impl<C: SmartCardConnection> SmartCardProtocol<C> {
    /// Wrap an open connection using short APDUs
    pub const fn new(connection: C) -> Self {
        Self {
            connection,
            format: ApduFormat::Short,
            ins_send_remaining: INS_SEND_REMAINING,
            touch_workaround: false,
            last_long_response: None,
        }
    }

    /// Use the given APDU format
    pub const fn with_apdu_format(mut self, format: ApduFormat) -> Self {
        self.format = format;
        self
    }

    /// Use a non-standard instruction to fetch remaining response data
    pub const fn with_send_remaining_ins(mut self, ins: u8) -> Self {
        self.ins_send_remaining = ins;
        self
    }

    /// Change the APDU format
    pub const fn set_apdu_format(&mut self, format: ApduFormat) {
        self.format = format;
    }

    /// Active APDU format
    pub const fn apdu_format(&self) -> ApduFormat {
        self.format
    }

    /// Underlying connection
    pub const fn connection(&self) -> &C {
        &self.connection
    }

    /// Underlying connection, mutably
    pub const fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Enable device specific workarounds for the given firmware
    ///
    /// The touch workaround applies to USB connections on firmware 4.2.0 up
    /// to but excluding 4.2.7.
    pub fn enable_workarounds(&mut self, version: Version) {
        if self.connection.transport() == Transport::Usb
            && version.is_at_least(4, 2, 0)
            && version.is_less_than(4, 2, 7)
        {
            debug!(%version, "Enabling touch workaround");
            self.touch_workaround = true;
        }
    }

    /// Whether the touch workaround is active
    pub const fn touch_workaround(&self) -> bool {
        self.touch_workaround
    }

    /// Select an application by AID, returning the response data
    pub fn select(&mut self, aid: &[u8]) -> Result<Bytes> {
        let apdu = Apdu::new_with_data(0x00, INS_SELECT, P1_SELECT, P2_SELECT, aid.to_vec());
        match self.send_and_receive(&apdu) {
            Err(Error::Apdu(sw)) if sw.is_application_missing() => {
                debug!(aid = %hex::encode(aid), %sw, "Application not available");
                Err(Error::ApplicationNotAvailable(sw))
            }
            other => other,
        }
    }

    /// Send a command and return the complete response data
    ///
    /// Fails with [`Error::Apdu`] unless the final status is `9000`.
    #[instrument(level = "trace", skip(self, apdu), fields(ins = apdu.ins()))]
    pub fn send_and_receive(&mut self, apdu: &Apdu) -> Result<Bytes> {
        if self.touch_workaround
            && self
                .last_long_response
                .is_some_and(|at| at.elapsed() < TOUCH_WORKAROUND_WINDOW)
        {
            trace!("Sending dummy APDU to reset touch timing");
            // The card answers with an error status which is of no interest
            self.connection.transmit_raw(&DUMMY_APDU)?;
            self.last_long_response = None;
        }

        let mut response = match self.format {
            ApduFormat::Short => self.send_short(apdu)?,
            ApduFormat::Extended => self.transmit(&encode_extended(
                apdu.cla(),
                apdu.ins(),
                apdu.p1(),
                apdu.p2(),
                apdu.data(),
            )?)?,
        };

        let get_data = match self.format {
            ApduFormat::Short => encode_short(0x00, self.ins_send_remaining, 0x00, 0x00, &[]),
            ApduFormat::Extended => {
                encode_extended(0x00, self.ins_send_remaining, 0x00, 0x00, &[])?
            }
        };

        let mut buffer = BytesMut::new();
        while response.status_word().is_more_data_available() {
            trace!(
                remaining = ?response.status_word().remaining_bytes(),
                "Fetching remaining response data"
            );
            buffer.extend_from_slice(response.data());
            response = self
                .transmit(&get_data)
                .context("Failed to fetch remaining response data")?;
        }

        let sw = response.status_word();
        if !sw.is_success() {
            debug!(%sw, desc = sw.description(), "Command failed");
            return Err(Error::Apdu(sw));
        }
        buffer.extend_from_slice(response.data());

        self.last_long_response = (self.touch_workaround
            && buffer.len() > TOUCH_WORKAROUND_THRESHOLD)
            .then(Instant::now);

        Ok(buffer.freeze())
    }

    /// Close the underlying connection
    pub fn close(mut self) -> Result<()> {
        self.connection.close()?;
        Ok(())
    }

    /// Release the connection without closing it
    pub fn into_connection(self) -> C {
        self.connection
    }

    fn send_short(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        let data = apdu.data();
        let mut offset = 0;
        while data.len() - offset > SHORT_APDU_MAX_CHUNK {
            let chunk = &data[offset..offset + SHORT_APDU_MAX_CHUNK];
            let response = self.transmit(&encode_short(
                apdu.cla() | CLA_CHAINING,
                apdu.ins(),
                apdu.p1(),
                apdu.p2(),
                chunk,
            ))?;
            if response.status_word() != StatusWord::SUCCESS {
                return Err(Error::Apdu(response.status_word()));
            }
            offset += SHORT_APDU_MAX_CHUNK;
        }
        self.transmit(&encode_short(
            apdu.cla(),
            apdu.ins(),
            apdu.p1(),
            apdu.p2(),
            &data[offset..],
        ))
    }

    fn transmit(&mut self, command: &[u8]) -> Result<ApduResponse> {
        let raw = self.connection.transmit_raw(command)?;
        let response = ApduResponse::from_bytes(raw)?;
        let sw = response.status_word();
        match sw.tracing_level() {
            tracing::Level::TRACE => trace!(%sw, "Response status"),
            _ => debug!(%sw, desc = sw.description(), "Response status"),
        }
        Ok(response)
    }
}

/// Encode a short APDU; `data` must not exceed 255 bytes
fn encode_short(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + data.len());
    buf.put_slice(&[cla, ins, p1, p2]);
    buf.put_u8(data.len() as u8);
    buf.put_slice(data);
    buf.freeze()
}

fn encode_extended(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Result<Bytes> {
    let length = u16::try_from(data.len())
        .map_err(|_| Error::InvalidCommandData("Data too long for extended APDU"))?;
    let mut buf = BytesMut::with_capacity(7 + data.len());
    buf.put_slice(&[cla, ins, p1, p2, 0x00]);
    buf.put_u16(length);
    buf.put_slice(data);
    Ok(buf.freeze())
}
