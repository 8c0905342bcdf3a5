//! CTAPHID message framing over fixed size HID packets

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, trace, warn};
use yubikit_core::{CommandState, CtapError, Error, FidoConnection, Result, Version};

use crate::hid::{
    BROADCAST_CID, CTAPHID_CANCEL, CTAPHID_ERROR, CTAPHID_INIT, CTAPHID_KEEPALIVE, CTAPHID_PING,
    CTAPHID_WINK, Capabilities,
};

const NONCE_SIZE: usize = 8;
const INIT_HEADER_SIZE: usize = 7;
const CONT_HEADER_SIZE: usize = 5;
const SEQUENCE_MASK: u8 = 0x7F;

/// CTAPHID session on an allocated channel
#[derive(Debug)]
pub struct FidoProtocol<C: FidoConnection> {
    connection: C,
    channel_id: u32,
    protocol_version: u8,
    version: Version,
    capabilities: Capabilities,
}

impl<C: FidoConnection> FidoProtocol<C> {
    /// Allocate a channel on `connection` with the INIT handshake
    pub fn new(connection: C) -> Result<Self> {
        let packet_size = connection.packet_size();
        if packet_size <= INIT_HEADER_SIZE {
            return Err(Error::InvalidArgument(format!(
                "HID packet size must exceed {INIT_HEADER_SIZE} bytes, got {packet_size}"
            )));
        }
        let mut protocol = Self {
            connection,
            channel_id: BROADCAST_CID,
            protocol_version: 0,
            version: Version::default(),
            capabilities: Capabilities::default(),
        };

        let nonce: [u8; NONCE_SIZE] = rand::random();
        let response = protocol.send_and_receive(CTAPHID_INIT, &nonce, None)?;
        if response.len() < 17 {
            return Err(Error::invalid_response(format!(
                "INIT response too short: {} bytes",
                response.len()
            )));
        }
        if !bool::from(response[..NONCE_SIZE].ct_eq(&nonce)) {
            return Err(Error::invalid_response("Got wrong nonce"));
        }

        protocol.channel_id = u32::from_be_bytes([
            response[8],
            response[9],
            response[10],
            response[11],
        ]);
        protocol.protocol_version = response[12];
        protocol.version = Version::from_bytes(&response[13..16])?;
        protocol.capabilities = Capabilities::from_bits(response[16]);
        debug!(
            channel = %format_args!("{:#010x}", protocol.channel_id),
            version = %protocol.version,
            capabilities = ?protocol.capabilities,
            "CTAPHID channel allocated"
        );
        Ok(protocol)
    }

    /// Allocated channel ID
    pub const fn channel_id(&self) -> u32 {
        self.channel_id
    }

    /// CTAPHID protocol version
    pub const fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    /// Device version reported by INIT
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Capability flags reported by INIT
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Underlying connection
    pub const fn connection(&self) -> &C {
        &self.connection
    }

    /// Underlying connection, mutably
    pub const fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Send a message and wait for the response to the same command
    #[instrument(level = "trace", skip(self, payload, state))]
    pub fn send_and_receive(
        &mut self,
        cmd: u8,
        payload: &[u8],
        state: Option<&CommandState>,
    ) -> Result<Bytes> {
        let fallback;
        let state = match state {
            Some(state) => state,
            None => {
                fallback = CommandState::new();
                &fallback
            }
        };

        self.send_request(cmd, payload)?;
        self.receive_response(cmd, state)
    }

    /// Echo `data` through the device
    pub fn ping(&mut self, data: &[u8]) -> Result<Bytes> {
        self.send_and_receive(CTAPHID_PING, data, None)
    }

    /// Blink the device LED
    pub fn wink(&mut self) -> Result<()> {
        if !self.capabilities.contains(Capabilities::WINK) {
            return Err(Error::UnsupportedOperation("Device does not support WINK"));
        }
        self.send_and_receive(CTAPHID_WINK, &[], None)?;
        Ok(())
    }

    /// Close the underlying connection
    pub fn close(mut self) -> Result<()> {
        self.connection.close()?;
        Ok(())
    }

    fn send_request(&mut self, cmd: u8, payload: &[u8]) -> Result<()> {
        let length = u16::try_from(payload.len())
            .map_err(|_| Error::InvalidArgument(format!("Payload too large: {}", payload.len())))?;
        let packet_size = self.connection.packet_size();

        let mut packet = BytesMut::with_capacity(packet_size);
        packet.put_u32(self.channel_id);
        packet.put_u8(cmd);
        packet.put_u16(length);
        let first = payload.len().min(packet_size - INIT_HEADER_SIZE);
        packet.put_slice(&payload[..first]);
        self.send_packet(packet, packet_size)?;

        let mut remaining = &payload[first..];
        let mut seq = 0u8;
        while !remaining.is_empty() {
            let take = remaining.len().min(packet_size - CONT_HEADER_SIZE);
            let mut packet = BytesMut::with_capacity(packet_size);
            packet.put_u32(self.channel_id);
            packet.put_u8(seq & SEQUENCE_MASK);
            packet.put_slice(&remaining[..take]);
            self.send_packet(packet, packet_size)?;
            remaining = &remaining[take..];
            seq = seq.wrapping_add(1);
        }
        Ok(())
    }

    fn send_packet(&mut self, mut packet: BytesMut, packet_size: usize) -> Result<()> {
        packet.resize(packet_size, 0);
        trace!(packet = %hex::encode(&packet), "SEND");
        self.connection.send(&packet)?;
        Ok(())
    }

    fn send_cancel(&mut self) -> Result<()> {
        debug!("Sending CTAPHID_CANCEL");
        let packet_size = self.connection.packet_size();
        let mut packet = BytesMut::with_capacity(packet_size);
        packet.put_u32(self.channel_id);
        packet.put_u8(CTAPHID_CANCEL);
        packet.put_u16(0);
        self.send_packet(packet, packet_size)
    }

    fn receive_response(&mut self, cmd: u8, state: &CommandState) -> Result<Bytes> {
        let packet_size = self.connection.packet_size();
        let mut packet = vec![0u8; packet_size];
        let mut response = BytesMut::new();
        let mut expected: Option<usize> = None;
        let mut seq = 0u8;
        let mut cancel_sent = false;

        loop {
            if !cancel_sent && state.wait_for_cancel(Duration::ZERO) {
                cancel_sent = true;
                if let Err(e) = self.send_cancel() {
                    warn!(error = %e, "Failed to send CTAPHID_CANCEL");
                }
            }

            self.connection.receive(&mut packet)?;
            trace!(packet = %hex::encode(&packet), "RECV");

            let channel = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]);
            if channel != self.channel_id {
                return Err(Error::invalid_response(format!(
                    "Wrong channel ID: expected {:#010x}, got {channel:#010x}",
                    self.channel_id
                )));
            }

            let length = match expected {
                None => match packet[4] {
                    c if c == cmd => {
                        let length = usize::from(u16::from_be_bytes([packet[5], packet[6]]));
                        response.reserve(length);
                        let take = (packet_size - INIT_HEADER_SIZE).min(length);
                        response.extend_from_slice(&packet[INIT_HEADER_SIZE..INIT_HEADER_SIZE + take]);
                        *expected.insert(length)
                    }
                    CTAPHID_KEEPALIVE => {
                        state.on_keepalive(packet[INIT_HEADER_SIZE].into());
                        continue;
                    }
                    CTAPHID_ERROR => {
                        let error = CtapError::from(packet[INIT_HEADER_SIZE]);
                        debug!(%error, "Device returned CTAPHID_ERROR");
                        return Err(Error::Ctap(error));
                    }
                    other => {
                        return Err(Error::invalid_response(format!(
                            "Unexpected CTAPHID command {other:#04x}, expected {cmd:#04x}"
                        )));
                    }
                },
                Some(length) => {
                    if packet[4] != seq {
                        return Err(Error::invalid_response(format!(
                            "Packet out of sequence: expected {seq}, got {}",
                            packet[4]
                        )));
                    }
                    seq = seq.wrapping_add(1) & SEQUENCE_MASK;
                    let take = (packet_size - CONT_HEADER_SIZE).min(length - response.len());
                    response.extend_from_slice(&packet[CONT_HEADER_SIZE..CONT_HEADER_SIZE + take]);
                    length
                }
            };

            if response.len() >= length {
                return Ok(response.freeze());
            }
        }
    }
}
