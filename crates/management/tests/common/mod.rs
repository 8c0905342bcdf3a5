//! Simulated YubiKey interfaces for session tests

#![allow(dead_code, unreachable_pub)]

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use yubikit_core::{
    FidoConnection, OtpConnection, SmartCardConnection, Transport, TransportError,
};
use yubikit_management::backend::{AID_MANAGEMENT, AID_OTP};
use yubikit_otp::{calculate_crc, check_crc};

/// Observable state shared between a simulator and the test
#[derive(Debug, Default)]
pub struct DeviceState {
    /// Length-prefixed device info block returned by read-config
    pub info: Vec<u8>,
    /// Raw commands received, in order
    pub commands: Vec<Vec<u8>>,
    /// Blocks received by write-config
    pub writes: Vec<Vec<u8>>,
    /// Payloads received by set-mode
    pub modes: Vec<Vec<u8>>,
    /// Whether the connection was closed
    pub closed: bool,
}

pub type Shared = Arc<Mutex<DeviceState>>;

/// Device info block: serial 123456, USB-A keychain, given firmware
pub fn info_block(version: [u8; 3]) -> Vec<u8> {
    let mut body = hex::decode("0102023b02040001e2400302023b040101").unwrap();
    body.extend_from_slice(&[0x05, 0x03]);
    body.extend_from_slice(&version);
    body.extend_from_slice(&hex::decode("06020000070100080100").unwrap());
    let mut block = vec![body.len() as u8];
    block.extend_from_slice(&body);
    block
}

fn shared(version: [u8; 3]) -> Shared {
    Arc::new(Mutex::new(DeviceState {
        info: info_block(version),
        ..Default::default()
    }))
}

/// Management and OTP applets behind a CCID or NFC reader
#[derive(Debug)]
pub struct SmartCardSim {
    pub state: Shared,
    version: [u8; 3],
    selected: Option<Vec<u8>>,
}

impl SmartCardSim {
    pub fn new(version: [u8; 3]) -> (Self, Shared) {
        let state = shared(version);
        (
            Self {
                state: state.clone(),
                version,
                selected: None,
            },
            state,
        )
    }

    fn handle(&mut self, command: &[u8]) -> Vec<u8> {
        // NEO de-select carries no CLA
        if command == [0xA4, 0x04, 0x00, 0x08] {
            self.selected = None;
            return vec![0x6A, 0x82];
        }
        let (ins, p1, data) = (command[1], command[2], &command[5..]);
        let selected = self.selected.as_deref();
        match (ins, p1) {
            (0xA4, 0x04) if data == AID_MANAGEMENT => {
                self.selected = Some(data.to_vec());
                let [major, minor, micro] = self.version;
                let mut response =
                    format!("Virtual mgr - FW version {major}.{minor}.{micro}").into_bytes();
                response.extend_from_slice(&[0x90, 0x00]);
                response
            }
            (0xA4, 0x04) if data == AID_OTP && self.version[0] == 3 => {
                self.selected = Some(data.to_vec());
                let mut response = self.version.to_vec();
                response.extend_from_slice(&[0x05, 0x00, 0x00, 0x90, 0x00]);
                response
            }
            (0xA4, _) => vec![0x6A, 0x82],
            (0x1D, 0x00) if selected == Some(&AID_MANAGEMENT[..]) => {
                let mut response = self.state.lock().info.clone();
                response.extend_from_slice(&[0x90, 0x00]);
                response
            }
            (0x1C, 0x00) if selected == Some(&AID_MANAGEMENT[..]) => {
                self.state.lock().writes.push(data.to_vec());
                vec![0x90, 0x00]
            }
            (0x16, 0x11) if selected == Some(&AID_MANAGEMENT[..]) => {
                self.state.lock().modes.push(data.to_vec());
                vec![0x90, 0x00]
            }
            (0x01, 0x11) if selected == Some(&AID_OTP[..]) => {
                self.state.lock().modes.push(data.to_vec());
                vec![0x90, 0x00]
            }
            _ => vec![0x6D, 0x00],
        }
    }
}

impl SmartCardConnection for SmartCardSim {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.state.lock().commands.push(command.to_vec());
        Ok(self.handle(command).into())
    }

    fn transport(&self) -> Transport {
        Transport::Usb
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// OTP application behind an HID keyboard interface
#[derive(Debug)]
pub struct OtpSim {
    pub state: Shared,
    version: [u8; 3],
    prog_seq: u8,
    frame: [u8; 70],
    pending: VecDeque<[u8; 8]>,
}

impl OtpSim {
    pub fn new(version: [u8; 3]) -> (Self, Shared) {
        let state = shared(version);
        (
            Self {
                state: state.clone(),
                version,
                prog_seq: 1,
                frame: [0; 70],
                pending: VecDeque::new(),
            },
            state,
        )
    }

    fn process_frame(&mut self) {
        let payload = &self.frame[..64];
        let slot = self.frame[64];
        let mut checked = payload.to_vec();
        checked.extend_from_slice(&self.frame[65..67]);
        assert!(check_crc(&checked), "bad frame CRC");
        self.state.lock().commands.push(self.frame.to_vec());

        match slot {
            0x13 => {
                let mut data = self.state.lock().info.clone();
                let crc = !calculate_crc(&data);
                data.extend_from_slice(&crc.to_le_bytes());
                for (seq, chunk) in data.chunks(7).enumerate() {
                    let mut report = [0u8; 8];
                    report[..chunk.len()].copy_from_slice(chunk);
                    report[7] = 0x40 | seq as u8;
                    self.pending.push_back(report);
                }
                self.pending.push_back([0, 0, 0, 0, 0, 0, 0, 0x40]);
            }
            0x15 => {
                let length = usize::from(payload[0]) + 1;
                self.state.lock().writes.push(payload[..length].to_vec());
                self.prog_seq += 1;
            }
            0x11 => {
                self.state.lock().modes.push(payload.to_vec());
                self.prog_seq += 1;
            }
            // Anything else leaves the programming sequence alone
            _ => {}
        }
    }
}

impl OtpConnection for OtpSim {
    fn send(&mut self, report: &[u8; 8]) -> Result<(), TransportError> {
        let status = report[7];
        if status == 0x8F {
            self.pending.clear();
            return Ok(());
        }
        let seq = usize::from(status & 0x1F);
        if seq == 0 {
            self.frame = [0; 70];
        }
        self.frame[seq * 7..seq * 7 + 7].copy_from_slice(&report[..7]);
        if seq == 9 {
            self.process_frame();
        }
        Ok(())
    }

    fn receive(&mut self, report: &mut [u8; 8]) -> Result<(), TransportError> {
        *report = match self.pending.pop_front() {
            Some(pending) => pending,
            None => {
                let [major, minor, micro] = self.version;
                [0, major, minor, micro, self.prog_seq, 0x03, 0, 0]
            }
        };
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

const CID: [u8; 4] = [0x00, 0x00, 0x10, 0x01];

/// FIDO authenticator behind an HID interface
#[derive(Debug)]
pub struct FidoSim {
    pub state: Shared,
    version: [u8; 3],
    capabilities: u8,
    request: Option<(u8, usize, Vec<u8>)>,
    replies: VecDeque<[u8; 64]>,
}

impl FidoSim {
    pub fn new(version: [u8; 3], capabilities: u8) -> (Self, Shared) {
        let state = shared(version);
        (
            Self {
                state: state.clone(),
                version,
                capabilities,
                request: None,
                replies: VecDeque::new(),
            },
            state,
        )
    }

    fn reply(&mut self, cid: [u8; 4], cmd: u8, data: &[u8]) {
        let mut packet = [0u8; 64];
        packet[..4].copy_from_slice(&cid);
        packet[4] = cmd;
        packet[5..7].copy_from_slice(&(data.len() as u16).to_be_bytes());
        let first = data.len().min(57);
        packet[7..7 + first].copy_from_slice(&data[..first]);
        self.replies.push_back(packet);

        for (seq, chunk) in data[first..].chunks(59).enumerate() {
            let mut packet = [0u8; 64];
            packet[..4].copy_from_slice(&cid);
            packet[4] = seq as u8;
            packet[5..5 + chunk.len()].copy_from_slice(chunk);
            self.replies.push_back(packet);
        }
    }

    fn process(&mut self, cid: [u8; 4], cmd: u8, data: Vec<u8>) {
        self.state.lock().commands.push(data.clone());
        match cmd {
            0x86 => {
                let mut response = data[..8].to_vec();
                response.extend_from_slice(&CID);
                response.push(2);
                response.extend_from_slice(&self.version);
                response.push(self.capabilities);
                self.reply(cid, cmd, &response);
            }
            0xC2 => {
                let info = self.state.lock().info.clone();
                self.reply(cid, cmd, &info);
            }
            0xC3 => {
                self.state.lock().writes.push(data);
                self.reply(cid, cmd, &[]);
            }
            0xC0 => {
                self.state.lock().modes.push(data);
                self.reply(cid, cmd, &[]);
            }
            _ => self.reply(cid, 0xBF, &[0x01]),
        }
    }
}

impl FidoConnection for FidoSim {
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        let cid = [packet[0], packet[1], packet[2], packet[3]];
        if packet[4] & 0x80 != 0 {
            let length = usize::from(u16::from_be_bytes([packet[5], packet[6]]));
            let take = length.min(packet.len() - 7);
            self.request = Some((packet[4], length, packet[7..7 + take].to_vec()));
        } else if let Some((_, length, data)) = self.request.as_mut() {
            let take = (*length - data.len()).min(packet.len() - 5);
            data.extend_from_slice(&packet[5..5 + take]);
        }

        let complete = matches!(&self.request, Some((_, length, data)) if data.len() >= *length);
        if complete {
            if let Some((cmd, _, data)) = self.request.take() {
                self.process(cid, cmd, data);
            }
        }
        Ok(())
    }

    fn receive(&mut self, packet: &mut [u8]) -> Result<(), TransportError> {
        let reply = self.replies.pop_front().ok_or(TransportError::Timeout)?;
        packet.copy_from_slice(&reply);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().closed = true;
        Ok(())
    }
}
