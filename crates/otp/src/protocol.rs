//! Feature report framing for the OTP application

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, instrument, trace, warn};
use yubikit_core::transport::OTP_REPORT_SIZE;
use yubikit_core::{CommandState, Error, KeepaliveStatus, OtpConnection, Result, Version};

use crate::crc::calculate_crc;
use crate::slot::CMD_SCAN_MAP;

/// Data bytes carried by one feature report
pub const FEATURE_RPT_DATA_SIZE: usize = OTP_REPORT_SIZE - 1;
/// Payload size of one frame
pub const SLOT_DATA_SIZE: usize = 64;
/// Length of the status block returned by configuration commands
pub const STATUS_SIZE: usize = 6;

const FRAME_SIZE: usize = SLOT_DATA_SIZE + 6;
const LAST_CHUNK_SEQ: u8 = (FRAME_SIZE / FEATURE_RPT_DATA_SIZE) as u8 - 1;

const RESP_PENDING_FLAG: u8 = 0x40;
const SLOT_WRITE_FLAG: u8 = 0x80;
const RESP_TIMEOUT_WAIT_FLAG: u8 = 0x20;
const DUMMY_REPORT_WRITE: u8 = 0x8F;
const SEQUENCE_MASK: u8 = 0x1F;

const STATUS_OFFSET_PROG_SEQ: usize = 4;
const STATUS_OFFSET_TOUCH_LOW: usize = 5;
const CONFIG_SLOTS_PROGRAMMED_MASK: u8 = 0b0000_0011;

const WRITE_READY_ATTEMPTS: usize = 20;
const WRITE_READY_INTERVAL: Duration = Duration::from_millis(50);
const TOUCH_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PROCESSING_POLL_INTERVAL: Duration = Duration::from_millis(20);

type Report = [u8; OTP_REPORT_SIZE];

/// OTP application session over an HID keyboard interface
#[derive(Debug)]
pub struct OtpProtocol<C: OtpConnection> {
    connection: C,
    version: Version,
}

impl<C: OtpConnection> OtpProtocol<C> {
    /// Read the initial status from `connection`
    ///
    /// NEO devices may report a stale programming sequence, so an invalid
    /// scan map is written to force the applet to refresh it.
    pub fn new(connection: C) -> Result<Self> {
        let mut protocol = Self {
            connection,
            version: Version::default(),
        };
        let report = protocol.receive()?;
        protocol.version = Version::from_bytes(&report[1..4])?;
        debug!(version = %protocol.version, "OTP application ready");

        if protocol.version.major == 3 {
            match protocol.send_and_receive(CMD_SCAN_MAP, &[b'c'; 51], None) {
                Ok(_) | Err(Error::CommandRejected(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(protocol)
    }

    /// Firmware version reported in the status block
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Underlying connection
    pub const fn connection(&self) -> &C {
        &self.connection
    }

    /// Underlying connection, mutably
    pub const fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Read the 6 byte status block
    pub fn read_status(&mut self) -> Result<Bytes> {
        let report = self.receive()?;
        Ok(Bytes::copy_from_slice(&report[1..1 + STATUS_SIZE]))
    }

    /// Send `data` to `slot` and return the response
    ///
    /// Commands that produce data return it; configuration commands return
    /// the status block once the programming sequence has advanced.
    #[instrument(level = "trace", skip(self, data, state))]
    pub fn send_and_receive(
        &mut self,
        slot: u8,
        data: &[u8],
        state: Option<&CommandState>,
    ) -> Result<Bytes> {
        if data.len() > SLOT_DATA_SIZE {
            return Err(Error::InvalidArgument(format!(
                "Payload too large for HID frame: {} bytes",
                data.len()
            )));
        }
        let frame = format_frame(slot, data);
        trace!(frame = %hex::encode(frame), "SEND");

        let fallback;
        let state = match state {
            Some(state) => state,
            None => {
                fallback = CommandState::new();
                &fallback
            }
        };

        let prog_seq = self.send_frame(&frame)?;
        let response = self.read_frame(prog_seq, state)?;
        trace!(response = %hex::encode(&response), "RECV");
        Ok(response)
    }

    /// Close the underlying connection
    pub fn close(mut self) -> Result<()> {
        self.connection.close()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Report> {
        let mut report = [0u8; OTP_REPORT_SIZE];
        self.connection.receive(&mut report)?;
        Ok(report)
    }

    fn await_ready_to_write(&mut self) -> Result<()> {
        for _ in 0..WRITE_READY_ATTEMPTS {
            if self.receive()?[FEATURE_RPT_DATA_SIZE] & SLOT_WRITE_FLAG == 0 {
                return Ok(());
            }
            std::thread::sleep(WRITE_READY_INTERVAL);
        }
        Err(Error::Timeout("Timeout waiting for YubiKey to become ready to receive"))
    }

    fn send_frame(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<u8> {
        let prog_seq = self.receive()?[STATUS_OFFSET_PROG_SEQ];
        for (seq, chunk) in frame.chunks(FEATURE_RPT_DATA_SIZE).enumerate() {
            let seq = seq as u8;
            if !should_send(chunk, seq) {
                continue;
            }
            let mut report = [0u8; OTP_REPORT_SIZE];
            report[..FEATURE_RPT_DATA_SIZE].copy_from_slice(chunk);
            report[FEATURE_RPT_DATA_SIZE] = SLOT_WRITE_FLAG | seq;
            self.await_ready_to_write()?;
            self.connection.send(&report)?;
        }
        Ok(prog_seq)
    }

    fn read_frame(&mut self, prog_seq: u8, state: &CommandState) -> Result<Bytes> {
        let mut response = BytesMut::new();
        let mut seq = 0u8;
        let mut needs_touch = false;

        loop {
            let report = self.receive()?;
            let status = report[FEATURE_RPT_DATA_SIZE];

            if status & RESP_PENDING_FLAG != 0 {
                if status & SEQUENCE_MASK == seq {
                    response.extend_from_slice(&report[..FEATURE_RPT_DATA_SIZE]);
                    seq += 1;
                } else if status & SEQUENCE_MASK == 0 {
                    self.reset_state()?;
                    return Ok(response.freeze());
                } else {
                    trace!(status, expected = seq, "Ignoring out of sequence report");
                }
            } else if status == 0 {
                let next_prog_seq = report[STATUS_OFFSET_PROG_SEQ];
                if !response.is_empty() {
                    return Err(Error::invalid_response("Incomplete transfer"));
                }
                let slots_cleared =
                    report[STATUS_OFFSET_TOUCH_LOW] & CONFIG_SLOTS_PROGRAMMED_MASK == 0;
                if next_prog_seq == prog_seq.wrapping_add(1)
                    || (prog_seq > 0 && next_prog_seq == 0 && slots_cleared)
                {
                    debug!(prog_seq = next_prog_seq, "Programming sequence advanced");
                    return Ok(Bytes::copy_from_slice(&report[1..1 + STATUS_SIZE]));
                } else if needs_touch {
                    return Err(Error::Timeout("Timed out waiting for touch"));
                } else {
                    return Err(Error::CommandRejected("No data"));
                }
            } else {
                let interval = if status & RESP_TIMEOUT_WAIT_FLAG != 0 {
                    state.on_keepalive(KeepaliveStatus::UpNeeded);
                    needs_touch = true;
                    TOUCH_POLL_INTERVAL
                } else {
                    state.on_keepalive(KeepaliveStatus::Processing);
                    PROCESSING_POLL_INTERVAL
                };
                if state.wait_for_cancel(interval) {
                    debug!("Cancelled while waiting on device");
                    self.reset_state()?;
                    return Err(Error::Cancelled);
                }
            }
        }
    }

    fn reset_state(&mut self) -> Result<()> {
        let mut report = [0u8; OTP_REPORT_SIZE];
        report[FEATURE_RPT_DATA_SIZE] = DUMMY_REPORT_WRITE;
        if let Err(e) = self.connection.send(&report) {
            warn!(error = %e, "Failed to reset OTP state");
            return Err(e.into());
        }
        Ok(())
    }
}

fn should_send(chunk: &[u8], seq: u8) -> bool {
    seq == 0 || seq == LAST_CHUNK_SEQ || chunk.iter().any(|&b| b != 0)
}

/// 64 byte payload, slot, complemented CRC (LE) and three filler bytes
fn format_frame(slot: u8, data: &[u8]) -> [u8; FRAME_SIZE] {
    let mut frame = [0u8; FRAME_SIZE];
    frame[..data.len()].copy_from_slice(data);
    let crc = !calculate_crc(&frame[..SLOT_DATA_SIZE]);
    frame[SLOT_DATA_SIZE] = slot;
    frame[SLOT_DATA_SIZE + 1..SLOT_DATA_SIZE + 3].copy_from_slice(&crc.to_le_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use parking_lot::Mutex;
    use yubikit_core::TransportError;

    use super::*;
    use crate::crc::check_crc;
    use crate::slot::{CMD_CHALLENGE_HMAC_2, CMD_CONFIG_1, CMD_YK4_CAPABILITIES};

    /// Status report: version, programming sequence and touch level
    fn status_report(version: [u8; 3], prog_seq: u8, touch_low: u8) -> Report {
        [0, version[0], version[1], version[2], prog_seq, touch_low, 0, 0]
    }

    fn pending(data: [u8; 7], seq: u8) -> Report {
        let mut report = [0u8; 8];
        report[..7].copy_from_slice(&data);
        report[7] = RESP_PENDING_FLAG | seq;
        report
    }

    /// Device that answers status reads with `idle` while a frame is being
    /// written, then plays back `responses` once the last chunk arrives.
    /// The final scripted response repeats.
    #[derive(Debug)]
    struct MockOtp {
        idle: Report,
        responses: VecDeque<Report>,
        responding: bool,
        sent: Arc<Mutex<Vec<Report>>>,
    }

    impl MockOtp {
        fn new(idle: Report, responses: Vec<Report>) -> Self {
            Self {
                idle,
                responses: responses.into(),
                responding: false,
                sent: Arc::default(),
            }
        }
    }

    impl OtpConnection for MockOtp {
        fn send(&mut self, report: &Report) -> Result<(), TransportError> {
            self.sent.lock().push(*report);
            match report[7] {
                0x80 => self.responding = false,
                0x89 => self.responding = true,
                _ => {}
            }
            Ok(())
        }

        fn receive(&mut self, report: &mut Report) -> Result<(), TransportError> {
            *report = if !self.responding {
                self.idle
            } else if self.responses.len() > 1 {
                self.responses.pop_front().unwrap_or(self.idle)
            } else {
                self.responses.front().copied().unwrap_or(self.idle)
            };
            Ok(())
        }
    }

    #[test]
    fn test_frame_layout() {
        let frame = format_frame(0x13, &[0xAA, 0xBB]);
        assert_eq!(&frame[..2], &[0xAA, 0xBB]);
        assert_eq!(frame[64], 0x13);
        assert_eq!(&frame[67..], &[0, 0, 0]);

        let mut checked = frame[..64].to_vec();
        checked.extend_from_slice(&frame[65..67]);
        assert!(check_crc(&checked));
    }

    #[test]
    fn test_reads_version_on_open() {
        let protocol = OtpProtocol::new(MockOtp::new(status_report([5, 4, 3], 1, 0), vec![]))
            .unwrap();
        assert_eq!(protocol.version(), Version::new(5, 4, 3));
    }

    #[test]
    fn test_zero_chunks_are_skipped() {
        let idle = status_report([5, 4, 3], 1, 0);
        let mock = MockOtp::new(idle, vec![pending([0; 7], 0)]);
        let sent = mock.sent.clone();
        let mut protocol = OtpProtocol::new(mock).unwrap();

        protocol
            .send_and_receive(CMD_YK4_CAPABILITIES, &[], None)
            .unwrap();
        let sequences: Vec<u8> = sent.lock().iter().map(|r| r[7]).collect();
        // chunk 0, chunk 9 (slot + CRC), then the reset report
        assert_eq!(sequences, vec![0x80, 0x89, DUMMY_REPORT_WRITE]);
    }

    #[test]
    fn test_nonzero_chunks_are_written() {
        let idle = status_report([5, 4, 3], 1, 0);
        let mock = MockOtp::new(idle, vec![status_report([5, 4, 3], 2, 0)]);
        let sent = mock.sent.clone();
        let mut protocol = OtpProtocol::new(mock).unwrap();

        let mut data = [0u8; 64];
        data[20] = 1;
        protocol.send_and_receive(CMD_CONFIG_1, &data, None).unwrap();
        let sequences: Vec<u8> = sent.lock().iter().map(|r| r[7]).collect();
        assert_eq!(sequences, vec![0x80, 0x82, 0x89]);
    }

    #[test]
    fn test_two_chunk_response() {
        let idle = status_report([5, 4, 3], 1, 0);
        let mock = MockOtp::new(
            idle,
            vec![
                pending([1, 2, 3, 4, 5, 6, 7], 0),
                pending([8, 9, 10, 11, 12, 13, 14], 1),
                pending([0; 7], 0),
            ],
        );
        let sent = mock.sent.clone();
        let mut protocol = OtpProtocol::new(mock).unwrap();

        let response = protocol
            .send_and_receive(CMD_CHALLENGE_HMAC_2, &[0x42; 32], None)
            .unwrap();
        assert_eq!(response.as_ref(), (1..=14).collect::<Vec<u8>>().as_slice());
        assert_eq!(sent.lock().last().unwrap()[7], DUMMY_REPORT_WRITE);
    }

    #[test]
    fn test_status_on_prog_seq_advance() {
        let idle = status_report([5, 4, 3], 7, 0x03);
        let mock = MockOtp::new(idle, vec![status_report([5, 4, 3], 8, 0x03)]);
        let mut protocol = OtpProtocol::new(mock).unwrap();
        let status = protocol.send_and_receive(CMD_CONFIG_1, &[1; 64], None).unwrap();
        assert_eq!(status.as_ref(), &[5, 4, 3, 8, 0x03, 0]);
    }

    #[test]
    fn test_status_on_wrap_when_slots_cleared() {
        let idle = status_report([5, 4, 3], 3, 0x01);
        let mock = MockOtp::new(idle, vec![status_report([5, 4, 3], 0, 0x00)]);
        let mut protocol = OtpProtocol::new(mock).unwrap();
        assert!(protocol.send_and_receive(CMD_CONFIG_1, &[], None).is_ok());

        let mock = MockOtp::new(idle, vec![status_report([5, 4, 3], 0, 0x02)]);
        let mut protocol = OtpProtocol::new(mock).unwrap();
        assert!(matches!(
            protocol.send_and_receive(CMD_CONFIG_1, &[], None),
            Err(Error::CommandRejected(_))
        ));
    }

    #[test]
    fn test_no_advance_is_rejected() {
        let idle = status_report([5, 4, 3], 4, 0);
        let mock = MockOtp::new(idle, vec![idle]);
        let mut protocol = OtpProtocol::new(mock).unwrap();
        let err = protocol.send_and_receive(CMD_CONFIG_1, &[1], None).unwrap_err();
        assert!(matches!(err, Error::CommandRejected("No data")));
    }

    #[test]
    fn test_status_after_data_is_incomplete() {
        let idle = status_report([5, 4, 3], 1, 0);
        let mock = MockOtp::new(idle, vec![pending([1; 7], 0), idle]);
        let mut protocol = OtpProtocol::new(mock).unwrap();
        let err = protocol
            .send_and_receive(CMD_CHALLENGE_HMAC_2, &[1], None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[test]
    fn test_touch_then_no_advance_times_out() {
        let idle = status_report([5, 4, 3], 1, 0);
        let mut touch = idle;
        touch[7] = RESP_TIMEOUT_WAIT_FLAG | 0x01;
        let mock = MockOtp::new(idle, vec![touch, idle]);
        let mut protocol = OtpProtocol::new(mock).unwrap();

        let notified = Arc::new(Mutex::new(Vec::new()));
        let seen = notified.clone();
        let state = CommandState::with_keepalive(move |status| seen.lock().push(status));
        let err = protocol
            .send_and_receive(CMD_CHALLENGE_HMAC_2, &[1], Some(&state))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(*notified.lock(), vec![KeepaliveStatus::UpNeeded]);
    }

    #[test]
    fn test_processing_keepalive() {
        let idle = status_report([5, 4, 3], 1, 0);
        let mut busy = idle;
        busy[7] = 0x01;
        let mock = MockOtp::new(idle, vec![busy, busy, pending([9; 7], 0), pending([0; 7], 0)]);
        let mut protocol = OtpProtocol::new(mock).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let state = CommandState::with_keepalive(move |status| {
            assert_eq!(status, KeepaliveStatus::Processing);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let response = protocol
            .send_and_receive(CMD_CHALLENGE_HMAC_2, &[1], Some(&state))
            .unwrap();
        assert_eq!(response.as_ref(), &[9; 7]);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_during_touch_wait() {
        let idle = status_report([5, 4, 3], 1, 0);
        let mut touch = idle;
        touch[7] = RESP_TIMEOUT_WAIT_FLAG;
        let mock = MockOtp::new(idle, vec![touch]);
        let sent = mock.sent.clone();
        let mut protocol = OtpProtocol::new(mock).unwrap();

        let state = Arc::new(CommandState::new());
        let canceller = state.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(250));
            canceller.cancel();
        });

        let started = Instant::now();
        let err = protocol
            .send_and_receive(CMD_CHALLENGE_HMAC_2, &[1], Some(&*state))
            .unwrap_err();
        let cancelled_after = started.elapsed();
        handle.join().unwrap();

        assert!(err.is_timeout());
        assert!(matches!(err, Error::Cancelled));
        assert!(cancelled_after < Duration::from_millis(250) + TOUCH_POLL_INTERVAL);
        assert_eq!(sent.lock().last().unwrap()[7], DUMMY_REPORT_WRITE);
    }

    #[test]
    fn test_write_busy_times_out() {
        let mut busy = status_report([5, 4, 3], 1, 0);
        busy[7] = SLOT_WRITE_FLAG;
        let mut protocol = OtpProtocol::new(MockOtp::new(busy, vec![])).unwrap();
        let err = protocol.send_and_receive(CMD_CONFIG_1, &[1], None).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(protocol.connection().sent.lock().is_empty());
    }

    #[test]
    fn test_payload_too_large() {
        let mut protocol =
            OtpProtocol::new(MockOtp::new(status_report([5, 4, 3], 1, 0), vec![])).unwrap();
        let err = protocol.send_and_receive(CMD_CONFIG_1, &[0; 65], None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(protocol.connection().sent.lock().is_empty());
    }

    #[test]
    fn test_neo_refreshes_status_with_scan_map() {
        let idle = status_report([3, 4, 0], 5, 0);
        let mock = MockOtp::new(idle, vec![idle]);
        let sent = mock.sent.clone();
        let protocol = OtpProtocol::new(mock).unwrap();
        assert_eq!(protocol.version(), Version::new(3, 4, 0));

        let sent = sent.lock();
        assert!(!sent.is_empty());
        assert_eq!(sent[0][..7], [b'c'; 7]);
        assert_eq!(sent[0][7], 0x80);
    }
}
