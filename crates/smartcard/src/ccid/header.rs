//! CCID bulk message header

use bytes::{Buf, BufMut, BytesMut};
use yubikit_core::TransportError;

/// Size of every CCID bulk message header
pub const HEADER_SIZE: usize = 10;

/// PC_to_RDR_IccPowerOn
pub const MESSAGE_TYPE_POWER_ON: u8 = 0x62;
/// PC_to_RDR_XfrBlock
pub const MESSAGE_TYPE_XFR_BLOCK: u8 = 0x6F;
/// RDR_to_PC_DataBlock
pub const MESSAGE_TYPE_DATA_BLOCK: u8 = 0x80;

/// Status bit signalling the reader needs more time
pub const STATUS_TIME_EXTENSION: u8 = 0x80;

const SLOT: u8 = 0;

/// Decoded 10 byte little-endian header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcidHeader {
    /// Message type
    pub message_type: u8,
    /// Length of the data following the header
    pub length: u32,
    /// Slot number, always 0 for YubiKeys
    pub slot: u8,
    /// Sequence number echoed by the reader
    pub sequence: u8,
    /// Slot status (responses) or first RFU byte (commands)
    pub status: u8,
    /// Slot error (responses) or second RFU byte (commands)
    pub error: u8,
    /// Message specific byte
    pub specific: u8,
}

impl CcidHeader {
    /// Header for an outgoing command
    pub const fn command(message_type: u8, length: u32, sequence: u8) -> Self {
        Self {
            message_type,
            length,
            slot: SLOT,
            sequence,
            status: 0,
            error: 0,
            specific: 0,
        }
    }

    /// Append the encoded header to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.message_type);
        buf.put_u32_le(self.length);
        buf.put_u8(self.slot);
        buf.put_u8(self.sequence);
        buf.put_u8(self.status);
        buf.put_u8(self.error);
        buf.put_u8(self.specific);
    }

    /// Decode a header from the start of `data`
    pub fn decode(mut data: &[u8]) -> Result<Self, TransportError> {
        if data.len() < HEADER_SIZE {
            return Err(TransportError::framing(format!(
                "response shorter than header ({} bytes)",
                data.len()
            )));
        }
        Ok(Self {
            message_type: data.get_u8(),
            length: data.get_u32_le(),
            slot: data.get_u8(),
            sequence: data.get_u8(),
            status: data.get_u8(),
            error: data.get_u8(),
            specific: data.get_u8(),
        })
    }

    /// Whether the reader asked for more time instead of answering
    pub const fn is_time_extension(&self) -> bool {
        self.status & STATUS_TIME_EXTENSION != 0
    }

    /// Check a response header against the command it answers
    pub fn validate_response(&self, sequence: u8) -> Result<(), TransportError> {
        if self.message_type != MESSAGE_TYPE_DATA_BLOCK {
            return Err(TransportError::framing(format!(
                "unexpected message type {:#04x}",
                self.message_type
            )));
        }
        if self.slot != SLOT {
            return Err(TransportError::framing(format!("unexpected slot {}", self.slot)));
        }
        if self.sequence != sequence {
            return Err(TransportError::framing(format!(
                "sequence mismatch: sent {sequence}, got {}",
                self.sequence
            )));
        }
        if self.status != 0 && !self.is_time_extension() {
            return Err(TransportError::framing(format!(
                "slot status {:#04x}, error {:#04x}",
                self.status, self.error
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_header_layout() {
        let mut buf = BytesMut::new();
        CcidHeader::command(MESSAGE_TYPE_XFR_BLOCK, 0x0105, 7).encode_into(&mut buf);
        assert_eq!(hex::encode(&buf), "6f050100000007000000");
    }

    #[test]
    fn test_decode_response() {
        let header = CcidHeader::decode(&hex::decode("80020000000003000000aabb").unwrap()).unwrap();
        assert_eq!(header.message_type, MESSAGE_TYPE_DATA_BLOCK);
        assert_eq!(header.length, 2);
        assert_eq!(header.sequence, 3);
        assert!(header.validate_response(3).is_ok());
        assert!(matches!(
            header.validate_response(4),
            Err(TransportError::Framing(_))
        ));
    }

    #[test]
    fn test_time_extension_ignores_error_byte() {
        let header = CcidHeader::decode(&hex::decode("80000000000001800500").unwrap()).unwrap();
        assert!(header.is_time_extension());
        assert!(header.validate_response(1).is_ok());

        let failed = CcidHeader::decode(&hex::decode("80000000000001400500").unwrap()).unwrap();
        assert!(failed.validate_response(1).is_err());
    }

    #[test]
    fn test_rejects_short_or_foreign_headers() {
        assert!(CcidHeader::decode(&[0x80, 0, 0]).is_err());
        let wrong_slot = CcidHeader::decode(&hex::decode("80000000000101000000").unwrap()).unwrap();
        assert!(wrong_slot.validate_response(1).is_err());
        let wrong_type = CcidHeader::decode(&hex::decode("81000000000001000000").unwrap()).unwrap();
        assert!(wrong_type.validate_response(1).is_err());
    }
}
