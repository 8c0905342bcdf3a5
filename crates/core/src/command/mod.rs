//! APDU command definitions
//!
//! [`Apdu`] is the immutable ISO/IEC 7816-4 command envelope handed to the
//! smart-card protocol. It carries no length encoding of its own: short or
//! extended form, and chaining, are decided by the protocol at send time.

use std::fmt;

use bytes::Bytes;

use crate::{Error, Result};

/// ISO/IEC 7816-4 command APDU
#[derive(Clone, PartialEq, Eq)]
pub struct Apdu {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Bytes,
}

impl Apdu {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Bytes::new(),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: data.into(),
        }
    }

    /// Create a command from integer header fields, each of which must fit in one byte
    pub fn try_new<T: Into<Bytes>>(cla: u32, ins: u32, p1: u32, p2: u32, data: T) -> Result<Self> {
        Ok(Self::new_with_data(
            header_byte(cla, "CLA does not fit in a byte")?,
            header_byte(ins, "INS does not fit in a byte")?,
            header_byte(p1, "P1 does not fit in a byte")?,
            header_byte(p2, "P2 does not fit in a byte")?,
            data,
        ))
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = data.into();
        self
    }

    /// Command class (CLA)
    pub const fn cla(&self) -> u8 {
        self.cla
    }

    /// Instruction code (INS)
    pub const fn ins(&self) -> u8 {
        self.ins
    }

    /// First parameter (P1)
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter (P2)
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Command payload, empty when the command carries no data
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

fn header_byte(value: u32, message: &'static str) -> Result<u8> {
    u8::try_from(value).map_err(|_| Error::InvalidCommandData(message))
}

impl fmt::Debug for Apdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Apdu")
            .field("cla", &format_args!("{:#04x}", self.cla))
            .field("ins", &format_args!("{:#04x}", self.ins))
            .field("p1", &format_args!("{:#04x}", self.p1))
            .field("p2", &format_args!("{:#04x}", self.p2))
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_validates_header() {
        let apdu = Apdu::try_new(0x00, 0xA4, 0x04, 0x00, vec![0xA0, 0x00]).unwrap();
        assert_eq!(apdu.cla(), 0x00);
        assert_eq!(apdu.ins(), 0xA4);
        assert_eq!(apdu.p1(), 0x04);
        assert_eq!(apdu.p2(), 0x00);
        assert_eq!(apdu.data(), &[0xA0, 0x00]);

        assert!(matches!(
            Apdu::try_new(0x100, 0xA4, 0, 0, Bytes::new()),
            Err(Error::InvalidCommandData(_))
        ));
        assert!(Apdu::try_new(0, 0, 0, 256, Bytes::new()).is_err());
    }

    #[test]
    fn test_header_only_command_has_empty_data() {
        let apdu = Apdu::new(0x00, 0x1D, 0x00, 0x00);
        assert!(apdu.data().is_empty());
        assert_eq!(apdu.clone().with_data(vec![1, 2]).data(), &[1, 2]);
    }
}
