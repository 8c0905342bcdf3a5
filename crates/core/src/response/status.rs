//! Status word definitions for APDU responses

use std::fmt;

use tracing::Level;

/// Status Word (SW1-SW2) from an APDU response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Success (90 00)
    pub const SUCCESS: Self = Self::new(0x90, 0x00);
    /// More data available (61 XX), SW2 carries the remaining length
    pub const MORE_DATA: Self = Self::new(0x61, 0x00);
    /// Wrong length (67 00)
    pub const WRONG_LENGTH: Self = Self::new(0x67, 0x00);
    /// Security condition not satisfied (69 82)
    pub const SECURITY_CONDITION_NOT_SATISFIED: Self = Self::new(0x69, 0x82);
    /// Conditions of use not satisfied (69 85)
    pub const CONDITIONS_NOT_SATISFIED: Self = Self::new(0x69, 0x85);
    /// Command not allowed (69 86)
    pub const COMMAND_NOT_ALLOWED: Self = Self::new(0x69, 0x86);
    /// Incorrect data field (6A 80)
    pub const INCORRECT_DATA: Self = Self::new(0x6A, 0x80);
    /// File or application not found (6A 82)
    pub const FILE_NOT_FOUND: Self = Self::new(0x6A, 0x82);
    /// Incorrect P1-P2 (6A 86)
    pub const INCORRECT_P1P2: Self = Self::new(0x6A, 0x86);
    /// Instruction not supported, reported by older firmware for unknown AIDs (6D 00)
    pub const INVALID_INSTRUCTION: Self = Self::new(0x6D, 0x00);
    /// Class not supported (6E 00)
    pub const CLASS_NOT_SUPPORTED: Self = Self::new(0x6E, 0x00);

    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create from a u16 value (SW1 | SW2)
    pub const fn from_u16(status: u16) -> Self {
        Self {
            sw1: (status >> 8) as u8,
            sw2: status as u8,
        }
    }

    /// Convert to a u16 value (SW1 | SW2)
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Check if this status word indicates success (90 00)
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Check if this status word indicates more data is available (61 XX)
    pub const fn is_more_data_available(&self) -> bool {
        self.sw1 == 0x61
    }

    /// Number of bytes the card reports as pending when SW1 = 61
    pub const fn remaining_bytes(&self) -> Option<u8> {
        if self.is_more_data_available() {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Whether a SELECT answering with this status means the application is absent
    pub const fn is_application_missing(&self) -> bool {
        matches!((self.sw1, self.sw2), (0x6A, 0x82) | (0x6D, 0x00))
    }

    /// Get the appropriate tracing level for this status word
    pub const fn tracing_level(&self) -> Level {
        if self.is_success() || self.is_more_data_available() {
            Level::DEBUG
        } else if self.sw1 == 0x62 || self.sw1 == 0x63 {
            Level::INFO
        } else {
            Level::WARN
        }
    }

    /// Get a description of this status word
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Success",
            (0x61, _) => "More data available",
            (0x62, 0x00) => "No information given",
            (0x63, n) if (n & 0xF0) == 0xC0 => "Verification failed, retries remaining",
            (0x65, 0x81) => "Memory failure",
            (0x67, 0x00) => "Wrong length",
            (0x68, 0x82) => "Secure messaging not supported",
            (0x69, 0x82) => "Security status not satisfied",
            (0x69, 0x83) => "Authentication method blocked",
            (0x69, 0x84) => "Referenced data invalidated",
            (0x69, 0x85) => "Conditions of use not satisfied",
            (0x69, 0x86) => "Command not allowed",
            (0x6A, 0x80) => "Incorrect parameters in the data field",
            (0x6A, 0x81) => "Function not supported",
            (0x6A, 0x82) => "File not found",
            (0x6A, 0x84) => "Not enough memory space in the file",
            (0x6A, 0x86) => "Incorrect parameters P1-P2",
            (0x6A, 0x88) => "Referenced data not found",
            (0x6B, 0x00) => "Wrong parameters P1-P2",
            (0x6C, _) => "Wrong Le field",
            (0x6D, 0x00) => "Instruction code not supported or invalid",
            (0x6E, 0x00) => "Class not supported",
            (0x6F, 0x00) => "No precise diagnosis",
            _ => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        Self::from_u16(status)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_from_to_u16() {
        let sw = StatusWord::from_u16(0x6A82);
        assert_eq!(sw.sw1, 0x6A);
        assert_eq!(sw.sw2, 0x82);
        assert_eq!(sw.to_u16(), 0x6A82);
        assert_eq!(sw, StatusWord::FILE_NOT_FOUND);
    }

    #[test]
    fn test_remaining_bytes() {
        assert_eq!(StatusWord::new(0x61, 0x15).remaining_bytes(), Some(0x15));
        assert_eq!(StatusWord::SUCCESS.remaining_bytes(), None);
    }

    #[test]
    fn test_application_missing() {
        assert!(StatusWord::FILE_NOT_FOUND.is_application_missing());
        assert!(StatusWord::INVALID_INSTRUCTION.is_application_missing());
        assert!(!StatusWord::COMMAND_NOT_ALLOWED.is_application_missing());
    }

    #[test]
    fn test_display_and_description() {
        assert_eq!(StatusWord::new(0x6D, 0x00).to_string(), "6D00");
        assert_eq!(StatusWord::SUCCESS.description(), "Success");
        assert_eq!(StatusWord::new(0x63, 0xC2).tracing_level(), Level::INFO);
        assert_eq!(StatusWord::INCORRECT_P1P2.tracing_level(), Level::WARN);
    }
}
