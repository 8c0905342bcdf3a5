//! CTAPHID command codes and INIT capability flags

use std::fmt;

/// Set on the command byte of every initialization packet
pub const TYPE_INIT: u8 = 0x80;

/// Echo data back
pub const CTAPHID_PING: u8 = 0x81;
/// U2F raw message
pub const CTAPHID_MSG: u8 = 0x83;
/// Lock the channel
pub const CTAPHID_LOCK: u8 = 0x84;
/// Allocate a channel
pub const CTAPHID_INIT: u8 = 0x86;
/// Blink the device LED
pub const CTAPHID_WINK: u8 = 0x88;
/// CTAP2 CBOR message
pub const CTAPHID_CBOR: u8 = 0x90;
/// Cancel the outstanding request
pub const CTAPHID_CANCEL: u8 = 0x91;
/// Device is still working on the request
pub const CTAPHID_KEEPALIVE: u8 = 0xBB;
/// Request failed with a CTAP error code
pub const CTAPHID_ERROR: u8 = 0xBF;

/// Channel used before one has been allocated
pub const BROADCAST_CID: u32 = 0xFFFF_FFFF;

/// Capability flags returned by CTAPHID_INIT
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// Device implements CTAPHID_WINK
    pub const WINK: Self = Self(0x01);
    /// Device implements CTAPHID_CBOR
    pub const CBOR: Self = Self(0x04);
    /// Device does not implement CTAPHID_MSG
    pub const NMSG: Self = Self(0x08);

    /// Wrap raw flag bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw flag bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in [(Self::WINK, "WINK"), (Self::CBOR, "CBOR"), (Self::NMSG, "NMSG")] {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}
