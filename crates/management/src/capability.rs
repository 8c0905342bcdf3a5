//! Application capabilities, USB interfaces and legacy USB modes

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use yubikit_core::{Error, Result};

/// Set of applications, as carried in the supported/enabled TLVs
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capability(u16);

impl Capability {
    /// Yubico OTP
    pub const OTP: Self = Self(0x0001);
    /// FIDO U2F
    pub const U2F: Self = Self(0x0002);
    /// OpenPGP card
    pub const OPENPGP: Self = Self(0x0008);
    /// PIV
    pub const PIV: Self = Self(0x0010);
    /// OATH
    pub const OATH: Self = Self(0x0020);
    /// FIDO2 / CTAP2
    pub const FIDO2: Self = Self(0x0200);

    const NAMED: [(Self, &'static str); 6] = [
        (Self::OTP, "OTP"),
        (Self::U2F, "U2F"),
        (Self::OPENPGP, "OpenPGP"),
        (Self::PIV, "PIV"),
        (Self::OATH, "OATH"),
        (Self::FIDO2, "FIDO2"),
    ];

    /// Wrap raw bits
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// No capabilities
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether no bit is set
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Capability {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Capability {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = Self::NAMED
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(", "))
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({:#06x}: {self})", self.0)
    }
}

/// Set of USB interfaces
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UsbInterface(u8);

impl UsbInterface {
    /// HID keyboard (OTP)
    pub const OTP: Self = Self(0x01);
    /// HID FIDO
    pub const FIDO: Self = Self(0x02);
    /// CCID smart card
    pub const CCID: Self = Self(0x04);

    /// Wrap raw bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Applications reachable over these interfaces
    pub fn capabilities(&self) -> Capability {
        let mut capabilities = Capability::empty();
        if self.contains(Self::OTP) {
            capabilities |= Capability::OTP;
        }
        if self.contains(Self::CCID) {
            capabilities |= Capability::OATH | Capability::PIV | Capability::OPENPGP;
        }
        if self.contains(Self::FIDO) {
            capabilities |= Capability::U2F | Capability::FIDO2;
        }
        capabilities
    }
}

impl BitOr for UsbInterface {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for UsbInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = [(Self::OTP, "OTP"), (Self::FIDO, "FIDO"), (Self::CCID, "CCID")]
            .into_iter()
            .filter(|(iface, _)| self.contains(*iface))
            .map(|(_, name)| name)
            .collect();
        write!(f, "{}", names.join("+"))
    }
}

impl fmt::Debug for UsbInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UsbInterface({self})")
    }
}

/// Interface combinations indexed by legacy mode code
const MODES: [UsbInterface; 7] = [
    UsbInterface::OTP,
    UsbInterface::CCID,
    UsbInterface(0x01 | 0x04),
    UsbInterface::FIDO,
    UsbInterface(0x01 | 0x02),
    UsbInterface(0x02 | 0x04),
    UsbInterface(0x01 | 0x02 | 0x04),
];

/// Legacy USB mode: a non-empty combination of USB interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("{interfaces}")]
pub struct Mode {
    interfaces: UsbInterface,
}

impl Mode {
    /// Mode enabling exactly `interfaces`
    pub fn new(interfaces: UsbInterface) -> Result<Self> {
        if MODES.contains(&interfaces) {
            Ok(Self { interfaces })
        } else {
            Err(Error::InvalidArgument(format!(
                "Invalid USB interface combination: {:#04x}",
                interfaces.bits()
            )))
        }
    }

    /// Mode from its device code; only the low 3 bits are significant
    pub fn from_code(code: u8) -> Result<Self> {
        MODES
            .get(usize::from(code & 0b0000_0111))
            .map(|&interfaces| Self { interfaces })
            .ok_or_else(|| Error::InvalidArgument(format!("Invalid mode code: {code:#04x}")))
    }

    /// Enabled interfaces
    pub const fn interfaces(&self) -> UsbInterface {
        self.interfaces
    }

    /// Device code
    pub fn code(&self) -> u8 {
        MODES
            .iter()
            .position(|&m| m == self.interfaces)
            .map_or(0, |index| index as u8)
    }
}

impl FromStr for Mode {
    type Err = Error;

    /// Parse interface names joined by `+` or `,`, e.g. `otp+ccid`
    fn from_str(s: &str) -> Result<Self> {
        let mut bits = 0u8;
        for name in s.split(['+', ',']).map(str::trim) {
            bits |= match name.to_ascii_uppercase().as_str() {
                "OTP" => UsbInterface::OTP.bits(),
                "FIDO" | "U2F" => UsbInterface::FIDO.bits(),
                "CCID" => UsbInterface::CCID.bits(),
                other => {
                    return Err(Error::InvalidArgument(format!("Unknown USB interface: {other}")));
                }
            };
        }
        Self::new(UsbInterface::from_bits(bits))
    }
}
