//! Firmware version triple

use std::str::FromStr;

use derive_more::Display;

use crate::{Error, Result};

/// Largest value of a single version component
const MAX_COMPONENT: u8 = 127;

/// Firmware version (major.minor.micro)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display)]
#[display("{}.{}.{}", major, minor, micro)]
pub struct Version {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Micro version
    pub micro: u8,
}

impl Version {
    /// Create a version from its parts
    pub const fn new(major: u8, minor: u8, micro: u8) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }

    /// Read a version from the first three bytes of `bytes`
    ///
    /// Each component must be in `0..=127`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [major, minor, micro, ..] => {
                if [major, minor, micro].iter().any(|&&part| part > MAX_COMPONENT) {
                    return Err(Error::invalid_response(format!(
                        "Version component out of range: {major}.{minor}.{micro}"
                    )));
                }
                Ok(Self::new(*major, *minor, *micro))
            }
            _ => Err(Error::invalid_response(format!(
                "Version needs 3 bytes, got {}",
                bytes.len()
            ))),
        }
    }

    /// Encode as `[major, minor, micro]`
    pub const fn to_bytes(&self) -> [u8; 3] {
        [self.major, self.minor, self.micro]
    }

    /// Find the first `a.b.c` triple embedded in a longer string
    ///
    /// The management application answers SELECT with a banner such as
    /// `"Virtual mgr - FW version 5.2.1"`.
    pub fn parse_embedded(text: &str) -> Option<Self> {
        text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .flat_map(|word| {
                let parts: Vec<&str> = word.split('.').collect();
                parts
                    .windows(3)
                    .map(|w| format!("{}.{}.{}", w[0], w[1], w[2]))
                    .collect::<Vec<_>>()
            })
            .find_map(|candidate| candidate.parse().ok())
    }

    /// Whether this version is at least `major.minor.micro`
    pub fn is_at_least(&self, major: u8, minor: u8, micro: u8) -> bool {
        *self >= Self::new(major, minor, micro)
    }

    /// Whether this version is below `major.minor.micro`
    pub fn is_less_than(&self, major: u8, minor: u8, micro: u8) -> bool {
        *self < Self::new(major, minor, micro)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let mut next = || -> Result<u8> {
            parts
                .next()
                .and_then(|p| p.parse::<u8>().ok())
                .filter(|v| *v <= MAX_COMPONENT)
                .ok_or_else(|| Error::InvalidArgument(format!("Invalid version string: {s}")))
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(Error::InvalidArgument(format!("Invalid version string: {s}")));
        }
        Ok(version)
    }
}

impl From<[u8; 3]> for Version {
    fn from(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }
}
