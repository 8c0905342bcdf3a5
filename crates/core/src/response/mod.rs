//! APDU response definitions
//!
//! A response is kept as the raw bytes received from the card. The status
//! word and payload are sliced out on demand.

pub mod status;

use bytes::Bytes;
use tracing::trace;

use crate::{Error, Result};
use status::StatusWord;

/// Raw APDU response, status word included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    raw: Bytes,
}

impl ApduResponse {
    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        if raw.len() < 2 {
            return Err(Error::invalid_response(format!(
                "APDU response too short: {} bytes",
                raw.len()
            )));
        }

        let response = Self { raw };
        trace!(
            sw = %response.status_word(),
            payload_len = response.data().len(),
            "Parsed APDU response"
        );
        Ok(response)
    }

    /// The status word (last two bytes, big-endian)
    pub fn status_word(&self) -> StatusWord {
        let len = self.raw.len();
        StatusWord::new(self.raw[len - 2], self.raw[len - 1])
    }

    /// Response payload without the status word
    pub fn data(&self) -> &[u8] {
        &self.raw[..self.raw.len() - 2]
    }

    /// Response payload as a cheaply cloneable buffer
    pub fn payload(&self) -> Bytes {
        self.raw.slice(..self.raw.len() - 2)
    }

    /// The full response as received
    pub const fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Check if the response indicates success
    pub fn is_success(&self) -> bool {
        self.status_word().is_success()
    }

    /// Return the payload on 90 00, otherwise an [`Error::Apdu`] carrying the status word
    pub fn into_result(self) -> Result<Bytes> {
        let sw = self.status_word();
        if sw.is_success() {
            Ok(self.payload())
        } else {
            Err(Error::Apdu(sw))
        }
    }
}

impl TryFrom<&[u8]> for ApduResponse {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        Self::from_bytes(Bytes::copy_from_slice(data))
    }
}

impl TryFrom<Bytes> for ApduResponse {
    type Error = Error;

    fn try_from(data: Bytes) -> Result<Self> {
        Self::from_bytes(data)
    }
}

impl From<ApduResponse> for Bytes {
    fn from(response: ApduResponse) -> Self {
        response.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_from_bytes() {
        let resp = ApduResponse::from_bytes(Bytes::from_static(&[0x01, 0x02, 0x03, 0x90, 0x00]))
            .unwrap();
        assert_eq!(resp.data(), &[0x01, 0x02, 0x03]);
        assert_eq!(resp.status_word(), StatusWord::SUCCESS);
        assert!(resp.is_success());

        let resp = ApduResponse::from_bytes(Bytes::from_static(&[0x6A, 0x82])).unwrap();
        assert!(resp.data().is_empty());
        assert_eq!(resp.status_word().to_u16(), 0x6A82);

        assert!(ApduResponse::from_bytes(Bytes::from_static(&[0x90])).is_err());
        assert!(ApduResponse::from_bytes(Bytes::new()).is_err());
    }

    #[test]
    fn test_response_into_result() {
        let ok = ApduResponse::try_from(&[0xAA, 0x90, 0x00][..]).unwrap();
        assert_eq!(ok.into_result().unwrap().as_ref(), &[0xAA]);

        let err = ApduResponse::try_from(&[0x69, 0x82][..]).unwrap();
        match err.into_result() {
            Err(Error::Apdu(sw)) => assert_eq!(sw, StatusWord::SECURITY_CONDITION_NOT_SATISFIED),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
