//! Core traits and types for talking to YubiKey-class security tokens
//!
//! This crate provides the pieces every protocol layer shares:
//!
//! - [`Apdu`] and [`ApduResponse`] value types for ISO/IEC 7816-4 traffic
//! - a BER-TLV codec ([`Tlv`], [`TlvMap`]) used for device configuration
//! - the firmware [`Version`] triple
//! - [`CommandState`], the cooperative cancellation and keepalive primitive
//! - connection traits for the three framings a key exposes: smart card
//!   ([`SmartCardConnection`]), OTP HID reports ([`OtpConnection`]) and
//!   FIDO HID packets ([`FidoConnection`])
//! - the shared [`Error`] taxonomy
//!
//! Connections are supplied already opened; this crate never enumerates or
//! opens devices.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod ctap;
pub mod response;
pub mod state;
pub mod tlv;
pub mod transport;
pub mod version;

mod error;
pub use error::{Error, Result, ResultExt};

pub use command::Apdu;
pub use ctap::CtapError;
pub use response::ApduResponse;
pub use response::status::StatusWord;
pub use state::{CommandState, KeepaliveStatus};
pub use tlv::{Tlv, TlvError, TlvMap};
pub use transport::{
    FidoConnection, OtpConnection, SmartCardConnection, Transport, TransportError,
};
pub use version::Version;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Apdu, ApduResponse, Bytes, BytesMut, CommandState, Error, FidoConnection,
        KeepaliveStatus, OtpConnection, Result, ResultExt, SmartCardConnection, StatusWord,
        Transport, TransportError, Version,
    };
}
