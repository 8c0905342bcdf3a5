//! Smart card protocol layer for YubiKey devices
//!
//! [`SmartCardProtocol`] turns [`Apdu`](yubikit_core::Apdu) values into
//! short or extended form bytes, chains oversized payloads and follows
//! `61xx` continuations. [`ccid::UsbCcidConnection`] provides the raw byte
//! exchange over a USB CCID bulk pipe.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod ccid;
mod protocol;

pub use ccid::{BulkPipe, CcidConfig, UsbCcidConnection};
pub use protocol::{ApduFormat, SmartCardProtocol};
