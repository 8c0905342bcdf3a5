//! CTAPHID protocol for YubiKey FIDO HID interfaces
//!
//! [`FidoProtocol`] allocates a channel with the INIT handshake and then
//! exchanges messages split into fixed size packets tagged with the channel
//! ID. Keepalive frames are forwarded to the [`CommandState`] and a pending
//! cancellation is signalled with CTAPHID_CANCEL.
//!
//! [`CommandState`]: yubikit_core::CommandState
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod hid;
mod protocol;

pub use hid::Capabilities;
pub use protocol::FidoProtocol;
pub use yubikit_core::CtapError;
