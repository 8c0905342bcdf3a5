//! OTP application protocol over HID feature reports
//!
//! Commands are 64 byte slot payloads framed with a slot byte and a CRC,
//! written as ten 7 byte chunks. Responses are read back as pending reports
//! or, for configuration commands, as the 6 byte status block.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod crc;
mod protocol;
pub mod slot;

pub use crc::{calculate_crc, check_crc};
pub use protocol::{FEATURE_RPT_DATA_SIZE, OtpProtocol, SLOT_DATA_SIZE, STATUS_SIZE};
