//! OTP application command codes, written to the slot byte of a frame

/// Write configuration to slot 1
pub const CMD_CONFIG_1: u8 = 0x01;
/// Write configuration to slot 2
pub const CMD_CONFIG_2: u8 = 0x03;
/// Update slot 1 without overwriting its secret
pub const CMD_UPDATE_1: u8 = 0x04;
/// Update slot 2 without overwriting its secret
pub const CMD_UPDATE_2: u8 = 0x05;
/// Swap slots 1 and 2
pub const CMD_SWAP: u8 = 0x06;
/// Write NDEF record for slot 1
pub const CMD_NDEF_1: u8 = 0x08;
/// Write NDEF record for slot 2
pub const CMD_NDEF_2: u8 = 0x09;
/// Read serial number
pub const CMD_DEVICE_SERIAL: u8 = 0x10;
/// Set USB mode (legacy)
pub const CMD_DEVICE_CONFIG: u8 = 0x11;
/// Write keyboard scan map
pub const CMD_SCAN_MAP: u8 = 0x12;
/// Read device information TLV block
pub const CMD_YK4_CAPABILITIES: u8 = 0x13;
/// Write device configuration TLV block
pub const CMD_YK4_SET_DEVICE_INFO: u8 = 0x15;
/// Yubico OTP challenge-response on slot 1
pub const CMD_CHALLENGE_OTP_1: u8 = 0x20;
/// Yubico OTP challenge-response on slot 2
pub const CMD_CHALLENGE_OTP_2: u8 = 0x28;
/// HMAC-SHA1 challenge-response on slot 1
pub const CMD_CHALLENGE_HMAC_1: u8 = 0x30;
/// HMAC-SHA1 challenge-response on slot 2
pub const CMD_CHALLENGE_HMAC_2: u8 = 0x38;
