//! YubiKey management session
//!
//! [`ManagementSession`] reads [`DeviceInfo`] and writes [`DeviceConfig`]
//! over whichever interface is available. A smart card connection is
//! preferred, then OTP, then FIDO.
//!
//! ```no_run
//! # fn run(connection: Box<dyn yubikit_core::SmartCardConnection>) -> yubikit_core::Result<()> {
//! use yubikit_management::{DeviceConnection, ManagementSession};
//!
//! let mut session = ManagementSession::open(DeviceConnection::SmartCard(connection))?;
//! let info = session.get_device_info()?;
//! println!("serial: {:?}, firmware {}", info.serial(), info.version());
//! session.close()?;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod backend;
pub mod capability;
pub mod device;
mod session;

pub use backend::{BackendKind, DeviceConnection};
pub use capability::{Capability, Mode, UsbInterface};
pub use device::{DeviceConfig, DeviceConfigBuilder, DeviceInfo, FormFactor, LockCode};
pub use session::ManagementSession;
