//! PC/SC smart card connections
//!
//! Provides [`PcscTransport`], an implementation of
//! [`SmartCardConnection`](yubikit_core::SmartCardConnection) backed by the
//! system PC/SC service. Covers both USB CCID readers and NFC readers.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use yubikit_core::Apdu;
//! use yubikit_pcsc::PcscDeviceManager;
//! use yubikit_smartcard::SmartCardProtocol;
//!
//! let manager = PcscDeviceManager::new()?;
//! let readers = manager.list_readers()?;
//! let Some(reader) = readers.iter().find(|r| r.has_card()) else {
//!     println!("No card present");
//!     return Ok(());
//! };
//!
//! let transport = manager.open_reader(reader.name())?;
//! let mut protocol = SmartCardProtocol::new(transport);
//! let banner = protocol.select(&hex::decode("a000000527471117")?)?;
//! println!("{}", String::from_utf8_lossy(&banner));
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use config::{ConnectStrategy, PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols};
