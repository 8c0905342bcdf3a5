//! Error types for PC/SC connections

use thiserror::Error;
use yubikit_core::TransportError;

/// PC/SC-specific errors
#[derive(Debug, Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::Pcsc(pcsc::Error::Timeout) => Self::Timeout,
            PcscError::Pcsc(
                pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard | pcsc::Error::ReaderUnavailable,
            )
            | PcscError::NoCard(_)
            | PcscError::ReaderNotFound(_)
            | PcscError::NoReadersAvailable => Self::Connection,
            PcscError::Pcsc(e) => Self::driver(e as i32),
        }
    }
}
