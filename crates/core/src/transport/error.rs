//! Error types specific to device connections

use thiserror::Error;

/// Transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection error
    #[error("Failed to connect to device")]
    Connection,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// A write moved fewer bytes than requested
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes the caller asked to move
        expected: usize,
        /// Bytes actually moved
        written: usize,
    },

    /// Device error
    #[error("Device error")]
    Device,

    /// Reader-level framing did not match the request
    #[error("Invalid response from card reader: {0}")]
    Framing(String),

    /// Driver error (with code)
    #[error("Driver error code: {0}")]
    Driver(i32),

    /// Operation timed out at the transport level
    #[error("Operation timed out")]
    Timeout,

    /// Connection has been closed
    #[error("Connection closed")]
    Closed,

    /// I/O error from the operating system
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a new driver error
    pub const fn driver(code: i32) -> Self {
        Self::Driver(code)
    }

    /// Create a reader framing error
    pub fn framing<S: Into<String>>(message: S) -> Self {
        Self::Framing(message.into())
    }

    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }
}
