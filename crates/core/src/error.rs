//! Core error type for all protocol operations
//!
//! Every protocol layer returns this error so that callers can match on the
//! failure class: transport I/O, framing, device status, cancellation or an
//! operation the device firmware cannot do.

use crate::ctap::CtapError;
use crate::response::status::StatusWord;
use crate::tlv::TlvError;
use crate::transport::TransportError;
use crate::version::Version;

/// Result type used throughout the yubikit crates
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Transport related errors
    //
    /// Underlying read or write failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    //
    // Framing related errors
    //
    /// Response framing is malformed or out of sync with the request
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A TLV carried a different tag than the one expected
    #[error("Bad response: expected tag 0x{expected:02x}, got 0x{actual:02x}")]
    UnexpectedTag {
        /// Tag the caller asked for
        expected: u32,
        /// Tag found in the data
        actual: u32,
    },

    /// TLV data could not be decoded
    #[error(transparent)]
    Tlv(#[from] TlvError),

    //
    // Device status errors
    //
    /// APDU completed with a non-success status word
    #[error("APDU error: SW={0} ({desc})", desc = .0.description())]
    Apdu(StatusWord),

    /// SELECT failed because the application is not present
    #[error("Application not available: SW={0}")]
    ApplicationNotAvailable(StatusWord),

    /// FIDO authenticator reported a CTAP error
    #[error("CTAP error: {0}")]
    Ctap(CtapError),

    /// OTP application refused the command
    #[error("Command rejected: {0}")]
    CommandRejected(&'static str),

    //
    // Timeout and cancellation
    //
    /// A polling budget was exhausted
    #[error("Timed out: {0}")]
    Timeout(&'static str),

    /// The command state was cancelled while waiting on the device
    #[error("Command cancelled")]
    Cancelled,

    //
    // Capability errors
    //
    /// The device firmware is too old for the operation
    #[error("Not supported by this device: requires firmware {required}")]
    NotSupported {
        /// Lowest firmware version that supports the operation
        required: Version,
    },

    /// The operation is not available over the active connection
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    //
    // Caller errors
    //
    /// Command fields are invalid
    #[error("Invalid command data: {0}")]
    InvalidCommandData(&'static str),

    /// An argument is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    //
    // General errors
    //
    /// Context error with message and source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a framing error
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Strip any context wrappers
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Status word of an APDU failure, if this is one
    pub fn status_word(&self) -> Option<StatusWord> {
        match self.root() {
            Self::Apdu(sw) | Self::ApplicationNotAvailable(sw) => Some(*sw),
            _ => None,
        }
    }

    /// Whether the device or connection cannot perform the operation
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self.root(),
            Self::NotSupported { .. } | Self::UnsupportedOperation(_)
        )
    }

    /// Whether the operation ended by timeout or cancellation
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout(_) | Self::Cancelled)
    }
}

/// Extension trait for Result with core Errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for Result<T, E> {
    fn context<S: Into<String>>(self, context: S) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
