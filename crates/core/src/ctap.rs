//! CTAP status codes reported by a FIDO authenticator

use std::fmt;

macro_rules! ctap_errors {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)*) => {
        /// Error code carried by a CTAPHID_ERROR frame or a CTAP2 response
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CtapError {
            $($(#[$doc])* $name,)*
            /// A code not in the CTAP 2.1 table
            Other(u8),
        }

        impl CtapError {
            /// The raw status byte
            pub const fn code(&self) -> u8 {
                match self {
                    $(Self::$name => $code,)*
                    Self::Other(code) => *code,
                }
            }

            /// Symbolic name of the code
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                    Self::Other(_) => "Other",
                }
            }
        }

        impl From<u8> for CtapError {
            fn from(code: u8) -> Self {
                match code {
                    $($code => Self::$name,)*
                    other => Self::Other(other),
                }
            }
        }
    };
}

ctap_errors! {
    /// Invalid command
    InvalidCommand = 0x01,
    /// Invalid parameter in request
    InvalidParameter = 0x02,
    /// Invalid message or item length
    InvalidLength = 0x03,
    /// Invalid message sequencing
    InvalidSeq = 0x04,
    /// Message timed out
    Timeout = 0x05,
    /// Channel busy
    ChannelBusy = 0x06,
    /// Command requires channel lock
    LockRequired = 0x0A,
    /// Invalid channel
    InvalidChannel = 0x0B,
    /// CBOR unexpected type
    CborUnexpectedType = 0x11,
    /// Invalid CBOR encoding
    InvalidCbor = 0x12,
    /// Missing required parameter
    MissingParameter = 0x14,
    /// Limit exceeded
    LimitExceeded = 0x15,
    /// Unsupported extension
    UnsupportedExtension = 0x16,
    /// Fingerprint database full
    FpDatabaseFull = 0x17,
    /// Large blob storage full
    LargeBlobStorageFull = 0x18,
    /// Credential excluded
    CredentialExcluded = 0x19,
    /// Processing
    Processing = 0x21,
    /// Invalid credential
    InvalidCredential = 0x22,
    /// User action pending
    UserActionPending = 0x23,
    /// Operation pending
    OperationPending = 0x24,
    /// No outstanding operations
    NoOperations = 0x25,
    /// Unsupported algorithm
    UnsupportedAlgorithm = 0x26,
    /// Operation denied
    OperationDenied = 0x27,
    /// Key store full
    KeyStoreFull = 0x28,
    /// Not busy
    NotBusy = 0x29,
    /// No operation pending
    NoOperationPending = 0x2A,
    /// Unsupported option
    UnsupportedOption = 0x2B,
    /// Invalid option
    InvalidOption = 0x2C,
    /// Pending keepalive was cancelled
    KeepaliveCancel = 0x2D,
    /// No valid credentials
    NoCredentials = 0x2E,
    /// User action timed out
    UserActionTimeout = 0x2F,
    /// Not allowed
    NotAllowed = 0x30,
    /// PIN invalid
    PinInvalid = 0x31,
    /// PIN blocked
    PinBlocked = 0x32,
    /// PIN auth invalid
    PinAuthInvalid = 0x33,
    /// PIN auth blocked
    PinAuthBlocked = 0x34,
    /// PIN not set
    PinNotSet = 0x35,
    /// PIN required
    PinRequired = 0x36,
    /// PIN policy violation
    PinPolicyViolation = 0x37,
    /// PIN token expired
    PinTokenExpired = 0x38,
    /// Request too large
    RequestTooLarge = 0x39,
    /// Action timed out
    ActionTimeout = 0x3A,
    /// User presence required
    UpRequired = 0x3B,
    /// Built-in user verification blocked
    UvBlocked = 0x3C,
    /// Integrity failure
    IntegrityFailure = 0x3D,
    /// Invalid subcommand
    InvalidSubcommand = 0x3E,
    /// User verification invalid
    UvInvalid = 0x3F,
    /// Unauthorized permission
    UnauthorizedPermission = 0x40,
    /// Other unspecified error
    Unspecified = 0x7F,
    /// Extension first
    ExtensionFirst = 0xE0,
    /// Extension last
    ExtensionLast = 0xEF,
    /// Vendor first
    VendorFirst = 0xF0,
    /// Vendor last
    VendorLast = 0xFF,
}

impl fmt::Display for CtapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.name(), self.code())
    }
}
