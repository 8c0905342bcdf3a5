//! Configuration options for PC/SC connections

use pcsc::{Protocols as PcscProtocols, ShareMode as PcscShareMode};

/// Sharing mode for card connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// Exclusive access to the card
    Exclusive,
    /// Shared access to the card (default)
    Shared,
    /// Direct connection to the reader
    Direct,
}

impl From<ShareMode> for PcscShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
            ShareMode::Direct => Self::Direct,
        }
    }
}

/// How to pick a reader to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStrategy {
    /// Connect to a specific reader by name
    Reader(String),

    /// First reader whose name contains this text, ignoring case
    NameContains(String),

    /// Connect to any reader with a card
    AnyCard,

    /// Connect to the first available reader
    FirstAvailable,
}

impl ConnectStrategy {
    /// Readers exposed by a YubiKey's own CCID interface
    pub fn yubikey() -> Self {
        Self::NameContains("yubico".into())
    }

    pub(crate) fn matches(&self, name: &str, has_card: bool) -> bool {
        match self {
            Self::Reader(reader) => reader == name,
            Self::NameContains(text) => name.to_lowercase().contains(&text.to_lowercase()),
            Self::AnyCard => has_card,
            Self::FirstAvailable => true,
        }
    }
}

/// Configuration options for PC/SC connections
#[derive(Debug, Clone)]
pub struct PcscConfig {
    /// Sharing mode for card connections
    pub share_mode: ShareMode,

    /// Preferred protocols for card communication
    pub protocols: PcscProtocols,

    /// Reconnect once and retry when the card reports a reset
    pub auto_reconnect: bool,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            share_mode: ShareMode::Shared,
            protocols: PcscProtocols::ANY,
            auto_reconnect: true,
        }
    }
}

impl PcscConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sharing mode
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Set the preferred protocols
    pub const fn with_protocols(mut self, protocols: PcscProtocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set whether to automatically reconnect
    pub const fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = PcscConfig::new()
            .with_share_mode(ShareMode::Exclusive)
            .with_protocols(PcscProtocols::T1)
            .with_auto_reconnect(false);
        assert_eq!(config.share_mode, ShareMode::Exclusive);
        assert_eq!(config.protocols, PcscProtocols::T1);
        assert!(!config.auto_reconnect);

        let config = PcscConfig::default();
        assert_eq!(config.share_mode, ShareMode::Shared);
        assert!(config.auto_reconnect);
    }

    #[test]
    fn test_strategy_matching() {
        let name = "Yubico YubiKey OTP+FIDO+CCID 00 00";
        assert!(ConnectStrategy::yubikey().matches(name, false));
        assert!(!ConnectStrategy::yubikey().matches("ACS ACR122U PICC Interface", true));
        assert!(ConnectStrategy::Reader(name.into()).matches(name, false));
        assert!(!ConnectStrategy::Reader("Yubico".into()).matches(name, true));
        assert!(ConnectStrategy::AnyCard.matches(name, true));
        assert!(!ConnectStrategy::AnyCard.matches(name, false));
        assert!(ConnectStrategy::FirstAvailable.matches(name, false));
    }
}
