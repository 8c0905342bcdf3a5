//! Cooperative cancellation and keepalive feedback for long-running commands
//!
//! A [`CommandState`] is created per logical operation and shared (usually
//! through an `Arc`) between the thread driving the protocol and whoever may
//! want to cancel it. Cancellation is observed between I/O steps only.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::debug;

/// Status reported by the device while a command is still running
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum KeepaliveStatus {
    /// The device is busy processing
    #[display("processing")]
    Processing,
    /// The device waits for the user to touch it
    #[display("touch needed")]
    UpNeeded,
    /// A status code this library does not know
    #[display("unknown status {_0:#04x}")]
    Other(u8),
}

impl KeepaliveStatus {
    /// CTAPHID keepalive code
    pub const fn code(&self) -> u8 {
        match self {
            Self::Processing => 1,
            Self::UpNeeded => 2,
            Self::Other(code) => *code,
        }
    }
}

impl From<u8> for KeepaliveStatus {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::Processing,
            2 => Self::UpNeeded,
            other => Self::Other(other),
        }
    }
}

type KeepaliveCallback = Box<dyn Fn(KeepaliveStatus) + Send + Sync>;

/// Shared cancellation flag with a keepalive callback
pub struct CommandState {
    cancelled: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    on_keepalive: Option<KeepaliveCallback>,
}

impl CommandState {
    /// Create a state that logs keepalive notifications
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            cancelled: AtomicBool::new(false),
            wake_tx,
            wake_rx,
            on_keepalive: None,
        }
    }

    /// Create a state that forwards keepalive notifications to `callback`
    pub fn with_keepalive<F>(callback: F) -> Self
    where
        F: Fn(KeepaliveStatus) + Send + Sync + 'static,
    {
        Self {
            on_keepalive: Some(Box::new(callback)),
            ..Self::new()
        }
    }

    /// Request cancellation. Once cancelled a state never resets.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("Command cancelled");
            let _ = self.wake_tx.try_send(());
        }
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Block for up to `timeout`, returning early if the state gets cancelled
    ///
    /// Returns whether the state is cancelled. A zero timeout only checks the flag.
    pub fn wait_for_cancel(&self, timeout: Duration) -> bool {
        if self.is_cancelled() || timeout.is_zero() {
            return self.is_cancelled();
        }
        if self.wake_rx.recv_timeout(timeout).is_ok() {
            // leave the wake-up in place for any later waiter
            let _ = self.wake_tx.try_send(());
        }
        self.is_cancelled()
    }

    /// Deliver a keepalive status from the device
    pub fn on_keepalive(&self, status: KeepaliveStatus) {
        match &self.on_keepalive {
            Some(callback) => callback(status),
            None => debug!(%status, "Keepalive"),
        }
    }
}

impl Default for CommandState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandState")
            .field("cancelled", &self.is_cancelled())
            .field("has_keepalive_callback", &self.on_keepalive.is_some())
            .finish()
    }
}
