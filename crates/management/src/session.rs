//! Management session

use tracing::{debug, info, instrument};
use yubikit_core::{Error, Result, Transport, Version};

use crate::backend::{Backend, BackendKind, DeviceConnection, DeviceProtocol};
use crate::capability::Mode;
use crate::device::{DeviceConfig, DeviceInfo, LockCode};

/// Session with the management application of one device
///
/// The session owns its connection until [`close`](Self::close) is called.
#[derive(Debug)]
pub struct ManagementSession {
    backend: Backend,
    version: Version,
}

impl ManagementSession {
    /// Open a session over `connection`
    pub fn open(connection: DeviceConnection) -> Result<Self> {
        let kind = connection.kind();
        let (backend, version) = Backend::open(connection)?;
        info!(backend = %kind, %version, "Management session opened");
        Ok(Self { backend, version })
    }

    /// Open a session over the most capable of `connections`
    ///
    /// Smart card is preferred over OTP, OTP over FIDO. A connection whose
    /// management application is not available is skipped in favour of the
    /// next one.
    pub fn open_preferred<I>(connections: I) -> Result<Self>
    where
        I: IntoIterator<Item = DeviceConnection>,
    {
        let mut connections: Vec<_> = connections.into_iter().collect();
        connections.sort_by_key(DeviceConnection::kind);

        let mut last_error = None;
        for connection in connections {
            let kind = connection.kind();
            match Self::open(connection) {
                Err(e @ Error::ApplicationNotAvailable(_)) => {
                    debug!(backend = %kind, "Management not available, trying next connection");
                    last_error = Some(e);
                }
                result => return result,
            }
        }
        Err(last_error.unwrap_or_else(|| {
            Error::InvalidArgument("No connection to open a session on".into())
        }))
    }

    /// Firmware version of the device
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Wire protocol in use
    pub const fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Read device information. Requires firmware 4.1.0 or later.
    #[instrument(level = "trace", skip(self))]
    pub fn get_device_info(&mut self) -> Result<DeviceInfo> {
        self.require_version(Version::new(4, 1, 0))?;
        let response = self.backend.read_config()?;
        DeviceInfo::parse(&response, self.version)
    }

    /// Write device configuration. Requires firmware 5.0.0 or later.
    #[instrument(level = "trace", skip_all, fields(reboot = reboot))]
    pub fn update_device_config(
        &mut self,
        config: &DeviceConfig,
        reboot: bool,
        current_lock_code: Option<&LockCode>,
        new_lock_code: Option<&LockCode>,
    ) -> Result<()> {
        self.require_version(Version::new(5, 0, 0))?;
        let data = config.to_bytes(reboot, current_lock_code, new_lock_code)?;
        self.backend.write_config(&data)
    }

    /// Set the enabled USB interfaces
    ///
    /// From firmware 5.0.0 this is written as a device configuration.
    /// Older devices (3.0.0 and later) take the legacy mode command.
    #[instrument(level = "trace", skip(self))]
    pub fn set_mode(
        &mut self,
        mode: Mode,
        challenge_response_timeout: u8,
        auto_eject_timeout: u16,
    ) -> Result<()> {
        if self.version.is_at_least(5, 0, 0) {
            let config = DeviceConfig::builder()
                .enabled_capabilities(Transport::Usb, mode.interfaces().capabilities())
                .challenge_response_timeout(challenge_response_timeout)
                .auto_eject_timeout(auto_eject_timeout)
                .build();
            debug!(%mode, "Translating mode switch into device config");
            return self.update_device_config(&config, false, None, None);
        }

        self.require_version(Version::new(3, 0, 0))?;
        let mut data = vec![mode.code()];
        if challenge_response_timeout != 0 || auto_eject_timeout != 0 {
            data.push(challenge_response_timeout);
            data.extend_from_slice(&auto_eject_timeout.to_be_bytes());
        }
        self.backend.set_mode(&data)
    }

    /// Close the session and its connection
    pub fn close(self) -> Result<()> {
        self.backend.close()
    }

    fn require_version(&self, required: Version) -> Result<()> {
        if self.version < required {
            debug!(version = %self.version, %required, "Operation not supported");
            return Err(Error::NotSupported { required });
        }
        Ok(())
    }
}
