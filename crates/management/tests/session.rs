//! Management sessions against simulated devices

mod common;

use common::{FidoSim, OtpSim, SmartCardSim, info_block};
use yubikit_core::{Error, StatusWord, Transport, Version};
use yubikit_management::backend::{AID_MANAGEMENT, AID_OTP};
use yubikit_management::{
    BackendKind, Capability, DeviceConfig, DeviceConnection, FormFactor, LockCode,
    ManagementSession, Mode,
};

#[test]
fn test_smart_card_device_info() {
    let (sim, state) = SmartCardSim::new([5, 4, 3]);
    let mut session = ManagementSession::open(DeviceConnection::smart_card(sim)).unwrap();
    assert_eq!(session.version(), Version::new(5, 4, 3));
    assert_eq!(session.backend_kind(), BackendKind::SmartCard);

    let info = session.get_device_info().unwrap();
    assert_eq!(info.serial(), Some(123_456));
    assert_eq!(info.version(), Version::new(5, 4, 3));
    assert_eq!(info.form_factor(), FormFactor::UsbAKeychain);
    assert!(
        info.supported_capabilities(Transport::Usb)
            .unwrap()
            .contains(Capability::PIV)
    );

    let commands = &state.lock().commands;
    assert_eq!(&commands[0][..5], &[0x00, 0xA4, 0x04, 0x00, 0x08]);
    assert_eq!(&commands[0][5..], &AID_MANAGEMENT);
    assert_eq!(commands[1], vec![0x00, 0x1D, 0x00, 0x00, 0x00]);
}

#[test]
fn test_smart_card_update_config() {
    let (sim, state) = SmartCardSim::new([5, 4, 3]);
    let mut session = ManagementSession::open(DeviceConnection::smart_card(sim)).unwrap();

    let config = DeviceConfig::builder()
        .enabled_capabilities(Transport::Usb, Capability::OTP | Capability::FIDO2)
        .build();
    let lock = LockCode::new([0xAB; 16]);
    session
        .update_device_config(&config, true, None, Some(&lock))
        .unwrap();

    let written = state.lock().writes[0].clone();
    let mut expected = vec![0x0C, 0x00, 0x03, 0x02, 0x02, 0x01, 0x0A, 0x10];
    expected.extend_from_slice(&[0xAB; 16]);
    assert_eq!(written[0] as usize, expected.len());
    assert_eq!(&written[1..], expected.as_slice());
}

#[test]
fn test_set_mode_on_yubikey5_writes_config() {
    let (sim, state) = SmartCardSim::new([5, 2, 7]);
    let mut session = ManagementSession::open(DeviceConnection::smart_card(sim)).unwrap();
    session
        .set_mode("otp+ccid".parse().unwrap(), 0, 0)
        .unwrap();

    let state = state.lock();
    assert!(state.modes.is_empty());
    // USB_ENABLED = OTP | OPENPGP | PIV | OATH, auto-eject 0, chalresp 0
    assert_eq!(
        hex::encode(&state.writes[0]),
        "0b0302003906020000070100"
    );
}

#[test]
fn test_neo_smart_card() {
    let (sim, state) = SmartCardSim::new([3, 4, 9]);
    let mut session = ManagementSession::open(DeviceConnection::smart_card(sim)).unwrap();
    assert_eq!(session.version(), Version::new(3, 4, 9));

    let err = session.get_device_info().unwrap_err();
    assert!(err.is_unsupported());
    let err = session
        .update_device_config(&DeviceConfig::default(), false, None, None)
        .unwrap_err();
    assert!(err.is_unsupported());

    let mode = Mode::from_code(0x06).unwrap();
    session.set_mode(mode, 0, 0).unwrap();

    let state = state.lock();
    assert_eq!(state.modes, vec![vec![0x06]]);
    assert_eq!(state.commands[1], vec![0xA4, 0x04, 0x00, 0x08]);
    assert_eq!(&state.commands[2][5..], &AID_OTP);
    assert_eq!(
        state.commands.last().unwrap(),
        &vec![0x00, 0x01, 0x11, 0x00, 0x01, 0x06]
    );
}

#[test]
fn test_otp_device_info_and_legacy_mode() {
    let (sim, state) = OtpSim::new([4, 3, 7]);
    let mut session = ManagementSession::open(DeviceConnection::otp(sim)).unwrap();
    assert_eq!(session.backend_kind(), BackendKind::Otp);

    let info = session.get_device_info().unwrap();
    assert_eq!(info.serial(), Some(123_456));
    assert_eq!(info.version(), Version::new(4, 3, 7));

    let mode = Mode::from_code(0x03).unwrap();
    session.set_mode(mode, 15, 0x012C).unwrap();
    assert_eq!(&state.lock().modes[0][..4], &[0x03, 15, 0x01, 0x2C]);

    let err = session
        .update_device_config(&DeviceConfig::default(), false, None, None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::NotSupported { required } if required == Version::new(5, 0, 0)
    ));

    session.close().unwrap();
    assert!(state.lock().closed);
}

#[test]
fn test_otp_update_config() {
    let (sim, state) = OtpSim::new([5, 1, 2]);
    let mut session = ManagementSession::open(DeviceConnection::otp(sim)).unwrap();
    let config = DeviceConfig::builder().auto_eject_timeout(60).build();
    session
        .update_device_config(&config, false, None, None)
        .unwrap();
    assert_eq!(state.lock().writes, vec![vec![0x04, 0x06, 0x02, 0x00, 0x3C]]);
}

#[test]
fn test_old_otp_firmware_has_no_management() {
    let (sim, _) = OtpSim::new([2, 2, 0]);
    let err = ManagementSession::open(DeviceConnection::otp(sim)).unwrap_err();
    assert!(matches!(
        err,
        Error::ApplicationNotAvailable(sw) if sw == StatusWord::FILE_NOT_FOUND
    ));
}

#[test]
fn test_fido_device_info() {
    let (sim, state) = FidoSim::new([5, 2, 7], 0x05);
    let mut session = ManagementSession::open(DeviceConnection::fido(sim)).unwrap();
    assert_eq!(session.backend_kind(), BackendKind::Fido);
    assert_eq!(session.version(), Version::new(5, 2, 7));

    let info = session.get_device_info().unwrap();
    assert_eq!(info.serial(), Some(123_456));
    assert_eq!(state.lock().info, info_block([5, 2, 7]));
}

#[test]
fn test_fido_legacy_version_guess() {
    let (sim, state) = FidoSim::new([2, 1, 0], 0x01);
    let mut session = ManagementSession::open(DeviceConnection::fido(sim)).unwrap();
    assert_eq!(session.version(), Version::new(3, 0, 0));

    session.set_mode(Mode::from_code(0x05).unwrap(), 0, 0).unwrap();
    assert_eq!(state.lock().modes, vec![vec![0x05]]);
    assert!(session.get_device_info().unwrap_err().is_unsupported());
}

#[test]
fn test_fido_development_version_kept() {
    let (sim, _) = FidoSim::new([0, 9, 1], 0x04);
    let session = ManagementSession::open(DeviceConnection::fido(sim)).unwrap();
    assert_eq!(session.version(), Version::new(0, 9, 1));
}

#[test]
fn test_open_preferred_order() {
    let (fido, fido_state) = FidoSim::new([5, 4, 3], 0x05);
    let (otp, otp_state) = OtpSim::new([5, 4, 3]);
    let (card, _) = SmartCardSim::new([5, 4, 3]);
    let session = ManagementSession::open_preferred([
        DeviceConnection::fido(fido),
        DeviceConnection::otp(otp),
        DeviceConnection::smart_card(card),
    ])
    .unwrap();
    assert_eq!(session.backend_kind(), BackendKind::SmartCard);
    assert!(fido_state.lock().commands.is_empty());
    assert!(otp_state.lock().commands.is_empty());
}

#[test]
fn test_open_preferred_skips_unavailable() {
    let (otp, _) = OtpSim::new([2, 2, 0]);
    let (fido, _) = FidoSim::new([2, 2, 0], 0x00);
    let session = ManagementSession::open_preferred([
        DeviceConnection::fido(fido),
        DeviceConnection::otp(otp),
    ])
    .unwrap();
    assert_eq!(session.backend_kind(), BackendKind::Fido);

    let err = ManagementSession::open_preferred(Vec::new()).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
