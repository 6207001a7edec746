//! End-to-end session tests against the simulated probe

use soundcath::constants::{
    ASIC_FAULT_LOCKED, FPGA_FAULT_CLOCK, STATUS_ASICERROR, STATUS_FPGA, VENDOR_MAX_ARGS_LEN,
    VENDOR_MAX_RESPONSE_LEN,
};
use soundcath::mock::{MockFault, MockTransport};
use soundcath::{
    Command, CrcAlgorithm, DeviceState, DriverConfig, DriverError, Interface, InternalError,
    ParamId, ParameterSet, Transport, CMD_VENDOR_FIRST, VENDOR_FPGA_VERSION,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open_session() -> (Interface<MockTransport>, MockTransport) {
    init_logger();
    let probe = MockTransport::new();
    let driver = Interface::with_transport(probe.clone(), DriverConfig::default());
    driver.open("dev0").unwrap();
    (driver, probe)
}

fn gain_and_freq() -> ParameterSet {
    ParameterSet::new()
        .with(ParamId::GAIN, 10)
        .with(ParamId::CENTER_FREQUENCY_KHZ, 5000)
}

#[test]
fn open_configure_status_reaches_ready() {
    let (driver, probe) = open_session();

    driver.configure(&gain_and_freq()).unwrap();
    assert_eq!(driver.state(), DeviceState::Configured);

    let status = driver.get_status().unwrap();
    assert_eq!(status.state, DeviceState::Ready);
    assert!(status.ready);
    assert_eq!(status.parameters, gain_and_freq());
    assert_eq!(probe.device_parameters(), gain_and_freq());
}

#[test]
fn rejected_value_keeps_previous_configuration() {
    let (driver, probe) = open_session();
    driver.configure(&gain_and_freq()).unwrap();
    let before = probe.stats();

    let rejected = ParameterSet::new().with(ParamId::GAIN, 999_999);
    assert_eq!(driver.configure(&rejected), Err(DriverError::Param));
    assert_eq!(driver.last_error().internal, InternalError::ParameterOutOfRange);
    assert_eq!(probe.stats(), before);

    let status = driver.get_status().unwrap();
    assert_eq!(status.parameters.get(ParamId::GAIN), Some(10));
    assert_eq!(probe.device_parameters().get(ParamId::GAIN), Some(10));
}

#[test]
fn rejected_batch_reports_paramset() {
    let (driver, _) = open_session();
    let batch = ParameterSet::new()
        .with(ParamId::GAIN, 10)
        .with(ParamId::ISEL_LNA, 16);
    assert_eq!(driver.configure(&batch), Err(DriverError::ParamSet));
    assert!(driver.applied_parameters().is_empty());
    assert_eq!(driver.state(), DeviceState::Initialized);
}

#[test]
fn corrupted_response_is_retryable() {
    let (driver, probe) = open_session();
    let command = Command::GetParam(ParamId::GAIN);
    driver.configure(&gain_and_freq()).unwrap();

    probe.inject(MockFault::CorruptResponse);
    assert_eq!(driver.send_command(&command), Err(DriverError::Crc));
    assert_eq!(driver.last_error().internal, InternalError::CrcMismatch);
    assert_eq!(driver.state(), DeviceState::Configured);

    let response = driver.send_command(&command).unwrap();
    assert_eq!(response.data, 10u32.to_le_bytes());
}

#[test]
fn length_mismatch_is_crc_class() {
    let (driver, probe) = open_session();
    probe.inject(MockFault::LengthMismatch);
    assert_eq!(driver.get_status(), Err(DriverError::Crc));
    assert_eq!(driver.last_error().internal, InternalError::LengthMismatch);
    assert!(driver.get_status().is_ok());
}

#[test]
fn receive_timeout_is_terminal_and_cached() {
    let (driver, probe) = open_session();
    driver.configure(&gain_and_freq()).unwrap();

    probe.inject(MockFault::ReceiveTimeout);
    assert_eq!(
        driver.send_command(&Command::GetParam(ParamId::GAIN)),
        Err(DriverError::UsbReceive)
    );
    assert_eq!(driver.state(), DeviceState::Error);
    assert!(!probe.is_open());

    let before = probe.stats();
    assert_eq!(
        driver.send_command(&Command::GetParam(ParamId::GAIN)),
        Err(DriverError::UsbReceive)
    );
    assert_eq!(driver.configure(&gain_and_freq()), Err(DriverError::UsbReceive));
    assert_eq!(driver.get_status(), Err(DriverError::UsbReceive));
    assert_eq!(driver.open("dev0"), Err(DriverError::UsbReceive));
    assert_eq!(probe.stats(), before);
}

#[test]
fn send_failures_are_terminal() {
    for fault in [MockFault::SendTimeout, MockFault::PartialWrite] {
        let (driver, probe) = open_session();
        probe.inject(fault);
        assert_eq!(driver.get_status(), Err(DriverError::UsbSend));
        assert_eq!(driver.state(), DeviceState::Error);
    }
}

#[test]
fn short_response_is_terminal() {
    let (driver, probe) = open_session();
    probe.inject(MockFault::ShortResponse);
    assert_eq!(driver.get_status(), Err(DriverError::UsbReceive));
    assert_eq!(driver.last_error().internal, InternalError::ShortRead);
    assert_eq!(driver.state(), DeviceState::Error);
}

#[test]
fn hardware_faults_are_terminal() {
    let (driver, probe) = open_session();
    probe.inject(MockFault::DeviceStatus {
        status: STATUS_FPGA,
        detail: FPGA_FAULT_CLOCK,
    });
    assert_eq!(driver.configure(&gain_and_freq()), Err(DriverError::Fpga));
    assert_eq!(driver.last_error().internal, InternalError::FpgaClock);
    assert_eq!(driver.state(), DeviceState::Error);
    assert!(driver.applied_parameters().is_empty());

    driver.close();
    driver.open("dev0").unwrap();
    probe.inject(MockFault::DeviceStatus {
        status: STATUS_ASICERROR,
        detail: ASIC_FAULT_LOCKED as u32,
    });
    assert_eq!(driver.get_status(), Err(DriverError::AsicError));
    assert_eq!(driver.last_error().internal, InternalError::AsicLocked);
    assert_eq!(driver.state(), DeviceState::Error);
}

#[test]
fn close_is_idempotent_and_allows_reopen() {
    let (driver, probe) = open_session();
    driver.configure(&gain_and_freq()).unwrap();

    driver.close();
    driver.close();
    driver.close();
    assert_eq!(driver.state(), DeviceState::Uninitialized);
    assert!(driver.applied_parameters().is_empty());
    assert_eq!(probe.stats().closes, 1);

    driver.open("dev0").unwrap();
    assert_eq!(driver.state(), DeviceState::Initialized);
}

#[test]
fn uninitialized_calls_fail_without_io() {
    init_logger();
    let probe = MockTransport::new();
    let driver = Interface::with_transport(probe.clone(), DriverConfig::default());

    assert_eq!(driver.configure(&gain_and_freq()), Err(DriverError::Failed));
    assert_eq!(driver.get_status(), Err(DriverError::Failed));
    assert_eq!(driver.send_command(&Command::Status), Err(DriverError::Failed));
    assert_eq!(driver.fpga_version(), Err(DriverError::Failed));
    assert_eq!(driver.last_error().internal, InternalError::NotOpen);
    assert_eq!(probe.stats().io_calls(), 0);
}

#[test]
fn second_open_fails_and_keeps_session() {
    let (driver, probe) = open_session();
    driver.configure(&gain_and_freq()).unwrap();
    let before = probe.stats();

    assert_eq!(driver.open("dev0"), Err(DriverError::Failed));
    assert_eq!(driver.last_error().internal, InternalError::AlreadyOpen);
    assert_eq!(driver.state(), DeviceState::Configured);
    assert_eq!(probe.stats(), before);
    assert!(probe.is_open());
}

#[test]
fn open_failures_report_usb_init() {
    init_logger();
    let probe = MockTransport::new();
    let driver = Interface::with_transport(probe.clone(), DriverConfig::default());

    assert_eq!(driver.open("dev1"), Err(DriverError::UsbInit));
    assert_eq!(driver.last_error().internal, InternalError::DeviceNotFound);

    probe.set_claimed_elsewhere(true);
    assert_eq!(driver.open("dev0"), Err(DriverError::UsbInit));
    assert_eq!(driver.last_error().internal, InternalError::DeviceBusy);
    probe.set_claimed_elsewhere(false);

    probe.inject(MockFault::ReceiveTimeout);
    assert_eq!(driver.open("dev0"), Err(DriverError::UsbInit));
    assert_eq!(driver.last_error().internal, InternalError::ReadTimeout);
    assert_eq!(driver.state(), DeviceState::Uninitialized);
    assert!(!probe.is_open());

    driver.open("dev0").unwrap();
}

#[test]
fn unplugged_probe_fails_to_open() {
    init_logger();
    let probe = MockTransport::new();
    probe.set_present(false);
    let driver = Interface::with_transport(probe, DriverConfig::default());
    assert_eq!(driver.open("dev0"), Err(DriverError::UsbInit));
}

#[test]
fn disconnect_mid_session_is_terminal() {
    let (driver, probe) = open_session();
    probe.set_present(false);
    assert_eq!(driver.get_status(), Err(DriverError::UsbSend));
    assert_eq!(driver.last_error().internal, InternalError::WriteDisconnected);
    assert_eq!(driver.state(), DeviceState::Error);
}

#[test]
fn vendor_opcodes() {
    let (driver, probe) = open_session();
    let before = probe.stats();

    let outside = Command::vendor(0x20, &[], 0);
    assert_eq!(driver.send_command(&outside), Err(DriverError::NotImplemented));
    assert_eq!(probe.stats(), before);

    let unknown = Command::vendor(CMD_VENDOR_FIRST + 0x30, &[1, 2], 4);
    assert_eq!(driver.send_command(&unknown), Err(DriverError::NotImplemented));
    assert_eq!(driver.state(), DeviceState::Initialized);

    assert_eq!(driver.fpga_version().unwrap(), "1.4.0");
}

#[test]
fn oversized_vendor_response_rejected_without_io() {
    let (driver, probe) = open_session();
    let before = probe.stats();

    let oversized = Command::vendor(VENDOR_FPGA_VERSION, &[], VENDOR_MAX_RESPONSE_LEN as u16 + 1);
    assert_eq!(driver.send_command(&oversized), Err(DriverError::Failed));
    assert_eq!(driver.last_error().internal, InternalError::PayloadTooLarge);
    assert_eq!(driver.state(), DeviceState::Initialized);
    assert_eq!(probe.stats(), before);

    let largest = Command::vendor(VENDOR_FPGA_VERSION, &[], VENDOR_MAX_RESPONSE_LEN as u16);
    let response = driver.send_command(&largest).unwrap();
    assert_eq!(response.data.len(), VENDOR_MAX_RESPONSE_LEN);
    assert!(response.data.starts_with(b"1.4.0"));
}

#[test]
fn vendor_args_at_frame_limit() {
    let (driver, probe) = open_session();

    let largest = Command::vendor(VENDOR_FPGA_VERSION, &vec![0x55; VENDOR_MAX_ARGS_LEN], 4);
    assert!(driver.send_command(&largest).is_ok());

    let before = probe.stats();
    let oversized = Command::vendor(VENDOR_FPGA_VERSION, &vec![0x55; VENDOR_MAX_ARGS_LEN + 1], 4);
    assert_eq!(driver.send_command(&oversized), Err(DriverError::Failed));
    assert_eq!(driver.last_error().internal, InternalError::PayloadTooLarge);
    assert_eq!(driver.state(), DeviceState::Initialized);
    assert_eq!(probe.stats(), before);
}

#[test]
fn send_command_routes_parameters_through_configure() {
    let (driver, probe) = open_session();

    driver
        .send_command(&Command::SetParam(ParamId::GAIN, 25))
        .unwrap();
    assert_eq!(driver.applied_parameters().get(ParamId::GAIN), Some(25));
    assert_eq!(driver.state(), DeviceState::Configured);

    assert_eq!(
        driver.send_command(&Command::SetParam(ParamId::GAIN, 101)),
        Err(DriverError::Param)
    );
    assert_eq!(
        driver.send_command(&Command::ParamSet(ParameterSet::new().with(ParamId::GAIN, 101))),
        Err(DriverError::ParamSet)
    );

    let response = driver.send_command(&Command::Status).unwrap();
    assert_eq!(response.data[0], 1);
    assert_eq!(driver.state(), DeviceState::Ready);
    assert_eq!(probe.device_parameters().get(ParamId::GAIN), Some(25));
}

#[test]
fn crc32_session() {
    init_logger();
    let probe = MockTransport::new().with_crc(CrcAlgorithm::Crc32IsoHdlc);
    let config = DriverConfig::default().with_crc(CrcAlgorithm::Crc32IsoHdlc);
    let driver = Interface::with_transport(probe, config);
    driver.open("dev0").unwrap();
    driver.configure(&gain_and_freq()).unwrap();
    assert_eq!(driver.get_status().unwrap().state, DeviceState::Ready);
}

#[test]
fn mismatched_crc_algorithm_fails_open() {
    init_logger();
    let probe = MockTransport::new().with_crc(CrcAlgorithm::Crc16Xmodem);
    let driver = Interface::with_transport(probe.clone(), DriverConfig::default());
    assert_eq!(driver.open("dev0"), Err(DriverError::UsbInit));
    assert!(!probe.is_open());
}

#[test]
fn error_messages_are_total() {
    for error in DriverError::ALL {
        assert!(!Interface::driver_error_message(error).is_empty());
    }
    for error in InternalError::ALL {
        assert!(!Interface::internal_error_message(error).is_empty());
    }
}
