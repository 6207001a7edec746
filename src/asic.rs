//! ASIC controller
//!
//! This module provides [`AsicController`], which owns one probe session: the
//! transport, the device state machine, the last applied configuration and
//! the cached error of a failed session. Every request/response exchange goes
//! through it and every failure is classified here.

use log::{debug, error, info, warn};

use crate::classify::{classify, decode_faults, Classification, Signal};
use crate::command::{Command, Response};
use crate::config::DriverConfig;
use crate::constants::*;
use crate::error::{DriverError, FrameError, InternalError, Result};
use crate::frame::Framer;
use crate::structures::{
    DeviceState, FirmwareInfo, ParamId, ParameterSet, StatusData, StatusFrame,
};
use crate::transport::{DeviceId, Transport};

/// Raw ASIC and FPGA fault registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultStatus {
    /// ASIC fault bits (`ASIC_FAULT_*`)
    pub asic: u8,
    /// FPGA fault bits (`FPGA_FAULT_*`)
    pub fpga: u32,
}

impl FaultStatus {
    /// Unpack from fault status response data
    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() != VENDOR_FAULT_STATUS_LEN {
            return None;
        }
        Some(Self {
            asic: data[0],
            fpga: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }

    /// Check if any fault bit is set
    pub fn has_faults(&self) -> bool {
        self.asic != 0 || self.fpga != 0
    }

    /// Every fault the registers report, ASIC first
    pub fn faults(&self) -> Vec<InternalError> {
        decode_faults(self.asic, self.fpga)
    }
}

/// Probe session and device state machine
///
/// States move `Uninitialized → Initialized → Configured → Ready`. A fatal
/// failure moves any state to `Error`, releases the transport and caches the
/// classification; every later call except [`close`](Self::close) returns the
/// cached error without touching the transport.
///
/// # Example
///
/// ```
/// use soundcath::mock::MockTransport;
/// use soundcath::{AsicController, DeviceId, DeviceState, DriverConfig, ParamId, ParameterSet};
///
/// let mut asic = AsicController::new(MockTransport::new(), DriverConfig::default());
/// asic.open(&DeviceId::Index(0))?;
/// asic.configure(&ParameterSet::new().with(ParamId::GAIN, 10))?;
/// let status = asic.query_status()?;
/// assert_eq!(status.state, DeviceState::Ready);
/// asic.close();
/// # Ok::<(), soundcath::DriverError>(())
/// ```
#[derive(Debug)]
pub struct AsicController<T: Transport> {
    transport: T,
    framer: Framer,
    config: DriverConfig,
    state: DeviceState,
    /// Configuration the device has accepted in this session
    applied: ParameterSet,
    /// Classification that moved the session to `Error`
    cached: Option<Classification>,
    last_error: Classification,
    firmware: Option<FirmwareInfo>,
}

impl<T: Transport> AsicController<T> {
    /// Create a controller with no open session
    pub fn new(transport: T, config: DriverConfig) -> Self {
        Self {
            transport,
            framer: Framer::new(config.crc),
            config,
            state: DeviceState::Uninitialized,
            applied: ParameterSet::new(),
            cached: None,
            last_error: Classification::OK,
            firmware: None,
        }
    }

    /// Open the session and run the USB_INIT handshake
    ///
    /// Any failure releases the transport, leaves the controller
    /// `Uninitialized` and is reported as `UsbInit`.
    pub fn open(&mut self, device: &DeviceId) -> Result<FirmwareInfo> {
        if let Some(cached) = self.cached {
            return Err(cached.driver);
        }
        if self.state != DeviceState::Uninitialized {
            return Err(self.reject(InternalError::AlreadyOpen));
        }

        info!("opening probe {}", device);
        if let Err(e) = self.transport.init(device) {
            self.transport.close();
            return Err(self.record(classify(&Signal::Init(&e))));
        }

        let firmware = match self.handshake() {
            Ok(firmware) => firmware,
            Err(c) => {
                self.transport.close();
                return Err(self.record(Classification::new(DriverError::UsbInit, c.internal)));
            }
        };

        info!("probe {} ready, firmware {}.{}", device, firmware.major, firmware.minor);
        self.state = DeviceState::Initialized;
        self.applied.clear();
        self.firmware = Some(firmware);
        Ok(firmware)
    }

    fn handshake(&mut self) -> std::result::Result<FirmwareInfo, Classification> {
        let response = self.exchange(&Command::UsbInit)?;
        let firmware = FirmwareInfo::unpack(&response.data).ok_or_else(|| {
            classify(&Signal::Frame(&FrameError::MalformedPayload {
                command: CMD_USB_INIT,
            }))
        })?;
        if firmware.protocol_version != PROTOCOL_VERSION {
            warn!(
                "probe speaks protocol {}, driver speaks {}",
                firmware.protocol_version, PROTOCOL_VERSION
            );
            return Err(classify(&Signal::Host(InternalError::ProtocolMismatch)));
        }
        Ok(firmware)
    }

    /// Apply a parameter set, all or nothing
    ///
    /// The set is checked against the configured limits before any I/O. A
    /// single entry goes out as a PARAM set, anything else as a PARAMSET. On
    /// rejection the previous configuration stays active.
    pub fn configure(&mut self, parameters: &ParameterSet) -> Result<()> {
        self.guard()?;
        let command = match (parameters.len(), parameters.iter().next()) {
            (1, Some((id, value))) => Command::SetParam(id, value),
            _ => Command::ParamSet(parameters.clone()),
        };
        self.apply(&command, parameters).map(|_| ())
    }

    fn apply(&mut self, command: &Command, parameters: &ParameterSet) -> Result<Response> {
        let batch = matches!(command, Command::ParamSet(_));
        if parameters.is_empty() {
            return Err(self.fail(classify(&Signal::Parameter {
                error: InternalError::EmptyParameterSet,
                batch: true,
            })));
        }
        if let Err((id, error)) = self.config.limits.check_set(parameters) {
            warn!("{} = {:?} rejected locally", id, parameters.get(id));
            return Err(self.fail(classify(&Signal::Parameter { error, batch })));
        }

        let response = self.round_trip(command)?;
        self.applied.merge(parameters);
        if self.state != DeviceState::Configured {
            debug!("{} -> {}", self.state, DeviceState::Configured);
        }
        self.state = DeviceState::Configured;
        Ok(response)
    }

    /// Send one command and wait for its response
    ///
    /// Parameter writes go through [`configure`](Self::configure) semantics
    /// and STATUS through [`query_status`](Self::query_status) semantics, so
    /// state and applied configuration stay consistent. A USB_INIT restarts
    /// the session: the device drops its configuration and the state returns
    /// to `Initialized`.
    pub fn send_command(&mut self, command: &Command) -> Result<Response> {
        self.guard()?;
        if !command.is_supported() {
            return Err(self.fail(classify(&Signal::Host(InternalError::Unsupported))));
        }
        // Response must fit in one frame
        if RESPONSE_PREFIX_LEN + command.response_data_len() > MAX_PAYLOAD_LEN {
            return Err(self.fail(classify(&Signal::Host(InternalError::PayloadTooLarge))));
        }

        match command {
            Command::SetParam(id, value) => {
                let parameters = ParameterSet::new().with(*id, *value);
                self.apply(command, &parameters)
            }
            Command::ParamSet(parameters) => self.apply(command, parameters),
            Command::Status => {
                let response = self.round_trip(command)?;
                self.read_status(&response)?;
                Ok(response)
            }
            Command::UsbInit => {
                let response = self.round_trip(command)?;
                self.applied.clear();
                self.state = DeviceState::Initialized;
                if let Some(firmware) = FirmwareInfo::unpack(&response.data) {
                    self.firmware = Some(firmware);
                }
                Ok(response)
            }
            Command::GetParam(_) | Command::Vendor { .. } => self.round_trip(command),
        }
    }

    /// Query device status
    ///
    /// A ready ASIC moves a `Configured` session to `Ready`.
    pub fn query_status(&mut self) -> Result<StatusFrame> {
        self.guard()?;
        let response = self.round_trip(&Command::Status)?;
        self.read_status(&response)
    }

    fn read_status(&mut self, response: &Response) -> Result<StatusFrame> {
        let Some(status) = StatusData::unpack(&response.data) else {
            return Err(self.fail(classify(&Signal::Host(InternalError::MalformedStatus))));
        };
        if status.ready && self.state == DeviceState::Configured {
            info!("ASIC ready, {} -> {}", self.state, DeviceState::Ready);
            self.state = DeviceState::Ready;
        }
        Ok(status.into_frame(self.state, self.applied.clone()))
    }

    /// Read one parameter from the device
    pub fn get_parameter(&mut self, id: ParamId) -> Result<u32> {
        self.guard()?;
        if self.config.limits.range(id).is_none() {
            return Err(self.fail(classify(&Signal::Parameter {
                error: InternalError::UnknownParameter,
                batch: false,
            })));
        }
        let response = self.round_trip(&Command::GetParam(id))?;
        match <[u8; PARAM_VALUE_LEN]>::try_from(response.data.as_slice()) {
            Ok(bytes) => Ok(u32::from_le_bytes(bytes)),
            Err(_) => Err(self.fail(classify(&Signal::Frame(&FrameError::MalformedPayload {
                command: CMD_PARAM,
            })))),
        }
    }

    /// Read the FPGA firmware version string
    pub fn fpga_version(&mut self) -> Result<String> {
        self.vendor_text(VENDOR_FPGA_VERSION)
    }

    /// Read the FPGA description string
    pub fn fpga_description(&mut self) -> Result<String> {
        self.vendor_text(VENDOR_FPGA_DESCRIPTION)
    }

    /// Read the ASIC serial number
    pub fn asic_serial_number(&mut self) -> Result<String> {
        self.vendor_text(VENDOR_ASIC_SERIAL)
    }

    fn vendor_text(&mut self, opcode: u8) -> Result<String> {
        let response = self.send_command(&Command::vendor(opcode, &[], VENDOR_TEXT_LEN as u16))?;
        let end = response
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(response.data.len());
        Ok(String::from_utf8_lossy(&response.data[..end]).into_owned())
    }

    /// Read the raw ASIC and FPGA fault registers
    pub fn fault_status(&mut self) -> Result<FaultStatus> {
        let command = Command::vendor(VENDOR_FAULT_STATUS, &[], VENDOR_FAULT_STATUS_LEN as u16);
        let response = self.send_command(&command)?;
        let Some(faults) = FaultStatus::unpack(&response.data) else {
            return Err(self.fail(classify(&Signal::Frame(&FrameError::MalformedPayload {
                command: VENDOR_FAULT_STATUS,
            }))));
        };
        for fault in faults.faults() {
            warn!("probe fault: {}", fault);
        }
        Ok(faults)
    }

    /// Release the session
    ///
    /// Idempotent. Clears the cached error so a fresh `open` is allowed.
    pub fn close(&mut self) {
        if self.state != DeviceState::Uninitialized {
            info!("closing probe session ({})", self.state);
        }
        self.transport.close();
        self.state = DeviceState::Uninitialized;
        self.applied.clear();
        self.cached = None;
        self.firmware = None;
    }

    /// Get the device state
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Get the last failure classification
    pub fn last_error(&self) -> Classification {
        self.last_error
    }

    /// Get the firmware information of the open session
    pub fn firmware_info(&self) -> Option<FirmwareInfo> {
        self.firmware
    }

    /// Get the configuration the device has accepted
    pub fn applied_parameters(&self) -> &ParameterSet {
        &self.applied
    }

    /// Get the driver configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Get the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reject calls the current state does not allow
    fn guard(&mut self) -> Result<()> {
        if let Some(cached) = self.cached {
            return Err(cached.driver);
        }
        if self.state == DeviceState::Uninitialized {
            return Err(self.reject(InternalError::NotOpen));
        }
        Ok(())
    }

    fn reject(&mut self, internal: InternalError) -> DriverError {
        self.record(classify(&Signal::Host(internal)))
    }

    fn record(&mut self, c: Classification) -> DriverError {
        warn!("{}", c);
        self.last_error = c;
        c.driver
    }

    /// Record a failure and tear the session down if it is fatal
    fn fail(&mut self, c: Classification) -> DriverError {
        if !c.is_fatal() {
            return self.record(c);
        }
        error!("{} -> {}: {}", self.state, DeviceState::Error, c);
        self.last_error = c;
        self.transport.close();
        self.state = DeviceState::Error;
        self.cached = Some(c);
        c.driver
    }

    fn round_trip(&mut self, command: &Command) -> Result<Response> {
        self.exchange(command).map_err(|c| self.fail(c))
    }

    /// One request/response cycle, classified but without state changes
    fn exchange(&mut self, command: &Command) -> std::result::Result<Response, Classification> {
        let bytes = self
            .framer
            .encode(command)
            .map_err(|e| classify(&Signal::Frame(&e)))?;
        self.transport
            .send(&bytes, self.config.send_timeout)
            .map_err(|e| classify(&Signal::Transport(&e)))?;

        let raw = self
            .transport
            .receive(self.framer.response_len(command), self.config.receive_timeout)
            .map_err(|e| classify(&Signal::Transport(&e)))?;
        let response = self
            .framer
            .decode(&raw)
            .map_err(|e| classify(&Signal::Frame(&e)))?;

        if !response.answers(command) {
            return Err(classify(&Signal::Frame(&FrameError::UnexpectedResponse {
                expected: command.type_code() | RESPONSE_FLAG,
                actual: response.command | RESPONSE_FLAG,
            })));
        }

        let c = classify(&Signal::Device {
            status: response.status,
            detail: response.detail,
        });
        if !c.is_ok() {
            return Err(c);
        }

        debug!("{:?} -> {}", command, response);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFault, MockTransport};

    fn open_controller() -> (AsicController<MockTransport>, MockTransport) {
        let probe = MockTransport::new();
        let mut asic = AsicController::new(probe.clone(), DriverConfig::default());
        asic.open(&DeviceId::Index(0)).unwrap();
        (asic, probe)
    }

    #[test]
    fn test_open_records_firmware() {
        let (asic, _) = open_controller();
        assert_eq!(asic.state(), DeviceState::Initialized);
        let firmware = asic.firmware_info().unwrap();
        assert_eq!(firmware.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_protocol_mismatch_fails_open() {
        let probe = MockTransport::new().with_firmware(FirmwareInfo {
            major: 2,
            minor: 0,
            hardware: crate::structures::HardwareId::TestBoard,
            protocol_version: PROTOCOL_VERSION + 1,
        });
        let mut asic = AsicController::new(probe.clone(), DriverConfig::default());
        assert_eq!(asic.open(&DeviceId::Index(0)), Err(DriverError::UsbInit));
        assert_eq!(asic.last_error().internal, InternalError::ProtocolMismatch);
        assert_eq!(asic.state(), DeviceState::Uninitialized);
        assert!(!probe.is_open());
    }

    #[test]
    fn test_single_entry_goes_out_as_param() {
        let (mut asic, probe) = open_controller();
        asic.configure(&ParameterSet::new().with(ParamId::GAIN, 10))
            .unwrap();
        assert_eq!(
            probe.commands().last(),
            Some(&Command::SetParam(ParamId::GAIN, 10))
        );
    }

    #[test]
    fn test_local_rejection_does_no_io() {
        let (mut asic, probe) = open_controller();
        let before = probe.stats();
        let set = ParameterSet::new()
            .with(ParamId::GAIN, 10)
            .with(ParamId::RES_CAL, 8);
        assert_eq!(asic.configure(&set), Err(DriverError::ParamSet));
        assert_eq!(asic.configure(&ParameterSet::new()), Err(DriverError::ParamSet));
        assert_eq!(probe.stats(), before);
        assert_eq!(asic.state(), DeviceState::Initialized);
    }

    #[test]
    fn test_device_rejection_keeps_configuration() {
        let probe = MockTransport::new()
            .with_limits(crate::structures::ParameterLimits::default().with(ParamId::GAIN, 0..=20));
        let mut asic = AsicController::new(probe.clone(), DriverConfig::default());
        asic.open(&DeviceId::Index(0)).unwrap();
        asic.configure(&ParameterSet::new().with(ParamId::GAIN, 10))
            .unwrap();

        // Host limits allow 50, the firmware does not
        assert_eq!(
            asic.configure(&ParameterSet::new().with(ParamId::GAIN, 50)),
            Err(DriverError::Param)
        );
        assert_eq!(asic.last_error().internal, InternalError::ParameterRejected);
        assert_eq!(asic.applied_parameters().get(ParamId::GAIN), Some(10));
        assert_eq!(asic.state(), DeviceState::Configured);
    }

    #[test]
    fn test_out_of_order_response_is_fatal() {
        let (mut asic, probe) = open_controller();
        probe.inject(MockFault::WrongResponseType);
        assert_eq!(asic.query_status(), Err(DriverError::SwInternal));
        assert_eq!(asic.state(), DeviceState::Error);
        assert_eq!(asic.last_error().internal, InternalError::UnexpectedResponse);
        assert!(!probe.is_open());
    }

    #[test]
    fn test_get_parameter() {
        let (mut asic, _) = open_controller();
        asic.configure(&ParameterSet::new().with(ParamId::CENTER_FREQUENCY_KHZ, 5000))
            .unwrap();
        assert_eq!(asic.get_parameter(ParamId::CENTER_FREQUENCY_KHZ), Ok(5000));
        assert_eq!(asic.get_parameter(ParamId::GAIN), Err(DriverError::Param));
        assert_eq!(asic.get_parameter(ParamId(0xFFFF)), Err(DriverError::Param));
        assert_eq!(asic.state(), DeviceState::Configured);
    }

    #[test]
    fn test_vendor_text_queries() {
        let (mut asic, _) = open_controller();
        assert_eq!(asic.fpga_version().unwrap(), "1.4.0");
        assert!(asic.asic_serial_number().unwrap().starts_with("SC-"));
        assert!(!asic.fpga_description().unwrap().is_empty());
    }

    #[test]
    fn test_fault_status() {
        let (mut asic, probe) = open_controller();
        assert!(!asic.fault_status().unwrap().has_faults());

        probe.set_fault_registers(ASIC_FAULT_BUSY, FPGA_FAULT_HV_POW);
        let faults = asic.fault_status().unwrap();
        assert_eq!(
            faults.faults(),
            vec![InternalError::AsicBusy, InternalError::FpgaHighVoltage]
        );
    }

    #[test]
    fn test_usb_init_command_restarts_session() {
        let (mut asic, probe) = open_controller();
        asic.configure(&ParameterSet::new().with(ParamId::GAIN, 10))
            .unwrap();
        asic.send_command(&Command::UsbInit).unwrap();
        assert_eq!(asic.state(), DeviceState::Initialized);
        assert!(asic.applied_parameters().is_empty());
        assert!(probe.device_parameters().is_empty());
    }
}
